// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use core::fmt;

use serde::{Deserialize, Serialize};

/// Which of the five connection strategies a configured client drives.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    #[serde(rename = "Routing", alias = "routing")]
    Routing,
    #[serde(rename = "TunnellingUDP", alias = "tunnelling_udp", alias = "TunnellingUdp")]
    TunnellingUdp,
    #[serde(rename = "TunnellingTCP", alias = "tunnelling_tcp", alias = "TunnellingTcp")]
    TunnellingTcp,
    #[serde(
        rename = "SecureTunnellingTCP",
        alias = "secure_tunnelling_tcp",
        alias = "SecureTunnellingTcp"
    )]
    SecureTunnellingTcp,
    #[serde(rename = "SecureRouting", alias = "secure_routing")]
    SecureRouting,
}

impl ConnectionMode {
    pub fn is_secure(self) -> bool {
        matches!(self, Self::SecureTunnellingTcp | Self::SecureRouting)
    }

    pub fn is_routing(self) -> bool {
        matches!(self, Self::Routing | Self::SecureRouting)
    }

    pub fn is_tunnelling(self) -> bool {
        matches!(self, Self::TunnellingUdp | Self::TunnellingTcp | Self::SecureTunnellingTcp)
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Routing => "Routing",
            Self::TunnellingUdp => "TunnellingUDP",
            Self::TunnellingTcp => "TunnellingTCP",
            Self::SecureTunnellingTcp => "SecureTunnellingTCP",
            Self::SecureRouting => "SecureRouting",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_modes_are_flagged_correctly() {
        assert!(ConnectionMode::SecureRouting.is_secure());
        assert!(ConnectionMode::SecureTunnellingTcp.is_secure());
        assert!(!ConnectionMode::Routing.is_secure());
        assert!(!ConnectionMode::TunnellingUdp.is_secure());
    }

    #[test]
    fn routing_and_tunnelling_partition_the_modes() {
        for mode in [
            ConnectionMode::Routing,
            ConnectionMode::TunnellingUdp,
            ConnectionMode::TunnellingTcp,
            ConnectionMode::SecureTunnellingTcp,
            ConnectionMode::SecureRouting,
        ] {
            assert_ne!(mode.is_routing(), mode.is_tunnelling());
        }
    }
}
