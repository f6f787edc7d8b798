// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    address::IndividualAddress,
    cfg::enums::ConnectionMode,
    constants::{
        DEFAULT_AUTO_RECONNECT_WAIT_S, DEFAULT_LATENCY_TOLERANCE_MS, DEFAULT_MCAST_GRP,
        DEFAULT_MCAST_PORT, DEFAULT_TELEGRAM_QUEUE_CAPACITY,
    },
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// How and where to connect.
    pub connection: ConnectionConfig,
    /// Present only for `SecureTunnellingTCP`/`SecureRouting` modes.
    pub secure: Option<SecureConfig>,
    /// Implementation-level knobs that have no fixed protocol value.
    pub runtime: RuntimeConfig,
}

/// Parameters describing how to reach a gateway and which connection
/// strategy to drive.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ConnectionConfig {
    #[serde(rename = "Mode")]
    pub mode: ConnectionMode,

    #[serde(default, rename = "LocalIp")]
    /// Interface address used to join multicast (Routing) or bind the
    /// tunnelling socket. Auto-selected by the OS when empty.
    pub local_ip: String,

    #[serde(default, rename = "GatewayIp")]
    /// Tunnelling server address; unused in Routing modes.
    pub gateway_ip: String,

    #[serde(default = "default_gateway_port", rename = "GatewayPort")]
    pub gateway_port: u16,

    #[serde(default = "default_individual_address", rename = "IndividualAddress")]
    /// `area.line.device`; parsed lazily via [`ConnectionConfig::individual_address`].
    pub individual_address: String,

    #[serde(default = "default_multicast_group", rename = "MulticastGroup")]
    pub multicast_group: String,

    #[serde(default = "default_multicast_port", rename = "MulticastPort")]
    pub multicast_port: u16,

    #[serde(default, rename = "RouteBack")]
    /// Send the local HPAI as all-zeros, asking the gateway to reply to
    /// whatever source address the request arrived from.
    pub route_back: bool,

    #[serde(default, rename = "AutoReconnect")]
    pub auto_reconnect: bool,

    #[serde(default = "default_auto_reconnect_wait_s", rename = "AutoReconnectWaitS")]
    pub auto_reconnect_wait_s: u64,
}

fn default_gateway_port() -> u16 {
    DEFAULT_MCAST_PORT
}

fn default_individual_address() -> String {
    "15.15.250".to_string()
}

fn default_multicast_group() -> String {
    DEFAULT_MCAST_GRP.to_string()
}

fn default_multicast_port() -> u16 {
    DEFAULT_MCAST_PORT
}

fn default_auto_reconnect_wait_s() -> u64 {
    DEFAULT_AUTO_RECONNECT_WAIT_S
}

impl ConnectionConfig {
    pub fn individual_address(&self) -> Result<IndividualAddress> {
        IndividualAddress::from_str(&self.individual_address)
            .with_context(|| format!("invalid IndividualAddress {:?}", self.individual_address))
    }

    pub fn multicast_group(&self) -> Result<std::net::Ipv4Addr> {
        self.multicast_group
            .parse()
            .with_context(|| format!("invalid MulticastGroup {:?}", self.multicast_group))
    }

    pub fn local_if(&self) -> Result<std::net::Ipv4Addr> {
        if self.local_ip.is_empty() {
            return Ok(std::net::Ipv4Addr::UNSPECIFIED);
        }
        self.local_ip
            .parse()
            .with_context(|| format!("invalid LocalIp {:?}", self.local_ip))
    }

    pub fn gateway_addr(&self) -> Result<std::net::SocketAddr> {
        ensure!(!self.gateway_ip.is_empty(), "GatewayIp is required for a tunnelling connection");
        let ip: std::net::Ipv4Addr = self
            .gateway_ip
            .parse()
            .with_context(|| format!("invalid GatewayIp {:?}", self.gateway_ip))?;
        Ok(std::net::SocketAddr::V4(std::net::SocketAddrV4::new(ip, self.gateway_port)))
    }
}

/// KNXnet/IP Secure credentials.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SecureConfig {
    #[serde(rename = "BackboneKey", with = "hex_key_16")]
    /// Shared AES-128 key used to secure routing multicast traffic.
    pub backbone_key: [u8; 16],

    #[serde(default, rename = "DeviceAuthenticationPassword")]
    /// Required for tunnelling; absent for routing-only credential sets.
    pub device_authentication_password: Option<String>,

    #[serde(rename = "UserId")]
    /// Tunnelling user index, 1..127 (0 is reserved for management).
    pub user_id: u8,

    #[serde(rename = "UserPassword")]
    pub user_password: String,

    #[serde(default = "default_latency_tolerance_ms", rename = "LatencyToleranceMs")]
    pub latency_tolerance_ms: u64,
}

fn default_latency_tolerance_ms() -> u64 {
    DEFAULT_LATENCY_TOLERANCE_MS
}

/// Runtime-only settings that do not map to a KNXnet/IP protocol field.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RuntimeConfig {
    #[serde(default = "default_connect_timeout", rename = "ConnectTimeout", with = "serde_secs")]
    /// Timeout for establishing the transport (TCP connect / UDP bind).
    pub connect_timeout: Duration,

    #[serde(default = "default_queue_capacity", rename = "TelegramQueueCapacity")]
    pub telegram_queue_capacity: usize,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_queue_capacity() -> usize {
    DEFAULT_TELEGRAM_QUEUE_CAPACITY
}

impl Config {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let mut cfg: Config = serde_yaml::from_str(&s).context("failed to parse config YAML")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    /// Validates invariants and eagerly parses fields whose textual form
    /// might be malformed, so callers fail fast at load time rather than at
    /// first use.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        self.connection.individual_address()?;
        self.connection.multicast_group()?;
        self.connection.local_if()?;
        if self.connection.mode.is_tunnelling() {
            self.connection.gateway_addr()?;
        }

        if let Some(secure) = &self.secure {
            ensure!((1..=127).contains(&secure.user_id), "UserId must be in 1..=127");
            if self.connection.mode.is_tunnelling() {
                ensure!(
                    secure.device_authentication_password.is_some(),
                    "DeviceAuthenticationPassword is required for a secure tunnelling connection"
                );
            }
        } else {
            ensure!(
                !self.connection.mode.is_secure(),
                "connection mode {} requires a [secure] section",
                self.connection.mode
            );
        }

        ensure!(self.runtime.telegram_queue_capacity >= 1, "TelegramQueueCapacity must be >= 1");
        Ok(())
    }
}

/// Serde helper representing a `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serde helper representing a 16-byte key as a hex string on the wire.
mod hex_key_16 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; 16], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 16], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes.try_into().map_err(|_| serde::de::Error::custom("BackboneKey must be exactly 16 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml(mode: &str) -> String {
        format!(
            "connection:\n  Mode: {mode}\n  GatewayIp: 192.168.1.10\nruntime: {{}}\n"
        )
    }

    #[test]
    fn routing_config_loads_with_defaults() {
        let yaml = minimal_yaml("Routing");
        let mut cfg: Config = serde_yaml::from_str(&yaml).expect("parse");
        cfg.validate_and_normalize().expect("validate");
        assert_eq!(cfg.connection.multicast_port, DEFAULT_MCAST_PORT);
        assert_eq!(cfg.connection.individual_address, "15.15.250");
        assert_eq!(cfg.runtime.telegram_queue_capacity, DEFAULT_TELEGRAM_QUEUE_CAPACITY);
    }

    #[test]
    fn secure_mode_without_secure_section_is_rejected() {
        let yaml = minimal_yaml("SecureRouting");
        let mut cfg: Config = serde_yaml::from_str(&yaml).expect("parse");
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn tunnelling_mode_requires_gateway_ip() {
        let yaml = "connection:\n  Mode: TunnellingUDP\nruntime: {}\n";
        let mut cfg: Config = serde_yaml::from_str(yaml).expect("parse");
        assert!(cfg.validate_and_normalize().is_err());
    }

    #[test]
    fn backbone_key_round_trips_through_hex() {
        let secure = SecureConfig {
            backbone_key: [0xAB; 16],
            device_authentication_password: Some("trustme".to_string()),
            user_id: 1,
            user_password: "secret".to_string(),
            latency_tolerance_ms: DEFAULT_LATENCY_TOLERANCE_MS,
        };
        let yaml = serde_yaml::to_string(&secure).expect("serialize");
        let decoded: SecureConfig = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(decoded.backbone_key, secure.backbone_key);
    }
}
