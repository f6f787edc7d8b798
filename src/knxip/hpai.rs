// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Host Protocol Address Information: an 8-byte `(protocol, ip, port)`
//! endpoint descriptor embedded throughout the KNX/IP service bodies.

use std::net::Ipv4Addr;

use crate::error::KnxIpError;

pub const STRUCTURE_LEN: u8 = 0x08;
pub const HOST_PROTOCOL_UDP: u8 = 0x01;
pub const HOST_PROTOCOL_TCP: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hpai {
    pub host_protocol: u8,
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl Hpai {
    /// The all-zero "route back" HPAI: tells the gateway to reuse the
    /// address the request arrived from instead of an advertised one.
    pub const ROUTE_BACK: Hpai = Hpai {
        host_protocol: HOST_PROTOCOL_UDP,
        ip: Ipv4Addr::UNSPECIFIED,
        port: 0,
    };

    pub fn udp(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: HOST_PROTOCOL_UDP,
            ip,
            port,
        }
    }

    pub fn tcp(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            host_protocol: HOST_PROTOCOL_TCP,
            ip,
            port,
        }
    }

    pub fn is_route_back(&self) -> bool {
        self.ip.is_unspecified() && self.port == 0
    }

    pub fn encode(&self) -> [u8; 8] {
        let octets = self.ip.octets();
        let port = self.port.to_be_bytes();
        [
            STRUCTURE_LEN,
            self.host_protocol,
            octets[0],
            octets[1],
            octets[2],
            octets[3],
            port[0],
            port[1],
        ]
    }

    /// Decode an HPAI at the front of `bytes`, returning it and the number
    /// of bytes consumed (its own `structure_length`).
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "knxip::hpai",
            reason: reason.to_string(),
        };
        if bytes.len() < 8 {
            return Err(fail("HPAI needs 8 bytes"));
        }
        let len = bytes[0];
        if len != STRUCTURE_LEN {
            return Err(fail(&format!("unexpected HPAI structure_length {len}")));
        }
        let host_protocol = bytes[1];
        let ip = Ipv4Addr::new(bytes[2], bytes[3], bytes[4], bytes[5]);
        let port = u16::from_be_bytes([bytes[6], bytes[7]]);
        Ok((
            Self {
                host_protocol,
                ip,
                port,
            },
            8,
        ))
    }
}
