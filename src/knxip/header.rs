// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The fixed 6-byte KNXnet/IP header that precedes every frame body.

use crate::error::KnxIpError;

pub const HEADER_LEN: u8 = 0x06;
pub const PROTOCOL_VERSION: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnxIpHeader {
    pub service_type: u16,
    /// Total frame length (header + body), as carried on the wire.
    pub total_length: u16,
}

impl KnxIpHeader {
    pub fn new(service_type: u16, body_len: usize) -> Self {
        Self {
            service_type,
            total_length: HEADER_LEN as u16 + body_len as u16,
        }
    }

    pub fn encode(&self) -> [u8; 6] {
        let st = self.service_type.to_be_bytes();
        let tl = self.total_length.to_be_bytes();
        [HEADER_LEN, PROTOCOL_VERSION, st[0], st[1], tl[0], tl[1]]
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KnxIpError> {
        if bytes.len() < 6 {
            return Err(KnxIpError::IncompleteFrame {
                needed: 6 - bytes.len(),
            });
        }
        let header_len = bytes[0];
        let version = bytes[1];
        if header_len != HEADER_LEN {
            return Err(KnxIpError::KnxIpParse {
                context: "knxip::header",
                reason: format!("unexpected header length {header_len}"),
            });
        }
        if version != PROTOCOL_VERSION {
            return Err(KnxIpError::KnxIpParse {
                context: "knxip::header",
                reason: format!("unsupported protocol version 0x{version:02x}"),
            });
        }
        let service_type = u16::from_be_bytes([bytes[2], bytes[3]]);
        let total_length = u16::from_be_bytes([bytes[4], bytes[5]]);
        Ok(Self {
            service_type,
            total_length,
        })
    }

    pub fn body_len(&self) -> usize {
        self.total_length.saturating_sub(HEADER_LEN as u16) as usize
    }
}
