// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Search Request Parameters: the optional TLV selectors attached to a
//! `SearchRequestExtended` (programming mode, MAC address, service
//! family version, requested DIB list).

use crate::error::KnxIpError;

pub const SELECT_BY_PROGRAMMING_MODE: u8 = 0x01;
pub const SELECT_BY_MAC_ADDRESS: u8 = 0x02;
pub const SELECT_BY_SERVICE: u8 = 0x03;
pub const REQUEST_DIBS: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srp {
    pub srp_type: u8,
    /// Set when this selector is mandatory for the responder to honor.
    pub mandatory: bool,
    pub data: Vec<u8>,
}

impl Srp {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        let len = 2 + self.data.len();
        out.push(len as u8);
        let mut type_byte = self.srp_type & 0x7F;
        if self.mandatory {
            type_byte |= 0x80;
        }
        out.push(type_byte);
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "knxip::srp",
            reason: reason.to_string(),
        };
        if bytes.len() < 2 {
            return Err(fail("SRP needs at least 2 bytes"));
        }
        let len = bytes[0] as usize;
        if len < 2 || bytes.len() < len {
            return Err(fail("SRP structure_length out of range"));
        }
        let type_byte = bytes[1];
        Ok((
            Self {
                srp_type: type_byte & 0x7F,
                mandatory: type_byte & 0x80 != 0,
                data: bytes[2..len].to_vec(),
            },
            len,
        ))
    }

    pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Self>, KnxIpError> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            let (srp, consumed) = Srp::decode(bytes)?;
            out.push(srp);
            bytes = &bytes[consumed..];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let srp = Srp {
            srp_type: SELECT_BY_PROGRAMMING_MODE,
            mandatory: true,
            data: vec![],
        };
        let encoded = srp.encode();
        assert_eq!(encoded, vec![0x02, 0x81]);
        let (decoded, consumed) = Srp::decode(&encoded).expect("decode");
        assert_eq!(decoded, srp);
        assert_eq!(consumed, 2);
    }
}
