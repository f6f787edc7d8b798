// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The 10-bit Application-layer Protocol Control Information field carried
//! in the last two octets of a CEMI NPDU (KNX 03/03/07 §3).

use crate::error::KnxIpError;

const GROUP_VALUE_READ: u16 = 0b0000_0000_0000_0000;
const GROUP_VALUE_RESPONSE: u16 = 0b0000_0000_0100_0000;
const GROUP_VALUE_WRITE: u16 = 0b0000_0000_1000_0000;
const APCI_COMMAND_MASK: u16 = 0b0000_0000_1100_0000;
const APCI_SMALL_PAYLOAD_MASK: u16 = 0b0000_0000_0011_1111;

/// The application value carried by GroupValueWrite/GroupValueResponse:
/// either a six-bit value packed into the APCI word itself, or 1..=14
/// trailing octets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApciPayload {
    /// 0..=63, packed into the low six bits of the APCI word.
    Small(u8),
    /// 1..=14 bytes following the APCI word.
    Bytes(Vec<u8>),
}

impl ApciPayload {
    pub fn small(value: u8) -> Result<Self, KnxIpError> {
        if value > 0x3F {
            return Err(KnxIpError::Conversion(format!(
                "small APCI payload {value} does not fit in six bits"
            )));
        }
        Ok(ApciPayload::Small(value))
    }

    pub fn bytes(value: Vec<u8>) -> Result<Self, KnxIpError> {
        if value.is_empty() || value.len() > crate::constants::MAX_STANDARD_CEMI_PAYLOAD {
            return Err(KnxIpError::Conversion(format!(
                "APCI byte payload length {} out of range 1..=14",
                value.len()
            )));
        }
        Ok(ApciPayload::Bytes(value))
    }
}

/// The decoded APCI command plus its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Apci {
    GroupValueRead,
    GroupValueWrite(ApciPayload),
    GroupValueResponse(ApciPayload),
}

impl Apci {
    /// Encode into the tpci_apci word plus any trailing payload bytes.
    pub fn encode(&self) -> (u16, Vec<u8>) {
        match self {
            Apci::GroupValueRead => (GROUP_VALUE_READ, Vec::new()),
            Apci::GroupValueWrite(p) => encode_payload(GROUP_VALUE_WRITE, p),
            Apci::GroupValueResponse(p) => encode_payload(GROUP_VALUE_RESPONSE, p),
        }
    }

    /// Number of NPDU bytes this APCI occupies (the `npdu_len` CEMI field):
    /// 1 for the tpci_apci word alone, or `1 + payload.len()` for long
    /// payloads.
    pub fn npdu_len(&self) -> u8 {
        match self {
            Apci::GroupValueRead => 1,
            Apci::GroupValueWrite(ApciPayload::Small(_))
            | Apci::GroupValueResponse(ApciPayload::Small(_)) => 1,
            Apci::GroupValueWrite(ApciPayload::Bytes(b))
            | Apci::GroupValueResponse(ApciPayload::Bytes(b)) => 1 + b.len() as u8,
        }
    }

    /// Decode a tpci_apci word plus any trailing payload bytes that
    /// followed it on the wire (`npdu_len - 1` bytes).
    pub fn decode(tpci_apci: u16, extra: &[u8]) -> Result<Self, KnxIpError> {
        let command = tpci_apci & APCI_COMMAND_MASK;
        let small = (tpci_apci & APCI_SMALL_PAYLOAD_MASK) as u8;

        match command {
            GROUP_VALUE_READ => {
                if !extra.is_empty() {
                    return Err(KnxIpError::Conversion(
                        "GroupValueRead must not carry a payload".into(),
                    ));
                }
                Ok(Apci::GroupValueRead)
            },
            GROUP_VALUE_WRITE => Ok(Apci::GroupValueWrite(decode_payload(small, extra)?)),
            GROUP_VALUE_RESPONSE => {
                Ok(Apci::GroupValueResponse(decode_payload(small, extra)?))
            },
            other => Err(KnxIpError::Conversion(format!(
                "unsupported APCI command bits 0b{other:02b}"
            ))),
        }
    }
}

fn encode_payload(command: u16, payload: &ApciPayload) -> (u16, Vec<u8>) {
    match payload {
        ApciPayload::Small(v) => (command | (*v as u16 & APCI_SMALL_PAYLOAD_MASK), Vec::new()),
        ApciPayload::Bytes(b) => (command, b.clone()),
    }
}

fn decode_payload(small: u8, extra: &[u8]) -> Result<ApciPayload, KnxIpError> {
    if extra.is_empty() {
        Ok(ApciPayload::Small(small))
    } else {
        ApciPayload::bytes(extra.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_value_write_small_produces_0x81_last_byte() {
        // DPTBinary(1) written to a group address: last byte of the CEMI
        // frame is the low byte of tpci_apci, 0x81.
        let apci = Apci::GroupValueWrite(ApciPayload::small(1).expect("small"));
        let (word, extra) = apci.encode();
        assert_eq!(word & 0xFF, 0x81);
        assert!(extra.is_empty());
        assert_eq!(apci.npdu_len(), 1);
    }

    #[test]
    fn group_value_read_round_trips() {
        let apci = Apci::GroupValueRead;
        let (word, extra) = apci.encode();
        assert_eq!(word, 0);
        let decoded = Apci::decode(word, &extra).expect("decode");
        assert_eq!(decoded, apci);
    }

    #[test]
    fn group_value_write_long_payload_round_trips() {
        let payload = ApciPayload::bytes(vec![1, 2, 3, 4]).expect("bytes");
        let apci = Apci::GroupValueWrite(payload);
        let (word, extra) = apci.encode();
        assert_eq!(extra, vec![1, 2, 3, 4]);
        assert_eq!(apci.npdu_len(), 5);
        let decoded = Apci::decode(word, &extra).expect("decode");
        assert_eq!(decoded, apci);
    }

    #[test]
    fn reject_small_payload_over_six_bits() {
        assert!(ApciPayload::small(64).is_err());
    }

    #[test]
    fn reject_empty_byte_payload() {
        assert!(ApciPayload::bytes(Vec::new()).is_err());
    }

    #[test]
    fn reject_oversized_byte_payload() {
        assert!(ApciPayload::bytes(vec![0u8; 15]).is_err());
    }

    #[test]
    fn group_value_response_round_trips() {
        let payload = ApciPayload::small(42).expect("small");
        let apci = Apci::GroupValueResponse(payload);
        let (word, extra) = apci.encode();
        let decoded = Apci::decode(word, &extra).expect("decode");
        assert_eq!(decoded, apci);
    }
}
