// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CEMI (Common External Message Interface) codec: the data-link frame
//! embedded in Routing/Tunnelling/DeviceConfiguration KNX/IP bodies.
//!
//! `L_Data_req`/`L_Data_ind`/`L_Data_con` are decoded structurally (control
//! fields, addresses, APCI); `L_Poll_Data` and `L_Raw` variants, and any
//! message code this implementation does not otherwise recognize, are kept
//! as an opaque byte blob so that `decode(encode(x)) == x` still holds for
//! them even though the state machines never construct one.

use crate::{
    address::{GroupAddress, IndividualAddress, KnxAddress},
    apci::Apci,
    error::KnxIpError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    LDataReq,
    LDataCon,
    LDataInd,
    LPollDataReq,
    LPollDataCon,
    LRawReq,
    LRawInd,
    LRawCon,
    Unknown(u8),
}

impl MessageCode {
    pub fn from_u8(b: u8) -> Self {
        match b {
            0x11 => Self::LDataReq,
            0x2E => Self::LDataCon,
            0x29 => Self::LDataInd,
            0x13 => Self::LPollDataReq,
            0x25 => Self::LPollDataCon,
            0x10 => Self::LRawReq,
            0x2D => Self::LRawInd,
            0x2F => Self::LRawCon,
            other => Self::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::LDataReq => 0x11,
            Self::LDataCon => 0x2E,
            Self::LDataInd => 0x29,
            Self::LPollDataReq => 0x13,
            Self::LPollDataCon => 0x25,
            Self::LRawReq => 0x10,
            Self::LRawInd => 0x2D,
            Self::LRawCon => 0x2F,
            Self::Unknown(b) => b,
        }
    }

    pub fn is_l_data(self) -> bool {
        matches!(self, Self::LDataReq | Self::LDataCon | Self::LDataInd)
    }
}

/// KNX transmission priority (control field 1, bits 3-2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    System = 0b00,
    Alarm = 0b01,
    High = 0b10,
    #[default]
    Low = 0b11,
}

impl Priority {
    fn from_bits(b: u8) -> Self {
        match b & 0b11 {
            0b00 => Self::System,
            0b01 => Self::Alarm,
            0b10 => Self::High,
            _ => Self::Low,
        }
    }
}

/// Control field 1: frame type, repeat, broadcast, priority, ack request,
/// confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctrl1 {
    /// `true` = standard frame, `false` = extended frame.
    pub standard_frame: bool,
    /// `true` = the sender will not repeat this frame on a bus error.
    pub do_not_repeat: bool,
    /// `true` = normal (domain) broadcast, `false` = system broadcast.
    pub broadcast: bool,
    pub priority: Priority,
    pub ack_requested: bool,
    /// `true` = no error (only meaningful on `L_Data_con`).
    pub confirm_ok: bool,
}

impl Default for Ctrl1 {
    fn default() -> Self {
        Self {
            standard_frame: true,
            do_not_repeat: true,
            broadcast: true,
            priority: Priority::Low,
            ack_requested: false,
            confirm_ok: true,
        }
    }
}

impl Ctrl1 {
    pub fn encode(self) -> u8 {
        let mut b = 0u8;
        if self.standard_frame {
            b |= 0b1000_0000;
        }
        b |= 0b0100_0000; // reserved, always set
        if self.do_not_repeat {
            b |= 0b0010_0000;
        }
        if self.broadcast {
            b |= 0b0001_0000;
        }
        b |= (self.priority as u8) << 2;
        if self.ack_requested {
            b |= 0b0000_0010;
        }
        if self.confirm_ok {
            b |= 0b0000_0001;
        }
        b
    }

    pub fn decode(b: u8) -> Self {
        Self {
            standard_frame: b & 0b1000_0000 != 0,
            do_not_repeat: b & 0b0010_0000 != 0,
            broadcast: b & 0b0001_0000 != 0,
            priority: Priority::from_bits(b >> 2),
            ack_requested: b & 0b0000_0010 != 0,
            confirm_ok: b & 0b0000_0001 != 0,
        }
    }
}

/// Control field 2: destination address type, hop count, extended frame
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ctrl2 {
    /// `true` = destination is a group address, `false` = individual.
    pub destination_is_group: bool,
    pub hop_count: u8,
    pub extended_frame_format: u8,
}

impl Default for Ctrl2 {
    fn default() -> Self {
        Self {
            destination_is_group: true,
            hop_count: 6,
            extended_frame_format: 0,
        }
    }
}

impl Ctrl2 {
    pub fn encode(self) -> u8 {
        let mut b = 0u8;
        if self.destination_is_group {
            b |= 0b1000_0000;
        }
        b |= (self.hop_count & 0b111) << 4;
        b |= self.extended_frame_format & 0b1111;
        b
    }

    pub fn decode(b: u8) -> Self {
        Self {
            destination_is_group: b & 0b1000_0000 != 0,
            hop_count: (b >> 4) & 0b111,
            extended_frame_format: b & 0b1111,
        }
    }
}

/// The structured body of an `L_Data_req`/`L_Data_con`/`L_Data_ind` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LData {
    pub ctrl1: Ctrl1,
    pub ctrl2: Ctrl2,
    pub source: IndividualAddress,
    pub destination: KnxAddress,
    pub apci: Apci,
}

impl LData {
    pub fn encode(&self) -> Vec<u8> {
        let (tpci_apci, extra) = self.apci.encode();
        let mut out = Vec::with_capacity(9 + extra.len());
        out.push(self.ctrl1.encode());
        out.push(self.ctrl2.encode());
        out.extend_from_slice(&self.source.raw().to_be_bytes());
        out.extend_from_slice(&self.destination.raw().to_be_bytes());
        out.push(self.apci.npdu_len());
        out.extend_from_slice(&tpci_apci.to_be_bytes());
        out.extend_from_slice(&extra);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "cemi::LData",
            reason: reason.to_string(),
        };
        if bytes.len() < 9 {
            return Err(fail("frame shorter than the fixed 9-byte L_Data body"));
        }
        let ctrl1 = Ctrl1::decode(bytes[0]);
        let ctrl2 = Ctrl2::decode(bytes[1]);
        let source = IndividualAddress::from_raw(u16::from_be_bytes([bytes[2], bytes[3]]));
        let dest_raw = u16::from_be_bytes([bytes[4], bytes[5]]);
        let destination = if ctrl2.destination_is_group {
            KnxAddress::Group(GroupAddress::from_raw(dest_raw))
        } else {
            KnxAddress::Individual(IndividualAddress::from_raw(dest_raw))
        };
        let npdu_len = bytes[6] as usize;
        if npdu_len == 0 {
            return Err(fail("npdu_len must be at least 1"));
        }
        let extra_len = npdu_len - 1;
        let expected_total = 9 + extra_len;
        if bytes.len() != expected_total {
            return Err(fail(&format!(
                "npdu_len {npdu_len} implies a body of {expected_total} bytes, got {}",
                bytes.len()
            )));
        }
        let tpci_apci = u16::from_be_bytes([bytes[7], bytes[8]]);
        let extra = &bytes[9..9 + extra_len];
        let apci = Apci::decode(tpci_apci, extra)
            .map_err(|e| fail(&format!("invalid APCI: {e}")))?;
        if apci.npdu_len() as usize != npdu_len {
            return Err(fail("npdu_len does not match the encoded APCI length"));
        }
        Ok(Self {
            ctrl1,
            ctrl2,
            source,
            destination,
            apci,
        })
    }
}

/// The body of a CEMI frame: structured for `L_Data_*`, opaque for
/// everything else (the codec still round-trips these bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CemiBody {
    LData(LData),
    Opaque(Vec<u8>),
}

/// A full CEMI frame as carried inside Routing/Tunnelling/DeviceConfig
/// KNX/IP bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CemiFrame {
    pub message_code: MessageCode,
    pub additional_info: Vec<u8>,
    pub body: CemiBody,
}

impl CemiFrame {
    /// Build an outgoing `L_Data_req` with the usual default flags
    /// (standard frame, do-not-repeat, normal broadcast, low priority, no
    /// ack requested, hop count 6, group destination).
    pub fn l_data_req(
        source: IndividualAddress,
        destination: GroupAddress,
        apci: Apci,
    ) -> Self {
        Self {
            message_code: MessageCode::LDataReq,
            additional_info: Vec::new(),
            body: CemiBody::LData(LData {
                ctrl1: Ctrl1::default(),
                ctrl2: Ctrl2::default(),
                source,
                destination: KnxAddress::Group(destination),
                apci,
            }),
        }
    }

    /// Build an `L_Data_ind`, as Routing sends and Tunnelling delivers
    /// incoming group telegrams.
    pub fn l_data_ind(
        source: IndividualAddress,
        destination: KnxAddress,
        apci: Apci,
    ) -> Self {
        Self {
            message_code: MessageCode::LDataInd,
            additional_info: Vec::new(),
            body: CemiBody::LData(LData {
                ctrl1: Ctrl1::default(),
                ctrl2: Ctrl2 {
                    destination_is_group: matches!(destination, KnxAddress::Group(_)),
                    ..Ctrl2::default()
                },
                source,
                destination,
                apci,
            }),
        }
    }

    /// Build a local `L_Data_con` confirmation mirroring a sent request.
    pub fn l_data_con(source: IndividualAddress, destination: KnxAddress, apci: Apci) -> Self {
        Self {
            message_code: MessageCode::LDataCon,
            additional_info: Vec::new(),
            body: CemiBody::LData(LData {
                ctrl1: Ctrl1::default(),
                ctrl2: Ctrl2 {
                    destination_is_group: matches!(destination, KnxAddress::Group(_)),
                    ..Ctrl2::default()
                },
                source,
                destination,
                apci,
            }),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.message_code.to_u8());
        out.push(self.additional_info.len() as u8);
        out.extend_from_slice(&self.additional_info);
        match &self.body {
            CemiBody::LData(d) => out.extend_from_slice(&d.encode()),
            CemiBody::Opaque(raw) => out.extend_from_slice(raw),
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "cemi::CemiFrame",
            reason: reason.to_string(),
        };
        if bytes.len() < 2 {
            return Err(fail("frame shorter than the 2-byte message code + add_info_len header"));
        }
        let message_code = MessageCode::from_u8(bytes[0]);
        let add_info_len = bytes[1] as usize;
        if bytes.len() < 2 + add_info_len {
            return Err(fail("additional_info length exceeds the frame"));
        }
        let additional_info = bytes[2..2 + add_info_len].to_vec();
        let rest = &bytes[2 + add_info_len..];

        let body = if message_code.is_l_data() {
            CemiBody::LData(LData::decode(rest)?)
        } else {
            CemiBody::Opaque(rest.to_vec())
        };

        Ok(Self {
            message_code,
            additional_info,
            body,
        })
    }

    /// The APCI carried by an `L_Data_*` frame, if this is one.
    pub fn apci(&self) -> Option<&Apci> {
        match &self.body {
            CemiBody::LData(d) => Some(&d.apci),
            CemiBody::Opaque(_) => None,
        }
    }
}
