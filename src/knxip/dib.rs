// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Description Information Blocks: the self-describing TLV structures
//! carried in SearchResponse/DescriptionResponse bodies.

use std::net::Ipv4Addr;

use crate::error::KnxIpError;

pub const DEVICE_INFO: u8 = 0x01;
pub const SUPP_SVC_FAMILIES: u8 = 0x02;

/// KNXnet/IP service families as listed in a `DIB_SUPP_SVC_FAMILIES` block.
pub const FAMILY_CORE: u8 = 0x02;
pub const FAMILY_DEVICE_MANAGEMENT: u8 = 0x03;
pub const FAMILY_TUNNELLING: u8 = 0x04;
pub const FAMILY_ROUTING: u8 = 0x05;
pub const FAMILY_REMOTE_LOGGING: u8 = 0x06;
pub const FAMILY_REMOTE_CONFIG_DIAG: u8 = 0x07;
pub const FAMILY_OBJECT_SERVER: u8 = 0x08;
pub const FAMILY_SECURE: u8 = 0x09;

const FRIENDLY_NAME_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInformation {
    pub knx_medium: u8,
    pub device_status: u8,
    pub individual_address_raw: u16,
    pub project_installation_id: u16,
    pub serial_number: [u8; 6],
    pub multicast_address: Ipv4Addr,
    pub mac_address: [u8; 6],
    pub friendly_name: String,
}

impl DeviceInformation {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(54);
        out.push(54u8);
        out.push(DEVICE_INFO);
        out.push(self.knx_medium);
        out.push(self.device_status);
        out.extend_from_slice(&self.individual_address_raw.to_be_bytes());
        out.extend_from_slice(&self.project_installation_id.to_be_bytes());
        out.extend_from_slice(&self.serial_number);
        out.extend_from_slice(&self.multicast_address.octets());
        out.extend_from_slice(&self.mac_address);
        let mut name_bytes = [0u8; FRIENDLY_NAME_LEN];
        let src = self.friendly_name.as_bytes();
        let n = src.len().min(FRIENDLY_NAME_LEN);
        name_bytes[..n].copy_from_slice(&src[..n]);
        out.extend_from_slice(&name_bytes);
        out
    }

    fn decode(body: &[u8]) -> Result<Self, KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "knxip::dib::DeviceInformation",
            reason: reason.to_string(),
        };
        if body.len() != 52 {
            return Err(fail("DeviceInformation DIB payload must be 52 bytes"));
        }
        let knx_medium = body[0];
        let device_status = body[1];
        let individual_address_raw = u16::from_be_bytes([body[2], body[3]]);
        let project_installation_id = u16::from_be_bytes([body[4], body[5]]);
        let serial_number = body[6..12].try_into().unwrap();
        let multicast_address = Ipv4Addr::new(body[12], body[13], body[14], body[15]);
        let mac_address = body[16..22].try_into().unwrap();
        let name_end = body[22..52]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FRIENDLY_NAME_LEN);
        let friendly_name = String::from_utf8_lossy(&body[22..22 + name_end]).into_owned();
        Ok(Self {
            knx_medium,
            device_status,
            individual_address_raw,
            project_installation_id,
            serial_number,
            multicast_address,
            mac_address,
            friendly_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuppSvcFamilies {
    /// `(family_id, version)` pairs.
    pub families: Vec<(u8, u8)>,
}

impl SuppSvcFamilies {
    pub fn supports(&self, family_id: u8) -> bool {
        self.families.iter().any(|(id, _)| *id == family_id)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.families.len() * 2);
        let len = 2 + self.families.len() * 2;
        out.push(len as u8);
        out.push(SUPP_SVC_FAMILIES);
        for (id, version) in &self.families {
            out.push(*id);
            out.push(*version);
        }
        out
    }

    fn decode(body: &[u8]) -> Result<Self, KnxIpError> {
        if body.len() % 2 != 0 {
            return Err(KnxIpError::KnxIpParse {
                context: "knxip::dib::SuppSvcFamilies",
                reason: "family list must be an even number of bytes".into(),
            });
        }
        let families = body.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        Ok(Self { families })
    }
}

/// Any DIB, preserving unrecognized description types verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dib {
    DeviceInformation(DeviceInformation),
    SuppSvcFamilies(SuppSvcFamilies),
    Other { description_type: u8, data: Vec<u8> },
}

impl Dib {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Dib::DeviceInformation(d) => d.encode(),
            Dib::SuppSvcFamilies(s) => s.encode(),
            Dib::Other {
                description_type,
                data,
            } => {
                let mut out = Vec::with_capacity(2 + data.len());
                out.push((2 + data.len()) as u8);
                out.push(*description_type);
                out.extend_from_slice(data);
                out
            },
        }
    }

    /// Decode one DIB at the front of `bytes`, returning it and the number
    /// of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), KnxIpError> {
        let fail = |reason: &str| KnxIpError::KnxIpParse {
            context: "knxip::dib",
            reason: reason.to_string(),
        };
        if bytes.len() < 2 {
            return Err(fail("DIB needs at least 2 bytes"));
        }
        let len = bytes[0] as usize;
        if len < 2 || bytes.len() < len {
            return Err(fail("DIB structure_length out of range"));
        }
        let description_type = bytes[1];
        let payload = &bytes[2..len];
        let dib = match description_type {
            DEVICE_INFO => Dib::DeviceInformation(DeviceInformation::decode(payload)?),
            SUPP_SVC_FAMILIES => Dib::SuppSvcFamilies(SuppSvcFamilies::decode(payload)?),
            other => Dib::Other {
                description_type: other,
                data: payload.to_vec(),
            },
        };
        Ok((dib, len))
    }

    /// Decode every DIB found in `bytes` until it is exhausted.
    pub fn decode_all(mut bytes: &[u8]) -> Result<Vec<Self>, KnxIpError> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            let (dib, consumed) = Dib::decode(bytes)?;
            out.push(dib);
            bytes = &bytes[consumed..];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_information_round_trips() {
        let info = DeviceInformation {
            knx_medium: 0x02,
            device_status: 0x00,
            individual_address_raw: 0x11FF,
            project_installation_id: 0x0000,
            serial_number: [0, 0, 0, 0, 0, 1],
            multicast_address: Ipv4Addr::new(224, 0, 23, 12),
            mac_address: [0, 1, 2, 3, 4, 5],
            friendly_name: "Gira KNX/IP-Router".to_string(),
        };
        let dib = Dib::DeviceInformation(info);
        let encoded = dib.encode();
        assert_eq!(encoded.len(), 54);
        let (decoded, consumed) = Dib::decode(&encoded).expect("decode");
        assert_eq!(decoded, dib);
        assert_eq!(consumed, 54);
    }

    #[test]
    fn supp_svc_families_supports() {
        let supp = SuppSvcFamilies {
            families: vec![(FAMILY_CORE, 1), (FAMILY_TUNNELLING, 1), (FAMILY_ROUTING, 2)],
        };
        assert!(supp.supports(FAMILY_TUNNELLING));
        assert!(supp.supports(FAMILY_ROUTING));
        assert!(!supp.supports(FAMILY_OBJECT_SERVER));
        let encoded = supp.encode();
        let (decoded, _) = Dib::decode(&encoded).expect("decode");
        assert_eq!(decoded, Dib::SuppSvcFamilies(supp));
    }

    #[test]
    fn decode_all_walks_concatenated_dibs() {
        let a = Dib::SuppSvcFamilies(SuppSvcFamilies {
            families: vec![(FAMILY_CORE, 1)],
        });
        let b = Dib::Other {
            description_type: 0x99,
            data: vec![1, 2, 3],
        };
        let mut bytes = a.encode();
        bytes.extend_from_slice(&b.encode());
        let all = Dib::decode_all(&bytes).expect("decode_all");
        assert_eq!(all, vec![a, b]);
    }
}
