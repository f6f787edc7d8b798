// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The service-type-specific bodies carried after a [`KnxIpHeader`].
//!
//! Each service type gets its own variant in [`KnxIpBody`] rather than a
//! dynamically dispatched body class: the header's `service_type` is
//! redundant with the variant tag but is still written to the wire, since
//! the standard requires it.

use crate::{
    cemi::CemiFrame,
    error::KnxIpError,
    knxip::{
        cri_crd::{Cri, Crd},
        dib::Dib,
        hpai::Hpai,
        service::*,
        header::KnxIpHeader,
        srp::Srp,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub control_endpoint: Hpai,
    pub data_endpoint: Hpai,
    pub cri: Cri,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub channel: u8,
    pub status: u8,
    /// Absent when `status != E_NO_ERROR`.
    pub data_endpoint: Option<Hpai>,
    pub crd: Option<Crd>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateRequest {
    pub channel: u8,
    pub control_endpoint: Hpai,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateResponse {
    pub channel: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub channel: u8,
    pub control_endpoint: Hpai,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectResponse {
    pub channel: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnellingRequest {
    pub channel: u8,
    pub sequence_counter: u8,
    pub cemi: CemiFrame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnellingAck {
    pub channel: u8,
    pub sequence_counter: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnellingFeature {
    pub channel: u8,
    pub sequence_counter: u8,
    pub feature_identifier: u8,
    pub return_code: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfigurationRequest {
    pub channel: u8,
    pub sequence_counter: u8,
    pub cemi: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfigurationAck {
    pub channel: u8,
    pub sequence_counter: u8,
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingLostMessage {
    pub device_state: u8,
    pub lost_message_count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingBusy {
    pub device_state: u8,
    pub wait_time_ms: u16,
    pub control_field: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureWrapper {
    pub session_id: u16,
    pub sequence_info: [u8; 6],
    pub serial: [u8; 6],
    pub msg_tag: u16,
    pub encrypted_data: Vec<u8>,
    pub mac: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub control_endpoint: Hpai,
    pub client_public_key: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResponse {
    pub session_id: u16,
    pub server_public_key: [u8; 32],
    pub mac: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAuthenticate {
    pub user_id: u8,
    pub mac: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerNotify {
    pub timer_value: [u8; 6],
    pub serial: [u8; 6],
    pub msg_tag: u16,
    pub mac: [u8; 16],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KnxIpBody {
    SearchRequest { discovery_endpoint: Hpai },
    SearchResponse { control_endpoint: Hpai, dibs: Vec<Dib> },
    SearchRequestExtended { discovery_endpoint: Hpai, srps: Vec<Srp> },
    SearchResponseExtended { control_endpoint: Hpai, dibs: Vec<Dib> },
    DescriptionRequest { control_endpoint: Hpai },
    DescriptionResponse { dibs: Vec<Dib> },
    ConnectRequest(ConnectRequest),
    ConnectResponse(ConnectResponse),
    ConnectionStateRequest(ConnectionStateRequest),
    ConnectionStateResponse(ConnectionStateResponse),
    DisconnectRequest(DisconnectRequest),
    DisconnectResponse(DisconnectResponse),
    TunnellingRequest(TunnellingRequest),
    TunnellingAck(TunnellingAck),
    TunnellingFeatureGet(TunnellingFeature),
    TunnellingFeatureResponse(TunnellingFeature),
    TunnellingFeatureSet(TunnellingFeature),
    TunnellingFeatureInfo(TunnellingFeature),
    DeviceConfigurationRequest(DeviceConfigurationRequest),
    DeviceConfigurationAck(DeviceConfigurationAck),
    RoutingIndication { cemi: CemiFrame },
    RoutingLostMessage(RoutingLostMessage),
    RoutingBusy(RoutingBusy),
    SecureWrapper(SecureWrapper),
    SessionRequest(SessionRequest),
    SessionResponse(SessionResponse),
    SessionAuthenticate(SessionAuthenticate),
    SessionStatus(SessionStatus),
    TimerNotify(TimerNotify),
}

fn parse_err(context: &'static str, reason: impl Into<String>) -> KnxIpError {
    KnxIpError::KnxIpParse {
        context,
        reason: reason.into(),
    }
}

impl KnxIpBody {
    pub fn service_type(&self) -> u16 {
        match self {
            KnxIpBody::SearchRequest { .. } => SEARCH_REQUEST,
            KnxIpBody::SearchResponse { .. } => SEARCH_RESPONSE,
            KnxIpBody::SearchRequestExtended { .. } => SEARCH_REQUEST_EXTENDED,
            KnxIpBody::SearchResponseExtended { .. } => SEARCH_RESPONSE_EXTENDED,
            KnxIpBody::DescriptionRequest { .. } => DESCRIPTION_REQUEST,
            KnxIpBody::DescriptionResponse { .. } => DESCRIPTION_RESPONSE,
            KnxIpBody::ConnectRequest(_) => CONNECT_REQUEST,
            KnxIpBody::ConnectResponse(_) => CONNECT_RESPONSE,
            KnxIpBody::ConnectionStateRequest(_) => CONNECTIONSTATE_REQUEST,
            KnxIpBody::ConnectionStateResponse(_) => CONNECTIONSTATE_RESPONSE,
            KnxIpBody::DisconnectRequest(_) => DISCONNECT_REQUEST,
            KnxIpBody::DisconnectResponse(_) => DISCONNECT_RESPONSE,
            KnxIpBody::TunnellingRequest(_) => TUNNELLING_REQUEST,
            KnxIpBody::TunnellingAck(_) => TUNNELLING_ACK,
            KnxIpBody::TunnellingFeatureGet(_) => TUNNELLING_FEATURE_GET,
            KnxIpBody::TunnellingFeatureResponse(_) => TUNNELLING_FEATURE_RESPONSE,
            KnxIpBody::TunnellingFeatureSet(_) => TUNNELLING_FEATURE_SET,
            KnxIpBody::TunnellingFeatureInfo(_) => TUNNELLING_FEATURE_INFO,
            KnxIpBody::DeviceConfigurationRequest(_) => DEVICE_CONFIGURATION_REQUEST,
            KnxIpBody::DeviceConfigurationAck(_) => DEVICE_CONFIGURATION_ACK,
            KnxIpBody::RoutingIndication { .. } => ROUTING_INDICATION,
            KnxIpBody::RoutingLostMessage(_) => ROUTING_LOST_MESSAGE,
            KnxIpBody::RoutingBusy(_) => ROUTING_BUSY,
            KnxIpBody::SecureWrapper(_) => SECURE_WRAPPER,
            KnxIpBody::SessionRequest(_) => SESSION_REQUEST,
            KnxIpBody::SessionResponse(_) => SESSION_RESPONSE,
            KnxIpBody::SessionAuthenticate(_) => SESSION_AUTHENTICATE,
            KnxIpBody::SessionStatus(_) => SESSION_STATUS,
            KnxIpBody::TimerNotify(_) => TIMER_NOTIFY,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            KnxIpBody::SearchRequest { discovery_endpoint } => {
                discovery_endpoint.encode().to_vec()
            },
            KnxIpBody::SearchResponse { control_endpoint, dibs }
            | KnxIpBody::SearchResponseExtended { control_endpoint, dibs } => {
                let mut out = control_endpoint.encode().to_vec();
                for d in dibs {
                    out.extend_from_slice(&d.encode());
                }
                out
            },
            KnxIpBody::SearchRequestExtended { discovery_endpoint, srps } => {
                let mut out = discovery_endpoint.encode().to_vec();
                for s in srps {
                    out.extend_from_slice(&s.encode());
                }
                out
            },
            KnxIpBody::DescriptionRequest { control_endpoint } => {
                control_endpoint.encode().to_vec()
            },
            KnxIpBody::DescriptionResponse { dibs } => {
                dibs.iter().flat_map(|d| d.encode()).collect()
            },
            KnxIpBody::ConnectRequest(r) => {
                let mut out = r.control_endpoint.encode().to_vec();
                out.extend_from_slice(&r.data_endpoint.encode());
                out.extend_from_slice(&r.cri.encode());
                out
            },
            KnxIpBody::ConnectResponse(r) => {
                let mut out = vec![r.channel, r.status];
                if let Some(ep) = &r.data_endpoint {
                    out.extend_from_slice(&ep.encode());
                }
                if let Some(crd) = &r.crd {
                    out.extend_from_slice(&crd.encode());
                }
                out
            },
            KnxIpBody::ConnectionStateRequest(r) => {
                let mut out = vec![r.channel, 0x00];
                out.extend_from_slice(&r.control_endpoint.encode());
                out
            },
            KnxIpBody::ConnectionStateResponse(r) => vec![r.channel, r.status],
            KnxIpBody::DisconnectRequest(r) => {
                let mut out = vec![r.channel, 0x00];
                out.extend_from_slice(&r.control_endpoint.encode());
                out
            },
            KnxIpBody::DisconnectResponse(r) => vec![r.channel, r.status],
            KnxIpBody::TunnellingRequest(r) => {
                let mut out = vec![0x04, r.channel, r.sequence_counter, 0x00];
                out.extend_from_slice(&r.cemi.encode());
                out
            },
            KnxIpBody::TunnellingAck(r) => {
                vec![0x04, r.channel, r.sequence_counter, r.status]
            },
            KnxIpBody::TunnellingFeatureGet(f)
            | KnxIpBody::TunnellingFeatureResponse(f)
            | KnxIpBody::TunnellingFeatureSet(f)
            | KnxIpBody::TunnellingFeatureInfo(f) => {
                let mut out = vec![0x04, f.channel, f.sequence_counter, 0x00];
                out.push(f.feature_identifier);
                out.push(f.return_code);
                out.extend_from_slice(&f.data);
                out
            },
            KnxIpBody::DeviceConfigurationRequest(r) => {
                let mut out = vec![0x04, r.channel, r.sequence_counter, 0x00];
                out.extend_from_slice(&r.cemi);
                out
            },
            KnxIpBody::DeviceConfigurationAck(r) => {
                vec![0x04, r.channel, r.sequence_counter, r.status]
            },
            KnxIpBody::RoutingIndication { cemi } => cemi.encode(),
            KnxIpBody::RoutingLostMessage(r) => {
                let mut out = vec![0x04, r.device_state];
                out.extend_from_slice(&r.lost_message_count.to_be_bytes());
                out
            },
            KnxIpBody::RoutingBusy(r) => {
                let mut out = vec![0x04, r.device_state];
                out.extend_from_slice(&r.wait_time_ms.to_be_bytes());
                out.extend_from_slice(&r.control_field.to_be_bytes());
                out
            },
            KnxIpBody::SecureWrapper(w) => {
                let mut out = Vec::new();
                out.extend_from_slice(&w.session_id.to_be_bytes());
                out.extend_from_slice(&w.sequence_info);
                out.extend_from_slice(&w.serial);
                out.extend_from_slice(&w.msg_tag.to_be_bytes());
                out.extend_from_slice(&w.encrypted_data);
                out.extend_from_slice(&w.mac);
                out
            },
            KnxIpBody::SessionRequest(r) => {
                let mut out = r.control_endpoint.encode().to_vec();
                out.extend_from_slice(&r.client_public_key);
                out
            },
            KnxIpBody::SessionResponse(r) => {
                let mut out = r.session_id.to_be_bytes().to_vec();
                out.extend_from_slice(&r.server_public_key);
                out.extend_from_slice(&r.mac);
                out
            },
            KnxIpBody::SessionAuthenticate(r) => {
                let mut out = vec![0x00, r.user_id];
                out.extend_from_slice(&r.mac);
                out
            },
            KnxIpBody::SessionStatus(r) => vec![r.status],
            KnxIpBody::TimerNotify(r) => {
                let mut out = r.timer_value.to_vec();
                out.extend_from_slice(&r.serial);
                out.extend_from_slice(&r.msg_tag.to_be_bytes());
                out.extend_from_slice(&r.mac);
                out
            },
        }
    }

    pub fn decode(service_type: u16, body: &[u8]) -> Result<Self, KnxIpError> {
        match service_type {
            SEARCH_REQUEST => {
                let (discovery_endpoint, _) = Hpai::decode(body)?;
                Ok(KnxIpBody::SearchRequest { discovery_endpoint })
            },
            SEARCH_RESPONSE => {
                let (control_endpoint, n) = Hpai::decode(body)?;
                let dibs = Dib::decode_all(&body[n..])?;
                Ok(KnxIpBody::SearchResponse { control_endpoint, dibs })
            },
            SEARCH_REQUEST_EXTENDED => {
                let (discovery_endpoint, n) = Hpai::decode(body)?;
                let srps = Srp::decode_all(&body[n..])?;
                Ok(KnxIpBody::SearchRequestExtended { discovery_endpoint, srps })
            },
            SEARCH_RESPONSE_EXTENDED => {
                let (control_endpoint, n) = Hpai::decode(body)?;
                let dibs = Dib::decode_all(&body[n..])?;
                Ok(KnxIpBody::SearchResponseExtended { control_endpoint, dibs })
            },
            DESCRIPTION_REQUEST => {
                let (control_endpoint, _) = Hpai::decode(body)?;
                Ok(KnxIpBody::DescriptionRequest { control_endpoint })
            },
            DESCRIPTION_RESPONSE => {
                let dibs = Dib::decode_all(body)?;
                Ok(KnxIpBody::DescriptionResponse { dibs })
            },
            CONNECT_REQUEST => {
                let (control_endpoint, n1) = Hpai::decode(body)?;
                let (data_endpoint, n2) = Hpai::decode(&body[n1..])?;
                let (cri, _) = Cri::decode(&body[n1 + n2..])?;
                Ok(KnxIpBody::ConnectRequest(ConnectRequest {
                    control_endpoint,
                    data_endpoint,
                    cri,
                }))
            },
            CONNECT_RESPONSE => {
                if body.len() < 2 {
                    return Err(parse_err("knxip::body::ConnectResponse", "too short"));
                }
                let channel = body[0];
                let status = body[1];
                let rest = &body[2..];
                let (data_endpoint, crd) = if rest.is_empty() {
                    (None, None)
                } else {
                    let (ep, n) = Hpai::decode(rest)?;
                    let (crd, _) = Crd::decode(&rest[n..])?;
                    (Some(ep), Some(crd))
                };
                Ok(KnxIpBody::ConnectResponse(ConnectResponse {
                    channel,
                    status,
                    data_endpoint,
                    crd,
                }))
            },
            CONNECTIONSTATE_REQUEST => {
                if body.len() < 2 {
                    return Err(parse_err("knxip::body::ConnectionStateRequest", "too short"));
                }
                let channel = body[0];
                let (control_endpoint, _) = Hpai::decode(&body[2..])?;
                Ok(KnxIpBody::ConnectionStateRequest(ConnectionStateRequest {
                    channel,
                    control_endpoint,
                }))
            },
            CONNECTIONSTATE_RESPONSE => {
                if body.len() < 2 {
                    return Err(parse_err("knxip::body::ConnectionStateResponse", "too short"));
                }
                Ok(KnxIpBody::ConnectionStateResponse(ConnectionStateResponse {
                    channel: body[0],
                    status: body[1],
                }))
            },
            DISCONNECT_REQUEST => {
                if body.len() < 2 {
                    return Err(parse_err("knxip::body::DisconnectRequest", "too short"));
                }
                let channel = body[0];
                let (control_endpoint, _) = Hpai::decode(&body[2..])?;
                Ok(KnxIpBody::DisconnectRequest(DisconnectRequest {
                    channel,
                    control_endpoint,
                }))
            },
            DISCONNECT_RESPONSE => {
                if body.len() < 2 {
                    return Err(parse_err("knxip::body::DisconnectResponse", "too short"));
                }
                Ok(KnxIpBody::DisconnectResponse(DisconnectResponse {
                    channel: body[0],
                    status: body[1],
                }))
            },
            TUNNELLING_REQUEST => {
                if body.len() < 4 {
                    return Err(parse_err("knxip::body::TunnellingRequest", "too short"));
                }
                let cemi = CemiFrame::decode(&body[4..])?;
                Ok(KnxIpBody::TunnellingRequest(TunnellingRequest {
                    channel: body[1],
                    sequence_counter: body[2],
                    cemi,
                }))
            },
            TUNNELLING_ACK => {
                if body.len() != 4 {
                    return Err(parse_err("knxip::body::TunnellingAck", "must be 4 bytes"));
                }
                Ok(KnxIpBody::TunnellingAck(TunnellingAck {
                    channel: body[1],
                    sequence_counter: body[2],
                    status: body[3],
                }))
            },
            TUNNELLING_FEATURE_GET
            | TUNNELLING_FEATURE_RESPONSE
            | TUNNELLING_FEATURE_SET
            | TUNNELLING_FEATURE_INFO => {
                if body.len() < 6 {
                    return Err(parse_err("knxip::body::TunnellingFeature", "too short"));
                }
                let feature = TunnellingFeature {
                    channel: body[1],
                    sequence_counter: body[2],
                    feature_identifier: body[4],
                    return_code: body[5],
                    data: body[6..].to_vec(),
                };
                Ok(match service_type {
                    TUNNELLING_FEATURE_GET => KnxIpBody::TunnellingFeatureGet(feature),
                    TUNNELLING_FEATURE_RESPONSE => KnxIpBody::TunnellingFeatureResponse(feature),
                    TUNNELLING_FEATURE_SET => KnxIpBody::TunnellingFeatureSet(feature),
                    _ => KnxIpBody::TunnellingFeatureInfo(feature),
                })
            },
            DEVICE_CONFIGURATION_REQUEST => {
                if body.len() < 4 {
                    return Err(parse_err("knxip::body::DeviceConfigurationRequest", "too short"));
                }
                Ok(KnxIpBody::DeviceConfigurationRequest(DeviceConfigurationRequest {
                    channel: body[1],
                    sequence_counter: body[2],
                    cemi: body[4..].to_vec(),
                }))
            },
            DEVICE_CONFIGURATION_ACK => {
                if body.len() != 4 {
                    return Err(parse_err("knxip::body::DeviceConfigurationAck", "must be 4 bytes"));
                }
                Ok(KnxIpBody::DeviceConfigurationAck(DeviceConfigurationAck {
                    channel: body[1],
                    sequence_counter: body[2],
                    status: body[3],
                }))
            },
            ROUTING_INDICATION => {
                let cemi = CemiFrame::decode(body)?;
                Ok(KnxIpBody::RoutingIndication { cemi })
            },
            ROUTING_LOST_MESSAGE => {
                if body.len() != 4 {
                    return Err(parse_err("knxip::body::RoutingLostMessage", "must be 4 bytes"));
                }
                Ok(KnxIpBody::RoutingLostMessage(RoutingLostMessage {
                    device_state: body[1],
                    lost_message_count: u16::from_be_bytes([body[2], body[3]]),
                }))
            },
            ROUTING_BUSY => {
                if body.len() != 6 {
                    return Err(parse_err("knxip::body::RoutingBusy", "must be 6 bytes"));
                }
                Ok(KnxIpBody::RoutingBusy(RoutingBusy {
                    device_state: body[1],
                    wait_time_ms: u16::from_be_bytes([body[2], body[3]]),
                    control_field: u16::from_be_bytes([body[4], body[5]]),
                }))
            },
            SECURE_WRAPPER => {
                if body.len() < 16 + 16 {
                    return Err(parse_err("knxip::body::SecureWrapper", "too short"));
                }
                let session_id = u16::from_be_bytes([body[0], body[1]]);
                let sequence_info: [u8; 6] = body[2..8].try_into().unwrap();
                let serial: [u8; 6] = body[8..14].try_into().unwrap();
                let msg_tag = u16::from_be_bytes([body[14], body[15]]);
                let mac_start = body.len() - 16;
                let encrypted_data = body[16..mac_start].to_vec();
                let mac: [u8; 16] = body[mac_start..].try_into().unwrap();
                Ok(KnxIpBody::SecureWrapper(SecureWrapper {
                    session_id,
                    sequence_info,
                    serial,
                    msg_tag,
                    encrypted_data,
                    mac,
                }))
            },
            SESSION_REQUEST => {
                let (control_endpoint, n) = Hpai::decode(body)?;
                if body.len() < n + 32 {
                    return Err(parse_err("knxip::body::SessionRequest", "too short"));
                }
                let client_public_key: [u8; 32] = body[n..n + 32].try_into().unwrap();
                Ok(KnxIpBody::SessionRequest(SessionRequest {
                    control_endpoint,
                    client_public_key,
                }))
            },
            SESSION_RESPONSE => {
                if body.len() != 2 + 32 + 16 {
                    return Err(parse_err("knxip::body::SessionResponse", "unexpected length"));
                }
                let session_id = u16::from_be_bytes([body[0], body[1]]);
                let server_public_key: [u8; 32] = body[2..34].try_into().unwrap();
                let mac: [u8; 16] = body[34..50].try_into().unwrap();
                Ok(KnxIpBody::SessionResponse(SessionResponse {
                    session_id,
                    server_public_key,
                    mac,
                }))
            },
            SESSION_AUTHENTICATE => {
                if body.len() != 2 + 16 {
                    return Err(parse_err("knxip::body::SessionAuthenticate", "unexpected length"));
                }
                let user_id = body[1];
                let mac: [u8; 16] = body[2..18].try_into().unwrap();
                Ok(KnxIpBody::SessionAuthenticate(SessionAuthenticate { user_id, mac }))
            },
            SESSION_STATUS => {
                if body.is_empty() {
                    return Err(parse_err("knxip::body::SessionStatus", "empty body"));
                }
                Ok(KnxIpBody::SessionStatus(SessionStatus { status: body[0] }))
            },
            TIMER_NOTIFY => {
                if body.len() != 6 + 6 + 2 + 16 {
                    return Err(parse_err("knxip::body::TimerNotify", "unexpected length"));
                }
                let timer_value: [u8; 6] = body[0..6].try_into().unwrap();
                let serial: [u8; 6] = body[6..12].try_into().unwrap();
                let msg_tag = u16::from_be_bytes([body[12], body[13]]);
                let mac: [u8; 16] = body[14..30].try_into().unwrap();
                Ok(KnxIpBody::TimerNotify(TimerNotify {
                    timer_value,
                    serial,
                    msg_tag,
                    mac,
                }))
            },
            other => Err(KnxIpError::UnsupportedServiceType(other)),
        }
    }
}

/// A complete KNX/IP frame: header plus body, with the header's
/// `total_length` always derived from the body at encode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnxIpFrame {
    pub body: KnxIpBody,
}

impl KnxIpFrame {
    pub fn new(body: KnxIpBody) -> Self {
        Self { body }
    }

    pub fn encode(&self) -> Vec<u8> {
        let body_bytes = self.body.encode();
        let header = KnxIpHeader::new(self.body.service_type(), body_bytes.len());
        let mut out = header.encode().to_vec();
        out.extend_from_slice(&body_bytes);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, KnxIpError> {
        let header = KnxIpHeader::decode(bytes)?;
        let total = header.total_length as usize;
        if bytes.len() < total {
            return Err(KnxIpError::IncompleteFrame {
                needed: total - bytes.len(),
            });
        }
        if bytes.len() > total {
            return Err(parse_err(
                "knxip::body::KnxIpFrame",
                format!("trailing {} byte(s) after declared total_length", bytes.len() - total),
            ));
        }
        let body = KnxIpBody::decode(header.service_type, &bytes[6..total])?;
        Ok(Self { body })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::{
        address::{GroupAddress, IndividualAddress, KnxAddress},
        apci::{Apci, ApciPayload},
        cemi::CemiFrame,
        knxip::cri_crd::TUNNEL_LINKLAYER,
    };

    #[test]
    fn scenario_1_group_write_routing_indication() {
        let source = IndividualAddress::from_raw(0xFF_F9);
        let dest = GroupAddress::from_raw(329);
        let apci = Apci::GroupValueWrite(ApciPayload::small(1).expect("small"));
        let cemi = CemiFrame::l_data_ind(source, KnxAddress::Group(dest), apci);
        let frame = KnxIpFrame::new(KnxIpBody::RoutingIndication { cemi });

        let encoded = frame.encode();
        assert_eq!(
            encoded,
            vec![
                0x06, 0x10, 0x05, 0x30, 0x00, 0x11, 0x29, 0x00, 0xBC, 0xD0, 0xFF, 0xF9, 0x01,
                0x49, 0x01, 0x00, 0x81
            ]
        );
        assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
    }

    #[test]
    fn scenario_2_connect_request() {
        let body = ConnectRequest {
            control_endpoint: Hpai::udp(Ipv4Addr::new(192, 168, 42, 1), 33941),
            data_endpoint: Hpai::udp(Ipv4Addr::new(192, 168, 42, 1), 52393),
            cri: Cri::tunnel(TUNNEL_LINKLAYER),
        };
        let frame = KnxIpFrame::new(KnxIpBody::ConnectRequest(body));
        let encoded = frame.encode();
        let expected = [
            0x06, 0x10, 0x02, 0x05, 0x00, 0x1A, 0x08, 0x01, 0xC0, 0xA8, 0x2A, 0x01, 0x84, 0x95,
            0x08, 0x01, 0xC0, 0xA8, 0x2A, 0x01, 0xCC, 0xA9, 0x04, 0x04, 0x02, 0x00,
        ];
        assert_eq!(encoded, expected);
        assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
    }

    #[test]
    fn scenario_3_connect_response() {
        let raw = [
            0x06, 0x10, 0x02, 0x06, 0x00, 0x14, 0x01, 0x00, 0x08, 0x01, 0xC0, 0xA8, 0x2A, 0x0A,
            0x0E, 0x57, 0x04, 0x04, 0x11, 0xFF,
        ];
        let KnxIpBody::ConnectResponse(r) = KnxIpFrame::decode(&raw).expect("decode").body else {
            panic!("expected ConnectResponse");
        };
        assert_eq!(r.channel, 1);
        assert_eq!(r.status, E_NO_ERROR);
        assert_eq!(
            r.data_endpoint,
            Some(Hpai::udp(Ipv4Addr::new(192, 168, 42, 10), 3671))
        );
        assert_eq!(r.crd.expect("crd").individual_address.raw(), 4607);
    }

    #[test]
    fn scenario_4_tunnelling_ack_round_trips() {
        let raw = [0x06, 0x10, 0x04, 0x21, 0x00, 0x0A, 0x04, 0x2A, 0x17, 0x00];
        let frame = KnxIpFrame::decode(&raw).expect("decode");
        let KnxIpBody::TunnellingAck(ack) = &frame.body else {
            panic!("expected TunnellingAck");
        };
        assert_eq!(ack.channel, 42);
        assert_eq!(ack.sequence_counter, 23);
        assert_eq!(ack.status, E_NO_ERROR);
        assert_eq!(frame.encode(), raw);
    }

    #[test]
    fn incomplete_frame_is_distinct_from_unsupported_service() {
        let raw = [0x06, 0x10, 0x05, 0x30, 0x00, 0x20];
        assert!(matches!(
            KnxIpFrame::decode(&raw),
            Err(KnxIpError::IncompleteFrame { .. })
        ));

        let unknown = [0x06, 0x10, 0xFF, 0xFF, 0x00, 0x06];
        assert!(matches!(
            KnxIpFrame::decode(&unknown),
            Err(KnxIpError::UnsupportedServiceType(0xFFFF))
        ));
    }
}
