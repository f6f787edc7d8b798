// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Gateway discovery and self-description: SearchRequest/SearchRequestExtended
//! multicast scans and unicast DescriptionRequest, parsed into a
//! [`GatewayDescriptor`].

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use crate::{
    address::IndividualAddress,
    constants::{DEFAULT_MCAST_PORT, DISCOVERY_WINDOW_MS},
    error::KnxIpError,
    knxip::{
        dib::{Dib, FAMILY_OBJECT_SERVER, FAMILY_ROUTING, FAMILY_SECURE, FAMILY_TUNNELLING},
        hpai::Hpai,
        service::{self, SEARCH_RESPONSE, SEARCH_RESPONSE_EXTENDED},
        srp::Srp,
        KnxIpBody, KnxIpFrame,
    },
    request_response::RequestResponse,
    transport::{Transport, UdpTransport},
};

/// What a gateway advertised about itself, flattened out of its DIBs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayDescriptor {
    pub control_endpoint: Hpai,
    pub individual_address: IndividualAddress,
    pub friendly_name: String,
    pub supports_tunneling: bool,
    pub supports_routing: bool,
    pub supports_object_server: bool,
    pub supports_secure: bool,
}

impl GatewayDescriptor {
    fn from_dibs(control_endpoint: Hpai, dibs: &[Dib]) -> Self {
        let mut individual_address = IndividualAddress::UNSET;
        let mut friendly_name = String::new();
        let mut supports_tunneling = false;
        let mut supports_routing = false;
        let mut supports_object_server = false;
        let mut supports_secure = false;

        for dib in dibs {
            match dib {
                Dib::DeviceInformation(info) => {
                    individual_address = IndividualAddress::from_raw(info.individual_address_raw);
                    friendly_name = info.friendly_name.clone();
                },
                Dib::SuppSvcFamilies(families) => {
                    supports_tunneling = families.supports(FAMILY_TUNNELLING);
                    supports_routing = families.supports(FAMILY_ROUTING);
                    supports_object_server = families.supports(FAMILY_OBJECT_SERVER);
                    supports_secure = families.supports(FAMILY_SECURE);
                },
                Dib::Other { .. } => {},
            }
        }

        Self {
            control_endpoint,
            individual_address,
            friendly_name,
            supports_tunneling,
            supports_routing,
            supports_object_server,
            supports_secure,
        }
    }
}

/// Scans the local multicast group for `DISCOVERY_WINDOW_MS` and returns
/// every gateway that answered. `local_if` is the interface to scan from.
pub async fn discover(local_if: Ipv4Addr) -> Result<Vec<GatewayDescriptor>, KnxIpError> {
    discover_with(local_if, None).await
}

/// Like [`discover`], but attaches Search Request Parameters (SRPs) to an
/// extended search, e.g. to filter by programming mode or service family.
pub async fn discover_with(
    local_if: Ipv4Addr,
    srps: Option<Vec<Srp>>,
) -> Result<Vec<GatewayDescriptor>, KnxIpError> {
    let group = Ipv4Addr::new(224, 0, 23, 12);
    let transport = UdpTransport::multicast(local_if, group, DEFAULT_MCAST_PORT);
    transport.connect().await?;

    let (handle, mut rx) = transport.register_callback(SEARCH_RESPONSE, 64);
    let (handle_ext, mut rx_ext) = transport.register_callback(SEARCH_RESPONSE_EXTENDED, 64);

    let discovery_endpoint = Hpai::ROUTE_BACK;
    let request = match srps {
        Some(srps) => KnxIpFrame::new(KnxIpBody::SearchRequestExtended {
            discovery_endpoint,
            srps,
        }),
        None => KnxIpFrame::new(KnxIpBody::SearchRequest { discovery_endpoint }),
    };
    transport.send(&request.encode(), None).await?;

    let mut gateways = Vec::new();
    let deadline = tokio::time::sleep(Duration::from_millis(DISCOVERY_WINDOW_MS));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            delivery = rx.recv() => {
                let Some((frame, _from)) = delivery else { break };
                if let KnxIpBody::SearchResponse { control_endpoint, dibs } = frame.body {
                    gateways.push(GatewayDescriptor::from_dibs(control_endpoint, &dibs));
                }
            }
            delivery = rx_ext.recv() => {
                let Some((frame, _from)) = delivery else { break };
                if let KnxIpBody::SearchResponseExtended { control_endpoint, dibs } = frame.body {
                    gateways.push(GatewayDescriptor::from_dibs(control_endpoint, &dibs));
                }
            }
        }
    }

    transport.unregister_callback(handle);
    transport.unregister_callback(handle_ext);
    transport.stop().await;
    Ok(gateways)
}

/// Asks a single, already-known gateway to describe itself over unicast.
pub async fn describe(local_if: Ipv4Addr, gateway: std::net::SocketAddr) -> Result<GatewayDescriptor, KnxIpError> {
    let transport: Arc<dyn Transport> = Arc::new(UdpTransport::unicast(local_if, gateway));
    transport.connect().await?;
    let engine = RequestResponse::new(transport.clone());

    let request = KnxIpFrame::new(KnxIpBody::DescriptionRequest {
        control_endpoint: Hpai::ROUTE_BACK,
    });
    let (response, _) = engine
        .exchange(
            &request,
            None,
            service::DESCRIPTION_RESPONSE,
            Duration::from_millis(crate::constants::DEFAULT_REQUEST_TIMEOUT_MS),
        )
        .await?;
    transport.stop().await;

    let KnxIpBody::DescriptionResponse { dibs } = response.body else {
        return Err(KnxIpError::Communication(
            "gateway replied with an unexpected service type to DescriptionRequest".into(),
        ));
    };
    let control_endpoint = match gateway {
        std::net::SocketAddr::V4(addr) => Hpai::udp(*addr.ip(), addr.port()),
        std::net::SocketAddr::V6(_) => Hpai::ROUTE_BACK,
    };
    Ok(GatewayDescriptor::from_dibs(control_endpoint, &dibs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knxip::dib::{DeviceInformation, SuppSvcFamilies};

    fn gira_knx_ip_router_description_bytes() -> Vec<u8> {
        // DescriptionResponse from a Gira KNX/IP-Router: device info DIB
        // (tunneling individual address 1.1.255) plus a supported-service
        // DIB advertising Core, Tunneling and Routing, but not Object Server.
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
        let supp = SuppSvcFamilies {
            families: vec![
                (crate::knxip::dib::FAMILY_CORE, 1),
                (FAMILY_TUNNELLING, 1),
                (FAMILY_ROUTING, 2),
            ],
        };
        let mut body = Dib::DeviceInformation(info).encode();
        body.extend_from_slice(&Dib::SuppSvcFamilies(supp).encode());
        let frame = KnxIpFrame::new(KnxIpBody::DescriptionResponse {
            dibs: Dib::decode_all(&body).expect("decode_all"),
        });
        frame.encode()
    }

    #[test]
    fn description_response_reports_tunneling_and_routing_but_not_object_server() {
        let raw = gira_knx_ip_router_description_bytes();
        let frame = KnxIpFrame::decode(&raw).expect("decode");
        let KnxIpBody::DescriptionResponse { dibs } = frame.body else {
            panic!("expected DescriptionResponse");
        };
        let descriptor = GatewayDescriptor::from_dibs(Hpai::ROUTE_BACK, &dibs);
        assert_eq!(descriptor.friendly_name, "Gira KNX/IP-Router");
        assert_eq!(descriptor.individual_address, IndividualAddress::from_raw(0x11FF));
        assert!(descriptor.supports_tunneling);
        assert!(descriptor.supports_routing);
        assert!(!descriptor.supports_object_server);
        assert!(!descriptor.supports_secure);
    }
}
