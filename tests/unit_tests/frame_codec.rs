// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::Ipv4Addr;

use knxip_core::{
    address::{GroupAddress, IndividualAddress, KnxAddress},
    apci::{Apci, ApciPayload},
    cemi::CemiFrame,
    knxip::{
        body::{ConnectionStateRequest, DisconnectRequest, DisconnectResponse, RoutingBusy},
        hpai::Hpai,
        service::E_NO_ERROR,
        KnxIpBody, KnxIpFrame,
    },
};

#[test]
fn disconnect_request_round_trips() {
    let frame = KnxIpFrame::new(KnxIpBody::DisconnectRequest(DisconnectRequest {
        channel: 9,
        control_endpoint: Hpai::udp(Ipv4Addr::new(10, 0, 0, 5), 3671),
    }));
    let encoded = frame.encode();
    assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
}

#[test]
fn disconnect_response_round_trips() {
    let frame = KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
        channel: 9,
        status: E_NO_ERROR,
    }));
    let encoded = frame.encode();
    assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
}

#[test]
fn connectionstate_request_round_trips() {
    let frame = KnxIpFrame::new(KnxIpBody::ConnectionStateRequest(ConnectionStateRequest {
        channel: 3,
        control_endpoint: Hpai::ROUTE_BACK,
    }));
    let encoded = frame.encode();
    assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
}

#[test]
fn routing_busy_round_trips_with_nonzero_wait_time() {
    let frame = KnxIpFrame::new(KnxIpBody::RoutingBusy(RoutingBusy {
        device_state: 0,
        wait_time_ms: 100,
        control_field: 0,
    }));
    let encoded = frame.encode();
    assert_eq!(KnxIpFrame::decode(&encoded).expect("decode"), frame);
}

#[test]
fn group_read_telegram_has_no_payload_but_group_write_does() {
    let source = IndividualAddress::from_raw(0x11FA);
    let dest = GroupAddress::from_raw(9);

    let read = CemiFrame::l_data_req(source, dest, Apci::GroupValueRead);
    assert_eq!(read.encode().last().copied().expect("byte"), 0x00);

    let write = CemiFrame::l_data_req(
        source,
        dest,
        Apci::GroupValueWrite(ApciPayload::small(1).expect("small")),
    );
    assert_eq!(write.encode().last().copied().expect("byte"), 0x81);
}

#[test]
fn individual_address_as_cemi_destination_round_trips() {
    let source = IndividualAddress::from_raw(0x11FA);
    let dest = KnxAddress::Individual(IndividualAddress::from_raw(0x1203));
    let cemi = CemiFrame::l_data_ind(source, dest, Apci::GroupValueRead);
    let encoded = cemi.encode();
    let decoded = CemiFrame::decode(&encoded).expect("decode");
    assert_eq!(decoded.body, cemi.body);
}
