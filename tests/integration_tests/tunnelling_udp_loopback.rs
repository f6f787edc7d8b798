// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives a real [`TunnellingConnection`] over UDP against a hand-rolled
//! stand-in gateway, covering CONNECT -> send/confirm -> DISCONNECT on real
//! wire bytes rather than mocked callbacks.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use knxip_core::{
    address::{GroupAddress, IndividualAddress, KnxAddress},
    apci::Apci,
    cemi::{CemiFrame, MessageCode},
    connection::{TunnelKind, TunnellingConnection},
    knxip::{
        body::{
            ConnectRequest, ConnectResponse, DisconnectRequest, DisconnectResponse,
            TunnellingAck, TunnellingRequest,
        },
        cri_crd::Crd,
        hpai::Hpai,
        service::E_NO_ERROR,
        KnxIpBody, KnxIpFrame,
    },
    queue::TelegramQueue,
    telegram::Telegram,
    transport::UdpTransport,
};
use tokio::net::UdpSocket;

use super::common::bind_loopback;

const ASSIGNED_CHANNEL: u8 = 7;
const ASSIGNED_ADDRESS_RAW: u16 = 0x2A01;

/// A stand-in gateway: answers ConnectRequest, acknowledges and confirms
/// every TunnellingRequest, answers DisconnectRequest. Runs until the socket
/// is dropped.
async fn spawn_fake_gateway(socket: UdpSocket) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        loop {
            let Ok((n, from)) = socket.recv_from(&mut buf).await else { break };
            let Ok(frame) = KnxIpFrame::decode(&buf[..n]) else { continue };
            match frame.body {
                KnxIpBody::ConnectRequest(ConnectRequest { .. }) => {
                    let response = KnxIpFrame::new(KnxIpBody::ConnectResponse(ConnectResponse {
                        channel: ASSIGNED_CHANNEL,
                        status: E_NO_ERROR,
                        data_endpoint: Some(Hpai::ROUTE_BACK),
                        crd: Some(Crd::tunnel(IndividualAddress::from_raw(ASSIGNED_ADDRESS_RAW))),
                    }));
                    let _ = socket.send_to(&response.encode(), from).await;
                },
                KnxIpBody::TunnellingRequest(TunnellingRequest {
                    channel,
                    sequence_counter,
                    cemi,
                }) => {
                    let ack = KnxIpFrame::new(KnxIpBody::TunnellingAck(TunnellingAck {
                        channel,
                        sequence_counter,
                        status: E_NO_ERROR,
                    }));
                    let _ = socket.send_to(&ack.encode(), from).await;

                    if cemi.message_code == MessageCode::LDataReq {
                        let knxip_core::cemi::CemiBody::LData(ld) = &cemi.body else { continue };
                        let confirmation = CemiFrame::l_data_con(
                            IndividualAddress::from_raw(ASSIGNED_ADDRESS_RAW),
                            ld.destination,
                            ld.apci.clone(),
                        );
                        let confirm_frame =
                            KnxIpFrame::new(KnxIpBody::TunnellingRequest(TunnellingRequest {
                                channel,
                                sequence_counter: 0,
                                cemi: confirmation,
                            }));
                        let _ = socket.send_to(&confirm_frame.encode(), from).await;
                    }
                },
                KnxIpBody::DisconnectRequest(DisconnectRequest { channel, .. }) => {
                    let response =
                        KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
                            channel,
                            status: E_NO_ERROR,
                        }));
                    let _ = socket.send_to(&response.encode(), from).await;
                    break;
                },
                _ => {},
            }
        }
    });
}

#[tokio::test]
async fn tunnel_connects_sends_a_telegram_and_disconnects_cleanly() {
    let (gateway_socket, gateway_addr) = bind_loopback().await;
    spawn_fake_gateway(gateway_socket).await;

    let transport = Arc::new(UdpTransport::unicast(Ipv4Addr::LOCALHOST, gateway_addr));
    let inbox = Arc::new(TelegramQueue::new(16));
    let outbox = Arc::new(TelegramQueue::new(16));
    let tunnel = TunnellingConnection::new(
        transport,
        TunnelKind::Udp,
        gateway_addr,
        true,
        false,
        inbox,
        outbox.clone(),
    );

    tunnel.connect().await.expect("CONNECT handshake");

    outbox
        .push(Telegram::outgoing(
            KnxAddress::Group(GroupAddress::from_raw(9)),
            Apci::GroupValueRead,
        ))
        .await
        .expect("push telegram");

    // The outbox-sender task races the confirmation against
    // `CONFIRMATION_TIMEOUT_MS`; give it ample time on a loopback link.
    tokio::time::sleep(Duration::from_millis(200)).await;

    tunnel.disconnect().await.expect("DISCONNECT handshake");
}

#[tokio::test]
async fn service_type_mismatch_during_connect_surfaces_as_communication_error() {
    use knxip_core::error::KnxIpError;

    let (gateway_socket, gateway_addr) = bind_loopback().await;
    tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        let Ok((n, from)) = gateway_socket.recv_from(&mut buf).await else { return };
        let Ok(frame) = KnxIpFrame::decode(&buf[..n]) else { return };
        if matches!(frame.body, KnxIpBody::ConnectRequest(_)) {
            // Reply with the wrong service type entirely.
            let bogus = KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
                channel: 0,
                status: E_NO_ERROR,
            }));
            let _ = gateway_socket.send_to(&bogus.encode(), from).await;
        }
    });

    let transport = Arc::new(UdpTransport::unicast(Ipv4Addr::LOCALHOST, gateway_addr));
    let inbox = Arc::new(TelegramQueue::new(16));
    let outbox = Arc::new(TelegramQueue::new(16));
    let tunnel = TunnellingConnection::new(
        transport,
        TunnelKind::Udp,
        gateway_addr,
        true,
        false,
        inbox,
        outbox,
    );

    let err = tokio::time::timeout(Duration::from_secs(2), tunnel.connect())
        .await
        .expect("connect attempt does not hang")
        .expect_err("a DisconnectResponse is not a valid ConnectResponse");
    assert!(matches!(err, KnxIpError::Timeout(_)));
}
