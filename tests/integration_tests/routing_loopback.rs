// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Drives a real [`RoutingConnection`] over loopback multicast, exercising
//! the wire codec and the inbox/outbox queues end-to-end rather than just
//! the in-process flow-control unit tests.

use std::{net::Ipv4Addr, sync::Arc, time::Duration};

use knxip_core::{
    address::{GroupAddress, IndividualAddress, KnxAddress},
    apci::{Apci, ApciPayload},
    connection::RoutingConnection,
    knxip::{KnxIpBody, KnxIpFrame},
    queue::TelegramQueue,
    telegram::Telegram,
};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

const GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 23, 12);
const PORT: u16 = 3671;

/// A raw multicast peer standing in for a second KNX/IP device on the bus,
/// built the same way [`knxip_core::transport::udp::UdpTransport`] builds
/// its own socket so loopback delivery behaves identically.
async fn bind_peer_on_group() -> UdpSocket {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).expect("socket");
    socket.set_reuse_address(true).expect("reuse_address");
    socket
        .bind(&std::net::SocketAddr::new(GROUP.into(), PORT).into())
        .expect("bind group address");
    socket
        .set_multicast_if_v4(&Ipv4Addr::LOCALHOST)
        .expect("set_multicast_if_v4");
    socket
        .join_multicast_v4(&GROUP, &Ipv4Addr::LOCALHOST)
        .expect("join_multicast_v4");
    socket.set_nonblocking(true).expect("nonblocking");
    UdpSocket::from_std(socket.into()).expect("tokio UdpSocket::from_std")
}

#[tokio::test]
async fn routing_connection_delivers_a_peers_group_write_to_the_inbox() {
    let inbox = Arc::new(TelegramQueue::new(16));
    let outbox = Arc::new(TelegramQueue::new(16));
    let conn = RoutingConnection::new(
        Ipv4Addr::LOCALHOST,
        IndividualAddress::from_raw(0x11FA),
        inbox.clone(),
        outbox,
    );
    conn.start().await.expect("start");

    let peer = bind_peer_on_group().await;
    // Loopback multicast delivery needs the receiving socket's join to settle.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let source = IndividualAddress::from_raw(0x1203);
    let dest = GroupAddress::from_raw(9);
    let cemi = knxip_core::cemi::CemiFrame::l_data_ind(
        source,
        KnxAddress::Group(dest),
        Apci::GroupValueWrite(ApciPayload::small(1).expect("small")),
    );
    let frame = KnxIpFrame::new(KnxIpBody::RoutingIndication { cemi });
    peer.send_to(&frame.encode(), (GROUP, PORT)).await.expect("send");

    let telegram = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .expect("RoutingIndication arrives before timeout")
        .expect("inbox open");
    assert_eq!(telegram.source, source);
    assert_eq!(telegram.destination, KnxAddress::Group(dest));

    conn.stop().await;
}

#[tokio::test]
async fn routing_connection_sends_outbox_telegrams_as_routing_indications() {
    let inbox = Arc::new(TelegramQueue::new(16));
    let outbox = Arc::new(TelegramQueue::new(16));
    let local = IndividualAddress::from_raw(0x11FA);
    let conn = RoutingConnection::new(Ipv4Addr::LOCALHOST, local, inbox, outbox.clone());
    conn.start().await.expect("start");

    let peer = bind_peer_on_group().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let dest = GroupAddress::from_raw(42);
    outbox
        .push(Telegram::outgoing(KnxAddress::Group(dest), Apci::GroupValueRead))
        .await
        .expect("push");

    let mut buf = [0u8; 256];
    let (n, _from) = tokio::time::timeout(Duration::from_secs(2), peer.recv_from(&mut buf))
        .await
        .expect("RoutingIndication observed before timeout")
        .expect("recv_from");
    let frame = KnxIpFrame::decode(&buf[..n]).expect("decode");
    let KnxIpBody::RoutingIndication { cemi } = frame.body else {
        panic!("expected RoutingIndication");
    };
    let knxip_core::cemi::CemiBody::LData(ld) = cemi.body else {
        panic!("expected L_Data body");
    };
    assert_eq!(ld.source, local);
    assert_eq!(ld.destination, KnxAddress::Group(dest));

    conn.stop().await;
}
