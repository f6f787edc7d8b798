// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::UdpSocket;

/// Binds an ephemeral loopback UDP socket, for use as a lightweight stand-in
/// gateway in integration tests that drive a real connection state machine
/// against real wire bytes.
pub async fn bind_loopback() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind ephemeral loopback socket");
    let addr = socket.local_addr().expect("local_addr");
    (socket, addr)
}
