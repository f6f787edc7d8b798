// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! UDP unicast (tunnelling) and UDP multicast (routing) transports.

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::Arc,
};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::UdpSocket, sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{CallbackHandle, CallbackRegistry, Delivery, Transport};
use crate::{constants::MAX_FRAME_LEN, error::KnxIpError, knxip::KnxIpFrame};

enum Mode {
    Unicast { peer: SocketAddr },
    Multicast { group: Ipv4Addr, port: u16 },
}

pub struct UdpTransport {
    mode: Mode,
    local_if: Ipv4Addr,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    registry: Arc<CallbackRegistry>,
    cancel: CancellationToken,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl UdpTransport {
    pub fn unicast(local_if: Ipv4Addr, peer: SocketAddr) -> Self {
        Self {
            mode: Mode::Unicast { peer },
            local_if,
            socket: Mutex::new(None),
            registry: Arc::new(CallbackRegistry::new()),
            cancel: CancellationToken::new(),
            recv_task: Mutex::new(None),
        }
    }

    pub fn multicast(local_if: Ipv4Addr, group: Ipv4Addr, port: u16) -> Self {
        Self {
            mode: Mode::Multicast { group, port },
            local_if,
            socket: Mutex::new(None),
            registry: Arc::new(CallbackRegistry::new()),
            cancel: CancellationToken::new(),
            recv_task: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        self.registry.clone()
    }

    fn default_peer(&self) -> SocketAddr {
        match self.mode {
            Mode::Unicast { peer } => peer,
            Mode::Multicast { group, port } => SocketAddr::V4(SocketAddrV4::new(group, port)),
        }
    }

    fn build_socket(&self) -> Result<Socket, KnxIpError> {
        let io_err = |e: std::io::Error| KnxIpError::Communication(format!("socket setup failed: {e}"));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(io_err)?;
        socket.set_reuse_address(true).map_err(io_err)?;

        match self.mode {
            Mode::Unicast { .. } => {
                socket
                    .bind(&SocketAddr::V4(SocketAddrV4::new(self.local_if, 0)).into())
                    .map_err(io_err)?;
            },
            Mode::Multicast { group, port } => {
                #[cfg(target_os = "macos")]
                socket.set_reuse_port(true).map_err(io_err)?;

                #[cfg(target_os = "windows")]
                let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
                #[cfg(not(target_os = "windows"))]
                let bind_addr = SocketAddrV4::new(group, port);

                socket.bind(&SocketAddr::V4(bind_addr).into()).map_err(io_err)?;
                socket
                    .set_multicast_if_v4(&self.local_if)
                    .map_err(io_err)?;
                socket
                    .join_multicast_v4(&group, &self.local_if)
                    .map_err(io_err)?;
                socket.set_multicast_ttl_v4(2).map_err(io_err)?;
                socket.set_multicast_loop_v4(false).map_err(io_err)?;
            },
        }
        socket.set_nonblocking(true).map_err(io_err)?;
        Ok(socket)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self) -> Result<(), KnxIpError> {
        let socket = self.build_socket()?;
        let std_socket: std::net::UdpSocket = socket.into();
        let tokio_socket = UdpSocket::from_std(std_socket)
            .map_err(|e| KnxIpError::Communication(format!("socket setup failed: {e}")))?;
        let socket = Arc::new(tokio_socket);
        *self.socket.lock().await = Some(socket.clone());

        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_FRAME_LEN];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    res = socket.recv_from(&mut buf) => {
                        let Ok((n, from)) = res else { break };
                        match KnxIpFrame::decode(&buf[..n]) {
                            Ok(frame) => registry.dispatch(frame, from),
                            Err(e) => tracing::warn!(%e, "discarding malformed UDP frame"),
                        }
                    }
                }
            }
        });
        *self.recv_task.lock().await = Some(handle);
        Ok(())
    }

    async fn send(&self, frame: &[u8], to: Option<SocketAddr>) -> Result<(), KnxIpError> {
        let guard = self.socket.lock().await;
        let socket = guard
            .as_ref()
            .ok_or_else(|| KnxIpError::Communication("transport not connected".into()))?;
        let dest = to.unwrap_or_else(|| self.default_peer());
        tracing::debug!(%dest, len = frame.len(), "sending UDP frame");
        socket
            .send_to(frame, dest)
            .await
            .map_err(|e| KnxIpError::Communication(format!("UDP send failed: {e}")))?;
        Ok(())
    }

    fn register_callback(
        &self,
        service_type: u16,
        capacity: usize,
    ) -> (CallbackHandle, tokio::sync::mpsc::Receiver<Delivery>) {
        self.registry.register(service_type, capacity)
    }

    fn unregister_callback(&self, handle: CallbackHandle) {
        self.registry.unregister(handle);
    }

    async fn stop(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.recv_task.lock().await.take() {
            let _ = handle.await;
        }
        *self.socket.lock().await = None;
    }
}
