// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The three KNX/IP transports — UDP unicast, UDP multicast, and TCP — all
//! exposing the same send/dispatch/connect/stop surface so the connection
//! state machines above can stay transport-agnostic.

pub mod registry;
pub mod tcp;
pub mod udp;

pub use registry::{CallbackHandle, CallbackRegistry, Delivery};
pub use tcp::TcpTransport;
pub use udp::UdpTransport;

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::KnxIpError;

/// Uniform interface the connection state machines drive, regardless of
/// which of the three transports backs a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the underlying socket and start the receive loop.
    async fn connect(&self) -> Result<(), KnxIpError>;

    /// Send an already-encoded KNX/IP frame. `to` overrides the transport's
    /// default peer for this send only; `None` uses the default.
    async fn send(&self, frame: &[u8], to: Option<SocketAddr>) -> Result<(), KnxIpError>;

    /// Register interest in frames of `service_type`; see
    /// [`CallbackRegistry::register`].
    fn register_callback(
        &self,
        service_type: u16,
        capacity: usize,
    ) -> (CallbackHandle, tokio::sync::mpsc::Receiver<Delivery>);

    fn unregister_callback(&self, handle: CallbackHandle);

    /// Stop the receive loop and close the socket.
    async fn stop(&self);
}
