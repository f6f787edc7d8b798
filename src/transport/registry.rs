// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A callback registry keyed by KNX/IP service type, then by request id.
//!
//! Dispatch iterates a snapshot so a callback is free to unregister itself
//! (the single invariant the request/response engine relies on).

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::knxip::KnxIpFrame;

pub type Delivery = (KnxIpFrame, SocketAddr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackHandle {
    service_type: u16,
    id: u64,
}

#[derive(Default)]
pub struct CallbackRegistry {
    next_id: AtomicU64,
    callbacks: DashMap<u16, DashMap<u64, mpsc::Sender<Delivery>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in `service_type`, returning a handle to
    /// unregister later and a channel that receives every matching frame.
    pub fn register(&self, service_type: u16, capacity: usize) -> (CallbackHandle, mpsc::Receiver<Delivery>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(capacity);
        self.callbacks
            .entry(service_type)
            .or_default()
            .insert(id, tx);
        (CallbackHandle { service_type, id }, rx)
    }

    pub fn unregister(&self, handle: CallbackHandle) {
        if let Some(table) = self.callbacks.get(&handle.service_type) {
            table.remove(&handle.id);
        }
    }

    /// Forward `frame` to every callback registered for its service type.
    /// Callbacks whose receiver has been dropped are pruned.
    pub fn dispatch(&self, frame: KnxIpFrame, from: SocketAddr) {
        let service_type = frame.body.service_type();
        let Some(table) = self.callbacks.get(&service_type) else {
            return;
        };
        let snapshot: Vec<(u64, mpsc::Sender<Delivery>)> =
            table.iter().map(|e| (*e.key(), e.value().clone())).collect();
        drop(table);

        for (id, sender) in snapshot {
            if sender.try_send((frame.clone(), from)).is_err() {
                if let Some(table) = self.callbacks.get(&service_type) {
                    table.remove(&id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

    use super::*;
    use crate::{
        address::{GroupAddress, IndividualAddress, KnxAddress},
        apci::Apci,
        cemi::CemiFrame,
        knxip::{service::ROUTING_INDICATION, KnxIpBody},
    };

    fn sample_frame() -> KnxIpFrame {
        let cemi = CemiFrame::l_data_ind(
            IndividualAddress::from_raw(1),
            KnxAddress::Group(GroupAddress::from_raw(1)),
            Apci::GroupValueRead,
        );
        KnxIpFrame::new(KnxIpBody::RoutingIndication { cemi })
    }

    fn addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3671))
    }

    #[tokio::test]
    async fn registered_callback_receives_matching_dispatch() {
        let registry = CallbackRegistry::new();
        let (_handle, mut rx) = registry.register(ROUTING_INDICATION, 4);
        registry.dispatch(sample_frame(), addr());
        let (frame, from) = rx.recv().await.expect("delivery");
        assert_eq!(frame, sample_frame());
        assert_eq!(from, addr());
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let registry = CallbackRegistry::new();
        let (handle, mut rx) = registry.register(ROUTING_INDICATION, 4);
        registry.unregister(handle);
        registry.dispatch(sample_frame(), addr());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dispatch_ignores_unrelated_service_types() {
        let registry = CallbackRegistry::new();
        let (_handle, mut rx) = registry.register(crate::knxip::service::TUNNELLING_ACK, 4);
        registry.dispatch(sample_frame(), addr());
        assert!(rx.try_recv().is_err());
    }
}
