// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Routing connection: multicast send/receive with RoutingBusy flow
//! control. Routing has no on-wire confirmation, so a local `L_Data_con` is
//! synthesized immediately after every send.

use std::{
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    address::{IndividualAddress, KnxAddress},
    cemi::{CemiBody, CemiFrame, MessageCode},
    constants::{DEFAULT_MCAST_PORT, ROUTING_INDICATION_WAIT_MS},
    error::KnxIpError,
    knxip::{
        body::{RoutingBusy, RoutingLostMessage},
        service::{ROUTING_BUSY, ROUTING_INDICATION, ROUTING_LOST_MESSAGE},
        KnxIpBody, KnxIpFrame,
    },
    queue::TelegramQueue,
    telegram::Telegram,
    transport::{CallbackHandle, Transport, UdpTransport},
};

/// RoutingBusy-driven send gate. The moving window counter `N` grows on
/// bursty busy events and decays on its own clock, matching the widening
/// and narrowing backoff described for Routing flow control.
struct FlowControl {
    ready: AtomicBool,
    window: AtomicU64,
    last_busy_at: Mutex<Option<Instant>>,
    busy_until: Mutex<Option<Instant>>,
    reopen_task: Mutex<Option<JoinHandle<()>>>,
}

impl FlowControl {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            ready: AtomicBool::new(true),
            window: AtomicU64::new(0),
            last_busy_at: Mutex::new(None),
            busy_until: Mutex::new(None),
            reopen_task: Mutex::new(None),
        })
    }

    async fn wait_ready(&self) {
        while !self.ready.load(Ordering::Acquire) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn spawn_window_decay(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(5)) => {
                        let _ = this.window.fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                            (w > 0).then_some(w - 1)
                        });
                    }
                }
            }
        })
    }

    async fn on_routing_busy(self: &Arc<Self>, wait_time_ms: u16) {
        let now = Instant::now();
        self.ready.store(false, Ordering::Release);

        let mut last_busy = self.last_busy_at.lock().await;
        let advance_window = !matches!(*last_busy, Some(prev) if now.duration_since(prev) <= Duration::from_millis(10));
        *last_busy = Some(now);
        drop(last_busy);
        if advance_window {
            self.window.fetch_add(1, Ordering::AcqRel);
        }

        let new_until = now + Duration::from_millis(wait_time_ms as u64);
        let mut busy_until = self.busy_until.lock().await;
        if matches!(*busy_until, Some(cur) if cur >= new_until) {
            // A smaller remaining wait than the one already scheduled: ignore.
            return;
        }
        *busy_until = Some(new_until);
        drop(busy_until);

        if let Some(old) = self.reopen_task.lock().await.take() {
            old.abort();
        }
        let window = self.window.load(Ordering::Acquire).max(1);
        let jitter_ms = rand::random::<u64>() % (window * 50 + 1);
        let total_wait = Duration::from_millis(wait_time_ms as u64) + Duration::from_millis(jitter_ms);

        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(total_wait).await;
            this.ready.store(true, Ordering::Release);
            *this.busy_until.lock().await = None;
        });
        *self.reopen_task.lock().await = Some(handle);
    }
}

pub struct RoutingConnection {
    transport: Arc<UdpTransport>,
    individual_address: IndividualAddress,
    inbox: Arc<TelegramQueue>,
    outbox: Arc<TelegramQueue>,
    flow: Arc<FlowControl>,
    cancel: CancellationToken,
    callbacks: Mutex<Vec<CallbackHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RoutingConnection {
    pub fn new(
        local_if: Ipv4Addr,
        individual_address: IndividualAddress,
        inbox: Arc<TelegramQueue>,
        outbox: Arc<TelegramQueue>,
    ) -> Self {
        let group = Ipv4Addr::new(224, 0, 23, 12);
        Self {
            transport: Arc::new(UdpTransport::multicast(local_if, group, DEFAULT_MCAST_PORT)),
            individual_address,
            inbox,
            outbox,
            flow: FlowControl::new(),
            cancel: CancellationToken::new(),
            callbacks: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn start(&self) -> Result<(), KnxIpError> {
        self.transport.connect().await?;

        let (h_ind, rx_ind) = self.transport.register_callback(ROUTING_INDICATION, 256);
        let (h_lost, rx_lost) = self.transport.register_callback(ROUTING_LOST_MESSAGE, 16);
        let (h_busy, rx_busy) = self.transport.register_callback(ROUTING_BUSY, 16);
        *self.callbacks.lock().await = vec![h_ind, h_lost, h_busy];

        let mut tasks = Vec::new();
        tasks.push(self.flow.spawn_window_decay(self.cancel.clone()));
        tasks.push(self.spawn_indication_receiver(rx_ind));
        tasks.push(self.spawn_lost_message_receiver(rx_lost));
        tasks.push(self.spawn_busy_receiver(rx_busy));
        tasks.push(self.spawn_send_loop());
        *self.tasks.lock().await = tasks;
        Ok(())
    }

    fn spawn_indication_receiver(
        &self,
        mut rx: tokio::sync::mpsc::Receiver<crate::transport::Delivery>,
    ) -> JoinHandle<()> {
        let inbox = self.inbox.clone();
        let local = self.individual_address;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    delivery = rx.recv() => {
                        let Some((frame, _from)) = delivery else { break };
                        let KnxIpBody::RoutingIndication { cemi } = frame.body else { continue };
                        handle_routing_indication(cemi, local, &inbox);
                    }
                }
            }
        })
    }

    fn spawn_lost_message_receiver(
        &self,
        mut rx: tokio::sync::mpsc::Receiver<crate::transport::Delivery>,
    ) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    delivery = rx.recv() => {
                        let Some((frame, _from)) = delivery else { break };
                        if let KnxIpBody::RoutingLostMessage(RoutingLostMessage { device_state, lost_message_count }) = frame.body {
                            tracing::warn!(device_state, lost_message_count, "RoutingLostMessage received");
                        }
                    }
                }
            }
        })
    }

    fn spawn_busy_receiver(
        &self,
        mut rx: tokio::sync::mpsc::Receiver<crate::transport::Delivery>,
    ) -> JoinHandle<()> {
        let flow = self.flow.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    delivery = rx.recv() => {
                        let Some((frame, _from)) = delivery else { break };
                        if let KnxIpBody::RoutingBusy(RoutingBusy { wait_time_ms, .. }) = frame.body {
                            tracing::info!(wait_time_ms, "RoutingBusy received, throttling sends");
                            flow.on_routing_busy(wait_time_ms).await;
                        }
                    }
                }
            }
        })
    }

    fn spawn_send_loop(&self) -> JoinHandle<()> {
        let outbox = self.outbox.clone();
        let transport = self.transport.clone();
        let flow = self.flow.clone();
        let local = self.individual_address;
        let inbox = self.inbox.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let telegram = tokio::select! {
                    _ = cancel.cancelled() => break,
                    t = outbox.recv() => match t {
                        Some(t) => t,
                        None => break,
                    },
                };
                flow.wait_ready().await;

                let cemi = CemiFrame::l_data_ind(local, telegram.destination, telegram.apci.clone());
                let frame = KnxIpFrame::new(KnxIpBody::RoutingIndication { cemi: cemi.clone() });
                if let Err(e) = transport.send(&frame.encode(), None).await {
                    tracing::warn!(%e, "failed to send RoutingIndication");
                    continue;
                }

                // Routing has no on-wire confirmation; synthesize one locally
                // and deliver it back to the application path.
                let confirmation = CemiFrame::l_data_con(local, telegram.destination, telegram.apci);
                let CemiBody::LData(ld) = confirmation.body else {
                    unreachable!("l_data_con always builds an LData body")
                };
                inbox.try_push(Telegram::confirmation(ld.source, ld.destination, ld.apci));
                tracing::debug!(destination = %telegram.destination.raw(), "RoutingIndication sent, local confirmation delivered");

                tokio::time::sleep(Duration::from_millis(ROUTING_INDICATION_WAIT_MS)).await;
            }
        })
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        for handle in self.callbacks.lock().await.drain(..) {
            self.transport.unregister_callback(handle);
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.transport.stop().await;
    }
}

fn handle_routing_indication(cemi: CemiFrame, local: IndividualAddress, inbox: &Arc<TelegramQueue>) {
    if cemi.message_code != MessageCode::LDataInd {
        tracing::debug!(message_code = ?cemi.message_code, "discarding non L_Data_ind routing frame");
        return;
    }
    let CemiBody::LData(ld) = &cemi.body else {
        tracing::debug!("discarding routing frame with non-LData body");
        return;
    };
    if ld.source == local {
        return;
    }
    let destination: KnxAddress = ld.destination;
    inbox.try_push(Telegram::incoming(ld.source, destination, ld.apci.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flow_control_blocks_sends_until_busy_window_elapses() {
        let flow = FlowControl::new();
        flow.on_routing_busy(20).await;
        assert!(!flow.ready.load(Ordering::Acquire));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(flow.ready.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn smaller_remaining_wait_is_ignored() {
        let flow = FlowControl::new();
        flow.on_routing_busy(200).await;
        flow.on_routing_busy(5).await;
        // the first, longer wait should still be the one governing reopen.
        assert!(flow.busy_until.lock().await.is_some());
        assert!(!flow.ready.load(Ordering::Acquire));
    }
}
