// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The Tunnelling connection: CONNECT -> CONNECTED <-> HEARTBEAT -> DISCONNECT,
//! over either UDP (per-request ACK, sequence counter) or TCP (ordering
//! guaranteed by the stream, ACK skipped).
//!
//! A single in-flight confirmation waiter is enough to realize the ordering
//! guarantee: the outbox consumer does not dequeue the next telegram until
//! the previous `L_Data_con` has arrived or timed out.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{oneshot, Mutex},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::{
    address::{GroupAddress, IndividualAddress, KnxAddress},
    cemi::{CemiBody, CemiFrame, MessageCode},
    constants::{CONFIRMATION_TIMEOUT_MS, HEARTBEAT_RATE},
    error::KnxIpError,
    knxip::{
        body::{
            ConnectRequest, ConnectionStateRequest, DisconnectRequest, DisconnectResponse,
            TunnellingAck, TunnellingRequest,
        },
        cri_crd::{Cri, TUNNEL_LINKLAYER},
        hpai::Hpai,
        service::{self, E_NO_ERROR},
        KnxIpBody, KnxIpFrame,
    },
    queue::TelegramQueue,
    request_response::RequestResponse,
    telegram::Telegram,
    transport::{CallbackHandle, Delivery, Transport},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelKind {
    Udp,
    Tcp,
}

const HEARTBEAT_RETRIES: u32 = 3;

struct TunnelState {
    channel: Option<u8>,
    individual_address: IndividualAddress,
    data_endpoint: Hpai,
    sequence_counter: u8,
}

struct Inner {
    transport: Arc<dyn Transport>,
    kind: TunnelKind,
    gateway: SocketAddr,
    local_control_endpoint: Hpai,
    inbox: Arc<TelegramQueue>,
    state: Mutex<TunnelState>,
    confirmation_waiter: Mutex<Option<oneshot::Sender<()>>>,
    auto_reconnect: bool,
    auto_reconnect_wait: Duration,
    lost: tokio::sync::Notify,
}

/// A single tunnel; owns the transport and drives its lifecycle tasks.
pub struct TunnellingConnection {
    inner: Arc<Inner>,
    outbox: Arc<TelegramQueue>,
    cancel: CancellationToken,
    callbacks: Mutex<Vec<CallbackHandle>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TunnellingConnection {
    pub fn new(
        transport: Arc<dyn Transport>,
        kind: TunnelKind,
        gateway: SocketAddr,
        route_back: bool,
        auto_reconnect: bool,
        inbox: Arc<TelegramQueue>,
        outbox: Arc<TelegramQueue>,
    ) -> Self {
        let local_control_endpoint = if route_back {
            Hpai::ROUTE_BACK
        } else {
            Hpai::udp(std::net::Ipv4Addr::UNSPECIFIED, 0)
        };
        Self {
            inner: Arc::new(Inner {
                transport,
                kind,
                gateway,
                local_control_endpoint,
                inbox,
                state: Mutex::new(TunnelState {
                    channel: None,
                    individual_address: IndividualAddress::UNSET,
                    data_endpoint: Hpai::ROUTE_BACK,
                    sequence_counter: 0,
                }),
                confirmation_waiter: Mutex::new(None),
                auto_reconnect,
                auto_reconnect_wait: Duration::from_secs(crate::constants::DEFAULT_AUTO_RECONNECT_WAIT_S),
                lost: tokio::sync::Notify::new(),
            }),
            outbox,
            cancel: CancellationToken::new(),
            callbacks: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn connect(&self) -> Result<(), KnxIpError> {
        self.inner.transport.connect().await?;

        let (h_req, rx_req) = self.inner.transport.register_callback(service::TUNNELLING_REQUEST, 64);
        let (h_disc, rx_disc) = self.inner.transport.register_callback(service::DISCONNECT_REQUEST, 4);
        *self.callbacks.lock().await = vec![h_req, h_disc];

        run_connect(&self.inner).await?;

        let mut tasks = Vec::new();
        tasks.push(spawn_tunnelling_request_receiver(self.inner.clone(), rx_req, self.cancel.clone()));
        tasks.push(spawn_disconnect_receiver(self.inner.clone(), rx_disc, self.cancel.clone()));
        tasks.push(spawn_heartbeat(self.inner.clone(), self.cancel.clone()));
        tasks.push(spawn_outbox_sender(self.inner.clone(), self.outbox.clone(), self.cancel.clone()));
        *self.tasks.lock().await = tasks;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), KnxIpError> {
        let channel = self.inner.state.lock().await.channel;
        if let Some(channel) = channel {
            let engine = RequestResponse::new(self.inner.transport.clone());
            let request = KnxIpFrame::new(KnxIpBody::DisconnectRequest(DisconnectRequest {
                channel,
                control_endpoint: self.inner.local_control_endpoint,
            }));
            let response = engine
                .exchange(
                    &request,
                    Some(self.inner.gateway),
                    service::DISCONNECT_RESPONSE,
                    Duration::from_millis(crate::constants::DEFAULT_REQUEST_TIMEOUT_MS),
                )
                .await;
            if let Err(e) = response {
                tracing::warn!(%e, "DisconnectRequest was not acknowledged, tearing down locally anyway");
            }
        }
        self.stop().await;
        Ok(())
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        for handle in self.callbacks.lock().await.drain(..) {
            self.inner.transport.unregister_callback(handle);
        }
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.inner.state.lock().await.channel = None;
        self.inner.transport.stop().await;
    }
}

async fn run_connect(inner: &Arc<Inner>) -> Result<(), KnxIpError> {
    let engine = RequestResponse::new(inner.transport.clone());
    let request = KnxIpFrame::new(KnxIpBody::ConnectRequest(ConnectRequest {
        control_endpoint: inner.local_control_endpoint,
        data_endpoint: inner.local_control_endpoint,
        cri: Cri::tunnel(TUNNEL_LINKLAYER),
    }));
    let response = engine.connect(request, Some(inner.gateway)).await?;
    let KnxIpBody::ConnectResponse(r) = response.body else {
        return Err(KnxIpError::Communication(
            "gateway replied with an unexpected service type to ConnectRequest".into(),
        ));
    };
    if r.status != E_NO_ERROR {
        return Err(KnxIpError::Communication(format!(
            "gateway refused ConnectRequest with status 0x{:02x}",
            r.status
        )));
    }
    let data_endpoint = r.data_endpoint.unwrap_or(Hpai::ROUTE_BACK);
    let individual_address = r
        .crd
        .map(|c| c.individual_address)
        .unwrap_or(IndividualAddress::UNSET);

    let mut state = inner.state.lock().await;
    state.channel = Some(r.channel);
    state.individual_address = individual_address;
    state.data_endpoint = data_endpoint;
    state.sequence_counter = 0;
    tracing::info!(channel = r.channel, individual_address = %individual_address, "tunnel connected");
    Ok(())
}

fn data_endpoint_addr(data_endpoint: Hpai) -> Option<SocketAddr> {
    if data_endpoint.is_route_back() {
        None
    } else {
        Some(SocketAddr::new(IpAddr::V4(data_endpoint.ip), data_endpoint.port))
    }
}

async fn send_tunnelling_request(
    inner: &Arc<Inner>,
    channel: u8,
    seq: u8,
    cemi: CemiFrame,
    to: Option<SocketAddr>,
) -> Result<(), KnxIpError> {
    let request = KnxIpFrame::new(KnxIpBody::TunnellingRequest(TunnellingRequest {
        channel,
        sequence_counter: seq,
        cemi,
    }));
    match inner.kind {
        TunnelKind::Udp => {
            let engine = RequestResponse::new(inner.transport.clone());
            let response = engine.tunnelling_ack(request, to).await?;
            let KnxIpBody::TunnellingAck(TunnellingAck {
                sequence_counter,
                status,
                ..
            }) = response.body
            else {
                return Err(KnxIpError::Communication(
                    "unexpected response to TunnellingRequest".into(),
                ));
            };
            if sequence_counter != seq {
                return Err(KnxIpError::Communication(
                    "TunnellingAck sequence counter mismatch".into(),
                ));
            }
            if status != E_NO_ERROR {
                return Err(KnxIpError::Communication(format!(
                    "gateway rejected TunnellingRequest with status 0x{status:02x}"
                )));
            }
            Ok(())
        },
        TunnelKind::Tcp => inner.transport.send(&request.encode(), to).await,
    }
}

async fn arm_confirmation_waiter(inner: &Arc<Inner>) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    *inner.confirmation_waiter.lock().await = Some(tx);
    rx
}

async fn send_telegram(inner: &Arc<Inner>, telegram: Telegram) -> Result<(), KnxIpError> {
    let group_destination = match telegram.destination {
        KnxAddress::Group(g) => g,
        KnxAddress::Individual(_) => GroupAddress::BROADCAST,
    };

    let mut attempts = 0u32;
    loop {
        let (channel, source, data_endpoint, seq) = {
            let state = inner.state.lock().await;
            let channel = state
                .channel
                .ok_or_else(|| KnxIpError::Communication("tunnel not connected".into()))?;
            (channel, state.individual_address, state.data_endpoint, state.sequence_counter)
        };
        let cemi = CemiFrame::l_data_req(source, group_destination, telegram.apci.clone());
        let to = data_endpoint_addr(data_endpoint);

        let confirm_rx = arm_confirmation_waiter(inner).await;
        let send_result = send_tunnelling_request(inner, channel, seq, cemi, to).await;

        let confirmed = if send_result.is_ok() {
            matches!(
                tokio::time::timeout(Duration::from_millis(CONFIRMATION_TIMEOUT_MS), confirm_rx).await,
                Ok(Ok(()))
            )
        } else {
            false
        };

        if let Err(e) = &send_result {
            tracing::warn!(%e, attempt = attempts, "tunnelling send failed");
        }

        if send_result.is_ok() && confirmed {
            let mut state = inner.state.lock().await;
            state.sequence_counter = state.sequence_counter.wrapping_add(1);
            return Ok(());
        }

        attempts += 1;
        match attempts {
            1 => continue,
            2 => {
                tracing::warn!("reconnecting tunnel before the final send retry");
                run_connect(inner).await?;
                continue;
            },
            _ => {
                return Err(KnxIpError::Communication(
                    "tunnelling send failed after retry and reconnect".into(),
                ))
            },
        }
    }
}

fn spawn_outbox_sender(
    inner: Arc<Inner>,
    outbox: Arc<TelegramQueue>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let telegram = tokio::select! {
                _ = cancel.cancelled() => break,
                t = outbox.recv() => match t {
                    Some(t) => t,
                    None => break,
                },
            };
            if let Err(e) = send_telegram(&inner, telegram).await {
                tracing::warn!(%e, "telegram dropped after exhausting tunnelling retries");
            }
        }
    })
}

fn spawn_tunnelling_request_receiver(
    inner: Arc<Inner>,
    mut rx: tokio::sync::mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => break,
                d = rx.recv() => d,
            };
            let Some((frame, from)) = delivery else { break };
            let KnxIpBody::TunnellingRequest(TunnellingRequest {
                channel,
                sequence_counter,
                cemi,
            }) = frame.body
            else {
                continue;
            };

            if inner.kind == TunnelKind::Udp {
                let ack = KnxIpFrame::new(KnxIpBody::TunnellingAck(TunnellingAck {
                    channel,
                    sequence_counter,
                    status: E_NO_ERROR,
                }));
                if let Err(e) = inner.transport.send(&ack.encode(), Some(from)).await {
                    tracing::warn!(%e, "failed to acknowledge TunnellingRequest");
                }
            }

            match cemi.message_code {
                MessageCode::LDataInd => {
                    let CemiBody::LData(ld) = cemi.body else { continue };
                    inner
                        .inbox
                        .try_push(Telegram::incoming(ld.source, ld.destination, ld.apci));
                },
                MessageCode::LDataCon => {
                    if let Some(tx) = inner.confirmation_waiter.lock().await.take() {
                        let _ = tx.send(());
                    }
                },
                MessageCode::LDataReq => {
                    tracing::warn!("discarding protocol-invalid L_Data_req received from a tunnelling server");
                },
                other => {
                    tracing::debug!(message_code = ?other, "discarding unrecognized tunnelled CEMI");
                },
            }
        }
    })
}

fn spawn_disconnect_receiver(
    inner: Arc<Inner>,
    mut rx: tokio::sync::mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => break,
                d = rx.recv() => d,
            };
            let Some((frame, from)) = delivery else { break };
            let KnxIpBody::DisconnectRequest(DisconnectRequest { channel, .. }) = frame.body else {
                continue;
            };
            let current = inner.state.lock().await.channel;
            if current != Some(channel) {
                continue;
            }
            let response = KnxIpFrame::new(KnxIpBody::DisconnectResponse(DisconnectResponse {
                channel,
                status: E_NO_ERROR,
            }));
            if let Err(e) = inner.transport.send(&response.encode(), Some(from)).await {
                tracing::warn!(%e, "failed to acknowledge server-initiated DisconnectRequest");
            }
            inner.state.lock().await.channel = None;
            tracing::info!(channel, "tunnel closed by the gateway");
            inner.lost.notify_one();
        }
    })
}

fn spawn_heartbeat(inner: Arc<Inner>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(HEARTBEAT_RATE)) => {},
                _ = inner.lost.notified() => {
                    if !handle_tunnel_lost(&inner).await {
                        break;
                    }
                    continue;
                }
            }

            if !send_heartbeat_with_retries(&inner).await {
                tracing::warn!("heartbeat exhausted all retries, declaring the tunnel lost");
                if !handle_tunnel_lost(&inner).await {
                    break;
                }
            }
        }
    })
}

async fn send_heartbeat_with_retries(inner: &Arc<Inner>) -> bool {
    let channel = match inner.state.lock().await.channel {
        Some(c) => c,
        None => return false,
    };
    let engine = RequestResponse::new(inner.transport.clone());
    for attempt in 0..=HEARTBEAT_RETRIES {
        let request = KnxIpFrame::new(KnxIpBody::ConnectionStateRequest(ConnectionStateRequest {
            channel,
            control_endpoint: inner.local_control_endpoint,
        }));
        match engine.connectionstate(request, Some(inner.gateway)).await {
            Ok(response) => {
                if let KnxIpBody::ConnectionStateResponse(r) = response.body {
                    if r.status == E_NO_ERROR {
                        return true;
                    }
                }
            },
            Err(e) => tracing::warn!(%e, attempt, "ConnectionStateRequest failed"),
        }
    }
    false
}

async fn handle_tunnel_lost(inner: &Arc<Inner>) -> bool {
    if !inner.auto_reconnect {
        return false;
    }
    tokio::time::sleep(inner.auto_reconnect_wait).await;
    match run_connect(inner).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(%e, "reconnect attempt failed");
            false
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_rate_is_the_spec_derived_value() {
        assert_eq!(HEARTBEAT_RATE, 70);
    }
}
