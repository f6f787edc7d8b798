// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A single persistent TCP transport, used for Secure tunnelling where the
//! unicast UDP path is not permitted.
//!
//! TCP gives us a byte stream, not frames, so the receive loop reassembles
//! one KNX/IP frame at a time: read the fixed 6-byte header, pull
//! `total_length` out of it, then read exactly that many remaining bytes
//! before handing the buffer to the codec.

use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::Mutex,
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use super::{CallbackHandle, CallbackRegistry, Delivery, Transport};
use crate::{
    error::KnxIpError,
    knxip::{
        header::{self, KnxIpHeader},
        KnxIpFrame,
    },
};

pub struct TcpTransport {
    peer: SocketAddr,
    stream: Mutex<Option<Arc<Mutex<TcpStream>>>>,
    registry: Arc<CallbackRegistry>,
    cancel: CancellationToken,
    recv_task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            stream: Mutex::new(None),
            registry: Arc::new(CallbackRegistry::new()),
            cancel: CancellationToken::new(),
            recv_task: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> Arc<CallbackRegistry> {
        self.registry.clone()
    }

    async fn read_one_frame(stream: &mut TcpStream) -> Result<KnxIpFrame, KnxIpError> {
        let mut header_buf = [0u8; header::HEADER_LEN as usize];
        stream
            .read_exact(&mut header_buf)
            .await
            .map_err(|e| KnxIpError::Communication(format!("TCP header read failed: {e}")))?;
        let header = KnxIpHeader::decode(&header_buf)?;

        let mut rest = vec![0u8; header.body_len()];
        stream
            .read_exact(&mut rest)
            .await
            .map_err(|e| KnxIpError::Communication(format!("TCP body read failed: {e}")))?;

        let mut full = header_buf.to_vec();
        full.extend_from_slice(&rest);
        KnxIpFrame::decode(&full)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self) -> Result<(), KnxIpError> {
        let stream = TcpStream::connect(self.peer)
            .await
            .map_err(|e| KnxIpError::Communication(format!("TCP connect to {} failed: {e}", self.peer)))?;
        stream
            .set_nodelay(true)
            .map_err(|e| KnxIpError::Communication(format!("setsockopt failed: {e}")))?;

        let shared = Arc::new(Mutex::new(stream));
        *self.stream.lock().await = Some(shared.clone());

        let registry = self.registry.clone();
        let cancel = self.cancel.clone();
        let peer = self.peer;
        let handle = tokio::spawn(async move {
            loop {
                let frame = {
                    let mut guard = shared.lock().await;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = Self::read_one_frame(&mut guard) => result,
                    }
                };
                match frame {
                    Ok(frame) => registry.dispatch(frame, peer),
                    Err(e) => {
                        tracing::warn!(%e, "TCP receive loop stopping");
                        break;
                    },
                }
            }
        });
        *self.recv_task.lock().await = Some(handle);
        Ok(())
    }

    async fn send(&self, frame: &[u8], to: Option<SocketAddr>) -> Result<(), KnxIpError> {
        if let Some(to) = to {
            if to != self.peer {
                return Err(KnxIpError::Communication(format!(
                    "TCP transport is bound to {}, cannot send to {to}",
                    self.peer
                )));
            }
        }
        let guard = self.stream.lock().await;
        let shared = guard
            .as_ref()
            .ok_or_else(|| KnxIpError::Communication("transport not connected".into()))?;
        let mut stream = shared.lock().await;
        stream
            .write_all(frame)
            .await
            .map_err(|e| KnxIpError::Communication(format!("TCP send failed: {e}")))?;
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
        *self.stream.lock().await = None;
    }
}
