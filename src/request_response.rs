// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A one-shot request/response exchange over a [`Transport`]: register a
//! callback for the expected service type, send the request, then race the
//! callback against a timeout. Whichever way it resolves, the callback is
//! always unregistered — the single invariant this engine relies on.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use tokio::time::timeout;

use crate::{
    constants::{AUTHENTICATION_TIMEOUT_MS, CONNECTIONSTATE_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS, TUNNELLING_ACK_TIMEOUT_MS},
    error::KnxIpError,
    knxip::{service, KnxIpBody, KnxIpFrame},
    transport::Transport,
};

/// Pulls the status byte out of whichever response body carries one.
/// Bodies without a status field (e.g. [`KnxIpBody::SessionResponse`]) have
/// no notion of success/failure at this layer and return `None`.
pub fn response_status(body: &KnxIpBody) -> Option<u8> {
    match body {
        KnxIpBody::ConnectResponse(r) => Some(r.status),
        KnxIpBody::ConnectionStateResponse(r) => Some(r.status),
        KnxIpBody::DisconnectResponse(r) => Some(r.status),
        KnxIpBody::TunnellingAck(r) => Some(r.status),
        KnxIpBody::DeviceConfigurationAck(r) => Some(r.status),
        KnxIpBody::SessionStatus(r) => Some(r.status),
        _ => None,
    }
}

/// Drives a single request/response exchange against a [`Transport`].
pub struct RequestResponse {
    transport: Arc<dyn Transport>,
}

impl RequestResponse {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send `request` and wait up to `timeout_dur` for a frame whose service
    /// type is `expected_service_type`. Unregisters its callback on every
    /// exit path, including early return via `?`.
    pub async fn exchange(
        &self,
        request: &KnxIpFrame,
        to: Option<SocketAddr>,
        expected_service_type: u16,
        timeout_dur: Duration,
    ) -> Result<(KnxIpFrame, SocketAddr), KnxIpError> {
        let (handle, mut rx) = self.transport.register_callback(expected_service_type, 1);

        let outcome = async {
            self.transport.send(&request.encode(), to).await?;
            match timeout(timeout_dur, rx.recv()).await {
                Ok(Some(delivery)) => Ok(delivery),
                Ok(None) => Err(KnxIpError::Communication(
                    "callback channel closed before a response arrived".into(),
                )),
                Err(_) => Err(KnxIpError::Timeout("request/response exchange")),
            }
        }
        .await;

        self.transport.unregister_callback(handle);
        outcome
    }

    /// [`service::CONNECT_REQUEST`] -> [`service::CONNECT_RESPONSE`], default timeout.
    pub async fn connect(&self, request: KnxIpFrame, to: Option<SocketAddr>) -> Result<KnxIpFrame, KnxIpError> {
        let (frame, _) = self
            .exchange(
                &request,
                to,
                service::CONNECT_RESPONSE,
                Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            )
            .await?;
        Ok(frame)
    }

    /// [`service::TUNNELLING_REQUEST`] -> [`service::TUNNELLING_ACK`].
    pub async fn tunnelling_ack(
        &self,
        request: KnxIpFrame,
        to: Option<SocketAddr>,
    ) -> Result<KnxIpFrame, KnxIpError> {
        let (frame, _) = self
            .exchange(
                &request,
                to,
                service::TUNNELLING_ACK,
                Duration::from_millis(TUNNELLING_ACK_TIMEOUT_MS),
            )
            .await?;
        Ok(frame)
    }

    /// [`service::CONNECTIONSTATE_REQUEST`] -> [`service::CONNECTIONSTATE_RESPONSE`].
    pub async fn connectionstate(
        &self,
        request: KnxIpFrame,
        to: Option<SocketAddr>,
    ) -> Result<KnxIpFrame, KnxIpError> {
        let (frame, _) = self
            .exchange(
                &request,
                to,
                service::CONNECTIONSTATE_RESPONSE,
                Duration::from_millis(CONNECTIONSTATE_TIMEOUT_MS),
            )
            .await?;
        Ok(frame)
    }

    /// [`service::SESSION_REQUEST`] -> [`service::SESSION_RESPONSE`].
    pub async fn session_request(
        &self,
        request: KnxIpFrame,
        to: Option<SocketAddr>,
    ) -> Result<KnxIpFrame, KnxIpError> {
        let (frame, _) = self
            .exchange(
                &request,
                to,
                service::SESSION_RESPONSE,
                Duration::from_millis(AUTHENTICATION_TIMEOUT_MS),
            )
            .await?;
        Ok(frame)
    }

    /// [`service::SESSION_AUTHENTICATE`] -> [`service::SESSION_STATUS`].
    pub async fn session_authenticate(
        &self,
        request: KnxIpFrame,
        to: Option<SocketAddr>,
    ) -> Result<KnxIpFrame, KnxIpError> {
        let (frame, _) = self
            .exchange(
                &request,
                to,
                service::SESSION_STATUS,
                Duration::from_millis(AUTHENTICATION_TIMEOUT_MS),
            )
            .await?;
        Ok(frame)
    }
}
