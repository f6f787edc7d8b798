// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Protocol constants defined by the KNXnet/IP standard.

/// Default KNXnet/IP routing multicast group.
pub const DEFAULT_MCAST_GRP: &str = "224.0.23.12";
/// Default KNXnet/IP port (routing and tunnelling).
pub const DEFAULT_MCAST_PORT: u16 = 3671;

/// Default individual address assigned to a client that has not been told
/// one by a gateway (`15.15.250`).
pub const DEFAULT_INDIVIDUAL_ADDRESS_RAW: u16 = 0xFF_FA;

/// Seconds between heartbeat ConnectionStateRequests on an idle tunnel.
pub const CONNECTION_ALIVE_TIME: u64 = 120;
/// Timeout, in seconds, for a single ConnectionStateRequest attempt.
pub const CONNECTIONSTATE_REQUEST_TIMEOUT: u64 = 10;
/// `CONNECTION_ALIVE_TIME - 5 * CONNECTIONSTATE_REQUEST_TIMEOUT`.
pub const HEARTBEAT_RATE: u64 = CONNECTION_ALIVE_TIME - 5 * CONNECTIONSTATE_REQUEST_TIMEOUT;

/// Seconds of SecureWrapper inactivity before the session is considered
/// timed out by the server.
pub const SESSION_TIMEOUT: u64 = 60;
/// `SESSION_TIMEOUT - 10`: the rate at which we proactively send keepalive
/// frames before the server would time us out.
pub const SESSION_KEEPALIVE_RATE: u64 = SESSION_TIMEOUT - 10;

/// Fixed serial number used by this implementation in Secure routing
/// TimerNotify frames, per AN159.
pub const XKNX_SERIAL_NUMBER: [u8; 6] = [0x00, 0x00, 0x78, 0x6b, 0x6e, 0x78];

/// Default timeout for a generic request/response exchange.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1_000;
/// Timeout for a single TunnellingRequest -> TunnellingAck round trip.
pub const TUNNELLING_ACK_TIMEOUT_MS: u64 = 1_000;
/// Timeout for ConnectionStateRequest -> ConnectionStateResponse.
pub const CONNECTIONSTATE_TIMEOUT_MS: u64 = 10_000;
/// Timeout for the Secure session handshake (SessionResponse / SessionStatus).
pub const AUTHENTICATION_TIMEOUT_MS: u64 = 10_000;
/// Timeout waiting for the local L_Data_con confirmation after a send.
pub const CONFIRMATION_TIMEOUT_MS: u64 = 3_000;

/// Minimum spacing between two outgoing RoutingIndication frames.
pub const ROUTING_INDICATION_WAIT_MS: u64 = 20;

/// Default suggested bounded capacity for the telegram inbox/outbox.
pub const DEFAULT_TELEGRAM_QUEUE_CAPACITY: usize = 1_000;

/// Default latency tolerance used to derive the Secure-routing timer
/// windows (see `secure::timer`).
pub const DEFAULT_LATENCY_TOLERANCE_MS: u64 = 1_000;

/// Default wait, in seconds, before a tunnel re-executes Connect after a
/// tunnel-lost event, when `auto_reconnect` is enabled.
pub const DEFAULT_AUTO_RECONNECT_WAIT_S: u64 = 3;

/// Maximum KNX/IP frame size: the header's `total_length` field is a u16.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Maximum CEMI payload for a standard (non-extended) frame.
pub const MAX_STANDARD_CEMI_PAYLOAD: usize = 14;

/// How long a gateway scan keeps collecting SearchResponse frames after
/// sending the SearchRequest.
pub const DISCOVERY_WINDOW_MS: u64 = 3_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_rate_matches_spec() {
        assert_eq!(HEARTBEAT_RATE, 70);
    }

    #[test]
    fn session_keepalive_rate_matches_spec() {
        assert_eq!(SESSION_KEEPALIVE_RATE, 50);
    }
}
