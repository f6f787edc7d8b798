// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection state machines: Routing (multicast, no per-telegram
//! confirmation) and Tunnelling (point-to-point, channel-oriented, with
//! heartbeat and reconnect).

pub mod routing;
pub mod tunnelling;

pub use routing::RoutingConnection;
pub use tunnelling::{TunnelKind, TunnellingConnection};
