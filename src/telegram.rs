// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The [`Telegram`] type: the high-level message exchanged across the
//! telegram inbox/outbox boundary (§6) between the core and application
//! code.

use crate::{
    address::{IndividualAddress, KnxAddress},
    apci::Apci,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramDirection {
    Incoming,
    Outgoing,
    /// A local L_Data_con synthesized after sending, rather than received
    /// from the bus or submitted by the application.
    Confirmation,
}

/// A decoded application-layer message, independent of whether it travels
/// over Routing or Tunnelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    pub destination: KnxAddress,
    /// Filled by the core for outgoing tunnelled telegrams once the
    /// gateway-assigned address is known; always populated on incoming
    /// telegrams.
    pub source: IndividualAddress,
    pub direction: TelegramDirection,
    pub apci: Apci,
}

impl Telegram {
    /// Build an outgoing telegram as application code submits it: the
    /// source address is left unset and assigned by the core at send time.
    pub fn outgoing(destination: KnxAddress, apci: Apci) -> Self {
        Self {
            destination,
            source: IndividualAddress::UNSET,
            direction: TelegramDirection::Outgoing,
            apci,
        }
    }

    pub fn incoming(
        source: IndividualAddress,
        destination: KnxAddress,
        apci: Apci,
    ) -> Self {
        Self {
            destination,
            source,
            direction: TelegramDirection::Incoming,
            apci,
        }
    }

    /// Build a local confirmation telegram (a synthesized or gateway-echoed
    /// L_Data_con) delivered back to the application path after a send.
    pub fn confirmation(
        source: IndividualAddress,
        destination: KnxAddress,
        apci: Apci,
    ) -> Self {
        Self {
            destination,
            source,
            direction: TelegramDirection::Confirmation,
            apci,
        }
    }
}
