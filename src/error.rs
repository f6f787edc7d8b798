// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Error kinds produced by the codec and crypto layers.
//!
//! Parse and crypto errors are recovered locally by the callers that can
//! (the transport dispatch path, the Secure unwrap path): they log and
//! discard rather than propagate. [`KnxIpError::Communication`] and
//! [`KnxIpError::Timeout`] are the two kinds that are allowed to bubble out
//! of `connect()`/`send()` to application code, usually wrapped in
//! `anyhow::Error` the way an I/O failure at the edge of the process is.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KnxIpError {
    #[error("invalid address {raw:?}: {reason}")]
    ParseAddress { raw: String, reason: &'static str },

    #[error("KNX/IP parse error in {context}: {reason}")]
    KnxIpParse {
        context: &'static str,
        reason: String,
    },

    #[error("incomplete frame: need {needed} more byte(s)")]
    IncompleteFrame { needed: usize },

    #[error("unsupported service type 0x{0:04x}")]
    UnsupportedServiceType(u16),

    #[error("CEMI message code 0x{0:02x} cannot be represented as a Telegram")]
    UnsupportedCemi(u8),

    #[error("APCI payload conversion failed: {0}")]
    Conversion(String),

    #[error("secure validation failed: {0}")]
    SecureValidation(&'static str),

    #[error("communication failure: {0}")]
    Communication(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, KnxIpError>;
