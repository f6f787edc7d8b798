// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The bounded telegram inbox/outbox FIFO sitting between the connection
//! state machines and application code.

use tokio::sync::{mpsc, Mutex};

use crate::{error::KnxIpError, telegram::Telegram};

/// A bounded FIFO of [`Telegram`]s. Used both as the inbox (network ->
/// application) and the outbox (application -> network); the two directions
/// never share an instance.
pub struct TelegramQueue {
    tx: mpsc::Sender<Telegram>,
    rx: Mutex<mpsc::Receiver<Telegram>>,
}

impl TelegramQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// A cloneable sender, for handing to the dispatch path without sharing
    /// `&self` across tasks.
    pub fn sender(&self) -> mpsc::Sender<Telegram> {
        self.tx.clone()
    }

    /// Non-blocking push used on the network receive path: a full queue is
    /// dropped with a warning rather than stalling reception.
    pub fn try_push(&self, telegram: Telegram) -> bool {
        match self.tx.try_send(telegram) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("telegram queue full, dropping incoming telegram");
                false
            },
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("telegram queue closed, dropping incoming telegram");
                false
            },
        }
    }

    /// Blocking push used on the application submission path.
    pub async fn push(&self, telegram: Telegram) -> Result<(), KnxIpError> {
        self.tx
            .send(telegram)
            .await
            .map_err(|_| KnxIpError::Communication("telegram queue closed".into()))
    }

    pub async fn recv(&self) -> Option<Telegram> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        address::{GroupAddress, IndividualAddress, KnxAddress},
        apci::Apci,
    };

    fn sample_telegram() -> Telegram {
        Telegram::incoming(
            IndividualAddress::from_raw(1),
            KnxAddress::Group(GroupAddress::from_raw(1)),
            Apci::GroupValueRead,
        )
    }

    #[tokio::test]
    async fn push_then_recv_round_trips() {
        let queue = TelegramQueue::new(4);
        queue.push(sample_telegram()).await.expect("push");
        let received = queue.recv().await.expect("recv");
        assert_eq!(received, sample_telegram());
    }

    #[tokio::test]
    async fn try_push_drops_when_full_instead_of_blocking() {
        let queue = TelegramQueue::new(1);
        assert!(queue.try_push(sample_telegram()));
        assert!(!queue.try_push(sample_telegram()));
    }
}
