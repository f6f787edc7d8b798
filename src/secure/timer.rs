// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The secure-routing 48-bit millisecond timer: replay protection and
//! time-keeper/follower role negotiation (AN159 §5.6).

use crate::constants::DEFAULT_LATENCY_TOLERANCE_MS;

/// Derived scheduling windows for a given `latency_tolerance_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTolerances {
    pub latency_tolerance_ms: u64,
    pub sync_latency_tolerance_ms: u64,
    pub min_delay_keeper_periodic_ms: u64,
    pub max_delay_keeper_periodic_ms: u64,
    pub min_delay_follower_periodic_ms: u64,
    pub max_delay_follower_periodic_ms: u64,
    pub min_delay_keeper_update_ms: u64,
    pub max_delay_keeper_update_ms: u64,
    pub min_delay_follower_update_ms: u64,
    pub max_delay_follower_update_ms: u64,
}

impl TimerTolerances {
    pub fn derive(latency_tolerance_ms: u64) -> Self {
        let sync = latency_tolerance_ms / 10;
        let min_keeper_periodic = 10_000;
        let max_keeper_periodic = min_keeper_periodic + 3 * sync;
        let min_follower_periodic = max_keeper_periodic + sync;
        let max_follower_periodic = min_follower_periodic + 10 * sync;
        let min_keeper_update = 100;
        let max_keeper_update = min_keeper_update + sync;
        let min_follower_update = max_keeper_update + sync;
        let max_follower_update = min_follower_update + 10 * sync;
        Self {
            latency_tolerance_ms,
            sync_latency_tolerance_ms: sync,
            min_delay_keeper_periodic_ms: min_keeper_periodic,
            max_delay_keeper_periodic_ms: max_keeper_periodic,
            min_delay_follower_periodic_ms: min_follower_periodic,
            max_delay_follower_periodic_ms: max_follower_periodic,
            min_delay_keeper_update_ms: min_keeper_update,
            max_delay_keeper_update_ms: max_keeper_update,
            min_delay_follower_update_ms: min_follower_update,
            max_delay_follower_update_ms: max_follower_update,
        }
    }
}

impl Default for TimerTolerances {
    fn default() -> Self {
        Self::derive(DEFAULT_LATENCY_TOLERANCE_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRole {
    Keeper,
    Follower,
}

/// The outcome of evaluating a received timer value against the local
/// clock, per §4.9's four-way split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// `T_rx > T_loc`: adopt the remote offset and become a follower.
    AdoptAndFollow,
    /// `T_loc - S < T_rx <= T_loc`: accept, reschedule the periodic notify.
    AcceptAndReschedule,
    /// `T_loc - L < T_rx <= T_loc - S`: accept, no rescheduling.
    AcceptNoReschedule,
    /// `T_rx <= T_loc - L`: stale/replayed, discard and (if none already
    /// pending) schedule an update notify.
    Discard { schedule_update: bool },
}

/// A 48-bit millisecond timer value, `monotonic_ms(t) + offset`.
pub type TimerValue = u64;

pub const TIMER_MASK: u64 = (1u64 << 48) - 1;

/// The secure-routing timer state machine: role, clock offset, and whether
/// an update notify is already pending.
pub struct SecureTimerState {
    pub role: TimerRole,
    pub offset: i64,
    pub pending_update: bool,
    tolerances: TimerTolerances,
}

impl SecureTimerState {
    pub fn new(tolerances: TimerTolerances) -> Self {
        Self {
            role: TimerRole::Keeper,
            offset: 0,
            pending_update: false,
            tolerances,
        }
    }

    pub fn tolerances(&self) -> &TimerTolerances {
        &self.tolerances
    }

    pub fn local_timer_value(&self, monotonic_ms: u64) -> TimerValue {
        ((monotonic_ms as i64 + self.offset) as u64) & TIMER_MASK
    }

    /// Evaluate a received timer value `t_rx` against the local value
    /// `t_loc` and update role/offset/pending_update accordingly.
    pub fn evaluate(&mut self, t_rx: TimerValue, t_loc: TimerValue) -> TimerEvent {
        let s = self.tolerances.sync_latency_tolerance_ms;
        let l = self.tolerances.latency_tolerance_ms;

        if t_rx > t_loc {
            self.offset += (t_rx as i64) - (t_loc as i64);
            self.role = TimerRole::Follower;
            self.pending_update = false;
            TimerEvent::AdoptAndFollow
        } else if t_loc.saturating_sub(t_rx) < s {
            self.pending_update = false;
            TimerEvent::AcceptAndReschedule
        } else if t_loc.saturating_sub(t_rx) < l {
            TimerEvent::AcceptNoReschedule
        } else {
            let schedule_update = !self.pending_update;
            self.pending_update = true;
            TimerEvent::Discard { schedule_update }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tolerances_match_default_latency() {
        let t = TimerTolerances::derive(1000);
        assert_eq!(t.sync_latency_tolerance_ms, 100);
        assert_eq!(t.min_delay_keeper_periodic_ms, 10_000);
        assert_eq!(t.max_delay_keeper_periodic_ms, 10_300);
        assert_eq!(t.min_delay_follower_periodic_ms, 10_400);
        assert_eq!(t.max_delay_follower_periodic_ms, 11_400);
        assert_eq!(t.min_delay_keeper_update_ms, 100);
        assert_eq!(t.max_delay_keeper_update_ms, 200);
        assert_eq!(t.min_delay_follower_update_ms, 300);
        assert_eq!(t.max_delay_follower_update_ms, 1_300);
    }

    #[test]
    fn newer_timer_value_is_adopted_and_becomes_follower() {
        let mut state = SecureTimerState::new(TimerTolerances::derive(1000));
        let event = state.evaluate(5_000, 4_000);
        assert_eq!(event, TimerEvent::AdoptAndFollow);
        assert_eq!(state.role, TimerRole::Follower);
        assert_eq!(state.offset, 1_000);
    }

    #[test]
    fn stale_beyond_tolerance_is_discarded_and_schedules_one_update() {
        let mut state = SecureTimerState::new(TimerTolerances::derive(1000));
        let first = state.evaluate(0, 2_000);
        assert_eq!(first, TimerEvent::Discard { schedule_update: true });
        let second = state.evaluate(0, 2_000);
        assert_eq!(second, TimerEvent::Discard { schedule_update: false });
    }

    #[test]
    fn slightly_stale_within_sync_tolerance_reschedules() {
        let mut state = SecureTimerState::new(TimerTolerances::derive(1000));
        let event = state.evaluate(1_950, 2_000);
        assert_eq!(event, TimerEvent::AcceptAndReschedule);
    }

    #[test]
    fn stale_within_latency_tolerance_accepts_without_reschedule() {
        let mut state = SecureTimerState::new(TimerTolerances::derive(1000));
        let event = state.evaluate(1_500, 2_000);
        assert_eq!(event, TimerEvent::AcceptNoReschedule);
    }
}
