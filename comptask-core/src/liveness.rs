//! Heartbeat tracking and the safe-state latch.
//!
//! The supervisor keeps two independent pieces of state: the state the
//! process would report on its own (`actual`) and whether it has been
//! forced into safe-state (`nominal`). Heartbeat loss and the safe-state
//! command only ever touch the latch; the activate command is the only
//! way back out.

use crate::clock::Timestamp;
use crate::state::{resolved_state, NominalState, ProcessState};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct HeartbeatTracker {
    count: u64,
    loss_count: u64,
    last_heartbeat: Option<Timestamp>,
    timeout: Duration,
    loss_deadline: Timestamp,
}

impl HeartbeatTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            count: 0,
            loss_count: 0,
            last_heartbeat: None,
            timeout,
            loss_deadline: Timestamp::ZERO,
        }
    }

    pub fn on_heartbeat_received(&mut self, now: Timestamp) {
        self.count += 1;
        self.last_heartbeat = Some(now);
        self.loss_deadline = now.add(self.timeout);
    }

    /// True once per loss episode: past the deadline with heartbeats
    /// received since the last flagged loss.
    pub fn check_loss(&mut self, now: Timestamp) -> bool {
        if self.loss_count != self.count && now > self.loss_deadline {
            self.loss_count = self.count;
            true
        } else {
            false
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn loss_deadline(&self) -> Timestamp {
        self.loss_deadline
    }

    pub fn last_heartbeat(&self) -> Option<Timestamp> {
        self.last_heartbeat
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone)]
pub struct LivenessSupervisor {
    tracker: HeartbeatTracker,
    actual: ProcessState,
    nominal: NominalState,
}

impl LivenessSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tracker: HeartbeatTracker::new(timeout),
            actual: ProcessState::Init,
            nominal: NominalState::Nominal,
        }
    }

    pub fn on_heartbeat_received(&mut self, now: Timestamp) {
        self.tracker.on_heartbeat_received(now);
    }

    /// Latches safe-state if heartbeats have stopped. Returns true when
    /// the latch was set by this call.
    pub fn check_loss(&mut self, now: Timestamp) -> bool {
        if !self.tracker.check_loss(now) {
            return false;
        }
        warn!(
            "Heartbeats lost - assumed safe-state (last heartbeat {:?}, deadline {})",
            self.tracker.last_heartbeat(),
            self.tracker.loss_deadline()
        );
        self.nominal = NominalState::Safe;
        true
    }

    pub fn force_safe(&mut self) {
        self.nominal = NominalState::Safe;
    }

    /// Clears the safe-state latch. The actual state is left untouched.
    pub fn activate(&mut self) {
        self.nominal = NominalState::Nominal;
    }

    pub fn set_actual(&mut self, state: ProcessState) {
        self.actual = state;
    }

    pub fn actual(&self) -> ProcessState {
        self.actual
    }

    pub fn nominal(&self) -> NominalState {
        self.nominal
    }

    pub fn resolved_state(&self) -> ProcessState {
        resolved_state(self.actual, self.nominal)
    }

    pub fn tracker(&self) -> &HeartbeatTracker {
        &self.tracker
    }

    pub fn heartbeat_count(&self) -> u64 {
        self.tracker.count()
    }
}
