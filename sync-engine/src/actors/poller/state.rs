//! PollerActor state types.
//!
//! [`PollSession`] is the per-key state machine
//! `Idle -> Polling -> Settled`, free of timers and I/O so it can be driven
//! directly in tests.

use shared_types::{DocumentKey, PollState, SettlementEvent, VersionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::versions::VersionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSession {
    state: PollState,
    /// Incremented on every start; ticks and refresh results carry it so
    /// events from a superseded session are recognised and ignored
    generation: u64,
    ticks: u32,
}

impl Default for PollSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PollSession {
    pub fn new() -> Self {
        Self {
            state: PollState::Idle,
            generation: 0,
            ticks: 0,
        }
    }

    /// Enter `Polling` with `baseline` as the id that must change.
    /// Restarting an active session replaces its baseline.
    pub fn start(&mut self, baseline: Option<VersionId>) -> u64 {
        self.generation += 1;
        self.ticks = 0;
        self.state = PollState::Polling { baseline };
        self.generation
    }

    /// Feed the latest id seen after a refresh. Returns the new version id
    /// exactly once, on the transition to `Settled`.
    pub fn observe(&mut self, latest: Option<&VersionId>) -> Option<VersionId> {
        let PollState::Polling { baseline } = &self.state else {
            return None;
        };
        self.ticks += 1;
        let latest = latest?;
        if baseline.as_ref() == Some(latest) {
            return None;
        }
        let settled = latest.clone();
        self.state = PollState::Settled {
            version_id: settled.clone(),
        };
        Some(settled)
    }

    /// Force `Polling -> Idle`. No effect in other states.
    pub fn cancel(&mut self) {
        if self.state.is_polling() {
            self.state = PollState::Idle;
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_polling(&self) -> bool {
        self.state.is_polling()
    }

    pub fn accepts(&self, generation: u64) -> bool {
        self.is_polling() && self.generation == generation
    }
}

pub(crate) struct TrackedSession {
    pub session: PollSession,
    pub timer: Option<JoinHandle<()>>,
    pub refresh_in_flight: bool,
}

impl TrackedSession {
    pub fn new() -> Self {
        Self {
            session: PollSession::new(),
            timer: None,
            refresh_in_flight: false,
        }
    }

    pub fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.refresh_in_flight = false;
    }
}

pub struct PollerState {
    pub(crate) store: Arc<VersionStore>,
    pub(crate) interval: Duration,
    pub(crate) events: broadcast::Sender<SettlementEvent>,
    pub(crate) sessions: HashMap<DocumentKey, TrackedSession>,
}
