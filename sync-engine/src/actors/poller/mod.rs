//! PollerActor - watches version chains while generation jobs are in flight.
//!
//! One actor serves every document key of a view. Each polling session owns
//! a timer task that casts `Tick` into the actor; each tick spawns a refresh
//! whose result comes back as `Refreshed`, so sessions for different keys
//! interleave without blocking each other. A session settles the first time
//! the chain's latest id differs from its baseline.

mod messages;
mod state;

use async_trait::async_trait;
use chrono::Utc;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use shared_types::{DocumentKey, PollState, SettlementEvent, VersionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use messages::{PollerError, PollerMsg};
pub use state::{PollSession, PollerState};

use state::TrackedSession;

use crate::versions::VersionStore;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

const SETTLEMENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct PollerActor;

pub struct PollerArguments {
    pub store: Arc<VersionStore>,
    pub interval: Duration,
    pub events: broadcast::Sender<SettlementEvent>,
}

#[async_trait]
impl Actor for PollerActor {
    type Msg = PollerMsg;
    type State = PollerState;
    type Arguments = PollerArguments;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            actor_id = %myself.get_id(),
            interval_ms = args.interval.as_millis() as u64,
            "PollerActor starting"
        );
        Ok(PollerState {
            store: args.store,
            interval: args.interval,
            events: args.events,
            sessions: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PollerMsg::Start { key, reply } => {
                let recorded = self.handle_start(&myself, state, key);
                let _ = reply.send(recorded);
            }
            PollerMsg::Tick { key, generation } => {
                self.handle_tick(&myself, state, key, generation);
            }
            PollerMsg::Refreshed {
                key,
                generation,
                result,
            } => {
                self.handle_refreshed(state, key, generation, result);
            }
            PollerMsg::Cancel { key } => {
                Self::cancel_session(state, &key);
            }
            PollerMsg::CancelMany { keys, reply } => {
                let cancelled = keys
                    .iter()
                    .filter(|key| Self::cancel_session(state, key))
                    .count();
                let _ = reply.send(cancelled);
            }
            PollerMsg::GetState { key, reply } => {
                let current = state
                    .sessions
                    .get(&key)
                    .map(|tracked| tracked.session.state().clone())
                    .unwrap_or(PollState::Idle);
                let _ = reply.send(current);
            }
            PollerMsg::ActiveKeys { reply } => {
                let keys = state
                    .sessions
                    .iter()
                    .filter(|(_, tracked)| tracked.session.is_polling())
                    .map(|(key, _)| key.clone())
                    .collect();
                let _ = reply.send(keys);
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let active = state.sessions.len();
        for tracked in state.sessions.values_mut() {
            tracked.stop_timer();
            tracked.session.cancel();
        }
        tracing::info!(
            actor_id = %myself.get_id(),
            sessions = active,
            "PollerActor stopped"
        );
        Ok(())
    }
}

impl PollerActor {
    fn handle_start(
        &self,
        myself: &ActorRef<PollerMsg>,
        state: &mut PollerState,
        key: DocumentKey,
    ) -> PollState {
        // Baseline is whatever the store holds right now, so a restart never
        // compares against an id that has already been superseded.
        let baseline = state.store.latest_id(&key);
        let interval = state.interval;
        let tracked = state
            .sessions
            .entry(key.clone())
            .or_insert_with(TrackedSession::new);

        if tracked.session.is_polling() {
            tracing::info!(
                document = %key,
                "Restarting polling session with fresh baseline"
            );
        }
        tracked.stop_timer();
        let generation = tracked.session.start(baseline.clone());
        tracked.timer = Some(spawn_ticker(
            myself.clone(),
            key.clone(),
            generation,
            interval,
        ));

        tracing::info!(
            document = %key,
            baseline = ?baseline.as_ref().map(VersionId::as_str),
            generation = generation,
            "Polling session started"
        );
        tracked.session.state().clone()
    }

    fn handle_tick(
        &self,
        myself: &ActorRef<PollerMsg>,
        state: &mut PollerState,
        key: DocumentKey,
        generation: u64,
    ) {
        let Some(tracked) = state.sessions.get_mut(&key) else {
            return;
        };
        if !tracked.session.accepts(generation) {
            tracing::debug!(document = %key, generation = generation, "Ignoring tick from old session");
            return;
        }
        if tracked.refresh_in_flight {
            tracing::debug!(document = %key, "Previous refresh still in flight; skipping tick");
            return;
        }
        tracked.refresh_in_flight = true;

        let store = state.store.clone();
        let reply_to = myself.clone();
        tokio::spawn(async move {
            let result = store.refresh(&key).await.map(|_| ());
            let _ = reply_to.cast(PollerMsg::Refreshed {
                key,
                generation,
                result,
            });
        });
    }

    fn handle_refreshed(
        &self,
        state: &mut PollerState,
        key: DocumentKey,
        generation: u64,
        result: Result<(), crate::versions::VersionStoreError>,
    ) {
        let Some(tracked) = state.sessions.get_mut(&key) else {
            return;
        };
        if !tracked.session.accepts(generation) {
            tracing::debug!(document = %key, generation = generation, "Ignoring refresh from old session");
            return;
        }
        tracked.refresh_in_flight = false;

        if let Err(e) = result {
            // Transient: keep polling, surface nothing.
            tracing::warn!(document = %key, error = %e, "Poll refresh failed; will retry");
            return;
        }

        let latest = state.store.latest_id(&key);
        let Some(version_id) = tracked.session.observe(latest.as_ref()) else {
            return;
        };

        tracked.stop_timer();
        if let Err(e) = state.store.select(&key, &version_id) {
            tracing::warn!(document = %key, error = %e, "Failed to select settled version");
        }
        tracing::info!(
            document = %key,
            version_id = %version_id,
            ticks = tracked.session.ticks(),
            "Polling session settled"
        );

        let event = SettlementEvent {
            key,
            version_id,
            settled_at: Utc::now(),
        };
        if state.events.send(event).is_err() {
            tracing::debug!("No settlement subscribers");
        }
    }

    /// Returns true if a polling session was actually cancelled.
    fn cancel_session(state: &mut PollerState, key: &DocumentKey) -> bool {
        let Some(tracked) = state.sessions.get_mut(key) else {
            return false;
        };
        let was_polling = tracked.session.is_polling();
        tracked.stop_timer();
        tracked.session.cancel();
        if was_polling {
            tracing::info!(document = %key, "Polling session cancelled");
        }
        was_polling
    }
}

fn spawn_ticker(
    actor: ActorRef<PollerMsg>,
    key: DocumentKey,
    generation: u64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let tick = PollerMsg::Tick {
                key: key.clone(),
                generation,
            };
            if actor.cast(tick).is_err() {
                break;
            }
        }
    })
}

/// Handle to a running [`PollerActor`].
#[derive(Clone)]
pub struct PollingController {
    actor: ActorRef<PollerMsg>,
    store: Arc<VersionStore>,
    events: broadcast::Sender<SettlementEvent>,
}

impl PollingController {
    pub async fn spawn(
        store: Arc<VersionStore>,
        interval: Duration,
    ) -> Result<(Self, JoinHandle<()>), PollerError> {
        let (events, _) = broadcast::channel(SETTLEMENT_CHANNEL_CAPACITY);
        let args = PollerArguments {
            store: store.clone(),
            interval,
            events: events.clone(),
        };
        let (actor, handle) = Actor::spawn(None, PollerActor, args)
            .await
            .map_err(|e| PollerError::Spawn(e.to_string()))?;
        Ok((
            Self {
                actor,
                store,
                events,
            },
            handle,
        ))
    }

    /// Start or restart the session for `key`. Resolves once the baseline
    /// has been recorded.
    ///
    /// A key the store has never fetched is fetched first, so the baseline
    /// is the backend's current latest rather than an empty placeholder.
    pub async fn start(&self, key: &DocumentKey) -> Result<PollState, PollerError> {
        if !self.store.is_fetched(key) {
            self.store.refresh(key).await?;
        }
        ractor::call!(self.actor, |reply| PollerMsg::Start {
            key: key.clone(),
            reply,
        })
        .map_err(|e| PollerError::Rpc(e.to_string()))
    }

    /// Stop polling `key` without touching its selected pointer.
    pub fn cancel(&self, key: &DocumentKey) -> Result<(), PollerError> {
        self.actor
            .cast(PollerMsg::Cancel { key: key.clone() })
            .map_err(|e| PollerError::Rpc(e.to_string()))
    }

    /// Cancel every listed key; returns how many were still polling.
    pub async fn cancel_many(&self, keys: Vec<DocumentKey>) -> Result<usize, PollerError> {
        ractor::call!(self.actor, |reply| PollerMsg::CancelMany { keys, reply })
            .map_err(|e| PollerError::Rpc(e.to_string()))
    }

    pub async fn state(&self, key: &DocumentKey) -> Result<PollState, PollerError> {
        ractor::call!(self.actor, |reply| PollerMsg::GetState {
            key: key.clone(),
            reply,
        })
        .map_err(|e| PollerError::Rpc(e.to_string()))
    }

    pub async fn active_keys(&self) -> Result<Vec<DocumentKey>, PollerError> {
        ractor::call!(self.actor, |reply| PollerMsg::ActiveKeys { reply })
            .map_err(|e| PollerError::Rpc(e.to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettlementEvent> {
        self.events.subscribe()
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }
}
