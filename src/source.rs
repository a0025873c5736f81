//! Remote state source abstraction
//!
//! The game client is reached through a [`RemoteStateSource`]: a pull for the
//! full state, per-topic push channels and an action request. Transport and
//! authentication live behind the trait.
//!
//! [`LocalSource`] keeps the remote state in memory. It backs the simulator
//! and the tests, and lets a host that already owns the state feed it into
//! a [`SyncEngine`](crate::sync::SyncEngine) directly.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::{MiceptError, Result};
use crate::types::{ActionKind, EventTopic, PushEvent, Snapshot};

/// Capacity of each push topic channel
const TOPIC_CAPACITY: usize = 64;

/// Access to the state of the game client
#[async_trait]
pub trait RemoteStateSource: Send + Sync {
    /// Fetch the full current state
    async fn pull(&self) -> Result<Snapshot>;

    /// Subscribe to one push event family
    fn subscribe(&self, topic: EventTopic) -> Result<broadcast::Receiver<PushEvent>>;

    /// Ask the game client to perform a side effect
    async fn request_action(&self, kind: ActionKind) -> Result<()>;
}

/// In-memory remote state with failure injection
pub struct LocalSource {
    state: Mutex<Snapshot>,
    topics: HashMap<EventTopic, broadcast::Sender<PushEvent>>,
    pull_calls: AtomicU64,
    action_calls: AtomicU64,
    failures: Mutex<Failures>,
    /// `true` while pulls are held back
    hold: watch::Sender<bool>,
}

#[derive(Default)]
struct Failures {
    pull: Option<String>,
    action: Option<String>,
    topics: HashSet<EventTopic>,
}

impl LocalSource {
    pub fn new(initial: Snapshot) -> Self {
        let topics = EventTopic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(TOPIC_CAPACITY).0))
            .collect();
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(initial),
            topics,
            pull_calls: AtomicU64::new(0),
            action_calls: AtomicU64::new(0),
            failures: Mutex::new(Failures::default()),
            hold,
        }
    }

    /// Current remote state
    pub fn state(&self) -> Snapshot {
        self.state.lock().clone()
    }

    /// Replace the state returned by subsequent pulls (no event is sent)
    pub fn set_state(&self, snapshot: Snapshot) {
        *self.state.lock() = snapshot;
    }

    /// Mutate the state returned by subsequent pulls (no event is sent)
    pub fn update_state(&self, f: impl FnOnce(&mut Snapshot)) {
        f(&mut self.state.lock());
    }

    /// Deliver a push event to current subscribers of its topic
    ///
    /// Returns the number of receivers that got the event. The pull state is
    /// left alone; use [`publish`](Self::publish) to keep both in step.
    pub fn emit(&self, event: PushEvent) -> usize {
        match self.topics.get(&event.topic()) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Apply an event to the pull state and deliver it
    pub fn publish(&self, event: PushEvent) -> usize {
        {
            let mut state = self.state.lock();
            match &event {
                PushEvent::PhaseChanged(phase) => state.phase = *phase,
                PushEvent::ConnectivityChanged(connected) => state.connected = *connected,
                PushEvent::ProfileUpdated(profile) => state.profile = profile.clone(),
                PushEvent::ActionCompleted(_) => {}
            }
        }
        self.emit(event)
    }

    /// Number of live receivers on a topic
    pub fn subscriber_count(&self, topic: EventTopic) -> usize {
        self.topics
            .get(&topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn pull_calls(&self) -> u64 {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn action_calls(&self) -> u64 {
        self.action_calls.load(Ordering::SeqCst)
    }

    /// Make pulls fail with `reason` (`None` restores them)
    pub fn fail_pulls(&self, reason: Option<&str>) {
        self.failures.lock().pull = reason.map(str::to_string);
    }

    /// Make action requests fail with `reason` (`None` restores them)
    pub fn fail_actions(&self, reason: Option<&str>) {
        self.failures.lock().action = reason.map(str::to_string);
    }

    /// Make subscriptions to `topic` fail
    pub fn refuse_topic(&self, topic: EventTopic) {
        self.failures.lock().topics.insert(topic);
    }

    /// Hold pulls after they captured the state until [`release_pulls`](Self::release_pulls)
    pub fn hold_pulls(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_pulls(&self) {
        self.hold.send_replace(false);
    }
}

impl Default for LocalSource {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}

#[async_trait]
impl RemoteStateSource for LocalSource {
    async fn pull(&self) -> Result<Snapshot> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().pull.clone();
        if let Some(reason) = failure {
            return Err(MiceptError::Pull(reason));
        }

        // Captured before the hold so a held pull returns the state as of dispatch
        let snapshot = self.state();

        let mut hold = self.hold.subscribe();
        hold.wait_for(|held| !*held)
            .await
            .map_err(|_| MiceptError::ChannelClosed("pull hold".to_string()))?;

        Ok(snapshot)
    }

    fn subscribe(&self, topic: EventTopic) -> Result<broadcast::Receiver<PushEvent>> {
        if self.failures.lock().topics.contains(&topic) {
            return Err(MiceptError::Subscription {
                topic,
                reason: "topic refused".to_string(),
            });
        }
        self.topics
            .get(&topic)
            .map(|sender| sender.subscribe())
            .ok_or_else(|| MiceptError::Subscription {
                topic,
                reason: "unknown topic".to_string(),
            })
    }

    async fn request_action(&self, kind: ActionKind) -> Result<()> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().action.clone();
        if let Some(reason) = failure {
            return Err(MiceptError::Action(reason));
        }
        tracing::debug!("Local source performed {}", kind);
        Ok(())
    }
}
