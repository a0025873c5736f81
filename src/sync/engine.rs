//! Sync engine: push/poll reconciliation of the game client state
//!
//! The engine owns the held [`Snapshot`] and keeps it fresh from two
//! channels: push events (primary) and a slow background poll (backstop).
//!
//! Every update is stamped from a logical clock when it is dispatched (a poll
//! before its round trip, a push event on receipt, a local mutation on call).
//! Each field group remembers the stamp of its last write, and a group in an
//! incoming update only lands if it is not older. A poll that left before a
//! phase event therefore cannot clobber that phase when it returns late,
//! while its connectivity and profile still apply.
//!
//! Round trips capture the engine liveness token before they await. After
//! [`SyncEngine::stop`] the token is dead and late completions are dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::change;
use super::events::{EngineEvent, UpdateOrigin};
use super::stats::{bump, Counters, SyncStats};
use super::trigger::{perform_action, PhaseTrigger, TriggerState};
use super::visibility::VisibilityGate;
use crate::source::RemoteStateSource;
use crate::types::{
    ActionKind, EngineConfig, EventTopic, FieldGroup, Phase, Profile, PushEvent, Snapshot,
    TriggerPolicy,
};

/// A change to the held snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Remote-owned groups of a pulled snapshot (connectivity, phase, profile)
    Full(Snapshot),
    Phase(Phase),
    Connectivity(bool),
    Profile(Option<Profile>),
    Automation(bool),
}

impl Update {
    /// Field groups this update writes
    pub fn groups(&self) -> &'static [FieldGroup] {
        match self {
            Update::Full(_) => &[
                FieldGroup::Connectivity,
                FieldGroup::Phase,
                FieldGroup::Profile,
            ],
            Update::Phase(_) => &[FieldGroup::Phase],
            Update::Connectivity(_) => &[FieldGroup::Connectivity],
            Update::Profile(_) => &[FieldGroup::Profile],
            Update::Automation(_) => &[FieldGroup::Automation],
        }
    }

    fn write(&self, group: FieldGroup, target: &mut Snapshot) {
        match (self, group) {
            (Update::Full(s), FieldGroup::Connectivity) => target.connected = s.connected,
            (Update::Full(s), FieldGroup::Phase) => target.phase = s.phase,
            (Update::Full(s), FieldGroup::Profile) => target.profile = s.profile.clone(),
            (Update::Full(s), FieldGroup::Automation) => {
                target.automation_enabled = s.automation_enabled
            }
            (Update::Phase(phase), _) => target.phase = *phase,
            (Update::Connectivity(connected), _) => target.connected = *connected,
            (Update::Profile(profile), _) => target.profile = profile.clone(),
            (Update::Automation(enabled), _) => target.automation_enabled = *enabled,
        }
    }
}

/// Liveness token shared by everything dispatched during one run
#[derive(Debug, Clone)]
struct Liveness(Arc<AtomicBool>);

impl Liveness {
    fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    fn is_alive(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// A background listener, cancelled on stop
struct Subscription {
    name: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    fn spawn<F>(name: impl Into<String>, fut: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            name: name.into(),
            handle: tokio::spawn(fut),
        }
    }

    fn cancel(self) {
        tracing::debug!("Cancelling {} listener", self.name);
        self.handle.abort();
    }
}

struct Held {
    snapshot: Snapshot,
    /// Stamp of the last write per field group, indexed by `FieldGroup::index`
    stamps: [u64; 4],
}

struct Lifecycle {
    running: bool,
    liveness: Liveness,
    listeners: Vec<Subscription>,
}

struct Inner {
    source: Arc<dyn RemoteStateSource>,
    config: EngineConfig,
    visibility: VisibilityGate,
    trigger: PhaseTrigger,
    held: Mutex<Held>,
    clock: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
    counters: Arc<Counters>,
    lifecycle: Mutex<Lifecycle>,
}

/// Mirrors the game client state and drives the automated accept
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    /// Create a stopped engine holding the unknown snapshot
    pub fn new(
        source: Arc<dyn RemoteStateSource>,
        visibility: VisibilityGate,
        config: EngineConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let inner = Inner {
            source,
            visibility,
            trigger: PhaseTrigger::new(config.trigger_policy),
            held: Mutex::new(Held {
                snapshot: Snapshot::unknown(config.initial_automation),
                stamps: [0; 4],
            }),
            clock: AtomicU64::new(0),
            events,
            counters: Arc::new(Counters::default()),
            lifecycle: Mutex::new(Lifecycle {
                running: false,
                liveness: Liveness::new(),
                listeners: Vec::new(),
            }),
            config,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start syncing. Calling it on a running engine does nothing.
    ///
    /// Subscribes to the push topics, arms the poll timer and the visibility
    /// listener, then performs the initial pull. A failed subscription or
    /// initial pull is logged and leaves polling to catch up.
    pub async fn start(&self) {
        let liveness = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.running {
                tracing::debug!("Sync engine already running");
                return;
            }
            if !lifecycle.liveness.is_alive() {
                lifecycle.liveness = Liveness::new();
            }
            lifecycle.running = true;
            let liveness = lifecycle.liveness.clone();

            for topic in EventTopic::ALL {
                match self.inner.source.subscribe(topic) {
                    Ok(rx) => {
                        let inner = self.inner.clone();
                        let token = liveness.clone();
                        lifecycle.listeners.push(Subscription::spawn(
                            topic.as_str(),
                            async move { inner.event_loop(topic, rx, token).await },
                        ));
                    }
                    Err(e) => {
                        bump(&self.inner.counters.subscriptions_failed);
                        tracing::warn!("{}; falling back to polling for {}", e, topic);
                    }
                }
            }

            let inner = self.inner.clone();
            let token = liveness.clone();
            lifecycle.listeners.push(Subscription::spawn("poll timer", async move {
                inner.poll_loop(token).await
            }));

            let inner = self.inner.clone();
            let token = liveness.clone();
            lifecycle.listeners.push(Subscription::spawn("visibility", async move {
                inner.visibility_loop(token).await
            }));

            liveness
        };

        tracing::info!(
            "Sync engine started (poll every {:?}, {:?} trigger)",
            self.inner.config.poll_interval(),
            self.inner.config.trigger_policy
        );

        self.inner.pull_and_apply(&liveness, "initial").await;
    }

    /// Stop syncing. Calling it on a stopped engine does nothing.
    ///
    /// Listeners and the timer are cancelled before this returns; round
    /// trips still in flight complete without touching the snapshot.
    pub fn stop(&self) {
        let listeners = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.running {
                return;
            }
            {
                // Serialise with an apply that already passed its liveness check
                let _held = self.inner.held.lock();
                lifecycle.liveness.kill();
            }
            lifecycle.running = false;
            std::mem::take(&mut lifecycle.listeners)
        };

        for listener in listeners {
            listener.cancel();
        }
        tracing::info!("Sync engine stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().running
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.inner.held.lock().snapshot.clone()
    }

    /// Pull now, outside the timer cadence
    ///
    /// Safe to call concurrently with timer polls and push events. Failures
    /// are logged; the snapshot stays as it was.
    pub async fn refresh(&self) {
        let liveness = {
            let lifecycle = self.inner.lifecycle.lock();
            if !lifecycle.running {
                tracing::debug!("Refresh ignored, sync engine not running");
                return;
            }
            lifecycle.liveness.clone()
        };
        self.inner.pull_and_apply(&liveness, "refresh").await;
    }

    /// Turn the automated accept on or off
    ///
    /// Returns `true` if the snapshot changed.
    pub fn set_automation_enabled(&self, enabled: bool) -> bool {
        self.apply(Update::Automation(enabled))
    }

    /// Apply an update from the host side
    ///
    /// Accepted before start and while running, dropped after stop. Returns
    /// `true` if the snapshot changed.
    pub fn apply(&self, update: Update) -> bool {
        let liveness = self.inner.lifecycle.lock().liveness.clone();
        let stamp = self.inner.tick();
        self.inner
            .apply(update, stamp, UpdateOrigin::Local, &liveness)
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub fn stats(&self) -> SyncStats {
        self.inner.counters.snapshot()
    }

    pub fn trigger_state(&self) -> TriggerState {
        self.inner.trigger.state()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn visibility(&self) -> &VisibilityGate {
        &self.inner.visibility
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Inner {
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Merge `update` into the held snapshot
    fn apply(&self, update: Update, stamp: u64, origin: UpdateOrigin, liveness: &Liveness) -> bool {
        let (applied, action) = {
            let mut held = self.held.lock();
            if !liveness.is_alive() {
                bump(&self.counters.late_completions_discarded);
                tracing::debug!("Dropping {} update after stop", origin);
                return false;
            }

            let mut next = held.snapshot.clone();
            let mut phase_observed = false;
            for &group in update.groups() {
                let slot = group.index();
                if stamp < held.stamps[slot] {
                    bump(&self.counters.stale_groups_discarded);
                    tracing::debug!(
                        "Discarding stale {} from {} update (stamp {} < {})",
                        group,
                        origin,
                        stamp,
                        held.stamps[slot]
                    );
                    continue;
                }
                held.stamps[slot] = stamp;
                update.write(group, &mut next);
                phase_observed |= group == FieldGroup::Phase;
            }

            let changes = change::changed_groups(&held.snapshot, &next);
            let applied = !changes.is_empty();
            if applied {
                if held.snapshot.phase != next.phase {
                    tracing::info!(
                        "Game flow phase: {} -> {} ({})",
                        held.snapshot.phase,
                        next.phase,
                        origin
                    );
                }
                tracing::debug!("Applied {} update, changed {:?}", origin, changes);
                held.snapshot = next.clone();
                bump(&self.counters.updates_applied);
                let _ = self
                    .events
                    .send(EngineEvent::snapshot_changed(next, changes, origin));
            } else {
                bump(&self.counters.updates_suppressed);
            }

            // Decided under the lock so the trigger sees phases in apply order
            let consult = applied
                || (phase_observed && self.trigger.policy() == TriggerPolicy::EveryObservation);
            let action = if consult {
                self.trigger
                    .on_phase_observed(held.snapshot.phase, held.snapshot.automation_enabled)
            } else {
                None
            };
            (applied, action)
        };

        if let Some(kind) = action {
            self.dispatch_action(kind, liveness.clone());
        }
        applied
    }

    /// Issue `kind` in the background; its outcome is logged and published
    fn dispatch_action(&self, kind: ActionKind, liveness: Liveness) {
        bump(&self.counters.actions_issued);

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                bump(&self.counters.actions_failed);
                tracing::error!("No async runtime available, {} not issued", kind);
                return;
            }
        };

        let source = self.source.clone();
        let events = self.events.clone();
        let counters = self.counters.clone();
        handle.spawn(async move {
            let result = perform_action(source.as_ref(), kind).await;
            if result.is_err() {
                bump(&counters.actions_failed);
            }
            if liveness.is_alive() {
                let _ = events.send(EngineEvent::action_finished(kind, &result));
            }
        });
    }

    async fn pull_and_apply(&self, liveness: &Liveness, reason: &str) -> bool {
        let stamp = self.tick();
        bump(&self.counters.polls_started);

        match self.source.pull().await {
            Ok(snapshot) => {
                self.apply(Update::Full(snapshot), stamp, UpdateOrigin::Poll, liveness);
                true
            }
            Err(e) => {
                bump(&self.counters.polls_failed);
                if liveness.is_alive() {
                    tracing::warn!("Pull ({}) failed, keeping previous snapshot: {}", reason, e);
                } else {
                    bump(&self.counters.late_completions_discarded);
                }
                false
            }
        }
    }

    async fn poll_loop(self: Arc<Self>, liveness: Liveness) {
        let mut failures: u32 = 0;
        loop {
            tokio::time::sleep(self.config.backoff_delay(failures)).await;
            if !liveness.is_alive() {
                break;
            }
            if !self.visibility.is_visible() {
                bump(&self.counters.polls_skipped_hidden);
                tracing::trace!("Window hidden, skipping poll");
                continue;
            }
            if self.pull_and_apply(&liveness, "timer").await {
                failures = 0;
            } else {
                failures = failures.saturating_add(1);
                tracing::debug!(
                    "{} consecutive poll failures, next poll in {:?}",
                    failures,
                    self.config.backoff_delay(failures)
                );
            }
        }
    }

    async fn visibility_loop(self: Arc<Self>, liveness: Liveness) {
        let mut rx = self.visibility.watch();
        let mut visible = *rx.borrow_and_update();

        while rx.changed().await.is_ok() {
            let now = *rx.borrow_and_update();
            if now && !visible && liveness.is_alive() {
                tracing::debug!("Window revealed, resyncing");
                let inner = self.clone();
                let token = liveness.clone();
                tokio::spawn(async move {
                    inner.pull_and_apply(&token, "reveal").await;
                });
            }
            visible = now;
        }
    }

    async fn event_loop(
        self: Arc<Self>,
        topic: EventTopic,
        mut rx: broadcast::Receiver<PushEvent>,
        liveness: Liveness,
    ) {
        loop {
            match rx.recv().await {
                Ok(event) => self.handle_event(event, &liveness),
                Err(RecvError::Lagged(missed)) => {
                    if !self.visibility.is_visible() {
                        // The reveal pull resyncs
                        bump(&self.counters.polls_skipped_hidden);
                        tracing::debug!("Missed {} {} events while hidden", missed, topic);
                        continue;
                    }
                    tracing::warn!("Missed {} {} events, resyncing", missed, topic);
                    self.pull_and_apply(&liveness, "lagged").await;
                }
                Err(RecvError::Closed) => {
                    tracing::warn!("{} channel closed, relying on polling", topic);
                    break;
                }
            }
        }
    }

    fn handle_event(&self, event: PushEvent, liveness: &Liveness) {
        bump(&self.counters.events_received);
        if !liveness.is_alive() {
            bump(&self.counters.late_completions_discarded);
            return;
        }
        if self.config.gate_events_when_hidden && !self.visibility.is_visible() {
            bump(&self.counters.events_skipped_hidden);
            return;
        }

        let stamp = self.tick();
        let update = match event {
            PushEvent::PhaseChanged(phase) => Update::Phase(phase),
            PushEvent::ConnectivityChanged(connected) => Update::Connectivity(connected),
            PushEvent::ProfileUpdated(profile) => Update::Profile(profile),
            PushEvent::ActionCompleted(payload) => {
                tracing::info!("Game client completed an action: {}", payload);
                let _ = self.events.send(EngineEvent::action_completed(payload));
                return;
            }
        };
        self.apply(update, stamp, UpdateOrigin::Push, liveness);
    }
}
