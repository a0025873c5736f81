//! Simulated game client
//!
//! Walks a [`LocalSource`] through the queue cycle the way the real client
//! moves through game flow phases, so the engine can be exercised without a
//! running game. The ready check resolves according to whether an accept
//! request reached the source while it was open.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::source::LocalSource;
use crate::types::{Phase, Profile, PushEvent, XpProgress};

/// XP granted per finished game
const XP_PER_GAME: u32 = 180;
/// Level span assumed for profiles without XP counters
const FIRST_LEVEL_XP: u32 = 1000;

/// Outcome of one queue cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Ready check accepted, game played
    Played,
    /// Ready check timed out, back to the lobby
    Missed,
}

/// Totals over a simulation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimReport {
    pub cycles: u32,
    pub games_played: u32,
    pub ready_checks_missed: u32,
}

impl SimReport {
    fn record(&mut self, outcome: CycleOutcome) {
        self.cycles += 1;
        match outcome {
            CycleOutcome::Played => self.games_played += 1,
            CycleOutcome::Missed => self.ready_checks_missed += 1,
        }
    }
}

/// Drives a [`LocalSource`] through lobby, queue, ready check and game
pub struct SimulatedClient {
    source: Arc<LocalSource>,
    step: Duration,
}

impl SimulatedClient {
    /// `step` is the time spent in each phase
    pub fn new(source: Arc<LocalSource>, step: Duration) -> Self {
        Self { source, step }
    }

    pub fn source(&self) -> &Arc<LocalSource> {
        &self.source
    }

    /// Bring the client up: connected, signed in, in the lobby
    pub async fn connect(&self, profile: Profile) {
        tracing::info!("Simulated client up as {}", profile.display_name);
        self.source.publish(PushEvent::ConnectivityChanged(true));
        self.source.publish(PushEvent::ProfileUpdated(Some(profile)));
        self.enter(Phase::Lobby).await;
    }

    /// Take the client down
    pub async fn disconnect(&self) {
        self.source.publish(PushEvent::PhaseChanged(Phase::None));
        self.source.publish(PushEvent::ConnectivityChanged(false));
        tracing::info!("Simulated client down");
    }

    /// Run `cycles` queue cycles, or forever when `cycles` is 0
    pub async fn run(&self, cycles: u32) -> SimReport {
        let mut report = SimReport::default();
        while cycles == 0 || report.cycles < cycles {
            let outcome = self.run_cycle().await;
            report.record(outcome);
            tracing::info!(
                "Cycle {} {:?} ({} played, {} missed)",
                report.cycles,
                outcome,
                report.games_played,
                report.ready_checks_missed
            );
        }
        report
    }

    /// One pass from the lobby through queue and ready check
    pub async fn run_cycle(&self) -> CycleOutcome {
        if self.source.state().phase != Phase::Lobby {
            self.enter(Phase::Lobby).await;
        }
        self.enter(Phase::Matchmaking).await;

        let accepts_before = self.source.action_calls();
        self.enter(Phase::ReadyCheck).await;

        if self.source.action_calls() == accepts_before {
            tracing::info!("Ready check timed out");
            self.enter(Phase::Matchmaking).await;
            self.enter(Phase::Lobby).await;
            return CycleOutcome::Missed;
        }

        self.source.publish(PushEvent::ActionCompleted(json!({
            "action": "accept_ready_check",
            "playerResponse": "Accepted",
        })));
        for phase in [
            Phase::ChampSelect,
            Phase::InProgress,
            Phase::WaitingForStats,
            Phase::EndOfGame,
        ] {
            self.enter(phase).await;
        }
        self.grant_xp();
        self.enter(Phase::Lobby).await;
        CycleOutcome::Played
    }

    async fn enter(&self, phase: Phase) {
        tracing::debug!("Simulated client entering {}", phase);
        self.source.publish(PushEvent::PhaseChanged(phase));
        tokio::time::sleep(self.step).await;
    }

    fn grant_xp(&self) {
        let Some(mut profile) = self.source.state().profile else {
            return;
        };
        let mut xp = profile.xp.unwrap_or(XpProgress {
            since_last_level: 0,
            until_next_level: FIRST_LEVEL_XP,
        });
        let mut gained = XP_PER_GAME;
        while gained >= xp.until_next_level && xp.until_next_level > 0 {
            gained -= xp.until_next_level;
            profile.level += 1;
            let total = xp.since_last_level + xp.until_next_level;
            xp.since_last_level = 0;
            xp.until_next_level = total;
        }
        xp.since_last_level += gained;
        xp.until_next_level = xp.until_next_level.saturating_sub(gained);
        profile.xp = Some(xp);
        self.source.publish(PushEvent::ProfileUpdated(Some(profile)));
    }
}
