//! Guarded one-shot automation on game flow phases
//!
//! [`PhaseTrigger`] decides when the ready check gets accepted automatically.
//! Under [`TriggerPolicy::Guarded`] it fires once per entry into the
//! qualifying phase: redundant observations of the same phase from the push
//! and poll channels do not fire again, leaving the phase re-arms it.
//!
//! A failed accept keeps the trigger fired. The request is not retried within
//! the same phase entry.

use parking_lot::Mutex;

use crate::error::Result;
use crate::source::RemoteStateSource;
use crate::types::{ActionKind, Phase, TriggerPolicy};

/// Trigger state for the current phase entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Armed,
    Fired,
}

#[derive(Debug, Default)]
struct Inner {
    /// Phase for which the action was already issued
    fired_for: Option<Phase>,
    fire_count: u64,
}

/// Fires the accept action on qualifying phase observations
#[derive(Debug)]
pub struct PhaseTrigger {
    policy: TriggerPolicy,
    action: ActionKind,
    inner: Mutex<Inner>,
}

impl PhaseTrigger {
    pub fn new(policy: TriggerPolicy) -> Self {
        Self {
            policy,
            action: ActionKind::AcceptReadyCheck,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn policy(&self) -> TriggerPolicy {
        self.policy
    }

    /// Observe a phase; returns the action to issue, if any.
    ///
    /// The caller is expected to issue the returned action exactly once.
    pub fn on_phase_observed(&self, phase: Phase, automation_enabled: bool) -> Option<ActionKind> {
        let mut inner = self.inner.lock();

        if !automation_enabled {
            if inner.fired_for.take().is_some() {
                tracing::debug!("Automation disabled, trigger re-armed");
            }
            return None;
        }

        if !phase.is_qualifying() {
            if let Some(previous) = inner.fired_for.take() {
                tracing::debug!("Left {}, trigger re-armed", previous);
            }
            return None;
        }

        if self.policy == TriggerPolicy::Guarded && inner.fired_for == Some(phase) {
            return None;
        }

        inner.fired_for = Some(phase);
        inner.fire_count += 1;
        tracing::info!("{} observed, issuing {}", phase, self.action);
        Some(self.action)
    }

    pub fn state(&self) -> TriggerState {
        if self.inner.lock().fired_for.is_some() {
            TriggerState::Fired
        } else {
            TriggerState::Armed
        }
    }

    /// Number of times the trigger fired since creation
    pub fn fire_count(&self) -> u64 {
        self.inner.lock().fire_count
    }
}

impl Default for PhaseTrigger {
    fn default() -> Self {
        Self::new(TriggerPolicy::default())
    }
}

/// Issue an action against the source and log its outcome
pub async fn perform_action(source: &dyn RemoteStateSource, kind: ActionKind) -> Result<()> {
    let result = source.request_action(kind).await;
    match &result {
        Ok(()) => tracing::info!("Automated {} succeeded", kind),
        Err(e) => tracing::error!("Automated {} failed: {}", kind, e),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_count(trigger: &PhaseTrigger, phases: &[Phase], enabled: bool) -> usize {
        phases
            .iter()
            .filter(|phase| trigger.on_phase_observed(**phase, enabled).is_some())
            .count()
    }

    #[test]
    fn test_single_fire_per_entry() {
        let trigger = PhaseTrigger::default();
        let phases = [
            Phase::Lobby,
            Phase::ReadyCheck,
            Phase::ReadyCheck,
            Phase::ReadyCheck,
            Phase::InProgress,
        ];
        assert_eq!(fire_count(&trigger, &phases, true), 1);
        assert_eq!(trigger.fire_count(), 1);
        assert_eq!(trigger.state(), TriggerState::Armed);
    }

    #[test]
    fn test_fires_on_first_qualifying_observation() {
        let trigger = PhaseTrigger::default();
        assert_eq!(trigger.on_phase_observed(Phase::Lobby, true), None);
        assert_eq!(
            trigger.on_phase_observed(Phase::ReadyCheck, true),
            Some(ActionKind::AcceptReadyCheck)
        );
        assert_eq!(trigger.state(), TriggerState::Fired);
        assert_eq!(trigger.on_phase_observed(Phase::ReadyCheck, true), None);
    }

    #[test]
    fn test_rearm_on_reentry() {
        let trigger = PhaseTrigger::default();
        let phases = [Phase::ReadyCheck, Phase::Lobby, Phase::ReadyCheck];
        assert_eq!(fire_count(&trigger, &phases, true), 2);
    }

    #[test]
    fn test_disabled_never_fires() {
        let trigger = PhaseTrigger::default();
        let phases = [
            Phase::Lobby,
            Phase::ReadyCheck,
            Phase::ReadyCheck,
            Phase::Lobby,
            Phase::ReadyCheck,
        ];
        assert_eq!(fire_count(&trigger, &phases, false), 0);
        assert_eq!(trigger.state(), TriggerState::Armed);
    }

    #[test]
    fn test_disabling_rearms_within_phase() {
        let trigger = PhaseTrigger::default();
        assert!(trigger.on_phase_observed(Phase::ReadyCheck, true).is_some());
        assert!(trigger.on_phase_observed(Phase::ReadyCheck, false).is_none());
        assert_eq!(trigger.state(), TriggerState::Armed);
        assert!(trigger.on_phase_observed(Phase::ReadyCheck, true).is_some());
    }

    #[test]
    fn test_every_observation_policy() {
        let trigger = PhaseTrigger::new(TriggerPolicy::EveryObservation);
        let phases = [
            Phase::Lobby,
            Phase::ReadyCheck,
            Phase::ReadyCheck,
            Phase::ReadyCheck,
            Phase::InProgress,
        ];
        assert_eq!(fire_count(&trigger, &phases, true), 3);
        assert_eq!(fire_count(&trigger, &phases, false), 0);
    }

    #[tokio::test]
    async fn test_perform_action_reports_outcome() {
        let source = crate::source::LocalSource::default();
        assert!(perform_action(&source, ActionKind::AcceptReadyCheck)
            .await
            .is_ok());

        source.fail_actions(Some("no ready check"));
        assert!(perform_action(&source, ActionKind::AcceptReadyCheck)
            .await
            .is_err());
        assert_eq!(source.action_calls(), 2);
    }
}
