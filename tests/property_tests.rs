//! Property-based tests for micept
//!
//! These tests verify invariants that must hold for all inputs:
//! - Change detection is structural equality
//! - The guarded trigger fires once per qualifying phase entry
//! - Phase parsing never panics
//! - Backoff stays bounded
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

use micept::types::{Phase, Profile, Snapshot, XpProgress};

fn phase_strategy() -> impl Strategy<Value = Phase> {
    proptest::sample::select(Phase::ALL.to_vec())
}

fn profile_strategy() -> impl Strategy<Value = Profile> {
    (
        "[A-Za-z]{1,8}",
        1u32..500,
        0u32..64,
        proptest::option::of((0u32..3000, 0u32..3000)),
    )
        .prop_map(|(name, level, icon_id, xp)| Profile {
            display_name: name,
            level,
            icon_id,
            xp: xp.map(|(since_last_level, until_next_level)| XpProgress {
                since_last_level,
                until_next_level,
            }),
        })
}

fn snapshot_strategy() -> impl Strategy<Value = Snapshot> {
    (
        any::<bool>(),
        phase_strategy(),
        any::<bool>(),
        proptest::option::of(profile_strategy()),
    )
        .prop_map(|(connected, phase, automation_enabled, profile)| Snapshot {
            connected,
            phase,
            automation_enabled,
            profile,
        })
}

// ============================================================================
// CHANGE DETECTION TESTS
// ============================================================================

mod change_tests {
    use super::*;
    use micept::sync::{changed_groups, snapshots_equal};

    proptest! {
        /// Invariant: every snapshot equals itself and a structural copy
        #[test]
        fn reflexive(s in snapshot_strategy()) {
            prop_assert!(snapshots_equal(&s, &s));
            let copy = s.clone();
            prop_assert!(snapshots_equal(&s, &copy));
            prop_assert!(changed_groups(&s, &copy).is_empty());
        }

        /// Invariant: equality is symmetric
        #[test]
        fn symmetric(a in snapshot_strategy(), b in snapshot_strategy()) {
            prop_assert_eq!(snapshots_equal(&a, &b), snapshots_equal(&b, &a));
        }

        /// Invariant: snapshots are equal exactly when no group changed
        #[test]
        fn agrees_with_changed_groups(a in snapshot_strategy(), b in snapshot_strategy()) {
            prop_assert_eq!(snapshots_equal(&a, &b), changed_groups(&a, &b).is_empty());
            prop_assert_eq!(snapshots_equal(&a, &b), a == b);
        }
    }
}

// ============================================================================
// TRIGGER TESTS
// ============================================================================

mod trigger_tests {
    use super::*;
    use micept::sync::PhaseTrigger;

    /// Number of maximal runs of consecutive qualifying phases
    fn qualifying_runs(phases: &[Phase]) -> usize {
        let mut runs = 0;
        let mut inside = false;
        for phase in phases {
            if phase.is_qualifying() && !inside {
                runs += 1;
            }
            inside = phase.is_qualifying();
        }
        runs
    }

    proptest! {
        /// Invariant: with automation on, the trigger fires exactly once per
        /// entry into the qualifying phase
        #[test]
        fn fires_once_per_entry(phases in prop::collection::vec(phase_strategy(), 0..60)) {
            let trigger = PhaseTrigger::default();
            let fired = phases
                .iter()
                .filter(|phase| trigger.on_phase_observed(**phase, true).is_some())
                .count();
            prop_assert_eq!(fired, qualifying_runs(&phases));
        }

        /// Invariant: with automation off, the trigger never fires
        #[test]
        fn never_fires_when_disabled(phases in prop::collection::vec(phase_strategy(), 0..60)) {
            let trigger = PhaseTrigger::default();
            for phase in phases {
                prop_assert!(trigger.on_phase_observed(phase, false).is_none());
            }
            prop_assert_eq!(trigger.fire_count(), 0);
        }

        /// Invariant: duplicated observations never add fires
        #[test]
        fn duplicates_do_not_fire(
            phases in prop::collection::vec((phase_strategy(), 1usize..4), 0..30)
        ) {
            let once = PhaseTrigger::default();
            let repeated = PhaseTrigger::default();
            for (phase, copies) in phases {
                once.on_phase_observed(phase, true);
                for _ in 0..copies {
                    repeated.on_phase_observed(phase, true);
                }
            }
            prop_assert_eq!(once.fire_count(), repeated.fire_count());
        }
    }
}

// ============================================================================
// PARSING AND CONFIG TESTS
// ============================================================================

mod parsing_tests {
    use super::*;
    use micept::types::EngineConfig;

    proptest! {
        /// Invariant: lossy phase parsing never panics and keeps known names
        #[test]
        fn parse_lossy_never_panics(s in ".*") {
            let phase = Phase::parse_lossy(&s);
            if phase != Phase::None {
                prop_assert_eq!(phase.as_str(), s.as_str());
            }
        }

        /// Invariant: XP percentage stays within 0..=100
        #[test]
        fn xp_percent_bounded(since in any::<u32>(), until in any::<u32>()) {
            let pct = XpProgress { since_last_level: since, until_next_level: until }.percent();
            prop_assert!((0.0..=100.0).contains(&pct));
        }

        /// Invariant: backoff is monotonic and capped
        #[test]
        fn backoff_bounded(
            interval in 1u64..60_000,
            cap in 0u32..10,
            failures in 0u32..1000,
        ) {
            let config = EngineConfig {
                poll_interval_ms: interval,
                max_backoff_factor: cap,
                ..EngineConfig::default()
            };
            let delay = config.backoff_delay(failures);
            prop_assert!(delay >= config.poll_interval());
            prop_assert!(delay <= config.poll_interval() * (cap + 1));
            prop_assert!(config.backoff_delay(failures + 1) >= delay);
        }
    }
}
