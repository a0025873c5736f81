//! Game client state synchronization
//!
//! Keeps a local [`Snapshot`](crate::types::Snapshot) of the game client in
//! step through push events and a slow backstop poll, and accepts ready
//! checks automatically.
//!
//! - [`SyncEngine`] - owns the snapshot, listeners, poll timer and lifecycle
//! - [`PhaseTrigger`] - once-per-entry accept on the ready check phase
//! - [`Debouncer`] - collapses bursts of calls into one delayed call
//! - [`VisibilityGate`] - skips polling while the window is hidden
//! - [`change`] - structural snapshot comparison

pub mod change;
mod debounce;
mod engine;
mod events;
mod stats;
mod trigger;
mod visibility;

pub use change::{changed_groups, snapshots_equal};
pub use debounce::Debouncer;
pub use engine::{SyncEngine, Update};
pub use events::{EngineEvent, EngineEventType, UpdateOrigin};
pub use stats::SyncStats;
pub use trigger::{perform_action, PhaseTrigger, TriggerState};
pub use visibility::{visibility_channel, VisibilityGate, VisibilityNotifier};
