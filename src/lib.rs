//! Micept - game client companion core
//!
//! Mirrors the state of a running game client (connectivity, game flow
//! phase, signed-in profile) from push events and a background poll, and
//! accepts ready checks automatically.

pub mod config;
pub mod error;
pub mod sim;
pub mod source;
pub mod sync;
pub mod types;
pub mod window;

pub use config::{Preferences, PreferencesStore};
pub use error::{MiceptError, Result};
pub use source::{LocalSource, RemoteStateSource};
pub use sync::{SyncEngine, Update};
pub use types::*;
pub use window::{PositionSink, PositionTracker};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
