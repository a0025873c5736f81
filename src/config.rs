//! Persisted user preferences
//!
//! Stored as pretty JSON under the platform config directory
//! (`~/.config/micept/config.json` on Linux). Loading never fails: a missing
//! or unreadable file yields defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::error::{MiceptError, Result};
use crate::sync::{EngineEvent, EngineEventType, VisibilityGate};
use crate::types::{FieldGroup, WindowPosition};
use crate::window::PositionSink;

const APP_DIR: &str = "micept";
const CONFIG_FILE: &str = "config.json";

/// User preferences that survive restarts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Last window position
    #[serde(default)]
    pub window_position: WindowPosition,
    /// Accept ready checks automatically
    #[serde(default = "default_true")]
    pub auto_accept: bool,
    /// Show the window on launch
    #[serde(default = "default_true")]
    pub window_visible: bool,
    /// Let clicks pass through the overlay window
    #[serde(default = "default_true")]
    pub mouse_through: bool,
    /// Hide the window while a game is in progress
    #[serde(default)]
    pub auto_hide: bool,
    /// Keys this version does not know about, written back unchanged
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            window_position: WindowPosition::default(),
            auto_accept: true,
            window_visible: true,
            mouse_through: true,
            auto_hide: false,
            extra: serde_json::Map::new(),
        }
    }
}

impl Preferences {
    /// Read preferences from `path`, falling back to defaults
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No preferences at {:?}, using defaults", path);
                return Self::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read preferences {:?}: {}, using defaults", path, e);
                return Self::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(prefs) => {
                tracing::debug!("Loaded preferences from {:?}", path);
                prefs
            }
            Err(e) => {
                tracing::warn!("Failed to parse preferences {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }
}

/// Default preferences location
pub fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| MiceptError::Config("No config directory on this platform".to_string()))?;
    Ok(dir.join(APP_DIR).join(CONFIG_FILE))
}

/// Preferences file with an in-memory copy
pub struct PreferencesStore {
    path: PathBuf,
    current: Mutex<Preferences>,
    /// Serialises file writes
    write_lock: tokio::sync::Mutex<()>,
}

impl PreferencesStore {
    /// Open the store at `path`, loading what is there
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = Preferences::load(&path);
        Self {
            path,
            current: Mutex::new(current),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Open the store at the platform default location
    pub fn open_default() -> Result<Self> {
        Ok(Self::open(default_config_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current preferences
    pub fn get(&self) -> Preferences {
        self.current.lock().clone()
    }

    /// Modify the preferences and write them out
    pub async fn update(&self, f: impl FnOnce(&mut Preferences)) -> Result<()> {
        {
            let mut current = self.current.lock();
            f(&mut current);
        }
        self.save().await
    }

    pub async fn set_auto_accept(&self, enabled: bool) -> Result<()> {
        self.update(|p| p.auto_accept = enabled).await
    }

    pub async fn set_window_visible(&self, visible: bool) -> Result<()> {
        self.update(|p| p.window_visible = visible).await
    }

    /// Write the current preferences to disk
    ///
    /// The file is replaced through a rename so readers never see a partial
    /// write.
    pub async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let content = serde_json::to_string_pretty(&self.get())?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!("Preferences saved to {:?}", self.path);
        Ok(())
    }

    /// Persist the automation toggle and window visibility as they change
    ///
    /// Follows `Automation` changes in the engine's snapshot events and the
    /// host's visibility notifications until the engine event channel closes.
    pub fn watch_settings(
        self: Arc<Self>,
        mut events: broadcast::Receiver<EngineEvent>,
        visibility: VisibilityGate,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut visible = visibility.watch();
            let _ = *visible.borrow_and_update();
            let mut visibility_open = true;

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => self.on_engine_event(&event).await,
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!("Preferences missed {} engine events", missed)
                        }
                        Err(RecvError::Closed) => break,
                    },
                    changed = visible.changed(), if visibility_open => match changed {
                        Ok(()) => {
                            let now = *visible.borrow_and_update();
                            if self.get().window_visible != now {
                                if let Err(e) = self.set_window_visible(now).await {
                                    tracing::warn!("Failed to save window visibility: {}", e);
                                }
                            }
                        }
                        Err(_) => visibility_open = false,
                    },
                }
            }
            tracing::debug!("Preferences watcher finished");
        })
    }

    async fn on_engine_event(&self, event: &EngineEvent) {
        if event.event_type != EngineEventType::SnapshotChanged {
            return;
        }
        let touched = event
            .changes
            .as_ref()
            .is_some_and(|changes| changes.contains(&FieldGroup::Automation));
        let Some(snapshot) = event.snapshot.as_ref().filter(|_| touched) else {
            return;
        };

        let enabled = snapshot.automation_enabled;
        if self.get().auto_accept == enabled {
            return;
        }
        match self.set_auto_accept(enabled).await {
            Ok(()) => tracing::info!("Auto accept {} saved", if enabled { "on" } else { "off" }),
            Err(e) => tracing::warn!("Failed to save auto accept: {}", e),
        }
    }
}

#[async_trait]
impl PositionSink for PreferencesStore {
    async fn persist_position(&self, position: WindowPosition) -> Result<()> {
        self.update(|p| p.window_position = position)
            .await
            .map_err(|e| MiceptError::Persist(e.to_string()))
    }
}
