//! Core types for Micept

use serde::{Deserialize, Serialize};

/// Game flow phase reported by the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Phase {
    /// Not connected or no session
    #[default]
    None,
    Lobby,
    Matchmaking,
    /// A match was found and the client waits for a confirmation
    ReadyCheck,
    ChampSelect,
    InProgress,
    Reconnect,
    WaitingForStats,
    PreEndOfGame,
    EndOfGame,
}

impl Phase {
    /// All phases, in game-flow order
    pub const ALL: [Phase; 10] = [
        Phase::None,
        Phase::Lobby,
        Phase::Matchmaking,
        Phase::ReadyCheck,
        Phase::ChampSelect,
        Phase::InProgress,
        Phase::Reconnect,
        Phase::WaitingForStats,
        Phase::PreEndOfGame,
        Phase::EndOfGame,
    ];

    /// Wire name as reported by the game client
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::None => "None",
            Phase::Lobby => "Lobby",
            Phase::Matchmaking => "Matchmaking",
            Phase::ReadyCheck => "ReadyCheck",
            Phase::ChampSelect => "ChampSelect",
            Phase::InProgress => "InProgress",
            Phase::Reconnect => "Reconnect",
            Phase::WaitingForStats => "WaitingForStats",
            Phase::PreEndOfGame => "PreEndOfGame",
            Phase::EndOfGame => "EndOfGame",
        }
    }

    /// Parse a phase name, mapping anything unrecognised to `Phase::None`.
    ///
    /// The game client grows new phases between patches; an unknown value is
    /// treated as "no actionable phase" rather than an error.
    pub fn parse_lossy(s: &str) -> Phase {
        match s.parse() {
            Ok(phase) => phase,
            Err(_) => {
                tracing::debug!("Unknown game flow phase '{}', treating as None", s);
                Phase::None
            }
        }
    }

    /// Whether this is the phase at which the automated accept may fire
    pub fn is_qualifying(&self) -> bool {
        matches!(self, Phase::ReadyCheck)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|phase| phase.as_str() == s)
            .ok_or_else(|| format!("Unknown phase: {}", s))
    }
}

/// Experience counters of the current profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XpProgress {
    pub since_last_level: u32,
    pub until_next_level: u32,
}

impl XpProgress {
    /// Progress towards the next level as a percentage (0.0 - 100.0)
    pub fn percent(&self) -> f64 {
        let total = u64::from(self.since_last_level) + u64::from(self.until_next_level);
        if total == 0 {
            0.0
        } else {
            f64::from(self.since_last_level) / total as f64 * 100.0
        }
    }
}

/// Profile of the signed-in player
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: String,
    pub level: u32,
    pub icon_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xp: Option<XpProgress>,
}

impl Profile {
    pub fn new(display_name: impl Into<String>, level: u32, icon_id: u32) -> Self {
        Self {
            display_name: display_name.into(),
            level,
            icon_id,
            xp: None,
        }
    }

    pub fn with_xp(mut self, since_last_level: u32, until_next_level: u32) -> Self {
        self.xp = Some(XpProgress {
            since_last_level,
            until_next_level,
        });
        self
    }

    /// Build the display name from a Riot ID, falling back to the legacy name
    ///
    /// `game_name#tag_line` when both parts are present, `game_name` when the
    /// tag is empty, `fallback` when there is no game name at all.
    pub fn riot_id(game_name: Option<&str>, tag_line: Option<&str>, fallback: &str) -> String {
        match (game_name.filter(|g| !g.is_empty()), tag_line) {
            (Some(game), Some(tag)) if !tag.is_empty() => format!("{}#{}", game, tag),
            (Some(game), _) => game.to_string(),
            (None, _) => fallback.to_string(),
        }
    }

    /// Progress towards the next level, 0 when no counters are known
    pub fn xp_progress_percent(&self) -> f64 {
        self.xp.map(|xp| xp.percent()).unwrap_or(0.0)
    }
}

/// Point-in-time mirror of the game client state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snapshot {
    /// Whether the game client is reachable
    pub connected: bool,
    /// Current game flow phase
    pub phase: Phase,
    /// Whether ready checks are accepted automatically
    pub automation_enabled: bool,
    /// Signed-in player, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl Snapshot {
    /// Snapshot used before anything is known about the remote side
    pub fn unknown(automation_enabled: bool) -> Self {
        Self {
            connected: false,
            phase: Phase::None,
            automation_enabled,
            profile: None,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::unknown(default_true())
    }
}

/// Independently ordered part of a snapshot
///
/// Updates race per group: the newest write to a group wins even when an
/// older update touching the same group completes later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldGroup {
    Connectivity,
    Phase,
    Profile,
    Automation,
}

impl FieldGroup {
    pub const ALL: [FieldGroup; 4] = [
        FieldGroup::Connectivity,
        FieldGroup::Phase,
        FieldGroup::Profile,
        FieldGroup::Automation,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            FieldGroup::Connectivity => 0,
            FieldGroup::Phase => 1,
            FieldGroup::Profile => 2,
            FieldGroup::Automation => 3,
        }
    }
}

impl std::fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldGroup::Connectivity => write!(f, "connectivity"),
            FieldGroup::Phase => write!(f, "phase"),
            FieldGroup::Profile => write!(f, "profile"),
            FieldGroup::Automation => write!(f, "automation"),
        }
    }
}

/// Names of the push event families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventTopic {
    PhaseChanged,
    ActionCompleted,
    ConnectivityChanged,
    ProfileUpdated,
}

impl EventTopic {
    pub const ALL: [EventTopic; 4] = [
        EventTopic::PhaseChanged,
        EventTopic::ActionCompleted,
        EventTopic::ConnectivityChanged,
        EventTopic::ProfileUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventTopic::PhaseChanged => "phase-changed",
            EventTopic::ActionCompleted => "action-completed",
            EventTopic::ConnectivityChanged => "connectivity-changed",
            EventTopic::ProfileUpdated => "profile-updated",
        }
    }
}

impl std::fmt::Display for EventTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unsolicited notification from the game client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum PushEvent {
    PhaseChanged(Phase),
    ActionCompleted(serde_json::Value),
    ConnectivityChanged(bool),
    ProfileUpdated(Option<Profile>),
}

impl PushEvent {
    /// Topic this event is delivered on
    pub fn topic(&self) -> EventTopic {
        match self {
            PushEvent::PhaseChanged(_) => EventTopic::PhaseChanged,
            PushEvent::ActionCompleted(_) => EventTopic::ActionCompleted,
            PushEvent::ConnectivityChanged(_) => EventTopic::ConnectivityChanged,
            PushEvent::ProfileUpdated(_) => EventTopic::ProfileUpdated,
        }
    }
}

/// Side effects that can be requested from the game client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Accept the pending ready check
    AcceptReadyCheck,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::AcceptReadyCheck => write!(f, "accept_ready_check"),
        }
    }
}

/// Window position in physical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowPosition {
    pub x: i32,
    pub y: i32,
}

impl WindowPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Default for WindowPosition {
    /// Top right corner of the primary display
    fn default() -> Self {
        Self { x: -400, y: 0 }
    }
}

/// When the automated accept is allowed to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Once per entry into the qualifying phase
    #[default]
    Guarded,
    /// On every observation of the qualifying phase
    EveryObservation,
}

impl std::str::FromStr for TriggerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "guarded" => Ok(TriggerPolicy::Guarded),
            "every_observation" => Ok(TriggerPolicy::EveryObservation),
            _ => Err(format!("Unknown trigger policy: {}", s)),
        }
    }
}

/// Sync engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Background poll cadence in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Upper bound of the failure backoff multiplier
    #[serde(default = "default_max_backoff_factor")]
    pub max_backoff_factor: u32,
    /// Debounce window for persisted window positions
    #[serde(default = "default_position_debounce")]
    pub position_debounce_ms: u64,
    /// Automated accept firing policy
    #[serde(default)]
    pub trigger_policy: TriggerPolicy,
    /// Drop push events while the window is hidden
    ///
    /// Off by default: hidden-window events still update the snapshot, and
    /// the pull on reveal resyncs whatever was missed either way. Polling and
    /// lag resyncs are skipped while hidden regardless of this flag.
    #[serde(default)]
    pub gate_events_when_hidden: bool,
    /// Capacity of the outbound event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Automation flag of the initial snapshot
    #[serde(default = "default_true")]
    pub initial_automation: bool,
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_max_backoff_factor() -> u32 {
    5
}

fn default_position_debounce() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_backoff_factor: default_max_backoff_factor(),
            position_debounce_ms: default_position_debounce(),
            trigger_policy: TriggerPolicy::default(),
            gate_events_when_hidden: false,
            event_buffer: default_event_buffer(),
            initial_automation: true,
        }
    }
}

impl EngineConfig {
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    pub fn position_debounce(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.position_debounce_ms)
    }

    /// Delay before the next poll after `failures` consecutive failed pulls
    pub fn backoff_delay(&self, failures: u32) -> std::time::Duration {
        let factor = 1 + failures.min(self.max_backoff_factor);
        self.poll_interval() * factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_round_trip_names() {
        for phase in Phase::ALL {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("GameStart".parse::<Phase>().is_err());
        assert_eq!(Phase::parse_lossy("GameStart"), Phase::None);
    }

    #[test]
    fn test_phase_serde_uses_wire_names() {
        let json = serde_json::to_string(&Phase::ReadyCheck).unwrap();
        assert_eq!(json, "\"ReadyCheck\"");
        let phase: Phase = serde_json::from_str("\"ChampSelect\"").unwrap();
        assert_eq!(phase, Phase::ChampSelect);
    }

    #[test]
    fn test_only_ready_check_qualifies() {
        let qualifying: Vec<Phase> = Phase::ALL.into_iter().filter(Phase::is_qualifying).collect();
        assert_eq!(qualifying, vec![Phase::ReadyCheck]);
    }

    #[test]
    fn test_xp_progress() {
        let profile = Profile::new("Teemo", 30, 7).with_xp(250, 750);
        assert!((profile.xp_progress_percent() - 25.0).abs() < f64::EPSILON);

        let empty = Profile::new("Teemo", 30, 7).with_xp(0, 0);
        assert_eq!(empty.xp_progress_percent(), 0.0);
        assert_eq!(Profile::new("Teemo", 1, 1).xp_progress_percent(), 0.0);
    }

    #[test]
    fn test_riot_id() {
        assert_eq!(Profile::riot_id(Some("Faker"), Some("KR1"), "x"), "Faker#KR1");
        assert_eq!(Profile::riot_id(Some("Faker"), Some(""), "x"), "Faker");
        assert_eq!(Profile::riot_id(Some("Faker"), None, "x"), "Faker");
        assert_eq!(Profile::riot_id(Some(""), Some("KR1"), "legacy"), "legacy");
        assert_eq!(Profile::riot_id(None, None, "legacy"), "legacy");
    }

    #[test]
    fn test_push_event_wire_format() {
        let event = PushEvent::PhaseChanged(Phase::Lobby);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "phase-changed", "payload": "Lobby"})
        );
        assert_eq!(event.topic(), EventTopic::PhaseChanged);
    }

    #[test]
    fn test_engine_config_defaults_from_empty_json() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.trigger_policy, TriggerPolicy::Guarded);
        assert!(config.initial_automation);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let config = EngineConfig {
            poll_interval_ms: 1000,
            max_backoff_factor: 5,
            ..Default::default()
        };
        assert_eq!(config.backoff_delay(0).as_millis(), 1000);
        assert_eq!(config.backoff_delay(2).as_millis(), 3000);
        assert_eq!(config.backoff_delay(50).as_millis(), 6000);
    }

    #[test]
    fn test_trigger_policy_parse() {
        assert_eq!(
            "guarded".parse::<TriggerPolicy>(),
            Ok(TriggerPolicy::Guarded)
        );
        assert_eq!(
            "every-observation".parse::<TriggerPolicy>(),
            Ok(TriggerPolicy::EveryObservation)
        );
        assert!("sometimes".parse::<TriggerPolicy>().is_err());
    }
}
