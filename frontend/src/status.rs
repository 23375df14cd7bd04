use chrono::{DateTime, Local};
use log::error;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the cabinet is doing right now.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum FrontendState {
    /// The selection grid is up and accepting input.
    Idle,
    /// The launch sequence is running or the game is starting.
    Launching,
    /// A game process is running.
    Playing,
    /// The game exited and the selection grid is coming back.
    Returning,
}

/// Runtime status written by the front-end to `status.toml` next to the config.
/// Kiosk monitoring reads this file (read-only).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FrontendStatus {
    /// Front-end binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: FrontendState,
    /// Display name of the game being launched, played or returned from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_game: Option<String>,
    /// RFC 3339 timestamp of the most recent successful launch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_launch: Option<String>,
    /// Most recent launch or termination error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FrontendStatus {
    /// Constructs the initial idle status on startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: FrontendState::Idle,
            active_game: None,
            last_launch: None,
            error: None,
        }
    }

    pub fn record_launch(&mut self, game: &str, at: DateTime<Local>) {
        self.state = FrontendState::Playing;
        self.active_game = Some(game.to_string());
        self.last_launch = Some(at.to_rfc3339());
        self.error = None;
    }
}

impl Default for FrontendStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// A failed write is logged and otherwise ignored.
pub fn write_status(path: &Path, status: &FrontendStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create status directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                error!("Failed to write status file: {e}");
            }
        }
        Err(e) => error!("Failed to serialize status: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_starts_idle_without_optional_fields() {
        let s = FrontendStatus::new();
        assert_eq!(s.state, FrontendState::Idle);
        assert!(s.active_game.is_none());
        assert!(s.last_launch.is_none());
        assert!(s.error.is_none());
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn state_serializes_to_lowercase() {
        // TOML requires a root table, so verify the value via FrontendStatus.
        let mut s = FrontendStatus::new();
        for (state, text) in [
            (FrontendState::Idle, "idle"),
            (FrontendState::Launching, "launching"),
            (FrontendState::Playing, "playing"),
            (FrontendState::Returning, "returning"),
        ] {
            s.state = state;
            let out = toml::to_string_pretty(&s).unwrap();
            assert!(out.contains(&format!("state = \"{text}\"")), "{out}");
        }
    }

    #[test]
    fn record_launch_sets_rfc3339_timestamp_and_clears_error() {
        let mut s = FrontendStatus::new();
        s.error = Some("previous failure".into());
        let at = Local::now();
        s.record_launch("Galaga", at);

        assert_eq!(s.state, FrontendState::Playing);
        assert_eq!(s.active_game.as_deref(), Some("Galaga"));
        assert!(s.error.is_none());
        let parsed = DateTime::parse_from_rfc3339(s.last_launch.as_deref().unwrap()).unwrap();
        assert_eq!(parsed.timestamp(), at.timestamp());
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("status.toml");
        write_status(&path, &FrontendStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = FrontendStatus::new();
        original.state = FrontendState::Returning;
        original.active_game = Some("Street Fighter II".to_string());
        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: FrontendStatus = toml::from_str(&content).unwrap();
        assert_eq!(parsed.state, FrontendState::Returning);
        assert_eq!(parsed.active_game.as_deref(), Some("Street Fighter II"));
    }

    #[test]
    fn write_status_omits_none_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &FrontendStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("active_game"));
        assert!(!content.contains("last_launch"));
        assert!(!content.contains("error"));
    }
}
