use anyhow::{Context, Result};
use log::{error, warn};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::event::FrontendEvent;

pub const DEFAULT_COLUMNS: usize = 7;
pub const DEFAULT_FADE_DURATION_MS: u64 = 500;
pub const MAX_FADE_DURATION_MS: u64 = 5_000;
pub const DEFAULT_SPLASH_DURATION_MS: u64 = 3_000;
pub const MIN_SPLASH_DURATION_MS: u64 = 500;
pub const MAX_SPLASH_DURATION_MS: u64 = 30_000;
pub const DEFAULT_STICK_DEADZONE: f32 = 0.5;

/// Root configuration structure. Deserialized from `config.toml`.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub bindings: Bindings,
    #[serde(default)]
    pub games: Vec<GameRef>,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

/// Cabinet-wide settings.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Number of columns in the selection grid. At least 1.
    #[serde(default = "default_columns")]
    pub columns: usize,
    /// Duration of every surface fade, in milliseconds.
    #[serde(default = "default_fade_duration")]
    pub fade_duration_ms: u64,
    /// Splash progress duration used when a game has no override.
    #[serde(default = "default_splash_duration")]
    pub splash_duration_ms: u64,
    /// Stick magnitude below which a direction counts as released.
    #[serde(default = "default_stick_deadzone")]
    pub stick_deadzone: f32,
    /// Which splash image tier to prefer.
    #[serde(default)]
    pub resolution_tier: ResolutionTier,
    /// Marquee art shown while no game is running.
    #[serde(default)]
    pub default_marquee: Option<PathBuf>,
    /// Controller-layout art shown while no game is running.
    #[serde(default)]
    pub default_controller_layout: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            columns: DEFAULT_COLUMNS,
            fade_duration_ms: DEFAULT_FADE_DURATION_MS,
            splash_duration_ms: DEFAULT_SPLASH_DURATION_MS,
            stick_deadzone: DEFAULT_STICK_DEADZONE,
            resolution_tier: ResolutionTier::default(),
            default_marquee: None,
            default_controller_layout: None,
        }
    }
}

impl Settings {
    pub fn effective_columns(&self) -> usize {
        self.columns.max(1)
    }

    pub fn fade_duration(&self) -> Duration {
        Duration::from_millis(self.fade_duration_ms.min(MAX_FADE_DURATION_MS))
    }

    pub fn effective_deadzone(&self) -> f32 {
        self.stick_deadzone.clamp(0.05, 0.95)
    }
}

/// Splash art resolution tier.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ResolutionTier {
    #[default]
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "1440p")]
    Qhd1440,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl ResolutionTier {
    pub const ALL: [ResolutionTier; 3] =
        [ResolutionTier::Hd1080, ResolutionTier::Qhd1440, ResolutionTier::Uhd4k];

    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionTier::Hd1080 => "1080p",
            ResolutionTier::Qhd1440 => "1440p",
            ResolutionTier::Uhd4k => "4k",
        }
    }
}

/// Logical input actions that can be bound to keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Action {
    Left,
    Right,
    Up,
    Down,
    Select,
    Exit,
    Kill,
    ToggleOverlay,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Left,
        Action::Right,
        Action::Up,
        Action::Down,
        Action::Select,
        Action::Exit,
        Action::Kill,
        Action::ToggleOverlay,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Left => "Left",
            Action::Right => "Right",
            Action::Up => "Up",
            Action::Down => "Down",
            Action::Select => "Select",
            Action::Exit => "Exit",
            Action::Kill => "Kill",
            Action::ToggleOverlay => "ToggleOverlay",
        }
    }

    fn default_keys(self) -> &'static [&'static str] {
        match self {
            Action::Left => &["LeftArrow"],
            Action::Right => &["RightArrow"],
            Action::Up => &["UpArrow"],
            Action::Down => &["DownArrow"],
            Action::Select => &["Enter", "Space"],
            Action::Exit => &["Escape"],
            Action::Kill => &["End"],
            Action::ToggleOverlay => &["F9"],
        }
    }
}

/// Input binding table: action name to the key names that trigger it.
///
/// Key names are matched case-insensitively against the names produced by
/// [`crate::hotkey::key_name`].
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, Vec<String>>);

impl Default for Bindings {
    fn default() -> Self {
        let mut table = BTreeMap::new();
        for action in Action::ALL {
            table.insert(action.as_str().to_string(), owned(action.default_keys()));
        }
        Self(table)
    }
}

impl Bindings {
    /// Adds the default keys for every required action the table is missing.
    /// Returns the actions that were filled in.
    pub fn fill_missing(&mut self) -> Vec<Action> {
        let mut filled = Vec::new();
        for action in Action::ALL {
            let present = self
                .0
                .get(action.as_str())
                .is_some_and(|keys| !keys.is_empty());
            if !present {
                self.0
                    .insert(action.as_str().to_string(), owned(action.default_keys()));
                filled.push(action);
            }
        }
        filled
    }

    pub fn keys(&self, action: Action) -> &[String] {
        self.0.get(action.as_str()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn matches(&self, action: Action, key: &str) -> bool {
        self.keys(action).iter().any(|k| k.eq_ignore_ascii_case(key))
    }

    /// Returns the first action, in [`Action::ALL`] order, bound to `key`.
    pub fn action_for(&self, key: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| self.matches(*a, key))
    }
}

fn owned(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// One selectable title. Read-only to the front-end core.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GameRef {
    /// Display name shown in the grid and in error dialogs.
    pub name: String,
    /// Native executable, or the emulator binary when `plugin` is set.
    pub executable: PathBuf,
    /// ROM or content path handed to the plugin.
    #[serde(default)]
    pub rom: Option<PathBuf>,
    /// Emulator plugin that builds the command line. `None` runs `executable` directly.
    #[serde(default)]
    pub plugin: Option<String>,
    /// Extra arguments, split shell-style.
    #[serde(default)]
    pub parameters: String,
    /// Command lines started (and not awaited) before the game.
    #[serde(default)]
    pub pre_launch: Vec<String>,
    /// Command lines started (and not awaited) after the game exits.
    #[serde(default)]
    pub post_exit: Vec<String>,
    /// Splash images keyed by resolution tier ("4k", "1440p", "1080p").
    #[serde(default)]
    pub splash: BTreeMap<String, PathBuf>,
    /// Overrides the global splash duration for this game (milliseconds).
    #[serde(default)]
    pub splash_duration_ms: Option<u64>,
    #[serde(default)]
    pub marquee: Option<PathBuf>,
    #[serde(default)]
    pub controller_layout: Option<PathBuf>,
}

impl GameRef {
    /// Returns the effective splash duration, falling back to the global setting.
    pub fn effective_splash_duration(&self, settings: &Settings) -> Duration {
        let raw = self.splash_duration_ms.unwrap_or(settings.splash_duration_ms);
        Duration::from_millis(raw.clamp(MIN_SPLASH_DURATION_MS, MAX_SPLASH_DURATION_MS))
    }

    /// Picks the splash image for `tier`: the exact tier, then the nearest
    /// lower tier, then the nearest higher one.
    pub fn splash_image(&self, tier: ResolutionTier) -> Option<&Path> {
        let lower = ResolutionTier::ALL.iter().rev().filter(|t| **t <= tier);
        let higher = ResolutionTier::ALL.iter().filter(|t| **t > tier);
        lower
            .chain(higher)
            .find_map(|t| self.splash.get(t.as_str()))
            .map(PathBuf::as_path)
    }
}

/// A command-line template emulator plugin.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PluginConfig {
    pub name: String,
    /// Argument template. `{emulator}`, `{rom}` and `{params}` are substituted.
    #[serde(default = "default_plugin_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub pre_launch: Vec<String>,
    #[serde(default)]
    pub post_exit: Vec<String>,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    for action in config.bindings.fill_missing() {
        warn!("No binding for '{}', using defaults", action.as_str());
    }
    Ok(config)
}

/// Spawns a file watcher on the parent directory of `path`.  Whenever the config
/// file is created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<FrontendEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("Failed to create config watcher: {e}");
            return;
        }
    };

    // Editors save by write-new + rename, so watch the directory.
    let Some(watch_dir) = path.parent().map(Path::to_path_buf) else {
        error!("Config path has no parent directory");
        return;
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("Failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(FrontendEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_columns() -> usize {
    DEFAULT_COLUMNS
}

fn default_fade_duration() -> u64 {
    DEFAULT_FADE_DURATION_MS
}

fn default_splash_duration() -> u64 {
    DEFAULT_SPLASH_DURATION_MS
}

fn default_stick_deadzone() -> f32 {
    DEFAULT_STICK_DEADZONE
}

fn default_plugin_args() -> Vec<String> {
    vec!["{rom}".to_string(), "{params}".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_game(splash_override: Option<u64>) -> GameRef {
        GameRef {
            name: "Test Game".to_string(),
            executable: PathBuf::from("game.exe"),
            rom: None,
            plugin: None,
            parameters: String::new(),
            pre_launch: vec![],
            post_exit: vec![],
            splash: BTreeMap::new(),
            splash_duration_ms: splash_override,
            marquee: None,
            controller_layout: None,
        }
    }

    // ── defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn settings_default_values() {
        let s = Settings::default();
        assert_eq!(s.columns, DEFAULT_COLUMNS);
        assert_eq!(s.fade_duration_ms, DEFAULT_FADE_DURATION_MS);
        assert_eq!(s.splash_duration_ms, DEFAULT_SPLASH_DURATION_MS);
        assert_eq!(s.resolution_tier, ResolutionTier::Hd1080);
    }

    #[test]
    fn default_bindings_cover_every_action() {
        let b = Bindings::default();
        for action in Action::ALL {
            assert!(!b.keys(action).is_empty(), "{} unbound", action.as_str());
        }
    }

    #[test]
    fn zero_columns_is_treated_as_one() {
        let s = Settings { columns: 0, ..Settings::default() };
        assert_eq!(s.effective_columns(), 1);
    }

    // ── bindings ──────────────────────────────────────────────────────────────

    #[test]
    fn action_for_is_case_insensitive() {
        let b = Bindings::default();
        assert_eq!(b.action_for("leftarrow"), Some(Action::Left));
        assert_eq!(b.action_for("ENTER"), Some(Action::Select));
        assert_eq!(b.action_for("Q"), None);
    }

    #[test]
    fn fill_missing_restores_required_actions() {
        let mut b: Bindings = toml::from_str::<BTreeMap<String, Bindings>>(
            "[b]\nLeft = [\"A\"]\nKill = []\n",
        )
        .unwrap()
        .remove("b")
        .unwrap();
        let filled = b.fill_missing();
        assert!(filled.contains(&Action::Kill));
        assert!(filled.contains(&Action::Select));
        assert!(!filled.contains(&Action::Left));
        assert!(b.matches(Action::Left, "A"));
        assert!(!b.matches(Action::Left, "LeftArrow"));
        assert!(b.matches(Action::Kill, "End"));
    }

    // ── effective_splash_duration ─────────────────────────────────────────────

    #[test]
    fn splash_duration_uses_game_override() {
        let game = make_game(Some(4_000));
        assert_eq!(
            game.effective_splash_duration(&Settings::default()),
            Duration::from_millis(4_000)
        );
    }

    #[test]
    fn splash_duration_falls_back_to_settings() {
        let game = make_game(None);
        assert_eq!(
            game.effective_splash_duration(&Settings::default()),
            Duration::from_millis(DEFAULT_SPLASH_DURATION_MS)
        );
    }

    #[test]
    fn splash_duration_is_clamped() {
        let settings = Settings::default();
        assert_eq!(
            make_game(Some(1)).effective_splash_duration(&settings),
            Duration::from_millis(MIN_SPLASH_DURATION_MS)
        );
        assert_eq!(
            make_game(Some(999_999)).effective_splash_duration(&settings),
            Duration::from_millis(MAX_SPLASH_DURATION_MS)
        );
    }

    // ── splash_image ──────────────────────────────────────────────────────────

    #[test]
    fn splash_image_prefers_exact_then_lower_then_higher() {
        let mut game = make_game(None);
        game.splash.insert("4k".into(), PathBuf::from("uhd.png"));
        game.splash.insert("1080p".into(), PathBuf::from("hd.png"));

        assert_eq!(game.splash_image(ResolutionTier::Uhd4k), Some(Path::new("uhd.png")));
        assert_eq!(game.splash_image(ResolutionTier::Qhd1440), Some(Path::new("hd.png")));

        game.splash.remove("1080p");
        assert_eq!(game.splash_image(ResolutionTier::Hd1080), Some(Path::new("uhd.png")));

        game.splash.clear();
        assert_eq!(game.splash_image(ResolutionTier::Hd1080), None);
    }

    // ── load_or_default ───────────────────────────────────────────────────────

    #[test]
    fn load_or_default_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.toml");
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.settings.columns, DEFAULT_COLUMNS);
        assert!(config.games.is_empty());
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn load_or_default_parses_valid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[settings]
columns = 5
fade_duration_ms = 250
resolution_tier = "4k"

[bindings]
Select = ["Enter", "LControlKey"]

[[games]]
name = "Street Fighter II"
executable = "C:\\Emulators\\mame.exe"
rom = "C:\\roms\\sf2.zip"
plugin = "mame"
parameters = "-skip_gameinfo"
pre_launch = ["ledblinky.exe 1"]
splash_duration_ms = 4000

[games.splash]
"4k" = "C:\\art\\sf2_4k.png"

[[plugins]]
name = "mame"
args = ["{rom}", "{params}"]
"#,
        )
        .unwrap();

        let config = load_or_default(&path).unwrap();
        assert_eq!(config.settings.columns, 5);
        assert_eq!(config.settings.fade_duration(), Duration::from_millis(250));
        assert_eq!(config.settings.resolution_tier, ResolutionTier::Uhd4k);
        assert!(config.bindings.matches(Action::Select, "LControlKey"));
        // Actions missing from the file are filled with defaults.
        assert!(config.bindings.matches(Action::Left, "LeftArrow"));

        let game = &config.games[0];
        assert_eq!(game.name, "Street Fighter II");
        assert_eq!(game.plugin.as_deref(), Some("mame"));
        assert_eq!(game.pre_launch, vec!["ledblinky.exe 1".to_string()]);
        assert!(game.post_exit.is_empty());
        assert_eq!(
            game.splash_image(ResolutionTier::Uhd4k),
            Some(Path::new("C:\\art\\sf2_4k.png"))
        );
        assert_eq!(config.plugins[0].name, "mame");
    }

    #[test]
    fn plugin_args_default_to_rom_and_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[plugins]]\nname = \"fba\"\n").unwrap();
        let config = load_or_default(&path).unwrap();
        assert_eq!(config.plugins[0].args, vec!["{rom}", "{params}"]);
    }

    #[test]
    fn load_or_default_invalid_toml_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is not valid toml ][[[").unwrap();
        assert!(load_or_default(&path).is_err());
    }

    #[test]
    fn game_without_executable_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[[games]]\nname = \"Broken\"\n").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
