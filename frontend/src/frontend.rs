/// The coordinator: sole owner of front-end state.
///
/// The main loop feeds it timer ticks and the events background producers post
/// (keys from the hook thread, child exits, config reloads, shutdown).  Nothing
/// else mutates selection, session or transition state, so no locking is needed.
use std::path::PathBuf;
use std::time::Instant;

use chrono::Local;
use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;

use crate::config::{Action, Config, GameRef};
use crate::controller::{Direction, InputPoller, Samples};
use crate::desktop::Desktop;
use crate::error::{LaunchError, TransitionError};
use crate::event::FrontendEvent;
use crate::hotkey::{self, DOUBLE_PRESS_THRESHOLD};
use crate::navigation::NavigationDispatcher;
use crate::plugin::PluginRegistry;
use crate::process::{ActiveSession, ProcessLifecycleManager};
use crate::status::{write_status, FrontendState, FrontendStatus};
use crate::surface::{Secondary, SurfaceId, Surfaces};
use crate::transition::{TransitionSignal, TransitionState, TransitionStateMachine, TransitionTimings};

pub struct Frontend<S: Surfaces, D: Desktop> {
    config: Config,
    surfaces: S,
    desktop: D,
    transitions: TransitionStateMachine,
    navigation: NavigationDispatcher,
    poller: InputPoller,
    processes: ProcessLifecycleManager,
    status: FrontendStatus,
    status_path: Option<PathBuf>,
    exit_requested: bool,
}

impl<S: Surfaces, D: Desktop> Frontend<S, D> {
    /// `events` receives exit notifications for launched games.  `status_path`
    /// is where `status.toml` is written; `None` disables it.
    pub fn new(
        config: Config,
        surfaces: S,
        desktop: D,
        events: mpsc::Sender<FrontendEvent>,
        status_path: Option<PathBuf>,
    ) -> Self {
        warn_unknown_keys(&config);
        let navigation = NavigationDispatcher::new(config.settings.effective_columns(), config.games.len());
        let poller = InputPoller::new(config.settings.effective_deadzone());
        let processes = ProcessLifecycleManager::new(PluginRegistry::from_config(&config.plugins), events);

        let mut frontend = Self {
            config,
            surfaces,
            desktop,
            transitions: TransitionStateMachine::new(TransitionTimings::default()),
            navigation,
            poller,
            processes,
            status: FrontendStatus::new(),
            status_path,
            exit_requested: false,
        };
        frontend.show_default_art();
        frontend.publish_status();
        info!("Front-end ready with {} game(s)", frontend.config.games.len());
        frontend
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    /// `true` from the moment a launch starts until the selection surface is
    /// back and input has resumed.
    pub fn is_game_active(&self) -> bool {
        self.navigation.is_game_active() || self.processes.is_game_active()
    }

    pub fn selected(&self) -> usize {
        self.navigation.selected()
    }

    pub fn transition_state(&self) -> TransitionState {
        self.transitions.state()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.processes.session()
    }

    pub fn status(&self) -> &FrontendStatus {
        &self.status
    }

    pub fn surfaces(&self) -> &S {
        &self.surfaces
    }

    pub fn desktop(&self) -> &D {
        &self.desktop
    }

    /// Set once the front-end should leave its main loop.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    // ── Event routing ─────────────────────────────────────────────────────────

    pub fn handle_event(&mut self, event: FrontendEvent, now: Instant) {
        match event {
            FrontendEvent::KeyDown(key) => self.handle_key(&key, now),
            FrontendEvent::ProcessExited { pid, code } => self.on_process_exited(pid, code, now),
            FrontendEvent::ConfigReloaded(config) => self.apply_config(config),
            FrontendEvent::Shutdown => self.shutdown(),
        }
    }

    pub fn handle_key(&mut self, key: &str, now: Instant) {
        let action = self.config.bindings.action_for(key);
        trace!("Key {key} -> {action:?}");

        if self.processes.session().is_some() {
            self.handle_in_game_key(action, now);
            return;
        }
        if self.is_game_active() || self.transitions.is_in_flight() {
            return;
        }

        // Something else may have stolen focus while the cabinet sat idle.
        if let Err(e) = self.surfaces.focus(SurfaceId::Selection) {
            warn!("Failed to refocus selection surface: {e}");
        }

        match action {
            Some(Action::Left) => self.navigate(Direction::Left),
            Some(Action::Right) => self.navigate(Direction::Right),
            Some(Action::Up) => self.navigate(Direction::Up),
            Some(Action::Down) => self.navigate(Direction::Down),
            Some(Action::Select) => self.launch_selected(now),
            Some(Action::Exit) => {
                info!("Exit requested");
                self.shutdown();
            }
            Some(Action::Kill | Action::ToggleOverlay) => {
                debug!("{key} ignored: no game running");
            }
            None => {}
        }
    }

    /// Kill and ToggleOverlay need a double press; everything else is the game's.
    fn handle_in_game_key(&mut self, action: Option<Action>, now: Instant) {
        let Some(session) = self.processes.session_mut() else {
            return;
        };
        match action {
            Some(Action::Kill) => {
                if session.kill_press.press(now, DOUBLE_PRESS_THRESHOLD) {
                    self.kill_session();
                } else {
                    info!("Press Kill again to terminate '{}'", session.game.name);
                }
            }
            Some(Action::ToggleOverlay) => {
                if session.overlay_press.press(now, DOUBLE_PRESS_THRESHOLD) {
                    session.overlay_visible = !session.overlay_visible;
                    let visible = session.overlay_visible;
                    self.surfaces.set_overlay_visible(visible);
                }
            }
            _ => {}
        }
    }

    fn navigate(&mut self, direction: Direction) {
        self.navigation.apply(direction, &mut self.surfaces);
    }

    // ── Ticks ─────────────────────────────────────────────────────────────────

    /// Controller poll.  Skipped entirely while input is paused.
    pub fn on_poll_tick(&mut self, samples: &Samples, now: Instant) {
        if self.is_game_active() || self.transitions.is_in_flight() {
            return;
        }
        let batch = self.poller.poll(samples, now);
        self.navigation.dispatch_batch(batch, &mut self.surfaces);
    }

    pub fn on_animation_tick(&mut self, now: Instant) {
        let signals = self.transitions.on_animation_tick(&mut self.surfaces, now);
        self.handle_signals(signals, now);
    }

    pub fn on_progress_tick(&mut self, now: Instant) {
        let signals = self.transitions.on_progress_tick(&mut self.surfaces, now);
        self.handle_signals(signals, now);
    }

    fn handle_signals(&mut self, signals: Vec<TransitionSignal>, now: Instant) {
        for signal in signals {
            match signal {
                TransitionSignal::SelectionHidden(game) => self.show_game_art(&game),
                TransitionSignal::LaunchReady(game) => self.start_game(&game, now),
                TransitionSignal::SelectionRestored => self.resume_input(),
                TransitionSignal::Recovered => {
                    warn!("Transition recovered; selection surface restored");
                    self.show_default_art();
                    self.resume_input();
                }
            }
        }
    }

    // ── Launch / return ───────────────────────────────────────────────────────

    fn launch_selected(&mut self, now: Instant) {
        let Some(game) = self.config.games.get(self.navigation.selected()).cloned() else {
            debug!("Select ignored: no games configured");
            return;
        };
        match self
            .transitions
            .begin_launch(&game, &self.config.settings, &mut self.surfaces, now)
        {
            Ok(()) => {
                self.navigation.set_game_active(true);
                self.desktop.save_cursor();
                self.set_state(FrontendState::Launching, Some(&game.name));
            }
            Err(TransitionError::Busy { .. }) => {}
            Err(TransitionError::Surface(e)) => {
                error!("Could not start launch of '{}': {e}", game.name);
                self.resume_input();
            }
        }
    }

    fn start_game(&mut self, game: &GameRef, now: Instant) {
        match self.processes.launch(game) {
            Ok(pid) => {
                debug!("'{}' running as pid {pid} at {now:?}", game.name);
                self.status.record_launch(&game.name, Local::now());
                self.publish_status();
            }
            Err(e) => self.launch_failed(game, e),
        }
    }

    /// Every launch failure ends with the selection surface back, focused and
    /// accepting input, and no session.
    fn launch_failed(&mut self, game: &GameRef, e: LaunchError) {
        error!("Failed to launch '{}': {e}", game.name);
        self.desktop
            .show_error(&format!("Could not start {}", game.name), &e.to_string());
        self.transitions.force_restore_selection(&mut self.surfaces);
        self.show_default_art();
        self.desktop.restore_cursor();
        self.status.error = Some(e.to_string());
        self.resume_input();
    }

    pub fn on_process_exited(&mut self, pid: u32, code: Option<i32>, now: Instant) {
        let Some(session) = self.processes.on_exit(pid, code) else {
            return;
        };
        if session.overlay_visible {
            self.surfaces.set_overlay_visible(false);
        }
        self.show_default_art();
        self.desktop.restore_cursor();

        if self.exit_requested {
            return;
        }
        self.set_state(FrontendState::Returning, Some(&session.game.name));
        match self
            .transitions
            .begin_return(&session.game, &self.config.settings, &mut self.surfaces, now)
        {
            Ok(()) => {}
            Err(TransitionError::Busy { current, .. }) => {
                warn!("Return after '{}' skipped: transition {current:?} in flight", session.game.name);
            }
            Err(TransitionError::Surface(e)) => {
                error!("Could not start return sequence: {e}");
                self.resume_input();
            }
        }
    }

    fn kill_session(&mut self) {
        match self.processes.kill_active_tree() {
            Ok(count) => debug!("Kill switch terminated {count} process(es)"),
            Err(e) => {
                error!("Kill switch failed: {e}");
                self.status.error = Some(e.to_string());
                self.publish_status();
            }
        }
    }

    fn resume_input(&mut self) {
        self.poller.reset();
        self.navigation.set_game_active(false);
        self.set_state(FrontendState::Idle, None);
    }

    // ── Secondary displays ────────────────────────────────────────────────────

    fn show_game_art(&mut self, game: &GameRef) {
        if let Some(image) = &game.marquee {
            self.surfaces.secondary(Secondary::Marquee).fade_to_image(image);
        }
        if let Some(image) = &game.controller_layout {
            self.surfaces
                .secondary(Secondary::ControllerLayout)
                .fade_to_image(image);
        }
    }

    fn show_default_art(&mut self) {
        let settings = &self.config.settings;
        if let Some(image) = &settings.default_marquee {
            self.surfaces.secondary(Secondary::Marquee).fade_to_image(image);
        }
        if let Some(image) = &settings.default_controller_layout {
            self.surfaces
                .secondary(Secondary::ControllerLayout)
                .fade_to_image(image);
        }
    }

    // ── Config / shutdown ─────────────────────────────────────────────────────

    /// Applies a reloaded config.  Bindings, grid shape and timings take effect
    /// immediately; a running game keeps the settings it was launched with.
    pub fn apply_config(&mut self, config: Config) {
        info!("Config reloaded");
        warn_unknown_keys(&config);
        self.navigation
            .set_layout(config.settings.effective_columns(), config.games.len());
        self.poller.set_deadzone(config.settings.effective_deadzone());
        self.processes
            .set_plugins(PluginRegistry::from_config(&config.plugins));
        self.config = config;
        if !self.is_game_active() && !self.transitions.is_in_flight() {
            self.show_default_art();
        }
    }

    /// Kills any running game tree and records an idle status.  The main loop
    /// exits once [`Self::exit_requested`] is set.
    pub fn shutdown(&mut self) {
        if self.exit_requested {
            return;
        }
        self.exit_requested = true;
        if self.processes.session().is_some() {
            self.kill_session();
        }
        self.set_state(FrontendState::Idle, None);
        info!("Front-end shutting down");
    }

    // ── Status ────────────────────────────────────────────────────────────────

    fn set_state(&mut self, state: FrontendState, game: Option<&str>) {
        self.status.state = state;
        if let Some(game) = game {
            self.status.active_game = Some(game.to_string());
        } else if state == FrontendState::Idle {
            self.status.active_game = None;
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        if let Some(path) = &self.status_path {
            write_status(path, &self.status);
        }
    }
}

fn warn_unknown_keys(config: &Config) {
    for action in Action::ALL {
        for key in config.bindings.keys(action) {
            if hotkey::vk_code(key).is_none() {
                warn!("Binding '{key}' for {} is not a known key name", action.as_str());
            }
        }
    }
}
