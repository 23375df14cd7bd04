/// Launch / return transition engine.
///
/// Two sequences exist, and only one may be in flight at a time:
///   - Launch: T1 (selection fades out, splash fades in, progress runs) then
///     T2 (splash fades out, the game is launched).
///   - Return: T3 (a fresh splash fades in, progress runs) then
///     T4 (splash fades out while the selection surface fades back in).
///
/// Cross-fades overlap: the destination surface starts fading in once the
/// source fade-out reaches [`OVERLAP_PERCENTAGE`] of its progress, so there is
/// never a gap with both surfaces transparent.  Everything is driven by the
/// coordinator's animation and progress ticks; the machine never blocks.
///
/// Any surface failure while performing a step closes the splash and forces the
/// selection surface back to visible, opaque and focused.  During a return
/// sequence a fallback deadline does the same if progress never completes.
use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{GameRef, Settings};
use crate::error::{SurfaceError, TransitionError};
use crate::fade::{FadeChannel, FadeDirection, FadeTick};
use crate::splash::{SplashPhase, SplashProgressController, SplashSignal};
use crate::surface::{SurfaceId, Surfaces};

/// Animation tick spacing (~60 Hz).
pub const ANIMATION_TICK: Duration = Duration::from_millis(16);
/// Fraction of the source fade-out after which the destination fade-in starts.
pub const OVERLAP_PERCENTAGE: f64 = 0.98;
pub const FALLBACK_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Launch,
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    T1FadingOutSelect,
    T1FadingInSplash,
    ProgressRunning(Phase),
    T2FadingOutSplash,
    T3FadingInSplash,
    T4FadingOutSplash,
    T4FadingInSelect,
}

impl TransitionState {
    /// The sequence this state belongs to, or `None` when idle.
    pub fn sequence(self) -> Option<Phase> {
        match self {
            TransitionState::Idle => None,
            TransitionState::T1FadingOutSelect
            | TransitionState::T1FadingInSplash
            | TransitionState::T2FadingOutSplash => Some(Phase::Launch),
            TransitionState::T3FadingInSplash
            | TransitionState::T4FadingOutSplash
            | TransitionState::T4FadingInSelect => Some(Phase::Return),
            TransitionState::ProgressRunning(phase) => Some(phase),
        }
    }
}

/// Things the coordinator has to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionSignal {
    /// T1: the selection surface is fully hidden.
    SelectionHidden(GameRef),
    /// T2: the splash is gone; start the game.
    LaunchReady(GameRef),
    /// T4: the selection surface is back and focused.
    SelectionRestored,
    /// A failure or the fallback deadline forced the selection surface back.
    Recovered,
}

/// Timestamps of the cross-fade in the current or last sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeline {
    pub source_fade_out_end: Option<Instant>,
    pub dest_fade_in_start: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionTimings {
    pub animation_tick: Duration,
    pub overlap: f64,
    pub fallback_timeout: Duration,
}

impl Default for TransitionTimings {
    fn default() -> Self {
        Self {
            animation_tick: ANIMATION_TICK,
            overlap: OVERLAP_PERCENTAGE,
            fallback_timeout: FALLBACK_TIMEOUT,
        }
    }
}

pub struct TransitionStateMachine {
    state: TransitionState,
    timings: TransitionTimings,
    selection: FadeChannel,
    splash: Option<SplashProgressController>,
    game: Option<GameRef>,
    splash_image: Option<PathBuf>,
    fade: Duration,
    splash_duration: Duration,
    fallback_deadline: Option<Instant>,
    timeline: Timeline,
}

impl TransitionStateMachine {
    pub fn new(timings: TransitionTimings) -> Self {
        Self {
            state: TransitionState::Idle,
            timings,
            selection: FadeChannel::opaque(),
            splash: None,
            game: None,
            splash_image: None,
            fade: Duration::ZERO,
            splash_duration: Duration::ZERO,
            fallback_deadline: None,
            timeline: Timeline::default(),
        }
    }

    pub fn state(&self) -> TransitionState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state != TransitionState::Idle
    }

    pub fn timeline(&self) -> Timeline {
        self.timeline
    }

    pub fn fallback_deadline(&self) -> Option<Instant> {
        self.fallback_deadline
    }

    pub fn selection_opacity(&self) -> f64 {
        self.selection.opacity()
    }

    // ── Sequence entry points ─────────────────────────────────────────────────

    /// Starts T1.  Rejected if any sequence is already in flight.
    pub fn begin_launch<S: Surfaces>(
        &mut self,
        game: &GameRef,
        settings: &Settings,
        surfaces: &mut S,
        now: Instant,
    ) -> Result<(), TransitionError> {
        self.ensure_idle("launch")?;
        self.prepare(game, settings);
        info!("Launch sequence started for '{}'", game.name);

        self.selection
            .start(FadeDirection::Out, self.fade, self.timings.animation_tick);
        self.state = TransitionState::T1FadingOutSelect;
        if let Err(e) = surfaces.set_topmost(SurfaceId::Selection, false) {
            error!("Failed to start launch sequence: {e}");
            self.force_restore_selection(surfaces);
            return Err(e.into());
        }
        debug!("T1 started at {now:?}");
        Ok(())
    }

    /// Starts T3.  Rejected if any sequence is already in flight.
    pub fn begin_return<S: Surfaces>(
        &mut self,
        game: &GameRef,
        settings: &Settings,
        surfaces: &mut S,
        now: Instant,
    ) -> Result<(), TransitionError> {
        self.ensure_idle("return")?;
        self.prepare(game, settings);
        info!("Return sequence started after '{}'", game.name);

        self.state = TransitionState::T3FadingInSplash;
        if let Err(e) = self.open_splash(surfaces, now) {
            error!("Failed to start return sequence: {e}");
            self.force_restore_selection(surfaces);
            return Err(e.into());
        }
        Ok(())
    }

    fn ensure_idle(&self, requested: &'static str) -> Result<(), TransitionError> {
        if self.state != TransitionState::Idle {
            let running = match self.state.sequence() {
                Some(Phase::Launch) => "launch",
                Some(Phase::Return) => "return",
                None => "no",
            };
            warn!(
                "Rejected {requested} sequence: {running} sequence in flight ({:?})",
                self.state
            );
            return Err(TransitionError::Busy {
                requested,
                current: self.state,
            });
        }
        Ok(())
    }

    fn prepare(&mut self, game: &GameRef, settings: &Settings) {
        self.game = Some(game.clone());
        self.splash_image = game
            .splash_image(settings.resolution_tier)
            .map(|p| p.to_path_buf());
        self.fade = settings.fade_duration();
        self.splash_duration = game.effective_splash_duration(settings);
        self.fallback_deadline = None;
        self.timeline = Timeline::default();
    }

    // ── Ticks ─────────────────────────────────────────────────────────────────

    pub fn on_animation_tick<S: Surfaces>(
        &mut self,
        surfaces: &mut S,
        now: Instant,
    ) -> Vec<TransitionSignal> {
        let mut signals = Vec::new();
        if self.state == TransitionState::Idle {
            return signals;
        }
        if self.check_fallback(surfaces, now) {
            signals.push(TransitionSignal::Recovered);
            return signals;
        }
        if let Err(e) = self.step_animation(surfaces, now, &mut signals) {
            error!("Transition step failed in {:?}: {e}", self.state);
            self.force_restore_selection(surfaces);
            signals.push(TransitionSignal::Recovered);
        }
        signals
    }

    pub fn on_progress_tick<S: Surfaces>(
        &mut self,
        surfaces: &mut S,
        now: Instant,
    ) -> Vec<TransitionSignal> {
        let mut signals = Vec::new();
        if self.check_fallback(surfaces, now) {
            signals.push(TransitionSignal::Recovered);
            return signals;
        }
        let TransitionState::ProgressRunning(phase) = self.state else {
            return signals;
        };
        if let Err(e) = self.step_progress(surfaces, phase, now) {
            error!("Progress step failed: {e}");
            self.force_restore_selection(surfaces);
            signals.push(TransitionSignal::Recovered);
        }
        signals
    }

    /// Returns `true` if the fallback deadline fired and the selection surface
    /// was force-restored.
    fn check_fallback<S: Surfaces>(&mut self, surfaces: &mut S, now: Instant) -> bool {
        match self.fallback_deadline {
            Some(deadline) if now >= deadline => {
                warn!(
                    "Return sequence stalled in {:?} for {:?}; restoring selection surface",
                    self.state, self.timings.fallback_timeout
                );
                self.force_restore_selection(surfaces);
                true
            }
            _ => false,
        }
    }

    fn step_animation<S: Surfaces>(
        &mut self,
        surfaces: &mut S,
        now: Instant,
        signals: &mut Vec<TransitionSignal>,
    ) -> Result<(), SurfaceError> {
        // Selection surface.
        let fading_out = self.selection.is_fading_out();
        let fading_in = self.selection.is_fading_in();
        let tick = self.selection.tick();
        if tick != FadeTick::Idle {
            surfaces.set_opacity(SurfaceId::Selection, self.selection.opacity())?;
            // Overlap is checked before completion so the destination fade-in
            // can never start after the source fade-out ended.
            if self.state == TransitionState::T1FadingOutSelect
                && self.selection.progress() >= self.timings.overlap
            {
                self.open_splash(surfaces, now)?;
                self.state = TransitionState::T1FadingInSplash;
                self.timeline.dest_fade_in_start = Some(now);
            }
            if tick == FadeTick::Completed && fading_out {
                surfaces.set_visible(SurfaceId::Selection, false)?;
                self.timeline.source_fade_out_end = Some(now);
                if let Some(game) = &self.game {
                    signals.push(TransitionSignal::SelectionHidden(game.clone()));
                }
            } else if tick == FadeTick::Completed && fading_in {
                self.try_finish_return(surfaces, signals)?;
            }
        }

        // Splash surface.
        let Some(splash) = self.splash.as_mut() else {
            return Ok(());
        };
        let was_fading = matches!(splash.phase(), SplashPhase::FadingIn | SplashPhase::FadingOut);
        let signal = splash.on_animation_tick();
        let opacity = splash.opacity();
        let fade_progress = splash.fade_progress();

        if was_fading {
            surfaces.set_opacity(SurfaceId::Splash, opacity)?;
        }
        if self.state == TransitionState::T4FadingOutSplash && fade_progress >= self.timings.overlap {
            surfaces.set_opacity(SurfaceId::Selection, 0.0)?;
            surfaces.set_visible(SurfaceId::Selection, true)?;
            self.selection
                .start(FadeDirection::In, self.fade, self.timings.animation_tick);
            self.state = TransitionState::T4FadingInSelect;
            self.timeline.dest_fade_in_start = Some(now);
        }

        match signal {
            Some(SplashSignal::FadeInComplete) => self.on_splash_faded_in(now),
            Some(SplashSignal::FadeOutComplete) => {
                surfaces.close_splash();
                self.splash = None;
                match self.state {
                    TransitionState::T2FadingOutSplash => {
                        self.state = TransitionState::Idle;
                        if let Some(game) = self.game.take() {
                            info!("Launch sequence finished for '{}'", game.name);
                            signals.push(TransitionSignal::LaunchReady(game));
                        }
                    }
                    TransitionState::T4FadingInSelect => {
                        self.timeline.source_fade_out_end = Some(now);
                        self.try_finish_return(surfaces, signals)?;
                    }
                    other => warn!("Splash faded out in unexpected state {other:?}"),
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn step_progress<S: Surfaces>(
        &mut self,
        surfaces: &mut S,
        phase: Phase,
        now: Instant,
    ) -> Result<(), SurfaceError> {
        let Some(splash) = self.splash.as_mut() else {
            return Ok(());
        };
        let signal = splash.on_progress_tick();
        surfaces.render_progress(splash.percentage(), splash.sweep_degrees())?;

        if signal == Some(SplashSignal::ProgressComplete) {
            splash.start_fade_out(self.fade);
            self.state = match phase {
                Phase::Launch => TransitionState::T2FadingOutSplash,
                Phase::Return => {
                    self.fallback_deadline = None;
                    TransitionState::T4FadingOutSplash
                }
            };
            debug!("Progress complete, entering {:?}", self.state);
        } else if phase == Phase::Return {
            // The deadline measures a stall, not the splash length.
            self.fallback_deadline = Some(now + self.timings.fallback_timeout);
        }
        Ok(())
    }

    fn on_splash_faded_in(&mut self, now: Instant) {
        let phase = match self.state {
            TransitionState::T1FadingInSplash => Phase::Launch,
            TransitionState::T3FadingInSplash => Phase::Return,
            other => {
                warn!("Splash faded in during unexpected state {other:?}");
                return;
            }
        };
        self.state = TransitionState::ProgressRunning(phase);
        if phase == Phase::Return {
            self.fallback_deadline = Some(now + self.timings.fallback_timeout);
        }
    }

    /// Creates the splash surface at opacity 0, shows it on top with focus and
    /// starts its fade-in.
    fn open_splash<S: Surfaces>(&mut self, surfaces: &mut S, now: Instant) -> Result<(), SurfaceError> {
        let title = self.game.as_ref().map(|g| g.name.as_str()).unwrap_or_default();
        surfaces.open_splash(title, self.splash_image.as_deref())?;
        surfaces.set_opacity(SurfaceId::Splash, 0.0)?;
        surfaces.set_visible(SurfaceId::Splash, true)?;
        surfaces.set_topmost(SurfaceId::Splash, true)?;
        surfaces.focus(SurfaceId::Splash)?;

        let mut splash = SplashProgressController::new(self.splash_duration, self.timings.animation_tick);
        splash.start_fade_in(self.fade);
        self.splash = Some(splash);
        debug!("Splash fade-in started at {now:?}");
        Ok(())
    }

    /// Ends T4 once both the splash fade-out and the selection fade-in are done.
    fn try_finish_return<S: Surfaces>(
        &mut self,
        surfaces: &mut S,
        signals: &mut Vec<TransitionSignal>,
    ) -> Result<(), SurfaceError> {
        if self.state != TransitionState::T4FadingInSelect
            || self.splash.is_some()
            || self.selection.is_running()
        {
            return Ok(());
        }
        surfaces.set_topmost(SurfaceId::Selection, true)?;
        surfaces.focus(SurfaceId::Selection)?;
        self.state = TransitionState::Idle;
        self.game = None;
        info!("Return sequence finished");
        signals.push(TransitionSignal::SelectionRestored);
        Ok(())
    }

    // ── Recovery ──────────────────────────────────────────────────────────────

    /// Closes any splash and makes the selection surface visible, opaque,
    /// topmost and focused.  Leaves the machine idle.  Best effort: individual
    /// surface failures are logged and the remaining steps still run.
    pub fn force_restore_selection<S: Surfaces>(&mut self, surfaces: &mut S) {
        if let Some(mut splash) = self.splash.take() {
            splash.close();
        }
        surfaces.close_splash();
        self.selection.set(1.0);

        let steps = [
            surfaces.set_opacity(SurfaceId::Selection, 1.0),
            surfaces.set_visible(SurfaceId::Selection, true),
            surfaces.set_topmost(SurfaceId::Selection, true),
            surfaces.focus(SurfaceId::Selection),
        ];
        for result in steps {
            if let Err(e) = result {
                error!("Selection surface restore step failed: {e}");
            }
        }

        self.state = TransitionState::Idle;
        self.fallback_deadline = None;
        self.game = None;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
