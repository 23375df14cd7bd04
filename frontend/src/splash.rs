/// Splash surface controller: fade-in, timed radial progress, fade-out.
///
/// One controller exists per splash surface instance and walks
/// `Created -> FadingIn -> ProgressRunning -> FadingOut -> Closed` exactly once.
/// It owns no window; the transition machine pushes its opacity and progress to
/// the surface host after every tick.
use std::time::Duration;

use crate::fade::{FadeChannel, FadeDirection, FadeTick};

/// Spacing of progress ticks (~100 ticks over the default 3 s).
pub const PROGRESS_TICK: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashPhase {
    Created,
    FadingIn,
    ProgressRunning,
    FadingOut,
    Closed,
}

/// Completion signals surfaced to the transition machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplashSignal {
    /// Fade-in finished; the progress timer is now running.
    FadeInComplete,
    ProgressComplete,
    FadeOutComplete,
}

#[derive(Debug)]
pub struct SplashProgressController {
    phase: SplashPhase,
    fade: FadeChannel,
    animation_tick: Duration,
    percentage: f64,
    percentage_step: f64,
}

impl SplashProgressController {
    /// `progress_duration` is how long the progress arc takes to fill.
    pub fn new(progress_duration: Duration, animation_tick: Duration) -> Self {
        let ticks = (progress_duration.as_secs_f64() / PROGRESS_TICK.as_secs_f64()).max(1.0);
        Self {
            phase: SplashPhase::Created,
            fade: FadeChannel::transparent(),
            animation_tick,
            percentage: 0.0,
            percentage_step: 100.0 / ticks,
        }
    }

    pub fn phase(&self) -> SplashPhase {
        self.phase
    }

    pub fn opacity(&self) -> f64 {
        self.fade.opacity()
    }

    /// Linear progress of the running fade.
    pub fn fade_progress(&self) -> f64 {
        self.fade.progress()
    }

    pub fn percentage(&self) -> f64 {
        self.percentage
    }

    /// Arc sweep for the current percentage.
    pub fn sweep_degrees(&self) -> f64 {
        self.percentage * 3.6
    }

    pub fn start_fade_in(&mut self, duration: Duration) {
        self.fade.start(FadeDirection::In, duration, self.animation_tick);
        self.phase = SplashPhase::FadingIn;
    }

    pub fn start_progress(&mut self) {
        self.fade.set(1.0);
        self.percentage = 0.0;
        self.phase = SplashPhase::ProgressRunning;
    }

    pub fn start_fade_out(&mut self, duration: Duration) {
        self.fade.start(FadeDirection::Out, duration, self.animation_tick);
        self.phase = SplashPhase::FadingOut;
    }

    pub fn close(&mut self) {
        self.fade.set(0.0);
        self.phase = SplashPhase::Closed;
    }

    /// Advances the fade channel.  Only meaningful while fading.
    pub fn on_animation_tick(&mut self) -> Option<SplashSignal> {
        if !matches!(self.phase, SplashPhase::FadingIn | SplashPhase::FadingOut) {
            return None;
        }
        match (self.fade.tick(), self.phase) {
            (FadeTick::Completed, SplashPhase::FadingIn) => {
                self.start_progress();
                Some(SplashSignal::FadeInComplete)
            }
            (FadeTick::Completed, SplashPhase::FadingOut) => {
                self.phase = SplashPhase::Closed;
                Some(SplashSignal::FadeOutComplete)
            }
            _ => None,
        }
    }

    /// Advances the progress counter.  Only meaningful while progress runs.
    pub fn on_progress_tick(&mut self) -> Option<SplashSignal> {
        if self.phase != SplashPhase::ProgressRunning || self.percentage >= 100.0 {
            return None;
        }
        self.percentage = (self.percentage + self.percentage_step).min(100.0);
        // Float drift on the last step.
        if 100.0 - self.percentage < 1e-6 {
            self.percentage = 100.0;
        }
        (self.percentage >= 100.0).then_some(SplashSignal::ProgressComplete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(16);
    const FADE: Duration = Duration::from_millis(160);

    fn fade_in(splash: &mut SplashProgressController) -> usize {
        splash.start_fade_in(FADE);
        let mut ticks = 0;
        loop {
            ticks += 1;
            if splash.on_animation_tick() == Some(SplashSignal::FadeInComplete) {
                return ticks;
            }
        }
    }

    #[test]
    fn fade_in_completion_starts_progress() {
        let mut splash = SplashProgressController::new(Duration::from_secs(3), TICK);
        assert_eq!(splash.phase(), SplashPhase::Created);
        assert_eq!(fade_in(&mut splash), 10);
        assert_eq!(splash.phase(), SplashPhase::ProgressRunning);
        assert_eq!(splash.opacity(), 1.0);
        assert_eq!(splash.percentage(), 0.0);
    }

    #[test]
    fn progress_completes_after_about_one_hundred_ticks() {
        let mut splash = SplashProgressController::new(Duration::from_millis(3_000), TICK);
        fade_in(&mut splash);
        let mut ticks = 0;
        let signal = loop {
            ticks += 1;
            if let Some(s) = splash.on_progress_tick() {
                break s;
            }
            assert!(ticks < 1_000);
        };
        assert_eq!(signal, SplashSignal::ProgressComplete);
        assert_eq!(ticks, 100);
        assert_eq!(splash.percentage(), 100.0);
        assert_eq!(splash.sweep_degrees(), 360.0);
        // Stopped: further ticks do nothing.
        assert_eq!(splash.on_progress_tick(), None);
    }

    #[test]
    fn sweep_tracks_percentage() {
        let mut splash = SplashProgressController::new(Duration::from_millis(3_000), TICK);
        fade_in(&mut splash);
        for _ in 0..25 {
            splash.on_progress_tick();
        }
        assert!((splash.percentage() - 25.0).abs() < 1e-9);
        assert!((splash.sweep_degrees() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn custom_duration_changes_tick_count() {
        let mut splash = SplashProgressController::new(Duration::from_millis(600), TICK);
        fade_in(&mut splash);
        let ticks = (1..).find(|_| splash.on_progress_tick().is_some()).unwrap();
        assert_eq!(ticks, 20);
    }

    #[test]
    fn progress_ticks_ignored_outside_progress_phase() {
        let mut splash = SplashProgressController::new(Duration::from_millis(3_000), TICK);
        assert_eq!(splash.on_progress_tick(), None);
        splash.start_fade_in(FADE);
        assert_eq!(splash.on_progress_tick(), None);
        assert_eq!(splash.percentage(), 0.0);
    }

    #[test]
    fn fade_out_closes() {
        let mut splash = SplashProgressController::new(Duration::from_millis(3_000), TICK);
        fade_in(&mut splash);
        splash.start_fade_out(FADE);
        assert_eq!(splash.phase(), SplashPhase::FadingOut);
        let signal = (0..100).find_map(|_| splash.on_animation_tick());
        assert_eq!(signal, Some(SplashSignal::FadeOutComplete));
        assert_eq!(splash.phase(), SplashPhase::Closed);
        assert_eq!(splash.opacity(), 0.0);
        assert_eq!(splash.on_animation_tick(), None);
    }
}
