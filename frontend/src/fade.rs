/// Tick-driven opacity channel used by every surface fade.
///
/// A channel does not integrate real time.  Each call to [`FadeChannel::tick`]
/// advances linear progress by a fixed step of `tick_interval / duration`, so
/// the effective duration is quantized to the tick grid and a dropped tick
/// simply stretches the fade.  Restarting a channel resets it in place, which
/// also discards whatever run was in progress.
use std::time::Duration;

/// Absorbs float drift from repeated step accumulation.
const COMPLETION_EPSILON: f64 = 1e-9;

/// Which way the opacity is moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Easing curve applied to linear progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    Linear,
    /// Quadratic, slow start.  Used for fade-ins.
    EaseIn,
    /// Quadratic, slow finish.  Used for fade-outs.
    EaseOut,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::EaseIn => t * t,
            Easing::EaseOut => 1.0 - (1.0 - t) * (1.0 - t),
        }
    }

    /// Fixed per-direction curve.
    pub fn for_direction(direction: FadeDirection) -> Self {
        match direction {
            FadeDirection::In => Easing::EaseIn,
            FadeDirection::Out => Easing::EaseOut,
        }
    }
}

/// Result of advancing a channel by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeTick {
    /// Nothing is fading.
    Idle,
    Running,
    /// This tick reached the target.  Reported exactly once per run.
    Completed,
}

#[derive(Debug, Clone)]
pub struct FadeChannel {
    opacity: f64,
    progress: f64,
    step: f64,
    direction: Option<FadeDirection>,
    easing: Easing,
}

impl FadeChannel {
    /// A fully opaque, idle channel.
    pub fn opaque() -> Self {
        Self::with_opacity(1.0)
    }

    /// A fully transparent, idle channel.
    pub fn transparent() -> Self {
        Self::with_opacity(0.0)
    }

    fn with_opacity(opacity: f64) -> Self {
        Self {
            opacity,
            progress: 0.0,
            step: 0.0,
            direction: None,
            easing: Easing::Linear,
        }
    }

    /// Starts a fade, replacing any run already in progress.
    ///
    /// A zero `duration` completes on the next tick.
    pub fn start(&mut self, direction: FadeDirection, duration: Duration, tick_interval: Duration) {
        self.step = if duration.is_zero() {
            1.0
        } else {
            (tick_interval.as_secs_f64() / duration.as_secs_f64()).min(1.0)
        };
        self.progress = 0.0;
        self.direction = Some(direction);
        self.easing = Easing::for_direction(direction);
        self.opacity = self.eased_opacity();
    }

    /// Advances linear progress by one step.
    pub fn tick(&mut self) -> FadeTick {
        if self.direction.is_none() {
            return FadeTick::Idle;
        }
        self.progress = (self.progress + self.step).min(1.0);
        if self.progress >= 1.0 - COMPLETION_EPSILON {
            self.progress = 1.0;
        }
        self.opacity = self.eased_opacity();
        if self.progress >= 1.0 {
            self.direction = None;
            FadeTick::Completed
        } else {
            FadeTick::Running
        }
    }

    /// Stops the channel and pins it to `opacity`.
    pub fn set(&mut self, opacity: f64) {
        self.direction = None;
        self.progress = 0.0;
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    fn eased_opacity(&self) -> f64 {
        let eased = self.easing.apply(self.progress);
        match self.direction {
            Some(FadeDirection::In) => eased,
            Some(FadeDirection::Out) => 1.0 - eased,
            None => self.opacity,
        }
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    /// Linear progress of the current (or just completed) run.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_running(&self) -> bool {
        self.direction.is_some()
    }

    pub fn is_fading_in(&self) -> bool {
        self.direction == Some(FadeDirection::In)
    }

    pub fn is_fading_out(&self) -> bool {
        self.direction == Some(FadeDirection::Out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(16);

    fn run_to_completion(ch: &mut FadeChannel) -> usize {
        let mut ticks = 0;
        loop {
            ticks += 1;
            if ch.tick() == FadeTick::Completed {
                return ticks;
            }
            assert!(ticks < 10_000, "fade never completed");
        }
    }

    #[test]
    fn idle_channel_reports_idle() {
        let mut ch = FadeChannel::opaque();
        assert_eq!(ch.tick(), FadeTick::Idle);
        assert_eq!(ch.opacity(), 1.0);
    }

    #[test]
    fn fade_out_reaches_zero_on_quantized_tick_count() {
        let mut ch = FadeChannel::opaque();
        ch.start(FadeDirection::Out, Duration::from_millis(160), TICK);
        assert!(ch.is_fading_out());
        assert_eq!(run_to_completion(&mut ch), 10);
        assert_eq!(ch.opacity(), 0.0);
        assert!(!ch.is_running());
    }

    #[test]
    fn fade_in_reaches_one() {
        let mut ch = FadeChannel::transparent();
        ch.start(FadeDirection::In, Duration::from_millis(500), TICK);
        assert!(ch.is_fading_in());
        // 500 / 16 = 31.25 -> 32 ticks.
        assert_eq!(run_to_completion(&mut ch), 32);
        assert_eq!(ch.opacity(), 1.0);
    }

    #[test]
    fn completed_is_reported_once() {
        let mut ch = FadeChannel::opaque();
        ch.start(FadeDirection::Out, Duration::from_millis(16), TICK);
        assert_eq!(ch.tick(), FadeTick::Completed);
        assert_eq!(ch.tick(), FadeTick::Idle);
    }

    #[test]
    fn zero_duration_completes_next_tick() {
        let mut ch = FadeChannel::transparent();
        ch.start(FadeDirection::In, Duration::ZERO, TICK);
        assert_eq!(ch.tick(), FadeTick::Completed);
        assert_eq!(ch.opacity(), 1.0);
    }

    #[test]
    fn restart_discards_previous_run() {
        let mut ch = FadeChannel::opaque();
        ch.start(FadeDirection::Out, Duration::from_millis(160), TICK);
        for _ in 0..5 {
            ch.tick();
        }
        ch.start(FadeDirection::In, Duration::from_millis(160), TICK);
        assert_eq!(ch.progress(), 0.0);
        assert_eq!(ch.opacity(), 0.0);
        assert!(ch.is_fading_in());
    }

    #[test]
    fn fade_out_opacity_is_monotonic() {
        let mut ch = FadeChannel::opaque();
        ch.start(FadeDirection::Out, Duration::from_millis(300), TICK);
        let mut last = ch.opacity();
        while ch.tick() != FadeTick::Completed {
            assert!(ch.opacity() <= last);
            last = ch.opacity();
        }
    }

    #[test]
    fn easing_curves_hit_endpoints() {
        for easing in [Easing::Linear, Easing::EaseIn, Easing::EaseOut] {
            assert_eq!(easing.apply(0.0), 0.0);
            assert_eq!(easing.apply(1.0), 1.0);
        }
        assert!(Easing::EaseIn.apply(0.5) < 0.5);
        assert!(Easing::EaseOut.apply(0.5) > 0.5);
    }

    #[test]
    fn set_pins_opacity_and_stops() {
        let mut ch = FadeChannel::opaque();
        ch.start(FadeDirection::Out, Duration::from_millis(160), TICK);
        ch.set(1.0);
        assert!(!ch.is_running());
        assert_eq!(ch.opacity(), 1.0);
        assert_eq!(ch.tick(), FadeTick::Idle);
    }
}
