/// Polled game-controller input.
///
/// [`InputPoller`] turns raw stick / D-pad samples from up to four controller
/// slots into discrete navigation commands with tap-then-repeat semantics:
///   - the first poll a direction is active emits one single move,
///   - after [`HOLD_THRESHOLD`] of continuous hold it emits a continuous move
///     every [`CONTINUOUS_INTERVAL`],
///   - releasing the direction resets it immediately.
///
/// Hardware access sits behind [`ControllerSource`] so tests can inject
/// synthetic samples on a virtual clock.
use std::time::{Duration, Instant};

use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use log::{debug, info, warn};

pub const MAX_CONTROLLERS: usize = 4;
/// Matched to typical controller report rates (~125 Hz).
pub const POLL_INTERVAL: Duration = Duration::from_millis(8);
pub const HOLD_THRESHOLD: Duration = Duration::from_millis(500);
pub const CONTINUOUS_INTERVAL: Duration = Duration::from_millis(100);
/// Minimum spacing of "input ignored" diagnostics per direction.
const IGNORED_LOG_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Direction {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// One controller's raw state for a single poll.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ControllerSample {
    /// Left stick X in [-1, 1], right positive.
    pub x: f32,
    /// Left stick Y in [-1, 1], up positive.
    pub y: f32,
    /// D-pad buttons indexed by [`Direction::index`].
    pub dpad: [bool; 4],
}

impl ControllerSample {
    pub fn stick(x: f32, y: f32) -> Self {
        Self { x, y, dpad: [false; 4] }
    }

    fn is_active(&self, direction: Direction, deadzone: f32) -> bool {
        let axis = match direction {
            Direction::Up => self.y > deadzone,
            Direction::Down => self.y < -deadzone,
            Direction::Left => self.x < -deadzone,
            Direction::Right => self.x > deadzone,
        };
        axis || self.dpad[direction.index()]
    }
}

/// Per-slot samples; `None` means nothing is connected in that slot.
pub type Samples = [Option<ControllerSample>; MAX_CONTROLLERS];

/// Source of raw controller state.
pub trait ControllerSource {
    fn poll_controllers(&mut self) -> Samples;
}

/// A discrete navigation command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavCommand {
    pub controller: usize,
    pub direction: Direction,
    /// `true` for the tap move of a press, `false` for hold-repeat moves.
    pub is_single: bool,
}

/// Small bitset of directions active on one controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActiveSet(u8);

impl ActiveSet {
    pub fn insert(&mut self, direction: Direction) {
        self.0 |= 1 << direction.index();
    }

    pub fn contains(self, direction: Direction) -> bool {
        self.0 & (1 << direction.index()) != 0
    }

    /// `true` when both directions on `direction`'s axis are active.
    pub fn conflicts(self, direction: Direction) -> bool {
        match direction {
            Direction::Up | Direction::Down => {
                self.contains(Direction::Up) && self.contains(Direction::Down)
            }
            Direction::Left | Direction::Right => {
                self.contains(Direction::Left) && self.contains(Direction::Right)
            }
        }
    }
}

/// Output of one poll.  Reused across polls.
#[derive(Debug, Default)]
pub struct PollBatch {
    pub commands: Vec<NavCommand>,
    pub active: [ActiveSet; MAX_CONTROLLERS],
}

impl PollBatch {
    fn clear(&mut self) {
        self.commands.clear();
        self.active = [ActiveSet::default(); MAX_CONTROLLERS];
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionState {
    pub press_start: Option<Instant>,
    pub last_move: Option<Instant>,
    pub last_ignored_log: Option<Instant>,
}

impl DirectionState {
    fn release(&mut self) {
        self.press_start = None;
        self.last_move = None;
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ControllerInputState {
    pub connected: bool,
    pub directions: [DirectionState; 4],
}

impl ControllerInputState {
    fn release_all(&mut self) {
        for d in &mut self.directions {
            d.release();
        }
    }
}

pub struct InputPoller {
    states: [ControllerInputState; MAX_CONTROLLERS],
    deadzone: f32,
    batch: PollBatch,
}

impl InputPoller {
    pub fn new(deadzone: f32) -> Self {
        Self {
            states: [ControllerInputState::default(); MAX_CONTROLLERS],
            deadzone,
            batch: PollBatch::default(),
        }
    }

    pub fn set_deadzone(&mut self, deadzone: f32) {
        self.deadzone = deadzone;
    }

    pub fn state(&self, controller: usize) -> &ControllerInputState {
        &self.states[controller]
    }

    /// Releases every direction on every slot.  Used when polling resumes so a
    /// stick held across a game session starts a fresh press.
    pub fn reset(&mut self) {
        for state in &mut self.states {
            state.release_all();
        }
        self.batch.clear();
    }

    /// Processes one set of samples taken at `now`.
    pub fn poll(&mut self, samples: &Samples, now: Instant) -> &PollBatch {
        self.batch.clear();

        for (slot, sample) in samples.iter().enumerate() {
            let state = &mut self.states[slot];

            match (state.connected, sample) {
                (false, Some(_)) => {
                    info!("Controller {slot} connected");
                    state.connected = true;
                    state.release_all();
                }
                (true, None) => {
                    info!("Controller {slot} disconnected");
                    state.connected = false;
                    state.release_all();
                }
                _ => {}
            }

            let Some(sample) = sample else { continue };

            for direction in Direction::ALL {
                let active = sample.is_active(direction, self.deadzone);
                if active {
                    self.batch.active[slot].insert(direction);
                }
                let dir_state = &mut state.directions[direction.index()];
                if let Some(is_single) = step_direction(dir_state, active, now, slot, direction) {
                    self.batch.commands.push(NavCommand {
                        controller: slot,
                        direction,
                        is_single,
                    });
                }
            }
        }

        &self.batch
    }
}

/// Advances one direction's press state.  Returns `Some(is_single)` when a
/// move should be emitted this poll.
fn step_direction(
    state: &mut DirectionState,
    active: bool,
    now: Instant,
    slot: usize,
    direction: Direction,
) -> Option<bool> {
    if !active {
        state.release();
        return None;
    }

    let press_start = *state.press_start.get_or_insert(now);
    let held = now.saturating_duration_since(press_start);

    match state.last_move {
        None => {
            state.last_move = Some(now);
            Some(held < HOLD_THRESHOLD)
        }
        Some(last) if held >= HOLD_THRESHOLD
            && now.saturating_duration_since(last) >= CONTINUOUS_INTERVAL =>
        {
            state.last_move = Some(now);
            Some(false)
        }
        Some(_) => {
            let due = state
                .last_ignored_log
                .map_or(true, |t| now.saturating_duration_since(t) >= IGNORED_LOG_INTERVAL);
            if due {
                debug!("Input ignored: controller {slot} {direction:?} held {held:?}");
                state.last_ignored_log = Some(now);
            }
            None
        }
    }
}

// ── gilrs source ──────────────────────────────────────────────────────────────

/// Controller source backed by gilrs (XInput / WGI on Windows, evdev on Linux).
///
/// Gamepads are assigned to the first free slot when they connect and keep it
/// until they disconnect.
pub struct GilrsSource {
    gilrs: Gilrs,
    slots: [Option<GamepadId>; MAX_CONTROLLERS],
}

impl GilrsSource {
    /// Returns `None` if no gamepad backend is available on this system.
    pub fn new() -> Option<Self> {
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(gilrs::Error::NotImplemented(g)) => {
                warn!("Gamepad backend not implemented on this platform; controllers disabled");
                g
            }
            Err(e) => {
                warn!("Failed to initialize gilrs: {e}");
                return None;
            }
        };

        let mut source = Self {
            gilrs,
            slots: [None; MAX_CONTROLLERS],
        };
        let connected: Vec<GamepadId> = source
            .gilrs
            .gamepads()
            .filter(|(_, pad)| pad.is_connected())
            .map(|(id, _)| id)
            .collect();
        for id in connected {
            source.assign(id);
        }
        Some(source)
    }

    fn assign(&mut self, id: GamepadId) {
        if self.slots.contains(&Some(id)) {
            return;
        }
        match self.slots.iter_mut().find(|s| s.is_none()) {
            Some(slot) => *slot = Some(id),
            None => warn!("Ignoring gamepad {id:?}: all {MAX_CONTROLLERS} slots in use"),
        }
    }

    fn release(&mut self, id: GamepadId) {
        for slot in &mut self.slots {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }
}

impl ControllerSource for GilrsSource {
    fn poll_controllers(&mut self) -> Samples {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => self.assign(id),
                EventType::Disconnected => self.release(id),
                _ => {}
            }
        }

        let mut samples: Samples = [None; MAX_CONTROLLERS];
        for (slot, id) in self.slots.iter().enumerate() {
            let Some(pad) = id.and_then(|id| self.gilrs.connected_gamepad(id)) else {
                continue;
            };
            samples[slot] = Some(ControllerSample {
                x: pad.value(Axis::LeftStickX),
                y: pad.value(Axis::LeftStickY),
                dpad: [
                    pad.is_pressed(Button::DPadUp),
                    pad.is_pressed(Button::DPadDown),
                    pad.is_pressed(Button::DPadLeft),
                    pad.is_pressed(Button::DPadRight),
                ],
            });
        }
        samples
    }
}

/// Used when no gamepad backend could be initialized.
pub struct NoControllers;

impl ControllerSource for NoControllers {
    fn poll_controllers(&mut self) -> Samples {
        [None; MAX_CONTROLLERS]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
