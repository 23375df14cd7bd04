/// Window-level collaborators driven by the transition engine.
///
/// The front-end core never draws.  It tells a [`Surfaces`] host which full-screen
/// surface should be visible, at what opacity, which one is topmost and which
/// one owns input focus; the host maps that onto real windows.  [`TrackedSurfaces`]
/// is a host that only records and logs that state.  It backs the headless kiosk
/// build and the tests.
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::SurfaceError;

/// The two primary full-screen surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceId {
    /// The game grid.
    Selection,
    /// The splash / progress surface shown around a launch or exit.
    Splash,
}

/// Secondary displays that mirror artwork for the selected game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Secondary {
    Marquee,
    ControllerLayout,
}

/// A secondary display that cross-fades to a new image on request.
pub trait SecondaryDisplay {
    fn fade_to_image(&mut self, image: &Path);
}

pub trait Surfaces {
    /// Creates a fresh splash surface, hidden and transparent.
    fn open_splash(&mut self, title: &str, image: Option<&Path>) -> Result<(), SurfaceError>;
    /// Destroys the splash surface if one is open.  Never fails.
    fn close_splash(&mut self);
    fn set_visible(&mut self, id: SurfaceId, visible: bool) -> Result<(), SurfaceError>;
    fn set_opacity(&mut self, id: SurfaceId, opacity: f64) -> Result<(), SurfaceError>;
    fn set_topmost(&mut self, id: SurfaceId, topmost: bool) -> Result<(), SurfaceError>;
    /// Forces OS input focus onto `id`.
    fn focus(&mut self, id: SurfaceId) -> Result<(), SurfaceError>;
    /// Redraws the splash progress arc and percentage label.
    fn render_progress(&mut self, percentage: f64, sweep_degrees: f64) -> Result<(), SurfaceError>;
    fn invalidate_cell(&mut self, index: usize);
    /// Starts the smooth scroll that brings grid cell `index` into view.
    fn scroll_into_view(&mut self, index: usize);
    fn set_overlay_visible(&mut self, visible: bool);
    fn secondary(&mut self, display: Secondary) -> &mut dyn SecondaryDisplay;
}

/// Last known window state of one surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceState {
    pub visible: bool,
    pub opacity: f64,
    pub topmost: bool,
}

impl SurfaceState {
    fn shown() -> Self {
        Self { visible: true, opacity: 1.0, topmost: true }
    }

    fn hidden() -> Self {
        Self { visible: false, opacity: 0.0, topmost: false }
    }
}

/// Secondary display that records the last image it was asked to show.
#[derive(Debug, Default)]
pub struct TrackedDisplay {
    name: &'static str,
    image: Option<PathBuf>,
}

impl TrackedDisplay {
    pub fn new(name: &'static str) -> Self {
        Self { name, image: None }
    }

    pub fn image(&self) -> Option<&Path> {
        self.image.as_deref()
    }
}

impl SecondaryDisplay for TrackedDisplay {
    fn fade_to_image(&mut self, image: &Path) {
        debug!("{} -> {}", self.name, image.display());
        self.image = Some(image.to_path_buf());
    }
}

/// Surface host that keeps window state in memory.
#[derive(Debug)]
pub struct TrackedSurfaces {
    selection: SurfaceState,
    splash: Option<SurfaceState>,
    splash_title: Option<String>,
    splash_image: Option<PathBuf>,
    focused: Option<SurfaceId>,
    progress: f64,
    overlay_visible: bool,
    scrolled_to: Option<usize>,
    invalidated: Vec<usize>,
    marquee: TrackedDisplay,
    controller_layout: TrackedDisplay,
}

impl Default for TrackedSurfaces {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackedSurfaces {
    /// Starts with the selection surface shown and focused.
    pub fn new() -> Self {
        Self {
            selection: SurfaceState::shown(),
            splash: None,
            splash_title: None,
            splash_image: None,
            focused: Some(SurfaceId::Selection),
            progress: 0.0,
            overlay_visible: false,
            scrolled_to: None,
            invalidated: Vec::new(),
            marquee: TrackedDisplay::new("marquee"),
            controller_layout: TrackedDisplay::new("controller layout"),
        }
    }

    pub fn state(&self, id: SurfaceId) -> Option<SurfaceState> {
        match id {
            SurfaceId::Selection => Some(self.selection),
            SurfaceId::Splash => self.splash,
        }
    }

    pub fn is_splash_open(&self) -> bool {
        self.splash.is_some()
    }

    pub fn splash_title(&self) -> Option<&str> {
        self.splash_title.as_deref()
    }

    pub fn splash_image(&self) -> Option<&Path> {
        self.splash_image.as_deref()
    }

    pub fn focused(&self) -> Option<SurfaceId> {
        self.focused
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn scrolled_to(&self) -> Option<usize> {
        self.scrolled_to
    }

    /// Drains the list of cells invalidated since the last call.
    pub fn take_invalidated(&mut self) -> Vec<usize> {
        std::mem::take(&mut self.invalidated)
    }

    pub fn display(&self, display: Secondary) -> &TrackedDisplay {
        match display {
            Secondary::Marquee => &self.marquee,
            Secondary::ControllerLayout => &self.controller_layout,
        }
    }

    fn slot(&mut self, id: SurfaceId) -> Result<&mut SurfaceState, SurfaceError> {
        match id {
            SurfaceId::Selection => Ok(&mut self.selection),
            SurfaceId::Splash => self
                .splash
                .as_mut()
                .ok_or_else(|| SurfaceError("splash surface is not open".into())),
        }
    }
}

impl Surfaces for TrackedSurfaces {
    fn open_splash(&mut self, title: &str, image: Option<&Path>) -> Result<(), SurfaceError> {
        debug!("Splash opened for '{title}'");
        self.splash = Some(SurfaceState::hidden());
        self.splash_title = Some(title.to_string());
        self.splash_image = image.map(Path::to_path_buf);
        self.progress = 0.0;
        Ok(())
    }

    fn close_splash(&mut self) {
        if self.splash.take().is_some() {
            debug!("Splash closed");
        }
        if self.focused == Some(SurfaceId::Splash) {
            self.focused = None;
        }
    }

    fn set_visible(&mut self, id: SurfaceId, visible: bool) -> Result<(), SurfaceError> {
        let slot = self.slot(id)?;
        if slot.visible != visible {
            debug!("{id:?} visible = {visible}");
        }
        slot.visible = visible;
        Ok(())
    }

    fn set_opacity(&mut self, id: SurfaceId, opacity: f64) -> Result<(), SurfaceError> {
        self.slot(id)?.opacity = opacity.clamp(0.0, 1.0);
        Ok(())
    }

    fn set_topmost(&mut self, id: SurfaceId, topmost: bool) -> Result<(), SurfaceError> {
        self.slot(id)?.topmost = topmost;
        Ok(())
    }

    fn focus(&mut self, id: SurfaceId) -> Result<(), SurfaceError> {
        self.slot(id)?;
        if self.focused != Some(id) {
            debug!("Focus -> {id:?}");
        }
        self.focused = Some(id);
        Ok(())
    }

    fn render_progress(&mut self, percentage: f64, _sweep_degrees: f64) -> Result<(), SurfaceError> {
        self.slot(SurfaceId::Splash)?;
        self.progress = percentage;
        Ok(())
    }

    fn invalidate_cell(&mut self, index: usize) {
        self.invalidated.push(index);
    }

    fn scroll_into_view(&mut self, index: usize) {
        self.scrolled_to = Some(index);
    }

    fn set_overlay_visible(&mut self, visible: bool) {
        debug!("Debug overlay visible = {visible}");
        self.overlay_visible = visible;
    }

    fn secondary(&mut self, display: Secondary) -> &mut dyn SecondaryDisplay {
        match display {
            Secondary::Marquee => &mut self.marquee,
            Secondary::ControllerLayout => &mut self.controller_layout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_selection_shown_and_focused() {
        let s = TrackedSurfaces::new();
        assert_eq!(s.state(SurfaceId::Selection), Some(SurfaceState::shown()));
        assert_eq!(s.focused(), Some(SurfaceId::Selection));
        assert!(!s.is_splash_open());
    }

    #[test]
    fn splash_operations_fail_until_opened() {
        let mut s = TrackedSurfaces::new();
        assert!(s.set_opacity(SurfaceId::Splash, 0.5).is_err());
        assert!(s.focus(SurfaceId::Splash).is_err());

        s.open_splash("Galaga", Some(Path::new("galaga.png"))).unwrap();
        s.set_opacity(SurfaceId::Splash, 0.5).unwrap();
        s.focus(SurfaceId::Splash).unwrap();
        assert_eq!(s.state(SurfaceId::Splash).unwrap().opacity, 0.5);
        assert_eq!(s.splash_image(), Some(Path::new("galaga.png")));
        assert_eq!(s.focused(), Some(SurfaceId::Splash));
    }

    #[test]
    fn closing_focused_splash_clears_focus() {
        let mut s = TrackedSurfaces::new();
        s.open_splash("Galaga", None).unwrap();
        s.focus(SurfaceId::Splash).unwrap();
        s.close_splash();
        assert!(!s.is_splash_open());
        assert_eq!(s.focused(), None);
    }

    #[test]
    fn secondary_display_records_image() {
        let mut s = TrackedSurfaces::new();
        s.secondary(Secondary::Marquee).fade_to_image(Path::new("marquee.png"));
        assert_eq!(s.display(Secondary::Marquee).image(), Some(Path::new("marquee.png")));
        assert_eq!(s.display(Secondary::ControllerLayout).image(), None);
    }
}
