/// Desktop-level side effects outside the front-end's own surfaces: the mouse
/// cursor and modal error dialogs.
use log::error;

/// Screen position in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    pub x: i32,
    pub y: i32,
}

pub trait Desktop {
    /// Remembers where the cursor is before a game takes over the screen.
    fn save_cursor(&mut self);
    /// Moves the cursor back to the saved position, if any.
    fn restore_cursor(&mut self);
    /// Shows a blocking error dialog.
    fn show_error(&mut self, title: &str, message: &str);
}

/// The real desktop.  Off Windows, errors are only logged and the cursor is
/// left alone.
#[derive(Debug, Default)]
pub struct SystemDesktop {
    saved: Option<CursorPos>,
}

impl SystemDesktop {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Desktop for SystemDesktop {
    fn save_cursor(&mut self) {
        self.saved = imp::cursor_pos();
    }

    fn restore_cursor(&mut self) {
        if let Some(pos) = self.saved.take() {
            imp::set_cursor_pos(pos);
        }
    }

    fn show_error(&mut self, title: &str, message: &str) {
        error!("{title}: {message}");
        imp::message_box(title, message);
    }
}

#[cfg(windows)]
mod imp {
    use log::warn;
    use windows::core::HSTRING;
    use windows::Win32::Foundation::POINT;
    use windows::Win32::UI::WindowsAndMessaging::{
        GetCursorPos, MessageBoxW, SetCursorPos, MB_ICONERROR, MB_OK, MB_TOPMOST,
    };

    use super::CursorPos;

    pub fn cursor_pos() -> Option<CursorPos> {
        let mut point = POINT::default();
        match unsafe { GetCursorPos(&mut point) } {
            Ok(()) => Some(CursorPos { x: point.x, y: point.y }),
            Err(e) => {
                warn!("GetCursorPos failed: {e}");
                None
            }
        }
    }

    pub fn set_cursor_pos(pos: CursorPos) {
        if let Err(e) = unsafe { SetCursorPos(pos.x, pos.y) } {
            warn!("SetCursorPos failed: {e}");
        }
    }

    pub fn message_box(title: &str, message: &str) {
        unsafe {
            MessageBoxW(
                None,
                &HSTRING::from(message),
                &HSTRING::from(title),
                MB_OK | MB_ICONERROR | MB_TOPMOST,
            );
        }
    }
}

#[cfg(not(windows))]
mod imp {
    use super::CursorPos;

    pub fn cursor_pos() -> Option<CursorPos> {
        None
    }

    pub fn set_cursor_pos(_pos: CursorPos) {}

    pub fn message_box(_title: &str, _message: &str) {}
}

/// Desktop that records calls.  Used by the headless build's tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingDesktop {
    pub cursor_saves: usize,
    pub cursor_restores: usize,
    pub errors: Vec<(String, String)>,
}

#[cfg(test)]
impl Desktop for RecordingDesktop {
    fn save_cursor(&mut self) {
        self.cursor_saves += 1;
    }

    fn restore_cursor(&mut self) {
        self.cursor_restores += 1;
    }

    fn show_error(&mut self, title: &str, message: &str) {
        self.errors.push((title.to_string(), message.to_string()));
    }
}
