/// Global keyboard input using a low-level Windows keyboard hook (`WH_KEYBOARD_LL`).
///
/// The hook runs on a dedicated OS thread with its own Windows message pump, so it
/// sees keys even while a full-screen game owns focus.  Every keydown is translated
/// to a key name and forwarded to the coordinator; mapping names to actions happens
/// there, against the live bindings.  The hook thread exits cleanly when
/// [`HotkeyHandle::stop`] is called.
///
/// On non-Windows platforms the public API compiles but is a no-op at runtime.
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;

use crate::event::FrontendEvent;

/// Two presses closer than this count as a double press.
pub const DOUBLE_PRESS_THRESHOLD: Duration = Duration::from_millis(500);

/// Tokio channel used to forward [`FrontendEvent::KeyDown`] from the hook
/// callback to the main event loop.  Set once by [`start`].
static HOOK_TX: OnceLock<mpsc::Sender<FrontendEvent>> = OnceLock::new();

/// Translates a Windows virtual-key code to the name used in `[bindings]`.
///
/// Arrow keys are `LeftArrow`, `RightArrow`, `UpArrow` and `DownArrow`; other
/// keys use their usual names (`Enter`, `Escape`, `F1`, `A`, `D1`, `NumPad4`).
/// Codes without a name come back as `VK_0x..`.
pub fn key_name(vk: u32) -> String {
    let fixed = match vk {
        0x08 => "Back",
        0x09 => "Tab",
        0x0D => "Enter",
        0x10 => "ShiftKey",
        0x11 => "ControlKey",
        0x12 => "Menu",
        0x13 => "Pause",
        0x14 => "CapsLock",
        0x1B => "Escape",
        0x20 => "Space",
        0x21 => "PageUp",
        0x22 => "PageDown",
        0x23 => "End",
        0x24 => "Home",
        0x25 => "LeftArrow",
        0x26 => "UpArrow",
        0x27 => "RightArrow",
        0x28 => "DownArrow",
        0x2C => "PrintScreen",
        0x2D => "Insert",
        0x2E => "Delete",
        0x5B => "LWin",
        0x5C => "RWin",
        0x6A => "Multiply",
        0x6B => "Add",
        0x6D => "Subtract",
        0x6E => "Decimal",
        0x6F => "Divide",
        0x90 => "NumLock",
        0x91 => "Scroll",
        0xA0 => "LShiftKey",
        0xA1 => "RShiftKey",
        0xA2 => "LControlKey",
        0xA3 => "RControlKey",
        0xA4 => "LMenu",
        0xA5 => "RMenu",
        _ => "",
    };
    if !fixed.is_empty() {
        return fixed.to_string();
    }
    match vk {
        // '0'=0x30…'9'=0x39, 'A'=0x41…'Z'=0x5A.
        0x30..=0x39 => format!("D{}", vk - 0x30),
        0x41..=0x5A => char::from(vk as u8).to_string(),
        0x60..=0x69 => format!("NumPad{}", vk - 0x60),
        0x70..=0x87 => format!("F{}", vk - 0x6F),
        _ => format!("VK_0x{vk:02X}"),
    }
}

/// Reverse of [`key_name`], case-insensitive.  Used to flag bindings that name
/// a key the hook can never report.
pub fn vk_code(name: &str) -> Option<u32> {
    (0u32..=0xFF).find(|&vk| key_name(vk).eq_ignore_ascii_case(name))
}

/// Double-press detector for one action.
///
/// The first press arms a timestamp.  A second press within the threshold
/// confirms and disarms; a press after a longer gap re-arms instead.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DoublePress {
    armed_at: Option<Instant>,
}

impl DoublePress {
    /// Records a press at `now`.  Returns `true` when it completes a double press.
    pub fn press(&mut self, now: Instant, threshold: Duration) -> bool {
        match self.armed_at {
            Some(first) if now.saturating_duration_since(first) < threshold => {
                self.armed_at = None;
                true
            }
            _ => {
                self.armed_at = Some(now);
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn reset(&mut self) {
        self.armed_at = None;
    }
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// A handle to the running keyboard hook.  Stops the hook thread when the
/// front-end exits.
pub struct HotkeyHandle {
    #[cfg(windows)]
    _thread: std::thread::JoinHandle<()>,
    /// Thread ID of the message-pump thread, used to post `WM_QUIT`.
    #[cfg(windows)]
    thread_id: u32,
}

impl HotkeyHandle {
    /// Signals the hook thread to stop and blocks until it exits.
    pub fn stop(self) {
        #[cfg(windows)]
        {
            imp::post_quit(self.thread_id);
            let _ = self._thread.join();
        }
    }
}

// ── Startup ───────────────────────────────────────────────────────────────────

/// Installs a `WH_KEYBOARD_LL` keyboard hook on a dedicated OS thread.
///
/// Every keydown is sent to `tx` as [`FrontendEvent::KeyDown`] via a
/// non-blocking [`try_send`](mpsc::Sender::try_send).  If the channel is full
/// the key is dropped.
///
/// # Non-Windows
/// Returns a stub handle; all methods compile and run but do nothing.
pub fn start(tx: mpsc::Sender<FrontendEvent>) -> Result<HotkeyHandle> {
    // Ignore repeat calls (e.g. in test binaries).
    let _ = HOOK_TX.set(tx);

    #[cfg(windows)]
    {
        use anyhow::{anyhow, Context};

        let (ready_tx, ready_rx) = std::sync::mpsc::sync_channel::<Result<u32, String>>(1);
        let thread = std::thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || imp::run_message_pump(ready_tx))
            .context("Failed to spawn keyboard hook thread")?;
        let thread_id = ready_rx
            .recv()
            .context("Keyboard hook thread exited before reporting")?
            .map_err(|e| anyhow!("Failed to install keyboard hook: {e}"))?;
        Ok(HotkeyHandle { _thread: thread, thread_id })
    }

    #[cfg(not(windows))]
    {
        log::info!("Global keyboard hook unavailable on this platform");
        Ok(HotkeyHandle {})
    }
}

// ── Windows implementation ────────────────────────────────────────────────────

#[cfg(windows)]
mod imp {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::mpsc as std_mpsc;

    use log::{debug, error};
    use windows::Win32::Foundation::{HINSTANCE, LPARAM, LRESULT, WPARAM};
    use windows::Win32::System::Threading::GetCurrentThreadId;
    use windows::Win32::UI::WindowsAndMessaging::{
        CallNextHookEx, DispatchMessageW, GetMessageW, PostThreadMessageW,
        SetWindowsHookExW, UnhookWindowsHookEx,
        KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_QUIT, WM_SYSKEYDOWN,
    };

    use super::{key_name, HOOK_TX};
    use crate::event::FrontendEvent;

    /// Low-level keyboard hook procedure.
    ///
    /// Called by Windows on every keyboard event system-wide.  A panic in the
    /// body must not unwind into Windows; the next hook is always called.
    unsafe extern "system" fn keyboard_proc(
        n_code: i32,
        w_param: WPARAM,
        l_param: LPARAM,
    ) -> LRESULT {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let msg = w_param.0 as u32;
            if n_code >= 0 && (msg == WM_KEYDOWN || msg == WM_SYSKEYDOWN) {
                let kb = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
                if let Some(tx) = HOOK_TX.get() {
                    // try_send is non-blocking; a full channel drops this key.
                    let _ = tx.try_send(FrontendEvent::KeyDown(key_name(kb.vkCode)));
                }
            }
        }));
        if result.is_err() {
            error!("Keyboard hook callback panicked; continuing");
        }
        CallNextHookEx(None, n_code, w_param, l_param)
    }

    /// Installs `WH_KEYBOARD_LL`, runs a Windows message pump until `WM_QUIT`,
    /// then uninstalls the hook.
    ///
    /// Reports the current thread ID (or the install error) to `ready_tx` before
    /// entering the pump so that [`super::start`] can later post `WM_QUIT`.
    pub fn run_message_pump(ready_tx: std_mpsc::SyncSender<Result<u32, String>>) {
        unsafe {
            let hook = match SetWindowsHookExW(
                WH_KEYBOARD_LL,
                Some(keyboard_proc),
                HINSTANCE::default(),
                0,
            ) {
                Ok(hook) => hook,
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(GetCurrentThreadId()));
            drop(ready_tx);

            let mut msg = MSG::default();
            // GetMessageW: >0 = message, 0 = WM_QUIT, <0 = error.
            while GetMessageW(&mut msg, None, 0, 0).0 > 0 {
                DispatchMessageW(&msg);
            }

            let _ = UnhookWindowsHookEx(hook);
            debug!("Keyboard hook thread exited");
        }
    }

    /// Posts `WM_QUIT` to `thread_id`, causing its `GetMessageW` loop to exit.
    pub fn post_quit(thread_id: u32) {
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── key_name ──────────────────────────────────────────────────────────────

    #[test]
    fn arrows_use_arrow_suffix() {
        assert_eq!(key_name(0x25), "LeftArrow");
        assert_eq!(key_name(0x26), "UpArrow");
        assert_eq!(key_name(0x27), "RightArrow");
        assert_eq!(key_name(0x28), "DownArrow");
    }

    #[test]
    fn named_keys() {
        assert_eq!(key_name(0x0D), "Enter");
        assert_eq!(key_name(0x1B), "Escape");
        assert_eq!(key_name(0x20), "Space");
        assert_eq!(key_name(0x23), "End");
    }

    #[test]
    fn function_keys_f1_through_f24() {
        for n in 1u32..=24 {
            assert_eq!(key_name(0x6F + n), format!("F{n}"));
        }
    }

    #[test]
    fn letters_digits_and_numpad() {
        for c in b'A'..=b'Z' {
            assert_eq!(key_name(c as u32), (c as char).to_string());
        }
        assert_eq!(key_name(0x30), "D0");
        assert_eq!(key_name(0x31), "D1");
        assert_eq!(key_name(0x64), "NumPad4");
    }

    #[test]
    fn unknown_codes_are_hex() {
        assert_eq!(key_name(0x07), "VK_0x07");
        assert_eq!(key_name(0xFF), "VK_0xFF");
    }

    #[test]
    fn vk_code_inverts_key_name() {
        assert_eq!(vk_code("Enter"), Some(0x0D));
        assert_eq!(vk_code("leftarrow"), Some(0x25));
        assert_eq!(vk_code("f9"), Some(0x78));
        assert_eq!(vk_code("NotAKey"), None);
    }

    // ── DoublePress ───────────────────────────────────────────────────────────

    #[test]
    fn lone_press_only_arms() {
        let mut dp = DoublePress::default();
        assert!(!dp.press(Instant::now(), DOUBLE_PRESS_THRESHOLD));
        assert!(dp.is_armed());
    }

    #[test]
    fn second_press_within_threshold_confirms() {
        let t0 = Instant::now();
        let mut dp = DoublePress::default();
        dp.press(t0, DOUBLE_PRESS_THRESHOLD);
        assert!(dp.press(t0 + Duration::from_millis(300), DOUBLE_PRESS_THRESHOLD));
        assert!(!dp.is_armed());
    }

    #[test]
    fn press_after_long_gap_rearms() {
        let t0 = Instant::now();
        let mut dp = DoublePress::default();
        dp.press(t0, DOUBLE_PRESS_THRESHOLD);
        let t1 = t0 + Duration::from_millis(700);
        assert!(!dp.press(t1, DOUBLE_PRESS_THRESHOLD));
        assert!(dp.is_armed());
        // The re-armed press is the new reference point.
        assert!(dp.press(t1 + Duration::from_millis(200), DOUBLE_PRESS_THRESHOLD));
    }

    #[test]
    fn third_press_starts_a_new_pair() {
        let t0 = Instant::now();
        let mut dp = DoublePress::default();
        dp.press(t0, DOUBLE_PRESS_THRESHOLD);
        assert!(dp.press(t0 + Duration::from_millis(100), DOUBLE_PRESS_THRESHOLD));
        assert!(!dp.press(t0 + Duration::from_millis(200), DOUBLE_PRESS_THRESHOLD));
    }

    #[test]
    fn reset_disarms() {
        let mut dp = DoublePress::default();
        dp.press(Instant::now(), DOUBLE_PRESS_THRESHOLD);
        dp.reset();
        assert!(!dp.is_armed());
    }

    // ── Windows: HotkeyHandle lifecycle ───────────────────────────────────────

    /// Only one test calls `start()` to avoid installing multiple
    /// `WH_KEYBOARD_LL` hooks in the same test binary.
    #[cfg(windows)]
    #[test]
    fn lifecycle_start_stop_does_not_panic() {
        let (tx, _rx) = tokio::sync::mpsc::channel::<FrontendEvent>(8);
        let handle = start(tx).unwrap();
        handle.stop();
    }
}
