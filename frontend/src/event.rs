use crate::config::Config;

/// Events posted onto the coordinator's queue by background producers.
///
/// Nothing outside the coordinator task mutates front-end state; producers on
/// other threads (keyboard hook, config watcher, child-exit watchers) only send
/// one of these.
#[derive(Debug)]
pub enum FrontendEvent {
    /// A key went down anywhere on the system. Carries the translated key name.
    KeyDown(String),
    /// A launched child process exited, naturally or after a kill.
    ProcessExited { pid: u32, code: Option<i32> },
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; the front-end should clean up and exit.
    Shutdown,
}
