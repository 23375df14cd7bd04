/// Error types for the front-end core.
///
/// Every variant here ends in the same recovery: the selection surface is made
/// visible and focused again. The types only decide what gets shown or logged
/// on the way there.
use std::io;
use std::path::PathBuf;

use crate::transition::TransitionState;

/// A game could not be started. Shown to the user as a modal error.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("executable not found: {}", .0.display())]
    ExecutableNotFound(PathBuf),

    #[error("emulator plugin '{0}' is not configured")]
    PluginNotFound(String),

    #[error("plugin '{plugin}' could not build a launch command: {reason}")]
    Plugin { plugin: String, reason: String },

    #[error("a game is already running (pid {0})")]
    SessionActive(u32),

    #[error("failed to start process: {0}")]
    Spawn(#[from] io::Error),
}

/// Raised by a surface collaborator when a window operation fails.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("surface error: {0}")]
pub struct SurfaceError(pub String);

/// A transition step could not be started or performed.
#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot start {requested} sequence while in state {current:?}")]
    Busy {
        requested: &'static str,
        current: TransitionState,
    },

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Partial failure while terminating a process tree. Logged, never retried.
#[derive(Debug, thiserror::Error)]
pub enum TerminationError {
    #[error("process {0} is not running")]
    NotFound(u32),

    #[error("process {0} refused to terminate")]
    KillFailed(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_not_found_mentions_path() {
        let e = LaunchError::ExecutableNotFound(PathBuf::from("/games/nope.exe"));
        assert_eq!(format!("{e}"), "executable not found: /games/nope.exe");
    }

    #[test]
    fn plugin_not_found_display() {
        let e = LaunchError::PluginNotFound("mame".into());
        assert_eq!(format!("{e}"), "emulator plugin 'mame' is not configured");
    }

    #[test]
    fn spawn_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let e: LaunchError = io_err.into();
        assert!(format!("{e}").contains("denied"));
    }

    #[test]
    fn busy_names_requested_sequence() {
        let e = TransitionError::Busy {
            requested: "launch",
            current: TransitionState::T3FadingInSplash,
        };
        let msg = format!("{e}");
        assert!(msg.contains("launch"));
        assert!(msg.contains("T3FadingInSplash"));
    }

    #[test]
    fn surface_error_is_transparent() {
        let e: TransitionError = SurfaceError("window gone".into()).into();
        assert_eq!(format!("{e}"), "surface error: window gone");
    }

    #[test]
    fn termination_error_display() {
        assert_eq!(format!("{}", TerminationError::NotFound(42)), "process 42 is not running");
        assert_eq!(
            format!("{}", TerminationError::KillFailed(7)),
            "process 7 refused to terminate"
        );
    }
}
