/// Canonical file paths for cabinet data files.
///
/// Both files live under the per-user application data directory
/// (`%APPDATA%\Cabinet\` on Windows, `$XDG_CONFIG_HOME/cabinet/` elsewhere):
///   - config.toml  Settings, bindings, game catalog and plugins.
///   - status.toml  Written by the front-end for kiosk monitoring.
use std::path::PathBuf;

#[cfg(windows)]
const APP_DIR_NAME: &str = "Cabinet";
#[cfg(not(windows))]
const APP_DIR_NAME: &str = "cabinet";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

/// Returns the cabinet application data directory.
///
/// Falls back to the current directory when no suitable environment variable
/// is set, so a bare kiosk account still starts.
pub fn app_data_dir() -> PathBuf {
    base_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_DIR_NAME)
}

#[cfg(windows)]
fn base_dir() -> Option<PathBuf> {
    std::env::var_os("APPDATA").map(PathBuf::from)
}

#[cfg(not(windows))]
fn base_dir() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Returns the full path to the config file.
pub fn config_file_path() -> PathBuf {
    app_data_dir().join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file.
pub fn status_file_path() -> PathBuf {
    app_data_dir().join(STATUS_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_ends_with_app_name() {
        let dir = app_data_dir();
        assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
    }

    #[test]
    fn config_file_path_has_correct_name() {
        let path = config_file_path();
        assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
    }

    #[test]
    fn status_file_path_has_correct_name() {
        let path = status_file_path();
        assert_eq!(path.file_name().unwrap(), STATUS_FILE_NAME);
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        let config = config_file_path();
        let status = status_file_path();
        assert_eq!(config.parent(), status.parent());
    }
}
