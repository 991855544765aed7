// TMarks platform paths
// Config: settings.json; Data: tmarks.db.
//
// Linux:   $XDG_CONFIG_HOME/tmarks, $XDG_DATA_HOME/tmarks (XDG defaults otherwise)
// macOS:   ~/Library/Application Support/TMarks for both
// Windows: %APPDATA%/TMarks for both

use std::env;
use std::path::PathBuf;

/// Overrides the data directory (database location).
pub const DATA_DIR_ENV: &str = "TMARKS_DATA_DIR";

#[cfg(not(target_os = "windows"))]
fn home_dir() -> PathBuf {
    PathBuf::from(env::var("HOME").unwrap_or_else(|_| String::from("/tmp")))
}

#[cfg(target_os = "windows")]
fn app_data_dir() -> PathBuf {
    let appdata =
        env::var("APPDATA").unwrap_or_else(|_| String::from("C:\\Users\\Default\\AppData\\Roaming"));
    PathBuf::from(appdata).join("TMarks")
}

/// Returns the platform-specific configuration directory for TMarks.
pub fn get_config_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        app_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        home_dir()
            .join("Library")
            .join("Application Support")
            .join("TMarks")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match env::var("XDG_CONFIG_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("tmarks"),
            _ => home_dir().join(".config").join("tmarks"),
        }
    }
}

/// Returns the platform-specific data directory for TMarks.
///
/// `TMARKS_DATA_DIR` wins when set.
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    #[cfg(target_os = "windows")]
    {
        app_data_dir()
    }
    #[cfg(target_os = "macos")]
    {
        get_config_dir()
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        match env::var("XDG_DATA_HOME") {
            Ok(xdg) if !xdg.is_empty() => PathBuf::from(xdg).join("tmarks"),
            _ => home_dir().join(".local").join("share").join("tmarks"),
        }
    }
}

/// Default location of the SQLite database.
pub fn default_database_path() -> PathBuf {
    get_data_dir().join("tmarks.db")
}
