//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG paths →
//! system path → built-in defaults.

use std::path::{Path, PathBuf};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to the engine config (None when using built-in defaults).
    pub engine: Option<PathBuf>,

    /// Where the engine config was found (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/geohis/.
    SystemConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "GEOHIS_CONFIG";
pub const ENV_CONFIG_DIR: &str = "GEOHIS_CONFIG_DIR";

/// Config file names tried inside a directory, in order.
const ENGINE_FILENAMES: [&str; 2] = ["engine.json", "engine.toml"];

/// Application name for XDG directories.
const APP_NAME: &str = "geohis";

/// Resolve the engine configuration path.
///
/// 1. Explicit CLI path (returned even if missing, so the loader can report it)
/// 2. `GEOHIS_CONFIG` (direct path)
/// 3. `GEOHIS_CONFIG_DIR` + `engine.json` / `engine.toml`
/// 4. XDG config directory (`~/.config/geohis/`)
/// 5. System config (`/etc/geohis/`)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPaths {
    if let Some(path) = cli_path {
        return ConfigPaths {
            engine: Some(path.to_path_buf()),
            source: ConfigSource::CliArgument,
        };
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return ConfigPaths {
                engine: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        if let Some(path) = find_in_dir(Path::new(&config_dir)) {
            return ConfigPaths {
                engine: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    if let Some(dir) = xdg_config_dir() {
        if let Some(path) = find_in_dir(&dir) {
            return ConfigPaths {
                engine: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    if let Some(path) = find_in_dir(&system_config_dir()) {
        return ConfigPaths {
            engine: Some(path),
            source: ConfigSource::SystemConfig,
        };
    }

    ConfigPaths::default()
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    ENGINE_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Get the XDG config directory for geohis.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_cli_path_wins() {
        let paths = resolve_config(Some(Path::new("/nonexistent/engine.toml")));
        assert_eq!(paths.source, ConfigSource::CliArgument);
        assert_eq!(
            paths.engine.as_deref(),
            Some(Path::new("/nonexistent/engine.toml"))
        );
    }

    #[test]
    fn test_find_in_dir_prefers_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("engine.toml"), "").unwrap();
        assert_eq!(
            find_in_dir(dir.path()),
            Some(dir.path().join("engine.toml"))
        );
        std::fs::write(dir.path().join("engine.json"), "{}").unwrap();
        assert_eq!(
            find_in_dir(dir.path()),
            Some(dir.path().join("engine.json"))
        );
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/geohis"));
    }
}
