//! Config files for the two binaries.
//!
//! Both files are JSON. Every field has a default, so `{}` is a valid file;
//! the process settings sit at the top level next to `log_level` (and
//! `game` for workers).

use std::fs;
use std::path::{Path, PathBuf};

use roomrelay_games::GameKind;
use roomrelay_hub::HubConfig;
use roomrelay_worker::WorkerConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads and parses one config file.
///
/// # Errors
/// [`ConfigError::Read`] if the file cannot be read,
/// [`ConfigError::Parse`] if it is not valid for `T`.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// [`load`] when a path was given, defaults otherwise.
pub fn load_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T, ConfigError> {
    match path {
        Some(path) => load(path),
        None => Ok(T::default()),
    }
}

fn default_log_level() -> String {
    "info".into()
}

/// Pretty JSON of the settings in effect, for `config show`.
pub fn show<T: Serialize>(config: &T) -> String {
    serde_json::to_string_pretty(config).unwrap_or_else(|e| format!("cannot render config: {e}"))
}

/// Contents of a `relay-worker` config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFile {
    #[serde(flatten)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub game: GameKind,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for WorkerFile {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            game: GameKind::default(),
            log_level: default_log_level(),
        }
    }
}

/// Contents of a `relay-hub` config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFile {
    #[serde(flatten)]
    pub hub: HubConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HubFile {
    fn default() -> Self {
        Self {
            hub: HubConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("roomrelay-{}-{name}", std::process::id()));
        fs::write(&path, contents).unwrap();
        path
    }

    // =====================================================================
    // Loading
    // =====================================================================

    #[test]
    fn test_load_worker_file() {
        let path = write_temp(
            "worker.json",
            r#"{"worker_id": 4, "max_rooms": 3, "game": "bounce", "log_level": "debug"}"#,
        );
        let file: WorkerFile = load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(file.worker.worker_id, 4);
        assert_eq!(file.worker.max_rooms, 3);
        assert_eq!(file.worker.room_capacity, 4);
        assert_eq!(file.game, GameKind::Bounce);
        assert_eq!(file.log_level, "debug");
    }

    #[test]
    fn test_load_hub_file() {
        let path = write_temp(
            "hub.json",
            r#"{"lobby_tick_ms": 20, "workers": [{"id": 1, "name": "Warsaw", "address": "127.0.0.1:10001"}]}"#,
        );
        let file: HubFile = load(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(file.hub.lobby_tick_ms, 20);
        assert_eq!(file.hub.workers.len(), 1);
        assert_eq!(file.log_level, "info");
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let err = load::<HubFile>(Path::new("/nonexistent/roomrelay.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("/nonexistent/roomrelay.json"));
    }

    #[test]
    fn test_bad_json_is_a_parse_error() {
        let path = write_temp("broken.json", r#"{"max_rooms": "many"}"#);
        let err = load::<WorkerFile>(&path).unwrap_err();
        fs::remove_file(&path).ok();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_show_reloads_as_the_same_file() {
        let mut file = WorkerFile::default();
        file.game = GameKind::Bounce;
        file.worker.max_rooms = 6;
        let text = show(&file);
        assert!(text.contains("\"game\": \"bounce\""), "{text}");

        let path = write_temp("shown.json", &text);
        let reloaded: WorkerFile = load(&path).unwrap();
        fs::remove_file(&path).ok();
        assert_eq!(reloaded, file);
    }

    #[test]
    fn test_no_path_uses_defaults() {
        let file: WorkerFile = load_or_default(None).unwrap();
        assert_eq!(file, WorkerFile::default());
        assert_eq!(file.game, GameKind::Snake);
    }
}
