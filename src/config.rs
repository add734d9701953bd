use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

const APP_NAME: &str = "protobuf-language-server";

/// Keys the client may nest the settings object under.
const SETTINGS_SECTIONS: [&str; 2] = ["protobuf", APP_NAME];

/// Returns the path to the data directory for protobuf-language-server.
/// Uses $XDG_DATA_HOME/protobuf-language-server if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/protobuf-language-server,
/// or ./protobuf-language-server if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join(format!("{APP_NAME}.log"))
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join(APP_NAME)
}

/// Server settings sent by the client in `initializationOptions` or
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Extra directories searched for imports after the importing file's ancestors.
    #[serde(rename = "additional-proto-dirs")]
    pub additional_proto_dirs: Vec<PathBuf>,
    /// Formatter binary; `clang-format` from `PATH` when unset.
    #[serde(rename = "clang-format-path")]
    pub clang_format_path: Option<PathBuf>,
}

impl Settings {
    /// Reads settings from a client payload. The object may be flat or nested under a
    /// `protobuf` / `protobuf-language-server` key. Relative directories are taken
    /// relative to `root`.
    pub fn from_value(value: &Value, root: Option<&Path>) -> Result<Self, serde_json::Error> {
        let section = SETTINGS_SECTIONS
            .iter()
            .find_map(|key| value.get(key))
            .unwrap_or(value);
        if section.is_null() {
            return Ok(Self::default());
        }

        let mut settings = Settings::deserialize(section)?;
        if let Some(root) = root {
            for dir in &mut settings.additional_proto_dirs {
                if dir.is_relative() {
                    *dir = root.join(&*dir);
                }
            }
        }
        Ok(settings)
    }
}
