//! User preferences persisted as a small JSON document.

use crate::classifier::DEFAULT_SENSITIVE_PATTERNS;
use crate::error::{KitError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Directory name under the platform config dir.
pub const APP_DIR: &str = "CmdKit";
/// Settings file name.
pub const SETTINGS_FILE: &str = "settings.json";
/// Entries file name inside the data directory.
pub const DATA_FILE: &str = "commands.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Dark,
    Light,
    Blossom,
}

/// Application settings. Only the storage directory and the sensitivity
/// patterns are consumed by the core; the rest belongs to the presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    /// Storage directory override; blank means the default directory
    #[serde(alias = "DataPath")]
    pub data_path: String,
    #[serde(alias = "Theme")]
    pub theme: Theme,
    #[serde(alias = "AutoCloseAfterCopy")]
    pub auto_close_after_copy: bool,
    /// Case-insensitive regular expressions
    #[serde(alias = "SensitivePatterns")]
    pub sensitive_patterns: Vec<String>,
    #[serde(alias = "UiFontSize")]
    pub ui_font_size: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            data_path: String::new(),
            theme: Theme::Dark,
            auto_close_after_copy: true,
            sensitive_patterns: DEFAULT_SENSITIVE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            ui_font_size: 10.0,
        }
    }
}

impl AppSettings {
    /// Default application directory, `<config dir>/CmdKit`.
    pub fn default_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Default settings file location.
    pub fn default_path() -> PathBuf {
        Self::default_dir().join(SETTINGS_FILE)
    }

    /// Load settings, falling back to defaults when missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Self::default();
        }
        match fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_str(&json).map_err(|e| e.to_string()))
        {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), "ignoring unreadable settings: {e}");
                Self::default()
            }
        }
    }

    /// Save settings as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| KitError::WriteFile {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|source| KitError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory holding the entries file.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_path.trim().is_empty() {
            Self::default_dir()
        } else {
            PathBuf::from(self.data_path.trim())
        }
    }

    /// Full path of the entries file.
    pub fn data_file(&self) -> PathBuf {
        self.data_dir().join(DATA_FILE)
    }
}
