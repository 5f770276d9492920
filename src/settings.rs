use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::QueueCapacity;
use crate::error::SettingsError;
use crate::io::serial::{LineFramerConfig, SerialConfig};
use crate::pipeline::PipelineConfig;

const APP_DIR: &str = "coretemp";
const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Settings {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub framing: LineFramerConfig,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct AnalysisSettings {
    /// Lines allowed to wait for the worker; absent means unbounded
    #[serde(default)]
    pub max_pending: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_file_logging")]
    pub file_logging: bool,
    /// Where log files go; defaults to the platform data dir
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            file_logging: default_file_logging(),
            reports_dir: None,
        }
    }
}

fn default_file_logging() -> bool {
    false
}

/// `<config dir>/coretemp/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
}

/// `<local data dir>/coretemp/reports`
pub fn default_reports_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join(APP_DIR).join("reports"))
}

impl Settings {
    /// Load settings from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tlog!("[settings] {} not found, using defaults", path.display());
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(SettingsError::Read {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        Ok(toml::from_str(&contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let contents = toml::to_string_pretty(self)?;
        let write_err = |e| SettingsError::Write {
            path: path.display().to_string(),
            source: e,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, contents).map_err(write_err)
    }

    pub fn queue_capacity(&self) -> QueueCapacity {
        match self.analysis.max_pending {
            Some(n) => QueueCapacity::Bounded(n),
            None => QueueCapacity::Unbounded,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            framer: self.framing.clone(),
            queue_capacity: self.queue_capacity(),
        }
    }

    /// Resolved reports directory, if file logging is enabled
    pub fn reports_dir(&self) -> Option<PathBuf> {
        if !self.logging.file_logging {
            return None;
        }
        self.logging.reports_dir.clone().or_else(default_reports_dir)
    }
}
