use std::path::Path;

use config::Config as eConfig;
use serde::{Deserialize, Serialize};

use crate::error::PbpkError;
use crate::simulator::SolverOptions;

/// Run configuration, threaded explicitly through the experiment runner
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub solver: SolverOptions,
    /// Run independent simulations on the rayon thread pool
    #[serde(default = "default_true")]
    pub parallel: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct Output {
    /// Directory receiving trajectories, PK tables and the model artifact
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub write: bool,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct Log {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file name inside the output directory
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            output: Output::default(),
            log: Log::default(),
            solver: SolverOptions::default(),
            parallel: true,
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Output {
            path: default_output_path(),
            write: true,
        }
    }
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

impl Settings {
    /// Read settings from a TOML file, overridable through `SORAFENIB__<SECTION>__<KEY>`
    pub fn from_file(path: &str) -> Result<Settings, config::ConfigError> {
        let parsed = eConfig::builder()
            .add_source(config::File::with_name(path).format(config::FileFormat::Toml))
            .add_source(config::Environment::with_prefix("SORAFENIB").separator("__"))
            .build()?;
        parsed.try_deserialize()
    }

    /// Write the effective settings as `settings.json` into `dir`
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<(), PbpkError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let serialized = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.as_ref().join("settings.json"), serialized)?;
        Ok(())
    }
}

// *********************************
// Default values for deserializing
// *********************************
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> Option<String> {
    Some("run.log".to_string())
}

fn default_output_path() -> String {
    "outputs".to_string()
}
