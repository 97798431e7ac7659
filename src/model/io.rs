//! Persisted model artifact
//!
//! A flattened model is written as one pretty-printed JSON document. Rate
//! laws and rules are stored as infix text and parsed again on load, and a
//! loaded model is validated before it is handed back.

use std::fs;
use std::path::Path;

use tracing::debug;

use super::ModelDefinition;
use crate::error::PbpkError;
use crate::units::UnitCatalogue;

impl ModelDefinition {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Write the model to `path`, creating parent directories as needed
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), PbpkError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_json()?)?;
        debug!(model = %self.id, path = %path.display(), "wrote model artifact");
        Ok(())
    }

    /// Read and validate a model written by [`ModelDefinition::write_json`]
    pub fn read_json(path: impl AsRef<Path>, units: &UnitCatalogue) -> Result<Self, PbpkError> {
        let text = fs::read_to_string(path)?;
        let model = Self::from_json(&text)?;
        model.validate(units)?;
        Ok(model)
    }
}
