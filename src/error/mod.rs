use thiserror::Error;

use crate::fitting::FitError;
use crate::model::ModelError;
use crate::pk::PkError;
use crate::simulator::SimulationError;
use crate::units::UnitError;

#[derive(Error, Debug)]
pub enum PbpkError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Pk(#[from] PkError),

    #[error(transparent)]
    Fit(#[from] FitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
