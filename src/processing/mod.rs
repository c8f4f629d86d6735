//! Solutions, CSV export and run summaries.

pub mod csv_writer;
pub mod solution;
pub mod summary;

use std::io;

use thiserror::Error;

use crate::error::ModelError;

pub use solution::{Solution, Termination};
pub use summary::SimulationSummary;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Model(#[from] ModelError),
}
