//! Report generation port trait.

use std::path::Path;

use crate::domain::error::FxError;
use crate::domain::metrics::Metrics;
use crate::domain::run_result::RunResults;

/// Port for writing run reports.
pub trait ReportPort {
    /// `metrics` lines up with `results`, one entry per strategy.
    fn write(
        &self,
        results: &RunResults,
        metrics: &[Metrics],
        output_path: &Path,
    ) -> Result<(), FxError>;
}
