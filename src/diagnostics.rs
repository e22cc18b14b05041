//! Per-run diagnostic summary.
//!
//! Row and bucket level errors never abort a run; they are counted here
//! instead, next to one report per filter stage.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Outcome of a single filter stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    /// Methodology level (1, 2 or 3) the stage belongs to.
    pub level: u8,
    pub input: usize,
    pub output: usize,
    pub dropped: usize,
    /// Rows kept but with a repaired derived field.
    pub repaired: usize,
    /// Groups the stage could not judge for lack of data.
    pub insufficient_groups: usize,
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub input_rows: usize,
    pub malformed_rows: usize,
    pub stages: Vec<StageReport>,
    pub invalid_numeric_rows: usize,
    pub insufficient_data: usize,
    pub elasticity_sign_violations: usize,
    pub quotes_with_return: usize,
    pub full_view_records: usize,
    pub reduced_view_records: usize,
}

impl RunDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a recoverable error. Fatal kinds are not counted.
    pub fn absorb(&mut self, error: &PipelineError) {
        match error {
            PipelineError::MalformedRow { .. } => self.malformed_rows += 1,
            PipelineError::InvalidNumericInput { .. } => self.invalid_numeric_rows += 1,
            PipelineError::InsufficientData { .. } => self.insufficient_data += 1,
            PipelineError::Configuration(_) | PipelineError::Loader(_) => {}
        }
    }

    pub fn record_stage(&mut self, report: StageReport) {
        self.insufficient_data += report.insufficient_groups;
        self.stages.push(report);
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Rows removed by filter stages (malformed rows excluded).
    pub fn total_filtered(&self) -> usize {
        self.stages.iter().map(|s| s.dropped).sum()
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} rows in, {} malformed, {} removed by filters",
            self.input_rows,
            self.malformed_rows,
            self.total_filtered()
        )];

        for s in &self.stages {
            lines.push(format!(
                "  L{} {:<24} in={:>8} dropped={:>7} repaired={:>7}",
                s.level, s.stage, s.input, s.dropped, s.repaired
            ));
        }

        lines.push(format!(
            "{} invalid numeric rows, {} elasticity sign warnings, {} insufficient-data skips",
            self.invalid_numeric_rows, self.elasticity_sign_violations, self.insufficient_data
        ));
        lines.push(format!(
            "{} quotes with returns -> {} full-view and {} reduced-view records",
            self.quotes_with_return, self.full_view_records, self.reduced_view_records
        ));

        lines.join("\n")
    }
}
