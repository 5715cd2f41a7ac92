//! Analysis product writer
//!
//! Serializes the full result set of a run, together with the configuration
//! that produced it and a generation timestamp, as a pretty-printed JSON
//! document. This is the only persisted product of the analyzer.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analyzer::AnalysisOutput;
use crate::common::AnalysisResult;
use crate::config::Config;

/// One run's persisted product
#[derive(Debug, Serialize)]
pub struct AnalysisSummary<'a> {
    /// Generation time (UTC)
    pub generated_at: DateTime<Utc>,
    /// Acquisition file the results were derived from
    pub input_file: String,
    /// Shot number when the input was shot-resolved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shot: Option<u32>,
    /// Configuration echo
    pub config: &'a Config,
    /// Full result set
    pub output: &'a AnalysisOutput,
}

impl<'a> AnalysisSummary<'a> {
    pub fn new(
        input_file: impl Into<String>,
        shot: Option<u32>,
        config: &'a Config,
        output: &'a AnalysisOutput,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            input_file: input_file.into(),
            shot,
            config,
            output,
        }
    }
}

/// Write the summary document to a file
pub fn write_summary(path: &Path, summary: &AnalysisSummary) -> AnalysisResult<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes() {
        let config = Config::default();
        let output = AnalysisOutput::default();
        let summary = AnalysisSummary::new("HA_101.dat", Some(101), &config, &output);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["input_file"], "HA_101.dat");
        assert_eq!(json["shot"], 101);
        assert!(json["config"]["setup"]["time_bin"].is_number());
        assert!(json["output"]["cnt"]["neut1"].is_array());
        assert!(json["output"]["diagnostics"]["n_headers"].is_number());
    }

    #[test]
    fn test_shot_omitted_when_absent() {
        let config = Config::default();
        let output = AnalysisOutput::default();
        let summary = AnalysisSummary::new("HA_x.dat", None, &config, &output);
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("shot").is_none());
    }

    #[test]
    fn test_write_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");

        let config = Config::default();
        let output = AnalysisOutput::default();
        let summary = AnalysisSummary::new("HA_x.dat", None, &config, &output);
        write_summary(&path, &summary).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("generated_at"));
        assert!(text.contains("pmgain"));
    }
}
