//! JSON Output

use crate::report::AnalysisReport;

/// Generate a prettified JSON report.
///
/// Serializes the analysis report into machine-readable JSON format.
pub fn generate_json_report(report: &AnalysisReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{AnalysisReport, ReportMeta};

    #[test]
    fn test_empty_report_serializes() {
        let report = AnalysisReport {
            meta: ReportMeta::new(),
            aggregates: Vec::new(),
            warmups: Vec::new(),
            factor_effects: Vec::new(),
        };
        let json = generate_json_report(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["meta"]["schema_version"], 1);
        assert!(value["aggregates"].as_array().unwrap().is_empty());
    }
}
