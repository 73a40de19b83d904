//! Configuration loading from replistat.toml
//!
//! Analysis parameters can be specified in a `replistat.toml` file in the
//! project root. The configuration is automatically discovered by walking up
//! from the current directory.

use replistat_stats::WarmupConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Replistat configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AnalysisConfig {
    /// Replication-aggregation parameters
    #[serde(default)]
    pub aggregate: AggregateSection,
    /// Warm-up detection parameters
    #[serde(default)]
    pub warmup: WarmupSection,
    /// Output configuration
    #[serde(default)]
    pub output: OutputSection,
}

/// Replication-aggregation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSection {
    /// Confidence level for interval half-widths (e.g. 0.95 for 95%)
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

impl Default for AggregateSection {
    fn default() -> Self {
        Self {
            confidence_level: default_confidence_level(),
        }
    }
}

fn default_confidence_level() -> f64 {
    0.95
}

/// Warm-up detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmupSection {
    /// Alignment bin width, in the series' time unit
    #[serde(default = "default_bin_width")]
    pub bin_width: f64,
    /// Minimum raw samples a bin needs to count as populated
    #[serde(default = "default_min_bin_samples")]
    pub min_bin_samples: usize,
    /// Moving-average window in bins
    #[serde(default = "default_smoothing_window")]
    pub smoothing_window: usize,
    /// Relative tolerance of the steady-state band
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for WarmupSection {
    fn default() -> Self {
        Self {
            bin_width: default_bin_width(),
            min_bin_samples: default_min_bin_samples(),
            smoothing_window: default_smoothing_window(),
            tolerance: default_tolerance(),
        }
    }
}

fn default_bin_width() -> f64 {
    50.0
}
fn default_min_bin_samples() -> usize {
    3
}
fn default_smoothing_window() -> usize {
    5
}
fn default_tolerance() -> f64 {
    0.05
}

impl From<&WarmupSection> for WarmupConfig {
    fn from(section: &WarmupSection) -> Self {
        Self {
            bin_width: section.bin_width,
            min_bin_samples: section.min_bin_samples,
            smoothing_window: section.smoothing_window,
            tolerance: section.tolerance,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    /// Default output format: "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Output directory for reports
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            format: default_format(),
            directory: default_output_dir(),
        }
    }
}

fn default_format() -> String {
    "json".to_string()
}
fn default_output_dir() -> String {
    "target/replistat".to_string()
}

impl AnalysisConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Try to discover and load configuration by walking up from current directory
    pub fn discover() -> Option<Self> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let config_path = dir.join("replistat.toml");
            if config_path.exists() {
                return Self::load(&config_path).ok();
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    /// Generate a default configuration as TOML string
    pub fn default_toml() -> String {
        r#"# Replistat Configuration

[aggregate]
# Confidence level for interval half-widths (0.0 to 1.0)
confidence_level = 0.95

[warmup]
# Alignment bin width, in simulated-time units
bin_width = 50.0
# Minimum raw samples per populated bin
min_bin_samples = 3
# Moving-average window, in bins
smoothing_window = 5
# Relative steady-state tolerance band
tolerance = 0.05

[output]
# Output format: json
format = "json"
# Output directory for reports
directory = "target/replistat"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnalysisConfig::default();
        assert!((config.aggregate.confidence_level - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.warmup.min_bin_samples, 3);
        assert_eq!(config.output.format, "json");
    }

    #[test]
    fn test_parse_toml_applies_defaults() {
        let toml_str = r#"
            [warmup]
            bin_width = 100.0
            tolerance = 0.01
        "#;

        let config: AnalysisConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.warmup.bin_width, 100.0);
        assert_eq!(config.warmup.tolerance, 0.01);
        // Defaults should still apply
        assert_eq!(config.warmup.smoothing_window, 5);
        assert!((config.aggregate.confidence_level - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_toml_parses() {
        let default_toml = AnalysisConfig::default_toml();
        let config: AnalysisConfig = toml::from_str(&default_toml).unwrap();
        assert_eq!(config.warmup.bin_width, 50.0);
    }

    #[test]
    fn test_warmup_section_converts() {
        let section = WarmupSection::default();
        let warmup: WarmupConfig = (&section).into();
        assert_eq!(warmup.bin_width, 50.0);
        assert_eq!(warmup.smoothing_window, 5);
    }
}
