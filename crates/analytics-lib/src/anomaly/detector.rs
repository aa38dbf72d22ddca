//! Z-score anomaly detection
//!
//! Classifies an observation against rolling statistics of the window. An
//! observation is anomalous when it lies more than [`Z_SCORE_THRESHOLD`]
//! sample standard deviations from the window mean.

use super::stats::RollingStatistics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of standard deviations beyond which a value is anomalous
pub const Z_SCORE_THRESHOLD: f64 = 2.0;

/// Minimum baseline size for a verdict
pub const MIN_SAMPLES_FOR_DETECTION: usize = 2;

/// Whether the evaluated observation is part of its own baseline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselinePolicy {
    /// Baseline is the window after the observation was appended
    #[default]
    Include,
    /// Baseline is the window without the evaluated observation
    Exclude,
}

impl FromStr for BaselinePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "include" => Ok(Self::Include),
            "exclude" => Ok(Self::Exclude),
            other => Err(format!(
                "unknown baseline policy {:?} (expected \"include\" or \"exclude\")",
                other
            )),
        }
    }
}

impl fmt::Display for BaselinePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Include => write!(f, "include"),
            Self::Exclude => write!(f, "exclude"),
        }
    }
}

/// Outcome of evaluating one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyVerdict {
    /// Z-score, `None` when the baseline is too small or constant
    pub z_score: Option<f64>,
    /// True iff `|z_score| > Z_SCORE_THRESHOLD`
    pub is_anomaly: bool,
    /// Baseline statistics the score was computed against
    pub baseline: RollingStatistics,
}

impl AnomalyVerdict {
    /// Severity by distance from the mean; `None` for normal observations
    pub fn severity(&self) -> Option<Severity> {
        if !self.is_anomaly {
            return None;
        }
        let z = self.z_score?.abs();
        Some(if z > 4.0 {
            Severity::Critical
        } else if z > 3.0 {
            Severity::High
        } else {
            Severity::Warning
        })
    }
}

/// Anomaly severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Two-sided z-score detector with a fixed threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct AnomalyDetector;

impl AnomalyDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify `current` against the baseline values.
    ///
    /// Too little history or a constant baseline yields a non-anomalous
    /// verdict without a score.
    pub fn evaluate(&self, current: f64, baseline: &[f64]) -> AnomalyVerdict {
        let stats = RollingStatistics::from_values(baseline);

        if stats.count < MIN_SAMPLES_FOR_DETECTION || stats.std_dev < f64::EPSILON {
            return AnomalyVerdict {
                z_score: None,
                is_anomaly: false,
                baseline: stats,
            };
        }

        let z_score = (current - stats.mean) / stats.std_dev;

        AnomalyVerdict {
            z_score: Some(z_score),
            is_anomaly: z_score.abs() > Z_SCORE_THRESHOLD,
            baseline: stats,
        }
    }
}
