//! Anomaly detection for the metric stream
//!
//! This module provides:
//! - Rolling mean / sample standard deviation over a window snapshot
//! - A two-sided z-score detector with a fixed threshold

mod detector;
mod stats;

pub use detector::{
    AnomalyDetector, AnomalyVerdict, BaselinePolicy, Severity, MIN_SAMPLES_FOR_DETECTION,
    Z_SCORE_THRESHOLD,
};
pub use stats::{max, min, RollingStatistics};
