//! Core data models for the analytics service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single per-interval observation submitted by a caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Observation time; defaults to the ingestion instant when omitted
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    /// CPU utilisation in percent (expected 0-100, not validated)
    pub cpu: f64,
    /// Requests per second (expected >= 0, not validated)
    pub rps: f64,
}

impl Metric {
    pub fn new(timestamp: DateTime<Utc>, cpu: f64, rps: f64) -> Self {
        Self {
            timestamp,
            cpu,
            rps,
        }
    }

    /// Observation stamped with the current time
    pub fn now(cpu: f64, rps: f64) -> Self {
        Self::new(Utc::now(), cpu, rps)
    }
}

/// Acknowledgment returned to the submitter once the fast path completes
///
/// Acceptance does not imply the observation has reached the rolling window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acceptance {
    pub status: String,
    pub message: String,
    /// Value of the durable request counter after this submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_count: Option<i64>,
}

impl Acceptance {
    pub fn accepted(request_count: i64) -> Self {
        Self {
            status: "accepted".to_string(),
            message: "Metric accepted for processing".to_string(),
            request_count: Some(request_count),
        }
    }
}
