//! Synthetic load generator
//!
//! Submits normal traffic (cpu 20-60%, rps 80-120) at a fixed rate and mixes
//! in anomalous observations (cpu 85-95%, rps 300-500) with a given
//! probability, then reports how the service responded.

use anyhow::{bail, Result};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::ops::Range;
use std::time::Duration;
use tabled::Tabled;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

use crate::client::{ApiClient, MetricPayload};
use crate::output::{
    format_percent, format_rate, print_info, print_json, print_table, print_warning, OutputFormat,
};

const NORMAL_CPU: Range<f64> = 20.0..60.0;
const NORMAL_RPS: Range<f64> = 80.0..120.0;
const ANOMALY_CPU: Range<f64> = 85.0..95.0;
const ANOMALY_RPS: Range<f64> = 300.0..500.0;

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Target submissions per second
    pub rate: u32,
    pub duration: Duration,
    /// Probability in [0, 1] that a submission is anomalous
    pub anomaly_ratio: f64,
    /// Maximum requests in flight
    pub concurrency: usize,
    pub seed: Option<u64>,
}

impl LoadOptions {
    fn validate(&self) -> Result<()> {
        if self.rate == 0 {
            bail!("rate must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.anomaly_ratio) {
            bail!("anomaly ratio must be between 0 and 1");
        }
        Ok(())
    }

    /// Number of submissions the run will make
    pub fn total_requests(&self) -> u64 {
        (self.rate as f64 * self.duration.as_secs_f64()).round() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Accepted,
    Overloaded,
    Failed,
}

/// Result of a load run
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub sent: u64,
    pub accepted: u64,
    /// Rejected with 503 (analysis queue full or closed)
    pub overloaded: u64,
    pub failed: u64,
    pub anomalies_injected: u64,
    pub elapsed_secs: f64,
    pub achieved_rate: f64,
}

impl LoadSummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Accepted => self.accepted += 1,
            Outcome::Overloaded => self.overloaded += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Record a finished request task; a task that panicked or was cancelled counts as failed
    fn record_joined(&mut self, joined: Result<Outcome, JoinError>) {
        self.record(joined.unwrap_or(Outcome::Failed));
    }
}

#[derive(Tabled, Serialize)]
struct SummaryRow {
    #[tabled(rename = "Metric")]
    name: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Draw one observation from the normal or anomalous profile
pub fn generate_metric<R: Rng>(rng: &mut R, anomalous: bool) -> MetricPayload {
    let (cpu, rps) = if anomalous {
        (ANOMALY_CPU, ANOMALY_RPS)
    } else {
        (NORMAL_CPU, NORMAL_RPS)
    };

    MetricPayload {
        timestamp: Some(Utc::now()),
        cpu: round2(rng.gen_range(cpu)),
        rps: round2(rng.gen_range(rps)),
    }
}

async fn send(client: ApiClient, payload: MetricPayload) -> Outcome {
    match client.submit(&payload).await {
        Ok(_) => Outcome::Accepted,
        Err(e) if e.status() == Some(503) => Outcome::Overloaded,
        Err(_) => Outcome::Failed,
    }
}

/// Drive the service at the configured rate and collect outcomes
pub async fn run_load(client: &ApiClient, options: &LoadOptions) -> Result<LoadSummary> {
    options.validate()?;

    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let concurrency = options.concurrency.max(1);
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / options.rate as f64));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut summary = LoadSummary::default();
    let mut in_flight = JoinSet::new();
    let start = Instant::now();

    for _ in 0..options.total_requests() {
        ticker.tick().await;

        while in_flight.len() >= concurrency {
            match in_flight.join_next().await {
                Some(joined) => summary.record_joined(joined),
                None => break,
            }
        }

        let anomalous = rng.gen_bool(options.anomaly_ratio);
        if anomalous {
            summary.anomalies_injected += 1;
        }
        in_flight.spawn(send(client.clone(), generate_metric(&mut rng, anomalous)));
        summary.sent += 1;
    }

    while let Some(joined) = in_flight.join_next().await {
        summary.record_joined(joined);
    }

    summary.elapsed_secs = start.elapsed().as_secs_f64();
    if summary.elapsed_secs > 0.0 {
        summary.achieved_rate = summary.sent as f64 / summary.elapsed_secs;
    }

    Ok(summary)
}

pub async fn generate_load(
    client: &ApiClient,
    options: LoadOptions,
    format: OutputFormat,
) -> Result<()> {
    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Sending {} observations at {} ({} anomalous)",
            options.total_requests(),
            format_rate(options.rate as f64),
            format_percent(options.anomaly_ratio)
        ));
    }

    let summary = run_load(client, &options).await?;

    match format {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Table => {
            let rows = vec![
                SummaryRow {
                    name: "Sent",
                    value: summary.sent.to_string(),
                },
                SummaryRow {
                    name: "Accepted",
                    value: summary.accepted.to_string(),
                },
                SummaryRow {
                    name: "Overloaded (503)",
                    value: summary.overloaded.to_string(),
                },
                SummaryRow {
                    name: "Failed",
                    value: summary.failed.to_string(),
                },
                SummaryRow {
                    name: "Anomalies injected",
                    value: summary.anomalies_injected.to_string(),
                },
                SummaryRow {
                    name: "Elapsed",
                    value: format!("{:.2}s", summary.elapsed_secs),
                },
                SummaryRow {
                    name: "Achieved rate",
                    value: format_rate(summary.achieved_rate),
                },
            ];
            print_table(&rows, format);

            if summary.overloaded + summary.failed > 0 {
                print_warning("Some submissions were not accepted");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(rate: u32, millis: u64, anomaly_ratio: f64) -> LoadOptions {
        LoadOptions {
            rate,
            duration: Duration::from_millis(millis),
            anomaly_ratio,
            concurrency: 4,
            seed: Some(7),
        }
    }

    #[test]
    fn test_generated_metrics_stay_in_profile() {
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..500 {
            let normal = generate_metric(&mut rng, false);
            assert!((20.0..=60.0).contains(&normal.cpu));
            assert!((80.0..=120.0).contains(&normal.rps));

            let anomaly = generate_metric(&mut rng, true);
            assert!((85.0..=95.0).contains(&anomaly.cpu));
            assert!((300.0..=500.0).contains(&anomaly.rps));
        }
    }

    #[test]
    fn test_total_requests() {
        assert_eq!(options(100, 200, 0.0).total_requests(), 20);
        assert_eq!(options(10, 2_000, 0.0).total_requests(), 20);
    }

    #[tokio::test]
    async fn test_cancelled_request_task_counts_as_failed() {
        let handle = tokio::spawn(std::future::pending::<Outcome>());
        handle.abort();
        let joined = handle.await;
        assert!(joined.is_err());

        let mut summary = LoadSummary::default();
        summary.record_joined(joined);
        summary.record_joined(Ok(Outcome::Accepted));

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.accepted, 1);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let client = ApiClient::new("http://127.0.0.1:9").unwrap();

        assert!(run_load(&client, &options(0, 100, 0.0)).await.is_err());
        assert!(run_load(&client, &options(10, 100, 1.5)).await.is_err());
    }

    #[tokio::test]
    async fn test_run_load_counts_accepted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/analyze")
            .with_status(202)
            .with_body(r#"{"status":"accepted","message":"Metric accepted for processing"}"#)
            .expect(20)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let summary = run_load(&client, &options(100, 200, 1.0)).await.unwrap();

        mock.assert_async().await;
        assert_eq!(summary.sent, 20);
        assert_eq!(summary.accepted, 20);
        assert_eq!(summary.anomalies_injected, 20);
        assert_eq!(summary.overloaded + summary.failed, 0);
    }

    #[tokio::test]
    async fn test_run_load_counts_overload() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/analyze")
            .with_status(503)
            .with_body(r#"{"error":"analysis queue is full"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let summary = run_load(&client, &options(100, 100, 0.0)).await.unwrap();

        assert_eq!(summary.sent, 10);
        assert_eq!(summary.overloaded, 10);
        assert_eq!(summary.accepted, 0);
        assert_eq!(summary.anomalies_injected, 0);
    }
}
