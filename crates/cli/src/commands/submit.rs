//! Submit a single observation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::client::{ApiClient, MetricPayload};
use crate::output::{color_status, print_json, print_success, OutputFormat};

/// Parse an RFC 3339 timestamp given on the command line
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 timestamp: {}", raw))
}

pub async fn submit_metric(
    client: &ApiClient,
    cpu: f64,
    rps: f64,
    timestamp: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let timestamp = timestamp.as_deref().map(parse_timestamp).transpose()?;
    let payload = MetricPayload {
        timestamp,
        cpu,
        rps,
    };

    let ack = client.submit(&payload).await?;

    match format {
        OutputFormat::Json => print_json(&ack),
        OutputFormat::Table => {
            print_success(&format!(
                "{} (cpu {:.2}%, rps {:.2})",
                ack.message, cpu, rps
            ));
            println!("Status:         {}", color_status(&ack.status));
            if let Some(count) = ack.request_count {
                println!("Request count:  {}", count);
            }
        }
    }

    Ok(())
}
