//! Stream Analytics CLI
//!
//! A command-line tool for submitting observations, checking the service
//! and generating synthetic load against the stream analytics service.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{load, status, submit};
use std::time::Duration;

/// Stream Analytics CLI
#[derive(Parser)]
#[command(name = "sactl")]
#[command(author, version, about = "CLI for the Stream Analytics service", long_about = None)]
pub struct Cli {
    /// Service URL (can also be set via SACTL_API_URL env var)
    #[arg(long, env = "SACTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit one observation for analysis
    Submit {
        /// CPU utilisation in percent
        #[arg(long)]
        cpu: f64,

        /// Requests per second
        #[arg(long)]
        rps: f64,

        /// Observation time (RFC 3339); the service uses its own clock if omitted
        #[arg(long)]
        timestamp: Option<String>,
    },

    /// Show the durable request count
    Count,

    /// Show service and store health
    Health,

    /// Generate synthetic traffic with injected anomalies
    Load {
        /// Target submissions per second
        #[arg(long, default_value_t = 50)]
        rate: u32,

        /// Run time in seconds
        #[arg(long, default_value_t = 10)]
        duration: u64,

        /// Probability that a submission is anomalous (0-1)
        #[arg(long, default_value_t = 0.09)]
        anomaly_ratio: f64,

        /// Maximum requests in flight
        #[arg(long, default_value_t = 16)]
        concurrency: usize,

        /// Seed for reproducible traffic
        #[arg(long)]
        seed: Option<u64>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = client::ApiClient::new(&cli.api_url)?;

    match cli.command {
        Commands::Submit {
            cpu,
            rps,
            timestamp,
        } => {
            submit::submit_metric(&client, cpu, rps, timestamp, cli.format).await?;
        }
        Commands::Count => {
            status::show_count(&client, cli.format).await?;
        }
        Commands::Health => {
            status::show_health(&client, cli.format).await?;
        }
        Commands::Load {
            rate,
            duration,
            anomaly_ratio,
            concurrency,
            seed,
        } => {
            let options = load::LoadOptions {
                rate,
                duration: Duration::from_secs(duration),
                anomaly_ratio,
                concurrency,
                seed,
            };
            load::generate_load(&client, options, cli.format).await?;
        }
    }

    Ok(())
}
