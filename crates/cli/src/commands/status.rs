//! Request count and health commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_table, print_warning, OutputFormat};

/// Row for the component health table
#[derive(Tabled, Serialize)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

pub async fn show_count(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result = client.count().await?;

    match format {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Table => println!("Requests processed: {}", result.count.to_string().bold()),
    }

    Ok(())
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health),
        OutputFormat::Table => {
            println!("{}", "Service Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status:     {}", color_status(&health.status));
            println!("Store:      {}", color_status(&health.store));
            println!("Checked at: {}", health.timestamp.dimmed());
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, info)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&info.status),
                    message: info.message.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(&rows, format);

            if health.status != "healthy" {
                print_warning("Service is not fully healthy");
            }
        }
    }

    Ok(())
}
