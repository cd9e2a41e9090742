//! Logging and printing of probe outcomes.

use crate::address::TargetAddress;
use crate::config::OutputFormat;
use crate::probe::{CertificateExpiry, ProbeOutcome};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use log::{error, info};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Logs the result of probing `target`.
pub fn log_outcome(target: &TargetAddress, outcome: &ProbeOutcome) {
    match outcome {
        Ok(expiry) => {
            info!(
                "Certificate for {} expires on: {}",
                target.hostname,
                expiry.expiry_date.format(DATE_FORMAT)
            );
            info!("Which is after {} days", expiry.days_remaining);
        }
        Err(err) => error!("{} error: {}", err.kind(), err),
    }
}

/// Renders a successful probe in the requested format.
pub fn render(expiry: &CertificateExpiry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "{}\t{}\t{}",
            expiry.address,
            expiry.expiry_date.format(DATE_FORMAT),
            expiry.days_remaining
        ),
        OutputFormat::Json => serde_json::to_string_pretty(expiry)
            .unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)),
        OutputFormat::Table => render_table(expiry).to_string(),
    }
}

fn render_table(expiry: &CertificateExpiry) -> Table {
    let days_color = if expiry.days_remaining < 0 {
        Color::Red
    } else if expiry.days_remaining < 30 {
        Color::Yellow
    } else {
        Color::Green
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Host", "Subject", "Issuer", "Expires", "Days left"])
        .add_row(vec![
            Cell::new(&expiry.address),
            Cell::new(expiry.subject.as_deref().unwrap_or("None")),
            Cell::new(expiry.issuer.as_deref().unwrap_or("None")),
            Cell::new(expiry.expiry_date.format(DATE_FORMAT)),
            Cell::new(expiry.days_remaining).fg(days_color),
        ]);
    table
}
