//! List command implementation.

use serde::Serialize;
use std::path::Path;
use synclog_engine::{replay_order, SyncLogEntry};

use super::open_engine;

/// One queued request as printed by `list`.
#[derive(Debug, Serialize)]
pub struct ListedRequest {
    /// Request id.
    pub request_id: String,
    /// HTTP method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Number of undo/redo rows recorded with the request.
    pub ledger_rows: usize,
}

/// Runs the list command.
pub async fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path).await?;
    let entries = replay_order(engine.sync_log().await?);

    let mut listed = Vec::with_capacity(entries.len());
    for entry in &entries {
        listed.push(describe(entry).await?);
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&listed)?),
        "text" => print_text_output(&listed),
        other => return Err(format!("Unknown format: {other}").into()),
    }

    Ok(())
}

async fn describe(entry: &SyncLogEntry) -> Result<ListedRequest, Box<dyn std::error::Error>> {
    let record = entry.record();
    Ok(ListedRequest {
        request_id: entry.request_id().to_string(),
        method: record.method.clone(),
        url: record.url.clone(),
        ledger_rows: entry.ledger_rows().await?.len(),
    })
}

fn print_text_output(listed: &[ListedRequest]) {
    if listed.is_empty() {
        println!("Sync log is empty");
        return;
    }

    println!("{} queued request(s) in replay order:", listed.len());
    println!();
    for request in listed {
        println!("{}", format_line(request));
    }
}

fn format_line(request: &ListedRequest) -> String {
    format!(
        "  {:<16} {:<7} {} (ledger rows: {})",
        request.request_id, request.method, request.url, request.ledger_rows
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_line_has_all_columns() {
        let line = format_line(&ListedRequest {
            request_id: "1700000000000".into(),
            method: "POST".into(),
            url: "https://api/orders".into(),
            ledger_rows: 2,
        });
        assert!(line.contains("1700000000000"));
        assert!(line.contains("POST"));
        assert!(line.ends_with("https://api/orders (ledger rows: 2)"));
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        assert!(run(&missing, "text").await.is_err());
    }
}
