//! Show command implementation.

use std::path::Path;

use super::open_engine;

/// Runs the show command.
pub async fn run(path: &Path, request_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path).await?;
    let queued = engine
        .log()
        .find_request(request_id)
        .await?
        .ok_or_else(|| format!("No queued request with id {request_id}"))?;

    println!("{}", serde_json::to_string_pretty(&queued)?);
    Ok(())
}
