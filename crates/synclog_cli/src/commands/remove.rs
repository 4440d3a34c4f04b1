//! Remove command implementation.

use std::path::Path;

use super::open_engine;

/// Runs the remove command.
pub async fn run(path: &Path, request_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path).await?;
    match engine.remove_request(request_id).await? {
        Some(queued) => {
            println!(
                "Removed {} ({} {})",
                queued.request_id, queued.request.method, queued.request.url
            );
            Ok(())
        }
        None => Err(format!("No queued request with id {request_id}").into()),
    }
}
