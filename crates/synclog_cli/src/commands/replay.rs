//! Replay command implementation.

use std::path::Path;
use std::time::Duration;
use synclog_engine::{SyncError, SyncOptions};

use super::open_engine;

/// Runs the replay command.
pub async fn run(
    path: &Path,
    preflight: &str,
    preflight_timeout_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = SyncOptions::new()
        .with_preflight_pattern(preflight)?
        .with_preflight_timeout(Duration::from_millis(preflight_timeout_ms));
    let engine = open_engine(path).await?;

    match engine.sync(&options).await {
        Ok(result) => {
            println!("Replayed: {}", result.replayed.len());
            println!("Skipped:  {}", result.skipped.len());
            if let Some(id) = &result.stopped_at {
                println!("Stopped at {id}; it and later requests stay queued");
            }
            println!("Took {:.2?}", result.duration);
            Ok(())
        }
        Err(SyncError::Replay(failure)) => {
            println!("Replay failed at {}", failure.request_id);
            println!("  Request: {} {}", failure.request.method, failure.request.url);
            if let Some(status) = failure.status() {
                println!("  Status:  {status}");
            }
            println!("  Error:   {}", failure.error);
            Err(SyncError::Replay(failure).into())
        }
        Err(e) => Err(e.into()),
    }
}
