//! Undo and redo command implementation.

use std::path::Path;
use synclog_engine::LedgerDirection;

use super::open_engine;

/// Applies the ledger rows of `request_id` in `direction`.
pub async fn run(
    path: &Path,
    request_id: &str,
    direction: LedgerDirection,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = open_engine(path).await?;
    let log = engine.log();
    let applied = match direction {
        LedgerDirection::Undo => log.undo(request_id).await?,
        LedgerDirection::Redo => log.redo(request_id).await?,
    };

    let verb = match direction {
        LedgerDirection::Undo => "Undid",
        LedgerDirection::Redo => "Redid",
    };
    if applied {
        println!("{verb} local changes for {request_id}");
    } else {
        println!("No ledger rows recorded for {request_id}");
    }
    Ok(())
}
