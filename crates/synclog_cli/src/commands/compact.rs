//! Compact command implementation.

use std::path::Path;
use synclog_storage::FileStoreProvider;

/// Runs the compact command.
pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store directory found at {:?}", path).into());
    }

    println!("Compacting stores at {:?}", path);
    println!();

    let provider = FileStoreProvider::open(path).await?;
    let results = provider.compact_all().await?;
    if results.is_empty() {
        println!("No store logs found");
        return Ok(());
    }

    for (name, rows) in &results {
        println!("  {name:<24} {rows} live row(s)");
    }
    println!();
    println!("✓ Compaction complete");
    Ok(())
}
