//! CLI command implementations.

pub mod compact;
pub mod ledger;
pub mod list;
pub mod remove;
pub mod replay;
pub mod show;

use std::path::Path;
use std::sync::Arc;
use synclog_engine::{ReqwestTransport, SyncEngine};
use synclog_storage::FileStoreProvider;

/// Opens the engine over an existing store directory.
pub(crate) async fn open_engine(
    path: &Path,
) -> Result<SyncEngine<ReqwestTransport>, Box<dyn std::error::Error>> {
    if !path.is_dir() {
        return Err(format!("No store directory found at {:?}", path).into());
    }
    let provider = FileStoreProvider::open(path).await?;
    Ok(SyncEngine::new(Arc::new(provider), ReqwestTransport::new()))
}
