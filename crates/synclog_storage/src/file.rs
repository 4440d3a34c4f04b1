//! File-backed store for persistent queues.
//!
//! Each store is an append-only log of CBOR records framed by a 4-byte
//! little-endian length:
//!
//! ```text
//! ┌──────────────┬─────────────────────────────┐
//! │ len: u32 LE  │ CBOR LogRecord (len bytes)  │  ... repeated
//! └──────────────┴─────────────────────────────┘
//! ```
//!
//! Opening a store replays the log into memory. A truncated final frame
//! (a write torn by a crash) is dropped and cut from the file; any other
//! undecodable frame is reported as corruption.

use crate::error::{StorageError, StorageResult};
use crate::store::{FindQuery, Store, StoreOptions, StoreProvider, StoreRow};
use crate::table::Table;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// File extension of store logs.
pub const STORE_FILE_EXTENSION: &str = "slog";

const FRAME_HEADER_LEN: usize = 4;

#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    Upsert {
        key: String,
        metadata: Value,
        value: Value,
    },
    Remove {
        key: String,
    },
}

fn encode_frame(record: &LogRecord, out: &mut Vec<u8>) -> StorageResult<()> {
    let mut payload = Vec::new();
    ciborium::ser::into_writer(record, &mut payload)
        .map_err(|e| StorageError::Encoding(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| StorageError::Encoding(format!("record of {} bytes", payload.len())))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(())
}

/// Replays frames into `table`, returning the length of the intact prefix.
fn replay(data: &[u8], table: &mut Table) -> StorageResult<usize> {
    let mut offset = 0usize;
    while offset < data.len() {
        if data.len() - offset < FRAME_HEADER_LEN {
            break;
        }
        let header: [u8; FRAME_HEADER_LEN] = data[offset..offset + FRAME_HEADER_LEN]
            .try_into()
            .map_err(|_| StorageError::Corrupted(format!("frame header at {offset}")))?;
        let len = u32::from_le_bytes(header) as usize;
        let start = offset + FRAME_HEADER_LEN;
        let Some(end) = start.checked_add(len).filter(|end| *end <= data.len()) else {
            break;
        };

        let record: LogRecord = ciborium::de::from_reader(&data[start..end]).map_err(|e| {
            StorageError::Corrupted(format!("record at offset {offset}: {e}"))
        })?;
        match record {
            LogRecord::Upsert {
                key,
                metadata,
                value,
            } => table.upsert(&key, metadata, value),
            LogRecord::Remove { key } => {
                table.remove(&key);
            }
        }
        offset = end;
    }
    Ok(offset)
}

/// The writable end of a store log.
#[async_trait]
trait LogSink: Send {
    async fn len(&mut self) -> std::io::Result<u64>;
    async fn append(&mut self, buf: &[u8]) -> std::io::Result<()>;
    async fn truncate(&mut self, len: u64) -> std::io::Result<()>;
}

#[async_trait]
impl LogSink for File {
    async fn len(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn append(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf).await?;
        self.flush().await?;
        self.sync_all().await
    }

    async fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len).await?;
        self.sync_all().await
    }
}

/// Appends encoded frames, cutting the log back to its previous length if
/// the write fails partway.
async fn append_frames<S: LogSink + ?Sized>(sink: &mut S, buf: &[u8]) -> StorageResult<()> {
    let start = sink.len().await?;
    if let Err(e) = sink.append(buf).await {
        if let Err(rollback) = sink.truncate(start).await {
            warn!(error = %rollback, len = start, "Failed to roll back partial append");
        }
        return Err(e.into());
    }
    Ok(())
}

async fn open_append(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?)
}

/// A store persisted to a single log file.
///
/// # Durability
///
/// Every write is flushed and `sync_all`ed before the call returns.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
    table: RwLock<Table>,
}

impl FileStore {
    /// Opens or creates the store log at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or holds a corrupted
    /// record before its final frame.
    pub async fn open(
        name: impl Into<String>,
        path: &Path,
        options: &StoreOptions,
    ) -> StorageResult<Self> {
        let name = name.into();
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let mut table = Table::new(options.skip_metadata);
        let intact = replay(&data, &mut table)?;
        if intact < data.len() {
            warn!(
                store = %name,
                dropped = data.len() - intact,
                "Truncating torn tail of store log"
            );
            let file = OpenOptions::new().write(true).open(path).await?;
            file.set_len(intact as u64).await?;
            file.sync_all().await?;
        }
        debug!(store = %name, rows = table.len(), "Opened file store");

        Ok(Self {
            name,
            path: path.to_path_buf(),
            file: Mutex::new(open_append(path).await?),
            table: RwLock::new(table),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of live rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    /// Returns true if the store has no live rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn write_frames(file: &mut File, records: &[LogRecord]) -> StorageResult<()> {
        let mut buf = Vec::new();
        for record in records {
            encode_frame(record, &mut buf)?;
        }
        append_frames(file, &buf).await
    }

    /// Rewrites the log with live rows only.
    ///
    /// Returns the number of rows kept.
    pub async fn compact(&self) -> StorageResult<usize> {
        let mut file = self.file.lock().await;
        let rows = self.table.read().rows();

        let mut buf = Vec::new();
        for row in &rows {
            encode_frame(
                &LogRecord::Upsert {
                    key: row.key.clone(),
                    metadata: row.metadata.clone(),
                    value: row.value.clone(),
                },
                &mut buf,
            )?;
        }

        let tmp = self.path.with_extension(format!("{STORE_FILE_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, &buf).await?;
        File::open(&tmp).await?.sync_all().await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        *file = open_append(&self.path).await?;

        info!(store = %self.name, rows = rows.len(), "Compacted store log");
        Ok(rows.len())
    }
}

#[async_trait]
impl Store for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, key: &str, metadata: Value, value: Value) -> StorageResult<()> {
        let mut file = self.file.lock().await;
        let record = LogRecord::Upsert {
            key: key.to_string(),
            metadata,
            value,
        };
        Self::write_frames(&mut file, std::slice::from_ref(&record)).await?;
        if let LogRecord::Upsert {
            key,
            metadata,
            value,
        } = record
        {
            self.table.write().upsert(&key, metadata, value);
        }
        Ok(())
    }

    async fn upsert_all(&self, rows: Vec<StoreRow>) -> StorageResult<()> {
        let mut file = self.file.lock().await;
        let records: Vec<LogRecord> = rows
            .iter()
            .map(|row| LogRecord::Upsert {
                key: row.key.clone(),
                metadata: row.metadata.clone(),
                value: row.value.clone(),
            })
            .collect();
        Self::write_frames(&mut file, &records).await?;

        let mut table = self.table.write();
        for row in rows {
            table.upsert(&row.key, row.metadata, row.value);
        }
        Ok(())
    }

    async fn remove_by_key(&self, key: &str) -> StorageResult<bool> {
        let mut file = self.file.lock().await;
        if self.table.read().get(key).is_none() {
            return Ok(false);
        }
        Self::write_frames(&mut file, &[LogRecord::Remove { key: key.to_string() }]).await?;
        Ok(self.table.write().remove(key))
    }

    async fn find_by_key(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.table.read().get(key))
    }

    async fn find_row(&self, key: &str) -> StorageResult<Option<StoreRow>> {
        Ok(self.table.read().row(key))
    }

    async fn find(&self, query: &FindQuery) -> StorageResult<Vec<Value>> {
        Ok(self.table.read().find(query))
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.table.read().keys())
    }
}

fn validate_store_name(name: &str) -> StorageResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidName(name.to_string()))
    }
}

/// Opens [`FileStore`]s under a root directory, one log file per store.
#[derive(Debug)]
pub struct FileStoreProvider {
    root: PathBuf,
    stores: Mutex<HashMap<String, Arc<FileStore>>>,
}

impl FileStoreProvider {
    /// Creates a provider rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the log path used for the store called `name`.
    #[must_use]
    pub fn store_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{STORE_FILE_EXTENSION}"))
    }

    /// Opens the concrete store called `name`.
    pub async fn file_store(&self, name: &str, options: StoreOptions) -> StorageResult<Arc<FileStore>> {
        validate_store_name(name)?;
        let mut stores = self.stores.lock().await;
        if let Some(store) = stores.get(name) {
            return Ok(Arc::clone(store));
        }
        let store = Arc::new(FileStore::open(name, &self.store_path(name), &options).await?);
        stores.insert(name.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Compacts every store log found under the root directory.
    ///
    /// Returns `(store name, rows kept)` pairs sorted by name.
    pub async fn compact_all(&self) -> StorageResult<Vec<(String, usize)>> {
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STORE_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();

        let mut results = Vec::with_capacity(names.len());
        for name in names {
            let store = self.file_store(&name, StoreOptions::default()).await?;
            results.push((name, store.compact().await?));
        }
        Ok(results)
    }
}

#[async_trait]
impl StoreProvider for FileStoreProvider {
    async fn open_store(&self, name: &str, options: StoreOptions) -> StorageResult<Arc<dyn Store>> {
        let store: Arc<dyn Store> = self.file_store(name, options).await?;
        Ok(store)
    }
}
