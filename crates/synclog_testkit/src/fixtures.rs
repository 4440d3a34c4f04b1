//! Engine fixtures and request builders.
//!
//! Provides convenience functions for setting up test engines
//! and common queued requests.

use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use synclog_codec::{
    encode_multipart, header, multipart_content_type, FormField, HeaderValue, HttpRequest,
};
use synclog_engine::{EngineConfig, MockTransport, SyncEngine, Transport};
use synclog_storage::{FileStoreProvider, InMemoryStoreProvider, Store, StoreOptions, StoreProvider};
use tempfile::TempDir;

/// A sync engine over an in-memory store provider.
pub struct TestEngine<T: Transport = MockTransport> {
    /// The engine instance.
    pub engine: SyncEngine<T>,
    /// The provider backing the sync log and local stores.
    pub provider: Arc<InMemoryStoreProvider>,
}

impl TestEngine<MockTransport> {
    /// Creates an engine with a fresh [`MockTransport`].
    pub fn memory() -> Self {
        Self::with_transport(MockTransport::new())
    }
}

impl<T: Transport> TestEngine<T> {
    /// Creates an engine with the given transport.
    pub fn with_transport(transport: T) -> Self {
        let provider = Arc::new(InMemoryStoreProvider::new());
        Self {
            engine: SyncEngine::new(provider.clone(), transport),
            provider,
        }
    }

    /// Returns the ids still queued, in id order.
    pub async fn queued_ids(&self) -> Vec<String> {
        self.engine
            .sync_log()
            .await
            .expect("Failed to read sync log")
            .iter()
            .map(|entry| entry.request_id().to_string())
            .collect()
    }

    /// Returns the URLs still queued, in id order.
    pub async fn queued_urls(&self) -> Vec<String> {
        self.engine
            .sync_log()
            .await
            .expect("Failed to read sync log")
            .iter()
            .map(|entry| entry.record().url.clone())
            .collect()
    }

    /// Opens a local application store.
    pub async fn local_store(&self, name: &str) -> Arc<dyn Store> {
        self.provider
            .open_store(name, StoreOptions::default())
            .await
            .expect("Failed to open local store")
    }
}

impl<T: Transport> std::ops::Deref for TestEngine<T> {
    type Target = SyncEngine<T>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// A sync engine over a file-backed store provider with automatic cleanup.
pub struct FileTestEngine {
    /// The engine instance.
    pub engine: SyncEngine<MockTransport>,
    /// The provider backing the sync log.
    pub provider: Arc<FileStoreProvider>,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl FileTestEngine {
    /// Creates an engine over a fresh temporary directory.
    pub async fn open() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (engine, provider) = Self::open_engine(temp_dir.path()).await;
        Self {
            engine,
            provider,
            temp_dir,
        }
    }

    async fn open_engine(path: &Path) -> (SyncEngine<MockTransport>, Arc<FileStoreProvider>) {
        let provider = Arc::new(
            FileStoreProvider::open(path)
                .await
                .expect("Failed to open file store provider"),
        );
        let engine = SyncEngine::with_config(
            provider.clone(),
            MockTransport::new(),
            EngineConfig::default(),
        );
        (engine, provider)
    }

    /// Drops the engine and opens a new one over the same directory,
    /// as after a process restart.
    pub async fn reopen(self) -> Self {
        let Self {
            engine,
            provider,
            temp_dir,
        } = self;
        drop(engine);
        drop(provider);
        let (engine, provider) = Self::open_engine(temp_dir.path()).await;
        Self {
            engine,
            provider,
            temp_dir,
        }
    }

    /// Returns the store directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl std::ops::Deref for FileTestEngine {
    type Target = SyncEngine<MockTransport>;

    fn deref(&self) -> &Self::Target {
        &self.engine
    }
}

/// Builds a `POST` with a JSON body.
pub fn json_post(url: &str, body: &Value) -> HttpRequest {
    HttpRequest::post(url)
        .with_content_type("application/json")
        .with_body(body.to_string())
}

/// Builds a `PUT` with a JSON body.
pub fn json_put(url: &str, body: &Value) -> HttpRequest {
    HttpRequest::put(url)
        .with_content_type("application/json")
        .with_body(body.to_string())
}

/// Builds a multipart `POST` carrying `fields`.
pub fn multipart_post(url: &str, fields: &[FormField]) -> HttpRequest {
    let boundary = "----testkit-boundary";
    let content_type = HeaderValue::from_str(&multipart_content_type(boundary))
        .expect("Invalid multipart content type");
    HttpRequest::post(url)
        .with_header(header::CONTENT_TYPE, content_type)
        .with_body(encode_multipart(fields, boundary))
}

/// A one-pixel GIF.
pub const TINY_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0xff, 0xff,
    0xff, 0x00, 0x00, 0x00, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Builds a multipart `POST` with one text field and one image field.
pub fn text_and_image_form(url: &str) -> HttpRequest {
    multipart_post(
        url,
        &[
            FormField::text("caption", "hello"),
            FormField::binary("photo", "image/gif", TINY_GIF).with_filename("pixel.gif"),
        ],
    )
}
