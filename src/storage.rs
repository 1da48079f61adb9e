use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported media type")]
    UnsupportedMedia,
    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: usize },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// What the upload is for; each purpose gets its own directory, filename
/// prefix and size cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    PostImage,
    Avatar,
}

impl UploadKind {
    pub fn dir(&self) -> &'static str {
        match self {
            UploadKind::PostImage => "posts",
            UploadKind::Avatar => "profiles",
        }
    }

    fn prefix(&self) -> &'static str {
        match self {
            UploadKind::PostImage => "post",
            UploadKind::Avatar => "profile",
        }
    }

    pub fn max_bytes(&self) -> usize {
        match self {
            UploadKind::PostImage => 5 * 1024 * 1024,
            UploadKind::Avatar => 2 * 1024 * 1024,
        }
    }
}

#[async_trait]
pub trait UploadStore: Send + Sync {
    /// Validate and persist one image, returning the web-servable relative
    /// path (never an absolute filesystem path).
    async fn save(
        &self,
        kind: UploadKind,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, UploadError>;
}

/// Disk-backed store writing under `<root>/<purpose>/`, served back at
/// `/uploads/<purpose>/<file>`.
pub struct DiskUploadStore {
    root: PathBuf,
}

impl DiskUploadStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".into());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_name(kind: UploadKind, original_name: &str) -> String {
        let ext = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!(
            "{}-{}-{}{}",
            kind.prefix(),
            chrono::Utc::now().timestamp_millis(),
            rand::random::<u32>(),
            ext
        )
    }
}

// Content sniffing, not the client-declared type; a renamed .txt never passes.
fn is_image(bytes: &[u8]) -> bool {
    infer::get(bytes)
        .map(|t| t.mime_type().starts_with("image/"))
        .unwrap_or(false)
}

#[async_trait]
impl UploadStore for DiskUploadStore {
    async fn save(
        &self,
        kind: UploadKind,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<String, UploadError> {
        let limit = kind.max_bytes();
        if bytes.len() > limit {
            return Err(UploadError::TooLarge { limit });
        }
        if !is_image(bytes) {
            return Err(UploadError::UnsupportedMedia);
        }
        let dir = self.root.join(kind.dir());
        tokio::fs::create_dir_all(&dir).await?;
        let name = Self::file_name(kind, original_name);
        tokio::fs::write(dir.join(&name), bytes).await?;
        Ok(format!("/uploads/{}/{}", kind.dir(), name))
    }
}

/// Factory used by main; panics early when the root is unusable.
pub fn build_upload_store() -> Arc<dyn UploadStore> {
    let store = DiskUploadStore::from_env();
    if let Err(e) = std::fs::create_dir_all(store.root()) {
        panic!("failed to prepare upload root '{}': {e}", store.root().display());
    }
    Arc::new(store)
}
