//! Storage backend abstraction for thumbnails and uploaded images.
//!
//! Assets live in named areas (`blog_thumbs`, `dialogue_thumbs`, ...). A
//! submission's image is first written to the `staging` area and only moved
//! into its final area once the moderation gate lets it through.

pub mod local;

use actix_web::web::Bytes;
use async_trait::async_trait;

/// Logical directory an asset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetArea {
    BlogThumbs,
    DialogueThumbs,
    PollThumbs,
    Uploads,
    Staging,
}

impl AssetArea {
    pub fn dir_name(&self) -> &'static str {
        match self {
            AssetArea::BlogThumbs => "blog_thumbs",
            AssetArea::DialogueThumbs => "dialogue_thumbs",
            AssetArea::PollThumbs => "poll_thumbs",
            AssetArea::Uploads => "uploads",
            AssetArea::Staging => "staging",
        }
    }

    /// Public URL path under which the web layer exposes this area.
    pub fn public_path(&self, name: &str) -> String {
        format!("/static/{}/{}", self.dir_name(), name)
    }
}

/// Represents a retrieved storage object with metadata.
pub struct StorageObject {
    pub body: Bytes,
    /// MIME content type guessed from the extension
    pub content_type: Option<String>,
}

/// Storage operation errors.
#[derive(Debug)]
pub enum StorageError {
    /// File not found
    NotFound(String),
    /// I/O error
    Io(std::io::Error),
    /// Asset names are plain file names; anything resembling a path is refused
    InvalidKey(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "Not found: {}", msg),
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::InvalidKey(key) => write!(f, "Invalid asset name: {}", key),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(e.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Rejects names that could escape the area directory.
pub fn validate_key(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(StorageError::InvalidKey(name.to_string()));
    }
    Ok(())
}

/// Trait for storage backends.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store a file, replacing any existing file of the same name.
    async fn put_object(
        &self,
        area: AssetArea,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), StorageError>;

    /// Retrieve a file.
    async fn get_object(&self, area: AssetArea, name: &str) -> Result<StorageObject, StorageError>;

    /// Check if a file exists.
    async fn exists(&self, area: AssetArea, name: &str) -> Result<bool, StorageError>;

    /// Remove a file. Removing a missing file is not an error.
    async fn delete_object(&self, area: AssetArea, name: &str) -> Result<(), StorageError>;

    /// Copy a file between areas.
    async fn copy_object(
        &self,
        from: AssetArea,
        name: &str,
        to: AssetArea,
        to_name: &str,
    ) -> Result<(), StorageError> {
        let object = self.get_object(from, name).await?;
        self.put_object(to, to_name, object.body.to_vec()).await
    }
}

/// Get MIME type from filename extension.
pub fn get_mime_type(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    let mime = match ext.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    };
    Some(mime.to_string())
}
