//! Local filesystem storage backend.

use super::{get_mime_type, validate_key, AssetArea, StorageBackend, StorageError, StorageObject};
use actix_web::web::{self, Bytes};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;

/// Local filesystem storage backend.
///
/// Layout: `{base_path}/{area}/{name}`.
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend.
    ///
    /// The `base_path` directory will be created if it doesn't exist.
    pub fn new(base_path: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&base_path)?;
        log::info!("LocalStorage initialized at {:?}", base_path);
        Ok(Self { base_path })
    }

    fn get_file_path(&self, area: AssetArea, name: &str) -> Result<PathBuf, StorageError> {
        validate_key(name)?;
        Ok(self.base_path.join(area.dir_name()).join(name))
    }
}

fn blocking_error(e: actix_web::error::BlockingError) -> StorageError {
    StorageError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn put_object(
        &self,
        area: AssetArea,
        name: &str,
        data: Vec<u8>,
    ) -> Result<(), StorageError> {
        let path = self.get_file_path(area, name)?;
        log::debug!("LocalStorage: put_object: {:?}", path);

        web::block(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, data)
        })
        .await
        .map_err(blocking_error)??;

        Ok(())
    }

    async fn get_object(&self, area: AssetArea, name: &str) -> Result<StorageObject, StorageError> {
        let path = self.get_file_path(area, name)?;
        log::debug!("LocalStorage: get_object: {:?}", path);

        let buffer = web::block(move || fs::read(&path))
            .await
            .map_err(blocking_error)??;

        Ok(StorageObject {
            body: Bytes::from(buffer),
            content_type: get_mime_type(name),
        })
    }

    async fn exists(&self, area: AssetArea, name: &str) -> Result<bool, StorageError> {
        let path = self.get_file_path(area, name)?;
        Ok(path.exists())
    }

    async fn delete_object(&self, area: AssetArea, name: &str) -> Result<(), StorageError> {
        let path = self.get_file_path(area, name)?;
        log::debug!("LocalStorage: delete_object: {:?}", path);

        web::block(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        })
        .await
        .map_err(blocking_error)??;

        Ok(())
    }

    async fn copy_object(
        &self,
        from: AssetArea,
        name: &str,
        to: AssetArea,
        to_name: &str,
    ) -> Result<(), StorageError> {
        let source = self.get_file_path(from, name)?;
        let dest = self.get_file_path(to, to_name)?;
        log::debug!("LocalStorage: copy_object: {:?} -> {:?}", source, dest);

        web::block(move || {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, &dest).map(|_| ())
        })
        .await
        .map_err(blocking_error)??;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn test_put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        storage
            .put_object(AssetArea::Staging, "a.png", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(storage.exists(AssetArea::Staging, "a.png").await.unwrap());
        assert!(!storage.exists(AssetArea::Uploads, "a.png").await.unwrap());

        let object = storage.get_object(AssetArea::Staging, "a.png").await.unwrap();
        assert_eq!(object.body.as_ref(), &[1, 2, 3]);
        assert_eq!(object.content_type.as_deref(), Some("image/png"));

        storage.delete_object(AssetArea::Staging, "a.png").await.unwrap();
        assert!(!storage.exists(AssetArea::Staging, "a.png").await.unwrap());
        // Deleting twice is fine
        storage.delete_object(AssetArea::Staging, "a.png").await.unwrap();
    }

    #[actix_rt::test]
    async fn test_copy_between_areas() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        storage
            .put_object(AssetArea::BlogThumbs, "t.jpg", b"jpeg".to_vec())
            .await
            .unwrap();
        storage
            .copy_object(AssetArea::BlogThumbs, "t.jpg", AssetArea::DialogueThumbs, "t.jpg")
            .await
            .unwrap();

        assert!(storage.exists(AssetArea::BlogThumbs, "t.jpg").await.unwrap());
        assert!(storage
            .exists(AssetArea::DialogueThumbs, "t.jpg")
            .await
            .unwrap());
    }

    #[actix_rt::test]
    async fn test_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        let result = storage.get_object(AssetArea::Uploads, "nope.png").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[actix_rt::test]
    async fn test_path_traversal_refused() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().to_path_buf()).unwrap();

        let result = storage
            .put_object(AssetArea::Uploads, "../escape.png", vec![0])
            .await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }
}
