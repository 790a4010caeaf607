//! Thumbnail staging
//!
//! An uploaded image is written to the staging area first. It is moved to
//! its final area only after the moderation gate passed both the image and
//! the accompanying text; on any rejection or failure the staged file is
//! removed again.

use crate::context::AppContext;
use crate::error::AgoraError;
use crate::moderation::ModerationContext;
use crate::storage::{AssetArea, StorageBackend};
use actix_web::web::Bytes;
use std::future::Future;
use uuid::Uuid;

/// Image types accepted as thumbnails, with their stored extension.
const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

/// An image as received from a multipart form.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// An image sitting in the staging area.
#[derive(Debug, Clone)]
pub struct StagedAsset {
    pub name: String,
    pub mime: &'static str,
    pub bytes: Bytes,
}

/// Detects the image type from the file's leading bytes.
pub fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn extension_for(mime: &str) -> Option<&'static str> {
    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(m, _)| *m == mime)
        .map(|(_, ext)| *ext)
}

/// Validates `image` and writes it to the staging area under a fresh name.
pub async fn stage(
    storage: &dyn StorageBackend,
    image: UploadedImage,
    max_bytes: usize,
) -> Result<StagedAsset, AgoraError> {
    if image.bytes.is_empty() {
        return Err(AgoraError::validation("thumbnail: the file is empty"));
    }
    if image.bytes.len() > max_bytes {
        return Err(AgoraError::validation(format!(
            "thumbnail: the file is larger than {} MB",
            max_bytes / (1024 * 1024)
        )));
    }

    // The declared type is only a hint; the content decides.
    let mime = sniff_image_type(&image.bytes).ok_or_else(|| {
        AgoraError::validation("thumbnail: only JPEG, PNG, GIF and WebP images are allowed")
    })?;
    if let Some(declared) = image.content_type.as_deref() {
        if declared != mime {
            log::debug!(
                "Upload {:?} declared {} but contains {}",
                image.filename,
                declared,
                mime
            );
        }
    }
    let ext = extension_for(mime)
        .ok_or_else(|| AgoraError::validation("thumbnail: unsupported image type"))?;

    let name = format!("{}.{}", Uuid::new_v4().simple(), ext);
    storage
        .put_object(AssetArea::Staging, &name, image.bytes.to_vec())
        .await?;
    log::debug!("Staged upload {:?} as {}", image.filename, name);

    Ok(StagedAsset {
        name,
        mime,
        bytes: image.bytes,
    })
}

/// Moves a staged file into `area`. Returns the final asset name.
///
/// The staged file is removed whether or not the copy succeeds.
pub async fn promote(
    storage: &dyn StorageBackend,
    staged: &StagedAsset,
    area: AssetArea,
) -> Result<String, AgoraError> {
    let copied = storage
        .copy_object(AssetArea::Staging, &staged.name, area, &staged.name)
        .await;
    discard(storage, staged).await;
    copied?;
    Ok(staged.name.clone())
}

/// Removes a staged file. Failures are logged, never returned.
pub async fn discard(storage: &dyn StorageBackend, staged: &StagedAsset) {
    if let Err(e) = storage
        .delete_object(AssetArea::Staging, &staged.name)
        .await
    {
        log::warn!("Failed to remove staged file {}: {}", staged.name, e);
    }
}

/// Removes a stored asset. Failures are logged, never returned.
pub async fn remove_asset(storage: &dyn StorageBackend, area: AssetArea, name: &str) {
    if let Err(e) = storage.delete_object(area, name).await {
        log::warn!("Failed to remove {}/{}: {}", area.dir_name(), name, e);
    }
}

/// Awaits `step`; if it fails, the staged file (if any) is discarded first.
pub async fn or_discard<T, F>(
    storage: &dyn StorageBackend,
    staged: Option<&StagedAsset>,
    step: F,
) -> Result<T, AgoraError>
where
    F: Future<Output = Result<T, AgoraError>>,
{
    match step.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Some(staged) = staged {
                discard(storage, staged).await;
            }
            Err(e)
        }
    }
}

/// Stages an optional thumbnail and runs it through the image gate.
///
/// A rejected image never stays in staging.
pub async fn stage_thumbnail(
    ctx: &AppContext,
    image: Option<UploadedImage>,
    context: ModerationContext,
) -> Result<Option<StagedAsset>, AgoraError> {
    let image = match image {
        Some(image) => image,
        None => return Ok(None),
    };

    let staged = stage(ctx.storage.as_ref(), image, ctx.max_image_bytes).await?;
    or_discard(
        ctx.storage.as_ref(),
        Some(&staged),
        ctx.gate.check_image(staged.bytes.clone(), staged.mime, context),
    )
    .await?;
    Ok(Some(staged))
}
