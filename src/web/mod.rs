pub mod admin;
pub mod blog;
pub mod dialogue;
pub mod moderation;
pub mod polls;

use crate::error::AgoraError;
use crate::upload::UploadedImage;
use actix_multipart::{Field, Multipart};
use actix_web::web::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;

/// Configures the web app by adding services from each web file.
///
/// @see https://docs.rs/actix-web/4.0.1/actix_web/struct.App.html#method.configure
pub fn configure(conf: &mut actix_web::web::ServiceConfig) {
    // Descending order. Order is important.
    // Route resolution will stop at the first match.
    admin::configure(conf);
    blog::configure(conf);
    dialogue::configure(conf);
    moderation::configure(conf);
    polls::configure(conf);
}

/// Largest accepted text field in a multipart form.
const MAX_TEXT_FIELD_BYTES: usize = 64 * 1024;

/// Text fields and the optional image of a multipart submission.
#[derive(Debug, Default)]
pub struct FormParts {
    pub fields: HashMap<String, String>,
    pub image: Option<UploadedImage>,
}

impl FormParts {
    pub fn text(&self, name: &str) -> String {
        self.fields.get(name).cloned().unwrap_or_default()
    }

    pub fn optional_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).cloned()
    }

    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, AgoraError> {
        match self.fields.get(name).map(|v| v.trim()) {
            None | Some("") => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| AgoraError::validation(format!("{}: is not a valid number", name))),
        }
    }
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, AgoraError> {
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    while let Some(chunk) = field.next().await {
        let bytes = chunk.map_err(|e| {
            log::error!("multipart read error: {}", e);
            AgoraError::validation("Error interpreting user input.")
        })?;
        if buf.len() + bytes.len() > limit {
            return Err(AgoraError::validation(format!(
                "{}: is too large",
                field.name()
            )));
        }
        buf.extend_from_slice(&bytes);
    }
    Ok(buf)
}

/// Reads a multipart form. The file field `image_field` becomes the upload.
pub async fn read_form(
    mut multipart: Multipart,
    image_field: &str,
    max_image_bytes: usize,
) -> Result<FormParts, AgoraError> {
    let mut parts = FormParts::default();

    while let Some(mut field) = multipart.try_next().await.map_err(|e| {
        log::error!("multipart stream error: {}", e);
        AgoraError::validation("Error interpreting user input.")
    })? {
        let name = field.name().to_owned();
        if name == image_field {
            let filename = field
                .content_disposition()
                .get_filename()
                .map(|f| f.to_owned());
            let content_type = field.content_type().map(|m| m.essence_str().to_owned());
            // One byte over the limit is enough for staging to reject it.
            let bytes = read_field(&mut field, max_image_bytes + 1).await?;
            if !bytes.is_empty() {
                parts.image = Some(UploadedImage {
                    filename,
                    content_type,
                    bytes: Bytes::from(bytes),
                });
            }
        } else {
            let bytes = read_field(&mut field, MAX_TEXT_FIELD_BYTES).await?;
            let value = String::from_utf8(bytes)
                .map_err(|_| AgoraError::validation(format!("{}: is not valid UTF-8", name)))?;
            parts.fields.insert(name, value);
        }
    }

    Ok(parts)
}

/// Current time as stored in the database.
pub fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}
