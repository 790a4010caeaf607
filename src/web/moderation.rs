//! Moderation endpoints for editors: dry-run a text and upload inline images.

use super::read_form;
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::middleware::ClientCtx;
use crate::moderation::ModerationContext;
use crate::storage::AssetArea;
use crate::upload::{promote, stage_thumbnail};
use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(check_text).service(upload_image);
}

#[derive(Deserialize)]
pub struct TextCheck {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub context: ModerationContext,
}

/// Returns the full decision without publishing anything.
#[post("/moderation/text")]
pub async fn check_text(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    form: web::Json<TextCheck>,
) -> Result<HttpResponse, AgoraError> {
    client.require_login()?;
    let decision = ctx
        .gate
        .guard_text(&form.title, &form.body, form.context)
        .await?;
    Ok(HttpResponse::Ok().json(decision))
}

#[post("/moderation/upload-image")]
pub async fn upload_image(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "image", ctx.max_image_bytes).await?;
    let image = form
        .image
        .ok_or_else(|| AgoraError::validation("image: a file is required"))?;

    let staged = stage_thumbnail(&ctx, Some(image), ModerationContext::ImageUpload)
        .await?
        .ok_or_else(|| AgoraError::validation("image: a file is required"))?;
    let name = promote(ctx.storage.as_ref(), &staged, AssetArea::Uploads).await?;

    log::info!("User {} uploaded image {}", actor.user_id, name);
    Ok(HttpResponse::Created().json(json!({
        "name": name,
        "url": AssetArea::Uploads.public_path(&name),
    })))
}
