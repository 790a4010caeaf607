//! Dialogue threads, comments and their votes

use super::{now, read_form};
use crate::authorization::Capability;
use crate::context::AppContext;
use crate::dialogue::{self, CommentInput, ThreadInput};
use crate::error::AgoraError;
use crate::middleware::ClientCtx;
use crate::vote::{cast_vote, VoteDirection, VoteTarget};
use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_threads)
        .service(create_thread)
        .service(view_thread)
        .service(edit_thread)
        .service(delete_thread)
        .service(vote_thread)
        .service(create_comment)
        .service(edit_comment)
        .service(delete_comment)
        .service(vote_comment);
}

#[derive(Deserialize)]
pub struct VoteForm {
    pub direction: String,
}

impl VoteForm {
    pub fn direction(&self) -> Result<VoteDirection, AgoraError> {
        VoteDirection::parse(&self.direction)
            .ok_or_else(|| AgoraError::validation("direction: must be up or down"))
    }
}

#[derive(Deserialize)]
pub struct CommentForm {
    pub body: String,
    pub parent_id: Option<i32>,
}

#[get("/dialoog")]
pub async fn list_threads(ctx: web::Data<AppContext>) -> Result<HttpResponse, AgoraError> {
    Ok(HttpResponse::Ok().json(dialogue::list_threads(&ctx.db).await?))
}

#[post("/dialoog")]
pub async fn create_thread(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "thumbnail", ctx.max_image_bytes).await?;
    let input = ThreadInput {
        title: form.text("title"),
        body: form.optional_text("body"),
    };

    let thread = dialogue::create_thread(&ctx, actor, input, form.image, now()).await?;
    Ok(HttpResponse::Created().json(thread))
}

#[get("/dialoog/{thread_id}")]
pub async fn view_thread(
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let view = dialogue::view_thread(&ctx.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({
        "thread": view.thread,
        "comments": view.comments.flatten(),
    })))
}

#[post("/dialoog/{thread_id}/edit")]
pub async fn edit_thread(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "thumbnail", ctx.max_image_bytes).await?;
    let input = ThreadInput {
        title: form.text("title"),
        body: form.optional_text("body"),
    };

    let thread = dialogue::edit_thread(&ctx, actor, path.into_inner(), input, form.image).await?;
    Ok(HttpResponse::Ok().json(thread))
}

#[post("/dialoog/{thread_id}/delete")]
pub async fn delete_thread(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    dialogue::delete_thread(&ctx, actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/dialoog/{thread_id}/vote")]
pub async fn vote_thread(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Form<VoteForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    actor.can(Capability::Vote, None).require()?;
    let direction = form.direction()?;

    let outcome = cast_vote(
        &ctx.db,
        actor.user_id,
        VoteTarget::Thread(path.into_inner()),
        direction,
        now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/dialoog/{thread_id}/comments")]
pub async fn create_comment(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = form.into_inner();
    let input = CommentInput {
        body: form.body,
        parent_id: form.parent_id,
    };

    let comment = dialogue::create_comment(&ctx, actor, path.into_inner(), input, now()).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[post("/dialoog/comments/{comment_id}/edit")]
pub async fn edit_comment(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Form<CommentForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let comment = dialogue::edit_comment(&ctx, actor, path.into_inner(), &form.body).await?;
    Ok(HttpResponse::Ok().json(comment))
}

#[post("/dialoog/comments/{comment_id}/delete")]
pub async fn delete_comment(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    dialogue::delete_comment(&ctx, actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/dialoog/comments/{comment_id}/vote")]
pub async fn vote_comment(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Form<VoteForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    actor.can(Capability::Vote, None).require()?;
    let direction = form.direction()?;

    let outcome = cast_vote(
        &ctx.db,
        actor.user_id,
        VoteTarget::Comment(path.into_inner()),
        direction,
        now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(outcome))
}
