//! Opinion poll endpoints

use super::dialogue::VoteForm;
use super::{now, read_form};
use crate::authorization::Capability;
use crate::context::AppContext;
use crate::conversion::{convert_to_thread, ConversionSource};
use crate::error::AgoraError;
use crate::middleware::ClientCtx;
use crate::poll::{self, PollInput};
use crate::vote::{cast_vote, VoteTarget};
use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_polls)
        .service(create_poll)
        .service(view_poll)
        .service(vote_on_poll)
        .service(extend_poll)
        .service(delete_poll)
        .service(convert_poll);
}

#[derive(Deserialize)]
pub struct DurationForm {
    pub duration_seconds: i64,
}

#[get("/opinie")]
pub async fn list_polls(ctx: web::Data<AppContext>) -> Result<HttpResponse, AgoraError> {
    let at = now();
    let polls: Vec<_> = poll::list_polls(&ctx.db)
        .await?
        .into_iter()
        .map(|p| {
            let status = poll::status(&p, at);
            json!({ "poll": p, "status": status })
        })
        .collect();
    Ok(HttpResponse::Ok().json(polls))
}

#[post("/opinie")]
pub async fn create_poll(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "thumbnail", ctx.max_image_bytes).await?;
    let input = PollInput {
        question: form.text("question"),
        description: form.optional_text("description"),
        duration_seconds: form.parse("duration_seconds")?,
    };

    let poll = poll::create_poll(&ctx, actor, input, form.image, now()).await?;
    Ok(HttpResponse::Created().json(poll))
}

#[get("/opinie/{poll_id}")]
pub async fn view_poll(
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let poll = poll::get_poll(&ctx.db, path.into_inner()).await?;
    let status = poll::status(&poll, now());
    Ok(HttpResponse::Ok().json(json!({ "poll": poll, "status": status })))
}

#[post("/opinie/{poll_id}/vote")]
pub async fn vote_on_poll(
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
        VoteTarget::Poll(path.into_inner()),
        direction,
        now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[post("/opinie/{poll_id}/extend")]
pub async fn extend_poll(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    form: web::Form<DurationForm>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let poll = poll::extend_or_shorten(
        &ctx.db,
        actor,
        path.into_inner(),
        form.duration_seconds,
        now(),
    )
    .await?;
    Ok(HttpResponse::Ok().json(poll))
}

#[post("/opinie/{poll_id}/delete")]
pub async fn delete_poll(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    poll::delete_poll(&ctx, actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/opinie/{poll_id}/convert")]
pub async fn convert_poll(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let source = ConversionSource::Poll(path.into_inner());
    let conversion = convert_to_thread(&ctx, actor, source, now()).await?;

    let body = json!({ "thread": conversion.thread, "created": conversion.created });
    Ok(if conversion.created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    })
}
