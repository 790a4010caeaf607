//! Blog endpoints

use super::{now, read_form};
use crate::blog::{self, BlogPostInput};
use crate::context::AppContext;
use crate::conversion::{convert_to_thread, ConversionSource};
use crate::error::AgoraError;
use crate::middleware::ClientCtx;
use actix_multipart::Multipart;
use actix_web::{get, post, web, HttpResponse};
use serde_json::json;

pub(super) fn configure(conf: &mut actix_web::web::ServiceConfig) {
    conf.service(list_posts)
        .service(create_post)
        .service(view_post)
        .service(edit_post)
        .service(delete_post)
        .service(convert_post);
}

#[get("/blog")]
pub async fn list_posts(ctx: web::Data<AppContext>) -> Result<HttpResponse, AgoraError> {
    let posts = blog::list_blog_posts(&ctx.db).await?;
    Ok(HttpResponse::Ok().json(posts))
}

#[post("/blog")]
pub async fn create_post(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "thumbnail", ctx.max_image_bytes).await?;
    let input = BlogPostInput {
        title: form.text("title"),
        content: form.text("content"),
    };

    let post = blog::create_blog_post(&ctx, actor, input, form.image, now()).await?;
    Ok(HttpResponse::Created().json(post))
}

#[get("/blog/{post_id}")]
pub async fn view_post(
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let post = blog::get_blog_post(&ctx.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[post("/blog/{post_id}/edit")]
pub async fn edit_post(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
    multipart: Multipart,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let form = read_form(multipart, "thumbnail", ctx.max_image_bytes).await?;
    let input = BlogPostInput {
        title: form.text("title"),
        content: form.text("content"),
    };

    let post = blog::edit_blog_post(&ctx, actor, path.into_inner(), input, form.image).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[post("/blog/{post_id}/delete")]
pub async fn delete_post(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    blog::delete_blog_post(&ctx, actor, path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/blog/{post_id}/convert")]
pub async fn convert_post(
    client: ClientCtx,
    ctx: web::Data<AppContext>,
    path: web::Path<i32>,
) -> Result<HttpResponse, AgoraError> {
    let actor = client.require_login()?;
    let source = ConversionSource::BlogPost(path.into_inner());
    let conversion = convert_to_thread(&ctx, actor, source, now()).await?;

    let body = json!({ "thread": conversion.thread, "created": conversion.created });
    Ok(if conversion.created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    })
}
