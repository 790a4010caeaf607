//! Blog posts

use crate::authorization::{Capability, Identity};
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::moderation::ModerationContext;
use crate::orm::{blog_posts, dialogue_comments, dialogue_threads};
use crate::storage::AssetArea;
use crate::upload::{or_discard, promote, remove_asset, stage_thumbnail, UploadedImage};
use chrono::NaiveDateTime;
use sea_orm::{entity::*, query::*, DatabaseConnection, PaginatorTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BlogPostInput {
    #[validate(length(min = 1, max = 255, message = "is required and at most 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 20000, message = "is required and at most 20000 characters"))]
    pub content: String,
}

impl BlogPostInput {
    fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            content: self.content.trim().to_string(),
        }
    }
}

/// A post as shown in the blog index, with the activity of its discussion.
#[derive(Debug, Clone, Serialize)]
pub struct BlogPostSummary {
    pub id: i32,
    pub title: String,
    pub thumbnail_image: Option<String>,
    pub created_at: NaiveDateTime,
    pub author_id: i32,
    pub dialogue_thread_id: Option<i32>,
    pub thread_score: Option<i32>,
    pub comment_count: u64,
}

pub async fn get_blog_post(db: &DatabaseConnection, post_id: i32) -> Result<blog_posts::Model, AgoraError> {
    blog_posts::Entity::find_by_id(post_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("Blog post"))
}

/// Posts newest first.
pub async fn list_blog_posts(db: &DatabaseConnection) -> Result<Vec<BlogPostSummary>, AgoraError> {
    let posts = blog_posts::Entity::find()
        .order_by_desc(blog_posts::Column::CreatedAt)
        .order_by_desc(blog_posts::Column::Id)
        .all(db)
        .await?;

    let mut summaries = Vec::with_capacity(posts.len());
    for post in posts {
        let thread = match post.dialogue_thread_id {
            Some(id) => dialogue_threads::Entity::find_by_id(id).one(db).await?,
            None => None,
        };
        let comment_count = match &thread {
            Some(thread) => {
                dialogue_comments::Entity::find()
                    .filter(dialogue_comments::Column::ThreadId.eq(thread.id))
                    .count(db)
                    .await? as u64
            }
            None => 0,
        };

        summaries.push(BlogPostSummary {
            id: post.id,
            title: post.title,
            thumbnail_image: post.thumbnail_image,
            created_at: post.created_at,
            author_id: post.author_id,
            dialogue_thread_id: thread.as_ref().map(|t| t.id),
            thread_score: thread.as_ref().map(|t| t.score),
            comment_count,
        });
    }
    Ok(summaries)
}

pub async fn create_blog_post(
    ctx: &AppContext,
    actor: &Identity,
    input: BlogPostInput,
    thumbnail: Option<UploadedImage>,
    now: NaiveDateTime,
) -> Result<blog_posts::Model, AgoraError> {
    actor.can(Capability::CreateBlogPost, None).require()?;
    let input = input.normalized();
    input.validate()?;

    let storage = ctx.storage.as_ref();
    let staged = stage_thumbnail(ctx, thumbnail, ModerationContext::BlogThumbnail).await?;
    or_discard(
        storage,
        staged.as_ref(),
        ctx.gate
            .check_text(&input.title, &input.content, ModerationContext::BlogPost),
    )
    .await?;

    let thumbnail_image = match &staged {
        Some(staged) => Some(promote(storage, staged, AssetArea::BlogThumbs).await?),
        None => None,
    };

    let inserted = blog_posts::ActiveModel {
        title: Set(input.title),
        content: Set(input.content),
        thumbnail_image: Set(thumbnail_image.clone()),
        created_at: Set(now),
        author_id: Set(actor.user_id),
        dialogue_thread_id: Set(None),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await;

    match inserted {
        Ok(post) => {
            log::info!("User {} created blog post {}", actor.user_id, post.id);
            Ok(post)
        }
        Err(e) => {
            if let Some(name) = &thumbnail_image {
                remove_asset(storage, AssetArea::BlogThumbs, name).await;
            }
            Err(e.into())
        }
    }
}

pub async fn edit_blog_post(
    ctx: &AppContext,
    actor: &Identity,
    post_id: i32,
    input: BlogPostInput,
    thumbnail: Option<UploadedImage>,
) -> Result<blog_posts::Model, AgoraError> {
    let post = get_blog_post(&ctx.db, post_id).await?;
    actor
        .can(Capability::EditBlogPost, Some(post.author_id))
        .require()?;
    let input = input.normalized();
    input.validate()?;

    let storage = ctx.storage.as_ref();
    let staged = stage_thumbnail(ctx, thumbnail, ModerationContext::BlogThumbnail).await?;
    or_discard(
        storage,
        staged.as_ref(),
        ctx.gate
            .check_text(&input.title, &input.content, ModerationContext::BlogPost),
    )
    .await?;

    let old_thumbnail = post.thumbnail_image.clone();
    let mut active: blog_posts::ActiveModel = post.into();
    active.title = Set(input.title);
    active.content = Set(input.content);

    let new_thumbnail = match &staged {
        Some(staged) => {
            let name = promote(storage, staged, AssetArea::BlogThumbs).await?;
            active.thumbnail_image = Set(Some(name.clone()));
            Some(name)
        }
        None => None,
    };

    match active.update(&ctx.db).await {
        Ok(post) => {
            if let (Some(_), Some(old)) = (&new_thumbnail, &old_thumbnail) {
                remove_asset(storage, AssetArea::BlogThumbs, old).await;
            }
            log::info!("User {} edited blog post {}", actor.user_id, post.id);
            Ok(post)
        }
        Err(e) => {
            if let Some(name) = &new_thumbnail {
                remove_asset(storage, AssetArea::BlogThumbs, name).await;
            }
            Err(e.into())
        }
    }
}

/// Deletes a post. Its discussion thread, if any, stays.
pub async fn delete_blog_post(ctx: &AppContext, actor: &Identity, post_id: i32) -> Result<(), AgoraError> {
    let post = get_blog_post(&ctx.db, post_id).await?;
    actor
        .can(Capability::DeleteBlogPost, Some(post.author_id))
        .require()?;

    blog_posts::Entity::delete_many()
        .filter(blog_posts::Column::Id.eq(post_id))
        .exec(&ctx.db)
        .await?;

    if let Some(name) = &post.thumbnail_image {
        remove_asset(ctx.storage.as_ref(), AssetArea::BlogThumbs, name).await;
    }
    log::info!("User {} deleted blog post {}", actor.user_id, post_id);
    Ok(())
}
