//! Promoting blog posts and polls into dialogue threads
//!
//! Conversion is one-way and idempotent: the source keeps a link to the
//! thread it produced and a second conversion returns that thread. The thread
//! insert and the link update commit together.

use crate::authorization::{Capability, Identity};
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::orm::{blog_posts, dialogue_threads, opinion_polls};
use crate::storage::{AssetArea, StorageBackend};
use chrono::NaiveDateTime;
use sea_orm::{entity::*, query::*, sea_query::Expr, TransactionTrait};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ConversionSource {
    BlogPost(i32),
    Poll(i32),
}

#[derive(Debug, Clone)]
pub struct Conversion {
    pub thread: dialogue_threads::Model,
    /// False when the source had already been converted
    pub created: bool,
}

/// What a source contributes to its thread.
struct SourceContent {
    author_id: i32,
    title: String,
    body: Option<String>,
    thumbnail: Option<String>,
    area: AssetArea,
    linked_thread: Option<i32>,
}

fn truncate_title(title: &str) -> String {
    title.chars().take(MAX_TITLE_CHARS).collect()
}

async fn load_source(ctx: &AppContext, source: ConversionSource) -> Result<SourceContent, AgoraError> {
    match source {
        ConversionSource::BlogPost(id) => {
            let post = blog_posts::Entity::find_by_id(id)
                .one(&ctx.db)
                .await?
                .ok_or(AgoraError::NotFound("Blog post"))?;
            Ok(SourceContent {
                author_id: post.author_id,
                title: post.title,
                body: Some(post.content),
                thumbnail: post.thumbnail_image,
                area: AssetArea::BlogThumbs,
                linked_thread: post.dialogue_thread_id,
            })
        }
        ConversionSource::Poll(id) => {
            let poll = opinion_polls::Entity::find_by_id(id)
                .one(&ctx.db)
                .await?
                .ok_or(AgoraError::NotFound("Poll"))?;
            Ok(SourceContent {
                author_id: poll.author_id,
                title: poll.question,
                body: poll.description,
                thumbnail: poll.thumbnail_image,
                area: AssetArea::PollThumbs,
                linked_thread: poll.dialogue_thread_id,
            })
        }
    }
}

/// Copies a source thumbnail into the dialogue area. Any failure means no thumbnail.
async fn copy_thumbnail(storage: &dyn StorageBackend, from: AssetArea, name: &str) -> Option<String> {
    match storage.exists(AssetArea::DialogueThumbs, name).await {
        Ok(true) => return Some(name.to_string()),
        Ok(false) => {}
        Err(e) => {
            log::warn!("Could not check thumbnail {}: {}", name, e);
            return None;
        }
    }

    match storage
        .copy_object(from, name, AssetArea::DialogueThumbs, name)
        .await
    {
        Ok(()) => Some(name.to_string()),
        Err(e) => {
            log::warn!(
                "Could not copy thumbnail {}/{} for conversion: {}",
                from.dir_name(),
                name,
                e
            );
            None
        }
    }
}

/// The thread a concurrent conversion linked to `source`.
async fn existing_conversion(
    ctx: &AppContext,
    source: ConversionSource,
) -> Result<Conversion, AgoraError> {
    let linked = load_source(ctx, source).await?.linked_thread;
    let thread = match linked {
        Some(thread_id) => dialogue_threads::Entity::find_by_id(thread_id)
            .one(&ctx.db)
            .await?,
        None => None,
    };
    match thread {
        Some(thread) => Ok(Conversion {
            thread,
            created: false,
        }),
        None => Err(AgoraError::Conflict),
    }
}

/// Turns a blog post or poll into a dialogue thread owned by `actor`.
pub async fn convert_to_thread(
    ctx: &AppContext,
    actor: &Identity,
    source: ConversionSource,
    now: NaiveDateTime,
) -> Result<Conversion, AgoraError> {
    let content = load_source(ctx, source).await?;
    let capability = match source {
        ConversionSource::BlogPost(_) => Capability::ConvertBlogPost,
        ConversionSource::Poll(_) => Capability::ConvertPoll,
    };
    actor.can(capability, Some(content.author_id)).require()?;

    if let Some(thread_id) = content.linked_thread {
        if let Some(thread) = dialogue_threads::Entity::find_by_id(thread_id)
            .one(&ctx.db)
            .await?
        {
            log::debug!("{:?} already converted to thread {}", source, thread.id);
            return Ok(Conversion {
                thread,
                created: false,
            });
        }
        log::warn!(
            "{:?} links to missing thread {}, converting again",
            source,
            thread_id
        );
    }

    let thumbnail = match &content.thumbnail {
        Some(name) => copy_thumbnail(ctx.storage.as_ref(), content.area, name).await,
        None => None,
    };

    let txn = ctx.db.begin().await?;
    let thread = dialogue_threads::ActiveModel {
        title: Set(truncate_title(&content.title)),
        body: Set(content.body),
        author_id: Set(actor.user_id),
        thumbnail_image: Set(thumbnail),
        created_at: Set(now),
        score: Set(0),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    // Only link if nobody else linked the source since it was read.
    let linked = match source {
        ConversionSource::BlogPost(id) => {
            let mut update = blog_posts::Entity::update_many()
                .col_expr(blog_posts::Column::DialogueThreadId, Expr::value(thread.id))
                .filter(blog_posts::Column::Id.eq(id));
            update = match content.linked_thread {
                Some(stale) => update.filter(blog_posts::Column::DialogueThreadId.eq(stale)),
                None => update.filter(blog_posts::Column::DialogueThreadId.is_null()),
            };
            update.exec(&txn).await?.rows_affected
        }
        ConversionSource::Poll(id) => {
            let mut update = opinion_polls::Entity::update_many()
                .col_expr(opinion_polls::Column::DialogueThreadId, Expr::value(thread.id))
                .filter(opinion_polls::Column::Id.eq(id));
            update = match content.linked_thread {
                Some(stale) => update.filter(opinion_polls::Column::DialogueThreadId.eq(stale)),
                None => update.filter(opinion_polls::Column::DialogueThreadId.is_null()),
            };
            update.exec(&txn).await?.rows_affected
        }
    };
    if linked == 0 {
        // Dropping the transaction discards the new thread.
        drop(txn);
        log::warn!("{:?} was converted concurrently", source);
        return existing_conversion(ctx, source).await;
    }
    txn.commit().await?;

    log::info!(
        "User {} converted {:?} into thread {}",
        actor.user_id,
        source,
        thread.id
    );
    Ok(Conversion {
        thread,
        created: true,
    })
}
