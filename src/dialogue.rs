//! Dialogue threads and their comments

use crate::authorization::{Capability, Identity};
use crate::comment_tree::CommentTree;
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::moderation::ModerationContext;
use crate::orm::{
    blog_posts, dialogue_comment_votes, dialogue_comments, dialogue_thread_votes,
    dialogue_threads, opinion_polls,
};
use crate::storage::AssetArea;
use crate::upload::{or_discard, promote, remove_asset, stage_thumbnail, UploadedImage};
use chrono::NaiveDateTime;
use sea_orm::{entity::*, query::*, sea_query::Expr, DatabaseConnection, TransactionTrait};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ThreadInput {
    #[validate(length(min = 1, max = 255, message = "is required and at most 255 characters"))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub body: Option<String>,
}

impl ThreadInput {
    fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.body = self
            .body
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentInput {
    #[validate(length(min = 1, max = 20000, message = "is required and at most 20000 characters"))]
    pub body: String,
    pub parent_id: Option<i32>,
}

/// A thread together with all its comments.
#[derive(Debug)]
pub struct ThreadView {
    pub thread: dialogue_threads::Model,
    pub comments: CommentTree<dialogue_comments::Model>,
}

pub async fn get_thread(
    db: &DatabaseConnection,
    thread_id: i32,
) -> Result<dialogue_threads::Model, AgoraError> {
    dialogue_threads::Entity::find_by_id(thread_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("Thread"))
}

pub async fn get_comment(
    db: &DatabaseConnection,
    comment_id: i32,
) -> Result<dialogue_comments::Model, AgoraError> {
    dialogue_comments::Entity::find_by_id(comment_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("Comment"))
}

/// Threads ordered by score, newest first among equals.
pub async fn list_threads(
    db: &DatabaseConnection,
) -> Result<Vec<dialogue_threads::Model>, AgoraError> {
    Ok(dialogue_threads::Entity::find()
        .order_by_desc(dialogue_threads::Column::Score)
        .order_by_desc(dialogue_threads::Column::CreatedAt)
        .order_by_desc(dialogue_threads::Column::Id)
        .all(db)
        .await?)
}

pub async fn view_thread(db: &DatabaseConnection, thread_id: i32) -> Result<ThreadView, AgoraError> {
    let thread = get_thread(db, thread_id).await?;
    let comments = dialogue_comments::Entity::find()
        .filter(dialogue_comments::Column::ThreadId.eq(thread_id))
        .all(db)
        .await?;

    Ok(ThreadView {
        thread,
        comments: CommentTree::build(comments),
    })
}

pub async fn create_thread(
    ctx: &AppContext,
    actor: &Identity,
    input: ThreadInput,
    thumbnail: Option<UploadedImage>,
    now: NaiveDateTime,
) -> Result<dialogue_threads::Model, AgoraError> {
    actor.can(Capability::CreateThread, None).require()?;
    let input = input.normalized();
    input.validate()?;

    let storage = ctx.storage.as_ref();
    let staged = stage_thumbnail(ctx, thumbnail, ModerationContext::ImageUpload).await?;
    or_discard(
        storage,
        staged.as_ref(),
        ctx.gate.check_text(
            &input.title,
            input.body.as_deref().unwrap_or(""),
            ModerationContext::DialogueThread,
        ),
    )
    .await?;

    let thumbnail_image = match &staged {
        Some(staged) => Some(promote(storage, staged, AssetArea::DialogueThumbs).await?),
        None => None,
    };

    let inserted = dialogue_threads::ActiveModel {
        title: Set(input.title),
        body: Set(input.body),
        author_id: Set(actor.user_id),
        thumbnail_image: Set(thumbnail_image.clone()),
        created_at: Set(now),
        score: Set(0),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await;

    match inserted {
        Ok(thread) => {
            log::info!("User {} created thread {}", actor.user_id, thread.id);
            Ok(thread)
        }
        Err(e) => {
            if let Some(name) = &thumbnail_image {
                remove_asset(storage, AssetArea::DialogueThumbs, name).await;
            }
            Err(e.into())
        }
    }
}

/// Replaces title and body of a thread. A new thumbnail replaces the old one.
pub async fn edit_thread(
    ctx: &AppContext,
    actor: &Identity,
    thread_id: i32,
    input: ThreadInput,
    thumbnail: Option<UploadedImage>,
) -> Result<dialogue_threads::Model, AgoraError> {
    let thread = get_thread(&ctx.db, thread_id).await?;
    actor
        .can(Capability::EditThread, Some(thread.author_id))
        .require()?;
    let input = input.normalized();
    input.validate()?;

    let storage = ctx.storage.as_ref();
    let staged = stage_thumbnail(ctx, thumbnail, ModerationContext::ImageUpload).await?;
    or_discard(
        storage,
        staged.as_ref(),
        ctx.gate.check_text(
            &input.title,
            input.body.as_deref().unwrap_or(""),
            ModerationContext::DialogueThread,
        ),
    )
    .await?;

    let old_thumbnail = thread.thumbnail_image.clone();
    let mut active: dialogue_threads::ActiveModel = thread.into();
    active.title = Set(input.title);
    active.body = Set(input.body);

    let new_thumbnail = match &staged {
        Some(staged) => {
            let name = promote(storage, staged, AssetArea::DialogueThumbs).await?;
            active.thumbnail_image = Set(Some(name.clone()));
            Some(name)
        }
        None => None,
    };

    match active.update(&ctx.db).await {
        Ok(thread) => {
            if let (Some(_), Some(old)) = (&new_thumbnail, &old_thumbnail) {
                remove_asset(storage, AssetArea::DialogueThumbs, old).await;
            }
            log::info!("User {} edited thread {}", actor.user_id, thread.id);
            Ok(thread)
        }
        Err(e) => {
            if let Some(name) = &new_thumbnail {
                remove_asset(storage, AssetArea::DialogueThumbs, name).await;
            }
            Err(e.into())
        }
    }
}

/// Removes a thread with its comments and votes.
///
/// Blog posts and polls converted into this thread keep existing; their link
/// is cleared.
pub async fn delete_thread(ctx: &AppContext, actor: &Identity, thread_id: i32) -> Result<(), AgoraError> {
    let thread = get_thread(&ctx.db, thread_id).await?;
    actor
        .can(Capability::DeleteThread, Some(thread.author_id))
        .require()?;

    let txn = ctx.db.begin().await?;
    blog_posts::Entity::update_many()
        .col_expr(blog_posts::Column::DialogueThreadId, Expr::value(Option::<i32>::None))
        .filter(blog_posts::Column::DialogueThreadId.eq(thread_id))
        .exec(&txn)
        .await?;
    opinion_polls::Entity::update_many()
        .col_expr(opinion_polls::Column::DialogueThreadId, Expr::value(Option::<i32>::None))
        .filter(opinion_polls::Column::DialogueThreadId.eq(thread_id))
        .exec(&txn)
        .await?;
    dialogue_thread_votes::Entity::delete_many()
        .filter(dialogue_thread_votes::Column::ThreadId.eq(thread_id))
        .exec(&txn)
        .await?;

    let comment_ids: Vec<i32> = dialogue_comments::Entity::find()
        .filter(dialogue_comments::Column::ThreadId.eq(thread_id))
        .all(&txn)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect();
    if !comment_ids.is_empty() {
        dialogue_comment_votes::Entity::delete_many()
            .filter(dialogue_comment_votes::Column::CommentId.is_in(comment_ids.clone()))
            .exec(&txn)
            .await?;
        // Replies point at other comments of this thread.
        dialogue_comments::Entity::update_many()
            .col_expr(dialogue_comments::Column::ParentId, Expr::value(Option::<i32>::None))
            .filter(dialogue_comments::Column::ThreadId.eq(thread_id))
            .exec(&txn)
            .await?;
        dialogue_comments::Entity::delete_many()
            .filter(dialogue_comments::Column::ThreadId.eq(thread_id))
            .exec(&txn)
            .await?;
    }

    dialogue_threads::Entity::delete_many()
        .filter(dialogue_threads::Column::Id.eq(thread_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    if let Some(name) = &thread.thumbnail_image {
        remove_asset(ctx.storage.as_ref(), AssetArea::DialogueThumbs, name).await;
    }
    log::info!(
        "User {} deleted thread {} ({} comments)",
        actor.user_id,
        thread_id,
        comment_ids.len()
    );
    Ok(())
}

pub async fn create_comment(
    ctx: &AppContext,
    actor: &Identity,
    thread_id: i32,
    input: CommentInput,
    now: NaiveDateTime,
) -> Result<dialogue_comments::Model, AgoraError> {
    actor.can(Capability::CreateComment, None).require()?;
    let body = input.body.trim().to_string();
    let input = CommentInput { body, ..input };
    input.validate()?;

    let thread = get_thread(&ctx.db, thread_id).await?;
    if let Some(parent_id) = input.parent_id {
        let parent = dialogue_comments::Entity::find_by_id(parent_id)
            .one(&ctx.db)
            .await?;
        match parent {
            Some(parent) if parent.thread_id == thread.id => {}
            _ => {
                return Err(AgoraError::validation(
                    "parent_id: the parent comment does not belong to this thread",
                ))
            }
        }
    }

    ctx.gate
        .check_text("", &input.body, ModerationContext::DialogueComment)
        .await?;

    let comment = dialogue_comments::ActiveModel {
        body: Set(input.body),
        created_at: Set(now),
        score: Set(0),
        thread_id: Set(thread.id),
        author_id: Set(actor.user_id),
        parent_id: Set(input.parent_id),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await?;

    log::info!(
        "User {} commented {} on thread {}",
        actor.user_id,
        comment.id,
        thread.id
    );
    Ok(comment)
}

pub async fn edit_comment(
    ctx: &AppContext,
    actor: &Identity,
    comment_id: i32,
    body: &str,
) -> Result<dialogue_comments::Model, AgoraError> {
    let comment = get_comment(&ctx.db, comment_id).await?;
    actor
        .can(Capability::EditComment, Some(comment.author_id))
        .require()?;

    let input = CommentInput {
        body: body.trim().to_string(),
        parent_id: comment.parent_id,
    };
    input.validate()?;
    ctx.gate
        .check_text("", &input.body, ModerationContext::DialogueComment)
        .await?;

    let mut active: dialogue_comments::ActiveModel = comment.into();
    active.body = Set(input.body);
    Ok(active.update(&ctx.db).await?)
}

/// Deletes a comment and its votes. Direct replies become top level comments.
pub async fn delete_comment(ctx: &AppContext, actor: &Identity, comment_id: i32) -> Result<(), AgoraError> {
    let comment = get_comment(&ctx.db, comment_id).await?;
    actor
        .can(Capability::DeleteComment, Some(comment.author_id))
        .require()?;

    let txn = ctx.db.begin().await?;
    dialogue_comment_votes::Entity::delete_many()
        .filter(dialogue_comment_votes::Column::CommentId.eq(comment_id))
        .exec(&txn)
        .await?;
    let rerooted = dialogue_comments::Entity::update_many()
        .col_expr(dialogue_comments::Column::ParentId, Expr::value(Option::<i32>::None))
        .filter(dialogue_comments::Column::ParentId.eq(comment_id))
        .exec(&txn)
        .await?;
    let deleted = dialogue_comments::Entity::delete_many()
        .filter(dialogue_comments::Column::Id.eq(comment_id))
        .exec(&txn)
        .await?;
    if deleted.rows_affected == 0 {
        return Err(AgoraError::NotFound("Comment"));
    }
    txn.commit().await?;

    log::info!(
        "User {} deleted comment {} ({} replies re-rooted)",
        actor.user_id,
        comment_id,
        rerooted.rows_affected
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_input_normalized() {
        let input = ThreadInput {
            title: "  Hello  ".into(),
            body: Some("\n".into()),
        }
        .normalized();
        assert_eq!(input.title, "Hello");
        assert!(input.body.is_none());
        assert!(input.validate().is_ok());
    }

    #[test]
    fn test_thread_title_required() {
        let input = ThreadInput {
            title: "   ".into(),
            body: None,
        }
        .normalized();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_comment_body_required() {
        let input = CommentInput {
            body: String::new(),
            parent_id: None,
        };
        assert!(input.validate().is_err());
    }
}
