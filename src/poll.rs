//! Opinion poll lifecycle
//!
//! A poll is open while `now < expires_at`. Expiry is evaluated lazily
//! whenever a poll is read or voted on; nothing sweeps polls in the
//! background. Every function takes `now` explicitly.

use crate::authorization::{Capability, Identity};
use crate::context::AppContext;
use crate::error::AgoraError;
use crate::moderation::ModerationContext;
use crate::orm::{opinion_poll_votes, opinion_polls};
use crate::storage::AssetArea;
use crate::upload::{or_discard, promote, remove_asset, stage_thumbnail, UploadedImage};
use chrono::{Duration, NaiveDateTime};
use sea_orm::{entity::*, query::*, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const MIN_DURATION_SECONDS: i64 = 10;
pub const MAX_DURATION_SECONDS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_DURATION_SECONDS: i64 = 3 * 24 * 60 * 60;

/// Clamps a requested voting window to the allowed range.
pub fn clamp_duration(seconds: i64) -> i64 {
    seconds.clamp(MIN_DURATION_SECONDS, MAX_DURATION_SECONDS)
}

/// True once `now` is past the poll's expiry.
pub fn is_expired(poll: &opinion_polls::Model, now: NaiveDateTime) -> bool {
    now > poll.expires_at
}

/// True while the poll still takes votes. The expiry instant itself is closed.
pub fn accepts_votes(poll: &opinion_polls::Model, now: NaiveDateTime) -> bool {
    now < poll.expires_at
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum PollStatus {
    Open { remaining_seconds: i64 },
    Expired,
}

pub fn status(poll: &opinion_polls::Model, now: NaiveDateTime) -> PollStatus {
    if accepts_votes(poll, now) {
        PollStatus::Open {
            remaining_seconds: (poll.expires_at - now).num_seconds(),
        }
    } else {
        PollStatus::Expired
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PollInput {
    #[validate(length(min = 1, max = 255, message = "is required and at most 255 characters"))]
    pub question: String,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
    /// Voting window; defaults to three days
    pub duration_seconds: Option<i64>,
}

impl PollInput {
    fn normalized(mut self) -> Self {
        self.question = self.question.trim().to_string();
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }
}

pub async fn get_poll(db: &DatabaseConnection, poll_id: i32) -> Result<opinion_polls::Model, AgoraError> {
    opinion_polls::Entity::find_by_id(poll_id)
        .one(db)
        .await?
        .ok_or(AgoraError::NotFound("Poll"))
}

/// Polls newest first.
pub async fn list_polls(db: &DatabaseConnection) -> Result<Vec<opinion_polls::Model>, AgoraError> {
    Ok(opinion_polls::Entity::find()
        .order_by_desc(opinion_polls::Column::CreatedAt)
        .order_by_desc(opinion_polls::Column::Id)
        .all(db)
        .await?)
}

/// Creates a poll after moderating its question, description and thumbnail.
pub async fn create_poll(
    ctx: &AppContext,
    actor: &Identity,
    input: PollInput,
    thumbnail: Option<UploadedImage>,
    now: NaiveDateTime,
) -> Result<opinion_polls::Model, AgoraError> {
    actor.can(Capability::CreatePoll, None).require()?;
    let input = input.normalized();
    input.validate()?;

    let duration = clamp_duration(
        input
            .duration_seconds
            .unwrap_or_else(|| crate::app_config::polls().default_duration_seconds),
    );

    let storage = ctx.storage.as_ref();
    let staged = stage_thumbnail(ctx, thumbnail, ModerationContext::ImageUpload).await?;
    or_discard(
        storage,
        staged.as_ref(),
        ctx.gate.check_text(
            &input.question,
            input.description.as_deref().unwrap_or(""),
            ModerationContext::OpinionPoll,
        ),
    )
    .await?;

    let thumbnail_image = match &staged {
        Some(staged) => Some(promote(storage, staged, AssetArea::PollThumbs).await?),
        None => None,
    };

    let inserted = opinion_polls::ActiveModel {
        question: Set(input.question),
        description: Set(input.description),
        author_id: Set(actor.user_id),
        thumbnail_image: Set(thumbnail_image.clone()),
        created_at: Set(now),
        expires_at: Set(now + Duration::seconds(duration)),
        yes_count: Set(0),
        no_count: Set(0),
        score: Set(0),
        dialogue_thread_id: Set(None),
        ..Default::default()
    }
    .insert(&ctx.db)
    .await;

    match inserted {
        Ok(poll) => {
            log::info!("User {} created poll {}", actor.user_id, poll.id);
            Ok(poll)
        }
        Err(e) => {
            if let Some(name) = &thumbnail_image {
                remove_asset(storage, AssetArea::PollThumbs, name).await;
            }
            Err(e.into())
        }
    }
}

/// Restarts the voting window at `now` for `duration_seconds` (clamped).
///
/// Remaining time is discarded, not added to.
pub async fn extend_or_shorten(
    db: &DatabaseConnection,
    actor: &Identity,
    poll_id: i32,
    duration_seconds: i64,
    now: NaiveDateTime,
) -> Result<opinion_polls::Model, AgoraError> {
    let poll = get_poll(db, poll_id).await?;
    actor
        .can(Capability::ExtendPoll, Some(poll.author_id))
        .require()?;

    let duration = clamp_duration(duration_seconds);
    let mut active: opinion_polls::ActiveModel = poll.into();
    active.expires_at = Set(now + Duration::seconds(duration));
    let poll = active.update(db).await?;

    log::info!(
        "User {} set poll {} to expire at {} ({}s)",
        actor.user_id,
        poll.id,
        poll.expires_at,
        duration
    );
    Ok(poll)
}

/// Deletes a poll and its votes. A linked thread stays.
pub async fn delete_poll(ctx: &AppContext, actor: &Identity, poll_id: i32) -> Result<(), AgoraError> {
    let poll = get_poll(&ctx.db, poll_id).await?;
    actor
        .can(Capability::DeletePoll, Some(poll.author_id))
        .require()?;

    let txn = ctx.db.begin().await?;
    opinion_poll_votes::Entity::delete_many()
        .filter(opinion_poll_votes::Column::PollId.eq(poll_id))
        .exec(&txn)
        .await?;
    opinion_polls::Entity::delete_many()
        .filter(opinion_polls::Column::Id.eq(poll_id))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    if let Some(name) = &poll.thumbnail_image {
        remove_asset(ctx.storage.as_ref(), AssetArea::PollThumbs, name).await;
    }
    log::info!("User {} deleted poll {}", actor.user_id, poll_id);
    Ok(())
}
