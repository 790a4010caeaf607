//! Vote ledger for threads, comments and polls
//!
//! One vote per (user, target), enforced by a unique index. Each cast locks
//! the target row before reading the caller's vote, and aggregates only
//! change through relative single-statement updates inside that transaction.
//! A cast that trips the unique index, or finds its vote changed underneath
//! it, is retried once and then reported as [`AgoraError::Conflict`].
//!
//! Repeating the same direction behaves differently per target kind:
//! threads and comments retract the vote, polls reject the repeat.

use crate::db::is_write_conflict;
use crate::error::AgoraError;
use crate::orm::{
    dialogue_comment_votes, dialogue_comments, dialogue_thread_votes, dialogue_threads,
    opinion_poll_votes, opinion_polls,
};
use crate::poll::accepts_votes;
use chrono::NaiveDateTime;
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    /// Upvote, or "yes" on a poll
    Up,
    /// Downvote, or "no" on a poll
    Down,
}

impl VoteDirection {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "up" | "yes" | "1" | "+1" => Some(VoteDirection::Up),
            "down" | "no" | "-1" => Some(VoteDirection::Down),
            _ => None,
        }
    }

    pub fn value(&self) -> i32 {
        match self {
            VoteDirection::Up => 1,
            VoteDirection::Down => -1,
        }
    }
}

/// What to do when a user repeats their current vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatPolicy {
    /// The repeat removes the vote (toggle off)
    Retract,
    /// The repeat is refused and nothing changes
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum VoteTarget {
    Thread(i32),
    Comment(i32),
    Poll(i32),
}

impl VoteTarget {
    pub fn repeat_policy(&self) -> RepeatPolicy {
        match self {
            VoteTarget::Thread(_) | VoteTarget::Comment(_) => RepeatPolicy::Retract,
            VoteTarget::Poll(_) => RepeatPolicy::Reject,
        }
    }
}

/// Change to a user's vote row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    Insert,
    Retract,
    Flip,
    Rejected,
}

/// Decides how a cast of `value` changes the caller's existing vote.
pub fn transition(existing: Option<i32>, value: i32, policy: RepeatPolicy) -> VoteTransition {
    match existing {
        None => VoteTransition::Insert,
        Some(current) if current == value => match policy {
            RepeatPolicy::Retract => VoteTransition::Retract,
            RepeatPolicy::Reject => VoteTransition::Rejected,
        },
        Some(_) => VoteTransition::Flip,
    }
}

impl VoteTransition {
    /// Change of the summed score caused by casting `value`.
    pub fn score_delta(&self, value: i32) -> i32 {
        match self {
            VoteTransition::Insert => value,
            VoteTransition::Retract => -value,
            VoteTransition::Flip => 2 * value,
            VoteTransition::Rejected => 0,
        }
    }

    /// Change of `(yes_count, no_count)` caused by casting `value`.
    pub fn yes_no_delta(&self, value: i32) -> (i32, i32) {
        let yes = value > 0;
        match (self, yes) {
            (VoteTransition::Insert, true) => (1, 0),
            (VoteTransition::Insert, false) => (0, 1),
            (VoteTransition::Retract, true) => (-1, 0),
            (VoteTransition::Retract, false) => (0, -1),
            (VoteTransition::Flip, true) => (1, -1),
            (VoteTransition::Flip, false) => (-1, 1),
            (VoteTransition::Rejected, _) => (0, 0),
        }
    }

    /// The caller's vote after the transition.
    pub fn live_vote(&self, existing: Option<i32>, value: i32) -> Option<i32> {
        match self {
            VoteTransition::Insert | VoteTransition::Flip => Some(value),
            VoteTransition::Retract => None,
            VoteTransition::Rejected => existing,
        }
    }
}

/// Aggregate of a target after a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub target: VoteTarget,
    pub score: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yes_count: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_count: Option<i32>,
    /// The caller's live vote, if any
    pub user_vote: Option<i32>,
}

/// Records `direction` from `user_id` on `target` and returns the new aggregate.
pub async fn cast_vote(
    db: &DatabaseConnection,
    user_id: i32,
    target: VoteTarget,
    direction: VoteDirection,
    now: NaiveDateTime,
) -> Result<VoteOutcome, AgoraError> {
    let what = format!("vote by user {} on {:?}", user_id, target);
    retry_once(&what, || try_cast(db, user_id, target, direction, now)).await
}

/// Errors after which a fresh attempt may succeed.
fn is_retryable(err: &AgoraError) -> bool {
    match err {
        AgoraError::Conflict => true,
        AgoraError::Database(e) => is_write_conflict(e),
        _ => false,
    }
}

/// Runs `attempt`, and once more if it hit a write conflict.
///
/// A second conflict is reported as [`AgoraError::Conflict`].
pub async fn retry_once<T, F, Fut>(what: &str, mut attempt: F) -> Result<T, AgoraError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AgoraError>>,
{
    match attempt().await {
        Err(e) if is_retryable(&e) => {
            log::warn!("{} conflicted, retrying: {}", what, e);
            match attempt().await {
                Err(e) if is_retryable(&e) => {
                    log::error!("{} conflicted twice: {}", what, e);
                    Err(AgoraError::Conflict)
                }
                other => other,
            }
        }
        other => other,
    }
}

async fn try_cast(
    db: &DatabaseConnection,
    user_id: i32,
    target: VoteTarget,
    direction: VoteDirection,
    now: NaiveDateTime,
) -> Result<VoteOutcome, AgoraError> {
    let txn = db.begin().await?;
    let outcome = match target {
        VoteTarget::Thread(id) => cast_thread(&txn, user_id, id, direction).await?,
        VoteTarget::Comment(id) => cast_comment(&txn, user_id, id, direction).await?,
        VoteTarget::Poll(id) => cast_poll(&txn, user_id, id, direction, now).await?,
    };
    txn.commit().await?;

    log::debug!(
        "User {} voted {:?} on {:?}: score now {}",
        user_id,
        direction,
        target,
        outcome.score
    );
    Ok(outcome)
}

/// Fails with `Conflict` when a conditional vote statement matched nothing,
/// meaning another cast changed the vote after it was read.
fn expect_one_row(rows_affected: u64) -> Result<(), AgoraError> {
    if rows_affected == 0 {
        Err(AgoraError::Conflict)
    } else {
        Ok(())
    }
}

/// Generates the cast for a target with a plain summed `score`.
///
/// The target row is locked with a no-op update before the caller's vote is
/// read, so casts on one target run one after another. Retract and flip only
/// touch the vote row if it still holds the value that was read.
macro_rules! scored_cast {
    ($name:ident, $kind:ident, $label:literal, $target:ident, $votes:ident, $fk_col:ident, $fk:ident) => {
        async fn $name(
            txn: &DatabaseTransaction,
            user_id: i32,
            target_id: i32,
            direction: VoteDirection,
        ) -> Result<VoteOutcome, AgoraError> {
            let target = VoteTarget::$kind(target_id);
            let value = direction.value();

            let locked = $target::Entity::update_many()
                .col_expr(
                    $target::Column::Score,
                    Expr::col($target::Column::Score).add(0),
                )
                .filter($target::Column::Id.eq(target_id))
                .exec(txn)
                .await?;
            if locked.rows_affected == 0 {
                return Err(AgoraError::NotFound($label));
            }

            let existing = $votes::Entity::find()
                .filter($votes::Column::UserId.eq(user_id))
                .filter($votes::Column::$fk_col.eq(target_id))
                .one(txn)
                .await?;
            let existing_value = existing.as_ref().map(|v| v.value);
            let step = transition(existing_value, value, target.repeat_policy());

            match (step, existing) {
                (VoteTransition::Insert, _) => {
                    $votes::Entity::insert($votes::ActiveModel {
                        user_id: Set(user_id),
                        $fk: Set(target_id),
                        value: Set(value),
                        ..Default::default()
                    })
                    .exec(txn)
                    .await?;
                }
                (VoteTransition::Retract, Some(vote)) => {
                    let deleted = $votes::Entity::delete_many()
                        .filter($votes::Column::Id.eq(vote.id))
                        .filter($votes::Column::Value.eq(vote.value))
                        .exec(txn)
                        .await?;
                    expect_one_row(deleted.rows_affected)?;
                }
                (VoteTransition::Flip, Some(vote)) => {
                    let flipped = $votes::Entity::update_many()
                        .col_expr($votes::Column::Value, Expr::value(value))
                        .filter($votes::Column::Id.eq(vote.id))
                        .filter($votes::Column::Value.eq(vote.value))
                        .exec(txn)
                        .await?;
                    expect_one_row(flipped.rows_affected)?;
                }
                _ => {}
            }

            let delta = step.score_delta(value);
            if delta != 0 {
                $target::Entity::update_many()
                    .col_expr(
                        $target::Column::Score,
                        Expr::col($target::Column::Score).add(delta),
                    )
                    .filter($target::Column::Id.eq(target_id))
                    .exec(txn)
                    .await?;
            }

            let row = $target::Entity::find_by_id(target_id)
                .one(txn)
                .await?
                .ok_or(AgoraError::NotFound($label))?;

            Ok(VoteOutcome {
                target,
                score: row.score,
                yes_count: None,
                no_count: None,
                user_vote: step.live_vote(existing_value, value),
            })
        }
    };
}

scored_cast!(cast_thread, Thread, "Thread", dialogue_threads, dialogue_thread_votes, ThreadId, thread_id);
scored_cast!(cast_comment, Comment, "Comment", dialogue_comments, dialogue_comment_votes, CommentId, comment_id);

async fn cast_poll(
    txn: &DatabaseTransaction,
    user_id: i32,
    poll_id: i32,
    direction: VoteDirection,
    now: NaiveDateTime,
) -> Result<VoteOutcome, AgoraError> {
    let target = VoteTarget::Poll(poll_id);
    let value = direction.value();

    // Row lock, as in `scored_cast!`.
    let locked = opinion_polls::Entity::update_many()
        .col_expr(
            opinion_polls::Column::YesCount,
            Expr::col(opinion_polls::Column::YesCount).add(0),
        )
        .filter(opinion_polls::Column::Id.eq(poll_id))
        .exec(txn)
        .await?;
    if locked.rows_affected == 0 {
        return Err(AgoraError::NotFound("Poll"));
    }
    let poll = opinion_polls::Entity::find_by_id(poll_id)
        .one(txn)
        .await?
        .ok_or(AgoraError::NotFound("Poll"))?;
    if !accepts_votes(&poll, now) {
        return Err(AgoraError::Expired);
    }

    let existing = opinion_poll_votes::Entity::find()
        .filter(opinion_poll_votes::Column::UserId.eq(user_id))
        .filter(opinion_poll_votes::Column::PollId.eq(poll_id))
        .one(txn)
        .await?;
    let existing_value = existing.as_ref().map(|v| v.value);
    let step = transition(existing_value, value, target.repeat_policy());

    match (step, existing) {
        (VoteTransition::Rejected, _) => return Err(AgoraError::AlreadyVoted),
        (VoteTransition::Insert, _) => {
            opinion_poll_votes::Entity::insert(opinion_poll_votes::ActiveModel {
                user_id: Set(user_id),
                poll_id: Set(poll_id),
                value: Set(value),
                created_at: Set(now),
                ..Default::default()
            })
            .exec(txn)
            .await?;
        }
        (VoteTransition::Retract, Some(vote)) => {
            let deleted = opinion_poll_votes::Entity::delete_many()
                .filter(opinion_poll_votes::Column::Id.eq(vote.id))
                .filter(opinion_poll_votes::Column::Value.eq(vote.value))
                .exec(txn)
                .await?;
            expect_one_row(deleted.rows_affected)?;
        }
        (VoteTransition::Flip, Some(vote)) => {
            let flipped = opinion_poll_votes::Entity::update_many()
                .col_expr(opinion_poll_votes::Column::Value, Expr::value(value))
                .col_expr(opinion_poll_votes::Column::CreatedAt, Expr::value(now))
                .filter(opinion_poll_votes::Column::Id.eq(vote.id))
                .filter(opinion_poll_votes::Column::Value.eq(vote.value))
                .exec(txn)
                .await?;
            expect_one_row(flipped.rows_affected)?;
        }
        _ => {}
    }

    let (yes_delta, no_delta) = step.yes_no_delta(value);
    opinion_polls::Entity::update_many()
        .col_expr(
            opinion_polls::Column::YesCount,
            Expr::col(opinion_polls::Column::YesCount).add(yes_delta),
        )
        .col_expr(
            opinion_polls::Column::NoCount,
            Expr::col(opinion_polls::Column::NoCount).add(no_delta),
        )
        .filter(opinion_polls::Column::Id.eq(poll_id))
        .exec(txn)
        .await?;
    // Separate statement so the score reads the counters just written.
    opinion_polls::Entity::update_many()
        .col_expr(
            opinion_polls::Column::Score,
            Expr::cust("yes_count - no_count"),
        )
        .filter(opinion_polls::Column::Id.eq(poll_id))
        .exec(txn)
        .await?;

    let poll = opinion_polls::Entity::find_by_id(poll_id)
        .one(txn)
        .await?
        .ok_or(AgoraError::NotFound("Poll"))?;

    Ok(VoteOutcome {
        target,
        score: poll.score,
        yes_count: Some(poll.yes_count),
        no_count: Some(poll.no_count),
        user_vote: step.live_vote(existing_value, value),
    })
}

/// Recomputes a target's aggregate from its live votes and stores it.
///
/// Used to audit or repair drift; normal casts never need it.
pub async fn recount(db: &DatabaseConnection, target: VoteTarget) -> Result<VoteOutcome, AgoraError> {
    let txn = db.begin().await?;

    let outcome = match target {
        VoteTarget::Thread(id) => {
            let mut thread: dialogue_threads::ActiveModel = dialogue_threads::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or(AgoraError::NotFound("Thread"))?
                .into();
            let score: i32 = dialogue_thread_votes::Entity::find()
                .filter(dialogue_thread_votes::Column::ThreadId.eq(id))
                .all(&txn)
                .await?
                .iter()
                .map(|v| v.value)
                .sum();
            thread.score = Set(score);
            thread.update(&txn).await?;
            VoteOutcome {
                target,
                score,
                yes_count: None,
                no_count: None,
                user_vote: None,
            }
        }
        VoteTarget::Comment(id) => {
            let mut comment: dialogue_comments::ActiveModel =
                dialogue_comments::Entity::find_by_id(id)
                    .one(&txn)
                    .await?
                    .ok_or(AgoraError::NotFound("Comment"))?
                    .into();
            let score: i32 = dialogue_comment_votes::Entity::find()
                .filter(dialogue_comment_votes::Column::CommentId.eq(id))
                .all(&txn)
                .await?
                .iter()
                .map(|v| v.value)
                .sum();
            comment.score = Set(score);
            comment.update(&txn).await?;
            VoteOutcome {
                target,
                score,
                yes_count: None,
                no_count: None,
                user_vote: None,
            }
        }
        VoteTarget::Poll(id) => {
            let mut poll: opinion_polls::ActiveModel = opinion_polls::Entity::find_by_id(id)
                .one(&txn)
                .await?
                .ok_or(AgoraError::NotFound("Poll"))?
                .into();
            let votes = opinion_poll_votes::Entity::find()
                .filter(opinion_poll_votes::Column::PollId.eq(id))
                .all(&txn)
                .await?;
            let yes = votes.iter().filter(|v| v.value > 0).count() as i32;
            let no = votes.iter().filter(|v| v.value < 0).count() as i32;
            poll.yes_count = Set(yes);
            poll.no_count = Set(no);
            poll.score = Set(yes - no);
            poll.update(&txn).await?;
            VoteOutcome {
                target,
                score: yes - no,
                yes_count: Some(yes),
                no_count: Some(no),
                user_vote: None,
            }
        }
    };

    txn.commit().await?;
    log::info!("Recounted {:?}: score {}", target, outcome.score);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direction() {
        assert_eq!(VoteDirection::parse("up"), Some(VoteDirection::Up));
        assert_eq!(VoteDirection::parse("YES"), Some(VoteDirection::Up));
        assert_eq!(VoteDirection::parse("no"), Some(VoteDirection::Down));
        assert_eq!(VoteDirection::parse("-1"), Some(VoteDirection::Down));
        assert_eq!(VoteDirection::parse("sideways"), None);
    }

    #[test]
    fn test_transitions() {
        use VoteTransition::*;
        assert_eq!(transition(None, 1, RepeatPolicy::Retract), Insert);
        assert_eq!(transition(Some(1), 1, RepeatPolicy::Retract), Retract);
        assert_eq!(transition(Some(1), 1, RepeatPolicy::Reject), Rejected);
        assert_eq!(transition(Some(-1), 1, RepeatPolicy::Retract), Flip);
        assert_eq!(transition(Some(-1), 1, RepeatPolicy::Reject), Flip);
    }

    #[test]
    fn test_score_deltas() {
        assert_eq!(VoteTransition::Insert.score_delta(-1), -1);
        assert_eq!(VoteTransition::Retract.score_delta(1), -1);
        assert_eq!(VoteTransition::Flip.score_delta(1), 2);
        assert_eq!(VoteTransition::Flip.score_delta(-1), -2);
        assert_eq!(VoteTransition::Rejected.score_delta(1), 0);
    }

    #[test]
    fn test_yes_no_deltas_keep_score_consistent() {
        for step in [
            VoteTransition::Insert,
            VoteTransition::Retract,
            VoteTransition::Flip,
            VoteTransition::Rejected,
        ] {
            for value in [1, -1] {
                let (yes, no) = step.yes_no_delta(value);
                assert_eq!(yes - no, step.score_delta(value), "{:?} {}", step, value);
            }
        }
    }

    #[test]
    fn test_live_vote() {
        assert_eq!(VoteTransition::Insert.live_vote(None, 1), Some(1));
        assert_eq!(VoteTransition::Retract.live_vote(Some(1), 1), None);
        assert_eq!(VoteTransition::Flip.live_vote(Some(-1), 1), Some(1));
        assert_eq!(VoteTransition::Rejected.live_vote(Some(1), 1), Some(1));
    }

    #[actix_rt::test]
    async fn test_retry_once_recovers_from_one_conflict() {
        let attempts = std::cell::Cell::new(0);
        let result = retry_once("test cast", || {
            attempts.set(attempts.get() + 1);
            let n = attempts.get();
            async move {
                if n == 1 {
                    Err(AgoraError::Conflict)
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[actix_rt::test]
    async fn test_retry_once_gives_up_after_second_conflict() {
        let attempts = std::cell::Cell::new(0);
        let result: Result<(), _> = retry_once("test cast", || {
            attempts.set(attempts.get() + 1);
            async { Err(AgoraError::Conflict) }
        })
        .await;
        assert!(matches!(result, Err(AgoraError::Conflict)));
        assert_eq!(attempts.get(), 2);
    }

    #[actix_rt::test]
    async fn test_retry_once_passes_other_errors_through() {
        let attempts = std::cell::Cell::new(0);
        let result: Result<(), _> = retry_once("test cast", || {
            attempts.set(attempts.get() + 1);
            async { Err(AgoraError::Expired) }
        })
        .await;
        assert!(matches!(result, Err(AgoraError::Expired)));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_repeat_policies() {
        assert_eq!(VoteTarget::Thread(1).repeat_policy(), RepeatPolicy::Retract);
        assert_eq!(VoteTarget::Comment(1).repeat_policy(), RepeatPolicy::Retract);
        assert_eq!(VoteTarget::Poll(1).repeat_policy(), RepeatPolicy::Reject);
    }
}
