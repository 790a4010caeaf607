//! SeaORM entities, one module per table.

pub mod blog_posts;
pub mod dialogue_comment_votes;
pub mod dialogue_comments;
pub mod dialogue_thread_votes;
pub mod dialogue_threads;
pub mod opinion_poll_votes;
pub mod opinion_polls;
pub mod roles;
pub mod user_roles;
pub mod users;
pub mod word_filters;
