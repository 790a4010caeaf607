//! Agora: blogs, dialogue threads and opinion polls behind a moderation gate.

extern crate dotenv;

pub mod app_config;
pub mod authorization;
pub mod blog;
pub mod comment_tree;
pub mod context;
pub mod conversion;
pub mod db;
pub mod dialogue;
pub mod error;
pub mod middleware;
pub mod moderation;
pub mod orm;
pub mod poll;
pub mod storage;
pub mod upload;
pub mod user;
pub mod vote;
pub mod web;
pub mod word_filter;

pub use context::AppContext;
pub use error::AgoraError;
