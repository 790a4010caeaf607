//! Error type shared by the service layer and the HTTP handlers.

use crate::moderation::Decision;
use crate::storage::StorageError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use sea_orm::DbErr;
use serde_json::json;

#[derive(Debug)]
pub enum AgoraError {
    /// Field-level input problems
    Validation(Vec<String>),
    /// No identity on the request
    Unauthenticated,
    /// Identity lacks the required role or ownership
    Permission(String),
    /// The moderation gate returned `review` or `block`
    ModerationRejected(Decision),
    /// Vote on a poll whose voting window has closed
    Expired,
    /// Same-direction repeat vote on a poll
    AlreadyVoted,
    /// Classifier failure or timeout
    ExternalService(String),
    /// Concurrent write lost twice
    Conflict,
    NotFound(&'static str),
    Database(DbErr),
    Storage(StorageError),
}

impl AgoraError {
    pub fn validation(message: impl Into<String>) -> Self {
        AgoraError::Validation(vec![message.into()])
    }

    pub fn permission(message: impl Into<String>) -> Self {
        AgoraError::Permission(message.into())
    }
}

impl std::fmt::Display for AgoraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgoraError::Validation(errors) => write!(f, "Invalid input: {}", errors.join("; ")),
            AgoraError::Unauthenticated => write!(f, "You must be logged in"),
            AgoraError::Permission(msg) => write!(f, "Permission denied: {}", msg),
            AgoraError::ModerationRejected(decision) => {
                write!(f, "Submission rejected: {}", decision.reasons.join("; "))
            }
            AgoraError::Expired => write!(f, "This poll has expired"),
            AgoraError::AlreadyVoted => write!(f, "You have already cast this vote"),
            AgoraError::ExternalService(msg) => write!(f, "Moderation service failed: {}", msg),
            AgoraError::Conflict => write!(f, "Concurrent update, please try again"),
            AgoraError::NotFound(what) => write!(f, "{} not found", what),
            AgoraError::Database(e) => write!(f, "Database error: {}", e),
            AgoraError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for AgoraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AgoraError::Database(e) => Some(e),
            AgoraError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DbErr> for AgoraError {
    fn from(e: DbErr) -> Self {
        AgoraError::Database(e)
    }
}

impl From<StorageError> for AgoraError {
    fn from(e: StorageError) -> Self {
        AgoraError::Storage(e)
    }
}

impl From<validator::ValidationErrors> for AgoraError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        messages.sort();
        AgoraError::Validation(messages)
    }
}

impl ResponseError for AgoraError {
    fn status_code(&self) -> StatusCode {
        match self {
            AgoraError::Validation(_) => StatusCode::BAD_REQUEST,
            AgoraError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AgoraError::Permission(_) => StatusCode::FORBIDDEN,
            AgoraError::ModerationRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AgoraError::Expired => StatusCode::FORBIDDEN,
            AgoraError::AlreadyVoted | AgoraError::Conflict => StatusCode::CONFLICT,
            AgoraError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AgoraError::NotFound(_) => StatusCode::NOT_FOUND,
            AgoraError::Database(_) | AgoraError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = match self {
            AgoraError::Validation(errors) => json!({ "error": "validation", "errors": errors }),
            AgoraError::ModerationRejected(decision) => json!({
                "error": "moderation",
                "action": decision.action,
                "severity": decision.severity,
                "reasons": decision.reasons,
            }),
            AgoraError::Database(_) | AgoraError::Storage(_) => {
                log::error!("{}", self);
                json!({ "error": "internal", "message": "Internal server error" })
            }
            other => json!({ "error": error_kind(other), "message": other.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}

fn error_kind(error: &AgoraError) -> &'static str {
    match error {
        AgoraError::Validation(_) => "validation",
        AgoraError::Unauthenticated => "unauthenticated",
        AgoraError::Permission(_) => "permission",
        AgoraError::ModerationRejected(_) => "moderation",
        AgoraError::Expired => "expired",
        AgoraError::AlreadyVoted => "already_voted",
        AgoraError::ExternalService(_) => "external_service",
        AgoraError::Conflict => "conflict",
        AgoraError::NotFound(_) => "not_found",
        AgoraError::Database(_) | AgoraError::Storage(_) => "internal",
    }
}
