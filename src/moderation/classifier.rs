//! Classifier abstraction
//!
//! A classifier returns a raw [`Decision`]; the gate applies policy floors
//! afterwards, so implementations only need to report what they see.

use super::{Decision, ModerationContext};
use actix_web::web::Bytes;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Normalized, truncated text submitted for classification.
#[derive(Debug, Clone)]
pub struct TextSample {
    pub context: ModerationContext,
    pub title: String,
    pub body: String,
}

/// Image bytes submitted for classification.
#[derive(Debug, Clone)]
pub struct ImageSample {
    pub context: ModerationContext,
    pub mime: String,
    pub bytes: Bytes,
}

/// Classifier call errors.
#[derive(Debug)]
pub enum ClassifierError {
    /// Missing API key or unknown backend
    NotConfigured(String),
    /// Network failure or timeout
    Transport(String),
    /// Non-success HTTP status
    Status(u16, String),
    /// The service answered with something that is not a verdict
    InvalidResponse(String),
}

impl std::fmt::Display for ClassifierError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassifierError::NotConfigured(msg) => write!(f, "classifier not configured: {}", msg),
            ClassifierError::Transport(msg) => write!(f, "classifier unreachable: {}", msg),
            ClassifierError::Status(code, msg) => {
                write!(f, "classifier returned HTTP {}: {}", code, msg)
            }
            ClassifierError::InvalidResponse(msg) => {
                write!(f, "classifier returned an invalid verdict: {}", msg)
            }
        }
    }
}

impl std::error::Error for ClassifierError {}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn classify_text(&self, sample: TextSample) -> Result<Decision, ClassifierError>;

    async fn classify_image(&self, sample: ImageSample) -> Result<Decision, ClassifierError>;
}

enum StaticMode {
    Verdict {
        text: Decision,
        image: Decision,
    },
    Fail(String),
}

/// Classifier with a fixed answer.
///
/// Used in tests and for local development without network access. Counts
/// its calls so callers can assert that nothing was cached.
pub struct StaticClassifier {
    mode: StaticMode,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    /// Answers every request with `verdict`.
    pub fn new(verdict: Decision) -> Self {
        Self {
            mode: StaticMode::Verdict {
                text: verdict.clone(),
                image: verdict,
            },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers text and image requests differently.
    pub fn with_image_verdict(text: Decision, image: Decision) -> Self {
        Self {
            mode: StaticMode::Verdict { text, image },
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers every request with `allow`.
    pub fn allow_all() -> Self {
        Self::new(Decision::allow())
    }

    /// Fails every request as if the service were down.
    pub fn failing(message: &str) -> Self {
        Self {
            mode: StaticMode::Fail(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Waits `delay` before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, is_image: bool) -> Result<Decision, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            actix_web::rt::time::sleep(delay).await;
        }
        match &self.mode {
            StaticMode::Verdict { text, .. } if !is_image => Ok(text.clone()),
            StaticMode::Verdict { image, .. } => Ok(image.clone()),
            StaticMode::Fail(msg) => Err(ClassifierError::Transport(msg.clone())),
        }
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn classify_text(&self, _sample: TextSample) -> Result<Decision, ClassifierError> {
        self.answer(false).await
    }

    async fn classify_image(&self, _sample: ImageSample) -> Result<Decision, ClassifierError> {
        self.answer(true).await
    }
}
