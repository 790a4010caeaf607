use super::classifier::{Classifier, ClassifierError, ImageSample, StaticClassifier, TextSample};
use super::evidence::scan_urls;
use super::normalize::{normalize_text, truncate_chars};
use super::openai::OpenAiClassifier;
use super::rules::{apply_image_floors, apply_text_floors};
use super::{Decision, Evidence, ModerationContext};
use crate::app_config::ModerationConfig;
use crate::error::AgoraError;
use crate::word_filter::WordFilter;
use actix_web::web::Bytes;
use arc_swap::ArcSwap;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// Builds the classifier named by `moderation.backend`.
pub fn classifier_from_config(
    config: &ModerationConfig,
) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match config.backend.as_str() {
        "openai" => Ok(Arc::new(OpenAiClassifier::from_config(config)?)),
        "static" => {
            log::warn!("Moderation uses the static classifier: every submission is allowed by the classifier, only local rules apply");
            Ok(Arc::new(StaticClassifier::allow_all()))
        }
        other => Err(ClassifierError::NotConfigured(format!(
            "unknown moderation backend {:?}",
            other
        ))),
    }
}

/// The moderation gate shared by all request handlers.
pub struct ModerationGate {
    classifier: Arc<dyn Classifier>,
    filters: ArcSwap<WordFilter>,
    timeout: Duration,
    max_title_chars: usize,
    max_body_chars: usize,
}

impl ModerationGate {
    pub fn new(classifier: Arc<dyn Classifier>, config: &ModerationConfig) -> Self {
        Self {
            classifier,
            filters: ArcSwap::from_pointee(WordFilter::from_terms(config.profanity_terms.as_slice())),
            timeout: Duration::from_secs(config.timeout_seconds),
            max_title_chars: config.max_title_chars,
            max_body_chars: config.max_body_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replaces the active word filters. In-flight checks keep the old set.
    pub fn replace_filters(&self, filters: WordFilter) {
        self.filters.store(Arc::new(filters));
    }

    /// Reloads word filters from the database. Returns the number loaded.
    pub async fn reload_filters<S: AsRef<str>>(
        &self,
        db: &DatabaseConnection,
        extra_terms: &[S],
    ) -> Result<usize, sea_orm::DbErr> {
        let filters = WordFilter::load(db, extra_terms).await?;
        let count = filters.len();
        self.replace_filters(filters);
        Ok(count)
    }

    /// Evidence the gate finds on its own, without the classifier.
    fn local_evidence(&self, normalized: &str, original: &str) -> Evidence {
        let matches = self.filters.load().scan(normalized);
        let mut evidence = Evidence {
            profanity_terms: matches.profanity_terms,
            suspicious_phrases: matches.suspicious_phrases,
            ..Default::default()
        };
        evidence.merge(scan_urls(normalized, original));
        evidence
    }

    async fn call<F>(&self, context: ModerationContext, fut: F) -> Result<Decision, AgoraError>
    where
        F: std::future::Future<Output = Result<Decision, ClassifierError>>,
    {
        match actix_web::rt::time::timeout(self.timeout, fut).await {
            Ok(Ok(decision)) => Ok(decision),
            Ok(Err(e)) => {
                log::error!(
                    "Moderation classifier {} failed for {}: {}",
                    self.classifier.name(),
                    context,
                    e
                );
                Err(AgoraError::ExternalService(e.to_string()))
            }
            Err(_) => {
                log::error!(
                    "Moderation classifier {} timed out after {:?} for {}",
                    self.classifier.name(),
                    self.timeout,
                    context
                );
                Err(AgoraError::ExternalService(format!(
                    "moderation timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Evaluates a title/body submission.
    pub async fn guard_text(
        &self,
        title: &str,
        body: &str,
        context: ModerationContext,
    ) -> Result<Decision, AgoraError> {
        let title_cut = truncate_chars(title, self.max_title_chars);
        let body_cut = truncate_chars(body, self.max_body_chars);
        let title_norm = normalize_text(title_cut);
        let body_norm = normalize_text(body_cut);

        let sample = TextSample {
            context,
            title: title_norm.to_string(),
            body: body_norm.to_string(),
        };
        let mut decision = self
            .call(context, self.classifier.classify_text(sample))
            .await?;

        // Local rules see the whole text, not only what the classifier got.
        let combined_orig = format!("{}\n{}", title, body);
        let combined_norm = normalize_text(&combined_orig);
        decision
            .found
            .merge(self.local_evidence(&combined_norm, &combined_orig));

        apply_text_floors(&mut decision);

        log::info!(
            "Moderation {} (text): action={} severity={} reasons={:?}",
            context,
            decision.action,
            decision.severity,
            decision.reasons
        );
        Ok(decision)
    }

    /// Evaluates an image submission.
    pub async fn guard_image(
        &self,
        bytes: Bytes,
        mime: &str,
        context: ModerationContext,
    ) -> Result<Decision, AgoraError> {
        let sample = ImageSample {
            context,
            mime: mime.to_string(),
            bytes,
        };
        let mut decision = self
            .call(context, self.classifier.classify_image(sample))
            .await?;

        apply_image_floors(&mut decision);

        log::info!(
            "Moderation {} (image): action={} severity={} reasons={:?}",
            context,
            decision.action,
            decision.severity,
            decision.reasons
        );
        Ok(decision)
    }

    /// Like [`guard_text`](Self::guard_text), but a rejecting decision is an error.
    ///
    /// Text longer than the classifier limits is refused up front, so nothing
    /// is published that was only partly classified.
    pub async fn check_text(
        &self,
        title: &str,
        body: &str,
        context: ModerationContext,
    ) -> Result<Decision, AgoraError> {
        self.check_length(title, body)?;
        permit(self.guard_text(title, body, context).await?)
    }

    fn check_length(&self, title: &str, body: &str) -> Result<(), AgoraError> {
        let mut errors = Vec::new();
        if title.chars().count() > self.max_title_chars {
            errors.push(format!("title: at most {} characters", self.max_title_chars));
        }
        if body.chars().count() > self.max_body_chars {
            errors.push(format!("body: at most {} characters", self.max_body_chars));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgoraError::Validation(errors))
        }
    }

    /// Like [`guard_image`](Self::guard_image), but a rejecting decision is an error.
    pub async fn check_image(
        &self,
        bytes: Bytes,
        mime: &str,
        context: ModerationContext,
    ) -> Result<Decision, AgoraError> {
        permit(self.guard_image(bytes, mime, context).await?)
    }
}

fn permit(decision: Decision) -> Result<Decision, AgoraError> {
    if decision.permits_publication() {
        Ok(decision)
    } else {
        Err(AgoraError::ModerationRejected(decision))
    }
}
