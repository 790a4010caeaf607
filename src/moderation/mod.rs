//! Content moderation gate
//!
//! Every user submission carrying text or an image passes through the gate
//! before it is persisted. The gate normalizes text, asks a [`Classifier`]
//! for a raw verdict, merges locally extracted evidence (word filters and a
//! URL scanner) and then applies hard policy floors the classifier cannot
//! relax. See [`rules`] for the floors.
//!
//! Decisions are never cached. Callers treat `review` and `block` as a
//! rejection and `allow`/`warn` as permission to publish.

pub mod classifier;
pub mod evidence;
pub mod gate;
pub mod normalize;
pub mod openai;
pub mod rules;

pub use classifier::{Classifier, ClassifierError, ImageSample, StaticClassifier, TextSample};
pub use gate::ModerationGate;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict action, ordered from most to least permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Warn,
    Review,
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Warn => "warn",
            Action::Review => "review",
            Action::Block => "block",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy category flags reported by the classifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Categories {
    pub nsfw: bool,
    pub weapons: bool,
    pub alcohol: bool,
    pub drugs: bool,
    pub gore: bool,
    pub offensive_symbols: bool,
    pub profanity: bool,
    pub spam: bool,
    pub spam_email: bool,
    pub malicious_url: bool,
}

/// Evidence extracted from the submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evidence {
    pub profanity_terms: Vec<String>,
    pub suspicious_phrases: Vec<String>,
    pub urls: Vec<String>,
    pub suspicious_urls: Vec<String>,
    pub notes: Vec<String>,
}

impl Evidence {
    /// Appends `other` to this evidence, skipping entries already present.
    pub fn merge(&mut self, other: Evidence) {
        merge_unique(&mut self.profanity_terms, other.profanity_terms);
        merge_unique(&mut self.suspicious_phrases, other.suspicious_phrases);
        merge_unique(&mut self.urls, other.urls);
        merge_unique(&mut self.suspicious_urls, other.suspicious_urls);
        merge_unique(&mut self.notes, other.notes);
    }
}

fn merge_unique(into: &mut Vec<String>, from: Vec<String>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}

/// Outcome of one moderation evaluation.
///
/// The same shape is produced by classifiers (raw) and by the gate (after
/// policy floors).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub severity: Severity,
    #[serde(default)]
    pub categories: Categories,
    #[serde(default)]
    pub found: Evidence,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl Decision {
    /// A clean verdict with no flags.
    pub fn allow() -> Self {
        Self {
            action: Action::Allow,
            severity: Severity::Low,
            categories: Categories::default(),
            found: Evidence::default(),
            reasons: Vec::new(),
        }
    }

    /// `allow` and `warn` publish; `review` and `block` reject.
    pub fn permits_publication(&self) -> bool {
        matches!(self.action, Action::Allow | Action::Warn)
    }
}

/// Where a submission comes from. Passed to the classifier as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationContext {
    BlogPost,
    BlogThumbnail,
    ImageUpload,
    DialogueThread,
    DialogueComment,
    OpinionPoll,
}

impl ModerationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationContext::BlogPost => "blog_post",
            ModerationContext::BlogThumbnail => "blog_thumbnail",
            ModerationContext::ImageUpload => "image_upload",
            ModerationContext::DialogueThread => "dialogue_thread",
            ModerationContext::DialogueComment => "dialogue_comment",
            ModerationContext::OpinionPoll => "opinion_poll",
        }
    }
}

impl fmt::Display for ModerationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_ordering() {
        assert!(Action::Allow < Action::Warn);
        assert!(Action::Warn < Action::Review);
        assert!(Action::Review < Action::Block);
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_permits_publication() {
        let mut decision = Decision::allow();
        assert!(decision.permits_publication());
        decision.action = Action::Warn;
        assert!(decision.permits_publication());
        decision.action = Action::Review;
        assert!(!decision.permits_publication());
        decision.action = Action::Block;
        assert!(!decision.permits_publication());
    }

    #[test]
    fn test_decision_deserializes_with_missing_sections() {
        let decision: Decision =
            serde_json::from_str(r#"{"action":"warn","severity":"medium"}"#).unwrap();
        assert_eq!(decision.action, Action::Warn);
        assert_eq!(decision.severity, Severity::Medium);
        assert!(decision.reasons.is_empty());
        assert!(!decision.categories.profanity);
    }

    #[test]
    fn test_evidence_merge_deduplicates() {
        let mut a = Evidence {
            urls: vec!["http://a.example".into()],
            ..Default::default()
        };
        a.merge(Evidence {
            urls: vec!["http://a.example".into(), "http://b.example".into()],
            profanity_terms: vec!["darn".into()],
            ..Default::default()
        });
        assert_eq!(a.urls, vec!["http://a.example", "http://b.example"]);
        assert_eq!(a.profanity_terms, vec!["darn"]);
    }

    #[test]
    fn test_context_labels() {
        assert_eq!(ModerationContext::BlogThumbnail.as_str(), "blog_thumbnail");
        assert_eq!(
            serde_json::to_string(&ModerationContext::DialogueComment).unwrap(),
            "\"dialogue_comment\""
        );
    }
}
