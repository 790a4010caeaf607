//! Hard policy floors applied on top of the classifier's raw verdict.
//!
//! A floor only ever raises `action` and `severity`; it never relaxes what
//! the classifier decided.

use super::{Action, Decision, Severity};

pub const PROFANITY_REASON: &str = "Profanity or abusive language detected";
pub const SUSPICIOUS_URL_REASON: &str = "Suspicious or malicious URL detected";
pub const OFFENSIVE_SYMBOLS_REASON: &str = "Offensive symbols detected";
pub const SENSITIVE_IMAGE_REASON: &str = "Image contains sensitive content and needs review";

/// Floors for title/body submissions.
pub fn apply_text_floors(decision: &mut Decision) {
    if decision.categories.profanity || !decision.found.profanity_terms.is_empty() {
        decision.action = Action::Block;
        decision.severity = Severity::High;
        put_reason_first(&mut decision.reasons, PROFANITY_REASON);
    }

    if decision.categories.malicious_url || !decision.found.suspicious_urls.is_empty() {
        raise(decision, Action::Review, Severity::Medium);
        put_reason_first(&mut decision.reasons, SUSPICIOUS_URL_REASON);
    }

    dedup_reasons(&mut decision.reasons);
}

/// Floors for image submissions.
pub fn apply_image_floors(decision: &mut Decision) {
    if decision.categories.offensive_symbols {
        decision.action = Action::Block;
        decision.severity = Severity::High;
        put_reason_first(&mut decision.reasons, OFFENSIVE_SYMBOLS_REASON);
    }

    if decision.categories.nsfw || decision.categories.gore {
        if decision.action == Action::Allow {
            decision.action = Action::Review;
            put_reason_first(&mut decision.reasons, SENSITIVE_IMAGE_REASON);
        }
        if decision.severity == Severity::Low {
            decision.severity = Severity::Medium;
        }
    }

    dedup_reasons(&mut decision.reasons);
}

fn raise(decision: &mut Decision, action: Action, severity: Severity) {
    decision.action = decision.action.max(action);
    decision.severity = decision.severity.max(severity);
}

fn put_reason_first(reasons: &mut Vec<String>, reason: &str) {
    if !reasons.iter().any(|r| r == reason) {
        reasons.insert(0, reason.to_string());
    }
}

/// Drops repeated reasons, keeping the first occurrence.
pub fn dedup_reasons(reasons: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    reasons.retain(|r| seen.insert(r.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(action: Action, severity: Severity) -> Decision {
        Decision {
            action,
            severity,
            ..Decision::allow()
        }
    }

    #[test]
    fn test_profanity_term_forces_block() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.found.profanity_terms.push("darn".into());
        decision.reasons.push("Looks fine".into());

        apply_text_floors(&mut decision);

        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::High);
        assert_eq!(decision.reasons[0], PROFANITY_REASON);
        assert_eq!(decision.reasons[1], "Looks fine");
    }

    #[test]
    fn test_profanity_flag_forces_block() {
        let mut decision = raw(Action::Warn, Severity::Medium);
        decision.categories.profanity = true;
        apply_text_floors(&mut decision);
        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::High);
    }

    #[test]
    fn test_suspicious_url_raises_to_review() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.found.suspicious_urls.push("http://bit.ly/x".into());

        apply_text_floors(&mut decision);

        assert_eq!(decision.action, Action::Review);
        assert_eq!(decision.severity, Severity::Medium);
        assert_eq!(decision.reasons, vec![SUSPICIOUS_URL_REASON]);
    }

    #[test]
    fn test_suspicious_url_never_downgrades() {
        let mut decision = raw(Action::Block, Severity::High);
        decision.categories.malicious_url = true;
        apply_text_floors(&mut decision);
        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::High);
    }

    #[test]
    fn test_both_text_floors_keep_block() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.categories.profanity = true;
        decision.categories.malicious_url = true;

        apply_text_floors(&mut decision);

        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::High);
        assert_eq!(
            decision.reasons,
            vec![SUSPICIOUS_URL_REASON, PROFANITY_REASON]
        );
    }

    #[test]
    fn test_existing_reason_not_repeated() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.categories.profanity = true;
        decision.reasons = vec![
            "Other".into(),
            PROFANITY_REASON.into(),
            "Other".into(),
        ];
        apply_text_floors(&mut decision);
        assert_eq!(decision.reasons, vec!["Other", PROFANITY_REASON]);
    }

    #[test]
    fn test_offensive_symbols_block_image() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.categories.offensive_symbols = true;
        apply_image_floors(&mut decision);
        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::High);
        assert_eq!(decision.reasons[0], OFFENSIVE_SYMBOLS_REASON);
    }

    #[test]
    fn test_nsfw_image_goes_to_review() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.categories.nsfw = true;
        apply_image_floors(&mut decision);
        assert_eq!(decision.action, Action::Review);
        assert_eq!(decision.severity, Severity::Medium);
        assert_eq!(decision.reasons, vec![SENSITIVE_IMAGE_REASON]);
    }

    #[test]
    fn test_gore_keeps_stronger_action() {
        let mut decision = raw(Action::Block, Severity::Low);
        decision.categories.gore = true;
        apply_image_floors(&mut decision);
        assert_eq!(decision.action, Action::Block);
        assert_eq!(decision.severity, Severity::Medium);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_text_floors_ignore_image_categories() {
        let mut decision = raw(Action::Allow, Severity::Low);
        decision.categories.nsfw = true;
        apply_text_floors(&mut decision);
        assert_eq!(decision.action, Action::Allow);
    }
}
