//! Word filters used as moderation evidence
//!
//! Administrators define term patterns in the `word_filters` table. Each
//! enabled filter reports matches into one evidence list:
//!
//! - **profanity**: matched terms force a block through the gate's floors
//! - **suspicious_phrase**: matched terms are reported to the reviewer
//!
//! Filters never rewrite content. Extra profanity terms from configuration
//! are merged in as plain, case-insensitive, whole-word filters.

use crate::orm::word_filters::{self, FilterCategory};
use regex::Regex;
use sea_orm::{entity::*, query::*, DatabaseConnection};

/// Compiled word filter for efficient matching
#[derive(Debug)]
struct CompiledFilter {
    id: Option<i32>,
    pattern: String,
    category: FilterCategory,
    regex: Regex,
    is_whole_word: bool,
}

impl CompiledFilter {
    fn new(
        id: Option<i32>,
        pattern: &str,
        is_regex: bool,
        is_case_sensitive: bool,
        is_whole_word: bool,
        category: FilterCategory,
    ) -> Option<Self> {
        let body = if is_regex {
            pattern.to_string()
        } else {
            regex::escape(pattern)
        };
        let source = if is_case_sensitive {
            body
        } else {
            format!("(?i){}", body)
        };

        match Regex::new(&source) {
            Ok(regex) => Some(Self {
                id,
                pattern: pattern.to_string(),
                category,
                regex,
                is_whole_word,
            }),
            Err(e) => {
                log::error!("Failed to compile word filter {:?} ({}): {}", id, pattern, e);
                None
            }
        }
    }

    fn from_model(model: &word_filters::Model) -> Option<Self> {
        Self::new(
            Some(model.id),
            &model.pattern,
            model.is_regex,
            model.is_case_sensitive,
            model.is_whole_word,
            model.category,
        )
    }

    /// Returns the first matched text, if any.
    fn find_match<'a>(&self, content: &'a str) -> Option<&'a str> {
        self.regex
            .find_iter(content)
            .filter(|m| m.start() < m.end())
            .find(|m| !self.is_whole_word || is_word_boundary(content, m.start(), m.end()))
            .map(|m| m.as_str())
    }
}

/// Check if byte positions represent word boundaries
fn is_word_boundary(content: &str, start: usize, end: usize) -> bool {
    let start_ok = content[..start]
        .chars()
        .next_back()
        .map_or(true, |c| !c.is_alphanumeric());
    let end_ok = content[end..]
        .chars()
        .next()
        .map_or(true, |c| !c.is_alphanumeric());
    start_ok && end_ok
}

/// Terms matched by the word filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterMatches {
    pub profanity_terms: Vec<String>,
    pub suspicious_phrases: Vec<String>,
}

impl FilterMatches {
    pub fn is_empty(&self) -> bool {
        self.profanity_terms.is_empty() && self.suspicious_phrases.is_empty()
    }
}

/// An immutable, compiled filter set. Swapped as a whole on reload.
#[derive(Debug, Default)]
pub struct WordFilter {
    filters: Vec<CompiledFilter>,
}

impl WordFilter {
    /// Builds a filter set from plain profanity terms only.
    pub fn from_terms<S: AsRef<str>>(terms: &[S]) -> Self {
        let mut filter = Self::default();
        filter.add_terms(terms);
        filter
    }

    /// Loads enabled filters from the database and adds `extra_terms`.
    pub async fn load<S: AsRef<str>>(
        db: &DatabaseConnection,
        extra_terms: &[S],
    ) -> Result<Self, sea_orm::DbErr> {
        let models = word_filters::Entity::find()
            .filter(word_filters::Column::IsEnabled.eq(true))
            .order_by_asc(word_filters::Column::Id)
            .all(db)
            .await?;

        let mut filter = Self {
            filters: models.iter().filter_map(CompiledFilter::from_model).collect(),
        };
        filter.add_terms(extra_terms);

        log::info!("Loaded {} word filters", filter.len());
        Ok(filter)
    }

    fn add_terms<S: AsRef<str>>(&mut self, terms: &[S]) {
        for term in terms {
            let term = term.as_ref().trim();
            if term.is_empty() {
                continue;
            }
            if let Some(compiled) =
                CompiledFilter::new(None, term, false, false, true, FilterCategory::Profanity)
            {
                self.filters.push(compiled);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Scans `content` and reports the matched text of each filter once.
    pub fn scan(&self, content: &str) -> FilterMatches {
        let mut matches = FilterMatches::default();

        for filter in &self.filters {
            if let Some(found) = filter.find_match(content) {
                log::trace!(
                    "Word filter {:?} ({}) matched {:?}",
                    filter.id,
                    filter.pattern,
                    found
                );
                let list = if filter.category.is_profanity() {
                    &mut matches.profanity_terms
                } else {
                    &mut matches.suspicious_phrases
                };
                let found = found.to_string();
                if !list.contains(&found) {
                    list.push(found);
                }
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(pattern: &str, regex: bool, case: bool, whole: bool, cat: FilterCategory) -> WordFilter {
        WordFilter {
            filters: vec![CompiledFilter::new(Some(1), pattern, regex, case, whole, cat).unwrap()],
        }
    }

    #[test]
    fn test_word_boundary_start() {
        assert!(is_word_boundary("hello world", 0, 5));
    }

    #[test]
    fn test_word_boundary_middle() {
        assert!(is_word_boundary("hello world", 6, 11));
    }

    #[test]
    fn test_word_boundary_not_word() {
        assert!(!is_word_boundary("helloworld", 0, 5));
    }

    #[test]
    fn test_word_boundary_non_ascii() {
        assert!(is_word_boundary("é darn", 3, 7));
        assert!(!is_word_boundary("édarn", 2, 6));
    }

    #[test]
    fn test_plain_case_insensitive_whole_word() {
        let f = filter("darn", false, false, true, FilterCategory::Profanity);
        assert_eq!(f.scan("Well DARN it").profanity_terms, vec!["DARN"]);
        assert!(f.scan("darning socks").is_empty());
    }

    #[test]
    fn test_plain_pattern_is_escaped() {
        let f = filter("a.b", false, false, false, FilterCategory::SuspiciousPhrase);
        assert!(f.scan("axb").is_empty());
        assert_eq!(f.scan("see a.b").suspicious_phrases, vec!["a.b"]);
    }

    #[test]
    fn test_case_sensitive() {
        let f = filter("Spam", false, true, false, FilterCategory::SuspiciousPhrase);
        assert!(f.scan("spam").is_empty());
        assert_eq!(f.scan("Spam").suspicious_phrases, vec!["Spam"]);
    }

    #[test]
    fn test_regex_filter() {
        let f = filter(r"free\s+money", true, false, false, FilterCategory::SuspiciousPhrase);
        assert_eq!(
            f.scan("Get FREE   money now").suspicious_phrases,
            vec!["FREE   money"]
        );
    }

    #[test]
    fn test_invalid_regex_is_skipped() {
        assert!(CompiledFilter::new(None, "(", true, false, false, FilterCategory::Profanity).is_none());
    }

    #[test]
    fn test_from_terms() {
        let f = WordFilter::from_terms(&["heck", " ", "darn"]);
        assert_eq!(f.len(), 2);
        let m = f.scan("heck and darn");
        assert_eq!(m.profanity_terms, vec!["heck", "darn"]);
    }

    #[test]
    fn test_whole_word_skips_to_later_match() {
        let f = filter("cat", false, false, true, FilterCategory::Profanity);
        assert_eq!(f.scan("concat cat").profanity_terms, vec!["cat"]);
    }
}
