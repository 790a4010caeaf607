//! Local evidence extraction: links found in a submission and whether they
//! look suspicious.
//!
//! Runs on the normalized text, so a defanged `hxxp://evil[.]com` is seen as
//! `https://evil.com` and additionally flagged as obfuscated.

use super::Evidence;
use linkify::{LinkFinder, LinkKind};
use url::{Host, Url};

const URL_SHORTENERS: &[&str] = &[
    "bit.ly",
    "tinyurl.com",
    "t.co",
    "goo.gl",
    "ow.ly",
    "is.gd",
    "buff.ly",
    "cutt.ly",
    "rebrand.ly",
    "shorturl.at",
    "rb.gy",
    "t.ly",
];

const RISKY_TLDS: &[&str] = &[
    "zip", "mov", "xyz", "top", "tk", "ml", "ga", "cf", "gq", "click", "country", "work", "rest",
];

/// Why a URL was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlFlag {
    Shortener,
    IpHost,
    Punycode,
    RiskyTld,
    Credentials,
    NonHttpScheme,
    Obfuscated,
}

impl UrlFlag {
    fn describe(&self) -> &'static str {
        match self {
            UrlFlag::Shortener => "URL shortener hides the destination",
            UrlFlag::IpHost => "link points to a raw IP address",
            UrlFlag::Punycode => "internationalized host name may imitate another site",
            UrlFlag::RiskyTld => "top-level domain frequently used for abuse",
            UrlFlag::Credentials => "link embeds credentials",
            UrlFlag::NonHttpScheme => "link uses a non-web scheme",
            UrlFlag::Obfuscated => "link was written in an obfuscated form",
        }
    }
}

/// Inspects one URL. Returns every flag that applies.
pub fn url_flags(raw: &str, original_text: &str) -> Vec<UrlFlag> {
    let mut flags = Vec::new();

    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => match Url::parse(&format!("http://{}", raw)) {
            Ok(url) => url,
            Err(_) => return flags,
        },
    };

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        flags.push(UrlFlag::NonHttpScheme);
    }
    if !parsed.username().is_empty() || parsed.password().is_some() {
        flags.push(UrlFlag::Credentials);
    }

    match parsed.host() {
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => flags.push(UrlFlag::IpHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_lowercase();
            let bare = domain.strip_prefix("www.").unwrap_or(&domain);
            if URL_SHORTENERS.contains(&bare) {
                flags.push(UrlFlag::Shortener);
            }
            if domain.split('.').any(|label| label.starts_with("xn--")) {
                flags.push(UrlFlag::Punycode);
            }
            if let Some(tld) = domain.rsplit('.').next() {
                if RISKY_TLDS.contains(&tld) {
                    flags.push(UrlFlag::RiskyTld);
                }
            }
        }
        None => {}
    }

    if !original_text.contains(raw) {
        flags.push(UrlFlag::Obfuscated);
    }

    flags
}

/// Extracts URLs from `normalized` text and flags suspicious ones.
///
/// `original` is the text as submitted; a URL that only appears after
/// normalization was obfuscated.
pub fn scan_urls(normalized: &str, original: &str) -> Evidence {
    let mut finder = LinkFinder::new();
    finder.kinds(&[LinkKind::Url]);
    finder.url_must_have_scheme(false);

    let mut evidence = Evidence::default();
    for link in finder.links(normalized) {
        let raw = link.as_str().to_string();
        if evidence.urls.contains(&raw) {
            continue;
        }

        let flags = url_flags(&raw, original);
        if !flags.is_empty() {
            let notes = flags
                .iter()
                .map(|f| f.describe())
                .collect::<Vec<_>>()
                .join("; ");
            evidence.notes.push(format!("{}: {}", raw, notes));
            evidence.suspicious_urls.push(raw.clone());
        }
        evidence.urls.push(raw);
    }

    evidence
}
