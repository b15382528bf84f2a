use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

// High-confidence attack patterns that URL parsing alone won't catch

static PATH_TRAVERSAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.").expect("path traversal pattern is valid"));

// Control characters, encoded line breaks, backslashes and invisible unicode
static SUSPICIOUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\x00-\x1F\x7F-\x9F]|%(?:00|0[aAdD]|09|5c|26%23)|^[.@〱〵ゝーｰ]|\\|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]")
        .expect("suspicious pattern is valid")
});

const MAX_REDIRECT_LENGTH: usize = 2048;

const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Why a post-login redirect target was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectRejection {
    TooLong,
    SuspiciousPattern,
    Unparseable,
    DisallowedScheme,
    Credentials,
    Fragment,
    NotListed,
}

/// The configured set of URIs a session token may be delivered to
///
/// A target matches an entry when scheme, host, port and path are equal. The
/// target may carry its own query string; fragments are never accepted.
#[derive(Debug, Clone, Default)]
pub struct RedirectAllowList {
    entries: Vec<Url>,
}

impl RedirectAllowList {
    /// Parse the configured URIs, skipping and logging entries that are not absolute http(s) URLs
    #[must_use]
    pub fn new<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = uris
            .into_iter()
            .filter_map(|uri| match Url::parse(uri.as_ref()) {
                Ok(url) if ALLOWED_SCHEMES.contains(&url.scheme()) && url.host_str().is_some() => {
                    Some(url)
                }
                _ => {
                    warn!("Ignoring invalid authorized redirect URI: {}", uri.as_ref());
                    None
                }
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> Option<&Url> {
        self.entries.first()
    }

    #[must_use]
    pub fn is_allowed(&self, target: &str) -> bool {
        self.check(target).is_ok()
    }

    /// Validate a redirect target and return it parsed
    ///
    /// # Errors
    ///
    /// Returns the reason the target is not an acceptable destination
    pub fn check(&self, target: &str) -> Result<Url, RedirectRejection> {
        screen_redirect_target(target)?;

        let parsed = Url::parse(target).map_err(|e| {
            debug!("Failed to parse redirect target: {e}");
            RedirectRejection::Unparseable
        })?;

        if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
            return Err(RedirectRejection::DisallowedScheme);
        }
        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(RedirectRejection::Credentials);
        }
        if parsed.fragment().is_some() {
            return Err(RedirectRejection::Fragment);
        }

        if self.entries.iter().any(|entry| same_endpoint(entry, &parsed)) {
            Ok(parsed)
        } else {
            Err(RedirectRejection::NotListed)
        }
    }
}

fn same_endpoint(allowed: &Url, target: &Url) -> bool {
    allowed.scheme() == target.scheme()
        && allowed.host_str() == target.host_str()
        && allowed.port_or_known_default() == target.port_or_known_default()
        && allowed.path() == target.path()
}

/// Screen a redirect target for malicious patterns, including encoded variants
///
/// # Errors
///
/// Returns a rejection for overlong targets, traversal sequences, control or
/// invisible characters, script-capable schemes and domain-confusion `@`s.
pub fn screen_redirect_target(target: &str) -> Result<(), RedirectRejection> {
    if target.len() > MAX_REDIRECT_LENGTH {
        warn!("Excessively long redirect URL: {} characters", target.len());
        return Err(RedirectRejection::TooLong);
    }

    for decoded in get_decoded_variants(target) {
        if PATH_TRAVERSAL_PATTERN.is_match(&decoded) {
            warn!("Path traversal detected in redirect target: {decoded}");
            return Err(RedirectRejection::SuspiciousPattern);
        }
        if SUSPICIOUS_PATTERN.is_match(&decoded) {
            warn!("Suspicious pattern detected in redirect target: {decoded}");
            return Err(RedirectRejection::SuspiciousPattern);
        }
        if contains_dangerous_protocol(&decoded.to_lowercase()) {
            warn!("Dangerous protocol detected in redirect target: {decoded}");
            return Err(RedirectRejection::SuspiciousPattern);
        }
        if decoded.matches('@').count() > 1 {
            warn!("Multiple @ symbols detected (domain confusion): {decoded}");
            return Err(RedirectRejection::SuspiciousPattern);
        }
    }

    Ok(())
}

/// Original, single-decoded and double-decoded forms of the input
fn get_decoded_variants(input: &str) -> Vec<String> {
    let mut variants = Vec::with_capacity(3);
    variants.push(input.to_string());

    if let Ok(decoded) = urlencoding::decode(input) {
        let decoded_string = decoded.into_owned();
        if decoded_string != input {
            if let Ok(double_decoded) = urlencoding::decode(&decoded_string) {
                let double_decoded_string = double_decoded.into_owned();
                if double_decoded_string != decoded_string {
                    variants.push(double_decoded_string);
                }
            }
            variants.push(decoded_string);
        }
    }

    variants
}

fn contains_dangerous_protocol(text: &str) -> bool {
    const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "ftp:"];

    DANGEROUS_PROTOCOLS.iter().any(|protocol| text.contains(protocol))
}
