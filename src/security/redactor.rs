use regex::Regex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")
});
static PHONE_TEN: LazyLock<Regex> = LazyLock::new(|| compiled(r"\d{3}-\d{3}-\d{4}"));
static PHONE_PAREN: LazyLock<Regex> = LazyLock::new(|| compiled(r"\(\d{3}\)\s?\d{3}-\d{4}"));
static PHONE_SEVEN: LazyLock<Regex> = LazyLock::new(|| compiled(r"\d{3}-\d{4}"));
static SSN: LazyLock<Regex> = LazyLock::new(|| compiled(r"\b\d{3}-\d{2}-\d{4}\b"));
static CARD_SIXTEEN: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r"\b(?:4\d{3}|5[1-5]\d{2}|6011|65\d{2})[ -]?\d{4}[ -]?\d{4}[ -]?\d{4}\b")
});
static CARD_AMEX: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"\b3[47]\d{2}[ -]?\d{6}[ -]?\d{5}\b"));
static IPV4: LazyLock<Regex> = LazyLock::new(|| compiled(r"\b(?:\d{1,3}\.){3}\d{1,3}\b"));
static API_KEY: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r#"(?i)\b(?:api[_\- ]?key|x-api-key)\b\s*[:=]?\s*["']?([A-Za-z0-9_\-.]{8,})"#)
});
static PASSWORD: LazyLock<Regex> = LazyLock::new(|| {
    compiled(r#"(?i)\b(?:password|passwd|pwd)\b\s*[:=]?\s*["']?([^\s"'\[\],;]{6,})"#)
});
static BEARER: LazyLock<Regex> =
    LazyLock::new(|| compiled(r"(?i)\bbearer\s+([A-Za-z0-9_\-.=]{8,})"));

fn compiled(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(err) => panic!("built-in PII pattern failed to compile: {err}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    IpAddress,
    ApiKey,
    Password,
    BearerToken,
}

impl PiiType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Ssn => "ssn",
            Self::CreditCard => "credit_card",
            Self::IpAddress => "ip_address",
            Self::ApiKey => "api_key",
            Self::Password => "password",
            Self::BearerToken => "bearer_token",
        }
    }

    fn replacement_label(self) -> &'static str {
        match self {
            Self::Email => "[REDACTED:EMAIL]",
            Self::Phone => "[REDACTED:PHONE]",
            Self::Ssn => "[REDACTED:SSN]",
            Self::CreditCard => "[REDACTED:CREDIT_CARD]",
            Self::IpAddress => "[REDACTED:IP_ADDRESS]",
            Self::ApiKey => "[REDACTED:API_KEY]",
            Self::Password => "[REDACTED:PASSWORD]",
            Self::BearerToken => "[REDACTED:BEARER_TOKEN]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiiMatch {
    pub pii_type: PiiType,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionMode {
    Partial,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RedactionSummary {
    pub types: Vec<String>,
    pub counts: BTreeMap<String, usize>,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionOutcome {
    pub original: String,
    pub redacted: String,
    pub matches: Vec<PiiMatch>,
    pub pii_detected: bool,
    pub summary: RedactionSummary,
}

/// Pattern plus keyword-context PII detection. `detect` is pure and
/// deterministic; redaction replaces from the rightmost match inward so
/// earlier offsets stay valid, and is closed under re-application.
#[derive(Debug, Clone, Copy, Default)]
pub struct PiiRedactor;

impl PiiRedactor {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, text: &str) -> Vec<PiiMatch> {
        let mut matches = Vec::new();

        for found in EMAIL.find_iter(text) {
            push_match(&mut matches, PiiType::Email, found.start(), found.end(), text);
        }

        for pattern in [&*PHONE_TEN, &*PHONE_PAREN, &*PHONE_SEVEN] {
            for found in pattern.find_iter(text) {
                if digit_adjacent(text, found.start(), found.end()) {
                    continue;
                }
                push_match(&mut matches, PiiType::Phone, found.start(), found.end(), text);
            }
        }

        for found in SSN.find_iter(text) {
            push_match(&mut matches, PiiType::Ssn, found.start(), found.end(), text);
        }

        for pattern in [&*CARD_SIXTEEN, &*CARD_AMEX] {
            for found in pattern.find_iter(text) {
                push_match(
                    &mut matches,
                    PiiType::CreditCard,
                    found.start(),
                    found.end(),
                    text,
                );
            }
        }

        for found in IPV4.find_iter(text) {
            if valid_ipv4(found.as_str()) {
                push_match(
                    &mut matches,
                    PiiType::IpAddress,
                    found.start(),
                    found.end(),
                    text,
                );
            }
        }

        for (pii_type, pattern) in [
            (PiiType::ApiKey, &*API_KEY),
            (PiiType::Password, &*PASSWORD),
            (PiiType::BearerToken, &*BEARER),
        ] {
            for captures in pattern.captures_iter(text) {
                if let Some(secret) = captures.get(1) {
                    push_match(&mut matches, pii_type, secret.start(), secret.end(), text);
                }
            }
        }

        matches.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.end.cmp(&b.end))
                .then_with(|| a.pii_type.as_str().cmp(b.pii_type.as_str()))
                .then_with(|| a.text.cmp(&b.text))
        });
        matches.dedup();
        drop_contained_matches(matches)
    }

    pub fn redact(&self, text: &str, mode: RedactionMode) -> RedactionOutcome {
        let matches = self.detect(text);
        if matches.is_empty() {
            return RedactionOutcome {
                original: text.to_string(),
                redacted: text.to_string(),
                matches,
                pii_detected: false,
                summary: RedactionSummary::default(),
            };
        }

        let mut redacted = text.to_string();
        let mut last_replaced_start = usize::MAX;
        for found in matches.iter().rev() {
            if found.end > last_replaced_start {
                continue;
            }
            let replacement = replacement_for(found, mode);
            redacted.replace_range(found.start..found.end, &replacement);
            last_replaced_start = found.start;
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for found in &matches {
            *counts.entry(found.pii_type.as_str().to_string()).or_insert(0) += 1;
        }
        let types = counts.keys().cloned().collect::<Vec<_>>();
        let total = matches.len();

        RedactionOutcome {
            original: text.to_string(),
            redacted,
            pii_detected: true,
            summary: RedactionSummary {
                types,
                counts,
                total,
            },
            matches,
        }
    }
}

fn replacement_for(found: &PiiMatch, mode: RedactionMode) -> String {
    match (found.pii_type, mode) {
        (PiiType::Email, RedactionMode::Partial) => {
            match found.text.split_once('@') {
                Some((_, domain)) => format!("[REDACTED_EMAIL]@{domain}"),
                None => PiiType::Email.replacement_label().to_string(),
            }
        }
        (pii_type, _) => pii_type.replacement_label().to_string(),
    }
}

fn push_match(matches: &mut Vec<PiiMatch>, pii_type: PiiType, start: usize, end: usize, text: &str) {
    matches.push(PiiMatch {
        pii_type,
        start,
        end,
        text: text[start..end].to_string(),
    });
}

/// A span strictly contained in a longer span is a fragment of the same
/// secret (the 7-digit phone shape inside a 10-digit number); keep only
/// the enclosing match.
fn drop_contained_matches(matches: Vec<PiiMatch>) -> Vec<PiiMatch> {
    let spans = matches
        .iter()
        .map(|m| (m.start, m.end))
        .collect::<Vec<_>>();
    matches
        .into_iter()
        .filter(|m| {
            !spans.iter().any(|(start, end)| {
                *start <= m.start && m.end <= *end && (end - start) > (m.end - m.start)
            })
        })
        .collect()
}

/// The regex crate has no lookarounds; reject phone candidates glued to
/// surrounding digits by inspecting the neighbor bytes.
fn digit_adjacent(text: &str, start: usize, end: usize) -> bool {
    let bytes = text.as_bytes();
    let before = start.checked_sub(1).map(|index| bytes[index]);
    let after = bytes.get(end).copied();
    matches!(before, Some(byte) if byte.is_ascii_digit())
        || matches!(after, Some(byte) if byte.is_ascii_digit())
}

fn valid_ipv4(candidate: &str) -> bool {
    candidate
        .split('.')
        .all(|octet| octet.parse::<u16>().map(|value| value <= 255).unwrap_or(false))
}

impl PartialOrd for PiiMatch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PiiMatch {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.pii_type.as_str().cmp(other.pii_type.as_str()))
            .then_with(|| self.text.cmp(&other.text))
    }
}
