// src/extractor.rs

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::{DownloadError, Result};

// The player script writes the fresh link into #norobotlink
static NOROBOT_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"document\.getElementById\(\s*['"]norobotlink['"]\s*\)\.innerHTML\s*=\s*([^;]*);"#)
        .expect("norobotlink pattern is valid")
});

// One concatenated term: a quoted literal, optionally parenthesised, with chained substring calls
static STRING_TERM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\(?\s*(?:'([^']*)'|"([^"]*)")\s*\)?((?:\s*\.substring\(\s*\d+\s*(?:,\s*\d+\s*)?\))*)$"#)
        .expect("string term pattern is valid")
});

static SUBSTRING_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.substring\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("substring pattern is valid")
});

// Hidden div holding the path and query up to `token=`
static LINK_INFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div\s+id=["']ideoooolink["'][^>]*>\s*([^<]*?token=)"#)
        .expect("ideoooolink pattern is valid")
});

static OG_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<meta\s+name=["']og:title["']\s+content=["']([^"']*)["']"#)
        .expect("og:title pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    pub title: Option<String>,
}

/// Rebuilds the direct media URL hidden in an alternate-host embed page.
///
/// The page carries the URL in two halves: a hidden `ideoooolink` div with the
/// path up to `token=`, and an inline script that writes the live token into
/// `norobotlink`. The script value is a `+` concatenation of string literals
/// trimmed with `.substring(..)`; it is evaluated the way the player does it,
/// the token after `token=` is decoded and joined to the div's path under
/// `https:`. Returns [`DownloadError::ExtractionFailed`] when either
/// marker is missing or the result is not an absolute http(s) URL.
pub fn extract_link(html: &str) -> Result<ExtractedLink> {
    let expression = NOROBOT_ASSIGNMENT
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| DownloadError::ExtractionFailed("norobotlink token not found".into()))?;
    let assigned = evaluate_concatenation(expression)?;
    let token = assigned
        .rsplit_once("token=")
        .map(|(_, token)| token)
        .ok_or_else(|| DownloadError::ExtractionFailed("norobotlink value has no token".into()))?;

    let infix = LINK_INFIX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| DownloadError::ExtractionFailed("ideoooolink fragment not found".into()))?;

    let token = decode_token(token)?;
    let url = join_fragments(&decode_infix(infix), &token);
    let url = validate(&url)?;

    let title = OG_TITLE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_entities(m.as_str()).trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(ExtractedLink { url, title })
}

// Evaluates `'a' + ('xyzb').substring(3) + ...` into a single string
fn evaluate_concatenation(expression: &str) -> Result<String> {
    let mut value = String::new();
    for term in split_terms(expression) {
        let caps = STRING_TERM
            .captures(term)
            .ok_or_else(|| DownloadError::ExtractionFailed(format!("unsupported script term: {}", term)))?;
        let literal = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
        let calls = caps.get(3).map_or("", |m| m.as_str());

        let mut piece: Vec<char> = literal.chars().collect();
        for call in SUBSTRING_CALL.captures_iter(calls) {
            let start = parse_offset(&call[1]);
            let end = call.get(2).map_or(piece.len(), |m| parse_offset(m.as_str()));
            piece = js_substring(&piece, start, end);
        }
        value.extend(piece);
    }
    Ok(value)
}

// Splits on `+` outside quoted literals
fn split_terms(expression: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut quote = None;
    let mut from = 0;
    for (i, c) in expression.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, '+') => {
                terms.push(expression[from..i].trim());
                from = i + 1;
            }
            _ => {}
        }
    }
    terms.push(expression[from..].trim());
    terms
}

fn parse_offset(digits: &str) -> usize {
    digits.parse().unwrap_or(usize::MAX)
}

// String.prototype.substring: both ends clamped to the length, swapped when reversed
fn js_substring(chars: &[char], start: usize, end: usize) -> Vec<char> {
    let start = start.min(chars.len());
    let end = end.min(chars.len());
    let (from, to) = if start <= end { (start, end) } else { (end, start) };
    chars[from..to].to_vec()
}

fn decode_token(raw: &str) -> Result<String> {
    let token = urlencoding::decode(raw.trim())
        .map_err(|e| DownloadError::ExtractionFailed(format!("token is not valid UTF-8: {}", e)))?
        .into_owned();

    if token.is_empty() {
        return Err(DownloadError::ExtractionFailed("empty token".into()));
    }
    Ok(token)
}

fn decode_infix(raw: &str) -> String {
    decode_entities(raw)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn decode_entities(raw: &str) -> String {
    raw.replace("&amp;", "&")
        .replace("&#38;", "&")
        .replace("&quot;", "\"")
}

// The infix is protocol-relative with one slash eaten (`/host/path`), sometimes both
fn join_fragments(infix: &str, token: &str) -> String {
    if infix.starts_with("http://") || infix.starts_with("https://") {
        return format!("{}{}", infix, token);
    }
    format!("https://{}{}", infix.trim_start_matches('/'), token)
}

fn validate(candidate: &str) -> Result<String> {
    let url = Url::parse(candidate)
        .map_err(|e| DownloadError::ExtractionFailed(format!("malformed url {}: {}", candidate, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(DownloadError::ExtractionFailed(format!(
            "unexpected scheme in {}",
            candidate
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(DownloadError::ExtractionFailed(format!("no host in {}", candidate)));
    }

    Ok(url.to_string())
}
