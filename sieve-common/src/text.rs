//! Tag extraction and context excerpts over record text.
use std::sync::OnceLock;

use regex::Regex;

static MENTION_RE: OnceLock<Regex> = OnceLock::new();
static HASHTAG_RE: OnceLock<Regex> = OnceLock::new();
static URL_RE: OnceLock<Regex> = OnceLock::new();

fn mention_re() -> &'static Regex {
    MENTION_RE.get_or_init(|| Regex::new(r"@([A-Za-z0-9_]+)").expect("mention pattern"))
}

fn hashtag_re() -> &'static Regex {
    HASHTAG_RE.get_or_init(|| Regex::new(r"#([A-Za-z0-9_]+)").expect("hashtag pattern"))
}

fn url_re() -> &'static Regex {
    URL_RE.get_or_init(|| Regex::new(r"https?://[^\s]+").expect("url pattern"))
}

fn unique_captures(re: &Regex, text: &str, group: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in re.captures_iter(text) {
        if let Some(m) = caps.get(group) {
            if !out.iter().any(|seen| seen == m.as_str()) {
                out.push(m.as_str().to_string());
            }
        }
    }
    out
}

/// Usernames following `@`, without the prefix, first-seen order.
pub fn extract_mentions(text: &str) -> Vec<String> {
    unique_captures(mention_re(), text, 1)
}

/// Tags following `#`, without the prefix, first-seen order.
pub fn extract_hashtags(text: &str) -> Vec<String> {
    unique_captures(hashtag_re(), text, 1)
}

pub fn extract_urls(text: &str) -> Vec<String> {
    unique_captures(url_re(), text, 0)
}

/// `context_words` words either side of the word holding the first
/// case-insensitive occurrence of `keyword`, wrapped in ellipses.
///
/// Returns `None` when the keyword does not occur.
///
/// ```
/// use sieve_common::text::context_excerpt;
///
/// let text = "one two three four five six seven";
/// assert_eq!(
///     context_excerpt(text, "FOUR", 1).as_deref(),
///     Some("...three four five...")
/// );
/// assert_eq!(context_excerpt(text, "eight", 1), None);
/// ```
pub fn context_excerpt(text: &str, keyword: &str, context_words: usize) -> Option<String> {
    if keyword.is_empty() {
        return None;
    }
    let lowered = text.to_lowercase();
    let needle = keyword.to_lowercase();
    let idx = lowered.find(&needle)?;

    let prefix = &lowered[..idx];
    let before = prefix.split_whitespace().count();
    let mid_word = prefix.chars().last().is_some_and(|c| !c.is_whitespace());
    let word_idx = if mid_word { before - 1 } else { before };

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }
    let word_idx = word_idx.min(words.len() - 1);
    let start = word_idx.saturating_sub(context_words);
    let end = (word_idx + context_words + 1).min(words.len());

    Some(format!("...{}...", words[start..end].join(" ")))
}
