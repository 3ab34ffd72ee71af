//! Scraping of `t.me/s/<channel>` preview pages.
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use sieve_common::Record;

use super::types::ChannelMeta;

struct Selectors {
    message: Selector,
    text: Selector,
    owner: Selector,
    views: Selector,
    time: Selector,
    reaction: Selector,
    meta: Selector,
    pinned: Selector,
    title: Selector,
    description: Selector,
    counter: Selector,
    counter_value: Selector,
    counter_type: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| {
        let sel = |css: &str| Selector::parse(css).expect("static selector");
        Selectors {
            message: sel("div.tgme_widget_message"),
            text: sel(".tgme_widget_message_text"),
            owner: sel(".tgme_widget_message_owner_name"),
            views: sel(".tgme_widget_message_views"),
            time: sel("time[datetime]"),
            reaction: sel(".tgme_reaction"),
            meta: sel(".tgme_widget_message_meta"),
            pinned: sel(".tgme_widget_message_pinned"),
            title: sel(".tgme_channel_info_header_title"),
            description: sel(".tgme_channel_info_description"),
            counter: sel(".tgme_channel_info_counter"),
            counter_value: sel(".counter_value"),
            counter_type: sel(".counter_type"),
        }
    })
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse a display count such as `"987"`, `"1.2K"` or `"3M"`.
///
/// ```
/// use sieve_social::telegram::extract::parse_count;
///
/// assert_eq!(parse_count("1.2K"), Some(1_200));
/// assert_eq!(parse_count(" 15 "), Some(15));
/// assert_eq!(parse_count("n/a"), None);
/// ```
pub fn parse_count(raw: &str) -> Option<u64> {
    let s = raw.trim().replace(',', "");
    let (digits, mult) = match s.chars().last()? {
        'K' | 'k' => (&s[..s.len() - 1], 1_000.0),
        'M' | 'm' => (&s[..s.len() - 1], 1_000_000.0),
        'B' | 'b' => (&s[..s.len() - 1], 1_000_000_000.0),
        _ => (s.as_str(), 1.0),
    };
    let value: f64 = digits.trim().parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * mult).round() as u64)
}

/// Count at the end of a reaction badge, e.g. `"👍 1.5K"`.
fn trailing_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let start = raw
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit() || matches!(c, '.' | ',' | 'K' | 'M' | 'B'))
        .last()
        .map(|(i, _)| i)?;
    parse_count(&raw[start..])
}

fn fallback_id(source_id: &str, text: &str) -> String {
    let hash = blake3::hash(format!("{source_id}\n{text}").as_bytes());
    format!("{source_id}/h{}", &hash.to_hex()[..16])
}

fn parse_message(msg: ElementRef<'_>, source_id: &str) -> Option<Record> {
    let sel = selectors();
    let text = msg.select(&sel.text).next().map(element_text)?;
    if text.is_empty() {
        return None;
    }

    let id = msg
        .value()
        .attr("data-post")
        .map(str::to_string)
        .unwrap_or_else(|| fallback_id(source_id, &text));

    let mut record = Record::new(id, source_id, text);
    if let Some(author) = msg
        .select(&sel.owner)
        .next()
        .map(element_text)
        .filter(|a| !a.is_empty())
    {
        record = record.with_author(author);
    }
    if let Some(views) = msg
        .select(&sel.views)
        .next()
        .and_then(|e| parse_count(&element_text(e)))
    {
        record = record.with_views(views);
    }
    if let Some(ts) = msg
        .select(&sel.time)
        .next()
        .and_then(|e| e.value().attr("datetime"))
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    {
        record = record.with_timestamp(ts.with_timezone(&Utc));
    }

    let reactions: u64 = msg
        .select(&sel.reaction)
        .filter_map(|e| trailing_count(&element_text(e)))
        .sum();
    let edited = msg
        .select(&sel.meta)
        .any(|e| element_text(e).to_lowercase().contains("edited"));
    let pinned = msg.value().classes().any(|c| c == "pinned")
        || msg.select(&sel.pinned).next().is_some();

    Some(
        record
            .with_reactions(reactions)
            .with_edited(edited)
            .with_pinned(pinned),
    )
}

/// Records on a channel preview page, newest first, at most `max`.
///
/// Posts without text (media only, service messages) are skipped. A post
/// without `data-post` gets a content-hash id scoped to `source_id`.
pub fn parse_channel_page(html: &str, source_id: &str, max: usize) -> Vec<Record> {
    let doc = Html::parse_document(html);
    let mut records: Vec<Record> = doc
        .select(&selectors().message)
        .filter_map(|m| parse_message(m, source_id))
        .collect();
    records.reverse();
    records.truncate(max);
    records
}

/// Channel header. `None` when the page has no channel info block.
pub fn parse_channel_meta(html: &str) -> Option<ChannelMeta> {
    let sel = selectors();
    let doc = Html::parse_document(html);
    let title = doc.select(&sel.title).next().map(element_text)?;
    let description = doc
        .select(&sel.description)
        .next()
        .map(element_text)
        .filter(|d| !d.is_empty());
    let subscribers = doc
        .select(&sel.counter)
        .find(|c| {
            c.select(&sel.counter_type)
                .next()
                .map(element_text)
                .is_some_and(|t| t.starts_with("subscriber"))
        })
        .and_then(|c| c.select(&sel.counter_value).next())
        .and_then(|v| parse_count(&element_text(v)));
    Some(ChannelMeta {
        title,
        description,
        subscribers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
<html><body>
<div class="tgme_channel_info">
  <div class="tgme_channel_info_header_title"><span>Rust News</span></div>
  <div class="tgme_channel_info_description">Weekly #rust digest</div>
  <div class="tgme_channel_info_counters">
    <div class="tgme_channel_info_counter"><span class="counter_value">12.5K</span> <span class="counter_type">subscribers</span></div>
    <div class="tgme_channel_info_counter"><span class="counter_value">340</span> <span class="counter_type">photos</span></div>
  </div>
</div>
<div class="tgme_widget_message" data-post="rustnews/10">
  <div class="tgme_widget_message_owner_name"><span>Rust News</span></div>
  <div class="tgme_widget_message_text">Tokio 1.47 is out #release @tokio_rs https://tokio.rs/blog</div>
  <div class="tgme_widget_message_reactions">
    <span class="tgme_reaction"><i class="emoji">👍</i>1.2K</span>
    <span class="tgme_reaction"><i class="emoji">🔥</i>30</span>
  </div>
  <div class="tgme_widget_message_info">
    <span class="tgme_widget_message_views">15.3K</span>
    <span class="tgme_widget_message_meta">edited <time datetime="2024-03-01T10:00:00+00:00">10:00</time></span>
  </div>
</div>
<div class="tgme_widget_message" data-post="rustnews/11">
  <div class="tgme_widget_message_photo_wrap"></div>
</div>
<div class="tgme_widget_message pinned">
  <div class="tgme_widget_message_text">Pinned: read the rules</div>
  <span class="tgme_widget_message_views">900</span>
</div>
</body></html>
"#;

    #[test]
    fn parses_message_fields() {
        let records = parse_channel_page(PAGE, "rustnews", 10);
        assert_eq!(records.len(), 2);

        let post = records.iter().find(|r| r.id == "rustnews/10").unwrap();
        assert_eq!(post.source_id, "rustnews");
        assert_eq!(post.author.as_deref(), Some("Rust News"));
        assert_eq!(post.views, 15_300);
        assert_eq!(post.reactions, 1_230);
        assert!(post.edited);
        assert!(!post.pinned);
        assert_eq!(post.hashtags, vec!["release"]);
        assert_eq!(post.mentions, vec!["tokio_rs"]);
        assert_eq!(post.urls, vec!["https://tokio.rs/blog"]);
        assert_eq!(
            post.timestamp.map(|t| t.to_rfc3339()),
            Some("2024-03-01T10:00:00+00:00".to_string())
        );
    }

    #[test]
    fn newest_first_and_truncated() {
        let records = parse_channel_page(PAGE, "rustnews", 1);
        assert_eq!(records.len(), 1);
        assert!(records[0].pinned);
        assert!(records[0].id.starts_with("rustnews/h"));
        assert_eq!(records[0].views, 900);
    }

    #[test]
    fn fallback_id_is_stable() {
        assert_eq!(fallback_id("c", "hello"), fallback_id("c", "hello"));
        assert_ne!(fallback_id("c", "hello"), fallback_id("d", "hello"));
    }

    #[test]
    fn parses_channel_meta() {
        let meta = parse_channel_meta(PAGE).unwrap();
        assert_eq!(meta.title, "Rust News");
        assert_eq!(meta.description.as_deref(), Some("Weekly #rust digest"));
        assert_eq!(meta.subscribers, Some(12_500));
        assert!(parse_channel_meta("<html><body></body></html>").is_none());
    }

    #[test]
    fn counts_with_suffixes() {
        assert_eq!(parse_count("2M"), Some(2_000_000));
        assert_eq!(parse_count("1,234"), Some(1_234));
        assert_eq!(parse_count(""), None);
        assert_eq!(trailing_count("👍 45"), Some(45));
        assert_eq!(trailing_count("🔥"), None);
    }
}
