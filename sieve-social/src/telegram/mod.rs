//! Telegram public channel previews.
//!
//! `client` turns a source id into an HTTP request and a [`sieve_common::FetchOutcome`];
//! `extract` scrapes the returned HTML; `types` holds channel metadata.
pub mod client;
pub mod extract;
pub mod types;

pub use client::{normalize_channel, TelegramFetcher};
pub use extract::{parse_channel_meta, parse_channel_page};
pub use types::ChannelMeta;
