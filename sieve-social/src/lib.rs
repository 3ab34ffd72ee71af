//! Source fetchers for sieve.
//!
//! Only public Telegram channels are implemented: their web preview pages
//! (`t.me/s/<channel>`) are fetched over plain HTTP and scraped into records.
pub mod telegram;
