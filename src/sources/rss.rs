use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use url::Url;

use crate::sources::{NewsItem, NewsSource};

/// Best-effort RSS ingestion. Feed parsing is deliberately minimal: the items
/// only need a title (for issuer matching), a link, and a publication time.
/// A feed that fails to fetch or parse is skipped; the remaining feeds still
/// contribute their items.
pub struct RssNewsClient {
    http: reqwest::Client,
}

impl RssNewsClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build news HTTP client")?;
        Ok(Self { http })
    }

    async fn fetch_feed(&self, feed_url: &str) -> Result<Vec<NewsItem>> {
        let body = self
            .http
            .get(feed_url)
            .send()
            .await
            .context("feed request failed")?
            .error_for_status()
            .context("feed request returned error status")?
            .text()
            .await
            .context("feed body unavailable")?;
        Ok(parse_feed_items(&body, &source_label(feed_url)))
    }
}

impl NewsSource for RssNewsClient {
    async fn fetch_items(&self, feed_urls: &[String]) -> Result<Vec<NewsItem>> {
        let mut items = Vec::new();
        for feed_url in feed_urls {
            match self.fetch_feed(feed_url).await {
                Ok(mut feed_items) => items.append(&mut feed_items),
                Err(err) => {
                    tracing::warn!(feed_url = %feed_url, error = %err, "skipping failed news feed");
                }
            }
        }
        Ok(items)
    }
}

/// Label items by the feed's host so events stay traceable to their origin.
fn source_label(feed_url: &str) -> String {
    Url::parse(feed_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "rss".to_string())
}

/// Extract `<item>` entries from an RSS body. Items without a title are
/// dropped; a missing or unparsable `<pubDate>` falls back to the epoch.
pub fn parse_feed_items(xml: &str, source: &str) -> Vec<NewsItem> {
    let mut items = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<item>").or_else(|| rest.find("<item ")) {
        let Some(end) = rest[start..].find("</item>") else {
            break;
        };
        let block = &rest[start..start + end];
        rest = &rest[start + end + "</item>".len()..];

        let Some(title) = extract_tag(block, "title") else {
            continue;
        };
        if title.is_empty() {
            continue;
        }
        let url = extract_tag(block, "link").filter(|l| !l.is_empty());
        let published_at = extract_tag(block, "pubDate")
            .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());

        items.push(NewsItem {
            source: source.to_string(),
            title,
            url,
            published_at,
            sentiment: None,
        });
    }
    items
}

/// First occurrence of `<tag>...</tag>` inside a block, CDATA unwrapped and
/// common entities decoded.
fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = block.find(&open)? + open.len();
    let end = block[start..].find(&close)? + start;
    let raw = block[start..end].trim();
    let inner = raw
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw);
    Some(decode_entities(inner.trim()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
