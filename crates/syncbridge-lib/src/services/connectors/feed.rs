// Feed Connector
// Fetches an RSS or Atom document and returns its newest entry as
// `{title, link, summary}`, or null when the feed has no entries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Value};

use super::{ensure_success, require_http_url, Connector, ConnectorContext, ConnectorError, ConnectorResult};
use crate::models::{Integration, IntegrationType};

#[allow(clippy::expect_used)]
static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("numeric entity pattern"));

#[allow(clippy::expect_used)]
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("html tag pattern"));

/// One parsed feed entry
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Utc>>,
}

impl FeedEntry {
    fn to_value(&self) -> Value {
        json!({
            "title": self.title,
            "link": self.link,
            "summary": self.summary,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct FeedConnector;

#[async_trait]
impl Connector for FeedConnector {
    fn integration_type(&self) -> IntegrationType {
        IntegrationType::Feed
    }

    async fn fetch(&self, integration: &Integration, ctx: &ConnectorContext) -> ConnectorResult<Value> {
        let feed_url = integration
            .config_str("feed_url")
            .ok_or_else(|| ConnectorError::config("feed_url is required"))?;
        let url = require_http_url(feed_url, "feed_url")?;

        let response = ctx
            .client
            .get(url)
            .header(
                "Accept",
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, */*;q=0.8",
            )
            .send()
            .await?;
        let body = ensure_success(response).await?.text().await?;

        if !body.contains('<') {
            return Err(ConnectorError::Parse("Response is not an XML feed".to_string()));
        }

        let entries = parse_feed(&body);
        log::debug!(
            "[connector:feed] {} entries from {}",
            entries.len(),
            feed_url
        );
        Ok(newest(&entries).map(FeedEntry::to_value).unwrap_or(Value::Null))
    }
}

/// Parse RSS `<item>` and Atom `<entry>` elements in document order
pub fn parse_feed(xml: &str) -> Vec<FeedEntry> {
    let mut entries: Vec<FeedEntry> = elements(xml, "item")
        .into_iter()
        .map(|item| FeedEntry {
            title: child_text(item.inner, "title").unwrap_or_default(),
            link: child_text(item.inner, "link")
                .or_else(|| child_text(item.inner, "guid"))
                .unwrap_or_default(),
            summary: child_text(item.inner, "description")
                .map(|s| strip_html(&s))
                .unwrap_or_default(),
            published: child_text(item.inner, "pubDate")
                .or_else(|| child_text(item.inner, "dc:date"))
                .and_then(|d| parse_date(&d)),
        })
        .collect();

    entries.extend(elements(xml, "entry").into_iter().map(|entry| FeedEntry {
        title: child_text(entry.inner, "title").unwrap_or_default(),
        link: atom_link(entry.inner).unwrap_or_default(),
        summary: child_text(entry.inner, "summary")
            .or_else(|| child_text(entry.inner, "content"))
            .map(|s| strip_html(&s))
            .unwrap_or_default(),
        published: child_text(entry.inner, "published")
            .or_else(|| child_text(entry.inner, "updated"))
            .and_then(|d| parse_date(&d)),
    }));

    entries
}

/// Latest dated entry; document order decides when dates are missing
fn newest(entries: &[FeedEntry]) -> Option<&FeedEntry> {
    let first = entries.first()?;
    if entries.iter().all(|e| e.published.is_some()) {
        // max_by_key keeps the last maximum, so scan in reverse to prefer earlier ties
        entries.iter().rev().max_by_key(|e| e.published)
    } else {
        Some(first)
    }
}

struct Element<'a> {
    attrs: &'a str,
    inner: &'a str,
}

/// Find `<tag ...>inner</tag>` occurrences (self-closing tags have empty inner)
fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(offset) = xml[pos..].find(&open) {
        let start = pos + offset;
        let after_name = start + open.len();
        // Reject longer names such as <items> when looking for <item>
        match xml[after_name..].chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {}
            _ => {
                pos = after_name;
                continue;
            }
        }
        let Some(tag_end) = xml[after_name..].find('>') else {
            break;
        };
        let tag_end = after_name + tag_end;
        let attrs = &xml[after_name..tag_end];

        if attrs.ends_with('/') {
            found.push(Element {
                attrs: attrs.trim_end_matches('/'),
                inner: "",
            });
            pos = tag_end + 1;
            continue;
        }

        let content_start = tag_end + 1;
        let Some(end) = find_close(&xml[content_start..], &close) else {
            break;
        };
        found.push(Element {
            attrs,
            inner: &xml[content_start..content_start + end],
        });
        pos = content_start + end + close.len();
    }

    found
}

/// Position of the closing tag, skipping over CDATA sections
fn find_close(haystack: &str, close: &str) -> Option<usize> {
    let mut pos = 0;
    loop {
        let next_close = haystack[pos..].find(close)? + pos;
        match haystack[pos..].find("<![CDATA[") {
            Some(cdata) if pos + cdata < next_close => {
                let cdata_start = pos + cdata;
                let cdata_end = haystack[cdata_start..].find("]]>")? + cdata_start;
                pos = cdata_end + 3;
            }
            _ => return Some(next_close),
        }
    }
}

fn child_text(block: &str, tag: &str) -> Option<String> {
    elements(block, tag)
        .into_iter()
        .map(|e| text_content(e.inner))
        .find(|t| !t.is_empty())
}

fn atom_link(block: &str) -> Option<String> {
    let links = elements(block, "link");
    links
        .iter()
        .find(|l| matches!(attribute(l.attrs, "rel").as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .and_then(|l| attribute(l.attrs, "href"))
        .or_else(|| links.first().map(|l| text_content(l.inner)).filter(|t| !t.is_empty()))
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    for quote in ['"', '\''] {
        let pattern = format!("{}={}", name, quote);
        let mut pos = 0;
        while let Some(offset) = attrs[pos..].find(&pattern) {
            let start = pos + offset;
            let boundary = attrs[..start].chars().last().map_or(true, char::is_whitespace);
            let value_start = start + pattern.len();
            if boundary {
                let end = attrs[value_start..].find(quote)?;
                return Some(decode_entities(&attrs[value_start..value_start + end]));
            }
            pos = value_start;
        }
    }
    None
}

/// Unwrap CDATA sections and decode entities
fn text_content(raw: &str) -> String {
    let trimmed = raw.trim();
    let text = match trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
    {
        Some(inner) => inner.to_string(),
        None => decode_entities(trimmed),
    };
    text.trim().to_string()
}

fn decode_entities(text: &str) -> String {
    let named = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");
    let numeric = NUMERIC_ENTITY.replace_all(&named, |caps: &Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });
    // Last so "&amp;lt;" stays "&lt;"
    numeric.replace("&amp;", "&")
}

fn strip_html(text: &str) -> String {
    let stripped = HTML_TAG.replace_all(text, " ");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .or_else(|_| DateTime::parse_from_rfc3339(raw.trim()))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
