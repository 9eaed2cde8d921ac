// src/ingest/providers/rss.rs
//! RSS 2.0 / RSS 1.0 (RDF) / Atom provider.

use std::time::Duration;

use async_trait::async_trait;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{FeedItem, FeedSource};

const USER_AGENT: &str = "slavic-news-relay/0.1 (RSS reader)";

#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct Rss {
    #[serde(default)]
    channel: Option<Channel>,
    // RSS 1.0 keeps items next to the channel, not inside it
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<Text>,
    link: Option<Text>,
    description: Option<Text>,
    #[serde(rename = "category", default)]
    categories: Vec<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct Atom {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    summary: Option<Text>,
    content: Option<Text>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    published: Option<Text>,
    updated: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term", default)]
    term: String,
}

fn parse_rfc2822_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
}

fn parse_rfc3339_to_unix(ts: &str) -> Option<u64> {
    OffsetDateTime::parse(ts.trim(), &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp()).ok())
}

// XML only knows five named entities; feeds routinely use HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", "&#160;")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&bdquo;", "\"")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&laquo;", "\"")
        .replace("&raquo;", "\"")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn clean_tags<I: IntoIterator<Item = String>>(raw: I) -> Vec<String> {
    raw.into_iter()
        .map(|t| normalize_text(&t))
        .filter(|t| !t.is_empty())
        .collect()
}

fn root_element(xml: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => {
                return Ok(String::from_utf8_lossy(e.local_name().as_ref()).to_ascii_lowercase())
            }
            Event::Eof => return Ok(String::new()),
            _ => {}
        }
    }
}

/// Parse a feed document into items labelled with `source_name`.
pub fn parse_feed(source_name: &str, xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let parse_err = |message: String| FetchError::Parse {
        source_name: source_name.to_string(),
        message,
    };
    let xml = scrub_html_entities_for_xml(xml);

    let items: Vec<FeedItem> = match root_element(&xml).map_err(|e| parse_err(e.to_string()))?.as_str() {
        "rss" | "rdf" => {
            let rss: Rss = from_str(&xml).map_err(|e| parse_err(e.to_string()))?;
            let mut raw = rss.items;
            if let Some(ch) = rss.channel {
                raw.extend(ch.items);
            }
            raw.into_iter().map(|it| rss_item(source_name, it)).collect()
        }
        "feed" => {
            let atom: Atom = from_str(&xml).map_err(|e| parse_err(e.to_string()))?;
            atom.entries
                .into_iter()
                .map(|e| atom_entry(source_name, e))
                .collect()
        }
        other => return Err(parse_err(format!("unrecognized root element <{other}>"))),
    };

    Ok(items
        .into_iter()
        .filter(|it| !(it.title.is_empty() && it.link.is_empty()))
        .collect())
}

fn rss_item(source_name: &str, it: RssItem) -> FeedItem {
    FeedItem {
        title: normalize_text(&it.title.unwrap_or_default().value),
        summary: non_empty(normalize_text(&it.description.unwrap_or_default().value)),
        link: it.link.unwrap_or_default().value.trim().to_string(),
        tags: clean_tags(it.categories.into_iter().map(|c| c.value)),
        source_name: Some(source_name.to_string()),
        published_at: it.pub_date.and_then(|d| parse_rfc2822_to_unix(&d.value)),
    }
}

fn atom_entry(source_name: &str, e: AtomEntry) -> FeedItem {
    let link = e
        .links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| e.links.first())
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();
    let summary = e.summary.or(e.content).unwrap_or_default().value;
    let published_at = e
        .published
        .or(e.updated)
        .and_then(|d| parse_rfc3339_to_unix(&d.value));

    FeedItem {
        title: normalize_text(&e.title.unwrap_or_default().value),
        summary: non_empty(normalize_text(&summary)),
        link,
        tags: clean_tags(e.categories.into_iter().map(|c| c.term)),
        source_name: Some(source_name.to_string()),
        published_at,
    }
}

pub struct RssFeed {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssFeed {
    /// Serve a fixed document; used by tests and offline runs.
    pub fn from_fixture(name: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.into()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client,
            },
        }
    }

    /// Shared client for all feeds, bounded by `timeout`.
    pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
    }

    async fn fetch_body(&self, url: &str, client: &reqwest::Client) -> Result<String, FetchError> {
        let resp = client.get(url).send().await.map_err(|e| FetchError::Http {
            source_name: self.name.clone(),
            message: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                source_name: self.name.clone(),
                status: status.as_u16(),
            });
        }
        // Decodes per the Content-Type charset, UTF-8 when absent.
        resp.text().await.map_err(|e| FetchError::Http {
            source_name: self.name.clone(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl FeedSource for RssFeed {
    async fn fetch_latest(&self) -> Result<Vec<FeedItem>, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => parse_feed(&self.name, s),
            Mode::Http { url, client } => {
                let body = self.fetch_body(url, client).await?;
                parse_feed(&self.name, &body)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
