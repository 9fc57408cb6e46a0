//! Wikipedia topic provider.
//!
//! [`WikipediaClient`] searches the MediaWiki API for a topic and returns
//! the plaintext intro of the top matching pages, formatted as
//! `Page: <title>\nSummary: <extract>` blocks separated by blank lines.
//! The loader depends only on the [`TopicProvider`] trait so tests can
//! substitute a fixed provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::WikipediaConfig;
use crate::error::{RagError, Result};

/// Source of free text for a topic string.
#[async_trait]
pub trait TopicProvider: Send + Sync {
    /// Fetch content for `topic`. `Ok(None)` means the provider found nothing.
    async fn fetch(&self, topic: &str) -> Result<Option<String>>;
}

pub struct WikipediaClient {
    client: reqwest::Client,
    api_url: String,
    max_docs: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    title: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: std::collections::HashMap<String, ExtractPage>,
}

#[derive(Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: Option<String>,
}

impl WikipediaClient {
    pub fn new(config: &WikipediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("research-assistant/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagError::Configuration(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_url: format!("https://{}.wikipedia.org/w/api.php", config.language),
            max_docs: config.max_docs,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        topic: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let external = |message: String| RagError::ExternalSource {
            topic: topic.to_string(),
            message,
        };
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(|e| external(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(external(format!("Wikipedia API error {}", status)));
        }
        response.json().await.map_err(|e| external(e.to_string()))
    }

    async fn search_titles(&self, topic: &str) -> Result<Vec<String>> {
        let limit = self.max_docs.to_string();
        let resp: SearchResponse = self
            .get_json(
                topic,
                &[
                    ("action", "query"),
                    ("list", "search"),
                    ("srsearch", topic),
                    ("srlimit", &limit),
                    ("format", "json"),
                ],
            )
            .await?;
        Ok(resp
            .query
            .map(|q| q.search.into_iter().map(|hit| hit.title).collect())
            .unwrap_or_default())
    }

    async fn fetch_extracts(&self, topic: &str, titles: &[String]) -> Result<Vec<(String, String)>> {
        let joined = titles.join("|");
        let resp: ExtractResponse = self
            .get_json(
                topic,
                &[
                    ("action", "query"),
                    ("prop", "extracts"),
                    ("exintro", "1"),
                    ("explaintext", "1"),
                    ("exlimit", "max"),
                    ("redirects", "1"),
                    ("titles", &joined),
                    ("format", "json"),
                ],
            )
            .await?;
        let pages = resp.query.map(|q| q.pages).unwrap_or_default();

        // Keep search ranking order; the API returns pages keyed by id.
        let mut ordered = Vec::new();
        for title in titles {
            if let Some(page) = pages.values().find(|p| &p.title == title) {
                if let Some(extract) = page.extract.as_deref().filter(|e| !e.trim().is_empty()) {
                    ordered.push((page.title.clone(), extract.trim().to_string()));
                }
            }
        }
        Ok(ordered)
    }
}

#[async_trait]
impl TopicProvider for WikipediaClient {
    async fn fetch(&self, topic: &str) -> Result<Option<String>> {
        let titles = self.search_titles(topic).await?;
        if titles.is_empty() {
            return Ok(None);
        }
        let pages = self.fetch_extracts(topic, &titles).await?;
        tracing::debug!(topic, pages = pages.len(), "fetched Wikipedia extracts");
        Ok(format_pages(&pages))
    }
}

fn format_pages(pages: &[(String, String)]) -> Option<String> {
    if pages.is_empty() {
        return None;
    }
    Some(
        pages
            .iter()
            .map(|(title, extract)| format!("Page: {}\nSummary: {}", title, extract))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// Truncate to at most `max_chars` characters, respecting UTF-8 boundaries.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
