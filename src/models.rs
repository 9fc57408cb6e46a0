//! Core data models used throughout the assistant.
//!
//! These types represent the documents, chunks, conversation turns, and
//! query results that flow through the ingestion and retrieval pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata key naming where a document came from.
pub const SOURCE_KEY: &str = "source";

/// Normalized text produced by a loader.
///
/// `text` is never empty after trimming and `metadata` always carries
/// a [`SOURCE_KEY`] entry. Documents are not mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_KEY.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }
}

/// A contiguous segment of a [`Document`]'s text.
///
/// `start` is the character offset of `text` within the parent text.
/// Metadata is inherited from the parent unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub start: usize,
}

impl Chunk {
    pub fn source(&self) -> &str {
        self.metadata
            .get(SOURCE_KEY)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }
}

/// Speaker of a conversation [`Turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Answer plus the distinct sources of the chunks it was grounded on,
/// in first-seen retrieval order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub answer: String,
    pub sources: Vec<String>,
}

impl QueryResult {
    /// A result that reports a failure as its answer and carries no sources.
    pub fn degraded(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
        }
    }
}

/// Collect `source` metadata from chunks, de-duplicated by first occurrence.
pub fn unique_sources<'a, I>(chunks: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let mut sources: Vec<String> = Vec::new();
    for chunk in chunks {
        let src = chunk.source();
        if !sources.iter().any(|s| s == src) {
            sources.push(src.to_string());
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_from(source: &str) -> Chunk {
        let doc = Document::new("text", source);
        Chunk {
            text: doc.text,
            metadata: doc.metadata,
            start: 0,
        }
    }

    #[test]
    fn sources_keep_first_seen_order() {
        let chunks: Vec<Chunk> = ["a", "b", "a", "c"].iter().map(|s| chunk_from(s)).collect();
        assert_eq!(unique_sources(&chunks), vec!["a", "b", "c"]);
    }

    #[test]
    fn missing_source_reports_unknown() {
        let chunk = Chunk {
            text: "x".into(),
            metadata: BTreeMap::new(),
            start: 0,
        };
        assert_eq!(chunk.source(), "Unknown");
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }
}
