//! Deterministic stand-ins for the network-backed providers.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use research_assistant::config::Config;
use research_assistant::embedding::Embedder;
use research_assistant::error::{RagError, Result};
use research_assistant::llm::LanguageModel;
use research_assistant::wikipedia::TopicProvider;

/// Bag-of-words embedder: each lowercase word increments one hashed bucket.
pub struct HashEmbedder {
    dims: usize,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            calls: AtomicUsize::new(0),
        }
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hash: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                hash ^= b as u64;
                hash = hash.wrapping_mul(0x100000001b3);
            }
            v[(hash % self.dims as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }
    fn dims(&self) -> usize {
        self.dims
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Embeds every text to the same vector, so all scores tie.
pub struct ConstEmbedder;

#[async_trait]
impl Embedder for ConstEmbedder {
    fn model_name(&self) -> &str {
        "const"
    }
    fn dims(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.5, 0.5, 0.5, 0.5]).collect())
    }
}

/// Returns a fixed answer and records every prompt it receives.
pub struct ScriptedModel {
    answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    fn model_name(&self) -> &str {
        "failing"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::AnswerGeneration("API error 503: overloaded".to_string()))
    }
}

pub struct SlowModel(pub Duration);

#[async_trait]
impl LanguageModel for SlowModel {
    fn model_name(&self) -> &str {
        "slow"
    }
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(self.0).await;
        Ok("too late".to_string())
    }
}

/// Topic provider with canned content (or none).
pub struct FixedTopics(pub Option<String>);

#[async_trait]
impl TopicProvider for FixedTopics {
    async fn fetch(&self, _topic: &str) -> Result<Option<String>> {
        Ok(self.0.clone())
    }
}

/// Config rooted in `root`: index under `root/index`, transcripts under `root/logs`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.index.path = root.join("index");
    config.transcript.dir = root.join("logs");
    config.chunking.chunk_size = 120;
    config.chunking.chunk_overlap = 20;
    config.embedding.batch_size = 4;
    config
}

pub fn hash_embedder() -> Arc<HashEmbedder> {
    Arc::new(HashEmbedder::new(64))
}

pub fn write_file(root: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = root.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

pub const RUST_TEXT: &str = "Rust is a systems programming language focused on memory safety.\n\n\
The borrow checker enforces ownership rules at compile time.\n\n\
Cargo is the Rust package manager and build tool.";

pub const OCEAN_TEXT: &str = "The Pacific Ocean is the largest ocean on Earth.\n\n\
Coral reefs grow in warm shallow tropical water.\n\n\
Tides are caused by the gravitational pull of the moon.";
