//! Index build orchestration.
//!
//! Wires configuration into an [`IndexBuilder`]: resolve the embedding
//! provider (failing on missing credentials before any I/O), expand
//! directory arguments, then load → chunk → embed → append → persist.

use std::path::PathBuf;
use std::time::Duration;

use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::Result;
use crate::index::{BuildReport, IndexBuilder};
use crate::loader::expand_sources;
use crate::wikipedia::{TopicProvider, WikipediaClient};

/// An [`IndexBuilder`] with chunking, batching, and locking taken from `config`.
pub fn configured_builder<'a>(
    config: &Config,
    embedder: &'a dyn Embedder,
    topics: &'a dyn TopicProvider,
) -> IndexBuilder<'a> {
    IndexBuilder::new(embedder, topics)
        .splitter(TextSplitter::from_config(&config.chunking))
        .batch_size(config.embedding.batch_size)
        .max_topic_chars(config.wikipedia.max_chars)
        .lock_stale_after(Duration::from_secs(config.index.lock_stale_secs))
}

/// Build or extend the index at `config.index.path`.
pub async fn build_index(
    config: &Config,
    source_paths: &[PathBuf],
    use_topic: bool,
    topic: &str,
) -> Result<BuildReport> {
    let embedder = create_embedder(&config.embedding)?;
    let wikipedia = WikipediaClient::new(&config.wikipedia)?;
    let sources = expand_sources(source_paths)?;

    tracing::info!(
        sources = sources.len(),
        use_topic,
        index = %config.index.path.display(),
        "building index"
    );

    configured_builder(config, embedder.as_ref(), &wikipedia)
        .build(&sources, use_topic, topic, &config.index.path)
        .await
}
