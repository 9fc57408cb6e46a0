//! Top-k retrieval over a loaded index.
//!
//! A [`Retriever`] only exists once an index has loaded successfully, so
//! holding one is proof that the system can answer queries.

use std::path::Path;
use std::sync::Arc;

use crate::embedding::{check_dims, Embedder};
use crate::error::{RagError, Result};
use crate::index::IndexHandle;
use crate::models::Chunk;

#[derive(Clone)]
pub struct Retriever {
    index: Arc<IndexHandle>,
    embedder: Arc<dyn Embedder>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index.path())
            .field("entries", &self.index.len())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl Retriever {
    /// Bind a loaded index to the embedder that produced it.
    pub fn new(index: Arc<IndexHandle>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        check_dims(index.dims(), embedder.dims())
            .map_err(|e| RagError::RetrieverUnavailable(e.to_string()))?;
        Ok(Self { index, embedder })
    }

    /// Load the index at `path` and bind it.
    pub fn open(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let index = IndexHandle::load(path).map_err(|e| RagError::RetrieverUnavailable(e.to_string()))?;
        Self::new(Arc::new(index), embedder)
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Return up to `k` chunks most similar to `query`, best first.
    ///
    /// Fewer than `k` chunks come back when the index is smaller than `k`.
    pub async fn retrieve(&self, query: &str, k: i64) -> Result<Vec<Chunk>> {
        if k <= 0 {
            return Err(RagError::InvalidArgument(format!(
                "k must be a positive integer, got {}",
                k
            )));
        }

        let query_vec = self.embedder.embed_query(query).await?;
        check_dims(self.index.dims(), query_vec.len())?;

        let hits = self.index.search(&query_vec, k as usize);
        tracing::debug!(k, hits = hits.len(), "retrieved chunks");
        Ok(hits.into_iter().map(|hit| hit.entry.chunk.clone()).collect())
    }
}
