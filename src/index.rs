//! On-disk vector index.
//!
//! An index lives in a directory holding two co-located files:
//!
//! | File | Contents |
//! |------|----------|
//! | `index.vec` | magic `RAVEC001`, `u32` dims, `u64` count, then `count × dims` little-endian `f32` |
//! | `index.json` | docstore: format version, model, dims, count, SHA-256 of `index.vec`, and the ordered `{ id, chunk }` entries |
//!
//! Both files must be present, non-empty, and agree with each other (header,
//! counts, checksum) for the index to load; anything less is reported as
//! [`RagError::IndexNotFound`] and treated like a missing index.
//!
//! # Writes
//!
//! The index is append-only. [`IndexBuilder::build`] holds an exclusive
//! `index.lock` file for the read-append-persist cycle. [`IndexHandle::persist`]
//! writes both files to temporaries in the index directory, syncs them, and
//! renames them over the live files, vectors first and docstore last.
//!
//! # Search
//!
//! Exact (brute-force) cosine similarity over every entry, ordered by
//! decreasing score with ties kept in insertion order.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::chunk::TextSplitter;
use crate::embedding::{blob_to_vec, check_dims, cosine_similarity, embed_batched, vec_to_blob, Embedder};
use crate::error::{RagError, Result};
use crate::loader::{load_source, load_wikipedia};
use crate::models::{Chunk, Document};
use crate::wikipedia::TopicProvider;

pub const VECTORS_FILE: &str = "index.vec";
pub const DOCSTORE_FILE: &str = "index.json";
pub const LOCK_FILE: &str = "index.lock";

const MAGIC: &[u8; 8] = b"RAVEC001";
const HEADER_LEN: usize = 8 + 4 + 8;
const FORMAT_VERSION: u32 = 1;

/// A stored chunk and its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub chunk: Chunk,
    #[serde(skip)]
    pub vector: Vec<f32>,
}

/// A search result borrowed from the index.
#[derive(Debug, Clone, Copy)]
pub struct SearchHit<'a> {
    pub score: f32,
    pub entry: &'a IndexEntry,
}

#[derive(Serialize)]
struct DocstoreOut<'a> {
    version: u32,
    model: &'a str,
    dims: usize,
    count: usize,
    vectors_sha256: String,
    entries: &'a [IndexEntry],
}

#[derive(Deserialize)]
struct DocstoreIn {
    version: u32,
    model: String,
    dims: usize,
    count: usize,
    vectors_sha256: String,
    entries: Vec<IndexEntry>,
}

/// A fully loaded, internally consistent index.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    path: PathBuf,
    model: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl IndexHandle {
    /// An empty index that will be written to `path` on first persist.
    pub fn new(path: impl Into<PathBuf>, model: impl Into<String>, dims: usize) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            dims,
            entries: Vec::new(),
        }
    }

    /// True when both index files exist and are non-empty.
    ///
    /// This is a cheap presence check; [`load`](Self::load) also validates contents.
    pub fn exists(path: &Path) -> bool {
        [VECTORS_FILE, DOCSTORE_FILE].iter().all(|name| {
            std::fs::metadata(path.join(name))
                .map(|m| m.is_file() && m.len() > 0)
                .unwrap_or(false)
        })
    }

    /// Load and validate the index stored at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let not_found = |reason: String| RagError::IndexNotFound {
            path: path.to_path_buf(),
            reason,
        };

        let vec_bytes = read_non_empty(&path.join(VECTORS_FILE)).map_err(&not_found)?;
        let json_bytes = read_non_empty(&path.join(DOCSTORE_FILE)).map_err(&not_found)?;

        let (dims, count, data) = parse_vectors(&vec_bytes).map_err(&not_found)?;
        let docstore: DocstoreIn = serde_json::from_slice(&json_bytes)
            .map_err(|e| not_found(format!("{} is malformed: {}", DOCSTORE_FILE, e)))?;

        if docstore.version != FORMAT_VERSION {
            return Err(not_found(format!(
                "unsupported index version {}",
                docstore.version
            )));
        }
        if docstore.dims != dims || docstore.count != count || docstore.entries.len() != count {
            return Err(not_found(format!(
                "{} and {} disagree on size",
                VECTORS_FILE, DOCSTORE_FILE
            )));
        }
        if docstore.vectors_sha256 != sha256_hex(&vec_bytes) {
            return Err(not_found(format!(
                "{} checksum does not match {}",
                VECTORS_FILE, DOCSTORE_FILE
            )));
        }
        if count == 0 {
            return Err(not_found("index has no entries".to_string()));
        }

        let vectors = blob_to_vec(data);
        let mut entries = docstore.entries;
        for (entry, vector) in entries.iter_mut().zip(vectors.chunks_exact(dims)) {
            entry.vector = vector.to_vec();
        }

        tracing::info!(path = %path.display(), entries = count, dims, "loaded index");
        Ok(Self {
            path: path.to_path_buf(),
            model: docstore.model,
            dims,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append chunks with their embeddings. Existing entries are not touched.
    pub fn append(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Embedding {
                provider: self.model.clone(),
                message: format!(
                    "{} chunks but {} embeddings",
                    chunks.len(),
                    vectors.len()
                ),
            });
        }
        for vector in &vectors {
            check_dims(self.dims, vector.len())?;
        }
        let added = chunks.len();
        self.entries
            .extend(chunks.into_iter().zip(vectors).map(|(chunk, vector)| IndexEntry {
                id: uuid::Uuid::new_v4().to_string(),
                chunk,
                vector,
            }));
        Ok(added)
    }

    /// Top-`k` entries by cosine similarity to `query`.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit<'_>> {
        let mut hits: Vec<SearchHit<'_>> = self
            .entries
            .iter()
            .map(|entry| SearchHit {
                score: cosine_similarity(query, &entry.vector),
                entry,
            })
            .collect();
        // Stable sort: equal scores stay in insertion order.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }

    /// Write the index to its directory, replacing any previous version.
    ///
    /// On error the previous pair (or the absence of one) is left in place.
    pub fn persist(&self) -> Result<()> {
        let persist_err = |message: String| RagError::IndexPersist {
            path: self.path.clone(),
            message,
        };

        std::fs::create_dir_all(&self.path).map_err(|e| persist_err(e.to_string()))?;
        let (vec_tmp, json_tmp) = self.stage().map_err(&persist_err)?;
        self.swap_in(vec_tmp, json_tmp, &self.path.join(DOCSTORE_FILE))
            .map_err(|e| persist_err(e.to_string()))?;

        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "persisted index");
        Ok(())
    }

    /// Encode both files into synced temporaries inside the index directory.
    fn stage(&self) -> std::result::Result<(NamedTempFile, NamedTempFile), String> {
        let mut vec_bytes = Vec::with_capacity(HEADER_LEN + self.entries.len() * self.dims * 4);
        vec_bytes.extend_from_slice(MAGIC);
        vec_bytes.extend_from_slice(&(self.dims as u32).to_le_bytes());
        vec_bytes.extend_from_slice(&(self.entries.len() as u64).to_le_bytes());
        for entry in &self.entries {
            vec_bytes.extend_from_slice(&vec_to_blob(&entry.vector));
        }

        let docstore = DocstoreOut {
            version: FORMAT_VERSION,
            model: &self.model,
            dims: self.dims,
            count: self.entries.len(),
            vectors_sha256: sha256_hex(&vec_bytes),
            entries: &self.entries,
        };
        let json_bytes = serde_json::to_vec_pretty(&docstore).map_err(|e| e.to_string())?;

        let vec_tmp = write_temp(&self.path, &vec_bytes).map_err(|e| e.to_string())?;
        let json_tmp = write_temp(&self.path, &json_bytes).map_err(|e| e.to_string())?;
        Ok((vec_tmp, json_tmp))
    }

    /// Rename the staged files over the live pair, vectors first.
    ///
    /// The live `index.vec` is copied aside before it is replaced. If the
    /// docstore rename then fails, the copy is renamed back (or the new
    /// vector file removed when there was no previous one), so the live pair
    /// still matches.
    fn swap_in(
        &self,
        vec_tmp: NamedTempFile,
        json_tmp: NamedTempFile,
        docstore_path: &Path,
    ) -> std::io::Result<()> {
        let vectors_path = self.path.join(VECTORS_FILE);
        let previous = match std::fs::read(&vectors_path) {
            Ok(bytes) => Some(write_temp(&self.path, &bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        vec_tmp.persist(&vectors_path)?;
        if let Err(e) = json_tmp.persist(docstore_path) {
            let restored = match previous {
                Some(saved) => saved.persist(&vectors_path).map(|_| ()).map_err(|e| e.error),
                None => std::fs::remove_file(&vectors_path),
            };
            if let Err(restore) = restored {
                tracing::error!(
                    path = %self.path.display(),
                    error = %restore,
                    "could not restore previous index.vec; index will load as missing"
                );
            }
            return Err(e.error);
        }
        Ok(())
    }
}

fn read_non_empty(path: &Path) -> std::result::Result<Vec<u8>, String> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Err(format!("{} is empty", name)),
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(format!("{} is missing", name)),
        Err(e) => Err(format!("{} is unreadable: {}", name, e)),
    }
}

/// Parse the `index.vec` header, returning `(dims, count, vector_data)`.
fn parse_vectors(bytes: &[u8]) -> std::result::Result<(usize, usize, &[u8]), String> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(format!("{} has an invalid header", VECTORS_FILE));
    }
    let dims = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[12..20]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let data = &bytes[HEADER_LEN..];
    let expected = count.checked_mul(dims).and_then(|n| n.checked_mul(4));
    if dims == 0 || expected != Some(data.len()) {
        return Err(format!("{} is truncated or corrupt", VECTORS_FILE));
    }
    Ok((dims, count, data))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn write_temp(dir: &Path, bytes: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Exclusive writer lock on an index directory, released on drop.
///
/// The lock file carries a token unique to its holder. It is written to a
/// temporary first and linked into place with `persist_noclobber`, so a
/// visible lock file always has its token, and a holder only ever removes a
/// lock file that still carries its own token.
#[derive(Debug)]
pub struct BuildLock {
    path: PathBuf,
    token: String,
}

impl BuildLock {
    /// Take the lock, reclaiming it if the holder has been gone longer than `stale_after`.
    pub fn acquire(index_path: &Path, stale_after: Duration) -> Result<Self> {
        std::fs::create_dir_all(index_path).map_err(|e| RagError::IndexPersist {
            path: index_path.to_path_buf(),
            message: e.to_string(),
        })?;
        let lock_path = index_path.join(LOCK_FILE);
        let token = format!("{}-{}", std::process::id(), uuid::Uuid::new_v4());

        for attempt in 0..2 {
            let body = format!(
                "pid={}\ntoken={}\nstarted={}\n",
                std::process::id(),
                token,
                chrono::Utc::now().to_rfc3339()
            );
            let staged = write_temp(index_path, body.as_bytes())?;
            match staged.persist_noclobber(&lock_path) {
                Ok(_) => {
                    return Ok(Self {
                        path: lock_path,
                        token,
                    })
                }
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                    if attempt > 0 || !lock_is_stale(&lock_path, stale_after) {
                        break;
                    }
                    let Some(stale_token) = read_lock_token(&lock_path) else {
                        continue;
                    };
                    tracing::warn!(lock = %lock_path.display(), "reclaiming stale build lock");
                    if !reclaim_lock(&lock_path, &stale_token)? {
                        break;
                    }
                }
                Err(e) => return Err(e.error.into()),
            }
        }

        Err(RagError::BuildInProgress {
            path: index_path.to_path_buf(),
        })
    }
}

impl Drop for BuildLock {
    fn drop(&mut self) {
        match read_lock_token(&self.path) {
            Some(token) if token == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    tracing::warn!(lock = %self.path.display(), error = %e, "failed to release build lock");
                }
            }
            _ => {
                tracing::warn!(lock = %self.path.display(), "build lock was reclaimed by another builder");
            }
        }
    }
}

fn lock_is_stale(path: &Path, stale_after: Duration) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

/// The `token=` line of a lock file, or the whole body for locks without one.
fn read_lock_token(path: &Path) -> Option<String> {
    let body = std::fs::read_to_string(path).ok()?;
    let token = body
        .lines()
        .find_map(|line| line.strip_prefix("token="))
        .unwrap_or(body.as_str());
    Some(token.to_string())
}

/// Move a stale lock aside and drop it, but only if it still carries
/// `stale_token`. Returns false when another builder got there first.
fn reclaim_lock(lock_path: &Path, stale_token: &str) -> std::io::Result<bool> {
    let aside = lock_path.with_extension(format!("lock.stale-{}", uuid::Uuid::new_v4().simple()));
    match std::fs::rename(lock_path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    }

    if read_lock_token(&aside).as_deref() == Some(stale_token) {
        std::fs::remove_file(&aside)?;
        return Ok(true);
    }

    // A fresh lock was moved aside; put it back unless a third builder already holds the path.
    if let Err(e) = std::fs::hard_link(&aside, lock_path) {
        tracing::warn!(lock = %lock_path.display(), error = %e, "could not restore moved build lock");
    }
    std::fs::remove_file(&aside)?;
    Ok(false)
}

/// A source that failed to load and was left out of the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub source: String,
    pub reason: String,
}

/// Summary of a successful build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub documents: usize,
    pub chunks: usize,
    pub appended: usize,
    pub total_entries: usize,
    /// True when no usable index existed before this build.
    pub created: bool,
    pub skipped: Vec<SkippedSource>,
}

/// Loads sources, chunks them, embeds the chunks, and appends them to an index.
pub struct IndexBuilder<'a> {
    embedder: &'a dyn Embedder,
    topics: &'a dyn TopicProvider,
    splitter: TextSplitter,
    batch_size: usize,
    max_topic_chars: usize,
    lock_stale: Duration,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(embedder: &'a dyn Embedder, topics: &'a dyn TopicProvider) -> Self {
        Self {
            embedder,
            topics,
            splitter: TextSplitter::default(),
            batch_size: 64,
            max_topic_chars: 10_000,
            lock_stale: Duration::from_secs(3600),
        }
    }

    pub fn splitter(mut self, splitter: TextSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn max_topic_chars(mut self, max_chars: usize) -> Self {
        self.max_topic_chars = max_chars;
        self
    }

    pub fn lock_stale_after(mut self, stale_after: Duration) -> Self {
        self.lock_stale = stale_after;
        self
    }

    /// Build a new index at `index_path`, or append to the one already there.
    ///
    /// Individual sources that fail to load are logged and reported in
    /// [`BuildReport::skipped`]. The index is left untouched when nothing
    /// loads ([`RagError::NoDocuments`]), nothing chunks
    /// ([`RagError::NoChunks`]), or any later step fails.
    pub async fn build(
        &self,
        sources: &[PathBuf],
        use_topic: bool,
        topic: &str,
        index_path: &Path,
    ) -> Result<BuildReport> {
        let (documents, skipped) = self.load_documents(sources, use_topic, topic).await;
        if documents.is_empty() {
            return Err(RagError::NoDocuments);
        }

        let chunks = self.splitter.chunk(&documents);
        if chunks.is_empty() {
            return Err(RagError::NoChunks);
        }

        let _lock = BuildLock::acquire(index_path, self.lock_stale)?;

        let (mut handle, created) = match IndexHandle::load(index_path) {
            Ok(existing) => {
                check_dims(existing.dims(), self.embedder.dims())?;
                if existing.model() != self.embedder.model_name() {
                    tracing::warn!(
                        index_model = existing.model(),
                        embedder_model = self.embedder.model_name(),
                        "appending with a different embedding model of the same dimensionality"
                    );
                }
                (existing, false)
            }
            Err(e) => {
                if IndexHandle::exists(index_path) {
                    tracing::warn!(error = %e, "existing index is unusable, replacing it");
                }
                (
                    IndexHandle::new(index_path, self.embedder.model_name(), self.embedder.dims()),
                    true,
                )
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_batched(self.embedder, &texts, self.batch_size).await?;

        let chunk_count = chunks.len();
        let appended = handle.append(chunks, vectors)?;
        handle.persist()?;

        let report = BuildReport {
            documents: documents.len(),
            chunks: chunk_count,
            appended,
            total_entries: handle.len(),
            created,
            skipped,
        };
        tracing::info!(
            path = %index_path.display(),
            documents = report.documents,
            appended = report.appended,
            total = report.total_entries,
            created = report.created,
            "index build complete"
        );
        Ok(report)
    }

    async fn load_documents(
        &self,
        sources: &[PathBuf],
        use_topic: bool,
        topic: &str,
    ) -> (Vec<Document>, Vec<SkippedSource>) {
        let mut documents = Vec::new();
        let mut skipped = Vec::new();

        for path in sources {
            let owned = path.clone();
            let loaded = tokio::task::spawn_blocking(move || load_source(&owned))
                .await
                .unwrap_or_else(|e| Err(RagError::Io(std::io::Error::other(e.to_string()))));
            match loaded {
                Ok(docs) => {
                    tracing::info!(source = %path.display(), documents = docs.len(), "loaded source");
                    documents.extend(docs);
                }
                Err(e) => {
                    tracing::warn!(source = %path.display(), error = %e, "skipping source");
                    skipped.push(SkippedSource {
                        source: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if use_topic {
            let topic = topic.trim();
            let label = format!("Wikipedia:{}", topic);
            if topic.is_empty() {
                tracing::warn!("topic requested but empty, skipping");
                skipped.push(SkippedSource {
                    source: label,
                    reason: "empty topic".to_string(),
                });
            } else {
                match load_wikipedia(self.topics, topic, self.max_topic_chars).await {
                    Ok(docs) => {
                        tracing::info!(topic, "loaded topic");
                        documents.extend(docs);
                    }
                    Err(e) => {
                        tracing::warn!(topic, error = %e, "skipping topic");
                        skipped.push(SkippedSource {
                            source: label,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        (documents, skipped)
    }
}
