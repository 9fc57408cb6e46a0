//! Conversational question answering over an index.
//!
//! A [`Session`] owns everything one conversation needs: configuration, the
//! embedding and language model clients, the retriever state, conversation
//! memory, and an optional transcript log. Sessions are independent; two
//! sessions never share memory.
//!
//! # State
//!
//! ```text
//!  NotReady ──initialize()──▶ Ready(retriever)
//!      ▲                         │
//!      └── never automatically ──┘   reinitialize() swaps the retriever
//! ```
//!
//! [`Session::ask`] never fails. Every error, including an unready index, is
//! turned into a [`QueryResult`] whose answer describes the problem, and the
//! query/answer pair is always recorded in memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::error::{RagError, Result};
use crate::index::BuildReport;
use crate::ingest::configured_builder;
use crate::llm::{create_language_model, LanguageModel};
use crate::loader::expand_sources;
use crate::memory::ConversationMemory;
use crate::models::{unique_sources, Chunk, QueryResult, Turn};
use crate::retriever::Retriever;
use crate::transcript::TranscriptLog;
use crate::wikipedia::TopicProvider;

/// Answer returned while no index can be loaded.
pub const NOT_READY_ANSWER: &str = "Error: No documents loaded. Please upload documents first.";

const PROMPT_INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

#[derive(Debug, Clone)]
pub enum EngineState {
    NotReady,
    Ready(Retriever),
}

pub struct Session {
    config: Config,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    state: EngineState,
    memory: ConversationMemory,
    transcript: Option<TranscriptLog>,
}

impl Session {
    /// Create an unready session. The transcript log follows `config.transcript`.
    pub fn new(config: Config, embedder: Arc<dyn Embedder>, llm: Arc<dyn LanguageModel>) -> Self {
        let transcript = config
            .transcript
            .enabled
            .then(|| TranscriptLog::new(config.transcript.dir.clone()));
        Self {
            config,
            embedder,
            llm,
            state: EngineState::NotReady,
            memory: ConversationMemory::new(),
            transcript,
        }
    }

    /// Create a session with the providers named in `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let llm = create_language_model(&config.llm)?;
        Ok(Self::new(config, embedder, llm))
    }

    pub fn with_transcript(mut self, transcript: Option<TranscriptLog>) -> Self {
        self.transcript = transcript;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, EngineState::Ready(_))
    }

    /// Load the configured index if no retriever is bound yet.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }
        self.reinitialize()
    }

    /// Reload the configured index and replace the bound retriever.
    ///
    /// On failure the current state is kept.
    pub fn reinitialize(&mut self) -> Result<()> {
        let retriever = Retriever::open(&self.config.index.path, self.embedder.clone())?;
        tracing::info!(
            path = %self.config.index.path.display(),
            entries = retriever.index().len(),
            "retriever ready"
        );
        self.state = EngineState::Ready(retriever);
        Ok(())
    }

    /// Build or extend the configured index, then bind a retriever to the result.
    pub async fn build_and_reload(
        &mut self,
        topics: &dyn TopicProvider,
        sources: &[PathBuf],
        use_topic: bool,
        topic: &str,
    ) -> Result<BuildReport> {
        let sources = expand_sources(sources)?;
        let report = configured_builder(&self.config, self.embedder.as_ref(), topics)
            .build(&sources, use_topic, topic, &self.config.index.path)
            .await?;
        self.reinitialize()?;
        Ok(report)
    }

    /// Answer `query` from the index. Never fails; see the module docs.
    pub async fn ask(&mut self, query: &str) -> QueryResult {
        let result = match self.answer(query).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "query failed");
                QueryResult::degraded(format!("Error processing query: {}", e))
            }
        };

        self.memory.append(Turn::user(query));
        self.memory.append(Turn::assistant(result.answer.clone()));

        if let Some(log) = &self.transcript {
            if let Err(e) = log.record(query, &result) {
                tracing::warn!(dir = %log.dir().display(), error = %e, "failed to write transcript");
            }
        }
        result
    }

    async fn answer(&mut self, query: &str) -> Result<QueryResult> {
        if !self.is_ready() {
            if let Err(e) = self.initialize() {
                tracing::info!(error = %e, "no index available");
                return Ok(QueryResult::degraded(NOT_READY_ANSWER));
            }
        }
        let retriever = match &self.state {
            EngineState::Ready(retriever) => retriever.clone(),
            EngineState::NotReady => return Ok(QueryResult::degraded(NOT_READY_ANSWER)),
        };

        let chunks = with_deadline(
            self.config.embedding.timeout(),
            "query embedding",
            retriever.retrieve(query, self.config.retrieval.k),
        )
        .await?;

        let prompt = build_prompt(&chunks, query);
        let answer = with_deadline(
            self.config.llm.timeout(),
            "answer generation",
            self.llm.generate(&prompt),
        )
        .await?;

        Ok(QueryResult {
            answer: answer.trim().to_string(),
            sources: unique_sources(&chunks),
        })
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn clear_memory(&mut self) {
        self.memory.clear();
    }
}

async fn with_deadline<T>(
    deadline: Duration,
    what: &str,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::AnswerGeneration(format!(
            "{} timed out after {}s",
            what,
            deadline.as_secs()
        ))),
    }
}

/// Place every retrieved chunk ahead of the question.
pub fn build_prompt(chunks: &[Chunk], query: &str) -> String {
    let context = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
        PROMPT_INSTRUCTION, context, query
    )
}
