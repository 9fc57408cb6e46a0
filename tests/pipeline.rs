//! Build and query behavior of the library, driven with deterministic mocks.

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use research_assistant::config::Config;
use research_assistant::embedding::Embedder;
use research_assistant::engine::{Session, NOT_READY_ANSWER};
use research_assistant::error::{RagError, Result};
use research_assistant::index::{BuildLock, BuildReport, IndexHandle, DOCSTORE_FILE, LOCK_FILE, VECTORS_FILE};
use research_assistant::ingest::configured_builder;
use research_assistant::models::{Chunk, Document, Role};
use research_assistant::retriever::Retriever;
use research_assistant::wikipedia::TopicProvider;
use tempfile::TempDir;

async fn build(
    config: &Config,
    embedder: &dyn Embedder,
    topics: &dyn TopicProvider,
    sources: &[PathBuf],
) -> Result<BuildReport> {
    configured_builder(config, embedder, topics)
        .build(sources, false, "", &config.index.path)
        .await
}

fn snapshot(index: &std::path::Path) -> (Vec<u8>, Vec<u8>) {
    (
        std::fs::read(index.join(VECTORS_FILE)).unwrap(),
        std::fs::read(index.join(DOCSTORE_FILE)).unwrap(),
    )
}

#[tokio::test]
async fn loading_twice_gives_identical_results() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    let ocean = write_file(tmp.path(), "ocean.txt", OCEAN_TEXT);
    build(&config, embedder.as_ref(), &FixedTopics(None), &[rust, ocean])
        .await
        .unwrap();

    let first = Retriever::open(&config.index.path, embedder.clone()).unwrap();
    let second = Retriever::open(&config.index.path, embedder.clone()).unwrap();
    let a = first.retrieve("ownership and the borrow checker", 3).await.unwrap();
    let b = second.retrieve("ownership and the borrow checker", 3).await.unwrap();

    assert_eq!(a.len(), 3);
    assert_eq!(a, b);
    assert!(a[0].text.contains("borrow checker"));
}

#[tokio::test]
async fn append_grows_index_without_touching_existing_entries() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let topics = FixedTopics(None);

    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    let first = build(&config, embedder.as_ref(), &topics, &[rust]).await.unwrap();
    assert!(first.created);
    let n = first.total_entries;
    let before = IndexHandle::load(&config.index.path).unwrap();

    let ocean = write_file(tmp.path(), "ocean.txt", OCEAN_TEXT);
    let second = build(&config, embedder.as_ref(), &topics, &[ocean]).await.unwrap();
    assert!(!second.created);
    let m = second.appended;
    assert!(m > 0);
    assert_eq!(second.total_entries, n + m);

    let after = IndexHandle::load(&config.index.path).unwrap();
    assert_eq!(after.len(), n + m);
    for (old, new) in before.entries().iter().zip(after.entries()) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.chunk, new.chunk);
        assert_eq!(old.vector, new.vector);
    }
    assert!(after.entries()[n..]
        .iter()
        .all(|e| e.chunk.source().ends_with("ocean.txt")));
}

#[tokio::test]
async fn empty_input_leaves_existing_index_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let topics = FixedTopics(None);
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    build(&config, embedder.as_ref(), &topics, &[rust]).await.unwrap();
    let before = snapshot(&config.index.path);

    let err = build(&config, embedder.as_ref(), &topics, &[]).await.unwrap_err();
    assert!(matches!(err, RagError::NoDocuments));

    let blank = write_file(tmp.path(), "blank.txt", "   \n\n  ");
    let err = build(&config, embedder.as_ref(), &topics, &[blank]).await.unwrap_err();
    assert!(matches!(err, RagError::NoDocuments));

    assert_eq!(snapshot(&config.index.path), before);
    assert!(!config.index.path.join(LOCK_FILE).exists());
}

#[tokio::test]
async fn empty_input_without_index_creates_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let err = build(&config, hash_embedder().as_ref(), &FixedTopics(None), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoDocuments));
    assert!(!IndexHandle::exists(&config.index.path));
}

#[tokio::test]
async fn failing_sources_are_skipped() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let good = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    let empty = write_file(tmp.path(), "empty.txt", "");
    let unsupported = write_file(tmp.path(), "slides.pptx", "binary");
    let missing = tmp.path().join("missing.txt");

    let report = build(
        &config,
        hash_embedder().as_ref(),
        &FixedTopics(None),
        &[good, empty, unsupported, missing],
    )
    .await
    .unwrap();

    assert_eq!(report.documents, 1);
    assert_eq!(report.skipped.len(), 3);
    assert!(report.skipped[0].source.ends_with("empty.txt"));
    assert!(report.skipped[0].reason.contains("no valid text"));
}

#[tokio::test]
async fn topic_source_is_loaded_and_tagged() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let topics = FixedTopics(Some(format!("Page: Rust\nSummary: {}", RUST_TEXT)));

    let report = configured_builder(&config, hash_embedder().as_ref(), &topics)
        .build(&[], true, "Rust (programming language)", &config.index.path)
        .await
        .unwrap();
    assert_eq!(report.documents, 1);

    let index = IndexHandle::load(&config.index.path).unwrap();
    assert!(index
        .entries()
        .iter()
        .all(|e| e.chunk.source() == "Wikipedia:Rust (programming language)"));
}

#[tokio::test]
async fn unknown_topic_alone_is_no_documents() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let err = configured_builder(&config, hash_embedder().as_ref(), &FixedTopics(None))
        .build(&[], true, "Qwxzyv", &config.index.path)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::NoDocuments));
}

#[tokio::test]
async fn embedding_is_batched() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.chunking.chunk_size = 40;
    config.chunking.chunk_overlap = 0;
    config.embedding.batch_size = 2;
    let embedder = hash_embedder();
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);

    let report = build(&config, embedder.as_ref(), &FixedTopics(None), &[rust])
        .await
        .unwrap();
    assert!(report.chunks > 2);
    assert_eq!(
        embedder.calls.load(Ordering::SeqCst),
        report.chunks.div_ceil(2)
    );
}

#[tokio::test]
async fn append_with_other_dimensionality_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let topics = FixedTopics(None);
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    build(&config, hash_embedder().as_ref(), &topics, &[rust.clone()])
        .await
        .unwrap();
    let before = snapshot(&config.index.path);

    let narrow = HashEmbedder::new(16);
    let err = build(&config, &narrow, &topics, &[rust]).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(narrow.calls.load(Ordering::SeqCst), 0);
    assert_eq!(snapshot(&config.index.path), before);
}

#[tokio::test]
async fn concurrent_build_is_refused() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    let _held = BuildLock::acquire(&config.index.path, Duration::from_secs(3600)).unwrap();

    let err = build(&config, hash_embedder().as_ref(), &FixedTopics(None), &[rust])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::BuildInProgress { .. }));
    assert!(!IndexHandle::exists(&config.index.path));
}

#[tokio::test]
async fn invalid_k_is_rejected_and_small_index_is_not_padded() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let short = write_file(tmp.path(), "short.txt", "Rust has a borrow checker.");
    let other = write_file(tmp.path(), "other.txt", "Oceans have tides.");
    let report = build(&config, embedder.as_ref(), &FixedTopics(None), &[short, other])
        .await
        .unwrap();
    assert_eq!(report.total_entries, 2);

    let retriever = Retriever::open(&config.index.path, embedder.clone()).unwrap();
    for k in [0, -1] {
        let err = retriever.retrieve("borrow", k).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }
    let chunks = retriever.retrieve("borrow", 5).await.unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, "Rust has a borrow checker.");
}

#[tokio::test]
async fn missing_index_makes_retriever_unavailable() {
    let tmp = TempDir::new().unwrap();
    let err = Retriever::open(&tmp.path().join("nothing"), hash_embedder()).unwrap_err();
    assert!(matches!(err, RagError::RetrieverUnavailable(_)));
}

#[tokio::test]
async fn ask_before_build_degrades_then_recovers() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let model = Arc::new(ScriptedModel::new("Rust is memory safe."));
    let mut session = Session::new(config, hash_embedder(), model.clone());

    let result = session.ask("x").await;
    assert_eq!(result.answer, NOT_READY_ANSWER);
    assert!(result.sources.is_empty());
    assert!(!session.is_ready());
    assert!(model.prompts().is_empty());

    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    let report = session
        .build_and_reload(&FixedTopics(None), &[rust.clone()], false, "")
        .await
        .unwrap();
    assert!(report.created);
    assert!(session.is_ready());

    let result = session.ask("What does the borrow checker do?").await;
    assert_eq!(result.answer, "Rust is memory safe.");
    assert_eq!(result.sources, vec![rust.display().to_string()]);
    assert_eq!(session.memory().len(), 4);
}

#[tokio::test]
async fn sources_are_deduplicated_in_retrieval_order() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.retrieval.k = 4;
    config.transcript.enabled = false;

    let mut index = IndexHandle::new(&config.index.path, "const", 4);
    let chunks: Vec<Chunk> = [("one", "a"), ("two", "b"), ("three", "a"), ("four", "c")]
        .iter()
        .map(|(text, source)| {
            let doc = Document::new(*text, *source);
            Chunk {
                text: doc.text,
                metadata: doc.metadata,
                start: 0,
            }
        })
        .collect();
    index.append(chunks, vec![vec![0.5; 4]; 4]).unwrap();
    index.persist().unwrap();

    let model = Arc::new(ScriptedModel::new("ok"));
    let mut session = Session::new(config, Arc::new(ConstEmbedder), model.clone());
    let result = session.ask("anything").await;

    assert_eq!(result.sources, vec!["a", "b", "c"]);
    let prompt = &model.prompts()[0];
    for text in ["one", "two", "three", "four"] {
        assert!(prompt.contains(text), "prompt missing {}", text);
    }
}

#[tokio::test]
async fn memory_records_turns_in_call_order() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    build(&config, embedder.as_ref(), &FixedTopics(None), &[rust])
        .await
        .unwrap();

    let mut session = Session::new(config, embedder, Arc::new(ScriptedModel::new("answer")));
    session.ask("first question").await;
    session.ask("second question").await;

    let turns = session.memory().turns();
    assert_eq!(turns.len(), 4);
    let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(turns[0].content, "first question");
    assert_eq!(turns[2].content, "second question");
}

#[tokio::test]
async fn model_failure_is_reported_as_answer() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let embedder = hash_embedder();
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    build(&config, embedder.as_ref(), &FixedTopics(None), &[rust])
        .await
        .unwrap();

    let mut session = Session::new(config, embedder, Arc::new(FailingModel));
    let result = session.ask("What is Cargo?").await;
    assert!(result.answer.starts_with("Error processing query:"));
    assert!(result.answer.contains("503"));
    assert!(result.sources.is_empty());
    assert_eq!(session.memory().turns()[1].content, result.answer);
}

#[tokio::test]
async fn slow_model_hits_deadline() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(tmp.path());
    config.llm.timeout_secs = 0;
    let embedder = hash_embedder();
    let rust = write_file(tmp.path(), "rust.txt", RUST_TEXT);
    build(&config, embedder.as_ref(), &FixedTopics(None), &[rust])
        .await
        .unwrap();

    let mut session = Session::new(config, embedder, Arc::new(SlowModel(Duration::from_secs(5))));
    let result = session.ask("What is Cargo?").await;
    assert!(result.answer.contains("timed out"));
    assert!(result.sources.is_empty());
}

#[tokio::test]
async fn each_query_writes_a_transcript() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let logs = config.transcript.dir.clone();
    let mut session = Session::new(config, hash_embedder(), Arc::new(ScriptedModel::new("x")));

    session.ask("is anything loaded?").await;

    let files: Vec<_> = std::fs::read_dir(&logs).unwrap().collect();
    assert_eq!(files.len(), 1);
    let body = std::fs::read_to_string(files[0].as_ref().unwrap().path()).unwrap();
    assert!(body.contains("Query: is anything loaded?"));
    assert!(body.contains(NOT_READY_ANSWER));
}

#[tokio::test]
async fn back_to_back_queries_keep_every_transcript() {
    let tmp = TempDir::new().unwrap();
    let config = test_config(tmp.path());
    let logs = config.transcript.dir.clone();
    let mut session = Session::new(config, hash_embedder(), Arc::new(ScriptedModel::new("x")));

    for i in 0..20 {
        session.ask(&format!("question {}", i)).await;
    }

    assert_eq!(std::fs::read_dir(&logs).unwrap().count(), 20);
}
