//! # Research Assistant
//!
//! Retrieval-augmented question answering over your own documents.
//!
//! Documents (PDF, DOCX, plain text) and Wikipedia topics are loaded,
//! split into overlapping chunks, embedded, and appended to an on-disk
//! vector index. Questions are answered by retrieving the most similar
//! chunks and handing them to a language model together with the question.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌─────────────┐
//! │   Loaders   │──▶│ Chunk+Embed  │──▶│ Vector index│
//! │ PDF/DOCX/   │   │              │   │ index.vec + │
//! │ TXT/Wiki    │   └──────────────┘   │ index.json  │
//! └─────────────┘                      └──────┬──────┘
//!                                             │
//!                   ┌─────────────────────────┘
//!                   ▼
//!             ┌──────────┐   ┌──────────┐
//!             │ Retriever│──▶│ Session  │──▶ answer + sources
//!             └──────────┘   │ (LLM +   │
//!                            │  memory) │
//!                            └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! ra build paper.pdf notes.docx --topic "Transformer (deep learning)"
//! ra ask "What problem does attention solve?"
//! ra chat
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF/DOCX/text extraction |
//! | [`loader`] | Documents from files and topics |
//! | [`wikipedia`] | Wikipedia topic provider |
//! | [`chunk`] | Recursive text splitting |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Language model providers |
//! | [`index`] | On-disk vector index and builder |
//! | [`retriever`] | Top-k retrieval |
//! | [`memory`] | Conversation memory |
//! | [`transcript`] | Per-query transcript files |
//! | [`engine`] | Conversational session |
//! | [`ingest`] | Build entrypoint |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod memory;
pub mod models;
pub mod retriever;
pub mod transcript;
pub mod wikipedia;
