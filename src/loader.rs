//! Document loaders.
//!
//! Normalize heterogeneous inputs (a file path or a topic string) into
//! [`Document`]s whose text is non-empty and whose metadata names the
//! origin under `source`. A file that parses but yields no text is an
//! [`EmptySource`](RagError::EmptySource) error, not an empty list.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::error::{RagError, Result};
use crate::extract::{extract_sections, FileKind};
use crate::models::Document;
use crate::wikipedia::{truncate_chars, TopicProvider};

const INCLUDE_GLOBS: &[&str] = &["**/*.pdf", "**/*.docx", "**/*.txt", "**/*.md"];
const EXCLUDE_GLOBS: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Load a PDF, one document per non-empty page.
pub fn load_pdf(path: &Path) -> Result<Vec<Document>> {
    load_file(path, FileKind::Pdf)
}

/// Load a DOCX file as a single document.
pub fn load_docx(path: &Path) -> Result<Vec<Document>> {
    load_file(path, FileKind::Docx)
}

/// Load a UTF-8 text file as a single document.
pub fn load_txt(path: &Path) -> Result<Vec<Document>> {
    load_file(path, FileKind::Text)
}

/// Load a file, choosing the format from its extension.
pub fn load_source(path: &Path) -> Result<Vec<Document>> {
    let kind = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(FileKind::from_extension)
        .ok_or_else(|| RagError::UnsupportedSource {
            path: path.to_path_buf(),
        })?;
    load_file(path, kind)
}

fn load_file(path: &Path, kind: FileKind) -> Result<Vec<Document>> {
    let bytes = std::fs::read(path)?;
    let sections = extract_sections(&bytes, kind).map_err(|e| RagError::Extract {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let source = path.display().to_string();
    let paged = kind == FileKind::Pdf;
    let docs: Vec<Document> = sections
        .into_iter()
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| {
            let doc = Document::new(text, source.clone());
            if paged {
                doc.with_metadata("page", (i + 1).to_string())
            } else {
                doc
            }
        })
        .collect();

    if docs.is_empty() {
        return Err(RagError::EmptySource {
            path: path.to_path_buf(),
        });
    }
    Ok(docs)
}

/// Fetch a topic from an external provider and wrap it as one document.
///
/// Content is truncated to `max_chars` characters. A provider that returns
/// nothing (or only whitespace) is an [`ExternalSource`](RagError::ExternalSource) error.
pub async fn load_wikipedia(
    provider: &dyn TopicProvider,
    topic: &str,
    max_chars: usize,
) -> Result<Vec<Document>> {
    let content = provider.fetch(topic).await?.unwrap_or_default();
    let content = truncate_chars(&content, max_chars);
    if content.trim().is_empty() {
        return Err(RagError::ExternalSource {
            topic: topic.to_string(),
            message: "no content found".to_string(),
        });
    }
    Ok(vec![Document::new(content, format!("Wikipedia:{}", topic))])
}

/// Expand directory arguments into the supported files beneath them.
///
/// Plain file paths pass through unchanged, so an unsupported file still
/// reaches the loader and is reported there. Directory contents are sorted.
pub fn expand_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let include = build_globset(INCLUDE_GLOBS)?;
    let exclude = build_globset(EXCLUDE_GLOBS)?;

    let mut out = Vec::new();
    for path in paths {
        if !path.is_dir() {
            out.push(path.clone());
            continue;
        }
        let mut found = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = entry.map_err(|e| RagError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
            let rel_str = relative.to_string_lossy();
            if exclude.is_match(rel_str.as_ref()) || !include.is_match(rel_str.as_ref()) {
                continue;
            }
            found.push(entry.path().to_path_buf());
        }
        found.sort();
        out.extend(found);
    }
    Ok(out)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| RagError::Configuration(format!("bad glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RagError::Configuration(e.to_string()))
}
