// src/pages/mod.rs
use crate::utils::error::SourceError;
use std::path::{Path, PathBuf};

/// Page separator written by text-layer extractors such as `pdftotext`.
pub const PAGE_BREAK: char = '\u{0c}';

/// Text of one page. `index` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub index: usize,
    pub text: String,
}

impl Page {
    /// One-based page number for log messages.
    pub fn number(&self) -> usize {
        self.index + 1
    }
}

#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File stem, used to name the per-source outputs.
    pub name: String,
    pub path: PathBuf,
    pub pages: Vec<Page>,
}

/// Splits extracted text into pages. The empty fragment after a final
/// page break is dropped; any other empty page is kept.
pub fn split_pages(text: &str) -> Vec<Page> {
    let mut parts: Vec<&str> = text.split(PAGE_BREAK).collect();
    if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
        parts.pop();
    }
    parts
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page {
            index,
            text: text.to_string(),
        })
        .collect()
}

/// Reads one page-text file produced by the text extractor.
pub async fn load_document(path: &Path) -> Result<SourceDocument, SourceError> {
    tracing::info!("Reading page text from: {}", path.display());

    let bytes = tokio::fs::read(path).await.map_err(|source| SourceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|_| SourceError::Encoding(path.to_path_buf()))?;
    let pages = split_pages(&text);

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "source".to_string());

    tracing::debug!("Loaded {} pages ({} bytes) from {}", pages.len(), text.len(), path.display());
    Ok(SourceDocument {
        name,
        path: path.to_path_buf(),
        pages,
    })
}
