// Document-side domain models: snapshots in the editable index space and the
// structural edit operations submitted against them.
//
// Indices are UTF-16 code units, matching the remote API. Index 0 is the first
// editable character of the body.

use std::fmt;

use serde::Serialize;

use crate::core::errors::{validate_id, DocsError};

pub const DEFAULT_DOCUMENT_TITLE: &str = "New Document";

/// Opaque marker for one committed state of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Paragraph,
    Table,
    SectionBreak,
    TableOfContents,
    Other,
}

/// One top-level body element spanning `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralElement {
    pub start: usize,
    pub end: usize,
    pub kind: ElementKind,
    /// Plain text carried by the element (may be shorter than the range for tables).
    pub text: String,
}

/// A document as fetched right before planning. Never reused across plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub document_id: String,
    pub title: String,
    pub revision: Revision,
    pub elements: Vec<StructuralElement>,
}

impl DocumentSnapshot {
    /// Length of the editable index space.
    pub fn length(&self) -> usize {
        self.elements.last().map(|e| e.end).unwrap_or(0)
    }

    /// Reconstructed plain text of the body.
    pub fn text(&self) -> String {
        self.elements.iter().map(|e| e.text.as_str()).collect()
    }

    /// Elements must tile `[0, length)` without gaps or overlaps.
    pub fn is_well_formed(&self) -> bool {
        let mut cursor = 0;
        for element in &self.elements {
            if element.start != cursor || element.end < element.start {
                return false;
            }
            cursor = element.end;
        }
        true
    }
}

/// Structural edit instruction addressed in the editable index space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    Insert { at: usize, text: String },
    DeleteRange { start: usize, end: usize },
    /// Content-addressed replacement, used by the replace-text tool.
    ReplaceAll {
        find: String,
        replace: String,
        match_case: bool,
    },
}

/// What the remote reports after applying a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub revision: Revision,
    /// Sum of `ReplaceAll` hits; zero for batches without replacements.
    pub occurrences_changed: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedDocument {
    pub document_id: String,
    pub title: String,
    pub url: String,
}

impl CreatedDocument {
    pub fn new(document_id: String, title: String) -> Self {
        let url = format!("https://docs.google.com/document/d/{}/edit", document_id);
        Self {
            document_id,
            title,
            url,
        }
    }
}

/// Result of a rewrite: the committed revision and whether anything was submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewriteOutcome {
    pub document_id: String,
    pub revision: Revision,
    pub changed: bool,
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Accepts a bare document ID or a Google Docs URL and returns the ID.
pub fn normalize_document_id(url_or_id: &str) -> Result<String, DocsError> {
    let trimmed = url_or_id.trim();
    if trimmed.contains("docs.google.com") {
        if let Some(start) = trimmed.find("/document/d/") {
            let after_d = &trimmed[start + 12..];
            let end = after_d
                .find(|c| c == '/' || c == '?' || c == '#')
                .unwrap_or(after_d.len());
            let id = &after_d[..end];
            validate_id("document_id", id)?;
            return Ok(id.to_string());
        }
        return Err(DocsError::Validation(format!(
            "could not extract a document ID from '{}'",
            trimmed
        )));
    }

    validate_id("document_id", trimmed)?;
    Ok(trimmed.to_string())
}
