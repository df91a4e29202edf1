//! Data records that flow through every pipeline stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lineage metadata attached to chunks and examples.
///
/// Stages only ever add keys; existing entries are carried forward unchanged.
pub type Metadata = BTreeMap<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// RawChunk
// ---------------------------------------------------------------------------

/// A unit of extracted text plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChunk {
    /// Unique within a run. Derived chunks append a suffix to the parent id.
    pub id: String,
    /// Provenance kind, e.g. `database` or `document:.txt`.
    pub source_type: String,
    /// Originating resource; identical for every chunk derived from it.
    pub source_uri: String,
    /// Lineage metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Text payload.
    pub content: String,
}

impl RawChunk {
    /// Create a chunk with empty metadata.
    pub fn new(
        id: impl Into<String>,
        source_type: impl Into<String>,
        source_uri: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_type: source_type.into(),
            source_uri: source_uri.into(),
            metadata: Metadata::new(),
            content: content.into(),
        }
    }

    /// Builder-style metadata insertion.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Derive a new chunk with the same lineage but different id and content.
    ///
    /// Metadata is copied; the caller adds stage-specific keys on the result.
    pub fn derive(&self, id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_type: self.source_type.clone(),
            source_uri: self.source_uri.clone(),
            metadata: self.metadata.clone(),
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TrainingExample
// ---------------------------------------------------------------------------

/// One supervised training pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    /// Model-facing prompt.
    pub input_text: String,
    /// Desired output (may be a placeholder when labels are unavailable).
    pub target_text: String,
    /// Metadata carried through from the source chunk(s).
    #[serde(default)]
    pub metadata: Metadata,
}

impl TrainingExample {
    /// Supervised text as seen by a causal-LM trainer: prompt, blank line, target.
    pub fn supervised_text(&self) -> String {
        format!("{}\n\n{}", self.input_text, self.target_text)
    }
}
