//! Work records and embedding results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Caller-supplied unit of work: one code entity to embed.
///
/// The metadata map is a `BTreeMap` so its serialized form (and therefore
/// the cache key) does not depend on insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub id: String,
    pub signature: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

impl WorkRecord {
    pub fn new(
        id: impl Into<String>,
        signature: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            signature: signature.into(),
            summary: summary.into(),
            snippet: None,
            metadata: None,
        }
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Text handed to the engine: signature, summary and snippet joined by
    /// blank lines.
    pub fn input_text(&self) -> String {
        let mut text = String::with_capacity(
            self.signature.len()
                + self.summary.len()
                + self.snippet.as_ref().map_or(0, String::len)
                + 4,
        );
        text.push_str(&self.signature);
        if !self.summary.is_empty() {
            text.push_str("\n\n");
            text.push_str(&self.summary);
        }
        if let Some(snippet) = &self.snippet {
            text.push_str("\n\n");
            text.push_str(snippet);
        }
        text
    }
}

/// Embedding computed for one [`WorkRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub id: String,
    pub vector: Vec<f32>,
    pub input_text: String,
    pub processing_time_ms: f64,
    pub model_used: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl EmbeddingResult {
    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }
}
