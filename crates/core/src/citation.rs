//! Citations and the per-session citation pool.
//!
//! Every citation surfaced to a user must trace back, by key, to a
//! citation some tool actually returned during the session. The pool is
//! the record of those returned citations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A literature reference returned by a retrieval tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// Stable identifier (e.g. corpus document key)
    pub key: String,

    /// Human-readable citation text
    #[serde(default)]
    pub citation: Option<String>,

    /// Relevance score reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Document id in the source collection (PMCID for corpus documents)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,

    /// Caveat attached by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    /// Tool that produced this citation
    #[serde(default)]
    pub provider: String,
}

impl Citation {
    pub fn new(key: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            citation: None,
            score: None,
            source_id: None,
            doi: None,
            pmid: None,
            note: None,
            provider: provider.into(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.citation = Some(text.into());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    pub fn with_doi(mut self, doi: impl Into<String>) -> Self {
        self.doi = Some(doi.into());
        self
    }

    pub fn with_pmid(mut self, pmid: impl Into<String>) -> Self {
        self.pmid = Some(pmid.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Union of all citations returned by tool results in one session.
///
/// Keyed by exact citation key; the first citation seen for a key wins.
/// Iteration order is insertion order.
#[derive(Debug, Clone, Default)]
pub struct CitationPool {
    entries: Vec<Citation>,
    index: HashMap<String, usize>,
}

impl CitationPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a citation. Returns `false` if the key was already present.
    pub fn insert(&mut self, citation: Citation) -> bool {
        if self.index.contains_key(&citation.key) {
            return false;
        }
        self.index.insert(citation.key.clone(), self.entries.len());
        self.entries.push(citation);
        true
    }

    pub fn extend<I: IntoIterator<Item = Citation>>(&mut self, citations: I) {
        for citation in citations {
            self.insert(citation);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Citation> {
        self.index.get(key).map(|&i| &self.entries[i])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|c| c.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Citation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
