//! Curated corpus search (`query_papers`).
//!
//! The primary retrieval tool. Sends the question to the corpus search
//! service and normalises its answer and retrieved contexts into the
//! canonical literature-search payload:
//!
//! ```text
//! { answer, chunks[], citations[], confidence, corpus_used }
//! ```
//!
//! Citation metadata is limited to what the index itself guarantees: the
//! document key, the PMCID encoded in the file name, and the relevance
//! score. DOIs reported by the service are dropped.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use alzassist_config::CorpusConfig;
use alzassist_core::citation::Citation;
use alzassist_core::error::ToolError;
use alzassist_core::schema::{ParamSpec, ToolSpec};
use alzassist_core::tool::{Tool, ToolOutput, ToolRole};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub const TOOL_NAME: &str = "query_papers";

const CITATION_NOTE: &str = "citation text may need verification";

pub struct CorpusSearchTool {
    spec: ToolSpec,
    endpoint: Option<String>,
    default_corpus: String,
    corpora: BTreeMap<String, String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl CorpusSearchTool {
    pub fn new(config: &CorpusConfig) -> Self {
        let spec = ToolSpec::new(
            TOOL_NAME,
            "Query the curated Alzheimer's disease paper corpus. The corpus contains vetted \
             papers about Alzheimer's disease. Use this tool FIRST for any Alzheimer's research \
             question. Returns an answer synthesized from relevant papers, the supporting \
             passages, and citations.",
        )
        .param(
            ParamSpec::string("query", "Natural language question about Alzheimer's research")
                .required(),
        )
        .param(
            ParamSpec::string("corpus", "Corpus size to search")
                .one_of(config.corpora.keys().cloned())
                .default_value(config.default_corpus.clone()),
        );

        let timeout = Duration::from_secs(config.timeout_secs);
        Self {
            spec,
            endpoint: config
                .endpoint
                .as_ref()
                .map(|e| e.trim_end_matches('/').to_string()),
            default_corpus: config.default_corpus.clone(),
            corpora: config.corpora.clone(),
            timeout,
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl CorpusSearchTool {
    /// Corpus name and service index for a call; a missing `corpus`
    /// argument falls back to the configured default.
    fn target<'a>(&'a self, arguments: &'a Map<String, Value>) -> (&'a str, &'a str) {
        let corpus = arguments
            .get("corpus")
            .and_then(Value::as_str)
            .unwrap_or(self.default_corpus.as_str());
        let index = self
            .corpora
            .get(corpus)
            .map(String::as_str)
            .unwrap_or(corpus);
        (corpus, index)
    }
}

#[async_trait]
impl Tool for CorpusSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        ToolRole::Primary
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ToolError::unavailable(TOOL_NAME, "no corpus endpoint configured"))?;

        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let (corpus, index) = self.target(arguments);

        debug!(tool = TOOL_NAME, corpus, index, "Querying corpus");

        let response = self
            .client
            .post(format!("{endpoint}/query"))
            .json(&json!({ "query": query, "corpus": corpus, "index": index }))
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ToolError::unavailable(TOOL_NAME, format!("corpus service unreachable: {e}"))
                } else if e.is_timeout() {
                    ToolError::Timeout {
                        tool_name: TOOL_NAME.into(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    ToolError::provider(TOOL_NAME, e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 503 {
            return Err(ToolError::unavailable(TOOL_NAME, "corpus service is not ready (503)"));
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(tool = TOOL_NAME, status, body = %body, "Corpus service returned error");
            return Err(ToolError::provider(
                TOOL_NAME,
                format!("corpus service returned {status}: {body}"),
            ));
        }

        let parsed: CorpusResponse = response.json().await.map_err(|e| {
            ToolError::provider(TOOL_NAME, format!("unparsable corpus response: {e}"))
        })?;

        Ok(normalize(parsed, corpus))
    }
}

/// Raw reply of the corpus search service.
#[derive(Debug, Deserialize)]
pub struct CorpusResponse {
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub contexts: Vec<CorpusContext>,
}

#[derive(Debug, Deserialize)]
pub struct CorpusContext {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub score: f64,
    pub docname: String,
    #[serde(default)]
    pub citation: Option<String>,
    /// Reported by the service but never surfaced
    #[serde(default)]
    pub doi: Option<String>,
}

/// PMCID encoded in a corpus file name such as `PMC1234567_smith2020`.
pub fn pmcid_from_docname(docname: &str) -> Option<&str> {
    if !docname.starts_with("PMC") {
        return None;
    }
    docname.split('_').next()
}

/// Coarse confidence from the number of distinct supporting documents.
pub fn confidence(answer: &str, distinct_documents: usize) -> &'static str {
    let lowered = answer.to_lowercase();
    if answer.trim().is_empty() || lowered.contains("cannot answer") || distinct_documents == 0 {
        "low"
    } else if distinct_documents >= 3 {
        "high"
    } else {
        "medium"
    }
}

/// Convert the service reply into the canonical payload plus citations.
pub fn normalize(response: CorpusResponse, corpus: &str) -> ToolOutput {
    let chunks: Vec<Value> = response
        .contexts
        .iter()
        .map(|ctx| {
            json!({
                "name": ctx.name,
                "text": ctx.text,
                "score": ctx.score,
                "docname": ctx.docname,
                "source_id": pmcid_from_docname(&ctx.docname),
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let citations: Vec<Citation> = response
        .contexts
        .iter()
        .filter(|ctx| seen.insert(ctx.docname.as_str()))
        .map(|ctx| {
            let mut citation = Citation::new(&ctx.docname, TOOL_NAME)
                .with_score(ctx.score)
                .with_note(CITATION_NOTE);
            if let Some(text) = &ctx.citation {
                citation = citation.with_text(text);
            }
            if let Some(pmcid) = pmcid_from_docname(&ctx.docname) {
                citation = citation.with_source_id(pmcid);
            }
            citation
        })
        .collect();

    let payload = json!({
        "answer": response.answer,
        "chunks": chunks,
        "citations": citations,
        "confidence": confidence(&response.answer, citations.len()),
        "corpus_used": corpus,
    });

    ToolOutput::new(payload).with_citations(citations)
}
