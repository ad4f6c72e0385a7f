//! External literature search (`search_external_literature`).
//!
//! Backed by the Europe PMC REST API. Two modes: free-text `search`, and
//! `lookup` of a single identifier (PMID, PMCID, or DOI). Reserved for
//! questions the curated corpus cannot answer, explicit identifier
//! requests, and enrichment of citations already obtained from it.

use std::time::Duration;

use alzassist_config::{ExternalLiteratureConfig, MAX_EXTERNAL_RESULTS};
use alzassist_core::citation::Citation;
use alzassist_core::error::ToolError;
use alzassist_core::schema::{ParamSpec, ToolSpec};
use alzassist_core::tool::{Tool, ToolOutput, ToolRole};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

pub const TOOL_NAME: &str = "search_external_literature";

pub struct ExternalLiteratureTool {
    spec: ToolSpec,
    base_url: String,
    default_limit: u32,
    client: reqwest::Client,
}

impl ExternalLiteratureTool {
    pub fn new(config: &ExternalLiteratureConfig) -> Self {
        let spec = ToolSpec::new(
            TOOL_NAME,
            "Search open biomedical literature (Europe PMC) outside the curated corpus. Use ONLY \
             when the curated corpus returned insufficient results, when the user asks for a \
             specific PMID, PMCID or DOI, or to resolve identifiers for a citation already \
             returned by the corpus tool.",
        )
        .param(
            ParamSpec::string("mode", "'search' for free text, 'lookup' for one identifier")
                .required()
                .one_of(["search", "lookup"]),
        )
        .param(ParamSpec::string("query", "Free-text query (search mode)"))
        .param(ParamSpec::string(
            "identifier",
            "PMID:12345678, PMC1234567 or a 10.xxxx DOI (lookup mode)",
        ))
        .param(ParamSpec::integer("limit", "Maximum number of results").at_least(1));

        Self {
            spec,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_limit: config.max_results,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

/// Translate the tool arguments into a Europe PMC query string.
pub fn build_query(arguments: &Map<String, Value>) -> Result<String, ToolError> {
    let text = |name: &str| {
        arguments
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    match text("mode") {
        Some("lookup") => {
            let id = text("identifier").ok_or_else(|| {
                ToolError::InvalidArguments("lookup mode requires 'identifier'".into())
            })?;
            Ok(identifier_query(id))
        }
        _ => text("query")
            .map(str::to_string)
            .ok_or_else(|| ToolError::InvalidArguments("search mode requires 'query'".into())),
    }
}

fn identifier_query(id: &str) -> String {
    let upper = id.to_ascii_uppercase();
    if let Some(pmid) = upper.strip_prefix("PMID:") {
        format!("EXT_ID:{} AND SRC:MED", pmid.trim())
    } else if upper.starts_with("PMC") {
        format!("PMCID:{upper}")
    } else if let Some(doi) = id.strip_prefix("doi:").or_else(|| id.strip_prefix("DOI:")) {
        format!("DOI:\"{}\"", doi.trim())
    } else if id.starts_with("10.") {
        format!("DOI:\"{id}\"")
    } else if id.chars().all(|c| c.is_ascii_digit()) {
        format!("EXT_ID:{id} AND SRC:MED")
    } else {
        id.to_string()
    }
}

#[async_trait]
impl Tool for ExternalLiteratureTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        ToolRole::External
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let query = build_query(arguments)?;
        let limit = arguments
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| u32::try_from(l).unwrap_or(u32::MAX))
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_EXTERNAL_RESULTS);

        debug!(tool = TOOL_NAME, query = %query, limit, "Searching Europe PMC");

        let page_size = limit.to_string();

        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[
                ("query", query.as_str()),
                ("format", "json"),
                ("resultType", "lite"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ToolError::unavailable(TOOL_NAME, format!("Europe PMC unreachable: {e}"))
                } else {
                    ToolError::provider(TOOL_NAME, e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status == 503 || status == 429 {
            return Err(ToolError::unavailable(
                TOOL_NAME,
                format!("Europe PMC temporarily unavailable ({status})"),
            ));
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(tool = TOOL_NAME, status, "Europe PMC returned error");
            return Err(ToolError::provider(
                TOOL_NAME,
                format!("Europe PMC returned {status}: {body}"),
            ));
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| {
            ToolError::provider(TOOL_NAME, format!("unparsable Europe PMC response: {e}"))
        })?;

        Ok(normalize(parsed, &query))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultList {
    #[serde(default)]
    pub result: Vec<Article>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    #[serde(default)]
    pub pmid: Option<String>,
    #[serde(default)]
    pub pmcid: Option<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author_string: Option<String>,
    #[serde(default)]
    pub journal_title: Option<String>,
    #[serde(default)]
    pub pub_year: Option<String>,
}

impl Article {
    /// PMCID, else `PMID:<id>`, else `DOI:<doi>`.
    pub fn citation_key(&self) -> Option<String> {
        if let Some(pmcid) = &self.pmcid {
            return Some(pmcid.clone());
        }
        if let Some(pmid) = &self.pmid {
            return Some(format!("PMID:{pmid}"));
        }
        self.doi.as_ref().map(|doi| format!("DOI:{doi}"))
    }

    /// "Authors (Year). Title. Journal."
    pub fn citation_text(&self) -> String {
        let authors = self.author_string.as_deref().unwrap_or("Unknown authors");
        let year = self.pub_year.as_deref().unwrap_or("n.d.");
        let title = self.title.as_deref().unwrap_or("Untitled").trim_end_matches('.');
        match &self.journal_title {
            Some(journal) => format!("{authors} ({year}). {title}. {journal}."),
            None => format!("{authors} ({year}). {title}."),
        }
    }
}

pub fn normalize(response: SearchResponse, query_used: &str) -> ToolOutput {
    let mut results = Vec::new();
    let mut citations = Vec::new();

    for article in response.result_list.result {
        let Some(key) = article.citation_key() else {
            continue;
        };

        results.push(json!({
            "key": key,
            "title": article.title,
            "authors": article.author_string,
            "journal": article.journal_title,
            "year": article.pub_year,
            "pmid": article.pmid,
            "pmcid": article.pmcid,
            "doi": article.doi,
        }));

        let mut citation = Citation::new(&key, TOOL_NAME).with_text(article.citation_text());
        if let Some(pmcid) = &article.pmcid {
            citation = citation.with_source_id(pmcid);
        }
        if let Some(pmid) = &article.pmid {
            citation = citation.with_pmid(pmid);
        }
        if let Some(doi) = &article.doi {
            citation = citation.with_doi(doi);
        }
        citations.push(citation);
    }

    let payload = json!({
        "results": results,
        "citations": citations,
        "query_used": query_used,
    });

    ToolOutput::new(payload).with_citations(citations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn search_mode_requires_query() {
        assert!(build_query(&args(json!({"mode": "search"}))).is_err());
        assert_eq!(
            build_query(&args(json!({"mode": "search", "query": "lecanemab amyloid"}))).unwrap(),
            "lecanemab amyloid"
        );
    }

    #[test]
    fn lookup_identifiers_translate() {
        let q = |id: &str| build_query(&args(json!({"mode": "lookup", "identifier": id}))).unwrap();
        assert_eq!(q("PMID:36449413"), "EXT_ID:36449413 AND SRC:MED");
        assert_eq!(q("pmc9732745"), "PMCID:PMC9732745");
        assert_eq!(q("10.1056/NEJMoa2212948"), "DOI:\"10.1056/NEJMoa2212948\"");
        assert_eq!(q("36449413"), "EXT_ID:36449413 AND SRC:MED");
        assert!(build_query(&args(json!({"mode": "lookup"}))).is_err());
    }

    #[test]
    fn normalize_builds_keys_and_text() {
        let response: SearchResponse = serde_json::from_value(json!({
            "hitCount": 3,
            "resultList": {"result": [
                {"pmid": "36449413", "pmcid": "PMC9732745", "doi": "10.1056/NEJMoa2212948",
                 "title": "Lecanemab in Early Alzheimer's Disease.",
                 "authorString": "van Dyck CH, Swanson CJ.", "journalTitle": "N Engl J Med",
                 "pubYear": "2023"},
                {"pmid": "111", "title": "Only a PMID"},
                {"doi": "10.1/xyz", "title": "Only a DOI"},
                {"title": "No identifiers at all"}
            ]}
        }))
        .unwrap();

        let output = normalize(response, "lecanemab");
        let keys: Vec<_> = output.citations.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["PMC9732745", "PMID:111", "DOI:10.1/xyz"]);

        let first = &output.citations[0];
        assert_eq!(
            first.citation.as_deref(),
            Some("van Dyck CH, Swanson CJ. (2023). Lecanemab in Early Alzheimer's Disease. N Engl J Med.")
        );
        assert_eq!(first.pmid.as_deref(), Some("36449413"));
        assert_eq!(first.doi.as_deref(), Some("10.1056/NEJMoa2212948"));

        assert_eq!(output.payload["query_used"], "lecanemab");
        assert_eq!(output.payload["results"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn empty_result_list() {
        let response: SearchResponse = serde_json::from_value(json!({"hitCount": 0})).unwrap();
        let output = normalize(response, "nothing");
        assert!(output.citations.is_empty());
        assert_eq!(output.payload["results"], json!([]));
    }

    #[test]
    fn external_role_and_schema() {
        let tool = ExternalLiteratureTool::new(&ExternalLiteratureConfig::default());
        assert_eq!(tool.role(), ToolRole::External);
        assert!(tool.spec().validate(&json!({"mode": "browse"})).is_err());
        assert!(tool.spec().validate(&json!({"mode": "search", "query": "tau"})).is_ok());
        assert!(tool.spec().validate(&json!({"mode": "search", "query": "tau", "limit": -3})).is_err());
        assert!(tool.spec().validate(&json!({"mode": "search", "query": "tau", "limit": 0})).is_err());
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        let config = ExternalLiteratureConfig {
            base_url: "http://127.0.0.1:1".into(),
            ..ExternalLiteratureConfig::default()
        };
        let tool = ExternalLiteratureTool::new(&config);
        let err = tool
            .invoke(&args(json!({"mode": "search", "query": "tau"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable { .. }));
    }
}
