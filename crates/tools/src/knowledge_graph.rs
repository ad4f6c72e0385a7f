//! Alzheimer's knowledge graph tools.
//!
//! Four tools share one in-memory graph loaded from KGX TSV exports
//! (`kg-alzheimers_nodes.tsv`, `kg-alzheimers_edges.tsv`). The graph is
//! read on first use and kept for the life of the process. Results are
//! grounding facts, not literature, so they carry no citations.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use alzassist_core::error::ToolError;
use alzassist_core::schema::{ParamSpec, ToolSpec};
use alzassist_core::tool::{Tool, ToolOutput, ToolRole};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const SEARCH_NODES: &str = "search_kg_nodes";
pub const QUERY_EDGES: &str = "query_kg_edges";
pub const NODE_DETAILS: &str = "get_node_details";
pub const NODE_NEIGHBORS: &str = "get_node_neighbors";

pub const NODES_FILE: &str = "kg-alzheimers_nodes.tsv";
pub const EDGES_FILE: &str = "kg-alzheimers_edges.tsv";

const NODE_COLUMNS: [&str; 9] = [
    "id",
    "category",
    "name",
    "description",
    "synonym",
    "exact_synonyms",
    "symbol",
    "full_name",
    "in_taxon_label",
];

const EDGE_COLUMNS: [&str; 9] = [
    "subject",
    "predicate",
    "object",
    "category",
    "primary_knowledge_source",
    "publications",
    "knowledge_level",
    "has_evidence",
    "negated",
];

/// A tab-separated table with only the columns we keep.
#[derive(Debug, Default)]
struct Table {
    columns: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse a headed TSV. Fields are split on tabs with no quoting; rows
    /// whose field count does not match the header are skipped.
    fn parse(content: &str, columns: &'static [&'static str]) -> Result<Self, String> {
        let mut lines = content.lines();
        let header: Vec<&str> = lines
            .next()
            .ok_or_else(|| "empty file".to_string())?
            .split('\t')
            .collect();

        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| header.iter().position(|h| h == c))
            .collect();
        if positions[0].is_none() {
            return Err(format!("missing required column '{}'", columns[0]));
        }

        let mut rows = Vec::new();
        let mut skipped = 0usize;
        for line in lines.filter(|l| !l.is_empty()) {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != header.len() {
                skipped += 1;
                continue;
            }
            rows.push(
                positions
                    .iter()
                    .map(|p| p.map(|i| fields[i].to_string()).unwrap_or_default())
                    .collect(),
            );
        }
        if skipped > 0 {
            debug!(skipped, "Skipped malformed TSV rows");
        }

        Ok(Self { columns, rows })
    }

    fn field<'a>(&self, row: &'a [String], column: &str) -> &'a str {
        self.columns
            .iter()
            .position(|c| *c == column)
            .map(|i| row[i].as_str())
            .unwrap_or("")
    }
}

/// Empty KGX fields are reported as null.
fn nullable(s: &str) -> Value {
    if s.is_empty() {
        Value::Null
    } else {
        Value::String(s.to_string())
    }
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

/// In-memory graph with indexes by node id, edge subject, and edge object.
#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: Table,
    edges: Table,
    node_index: HashMap<String, usize>,
    by_subject: HashMap<String, Vec<usize>>,
    by_object: HashMap<String, Vec<usize>>,
}

impl KnowledgeGraph {
    /// Build a graph from the contents of the node and edge files.
    pub fn from_tsv(nodes: &str, edges: &str) -> Result<Self, String> {
        let nodes = Table::parse(nodes, &NODE_COLUMNS).map_err(|e| format!("nodes: {e}"))?;
        let edges = Table::parse(edges, &EDGE_COLUMNS).map_err(|e| format!("edges: {e}"))?;

        let node_index = nodes
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row[0].clone(), i))
            .collect();

        let mut by_subject: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_object: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, row) in edges.rows.iter().enumerate() {
            by_subject.entry(edges.field(row, "subject").to_string()).or_default().push(i);
            by_object.entry(edges.field(row, "object").to_string()).or_default().push(i);
        }

        Ok(Self {
            nodes,
            edges,
            node_index,
            by_subject,
            by_object,
        })
    }

    /// Load both KGX files from a directory.
    pub fn load(dir: &Path) -> Result<Self, String> {
        let read = |file: &str| {
            let path = dir.join(file);
            std::fs::read_to_string(&path)
                .map_err(|e| format!("cannot read KGX file {}: {e}", path.display()))
        };
        let graph = Self::from_tsv(&read(NODES_FILE)?, &read(EDGES_FILE)?)?;
        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "Knowledge graph loaded"
        );
        Ok(graph)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.rows.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.rows.len()
    }

    fn node_name(&self, id: &str) -> Value {
        self.node_index
            .get(id)
            .map(|&i| nullable(self.nodes.field(&self.nodes.rows[i], "name")))
            .unwrap_or(Value::Null)
    }

    /// Case-insensitive substring search over name, synonyms, and symbol.
    pub fn search_nodes(&self, query: &str, category: Option<&str>, limit: usize) -> Vec<Value> {
        let query = query.to_lowercase();
        let category = category.map(str::to_lowercase);
        let t = &self.nodes;

        t.rows
            .iter()
            .filter(|row| {
                ["name", "synonym", "exact_synonyms", "symbol"]
                    .iter()
                    .any(|c| contains_ci(t.field(row, c), &query))
            })
            .filter(|row| {
                category
                    .as_deref()
                    .is_none_or(|cat| contains_ci(t.field(row, "category"), cat))
            })
            .take(limit)
            .map(|row| {
                json!({
                    "id": t.field(row, "id"),
                    "category": nullable(t.field(row, "category")),
                    "name": nullable(t.field(row, "name")),
                    "symbol": nullable(t.field(row, "symbol")),
                    "description": nullable(t.field(row, "description")),
                })
            })
            .collect()
    }

    fn edge_json(&self, row: &[String]) -> Value {
        let t = &self.edges;
        let subject = t.field(row, "subject");
        let object = t.field(row, "object");
        json!({
            "subject_id": subject,
            "subject_name": self.node_name(subject),
            "predicate": t.field(row, "predicate"),
            "object_id": object,
            "object_name": self.node_name(object),
            "primary_knowledge_source": nullable(t.field(row, "primary_knowledge_source")),
            "publications": nullable(t.field(row, "publications")),
        })
    }

    /// Edges matching every given filter. Subject and object match exactly;
    /// predicate is a case-insensitive substring.
    pub fn query_edges(
        &self,
        subject: Option<&str>,
        object: Option<&str>,
        predicate: Option<&str>,
        limit: usize,
    ) -> Vec<Value> {
        let predicate = predicate.map(str::to_lowercase);
        let candidates: Box<dyn Iterator<Item = usize> + '_> = match (subject, object) {
            (Some(s), _) => Box::new(self.by_subject.get(s).into_iter().flatten().copied()),
            (None, Some(o)) => Box::new(self.by_object.get(o).into_iter().flatten().copied()),
            (None, None) => Box::new(0..self.edges.rows.len()),
        };

        candidates
            .map(|i| &self.edges.rows[i])
            .filter(|row| object.is_none_or(|o| self.edges.field(row, "object") == o))
            .filter(|row| {
                predicate
                    .as_deref()
                    .is_none_or(|p| contains_ci(self.edges.field(row, "predicate"), p))
            })
            .take(limit)
            .map(|row| self.edge_json(row))
            .collect()
    }

    /// Every kept column of one node.
    pub fn node_details(&self, id: &str) -> Option<Value> {
        let &i = self.node_index.get(id)?;
        let row = &self.nodes.rows[i];
        let fields: Map<String, Value> = NODE_COLUMNS
            .iter()
            .map(|c| (c.to_string(), nullable(self.nodes.field(row, c))))
            .collect();
        Some(Value::Object(fields))
    }

    /// Edges where the node is subject or object, in file order.
    pub fn neighbors(&self, id: &str, predicate: Option<&str>, limit: usize) -> Vec<Value> {
        let predicate = predicate.map(str::to_lowercase);
        let mut indices: Vec<usize> = self
            .by_subject
            .get(id)
            .into_iter()
            .chain(self.by_object.get(id))
            .flatten()
            .copied()
            .collect();
        indices.sort_unstable();
        indices.dedup();

        indices
            .into_iter()
            .map(|i| &self.edges.rows[i])
            .filter(|row| {
                predicate
                    .as_deref()
                    .is_none_or(|p| contains_ci(self.edges.field(row, "predicate"), p))
            })
            .take(limit)
            .map(|row| self.edge_json(row))
            .collect()
    }
}

/// Lazily loaded graph shared by the four KG tools.
pub struct GraphSource {
    data_dir: Option<PathBuf>,
    graph: OnceCell<Arc<KnowledgeGraph>>,
}

impl GraphSource {
    pub fn new(data_dir: Option<PathBuf>) -> Self {
        Self {
            data_dir,
            graph: OnceCell::new(),
        }
    }

    /// A source backed by an already built graph.
    pub fn preloaded(graph: KnowledgeGraph) -> Self {
        Self {
            data_dir: None,
            graph: OnceCell::new_with(Some(Arc::new(graph))),
        }
    }

    async fn get(&self, tool_name: &str) -> Result<Arc<KnowledgeGraph>, ToolError> {
        self.graph
            .get_or_try_init(|| async {
                let dir = self.data_dir.clone().ok_or_else(|| {
                    ToolError::unavailable(tool_name, "no knowledge graph data directory configured")
                })?;
                let graph = tokio::task::spawn_blocking(move || KnowledgeGraph::load(&dir))
                    .await
                    .map_err(|e| ToolError::provider(tool_name, e.to_string()))?
                    .map_err(|e| ToolError::unavailable(tool_name, e))?;
                Ok(Arc::new(graph))
            })
            .await
            .cloned()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KgOperation {
    SearchNodes,
    QueryEdges,
    NodeDetails,
    NodeNeighbors,
}

/// One of the four knowledge-graph tools.
pub struct KnowledgeGraphTool {
    spec: ToolSpec,
    operation: KgOperation,
    source: Arc<GraphSource>,
}

impl KnowledgeGraphTool {
    pub fn search_nodes(source: Arc<GraphSource>) -> Self {
        let spec = ToolSpec::new(
            SEARCH_NODES,
            "Search the Alzheimer's knowledge graph for nodes (genes, diseases, drugs, pathways, \
             etc.) by name or synonym. Returns matching node IDs, categories, names, and \
             descriptions.",
        )
        .param(ParamSpec::string("query", "Search term (gene name, disease, drug, etc.)").required())
        .param(ParamSpec::string(
            "category",
            "Optional biolink category filter, e.g. 'biolink:Gene', 'biolink:Disease'",
        ))
        .param(ParamSpec::integer("limit", "Max results to return (default 20)").at_least(1).default_value(20));
        Self {
            spec,
            operation: KgOperation::SearchNodes,
            source,
        }
    }

    pub fn query_edges(source: Arc<GraphSource>) -> Self {
        let spec = ToolSpec::new(
            QUERY_EDGES,
            "Query relationships in the Alzheimer's knowledge graph. Filter by subject node ID, \
             object node ID, and/or predicate; at least one filter is required. Returns subject \
             name, predicate, object name, and publications.",
        )
        .param(ParamSpec::string("subject", "Subject node ID (e.g. 'HGNC:613')"))
        .param(ParamSpec::string("object", "Object node ID (e.g. 'MONDO:0004975')"))
        .param(ParamSpec::string(
            "predicate",
            "Predicate filter (e.g. 'biolink:gene_associated_with_condition')",
        ))
        .param(ParamSpec::integer("limit", "Max results to return (default 50)").at_least(1).default_value(50));
        Self {
            spec,
            operation: KgOperation::QueryEdges,
            source,
        }
    }

    pub fn node_details(source: Arc<GraphSource>) -> Self {
        let spec = ToolSpec::new(
            NODE_DETAILS,
            "Get full details for a node in the knowledge graph by its ID, including synonyms, \
             description, and taxon.",
        )
        .param(ParamSpec::string("node_id", "The node ID (e.g. 'HGNC:613')").required());
        Self {
            spec,
            operation: KgOperation::NodeDetails,
            source,
        }
    }

    pub fn node_neighbors(source: Arc<GraphSource>) -> Self {
        let spec = ToolSpec::new(
            NODE_NEIGHBORS,
            "Get all edges and neighbor nodes for a node ID. Optional predicate filter narrows \
             relationship types.",
        )
        .param(ParamSpec::string("node_id", "The node ID to find neighbors for").required())
        .param(ParamSpec::string("predicate", "Optional predicate filter (e.g. 'biolink:treats')"))
        .param(ParamSpec::integer("limit", "Max results to return (default 50)").at_least(1).default_value(50));
        Self {
            spec,
            operation: KgOperation::NodeNeighbors,
            source,
        }
    }

    /// All four tools over one shared source.
    pub fn all(source: Arc<GraphSource>) -> Vec<Self> {
        vec![
            Self::search_nodes(source.clone()),
            Self::query_edges(source.clone()),
            Self::node_details(source.clone()),
            Self::node_neighbors(source),
        ]
    }
}

fn str_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn limit_arg(arguments: &Map<String, Value>, default: usize) -> usize {
    arguments
        .get("limit")
        .and_then(Value::as_u64)
        .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
        .unwrap_or(default)
}

#[async_trait]
impl Tool for KnowledgeGraphTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn role(&self) -> ToolRole {
        ToolRole::KnowledgeGraph
    }

    async fn invoke(&self, arguments: &Map<String, Value>) -> Result<ToolOutput, ToolError> {
        let required = |name: &str| {
            str_arg(arguments, name)
                .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{name}' argument")))
        };

        // Reject bad arguments before touching the graph.
        if self.operation == KgOperation::QueryEdges
            && ["subject", "object", "predicate"]
                .iter()
                .all(|f| str_arg(arguments, f).is_none())
        {
            return Err(ToolError::InvalidArguments(
                "At least one of subject, object, or predicate is required".into(),
            ));
        }

        let graph = self.source.get(self.name()).await?;

        let payload = match self.operation {
            KgOperation::SearchNodes => Value::Array(graph.search_nodes(
                required("query")?,
                str_arg(arguments, "category"),
                limit_arg(arguments, 20),
            )),
            KgOperation::QueryEdges => Value::Array(graph.query_edges(
                str_arg(arguments, "subject"),
                str_arg(arguments, "object"),
                str_arg(arguments, "predicate"),
                limit_arg(arguments, 50),
            )),
            KgOperation::NodeDetails => {
                let node_id = required("node_id")?;
                graph
                    .node_details(node_id)
                    .unwrap_or_else(|| json!({ "error": format!("Node not found: {node_id}") }))
            }
            KgOperation::NodeNeighbors => Value::Array(graph.neighbors(
                required("node_id")?,
                str_arg(arguments, "predicate"),
                limit_arg(arguments, 50),
            )),
        };

        Ok(ToolOutput::new(payload))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    pub const NODES: &str = "id\tcategory\tname\tdescription\tsynonym\texact_synonyms\tsymbol\tfull_name\tin_taxon_label\textra\n\
HGNC:613\tbiolink:Gene\tAPOE\tapolipoprotein E\tAD2|LPG\t\tAPOE\tapolipoprotein E\tHomo sapiens\tx\n\
MONDO:0004975\tbiolink:Disease\tAlzheimer disease\tA dementia\tAD\t\t\t\t\tx\n\
CHEBI:1\tbiolink:Drug\tlecanemab\tanti-amyloid antibody\tBAN2401\tLeqembi\t\t\t\tx\n\
broken\trow\n";

    pub const EDGES: &str = "subject\tpredicate\tobject\tcategory\tprimary_knowledge_source\tpublications\tknowledge_level\thas_evidence\tnegated\n\
HGNC:613\tbiolink:gene_associated_with_condition\tMONDO:0004975\tbiolink:Association\tinfores:omim\tPMID:8346443\tknowledge_assertion\t\tFalse\n\
CHEBI:1\tbiolink:treats\tMONDO:0004975\tbiolink:Association\tinfores:chembl\t\tknowledge_assertion\t\tFalse\n";
}
