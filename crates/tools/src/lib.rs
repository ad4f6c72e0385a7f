//! Tool provider adapters for AlzAssist.
//!
//! Each adapter implements the uniform [`Tool`](alzassist_core::tool::Tool)
//! contract over one external capability:
//!
//! - `query_papers`: the curated Alzheimer's corpus (primary)
//! - `search_external_literature`: Europe PMC (external, fallback only)
//! - `search_kg_nodes`, `query_kg_edges`, `get_node_details`,
//!   `get_node_neighbors`: the Alzheimer's knowledge graph
//! - `create_plot`: Vega-Lite plots of extracted data

pub mod corpus_search;
pub mod external_literature;
pub mod knowledge_graph;
pub mod plotting;

use std::sync::Arc;

use alzassist_config::AppConfig;
use alzassist_core::tool::ToolRegistry;

pub use corpus_search::CorpusSearchTool;
pub use external_literature::ExternalLiteratureTool;
pub use knowledge_graph::{GraphSource, KnowledgeGraph, KnowledgeGraphTool};
pub use plotting::PlottingTool;

/// Create the registry with every built-in tool.
///
/// Providers that are not configured (no corpus endpoint, no KG data
/// directory) are still registered; they answer with `Unavailable` so
/// the reasoner can observe the gap instead of never seeing the tool.
pub fn default_registry(config: &AppConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(CorpusSearchTool::new(&config.corpus)));
    registry.register(Arc::new(ExternalLiteratureTool::new(
        &config.external_literature,
    )));

    let graph = Arc::new(GraphSource::new(config.knowledge_graph.data_dir.clone()));
    for tool in KnowledgeGraphTool::all(graph) {
        registry.register(Arc::new(tool));
    }

    registry.register(Arc::new(PlottingTool::new(&config.plotting)));

    tracing::debug!(tools = registry.len(), "Tool registry built");
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use alzassist_core::tool::ToolRole;

    #[test]
    fn default_registry_has_all_tools() {
        let registry = default_registry(&AppConfig::default());
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.names_with_role(ToolRole::Primary), vec!["query_papers"]);
        assert_eq!(
            registry.names_with_role(ToolRole::External),
            vec!["search_external_literature"]
        );
        assert_eq!(registry.names_with_role(ToolRole::KnowledgeGraph).len(), 4);
        assert!(registry.contains("create_plot"));
    }

    #[test]
    fn definitions_use_function_calling_shape() {
        let registry = default_registry(&AppConfig::default());
        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(def.parameters["required"].is_array(), "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }

    #[tokio::test]
    async fn unconfigured_knowledge_graph_is_unavailable() {
        let registry = default_registry(&AppConfig::default());
        let tool = registry.get("get_node_details").unwrap();
        let args = tool
            .spec()
            .validate(&serde_json::json!({"node_id": "HGNC:613"}))
            .unwrap();
        let err = tool.invoke(&args).await.unwrap_err();
        assert!(matches!(
            err,
            alzassist_core::error::ToolError::Unavailable { .. }
        ));
    }
}
