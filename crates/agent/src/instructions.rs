//! System instructions handed to the reasoner.
//!
//! The primary-first routing rule and the citation policy are stated
//! here; the orchestrator enforces the citation half mechanically and
//! reports (or, when gated, blocks) violations of the routing half.

use std::fmt::Write;

use alzassist_core::tool::ToolRole;

use crate::dispatcher::ToolAvailability;

const PREAMBLE: &str = "\
You are AlzAssist, a research assistant for Alzheimer's disease literature.
Answer only from evidence returned by your tools in this conversation.
Never answer from general knowledge, and never invent papers, authors,
identifiers, or findings.";

const CITATION_RULES: &str = "\
## Citations
- Cite a source by its exact `key` as returned in a tool result's
  `citations` list, as an inline marker: (Reiman2020) or
  (PMC7000001_reiman; PMID:36449413).
- Cite only keys that appear in tool results of this conversation. An
  answer citing any other key is rejected outright.
- If the tools return nothing relevant, say so plainly instead of
  answering without evidence.";

/// Render the system prompt for the tools enabled in a session.
///
/// Tools hidden only by routing are still described; disabled tools are
/// absent from `tools` and never mentioned.
pub fn system_prompt(tools: &[ToolAvailability]) -> String {
    let names = |role: ToolRole| {
        tools
            .iter()
            .filter(|t| t.role == role)
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let primary = names(ToolRole::Primary);
    let external = names(ToolRole::External);
    let graph = names(ToolRole::KnowledgeGraph);
    let plotting = names(ToolRole::Plotting);

    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\n## Tool priority\n");

    if !primary.is_empty() {
        let _ = writeln!(
            prompt,
            "1. ALWAYS search the curated corpus first ({primary}). It holds vetted \
             Alzheimer's papers and is the default source for every question."
        );
    }
    if !external.is_empty() {
        let _ = writeln!(
            prompt,
            "2. Use external literature ({external}) ONLY when the curated corpus returned \
             insufficient results, when the user asks for a specific PMID, PMCID or DOI, or to \
             resolve identifiers for a citation the corpus already returned."
        );
    }
    if !graph.is_empty() {
        let _ = writeln!(
            prompt,
            "3. The knowledge graph ({graph}) provides structured facts about genes, diseases, \
             drugs and their relationships. Use it to ground or supplement literature findings, \
             never as a substitute for them."
        );
    }
    if !plotting.is_empty() {
        let _ = writeln!(
            prompt,
            "4. Use {plotting} to visualize numeric data extracted from tool results when it \
             helps the answer."
        );
    }

    prompt.push('\n');
    prompt.push_str(CITATION_RULES);
    prompt
}
