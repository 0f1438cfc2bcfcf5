//! Query planners: `DiscoveryAgent` implementations.

use std::sync::Arc;

use async_trait::async_trait;
use montage_core::provider::{strip_code_fences, Provider, ProviderRequest};
use montage_core::{CapabilityFailure, DiscoveryAgent, QueryPlan, SearchQuery};
use tracing::{debug, warn};

const PLANNER_SYSTEM_PROMPT: &str = "\
You are a creative search planner for the Internet Archive. Your goal is to \
find diverse, high-quality images that match the user's creative prompt.

Plan several searches with varied keywords, synonyms, and different angles. \
The `keywords` field accepts Lucene boolean syntax, e.g. \
\"(botanical OR flora) AND illustration\". Each search may optionally name an \
Internet Archive `collection` identifier and a `date_filter` range such as \
\"1900 TO 1950\".

Return ONLY a JSON array of objects with keys `keywords`, `collection`, and \
`date_filter`. No explanation, no markdown fences.";

/// Plans a single search using the prompt verbatim. Needs no network.
#[derive(Debug, Default, Clone)]
pub struct KeywordQueryPlanner;

#[async_trait]
impl DiscoveryAgent for KeywordQueryPlanner {
    fn name(&self) -> &str {
        "keyword_planner"
    }

    async fn plan(&self, prompt: &str) -> Result<QueryPlan, CapabilityFailure> {
        let keywords = prompt.trim();
        if keywords.is_empty() {
            return Ok(QueryPlan::default());
        }
        Ok(QueryPlan::new(vec![SearchQuery::keywords(keywords)]))
    }
}

/// Asks an LLM for a varied set of searches.
pub struct LlmQueryPlanner {
    provider: Arc<dyn Provider>,
    model: String,
    max_queries: usize,
}

impl LlmQueryPlanner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, max_queries: usize) -> Self {
        Self {
            provider,
            model: model.into(),
            max_queries: max_queries.max(1),
        }
    }
}

/// Parse the planner reply. Queries with blank keywords are skipped.
pub fn parse_query_plan(text: &str, max_queries: usize) -> Result<QueryPlan, CapabilityFailure> {
    let queries: Vec<SearchQuery> = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CapabilityFailure::MalformedResponse(format!("query plan: {e}")))?;

    let queries = queries
        .into_iter()
        .filter(|q| !q.keywords.trim().is_empty())
        .map(|mut q| {
            q.collection = q.collection.filter(|c| !c.trim().is_empty());
            q.date_filter = q.date_filter.filter(|d| !d.trim().is_empty());
            q
        })
        .take(max_queries)
        .collect();

    Ok(QueryPlan::new(queries))
}

#[async_trait]
impl DiscoveryAgent for LlmQueryPlanner {
    fn name(&self) -> &str {
        "llm_planner"
    }

    async fn plan(&self, prompt: &str) -> Result<QueryPlan, CapabilityFailure> {
        let request = ProviderRequest::single(
            &self.model,
            PLANNER_SYSTEM_PROMPT,
            format!("Creative prompt: {prompt}\n\nPlan up to {} searches.", self.max_queries),
        )
        .with_max_tokens(1024);

        let response = self.provider.complete(request).await?;
        let plan = parse_query_plan(&response.text, self.max_queries)?;

        if plan.is_empty() {
            warn!("Planner returned no usable queries, falling back to the prompt");
            return KeywordQueryPlanner.plan(prompt).await;
        }

        debug!(queries = plan.queries.len(), "Query plan ready");
        Ok(plan)
    }
}
