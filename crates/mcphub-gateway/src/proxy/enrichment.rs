//! Argument enrichment for unified tool calls
//!
//! An [`ArgumentEnricher`] may rewrite a call's arguments before they reach
//! the backend. Enrichers never fail the call: on any problem they hand the
//! arguments back untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::JsonObject;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::pool::ConnectionService;

/// What an enricher may use to look things up on the target backend
pub struct EnrichmentContext<'a> {
    pub connector_name: &'a str,
    pub tool_name: &'a str,
    pub connection_id: Uuid,
    pub connections: &'a ConnectionService,
}

#[async_trait]
pub trait ArgumentEnricher: Send + Sync {
    async fn enrich(
        &self,
        ctx: &EnrichmentContext<'_>,
        arguments: Option<JsonObject>,
    ) -> Option<JsonObject>;
}

/// Enrichers keyed by `(connector, tool)`
#[derive(Default, Clone)]
pub struct EnricherRegistry {
    hooks: HashMap<(String, String), Arc<dyn ArgumentEnricher>>,
}

impl EnricherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in enrichers
    pub fn with_defaults() -> Self {
        Self::new().register(
            NOTION_CONNECTOR,
            NOTION_CREATE_PAGE_TOOL,
            Arc::new(NotionParentPageEnricher::default()),
        )
    }

    pub fn register(
        mut self,
        connector: impl Into<String>,
        tool: impl Into<String>,
        enricher: Arc<dyn ArgumentEnricher>,
    ) -> Self {
        self.hooks.insert((connector.into(), tool.into()), enricher);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the enricher for the context's target, if any
    pub async fn apply(
        &self,
        ctx: &EnrichmentContext<'_>,
        arguments: Option<JsonObject>,
    ) -> Option<JsonObject> {
        let key = (ctx.connector_name.to_string(), ctx.tool_name.to_string());
        match self.hooks.get(&key) {
            Some(enricher) => enricher.enrich(ctx, arguments).await,
            None => arguments,
        }
    }
}

pub const NOTION_CONNECTOR: &str = "notion";
pub const NOTION_CREATE_PAGE_TOOL: &str = "API-post-page";
pub const NOTION_SEARCH_TOOL: &str = "API-post-search";

const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Fills in `parent.page_id` on page creation when the caller left it out
///
/// Uses the first page a backend search returns. When the search fails or
/// finds nothing, the call goes through without a parent and the backend
/// decides what to do with it.
pub struct NotionParentPageEnricher {
    lookup_timeout: Duration,
}

impl Default for NotionParentPageEnricher {
    fn default() -> Self {
        Self {
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }
}

impl NotionParentPageEnricher {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    async fn first_page_id(&self, ctx: &EnrichmentContext<'_>) -> Option<String> {
        let query = json!({
            "filter": { "value": "page", "property": "object" },
            "page_size": 1,
        });
        let query = query.as_object().cloned();

        let search = ctx
            .connections
            .call_tool(&ctx.connection_id, NOTION_SEARCH_TOOL, query);

        let result = match tokio::time::timeout(self.lookup_timeout, search).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                debug!(connector = %ctx.connector_name, error = %e, "[Enrichment] Page search failed");
                return None;
            }
            Err(_) => {
                debug!(connector = %ctx.connector_name, "[Enrichment] Page search timed out");
                return None;
            }
        };

        let content = serde_json::to_value(&result.content).ok()?;
        let text = content
            .as_array()?
            .iter()
            .find(|c| c.get("type").and_then(Value::as_str) == Some("text"))?
            .get("text")?
            .as_str()?;

        let parsed: Value = serde_json::from_str(text).ok()?;
        parsed
            .get("results")?
            .get(0)?
            .get("id")?
            .as_str()
            .map(String::from)
    }
}

#[async_trait]
impl ArgumentEnricher for NotionParentPageEnricher {
    async fn enrich(
        &self,
        ctx: &EnrichmentContext<'_>,
        arguments: Option<JsonObject>,
    ) -> Option<JsonObject> {
        let has_parent = arguments
            .as_ref()
            .map(|args| args.get("parent").map(|p| !p.is_null()).unwrap_or(false))
            .unwrap_or(false);
        if has_parent {
            return arguments;
        }

        match self.first_page_id(ctx).await {
            Some(page_id) => {
                info!(
                    connector = %ctx.connector_name,
                    tool = %ctx.tool_name,
                    page_id = %page_id,
                    "[Enrichment] Injected parent page"
                );
                let mut args = arguments.unwrap_or_default();
                args.insert("parent".to_string(), json!({ "page_id": page_id }));
                Some(args)
            }
            None => {
                debug!(
                    connector = %ctx.connector_name,
                    tool = %ctx.tool_name,
                    "[Enrichment] No parent page found, forwarding unchanged"
                );
                arguments
            }
        }
    }
}
