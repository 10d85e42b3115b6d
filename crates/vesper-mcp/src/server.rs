//! MCP Server Core
//!
//! Routes JSON-RPC requests to the tool handlers. The tool catalog is a
//! static list in a fixed order; no runtime filtering.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::protocol::messages::{
    CallToolRequest, CallToolResult, InitializeRequest, InitializeResult, ListToolsResult,
    ServerCapabilities, ServerInfo, ToolDescription, ToolResultContent,
};
use crate::protocol::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_VERSION};
use crate::tools;
use vesper_core::Vesper;

/// Tool server over the engine facade
pub struct McpServer {
    vesper: Arc<Vesper>,
    initialized: bool,
}

impl McpServer {
    pub fn new(vesper: Arc<Vesper>) -> Self {
        Self {
            vesper,
            initialized: false,
        }
    }

    /// Handle one JSON-RPC request; `None` means notification (no reply)
    pub async fn handle_request(&mut self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("handling request: {}", request.method);

        if !self.initialized
            && request.method != "initialize"
            && request.method != "notifications/initialized"
        {
            warn!("rejecting '{}': server not initialized", request.method);
            return Some(JsonRpcResponse::error(
                request.id,
                JsonRpcError::server_not_initialized(),
            ));
        }

        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "notifications/initialized" => return None,
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            method => {
                warn!("unknown method: {}", method);
                Err(JsonRpcError::method_not_found(method))
            }
        };

        Some(match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(error) => JsonRpcResponse::error(request.id, error),
        })
    }

    async fn handle_initialize(
        &mut self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: InitializeRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => InitializeRequest::default(),
        };

        // Use the client's protocol version when it is older than ours
        let negotiated = if request.protocol_version.as_str() < MCP_VERSION {
            request.protocol_version.clone()
        } else {
            MCP_VERSION.to_string()
        };

        self.initialized = true;
        info!("session initialized with protocol version {}", negotiated);

        let result = InitializeResult {
            protocol_version: negotiated,
            server_info: ServerInfo {
                name: "vesper".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some({
                    let mut map = HashMap::new();
                    map.insert("listChanged".to_string(), serde_json::json!(false));
                    map
                }),
            },
            instructions: Some(
                "Vesper is a multi-tier memory store. Use store_memory for facts and \
                 experiences, store_decision for decisions (with supersedes to replace \
                 earlier ones), and retrieve_memory to recall. All operations are scoped \
                 by namespace; share_context hands a namespace's knowledge to another."
                    .to_string(),
            ),
        };

        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    /// Static tool catalog, fixed order
    fn handle_tools_list(&self) -> Result<serde_json::Value, JsonRpcError> {
        let tools = vec![
            ToolDescription {
                name: "store_memory".to_string(),
                description: Some("Store a memory in the namespaced long-term store. Content is embedded and indexed for hybrid retrieval; the write is searchable when the call returns.".to_string()),
                input_schema: tools::store::schema(),
            },
            ToolDescription {
                name: "retrieve_memory".to_string(),
                description: Some("Recall memories for a query. A classifier routes to the cheapest sufficient path (entity lookup, preference scan, graph traversal, recency, skill catalog, or hybrid search); results carry provenance.".to_string()),
                input_schema: tools::retrieve::schema(),
            },
            ToolDescription {
                name: "list_recent".to_string(),
                description: Some("List the most recent memory rows in a namespace, newest first, optionally filtered by memory type.".to_string()),
                input_schema: tools::recent::schema(),
            },
            ToolDescription {
                name: "get_stats".to_string(),
                description: Some("Memory store statistics for a namespace. Pass detailed=true for adapter health, vector collection status, and consolidation counters.".to_string()),
                input_schema: tools::stats::stats_schema(),
            },
            ToolDescription {
                name: "vesper_enable".to_string(),
                description: Some("Enable the memory store for this process.".to_string()),
                input_schema: tools::toggle::schema(),
            },
            ToolDescription {
                name: "vesper_disable".to_string(),
                description: Some("Disable the memory store: writes short-circuit and retrieval returns empty lists until re-enabled.".to_string()),
                input_schema: tools::toggle::schema(),
            },
            ToolDescription {
                name: "vesper_status".to_string(),
                description: Some("Report whether the memory store is active.".to_string()),
                input_schema: tools::toggle::schema(),
            },
            ToolDescription {
                name: "record_skill_outcome".to_string(),
                description: Some("Record whether a skill invocation succeeded. Success requires a satisfaction score in [0,1] and updates the skill's quality ranking.".to_string()),
                input_schema: tools::skills::outcome_schema(),
            },
            ToolDescription {
                name: "load_skill".to_string(),
                description: Some("Load a skill's full row (description, code, prerequisites). Catalog queries see summaries only; this is the invocation-time load.".to_string()),
                input_schema: tools::skills::load_schema(),
            },
            ToolDescription {
                name: "delete_memory".to_string(),
                description: Some("Delete a memory row by id within a namespace, cascading to facts extracted from it. Idempotent.".to_string()),
                input_schema: tools::delete::schema(),
            },
            ToolDescription {
                name: "share_context".to_string(),
                description: Some("Bundle a source namespace's memories and entities and write a single episodic handoff row into a target namespace. Source data is unchanged.".to_string()),
                input_schema: tools::share::schema(),
            },
            ToolDescription {
                name: "store_decision".to_string(),
                description: Some("Record a decision with optional rationale. supersedes links the replaced decision (same namespace only); conflicts against live decisions are detected and reported.".to_string()),
                input_schema: tools::decision::schema(),
            },
            ToolDescription {
                name: "list_namespaces".to_string(),
                description: Some("List every namespace that holds memories, entities, or skills.".to_string()),
                input_schema: tools::stats::namespaces_schema(),
            },
            ToolDescription {
                name: "namespace_stats".to_string(),
                description: Some("Aggregate statistics for one namespace: row counts, decision count, agents, tasks, and creation-time range.".to_string()),
                input_schema: tools::stats::namespace_stats_schema(),
            },
        ];

        let result = ListToolsResult { tools };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, JsonRpcError> {
        let request: CallToolRequest = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| JsonRpcError::invalid_params(&e.to_string()))?,
            None => return Err(JsonRpcError::invalid_params("Missing tool call parameters")),
        };

        let result = match request.name.as_str() {
            "store_memory" => tools::store::execute(&self.vesper, request.arguments).await,
            "retrieve_memory" => tools::retrieve::execute(&self.vesper, request.arguments).await,
            "list_recent" => tools::recent::execute(&self.vesper, request.arguments).await,
            "get_stats" => tools::stats::execute_stats(&self.vesper, request.arguments).await,
            "vesper_enable" => tools::toggle::execute_enable(&self.vesper).await,
            "vesper_disable" => tools::toggle::execute_disable(&self.vesper).await,
            "vesper_status" => tools::toggle::execute_status(&self.vesper).await,
            "record_skill_outcome" => {
                tools::skills::execute_outcome(&self.vesper, request.arguments).await
            }
            "load_skill" => tools::skills::execute_load(&self.vesper, request.arguments).await,
            "delete_memory" => tools::delete::execute(&self.vesper, request.arguments).await,
            "share_context" => tools::share::execute(&self.vesper, request.arguments).await,
            "store_decision" => tools::decision::execute(&self.vesper, request.arguments).await,
            "list_namespaces" => {
                tools::stats::execute_list_namespaces(&self.vesper, request.arguments).await
            }
            "namespace_stats" => {
                tools::stats::execute_namespace_stats(&self.vesper, request.arguments).await
            }
            name => {
                return Err(JsonRpcError::method_not_found(&format!("Unknown tool: {name}")));
            }
        };

        let response = match result {
            Ok(content) => CallToolResult {
                content: vec![ToolResultContent {
                    content_type: "text".to_string(),
                    text: serde_json::to_string_pretty(&content)
                        .unwrap_or_else(|_| content.to_string()),
                }],
                is_error: Some(false),
            },
            Err(message) => CallToolResult {
                content: vec![ToolResultContent {
                    content_type: "text".to_string(),
                    text: serde_json::json!({ "error": message }).to_string(),
                }],
                is_error: Some(true),
            },
        };
        serde_json::to_value(response).map_err(|e| JsonRpcError::internal_error(&e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
