/// MCP server implementation for team engineering guidelines.
///
/// Exposes the corpus three ways:
/// - Resources under the `guideline://` scheme (single record, combined
///   corpus, condensed context)
/// - Tools: `list_guidelines`, `get_guideline`, `check_endpoint_name`,
///   `ping`, `reload_guidelines`
/// - Prompts: `review_code`, `apply_guidelines` (both embed the combined view)
use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, Json, RoleServer, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use confluence_client::confluence::ConfluenceClient;

use crate::config::Config;
use crate::loader;
use crate::model::GuidelineSummary;
use crate::store::{GuidelineStore, SharedStore};
use crate::views;

const GUIDELINE_SCHEME: &str = "guideline://";
const COMBINED_URI: &str = "guideline://all";
const CONDENSED_URI: &str = "guideline://context";

#[derive(Clone)]
pub struct GuidelinesServer {
    store: SharedStore,
    client: Arc<ConfluenceClient>,
    config: Config,
    tool_router: ToolRouter<GuidelinesServer>,
}

impl GuidelinesServer {
    pub fn new(store: SharedStore, client: Arc<ConfluenceClient>, config: Config) -> Self {
        Self {
            store,
            client,
            config,
            tool_router: Self::tool_router(),
        }
    }
}

// --- Tool parameter and response types ---

#[derive(Debug, Deserialize, JsonSchema)]
struct GetGuidelineParams {
    /// Stable page id of the guideline, as returned by `list_guidelines`.
    guideline_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CheckEndpointNameParams {
    /// Endpoint path or name to check, e.g. "/user-profiles" or "get_user".
    endpoint: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PingParams {
    /// Optional text to echo back.
    message: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct GuidelineListResponse {
    guidelines: Vec<GuidelineSummary>,
}

#[derive(Debug, Serialize, JsonSchema)]
struct GuidelineDetailResponse {
    id: String,
    title: String,
    text: String,
    source_url: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct EndpointNameCheckResponse {
    endpoint: String,
    compliant: bool,
    verdict: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct PingResponse {
    ok: bool,
    echo: String,
}

#[derive(Debug, Serialize, JsonSchema)]
struct ReloadGuidelinesResponse {
    guideline_count: usize,
}

#[tool_router]
impl GuidelinesServer {
    #[tool(description = "List all loaded guideline pages as {id, title} pairs.")]
    async fn list_guidelines(&self) -> Result<Json<GuidelineListResponse>, String> {
        let store = self.store.read().await;
        Ok(Json(GuidelineListResponse {
            guidelines: store.summaries(),
        }))
    }

    #[tool(description = "Get the full normalized text of one guideline page by its id.")]
    async fn get_guideline(
        &self,
        Parameters(params): Parameters<GetGuidelineParams>,
    ) -> Result<Json<GuidelineDetailResponse>, String> {
        let guideline_id = params.guideline_id.trim().to_string();
        if guideline_id.is_empty() {
            return Err("guideline_id must not be empty".to_string());
        }

        let store = self.store.read().await;
        let record = store
            .get(&guideline_id)
            .ok_or_else(|| format!("guideline not found: {guideline_id}"))?;

        Ok(Json(GuidelineDetailResponse {
            id: record.id.clone(),
            title: record.title.clone(),
            text: record.text.clone(),
            source_url: record.source_url.clone(),
        }))
    }

    #[tool(description = "Check an endpoint name against the team naming convention: hyphen-separated segments, no underscores.")]
    async fn check_endpoint_name(
        &self,
        Parameters(params): Parameters<CheckEndpointNameParams>,
    ) -> Result<Json<EndpointNameCheckResponse>, String> {
        let endpoint = params.endpoint.trim().to_string();
        if endpoint.is_empty() {
            return Err("endpoint must not be empty".to_string());
        }

        let (compliant, verdict) = endpoint_name_verdict(&endpoint);
        Ok(Json(EndpointNameCheckResponse {
            endpoint,
            compliant,
            verdict,
        }))
    }

    #[tool(description = "Health check. Echoes the optional message back.")]
    async fn ping(
        &self,
        Parameters(params): Parameters<PingParams>,
    ) -> Result<Json<PingResponse>, String> {
        Ok(Json(PingResponse {
            ok: true,
            echo: params.message.unwrap_or_else(|| "pong".to_string()),
        }))
    }

    #[tool(description = "Re-fetch the guideline corpus from the wiki and replace the in-memory store. On failure the previous corpus stays in place.")]
    async fn reload_guidelines(&self) -> Result<Json<ReloadGuidelinesResponse>, String> {
        info!("reload_guidelines tool invoked");

        let fresh = loader::load(self.client.as_ref(), &self.config.root_page_id)
            .await
            .map_err(|e| format!("reload failed: {e}"))?;

        let guideline_count = fresh.len();
        // Built completely before publication, so readers only ever see the
        // old snapshot or the new one.
        *self.store.write().await = fresh;
        info!(guideline_count, "in-memory store replaced");

        Ok(Json(ReloadGuidelinesResponse { guideline_count }))
    }
}

/// Naming-convention verdict for an endpoint string: underscores violate the
/// convention, hyphen-separated (or single-word) names comply.
fn endpoint_name_verdict(endpoint: &str) -> (bool, String) {
    if endpoint.contains('_') {
        (
            false,
            format!("'{endpoint}' violates the naming convention: use hyphens instead of underscores"),
        )
    } else {
        (
            true,
            format!("'{endpoint}' complies with the naming convention"),
        )
    }
}

/// Resolve a `guideline://` URI to view text. `None` means the URI does not
/// belong to this server's scheme.
fn resource_text(store: &GuidelineStore, uri: &str) -> Option<String> {
    match uri {
        COMBINED_URI => Some(views::combined(store)),
        CONDENSED_URI => Some(views::condensed(store)),
        other => other
            .strip_prefix(GUIDELINE_SCHEME)
            .map(|id| views::single(store, id)),
    }
}

fn text_resource(uri: &str, name: &str, description: &str) -> Resource {
    let mut raw = RawResource::new(uri, name.to_string());
    raw.description = Some(description.to_string());
    raw.mime_type = Some("text/plain".to_string());
    raw.no_annotation()
}

#[tool_handler]
impl ServerHandler for GuidelinesServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "confluence-guidelines".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Team engineering guidelines MCP server. The corpus is loaded \
                 from the team wiki at startup. Read guideline://all for the \
                 full corpus, guideline://context for a condensed one-line \
                 rendering, or guideline://{id} for a single page. Tools: \
                 list_guidelines, get_guideline, check_endpoint_name, ping, \
                 reload_guidelines. Prompts review_code and apply_guidelines \
                 embed the full corpus."
                    .to_string(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let store = self.store.read().await;
        let mut resources = vec![
            text_resource(
                COMBINED_URI,
                "All guidelines",
                "Every guideline page, concatenated with section headers",
            ),
            text_resource(
                CONDENSED_URI,
                "Condensed guidelines",
                "One-line rendering of the whole corpus for tight contexts",
            ),
        ];
        for summary in store.summaries() {
            resources.push(text_resource(
                &format!("{GUIDELINE_SCHEME}{}", summary.id),
                &summary.title,
                "Single guideline page, normalized text",
            ));
        }

        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let store = self.store.read().await;
        let text = resource_text(&store, &request.uri).ok_or_else(|| {
            McpError::new(
                ErrorCode::RESOURCE_NOT_FOUND,
                format!("unsupported resource URI: {}", request.uri),
                None,
            )
        })?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts = vec![
            Prompt {
                name: "review_code".to_string(),
                title: None,
                description: Some("Review code against the full team guideline corpus.".to_string()),
                arguments: Some(vec![PromptArgument {
                    name: "code".to_string(),
                    title: None,
                    description: Some("The code to review".to_string()),
                    required: Some(true),
                }]),
                icons: None,
                meta: None,
            },
            Prompt {
                name: "apply_guidelines".to_string(),
                title: None,
                description: Some("Carry out a task while following the team guidelines.".to_string()),
                arguments: Some(vec![PromptArgument {
                    name: "task".to_string(),
                    title: None,
                    description: Some("What to do".to_string()),
                    required: Some(true),
                }]),
                icons: None,
                meta: None,
            },
        ];
        Ok(ListPromptsResult::with_all_items(prompts))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();
        let corpus = {
            let store = self.store.read().await;
            views::combined(&store)
        };

        let required = |key: &str| -> Result<String, McpError> {
            arguments
                .get(key)
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    McpError::new(
                        ErrorCode::INVALID_PARAMS,
                        format!("missing required argument: {key}"),
                        None,
                    )
                })
        };

        match request.name.as_str() {
            "review_code" => {
                let code = required("code")?;
                let text = format!(
                    "Review the following code against the team engineering \
                     guidelines. Point out every violation with the guideline \
                     it breaks.\n\nGUIDELINES:\n\n{corpus}\n\nCODE:\n\n{code}"
                );
                Ok(GetPromptResult {
                    description: Some("Code review against the guideline corpus".to_string()),
                    messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
                })
            }
            "apply_guidelines" => {
                let task = required("task")?;
                let text = format!(
                    "Carry out the task below. Follow the team engineering \
                     guidelines; when a guideline applies, say which one.\n\n\
                     GUIDELINES:\n\n{corpus}\n\nTASK:\n\n{task}"
                );
                Ok(GetPromptResult {
                    description: Some("Guideline-aware task execution".to_string()),
                    messages: vec![PromptMessage::new_text(PromptMessageRole::User, text)],
                })
            }
            other => Err(McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("unknown prompt: {other}"),
                None,
            )),
        }
    }
}
