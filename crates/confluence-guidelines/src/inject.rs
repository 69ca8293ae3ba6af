//! Context injection middleware.
//!
//! Wraps the MCP server handler and rewrites inbound requests before they
//! reach it: each request is classified by keyword heuristics and a matching
//! corpus excerpt is merged into its open parameter object. The middleware is
//! deliberately fail-open — over-injecting is acceptable, dropping or
//! rejecting a legitimate request is not.

use rmcp::model::{
    ClientNotification, ClientRequest, JsonObject, ServerInfo, ServerResult,
};
use rmcp::service::{NotificationContext, RequestContext, Service};
use rmcp::{ErrorData as McpError, RoleServer};
use serde_json::Value;
use tracing::debug;

use crate::store::SharedStore;
use crate::views;

/// Which slice of guidance a request gets injected with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextCategory {
    ApiShape,
    Logging,
    DataAccess,
    General,
}

impl ContextCategory {
    pub fn name(self) -> &'static str {
        match self {
            ContextCategory::ApiShape => "api-shape",
            ContextCategory::Logging => "logging",
            ContextCategory::DataAccess => "data-access",
            ContextCategory::General => "general",
        }
    }

    fn preamble(self) -> &'static str {
        match self {
            ContextCategory::ApiShape => {
                "The request appears to declare or modify an API surface. \
                 Apply the team guidelines below, paying attention to endpoint \
                 naming and route shape."
            }
            ContextCategory::Logging => {
                "The request appears to touch logging. Apply the team \
                 guidelines below, paying attention to log levels and \
                 structured fields."
            }
            ContextCategory::DataAccess => {
                "The request appears to touch data access. Apply the team \
                 guidelines below, paying attention to query construction and \
                 repository boundaries."
            }
            ContextCategory::General => {
                "Apply the team engineering guidelines below to this request."
            }
        }
    }
}

/// Ordered classification rules, first match wins. Keywords are matched
/// against the lowercased JSON serialization of the whole request, so they
/// must themselves be lowercase.
const CLASSIFIER_RULES: &[(ContextCategory, &[&str])] = &[
    (
        ContextCategory::ApiShape,
        &["@app.route", "app.get(", "app.post(", "router.", "endpoint", "@restcontroller"],
    ),
    (
        ContextCategory::Logging,
        &["console.log", "logger", "logging", "log level", "winston"],
    ),
    (
        ContextCategory::DataAccess,
        &["select ", "insert into", "sql", "database", "repository"],
    ),
];

/// Method-name fragments that mark a request as lifecycle-sensitive; such
/// requests get enforcement flags in addition to the excerpt. Fragments are
/// compared against the lowercased method name.
const ENFORCED_METHOD_HINTS: &[&str] =
    &["completion", "hover", "codeaction", "diagnostic", "symbol"];

/// Key under `capabilities.experimental` advertising that injection is live.
const CAPABILITY_MARKER: &str = "guidelineContext";

/// Classify a lowercased scan string. Deterministic and order-sensitive:
/// the first rule whose keyword list matches wins.
pub fn classify(scan: &str) -> ContextCategory {
    for (category, keywords) in CLASSIFIER_RULES {
        if keywords.iter().any(|k| scan.contains(k)) {
            return *category;
        }
    }
    ContextCategory::General
}

/// Merge the excerpt into `arguments.context`, creating the sub-object when
/// missing and never removing fields already present there. A pre-existing
/// non-object `context` value is left untouched (fail-open).
pub fn enrich_arguments(
    arguments: &mut JsonObject,
    method: &str,
    category: ContextCategory,
    excerpt: &str,
) {
    let context = arguments
        .entry("context".to_string())
        .or_insert_with(|| Value::Object(JsonObject::new()));

    let Value::Object(context) = context else {
        return;
    };

    context.insert("guidelines".to_string(), Value::String(excerpt.to_string()));
    context.insert(
        "guidelineCategory".to_string(),
        Value::String(category.name().to_string()),
    );

    if is_enforced_method(method) {
        context.insert("enforcement".to_string(), Value::String("active".to_string()));
        context.insert("enforced".to_string(), Value::Bool(true));
    }
}

/// Advertise active injection in the capability negotiation of `initialize`.
pub fn mark_capabilities(capabilities: &mut rmcp::model::ClientCapabilities) {
    let mut marker = JsonObject::new();
    marker.insert("active".to_string(), Value::Bool(true));
    marker.insert(
        "version".to_string(),
        Value::String(env!("CARGO_PKG_VERSION").to_string()),
    );
    capabilities
        .experimental
        .get_or_insert_with(Default::default)
        .insert(CAPABILITY_MARKER.to_string(), marker);
}

fn is_enforced_method(method: &str) -> bool {
    let method = method.to_lowercase();
    ENFORCED_METHOD_HINTS.iter().any(|hint| method.contains(hint))
}

/// MCP service middleware that enriches requests and forwards them to the
/// wrapped handler unchanged in method and identity.
#[derive(Clone)]
pub struct ContextEnricher<S> {
    inner: S,
    store: SharedStore,
}

impl<S> ContextEnricher<S> {
    pub fn new(inner: S, store: SharedStore) -> Self {
        Self { inner, store }
    }

    async fn enrich(&self, mut request: ClientRequest) -> ClientRequest {
        // Classification works on the serialized request; if the request
        // cannot be serialized, skip injection rather than fail the exchange.
        let Ok(serialized) = serde_json::to_value(&request) else {
            return request;
        };
        let method = serialized
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let scan = serialized.to_string().to_lowercase();
        let category = classify(&scan);

        let excerpt = {
            let store = self.store.read().await;
            format!("{}\n\n{}", category.preamble(), views::combined(&store))
        };

        match &mut request {
            ClientRequest::CallToolRequest(r) => {
                let arguments = r.params.arguments.get_or_insert_with(JsonObject::new);
                enrich_arguments(arguments, &method, category, &excerpt);
            }
            ClientRequest::GetPromptRequest(r) => {
                let arguments = r.params.arguments.get_or_insert_with(JsonObject::new);
                enrich_arguments(arguments, &method, category, &excerpt);
            }
            ClientRequest::InitializeRequest(r) => {
                mark_capabilities(&mut r.params.capabilities);
            }
            // List/read/subscribe requests carry no open parameter object to
            // merge into; they pass through untouched.
            _ => {}
        }

        debug!(method = %method, category = category.name(), "request enriched");
        request
    }
}

impl<S: Service<RoleServer>> Service<RoleServer> for ContextEnricher<S> {
    async fn handle_request(
        &self,
        request: ClientRequest,
        context: RequestContext<RoleServer>,
    ) -> Result<ServerResult, McpError> {
        let request = self.enrich(request).await;
        self.inner.handle_request(request, context).await
    }

    async fn handle_notification(
        &self,
        notification: ClientNotification,
        context: NotificationContext<RoleServer>,
    ) -> Result<(), McpError> {
        self.inner.handle_notification(notification, context).await
    }

    fn get_info(&self) -> ServerInfo {
        self.inner.get_info()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let scan = r#"{"code":"logger.info('hi')"}"#.to_lowercase();
        assert_eq!(classify(&scan), ContextCategory::Logging);
        assert_eq!(classify(&scan), ContextCategory::Logging);
    }

    #[test]
    fn first_matching_rule_wins() {
        // Matches both the api-shape and logging keyword lists; api-shape is
        // listed first, so it must win.
        let scan = r#"add an endpoint that calls logger.warn"#.to_string();
        assert_eq!(classify(&scan), ContextCategory::ApiShape);
    }

    #[test]
    fn unmatched_body_falls_through_to_general() {
        assert_eq!(classify("refactor the date parser"), ContextCategory::General);
    }

    #[test]
    fn data_access_keywords_classify() {
        assert_eq!(
            classify("write a select statement for the users table"),
            ContextCategory::DataAccess
        );
    }

    #[test]
    fn injection_preserves_existing_context_fields() {
        let mut arguments = JsonObject::new();
        arguments.insert("context".to_string(), json!({"foo": 1}));

        enrich_arguments(&mut arguments, "tools/call", ContextCategory::General, "excerpt");

        let context = arguments["context"].as_object().unwrap();
        assert_eq!(context["foo"], json!(1));
        assert_eq!(context["guidelines"], json!("excerpt"));
        assert_eq!(context["guidelineCategory"], json!("general"));
    }

    #[test]
    fn injection_creates_context_object_when_absent() {
        let mut arguments = JsonObject::new();
        enrich_arguments(&mut arguments, "tools/call", ContextCategory::Logging, "x");
        assert_eq!(arguments["context"]["guidelineCategory"], json!("logging"));
    }

    #[test]
    fn non_object_context_is_left_alone() {
        let mut arguments = JsonObject::new();
        arguments.insert("context".to_string(), json!("opaque"));
        enrich_arguments(&mut arguments, "tools/call", ContextCategory::General, "x");
        assert_eq!(arguments["context"], json!("opaque"));
    }

    #[test]
    fn lifecycle_methods_get_enforcement_flags() {
        let mut arguments = JsonObject::new();
        enrich_arguments(
            &mut arguments,
            "completion/complete",
            ContextCategory::General,
            "x",
        );
        let context = arguments["context"].as_object().unwrap();
        assert_eq!(context["enforcement"], json!("active"));
        assert_eq!(context["enforced"], json!(true));
    }

    #[test]
    fn plain_methods_get_no_enforcement_flags() {
        let mut arguments = JsonObject::new();
        enrich_arguments(&mut arguments, "tools/call", ContextCategory::General, "x");
        let context = arguments["context"].as_object().unwrap();
        assert!(!context.contains_key("enforcement"));
    }

    #[test]
    fn initialize_capabilities_carry_marker() {
        let mut capabilities = rmcp::model::ClientCapabilities::default();
        mark_capabilities(&mut capabilities);
        let experimental = capabilities.experimental.unwrap();
        let marker = experimental.get(CAPABILITY_MARKER).unwrap();
        assert_eq!(marker["active"], json!(true));
    }
}
