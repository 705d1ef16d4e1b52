// SPDX-License-Identifier: MIT

//! HTTP surface - endpoint runs over SSE plus operational routes

use axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::adk::error::FabriqError;
use crate::fabriq::config::{ConfigStore, EngineConfig};
use crate::fabriq::runtime::{render_prompt, validate_contract, Engine};
use crate::fabriq::scheduler::Scheduler;

const API_KEY_HEADER: &str = "x-api-key";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub config: ConfigStore,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(engine: Engine, config: ConfigStore, scheduler: Arc<Scheduler>) -> Self {
        Self {
            engine,
            config,
            scheduler,
        }
    }
}

/// Error response rendered as `{"detail": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Invalid or missing API key")
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Build the application router. CORS origins are fixed at startup.
pub fn router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/run/{slug}", post(run_endpoint))
        .route("/health", get(health))
        .route("/config", get(current_config))
        .route("/reload", post(reload))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(allowed_origins))
}

pub async fn serve(state: AppState, addr: SocketAddr) -> Result<(), FabriqError> {
    let config = state.config.get().await;
    log::info!(
        "Engine started (origins={:?}, auth={}, systems={}, endpoints={}, async_functions={})",
        config.allowed_origins,
        if config.api_key.is_some() { "enabled" } else { "disabled" },
        config.systems.len(),
        config.endpoints.len(),
        config.async_functions.len()
    );
    let app = router(state, &config.allowed_origins);

    log::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// No configured key means auth is disabled
fn check_api_key(config: &EngineConfig, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(());
    };
    let given = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    if given == Some(expected) {
        Ok(())
    } else {
        Err(ApiError::unauthorized())
    }
}

async fn run_endpoint(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let config = state.config.get().await;
    check_api_key(&config, &headers)?;

    let endpoint = config
        .get_endpoint(&slug)
        .ok_or_else(|| ApiError::not_found(format!("Endpoint '{}' not found", slug)))?;

    validate_contract(&endpoint.contract, &request.data)
        .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let prompt = render_prompt(&endpoint.prompt, &request.data);
    let system = config
        .get_system(&endpoint.system_id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    log::info!("Run requested: endpoint={}, system={}", slug, system.id);
    let events = state.engine.execute_run(system, prompt).await;
    let stream = event_stream(events);

    Ok((
        [("x-accel-buffering", "no")],
        Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))),
    ))
}

fn event_stream<S>(events: S) -> impl Stream<Item = Result<Event, Infallible>>
where
    S: Stream<Item = crate::fabriq::graph::RunEvent>,
{
    events.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(Event::default().data(data))
    })
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let config = state.config.get().await;
    Json(json!({
        "status": "healthy",
        "systems": config.systems.len(),
        "endpoints": config.endpoints.len(),
    }))
}

async fn current_config(State(state): State<AppState>) -> Json<EngineConfig> {
    Json(state.config.get().await.as_ref().clone())
}

async fn reload(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let current = state.config.get().await;
    check_api_key(&current, &headers)?;

    let config = state.config.reload().await.map_err(|e| {
        log::error!("Reload failed: {}", e);
        ApiError::internal(format!("Reload failed: {}", e))
    })?;

    state.engine.cache().invalidate(None).await;
    let engine = state.engine.clone();
    state.scheduler.start(config.clone(), engine).await;

    Ok(Json(json!({
        "status": "reloaded",
        "systems": config.systems.len(),
        "endpoints": config.endpoints.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::model::{Content, GenerationConfig, Model, ModelProvider};
    use crate::adk::tool::Tool;
    use crate::fabriq::agents::AgentTypeRegistry;
    use crate::fabriq::graph::{GraphCache, GraphCompiler, RunExecutor};
    use crate::fabriq::tools::ToolRegistry;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::error::Error;
    use tower::ServiceExt;

    const CONFIG: &str = r#"
endpoints:
  - slug: answer
    system_id: solo
    contract:
      - name: question
        type: string
    prompt: "Answer: {question}"
systems:
  - id: solo
    name: Solo
    topology: single
    agents:
      - type: coder
        prompt: "Be brief."
"#;

    struct FortyTwo;

    #[async_trait]
    impl Model for FortyTwo {
        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
            _tools: Option<&[Arc<dyn Tool>]>,
        ) -> Result<Content, Box<dyn Error + Send + Sync>> {
            Ok(Content::model("42"))
        }
    }

    struct FortyTwoProvider;

    impl ModelProvider for FortyTwoProvider {
        fn model(&self, _model_name: &str) -> Result<Arc<dyn Model>, FabriqError> {
            Ok(Arc::new(FortyTwo))
        }
    }

    fn app(api_key: Option<&str>) -> Router {
        let agent_types = Arc::new(AgentTypeRegistry::builtin());
        let mut config = EngineConfig::parse_yaml(CONFIG).unwrap();
        config.api_key = api_key.map(str::to_string);
        config.validate(&agent_types).unwrap();

        let compiler = GraphCompiler::new(ToolRegistry::new(), Arc::new(FortyTwoProvider));
        let engine = Engine::new(
            agent_types.clone(),
            Arc::new(GraphCache::new(compiler)),
            RunExecutor::new(),
        );
        let origins = config.allowed_origins.clone();
        let store = ConfigStore::with_config("does-not-exist.yaml", agent_types, config);
        let state = AppState::new(engine, store, Arc::new(Scheduler::new()));
        router(state, &origins)
    }

    fn run_request(slug: &str, body: Value, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/run/{}", slug))
            .header("content-type", "application/json");
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn bare_request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_counts() {
        let response = app(None)
            .oneshot(bare_request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!({"status": "healthy", "systems": 1, "endpoints": 1})
        );
    }

    #[tokio::test]
    async fn test_config_hides_api_key() {
        let response = app(Some("secret"))
            .oneshot(bare_request("GET", "/config", None))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["systems"][0]["id"], "solo");
        assert!(body.get("api_key").is_none());
    }

    #[tokio::test]
    async fn test_run_requires_key_when_configured() {
        let app = app(Some("secret"));
        let missing = app
            .clone()
            .oneshot(run_request("answer", json!({"data": {"question": "?"}}), None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = app
            .oneshot(run_request("answer", json!({"data": {"question": "?"}}), Some("nope")))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(wrong).await;
        assert_eq!(body["detail"], "Invalid or missing API key");
    }

    #[tokio::test]
    async fn test_unknown_endpoint_is_404() {
        let response = app(None)
            .oneshot(run_request("missing", json!({"data": {}}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_json(response).await;
        assert_eq!(body["detail"], "Endpoint 'missing' not found");
    }

    #[tokio::test]
    async fn test_contract_violation_is_422() {
        let response = app(None)
            .oneshot(run_request("answer", json!({"data": {"question": 7}}), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body_json(response).await["detail"],
            "Field 'question' must be of type string, got number"
        );
    }

    #[tokio::test]
    async fn test_run_streams_token_then_done() {
        let body = json!({"data": {"question": "life"}});
        let response = app(Some("secret"))
            .oneshot(run_request("answer", body, Some("secret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let events: Vec<Value> = String::from_utf8(bytes.to_vec())
            .unwrap()
            .lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["type"], "token");
        assert_eq!(events[0]["content"], "42");
        assert_eq!(events[1]["type"], "done");
    }

    #[tokio::test]
    async fn test_reload_failure_is_500_and_keeps_config() {
        let app = app(None);
        let response = app
            .clone()
            .oneshot(bare_request("POST", "/reload", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(response).await["detail"]
            .as_str()
            .unwrap()
            .starts_with("Reload failed:"));

        let health = app
            .oneshot(bare_request("GET", "/health", None))
            .await
            .unwrap();
        assert_eq!(body_json(health).await["systems"], 1);
    }

    #[tokio::test]
    async fn test_reload_requires_key_when_configured() {
        let app = app(Some("secret"));
        let missing = app
            .clone()
            .oneshot(bare_request("POST", "/reload", None))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(missing).await;
        assert_eq!(body["detail"], "Invalid or missing API key");

        // Authorised reload reaches the config file, which does not exist here
        let authorised = app
            .oneshot(bare_request("POST", "/reload", Some("secret")))
            .await
            .unwrap();
        assert_eq!(authorised.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
