use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use filing_flow::{
    AgentRegistry, ChatOutcome, ChatSession, FlowError, GeminiModel, LanguageModel, Pipeline,
    PipelineController, ReplayChatSession, RunOutcome, Workspace, WorkspaceView,
};

use crate::{
    config::ServiceConfig,
    models::{AgentListing, AnalyzeRequest, ChatRequest, ChatResponse, DocumentRequest},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn busy_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, index: usize) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "index": index
        })),
    )
}

fn upstream_error(message: &str, details: Option<&str>) -> ApiError {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub workspace: Arc<Workspace>,
    pub controller: Arc<PipelineController>,
    pub chat: Arc<dyn ChatSession>,
}

impl AppState {
    pub fn new(model: Arc<dyn LanguageModel>, agents: AgentRegistry) -> filing_flow::Result<Self> {
        let workspace = Arc::new(Workspace::new());
        let pipeline = Arc::new(Pipeline::standard(agents)?);
        let controller = Arc::new(PipelineController::new(
            pipeline,
            model.clone(),
            workspace.clone(),
        ));
        let chat = Arc::new(ReplayChatSession::new(model, workspace.clone()));

        Ok(Self {
            workspace,
            controller,
            chat,
        })
    }
}

pub fn create_app(config: &ServiceConfig) -> anyhow::Result<Router> {
    let mut model = GeminiModel::new(config.api_key.clone()).with_chat_model(&config.chat_model);
    if let Some(timeout) = config.model_timeout {
        model = model.with_timeout(timeout);
    }

    let agents = config.agent_registry()?;
    info!(agents = agents.len(), "agent registry loaded");

    let app_state = AppState::new(Arc::new(model), agents)?;
    Ok(build_router(app_state))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/agents", get(list_agents))
        .route("/state", get(get_state))
        .route("/document", put(set_document))
        .route("/analyze", post(analyze))
        .route("/chat", post(send_chat))
        .route("/snapshots", get(list_snapshots).post(save_snapshot))
        .route("/snapshots/{index}/load", post(load_snapshot))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "510(k) Filing Analyzer",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Structured extraction, executive summary and grounded chat for 510(k) filings",
        "endpoints": {
            "GET /agents": "Agent pipeline in stage order",
            "GET /state": "Working document, status flags and completeness checklist",
            "PUT /document": "Replace the working input text",
            "POST /analyze": "Run the analysis pipeline",
            "POST /chat": "Ask a question about the current document",
            "GET /snapshots": "List saved analyses",
            "POST /snapshots": "Save the current analysis",
            "POST /snapshots/{index}/load": "Restore a saved analysis",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentListing>> {
    let completed = state.workspace.view().await.working.status.dashboard;
    let listing = state
        .controller
        .pipeline()
        .stages()
        .enumerate()
        .map(|(index, (stage_id, agent))| AgentListing::new(index, stage_id, agent, completed))
        .collect();
    Json(listing)
}

async fn get_state(State(state): State<AppState>) -> Json<WorkspaceView> {
    Json(state.workspace.view().await)
}

async fn set_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> ApiResult<WorkspaceView> {
    match state.workspace.set_input(request.text).await {
        Ok(()) => Ok(Json(state.workspace.view().await)),
        Err(FlowError::Busy(reason)) => Err(busy_error(reason)),
        Err(e) => Err(internal_error("Failed to update document", &e.to_string())),
    }
}

async fn analyze(
    State(state): State<AppState>,
    request: Option<Json<AnalyzeRequest>>,
) -> ApiResult<Value> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let outcome = match request.text {
        Some(text) => state.controller.run(&text).await,
        None => state.controller.run_current().await,
    };

    match outcome {
        RunOutcome::Completed {
            snapshot_index,
            label,
            degraded,
        } => {
            info!(snapshot_index, label = %label, "analysis completed");
            Ok(Json(json!({
                "status": "completed",
                "snapshot_index": snapshot_index,
                "label": label,
                "degraded": degraded,
                "state": state.workspace.view().await
            })))
        }
        RunOutcome::Skipped => Err(bad_request_error("Document text is required")),
        RunOutcome::Busy => Err(busy_error("An analysis is already in progress")),
        RunOutcome::Superseded => Err(busy_error("A snapshot was loaded while the analysis ran")),
        RunOutcome::Failed(notice) => {
            error!("analysis failed: {:?}", notice.detail);
            Err(upstream_error(&notice.message, notice.detail.as_deref()))
        }
    }
}

async fn send_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let outcome = state.chat.send(&request.message).await;

    let (status, reply) = match outcome {
        ChatOutcome::Replied(reply) => ("replied", reply),
        ChatOutcome::Failed(reply) => {
            warn!("chat turn answered with an error message");
            ("failed", reply)
        }
        ChatOutcome::NoDocument(notice) => return Err(bad_request_error(notice)),
        ChatOutcome::Busy => return Err(busy_error("A chat reply is still pending")),
        ChatOutcome::EmptyMessage => return Err(bad_request_error("Message cannot be empty")),
        ChatOutcome::Superseded => {
            return Err(busy_error("A snapshot was loaded before the reply arrived"));
        }
    };

    Ok(Json(ChatResponse {
        status,
        reply,
        history: state.workspace.chat_history().await,
    }))
}

async fn list_snapshots(State(state): State<AppState>) -> Json<Value> {
    let view = state.workspace.view().await;
    Json(json!({
        "current_index": view.current_snapshot,
        "snapshots": state.workspace.snapshots().await
    }))
}

async fn save_snapshot(State(state): State<AppState>) -> Result<(StatusCode, Json<Value>), ApiError> {
    let index = state
        .workspace
        .save_current()
        .await
        .map_err(|e| internal_error("Failed to save snapshot", &e.to_string()))?;

    let label = state
        .workspace
        .snapshot(index)
        .await
        .map(|s| s.label)
        .unwrap_or_default();

    Ok((
        StatusCode::CREATED,
        Json(json!({ "index": index, "label": label })),
    ))
}

async fn load_snapshot(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> ApiResult<WorkspaceView> {
    match state.workspace.load(index).await {
        Ok(()) => Ok(Json(state.workspace.view().await)),
        Err(FlowError::SnapshotNotFound(index)) => Err(not_found_error("Snapshot not found", index)),
        Err(e) => Err(internal_error("Failed to load snapshot", &e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use filing_flow::{AgentConfig, ChatMessage};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Hands out canned replies; `None` simulates a service failure.
    struct StubModel {
        replies: Mutex<VecDeque<Option<String>>>,
    }

    impl StubModel {
        fn new(replies: &[Option<&str>]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| r.map(str::to_string)).collect()),
            }
        }

        fn next(&self) -> filing_flow::Result<String> {
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or_else(|| FlowError::ModelService("stubbed failure".to_string()))
        }
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn run_agent(&self, _: &AgentConfig, _: &str, _: bool) -> filing_flow::Result<String> {
            self.next()
        }

        async fn run_chat(&self, _: &[ChatMessage], _: &str, _: &str) -> filing_flow::Result<String> {
            self.next()
        }
    }

    fn router(replies: &[Option<&str>]) -> Router {
        let state = AppState::new(
            Arc::new(StubModel::new(replies)),
            AgentRegistry::default_510k(),
        )
        .unwrap();
        build_router(state)
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_analyze_then_chat() {
        let router = router(&[
            Some(r#"{"device_name":"AcmeScan 3000","product_code":"ABC"}"#),
            Some("## Summary\nCleared."),
            Some("It is a scanner."),
        ]);

        let (status, body) = call(
            &router,
            "POST",
            "/analyze",
            Some(json!({ "text": "Device: AcmeScan 3000..." })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "AcmeScan 3000");
        assert_eq!(body["state"]["working"]["status"]["dashboard"], true);

        let (status, body) = call(&router, "POST", "/chat", Some(json!({ "message": "What is it?" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "replied");
        assert_eq!(body["history"].as_array().unwrap().len(), 2);

        let (status, body) = call(&router, "GET", "/snapshots", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_index"], 0);
        assert_eq!(body["snapshots"][0]["label"], "AcmeScan 3000");

        let (_, body) = call(&router, "GET", "/agents", None).await;
        assert_eq!(body[0]["status"], "completed");
        assert_eq!(body[1]["id"], "generate_dashboard_summary");
    }

    #[tokio::test]
    async fn test_failed_analysis_maps_to_bad_gateway() {
        let router = router(&[None]);
        let (status, body) = call(&router, "POST", "/analyze", Some(json!({ "text": "filing" }))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], filing_flow::state::PIPELINE_FAILED_NOTICE);

        let (_, body) = call(&router, "GET", "/state", None).await;
        assert_eq!(body["working"]["status"]["parsing"], false);
        assert_eq!(body["snapshot_count"], 0);
    }

    #[tokio::test]
    async fn test_blank_analysis_and_chat_without_document() {
        let router = router(&[]);
        let (status, _) = call(&router, "POST", "/analyze", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&router, "POST", "/chat", Some(json!({ "message": "Hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], filing_flow::state::NO_DOCUMENT_NOTICE);
    }

    #[tokio::test]
    async fn test_analyze_without_body_runs_working_input() {
        let router = router(&[Some(r#"{"device_name":"Pasted Device"}"#), Some("summary")]);
        call(&router, "PUT", "/document", Some(json!({ "text": "pasted filing" }))).await;

        let (status, body) = call(&router, "POST", "/analyze", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["label"], "Pasted Device");
        assert_eq!(body["state"]["working"]["raw_text"], "pasted filing");
    }

    #[tokio::test]
    async fn test_document_save_and_load() {
        let router = router(&[]);
        let (status, body) = call(&router, "PUT", "/document", Some(json!({ "text": "pasted" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["working"]["status"]["input_ready"], true);

        let (status, body) = call(&router, "POST", "/snapshots", None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["index"], 0);
        assert_eq!(body["label"], "Untitled 510(k)");

        let (status, body) = call(&router, "POST", "/snapshots/0/load", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["working"]["raw_text"], "pasted");
        assert_eq!(body["working"]["status"]["chat"], true);

        let (status, _) = call(&router, "POST", "/snapshots/3/load", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
