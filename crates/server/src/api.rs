//! Reconciliation API polled by the presentation layer.
//!
//! - `GET  /threads`                 — list snapshots
//! - `POST /threads`                 — create a negotiation thread
//! - `GET  /threads/{id}`            — single snapshot
//! - `POST /threads/{id}/negotiate`  — submit one turn (buyer by default)
//! - `POST /threads/{id}/resume`     — apply a human approval decision
//! - `POST /threads/{id}/close`      — explicit close
//! - `POST /simulate`                — synthesize a counterparty reply
//!
//! Conflicts (paused / not-paused / completed) map to 409 so clients can
//! refetch; executor unavailability maps to 503 so clients can retry.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use parley_agent::{
    CreateThreadParams, HistoryEntry, NegotiationRuntime, PersonaLibrary, SimulationError,
    SupplierSimulator,
};
use parley_core::{
    ContractId, DecisionContext, Message, MessageRole, OrchestrationError, ResumeAction,
    StoreError, SupplierId, ThreadId, ThreadSnapshot, ThreadStatus,
};

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<NegotiationRuntime>,
    personas: Arc<PersonaLibrary>,
    simulator: SupplierSimulator,
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateThreadRequest {
    pub contract_id: String,
    pub supplier_id: String,
    pub contract_title: Option<String>,
    pub risk_score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest {
    pub text: String,
    #[serde(default)]
    pub actor_role: Option<MessageRole>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeRequest {
    pub action: ResumeAction,
    pub feedback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub persona_id: String,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    pub latest_proposal: String,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DecisionContextBody {
    pub strategy: String,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redline: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSnapshotBody {
    pub id: String,
    pub status: ThreadStatus,
    pub contract_title: String,
    pub risk_score: f64,
    pub messages: Vec<MessageBody>,
    pub current_context: Option<DecisionContextBody>,
    pub last_update: DateTime<Utc>,
}

impl From<Message> for MessageBody {
    fn from(message: Message) -> Self {
        Self { role: message.role, content: message.content, created_at: message.created_at }
    }
}

impl From<DecisionContext> for DecisionContextBody {
    fn from(context: DecisionContext) -> Self {
        Self { strategy: context.strategy, reasoning: context.reasoning, redline: context.redline }
    }
}

impl From<ThreadSnapshot> for ThreadSnapshotBody {
    fn from(snapshot: ThreadSnapshot) -> Self {
        Self {
            id: snapshot.id.0,
            status: snapshot.status,
            contract_title: snapshot.contract_title,
            risk_score: snapshot.risk_score,
            messages: snapshot.messages.into_iter().map(MessageBody::from).collect(),
            current_context: snapshot.current_context.map(DecisionContextBody::from),
            last_update: snapshot.last_update,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

fn error_response(error: OrchestrationError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        OrchestrationError::ThreadNotFound(_) => StatusCode::NOT_FOUND,
        OrchestrationError::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
        error if error.is_conflict() => StatusCode::CONFLICT,
        error if error.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiError { error: error.to_string() }))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(
    runtime: Arc<NegotiationRuntime>,
    personas: Arc<PersonaLibrary>,
    simulator: SupplierSimulator,
) -> Router {
    Router::new()
        .route("/threads", get(list_threads).post(create_thread))
        .route("/threads/{id}", get(get_thread))
        .route("/threads/{id}/negotiate", post(negotiate))
        .route("/threads/{id}/resume", post(resume))
        .route("/threads/{id}/close", post(close_thread))
        .route("/simulate", post(simulate))
        .with_state(ApiState { runtime, personas, simulator })
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn list_threads(State(state): State<ApiState>) -> ApiResult<Json<Vec<ThreadSnapshotBody>>> {
    let snapshots = state.runtime.list().await.map_err(error_response)?;
    Ok(Json(snapshots.into_iter().map(ThreadSnapshotBody::from).collect()))
}

async fn get_thread(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ThreadSnapshotBody>> {
    let snapshot =
        state.runtime.snapshot(&ThreadId(id)).await.map_err(error_response)?;
    Ok(Json(snapshot.into()))
}

async fn create_thread(
    State(state): State<ApiState>,
    Json(request): Json<CreateThreadRequest>,
) -> ApiResult<(StatusCode, Json<ThreadSnapshotBody>)> {
    let snapshot = state
        .runtime
        .create(CreateThreadParams {
            thread_id: None,
            contract_id: ContractId(request.contract_id),
            supplier_id: SupplierId(request.supplier_id),
            contract_title: request.contract_title,
            risk_score: request.risk_score,
        })
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(snapshot.into())))
}

async fn negotiate(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<NegotiateRequest>,
) -> ApiResult<Json<ThreadSnapshotBody>> {
    let actor = request.actor_role.unwrap_or(MessageRole::Buyer);
    let snapshot = state
        .runtime
        .negotiate(&ThreadId(id), actor, &request.text)
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot.into()))
}

async fn resume(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> ApiResult<Json<ThreadSnapshotBody>> {
    let snapshot = state
        .runtime
        .resume(&ThreadId(id), request.action, request.feedback)
        .await
        .map_err(error_response)?;
    Ok(Json(snapshot.into()))
}

async fn close_thread(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ThreadSnapshotBody>> {
    let snapshot = state.runtime.close(&ThreadId(id)).await.map_err(error_response)?;
    Ok(Json(snapshot.into()))
}

/// Pure simulation: synthesizes the counterparty's reply and returns it.
/// Feeding the reply back through `negotiate` (as a supplier turn) is the
/// caller's move; the simulator never writes thread state.
async fn simulate(
    State(state): State<ApiState>,
    Json(request): Json<SimulateRequest>,
) -> ApiResult<Json<SimulateResponse>> {
    let persona = state.personas.get(&request.persona_id).map_err(|error| match error {
        SimulationError::PersonaNotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(ApiError { error: format!("persona `{id}` was not found") }),
        ),
        other => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ApiError { error: other.to_string() }))
        }
    })?;

    let response = state.simulator.reply(persona, &request.history, &request.latest_proposal);
    info!(
        event_name = "simulation.turn_generated",
        persona_id = %request.persona_id,
        history_len = request.history.len(),
        "counterparty reply synthesized"
    );
    Ok(Json(SimulateResponse { response }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use parley_agent::{
        HeuristicProposer, NegotiationRuntime, PersonaLibrary, SupplierSimulator, TurnExecutor,
    };
    use parley_core::ApprovalGate;
    use parley_db::{connect_with_settings, migrations, SqlThreadStore};

    use super::router;

    async fn test_router() -> axum::Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let runtime = Arc::new(NegotiationRuntime::new(
            Arc::new(SqlThreadStore::new(pool)),
            TurnExecutor::new(Arc::new(HeuristicProposer::new()), Duration::from_secs(5)),
            ApprovalGate::default(),
            Duration::from_millis(50),
        ));
        router(runtime, Arc::new(PersonaLibrary::builtin()), SupplierSimulator::new())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    async fn create_thread(app: &axum::Router) -> String {
        let response = app
            .clone()
            .oneshot(post_json(
                "/threads",
                json!({
                    "contractId": "C-100",
                    "supplierId": "S-100",
                    "contractTitle": "Cloud Services Agreement",
                    "riskScore": 0.85
                }),
            ))
            .await
            .expect("create response");
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        body["id"].as_str().expect("thread id").to_string()
    }

    #[tokio::test]
    async fn create_returns_wire_shape_snapshot() {
        let app = test_router().await;
        let response = app
            .oneshot(post_json(
                "/threads",
                json!({ "contractId": "C-1", "supplierId": "S-1" }),
            ))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["status"], "active");
        assert!(body["contractTitle"].is_string());
        assert!(body["riskScore"].is_number());
        assert!(body["messages"].as_array().expect("messages").is_empty());
        assert!(body["currentContext"].is_null());
        assert!(body["lastUpdate"].is_string());
    }

    #[tokio::test]
    async fn low_risk_negotiate_commits_and_stays_active() {
        let app = test_router().await;
        let id = create_thread(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/threads/{id}/negotiate"),
                json!({ "text": "Offer $100k" }),
            ))
            .await
            .expect("negotiate response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "active");
        assert!(body["currentContext"].is_null());
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "buyer");
        assert_eq!(messages[0]["content"], "Offer $100k");
        assert!(messages[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn document_impact_pauses_and_conflicts_until_resumed() {
        let app = test_router().await;
        let id = create_thread(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                &format!("/threads/{id}/negotiate"),
                json!({ "text": "Accept a 40% discount" }),
            ))
            .await
            .expect("negotiate response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "paused");
        let context = &body["currentContext"];
        assert!(context["redline"].as_str().map(|s| !s.is_empty()).unwrap_or(false));
        assert!(context["strategy"].is_string());
        assert!(context["reasoning"].is_string());

        let conflict = app
            .clone()
            .oneshot(post_json(
                &format!("/threads/{id}/negotiate"),
                json!({ "text": "And free onboarding" }),
            ))
            .await
            .expect("conflict response");
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let resumed = app
            .clone()
            .oneshot(post_json(
                &format!("/threads/{id}/resume"),
                json!({ "action": "REJECTED", "feedback": "too aggressive" }),
            ))
            .await
            .expect("resume response");
        assert_eq!(resumed.status(), StatusCode::OK);
        let body = body_json(resumed).await;
        assert_eq!(body["status"], "active");
        assert!(body["currentContext"].is_null());
        assert_eq!(body["messages"].as_array().expect("messages").len(), 1);
    }

    #[tokio::test]
    async fn resume_on_active_thread_is_a_conflict() {
        let app = test_router().await;
        let id = create_thread(&app).await;

        let response = app
            .oneshot(post_json(&format!("/threads/{id}/resume"), json!({ "action": "APPROVED" })))
            .await
            .expect("resume response");
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let app = test_router().await;
        let response = app
            .clone()
            .oneshot(get_req("/threads/does-not-exist"))
            .await
            .expect("get response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json("/threads/does-not-exist/negotiate", json!({ "text": "hi" })))
            .await
            .expect("negotiate response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_includes_created_threads() {
        let app = test_router().await;
        create_thread(&app).await;
        create_thread(&app).await;

        let response = app.oneshot(get_req("/threads")).await.expect("list response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body.as_array().expect("list").len(), 2);
    }

    #[tokio::test]
    async fn simulate_replies_without_touching_threads() {
        let app = test_router().await;
        let id = create_thread(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(
                "/simulate",
                json!({
                    "personaId": "default",
                    "history": [{ "sender": "buyer", "content": "Offer $100k" }],
                    "latestProposal": "Offer $100k"
                }),
            ))
            .await
            .expect("simulate response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(!body["response"].as_str().expect("reply").is_empty());

        // The simulator is read-only: the thread history is unchanged.
        let snapshot = app
            .oneshot(get_req(&format!("/threads/{id}")))
            .await
            .expect("snapshot response");
        let body = body_json(snapshot).await;
        assert!(body["messages"].as_array().expect("messages").is_empty());
    }

    #[tokio::test]
    async fn simulate_with_unknown_persona_is_not_found() {
        let app = test_router().await;
        let response = app
            .oneshot(post_json(
                "/simulate",
                json!({ "personaId": "ghost-corp", "latestProposal": "hello" }),
            ))
            .await
            .expect("simulate response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn close_completes_and_repeat_close_conflicts() {
        let app = test_router().await;
        let id = create_thread(&app).await;

        let response = app
            .clone()
            .oneshot(post_json(&format!("/threads/{id}/close"), json!({})))
            .await
            .expect("close response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");

        let again = app
            .oneshot(post_json(&format!("/threads/{id}/close"), json!({})))
            .await
            .expect("second close");
        assert_eq!(again.status(), StatusCode::CONFLICT);
    }
}
