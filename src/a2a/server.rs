//! A2A JSON-RPC server: maps protocol tasks onto engine decisions

use crate::error::{AgentError, Result};
use crate::negotiation::{Action, DecisionEngine, NegotiationSession, NegotiationState};
use crate::types::{ContextId, TaskId};
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use super::card::AgentCard;
use super::message::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message, MessageSendParams, Task, TaskIdParams,
    TaskQueryParams, TaskState, JSONRPC_VERSION,
};
use super::payload::{encode_decision, parse_request};

/// Longest message prefix written to the log
const LOG_PREVIEW_CHARS: usize = 500;

type RpcResult = std::result::Result<JsonValue, JsonRpcError>;

/// Finished tasks kept for `tasks/get` before the oldest are dropped
pub const DEFAULT_TASK_CAPACITY: usize = 1024;

/// Ended sessions kept for inspection before the oldest are dropped
pub const DEFAULT_FINISHED_SESSION_CAPACITY: usize = 256;

#[derive(Default)]
struct TaskEntries {
    tasks: HashMap<TaskId, Task>,
    order: VecDeque<TaskId>,
}

/// Bounded in-memory store of finished tasks; the oldest task is evicted
/// once `capacity` is exceeded
pub struct TaskStore {
    entries: Mutex<TaskEntries>,
    capacity: usize,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TASK_CAPACITY)
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(TaskEntries::default()),
            capacity: capacity.max(1),
        }
    }

    pub async fn insert(&self, task: Task) {
        let mut entries = self.entries.lock().await;

        let id = task.id.clone();
        if entries.tasks.insert(id.clone(), task).is_none() {
            entries.order.push_back(id);
        }

        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.tasks.remove(&oldest);
                tracing::debug!(task = %oldest, "Evicted task from store");
            }
        }
    }

    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.entries.lock().await.tasks.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.tasks.len()
    }
}

#[derive(Default)]
struct SessionEntries {
    sessions: HashMap<ContextId, NegotiationSession>,
    /// Contexts whose session ended, oldest first
    finished: VecDeque<ContextId>,
}

impl SessionEntries {
    fn mark_finished(&mut self, context_id: &ContextId, capacity: usize) {
        self.finished.retain(|id| id != context_id);
        self.finished.push_back(context_id.clone());

        while self.finished.len() > capacity {
            if let Some(oldest) = self.finished.pop_front() {
                self.sessions.remove(&oldest);
                tracing::debug!(context = %oldest, "Dropped ended session");
            }
        }
    }
}

/// Negotiation sessions keyed by A2A context. The lock is only held for
/// bookkeeping, never across an oracle call. Ended sessions are kept up to
/// a capacity so late `tasks/get` and inspection still find them.
pub struct SessionRegistry {
    entries: Mutex<SessionEntries>,
    finished_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_FINISHED_SESSION_CAPACITY)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(finished_capacity: usize) -> Self {
        Self {
            entries: Mutex::new(SessionEntries::default()),
            finished_capacity,
        }
    }

    /// Open or continue the session for a context, record the counterpart's
    /// offer and hand its history to the state
    pub async fn begin_turn(&self, context_id: &ContextId, state: &mut NegotiationState) -> Result<()> {
        let mut entries = self.entries.lock().await;

        let restarted = match entries.sessions.get(context_id) {
            Some(session) if !session.is_active() => {
                tracing::info!(
                    context = %context_id,
                    status = ?session.status(),
                    "Previous session ended, starting a new one"
                );
                true
            }
            _ => false,
        };
        if restarted {
            entries.finished.retain(|id| id != context_id);
            entries.sessions.remove(context_id);
        }

        let session = entries
            .sessions
            .entry(context_id.clone())
            .or_insert_with(|| NegotiationSession::new(context_id.clone()));

        if let Some(offer) = &state.current_offer {
            session.record_offer(offer)?;
        }
        session.hydrate(state);
        Ok(())
    }

    /// Record this agent's action for a context
    pub async fn finish_turn(
        &self,
        context_id: &ContextId,
        action: &Action,
        turns_remaining: Option<u32>,
    ) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let session = entries
            .sessions
            .get_mut(context_id)
            .ok_or_else(|| AgentError::SessionClosed(format!("{} has no session", context_id)))?;

        session.record_action(action, turns_remaining)?;
        if !session.is_active() {
            tracing::info!(context = %context_id, status = ?session.status(), "Negotiation session ended");
            entries.mark_finished(context_id, self.finished_capacity);
        }
        Ok(())
    }

    /// Close a session; returns false when there is none
    pub async fn close(&self, context_id: &ContextId, reason: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let found = match entries.sessions.get_mut(context_id) {
            Some(session) => {
                session.close(reason);
                true
            }
            None => false,
        };
        if found {
            entries.mark_finished(context_id, self.finished_capacity);
        }
        found
    }

    /// Snapshot of a session
    pub async fn get(&self, context_id: &ContextId) -> Option<NegotiationSession> {
        self.entries.lock().await.sessions.get(context_id).cloned()
    }

    pub async fn active_count(&self) -> usize {
        self.entries
            .lock()
            .await
            .sessions
            .values()
            .filter(|s| s.is_active())
            .count()
    }

    /// Number of sessions held, active or ended
    pub async fn len(&self) -> usize {
        self.entries.lock().await.sessions.len()
    }
}

/// Shared server state
pub struct AppState {
    engine: Arc<DecisionEngine>,
    sessions: SessionRegistry,
    tasks: TaskStore,
    card: AgentCard,
}

impl AppState {
    pub fn new(engine: Arc<DecisionEngine>, card: AgentCard) -> Self {
        Self {
            engine,
            sessions: SessionRegistry::new(),
            tasks: TaskStore::new(),
            card,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.tasks
    }

    /// Run one negotiation turn for an incoming message and store the task
    pub async fn process_message(&self, mut message: Message) -> Task {
        let context_id = message
            .context_id
            .clone()
            .unwrap_or_else(ContextId::generate);
        let task_id = TaskId::generate();
        message.context_id = Some(context_id.clone());
        message.task_id = Some(task_id.clone());

        let text = message.text_content();
        let data = message.data_content().cloned();
        tracing::info!(
            context = %context_id,
            task = %task_id,
            "Received message: {}",
            preview(&text)
        );

        let (task_state, reply_text) = match self.decide_turn(&context_id, &text, data.as_ref()).await {
            Ok(reply) => (TaskState::Completed, reply.to_string()),
            Err(err) => {
                tracing::error!(
                    context = %context_id,
                    kind = err.kind(),
                    error = %err,
                    "Decision request failed"
                );
                (TaskState::Failed, json!({ "error": err.to_string() }).to_string())
            }
        };

        let reply = Message::agent_text(reply_text, &context_id, &task_id);
        let task = Task::finished(task_id, context_id, task_state, message, reply);
        self.tasks.insert(task.clone()).await;
        task
    }

    async fn decide_turn(
        &self,
        context_id: &ContextId,
        text: &str,
        data: Option<&JsonValue>,
    ) -> Result<JsonValue> {
        let mut request = parse_request(text, data)?;
        request.state.validate()?;

        self.sessions.begin_turn(context_id, &mut request.state).await?;

        let decision = self.engine.deliberate(&request.state).await?;

        self.sessions
            .finish_turn(context_id, &decision.action, request.state.turns_remaining)
            .await?;

        let reply = encode_decision(&request, &decision);
        tracing::info!(
            context = %context_id,
            digest = %decision.digest,
            action = %decision.action.kind(),
            source = %decision.source,
            role = request.role.as_deref().unwrap_or("unknown"),
            "Sending response: {}",
            reply
        );
        Ok(reply)
    }

    async fn message_send(&self, params: JsonValue) -> RpcResult {
        let params: MessageSendParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

        let task = self.process_message(params.message).await;
        serde_json::to_value(&task).map_err(|e| JsonRpcError::from(&AgentError::from(e)))
    }

    async fn tasks_get(&self, params: JsonValue) -> RpcResult {
        let params: TaskQueryParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

        let mut task = self
            .tasks
            .get(&params.id)
            .await
            .ok_or_else(|| JsonRpcError::from(&AgentError::TaskNotFound(params.id.0.clone())))?;

        if let Some(limit) = params.history_length {
            let skip = task.history.len().saturating_sub(limit);
            task.history.drain(..skip);
        }

        serde_json::to_value(&task).map_err(|e| JsonRpcError::from(&AgentError::from(e)))
    }

    async fn tasks_cancel(&self, params: JsonValue) -> RpcResult {
        let params: TaskIdParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(e.to_string()))?;

        let task = self
            .tasks
            .get(&params.id)
            .await
            .ok_or_else(|| JsonRpcError::from(&AgentError::TaskNotFound(params.id.0.clone())))?;

        // the counterpart is disengaging; end the negotiation
        self.sessions
            .close(&task.context_id, "cancelled by client")
            .await;

        Err(JsonRpcError::from(&AgentError::UnsupportedOperation(
            "tasks complete synchronously and cannot be cancelled".to_string(),
        )))
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > LOG_PREVIEW_CHARS {
        format!("{}...", text.chars().take(LOG_PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}

/// Create the A2A router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/.well-known/agent-card.json", get(agent_card))
        .route("/.well-known/agent.json", get(agent_card))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn agent_card(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "model": state.engine.model(),
        "activeSessions": state.sessions.active_count().await,
    }))
}

async fn handle_rpc(State(state): State<Arc<AppState>>, body: Bytes) -> Json<JsonRpcResponse> {
    let raw: JsonValue = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                JsonValue::Null,
                JsonRpcError::parse_error(e.to_string()),
            ))
        }
    };

    let id = raw.get("id").cloned().unwrap_or(JsonValue::Null);
    let request: JsonRpcRequest = match serde_json::from_value(raw) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                id,
                JsonRpcError::invalid_request(e.to_string()),
            ))
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return Json(JsonRpcResponse::failure(
            id,
            JsonRpcError::invalid_request(format!("unsupported jsonrpc version '{}'", request.jsonrpc)),
        ));
    }

    tracing::debug!(method = %request.method, "JSON-RPC request");

    let outcome = match request.method.as_str() {
        "message/send" => state.message_send(request.params).await,
        "tasks/get" => state.tasks_get(request.params).await,
        "tasks/cancel" => state.tasks_cancel(request.params).await,
        other => Err(JsonRpcError::method_not_found(other)),
    };

    Json(match outcome {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    })
}

/// A2A server wrapping the decision engine
#[derive(Clone)]
pub struct A2aServer {
    state: Arc<AppState>,
}

impl A2aServer {
    pub fn new(engine: Arc<DecisionEngine>, card: AgentCard) -> Self {
        Self {
            state: Arc::new(AppState::new(engine, card)),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Create the router without starting the server
    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Listen on `addr` until the process stops
    pub async fn serve(&self, addr: &str) -> Result<()> {
        self.serve_with_shutdown(addr, std::future::pending()).await
    }

    /// Listen on `addr` until `shutdown` completes
    pub async fn serve_with_shutdown<F>(&self, addr: &str, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await.map_err(|e| AgentError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;

        tracing::info!("Listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("A2A server shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::card::build_agent_card;
    use crate::a2a::message::{METHOD_NOT_FOUND, PARSE_ERROR, TASK_NOT_FOUND, UNSUPPORTED_OPERATION};
    use crate::negotiation::{EngineConfig, SessionStatus};
    use crate::oracle::{OfflineOracle, ReasoningOracle};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Always unavailable, but remembers the prompts it saw
    #[derive(Default)]
    struct RecordingOracle {
        prompts: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ReasoningOracle for RecordingOracle {
        async fn invoke(&self, prompt: &str, _system_instruction: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Err(AgentError::OracleUnavailable("recording only".to_string()))
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    fn server_with(oracle: Arc<dyn ReasoningOracle>) -> A2aServer {
        let engine = Arc::new(DecisionEngine::new(
            oracle,
            EngineConfig {
                max_attempts: 1,
                ..EngineConfig::default()
            },
        ));
        A2aServer::new(engine, build_agent_card("http://localhost:8080/", "offline"))
    }

    fn server() -> A2aServer {
        server_with(Arc::new(OfflineOracle))
    }

    async fn call(app: &Router, body: String) -> JsonValue {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn send(text: &str, context: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": {
                "message": {
                    "role": "user",
                    "parts": [{"kind": "text", "text": text}],
                    "messageId": "m-1",
                    "contextId": context
                }
            }
        })
        .to_string()
    }

    fn reply_of(response: &JsonValue) -> JsonValue {
        let text = response["result"]["status"]["message"]["parts"][0]["text"]
            .as_str()
            .unwrap();
        serde_json::from_str(text).unwrap()
    }

    const PROPOSE: &str = r#"Action: PROPOSE
{"valuations_self": [10, 4], "batna_self": 3, "quantities": [1, 1], "round": 1, "max_rounds": 3}"#;

    const GOOD_OFFER: &str = r#"Action: ACCEPT_OR_REJECT
{"valuations_self": [10, 4], "batna_self": 3, "quantities": [1, 1],
 "current_offer": {"allocation_self": [1, 0], "allocation_other": [0, 1]}}"#;

    #[tokio::test]
    async fn test_agent_card_and_health() {
        let app = server().router();

        for path in ["/.well-known/agent-card.json", "/.well-known/agent.json"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let card: JsonValue = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(card["preferredTransport"], "JSONRPC");
        }

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let health: JsonValue = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["model"], "offline");
    }

    #[tokio::test]
    async fn test_propose_turn_returns_complete_allocation() {
        let app = server().router();
        let response = call(&app, send(PROPOSE, "ctx-a")).await;

        assert_eq!(response["result"]["status"]["state"], "completed");
        assert_eq!(response["result"]["contextId"], "ctx-a");

        let reply = reply_of(&response);
        assert_eq!(reply["allocation_self"], json!([1, 0]));
        assert_eq!(reply["allocation_other"], json!([0, 1]));
        assert!(reply["reason"].as_str().unwrap().contains("safe default"));
    }

    #[tokio::test]
    async fn test_accepting_ends_session() {
        let server = server();
        let app = server.router();

        let response = call(&app, send(GOOD_OFFER, "ctx-b")).await;
        assert_eq!(reply_of(&response)["accept"], true);

        let session = server
            .state()
            .sessions()
            .get(&ContextId("ctx-b".to_string()))
            .await
            .unwrap();
        assert_eq!(session.status(), &SessionStatus::Agreed);
        assert_eq!(session.history().len(), 2);
    }

    #[tokio::test]
    async fn test_history_accumulates_within_context() {
        let oracle = Arc::new(RecordingOracle::default());
        let app = server_with(oracle.clone()).router();

        call(&app, send(PROPOSE, "ctx-c")).await;
        let low_offer = r#"Action: ACCEPT_OR_REJECT
{"valuations_self": [10, 4], "batna_self": 3, "quantities": [1, 1],
 "current_offer": {"allocation_self": [0, 0]}}"#;
        let response = call(&app, send(low_offer, "ctx-c")).await;
        assert_eq!(reply_of(&response)["accept"], false);

        let prompts = oracle.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("History:"));
        assert!(prompts[1].contains("1. You proposed"));
        assert!(prompts[1].contains("2. Counterpart proposed"));
    }

    #[tokio::test]
    async fn test_invalid_state_fails_task() {
        let app = server().router();
        let respond_without_offer = r#"Action: ACCEPT_OR_REJECT
{"valuations_self": [10, 4], "batna_self": 3, "quantities": [1, 1]}"#;

        let response = call(&app, send(respond_without_offer, "ctx-d")).await;
        assert_eq!(response["result"]["status"]["state"], "failed");
        assert!(reply_of(&response)["error"]
            .as_str()
            .unwrap()
            .contains("Invalid negotiation state"));

        let response = call(&app, send("hello, no game state here", "ctx-d")).await;
        assert_eq!(response["result"]["status"]["state"], "failed");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let app = server().router();

        let response = call(&app, "{not json".to_string()).await;
        assert_eq!(response["error"]["code"], PARSE_ERROR);

        let response = call(
            &app,
            json!({"jsonrpc": "2.0", "id": 7, "method": "message/stream", "params": {}}).to_string(),
        )
        .await;
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert_eq!(response["id"], 7);

        let response = call(
            &app,
            json!({"jsonrpc": "2.0", "id": 8, "method": "tasks/get", "params": {"id": "missing"}})
                .to_string(),
        )
        .await;
        assert_eq!(response["error"]["code"], TASK_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_and_cancel_task() {
        let server = server();
        let app = server.router();

        let sent = call(&app, send(PROPOSE, "ctx-e")).await;
        let task_id = sent["result"]["id"].as_str().unwrap().to_string();

        let fetched = call(
            &app,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tasks/get", "params": {"id": task_id, "historyLength": 1}})
                .to_string(),
        )
        .await;
        assert_eq!(fetched["result"]["id"], task_id.as_str());
        assert_eq!(fetched["result"]["history"].as_array().unwrap().len(), 1);

        let cancelled = call(
            &app,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tasks/cancel", "params": {"id": task_id}})
                .to_string(),
        )
        .await;
        assert_eq!(cancelled["error"]["code"], UNSUPPORTED_OPERATION);

        let session = server
            .state()
            .sessions()
            .get(&ContextId("ctx-e".to_string()))
            .await
            .unwrap();
        assert!(matches!(session.status(), SessionStatus::Closed { .. }));
    }

    #[tokio::test]
    async fn test_contexts_are_served_concurrently() {
        let server = server();
        let app = server.router();

        let calls = (0..6).map(|i| {
            let app = app.clone();
            async move { call(&app, send(PROPOSE, &format!("ctx-par-{}", i))).await }
        });
        let responses = futures::future::join_all(calls).await;

        for response in responses {
            assert_eq!(response["result"]["status"]["state"], "completed");
        }
        assert_eq!(server.state().sessions().active_count().await, 6);
        assert_eq!(server.state().tasks().len().await, 6);
    }

    fn stored_task(n: u32) -> Task {
        let context_id = ContextId(format!("ctx-store-{}", n));
        let task_id = TaskId(format!("task-{}", n));
        let request = Message::agent_text("request", &context_id, &task_id);
        let reply = Message::agent_text("reply", &context_id, &task_id);
        Task::finished(task_id, context_id, TaskState::Completed, request, reply)
    }

    #[tokio::test]
    async fn test_task_store_evicts_oldest() {
        let store = TaskStore::with_capacity(2);
        for n in 1..=3 {
            store.insert(stored_task(n)).await;
        }

        assert_eq!(store.len().await, 2);
        assert!(store.get(&TaskId("task-1".to_string())).await.is_none());
        assert!(store.get(&TaskId("task-2".to_string())).await.is_some());
        assert!(store.get(&TaskId("task-3".to_string())).await.is_some());

        // re-inserting a stored task does not count twice
        store.insert(stored_task(3)).await;
        assert_eq!(store.len().await, 2);
        assert!(store.get(&TaskId("task-2".to_string())).await.is_some());
    }

    #[tokio::test]
    async fn test_ended_sessions_are_bounded() {
        let registry = SessionRegistry::with_capacity(1);
        let first = ContextId("ctx-first".to_string());
        let second = ContextId("ctx-second".to_string());
        let ongoing = ContextId("ctx-ongoing".to_string());

        for context in [&first, &second, &ongoing] {
            let mut state = NegotiationState::new(
                vec![crate::negotiation::Item::new("A")],
                std::collections::BTreeMap::from([("A".to_string(), 1.0)]),
                0.0,
            );
            registry.begin_turn(context, &mut state).await.unwrap();
        }

        registry.finish_turn(&first, &Action::Reject, Some(0)).await.unwrap();
        assert!(registry.get(&first).await.is_some());

        assert!(registry.close(&second, "counterpart left").await);
        assert!(registry.get(&first).await.is_none());
        assert!(registry.get(&second).await.is_some());
        assert!(registry.get(&ongoing).await.unwrap().is_active());
        assert_eq!(registry.len().await, 2);
        assert_eq!(registry.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_restarted_context_replaces_ended_session() {
        let server = server();
        let app = server.router();

        call(&app, send(GOOD_OFFER, "ctx-again")).await;
        call(&app, send(PROPOSE, "ctx-again")).await;

        let state = server.state();
        let sessions = state.sessions();
        let session = sessions
            .get(&ContextId("ctx-again".to_string()))
            .await
            .unwrap();
        assert!(session.is_active());
        assert_eq!(session.history().len(), 1);
        assert_eq!(sessions.len().await, 1);
    }

    #[tokio::test]
    async fn test_serve_with_shutdown() {
        let server = server();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn({
            let server = server.clone();
            async move {
                server
                    .serve_with_shutdown("127.0.0.1:0", async {
                        let _ = rx.await;
                    })
                    .await
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio_test::assert_ok!(handle.await.unwrap());
    }
}
