//! JSON-RPC 2.0 envelope and the A2A task/message types carried in it

use crate::error::AgentError;
use crate::types::{ContextId, MessageId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const JSONRPC_VERSION: &str = "2.0";

// JSON-RPC and A2A error codes
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const TASK_NOT_FOUND: i64 = -32001;
pub const UNSUPPORTED_OPERATION: i64 = -32004;

/// Incoming JSON-RPC request
#[derive(Clone, Debug, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<JsonValue>,
    pub method: String,
    #[serde(default)]
    pub params: JsonValue,
}

/// JSON-RPC error object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::new(PARSE_ERROR, "Parse error").with_data(detail.into())
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request").with_data(detail.into())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found").with_data(method.to_string())
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, "Invalid params").with_data(detail.into())
    }

    fn with_data(mut self, detail: String) -> Self {
        self.data = Some(JsonValue::String(detail));
        self
    }
}

impl From<&AgentError> for JsonRpcError {
    fn from(err: &AgentError) -> Self {
        let code = match err {
            AgentError::TaskNotFound(_) => TASK_NOT_FOUND,
            AgentError::UnsupportedOperation(_) => UNSUPPORTED_OPERATION,
            AgentError::InvalidRequest(_) => INVALID_REQUEST,
            AgentError::InvalidPayload(_) | AgentError::Decision(_) => INVALID_PARAMS,
            AgentError::Json(_) => PARSE_ERROR,
            _ => INTERNAL_ERROR,
        };
        Self::new(code, err.to_string())
    }
}

/// Outgoing JSON-RPC response; exactly one of `result` / `error` is set
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: JsonValue, result: JsonValue) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: JsonValue, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

/// Message content part
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Part {
    Text { text: String },
    Data { data: JsonValue },
    File { file: JsonValue },
}

fn message_kind() -> String {
    "message".to_string()
}

fn task_kind() -> String {
    "task".to_string()
}

/// A2A message
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    pub message_id: MessageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<ContextId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default = "message_kind")]
    pub kind: String,
}

impl Message {
    /// Agent reply carrying a single text part
    pub fn agent_text(text: impl Into<String>, context_id: &ContextId, task_id: &TaskId) -> Self {
        Self {
            role: Role::Agent,
            parts: vec![Part::Text { text: text.into() }],
            message_id: MessageId::generate(),
            context_id: Some(context_id.clone()),
            task_id: Some(task_id.clone()),
            kind: message_kind(),
        }
    }

    /// All text parts joined by newlines
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// First structured data part, if any
    pub fn data_content(&self) -> Option<&JsonValue> {
        self.parts.iter().find_map(|part| match part {
            Part::Data { data } => Some(data),
            _ => None,
        })
    }
}

/// Task lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskState {
    Submitted,
    Working,
    InputRequired,
    Completed,
    Canceled,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// A2A task; one task per decision request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub context_id: ContextId,
    pub status: TaskStatus,
    #[serde(default)]
    pub history: Vec<Message>,
    #[serde(default = "task_kind")]
    pub kind: String,
}

impl Task {
    /// Finished task whose status carries the agent's reply
    pub fn finished(
        id: TaskId,
        context_id: ContextId,
        state: TaskState,
        request: Message,
        reply: Message,
    ) -> Self {
        Self {
            id,
            context_id,
            status: TaskStatus {
                state,
                message: Some(reply.clone()),
            },
            history: vec![request, reply],
            kind: task_kind(),
        }
    }

    /// Text of the status message, if any
    pub fn reply_text(&self) -> Option<String> {
        self.status.message.as_ref().map(Message::text_content)
    }
}

/// Params of `message/send`
#[derive(Clone, Debug, Deserialize)]
pub struct MessageSendParams {
    pub message: Message,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

/// Params of `tasks/get`
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskQueryParams {
    pub id: TaskId,
    #[serde(default)]
    pub history_length: Option<usize>,
}

/// Params of `tasks/cancel`
#[derive(Clone, Debug, Deserialize)]
pub struct TaskIdParams {
    pub id: TaskId,
}
