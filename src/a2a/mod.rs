//! A2A transport adapter
//!
//! JSON-RPC over HTTP: `message/send` carries one decision request per
//! task, `tasks/get` returns stored tasks, and the agent card is served at
//! the well-known discovery path.

pub mod card;
pub mod message;
pub mod payload;
pub mod server;

pub use card::{build_agent_card, AgentCard};
pub use message::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Message, Part, Task, TaskState};
pub use payload::{encode_decision, parse_request, DecisionRequest, WireFormat};
pub use server::{create_router, A2aServer, AppState, SessionRegistry, TaskStore};
