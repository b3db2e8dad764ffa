//! Conversation orchestration for the WageWiz payroll assistant.
//!
//! An inbound HR message becomes one orchestration run: the persisted log is
//! rebuilt into model context (`context`), the model may request capabilities
//! from the registry (`tools`), every turn is appended to the conversation
//! log, and the final answer or failure is announced on the event bus
//! (`events`). The model itself sits behind the `llm::LlmClient` seam.

pub mod context;
pub mod events;
pub mod llm;
pub mod orchestrator;
pub mod tools;

pub use context::{ContextBuilder, ContextError};
pub use events::{BroadcastEventBus, EventEnvelope, EventPublisher, Subscription};
pub use llm::{LlmClient, LlmError, OpenAiCompatibleClient, ScriptedLlmClient};
pub use orchestrator::{
    AcceptedTurn, InboundMessage, OrchestrationError, Orchestrator, RunOutcome, RunState,
};
pub use tools::{Capability, ToolRegistry};
