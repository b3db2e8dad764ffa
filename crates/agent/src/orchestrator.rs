//! One orchestration run per inbound message.
//!
//! ```text
//! STARTED -> MODEL_CALL_1 -> NO_TOOLS  ----------------------------------> PERSIST_FINAL -> PUBLISH -> DONE
//!                         \-> HAS_TOOLS -> EXECUTING_TOOLS -> MODEL_CALL_2 -/
//! any state -> FAILED
//! ```
//!
//! [`Orchestrator::accept`] performs the STARTED step synchronously so the
//! caller can reject bad input; [`Orchestrator::run`] drives the rest and
//! reports its outcome only through the event publisher.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use wagewiz_core::domain::conversation::{ConversationId, TurnBody};
use wagewiz_db::repositories::{ConversationRepository, RepositoryError, TurnRepository};

use crate::context::{ContextBuilder, ContextError};
use crate::events::{EventEnvelope, EventPublisher};
use crate::llm::{Completion, CompletionRequest, LlmClient, LlmError};
use crate::tools::{render_tool_result, ToolRegistry};

pub const GENERIC_FAILURE_MESSAGE: &str =
    "Sorry, something went wrong while processing your message. Please try again.";

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("conversation `{0}` does not exist")]
    ConversationNotFound(String),
    #[error(transparent)]
    ModelCall(#[from] LlmError),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

impl From<RepositoryError> for OrchestrationError {
    fn from(error: RepositoryError) -> Self {
        Self::Storage(error.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Started,
    ModelCall1,
    NoTools,
    HasTools,
    ExecutingTools,
    ModelCall2,
    PersistFinal,
    Publish,
    Done,
    Failed,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::ModelCall1 => "MODEL_CALL_1",
            Self::NoTools => "NO_TOOLS",
            Self::HasTools => "HAS_TOOLS",
            Self::ExecutingTools => "EXECUTING_TOOLS",
            Self::ModelCall2 => "MODEL_CALL_2",
            Self::PersistFinal => "PERSIST_FINAL",
            Self::Publish => "PUBLISH",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inbound submission, before validation.
#[derive(Clone, Debug, Default)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub message: String,
}

/// A validated submission whose user turn is already persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AcceptedTurn {
    pub conversation_id: ConversationId,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    pub conversation_id: ConversationId,
    pub correlation_id: String,
    pub states: Vec<RunState>,
    pub response: Option<String>,
    pub failure: Option<String>,
    pub tool_calls_executed: usize,
}

impl RunOutcome {
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Started)
    }

    pub fn succeeded(&self) -> bool {
        self.final_state() == RunState::Done
    }
}

struct RunTrace {
    conversation_id: ConversationId,
    correlation_id: String,
    states: Vec<RunState>,
    tool_calls_executed: usize,
}

impl RunTrace {
    fn new(accepted: &AcceptedTurn) -> Self {
        Self {
            conversation_id: accepted.conversation_id.clone(),
            correlation_id: accepted.correlation_id.clone(),
            states: vec![RunState::Started],
            tool_calls_executed: 0,
        }
    }

    fn enter(&mut self, state: RunState) {
        let from = self.states.last().copied().unwrap_or(RunState::Started);
        debug!(
            event_name = "agent.run.transition",
            correlation_id = %self.correlation_id,
            conversation_id = %self.conversation_id,
            from = %from,
            to = %state,
            "run state transition"
        );
        self.states.push(state);
    }

    fn finish(self, response: Option<String>, failure: Option<String>) -> RunOutcome {
        RunOutcome {
            conversation_id: self.conversation_id,
            correlation_id: self.correlation_id,
            states: self.states,
            response,
            failure,
            tool_calls_executed: self.tool_calls_executed,
        }
    }
}

pub struct Orchestrator {
    conversations: Arc<dyn ConversationRepository>,
    turns: Arc<dyn TurnRepository>,
    context: ContextBuilder,
    registry: ToolRegistry,
    llm: Arc<dyn LlmClient>,
    events: Arc<dyn EventPublisher>,
}

impl Orchestrator {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        turns: Arc<dyn TurnRepository>,
        context: ContextBuilder,
        registry: ToolRegistry,
        llm: Arc<dyn LlmClient>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { conversations, turns, context, registry, llm, events }
    }

    /// Validates the submission and appends the user turn.
    pub async fn accept(&self, inbound: &InboundMessage) -> Result<AcceptedTurn, OrchestrationError> {
        if inbound.conversation_id.trim().is_empty() {
            return Err(OrchestrationError::InvalidPayload("conversationId is required".to_string()));
        }
        let message = inbound.message.trim();
        if message.is_empty() {
            return Err(OrchestrationError::InvalidPayload("message is required".to_string()));
        }

        let conversation_id = ConversationId::new(&inbound.conversation_id);
        if self.conversations.find_by_id(&conversation_id).await?.is_none() {
            return Err(OrchestrationError::ConversationNotFound(conversation_id.to_string()));
        }

        self.turns.append(&conversation_id, TurnBody::user(message)).await?;

        let accepted = AcceptedTurn { conversation_id, correlation_id: Uuid::new_v4().to_string() };
        info!(
            event_name = "agent.run.started",
            correlation_id = %accepted.correlation_id,
            conversation_id = %accepted.conversation_id,
            "orchestration run accepted"
        );
        Ok(accepted)
    }

    /// Accepts and runs to completion. Validation failures surface as `Err`;
    /// later failures are reported on the event channel and in the outcome.
    pub async fn handle(&self, inbound: &InboundMessage) -> Result<RunOutcome, OrchestrationError> {
        let accepted = self.accept(inbound).await?;
        Ok(self.run(accepted).await)
    }

    pub async fn run(&self, accepted: AcceptedTurn) -> RunOutcome {
        let mut trace = RunTrace::new(&accepted);

        match self.drive(&accepted, &mut trace).await {
            Ok(response) => {
                trace.enter(RunState::Publish);
                self.events.publish(EventEnvelope::response_ready(&accepted.conversation_id, &response));
                trace.enter(RunState::Done);
                info!(
                    event_name = "agent.run.completed",
                    correlation_id = %accepted.correlation_id,
                    conversation_id = %accepted.conversation_id,
                    tool_calls = trace.tool_calls_executed,
                    "orchestration run completed"
                );
                trace.finish(Some(response), None)
            }
            Err(failure) => {
                let failed_in = trace.states.last().copied().unwrap_or(RunState::Started);
                trace.enter(RunState::Failed);
                error!(
                    event_name = "agent.run.failed",
                    correlation_id = %accepted.correlation_id,
                    conversation_id = %accepted.conversation_id,
                    state = %failed_in,
                    error = %failure,
                    "orchestration run failed"
                );
                self.events.publish(EventEnvelope::response_failed(
                    &accepted.conversation_id,
                    GENERIC_FAILURE_MESSAGE,
                ));
                trace.finish(None, Some(failure.to_string()))
            }
        }
    }

    async fn drive(
        &self,
        accepted: &AcceptedTurn,
        trace: &mut RunTrace,
    ) -> Result<String, OrchestrationError> {
        let conversation_id = &accepted.conversation_id;

        trace.enter(RunState::ModelCall1);
        let messages = self.context.build(conversation_id).await?;
        let first = self
            .llm
            .complete(CompletionRequest::with_tools(messages, self.registry.catalogue()))
            .await?;

        if first.tool_calls.is_empty() {
            trace.enter(RunState::NoTools);
            let reply = final_reply(&first)?;
            trace.enter(RunState::PersistFinal);
            self.turns.append(conversation_id, TurnBody::assistant_text(reply.clone())).await?;
            return Ok(reply);
        }

        trace.enter(RunState::HasTools);
        trace.enter(RunState::ExecutingTools);
        let tool_calls = first.tool_calls;
        self.turns
            .append(
                conversation_id,
                TurnBody::Assistant { text: first.text, tool_calls: tool_calls.clone() },
            )
            .await?;

        for call in &tool_calls {
            let outcome = self.registry.invoke(&call.function_name, &call.arguments).await;
            match &outcome {
                Err(failure) if !failure.is_recoverable() => {
                    return Err(OrchestrationError::Storage(failure.to_string()));
                }
                Err(failure) => warn!(
                    event_name = "agent.tool.failed",
                    correlation_id = %accepted.correlation_id,
                    conversation_id = %conversation_id,
                    call_id = %call.call_id,
                    capability = %call.function_name,
                    kind = failure.kind(),
                    error = %failure,
                    "capability invocation failed"
                ),
                Ok(_) => info!(
                    event_name = "agent.tool.completed",
                    correlation_id = %accepted.correlation_id,
                    conversation_id = %conversation_id,
                    call_id = %call.call_id,
                    capability = %call.function_name,
                    "capability invocation completed"
                ),
            }

            self.turns
                .append(
                    conversation_id,
                    TurnBody::tool_result(call.call_id.clone(), render_tool_result(&outcome)),
                )
                .await?;
            trace.tool_calls_executed += 1;
        }

        trace.enter(RunState::ModelCall2);
        let messages = self.context.build(conversation_id).await?;
        let second = self.llm.complete(CompletionRequest::without_tools(messages)).await?;
        if !second.tool_calls.is_empty() {
            warn!(
                event_name = "agent.run.ignored_tool_calls",
                correlation_id = %accepted.correlation_id,
                conversation_id = %conversation_id,
                count = second.tool_calls.len(),
                "model requested tools after results were supplied; ignoring"
            );
        }
        let reply = final_reply(&second)?;

        trace.enter(RunState::PersistFinal);
        self.turns.append(conversation_id, TurnBody::assistant_text(reply.clone())).await?;
        Ok(reply)
    }
}

fn final_reply(completion: &Completion) -> Result<String, OrchestrationError> {
    completion
        .reply()
        .map(ToString::to_string)
        .ok_or(OrchestrationError::ModelCall(LlmError::EmptyResponse))
}
