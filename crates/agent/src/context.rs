//! Rebuilds the model context from the persisted conversation log.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use wagewiz_core::domain::company::Company;
use wagewiz_core::domain::conversation::{ConversationId, Turn, TurnBody};
use wagewiz_db::repositories::{
    CompanyRepository, ConversationRepository, RepositoryError, TurnRepository,
};

use crate::llm::ChatMessage;
use crate::tools::Capability;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("conversation `{0}` does not exist")]
    ConversationNotFound(String),
    #[error("company `{0}` owning the conversation does not exist")]
    CompanyNotFound(String),
    #[error("conversation log has broken tool pairing: {0}")]
    BrokenPairing(String),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct ContextBuilder {
    conversations: Arc<dyn ConversationRepository>,
    companies: Arc<dyn CompanyRepository>,
    turns: Arc<dyn TurnRepository>,
}

impl ContextBuilder {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        companies: Arc<dyn CompanyRepository>,
        turns: Arc<dyn TurnRepository>,
    ) -> Self {
        Self { conversations, companies, turns }
    }

    /// Ordered messages for the next completion: a synthetic system message
    /// followed by every persisted turn. Read-only and deterministic.
    pub async fn build(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<ChatMessage>, ContextError> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or_else(|| ContextError::ConversationNotFound(conversation_id.to_string()))?;
        let company = self
            .companies
            .find_by_id(&conversation.company_id)
            .await?
            .ok_or_else(|| ContextError::CompanyNotFound(conversation.company_id.to_string()))?;
        let turns = self.turns.list_for_conversation(conversation_id).await?;

        verify_tool_pairing(&turns)?;

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(system_prompt(&company)));
        messages.extend(turns.into_iter().map(|turn| match turn.body {
            TurnBody::User { text } => ChatMessage::user(text),
            TurnBody::Assistant { text, tool_calls } => ChatMessage::assistant(text, tool_calls),
            TurnBody::Tool { call_id, result_text } => ChatMessage::tool(call_id, result_text),
        }));
        Ok(messages)
    }
}

pub fn system_prompt(company: &Company) -> String {
    let capabilities = Capability::ALL
        .iter()
        .map(|capability| format!("- {}: {}", capability.name(), capability.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are Wiz, the payroll assistant for HR staff. You help with employee records, \
         leave tracking, designations, salaries and monthly compensation.\n\
         Available capabilities:\n{capabilities}\n\
         Rules:\n\
         - Only discuss HR and payroll topics for this company; politely decline anything else.\n\
         - You cannot create new employees; direct such requests to the HR portal.\n\
         - When a name, date or amount is ambiguous, ask a clarifying question before acting.\n\
         - Dates use the YYYY-MM-DD format. Pay figures are annual unless stated otherwise.\n\
         Company: {} (id: {})",
        company.name, company.id
    )
}

/// Every assistant tool call must be answered by exactly one later tool turn.
///
/// Turns of another run may sit between a call and its result. Calls still
/// unanswered are accepted only while their request is the latest assistant
/// turn, i.e. the exchange is still in flight.
fn verify_tool_pairing(turns: &[Turn]) -> Result<(), ContextError> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
    let mut latest_assistant = None;

    for (position, turn) in turns.iter().enumerate() {
        match &turn.body {
            TurnBody::User { .. } => {}
            TurnBody::Assistant { tool_calls, .. } => {
                latest_assistant = Some(position);
                for call in tool_calls {
                    if !seen.insert(call.call_id.as_str()) {
                        return Err(ContextError::BrokenPairing(format!(
                            "turn {} repeats call id `{}`",
                            turn.id.0, call.call_id
                        )));
                    }
                    pending.insert(call.call_id.as_str(), position);
                }
            }
            TurnBody::Tool { call_id, .. } => {
                if pending.remove(call_id.as_str()).is_none() {
                    return Err(ContextError::BrokenPairing(format!(
                        "tool turn {} answers unknown call id `{call_id}`",
                        turn.id.0
                    )));
                }
            }
        }
    }

    let abandoned = pending
        .iter()
        .filter(|(_, requested_at)| Some(**requested_at) != latest_assistant)
        .map(|(call_id, _)| *call_id)
        .collect::<Vec<_>>();
    if abandoned.is_empty() {
        return Ok(());
    }
    Err(ContextError::BrokenPairing(format!(
        "call ids {} were never answered",
        abandoned.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::Map;

    use wagewiz_core::domain::company::{Company, CompanyId};
    use wagewiz_core::domain::conversation::{ConversationId, ToolCall, TurnBody};
    use wagewiz_db::repositories::{
        CompanyRepository, ConversationRepository, InMemoryCompanyRepository,
        InMemoryConversationRepository, InMemoryTurnRepository, TurnRepository,
    };

    use super::{ContextBuilder, ContextError};
    use crate::llm::ChatRole;

    struct Fixture {
        builder: ContextBuilder,
        turns: Arc<InMemoryTurnRepository>,
        conversation_id: ConversationId,
    }

    async fn fixture() -> Fixture {
        let companies = Arc::new(InMemoryCompanyRepository::default());
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let turns = Arc::new(InMemoryTurnRepository::default());
        companies
            .save(Company {
                id: CompanyId::new("c-1"),
                name: "Acme Payroll Ltd".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("save company");
        let conversation =
            conversations.create(&CompanyId::new("c-1"), Map::new()).await.expect("create");

        Fixture {
            builder: ContextBuilder::new(conversations, companies, turns.clone()),
            turns,
            conversation_id: conversation.id,
        }
    }

    fn call(id: &str) -> ToolCall {
        ToolCall {
            call_id: id.to_string(),
            function_name: "getLeaveRecords".to_string(),
            arguments: r#"{"employeeId":"e-1"}"#.to_string(),
        }
    }

    async fn append(fixture: &Fixture, bodies: Vec<TurnBody>) {
        for body in bodies {
            fixture.turns.append(&fixture.conversation_id, body).await.expect("append");
        }
    }

    #[tokio::test]
    async fn system_message_leads_and_names_the_company() {
        let fixture = fixture().await;
        append(&fixture, vec![TurnBody::user("hello")]).await;

        let messages = fixture.builder.build(&fixture.conversation_id).await.expect("context");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        let prompt = messages[0].content.as_deref().unwrap_or_default();
        assert!(prompt.starts_with("You are Wiz"));
        assert!(prompt.contains("calculateMonthlyCompensation"));
        assert!(prompt.ends_with("Company: Acme Payroll Ltd (id: c-1)"));
        assert_eq!(messages[1].role, ChatRole::User);
    }

    #[tokio::test]
    async fn tool_exchange_is_rebuilt_with_call_ids() {
        let fixture = fixture().await;
        append(
            &fixture,
            vec![
                TurnBody::user("leaves for e-1 and e-2?"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1"), call("call_2")] },
                TurnBody::tool_result("call_2", "[]"),
                TurnBody::tool_result("call_1", "[]"),
                TurnBody::assistant_text("Neither has leave."),
            ],
        )
        .await;

        let first = fixture.builder.build(&fixture.conversation_id).await.expect("context");
        let second = fixture.builder.build(&fixture.conversation_id).await.expect("context");

        assert_eq!(
            serde_json::to_string(&first).expect("serialize"),
            serde_json::to_string(&second).expect("serialize")
        );
        assert_eq!(first[2].tool_calls.len(), 2);
        assert_eq!(first[3].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(first[5].content.as_deref(), Some("Neither has leave."));
    }

    #[tokio::test]
    async fn missing_tool_result_fails_closed() {
        let fixture = fixture().await;
        append(
            &fixture,
            vec![
                TurnBody::user("leaves?"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1"), call("call_2")] },
                TurnBody::tool_result("call_1", "[]"),
                TurnBody::assistant_text("Done."),
            ],
        )
        .await;

        let error = fixture.builder.build(&fixture.conversation_id).await.expect_err("broken log");
        assert!(matches!(error, ContextError::BrokenPairing(ref message) if message.contains("call_2")));
    }

    #[tokio::test]
    async fn turns_of_another_run_may_sit_between_call_and_result() {
        let fixture = fixture().await;
        append(
            &fixture,
            vec![
                TurnBody::user("leaves for e-1?"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1")] },
                TurnBody::user("and what is the payroll date?"),
                TurnBody::tool_result("call_1", "[]"),
            ],
        )
        .await;

        let messages = fixture.builder.build(&fixture.conversation_id).await.expect("context");
        let roles = messages.iter().map(|message| message.role).collect::<Vec<_>>();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User, ChatRole::Tool]
        );
        assert_eq!(messages[4].tool_call_id.as_deref(), Some("call_1"));

        append(
            &fixture,
            vec![
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_2")] },
                TurnBody::assistant_text("No leave for e-1."),
                TurnBody::tool_result("call_2", "{}"),
                TurnBody::assistant_text("Payroll runs on the 28th."),
            ],
        )
        .await;
        fixture.builder.build(&fixture.conversation_id).await.expect("interleaved exchanges");
    }

    #[tokio::test]
    async fn exchange_in_flight_does_not_block_another_run() {
        let fixture = fixture().await;
        append(
            &fixture,
            vec![
                TurnBody::user("leaves for e-1?"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1")] },
                TurnBody::user("hello?"),
            ],
        )
        .await;

        let messages = fixture.builder.build(&fixture.conversation_id).await.expect("context");
        assert_eq!(messages.len(), 4);
    }

    #[tokio::test]
    async fn repeated_call_id_fails_closed() {
        let fixture = fixture().await;
        append(
            &fixture,
            vec![
                TurnBody::user("leaves?"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1")] },
                TurnBody::tool_result("call_1", "[]"),
                TurnBody::Assistant { text: None, tool_calls: vec![call("call_1")] },
                TurnBody::tool_result("call_1", "[]"),
            ],
        )
        .await;

        let error = fixture.builder.build(&fixture.conversation_id).await.expect_err("duplicate");
        assert!(matches!(error, ContextError::BrokenPairing(ref message) if message.contains("repeats")));
    }

    #[tokio::test]
    async fn orphan_tool_result_fails_closed() {
        let fixture = fixture().await;
        append(&fixture, vec![TurnBody::user("hi"), TurnBody::tool_result("call_9", "{}")]).await;

        let error = fixture.builder.build(&fixture.conversation_id).await.expect_err("orphan");
        assert!(matches!(error, ContextError::BrokenPairing(_)));
    }

    #[tokio::test]
    async fn unknown_conversation_is_reported() {
        let fixture = fixture().await;
        let error = fixture
            .builder
            .build(&ConversationId::new("missing"))
            .await
            .expect_err("missing conversation");
        assert!(matches!(error, ContextError::ConversationNotFound(id) if id == "missing"));
    }
}
