use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Map, Value};

use wagewiz_agent::events::{EventCallback, Subscription};
use wagewiz_agent::llm::{ChatRole, Completion};
use wagewiz_agent::orchestrator::GENERIC_FAILURE_MESSAGE;
use wagewiz_agent::{
    BroadcastEventBus, ContextBuilder, EventEnvelope, EventPublisher, InboundMessage, LlmError,
    OrchestrationError, Orchestrator, RunState, ScriptedLlmClient, ToolRegistry,
};
use wagewiz_core::domain::company::{Company, CompanyId};
use wagewiz_core::domain::conversation::{ConversationId, ToolCall, Turn, TurnBody};
use wagewiz_core::domain::employee::{Employee, EmployeeId, Leave, LeaveType};
use wagewiz_db::repositories::{
    CompanyRepository, ConversationRepository, EmployeeRepository, InMemoryCompanyRepository,
    InMemoryConversationRepository, InMemoryEmployeeRepository, InMemoryLeaveRepository,
    InMemoryTurnRepository, LeaveRepository, RepositoryError, TurnRepository,
};

type Journal = Arc<Mutex<Vec<String>>>;

/// Storage faults injected into a harness.
#[derive(Clone, Copy, Default)]
struct Faults {
    /// Role whose append fails.
    fail_append: Option<&'static str>,
    fail_leave_reads: bool,
}

fn disk_error() -> RepositoryError {
    RepositoryError::Decode("disk I/O error".to_string())
}

/// Records every append in a journal shared with the publisher.
struct JournaledTurns {
    inner: InMemoryTurnRepository,
    journal: Journal,
    fail_append: Option<&'static str>,
}

#[async_trait]
impl TurnRepository for JournaledTurns {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        body: TurnBody,
    ) -> Result<Turn, RepositoryError> {
        let role = body.role().as_str();
        if self.fail_append == Some(role) {
            self.journal.lock().expect("journal lock").push(format!("append_failed:{role}"));
            return Err(disk_error());
        }
        let turn = self.inner.append(conversation_id, body).await?;
        self.journal.lock().expect("journal lock").push(format!("append:{role}"));
        Ok(turn)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Turn>, RepositoryError> {
        self.inner.list_for_conversation(conversation_id).await
    }
}

struct FaultyLeaves {
    inner: InMemoryLeaveRepository,
    fail_reads: bool,
}

#[async_trait]
impl LeaveRepository for FaultyLeaves {
    async fn create(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        leave_type: LeaveType,
    ) -> Result<Leave, RepositoryError> {
        self.inner.create(employee_id, date, leave_type).await
    }

    async fn remove_one(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        self.inner.remove_one(employee_id, date).await
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Leave>, RepositoryError> {
        if self.fail_reads {
            return Err(disk_error());
        }
        self.inner.list_for_employee(employee_id).await
    }

    async fn list_between(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError> {
        if self.fail_reads {
            return Err(disk_error());
        }
        self.inner.list_between(employee_id, start, end).await
    }
}

struct JournaledEvents {
    bus: BroadcastEventBus,
    journal: Journal,
    published: Mutex<Vec<EventEnvelope>>,
}

impl EventPublisher for JournaledEvents {
    fn publish(&self, event: EventEnvelope) -> usize {
        self.journal.lock().expect("journal lock").push(format!("publish:{}", event.event_type));
        self.published.lock().expect("published lock").push(event.clone());
        self.bus.publish(event)
    }

    fn subscribe(&self, conversation_id: &ConversationId, callback: EventCallback) -> Subscription {
        self.bus.subscribe(conversation_id, callback)
    }
}

struct Harness {
    orchestrator: Orchestrator,
    llm: Arc<ScriptedLlmClient>,
    turns: Arc<JournaledTurns>,
    leaves: Arc<FaultyLeaves>,
    events: Arc<JournaledEvents>,
    journal: Journal,
    conversation_id: ConversationId,
}

impl Harness {
    async fn new(script: Vec<Result<Completion, LlmError>>) -> Self {
        Self::with_faults(script, Faults::default()).await
    }

    async fn with_faults(script: Vec<Result<Completion, LlmError>>, faults: Faults) -> Self {
        let journal: Journal = Arc::default();
        let companies = Arc::new(InMemoryCompanyRepository::default());
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let employees = Arc::new(InMemoryEmployeeRepository::default());
        let leaves = Arc::new(FaultyLeaves {
            inner: InMemoryLeaveRepository::default(),
            fail_reads: faults.fail_leave_reads,
        });
        let turns = Arc::new(JournaledTurns {
            inner: InMemoryTurnRepository::default(),
            journal: journal.clone(),
            fail_append: faults.fail_append,
        });
        let events = Arc::new(JournaledEvents {
            bus: BroadcastEventBus::new("ww_events", 16),
            journal: journal.clone(),
            published: Mutex::default(),
        });
        let llm = Arc::new(ScriptedLlmClient::new(script));

        companies
            .save(Company {
                id: CompanyId::new("c-1"),
                name: "Acme Payroll Ltd".to_string(),
                created_at: Utc::now(),
            })
            .await
            .expect("save company");
        employees
            .save(Employee {
                id: EmployeeId::new("e-1"),
                first_name: "John".to_string(),
                last_name: "Doe".to_string(),
                designation: "Payroll Analyst".to_string(),
                base_pay: Decimal::new(66_000, 0),
                other_pay: None,
                date_of_joining: NaiveDate::from_ymd_opt(2021, 6, 1).expect("valid date"),
                company_id: CompanyId::new("c-1"),
            })
            .await
            .expect("save employee");
        let conversation =
            conversations.create(&CompanyId::new("c-1"), Map::new()).await.expect("conversation");

        let orchestrator = Orchestrator::new(
            conversations.clone(),
            turns.clone(),
            ContextBuilder::new(conversations, companies, turns.clone()),
            ToolRegistry::new(employees, leaves.clone()),
            llm.clone(),
            events.clone(),
        );

        Self {
            orchestrator,
            llm,
            turns,
            leaves,
            events,
            journal,
            conversation_id: conversation.id,
        }
    }

    fn inbound(&self, message: &str) -> InboundMessage {
        InboundMessage {
            conversation_id: self.conversation_id.to_string(),
            message: message.to_string(),
        }
    }

    async fn log(&self) -> Vec<TurnBody> {
        self.turns
            .list_for_conversation(&self.conversation_id)
            .await
            .expect("list turns")
            .into_iter()
            .map(|turn| turn.body)
            .collect()
    }

    fn published(&self) -> Vec<EventEnvelope> {
        self.events.published.lock().expect("published lock").clone()
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().expect("journal lock").clone()
    }
}

fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall {
        call_id: id.to_string(),
        function_name: name.to_string(),
        arguments: arguments.to_string(),
    }
}

#[tokio::test]
async fn plain_answer_skips_tools() {
    let harness = Harness::new(vec![Ok(Completion::text("Hi, I am Wiz."))]).await;

    let outcome = harness.orchestrator.handle(&harness.inbound("hello")).await.expect("accepted");

    assert_eq!(
        outcome.states,
        vec![
            RunState::Started,
            RunState::ModelCall1,
            RunState::NoTools,
            RunState::PersistFinal,
            RunState::Publish,
            RunState::Done,
        ]
    );
    assert_eq!(
        harness.log().await,
        vec![TurnBody::user("hello"), TurnBody::assistant_text("Hi, I am Wiz.")]
    );
    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 1);
    assert!(requests[0].offers_tools());
    assert_eq!(requests[0].tools.len(), 11);
}

#[tokio::test]
async fn mark_leave_end_to_end() {
    let call = tool_call(
        "call_1",
        "markLeave",
        json!({ "employeeId": "E-1", "date": "2025-04-05", "type": "casual" }),
    );
    let harness = Harness::new(vec![
        Ok(Completion::tool_calls(vec![call.clone()])),
        Ok(Completion::text("Casual leave recorded for John Doe on 2025-04-05.")),
    ])
    .await;

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _subscription = harness.events.subscribe(
        &harness.conversation_id,
        Box::new(move |event| {
            let _ = tx.send(event.clone());
        }),
    );

    let outcome = harness
        .orchestrator
        .handle(&harness.inbound("Mark casual leave for John on 5 April 2025"))
        .await
        .expect("accepted");

    assert!(outcome.succeeded());
    assert_eq!(outcome.tool_calls_executed, 1);
    assert!(outcome.states.contains(&RunState::ExecutingTools));
    assert!(outcome.states.contains(&RunState::ModelCall2));

    let log = harness.log().await;
    assert_eq!(log.len(), 4);
    assert_eq!(log[1], TurnBody::Assistant { text: None, tool_calls: vec![call] });
    let TurnBody::Tool { call_id, result_text } = &log[2] else {
        panic!("third turn should be the tool result, got {:?}", log[2]);
    };
    assert_eq!(call_id, "call_1");
    let result: Value = serde_json::from_str(result_text).expect("tool result is JSON");
    assert_eq!(result["employeeId"], "e-1");
    assert_eq!(result["type"], "casual");
    assert_eq!(
        log[3],
        TurnBody::assistant_text("Casual leave recorded for John Doe on 2025-04-05.")
    );

    let stored = harness.leaves.list_for_employee(&EmployeeId::new("e-1")).await.expect("leaves");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].leave_type, LeaveType::Casual);

    let requests = harness.llm.requests().await;
    assert_eq!(requests.len(), 2);
    assert!(!requests[1].offers_tools());
    let tool_message = requests[1]
        .messages
        .iter()
        .find(|message| message.role == ChatRole::Tool)
        .expect("second request carries the tool result");
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));

    let event = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("event delivered")
        .expect("channel open");
    assert_eq!(event.event_type, "response_ready");
    assert_eq!(event.data["response"], "Casual leave recorded for John Doe on 2025-04-05.");
    assert_eq!(harness.published().len(), 1);
}

#[tokio::test]
async fn publish_happens_after_final_turn_is_persisted() {
    let harness = Harness::new(vec![
        Ok(Completion::tool_calls(vec![tool_call(
            "call_1",
            "getLeaveRecords",
            json!({ "employeeId": "e-1" }),
        )])),
        Ok(Completion::text("No leaves yet.")),
    ])
    .await;

    harness.orchestrator.handle(&harness.inbound("any leaves?")).await.expect("accepted");

    assert_eq!(
        harness.journal(),
        vec![
            "append:user".to_string(),
            "append:assistant".to_string(),
            "append:tool".to_string(),
            "append:assistant".to_string(),
            "publish:response_ready".to_string(),
        ]
    );
}

#[tokio::test]
async fn remove_leave_not_found_still_completes() {
    let harness = Harness::new(vec![
        Ok(Completion::tool_calls(vec![tool_call(
            "call_1",
            "removeLeave",
            json!({ "employeeId": "e-1", "date": "2025-04-09" }),
        )])),
        Ok(Completion::text("There was no leave on 9 April to remove.")),
    ])
    .await;

    let outcome =
        harness.orchestrator.handle(&harness.inbound("cancel John's leave on 9 April")).await.expect("accepted");

    assert!(outcome.succeeded());
    let log = harness.log().await;
    let TurnBody::Tool { result_text, .. } = &log[2] else {
        panic!("expected tool turn, got {:?}", log[2]);
    };
    let payload: Value = serde_json::from_str(result_text).expect("error payload is JSON");
    assert_eq!(
        payload,
        json!({ "error": { "type": "NotFoundError", "message": "No leave record found for this date" } })
    );
    assert_eq!(harness.published()[0].event_type, "response_ready");
}

#[tokio::test]
async fn unknown_capability_is_recorded_and_the_run_continues() {
    let harness = Harness::new(vec![
        Ok(Completion::tool_calls(vec![
            tool_call("call_1", "fireEmployee", json!({ "employeeId": "e-1" })),
            tool_call("call_2", "getEmployeeDetails", json!({ "employeeId": 404 })),
        ])),
        Ok(Completion::text("I can't do that, and employee 404 does not exist.")),
    ])
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("fire John")).await.expect("accepted");

    assert!(outcome.succeeded());
    assert_eq!(outcome.tool_calls_executed, 2);
    let log = harness.log().await;
    let kinds = log
        .iter()
        .filter_map(|body| match body {
            TurnBody::Tool { result_text, .. } => serde_json::from_str::<Value>(result_text)
                .ok()
                .map(|payload| payload["error"]["type"].clone()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec![json!("UnknownCapabilityError"), json!("NotFoundError")]);
}

#[tokio::test]
async fn model_failure_publishes_one_generic_failure_event() {
    let harness = Harness::new(vec![Err(LlmError::Status {
        status: 503,
        message: "model overloaded".to_string(),
    })])
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("hello")).await.expect("accepted");

    assert_eq!(outcome.final_state(), RunState::Failed);
    assert!(outcome.failure.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(harness.log().await, vec![TurnBody::user("hello")]);

    let published = harness.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type, "response_failed");
    let error = published[0].data["error"].as_str().unwrap_or_default();
    assert!(!error.contains("overloaded"), "failure event must not leak internals: {error}");
}

#[tokio::test]
async fn second_model_failure_keeps_partial_log_readable() {
    let harness = Harness::new(vec![
        Ok(Completion::tool_calls(vec![tool_call(
            "call_1",
            "getEmployeeDetails",
            json!({ "employeeId": "e-1" }),
        )])),
        Err(LlmError::Timeout),
    ])
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("who is e-1?")).await.expect("accepted");

    assert_eq!(outcome.final_state(), RunState::Failed);
    assert_eq!(outcome.states[outcome.states.len() - 2], RunState::ModelCall2);
    let roles = harness.log().await.iter().map(|body| body.role().as_str()).collect::<Vec<_>>();
    assert_eq!(roles, vec!["user", "assistant", "tool"]);
    assert_eq!(harness.journal().last().map(String::as_str), Some("publish:response_failed"));
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_anything_is_written() {
    let harness = Harness::new(Vec::new()).await;

    let blank = harness.orchestrator.accept(&harness.inbound("   ")).await;
    assert!(matches!(blank, Err(OrchestrationError::InvalidPayload(_))));

    let missing_id = harness
        .orchestrator
        .accept(&InboundMessage { conversation_id: String::new(), message: "hi".to_string() })
        .await;
    assert!(matches!(missing_id, Err(OrchestrationError::InvalidPayload(_))));

    let unknown = harness
        .orchestrator
        .accept(&InboundMessage {
            conversation_id: "no-such-conversation".to_string(),
            message: "hi".to_string(),
        })
        .await;
    assert!(matches!(unknown, Err(OrchestrationError::ConversationNotFound(_))));

    assert!(harness.journal().is_empty());
    assert!(harness.llm.requests().await.is_empty());
}

#[tokio::test]
async fn storage_failure_inside_a_capability_aborts_the_run() {
    let harness = Harness::with_faults(
        vec![
            Ok(Completion::tool_calls(vec![tool_call(
                "call_1",
                "getLeaveRecords",
                json!({ "employeeId": "e-1" }),
            )])),
            Ok(Completion::text("unreachable")),
        ],
        Faults { fail_leave_reads: true, ..Faults::default() },
    )
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("any leaves?")).await.expect("accepted");

    assert_eq!(outcome.final_state(), RunState::Failed);
    assert!(!outcome.states.contains(&RunState::ModelCall2));
    assert_eq!(outcome.tool_calls_executed, 0);
    assert!(outcome.failure.as_deref().unwrap_or_default().contains("disk I/O error"));
    assert_eq!(harness.llm.requests().await.len(), 1);

    let roles = harness.log().await.iter().map(|body| body.role().as_str()).collect::<Vec<_>>();
    assert_eq!(roles, vec!["user", "assistant"]);

    let published = harness.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type, "response_failed");
    assert_eq!(published[0].data["error"], GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn failed_tool_result_append_stops_before_the_second_model_call() {
    let harness = Harness::with_faults(
        vec![
            Ok(Completion::tool_calls(vec![tool_call(
                "call_1",
                "getEmployeeDetails",
                json!({ "employeeId": "e-1" }),
            )])),
            Ok(Completion::text("unreachable")),
        ],
        Faults { fail_append: Some("tool"), ..Faults::default() },
    )
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("who is e-1?")).await.expect("accepted");

    assert_eq!(outcome.final_state(), RunState::Failed);
    assert_eq!(outcome.states[outcome.states.len() - 2], RunState::ExecutingTools);
    assert_eq!(
        harness.journal(),
        vec![
            "append:user".to_string(),
            "append:assistant".to_string(),
            "append_failed:tool".to_string(),
            "publish:response_failed".to_string(),
        ]
    );
    assert_eq!(harness.llm.requests().await.len(), 1);
    assert_eq!(harness.log().await.len(), 2);
    assert_eq!(harness.published()[0].data["error"], GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn failed_final_append_publishes_failure_instead_of_the_reply() {
    let harness = Harness::with_faults(
        vec![Ok(Completion::text("Hi, I am Wiz."))],
        Faults { fail_append: Some("assistant"), ..Faults::default() },
    )
    .await;

    let outcome = harness.orchestrator.handle(&harness.inbound("hello")).await.expect("accepted");

    assert_eq!(outcome.final_state(), RunState::Failed);
    assert_eq!(outcome.states[outcome.states.len() - 2], RunState::PersistFinal);
    assert!(outcome.response.is_none());
    assert_eq!(harness.log().await, vec![TurnBody::user("hello")]);

    let published = harness.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type, "response_failed");
    assert!(!published[0].data["error"].as_str().unwrap_or_default().contains("disk"));
}
