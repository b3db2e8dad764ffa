use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map};
use tracing::{error, info, warn};
use uuid::Uuid;

use wagewiz_agent::events::EventPublisher;
use wagewiz_agent::{InboundMessage, OrchestrationError, Orchestrator};
use wagewiz_core::domain::company::CompanyId;
use wagewiz_core::domain::conversation::{ConversationId, TurnRecord};
use wagewiz_core::errors::InterfaceError;
use wagewiz_db::repositories::{
    CompanyRepository, ConversationRepository, RepositoryError, TurnRepository,
};

use crate::sse;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub companies: Arc<dyn CompanyRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub turns: Arc<dyn TurnRepository>,
    pub events: Arc<dyn EventPublisher>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub conversation_id: Option<String>,
    pub company_id: Option<String>,
    #[serde(alias = "userMessage")]
    pub message: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitAccepted {
    pub status: String,
    pub conversation_id: String,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = json!({
            "error": {
                "message": self.0.user_message(),
                "correlationId": self.0.correlation_id(),
            }
        });
        if let Some(detail) = self.0.detail() {
            body["error"]["detail"] = json!(detail);
        }
        (status, Json(body)).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/conversation/send", post(submit))
        .route("/conversation/{conversation_id}/messages", get(list_messages))
        .route("/sse/{conversation_id}", get(sse::stream))
        .with_state(state)
}

async fn submit(
    State(state): State<ApiState>,
    Json(body): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitAccepted>), ApiError> {
    let correlation_id = Uuid::new_v4().to_string();

    let message = body.message.unwrap_or_default();
    if message.trim().is_empty() {
        return Err(bad_request("message is required", &correlation_id));
    }

    let conversation_id = match non_blank(body.conversation_id) {
        Some(conversation_id) => conversation_id,
        None => {
            let Some(company_id) = non_blank(body.company_id) else {
                return Err(bad_request("conversationId or companyId is required", &correlation_id));
            };
            open_conversation(&state, &CompanyId::new(company_id), &correlation_id).await?
        }
    };

    let inbound = InboundMessage { conversation_id, message };
    let accepted = state
        .orchestrator
        .accept(&inbound)
        .await
        .map_err(|failure| orchestration_error(failure, &correlation_id))?;

    let response = SubmitAccepted {
        status: "accepted".to_string(),
        conversation_id: accepted.conversation_id.to_string(),
        correlation_id: accepted.correlation_id.clone(),
    };

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        orchestrator.run(accepted).await;
    });

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_messages(
    Path(conversation_id): Path<String>,
    State(state): State<ApiState>,
) -> Result<Json<Vec<TurnRecord>>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    let conversation_id = ConversationId::new(conversation_id);

    let exists = state
        .conversations
        .find_by_id(&conversation_id)
        .await
        .map_err(|failure| storage_error(failure, &correlation_id))?
        .is_some();
    if !exists {
        return Err(ApiError(InterfaceError::NotFound {
            message: format!("conversation `{conversation_id}` does not exist"),
            correlation_id,
        }));
    }

    let turns = state
        .turns
        .list_for_conversation(&conversation_id)
        .await
        .map_err(|failure| storage_error(failure, &correlation_id))?;
    Ok(Json(turns.iter().map(|turn| turn.to_record()).collect()))
}

async fn open_conversation(
    state: &ApiState,
    company_id: &CompanyId,
    correlation_id: &str,
) -> Result<String, ApiError> {
    let company = state
        .companies
        .find_by_id(company_id)
        .await
        .map_err(|failure| storage_error(failure, correlation_id))?;
    if company.is_none() {
        return Err(bad_request(&format!("company `{company_id}` does not exist"), correlation_id));
    }

    let conversation = state
        .conversations
        .create(company_id, Map::new())
        .await
        .map_err(|failure| storage_error(failure, correlation_id))?;
    info!(
        event_name = "server.conversation.created",
        correlation_id = %correlation_id,
        conversation_id = %conversation.id,
        company_id = %company_id,
        "conversation created for submission"
    );
    Ok(conversation.id.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn bad_request(message: &str, correlation_id: &str) -> ApiError {
    warn!(
        event_name = "server.request.rejected",
        correlation_id = %correlation_id,
        reason = %message,
        "request rejected"
    );
    ApiError(InterfaceError::BadRequest {
        message: message.to_string(),
        correlation_id: correlation_id.to_string(),
    })
}

fn storage_error(failure: RepositoryError, correlation_id: &str) -> ApiError {
    error!(
        event_name = "server.storage.error",
        correlation_id = %correlation_id,
        error = %failure,
        "storage failure while serving request"
    );
    ApiError(InterfaceError::ServiceUnavailable {
        message: failure.to_string(),
        correlation_id: correlation_id.to_string(),
    })
}

fn orchestration_error(failure: OrchestrationError, correlation_id: &str) -> ApiError {
    let correlation_id = correlation_id.to_string();
    match failure {
        OrchestrationError::InvalidPayload(message) => bad_request(&message, &correlation_id),
        OrchestrationError::ConversationNotFound(id) => ApiError(InterfaceError::NotFound {
            message: format!("conversation `{id}` does not exist"),
            correlation_id,
        }),
        OrchestrationError::Storage(message) => {
            error!(
                event_name = "server.storage.error",
                correlation_id = %correlation_id,
                error = %message,
                "storage failure while accepting submission"
            );
            ApiError(InterfaceError::ServiceUnavailable { message, correlation_id })
        }
        other => {
            error!(
                event_name = "server.submit.error",
                correlation_id = %correlation_id,
                error = %other,
                "submission failed"
            );
            ApiError(InterfaceError::Internal { message: other.to_string(), correlation_id })
        }
    }
}
