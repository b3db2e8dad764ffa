use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use thiserror::Error;

use wagewiz_core::domain::company::{Company, CompanyId};
use wagewiz_core::domain::conversation::{Conversation, ConversationId, Turn, TurnBody};
use wagewiz_core::domain::employee::{Employee, EmployeeId, EmployeeUpdate, Leave, LeaveType};

pub mod company;
pub mod conversation;
pub mod employee;
pub mod leave;
pub mod memory;

pub use company::SqlCompanyRepository;
pub use conversation::{SqlConversationRepository, SqlTurnRepository};
pub use employee::SqlEmployeeRepository;
pub use leave::SqlLeaveRepository;
pub use memory::{
    InMemoryCompanyRepository, InMemoryConversationRepository, InMemoryEmployeeRepository,
    InMemoryLeaveRepository, InMemoryTurnRepository,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CompanyRepository: Send + Sync {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn save(&self, company: Company) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn create(
        &self,
        company_id: &CompanyId,
        metadata: Map<String, Value>,
    ) -> Result<Conversation, RepositoryError>;

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Replaces the metadata bag. Returns `false` when the conversation does not exist.
    async fn update_metadata(
        &self,
        id: &ConversationId,
        metadata: Map<String, Value>,
    ) -> Result<bool, RepositoryError>;
}

/// Append-only log of conversation turns.
///
/// `append` assigns the turn id and a creation timestamp strictly greater
/// than every earlier turn of the same conversation; `list_for_conversation`
/// returns turns in that order.
#[async_trait]
pub trait TurnRepository: Send + Sync {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        body: TurnBody,
    ) -> Result<Turn, RepositoryError>;

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Turn>, RepositoryError>;
}

#[async_trait]
pub trait EmployeeRepository: Send + Sync {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError>;
    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError>;
    async fn list_all(&self) -> Result<Vec<Employee>, RepositoryError>;
    async fn save(&self, employee: Employee) -> Result<(), RepositoryError>;

    /// Applies `update` atomically and returns the stored result, or `None`
    /// when no employee has this id.
    async fn update(
        &self,
        id: &EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, RepositoryError>;
}

#[async_trait]
pub trait LeaveRepository: Send + Sync {
    async fn create(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        leave_type: LeaveType,
    ) -> Result<Leave, RepositoryError>;

    /// Deletes one leave of the employee on `date`; `false` if there was none.
    async fn remove_one(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError>;

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Leave>, RepositoryError>;

    /// Leaves dated within `start..=end`.
    async fn list_between(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError>;
}

const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn format_date(value: NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(column: &str, value: String) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT).map_err(|error| {
        RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_decimal(column: &str, value: String) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_json_object(
    column: &str,
    value: String,
) -> Result<Map<String, Value>, RepositoryError> {
    match serde_json::from_str::<Value>(&value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(RepositoryError::Decode(format!(
            "expected a JSON object in `{column}`, found `{other}`"
        ))),
        Err(error) => {
            Err(RepositoryError::Decode(format!("invalid JSON in `{column}`: {error}")))
        }
    }
}

pub(crate) fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
