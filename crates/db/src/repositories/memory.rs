use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use wagewiz_core::domain::company::{Company, CompanyId};
use wagewiz_core::domain::conversation::{
    next_turn_timestamp, Conversation, ConversationId, Turn, TurnBody, TurnId,
};
use wagewiz_core::domain::employee::{
    Employee, EmployeeId, EmployeeUpdate, Leave, LeaveId, LeaveType,
};

use super::{
    new_record_id, CompanyRepository, ConversationRepository, EmployeeRepository,
    LeaveRepository, RepositoryError, TurnRepository,
};

#[derive(Default)]
pub struct InMemoryCompanyRepository {
    companies: RwLock<HashMap<String, Company>>,
}

#[async_trait::async_trait]
impl CompanyRepository for InMemoryCompanyRepository {
    async fn find_by_id(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn save(&self, company: Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<String, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn create(
        &self,
        company_id: &CompanyId,
        metadata: Map<String, Value>,
    ) -> Result<Conversation, RepositoryError> {
        let conversation = Conversation {
            id: ConversationId(new_record_id()),
            company_id: company_id.clone(),
            metadata,
            created_at: next_turn_timestamp(None, Utc::now()),
        };
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation.clone());
        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn update_metadata(
        &self,
        id: &ConversationId,
        metadata: Map<String, Value>,
    ) -> Result<bool, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        Ok(match conversations.get_mut(&id.0) {
            Some(conversation) => {
                conversation.metadata = metadata;
                true
            }
            None => false,
        })
    }
}

#[derive(Default)]
pub struct InMemoryTurnRepository {
    turns: RwLock<HashMap<String, Vec<Turn>>>,
}

#[async_trait::async_trait]
impl TurnRepository for InMemoryTurnRepository {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        body: TurnBody,
    ) -> Result<Turn, RepositoryError> {
        let mut turns = self.turns.write().await;
        let log = turns.entry(conversation_id.0.clone()).or_default();
        let previous = log.last().map(|turn| turn.created_at);

        let turn = Turn {
            id: TurnId(new_record_id()),
            conversation_id: conversation_id.clone(),
            created_at: next_turn_timestamp(previous, Utc::now()),
            body,
        };
        log.push(turn.clone());
        Ok(turn)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let turns = self.turns.read().await;
        Ok(turns.get(&conversation_id.0).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryEmployeeRepository {
    employees: RwLock<HashMap<String, Employee>>,
}

impl InMemoryEmployeeRepository {
    fn sorted(mut employees: Vec<Employee>) -> Vec<Employee> {
        employees.sort_by(|left, right| {
            (&left.last_name, &left.first_name, &left.id.0).cmp(&(
                &right.last_name,
                &right.first_name,
                &right.id.0,
            ))
        });
        employees
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for InMemoryEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(employees.get(&id.0).cloned())
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(Self::sorted(
            employees.values().filter(|employee| &employee.company_id == company_id).cloned().collect(),
        ))
    }

    async fn list_all(&self) -> Result<Vec<Employee>, RepositoryError> {
        let employees = self.employees.read().await;
        Ok(Self::sorted(employees.values().cloned().collect()))
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        let mut employees = self.employees.write().await;
        employees.insert(employee.id.0.clone(), employee);
        Ok(())
    }

    async fn update(
        &self,
        id: &EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, RepositoryError> {
        let mut employees = self.employees.write().await;
        Ok(employees.get_mut(&id.0).map(|employee| {
            update.apply(employee);
            employee.clone()
        }))
    }
}

#[derive(Default)]
pub struct InMemoryLeaveRepository {
    leaves: RwLock<Vec<Leave>>,
}

impl InMemoryLeaveRepository {
    async fn collect(&self, filter: impl Fn(&Leave) -> bool) -> Vec<Leave> {
        let leaves = self.leaves.read().await;
        let mut selected = leaves.iter().filter(|leave| filter(*leave)).cloned().collect::<Vec<_>>();
        // Stable sort keeps insertion order among same-day leaves.
        selected.sort_by_key(|leave| leave.date);
        selected
    }
}

#[async_trait::async_trait]
impl LeaveRepository for InMemoryLeaveRepository {
    async fn create(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
        leave_type: LeaveType,
    ) -> Result<Leave, RepositoryError> {
        let leave = Leave {
            id: LeaveId(new_record_id()),
            employee_id: employee_id.clone(),
            date,
            leave_type,
        };
        self.leaves.write().await.push(leave.clone());
        Ok(leave)
    }

    async fn remove_one(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let mut leaves = self.leaves.write().await;
        let position =
            leaves.iter().position(|leave| &leave.employee_id == employee_id && leave.date == date);
        Ok(match position {
            Some(index) => {
                leaves.remove(index);
                true
            }
            None => false,
        })
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Leave>, RepositoryError> {
        Ok(self.collect(|leave| &leave.employee_id == employee_id).await)
    }

    async fn list_between(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError> {
        Ok(self
            .collect(|leave| {
                &leave.employee_id == employee_id && leave.date >= start && leave.date <= end
            })
            .await)
    }
}
