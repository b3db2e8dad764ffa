use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use wagewiz_core::domain::company::CompanyId;
use wagewiz_core::domain::employee::{Employee, EmployeeId, EmployeeUpdate};
use wagewiz_core::errors::ToolError;
use wagewiz_core::payroll::{calculate_monthly_compensation, LeaveTally, PayPeriod};
use wagewiz_core::search::name_matches;
use wagewiz_db::repositories::{EmployeeRepository, LeaveRepository, RepositoryError};

use super::args::Arguments;
use super::capability::Capability;
use crate::llm::ToolDefinition;

const UPDATABLE_FIELDS: &[&str] = &["firstname", "lastname", "designation", "basePay", "otherPay", "doj"];

/// Dispatches capability invocations onto the employee and leave stores.
#[derive(Clone)]
pub struct ToolRegistry {
    employees: Arc<dyn EmployeeRepository>,
    leaves: Arc<dyn LeaveRepository>,
}

impl ToolRegistry {
    pub fn new(employees: Arc<dyn EmployeeRepository>, leaves: Arc<dyn LeaveRepository>) -> Self {
        Self { employees, leaves }
    }

    pub fn catalogue(&self) -> Vec<ToolDefinition> {
        Capability::ALL.iter().map(Capability::definition).collect()
    }

    /// Runs one capability. `arguments` is the raw JSON text from the model;
    /// nothing is written unless every argument validates.
    pub async fn invoke(&self, name: &str, arguments: &str) -> Result<Value, ToolError> {
        let capability = name.parse::<Capability>()?;
        let args = Arguments::parse(arguments)?;

        debug!(event_name = "agent.tool.dispatch", capability = %capability, "dispatching capability");

        match capability {
            Capability::GetAllEmployees => self.get_all_employees(&args).await,
            Capability::GetEmployeeDetails => self.get_employee_details(&args).await,
            Capability::UpdateEmployee => self.update_employee(&args).await,
            Capability::GetLeaveRecords => self.get_leave_records(&args).await,
            Capability::MarkLeave => self.mark_leave(&args).await,
            Capability::RemoveLeave => self.remove_leave(&args).await,
            Capability::GetEmployeeAttendance => self.get_employee_attendance(&args).await,
            Capability::UpdateDesignation => self.update_designation(&args).await,
            Capability::AdjustSalary => self.adjust_salary(&args).await,
            Capability::SearchEmployeesByName => self.search_employees_by_name(&args).await,
            Capability::CalculateMonthlyCompensation => {
                self.calculate_monthly_compensation(&args).await
            }
        }
    }

    async fn get_all_employees(&self, args: &Arguments) -> Result<Value, ToolError> {
        let company_id = CompanyId::new(args.id("companyId")?);
        let employees = self.employees.list_for_company(&company_id).await.map_err(storage)?;
        to_json(&employees)
    }

    async fn get_employee_details(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee = self.require_employee(&EmployeeId::new(args.id("employeeId")?)).await?;
        to_json(&employee)
    }

    async fn update_employee(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let updates = args.object("updates")?;
        updates.reject_unknown(UPDATABLE_FIELDS)?;

        let update = EmployeeUpdate {
            first_name: updates.optional_text("firstname")?,
            last_name: updates.optional_text("lastname")?,
            designation: updates.optional_text("designation")?,
            base_pay: updates.optional_amount("basePay")?,
            other_pay: updates.optional_amount("otherPay")?,
            date_of_joining: updates.optional_date("doj")?,
        };
        if update.is_empty() {
            return Err(ToolError::Validation("`updates` must change at least one field".to_string()));
        }

        self.apply_update(&employee_id, &update).await
    }

    async fn get_leave_records(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee = self.require_employee(&EmployeeId::new(args.id("employeeId")?)).await?;
        let leaves = self.leaves.list_for_employee(&employee.id).await.map_err(storage)?;
        to_json(&leaves)
    }

    async fn mark_leave(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let date = args.date("date")?;
        let leave_type = args.leave_type("type")?;

        let employee = self.require_employee(&employee_id).await?;
        let leave = self.leaves.create(&employee.id, date, leave_type).await.map_err(storage)?;
        to_json(&leave)
    }

    async fn remove_leave(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let date = args.date("date")?;

        if !self.leaves.remove_one(&employee_id, date).await.map_err(storage)? {
            return Err(ToolError::NotFound("No leave record found for this date".to_string()));
        }
        Ok(json!({
            "message": "Leave record removed successfully",
            "employeeId": employee_id,
            "date": date,
        }))
    }

    async fn get_employee_attendance(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let start = args.date("startDate")?;
        let end = args.date("endDate")?;
        if start > end {
            return Err(ToolError::Validation("`startDate` must not be after `endDate`".to_string()));
        }

        let employee = self.require_employee(&employee_id).await?;
        let leaves =
            self.leaves.list_between(&employee.id, start, end).await.map_err(storage)?;
        let mut totals = LeaveTally::default();
        for leave in &leaves {
            totals.record(leave.leave_type);
        }

        Ok(json!({
            "employeeId": employee.id,
            "startDate": start,
            "endDate": end,
            "leaves": leaves,
            "totals": totals,
        }))
    }

    async fn update_designation(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let designation = args.text("newDesignation")?;
        let update = EmployeeUpdate { designation: Some(designation), ..EmployeeUpdate::default() };
        self.apply_update(&employee_id, &update).await
    }

    async fn adjust_salary(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let update = EmployeeUpdate {
            base_pay: Some(args.amount("newBasePay")?),
            other_pay: args.optional_amount("newOtherPay")?,
            ..EmployeeUpdate::default()
        };
        self.apply_update(&employee_id, &update).await
    }

    async fn search_employees_by_name(&self, args: &Arguments) -> Result<Value, ToolError> {
        let term = args.text("searchTerm")?;
        let candidates = match args.optional_id("companyId")? {
            Some(company_id) => self.employees.list_for_company(&CompanyId::new(company_id)).await,
            None => self.employees.list_all().await,
        }
        .map_err(storage)?;

        let matches = candidates
            .into_iter()
            .filter(|employee| name_matches(&employee.first_name, &employee.last_name, &term))
            .collect::<Vec<_>>();
        to_json(&matches)
    }

    async fn calculate_monthly_compensation(&self, args: &Arguments) -> Result<Value, ToolError> {
        let employee_id = EmployeeId::new(args.id("employeeId")?);
        let month = u32::try_from(args.integer("month")?)
            .ok()
            .filter(|month| (1..=12).contains(month))
            .ok_or_else(|| ToolError::Validation("`month` must be between 1 and 12".to_string()))?;
        let year = i32::try_from(args.integer("year")?)
            .map_err(|_| ToolError::Validation("`year` is out of range".to_string()))?;
        let period = PayPeriod::new(year, month)?;

        let employee = self.require_employee(&employee_id).await?;
        let leaves = self
            .leaves
            .list_between(&employee.id, period.first_day(), period.last_day())
            .await
            .map_err(storage)?;

        to_json(&calculate_monthly_compensation(&employee, &leaves, period).report())
    }

    async fn require_employee(&self, id: &EmployeeId) -> Result<Employee, ToolError> {
        self.employees
            .find_by_id(id)
            .await
            .map_err(storage)?
            .ok_or_else(|| ToolError::NotFound(format!("Employee `{id}` not found")))
    }

    async fn apply_update(
        &self,
        id: &EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Value, ToolError> {
        let updated = self
            .employees
            .update(id, update)
            .await
            .map_err(storage)?
            .ok_or_else(|| ToolError::NotFound(format!("Employee `{id}` not found")))?;
        to_json(&updated)
    }
}

/// Text stored on the `tool` turn for one invocation outcome.
pub fn render_tool_result(outcome: &Result<Value, ToolError>) -> String {
    match outcome {
        Ok(value) => value.to_string(),
        Err(error) => error_payload(error).to_string(),
    }
}

pub fn error_payload(error: &ToolError) -> Value {
    json!({ "error": { "type": error.kind(), "message": error.to_string() } })
}

fn storage(error: RepositoryError) -> ToolError {
    warn!(event_name = "agent.tool.storage_error", error = %error, "capability storage failure");
    ToolError::Storage(error.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|error| ToolError::Storage(error.to_string()))
}
