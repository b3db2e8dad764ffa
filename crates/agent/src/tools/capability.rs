use std::fmt;
use std::str::FromStr;

use serde_json::{json, Value};

use wagewiz_core::errors::ToolError;

use crate::llm::ToolDefinition;

/// The closed set of operations the model may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    GetAllEmployees,
    GetEmployeeDetails,
    UpdateEmployee,
    GetLeaveRecords,
    MarkLeave,
    RemoveLeave,
    GetEmployeeAttendance,
    UpdateDesignation,
    AdjustSalary,
    SearchEmployeesByName,
    CalculateMonthlyCompensation,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::GetAllEmployees,
        Capability::GetEmployeeDetails,
        Capability::UpdateEmployee,
        Capability::GetLeaveRecords,
        Capability::MarkLeave,
        Capability::RemoveLeave,
        Capability::GetEmployeeAttendance,
        Capability::UpdateDesignation,
        Capability::AdjustSalary,
        Capability::SearchEmployeesByName,
        Capability::CalculateMonthlyCompensation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAllEmployees => "getAllEmployees",
            Self::GetEmployeeDetails => "getEmployeeDetails",
            Self::UpdateEmployee => "updateEmployee",
            Self::GetLeaveRecords => "getLeaveRecords",
            Self::MarkLeave => "markLeave",
            Self::RemoveLeave => "removeLeave",
            Self::GetEmployeeAttendance => "getEmployeeAttendance",
            Self::UpdateDesignation => "updateDesignation",
            Self::AdjustSalary => "adjustSalary",
            Self::SearchEmployeesByName => "searchEmployeesByName",
            Self::CalculateMonthlyCompensation => "calculateMonthlyCompensation",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetAllEmployees => "List every employee of a company.",
            Self::GetEmployeeDetails => "Fetch one employee's full record by id.",
            Self::UpdateEmployee => {
                "Update an employee's name, designation, annual pay or date of joining."
            }
            Self::GetLeaveRecords => "List all leave records of an employee, oldest first.",
            Self::MarkLeave => "Record a sick or casual leave for an employee on a date.",
            Self::RemoveLeave => "Remove an employee's leave record for a date.",
            Self::GetEmployeeAttendance => {
                "List an employee's leaves between two dates (inclusive) with per-type totals."
            }
            Self::UpdateDesignation => "Change an employee's designation.",
            Self::AdjustSalary => "Set an employee's annual base pay and optionally other pay.",
            Self::SearchEmployeesByName => {
                "Find employees whose name resembles a search term, tolerating typos and spelling variants."
            }
            Self::CalculateMonthlyCompensation => {
                "Compute an employee's pay for a calendar month after leave deductions."
            }
        }
    }

    /// JSON schema of the argument object.
    pub fn parameters(&self) -> Value {
        let employee_id = json!({ "type": ["string", "number"], "description": "Employee id" });
        let company_id = json!({ "type": ["string", "number"], "description": "Company id" });
        let date = |description: &str| json!({ "type": "string", "format": "date", "description": description });

        match self {
            Self::GetAllEmployees => object(json!({ "companyId": company_id }), &["companyId"]),
            Self::GetEmployeeDetails | Self::GetLeaveRecords => {
                object(json!({ "employeeId": employee_id }), &["employeeId"])
            }
            Self::UpdateEmployee => object(
                json!({
                    "employeeId": employee_id,
                    "updates": {
                        "type": "object",
                        "additionalProperties": false,
                        "properties": {
                            "firstname": { "type": "string" },
                            "lastname": { "type": "string" },
                            "designation": { "type": "string" },
                            "basePay": { "type": "number", "minimum": 0, "description": "Annual base pay" },
                            "otherPay": { "type": "number", "minimum": 0, "description": "Annual other pay" },
                            "doj": { "type": "string", "format": "date", "description": "Date of joining" }
                        }
                    }
                }),
                &["employeeId", "updates"],
            ),
            Self::MarkLeave => object(
                json!({
                    "employeeId": employee_id,
                    "date": date("Leave date, YYYY-MM-DD"),
                    "type": { "type": "string", "enum": ["sick", "casual"] }
                }),
                &["employeeId", "date", "type"],
            ),
            Self::RemoveLeave => object(
                json!({ "employeeId": employee_id, "date": date("Leave date, YYYY-MM-DD") }),
                &["employeeId", "date"],
            ),
            Self::GetEmployeeAttendance => object(
                json!({
                    "employeeId": employee_id,
                    "startDate": date("First day, YYYY-MM-DD"),
                    "endDate": date("Last day, YYYY-MM-DD")
                }),
                &["employeeId", "startDate", "endDate"],
            ),
            Self::UpdateDesignation => object(
                json!({ "employeeId": employee_id, "newDesignation": { "type": "string" } }),
                &["employeeId", "newDesignation"],
            ),
            Self::AdjustSalary => object(
                json!({
                    "employeeId": employee_id,
                    "newBasePay": { "type": "number", "minimum": 0, "description": "Annual base pay" },
                    "newOtherPay": { "type": "number", "minimum": 0, "description": "Annual other pay" }
                }),
                &["employeeId", "newBasePay"],
            ),
            Self::SearchEmployeesByName => object(
                json!({
                    "searchTerm": { "type": "string", "description": "Full or partial name" },
                    "companyId": company_id
                }),
                &["searchTerm"],
            ),
            Self::CalculateMonthlyCompensation => object(
                json!({
                    "employeeId": employee_id,
                    "month": { "type": "integer", "minimum": 1, "maximum": 12 },
                    "year": { "type": "integer" }
                }),
                &["employeeId", "month", "year"],
            ),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: self.description(),
            parameters: self.parameters(),
        }
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({ "type": "object", "properties": properties, "required": required })
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|capability| capability.name() == value)
            .ok_or_else(|| ToolError::UnknownCapability(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use wagewiz_core::errors::ToolError;

    use super::Capability;

    #[test]
    fn names_are_unique_and_round_trip() {
        let names = Capability::ALL.iter().map(Capability::name).collect::<HashSet<_>>();
        assert_eq!(names.len(), Capability::ALL.len());

        for capability in Capability::ALL {
            assert_eq!(capability.name().parse::<Capability>(), Ok(capability));
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert_eq!(
            "fetchSalary".parse::<Capability>(),
            Err(ToolError::UnknownCapability("fetchSalary".to_string()))
        );
    }

    #[test]
    fn schemas_declare_required_fields() {
        let schema = Capability::MarkLeave.parameters();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], serde_json::json!(["employeeId", "date", "type"]));
        assert_eq!(schema["properties"]["type"]["enum"], serde_json::json!(["sick", "casual"]));

        for capability in Capability::ALL {
            let schema = capability.parameters();
            let properties = schema["properties"].as_object().expect("properties object");
            for required in schema["required"].as_array().expect("required array") {
                let key = required.as_str().expect("required key");
                assert!(properties.contains_key(key), "{capability}: `{key}` lacks a schema");
            }
        }
    }
}
