use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::normalize_identifier;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_identifier(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An employee record. `base_pay` and `other_pay` are annual amounts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    #[serde(rename = "firstname")]
    pub first_name: String,
    #[serde(rename = "lastname")]
    pub last_name: String,
    pub designation: String,
    #[serde(rename = "basePay")]
    pub base_pay: Decimal,
    #[serde(rename = "otherPay")]
    pub other_pay: Option<Decimal>,
    #[serde(rename = "doj")]
    pub date_of_joining: NaiveDate,
    #[serde(rename = "companyId")]
    pub company_id: CompanyId,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn annual_pay(&self) -> Decimal {
        self.base_pay + self.other_pay.unwrap_or(Decimal::ZERO)
    }
}

/// A partial change to an employee. `None` leaves the field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EmployeeUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub designation: Option<String>,
    pub base_pay: Option<Decimal>,
    pub other_pay: Option<Decimal>,
    pub date_of_joining: Option<NaiveDate>,
}

impl EmployeeUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, employee: &mut Employee) {
        if let Some(first_name) = &self.first_name {
            employee.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            employee.last_name = last_name.clone();
        }
        if let Some(designation) = &self.designation {
            employee.designation = designation.clone();
        }
        if let Some(base_pay) = self.base_pay {
            employee.base_pay = base_pay;
        }
        if let Some(other_pay) = self.other_pay {
            employee.other_pay = Some(other_pay);
        }
        if let Some(date_of_joining) = self.date_of_joining {
            employee.date_of_joining = date_of_joining;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaveType {
    Sick,
    Casual,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sick => "sick",
            Self::Casual => "casual",
        }
    }
}

impl FromStr for LeaveType {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sick" => Ok(Self::Sick),
            "casual" => Ok(Self::Casual),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported leave type `{other}` (expected sick|casual)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leave {
    pub id: LeaveId,
    #[serde(rename = "employeeId")]
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub leave_type: LeaveType,
}
