//! Domain model and deterministic business rules for the WageWiz payroll
//! assistant: conversations and their turns, employees and leave records,
//! the monthly compensation calculator, fuzzy employee-name matching,
//! configuration loading, and the error taxonomy shared by every crate.

pub mod config;
pub mod domain;
pub mod errors;
pub mod payroll;
pub mod search;

pub use domain::company::{Company, CompanyId};
pub use domain::conversation::{
    ChatUser, Conversation, ConversationId, ToolCall, Turn, TurnBody, TurnId, TurnRecord,
};
pub use domain::employee::{Employee, EmployeeId, EmployeeUpdate, Leave, LeaveId, LeaveType};
pub use errors::{DomainError, InterfaceError, ToolError};
pub use payroll::{CompensationBreakdown, PayPeriod};
