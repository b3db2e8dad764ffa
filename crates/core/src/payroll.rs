//! Monthly compensation with leave deductions.
//!
//! Pay on an [`Employee`] is annual. A month is worth one twelfth of it and
//! is assumed to contain [`WORKING_DAYS_PER_MONTH`] working days, which gives
//! the daily rate. Each leave type carries [`DEDUCTION_FREE_DAYS_PER_TYPE`]
//! days per month that are not deducted; every further day of that type
//! costs one daily rate. All arithmetic is exact decimal; rounding to cents
//! happens only when the breakdown is rendered.

use chrono::{Datelike, NaiveDate};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::domain::employee::{Employee, EmployeeId, Leave, LeaveType};
use crate::errors::DomainError;

pub const MONTHS_PER_YEAR: u32 = 12;
pub const WORKING_DAYS_PER_MONTH: u32 = 22;
pub const DEDUCTION_FREE_DAYS_PER_TYPE: u32 = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayPeriod {
    year: i32,
    month: u32,
    first_day: NaiveDate,
    last_day: NaiveDate,
}

impl PayPeriod {
    pub fn new(year: i32, month: u32) -> Result<Self, DomainError> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
            DomainError::InvariantViolation(format!(
                "invalid pay period {year}-{month:02} (month must be 1..=12)"
            ))
        })?;
        let next_month_start = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let last_day = next_month_start.and_then(|date| date.pred_opt()).ok_or_else(|| {
            DomainError::InvariantViolation(format!("pay period {year}-{month:02} is out of range"))
        })?;

        Ok(Self { year, month, first_day, last_day })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn last_day(&self) -> NaiveDate {
        self.last_day
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LeaveTally {
    pub sick: u32,
    pub casual: u32,
}

impl LeaveTally {
    pub fn record(&mut self, leave_type: LeaveType) {
        match leave_type {
            LeaveType::Sick => self.sick += 1,
            LeaveType::Casual => self.casual += 1,
        }
    }

    fn deductible(&self) -> Self {
        Self {
            sick: self.sick.saturating_sub(DEDUCTION_FREE_DAYS_PER_TYPE),
            casual: self.casual.saturating_sub(DEDUCTION_FREE_DAYS_PER_TYPE),
        }
    }

    pub fn total(&self) -> u32 {
        self.sick + self.casual
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompensationBreakdown {
    pub employee_id: EmployeeId,
    pub period: PayPeriod,
    pub monthly_pay: Decimal,
    pub daily_rate: Decimal,
    pub leaves: LeaveTally,
    pub deductible_days: LeaveTally,
    pub deduction: Decimal,
    pub total_compensation: Decimal,
}

/// Rendered form of a [`CompensationBreakdown`]; money is fixed at two places.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensationReport {
    pub employee_id: String,
    pub month: u32,
    pub year: i32,
    pub monthly_pay: Decimal,
    pub daily_rate: Decimal,
    pub working_days: u32,
    pub leave_allowance_per_type: u32,
    pub leaves: LeaveTally,
    pub deductible_days: LeaveTally,
    pub deduction: Decimal,
    pub total_compensation: Decimal,
}

impl CompensationBreakdown {
    pub fn report(&self) -> CompensationReport {
        CompensationReport {
            employee_id: self.employee_id.0.clone(),
            month: self.period.month(),
            year: self.period.year(),
            monthly_pay: to_cents(self.monthly_pay),
            daily_rate: to_cents(self.daily_rate),
            working_days: WORKING_DAYS_PER_MONTH,
            leave_allowance_per_type: DEDUCTION_FREE_DAYS_PER_TYPE,
            leaves: self.leaves,
            deductible_days: self.deductible_days,
            deduction: to_cents(self.deduction),
            total_compensation: to_cents(self.total_compensation),
        }
    }
}

/// Leaves of other employees or outside `period` are ignored.
pub fn calculate_monthly_compensation(
    employee: &Employee,
    leaves: &[Leave],
    period: PayPeriod,
) -> CompensationBreakdown {
    let monthly_pay = employee.annual_pay() / Decimal::from(MONTHS_PER_YEAR);
    let daily_rate = monthly_pay / Decimal::from(WORKING_DAYS_PER_MONTH);

    let mut tally = LeaveTally::default();
    for leave in leaves
        .iter()
        .filter(|leave| leave.employee_id == employee.id && period.contains(leave.date))
    {
        tally.record(leave.leave_type);
    }

    let deductible_days = tally.deductible();
    let deduction = daily_rate * Decimal::from(deductible_days.total());

    CompensationBreakdown {
        employee_id: employee.id.clone(),
        period,
        monthly_pay,
        daily_rate,
        leaves: tally,
        deductible_days,
        deduction,
        total_compensation: monthly_pay - deduction,
    }
}

fn to_cents(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}
