use chrono::{NaiveDate, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use wagewiz_core::domain::employee::{EmployeeId, Leave, LeaveId, LeaveType};

use super::{
    format_date, format_timestamp, new_record_id, parse_date, LeaveRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlLeaveRepository {
    pool: DbPool,
}

impl SqlLeaveRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl LeaveRepository for SqlLeaveRepository {
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

        sqlx::query(
            "INSERT INTO leave_record (id, employee_id, leave_date, leave_type, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&leave.id.0)
        .bind(&leave.employee_id.0)
        .bind(format_date(leave.date))
        .bind(leave.leave_type.as_str())
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(leave)
    }

    async fn remove_one(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM leave_record
             WHERE rowid = (
                SELECT rowid FROM leave_record
                WHERE employee_id = ? AND leave_date = ?
                ORDER BY rowid ASC
                LIMIT 1
             )",
        )
        .bind(&employee_id.0)
        .bind(format_date(date))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> Result<Vec<Leave>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, leave_date, leave_type
             FROM leave_record
             WHERE employee_id = ?
             ORDER BY leave_date ASC, rowid ASC",
        )
        .bind(&employee_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(leave_from_row).collect()
    }

    async fn list_between(
        &self,
        employee_id: &EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Leave>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, employee_id, leave_date, leave_type
             FROM leave_record
             WHERE employee_id = ? AND leave_date BETWEEN ? AND ?
             ORDER BY leave_date ASC, rowid ASC",
        )
        .bind(&employee_id.0)
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(leave_from_row).collect()
    }
}

fn leave_from_row(row: SqliteRow) -> Result<Leave, RepositoryError> {
    let leave_type_raw = row.try_get::<String, _>("leave_type")?;
    let leave_type = leave_type_raw
        .parse::<LeaveType>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Leave {
        id: LeaveId(row.try_get("id")?),
        employee_id: EmployeeId(row.try_get("employee_id")?),
        date: parse_date("leave_date", row.try_get("leave_date")?)?,
        leave_type,
    })
}
