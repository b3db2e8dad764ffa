use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row};

use wagewiz_core::domain::company::CompanyId;
use wagewiz_core::domain::employee::{Employee, EmployeeId, EmployeeUpdate};

use super::{
    format_date, format_timestamp, parse_date, parse_decimal, EmployeeRepository,
    RepositoryError,
};
use crate::DbPool;

const EMPLOYEE_COLUMNS: &str =
    "id, company_id, first_name, last_name, designation, base_pay, other_pay, date_of_joining";

pub struct SqlEmployeeRepository {
    pool: DbPool,
}

impl SqlEmployeeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EmployeeRepository for SqlEmployeeRepository {
    async fn find_by_id(&self, id: &EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(employee_from_row).transpose()
    }

    async fn list_for_company(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee
             WHERE company_id = ?
             ORDER BY last_name ASC, first_name ASC, id ASC"
        ))
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(employee_from_row).collect()
    }

    async fn list_all(&self) -> Result<Vec<Employee>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {EMPLOYEE_COLUMNS} FROM employee ORDER BY last_name ASC, first_name ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(employee_from_row).collect()
    }

    async fn save(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employee (
                id,
                company_id,
                first_name,
                last_name,
                designation,
                base_pay,
                other_pay,
                date_of_joining,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                designation = excluded.designation,
                base_pay = excluded.base_pay,
                other_pay = excluded.other_pay,
                date_of_joining = excluded.date_of_joining,
                updated_at = excluded.updated_at",
        )
        .bind(&employee.id.0)
        .bind(&employee.company_id.0)
        .bind(&employee.first_name)
        .bind(&employee.last_name)
        .bind(&employee.designation)
        .bind(employee.base_pay.to_string())
        .bind(employee.other_pay.map(|value| value.to_string()))
        .bind(format_date(employee.date_of_joining))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(
        &self,
        id: &EmployeeId,
        update: &EmployeeUpdate,
    ) -> Result<Option<Employee>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE employee SET
                first_name = COALESCE(?, first_name),
                last_name = COALESCE(?, last_name),
                designation = COALESCE(?, designation),
                base_pay = COALESCE(?, base_pay),
                other_pay = COALESCE(?, other_pay),
                date_of_joining = COALESCE(?, date_of_joining),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .bind(update.designation.as_deref())
        .bind(update.base_pay.map(|value| value.to_string()))
        .bind(update.other_pay.map(|value| value.to_string()))
        .bind(update.date_of_joining.map(format_date))
        .bind(format_timestamp(Utc::now()))
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let row = sqlx::query(&format!("SELECT {EMPLOYEE_COLUMNS} FROM employee WHERE id = ?"))
            .bind(&id.0)
            .fetch_one(&mut *tx)
            .await?;
        let employee = employee_from_row(row)?;

        tx.commit().await?;
        Ok(Some(employee))
    }
}

fn employee_from_row(row: SqliteRow) -> Result<Employee, RepositoryError> {
    Ok(Employee {
        id: EmployeeId(row.try_get("id")?),
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        designation: row.try_get("designation")?,
        base_pay: parse_decimal("base_pay", row.try_get("base_pay")?)?,
        other_pay: row
            .try_get::<Option<String>, _>("other_pay")?
            .map(|value| parse_decimal("other_pay", value))
            .transpose()?,
        date_of_joining: parse_date("date_of_joining", row.try_get("date_of_joining")?)?,
        company_id: CompanyId(row.try_get("company_id")?),
    })
}
