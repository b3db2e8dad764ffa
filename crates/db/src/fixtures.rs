use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Deterministic demo dataset: one company, a handful of employees whose
/// names exercise the fuzzy search, and an April 2025 leave history for
/// John Doe that crosses the deduction-free allowance.
pub struct DemoSeed;

pub const DEMO_COMPANY_ID: &str = "company-demo-001";
pub const DEMO_COMPANY_NAME: &str = "Acme Payroll Ltd";

struct SeedEmployee {
    id: &'static str,
    first_name: &'static str,
    last_name: &'static str,
    designation: &'static str,
    base_pay: &'static str,
    other_pay: Option<&'static str>,
    date_of_joining: &'static str,
}

struct SeedLeave {
    id: &'static str,
    employee_id: &'static str,
    date: &'static str,
    leave_type: &'static str,
}

const SEED_EMPLOYEES: &[SeedEmployee] = &[
    SeedEmployee {
        id: "emp-demo-001",
        first_name: "John",
        last_name: "Doe",
        designation: "Payroll Analyst",
        base_pay: "66000",
        other_pay: None,
        date_of_joining: "2021-06-01",
    },
    SeedEmployee {
        id: "emp-demo-002",
        first_name: "Jane",
        last_name: "Doe",
        designation: "HR Manager",
        base_pay: "84000",
        other_pay: Some("6000"),
        date_of_joining: "2019-03-18",
    },
    SeedEmployee {
        id: "emp-demo-003",
        first_name: "Priya",
        last_name: "Raman",
        designation: "Software Engineer",
        base_pay: "96000",
        other_pay: Some("12000"),
        date_of_joining: "2022-09-05",
    },
    SeedEmployee {
        id: "emp-demo-004",
        first_name: "Sheena",
        last_name: "Kapoor",
        designation: "Recruiter",
        base_pay: "54000",
        other_pay: None,
        date_of_joining: "2023-01-09",
    },
    SeedEmployee {
        id: "emp-demo-005",
        first_name: "Karl",
        last_name: "Weber",
        designation: "Accountant",
        base_pay: "72000",
        other_pay: Some("2400"),
        date_of_joining: "2020-11-23",
    },
];

const SEED_LEAVES: &[SeedLeave] = &[
    SeedLeave { id: "leave-demo-001", employee_id: "emp-demo-001", date: "2025-04-01", leave_type: "casual" },
    SeedLeave { id: "leave-demo-002", employee_id: "emp-demo-001", date: "2025-04-02", leave_type: "casual" },
    SeedLeave { id: "leave-demo-003", employee_id: "emp-demo-001", date: "2025-04-03", leave_type: "casual" },
    SeedLeave { id: "leave-demo-004", employee_id: "emp-demo-001", date: "2025-04-04", leave_type: "casual" },
    SeedLeave { id: "leave-demo-005", employee_id: "emp-demo-001", date: "2025-04-07", leave_type: "casual" },
    SeedLeave { id: "leave-demo-006", employee_id: "emp-demo-001", date: "2025-04-10", leave_type: "sick" },
    SeedLeave { id: "leave-demo-007", employee_id: "emp-demo-002", date: "2025-04-14", leave_type: "sick" },
];

const SEED_TIMESTAMP: &str = "2025-03-01T00:00:00.000000Z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedResult {
    pub company_id: &'static str,
    pub employees_seeded: usize,
    pub leaves_seeded: usize,
}

impl DemoSeed {
    /// Inserts the dataset; rows that already exist are left untouched.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO company (id, name, created_at) VALUES (?, ?, ?)")
            .bind(DEMO_COMPANY_ID)
            .bind(DEMO_COMPANY_NAME)
            .bind(SEED_TIMESTAMP)
            .execute(&mut *tx)
            .await?;

        for employee in SEED_EMPLOYEES {
            sqlx::query(
                "INSERT OR IGNORE INTO employee (
                    id, company_id, first_name, last_name, designation,
                    base_pay, other_pay, date_of_joining, updated_at
                 ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(employee.id)
            .bind(DEMO_COMPANY_ID)
            .bind(employee.first_name)
            .bind(employee.last_name)
            .bind(employee.designation)
            .bind(employee.base_pay)
            .bind(employee.other_pay)
            .bind(employee.date_of_joining)
            .bind(SEED_TIMESTAMP)
            .execute(&mut *tx)
            .await?;
        }

        for leave in SEED_LEAVES {
            sqlx::query(
                "INSERT OR IGNORE INTO leave_record (id, employee_id, leave_date, leave_type, created_at)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(leave.id)
            .bind(leave.employee_id)
            .bind(leave.date)
            .bind(leave.leave_type)
            .bind(SEED_TIMESTAMP)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(SeedResult {
            company_id: DEMO_COMPANY_ID,
            employees_seeded: SEED_EMPLOYEES.len(),
            leaves_seeded: SEED_LEAVES.len(),
        })
    }

    /// Removes the dataset along with any conversations opened against the demo company.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "DELETE FROM conversation_turn WHERE conversation_id IN
                (SELECT id FROM conversation WHERE company_id = ?)",
        )
        .bind(DEMO_COMPANY_ID)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM conversation WHERE company_id = ?")
            .bind(DEMO_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM leave_record WHERE employee_id IN
                (SELECT id FROM employee WHERE company_id = ?)",
        )
        .bind(DEMO_COMPANY_ID)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM employee WHERE company_id = ?")
            .bind(DEMO_COMPANY_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM company WHERE id = ?")
            .bind(DEMO_COMPANY_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
