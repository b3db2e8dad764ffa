use serde_json::json;

use crate::commands::{prepare, CommandResult};
use wagewiz_db::{connect_with_settings, migrations, DemoSeed, SeedResult};

pub fn run(reset: bool) -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        if reset {
            DemoSeed::clean(&pool)
                .await
                .map_err(|error| ("seed_reset", error.to_string(), 6u8))?;
        }

        let seeded = DemoSeed::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<SeedResult, (&'static str, String, u8)>(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success_with_details(
            "seed",
            summary_message(&seeded),
            Some(json!({
                "companyId": seeded.company_id,
                "employees": seeded.employees_seeded,
                "leaveRecords": seeded.leaves_seeded,
                "reset": reset,
            })),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

fn summary_message(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded for company {} ({} employees, {} leave records)",
        seeded.company_id, seeded.employees_seeded, seeded.leaves_seeded
    )
}
