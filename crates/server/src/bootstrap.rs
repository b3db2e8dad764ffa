use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use wagewiz_agent::events::EventPublisher;
use wagewiz_agent::{
    BroadcastEventBus, ContextBuilder, LlmClient, LlmError, OpenAiCompatibleClient, Orchestrator,
    ToolRegistry,
};
use wagewiz_core::config::{AppConfig, ConfigError, LoadOptions};
use wagewiz_db::repositories::{
    SqlCompanyRepository, SqlConversationRepository, SqlEmployeeRepository, SqlLeaveRepository,
    SqlTurnRepository,
};
use wagewiz_db::{connect_with_settings, migrations, DbPool};

use crate::routes::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client setup failed: {0}")]
    Llm(#[from] LlmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        llm_model = %config.llm.model,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = Arc::new(OpenAiCompatibleClient::from_config(&config.llm)?);
    let events = Arc::new(BroadcastEventBus::from_config(&config.events));
    info!(
        event_name = "system.bootstrap.events_ready",
        correlation_id = "bootstrap",
        channel = %events.channel_name(),
        capacity = config.events.capacity,
        "event bus initialized"
    );

    let state = build_state(db_pool.clone(), llm, events);
    Ok(Application { config, db_pool, state })
}

/// Wires SQL repositories, the capability registry and the orchestrator.
pub fn build_state(
    db_pool: DbPool,
    llm: Arc<dyn LlmClient>,
    events: Arc<dyn EventPublisher>,
) -> ApiState {
    let companies = Arc::new(SqlCompanyRepository::new(db_pool.clone()));
    let conversations = Arc::new(SqlConversationRepository::new(db_pool.clone()));
    let turns = Arc::new(SqlTurnRepository::new(db_pool.clone()));
    let employees = Arc::new(SqlEmployeeRepository::new(db_pool.clone()));
    let leaves = Arc::new(SqlLeaveRepository::new(db_pool));

    let context = ContextBuilder::new(conversations.clone(), companies.clone(), turns.clone());
    let registry = ToolRegistry::new(employees, leaves);
    let orchestrator = Orchestrator::new(
        conversations.clone(),
        turns.clone(),
        context,
        registry,
        llm,
        events.clone(),
    );

    ApiState {
        orchestrator: Arc::new(orchestrator),
        companies,
        conversations,
        turns,
        events,
    }
}

#[cfg(test)]
mod tests {
    use wagewiz_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_openai_api_key() {
        std::env::remove_var("WAGEWIZ_LLM_API_KEY");
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_provider: Some(LlmProvider::OpenAi),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let message = result.err().expect("bootstrap should fail").to_string();
        assert!(message.contains("llm.api_key"), "{message}");
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_state() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with defaults");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('company', 'employee', 'leave_record', 'conversation', 'conversation_turn')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema query");
        assert_eq!(table_count, 5);
        assert_eq!(app.config.events.channel_name, "ww_events");

        app.db_pool.close().await;
    }
}
