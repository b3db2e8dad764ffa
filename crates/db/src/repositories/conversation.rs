use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::{sqlite::SqliteRow, Row};
use tokio::sync::Mutex;

use wagewiz_core::domain::company::CompanyId;
use wagewiz_core::domain::conversation::{
    next_turn_timestamp, ChatUser, Conversation, ConversationId, Turn, TurnBody, TurnId,
};

use super::{
    format_timestamp, new_record_id, parse_json_object, parse_timestamp, ConversationRepository,
    RepositoryError, TurnRepository,
};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn create(
        &self,
        company_id: &CompanyId,
        metadata: Map<String, Value>,
    ) -> Result<Conversation, RepositoryError> {
        let conversation = Conversation {
            id: ConversationId(new_record_id()),
            company_id: company_id.clone(),
            metadata,
            created_at: next_turn_timestamp(None, Utc::now()),
        };

        sqlx::query(
            "INSERT INTO conversation (id, company_id, metadata, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.company_id.0)
        .bind(Value::Object(conversation.metadata.clone()).to_string())
        .bind(format_timestamp(conversation.created_at))
        .execute(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_id, metadata, created_at FROM conversation WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn update_metadata(
        &self,
        id: &ConversationId,
        metadata: Map<String, Value>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE conversation SET metadata = ? WHERE id = ?")
            .bind(Value::Object(metadata).to_string())
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct SqlTurnRepository {
    pool: DbPool,
    // Serializes read-max-then-insert so timestamps stay strictly increasing.
    append_lock: Mutex<()>,
}

impl SqlTurnRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool, append_lock: Mutex::new(()) }
    }
}

#[async_trait::async_trait]
impl TurnRepository for SqlTurnRepository {
    async fn append(
        &self,
        conversation_id: &ConversationId,
        body: TurnBody,
    ) -> Result<Turn, RepositoryError> {
        let _guard = self.append_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> = sqlx::query_scalar(
            "SELECT MAX(created_at) FROM conversation_turn WHERE conversation_id = ?",
        )
        .bind(&conversation_id.0)
        .fetch_one(&mut *tx)
        .await?;
        let previous = previous.map(|value| parse_timestamp("created_at", value)).transpose()?;

        let turn = Turn {
            id: TurnId(new_record_id()),
            conversation_id: conversation_id.clone(),
            created_at: next_turn_timestamp(previous, Utc::now()),
            body,
        };

        sqlx::query(
            "INSERT INTO conversation_turn (id, conversation_id, chat_user, chat_text, meta, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&turn.id.0)
        .bind(&turn.conversation_id.0)
        .bind(turn.body.role().as_str())
        .bind(turn.body.chat_text())
        .bind(turn.body.meta().to_string())
        .bind(format_timestamp(turn.created_at))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(turn)
    }

    async fn list_for_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<Turn>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, conversation_id, chat_user, chat_text, meta, created_at
             FROM conversation_turn
             WHERE conversation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&conversation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(turn_from_row).collect()
    }
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    Ok(Conversation {
        id: ConversationId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        metadata: parse_json_object("metadata", row.try_get("metadata")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn turn_from_row(row: SqliteRow) -> Result<Turn, RepositoryError> {
    let chat_user_raw = row.try_get::<String, _>("chat_user")?;
    let chat_user = chat_user_raw
        .parse::<ChatUser>()
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;
    let meta = Value::Object(parse_json_object("meta", row.try_get("meta")?)?);
    let body = TurnBody::from_parts(chat_user, row.try_get("chat_text")?, Some(meta))
        .map_err(|error| RepositoryError::Decode(error.to_string()))?;

    Ok(Turn {
        id: TurnId(row.try_get("id")?),
        conversation_id: ConversationId(row.try_get("conversation_id")?),
        body,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
