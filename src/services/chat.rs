//! Conversation storage for the dashboard chat.
//!
//! SYSTEM CONTEXT
//! ==============
//! The chat route admits the turn through the gate, then uses this module to
//! resolve or create the conversation, load its history, store the user turn,
//! and after the provider answers, store the reply and bump the counters.
//! Every query is scoped by `user_id`; a conversation owned by someone else
//! is indistinguishable from a missing one.

use serde::Serialize;
use sqlx::{PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::llm::types::{ChatMessage, Completion};

/// Longest conversation title, in characters, taken from the first message.
pub const TITLE_MAX_CHARS: usize = 100;
/// Size of the conversation list page.
pub const LIST_LIMIT: i64 = 50;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("conversation not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub model: String,
    pub message_count: i64,
    pub total_tokens: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: Uuid,
    pub role: String,
    pub content: String,
    pub model: Option<String>,
    pub tokens_prompt: Option<i64>,
    pub tokens_completion: Option<i64>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    pub conversation: ConversationSummary,
    pub messages: Vec<StoredMessage>,
}

/// Title for a new conversation: the first message, cut at a char boundary.
#[must_use]
pub fn conversation_title(first_message: &str) -> String {
    first_message.chars().take(TITLE_MAX_CHARS).collect()
}

fn summary_from_row(r: &sqlx::postgres::PgRow) -> ConversationSummary {
    ConversationSummary {
        id: r.get("id"),
        title: r.get("title"),
        model: r.get("model"),
        message_count: r.get("message_count"),
        total_tokens: r.get("total_tokens"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

// =============================================================================
// CHAT TURN
// =============================================================================

/// Return `existing` if the user owns it, otherwise create a conversation
/// titled after `first_message`.
pub async fn resolve_conversation(
    pool: &PgPool,
    user_id: Uuid,
    existing: Option<Uuid>,
    model: &str,
    first_message: &str,
) -> Result<Uuid, ChatError> {
    if let Some(id) = existing {
        let owned = sqlx::query("SELECT id FROM conversations WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        return owned.map(|_| id).ok_or(ChatError::NotFound(id));
    }

    let row = sqlx::query("INSERT INTO conversations (user_id, title, model) VALUES ($1, $2, $3) RETURNING id")
        .bind(user_id)
        .bind(conversation_title(first_message))
        .bind(model)
        .fetch_one(pool)
        .await?;
    Ok(row.get("id"))
}

/// Prior turns in creation order, ready to send to a provider.
pub async fn load_history(pool: &PgPool, conversation_id: Uuid) -> Result<Vec<ChatMessage>, ChatError> {
    let rows = sqlx::query(
        "SELECT role, content FROM conversation_messages WHERE conversation_id = $1 ORDER BY created_at ASC",
    )
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| ChatMessage { role: r.get("role"), content: r.get("content") })
        .collect())
}

pub async fn store_user_message(pool: &PgPool, conversation_id: Uuid, content: &str) -> Result<(), ChatError> {
    sqlx::query("INSERT INTO conversation_messages (conversation_id, role, content) VALUES ($1, 'user', $2)")
        .bind(conversation_id)
        .bind(content)
        .execute(pool)
        .await?;
    Ok(())
}

/// Store the assistant reply and account for both turns of the exchange.
pub async fn store_reply(
    pool: &PgPool,
    conversation_id: Uuid,
    model: &str,
    reply: &Completion,
) -> Result<(), ChatError> {
    let tokens_prompt = i64::try_from(reply.tokens_prompt).unwrap_or(i64::MAX);
    let tokens_completion = i64::try_from(reply.tokens_completion).unwrap_or(i64::MAX);
    let tokens_total = i64::try_from(reply.tokens_total()).unwrap_or(i64::MAX);

    let mut tx = pool.begin().await?;
    sqlx::query(
        r"INSERT INTO conversation_messages
              (conversation_id, role, content, model, tokens_prompt, tokens_completion)
          VALUES ($1, 'assistant', $2, $3, $4, $5)",
    )
    .bind(conversation_id)
    .bind(&reply.text)
    .bind(model)
    .bind(tokens_prompt)
    .bind(tokens_completion)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        r"UPDATE conversations
          SET message_count = message_count + 2, total_tokens = total_tokens + $2, updated_at = now()
          WHERE id = $1",
    )
    .bind(conversation_id)
    .bind(tokens_total)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// BROWSING
// =============================================================================

pub async fn list_conversations(pool: &PgPool, user_id: Uuid) -> Result<Vec<ConversationSummary>, ChatError> {
    let rows = sqlx::query(
        r"SELECT id, title, model, message_count, total_tokens, created_at, updated_at
          FROM conversations
          WHERE user_id = $1
          ORDER BY updated_at DESC
          LIMIT $2",
    )
    .bind(user_id)
    .bind(LIST_LIMIT)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(summary_from_row).collect())
}

pub async fn get_conversation(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<ConversationDetail, ChatError> {
    let row = sqlx::query(
        r"SELECT id, title, model, message_count, total_tokens, created_at, updated_at
          FROM conversations
          WHERE id = $1 AND user_id = $2",
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(ChatError::NotFound(id))?;

    let messages = sqlx::query(
        r"SELECT id, role, content, model, tokens_prompt, tokens_completion, created_at
          FROM conversation_messages
          WHERE conversation_id = $1
          ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|r| StoredMessage {
        id: r.get("id"),
        role: r.get("role"),
        content: r.get("content"),
        model: r.get("model"),
        tokens_prompt: r.get("tokens_prompt"),
        tokens_completion: r.get("tokens_completion"),
        created_at: r.get("created_at"),
    })
    .collect();

    Ok(ConversationDetail { conversation: summary_from_row(&row), messages })
}

pub async fn delete_conversation(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<(), ChatError> {
    let deleted = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2 RETURNING id")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    if deleted.is_none() {
        return Err(ChatError::NotFound(id));
    }
    Ok(())
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
