//! Conversation history HTTP handlers.
//!
//! - GET /api/v1/conversations - Own and shared conversations
//! - GET /api/v1/conversations/{id} - One conversation with its messages
//! - DELETE /api/v1/conversations/{id} - Delete (owner only)
//! - POST /api/v1/conversations/{id}/share - Share with another user (Team)
//!
//! Listing and reading require the history feature. A conversation is
//! visible to its owner and to users it has been shared with; anyone else
//! gets 404.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    db::{DbPool, unique_violation},
    error::AppError,
    extract::{AppJson, AppPath},
    middleware::auth::AuthContext,
    models::{
        conversation::{Conversation, ConversationDetail, ConversationSummary, Message, ShareRequest},
        plan::Feature,
        user::normalize_email,
    },
};

pub async fn list_conversations(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<ConversationSummary>>, AppError> {
    auth.require(Feature::History)?;

    let conversations = sqlx::query_as::<_, ConversationSummary>(
        r#"
        SELECT c.id, c.title, c.job_id, (c.user_id <> $1) AS shared, c.updated_at
        FROM conversations c
        WHERE c.user_id = $1
           OR EXISTS (
               SELECT 1 FROM conversation_shares s
               WHERE s.conversation_id = c.id AND s.user_id = $1
           )
        ORDER BY c.updated_at DESC
        "#,
    )
    .bind(auth.user_id())
    .fetch_all(&pool)
    .await?;

    Ok(Json(conversations))
}

/// Get a conversation the user owns or has been shared.
///
/// Messages are returned oldest first.
pub async fn get_conversation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(conversation_id): AppPath<Uuid>,
) -> Result<Json<ConversationDetail>, AppError> {
    auth.require(Feature::History)?;

    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        SELECT c.id, c.user_id, c.title, c.job_id, c.created_at, c.updated_at
        FROM conversations c
        WHERE c.id = $1
          AND (
              c.user_id = $2
              OR EXISTS (
                  SELECT 1 FROM conversation_shares s
                  WHERE s.conversation_id = c.id AND s.user_id = $2
              )
          )
        "#,
    )
    .bind(conversation_id)
    .bind(auth.user_id())
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Conversation"))?;

    let messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(conversation.id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(ConversationDetail {
        shared: conversation.user_id != auth.user_id(),
        conversation,
        messages,
    }))
}

/// Delete a conversation and its messages. Only the owner may delete.
pub async fn delete_conversation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(conversation_id): AppPath<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = sqlx::query("DELETE FROM conversations WHERE id = $1 AND user_id = $2")
        .bind(conversation_id)
        .bind(auth.user_id())
        .execute(&pool)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("Conversation"));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Share a conversation with another registered user.
///
/// # Response
///
/// - **Success (201 Created)**
/// - **Error (400)**: sharing with yourself
/// - **Error (402)**: plan does not include sharing
/// - **Error (404)**: conversation not owned, or no user with that email
/// - **Error (409)**: already shared with that user
pub async fn share_conversation(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(conversation_id): AppPath<Uuid>,
    AppJson(request): AppJson<ShareRequest>,
) -> Result<StatusCode, AppError> {
    auth.require(Feature::Sharing)?;

    let email = normalize_email(&request.email)
        .ok_or_else(|| AppError::InvalidRequest("A valid email address is required".to_string()))?;

    let owned: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM conversations WHERE id = $1 AND user_id = $2)",
    )
    .bind(conversation_id)
    .bind(auth.user_id())
    .fetch_one(&pool)
    .await?;
    if !owned {
        return Err(AppError::NotFound("Conversation"));
    }

    let recipient: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    if recipient == auth.user_id() {
        return Err(AppError::InvalidRequest(
            "You cannot share a conversation with yourself".to_string(),
        ));
    }

    sqlx::query("INSERT INTO conversation_shares (conversation_id, user_id) VALUES ($1, $2)")
        .bind(conversation_id)
        .bind(recipient)
        .execute(&pool)
        .await
        .map_err(|e| match unique_violation(&e) {
            Some(_) => AppError::Conflict("Conversation is already shared with this user".to_string()),
            None => AppError::Database(e),
        })?;

    tracing::info!(
        "User {} shared conversation {} with {}",
        auth.user_id(),
        conversation_id,
        recipient
    );
    Ok(StatusCode::CREATED)
}
