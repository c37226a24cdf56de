//! Chat HTTP handler.

use axum::{Extension, Json, extract::State};

use crate::{
    app::AppState,
    error::AppError,
    extract::AppJson,
    middleware::auth::AuthContext,
    models::{
        conversation::{ChatRequest, ChatResponse},
        plan::Feature,
    },
    services::chat_service,
};

/// Send a message to the assistant.
///
/// # Endpoint
///
/// `POST /api/v1/chat`
///
/// # Request Body
///
/// ```json
/// {
///   "message": "How many bricks for a 10m2 wall?",
///   "conversation_id": "…",   // optional, continue a conversation
///   "job_id": "…",            // optional, Pro and above
///   "history": [ … ]          // optional, Pro and above
/// }
/// ```
///
/// # Response
///
/// - **Success (200 OK)**: `{ "conversation_id": "…", "message": { … } }`
/// - **Error (400)**: empty or overlong message
/// - **Error (402)**: no entitled subscription
/// - **Error (404)**: conversation or job not owned by the user
/// - **Error (500)**: the completion API failed; nothing was stored
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    auth.require(Feature::Chat)?;

    let response = chat_service::send_message(
        &state.pool,
        &state.completion,
        state.config.chat_history_limit,
        &auth.user,
        &auth.entitlement.features,
        request,
    )
    .await?;

    Ok(Json(response))
}
