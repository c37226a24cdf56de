//! Chat with the building assistant.
//!
//! Every request passes through the tier gate before any context is loaded:
//! history and job context are removed for plans that do not include them,
//! whatever the client sent.

use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        conversation::{ChatRequest, ChatResponse, ChatRole, ChatTurn, Conversation, Message, conversation_title},
        job::Job,
        plan::PlanFeatures,
        user::User,
    },
    services::completion_client::{CompletionClient, PromptMessage},
};

/// Remove what the plan does not pay for.
///
/// Below Pro the client's `history` and `job_id` are dropped entirely.
pub fn gate_chat_request(features: &PlanFeatures, mut request: ChatRequest) -> ChatRequest {
    if !features.history {
        request.history.clear();
    }
    if !features.job_context {
        request.job_id = None;
    }
    request
}

/// Keep the most recent `limit` turns, oldest first.
pub fn truncate_history(mut history: Vec<ChatTurn>, limit: usize) -> Vec<ChatTurn> {
    if history.len() > limit {
        history.drain(..history.len() - limit);
    }
    history
}

pub fn system_prompt(company_name: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are Buildmate, an assistant for UK builders and trades. \
         Give practical, concise answers about quoting, materials, scheduling, \
         UK building regulations and running a small building business. \
         Use pounds sterling and metric units.",
    );

    if let Some(name) = company_name.map(str::trim).filter(|n| !n.is_empty()) {
        prompt.push_str(&format!(" You are working for {name}."));
    }

    prompt
}

/// Everything loaded for one completion besides the new message.
#[derive(Debug, Default)]
pub struct ChatContext {
    pub company_name: Option<String>,
    pub job: Option<Job>,
    pub history: Vec<ChatTurn>,
}

/// Order: system prompt, job context, history, then the new user message.
pub fn compose_messages(context: &ChatContext, message: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(context.history.len() + 3);

    messages.push(PromptMessage::system(system_prompt(context.company_name.as_deref())));

    if let Some(job) = &context.job {
        messages.push(PromptMessage::system(format!(
            "The user is asking about this job:\n{}",
            job.context_block()
        )));
    }

    for turn in &context.history {
        messages.push(match turn.role {
            ChatRole::User => PromptMessage::user(turn.content.clone()),
            ChatRole::Assistant => PromptMessage::assistant(turn.content.clone()),
        });
    }

    messages.push(PromptMessage::user(message.trim()));
    messages
}

/// Where the prompt's history is read from.
#[derive(Debug, PartialEq, Eq)]
pub enum HistorySource {
    None,
    /// The conversation's stored messages.
    Stored(Uuid),
    /// Turns the client sent, already truncated.
    Client(Vec<ChatTurn>),
}

/// What to load before calling the completion API.
#[derive(Debug, PartialEq, Eq)]
pub struct ContextSources {
    pub history: HistorySource,
    pub job_id: Option<Uuid>,
}

/// Decide the history and job context for one message.
///
/// For an existing conversation the stored messages replace any client
/// history, and the conversation's job is used when the request names none.
/// Neither applies unless the plan includes it, so a conversation created on
/// Pro loses both after a downgrade.
pub fn context_sources(
    features: &PlanFeatures,
    existing: Option<&Conversation>,
    job_id: Option<Uuid>,
    client_history: Vec<ChatTurn>,
    history_limit: usize,
) -> ContextSources {
    let history = match existing {
        _ if !features.history => HistorySource::None,
        Some(conversation) => HistorySource::Stored(conversation.id),
        None => HistorySource::Client(truncate_history(client_history, history_limit)),
    };

    let job_id = if features.job_context {
        job_id.or(existing.and_then(|c| c.job_id))
    } else {
        None
    };

    ContextSources { history, job_id }
}

async fn find_owned_conversation(
    pool: &DbPool,
    user_id: Uuid,
    conversation_id: Uuid,
) -> Result<Conversation, AppError> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_id, title, job_id, created_at, updated_at
        FROM conversations
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(conversation_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Conversation"))
}

/// Most recent `limit` stored messages, oldest first.
async fn stored_history(
    pool: &DbPool,
    conversation_id: Uuid,
    limit: usize,
) -> Result<Vec<ChatTurn>, AppError> {
    let mut messages = sqlx::query_as::<_, Message>(
        r#"
        SELECT id, conversation_id, role, content, created_at
        FROM messages
        WHERE conversation_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2
        "#,
    )
    .bind(conversation_id)
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await?;

    messages.reverse();
    Ok(messages.into_iter().map(ChatTurn::from).collect())
}

/// Send a chat message and persist the exchange.
///
/// # Process
///
/// 1. Gate the request by plan
/// 2. Resolve the conversation (a supplied id must be owned, otherwise 404)
/// 3. Load history and job context the plan allows
/// 4. Call the completion API
/// 5. In one transaction: create the conversation if new, store both
///    messages, bump `updated_at`
///
/// If the completion call fails nothing is written.
pub async fn send_message(
    pool: &DbPool,
    completion: &CompletionClient,
    history_limit: usize,
    user: &User,
    features: &PlanFeatures,
    request: ChatRequest,
) -> Result<ChatResponse, AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;
    let mut request = gate_chat_request(features, request);

    let existing = match request.conversation_id {
        Some(id) => Some(find_owned_conversation(pool, user.id, id).await?),
        None => None,
    };

    let sources = context_sources(
        features,
        existing.as_ref(),
        request.job_id,
        std::mem::take(&mut request.history),
        history_limit,
    );

    let history = match sources.history {
        HistorySource::None => Vec::new(),
        HistorySource::Stored(conversation_id) => stored_history(pool, conversation_id, history_limit).await?,
        HistorySource::Client(turns) => turns,
    };

    let job = match sources.job_id {
        Some(job_id) => Some(
            sqlx::query_as::<_, Job>(
                r#"
                SELECT id, user_id, title, client_name, site_address, description, status,
                       quote_pence, created_at, updated_at
                FROM jobs
                WHERE id = $1 AND user_id = $2
                "#,
            )
            .bind(job_id)
            .bind(user.id)
            .fetch_optional(pool)
            .await?
            .ok_or(AppError::NotFound("Job"))?,
        ),
        None => None,
    };

    let company_name: Option<String> =
        sqlx::query_scalar("SELECT company_name FROM company_settings WHERE user_id = $1")
            .bind(user.id)
            .fetch_optional(pool)
            .await?
            .flatten();

    let context = ChatContext {
        company_name,
        job,
        history,
    };
    let prompt = completion.request(compose_messages(&context, &request.message));

    let reply = completion.complete(&prompt).await.map_err(|e| {
        tracing::error!("Completion failed for user {}: {}", user.id, e);
        AppError::from(e)
    })?;

    let mut tx = pool.begin().await?;

    let conversation_id = match existing {
        Some(conversation) => conversation.id,
        None => {
            sqlx::query_scalar::<_, Uuid>(
                "INSERT INTO conversations (user_id, title, job_id) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(user.id)
            .bind(conversation_title(&request.message))
            .bind(context.job.as_ref().map(|j| j.id))
            .fetch_one(&mut *tx)
            .await?
        }
    };

    sqlx::query("INSERT INTO messages (conversation_id, role, content) VALUES ($1, $2, $3)")
        .bind(conversation_id)
        .bind(ChatRole::User.as_str())
        .bind(request.message.trim())
        .execute(&mut *tx)
        .await?;

    // Stamped after the user message so ordering by created_at is stable.
    let message = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (conversation_id, role, content, created_at)
        VALUES ($1, $2, $3, clock_timestamp())
        RETURNING id, conversation_id, role, content, created_at
        "#,
    )
    .bind(conversation_id)
    .bind(ChatRole::Assistant.as_str())
    .bind(&reply)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
        .bind(conversation_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(ChatResponse {
        conversation_id,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::Plan;
    use chrono::Utc;

    fn turn(role: ChatRole, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
        }
    }

    fn request_with_everything() -> ChatRequest {
        ChatRequest {
            message: "What should I charge for the extension?".to_string(),
            conversation_id: None,
            job_id: Some(Uuid::new_v4()),
            history: vec![
                turn(ChatRole::User, "SECRET-HISTORY-QUESTION"),
                turn(ChatRole::Assistant, "SECRET-HISTORY-ANSWER"),
            ],
        }
    }

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Kitchen extension".to_string(),
            client_name: Some("Mrs Patel".to_string()),
            site_address: None,
            description: None,
            status: "quoted".to_string(),
            quote_pence: 2_500_000,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn starter_gate_strips_history_and_job() {
        let gated = gate_chat_request(&Plan::Starter.features(), request_with_everything());

        assert!(gated.history.is_empty());
        assert!(gated.job_id.is_none());
        assert_eq!(gated.message, "What should I charge for the extension?");
    }

    #[test]
    fn unentitled_user_gets_nothing_extra() {
        let features = PlanFeatures::default();
        let gated = gate_chat_request(&features, request_with_everything());

        assert!(gated.history.is_empty());
        assert!(gated.job_id.is_none());
    }

    #[test]
    fn pro_gate_keeps_history_and_job() {
        let gated = gate_chat_request(&Plan::Pro.features(), request_with_everything());

        assert_eq!(gated.history.len(), 2);
        assert!(gated.job_id.is_some());
    }

    #[test]
    fn starter_payload_contains_no_client_history() {
        let gated = gate_chat_request(&Plan::Starter.features(), request_with_everything());
        let context = ChatContext {
            company_name: None,
            job: None,
            history: gated.history,
        };

        let messages = compose_messages(&context, &gated.message);
        let payload = serde_json::to_string(&messages).unwrap();

        assert_eq!(messages.len(), 2);
        assert!(!payload.contains("SECRET-HISTORY"));
        assert!(!payload.contains("The user is asking about this job"));
    }

    #[test]
    fn messages_are_ordered_system_job_history_user() {
        let context = ChatContext {
            company_name: Some("Mason Builders Ltd".to_string()),
            job: Some(job()),
            history: vec![
                turn(ChatRole::User, "first"),
                turn(ChatRole::Assistant, "second"),
            ],
        };

        let messages = compose_messages(&context, "  third  ");
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();

        assert_eq!(roles, ["system", "system", "user", "assistant", "user"]);
        assert!(messages[0].content.contains("Mason Builders Ltd"));
        assert!(messages[1].content.contains("Job: Kitchen extension"));
        assert!(messages[1].content.contains("£25,000.00"));
        assert_eq!(messages[4].content, "third");
    }

    #[test]
    fn history_keeps_the_most_recent_turns() {
        let history: Vec<ChatTurn> = (0..30)
            .map(|i| turn(ChatRole::User, &i.to_string()))
            .collect();

        let kept = truncate_history(history, 20);

        assert_eq!(kept.len(), 20);
        assert_eq!(kept[0].content, "10");
        assert_eq!(kept[19].content, "29");
        assert_eq!(truncate_history(vec![turn(ChatRole::User, "a")], 20).len(), 1);
    }

    fn conversation(job_id: Option<Uuid>) -> Conversation {
        let now = Utc::now();
        Conversation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Roof quote".to_string(),
            job_id,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn starter_follow_up_skips_stored_history() {
        let existing = conversation(None);
        let client_history = request_with_everything().history;

        let sources = context_sources(&Plan::Starter.features(), Some(&existing), None, client_history, 20);

        assert_eq!(sources.history, HistorySource::None);
        assert_eq!(sources.job_id, None);
    }

    #[test]
    fn pro_follow_up_reads_stored_history_and_inherits_job() {
        let job_id = Uuid::new_v4();
        let existing = conversation(Some(job_id));
        let client_history = request_with_everything().history;

        let sources = context_sources(&Plan::Pro.features(), Some(&existing), None, client_history, 20);

        assert_eq!(sources.history, HistorySource::Stored(existing.id));
        assert_eq!(sources.job_id, Some(job_id));
    }

    #[test]
    fn downgraded_user_loses_the_conversation_job() {
        let existing = conversation(Some(Uuid::new_v4()));

        let sources = context_sources(&Plan::Starter.features(), Some(&existing), None, Vec::new(), 20);

        assert_eq!(sources.job_id, None);
    }

    #[test]
    fn requested_job_overrides_the_conversation_job() {
        let requested = Uuid::new_v4();
        let existing = conversation(Some(Uuid::new_v4()));

        let sources = context_sources(&Plan::Pro.features(), Some(&existing), Some(requested), Vec::new(), 20);

        assert_eq!(sources.job_id, Some(requested));
    }

    #[test]
    fn new_conversation_uses_truncated_client_history() {
        let history: Vec<ChatTurn> = (0..5).map(|i| turn(ChatRole::User, &i.to_string())).collect();

        let sources = context_sources(&Plan::Pro.features(), None, None, history, 2);

        assert_eq!(
            sources.history,
            HistorySource::Client(vec![turn(ChatRole::User, "3"), turn(ChatRole::User, "4")])
        );
    }

    #[test]
    fn blank_company_name_is_ignored() {
        assert!(!system_prompt(Some("  ")).contains("working for"));
        assert!(system_prompt(Some("Acme")).ends_with("You are working for Acme."));
    }
}
