//! Application configuration management.
//!
//! Configuration is loaded from environment variables with the `envy` crate,
//! after an optional `.env` file has been applied by `dotenvy`.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SESSION_SECRET` (required): HMAC key used to sign session tokens
/// - `SERVER_PORT`: HTTP server port, defaults to 3000
/// - `APP_BASE_URL`: public URL of the web client, used in emails and redirects
/// - `STRIPE_*`: billing provider credentials and price ids (optional at boot)
/// - `LLM_*`: completion API credentials and model (optional at boot)
/// - `SMTP_*`: outbound mail; when `SMTP_HOST` is unset mail goes to `EMAIL_DIR`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,

    // Sessions
    pub session_secret: String,

    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,

    #[serde(default = "default_cookie_name")]
    pub session_cookie_name: String,

    #[serde(default = "default_true")]
    pub session_cookie_secure: bool,

    #[serde(default = "default_magic_link_ttl_minutes")]
    pub magic_link_ttl_minutes: i64,

    // Billing
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_starter: Option<String>,
    pub stripe_price_pro: Option<String>,
    pub stripe_price_team: Option<String>,

    // Completion API
    pub llm_api_key: Option<String>,

    #[serde(default = "default_llm_api_base")]
    pub llm_api_base: String,

    #[serde(default = "default_llm_model")]
    pub llm_model: String,

    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,

    #[serde(default = "default_chat_history_limit")]
    pub chat_history_limit: usize,

    // Email
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,

    #[serde(default = "default_mail_from")]
    pub mail_from: String,

    #[serde(default = "default_email_dir")]
    pub email_dir: String,
}

fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_app_base_url() -> String {
    "http://localhost:5173".to_string()
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_cookie_name() -> String {
    "buildmate_session".to_string()
}

fn default_true() -> bool {
    true
}

fn default_magic_link_ttl_minutes() -> i64 {
    15
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_llm_max_tokens() -> u32 {
    1024
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_chat_history_limit() -> usize {
    20
}

fn default_smtp_port() -> u16 {
    587
}

fn default_mail_from() -> String {
    "Buildmate <no-reply@buildmate.local>".to_string()
}

fn default_email_dir() -> String {
    "./emails".to_string()
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Loads `.env` first if present, then deserializes the process
    /// environment. Field names map to upper-case variables
    /// (`session_secret` -> `SESSION_SECRET`).
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();

        envy::from_env::<Config>()
    }

    /// Build a configuration from an explicit set of key/value pairs.
    ///
    /// Used by tests so they do not depend on the process environment.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::from_pairs([
        ("DATABASE_URL".to_string(), "postgres://localhost/buildmate_test".to_string()),
        ("SESSION_SECRET".to_string(), "test-session-secret".to_string()),
        ("SESSION_COOKIE_SECURE".to_string(), "false".to_string()),
    ])
    .expect("test config is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config = test_config();

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.session_ttl_hours, 168);
        assert_eq!(config.magic_link_ttl_minutes, 15);
        assert_eq!(config.chat_history_limit, 20);
        assert!(config.stripe_secret_key.is_none());
        assert!(!config.session_cookie_secure);
    }

    #[test]
    fn missing_session_secret_is_rejected() {
        let result = Config::from_pairs([(
            "DATABASE_URL".to_string(),
            "postgres://localhost/buildmate".to_string(),
        )]);

        assert!(result.is_err());
    }
}
