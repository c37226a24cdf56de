//! Job data models and API request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job (piece of building work) tracked by a user.
///
/// Maps to the `jobs` table. `quote_pence` is stored in pence to avoid
/// floating-point rounding.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Job {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub title: String,
    pub client_name: Option<String>,
    pub site_address: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub quote_pence: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const JOB_STATUSES: [&str; 4] = ["quoted", "in_progress", "completed", "cancelled"];

/// Request body for creating or replacing a job.
#[derive(Debug, Deserialize)]
pub struct JobRequest {
    pub title: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub site_address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub quote_pence: i64,
}

fn default_status() -> String {
    "quoted".to_string()
}

impl JobRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Job title is required".to_string());
        }
        if self.title.len() > 200 {
            return Err("Job title must be 200 characters or fewer".to_string());
        }
        if !JOB_STATUSES.contains(&self.status.as_str()) {
            return Err(format!(
                "Job status must be one of: {}",
                JOB_STATUSES.join(", ")
            ));
        }
        if self.quote_pence < 0 {
            return Err("Quote cannot be negative".to_string());
        }
        Ok(())
    }
}

impl Job {
    /// Render this job as a context block for the completion prompt.
    pub fn context_block(&self) -> String {
        let mut lines = vec![format!("Job: {}", self.title)];

        if let Some(client) = &self.client_name {
            lines.push(format!("Client: {client}"));
        }
        if let Some(site) = &self.site_address {
            lines.push(format!("Site: {site}"));
        }
        lines.push(format!("Status: {}", self.status.replace('_', " ")));
        if self.quote_pence > 0 {
            lines.push(format!("Quoted: {}", format_pounds(self.quote_pence)));
        }
        if let Some(description) = &self.description {
            lines.push(format!("Details: {description}"));
        }

        lines.join("\n")
    }
}

/// Format pence as pounds, e.g. `123456` → `£1,234.56`.
pub fn format_pounds(pence: i64) -> String {
    let sign = if pence < 0 { "-" } else { "" };
    let pence = pence.unsigned_abs();
    let pounds = (pence / 100).to_string();

    let mut grouped = String::new();
    for (i, ch) in pounds.chars().enumerate() {
        if i > 0 && (pounds.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("{sign}£{grouped}.{:02}", pence % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> JobRequest {
        JobRequest {
            title: "Kitchen extension".to_string(),
            client_name: None,
            site_address: None,
            description: None,
            status: "quoted".to_string(),
            quote_pence: 0,
        }
    }

    #[test]
    fn validates_status_and_quote() {
        assert!(request().validate().is_ok());

        let mut bad_status = request();
        bad_status.status = "done".to_string();
        assert!(bad_status.validate().is_err());

        let mut negative = request();
        negative.quote_pence = -1;
        assert!(negative.validate().is_err());

        let mut blank = request();
        blank.title = "   ".to_string();
        assert!(blank.validate().is_err());
    }

    #[test]
    fn formats_pounds_with_grouping() {
        assert_eq!(format_pounds(0), "£0.00");
        assert_eq!(format_pounds(5), "£0.05");
        assert_eq!(format_pounds(123456), "£1,234.56");
        assert_eq!(format_pounds(100000000), "£1,000,000.00");
        assert_eq!(format_pounds(-250), "-£2.50");
    }

    #[test]
    fn context_block_skips_missing_fields() {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Loft conversion".to_string(),
            client_name: Some("Mrs Patel".to_string()),
            site_address: None,
            description: Some("Dormer, new stairs".to_string()),
            status: "in_progress".to_string(),
            quote_pence: 2_450_000,
            created_at: now,
            updated_at: now,
        };

        let block = job.context_block();
        assert!(block.starts_with("Job: Loft conversion"));
        assert!(block.contains("Client: Mrs Patel"));
        assert!(!block.contains("Site:"));
        assert!(block.contains("Status: in progress"));
        assert!(block.contains("Quoted: £24,500.00"));
        assert!(block.contains("Details: Dormer, new stairs"));
    }
}
