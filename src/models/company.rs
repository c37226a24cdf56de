//! Company settings shown on invoices and passed into chat prompts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per user in `company_settings`.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct CompanySettings {
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub company_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub vat_number: Option<String>,
    pub vat_registered: bool,
    pub invoice_prefix: String,
    pub payment_terms_days: i32,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_INVOICE_PREFIX: &str = "INV";
pub const DEFAULT_PAYMENT_TERMS_DAYS: i32 = 30;

impl CompanySettings {
    /// Settings used before the user has saved any.
    pub fn defaults_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            company_name: None,
            address: None,
            phone: None,
            email: None,
            vat_number: None,
            vat_registered: false,
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            payment_terms_days: DEFAULT_PAYMENT_TERMS_DAYS,
            updated_at: Utc::now(),
        }
    }
}

/// Request body for `PUT /api/v1/company`.
#[derive(Debug, Deserialize)]
pub struct CompanySettingsRequest {
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub vat_number: Option<String>,
    #[serde(default)]
    pub vat_registered: bool,
    #[serde(default = "default_prefix")]
    pub invoice_prefix: String,
    #[serde(default = "default_terms")]
    pub payment_terms_days: i32,
}

fn default_prefix() -> String {
    DEFAULT_INVOICE_PREFIX.to_string()
}

fn default_terms() -> i32 {
    DEFAULT_PAYMENT_TERMS_DAYS
}

impl CompanySettingsRequest {
    pub fn validate(&self) -> Result<(), String> {
        let prefix = &self.invoice_prefix;
        if prefix.is_empty()
            || prefix.len() > 10
            || !prefix.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err("Invoice prefix must be 1-10 characters of A-Z or 0-9".to_string());
        }
        if !(0..=120).contains(&self.payment_terms_days) {
            return Err("Payment terms must be between 0 and 120 days".to_string());
        }
        if self.vat_registered && self.vat_number.as_deref().is_none_or(|v| v.trim().is_empty()) {
            return Err("A VAT number is required when VAT registered".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompanySettingsRequest {
        serde_json::from_value(serde_json::json!({ "company_name": "Mason Builders Ltd" })).unwrap()
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let request = request();
        assert_eq!(request.invoice_prefix, "INV");
        assert_eq!(request.payment_terms_days, 30);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn prefix_must_be_upper_alphanumeric() {
        for prefix in ["", "inv", "INV-", "ABCDEFGHIJK"] {
            let mut request = request();
            request.invoice_prefix = prefix.to_string();
            assert!(request.validate().is_err(), "{prefix}");
        }

        let mut request = request();
        request.invoice_prefix = "MB2025".to_string();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn vat_registration_requires_number() {
        let mut request = request();
        request.vat_registered = true;
        assert!(request.validate().is_err());

        request.vat_number = Some("GB123456789".to_string());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn payment_terms_are_bounded() {
        let mut request = request();
        request.payment_terms_days = 121;
        assert!(request.validate().is_err());
    }
}
