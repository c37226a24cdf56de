//! Outbound email: magic links and invoices.
//!
//! Uses SMTP (STARTTLS) when `SMTP_HOST` is configured, otherwise writes
//! each message as an `.eml` file under `EMAIL_DIR` for local development.

use lettre::{
    Address, AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use std::path::Path;

use crate::{
    config::Config,
    error::AppError,
    models::{
        company::CompanySettings,
        invoice::Invoice,
        job::format_pounds,
    },
};

pub struct EmailService {
    transport: EmailTransport,
    from: Mailbox,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let from = config
            .mail_from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("parse MAIL_FROM: {e}")))?;

        let transport = match &config.smtp_host {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                    .map_err(|e| AppError::Internal(format!("create SMTP transport: {e}")))?
                    .port(config.smtp_port);

                if let (Some(username), Some(password)) = (&config.smtp_username, &config.smtp_password) {
                    builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
                }

                EmailTransport::Smtp(builder.build())
            }
            None => {
                let dir = Path::new(&config.email_dir);
                if !dir.exists() {
                    std::fs::create_dir_all(dir)
                        .map_err(|e| AppError::Internal(format!("create email directory: {e}")))?;
                }
                tracing::warn!("SMTP_HOST not set, writing emails to {}", config.email_dir);
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(dir))
            }
        };

        Ok(Self { transport, from })
    }

    pub async fn send_magic_link(&self, to_email: &str, link: &str, ttl_minutes: i64) -> Result<(), AppError> {
        let body = magic_link_body(link, ttl_minutes);
        self.send(to_email, None, "Your Buildmate sign-in link", body).await
    }

    pub async fn send_invoice(
        &self,
        to_email: &str,
        invoice: &Invoice,
        company: &CompanySettings,
    ) -> Result<(), AppError> {
        let sender = company.company_name.as_deref().unwrap_or("Your builder");
        let subject = format!("Invoice {} from {}", invoice.number, sender);
        let body = invoice_body(invoice, company);

        self.send(to_email, Some(&invoice.client_name), &subject, body).await
    }

    async fn send(&self, to_email: &str, to_name: Option<&str>, subject: &str, body: String) -> Result<(), AppError> {
        // Client names may contain `,` `&` or `(`; lettre quotes the display name.
        let address = to_email
            .parse::<Address>()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid recipient address: {e}")))?;
        let to = Mailbox::new(to_name.map(str::to_string), address);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Email(format!("build message: {e}")))?;

        match &self.transport {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message)
                    .await
                    .map_err(|e| AppError::Email(format!("SMTP send: {e}")))?;
            }
            EmailTransport::File(file) => {
                file.send(message)
                    .await
                    .map_err(|e| AppError::Email(format!("file send: {e}")))?;
            }
        }

        tracing::info!("Sent \"{}\" to {}", subject, to_email);
        Ok(())
    }
}

fn magic_link_body(link: &str, ttl_minutes: i64) -> String {
    format!(
        "Hello,\n\n\
         Use the link below to sign in to Buildmate:\n\n\
         {link}\n\n\
         The link works once and expires in {ttl_minutes} minutes.\n\
         If you didn't ask for it, you can ignore this email.\n"
    )
}

fn invoice_body(invoice: &Invoice, company: &CompanySettings) -> String {
    let mut body = format!("Dear {},\n\nPlease find invoice {} below.\n\n", invoice.client_name, invoice.number);

    for item in invoice.line_items.iter() {
        body.push_str(&format!(
            "  {} x {} @ {} = {}\n",
            item.quantity,
            item.description,
            format_pounds(item.unit_price_pence),
            format_pounds(item.quantity.saturating_mul(item.unit_price_pence)),
        ));
    }

    body.push_str(&format!("\nSubtotal: {}\n", format_pounds(invoice.subtotal_pence)));
    if invoice.vat_rate_bps > 0 {
        body.push_str(&format!(
            "VAT ({}%): {}\n",
            f64::from(invoice.vat_rate_bps) / 100.0,
            format_pounds(invoice.vat_pence)
        ));
    }
    body.push_str(&format!("Total due: {}\n", format_pounds(invoice.total_pence)));
    body.push_str(&format!("Due by: {}\n", invoice.due_date.format("%d/%m/%Y")));

    body.push('\n');
    if let Some(name) = &company.company_name {
        body.push_str(&format!("{name}\n"));
    }
    if let Some(address) = &company.address {
        body.push_str(&format!("{address}\n"));
    }
    if let Some(vat_number) = company.vat_number.as_deref().filter(|_| company.vat_registered) {
        body.push_str(&format!("VAT No. {vat_number}\n"));
    }

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::invoice::LineItem;
    use chrono::{NaiveDate, Utc};
    use sqlx::types::Json;
    use uuid::Uuid;

    fn invoice() -> Invoice {
        let now = Utc::now();
        Invoice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job_id: None,
            number: "MB-0007".to_string(),
            client_name: "Mrs Patel".to_string(),
            client_email: Some("patel@example.com".to_string()),
            line_items: Json(vec![LineItem {
                description: "Plastering".to_string(),
                quantity: 2,
                unit_price_pence: 12_500,
            }]),
            subtotal_pence: 25_000,
            vat_rate_bps: 2000,
            vat_pence: 5_000,
            total_pence: 30_000,
            status: "draft".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn invoice_body_lists_items_and_totals() {
        let mut company = CompanySettings::defaults_for(Uuid::new_v4());
        company.company_name = Some("Mason Builders Ltd".to_string());
        company.vat_registered = true;
        company.vat_number = Some("GB123456789".to_string());

        let body = invoice_body(&invoice(), &company);

        assert!(body.contains("Dear Mrs Patel"));
        assert!(body.contains("2 x Plastering @ £125.00 = £250.00"));
        assert!(body.contains("VAT (20%): £50.00"));
        assert!(body.contains("Total due: £300.00"));
        assert!(body.contains("Due by: 31/03/2025"));
        assert!(body.contains("VAT No. GB123456789"));
    }

    #[test]
    fn magic_link_body_mentions_expiry() {
        let body = magic_link_body("https://app.example.com/auth/verify?token=abc", 15);
        assert!(body.contains("https://app.example.com/auth/verify?token=abc"));
        assert!(body.contains("15 minutes"));
    }

    #[tokio::test]
    async fn file_transport_writes_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.email_dir = dir.path().to_string_lossy().to_string();

        let service = EmailService::new(&config).unwrap();
        service
            .send_magic_link("sam@example.com", "https://example.com/verify?token=x", 15)
            .await
            .unwrap();

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 1);
    }

    #[tokio::test]
    async fn invoice_reaches_clients_with_punctuated_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.email_dir = dir.path().to_string_lossy().to_string();
        let service = EmailService::new(&config).unwrap();
        let company = CompanySettings::defaults_for(Uuid::new_v4());

        for client_name in ["Patel & Sons, Ltd", "J. Smith (Site B)"] {
            let mut invoice = invoice();
            invoice.client_name = client_name.to_string();

            service
                .send_invoice("accounts@example.com", &invoice, &company)
                .await
                .unwrap();
        }

        let written = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn bad_recipient_address_is_invalid_request() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config();
        config.email_dir = dir.path().to_string_lossy().to_string();
        let service = EmailService::new(&config).unwrap();

        let result = service
            .send_invoice("not-an-address", &invoice(), &CompanySettings::defaults_for(Uuid::new_v4()))
            .await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }
}
