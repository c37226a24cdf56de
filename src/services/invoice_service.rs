//! Invoice service - numbering, totals and status changes.
//!
//! # Numbering
//!
//! Each user has one row in `invoice_counters`. Creating an invoice
//! increments it with `UPDATE … RETURNING` inside the invoice's transaction,
//! so the row lock serializes concurrent creates for the same user and
//! numbers are strictly increasing.

use chrono::{Days, NaiveDate, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        company::CompanySettings,
        invoice::{
            CreateInvoiceRequest, INVOICE_COLUMNS, Invoice, InvoiceStatus, STANDARD_VAT_BPS,
            compute_totals, format_invoice_number,
        },
        user::normalize_email,
    },
    services::{company_service, email_service::EmailService},
};

/// VAT rate and due date after applying company defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTerms {
    pub vat_rate_bps: i32,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}

/// Fill in the VAT rate and due date the request left out.
///
/// VAT defaults to the standard rate for VAT-registered companies and to
/// zero otherwise; the due date defaults to `issue_date + payment terms`.
pub fn resolve_terms(
    request: &CreateInvoiceRequest,
    company: &CompanySettings,
    issue_date: NaiveDate,
) -> Result<InvoiceTerms, String> {
    let vat_rate_bps = request.vat_rate_bps.unwrap_or(if company.vat_registered {
        STANDARD_VAT_BPS
    } else {
        0
    });

    let terms = u64::try_from(company.payment_terms_days).unwrap_or_default();
    let due_date = match request.due_date {
        Some(due) => due,
        None => issue_date
            .checked_add_days(Days::new(terms))
            .ok_or_else(|| "Due date is out of range".to_string())?,
    };

    if due_date < issue_date {
        return Err("Due date cannot be before the issue date".to_string());
    }

    Ok(InvoiceTerms {
        vat_rate_bps,
        issue_date,
        due_date,
    })
}

/// Create an invoice with the next number in the user's sequence.
///
/// # Process
///
/// 1. Validate the client and line items
/// 2. Start a database transaction
/// 3. Load company defaults and check the job is owned by the user
/// 4. Ensure the counter row exists (`INSERT … ON CONFLICT DO NOTHING`)
/// 5. Increment it and take the new value
/// 6. Insert the invoice and commit
///
/// # Errors
///
/// - `InvalidRequest`: missing client name, bad email, bad line items or dates
/// - `NotFound`: `job_id` is not one of the user's jobs
pub async fn create_invoice(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateInvoiceRequest,
) -> Result<Invoice, AppError> {
    let client_name = request.client_name.trim().to_string();
    if client_name.is_empty() {
        return Err(AppError::InvalidRequest("Client name is required".to_string()));
    }

    let client_email = match request.client_email.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(email) => Some(normalize_email(email).ok_or_else(|| {
            AppError::InvalidRequest("Client email is not a valid address".to_string())
        })?),
    };

    let mut tx = pool.begin().await?;

    let company = company_service::get_settings(&mut *tx, user_id).await?;
    let terms = resolve_terms(&request, &company, Utc::now().date_naive())
        .map_err(AppError::InvalidRequest)?;
    let totals = compute_totals(&request.line_items, terms.vat_rate_bps)
        .map_err(AppError::InvalidRequest)?;

    if let Some(job_id) = request.job_id {
        let owned: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM jobs WHERE id = $1 AND user_id = $2)")
                .bind(job_id)
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;
        if !owned {
            return Err(AppError::NotFound("Job"));
        }
    }

    sqlx::query("INSERT INTO invoice_counters (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    // Row lock held until commit
    let sequence: i64 = sqlx::query_scalar(
        "UPDATE invoice_counters SET last_number = last_number + 1 WHERE user_id = $1 RETURNING last_number",
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        INSERT INTO invoices (
            user_id, job_id, number, client_name, client_email, line_items,
            subtotal_pence, vat_rate_bps, vat_pence, total_pence,
            status, issue_date, due_date
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'draft', $11, $12)
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(request.job_id)
    .bind(format_invoice_number(&company.invoice_prefix, sequence))
    .bind(client_name)
    .bind(client_email)
    .bind(Json(&request.line_items))
    .bind(totals.subtotal_pence)
    .bind(terms.vat_rate_bps)
    .bind(totals.vat_pence)
    .bind(totals.total_pence)
    .bind(terms.issue_date)
    .bind(terms.due_date)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!("Created invoice {} for user {}", invoice.number, user_id);
    Ok(invoice)
}

pub async fn list_invoices(
    pool: &DbPool,
    user_id: Uuid,
    status: Option<InvoiceStatus>,
) -> Result<Vec<Invoice>, AppError> {
    let invoices = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        SELECT {INVOICE_COLUMNS}
        FROM invoices
        WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)
        ORDER BY created_at DESC
        "#
    ))
    .bind(user_id)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    Ok(invoices)
}

pub async fn get_invoice(pool: &DbPool, user_id: Uuid, invoice_id: Uuid) -> Result<Invoice, AppError> {
    sqlx::query_as::<_, Invoice>(&format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1 AND user_id = $2"
    ))
    .bind(invoice_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Invoice"))
}

fn stored_status(invoice_id: Uuid, status: &str) -> Result<InvoiceStatus, AppError> {
    InvoiceStatus::parse(status)
        .ok_or_else(|| AppError::Internal(format!("invoice {invoice_id} has unknown status {status}")))
}

/// Move an invoice to a new status.
///
/// Paid and void invoices are final. `sent_at` is stamped the first time an
/// invoice becomes sent and `paid_at` when it becomes paid.
pub async fn update_status(
    pool: &DbPool,
    user_id: Uuid,
    invoice_id: Uuid,
    next: InvoiceStatus,
) -> Result<Invoice, AppError> {
    let mut tx = pool.begin().await?;

    let current: String =
        sqlx::query_scalar("SELECT status FROM invoices WHERE id = $1 AND user_id = $2 FOR UPDATE")
            .bind(invoice_id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Invoice"))?;

    let current = stored_status(invoice_id, &current)?;
    if !current.can_transition_to(next) {
        return Err(AppError::InvalidRequest(format!(
            "Cannot change a {} invoice to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        UPDATE invoices
        SET status = $2::text,
            sent_at = CASE WHEN $2::text = 'sent' THEN COALESCE(sent_at, NOW()) ELSE sent_at END,
            paid_at = CASE WHEN $2::text = 'paid' THEN NOW() ELSE paid_at END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(invoice_id)
    .bind(next.as_str())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        "Invoice {} moved from {} to {}",
        invoice.number,
        current.as_str(),
        next.as_str()
    );
    Ok(invoice)
}

/// Email an invoice to its client and mark it sent.
///
/// If the email fails the invoice is left unchanged and the error is
/// returned; there is no compensation step.
pub async fn send_invoice(
    pool: &DbPool,
    email: &EmailService,
    user_id: Uuid,
    invoice_id: Uuid,
) -> Result<Invoice, AppError> {
    let invoice = get_invoice(pool, user_id, invoice_id).await?;

    let Some(to) = invoice.client_email.clone() else {
        return Err(AppError::InvalidRequest(
            "Invoice has no client email address".to_string(),
        ));
    };

    let status = stored_status(invoice.id, &invoice.status)?;
    if matches!(status, InvoiceStatus::Paid | InvoiceStatus::Void) {
        return Err(AppError::InvalidRequest(format!(
            "A {} invoice cannot be sent",
            status.as_str()
        )));
    }

    let company = company_service::get_settings(pool, user_id).await?;
    email.send_invoice(&to, &invoice, &company).await?;

    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        UPDATE invoices
        SET status = 'sent',
            sent_at = NOW(),
            updated_at = NOW()
        WHERE id = $1 AND status IN ('draft', 'sent')
        RETURNING {INVOICE_COLUMNS}
        "#
    ))
    .bind(invoice.id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Invoice changed while it was being sent".to_string()))?;

    tracing::info!("Invoice {} sent to client", invoice.number);
    Ok(invoice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::LineItem;

    fn request(vat_rate_bps: Option<i32>, due_date: Option<NaiveDate>) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            job_id: None,
            client_name: "Mrs Patel".to_string(),
            client_email: None,
            line_items: vec![LineItem {
                description: "Labour".to_string(),
                quantity: 1,
                unit_price_pence: 10_000,
            }],
            vat_rate_bps,
            due_date,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn vat_defaults_follow_registration() {
        let mut company = CompanySettings::defaults_for(Uuid::new_v4());
        let issued = date(2025, 3, 1);

        assert_eq!(resolve_terms(&request(None, None), &company, issued).unwrap().vat_rate_bps, 0);

        company.vat_registered = true;
        assert_eq!(
            resolve_terms(&request(None, None), &company, issued).unwrap().vat_rate_bps,
            STANDARD_VAT_BPS
        );
        assert_eq!(
            resolve_terms(&request(Some(500), None), &company, issued).unwrap().vat_rate_bps,
            500
        );
    }

    #[test]
    fn due_date_defaults_to_payment_terms() {
        let mut company = CompanySettings::defaults_for(Uuid::new_v4());
        let issued = date(2025, 1, 15);

        let terms = resolve_terms(&request(None, None), &company, issued).unwrap();
        assert_eq!(terms.due_date, date(2025, 2, 14));

        company.payment_terms_days = 0;
        let terms = resolve_terms(&request(None, None), &company, issued).unwrap();
        assert_eq!(terms.due_date, issued);
    }

    #[test]
    fn explicit_due_date_must_not_precede_issue() {
        let company = CompanySettings::defaults_for(Uuid::new_v4());
        let issued = date(2025, 6, 10);

        assert!(resolve_terms(&request(None, Some(date(2025, 6, 9))), &company, issued).is_err());
        assert_eq!(
            resolve_terms(&request(None, Some(date(2025, 7, 1))), &company, issued)
                .unwrap()
                .due_date,
            date(2025, 7, 1)
        );
    }
}
