//! Invoice data models, totals calculation and numbering.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

/// Represents an invoice record from the database.
///
/// # Numbering
///
/// `number` is `"{prefix}-{n:04}"` where `n` comes from the owner's row in
/// `invoice_counters`. `(user_id, number)` is unique.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub user_id: Uuid,
    pub job_id: Option<Uuid>,
    pub number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub line_items: Json<Vec<LineItem>>,
    pub subtotal_pence: i64,
    pub vat_rate_bps: i32,
    pub vat_pence: i64,
    pub total_pence: i64,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const INVOICE_COLUMNS: &str = "id, user_id, job_id, number, client_name, client_email, line_items, \
     subtotal_pence, vat_rate_bps, vat_pence, total_pence, status, issue_date, due_date, \
     sent_at, paid_at, created_at, updated_at";

/// A single billable line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: i64,
    pub unit_price_pence: i64,
}

/// Request body for `POST /api/v1/invoices`.
#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub line_items: Vec<LineItem>,
    /// VAT rate in basis points; defaults from company settings when absent.
    #[serde(default)]
    pub vat_rate_bps: Option<i32>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
}

/// Request body for `PUT /api/v1/invoices/{id}/status`.
#[derive(Debug, Deserialize)]
pub struct InvoiceStatusRequest {
    pub status: InvoiceStatus,
}

/// Query string for `GET /api/v1/invoices`.
#[derive(Debug, Deserialize)]
pub struct InvoiceListQuery {
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "sent" => Some(InvoiceStatus::Sent),
            "paid" => Some(InvoiceStatus::Paid),
            "void" => Some(InvoiceStatus::Void),
            _ => None,
        }
    }

    /// Paid and void invoices are final.
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        !matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void) && *self != next
    }
}

/// Server-computed invoice amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub subtotal_pence: i64,
    pub vat_pence: i64,
    pub total_pence: i64,
}

/// Standard UK VAT rate in basis points.
pub const STANDARD_VAT_BPS: i32 = 2000;

/// Validate line items and compute subtotal, VAT and total.
///
/// VAT is rounded half-up to the nearest penny.
pub fn compute_totals(items: &[LineItem], vat_rate_bps: i32) -> Result<InvoiceTotals, String> {
    if items.is_empty() {
        return Err("An invoice needs at least one line item".to_string());
    }
    if !(0..=10_000).contains(&vat_rate_bps) {
        return Err("VAT rate must be between 0 and 10000 basis points".to_string());
    }

    let too_large = || "Invoice total is too large".to_string();

    let mut subtotal: i128 = 0;
    for item in items {
        if item.description.trim().is_empty() {
            return Err("Line item description is required".to_string());
        }
        if item.quantity < 1 {
            return Err("Line item quantity must be at least 1".to_string());
        }
        if item.unit_price_pence < 0 {
            return Err("Line item price cannot be negative".to_string());
        }
        subtotal += i128::from(item.quantity) * i128::from(item.unit_price_pence);
        if subtotal > i128::from(i64::MAX) {
            return Err(too_large());
        }
    }

    let vat = (subtotal * i128::from(vat_rate_bps) + 5_000) / 10_000;
    let total = subtotal + vat;

    Ok(InvoiceTotals {
        subtotal_pence: i64::try_from(subtotal).map_err(|_| too_large())?,
        vat_pence: i64::try_from(vat).map_err(|_| too_large())?,
        total_pence: i64::try_from(total).map_err(|_| too_large())?,
    })
}

/// Format an invoice number, zero-padded to four digits.
pub fn format_invoice_number(prefix: &str, sequence: i64) -> String {
    format!("{prefix}-{sequence:04}")
}
