//! Invoice HTTP handlers.
//!
//! - POST /api/v1/invoices - Create a draft invoice
//! - GET /api/v1/invoices - List invoices, optionally `?status=`
//! - GET /api/v1/invoices/{id} - Get one invoice
//! - PUT /api/v1/invoices/{id}/status - Change status
//! - POST /api/v1/invoices/{id}/send - Email to the client and mark sent

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    app::AppState,
    db::DbPool,
    error::AppError,
    extract::{AppJson, AppPath, AppQuery},
    middleware::auth::AuthContext,
    models::invoice::{CreateInvoiceRequest, Invoice, InvoiceListQuery, InvoiceStatusRequest},
    services::invoice_service,
};

/// Create an invoice.
///
/// # Request Body
///
/// ```json
/// {
///   "client_name": "Mrs Patel",
///   "client_email": "patel@example.com",
///   "job_id": "…",
///   "line_items": [{ "description": "Labour", "quantity": 3, "unit_price_pence": 25000 }],
///   "vat_rate_bps": 2000,
///   "due_date": "2025-07-01"
/// }
/// ```
///
/// Totals are always computed by the server; the number comes from the
/// user's invoice sequence.
///
/// # Response
///
/// - **Success (201 Created)**: the invoice, status `draft`
/// - **Error (400)**: invalid client, line items or dates
/// - **Error (404)**: `job_id` is not one of the user's jobs
pub async fn create_invoice(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppJson(request): AppJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    let invoice = invoice_service::create_invoice(&pool, auth.user_id(), request).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn list_invoices(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppQuery(query): AppQuery<InvoiceListQuery>,
) -> Result<Json<Vec<Invoice>>, AppError> {
    let invoices = invoice_service::list_invoices(&pool, auth.user_id(), query.status).await?;
    Ok(Json(invoices))
}

pub async fn get_invoice(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(invoice_id): AppPath<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice = invoice_service::get_invoice(&pool, auth.user_id(), invoice_id).await?;
    Ok(Json(invoice))
}

/// Change an invoice's status.
///
/// # Response
///
/// - **Success (200 OK)**: the updated invoice
/// - **Error (400)**: the invoice is paid or void, or already has that status
pub async fn update_invoice_status(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppPath(invoice_id): AppPath<Uuid>,
    AppJson(request): AppJson<InvoiceStatusRequest>,
) -> Result<Json<Invoice>, AppError> {
    let invoice =
        invoice_service::update_status(&pool, auth.user_id(), invoice_id, request.status).await?;
    Ok(Json(invoice))
}

/// Email the invoice to its client.
///
/// # Response
///
/// - **Success (200 OK)**: the invoice, now `sent`
/// - **Error (400)**: no client email, or the invoice is paid or void
/// - **Error (500)**: the email could not be sent; the invoice is unchanged
pub async fn send_invoice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    AppPath(invoice_id): AppPath<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    let invoice =
        invoice_service::send_invoice(&state.pool, &state.email, auth.user_id(), invoice_id).await?;
    Ok(Json(invoice))
}
