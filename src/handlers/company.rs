//! Company settings HTTP handlers.

use axum::{Extension, Json, extract::State};

use crate::{
    db::DbPool,
    error::AppError,
    extract::AppJson,
    middleware::auth::AuthContext,
    models::company::{CompanySettings, CompanySettingsRequest},
    services::company_service,
};

/// `GET /api/v1/company`: saved settings, or the defaults if none were saved.
pub async fn get_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<CompanySettings>, AppError> {
    let settings = company_service::get_settings(&pool, auth.user_id()).await?;
    Ok(Json(settings))
}

/// `PUT /api/v1/company`: replace the settings.
///
/// # Validation
///
/// - `invoice_prefix`: 1-10 characters of `A-Z0-9`
/// - `payment_terms_days`: 0-120
/// - `vat_number`: required when `vat_registered` is true
pub async fn update_company(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
    AppJson(request): AppJson<CompanySettingsRequest>,
) -> Result<Json<CompanySettings>, AppError> {
    let settings = company_service::save_settings(&pool, auth.user_id(), request).await?;
    Ok(Json(settings))
}
