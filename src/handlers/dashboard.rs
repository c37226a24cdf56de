//! Dashboard HTTP handler.

use axum::{Extension, Json, extract::State};
use chrono::Utc;

use crate::{
    db::DbPool,
    error::AppError,
    middleware::auth::AuthContext,
    services::dashboard_service::{self, DashboardResponse},
};

/// `GET /api/v1/dashboard`
///
/// # Response (200 OK)
///
/// ```json
/// {
///   "jobs": { "cancelled": 0, "completed": 4, "in_progress": 2, "quoted": 3 },
///   "invoices": {
///     "outstanding_pence": 450000,
///     "outstanding_count": 2,
///     "overdue_count": 1,
///     "paid_this_month_pence": 120000
///   },
///   "conversations": 12,
///   "entitlement": { "plan": "pro", "status": "active", "features": { … } }
/// }
/// ```
pub async fn get_dashboard(
    State(pool): State<DbPool>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DashboardResponse>, AppError> {
    let dashboard = dashboard_service::load_dashboard(
        &pool,
        auth.user_id(),
        auth.entitlement,
        Utc::now().date_naive(),
    )
    .await?;

    Ok(Json(dashboard))
}
