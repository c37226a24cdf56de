//! Dashboard aggregates for the signed-in user.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{job::JOB_STATUSES, plan::Entitlement},
};

#[derive(Debug, Serialize)]
pub struct InvoiceSummary {
    /// Sum of `total_pence` over sent, unpaid invoices.
    pub outstanding_pence: i64,
    pub outstanding_count: i64,
    /// Sent invoices whose due date has passed.
    pub overdue_count: i64,
    pub paid_this_month_pence: i64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    /// Job counts keyed by status; every status is present.
    pub jobs: BTreeMap<String, i64>,
    pub invoices: InvoiceSummary,
    pub conversations: i64,
    pub entitlement: Entitlement,
}

/// Every job status with a zero count, overlaid with the counts found.
pub fn job_counts(rows: Vec<(String, i64)>) -> BTreeMap<String, i64> {
    let mut counts: BTreeMap<String, i64> =
        JOB_STATUSES.iter().map(|s| (s.to_string(), 0)).collect();
    counts.extend(rows);
    counts
}

/// First day of the month containing `today`.
pub fn month_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

pub async fn load_dashboard(
    pool: &DbPool,
    user_id: Uuid,
    entitlement: Entitlement,
    today: NaiveDate,
) -> Result<DashboardResponse, AppError> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM jobs WHERE user_id = $1 GROUP BY status")
            .bind(user_id)
            .fetch_all(pool)
            .await?;

    let (outstanding_pence, outstanding_count, overdue_count, paid_this_month_pence): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(total_pence) FILTER (WHERE status = 'sent'), 0)::BIGINT,
                COUNT(*) FILTER (WHERE status = 'sent'),
                COUNT(*) FILTER (WHERE status = 'sent' AND due_date < $2),
                COALESCE(SUM(total_pence) FILTER (WHERE status = 'paid' AND paid_at >= $3), 0)::BIGINT
            FROM invoices
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(today)
        .bind(month_start(today).and_hms_opt(0, 0, 0).map(|t| t.and_utc()))
        .fetch_one(pool)
        .await?;

    let conversations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await?;

    Ok(DashboardResponse {
        jobs: job_counts(rows),
        invoices: InvoiceSummary {
            outstanding_pence,
            outstanding_count,
            overdue_count,
            paid_this_month_pence,
        },
        conversations,
        entitlement,
    })
}
