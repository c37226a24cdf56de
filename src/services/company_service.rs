//! Company settings reads and the explicit conditional write.

use uuid::Uuid;

use crate::{
    db::{DbPool, unique_violation},
    error::AppError,
    models::company::{CompanySettings, CompanySettingsRequest},
};

const COMPANY_COLUMNS: &str = "user_id, company_name, address, phone, email, vat_number, \
     vat_registered, invoice_prefix, payment_terms_days, updated_at";

/// Saved settings, or defaults when the user has never saved any.
pub async fn get_settings<'e, E>(executor: E, user_id: Uuid) -> Result<CompanySettings, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let settings = sqlx::query_as::<_, CompanySettings>(&format!(
        "SELECT {COMPANY_COLUMNS} FROM company_settings WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(settings.unwrap_or_else(|| CompanySettings::defaults_for(user_id)))
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn update_settings(
    pool: &DbPool,
    user_id: Uuid,
    request: &CompanySettingsRequest,
) -> Result<Option<CompanySettings>, AppError> {
    let settings = sqlx::query_as::<_, CompanySettings>(&format!(
        r#"
        UPDATE company_settings
        SET company_name = $2,
            address = $3,
            phone = $4,
            email = $5,
            vat_number = $6,
            vat_registered = $7,
            invoice_prefix = $8,
            payment_terms_days = $9,
            updated_at = NOW()
        WHERE user_id = $1
        RETURNING {COMPANY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(clean(request.company_name.clone()))
    .bind(clean(request.address.clone()))
    .bind(clean(request.phone.clone()))
    .bind(clean(request.email.clone()))
    .bind(clean(request.vat_number.clone()))
    .bind(request.vat_registered)
    .bind(&request.invoice_prefix)
    .bind(request.payment_terms_days)
    .fetch_optional(pool)
    .await?;

    Ok(settings)
}

async fn insert_settings(
    pool: &DbPool,
    user_id: Uuid,
    request: &CompanySettingsRequest,
) -> Result<CompanySettings, sqlx::Error> {
    sqlx::query_as::<_, CompanySettings>(&format!(
        r#"
        INSERT INTO company_settings (
            user_id, company_name, address, phone, email, vat_number,
            vat_registered, invoice_prefix, payment_terms_days
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {COMPANY_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(clean(request.company_name.clone()))
    .bind(clean(request.address.clone()))
    .bind(clean(request.phone.clone()))
    .bind(clean(request.email.clone()))
    .bind(clean(request.vat_number.clone()))
    .bind(request.vat_registered)
    .bind(&request.invoice_prefix)
    .bind(request.payment_terms_days)
    .fetch_one(pool)
    .await
}

/// Write the user's settings.
///
/// # Process
///
/// 1. `UPDATE` the existing row
/// 2. If there was none, `INSERT`
/// 3. If a concurrent request inserted first (primary key violation),
///    `UPDATE` again so the last writer's values stick
pub async fn save_settings(
    pool: &DbPool,
    user_id: Uuid,
    request: CompanySettingsRequest,
) -> Result<CompanySettings, AppError> {
    request.validate().map_err(AppError::InvalidRequest)?;

    if let Some(settings) = update_settings(pool, user_id, &request).await? {
        return Ok(settings);
    }

    match insert_settings(pool, user_id, &request).await {
        Ok(settings) => Ok(settings),
        Err(e) if unique_violation(&e).is_some() => {
            tracing::info!("Company settings for {} created concurrently, updating", user_id);
            update_settings(pool, user_id, &request)
                .await?
                .ok_or_else(|| AppError::Internal("company settings vanished during write".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_are_stored_as_null() {
        assert_eq!(clean(Some("   ".to_string())), None);
        assert_eq!(clean(Some(" 01234 567890 ".to_string())).as_deref(), Some("01234 567890"));
        assert_eq!(clean(None), None);
    }
}
