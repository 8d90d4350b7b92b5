use anyhow::Result;
use chrono::Utc;
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::warn;
use turfbook_models::{CommissionRate, Payment, PayoutEntry, PlatformSetting};

pub(crate) const PAYMENT_COLUMNS: &str = "id, booking_id, amount, payment_method, status, \
    transaction_id, created_at, updated_at";

const PAYOUT_COLUMNS: &str = "id, booking_id, owner_id, total_amount, commission_amount, \
    commission_rate, owner_payout, status, created_at";

pub const COMMISSION_RATE_KEY: &str = "commission_rate";

// --- Platform settings ---

pub async fn list_settings(pool: &SqlitePool) -> Result<Vec<PlatformSetting>> {
    let settings = sqlx::query_as::<_, PlatformSetting>(
        "SELECT key, value, updated_at FROM platform_settings ORDER BY key",
    )
    .fetch_all(pool)
    .await?;
    Ok(settings)
}

pub async fn get_setting(pool: &SqlitePool, key: &str) -> Result<Option<PlatformSetting>> {
    let setting = sqlx::query_as::<_, PlatformSetting>(
        "SELECT key, value, updated_at FROM platform_settings WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(setting)
}

pub async fn set_setting(pool: &SqlitePool, key: &str, value: &str) -> Result<PlatformSetting> {
    let setting = sqlx::query_as::<_, PlatformSetting>(
        "INSERT INTO platform_settings (key, value, updated_at) VALUES (?, ?, ?) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at \
         RETURNING key, value, updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(setting)
}

/// Current commission rate. A missing or unparsable setting falls back to
/// the default rate.
pub async fn commission_rate<'e, E>(executor: E) -> Result<CommissionRate, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let value: Option<(String,)> =
        sqlx::query_as("SELECT value FROM platform_settings WHERE key = ?")
            .bind(COMMISSION_RATE_KEY)
            .fetch_optional(executor)
            .await?;

    let rate = match value {
        Some((v,)) => v.parse().unwrap_or_else(|e| {
            warn!("Ignoring {COMMISSION_RATE_KEY} setting {v:?}: {e}");
            CommissionRate::default()
        }),
        None => CommissionRate::default(),
    };
    Ok(rate)
}

// --- Payments and payouts ---

pub async fn get_payment_for_booking(pool: &SqlitePool, booking_id: i64) -> Result<Option<Payment>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = ?");
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(booking_id)
        .fetch_optional(pool)
        .await?;
    Ok(payment)
}

pub async fn list_owner_payouts(pool: &SqlitePool, owner_id: i64) -> Result<Vec<PayoutEntry>> {
    let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payout_ledger WHERE owner_id = ? ORDER BY id");
    let entries = sqlx::query_as::<_, PayoutEntry>(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
    Ok(entries)
}

pub async fn list_all_payouts(pool: &SqlitePool) -> Result<Vec<PayoutEntry>> {
    let sql = format!("SELECT {PAYOUT_COLUMNS} FROM payout_ledger ORDER BY id");
    let entries = sqlx::query_as::<_, PayoutEntry>(&sql).fetch_all(pool).await?;
    Ok(entries)
}
