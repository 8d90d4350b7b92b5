use std::str::FromStr;

use anyhow::Result;
use sqlx::{Sqlite, SqlitePool, Transaction};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::info;

mod accounts;
mod bookings;
mod ledger;
mod turfs;

pub use accounts::{
    Credentials, ProfileUpdate, create_account, find_credentials, get_account, get_profile,
    set_role, update_profile,
};
pub use bookings::{
    BookingError, BookingRequest, CommittedBooking, booked_slot_ids, cancel_booking,
    commit_booking, complete_past_bookings, count_bookings, get_booking, list_owner_bookings,
    list_player_bookings, list_recent_bookings,
};
pub use ledger::{
    COMMISSION_RATE_KEY, commission_rate, get_payment_for_booking, get_setting,
    list_all_payouts, list_owner_payouts, list_settings, set_setting,
};
pub use turfs::{
    ImageError, NewSlot, TurfFields, TurfFilter, add_slot, add_turf_images, approved_cities,
    count_turfs_by_status, create_turf, delete_slot, delete_turf_image, get_slot, get_turf,
    get_turf_image, list_active_slots_for_day, list_owner_turfs, list_pending_turfs, list_slots,
    list_turf_images, list_turfs, search_approved_turfs, set_slot_active, set_turf_status,
    update_turf,
};

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    // An in-memory database lives and dies with its connection, so pin it to one.
    let pool = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new().connect_with(options).await?
    };
    info!("Connected to database: {database_url}");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("Migrations applied");
    Ok(())
}

/// Opens a transaction holding SQLite's write lock from the start. Concurrent
/// writers queue on the busy timeout instead of failing with SQLITE_BUSY when
/// a read-then-write transaction tries to upgrade its lock.
pub(crate) async fn begin_write(pool: &SqlitePool) -> sqlx::Result<Transaction<'static, Sqlite>> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

/// True when `err` came from a UNIQUE constraint (duplicate email, second live
/// booking of a slot, ...).
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .is_some_and(sqlx_unique_violation)
}

/// True when `err` came from a FOREIGN KEY constraint, e.g. deleting a slot
/// that bookings still point at.
pub fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => db.is_foreign_key_violation(),
        _ => false,
    }
}

pub(crate) fn sqlx_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}
