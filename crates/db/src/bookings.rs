use std::collections::HashSet;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use turfbook_models::{
    Booking, BookingDetail, BookingStatus, Money, Payment, PaymentStatus, PriceSplit, Turf,
    TurfSlot, Unbookable, check_bookable, effective_price,
};

use crate::ledger::{PAYMENT_COLUMNS, commission_rate};
use crate::{begin_write, sqlx_unique_violation};
use crate::turfs::{SLOT_COLUMNS, TURF_COLUMNS};

const BOOKING_COLUMNS: &str = "id, player_id, turf_id, slot_id, booking_date, total_amount, \
    commission_amount, owner_amount, status, created_at, updated_at";

const BOOKING_DETAIL_SELECT: &str = "SELECT b.id, b.player_id, b.turf_id, b.slot_id, \
    b.booking_date, b.total_amount, b.commission_amount, b.owner_amount, b.status, \
    b.created_at, b.updated_at, \
    t.name AS turf_name, t.city AS turf_city, t.area AS turf_area, t.sport_type, \
    s.start_time, s.end_time \
    FROM bookings b \
    JOIN turfs t ON t.id = b.turf_id \
    JOIN turf_slots s ON s.id = b.slot_id";

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("turf {0} not found")]
    TurfNotFound(i64),
    #[error("slot {0} not found")]
    SlotNotFound(i64),
    #[error("booking {0} not found")]
    BookingNotFound(i64),
    #[error(transparent)]
    Unbookable(#[from] Unbookable),
    #[error("this slot is already booked for {0}")]
    AlreadyBooked(NaiveDate),
    #[error("booking is {0} and can no longer be cancelled")]
    NotCancellable(BookingStatus),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct BookingRequest {
    pub player_id: i64,
    pub turf_id: i64,
    pub slot_id: i64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommittedBooking {
    pub booking: Booking,
    pub payment: Payment,
}

/// Slot ids holding a live (pending or confirmed) booking on `date`.
pub async fn booked_slot_ids(pool: &SqlitePool, turf_id: i64, date: NaiveDate) -> Result<HashSet<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT slot_id FROM bookings \
         WHERE turf_id = ? AND booking_date = ? AND status IN ('pending', 'confirmed')",
    )
    .bind(turf_id)
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Books a slot and records its mock payment and payout ledger entry in one
/// write transaction. The slot is re-checked inside the transaction, and the
/// partial unique index on (slot_id, booking_date) rejects a concurrent
/// second booking with [`BookingError::AlreadyBooked`].
pub async fn commit_booking(
    pool: &SqlitePool,
    request: &BookingRequest,
    today: NaiveDate,
) -> Result<CommittedBooking, BookingError> {
    let mut tx = begin_write(pool).await?;

    let turf_sql = format!("SELECT {TURF_COLUMNS} FROM turfs WHERE id = ?");
    let turf = sqlx::query_as::<_, Turf>(&turf_sql)
        .bind(request.turf_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BookingError::TurfNotFound(request.turf_id))?;

    let slot_sql = format!("SELECT {SLOT_COLUMNS} FROM turf_slots WHERE id = ?");
    let slot = sqlx::query_as::<_, TurfSlot>(&slot_sql)
        .bind(request.slot_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BookingError::SlotNotFound(request.slot_id))?;

    check_bookable(&turf, &slot, request.date, today)?;

    let rate = commission_rate(&mut *tx).await?;
    let split = PriceSplit::compute(effective_price(&slot, &turf), rate);
    let now = Utc::now();

    let insert_booking = format!(
        "INSERT INTO bookings (player_id, turf_id, slot_id, booking_date, total_amount, \
            commission_amount, owner_amount, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {BOOKING_COLUMNS}"
    );
    let booking = sqlx::query_as::<_, Booking>(&insert_booking)
        .bind(request.player_id)
        .bind(turf.id)
        .bind(slot.id)
        .bind(request.date)
        .bind(split.total)
        .bind(split.commission)
        .bind(split.owner_amount)
        .bind(BookingStatus::Confirmed)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if sqlx_unique_violation(&e) {
                BookingError::AlreadyBooked(request.date)
            } else {
                BookingError::Database(e)
            }
        })?;

    let insert_payment = format!(
        "INSERT INTO payments (booking_id, amount, payment_method, status, transaction_id, \
            created_at, updated_at) \
         VALUES (?, ?, 'mock', ?, ?, ?, ?) RETURNING {PAYMENT_COLUMNS}"
    );
    let payment = sqlx::query_as::<_, Payment>(&insert_payment)
        .bind(booking.id)
        .bind(split.total)
        .bind(PaymentStatus::Success)
        .bind(format!("MOCK_{}", now.timestamp_millis()))
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query(
        "INSERT INTO payout_ledger (booking_id, owner_id, total_amount, commission_amount, \
            commission_rate, owner_payout, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(booking.id)
    .bind(turf.owner_id)
    .bind(split.total)
    .bind(split.commission)
    .bind(Money::new(rate.percent()))
    .bind(split.owner_amount)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(
        "Booking {} confirmed: turf {} slot {} on {} ({} total, {} commission)",
        booking.id, turf.id, slot.id, request.date, split.total, split.commission
    );

    Ok(CommittedBooking { booking, payment })
}

pub async fn get_booking(pool: &SqlitePool, id: i64) -> Result<Option<Booking>> {
    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?");
    let booking = sqlx::query_as::<_, Booking>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(booking)
}

/// Cancels one of `player_id`'s own bookings, refunds the mock payment and
/// voids the ledger row. Other players' bookings read as not found.
pub async fn cancel_booking(
    pool: &SqlitePool,
    booking_id: i64,
    player_id: i64,
) -> Result<Booking, BookingError> {
    let mut tx = begin_write(pool).await?;

    let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ? AND player_id = ?");
    let booking = sqlx::query_as::<_, Booking>(&sql)
        .bind(booking_id)
        .bind(player_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(BookingError::BookingNotFound(booking_id))?;

    if !booking.status.can_cancel() {
        warn!("Booking {booking_id} is {} and cannot be cancelled", booking.status);
        return Err(BookingError::NotCancellable(booking.status));
    }

    let now = Utc::now();
    let update = format!(
        "UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? RETURNING {BOOKING_COLUMNS}"
    );
    let cancelled = sqlx::query_as::<_, Booking>(&update)
        .bind(BookingStatus::Cancelled)
        .bind(now)
        .bind(booking_id)
        .fetch_one(&mut *tx)
        .await?;

    sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE booking_id = ? AND status = ?")
        .bind(PaymentStatus::Refunded)
        .bind(now)
        .bind(booking_id)
        .bind(PaymentStatus::Success)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE payout_ledger SET status = 'cancelled' WHERE booking_id = ? AND status = 'pending'")
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    info!("Booking {booking_id} cancelled by player {player_id}");
    Ok(cancelled)
}

/// Marks confirmed bookings dated before `today` as completed.
pub async fn complete_past_bookings(pool: &SqlitePool, today: NaiveDate) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE bookings SET status = 'completed', updated_at = ? \
         WHERE status = 'confirmed' AND booking_date < ?",
    )
    .bind(Utc::now())
    .bind(today)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_bookings(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

pub async fn list_player_bookings(pool: &SqlitePool, player_id: i64) -> Result<Vec<BookingDetail>> {
    let sql = format!("{BOOKING_DETAIL_SELECT} WHERE b.player_id = ? ORDER BY b.booking_date DESC, s.start_time DESC");
    let bookings = sqlx::query_as::<_, BookingDetail>(&sql)
        .bind(player_id)
        .fetch_all(pool)
        .await?;
    Ok(bookings)
}

/// Most recent bookings across every turf `owner_id` owns.
pub async fn list_owner_bookings(pool: &SqlitePool, owner_id: i64, limit: i64) -> Result<Vec<BookingDetail>> {
    let sql = format!(
        "{BOOKING_DETAIL_SELECT} WHERE t.owner_id = ? ORDER BY b.booking_date DESC, s.start_time DESC LIMIT ?"
    );
    let bookings = sqlx::query_as::<_, BookingDetail>(&sql)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(bookings)
}

/// Platform-wide feed, newest booking first.
pub async fn list_recent_bookings(pool: &SqlitePool, limit: i64) -> Result<Vec<BookingDetail>> {
    let sql = format!("{BOOKING_DETAIL_SELECT} ORDER BY b.created_at DESC, b.id DESC LIMIT ?");
    let bookings = sqlx::query_as::<_, BookingDetail>(&sql)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    Ok(bookings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use turfbook_models::{AppRole, PayoutStatus, TurfStatus};

    use crate::testing::{account, approved_turf_with_slot, date, file_pool, pool};
    use crate::{
        get_payment_for_booking, is_foreign_key_violation, list_owner_payouts, set_setting,
        set_turf_status,
    };

    // 2026-10-19 is a Monday, matching the fixture slot.
    const MONDAY: &str = "2026-10-19";

    #[tokio::test]
    async fn commit_writes_booking_payment_and_ledger() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        let request = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };
        let committed = commit_booking(&pool, &request, date(MONDAY)).await.unwrap();

        assert_eq!(committed.booking.status, BookingStatus::Confirmed);
        assert_eq!(committed.booking.total_amount, Money::from(1200));
        assert_eq!(committed.booking.commission_amount, Money::from(120));
        assert_eq!(committed.booking.owner_amount, Money::from(1080));
        assert_eq!(committed.payment.status, PaymentStatus::Success);
        assert!(committed.payment.transaction_id.as_deref().unwrap().starts_with("MOCK_"));

        let ledger = list_owner_payouts(&pool, owner.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].owner_payout, Money::from(1080));
        assert_eq!(ledger[0].commission_rate, Money::from(10));

        let booked = booked_slot_ids(&pool, turf.id, date(MONDAY)).await.unwrap();
        assert!(booked.contains(&slot.id));
    }

    #[tokio::test]
    async fn second_booking_of_same_slot_conflicts() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let a = account(&pool, "a@example.com", AppRole::Player).await;
        let b = account(&pool, "b@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        let first = BookingRequest { player_id: a.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };
        commit_booking(&pool, &first, date(MONDAY)).await.unwrap();

        let second = BookingRequest { player_id: b.id, ..first };
        let err = commit_booking(&pool, &second, date(MONDAY)).await.unwrap_err();
        assert!(matches!(err, BookingError::AlreadyBooked(d) if d == date(MONDAY)));

        // A different week is free.
        let next_week = BookingRequest { date: date("2026-10-26"), ..second };
        commit_booking(&pool, &next_week, date(MONDAY)).await.unwrap();
        assert_eq!(count_bookings(&pool).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_bookings_get_one_winner_and_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let pool = file_pool(&dir).await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        let mut requests = Vec::new();
        for i in 0..8 {
            let player = account(&pool, &format!("p{i}@example.com"), AppRole::Player).await;
            requests.push(BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) });
        }
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let pool = pool.clone();
                tokio::spawn(async move { commit_booking(&pool, &request, date(MONDAY)).await })
            })
            .collect();

        let (mut won, mut conflicts) = (0, 0);
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => won += 1,
                Err(BookingError::AlreadyBooked(_)) => conflicts += 1,
                Err(e) => panic!("unexpected booking error: {e:?}"),
            }
        }
        assert_eq!((won, conflicts), (1, 7));
        assert_eq!(count_bookings(&pool).await.unwrap(), 1);
        assert_eq!(list_owner_payouts(&pool, owner.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_rechecks_slot_at_write_time() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;
        let base = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };

        let tuesday = BookingRequest { date: date("2026-10-20"), ..base };
        assert!(matches!(
            commit_booking(&pool, &tuesday, date(MONDAY)).await.unwrap_err(),
            BookingError::Unbookable(Unbookable::WrongDay { .. })
        ));

        assert!(matches!(
            commit_booking(&pool, &base, date("2026-10-20")).await.unwrap_err(),
            BookingError::Unbookable(Unbookable::PastDate(_))
        ));

        let missing = BookingRequest { slot_id: 999, ..base };
        assert!(matches!(
            commit_booking(&pool, &missing, date(MONDAY)).await.unwrap_err(),
            BookingError::SlotNotFound(999)
        ));

        set_turf_status(&pool, turf.id, TurfStatus::Approved, TurfStatus::Deactivated).await.unwrap();
        assert!(matches!(
            commit_booking(&pool, &base, date(MONDAY)).await.unwrap_err(),
            BookingError::Unbookable(Unbookable::TurfNotApproved)
        ));
        assert_eq!(count_bookings(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn commission_setting_changes_the_split() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;
        set_setting(&pool, "commission_rate", "15").await.unwrap();

        let request = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };
        let committed = commit_booking(&pool, &request, date(MONDAY)).await.unwrap();
        assert_eq!(committed.booking.commission_amount, Money::from(180));
        assert_eq!(committed.booking.owner_amount, Money::from(1020));
    }

    #[tokio::test]
    async fn cancel_frees_the_slot_and_voids_money() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let stranger = account(&pool, "x@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        let request = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };
        let committed = commit_booking(&pool, &request, date(MONDAY)).await.unwrap();
        let id = committed.booking.id;

        assert!(matches!(
            cancel_booking(&pool, id, stranger.id).await.unwrap_err(),
            BookingError::BookingNotFound(_)
        ));

        let cancelled = cancel_booking(&pool, id, player.id).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert!(matches!(
            cancel_booking(&pool, id, player.id).await.unwrap_err(),
            BookingError::NotCancellable(BookingStatus::Cancelled)
        ));

        let payment = get_payment_for_booking(&pool, id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Refunded);
        let ledger = list_owner_payouts(&pool, owner.id).await.unwrap();
        assert_eq!(ledger[0].status, PayoutStatus::Cancelled);

        assert!(booked_slot_ids(&pool, turf.id, date(MONDAY)).await.unwrap().is_empty());
        commit_booking(&pool, &request, date(MONDAY)).await.unwrap();
    }

    #[tokio::test]
    async fn dashboards_and_completion() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        for day in ["2026-10-19", "2026-10-26"] {
            let request = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(day) };
            commit_booking(&pool, &request, date(MONDAY)).await.unwrap();
        }

        let mine = list_player_bookings(&pool, player.id).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert_eq!(mine[0].booking.booking_date, date("2026-10-26"));
        assert_eq!(mine[0].turf_name, "Green Field");

        assert_eq!(list_owner_bookings(&pool, owner.id, 50).await.unwrap().len(), 2);
        assert_eq!(list_owner_bookings(&pool, player.id, 50).await.unwrap().len(), 0);
        assert_eq!(list_recent_bookings(&pool, 1).await.unwrap().len(), 1);

        let completed = complete_past_bookings(&pool, date("2026-10-20")).await.unwrap();
        assert_eq!(completed, 1);
        let first = get_booking(&pool, mine[1].booking.id).await.unwrap().unwrap();
        assert_eq!(first.status, BookingStatus::Completed);
    }

    #[tokio::test]
    async fn booked_slot_cannot_be_deleted() {
        let pool = pool().await;
        let owner = account(&pool, "owner@example.com", AppRole::Owner).await;
        let player = account(&pool, "player@example.com", AppRole::Player).await;
        let (turf, slot) = approved_turf_with_slot(&pool, &owner).await;

        let request = BookingRequest { player_id: player.id, turf_id: turf.id, slot_id: slot.id, date: date(MONDAY) };
        commit_booking(&pool, &request, date(MONDAY)).await.unwrap();

        let err = crate::delete_slot(&pool, slot.id).await.unwrap_err();
        assert!(is_foreign_key_violation(&err));
    }
}
