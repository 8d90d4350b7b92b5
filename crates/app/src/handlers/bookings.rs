use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use turfbook_db::{BookingRequest, CommittedBooking};
use turfbook_models::{Booking, BookingDetail, Payment, partition_bookings};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct CreateBooking {
    turf_id: i64,
    slot_id: i64,
    date: NaiveDate,
}

/// Books and pays in one step; the mock gateway always succeeds.
pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateBooking>,
) -> ApiResult<(StatusCode, Json<CommittedBooking>)> {
    let request = BookingRequest {
        player_id: user.id,
        turf_id: body.turf_id,
        slot_id: body.slot_id,
        date: body.date,
    };
    let committed = turfbook_db::commit_booking(&state.pool, &request, state.today()).await?;
    info!(
        "Booking {} confirmed: turf {} slot {} on {} for {}",
        committed.booking.id, body.turf_id, body.slot_id, body.date, committed.booking.total_amount
    );
    Ok((StatusCode::CREATED, Json(committed)))
}

#[derive(Serialize)]
pub struct MyBookings {
    upcoming: Vec<BookingDetail>,
    past: Vec<BookingDetail>,
}

pub async fn my_bookings(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<MyBookings>> {
    let bookings = turfbook_db::list_player_bookings(&state.pool, user.id).await?;
    let (upcoming, past) = partition_bookings(bookings, state.today());
    Ok(Json(MyBookings { upcoming, past }))
}

#[derive(Serialize)]
pub struct BookingReceipt {
    booking: Booking,
    payment: Option<Payment>,
}

/// A player's own booking with its payment. Other players' bookings read as
/// not found.
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<BookingReceipt>> {
    let booking = turfbook_db::get_booking(&state.pool, id)
        .await?
        .filter(|b| b.player_id == user.id)
        .ok_or_else(|| ApiError::not_found("Booking"))?;
    let payment = turfbook_db::get_payment_for_booking(&state.pool, booking.id).await?;
    Ok(Json(BookingReceipt { booking, payment }))
}

pub async fn cancel_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Booking>> {
    let booking = turfbook_db::cancel_booking(&state.pool, id, user.id).await?;
    info!("Booking {id} cancelled by player {}", user.id);
    Ok(Json(booking))
}
