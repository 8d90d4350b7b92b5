use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::info;
use turfbook_db::COMMISSION_RATE_KEY;
use turfbook_models::{
    BookingDetail, CommissionRate, EarningsSummary, Money, PlatformSetting, Turf, TurfStatus,
};

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Rows shown on the admin bookings dashboard.
const ADMIN_BOOKINGS_LIMIT: i64 = 100;

pub async fn pending_turfs(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<Vec<Turf>>> {
    Ok(Json(turfbook_db::list_pending_turfs(&state.pool).await?))
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    status: TurfStatus,
}

/// Approves or rejects a pending listing.
pub async fn review_turf(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<ReviewRequest>,
) -> ApiResult<Json<Turf>> {
    let turf = turfbook_db::get_turf(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turf"))?;
    let next = turf.status.review(body.status).ok_or_else(|| {
        ApiError::Conflict(format!(
            "cannot move a {} listing to {}; only pending listings are approved or rejected",
            turf.status, body.status
        ))
    })?;
    if !turfbook_db::set_turf_status(&state.pool, id, turf.status, next).await? {
        return Err(ApiError::Conflict("listing was already reviewed".into()));
    }
    info!("Turf {id} {next} by admin {}", admin.0.id);
    turfbook_db::get_turf(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Turf"))
}

pub async fn recent_bookings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<BookingDetail>>> {
    let bookings = turfbook_db::list_recent_bookings(&state.pool, ADMIN_BOOKINGS_LIMIT).await?;
    Ok(Json(bookings))
}

#[derive(Serialize)]
pub struct PlatformStats {
    total_bookings: i64,
    pending_turfs: i64,
    approved_turfs: i64,
    gross_revenue: Money,
    commission_earned: Money,
    owner_payouts: Money,
}

pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<PlatformStats>> {
    let payouts = turfbook_db::list_all_payouts(&state.pool).await?;
    let earnings = EarningsSummary::from_entries(&payouts);
    Ok(Json(PlatformStats {
        total_bookings: turfbook_db::count_bookings(&state.pool).await?,
        pending_turfs: turfbook_db::count_turfs_by_status(&state.pool, TurfStatus::Pending).await?,
        approved_turfs: turfbook_db::count_turfs_by_status(&state.pool, TurfStatus::Approved).await?,
        gross_revenue: earnings.gross,
        commission_earned: earnings.commission,
        owner_payouts: earnings.owner_payout,
    }))
}

pub async fn list_settings(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<PlatformSetting>>> {
    Ok(Json(turfbook_db::list_settings(&state.pool).await?))
}

pub async fn get_setting(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(key): Path<String>,
) -> ApiResult<Json<PlatformSetting>> {
    turfbook_db::get_setting(&state.pool, &key)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Setting"))
}

#[derive(Deserialize)]
pub struct SettingValue {
    value: String,
}

pub async fn put_setting(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> ApiResult<Json<PlatformSetting>> {
    let key = key.trim();
    if key.is_empty() {
        return Err(ApiError::bad_request("setting key is required"));
    }
    let value = body.value.trim().to_string();
    let value = if key == COMMISSION_RATE_KEY {
        // Store the normalized percentage.
        value.parse::<CommissionRate>()?.percent().normalize().to_string()
    } else {
        value
    };
    let setting = turfbook_db::set_setting(&state.pool, key, &value).await?;
    info!("Setting {key} = {value:?} by admin {}", admin.0.id);
    Ok(Json(setting))
}
