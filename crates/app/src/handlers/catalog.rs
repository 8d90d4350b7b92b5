use std::str::FromStr;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use strum::IntoEnumIterator;
use turfbook_db::TurfFilter;
use turfbook_models::{
    AMENITIES, DayAvailability, SportType, Turf, TurfDetail, TurfStatus, TurfSummary, day_of_week,
    slot_availability,
};

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version_string(),
    }))
}

#[derive(Deserialize)]
pub struct TurfQuery {
    search: Option<String>,
    sport: Option<String>,
    city: Option<String>,
}

/// Blank values and "all" mean no filter.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

impl TurfQuery {
    fn into_filter(self) -> ApiResult<TurfFilter> {
        let sport = non_blank(self.sport)
            .map(|s| {
                SportType::from_str(&s.to_lowercase())
                    .map_err(|_| ApiError::bad_request(format!("unknown sport {s:?}")))
            })
            .transpose()?;
        Ok(TurfFilter {
            search: non_blank(self.search),
            sport,
            city: non_blank(self.city),
        })
    }
}

pub async fn list_turfs(
    State(state): State<AppState>,
    Query(query): Query<TurfQuery>,
) -> ApiResult<Json<Vec<TurfSummary>>> {
    let filter = query.into_filter()?;
    let turfs = turfbook_db::search_approved_turfs(&state.pool, &filter).await?;
    Ok(Json(turfs))
}

pub async fn list_cities(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(turfbook_db::approved_cities(&state.pool).await?))
}

#[derive(Serialize)]
pub struct SportOption {
    value: SportType,
    label: &'static str,
}

pub async fn list_sports() -> Json<Vec<SportOption>> {
    Json(
        SportType::iter()
            .map(|value| SportOption { value, label: value.label() })
            .collect(),
    )
}

pub async fn list_amenities() -> Json<Vec<&'static str>> {
    Json(AMENITIES.to_vec())
}

/// Public lookups only see approved listings.
async fn approved_turf(state: &AppState, id: i64) -> ApiResult<Turf> {
    turfbook_db::get_turf(&state.pool, id)
        .await?
        .filter(|t| t.status == TurfStatus::Approved)
        .ok_or_else(|| ApiError::not_found("Turf"))
}

pub async fn get_turf(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<TurfDetail>> {
    let turf = approved_turf(&state, id).await?;
    let images = turfbook_db::list_turf_images(&state.pool, turf.id).await?;
    Ok(Json(TurfDetail { turf, images }))
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    date: NaiveDate,
}

pub async fn availability(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<DayAvailability>> {
    let today = state.today();
    if query.date < today {
        return Err(ApiError::bad_request(format!(
            "cannot show availability for a past date ({})",
            query.date
        )));
    }
    let turf = approved_turf(&state, id).await?;
    let slots =
        turfbook_db::list_active_slots_for_day(&state.pool, turf.id, day_of_week(query.date)).await?;
    let booked = turfbook_db::booked_slot_ids(&state.pool, turf.id, query.date).await?;
    Ok(Json(slot_availability(&turf, slots, query.date, &booked)))
}
