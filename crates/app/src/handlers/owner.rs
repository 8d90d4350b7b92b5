use axum::Json;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use turfbook_db::{ImageError, NewSlot, TurfFields};
use turfbook_models::{
    AMENITIES, BookingDetail, EarningsSummary, MAX_TURF_IMAGES, Money, SportType, Turf, TurfImage,
    TurfSlot, WeekdaySlots, group_slots_by_day, parse_clock, validate_slot_window,
};
use turfbook_storage::ImageStore;

use crate::auth::OwnerUser;
use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

/// Rows shown on the owner bookings dashboard.
const OWNER_BOOKINGS_LIMIT: i64 = 50;

/// Loads a turf and checks that `owner` owns it.
async fn owned_turf(state: &AppState, owner: &OwnerUser, turf_id: i64) -> ApiResult<Turf> {
    let turf = turfbook_db::get_turf(&state.pool, turf_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Turf"))?;
    if turf.owner_id != owner.0.id {
        return Err(ApiError::Forbidden("you do not own this turf".into()));
    }
    Ok(turf)
}

// --- Listings ---

#[derive(Deserialize)]
pub struct TurfForm {
    name: String,
    description: Option<String>,
    city: String,
    area: String,
    address: Option<String>,
    sport_type: SportType,
    #[serde(default)]
    amenities: Vec<String>,
    hourly_price: Money,
}

fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn required_text(value: &str, field: &str) -> ApiResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::bad_request(format!("{field} is required")));
    }
    Ok(value.to_string())
}

impl TurfForm {
    fn validate(self) -> ApiResult<TurfFields> {
        let hourly_price = self.hourly_price.round_to_paise();
        if !hourly_price.is_positive() {
            return Err(ApiError::bad_request("hourly price must be greater than zero"));
        }
        let mut amenities: Vec<String> = Vec::with_capacity(self.amenities.len());
        for amenity in self.amenities {
            let amenity = amenity.trim().to_string();
            if !AMENITIES.contains(&amenity.as_str()) {
                return Err(ApiError::bad_request(format!("unknown amenity {amenity:?}")));
            }
            if !amenities.contains(&amenity) {
                amenities.push(amenity);
            }
        }
        Ok(TurfFields {
            name: required_text(&self.name, "name")?,
            description: optional_text(self.description),
            city: required_text(&self.city, "city")?,
            area: required_text(&self.area, "area")?,
            address: optional_text(self.address),
            sport_type: self.sport_type,
            amenities,
            hourly_price,
        })
    }
}

pub async fn list_turfs(State(state): State<AppState>, owner: OwnerUser) -> ApiResult<Json<Vec<Turf>>> {
    Ok(Json(turfbook_db::list_owner_turfs(&state.pool, owner.0.id).await?))
}

pub async fn create_turf(
    State(state): State<AppState>,
    owner: OwnerUser,
    Json(form): Json<TurfForm>,
) -> ApiResult<(StatusCode, Json<Turf>)> {
    let fields = form.validate()?;
    let turf = turfbook_db::create_turf(&state.pool, owner.0.id, &fields).await?;
    info!("Turf {} ({}) submitted for review by owner {}", turf.id, turf.name, owner.0.id);
    Ok((StatusCode::CREATED, Json(turf)))
}

pub async fn update_turf(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
    Json(form): Json<TurfForm>,
) -> ApiResult<Json<Turf>> {
    owned_turf(&state, &owner, id).await?;
    let fields = form.validate()?;
    turfbook_db::update_turf(&state.pool, id, &fields)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Turf"))
}

/// Switches an approved listing off, or a deactivated one back on.
pub async fn toggle_turf(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Turf>> {
    let turf = owned_turf(&state, &owner, id).await?;
    let next = turf.status.toggled().ok_or_else(|| {
        ApiError::Conflict(format!("a {} listing cannot be toggled", turf.status))
    })?;
    if !turfbook_db::set_turf_status(&state.pool, id, turf.status, next).await? {
        return Err(ApiError::Conflict("listing status changed, reload and retry".into()));
    }
    info!("Turf {id} {} -> {next}", turf.status);
    turfbook_db::get_turf(&state.pool, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Turf"))
}

// --- Slots ---

#[derive(Deserialize)]
pub struct SlotForm {
    day_of_week: i64,
    start_time: String,
    end_time: String,
    price_override: Option<Money>,
}

#[derive(Deserialize)]
pub struct SlotSwitch {
    is_active: bool,
}

pub async fn list_slots(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<WeekdaySlots>>> {
    let turf = owned_turf(&state, &owner, id).await?;
    let slots = turfbook_db::list_slots(&state.pool, turf.id).await?;
    Ok(Json(group_slots_by_day(slots)))
}

pub async fn add_slot(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
    Json(form): Json<SlotForm>,
) -> ApiResult<(StatusCode, Json<TurfSlot>)> {
    let turf = owned_turf(&state, &owner, id).await?;
    let clock = |s: &str| {
        parse_clock(s).ok_or_else(|| ApiError::bad_request(format!("invalid time {s:?}, expected HH:MM")))
    };
    let slot = NewSlot {
        day_of_week: form.day_of_week,
        start_time: clock(&form.start_time)?,
        end_time: clock(&form.end_time)?,
        price_override: form.price_override.map(Money::round_to_paise),
    };

    let existing = turfbook_db::list_slots(&state.pool, turf.id).await?;
    validate_slot_window(
        slot.day_of_week,
        slot.start_time,
        slot.end_time,
        slot.price_override,
        &existing,
    )?;

    let slot = turfbook_db::add_slot(&state.pool, turf.id, &slot).await?;
    Ok((StatusCode::CREATED, Json(slot)))
}

async fn owned_slot(state: &AppState, owner: &OwnerUser, slot_id: i64) -> ApiResult<TurfSlot> {
    let slot = turfbook_db::get_slot(&state.pool, slot_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Slot"))?;
    owned_turf(state, owner, slot.turf_id).await?;
    Ok(slot)
}

pub async fn switch_slot(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
    Json(body): Json<SlotSwitch>,
) -> ApiResult<Json<TurfSlot>> {
    owned_slot(&state, &owner, id).await?;
    turfbook_db::set_slot_active(&state.pool, id, body.is_active)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Slot"))
}

pub async fn delete_slot(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    owned_slot(&state, &owner, id).await?;
    match turfbook_db::delete_slot(&state.pool, id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(ApiError::not_found("Slot")),
        Err(e) if turfbook_db::is_foreign_key_violation(&e) => Err(ApiError::Conflict(
            "slot has bookings; deactivate it instead".into(),
        )),
        Err(e) => Err(e.into()),
    }
}

// --- Photos ---

struct Upload {
    file_name: String,
    bytes: Vec<u8>,
}

pub async fn list_images(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<TurfImage>>> {
    let turf = owned_turf(&state, &owner, id).await?;
    Ok(Json(turfbook_db::list_turf_images(&state.pool, turf.id).await?))
}

/// Accepts one or more `file` parts. The whole request is rejected if it
/// would take the turf past its photo limit.
pub async fn upload_images(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Vec<TurfImage>>)> {
    let turf = owned_turf(&state, &owner, id).await?;

    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(ApiError::bad_request(format!("{file_name:?} is empty")));
        }
        uploads.push(Upload { file_name, bytes: bytes.to_vec() });
    }
    if uploads.is_empty() {
        return Err(ApiError::bad_request("no files in upload (expected `file` fields)"));
    }

    // add_turf_images checks the cap again inside its transaction.
    let existing = turfbook_db::list_turf_images(&state.pool, turf.id).await?;
    if existing.len() + uploads.len() > MAX_TURF_IMAGES {
        return Err(ImageError::LimitReached { existing: existing.len() }.into());
    }

    let keys = uploads
        .iter()
        .enumerate()
        .map(|(i, u)| ImageStore::object_key(turf.id, i, &u.file_name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut urls = Vec::with_capacity(uploads.len());
    for (upload, key) in uploads.iter().zip(&keys) {
        match state.store.put(key, &upload.bytes).await {
            Ok(url) => urls.push(url),
            Err(e) => {
                discard_files(&state.store, &urls).await;
                return Err(e.into());
            }
        }
    }

    let images = match turfbook_db::add_turf_images(&state.pool, turf.id, &urls).await {
        Ok(images) => images,
        Err(e) => {
            discard_files(&state.store, &urls).await;
            return Err(e.into());
        }
    };
    info!("{} photo(s) added to turf {}", images.len(), turf.id);
    Ok((StatusCode::CREATED, Json(images)))
}

/// Removes files written for an upload that did not go through.
async fn discard_files(store: &ImageStore, urls: &[String]) {
    for url in urls {
        if let Err(e) = store.delete_url(url).await {
            warn!("Could not remove orphaned photo {url}: {e:#}");
        }
    }
}

pub async fn delete_image(
    State(state): State<AppState>,
    owner: OwnerUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let image = turfbook_db::get_turf_image(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Image"))?;
    owned_turf(&state, &owner, image.turf_id).await?;

    if !turfbook_db::delete_turf_image(&state.pool, id).await? {
        return Err(ApiError::not_found("Image"));
    }
    // The row is gone either way; a stray file is only disk space.
    if let Err(e) = state.store.delete_url(&image.image_url).await {
        warn!("Image {id} removed but its file was not: {e:#}");
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Dashboard ---

pub async fn list_bookings(
    State(state): State<AppState>,
    owner: OwnerUser,
) -> ApiResult<Json<Vec<BookingDetail>>> {
    let bookings =
        turfbook_db::list_owner_bookings(&state.pool, owner.0.id, OWNER_BOOKINGS_LIMIT).await?;
    Ok(Json(bookings))
}

#[derive(Serialize)]
pub struct OwnerEarnings {
    turfs: usize,
    #[serde(flatten)]
    summary: EarningsSummary,
}

pub async fn earnings(State(state): State<AppState>, owner: OwnerUser) -> ApiResult<Json<OwnerEarnings>> {
    let turfs = turfbook_db::list_owner_turfs(&state.pool, owner.0.id).await?;
    let entries = turfbook_db::list_owner_payouts(&state.pool, owner.0.id).await?;
    Ok(Json(OwnerEarnings {
        turfs: turfs.len(),
        summary: EarningsSummary::from_entries(&entries),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(price: i64, amenities: &[&str]) -> TurfForm {
        TurfForm {
            name: "  Green Field ".into(),
            description: Some("   ".into()),
            city: "Pune".into(),
            area: "Baner".into(),
            address: None,
            sport_type: SportType::Football,
            amenities: amenities.iter().map(|a| a.to_string()).collect(),
            hourly_price: Money::from(price),
        }
    }

    #[test]
    fn form_is_trimmed_and_deduplicated() {
        let fields = form(1200, &["Parking", "Parking", "Floodlights"]).validate().unwrap();
        assert_eq!(fields.name, "Green Field");
        assert_eq!(fields.description, None);
        assert_eq!(fields.amenities, vec!["Parking", "Floodlights"]);
    }

    #[test]
    fn form_rejects_bad_price_and_amenities() {
        assert!(form(0, &[]).validate().is_err());
        let priced = |price: &str| TurfForm { hourly_price: price.parse().unwrap(), ..form(1, &[]) };
        assert!(priced("0.001").validate().is_err());
        assert_eq!(priced("0.005").validate().unwrap().hourly_price, "0.01".parse::<Money>().unwrap());
        assert!(form(500, &["Jacuzzi"]).validate().is_err());
        let mut blank = form(500, &[]);
        blank.area = " ".into();
        assert!(blank.validate().is_err());
    }
}
