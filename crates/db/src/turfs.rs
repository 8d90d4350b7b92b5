use anyhow::Result;
use chrono::{NaiveTime, Utc};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use turfbook_models::{
    MAX_TURF_IMAGES, Money, SportType, Turf, TurfImage, TurfSlot, TurfStatus, TurfSummary,
};

use crate::begin_write;

pub(crate) const TURF_COLUMNS: &str = "id, owner_id, name, description, city, area, address, \
    sport_type, amenities, hourly_price, status, created_at, updated_at";

pub(crate) const SLOT_COLUMNS: &str =
    "id, turf_id, day_of_week, start_time, end_time, price_override, is_active, created_at";

const IMAGE_COLUMNS: &str = "id, turf_id, image_url, display_order, created_at";

/// Owner-editable listing fields, used for both create and update.
#[derive(Debug, Clone)]
pub struct TurfFields {
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub area: String,
    pub address: Option<String>,
    pub sport_type: SportType,
    pub amenities: Vec<String>,
    pub hourly_price: Money,
}

#[derive(Debug, Clone, Default)]
pub struct TurfFilter {
    pub search: Option<String>,
    pub sport: Option<SportType>,
    pub city: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("a turf can have at most {} photos ({existing} already uploaded)", MAX_TURF_IMAGES)]
    LimitReached { existing: usize },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct NewSlot {
    pub day_of_week: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_override: Option<Money>,
}

// --- Turfs ---

/// New listings always start out pending review.
pub async fn create_turf(pool: &SqlitePool, owner_id: i64, fields: &TurfFields) -> Result<Turf> {
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO turfs (owner_id, name, description, city, area, address, sport_type, \
            amenities, hourly_price, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?) RETURNING {TURF_COLUMNS}"
    );
    let turf = sqlx::query_as::<_, Turf>(&sql)
        .bind(owner_id)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.city)
        .bind(&fields.area)
        .bind(&fields.address)
        .bind(fields.sport_type)
        .bind(Json(&fields.amenities))
        .bind(fields.hourly_price)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;
    Ok(turf)
}

/// Rewrites the editable fields. Status is left alone.
pub async fn update_turf(pool: &SqlitePool, id: i64, fields: &TurfFields) -> Result<Option<Turf>> {
    let sql = format!(
        "UPDATE turfs SET name = ?, description = ?, city = ?, area = ?, address = ?, \
            sport_type = ?, amenities = ?, hourly_price = ?, updated_at = ? \
         WHERE id = ? RETURNING {TURF_COLUMNS}"
    );
    let turf = sqlx::query_as::<_, Turf>(&sql)
        .bind(&fields.name)
        .bind(&fields.description)
        .bind(&fields.city)
        .bind(&fields.area)
        .bind(&fields.address)
        .bind(fields.sport_type)
        .bind(Json(&fields.amenities))
        .bind(fields.hourly_price)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(turf)
}

pub async fn get_turf(pool: &SqlitePool, id: i64) -> Result<Option<Turf>> {
    let sql = format!("SELECT {TURF_COLUMNS} FROM turfs WHERE id = ?");
    let turf = sqlx::query_as::<_, Turf>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(turf)
}

pub async fn list_owner_turfs(pool: &SqlitePool, owner_id: i64) -> Result<Vec<Turf>> {
    let sql = format!(
        "SELECT {TURF_COLUMNS} FROM turfs WHERE owner_id = ? ORDER BY created_at DESC, id DESC"
    );
    let turfs = sqlx::query_as::<_, Turf>(&sql)
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
    Ok(turfs)
}

/// Review queue, oldest submission first.
pub async fn list_pending_turfs(pool: &SqlitePool) -> Result<Vec<Turf>> {
    let sql = format!(
        "SELECT {TURF_COLUMNS} FROM turfs WHERE status = 'pending' ORDER BY created_at, id"
    );
    let turfs = sqlx::query_as::<_, Turf>(&sql).fetch_all(pool).await?;
    Ok(turfs)
}

pub async fn list_turfs(pool: &SqlitePool, status: Option<TurfStatus>) -> Result<Vec<Turf>> {
    let turfs = match status {
        Some(s) => {
            let sql = format!("SELECT {TURF_COLUMNS} FROM turfs WHERE status = ? ORDER BY id");
            sqlx::query_as::<_, Turf>(&sql)
                .bind(s)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("SELECT {TURF_COLUMNS} FROM turfs ORDER BY id");
            sqlx::query_as::<_, Turf>(&sql).fetch_all(pool).await?
        }
    };
    Ok(turfs)
}

/// Public catalog: approved turfs, newest first, each with its first photo.
/// `search` is a literal, case-insensitive substring of the name or area,
/// matched after the query since SQLite's `LIKE` has wildcards and ASCII-only
/// case folding.
pub async fn search_approved_turfs(pool: &SqlitePool, filter: &TurfFilter) -> Result<Vec<TurfSummary>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {TURF_COLUMNS}, \
            (SELECT i.image_url FROM turf_images i WHERE i.turf_id = turfs.id \
             ORDER BY i.display_order, i.id LIMIT 1) AS cover_image_url \
         FROM turfs WHERE status = 'approved'"
    ));

    if let Some(sport) = filter.sport {
        qb.push(" AND sport_type = ").push_bind(sport);
    }
    if let Some(city) = filter.city.as_deref().filter(|c| !c.is_empty()) {
        qb.push(" AND city = ").push_bind(city.to_string());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let mut turfs = qb.build_query_as::<TurfSummary>().fetch_all(pool).await?;

    if let Some(needle) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        turfs.retain(|t| {
            t.turf.name.to_lowercase().contains(&needle) || t.turf.area.to_lowercase().contains(&needle)
        });
    }
    Ok(turfs)
}

pub async fn approved_cities(pool: &SqlitePool) -> Result<Vec<String>> {
    let cities: Vec<(String,)> = sqlx::query_as(
        "SELECT DISTINCT city FROM turfs WHERE status = 'approved' ORDER BY city",
    )
    .fetch_all(pool)
    .await?;
    Ok(cities.into_iter().map(|(c,)| c).collect())
}

/// Moves a turf from `from` to `to`. Returns false if the turf was not in
/// `from` any more (or does not exist), so concurrent transitions cannot
/// both win.
pub async fn set_turf_status(
    pool: &SqlitePool,
    id: i64,
    from: TurfStatus,
    to: TurfStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE turfs SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
        .bind(to)
        .bind(Utc::now())
        .bind(id)
        .bind(from)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_turfs_by_status(pool: &SqlitePool, status: TurfStatus) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM turfs WHERE status = ?")
        .bind(status)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// --- Slots ---

pub async fn list_slots(pool: &SqlitePool, turf_id: i64) -> Result<Vec<TurfSlot>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM turf_slots WHERE turf_id = ? ORDER BY day_of_week, start_time, id"
    );
    let slots = sqlx::query_as::<_, TurfSlot>(&sql)
        .bind(turf_id)
        .fetch_all(pool)
        .await?;
    Ok(slots)
}

pub async fn list_active_slots_for_day(
    pool: &SqlitePool,
    turf_id: i64,
    day_of_week: i64,
) -> Result<Vec<TurfSlot>> {
    let sql = format!(
        "SELECT {SLOT_COLUMNS} FROM turf_slots \
         WHERE turf_id = ? AND day_of_week = ? AND is_active = 1 ORDER BY start_time, id"
    );
    let slots = sqlx::query_as::<_, TurfSlot>(&sql)
        .bind(turf_id)
        .bind(day_of_week)
        .fetch_all(pool)
        .await?;
    Ok(slots)
}

pub async fn get_slot(pool: &SqlitePool, id: i64) -> Result<Option<TurfSlot>> {
    let sql = format!("SELECT {SLOT_COLUMNS} FROM turf_slots WHERE id = ?");
    let slot = sqlx::query_as::<_, TurfSlot>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(slot)
}

pub async fn add_slot(pool: &SqlitePool, turf_id: i64, slot: &NewSlot) -> Result<TurfSlot> {
    let sql = format!(
        "INSERT INTO turf_slots (turf_id, day_of_week, start_time, end_time, price_override, \
            is_active, created_at) \
         VALUES (?, ?, ?, ?, ?, 1, ?) RETURNING {SLOT_COLUMNS}"
    );
    let created = sqlx::query_as::<_, TurfSlot>(&sql)
        .bind(turf_id)
        .bind(slot.day_of_week)
        .bind(slot.start_time)
        .bind(slot.end_time)
        .bind(slot.price_override)
        .bind(Utc::now())
        .fetch_one(pool)
        .await?;
    Ok(created)
}

pub async fn set_slot_active(pool: &SqlitePool, id: i64, active: bool) -> Result<Option<TurfSlot>> {
    let sql = format!("UPDATE turf_slots SET is_active = ? WHERE id = ? RETURNING {SLOT_COLUMNS}");
    let slot = sqlx::query_as::<_, TurfSlot>(&sql)
        .bind(active)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(slot)
}

/// Fails with a foreign key violation while bookings still reference the slot.
pub async fn delete_slot(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM turf_slots WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Images ---

pub async fn list_turf_images(pool: &SqlitePool, turf_id: i64) -> Result<Vec<TurfImage>> {
    let sql = format!(
        "SELECT {IMAGE_COLUMNS} FROM turf_images WHERE turf_id = ? ORDER BY display_order, id"
    );
    let images = sqlx::query_as::<_, TurfImage>(&sql)
        .bind(turf_id)
        .fetch_all(pool)
        .await?;
    Ok(images)
}

/// Attaches a batch of photos after the turf's existing ones. The count and
/// the inserts share one write transaction, so concurrent uploads cannot
/// take a turf past [`MAX_TURF_IMAGES`] and a failed batch leaves no rows.
pub async fn add_turf_images(
    pool: &SqlitePool,
    turf_id: i64,
    image_urls: &[String],
) -> Result<Vec<TurfImage>, ImageError> {
    let mut tx = begin_write(pool).await?;

    let (existing, next_order): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(MAX(display_order) + 1, 0) FROM turf_images WHERE turf_id = ?",
    )
    .bind(turf_id)
    .fetch_one(&mut *tx)
    .await?;
    let existing = existing as usize;
    if existing + image_urls.len() > MAX_TURF_IMAGES {
        return Err(ImageError::LimitReached { existing });
    }

    let sql = format!(
        "INSERT INTO turf_images (turf_id, image_url, display_order, created_at) \
         VALUES (?, ?, ?, ?) RETURNING {IMAGE_COLUMNS}"
    );
    let now = Utc::now();
    let mut images = Vec::with_capacity(image_urls.len());
    for (order, url) in (next_order..).zip(image_urls) {
        let image = sqlx::query_as::<_, TurfImage>(&sql)
            .bind(turf_id)
            .bind(url)
            .bind(order)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
        images.push(image);
    }

    tx.commit().await?;
    Ok(images)
}

pub async fn get_turf_image(pool: &SqlitePool, id: i64) -> Result<Option<TurfImage>> {
    let sql = format!("SELECT {IMAGE_COLUMNS} FROM turf_images WHERE id = ?");
    let image = sqlx::query_as::<_, TurfImage>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(image)
}

pub async fn delete_turf_image(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query("DELETE FROM turf_images WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
