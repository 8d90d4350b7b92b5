use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use strum::{AsRefStr, Display, EnumIter, EnumString};

mod availability;
mod money;
mod pricing;

pub use availability::{
    DayAvailability, SlotAvailability, SlotRuleError, Unbookable, WeekdaySlots, check_bookable,
    day_of_week, group_slots_by_day, parse_clock, partition_bookings, slot_availability,
    validate_slot_window,
};
pub use money::Money;
pub use pricing::{
    CommissionRate, CommissionRateError, DEFAULT_COMMISSION_PERCENT, EarningsSummary, PriceSplit,
    effective_price,
};

/// Maximum number of photos a turf listing may carry.
pub const MAX_TURF_IMAGES: usize = 5;

/// Amenity vocabulary offered to owners.
pub const AMENITIES: [&str; 8] = [
    "Parking",
    "Changing Room",
    "Drinking Water",
    "Floodlights",
    "Washroom",
    "Cafeteria",
    "First Aid",
    "WiFi",
];

pub const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// --- Enums ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AppRole {
    Admin,
    Owner,
    Player,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SportType {
    Cricket,
    Football,
    Badminton,
    Tennis,
    Basketball,
    Hockey,
    Volleyball,
    Other,
}

impl SportType {
    pub fn label(self) -> &'static str {
        match self {
            SportType::Cricket => "Cricket",
            SportType::Football => "Football",
            SportType::Badminton => "Badminton",
            SportType::Tennis => "Tennis",
            SportType::Basketball => "Basketball",
            SportType::Hockey => "Hockey",
            SportType::Volleyball => "Volleyball",
            SportType::Other => "Other",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TurfStatus {
    Pending,
    Approved,
    Rejected,
    Deactivated,
}

impl TurfStatus {
    /// Admin decision on a listing. Only pending listings are reviewed, and
    /// the decision must be approve or reject.
    pub fn review(self, decision: TurfStatus) -> Option<TurfStatus> {
        match (self, decision) {
            (TurfStatus::Pending, TurfStatus::Approved | TurfStatus::Rejected) => Some(decision),
            _ => None,
        }
    }

    /// Owner on/off switch: approved and deactivated swap, nothing else moves.
    pub fn toggled(self) -> Option<TurfStatus> {
        match self {
            TurfStatus::Approved => Some(TurfStatus::Deactivated),
            TurfStatus::Deactivated => Some(TurfStatus::Approved),
            _ => None,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold the slot for their date.
    pub const HOLDING: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn holds_slot(self) -> bool {
        Self::HOLDING.contains(&self)
    }

    pub fn can_cancel(self) -> bool {
        self.holds_slot()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
    Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Paid,
    Cancelled,
}

// --- Accounts ---

/// Login identity plus role, as carried in tokens and returned by `/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub role: AppRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub full_name: String,
    pub phone: Option<String>,
    pub city: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Listings ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Turf {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub city: String,
    pub area: String,
    pub address: Option<String>,
    pub sport_type: SportType,
    pub amenities: Json<Vec<String>>,
    pub hourly_price: Money,
    pub status: TurfStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing card: the turf plus its first photo.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TurfSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub turf: Turf,
    pub cover_image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurfDetail {
    #[serde(flatten)]
    pub turf: Turf,
    pub images: Vec<TurfImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TurfImage {
    pub id: i64,
    pub turf_id: i64,
    pub image_url: String,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TurfSlot {
    pub id: i64,
    pub turf_id: i64,
    pub day_of_week: i64,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub price_override: Option<Money>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

// --- Bookings and money movement ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: i64,
    pub player_id: i64,
    pub turf_id: i64,
    pub slot_id: i64,
    pub booking_date: NaiveDate,
    pub total_amount: Money,
    pub commission_amount: Money,
    pub owner_amount: Money,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A booking joined with the turf and slot it refers to, for dashboards.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BookingDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub booking: Booking,
    pub turf_name: String,
    pub turf_city: String,
    pub turf_area: String,
    pub sport_type: SportType,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: i64,
    pub booking_id: i64,
    pub amount: Money,
    pub payment_method: Option<String>,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutEntry {
    pub id: i64,
    pub booking_id: i64,
    pub owner_id: i64,
    pub total_amount: Money,
    pub commission_amount: Money,
    pub commission_rate: Money,
    pub owner_payout: Money,
    pub status: PayoutStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformSetting {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn review_only_moves_pending_listings() {
        assert_eq!(TurfStatus::Pending.review(TurfStatus::Approved), Some(TurfStatus::Approved));
        assert_eq!(TurfStatus::Pending.review(TurfStatus::Rejected), Some(TurfStatus::Rejected));
        assert_eq!(TurfStatus::Pending.review(TurfStatus::Deactivated), None);
        assert_eq!(TurfStatus::Approved.review(TurfStatus::Rejected), None);
    }

    #[test]
    fn toggle_swaps_approved_and_deactivated() {
        assert_eq!(TurfStatus::Approved.toggled(), Some(TurfStatus::Deactivated));
        assert_eq!(TurfStatus::Deactivated.toggled(), Some(TurfStatus::Approved));
        assert_eq!(TurfStatus::Pending.toggled(), None);
        assert_eq!(TurfStatus::Rejected.toggled(), None);
    }

    #[test]
    fn only_pending_and_confirmed_hold_a_slot() {
        assert!(BookingStatus::Pending.holds_slot());
        assert!(BookingStatus::Confirmed.holds_slot());
        assert!(!BookingStatus::Completed.holds_slot());
        assert!(!BookingStatus::Cancelled.can_cancel());
    }

    #[test]
    fn enums_use_lowercase_names() {
        assert_eq!(SportType::from_str("volleyball").unwrap(), SportType::Volleyball);
        assert_eq!(AppRole::Owner.to_string(), "owner");
        assert_eq!(serde_json::to_string(&TurfStatus::Deactivated).unwrap(), "\"deactivated\"");
        assert!(AppRole::from_str("superuser").is_err());
    }
}
