use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::Serialize;

use crate::{BookingDetail, BookingStatus, DAY_NAMES, Money, Turf, TurfSlot, TurfStatus, effective_price};

/// Weekday index as stored on slots: 0 = Sunday .. 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i64 {
    i64::from(date.weekday().num_days_from_sunday())
}

/// Parses "HH:MM" or "HH:MM:SS".
pub fn parse_clock(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    #[serde(flatten)]
    pub slot: TurfSlot,
    pub price: Money,
    pub booked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub day_of_week: i64,
    pub slots: Vec<SlotAvailability>,
}

/// Active slots of `turf` that fall on `date`'s weekday, earliest first,
/// each flagged if its id is in `booked`.
pub fn slot_availability(
    turf: &Turf,
    slots: Vec<TurfSlot>,
    date: NaiveDate,
    booked: &HashSet<i64>,
) -> DayAvailability {
    let day = day_of_week(date);
    let mut open: Vec<SlotAvailability> = slots
        .into_iter()
        .filter(|s| s.turf_id == turf.id && s.is_active && s.day_of_week == day)
        .map(|slot| SlotAvailability {
            price: effective_price(&slot, turf),
            booked: booked.contains(&slot.id),
            slot,
        })
        .collect();
    open.sort_by_key(|a| (a.slot.start_time, a.slot.id));
    DayAvailability {
        date,
        day_of_week: day,
        slots: open,
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Unbookable {
    #[error("turf is not open for bookings")]
    TurfNotApproved,
    #[error("slot does not belong to this turf")]
    SlotNotOnTurf,
    #[error("slot is inactive")]
    SlotInactive,
    #[error("slot runs on {slot_day} but {date} is a {date_day}")]
    WrongDay {
        date: NaiveDate,
        slot_day: &'static str,
        date_day: &'static str,
    },
    #[error("cannot book a date in the past ({0})")]
    PastDate(NaiveDate),
}

/// Write-time checks run before a booking is inserted.
pub fn check_bookable(
    turf: &Turf,
    slot: &TurfSlot,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<(), Unbookable> {
    if turf.status != TurfStatus::Approved {
        return Err(Unbookable::TurfNotApproved);
    }
    if slot.turf_id != turf.id {
        return Err(Unbookable::SlotNotOnTurf);
    }
    if !slot.is_active {
        return Err(Unbookable::SlotInactive);
    }
    let day = day_of_week(date);
    if slot.day_of_week != day {
        return Err(Unbookable::WrongDay {
            date,
            slot_day: day_name(slot.day_of_week),
            date_day: day_name(day),
        });
    }
    if date < today {
        return Err(Unbookable::PastDate(date));
    }
    Ok(())
}

fn day_name(day: i64) -> &'static str {
    usize::try_from(day)
        .ok()
        .and_then(|d| DAY_NAMES.get(d).copied())
        .unwrap_or("?")
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SlotRuleError {
    #[error("day_of_week must be 0 (Sunday) to 6 (Saturday), got {0}")]
    InvalidDay(i64),
    #[error("start time must be before end time")]
    EmptyWindow,
    #[error("overlaps the {start}-{end} slot on the same day")]
    Overlaps { start: NaiveTime, end: NaiveTime },
    #[error("price override must be greater than zero")]
    NonPositivePrice,
}

/// Validates a new slot against the turf's existing slots.
pub fn validate_slot_window(
    day: i64,
    start: NaiveTime,
    end: NaiveTime,
    price_override: Option<Money>,
    existing: &[TurfSlot],
) -> Result<(), SlotRuleError> {
    if !(0..=6).contains(&day) {
        return Err(SlotRuleError::InvalidDay(day));
    }
    if start >= end {
        return Err(SlotRuleError::EmptyWindow);
    }
    if price_override.is_some_and(|p| !p.is_positive()) {
        return Err(SlotRuleError::NonPositivePrice);
    }
    if let Some(clash) = existing
        .iter()
        .find(|s| s.day_of_week == day && s.start_time < end && start < s.end_time)
    {
        return Err(SlotRuleError::Overlaps {
            start: clash.start_time,
            end: clash.end_time,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekdaySlots {
    pub day_of_week: i64,
    pub day: &'static str,
    pub slots: Vec<TurfSlot>,
}

/// Groups slots Sunday first, dropping days without any.
pub fn group_slots_by_day(mut slots: Vec<TurfSlot>) -> Vec<WeekdaySlots> {
    slots.sort_by_key(|s| (s.day_of_week, s.start_time, s.id));
    let mut days: Vec<WeekdaySlots> = Vec::new();
    for slot in slots {
        match days.last_mut() {
            Some(group) if group.day_of_week == slot.day_of_week => group.slots.push(slot),
            _ => days.push(WeekdaySlots {
                day_of_week: slot.day_of_week,
                day: day_name(slot.day_of_week),
                slots: vec![slot],
            }),
        }
    }
    days
}

/// Splits a player's bookings into upcoming (confirmed, today or later) and
/// everything else. Input order is preserved in both halves.
pub fn partition_bookings(
    bookings: Vec<BookingDetail>,
    today: NaiveDate,
) -> (Vec<BookingDetail>, Vec<BookingDetail>) {
    bookings.into_iter().partition(|b| {
        b.booking.status == BookingStatus::Confirmed && b.booking.booking_date >= today
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::types::Json;

    use crate::{Booking, SportType};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn turf(status: TurfStatus) -> Turf {
        Turf {
            id: 1,
            owner_id: 9,
            name: "Box Arena".into(),
            description: None,
            city: "Mumbai".into(),
            area: "Andheri".into(),
            address: None,
            sport_type: SportType::Cricket,
            amenities: Json(vec!["Parking".into()]),
            hourly_price: Money::from(800),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn slot(id: i64, day: i64, start: NaiveTime, end: NaiveTime, active: bool) -> TurfSlot {
        TurfSlot {
            id,
            turf_id: 1,
            day_of_week: day,
            start_time: start,
            end_time: end,
            price_override: None,
            is_active: active,
            created_at: Utc::now(),
        }
    }

    fn detail(id: i64, status: BookingStatus, on: &str) -> BookingDetail {
        BookingDetail {
            booking: Booking {
                id,
                player_id: 2,
                turf_id: 1,
                slot_id: 1,
                booking_date: date(on),
                total_amount: Money::from(800),
                commission_amount: Money::from(80),
                owner_amount: Money::from(720),
                status,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            turf_name: "Box Arena".into(),
            turf_city: "Mumbai".into(),
            turf_area: "Andheri".into(),
            sport_type: SportType::Cricket,
            start_time: t(6, 0),
            end_time: t(7, 0),
        }
    }

    #[test]
    fn sunday_is_zero() {
        // 2026-10-18 is a Sunday.
        assert_eq!(day_of_week(date("2026-10-18")), 0);
        assert_eq!(day_of_week(date("2026-10-24")), 6);
    }

    #[test]
    fn parses_short_and_long_clock_times() {
        assert_eq!(parse_clock("06:30"), Some(t(6, 30)));
        assert_eq!(parse_clock("18:00:00"), Some(t(18, 0)));
        assert_eq!(parse_clock("25:00"), None);
        assert_eq!(parse_clock("six"), None);
    }

    #[test]
    fn availability_filters_day_and_active_and_sorts() {
        let monday = date("2026-10-19");
        let slots = vec![
            slot(1, 1, t(8, 0), t(9, 0), true),
            slot(2, 1, t(6, 0), t(7, 0), true),
            slot(3, 1, t(7, 0), t(8, 0), false),
            slot(4, 2, t(6, 0), t(7, 0), true),
        ];
        let booked: HashSet<i64> = [1].into_iter().collect();
        let day = slot_availability(&turf(TurfStatus::Approved), slots, monday, &booked);

        assert_eq!(day.day_of_week, 1);
        let ids: Vec<i64> = day.slots.iter().map(|s| s.slot.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert!(!day.slots[0].booked);
        assert!(day.slots[1].booked);
        assert_eq!(day.slots[0].price, Money::from(800));
    }

    #[test]
    fn bookable_checks() {
        let monday = date("2026-10-19");
        let approved = turf(TurfStatus::Approved);
        let ok = slot(1, 1, t(6, 0), t(7, 0), true);

        assert_eq!(check_bookable(&approved, &ok, monday, monday), Ok(()));
        assert_eq!(
            check_bookable(&turf(TurfStatus::Deactivated), &ok, monday, monday),
            Err(Unbookable::TurfNotApproved)
        );
        assert_eq!(
            check_bookable(&approved, &slot(1, 1, t(6, 0), t(7, 0), false), monday, monday),
            Err(Unbookable::SlotInactive)
        );
        assert!(matches!(
            check_bookable(&approved, &slot(1, 2, t(6, 0), t(7, 0), true), monday, monday),
            Err(Unbookable::WrongDay { slot_day: "Tuesday", date_day: "Monday", .. })
        ));
        assert_eq!(
            check_bookable(&approved, &ok, monday, date("2026-10-20")),
            Err(Unbookable::PastDate(monday))
        );

        let mut foreign = ok.clone();
        foreign.turf_id = 99;
        assert_eq!(
            check_bookable(&approved, &foreign, monday, monday),
            Err(Unbookable::SlotNotOnTurf)
        );
    }

    #[test]
    fn slot_window_rules() {
        let existing = vec![slot(1, 1, t(6, 0), t(7, 0), true)];

        assert_eq!(validate_slot_window(1, t(7, 0), t(8, 0), None, &existing), Ok(()));
        assert_eq!(validate_slot_window(2, t(6, 0), t(7, 0), None, &existing), Ok(()));
        assert_eq!(
            validate_slot_window(7, t(6, 0), t(7, 0), None, &existing),
            Err(SlotRuleError::InvalidDay(7))
        );
        assert_eq!(
            validate_slot_window(1, t(9, 0), t(9, 0), None, &existing),
            Err(SlotRuleError::EmptyWindow)
        );
        assert_eq!(
            validate_slot_window(1, t(6, 30), t(7, 30), None, &existing),
            Err(SlotRuleError::Overlaps { start: t(6, 0), end: t(7, 0) })
        );
        assert_eq!(
            validate_slot_window(3, t(6, 0), t(7, 0), Some(Money::ZERO), &existing),
            Err(SlotRuleError::NonPositivePrice)
        );
    }

    #[test]
    fn groups_by_weekday() {
        let groups = group_slots_by_day(vec![
            slot(1, 3, t(9, 0), t(10, 0), true),
            slot(2, 0, t(6, 0), t(7, 0), true),
            slot(3, 3, t(7, 0), t(8, 0), false),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].day, "Sunday");
        assert_eq!(groups[1].day, "Wednesday");
        let wed: Vec<i64> = groups[1].slots.iter().map(|s| s.id).collect();
        assert_eq!(wed, vec![3, 1]);
    }

    #[test]
    fn upcoming_is_confirmed_and_not_past() {
        let today = date("2026-10-19");
        let (upcoming, past) = partition_bookings(
            vec![
                detail(1, BookingStatus::Confirmed, "2026-10-25"),
                detail(2, BookingStatus::Confirmed, "2026-10-19"),
                detail(3, BookingStatus::Cancelled, "2026-10-25"),
                detail(4, BookingStatus::Confirmed, "2026-10-01"),
            ],
            today,
        );
        let up: Vec<i64> = upcoming.iter().map(|b| b.booking.id).collect();
        let done: Vec<i64> = past.iter().map(|b| b.booking.id).collect();
        assert_eq!(up, vec![1, 2]);
        assert_eq!(done, vec![3, 4]);
    }
}
