use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Money, PayoutEntry, PayoutStatus, Turf, TurfSlot};

/// Platform cut when no `commission_rate` setting exists.
pub const DEFAULT_COMMISSION_PERCENT: Decimal = Decimal::TEN;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommissionRateError {
    #[error("commission rate {0:?} is not a number")]
    Malformed(String),
    #[error("commission rate must be between 0 and 100, got {0}")]
    OutOfRange(Decimal),
}

/// Commission expressed as a percentage of the booking price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    pub fn from_percent(percent: Decimal) -> Result<Self, CommissionRateError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(CommissionRateError::OutOfRange(percent));
        }
        Ok(Self(percent))
    }

    pub fn percent(self) -> Decimal {
        self.0
    }

    fn fraction(self) -> Decimal {
        self.0 / Decimal::ONE_HUNDRED
    }
}

impl Default for CommissionRate {
    fn default() -> Self {
        Self(DEFAULT_COMMISSION_PERCENT)
    }
}

impl FromStr for CommissionRate {
    type Err = CommissionRateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let percent = s
            .trim()
            .parse::<Decimal>()
            .map_err(|_| CommissionRateError::Malformed(s.to_string()))?;
        Self::from_percent(percent)
    }
}

impl TryFrom<Decimal> for CommissionRate {
    type Error = CommissionRateError;

    fn try_from(percent: Decimal) -> Result<Self, Self::Error> {
        Self::from_percent(percent)
    }
}

impl From<CommissionRate> for Decimal {
    fn from(rate: CommissionRate) -> Decimal {
        rate.0
    }
}

/// How one booking's price divides between platform and owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceSplit {
    pub total: Money,
    pub commission: Money,
    pub owner_amount: Money,
}

impl PriceSplit {
    pub fn compute(price: Money, rate: CommissionRate) -> Self {
        let commission = Money::new(price.amount() * rate.fraction()).round_to_paise();
        let owner_amount = (price - commission).round_to_paise();
        Self {
            total: price,
            commission,
            owner_amount,
        }
    }
}

/// Slot override if the owner set one, else the turf's hourly price.
pub fn effective_price(slot: &TurfSlot, turf: &Turf) -> Money {
    slot.price_override.unwrap_or(turf.hourly_price)
}

/// Totals over payout ledger rows. Cancelled rows are left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EarningsSummary {
    pub bookings: usize,
    pub gross: Money,
    pub commission: Money,
    pub owner_payout: Money,
}

impl EarningsSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a PayoutEntry>) -> Self {
        entries
            .into_iter()
            .filter(|e| e.status != PayoutStatus::Cancelled)
            .fold(Self::default(), |acc, e| Self {
                bookings: acc.bookings + 1,
                gross: acc.gross + e.total_amount,
                commission: acc.commission + e.commission_amount,
                owner_payout: acc.owner_payout + e.owner_payout,
            })
    }
}
