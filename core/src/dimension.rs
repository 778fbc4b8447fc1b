//! Dimension builder: dedup by natural key, surrogate keys in first-seen order.
//!
//! RULES:
//!   - Surrogate keys run 1..N with no gaps, assigned in a single
//!     order-preserving pass over the raw records. First occurrence wins.
//!   - Merchant names are normalized before they become a natural key.
//!   - DimDate is generated from the configured calendar, not from the data.
//!   - Rows are never mutated after creation; the resolver builds new rows
//!     carrying the foreign keys.

use crate::{
    error::{EtlError, EtlResult},
    raw::RawRecord,
    types::{CardNumber, DateId, SurrogateKey, MERCHANT_PREFIX},
};
use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::{
    collections::{hash_map::Entry, HashMap},
    hash::Hash,
};

const DAY_NAMES: [&str; 7] = [
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

const MONTH_NAMES: [&str; 12] = [
    "January", "February", "March", "April", "May", "June",
    "July", "August", "September", "October", "November", "December",
];

// ── Surrogate keys ─────────────────────────────────────────────

/// Insertion-ordered unique pass over natural keys.
/// A key seen for the first time receives the next surrogate key.
#[derive(Debug)]
pub struct SurrogateKeyAssigner<K> {
    seen: HashMap<K, SurrogateKey>,
    next: SurrogateKey,
}

impl<K: Eq + Hash> SurrogateKeyAssigner<K> {
    pub fn new() -> Self {
        Self { seen: HashMap::new(), next: 1 }
    }

    /// `Some(id)` on first sight of `key`, `None` for a duplicate.
    pub fn assign(&mut self, key: K) -> Option<SurrogateKey> {
        match self.seen.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let id = self.next;
                self.next += 1;
                slot.insert(id);
                Some(id)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl<K: Eq + Hash> Default for SurrogateKeyAssigner<K> {
    fn default() -> Self { Self::new() }
}

/// Keep the first record per natural key and build one row from it.
fn dedup_first_seen<'a, K, T>(
    records: &'a [RawRecord],
    key_of: impl Fn(&'a RawRecord) -> K,
    build: impl Fn(SurrogateKey, &RawRecord) -> T,
) -> Vec<T>
where
    K: Eq + Hash,
{
    let mut keys = SurrogateKeyAssigner::new();
    records
        .iter()
        .filter_map(|r| keys.assign(key_of(r)).map(|id| build(id, r)))
        .collect()
}

/// Strip the literal `fraud_` prefix. Applied before dedup and before every join.
pub fn normalize_merchant(name: &str) -> &str {
    name.strip_prefix(MERCHANT_PREFIX).unwrap_or(name)
}

// ── Rows ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimCity {
    pub city_id:    SurrogateKey,
    pub city_name:  String,
    pub state:      String,
    pub population: i64,
}

/// A deduplicated user whose city has not been resolved yet.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStage {
    pub user_id:    SurrogateKey,
    pub first_name: String,
    pub last_name:  String,
    pub dob:        NaiveDate,
    pub job:        String,
    pub gender:     String,
    pub street:     String,
    pub zip_code:   String,
    pub city:       String,
    pub state:      String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimUser {
    pub user_id:    SurrogateKey,
    pub first_name: String,
    pub last_name:  String,
    pub dob:        NaiveDate,
    pub job:        String,
    pub gender:     String,
    pub street:     String,
    pub zip_code:   String,
    pub city_id:    Option<SurrogateKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimMerchant {
    pub merch_id:      SurrogateKey,
    pub merch_name:    String,
    pub merch_lat:     f64,
    pub merch_long:    f64,
    pub merch_zipcode: Option<String>,
}

/// A deduplicated card with its holder's identity, before the user is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CardStage {
    pub cc_number:  CardNumber,
    pub first_name: String,
    pub last_name:  String,
    pub dob:        NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimCard {
    pub cc_number: CardNumber,
    pub user_id:   Option<SurrogateKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimDate {
    pub date_id:      DateId,
    pub full_date:    NaiveDate,
    pub day_name:     String,
    /// 1 = Monday .. 7 = Sunday
    pub day_of_week:  u32,
    pub day_of_month: u32,
    pub month_name:   String,
    pub month:        u32,
    pub year:         i32,
    pub quarter:      u32,
    pub is_weekend:   bool,
}

// ── Builders ───────────────────────────────────────────────────

pub fn build_cities(records: &[RawRecord]) -> Vec<DimCity> {
    dedup_first_seen(
        records,
        |r| (r.city.as_str(), r.state.as_str()),
        |id, r| DimCity {
            city_id:    id,
            city_name:  r.city.clone(),
            state:      r.state.clone(),
            population: r.city_pop,
        },
    )
}

pub fn build_users(records: &[RawRecord]) -> Vec<UserStage> {
    dedup_first_seen(
        records,
        |r| {
            (
                r.first_name.as_str(),
                r.last_name.as_str(),
                r.dob,
                r.street.as_str(),
                r.zip.as_str(),
                r.city.as_str(),
                r.state.as_str(),
            )
        },
        |id, r| UserStage {
            user_id:    id,
            first_name: r.first_name.clone(),
            last_name:  r.last_name.clone(),
            dob:        r.dob,
            job:        r.job.clone(),
            gender:     r.gender.clone(),
            street:     r.street.clone(),
            zip_code:   r.zip.clone(),
            city:       r.city.clone(),
            state:      r.state.clone(),
        },
    )
}

/// One row per normalized merchant name; location comes from its first occurrence.
pub fn build_merchants(records: &[RawRecord]) -> Vec<DimMerchant> {
    dedup_first_seen(
        records,
        |r| normalize_merchant(&r.merchant),
        |id, r| DimMerchant {
            merch_id:      id,
            merch_name:    normalize_merchant(&r.merchant).to_string(),
            merch_lat:     r.merch_lat,
            merch_long:    r.merch_long,
            merch_zipcode: r.merch_zipcode.clone(),
        },
    )
}

/// Cards keep their source number; the assigner only drives dedup here.
pub fn build_cards(records: &[RawRecord]) -> Vec<CardStage> {
    dedup_first_seen(
        records,
        |r| r.cc_number,
        |_, r| CardStage {
            cc_number:  r.cc_number,
            first_name: r.first_name.clone(),
            last_name:  r.last_name.clone(),
            dob:        r.dob,
        },
    )
}

pub fn date_id(date: NaiveDate) -> DateId {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

fn date_row(date: NaiveDate) -> DimDate {
    let weekday = date.weekday();
    let month = date.month();
    DimDate {
        date_id:      date_id(date),
        full_date:    date,
        day_name:     DAY_NAMES[weekday.num_days_from_monday() as usize].to_string(),
        day_of_week:  weekday.number_from_monday(),
        day_of_month: date.day(),
        month_name:   MONTH_NAMES[month as usize - 1].to_string(),
        month,
        year:         date.year(),
        quarter:      (month - 1) / 3 + 1,
        is_weekend:   matches!(weekday, Weekday::Sat | Weekday::Sun),
    }
}

/// One row per calendar day in `[start, end]`, inclusive.
pub fn build_calendar(start: NaiveDate, end: NaiveDate) -> EtlResult<Vec<DimDate>> {
    if start > end {
        return Err(EtlError::Config(format!(
            "calendar start {start} is after calendar end {end}"
        )));
    }
    Ok(start
        .iter_days()
        .take_while(|d| *d <= end)
        .map(date_row)
        .collect())
}

/// Everything the builder produces, before any relationship is resolved.
#[derive(Debug, Clone)]
pub struct DimensionSet {
    pub cities:    Vec<DimCity>,
    pub users:     Vec<UserStage>,
    pub merchants: Vec<DimMerchant>,
    pub cards:     Vec<CardStage>,
    pub dates:     Vec<DimDate>,
}

pub fn build_dimensions(
    records: &[RawRecord],
    calendar_start: NaiveDate,
    calendar_end: NaiveDate,
) -> EtlResult<DimensionSet> {
    let dates = build_calendar(calendar_start, calendar_end)?;
    let set = DimensionSet {
        cities:    build_cities(records),
        users:     build_users(records),
        merchants: build_merchants(records),
        cards:     build_cards(records),
        dates,
    };
    log::info!(
        "dimensions built: {} cities, {} users, {} merchants, {} cards, {} dates",
        set.cities.len(),
        set.users.len(),
        set.merchants.len(),
        set.cards.len(),
        set.dates.len()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn merchant_prefix_is_stripped_once() {
        assert_eq!(normalize_merchant("fraud_Acme"), "Acme");
        assert_eq!(normalize_merchant("Acme"), "Acme");
        assert_eq!(normalize_merchant("fraud_fraud_Acme"), "fraud_Acme");
        assert_eq!(normalize_merchant("Acme fraud_"), "Acme fraud_");
    }

    #[test]
    fn assigner_counts_from_one_and_ignores_duplicates() {
        let mut keys = SurrogateKeyAssigner::new();
        assert_eq!(keys.assign("a"), Some(1));
        assert_eq!(keys.assign("b"), Some(2));
        assert_eq!(keys.assign("a"), None);
        assert_eq!(keys.assign("c"), Some(3));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn calendar_row_fields() {
        // 2024-02-29 was a Thursday.
        let row = date_row(day(2024, 2, 29));
        assert_eq!(row.date_id, 20240229);
        assert_eq!(row.day_name, "Thursday");
        assert_eq!(row.day_of_week, 4);
        assert_eq!(row.month_name, "February");
        assert_eq!(row.quarter, 1);
        assert!(!row.is_weekend);

        let sunday = date_row(day(2024, 12, 29));
        assert_eq!(sunday.day_of_week, 7);
        assert_eq!(sunday.quarter, 4);
        assert!(sunday.is_weekend);
    }

    #[test]
    fn inverted_calendar_is_rejected() {
        assert!(build_calendar(day(2020, 1, 2), day(2020, 1, 1)).is_err());
    }
}
