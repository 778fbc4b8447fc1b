//! Relationship resolver: attaches foreign keys by joining on natural keys.
//!
//! Joins (all left joins; no row is ever dropped):
//!   - DimUser         ⋈ DimCity     on (city, state)            → city_id
//!   - DimCard         ⋈ DimUser     on (first, last, dob)       → user_id
//!   - FactTransaction ⋈ DimMerchant on normalized merchant name → merchant_id
//!
//! An unmatched key is handled by the configured `JoinPolicy`:
//! a NULL foreign key (counted and logged), or a hard `UnmatchedKey` error.

use crate::{
    dimension::{normalize_merchant, CardStage, DimCard, DimCity, DimMerchant, DimUser, UserStage},
    error::{EtlError, EtlResult},
    raw::RawRecord,
    types::SurrogateKey,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt::Debug, hash::Hash};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPolicy {
    /// Unmatched keys yield a NULL foreign key.
    #[default]
    NullAndContinue,
    /// The first unmatched key fails the transform.
    Strict,
}

/// Outcome counts for one relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    pub relation:  String,
    pub matched:   usize,
    pub unmatched: usize,
    /// Keys that matched more than one target row; the lowest surrogate key won.
    pub ambiguous: usize,
}

impl JoinStats {
    fn new(relation: &str) -> Self {
        Self { relation: relation.to_string(), ..Self::default() }
    }
}

/// Natural key → surrogate key lookup over one join target.
struct JoinIndex<K> {
    keys:      HashMap<K, SurrogateKey>,
    ambiguous: usize,
}

impl<K: Eq + Hash + Debug> JoinIndex<K> {
    /// The target must be non-empty and unique on `K`.
    fn unique(
        dimension: &str,
        rows: impl IntoIterator<Item = (K, SurrogateKey)>,
    ) -> EtlResult<Self> {
        let mut keys = HashMap::new();
        for (key, id) in rows {
            if keys.contains_key(&key) {
                return Err(EtlError::MalformedJoinTarget {
                    dimension: dimension.to_string(),
                    key:       format!("{key:?}"),
                });
            }
            keys.insert(key, id);
        }
        Self::non_empty(dimension, keys, 0)
    }

    /// The target may repeat `K`; the lowest surrogate key wins.
    fn first_wins(
        dimension: &str,
        rows: impl IntoIterator<Item = (K, SurrogateKey)>,
    ) -> EtlResult<Self> {
        let mut keys: HashMap<K, SurrogateKey> = HashMap::new();
        let mut ambiguous = 0;
        for (key, id) in rows {
            match keys.get_mut(&key) {
                Some(existing) => {
                    ambiguous += 1;
                    *existing = (*existing).min(id);
                }
                None => {
                    keys.insert(key, id);
                }
            }
        }
        Self::non_empty(dimension, keys, ambiguous)
    }

    fn non_empty(
        dimension: &str,
        keys: HashMap<K, SurrogateKey>,
        ambiguous: usize,
    ) -> EtlResult<Self> {
        if keys.is_empty() {
            return Err(EtlError::EmptyJoinTarget { dimension: dimension.to_string() });
        }
        Ok(Self { keys, ambiguous })
    }

    fn attach(
        &self,
        key: &K,
        policy: JoinPolicy,
        stats: &mut JoinStats,
    ) -> EtlResult<Option<SurrogateKey>> {
        match self.keys.get(key) {
            Some(id) => {
                stats.matched += 1;
                Ok(Some(*id))
            }
            None if policy == JoinPolicy::Strict => Err(EtlError::UnmatchedKey {
                relation: stats.relation.clone(),
                key:      format!("{key:?}"),
            }),
            None => {
                stats.unmatched += 1;
                Ok(None)
            }
        }
    }
}

fn report(stats: &JoinStats) {
    if stats.unmatched > 0 {
        log::warn!(
            "{}: {} of {} rows unmatched, foreign key left NULL",
            stats.relation,
            stats.unmatched,
            stats.matched + stats.unmatched
        );
    }
    if stats.ambiguous > 0 {
        log::warn!(
            "{}: {} duplicate join keys in target, lowest id used",
            stats.relation,
            stats.ambiguous
        );
    }
    log::debug!("{}: {} rows matched", stats.relation, stats.matched);
}

/// DimUser ⋈ DimCity on (city, state).
pub fn resolve_user_cities(
    users: &[UserStage],
    cities: &[DimCity],
    policy: JoinPolicy,
) -> EtlResult<(Vec<DimUser>, JoinStats)> {
    let index = JoinIndex::unique(
        "dim_city",
        cities.iter().map(|c| ((c.city_name.as_str(), c.state.as_str()), c.city_id)),
    )?;
    let mut stats = JoinStats::new("dim_user.city_id");

    let resolved = users
        .iter()
        .map(|u| {
            let city_id = index.attach(&(u.city.as_str(), u.state.as_str()), policy, &mut stats)?;
            Ok::<_, EtlError>(DimUser {
                user_id:    u.user_id,
                first_name: u.first_name.clone(),
                last_name:  u.last_name.clone(),
                dob:        u.dob,
                job:        u.job.clone(),
                gender:     u.gender.clone(),
                street:     u.street.clone(),
                zip_code:   u.zip_code.clone(),
                city_id,
            })
        })
        .collect::<EtlResult<Vec<_>>>()?;

    report(&stats);
    Ok((resolved, stats))
}

/// DimCard ⋈ DimUser on (first name, last name, birthdate).
pub fn resolve_card_users(
    cards: &[CardStage],
    users: &[DimUser],
    policy: JoinPolicy,
) -> EtlResult<(Vec<DimCard>, JoinStats)> {
    let index = JoinIndex::<(&str, &str, NaiveDate)>::first_wins(
        "dim_user",
        users
            .iter()
            .map(|u| ((u.first_name.as_str(), u.last_name.as_str(), u.dob), u.user_id)),
    )?;
    let mut stats = JoinStats::new("dim_card.user_id");
    stats.ambiguous = index.ambiguous;

    let resolved = cards
        .iter()
        .map(|c| {
            let key = (c.first_name.as_str(), c.last_name.as_str(), c.dob);
            Ok::<_, EtlError>(DimCard {
                cc_number: c.cc_number,
                user_id:   index.attach(&key, policy, &mut stats)?,
            })
        })
        .collect::<EtlResult<Vec<_>>>()?;

    report(&stats);
    Ok((resolved, stats))
}

/// FactTransaction ⋈ DimMerchant on normalized merchant name.
/// Returns one merchant id per raw record, in record order.
pub fn resolve_merchant_ids(
    records: &[RawRecord],
    merchants: &[DimMerchant],
    policy: JoinPolicy,
) -> EtlResult<(Vec<Option<SurrogateKey>>, JoinStats)> {
    let index = JoinIndex::unique(
        "dim_merchant",
        merchants.iter().map(|m| (m.merch_name.as_str(), m.merch_id)),
    )?;
    let mut stats = JoinStats::new("fact_transaction.merchant_id");

    let ids = records
        .iter()
        .map(|r| index.attach(&normalize_merchant(&r.merchant), policy, &mut stats))
        .collect::<EtlResult<Vec<_>>>()?;

    report(&stats);
    Ok((ids, stats))
}
