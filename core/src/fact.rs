//! Fact assembler: one FactTransaction per raw record.
//!
//! PRECONDITION: `trx_id` is unique in the feed. The assembler neither
//! deduplicates nor checks this; duplicates pass straight through.

use crate::{
    dimension::{date_id, DimDate},
    error::{EtlError, EtlResult},
    raw::RawRecord,
    types::{CardNumber, DateId, SurrogateKey},
};
use anyhow::anyhow;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactTransaction {
    pub trx_id:        String,
    #[serde(with = "crate::raw::timestamp")]
    pub trx_timestamp: NaiveDateTime,
    pub date_id:       DateId,
    pub cc_number:     CardNumber,
    pub merchant_id:   Option<SurrogateKey>,
    pub amount:        f64,
    pub is_fraud:      bool,
    pub category:      String,
    pub latitude:      f64,
    pub longitude:     f64,
}

/// Coerce a source fraud flag to a boolean. `line` is used in errors only.
pub fn coerce_fraud_flag(value: &str, line: u64) -> EtlResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "1.0" | "true"  => Ok(true),
        "0" | "0.0" | "false" => Ok(false),
        _ => Err(EtlError::InvalidValue {
            field: "is_fraud".into(),
            value: value.to_string(),
            line,
        }),
    }
}

/// Project raw records plus their resolved merchant ids into fact rows.
/// `merchant_ids` must be aligned with `records`.
pub fn assemble_facts(
    records: &[RawRecord],
    merchant_ids: &[Option<SurrogateKey>],
) -> EtlResult<Vec<FactTransaction>> {
    if records.len() != merchant_ids.len() {
        return Err(anyhow!(
            "merchant ids ({}) not aligned with records ({})",
            merchant_ids.len(),
            records.len()
        )
        .into());
    }

    let facts = records
        .iter()
        .zip(merchant_ids)
        .map(|(r, merchant_id)| {
            Ok::<_, EtlError>(FactTransaction {
                trx_id:        r.trx_id.clone(),
                trx_timestamp: r.timestamp,
                date_id:       date_id(r.timestamp.date()),
                cc_number:     r.cc_number,
                merchant_id:   *merchant_id,
                amount:        r.amount,
                is_fraud:      coerce_fraud_flag(&r.is_fraud, r.line)?,
                category:      r.category.clone(),
                latitude:      r.latitude,
                longitude:     r.longitude,
            })
        })
        .collect::<EtlResult<Vec<_>>>()?;

    log::info!("assembled {} fact rows", facts.len());
    Ok(facts)
}

/// Facts whose `date_id` has no DimDate row. An integrity gap, not an error.
pub fn date_coverage_gaps<'a>(
    facts: &'a [FactTransaction],
    dates: &[DimDate],
) -> Vec<&'a FactTransaction> {
    let known: HashSet<DateId> = dates.iter().map(|d| d.date_id).collect();
    facts.iter().filter(|f| !known.contains(&f.date_id)).collect()
}
