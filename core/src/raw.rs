//! The raw transaction feed: one denormalized row per card transaction.
//!
//! RULE: the header is validated before any row is read.
//! A feed missing a required column is rejected as a whole.

use crate::{
    error::{EtlError, EtlResult},
    schema::missing_columns,
    types::CardNumber,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::{fs::File, io::Read, path::Path};

/// Source column names every feed must carry.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "trans_date_trans_time",
    "cc_num",
    "merchant",
    "category",
    "amt",
    "first",
    "last",
    "gender",
    "street",
    "city",
    "state",
    "zip",
    "lat",
    "long",
    "city_pop",
    "job",
    "dob",
    "trans_num",
    "merch_lat",
    "merch_long",
    "is_fraud",
    "merch_zipcode",
];

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "trans_date_trans_time", with = "timestamp")]
    pub timestamp:     NaiveDateTime,
    #[serde(rename = "cc_num")]
    pub cc_number:     CardNumber,
    pub merchant:      String,
    pub category:      String,
    #[serde(rename = "amt")]
    pub amount:        f64,
    #[serde(rename = "first")]
    pub first_name:    String,
    #[serde(rename = "last")]
    pub last_name:     String,
    pub gender:        String,
    pub street:        String,
    pub city:          String,
    pub state:         String,
    pub zip:           String,
    #[serde(rename = "lat")]
    pub latitude:      f64,
    #[serde(rename = "long")]
    pub longitude:     f64,
    pub city_pop:      i64,
    pub job:           String,
    pub dob:           NaiveDate,
    #[serde(rename = "trans_num")]
    pub trx_id:        String,
    pub merch_lat:     f64,
    pub merch_long:    f64,
    /// Left as text; the fact assembler owns the boolean coercion.
    pub is_fraud:      String,
    pub merch_zipcode: Option<String>,
    /// Physical line where the record starts. Header is line 1.
    #[serde(skip)]
    pub line:          u64,
}

/// Read the feed at `path`. Fails fast if the file does not exist.
pub fn read_input(path: &Path) -> EtlResult<Vec<RawRecord>> {
    if !path.exists() {
        return Err(EtlError::InputMissing {
            path: path.display().to_string(),
        });
    }
    let file = File::open(path)?;
    read_records(file, &path.display().to_string())
}

/// Read every record from a CSV source. `source_name` is used in errors only.
pub fn read_records<R: Read>(source: R, source_name: &str) -> EtlResult<Vec<RawRecord>> {
    let mut rdr = csv::Reader::from_reader(source);

    let headers = rdr.headers()?.clone();
    let missing = missing_columns(&headers, REQUIRED_COLUMNS.iter().copied());
    if !missing.is_empty() {
        return Err(EtlError::MissingColumns {
            source_name: source_name.to_string(),
            columns:     missing,
        });
    }

    let mut records = Vec::new();
    let mut row = csv::StringRecord::new();
    while rdr.read_record(&mut row)? {
        let mut record: RawRecord = row.deserialize(Some(&headers))?;
        record.line = row.position().map(|p| p.line()).unwrap_or_default();
        records.push(record);
    }
    log::info!("read {} raw records from {source_name}", records.len());
    Ok(records)
}

/// `YYYY-MM-DD HH:MM:SS` on the way out; a `T` separator is also accepted on the way in.
pub mod timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&ts.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}
