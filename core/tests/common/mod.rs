//! Shared fixture: a small hand-written transaction feed.
#![allow(dead_code)]

use warehouse_core::{
    config::EtlConfig,
    raw::{read_records, RawRecord},
};
use std::path::Path;

pub const HEADER: &str = "trans_date_trans_time,cc_num,merchant,category,amt,first,last,\
gender,street,city,state,zip,lat,long,city_pop,job,dob,trans_num,merch_lat,merch_long,\
is_fraud,merch_zipcode";

/// One feed row. Defaults describe Ann Lee from NYC buying groceries.
#[derive(Debug, Clone)]
pub struct Txn {
    pub trx_id:    String,
    pub timestamp: &'static str,
    pub cc_number: i64,
    pub merchant:  &'static str,
    pub first:     &'static str,
    pub last:      &'static str,
    pub dob:       &'static str,
    pub street:    &'static str,
    pub zip:       &'static str,
    pub city:      &'static str,
    pub state:     &'static str,
    pub city_pop:  i64,
    pub is_fraud:  &'static str,
    pub merch_zip: &'static str,
}

impl Txn {
    pub fn new(trx_id: &str, cc_number: i64) -> Self {
        Self {
            trx_id:    trx_id.to_string(),
            timestamp: "2020-06-21 12:14:25",
            cc_number,
            merchant:  "fraud_Kirlin and Sons",
            first:     "Ann",
            last:      "Lee",
            dob:       "1990-01-01",
            street:    "1 Main St",
            zip:       "10001",
            city:      "NYC",
            state:     "NY",
            city_pop:  8_000_000,
            is_fraud:  "0",
            merch_zip: "10002",
        }
    }

    pub fn merchant(mut self, merchant: &'static str) -> Self {
        self.merchant = merchant;
        self
    }

    pub fn holder(mut self, first: &'static str, last: &'static str, dob: &'static str) -> Self {
        self.first = first;
        self.last = last;
        self.dob = dob;
        self
    }

    pub fn address(
        mut self,
        street: &'static str,
        zip: &'static str,
        city: &'static str,
        state: &'static str,
    ) -> Self {
        self.street = street;
        self.zip = zip;
        self.city = city;
        self.state = state;
        self
    }

    pub fn city_pop(mut self, city_pop: i64) -> Self {
        self.city_pop = city_pop;
        self
    }

    pub fn at(mut self, timestamp: &'static str) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn fraud(mut self, flag: &'static str) -> Self {
        self.is_fraud = flag;
        self
    }

    pub fn merch_zip(mut self, zip: &'static str) -> Self {
        self.merch_zip = zip;
        self
    }

    pub fn to_csv_line(&self) -> String {
        format!(
            "{},{},{},grocery_pos,12.50,{},{},F,{},{},{},{},40.71,-74.00,{},Engineer,{},{},40.10,-73.90,{},{}",
            self.timestamp,
            self.cc_number,
            self.merchant,
            self.first,
            self.last,
            self.street,
            self.city,
            self.state,
            self.zip,
            self.city_pop,
            self.dob,
            self.trx_id,
            self.is_fraud,
            self.merch_zip,
        )
    }
}

pub fn feed(txns: &[Txn]) -> String {
    let mut out = String::from(HEADER);
    out.push('\n');
    for t in txns {
        out.push_str(&t.to_csv_line());
        out.push('\n');
    }
    out
}

pub fn records(txns: &[Txn]) -> Vec<RawRecord> {
    read_records(feed(txns).as_bytes(), "test feed").expect("fixture feed parses")
}

/// Defaults rooted at `dir`, with the input feed written in place.
pub fn config_with_feed(dir: &Path, txns: &[Txn]) -> EtlConfig {
    let config = EtlConfig::for_dir(dir);
    std::fs::create_dir_all(config.input_file.parent().expect("input has a parent"))
        .expect("create data dir");
    std::fs::write(&config.input_file, feed(txns)).expect("write feed");
    config
}

/// A handful of rows spread over three users, three cities and three merchants.
pub fn sample_feed() -> Vec<Txn> {
    vec![
        Txn::new("t1", 4_000_000_000_000_001),
        Txn::new("t2", 4_000_000_000_000_002).merchant("fraud_ShopCo"),
        Txn::new("t3", 4_000_000_000_000_003)
            .holder("Bob", "Stone", "1975-07-14")
            .address("9 Elm Rd", "60601", "Chicago", "IL")
            .city_pop(2_700_000)
            .merchant("ShopCo"),
        Txn::new("t4", 4_000_000_000_000_001).at("2020-06-22 08:00:00").fraud("1"),
        Txn::new("t5", 4_000_000_000_000_004)
            .holder("Cara", "Diaz", "2001-03-30")
            .address("5 Bay St", "94105", "San Francisco", "CA")
            .city_pop(870_000)
            .merchant("fraud_Haley Group"),
        Txn::new("t6", 4_000_000_000_000_003)
            .holder("Bob", "Stone", "1975-07-14")
            .address("9 Elm Rd", "60601", "Chicago", "IL")
            .city_pop(2_700_000)
            .at("2020-06-27 19:45:00"),
    ]
}
