//! Star-schema warehouse builder for a flat card-transaction feed.
//!
//! STAGE ORDER (fixed, strictly sequential):
//!   1. raw        read and validate the input feed
//!   2. dimension  dedup + surrogate keys for city, user, merchant, card; calendar for date
//!   3. resolver   natural-key joins that attach foreign keys
//!   4. fact       one fact row per raw record
//!   5. loader     six tables into the sink, parents before children

pub mod config;
pub mod dimension;
pub mod error;
pub mod fact;
pub mod loader;
pub mod raw;
pub mod resolver;
pub mod schema;
pub mod sink;
pub mod transform;
pub mod types;
