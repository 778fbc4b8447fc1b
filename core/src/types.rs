//! Shared primitive types used across the whole pipeline.

/// A sequential surrogate key assigned by the dimension builder (1..N).
pub type SurrogateKey = i64;

/// A calendar day encoded as YYYYMMDD.
pub type DateId = i32;

/// A card number as it appears in the source feed.
pub type CardNumber = i64;

/// The literal merchant-name prefix stripped before dedup and join.
pub const MERCHANT_PREFIX: &str = "fraud_";
