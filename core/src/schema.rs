//! Table schemas for the six warehouse tables.
//!
//! LOAD ORDER (fixed, parents before children, never reordered):
//!   1. dim_city
//!   2. dim_merchant
//!   3. dim_date
//!   4. dim_user          (references dim_city)
//!   5. dim_card          (references dim_user)
//!   6. fact_transaction  (references dim_card, dim_merchant, dim_date)
//!
//! Column order here is the column order of the CSV artifacts.

use rusqlite::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Date,
    Timestamp,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Real                          => "REAL",
            ColumnType::Text
            | ColumnType::Date
            | ColumnType::Timestamp                   => "TEXT",
        }
    }

    /// Convert one CSV cell into a SQL value. Empty cells are NULL.
    pub fn parse_cell(self, cell: &str) -> Option<Value> {
        if cell.is_empty() {
            return Some(Value::Null);
        }
        match self {
            ColumnType::Integer => cell
                .parse::<i64>()
                .ok()
                // Integer columns written by float-typed tools come through as "28705.0".
                .or_else(|| {
                    cell.parse::<f64>()
                        .ok()
                        .filter(|f| f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(Value::Integer),
            ColumnType::Real => cell.parse::<f64>().ok().map(Value::Real),
            ColumnType::Boolean => match cell.to_ascii_lowercase().as_str() {
                "true" | "1"  => Some(Value::Integer(1)),
                "false" | "0" => Some(Value::Integer(0)),
                _             => None,
            },
            ColumnType::Text | ColumnType::Date | ColumnType::Timestamp => {
                Some(Value::Text(cell.to_string()))
            }
        }
    }
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub ty:   ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name:      &'static str,
    pub file_name: &'static str,
    pub columns:   &'static [Column],
    /// Tables that must be fully loaded before this one.
    pub parents:   &'static [&'static str],
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Append-only table: no unique or foreign-key constraints,
    /// so a re-run appends duplicate rows instead of failing.
    pub fn create_sql(&self) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.ty.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({cols})", self.name)
    }

    /// One multi-row INSERT covering `rows` rows.
    pub fn insert_sql(&self, rows: usize) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        let values = vec![format!("({placeholders})"); rows].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {values}",
            self.name,
            self.column_names().join(", ")
        )
    }

    /// Position of every schema column inside `headers`, in schema order.
    pub fn column_positions(&self, headers: &csv::StringRecord) -> Result<Vec<usize>, Vec<String>> {
        let missing = missing_columns(headers, self.columns.iter().map(|c| c.name));
        if !missing.is_empty() {
            return Err(missing);
        }
        Ok(self
            .columns
            .iter()
            .filter_map(|c| headers.iter().position(|h| h == c.name))
            .collect())
    }
}

/// Names from `required` that do not appear in `headers`.
pub fn missing_columns<'a>(
    headers: &csv::StringRecord,
    required: impl IntoIterator<Item = &'a str>,
) -> Vec<String> {
    required
        .into_iter()
        .filter(|name| !headers.iter().any(|h| h == *name))
        .map(str::to_string)
        .collect()
}

// ── Dimensions ─────────────────────────────────────────────────

pub static DIM_CITY: TableSchema = TableSchema {
    name:      "dim_city",
    file_name: "dim_city.csv",
    columns: &[
        col("city_id", ColumnType::Integer),
        col("city_name", ColumnType::Text),
        col("state", ColumnType::Text),
        col("population", ColumnType::Integer),
    ],
    parents: &[],
};

pub static DIM_MERCHANT: TableSchema = TableSchema {
    name:      "dim_merchant",
    file_name: "dim_merchant.csv",
    columns: &[
        col("merch_id", ColumnType::Integer),
        col("merch_name", ColumnType::Text),
        col("merch_lat", ColumnType::Real),
        col("merch_long", ColumnType::Real),
        col("merch_zipcode", ColumnType::Text),
    ],
    parents: &[],
};

pub static DIM_DATE: TableSchema = TableSchema {
    name:      "dim_date",
    file_name: "dim_date.csv",
    columns: &[
        col("date_id", ColumnType::Integer),
        col("full_date", ColumnType::Date),
        col("day_name", ColumnType::Text),
        col("day_of_week", ColumnType::Integer),
        col("day_of_month", ColumnType::Integer),
        col("month_name", ColumnType::Text),
        col("month", ColumnType::Integer),
        col("year", ColumnType::Integer),
        col("quarter", ColumnType::Integer),
        col("is_weekend", ColumnType::Boolean),
    ],
    parents: &[],
};

pub static DIM_USER: TableSchema = TableSchema {
    name:      "dim_user",
    file_name: "dim_user.csv",
    columns: &[
        col("user_id", ColumnType::Integer),
        col("first_name", ColumnType::Text),
        col("last_name", ColumnType::Text),
        col("dob", ColumnType::Date),
        col("job", ColumnType::Text),
        col("gender", ColumnType::Text),
        col("street", ColumnType::Text),
        col("zip_code", ColumnType::Text),
        col("city_id", ColumnType::Integer),
    ],
    parents: &["dim_city"],
};

pub static DIM_CARD: TableSchema = TableSchema {
    name:      "dim_card",
    file_name: "dim_card.csv",
    columns: &[
        col("cc_number", ColumnType::Integer),
        col("user_id", ColumnType::Integer),
    ],
    parents: &["dim_user"],
};

// ── Fact ───────────────────────────────────────────────────────

pub static FACT_TRANSACTION: TableSchema = TableSchema {
    name:      "fact_transaction",
    file_name: "fact_transaction.csv",
    columns: &[
        col("trx_id", ColumnType::Text),
        col("trx_timestamp", ColumnType::Timestamp),
        col("date_id", ColumnType::Integer),
        col("cc_number", ColumnType::Integer),
        col("merchant_id", ColumnType::Integer),
        col("amount", ColumnType::Real),
        col("is_fraud", ColumnType::Boolean),
        col("category", ColumnType::Text),
        col("latitude", ColumnType::Real),
        col("longitude", ColumnType::Real),
    ],
    parents: &["dim_card", "dim_merchant", "dim_date"],
};

pub static LOAD_ORDER: [&TableSchema; 6] = [
    &DIM_CITY,
    &DIM_MERCHANT,
    &DIM_DATE,
    &DIM_USER,
    &DIM_CARD,
    &FACT_TRANSACTION,
];
