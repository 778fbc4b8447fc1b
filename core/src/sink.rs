//! Relational sink.
//!
//! RULE: only the sink talks to the database.
//! The loader hands it typed rows; it never builds SQL itself.

use crate::{
    error::{EtlError, EtlResult},
    schema::TableSchema,
};
use rusqlite::{params_from_iter, types::Value, Connection, OpenFlags};

/// SQLite's default limit on `?` parameters in one statement.
pub const MAX_BOUND_PARAMS: usize = 32_766;

/// The contract every load target fulfils.
pub trait Sink {
    /// Human-readable target description for status output.
    fn describe(&self) -> String;

    /// Create the table if it does not exist. Existing rows are kept.
    fn prepare_table(&mut self, schema: &TableSchema) -> EtlResult<()>;

    /// Append one batch of rows, each in schema column order.
    /// Returns the number of rows written.
    fn write_batch(&mut self, schema: &TableSchema, rows: &[Vec<Value>]) -> EtlResult<usize>;
}

pub struct SqliteSink {
    conn: Connection,
    url:  String,
}

impl SqliteSink {
    /// Open the database at `url` (a path or `sqlite://path`) and check it answers.
    /// Any failure here is a connectivity error.
    pub fn connect(url: &str) -> EtlResult<Self> {
        let unavailable = |e: rusqlite::Error| EtlError::SinkUnavailable {
            url:    url.to_string(),
            reason: e.to_string(),
        };
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )
        .map_err(unavailable)?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(unavailable)?;
        // WAL mode only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        log::info!("connected to sink {url}");
        Ok(Self { conn, url: url.to_string() })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EtlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn, url: ":memory:".into() })
    }

    pub fn row_count(&self, schema: &TableSchema) -> EtlResult<i64> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", schema.name),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Raw connection, for inspection in tests and tooling.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Sink for SqliteSink {
    fn describe(&self) -> String {
        format!("sqlite {}", self.url)
    }

    fn prepare_table(&mut self, schema: &TableSchema) -> EtlResult<()> {
        self.conn.execute_batch(&schema.create_sql())?;
        Ok(())
    }

    fn write_batch(&mut self, schema: &TableSchema, rows: &[Vec<Value>]) -> EtlResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        // Each batch commits on its own: a batch that succeeded stays written
        // even if a later one fails. A batch split across several INSERTs
        // commits all of them or none.
        let per_statement = (MAX_BOUND_PARAMS / schema.columns.len().max(1)).max(1);
        let tx = self.conn.transaction()?;
        let mut written = 0;
        for part in rows.chunks(per_statement) {
            let mut stmt = tx.prepare_cached(&schema.insert_sql(part.len()))?;
            written += stmt.execute(params_from_iter(part.iter().flatten()))?;
        }
        tx.commit()?;
        Ok(written)
    }
}
