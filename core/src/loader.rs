//! Persistence loader: streams the six CSV artifacts into a sink.
//!
//! RULES:
//!   - Tables load in `schema::LOAD_ORDER`; a table starts only after the
//!     previous one has finished (or been skipped / abandoned).
//!   - Files are read in chunks of `read_chunk_rows` rows and written in
//!     batches of `write_batch_rows` rows. The two sizes are independent.
//!   - A missing file is skipped; a failing table is abandoned. Either way the
//!     loader moves on to the next table. Nothing is rolled back.
//!   - Every run appends.

use crate::{
    config::EtlConfig,
    error::{EtlError, EtlResult},
    schema::{TableSchema, LOAD_ORDER},
    sink::{Sink, SqliteSink},
};
use rusqlite::types::Value;
use serde::Serialize;
use std::{fs::File, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub read_chunk_rows:     usize,
    pub write_batch_rows:    usize,
    pub stop_on_table_error: bool,
}

impl LoadOptions {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            read_chunk_rows:     config.read_chunk_rows.max(1),
            write_batch_rows:    config.write_batch_rows.max(1),
            stop_on_table_error: config.stop_on_table_error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableOutcome {
    Loaded { rows: u64, batches: u64 },
    Skipped { reason: String },
    Failed { error: String, rows_written: u64 },
    /// An earlier table failed with `stop_on_table_error` set.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    pub table:   String,
    pub outcome: TableOutcome,
}

/// Per-table results in load order. Callers decide whether a partial
/// load counts as a failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub sink:   String,
    pub tables: Vec<TableReport>,
}

impl LoadReport {
    /// True when every table loaded.
    pub fn is_complete(&self) -> bool {
        self.tables
            .iter()
            .all(|t| matches!(t.outcome, TableOutcome::Loaded { .. }))
    }

    pub fn skipped(&self) -> Vec<&TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Skipped { .. }))
            .collect()
    }

    pub fn failed(&self) -> Vec<&TableReport> {
        self.tables
            .iter()
            .filter(|t| matches!(t.outcome, TableOutcome::Failed { .. }))
            .collect()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables
            .iter()
            .map(|t| match t.outcome {
                TableOutcome::Loaded { rows, .. } => rows,
                TableOutcome::Failed { rows_written, .. } => rows_written,
                TableOutcome::Skipped { .. } | TableOutcome::NotAttempted => 0,
            })
            .sum()
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables.iter().find(|t| t.table == table).map(|t| &t.outcome)
    }
}

#[derive(Debug, Default)]
struct Progress {
    rows:    u64,
    batches: u64,
}

pub struct Loader<'a, S: Sink> {
    sink:    &'a mut S,
    options: LoadOptions,
}

impl<'a, S: Sink> Loader<'a, S> {
    pub fn new(sink: &'a mut S, options: LoadOptions) -> Self {
        Self { sink, options }
    }

    /// Load every table from `dir` in dependency order.
    pub fn load_all(&mut self, dir: &Path) -> LoadReport {
        let mut report = LoadReport { sink: self.sink.describe(), tables: Vec::new() };
        let mut halted = false;

        for schema in LOAD_ORDER {
            let outcome = if halted {
                TableOutcome::NotAttempted
            } else {
                self.load_file(schema, &dir.join(schema.file_name))
            };
            if matches!(outcome, TableOutcome::Failed { .. }) && self.options.stop_on_table_error {
                log::warn!("stop_on_table_error set, remaining tables not attempted");
                halted = true;
            }
            report.tables.push(TableReport { table: schema.name.to_string(), outcome });
        }
        report
    }

    /// Load one artifact. Never returns an error: the outcome carries it.
    pub fn load_file(&mut self, schema: &TableSchema, path: &Path) -> TableOutcome {
        if !path.exists() {
            log::warn!("skip {}: {} not found", schema.name, path.display());
            return TableOutcome::Skipped {
                reason: format!("{} not found", path.display()),
            };
        }

        log::info!("loading {} from {}", schema.name, path.display());
        let mut progress = Progress::default();
        match self.stream_table(schema, path, &mut progress) {
            Ok(()) => {
                log::info!(
                    "loaded {}: {} rows in {} batches",
                    schema.name,
                    progress.rows,
                    progress.batches
                );
                TableOutcome::Loaded { rows: progress.rows, batches: progress.batches }
            }
            Err(e) => {
                log::error!(
                    "failed {} after {} rows: {e}",
                    schema.name,
                    progress.rows
                );
                TableOutcome::Failed { error: e.to_string(), rows_written: progress.rows }
            }
        }
    }

    fn stream_table(
        &mut self,
        schema: &TableSchema,
        path: &Path,
        progress: &mut Progress,
    ) -> EtlResult<()> {
        let mut rdr = csv::Reader::from_reader(File::open(path)?);
        let positions = schema
            .column_positions(rdr.headers()?)
            .map_err(|columns| EtlError::MissingColumns {
                source_name: path.display().to_string(),
                columns,
            })?;

        self.sink.prepare_table(schema)?;

        let mut chunk: Vec<Vec<Value>> = Vec::with_capacity(self.options.read_chunk_rows);
        let mut record = csv::StringRecord::new();
        let mut chunk_no = 0u64;

        while rdr.read_record(&mut record)? {
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            chunk.push(convert_row(schema, &positions, &record, line)?);

            if chunk.len() == self.options.read_chunk_rows {
                chunk_no += 1;
                self.flush_chunk(schema, &chunk, chunk_no, progress)?;
                chunk.clear();
            }
        }
        if !chunk.is_empty() {
            chunk_no += 1;
            self.flush_chunk(schema, &chunk, chunk_no, progress)?;
        }
        Ok(())
    }

    fn flush_chunk(
        &mut self,
        schema: &TableSchema,
        chunk: &[Vec<Value>],
        chunk_no: u64,
        progress: &mut Progress,
    ) -> EtlResult<()> {
        log::debug!("{}: chunk {chunk_no} ({} rows)", schema.name, chunk.len());
        for batch in chunk.chunks(self.options.write_batch_rows) {
            let written = self.sink.write_batch(schema, batch)?;
            progress.rows += written as u64;
            progress.batches += 1;
        }
        Ok(())
    }
}

fn convert_row(
    schema: &TableSchema,
    positions: &[usize],
    record: &csv::StringRecord,
    line: u64,
) -> EtlResult<Vec<Value>> {
    schema
        .columns
        .iter()
        .zip(positions)
        .map(|(column, &pos)| {
            let cell = record.get(pos).unwrap_or_default();
            column.ty.parse_cell(cell).ok_or_else(|| EtlError::InvalidValue {
                field: column.name.to_string(),
                value: cell.to_string(),
                line,
            })
        })
        .collect()
}

/// Connect to the configured sink and load every artifact.
/// Only a connectivity failure is returned as an error.
pub fn run_load(config: &EtlConfig) -> EtlResult<LoadReport> {
    let mut sink = SqliteSink::connect(&config.database_url)?;
    let mut loader = Loader::new(&mut sink, LoadOptions::from_config(config));
    Ok(loader.load_all(&config.processed_dir))
}
