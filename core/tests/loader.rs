//! Persistence loader: dependency order, chunking, per-table isolation.

mod common;

use common::{records, sample_feed, Txn};
use rusqlite::types::Value;
use std::{fs, path::Path};
use tempfile::TempDir;
use warehouse_core::{
    config::EtlConfig,
    error::{EtlError, EtlResult},
    loader::{run_load, LoadOptions, Loader, TableOutcome},
    schema::{TableSchema, DIM_CARD, DIM_CITY, DIM_MERCHANT, DIM_USER, FACT_TRANSACTION, LOAD_ORDER},
    sink::{Sink, SqliteSink, MAX_BOUND_PARAMS},
    transform::{build_warehouse, Warehouse},
};

/// Records every call; optionally fails one table from its nth batch on.
#[derive(Default)]
struct RecordingSink {
    prepared: Vec<String>,
    batches:  Vec<(String, usize)>,
    fail_at:  Option<(&'static str, usize)>,
}

impl Sink for RecordingSink {
    fn describe(&self) -> String {
        "recording".into()
    }

    fn prepare_table(&mut self, schema: &TableSchema) -> EtlResult<()> {
        self.prepared.push(schema.name.to_string());
        Ok(())
    }

    fn write_batch(&mut self, schema: &TableSchema, rows: &[Vec<Value>]) -> EtlResult<usize> {
        let done = self.batches.iter().filter(|(t, _)| t == schema.name).count();
        if let Some((table, nth)) = self.fail_at {
            if table == schema.name && done + 1 >= nth {
                return Err(EtlError::Config(format!("injected failure on {table}")));
            }
        }
        self.batches.push((schema.name.to_string(), rows.len()));
        Ok(rows.len())
    }
}

fn options(read: usize, write: usize) -> LoadOptions {
    LoadOptions { read_chunk_rows: read, write_batch_rows: write, stop_on_table_error: false }
}

fn warehouse(txns: &[Txn]) -> Warehouse {
    build_warehouse(&records(txns), &EtlConfig::for_dir("/unused")).unwrap()
}

/// Ten facts over one user, and a one-month calendar to keep dim_date small.
fn artifacts_dir() -> (TempDir, Warehouse) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EtlConfig::for_dir(dir.path());
    config.calendar_start = chrono::NaiveDate::from_ymd_opt(2020, 6, 1).unwrap();
    config.calendar_end = chrono::NaiveDate::from_ymd_opt(2020, 6, 30).unwrap();

    let mut txns = sample_feed();
    txns.extend((7..=10).map(|i| Txn::new(&format!("t{i}"), 4_000_000_000_000_001)));
    let wh = build_warehouse(&records(&txns), &config).unwrap();
    wh.write_artifacts(dir.path()).unwrap();
    (dir, wh)
}

fn load_order_index(table: &str) -> usize {
    LOAD_ORDER.iter().position(|s| s.name == table).unwrap()
}

#[test]
fn all_tables_land_in_sqlite() {
    let (dir, wh) = artifacts_dir();
    let mut sink = SqliteSink::in_memory().unwrap();
    let report = Loader::new(&mut sink, options(50_000, 500)).load_all(dir.path());

    assert!(report.is_complete(), "report: {report:?}");
    assert_eq!(sink.row_count(&DIM_CITY).unwrap(), wh.cities.len() as i64);
    assert_eq!(sink.row_count(&DIM_USER).unwrap(), wh.users.len() as i64);
    assert_eq!(sink.row_count(&DIM_CARD).unwrap(), wh.cards.len() as i64);
    assert_eq!(sink.row_count(&FACT_TRANSACTION).unwrap(), 10);
    assert_eq!(report.total_rows() as usize, wh.row_counts().iter().map(|(_, n)| n).sum::<usize>());
}

#[test]
fn loaded_values_keep_their_types() {
    let (dir, _) = artifacts_dir();
    let mut sink = SqliteSink::in_memory().unwrap();
    Loader::new(&mut sink, options(50_000, 500)).load_all(dir.path());

    let (fraud, merchant_id, ts): (i64, i64, String) = sink
        .connection()
        .query_row(
            "SELECT is_fraud, merchant_id, trx_timestamp FROM fact_transaction WHERE trx_id = 't4'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(fraud, 1);
    assert_eq!(merchant_id, 1);
    assert_eq!(ts, "2020-06-22 08:00:00");

    let weekend: i64 = sink
        .connection()
        .query_row("SELECT is_weekend FROM dim_date WHERE date_id = 20200621", [], |row| row.get(0))
        .unwrap();
    assert_eq!(weekend, 1, "2020-06-21 was a Sunday");
}

#[test]
fn parents_finish_before_children_start() {
    let (dir, _) = artifacts_dir();
    let mut sink = RecordingSink::default();
    let report = Loader::new(&mut sink, options(2, 1)).load_all(dir.path());
    assert!(report.is_complete());

    let order: Vec<usize> = sink.batches.iter().map(|(t, _)| load_order_index(t)).collect();
    assert!(
        order.windows(2).all(|w| w[0] <= w[1]),
        "a child batch was written before its parent finished: {:?}",
        sink.batches
    );
    let prepared: Vec<&str> = sink.prepared.iter().map(String::as_str).collect();
    assert_eq!(
        prepared,
        vec!["dim_city", "dim_merchant", "dim_date", "dim_user", "dim_card", "fact_transaction"]
    );
}

#[test]
fn read_chunks_and_write_batches_are_independent() {
    let (dir, _) = artifacts_dir();
    let mut sink = RecordingSink::default();
    let report = Loader::new(&mut sink, options(4, 3)).load_all(dir.path());

    // 10 fact rows → read chunks 4, 4, 2 → write batches 3+1, 3+1, 2.
    let fact_batches: Vec<usize> = sink
        .batches
        .iter()
        .filter(|(t, _)| t == "fact_transaction")
        .map(|(_, n)| *n)
        .collect();
    assert_eq!(fact_batches, vec![3, 1, 3, 1, 2]);
    assert_eq!(
        report.outcome("fact_transaction"),
        Some(&TableOutcome::Loaded { rows: 10, batches: 5 })
    );
    assert!(sink.batches.iter().all(|(_, n)| *n <= 3));
}

#[test]
fn missing_file_is_skipped_and_the_rest_load() {
    let (dir, _) = artifacts_dir();
    fs::remove_file(dir.path().join("dim_card.csv")).unwrap();

    let mut sink = SqliteSink::in_memory().unwrap();
    let report = Loader::new(&mut sink, options(50_000, 500)).load_all(dir.path());

    assert_eq!(report.tables.len(), 6);
    assert_eq!(report.skipped().len(), 1);
    assert_eq!(report.skipped()[0].table, "dim_card");
    assert!(report.failed().is_empty());
    assert!(!report.is_complete());
    assert_eq!(sink.row_count(&FACT_TRANSACTION).unwrap(), 10, "fact still loads");
}

#[test]
fn failing_table_is_abandoned_and_loading_continues() {
    let (dir, wh) = artifacts_dir();
    let mut sink = RecordingSink {
        fail_at: Some(("dim_date", 3)),
        ..RecordingSink::default()
    };
    let report = Loader::new(&mut sink, options(50_000, 5)).load_all(dir.path());

    assert_eq!(
        report.outcome("dim_date"),
        Some(&TableOutcome::Failed {
            error:        "Configuration error: injected failure on dim_date".into(),
            rows_written: 10,
        })
    );
    assert_eq!(
        report.outcome("fact_transaction"),
        Some(&TableOutcome::Loaded { rows: wh.facts.len() as u64, batches: 2 })
    );
    assert!(matches!(report.outcome("dim_user"), Some(TableOutcome::Loaded { .. })));
    assert_eq!(report.failed().len(), 1);
}

#[test]
fn stop_on_table_error_halts_remaining_tables() {
    let (dir, _) = artifacts_dir();
    let mut sink = RecordingSink {
        fail_at: Some(("dim_merchant", 1)),
        ..RecordingSink::default()
    };
    let mut opts = options(50_000, 500);
    opts.stop_on_table_error = true;
    let report = Loader::new(&mut sink, opts).load_all(dir.path());

    assert!(matches!(report.outcome("dim_city"), Some(TableOutcome::Loaded { .. })));
    assert!(matches!(report.outcome("dim_merchant"), Some(TableOutcome::Failed { .. })));
    for table in ["dim_date", "dim_user", "dim_card", "fact_transaction"] {
        assert_eq!(report.outcome(table), Some(&TableOutcome::NotAttempted), "{table}");
    }
    assert!(sink.batches.iter().all(|(t, _)| t == "dim_city"));
}

fn write_city_file(dir: &Path, body: &str) {
    fs::write(dir.join("dim_city.csv"), body).unwrap();
}

#[test]
fn bad_cell_fails_the_table_keeping_earlier_batches() {
    let dir = tempfile::tempdir().unwrap();
    write_city_file(
        dir.path(),
        "city_id,city_name,state,population\n1,NYC,NY,100\n2,Chicago,IL,200\n3,Austin,TX,lots\n",
    );
    let mut sink = SqliteSink::in_memory().unwrap();
    let outcome = Loader::new(&mut sink, options(2, 1)).load_file(&DIM_CITY, &dir.path().join("dim_city.csv"));

    match outcome {
        TableOutcome::Failed { error, rows_written } => {
            assert_eq!(rows_written, 2, "first chunk was already written");
            assert!(error.contains("population"), "error: {error}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(sink.row_count(&DIM_CITY).unwrap(), 2, "no rollback of written batches");
}

#[test]
fn header_missing_a_column_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    write_city_file(dir.path(), "city_id,city_name,population\n1,NYC,100\n");
    let mut sink = RecordingSink::default();
    let outcome = Loader::new(&mut sink, options(10, 10)).load_file(&DIM_CITY, &dir.path().join("dim_city.csv"));

    assert!(matches!(outcome, TableOutcome::Failed { rows_written: 0, .. }));
    assert!(sink.prepared.is_empty());
    assert!(sink.batches.is_empty());
}

#[test]
fn columns_are_matched_by_name_not_position() {
    let dir = tempfile::tempdir().unwrap();
    write_city_file(dir.path(), "state,population,city_name,city_id\nNY,100,NYC,1\n");
    let mut sink = SqliteSink::in_memory().unwrap();
    let outcome = Loader::new(&mut sink, options(10, 10)).load_file(&DIM_CITY, &dir.path().join("dim_city.csv"));
    assert_eq!(outcome, TableOutcome::Loaded { rows: 1, batches: 1 });

    let (id, name): (i64, String) = sink
        .connection()
        .query_row("SELECT city_id, city_name FROM dim_city", [], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap();
    assert_eq!((id, name.as_str()), (1, "NYC"));
}

#[test]
fn reloading_appends_duplicates() {
    let (dir, wh) = artifacts_dir();
    let mut sink = SqliteSink::in_memory().unwrap();
    Loader::new(&mut sink, options(50_000, 500)).load_all(dir.path());
    Loader::new(&mut sink, options(50_000, 500)).load_all(dir.path());
    assert_eq!(sink.row_count(&DIM_CITY).unwrap(), 2 * wh.cities.len() as i64);
}

#[test]
fn unreachable_sink_aborts_before_any_table() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EtlConfig::for_dir(dir.path());
    config.database_url = dir.path().join("no/such/dir/wh.db").display().to_string();

    let err = run_load(&config).unwrap_err();
    assert!(matches!(err, EtlError::SinkUnavailable { .. }), "unexpected error: {err}");
}

#[test]
fn run_load_reports_into_a_file_database() {
    let (dir, wh) = artifacts_dir();
    let mut config = EtlConfig::for_dir(dir.path());
    config.processed_dir = dir.path().to_path_buf();
    config.database_url = format!("sqlite://{}", dir.path().join("wh.db").display());

    let report = run_load(&config).unwrap();
    assert!(report.is_complete());

    let sink = SqliteSink::connect(&config.database_url).unwrap();
    assert_eq!(sink.row_count(&FACT_TRANSACTION).unwrap(), wh.facts.len() as i64);
}

#[test]
fn report_serializes_with_status_tags() {
    let (dir, _) = artifacts_dir();
    fs::remove_file(dir.path().join("dim_user.csv")).unwrap();
    let mut sink = RecordingSink::default();
    let report = Loader::new(&mut sink, options(100, 100)).load_all(dir.path());

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["tables"][3]["table"], "dim_user");
    assert_eq!(json["tables"][3]["outcome"]["status"], "skipped");
    assert_eq!(json["tables"][0]["outcome"]["status"], "loaded");
}

#[test]
fn small_warehouse_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let wh = warehouse(&[Txn::new("only", 1)]);
    wh.write_artifacts(dir.path()).unwrap();

    let mut sink = SqliteSink::in_memory().unwrap();
    let report = Loader::new(&mut sink, options(1, 1)).load_all(dir.path());
    assert!(report.is_complete());
    assert_eq!(sink.row_count(&FACT_TRANSACTION).unwrap(), 1);
}

#[test]
fn empty_merchant_zip_loads_as_null() {
    let dir = tempfile::tempdir().unwrap();
    let wh = warehouse(&[Txn::new("t1", 1).merch_zip("")]);
    wh.write_artifacts(dir.path()).unwrap();

    let mut sink = SqliteSink::in_memory().unwrap();
    let outcome = Loader::new(&mut sink, options(10, 10))
        .load_file(&DIM_MERCHANT, &dir.path().join("dim_merchant.csv"));
    assert_eq!(outcome, TableOutcome::Loaded { rows: 1, batches: 1 });

    let zip: Option<String> = sink
        .connection()
        .query_row("SELECT merch_zipcode FROM dim_merchant", [], |row| row.get(0))
        .unwrap();
    assert_eq!(zip, None);
}

fn card_rows(n: usize) -> Vec<Vec<Value>> {
    (0..n as i64)
        .map(|i| vec![Value::Integer(i), Value::Integer(1)])
        .collect()
}

#[test]
fn oversized_batch_is_split_and_commits_as_one() {
    let per_statement = MAX_BOUND_PARAMS / DIM_CARD.columns.len();
    let mut sink = SqliteSink::in_memory().unwrap();
    sink.prepare_table(&DIM_CARD).unwrap();

    let rows = card_rows(per_statement + 1);
    assert_eq!(sink.write_batch(&DIM_CARD, &rows).unwrap(), per_statement + 1);
    assert_eq!(sink.row_count(&DIM_CARD).unwrap(), (per_statement + 1) as i64);

    // The second INSERT of this batch fails on its short last row.
    let mut rows = card_rows(per_statement + 1);
    rows.last_mut().unwrap().pop();
    assert!(sink.write_batch(&DIM_CARD, &rows).is_err());
    assert_eq!(
        sink.row_count(&DIM_CARD).unwrap(),
        (per_statement + 1) as i64,
        "a failed batch leaves nothing behind"
    );
}
