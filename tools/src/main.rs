//! etl-runner: headless runner for the card-transaction warehouse.
//!
//! Usage:
//!   etl-runner transform --base-dir /data/project
//!   etl-runner load --db warehouse.db --write-batch 1000 --report-json
//!   etl-runner run --config etl.json --strict

use anyhow::{bail, Result};
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use warehouse_core::{
    config::{ConfigFile, EtlConfig},
    loader::{run_load, LoadReport, TableOutcome},
    resolver::JoinPolicy,
    transform::{run_transform, TransformSummary},
};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let command = args
        .get(1)
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .unwrap_or("run");
    let config = build_config(&args)?;
    let report_json = args.iter().any(|a| a == "--report-json");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_banner(&mut out, command, &config, report_json)?;

    match command {
        "transform" => {
            let summary = run_transform(&config)?;
            print_transform(&mut out, &summary, report_json)?;
        }
        "load" => {
            let report = run_load(&config)?;
            print_load(&mut out, &report, report_json)?;
        }
        "run" => {
            let summary = run_transform(&config)?;
            // In JSON mode stdout carries the load report only.
            if report_json {
                log_transform(&summary);
            } else {
                print_transform(&mut out, &summary, false)?;
            }
            let report = run_load(&config)?;
            print_load(&mut out, &report, report_json)?;
        }
        other => bail!("unknown command '{other}' (expected transform, load or run)"),
    }
    Ok(())
}

/// Flags > config file > environment > defaults. Evaluated once, here.
fn build_config(args: &[String]) -> Result<EtlConfig> {
    let file = match flag(args, "--config") {
        Some(path) => ConfigFile::load(Path::new(path))?,
        None => ConfigFile::default(),
    };
    let base_dir = flag(args, "--base-dir").map(PathBuf::from);
    let mut config = EtlConfig::from_env(base_dir.as_deref(), file)?;

    if let Some(input) = flag(args, "--input") {
        config.input_file = PathBuf::from(input);
    }
    if let Some(dir) = flag(args, "--processed-dir") {
        config.processed_dir = PathBuf::from(dir);
    }
    if let Some(db) = flag(args, "--db") {
        config.database_url = db.to_string();
    }
    config.read_chunk_rows = parse_arg(args, "--read-chunk", config.read_chunk_rows);
    config.write_batch_rows = parse_arg(args, "--write-batch", config.write_batch_rows);
    if args.iter().any(|a| a == "--strict") {
        config.join_policy = JoinPolicy::Strict;
    }
    if args.iter().any(|a| a == "--stop-on-error") {
        config.stop_on_table_error = true;
    }

    config.validate()?;
    Ok(config)
}

fn print_banner(out: &mut impl Write, command: &str, config: &EtlConfig, as_json: bool) -> Result<()> {
    if as_json {
        log::info!(
            "etl-runner {command}: input {}, processed {}, sink {}",
            config.input_file.display(),
            config.processed_dir.display(),
            config.database_url
        );
        return Ok(());
    }
    writeln!(out, "Card transaction warehouse: etl-runner")?;
    writeln!(out, "  command:    {command}")?;
    writeln!(out, "  base_dir:   {}", config.base_dir.display())?;
    writeln!(out, "  input:      {}", config.input_file.display())?;
    writeln!(out, "  processed:  {}", config.processed_dir.display())?;
    writeln!(out, "  sink:       {}", config.database_url)?;
    writeln!(out)?;
    Ok(())
}

fn log_transform(summary: &TransformSummary) {
    log::info!(
        "transform: {} input rows, {} facts outside calendar, output {}",
        summary.input_rows,
        summary.date_gaps,
        summary.output_dir.display()
    );
}

fn print_transform(out: &mut impl Write, summary: &TransformSummary, as_json: bool) -> Result<()> {
    if as_json {
        writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?;
        return Ok(());
    }
    writeln!(out, "=== TRANSFORM SUMMARY ===")?;
    writeln!(out, "  input rows:     {}", summary.input_rows)?;
    for (table, rows) in &summary.tables {
        writeln!(out, "  {table:<18} {rows}")?;
    }
    for join in &summary.joins {
        writeln!(
            out,
            "  join {:<30} matched {} | unmatched {} | ambiguous {}",
            join.relation, join.matched, join.unmatched, join.ambiguous
        )?;
    }
    if summary.date_gaps > 0 {
        writeln!(out, "  facts outside calendar: {}", summary.date_gaps)?;
    }
    writeln!(out, "  output: {}", summary.output_dir.display())?;
    writeln!(out)?;
    Ok(())
}

fn print_load(out: &mut impl Write, report: &LoadReport, as_json: bool) -> Result<()> {
    // A partial load is reported, not turned into a failing exit status.
    if !report.is_complete() {
        log::warn!(
            "load incomplete: {} skipped, {} failed",
            report.skipped().len(),
            report.failed().len()
        );
    }
    if as_json {
        writeln!(out, "{}", serde_json::to_string_pretty(report)?)?;
        return Ok(());
    }
    writeln!(out, "=== LOAD SUMMARY ({}) ===", report.sink)?;
    for table in &report.tables {
        match &table.outcome {
            TableOutcome::Loaded { rows, batches } => {
                writeln!(out, "  ✓ {:<18} {rows} rows in {batches} batches", table.table)?
            }
            TableOutcome::Skipped { reason } => {
                writeln!(out, "  - {:<18} skipped: {reason}", table.table)?
            }
            TableOutcome::Failed { error, rows_written } => writeln!(
                out,
                "  ✗ {:<18} failed after {rows_written} rows: {error}",
                table.table
            )?,
            TableOutcome::NotAttempted => {
                writeln!(out, "  · {:<18} not attempted", table.table)?
            }
        }
    }
    writeln!(
        out,
        "  total rows: {} | skipped: {} | failed: {}",
        report.total_rows(),
        report.skipped().len(),
        report.failed().len()
    )?;
    Ok(())
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
