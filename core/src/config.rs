//! Pipeline configuration, resolved once at startup and passed into every stage.
//!
//! PRECEDENCE (highest first):
//!   1. command-line flags (applied by the runner after `resolve`)
//!   2. JSON config file
//!   3. environment (`ETL_BASE_DIR`, `AIRFLOW_HOME` / `APP_ENV`, `ETL_DATABASE_URL`)
//!   4. defaults

use crate::{
    error::{EtlError, EtlResult},
    resolver::JoinPolicy,
    schema::TableSchema,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_READ_CHUNK_ROWS: usize = 50_000;
pub const DEFAULT_WRITE_BATCH_ROWS: usize = 500;
pub const CONTAINER_BASE_DIR: &str = "/opt/airflow";
pub const INPUT_FILE_NAME: &str = "credit_card_transactions.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlConfig {
    pub base_dir:            PathBuf,
    pub input_file:          PathBuf,
    pub processed_dir:       PathBuf,
    pub database_url:        String,
    pub read_chunk_rows:     usize,
    pub write_batch_rows:    usize,
    pub calendar_start:      NaiveDate,
    pub calendar_end:        NaiveDate,
    pub join_policy:         JoinPolicy,
    pub stop_on_table_error: bool,
}

/// Overrides read from a JSON config file. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub base_dir:            Option<PathBuf>,
    pub input_file:          Option<PathBuf>,
    pub processed_dir:       Option<PathBuf>,
    pub database_url:        Option<String>,
    pub read_chunk_rows:     Option<usize>,
    pub write_batch_rows:    Option<usize>,
    pub calendar_start:      Option<NaiveDate>,
    pub calendar_end:        Option<NaiveDate>,
    pub join_policy:         Option<JoinPolicy>,
    pub stop_on_table_error: Option<bool>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> EtlResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Working directory root, by precedence: explicit value, `ETL_BASE_DIR`,
/// container layout, then the current directory.
pub fn resolve_base_dir(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
) -> EtlResult<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Some(dir) = env("ETL_BASE_DIR").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let airflow_home = env("AIRFLOW_HOME").filter(|v| !v.is_empty());
    if airflow_home.is_some() || env("APP_ENV").as_deref() == Some("docker") {
        return Ok(PathBuf::from(CONTAINER_BASE_DIR));
    }
    Ok(std::env::current_dir()?)
}

impl EtlConfig {
    /// Defaults laid out under `base_dir`:
    /// `data/credit_card_transactions.csv`, `data/processed/`, `data/warehouse.db`.
    pub fn for_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let data = base_dir.join("data");
        Self {
            input_file:          data.join(INPUT_FILE_NAME),
            processed_dir:       data.join("processed"),
            database_url:        data.join("warehouse.db").display().to_string(),
            read_chunk_rows:     DEFAULT_READ_CHUNK_ROWS,
            write_batch_rows:    DEFAULT_WRITE_BATCH_ROWS,
            calendar_start:      NaiveDate::from_ymd_opt(2019, 1, 1).unwrap_or_default(),
            calendar_end:        NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or_default(),
            join_policy:         JoinPolicy::default(),
            stop_on_table_error: false,
            base_dir,
        }
    }

    /// Evaluate file and environment precedence once.
    /// `explicit_base` is the command-line base directory, if any.
    pub fn resolve(
        explicit_base: Option<&Path>,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> EtlResult<Self> {
        let base_dir = resolve_base_dir(explicit_base.or(file.base_dir.as_deref()), &env)?;
        let mut config = Self::for_dir(base_dir);

        if let Some(url) = file.database_url.or_else(|| env("ETL_DATABASE_URL")) {
            config.database_url = url;
        }
        if let Some(v) = file.input_file          { config.input_file = v; }
        if let Some(v) = file.processed_dir       { config.processed_dir = v; }
        if let Some(v) = file.read_chunk_rows     { config.read_chunk_rows = v; }
        if let Some(v) = file.write_batch_rows    { config.write_batch_rows = v; }
        if let Some(v) = file.calendar_start      { config.calendar_start = v; }
        if let Some(v) = file.calendar_end        { config.calendar_end = v; }
        if let Some(v) = file.join_policy         { config.join_policy = v; }
        if let Some(v) = file.stop_on_table_error { config.stop_on_table_error = v; }

        Ok(config)
    }

    /// `resolve` against the process environment.
    pub fn from_env(explicit_base: Option<&Path>, file: ConfigFile) -> EtlResult<Self> {
        Self::resolve(explicit_base, file, |key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> EtlResult<()> {
        if self.read_chunk_rows == 0 {
            return Err(EtlError::Config("read_chunk_rows must be at least 1".into()));
        }
        if self.write_batch_rows == 0 {
            return Err(EtlError::Config("write_batch_rows must be at least 1".into()));
        }
        if self.calendar_start > self.calendar_end {
            return Err(EtlError::Config(format!(
                "calendar_start {} is after calendar_end {}",
                self.calendar_start, self.calendar_end
            )));
        }
        if self.database_url.trim().is_empty() {
            return Err(EtlError::Config("database_url is empty".into()));
        }
        Ok(())
    }

    /// Where the intermediate CSV for `schema` lives.
    pub fn artifact_path(&self, schema: &TableSchema) -> PathBuf {
        self.processed_dir.join(schema.file_name)
    }
}
