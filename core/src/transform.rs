//! The transform stage: raw feed → in-memory warehouse → six CSV artifacts.
//!
//! Everything is built in memory first. Artifacts are written to
//! `<name>.partial` and renamed only once all six are on disk, so a
//! fatal error leaves no partial output behind.

use crate::{
    config::EtlConfig,
    dimension::{build_dimensions, DimCard, DimCity, DimDate, DimMerchant, DimUser},
    error::EtlResult,
    fact::{assemble_facts, date_coverage_gaps, FactTransaction},
    raw::{read_input, RawRecord},
    resolver::{resolve_card_users, resolve_merchant_ids, resolve_user_cities, JoinStats},
    schema::{
        TableSchema, DIM_CARD, DIM_CITY, DIM_DATE, DIM_MERCHANT, DIM_USER, FACT_TRANSACTION,
        LOAD_ORDER,
    },
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// All six tables, fully resolved.
#[derive(Debug, Clone)]
pub struct Warehouse {
    pub cities:    Vec<DimCity>,
    pub users:     Vec<DimUser>,
    pub merchants: Vec<DimMerchant>,
    pub cards:     Vec<DimCard>,
    pub dates:     Vec<DimDate>,
    pub facts:     Vec<FactTransaction>,
    pub joins:     Vec<JoinStats>,
    /// Facts whose date_id falls outside the calendar.
    pub date_gaps: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransformSummary {
    pub input_rows: usize,
    pub output_dir: PathBuf,
    pub tables:     Vec<(String, usize)>,
    pub joins:      Vec<JoinStats>,
    pub date_gaps:  usize,
}

/// Dimension builder → relationship resolver → fact assembler.
pub fn build_warehouse(records: &[RawRecord], config: &EtlConfig) -> EtlResult<Warehouse> {
    let dims = build_dimensions(records, config.calendar_start, config.calendar_end)?;

    let (users, user_join) = resolve_user_cities(&dims.users, &dims.cities, config.join_policy)?;
    let (cards, card_join) = resolve_card_users(&dims.cards, &users, config.join_policy)?;
    let (merchant_ids, merchant_join) =
        resolve_merchant_ids(records, &dims.merchants, config.join_policy)?;

    let facts = assemble_facts(records, &merchant_ids)?;
    let date_gaps = date_coverage_gaps(&facts, &dims.dates).len();
    if date_gaps > 0 {
        log::warn!(
            "{date_gaps} facts dated outside {}..={} have no dim_date row",
            config.calendar_start,
            config.calendar_end
        );
    }

    Ok(Warehouse {
        cities: dims.cities,
        users,
        merchants: dims.merchants,
        cards,
        dates: dims.dates,
        facts,
        joins: vec![user_join, card_join, merchant_join],
        date_gaps,
    })
}

impl Warehouse {
    pub fn row_counts(&self) -> Vec<(String, usize)> {
        vec![
            (DIM_CITY.name.to_string(), self.cities.len()),
            (DIM_MERCHANT.name.to_string(), self.merchants.len()),
            (DIM_DATE.name.to_string(), self.dates.len()),
            (DIM_USER.name.to_string(), self.users.len()),
            (DIM_CARD.name.to_string(), self.cards.len()),
            (FACT_TRANSACTION.name.to_string(), self.facts.len()),
        ]
    }

    /// Write the six artifacts into `dir`, creating it if needed.
    /// If any of them fails, every staged file is removed again.
    pub fn write_artifacts(&self, dir: &Path) -> EtlResult<()> {
        fs::create_dir_all(dir)?;

        if let Err(e) = self.stage_artifacts(dir) {
            discard_partials(dir);
            return Err(e);
        }
        for schema in LOAD_ORDER {
            let target = dir.join(schema.file_name);
            fs::rename(partial_path(dir, schema), &target)?;
            log::info!("saved {}", target.display());
        }
        Ok(())
    }

    fn stage_artifacts(&self, dir: &Path) -> EtlResult<()> {
        write_partial(dir, &DIM_CITY, &self.cities)?;
        write_partial(dir, &DIM_USER, &self.users)?;
        write_partial(dir, &DIM_MERCHANT, &self.merchants)?;
        write_partial(dir, &DIM_CARD, &self.cards)?;
        write_partial(dir, &DIM_DATE, &self.dates)?;
        write_partial(dir, &FACT_TRANSACTION, &self.facts)?;
        Ok(())
    }
}

fn partial_path(dir: &Path, schema: &TableSchema) -> PathBuf {
    dir.join(format!("{}.partial", schema.file_name))
}

fn discard_partials(dir: &Path) {
    for schema in LOAD_ORDER {
        let partial = partial_path(dir, schema);
        if partial.is_file() {
            if let Err(e) = fs::remove_file(&partial) {
                log::warn!("could not remove {}: {e}", partial.display());
            }
        }
    }
}

/// Header comes from the schema so an empty table still gets one.
fn write_partial<T: Serialize>(dir: &Path, schema: &TableSchema, rows: &[T]) -> EtlResult<()> {
    let partial = partial_path(dir, schema);

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&partial)?;
    wtr.write_record(schema.column_names())?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Read the feed, build the warehouse, write the artifacts.
/// Fails fast when the input file is missing.
pub fn run_transform(config: &EtlConfig) -> EtlResult<TransformSummary> {
    log::info!("transform: reading {}", config.input_file.display());
    let records = read_input(&config.input_file)?;
    let warehouse = build_warehouse(&records, config)?;
    warehouse.write_artifacts(&config.processed_dir)?;

    Ok(TransformSummary {
        input_rows: records.len(),
        output_dir: config.processed_dir.clone(),
        tables:     warehouse.row_counts(),
        joins:      warehouse.joins,
        date_gaps:  warehouse.date_gaps,
    })
}
