//! # conso-clean - cleaning and aggregation of energy consumption readings
//!
//! `conso-clean` is the cleaning stage of an energy-consumption pipeline. It
//! reads raw meter readings whose timestamps and numbers come in several
//! regional layouts, normalizes them, drops invalid, out-of-range and
//! duplicate readings, and produces hourly, daily and monthly aggregates.
//! The hourly aggregate is persisted as Parquet partitioned by `date` and
//! `type_energie`. Query execution is delegated to DataFusion.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conso_clean::prelude::*;
//! use conso_clean::resources::SystemResourceProbe;
//!
//! # async fn example() -> conso_clean::error::Result<()> {
//! let config = StageConfig::new(
//!     "data/raw/consommations_raw.csv",
//!     "data/raw/batiments.csv",
//!     "output/consommations_clean",
//! )
//! .with_scratch_file("output/scratch/02_nettoyage.txt");
//!
//! let probe = SystemResourceProbe::new(config.resource_interval);
//! let report = run_cleaning_stage(&config, &probe).await?;
//! println!("{} rows removed", report.counts.total_removed());
//! # Ok(())
//! # }
//! ```
//!
//! ## Phases
//!
//! 1. Ingestion ([`sources`]): both CSV files, required columns checked.
//! 2. Normalization and validation ([`validation`]): the [`udf`] normalizers
//!    add `timestamp_parsed` and `consommation_clean`; rejected rows are
//!    counted per category, then duplicates are removed.
//! 3. Post-condition checks ([`checks`]): logged, never fatal.
//! 4. Calendar enrichment ([`enrich`]).
//! 5. Aggregation ([`aggregate`]).
//! 6. Persistence ([`sink`]) and reporting ([`report`], [`scratch`]).
//!
//! Row-level parse failures never surface as errors; they become nulls that
//! validation counts and drops. See [`error`] for what does fail a run.

pub mod aggregate;
pub mod checks;
pub mod config;
pub mod context;
pub mod enrich;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod report;
pub mod resources;
pub mod scratch;
pub mod sink;
pub mod sources;
pub mod stage;
pub mod udf;
pub mod validation;
