//! Bounded-memory extracts of the Open Food Facts product export.
//!
//! Two streamed stages project (and optionally country-filter) the raw
//! tab-separated export in fixed-size chunks; whole-table stages then keep
//! rows with usable scores and drop redundant columns. Stages are chained by
//! file paths, see [`pipeline::Pipeline`].

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod predicate;
pub mod projection;
pub mod stages;
pub mod stream;
pub mod table;
pub mod types;

pub use config::AppConfig;
pub use error::{EtlError, Result};
pub use pipeline::{build_stage, Pipeline, PipelineResult};
pub use predicate::{CountryMatch, RowPredicate};
pub use stages::{Stage, StageKind, StageReport};
pub use stream::{filter_project, MalformedLinePolicy, Quoting, StreamConfig, StreamReport};
pub use table::Table;
