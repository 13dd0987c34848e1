//! # elcom-tariffs - Swiss electricity tariffs from ElCom/LINDAS
//!
//! Retrieves electricity tariff figures for a Swiss municipality and year
//! from the public LINDAS knowledge graph. The graph's predicates are not
//! fixed, so the crate discovers them from live data, maps observations to
//! price components and keeps a cached result fresh per configured entity.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration, defaults and validation
//! - `logging`: Structured logging and tracing
//! - `sparql`: SPARQL client, result parsing and HTTP transport
//! - `search`: Municipality search and ranking
//! - `discovery`: Predicate discovery by sampling and scoring
//! - `fetcher`: Observation retrieval for a municipality-year
//! - `mapper`: Price component classification, units and selection
//! - `coordinator`: Per-entity refresh tasks and cached snapshots
//! - `sensor`: Result surface rendering
//! - `web`: HTTP server and REST API

pub mod config;
pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod fetcher;
pub mod logging;
pub mod mapper;
pub mod model;
pub mod search;
pub mod sensor;
pub mod sparql;
#[cfg(feature = "web")]
pub mod web;

#[cfg(test)]
mod config_tests;

// Re-export commonly used types
pub use config::Config;
pub use coordinator::{CoordinatorHandle, CoordinatorRegistry, TariffPipeline};
pub use error::{Result, TariffError};
pub use model::{PriceKind, PriceUnit, TariffResult};
