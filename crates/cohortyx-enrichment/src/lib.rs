//! cohortyx-enrichment — cross-profile query resolution and enrichment engine.
//!
//! Pipeline per request: filter → gateway → resolver → engine → projection.

pub mod contingency;
pub mod engine;
pub mod filter;
pub mod gateway;
pub mod projection;
pub mod resolver;
pub mod service;

pub use engine::{compute_enrichment, EngineOptions, EnrichmentEngine};
pub use filter::{resolve_filter, resolve_raw_filter, AssayDataFilter, CanonicalQuery, RawAssayDataFilter, SampleMolecularIdentifier};
pub use gateway::{DataAccessGateway, InMemoryGateway, ObservationQuery};
pub use projection::{shape, Projectable, Shaped, TOTAL_COUNT_HEADER};
pub use resolver::CaseGroups;
pub use service::{CopyNumberEnrichmentService, GenericAssayService};
