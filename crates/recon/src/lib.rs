//! `cunli-recon`: resolves polling-station referendum tallies onto
//! administrative village codes.
//!
//! Pure engine crate: receives pre-loaded records, registry and overrides,
//! returns aggregated villages plus diagnostics. No CLI dependencies.

pub mod aggregate;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod overrides;
pub mod registry;
pub mod unmatched;
pub mod verify;

pub use config::ResolveConfig;
pub use engine::{resolve, run, Resolution, ResolutionState, Resolver};
pub use error::ReconError;
pub use model::{AggregatedVillage, ReconInput, ReconResult, SourceRecord};
pub use normalize::{normalize, CompositeKey};
pub use registry::RegistryIndex;
pub use unmatched::UnmatchedTracker;
pub use verify::{verify_totals, Totals, TotalsDiff};
