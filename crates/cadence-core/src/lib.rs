//! cadence-core — shared types for the Cadence scheduling core.
//!
//! Domain vocabulary used by every other crate: pipelines and their
//! resources, workers and their lifecycle, containers and volumes, and
//! the content-addressed identifiers that make container/volume reuse
//! safe. Also holds the `cadence.toml` configuration parser.

pub mod config;
pub mod identity;
pub mod types;

pub use config::CadenceConfig;
pub use identity::{ContainerIdentifier, ContentIdentity};
pub use types::*;
