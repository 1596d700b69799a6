//! cadence-state — redb-backed store for pipelines, resources, and workers.
//!
//! Holds everything the scheduling core shares across processes except
//! check locks (see `cadence-lock`): pipeline configuration and pause
//! state, resource/resource-type rows with their baseline versions, and
//! the registered worker set with its lifecycle state.
//!
//! `PipelineHandle` is the scoped view the scanner consumes; the worker
//! pool reads worker rows directly.

pub mod error;
pub mod pipeline;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use pipeline::PipelineHandle;
pub use store::StateStore;
