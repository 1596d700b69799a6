//! cadence-scanner — the periodic check scheduler.
//!
//! One scan tick per resource (or resource-type) key: consult the
//! pipeline's pause flag, take the shared check lock, obtain a
//! check container from the allocator, invoke the resource type's
//! `Checker`, and persist the newest discovered version as the new
//! baseline. Ticks return the interval to wait before the next one;
//! the `IntervalRunner` turns that into a long-running loop per key.
//!
//! Pause and lock contention are steady-state conditions, reported as
//! soft outcomes rather than errors. A failing check script is soft
//! too. Everything else fails the tick and propagates.

pub mod checker;
pub mod error;
pub mod resource_type;
pub mod runner;
pub mod scanner;
#[cfg(test)]
mod testutil;

pub use checker::{CheckOutcome, Checker, CheckerRegistry};
pub use error::{ScanError, ScanResult};
pub use resource_type::ResourceTypeScanner;
pub use runner::{IntervalRunner, Scan};
pub use scanner::{ResourceScanner, ScanResponse, ScanTick, TickOutcome};
