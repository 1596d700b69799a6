//! The external check capability.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::{Container, Source, Version};

/// Result of running a check script.
///
/// A failing script is a first-class outcome, not an error: the script
/// ran to completion and reported that the source is currently
/// uncheckable. Transport and internal faults are `Err` instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Discovered versions, ordered oldest to newest. Empty when
    /// nothing new exists past the baseline.
    Success(Vec<Version>),
    /// The check script exited non-zero.
    ScriptFailure { exit_status: i32, stderr: String },
}

/// Invokes a resource type's check inside a container.
///
/// Implementations live outside this crate; the scanner only consumes
/// the capability. The call is synchronous and may block for the full
/// duration of the script run.
pub trait Checker: Send + Sync {
    fn check(
        &self,
        container: &Container,
        source: &Source,
        from: Option<&Version>,
    ) -> anyhow::Result<CheckOutcome>;
}

/// Checkers keyed by resource-type name. Resolved once per tick.
#[derive(Clone, Default)]
pub struct CheckerRegistry {
    inner: HashMap<String, Arc<dyn Checker>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_type: &str, checker: Arc<dyn Checker>) {
        self.inner.insert(resource_type.to_string(), checker);
    }

    pub fn get(&self, resource_type: &str) -> Option<Arc<dyn Checker>> {
        self.inner.get(resource_type).cloned()
    }
}
