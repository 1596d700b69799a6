//! redb table definitions for the Cadence state store.
//!
//! All tables use `&str` keys and `&[u8]` values (JSON-serialized rows).
//! Scoped rows use `{pipeline}/{name}` composite keys.

use redb::TableDefinition;

/// Pipeline records keyed by pipeline name.
pub const PIPELINES: TableDefinition<&str, &[u8]> = TableDefinition::new("pipelines");

/// Resource rows keyed by `{pipeline}/{name}`.
pub const RESOURCES: TableDefinition<&str, &[u8]> = TableDefinition::new("resources");

/// Resource-type rows keyed by `{pipeline}/{name}`.
pub const RESOURCE_TYPES: TableDefinition<&str, &[u8]> = TableDefinition::new("resource_types");

/// Worker rows keyed by worker name.
pub const WORKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("workers");
