//! Content-addressed identifiers for containers and volumes.
//!
//! Two requests that describe the same work must produce the same
//! identity, so the fingerprint is a sha256 over *canonical* JSON
//! (sorted object keys, no insignificant whitespace).

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{ContainerStage, Source};

/// Deterministic fingerprint of semantic content.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    /// Fingerprint an arbitrary JSON value.
    pub fn of(value: &serde_json::Value) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical(value).as_bytes());
        let digest = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&digest[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The semantic content a container is addressed by: what stage it
/// serves, which resource type it checks/builds, the source
/// configuration, and the owning team.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContainerIdentifier {
    pub stage: ContainerStage,
    pub resource_type: String,
    pub source: Source,
    pub team_id: Option<u32>,
}

impl ContainerIdentifier {
    pub fn check(resource_type: &str, source: Source, team_id: Option<u32>) -> Self {
        Self {
            stage: ContainerStage::Check,
            resource_type: resource_type.to_string(),
            source,
            team_id,
        }
    }

    pub fn build(resource_type: &str, source: Source, team_id: Option<u32>) -> Self {
        Self {
            stage: ContainerStage::Build,
            resource_type: resource_type.to_string(),
            source,
            team_id,
        }
    }

    /// The content identity addressing containers created for this
    /// identifier. Serialization of `self` is infallible (plain data,
    /// string keys), so this cannot fail.
    pub fn identity(&self) -> ContentIdentity {
        let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        ContentIdentity::of(&value)
    }
}

/// Render JSON with object keys sorted, so logically equal values hash
/// equal regardless of construction order.
fn canonical(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| {
                    let key = serde_json::Value::String(k.clone());
                    format!("{key}:{}", canonical(&map[k]))
                })
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", inner.join(","))
        }
        leaf => leaf.to_string(),
    }
}
