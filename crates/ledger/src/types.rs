use advisor_protocol::{Fingerprint, NodeId, RuleSetVersion};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Compound cache key: structural fingerprint folded with the active
/// rule-set version. Changing the rule-set version shifts every key, so
/// prior entries deterministically miss without being deleted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    #[must_use]
    pub fn new(fingerprint: &Fingerprint, ruleset: &RuleSetVersion) -> Self {
        Self(format!("{}:{}", ruleset.as_str(), fingerprint))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored verdict. Read-only once written; superseded only by a new
/// key, garbage-collected only by age/size policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub verdict: String,
    pub created_at_unix_ms: u64,
}

/// A user's decision to silence a block, valid only while the block's
/// current fingerprint equals the stored one. Structural change
/// invalidates it implicitly: the lookup simply stops matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoreRecord {
    pub fingerprint: Fingerprint,
    pub reason: String,
    pub created_at_unix_ms: u64,
    pub active: bool,
}

/// A detected violation, stored only for actual violations and ignores
/// to bound ledger growth. The embedding vector is opaque here; it is
/// produced by the external embedding collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub node: NodeId,
    pub rule: String,
    pub severity: f64,
    pub snippet: String,
    pub embedding: Option<Vec<f32>>,
    pub created_at_unix_ms: u64,
}
