use crate::error::Result;
use advisor_protocol::{
    CentralityKind, EngineLimits, ExpansionBudget, LayerPolicy, RuleSetVersion, ScoringWeights,
    TolerancePolicy,
};
use serde::Deserialize;
use std::path::Path;

/// The whole externally supplied configuration surface, loaded once at
/// startup and immutable afterwards. Hot reload means constructing a
/// new `Advisor` around a new value, never mutating this one.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Folded into every cache key; bumping it invalidates all prior
    /// verdicts without touching the ledger.
    pub ruleset_version: RuleSetVersion,
    pub weights: ScoringWeights,
    pub layers: LayerPolicy,
    pub tolerances: TolerancePolicy,
    pub expansion: ExpansionBudget,
    pub limits: EngineLimits,
    pub centrality: CentralityKind,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
