use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Active rule-set version. Folded into every cache key so that a rule
/// change invalidates history without touching stored fingerprints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSetVersion(pub String);

impl RuleSetVersion {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RuleSetVersion {
    fn default() -> Self {
        Self("v1".to_string())
    }
}

/// Weights for the single-responsibility score. Externally supplied,
/// never hard-coded by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub semantic: f64,
    pub dependency: f64,
    pub naming: f64,
    pub method_count: f64,
    /// Additive penalty applied only when the fact engine flagged the
    /// unit for a layering violation.
    pub layer_violation_boost: f64,
    /// Scores at or above this value are high severity.
    pub threshold: f64,
    /// Cluster count at which the semantic signal saturates.
    pub semantic_cluster_span: usize,
    /// How much a node's centrality percentile boosts the recorded
    /// severity of its violations.
    pub blast_radius_weight: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            dependency: 0.3,
            naming: 0.2,
            method_count: 0.1,
            layer_violation_boost: 0.2,
            threshold: 0.7,
            semantic_cluster_span: 4,
            blast_radius_weight: 0.1,
        }
    }
}

/// One architectural layer, assigned to nodes by path substring match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRule {
    pub name: String,
    pub path_patterns: Vec<String>,
}

/// Allowed-layer partial order: `forbidden` lists (source, target) layer
/// pairs that no DependsOn/Calls edge may cross.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerPolicy {
    pub layers: Vec<LayerRule>,
    pub forbidden: Vec<(String, String)>,
}

impl LayerPolicy {
    /// Layer for a path, first declared match wins. None when no layer
    /// claims the path.
    #[must_use]
    pub fn layer_of(&self, path: &str) -> Option<&str> {
        let lowered = path.to_lowercase();
        self.layers.iter().find_map(|rule| {
            rule.path_patterns
                .iter()
                .any(|pattern| lowered.contains(&pattern.to_lowercase()))
                .then_some(rule.name.as_str())
        })
    }

    #[must_use]
    pub fn is_forbidden(&self, from: &str, to: &str) -> bool {
        self.forbidden
            .iter()
            .any(|(src, dst)| src == from && dst == to)
    }
}

/// Per-directory convention-to-tolerance mapping: expected method count
/// before the method-count signal starts to rise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TolerancePolicy {
    pub default: u32,
    pub per_directory: BTreeMap<String, u32>,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        let mut per_directory = BTreeMap::new();
        per_directory.insert("domain".to_string(), 1);
        per_directory.insert("entity".to_string(), 1);
        per_directory.insert("controller".to_string(), 3);
        per_directory.insert("service".to_string(), 5);
        Self {
            default: 5,
            per_directory,
        }
    }
}

impl TolerancePolicy {
    /// Tolerance for a path; the longest matching directory pattern wins.
    #[must_use]
    pub fn tolerance_for(&self, path: &str) -> u32 {
        let lowered = path.to_lowercase();
        self.per_directory
            .iter()
            .filter(|(pattern, _)| lowered.contains(pattern.as_str()))
            .max_by_key(|(pattern, _)| pattern.len())
            .map_or(self.default, |(_, tolerance)| *tolerance)
    }
}

/// Centrality strategy for blast-radius scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityKind {
    #[default]
    InDegree,
    PageRank,
}

/// Size and fan-out limits for context-neighborhood expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionBudget {
    pub max_bytes: usize,
    pub fan_out: usize,
}

impl Default for ExpansionBudget {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024,
            fan_out: 5,
        }
    }
}

/// Queue, batch, and wall-clock limits for the ingestion and query paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineLimits {
    pub write_queue_capacity: usize,
    pub write_batch_size: usize,
    pub effects_queue_capacity: usize,
    pub scan_budget_ms: u64,
    pub fact_budget_ms: u64,
    pub inference_budget_ms: u64,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            write_queue_capacity: 256,
            write_batch_size: 32,
            effects_queue_capacity: 128,
            scan_budget_ms: 60_000,
            fact_budget_ms: 4_000,
            inference_budget_ms: 30_000,
        }
    }
}
