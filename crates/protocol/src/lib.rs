//! # Advisor Protocol
//!
//! Shared vocabulary for the structural advisor: node/edge model,
//! fingerprints, revisions, and the externally supplied configuration
//! surface. Every other crate in the workspace speaks these types.

mod config;
mod model;

pub use config::{
    CentralityKind, EngineLimits, ExpansionBudget, LayerPolicy, LayerRule, RuleSetVersion,
    ScoringWeights, TolerancePolicy,
};
pub use model::{
    EdgeKind, EdgeRecord, Fingerprint, ImportRecord, NodeId, NodeKind, Revision, Span,
    StructuralNode,
};
