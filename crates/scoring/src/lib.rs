//! # Advisor Scoring
//!
//! Single-responsibility violation scoring: four independently computed
//! sub-signals combined into a configured weighted sum.
//!
//! - semantic diversity: density clustering over per-method signature
//!   embeddings (supplied by the external embedding collaborator)
//! - dependency diversity: entropy over imported-dependency concerns
//! - naming diversity: entropy over method-name verb categories
//! - method count: normalized against the per-directory tolerance
//!
//! The weights, threshold, and boost all come from configuration; the
//! engine hard-codes nothing.

mod cluster;
mod concerns;
mod error;
mod scorer;
mod verbs;

pub use cluster::cluster_count;
pub use concerns::concern_counts;
pub use error::{Result, ScoringError};
pub use scorer::{ScoreBreakdown, ScoreInputs, Scorer, Severity};
pub use verbs::{extract_verb, verb_category_counts};

/// Embedding collaborator boundary. Called for violations and ignores
/// only, never on the per-save hot path.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
