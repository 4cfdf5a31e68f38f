use crate::error::Result;
use advisor_graph::{FactReport, Neighborhood};
use advisor_ledger::ViolationRecord;
use advisor_protocol::NodeId;
use advisor_scoring::ScoreBreakdown;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// Everything the inference collaborator receives: deterministic facts,
/// the pruned neighborhood, the focal snippet, its score, and the
/// ledger's prior findings for the same node. The engine never parses
/// or validates what comes back.
#[derive(Debug, Serialize)]
pub struct ContextBundle {
    pub file: String,
    pub focal: NodeId,
    pub snippet: String,
    pub facts: FactReport,
    pub neighborhood: Neighborhood,
    pub score: ScoreBreakdown,
    /// Centrality percentile of the focal node (blast radius).
    pub blast_radius: f64,
    pub prior_findings: Vec<ViolationRecord>,
}

/// Lazy, finite, non-restartable sequence of verdict text fragments.
/// The presentation layer drains it; the engine only concatenates.
pub type VerdictStream = mpsc::Receiver<String>;

/// Inference collaborator boundary.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn advise(&self, bundle: ContextBundle) -> Result<VerdictStream>;
}
