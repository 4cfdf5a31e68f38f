use crate::error::{GraphError, Result};
use crate::store::GraphState;
use advisor_protocol::{EdgeKind, EdgeRecord, ExpansionBudget, NodeId, NodeKind, Revision, Span};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};

/// Estimated cost of a signature-only rendering, charged against the
/// byte budget instead of the full body.
const SIGNATURE_COST: usize = 64;

/// How a node is rendered in the neighborhood: full body, or name plus
/// shape only once the budget nears exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderMode {
    Full,
    SignatureOnly,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncludedNode {
    pub id: NodeId,
    pub span: Span,
    pub mode: RenderMode,
}

/// Bounded, pruned neighborhood around a focal node, for downstream
/// prompting. Repeated expansions of the same graph state produce the
/// same subgraph.
#[derive(Debug, Clone, Serialize)]
pub struct Neighborhood {
    pub focal: NodeId,
    pub revision: Revision,
    pub nodes: Vec<IncludedNode>,
    pub edges: Vec<EdgeRecord>,
}

/// Breadth-first expansion over DependsOn/Calls/Implements edges with a
/// fixed fan-out per hop and a total size budget. Private (same-file)
/// callees of a fully included method are pulled in with their bodies
/// and do not count against the fan-out.
pub fn expand(state: &GraphState, focal: &NodeId, budget: &ExpansionBudget) -> Result<Neighborhood> {
    let graph = state.petgraph();
    let focal_idx = state
        .index_of(focal)
        .ok_or_else(|| GraphError::NodeNotFound(focal.to_string()))?;

    let mut spent = 0usize;
    let mut degraded = false;
    let mut visited: HashSet<NodeIndex> = HashSet::new();
    let mut included: HashSet<NodeIndex> = HashSet::new();
    let mut nodes: Vec<IncludedNode> = Vec::new();
    let mut edges: Vec<EdgeRecord> = Vec::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();

    let mut admit = |idx: NodeIndex,
                     spent: &mut usize,
                     degraded: &mut bool,
                     visited: &mut HashSet<NodeIndex>,
                     nodes: &mut Vec<IncludedNode>|
     -> bool {
        if !visited.insert(idx) {
            return false;
        }
        let Some(node) = graph.node_weight(idx) else {
            return false;
        };

        let body_cost = node.span.byte_len().max(1);
        // Nearing the budget flips the remainder of the expansion to
        // signature-only so structural shape stays cheap to keep.
        if !*degraded && (*spent + body_cost) * 10 > budget.max_bytes * 9 {
            *degraded = true;
        }
        let (mode, cost) = if *degraded {
            (RenderMode::SignatureOnly, SIGNATURE_COST)
        } else {
            (RenderMode::Full, body_cost)
        };
        if *spent + cost > budget.max_bytes {
            return false;
        }
        *spent += cost;
        nodes.push(IncludedNode {
            id: node.id.clone(),
            span: node.span,
            mode,
        });
        true
    };

    if !admit(focal_idx, &mut spent, &mut degraded, &mut visited, &mut nodes) {
        return Err(GraphError::NodeNotFound(focal.to_string()));
    }
    included.insert(focal_idx);
    queue.push_back(focal_idx);

    while let Some(current) = queue.pop_front() {
        let current_id = match graph.node_weight(current) {
            Some(node) => node.id.clone(),
            None => continue,
        };
        let current_full = nodes
            .iter()
            .find(|n| n.id == current_id)
            .is_some_and(|n| n.mode == RenderMode::Full);

        let mut neighbors: Vec<(u8, NodeId, NodeIndex, EdgeKind)> = graph
            .edges(current)
            .filter_map(|edge| {
                let kind = *edge.weight();
                let priority = match kind {
                    EdgeKind::DependsOn => 0u8,
                    EdgeKind::Calls => 1,
                    EdgeKind::Implements => 2,
                    EdgeKind::Contains => return None,
                };
                let target = graph.node_weight(edge.target())?;
                Some((priority, target.id.clone(), edge.target(), kind))
            })
            .collect();
        neighbors.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        // Same-file callees of a fully rendered method come first and
        // bypass the fan-out cap: their bodies complete the story.
        let is_private_callee = |target: &NodeId, kind: EdgeKind| {
            kind == EdgeKind::Calls
                && current_id.kind == NodeKind::Method
                && target.file == current_id.file
                && current_full
        };

        let mut taken = 0usize;
        for (_, target_id, target_idx, kind) in neighbors {
            let private = is_private_callee(&target_id, kind);
            if !private && taken >= budget.fan_out {
                continue;
            }
            let admitted = admit(
                target_idx,
                &mut spent,
                &mut degraded,
                &mut visited,
                &mut nodes,
            );
            if admitted {
                included.insert(target_idx);
                queue.push_back(target_idx);
            }
            if included.contains(&target_idx) {
                edges.push(EdgeRecord {
                    source: current_id.clone(),
                    target: target_id.clone(),
                    kind,
                });
            }
            if !private {
                taken += 1;
            }
        }
    }

    edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    edges.dedup();

    Ok(Neighborhood {
        focal: focal.clone(),
        revision: state.revision(),
        nodes,
        edges,
    })
}
