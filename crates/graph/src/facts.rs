use crate::store::GraphState;
use advisor_protocol::{CentralityKind, EdgeKind, LayerPolicy, NodeId, NodeKind, Revision};
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

/// One edge crossing a disallowed layer boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerViolation {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub from_layer: String,
    pub to_layer: String,
}

/// Deterministic architectural facts computed against one snapshot
/// revision. Sections the budget did not allow for are reported as
/// unknown, never guessed.
#[derive(Debug, Clone, Serialize)]
pub struct FactReport {
    pub revision: Revision,
    pub cycles: Vec<Vec<NodeId>>,
    pub layer_violations: Vec<LayerViolation>,
    /// Files whose last parse failed; no facts are derived from their
    /// stale subtrees until they parse again.
    pub needs_syntax_fix: Vec<String>,
    /// True when the wall-clock budget expired before every section ran.
    pub partial: bool,
}

impl FactReport {
    /// Compute all fact sections, degrading to a partial report when the
    /// budget runs out mid-way.
    #[must_use]
    pub fn compute(state: &GraphState, policy: &LayerPolicy, deadline: Option<Instant>) -> Self {
        let mut needs_syntax_fix: Vec<String> = state.unparsable_files().keys().cloned().collect();
        needs_syntax_fix.sort();

        let mut report = Self {
            revision: state.revision(),
            cycles: Vec::new(),
            layer_violations: Vec::new(),
            needs_syntax_fix,
            partial: false,
        };

        if budget_exceeded(deadline) {
            report.partial = true;
            return report;
        }
        report.cycles = dependency_cycles(state);

        if budget_exceeded(deadline) {
            report.partial = true;
            return report;
        }
        report.layer_violations = layer_violations(state, policy);

        report
    }

    /// Layer violations touching a given file.
    #[must_use]
    pub fn violations_for_file(&self, file: &str) -> Vec<&LayerViolation> {
        self.layer_violations
            .iter()
            .filter(|violation| violation.source.file == file)
            .collect()
    }
}

fn budget_exceeded(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// All directed cycles among DependsOn edges, each reported once as the
/// shortest cycle through its members, canonicalized to start at the
/// lexicographically minimal node. Output order: shortest first, then
/// lexicographic.
#[must_use]
pub fn dependency_cycles(state: &GraphState) -> Vec<Vec<NodeId>> {
    let graph = state.petgraph();

    // DependsOn adjacency with targets sorted for determinism.
    let mut adjacency: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
    for edge in graph.edge_references() {
        if *edge.weight() == EdgeKind::DependsOn {
            adjacency.entry(edge.source()).or_default().push(edge.target());
        }
    }
    for targets in adjacency.values_mut() {
        targets.sort_by_key(|&idx| graph.node_weight(idx).map(|n| n.id.clone()));
        targets.dedup();
    }

    let mut seen: HashSet<Vec<NodeId>> = HashSet::new();
    let mut cycles: Vec<Vec<NodeId>> = Vec::new();

    let mut starts: Vec<NodeIndex> = adjacency.keys().copied().collect();
    starts.sort_by_key(|&idx| graph.node_weight(idx).map(|n| n.id.clone()));

    for start in starts {
        if let Some(cycle) = shortest_cycle_through(&adjacency, start) {
            let ids: Vec<NodeId> = cycle
                .iter()
                .filter_map(|&idx| graph.node_weight(idx).map(|n| n.id.clone()))
                .collect();
            let canonical = canonical_rotation(ids);
            if seen.insert(canonical.clone()) {
                cycles.push(canonical);
            }
        }
    }

    cycles.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    cycles
}

/// BFS back to `start` over the DependsOn adjacency; returns the node
/// sequence of the shortest cycle through `start`, if any.
fn shortest_cycle_through(
    adjacency: &HashMap<NodeIndex, Vec<NodeIndex>>,
    start: NodeIndex,
) -> Option<Vec<NodeIndex>> {
    let mut parents: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    let mut queue: VecDeque<NodeIndex> = VecDeque::new();
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for &next in adjacency.get(&current).map_or(&[][..], Vec::as_slice) {
            if next == start {
                // Unwind the path start -> ... -> current.
                let mut path = vec![current];
                let mut cursor = current;
                while cursor != start {
                    cursor = parents[&cursor];
                    path.push(cursor);
                }
                path.reverse();
                return Some(path);
            }
            if !parents.contains_key(&next) && next != start {
                parents.insert(next, current);
                queue.push_back(next);
            }
        }
    }
    None
}

fn canonical_rotation(cycle: Vec<NodeId>) -> Vec<NodeId> {
    let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.cmp(b))
        .map(|(pos, _)| pos)
    else {
        return cycle;
    };
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_pos..]);
    rotated.extend_from_slice(&cycle[..min_pos]);
    rotated
}

/// Flag DependsOn/Calls edges whose source layer is forbidden from
/// depending on the target layer. Files marked unparsable contribute no
/// violations (their subtrees are stale).
#[must_use]
pub fn layer_violations(state: &GraphState, policy: &LayerPolicy) -> Vec<LayerViolation> {
    let graph = state.petgraph();
    let mut violations = Vec::new();

    for edge in graph.edge_references() {
        if !matches!(*edge.weight(), EdgeKind::DependsOn | EdgeKind::Calls) {
            continue;
        }
        let (Some(source), Some(target)) = (
            graph.node_weight(edge.source()),
            graph.node_weight(edge.target()),
        ) else {
            continue;
        };
        if state.unparsable_files().contains_key(&source.id.file) {
            continue;
        }
        let (Some(from_layer), Some(to_layer)) = (
            policy.layer_of(&source.id.file),
            policy.layer_of(&target.id.file),
        ) else {
            continue;
        };
        if policy.is_forbidden(from_layer, to_layer) {
            violations.push(LayerViolation {
                source: source.id.clone(),
                target: target.id.clone(),
                kind: *edge.weight(),
                from_layer: from_layer.to_string(),
                to_layer: to_layer.to_string(),
            });
        }
    }

    violations.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
    violations
}

/// Incoming-edge centrality over DependsOn/Calls edges, one score per
/// node. Strategy is pluggable: normalized in-degree or PageRank.
#[must_use]
pub fn centrality(state: &GraphState, kind: CentralityKind) -> HashMap<NodeId, f64> {
    match kind {
        CentralityKind::InDegree => in_degree_centrality(state),
        CentralityKind::PageRank => pagerank_centrality(state),
    }
}

fn relevant(kind: EdgeKind) -> bool {
    matches!(kind, EdgeKind::DependsOn | EdgeKind::Calls)
}

fn in_degree_centrality(state: &GraphState) -> HashMap<NodeId, f64> {
    let graph = state.petgraph();
    let node_count = graph.node_count();
    let denominator = node_count.saturating_sub(1).max(1) as f64;

    graph
        .node_indices()
        .filter_map(|idx| {
            let node = graph.node_weight(idx)?;
            let in_degree = graph
                .edges_directed(idx, Direction::Incoming)
                .filter(|edge| relevant(*edge.weight()))
                .count();
            Some((node.id.clone(), in_degree as f64 / denominator))
        })
        .collect()
}

fn pagerank_centrality(state: &GraphState) -> HashMap<NodeId, f64> {
    const DAMPING: f64 = 0.85;
    const ITERATIONS: usize = 20;

    let graph = state.petgraph();
    let indices: Vec<NodeIndex> = graph.node_indices().collect();
    let node_count = indices.len();
    if node_count == 0 {
        return HashMap::new();
    }

    let out_degree: HashMap<NodeIndex, usize> = indices
        .iter()
        .map(|&idx| {
            let degree = graph
                .edges(idx)
                .filter(|edge| relevant(*edge.weight()))
                .count();
            (idx, degree)
        })
        .collect();

    let base = 1.0 / node_count as f64;
    let mut scores: HashMap<NodeIndex, f64> = indices.iter().map(|&idx| (idx, base)).collect();

    for _ in 0..ITERATIONS {
        let mut next: HashMap<NodeIndex, f64> = indices
            .iter()
            .map(|&idx| (idx, (1.0 - DAMPING) * base))
            .collect();
        for edge in graph.edge_references() {
            if !relevant(*edge.weight()) {
                continue;
            }
            let degree = out_degree.get(&edge.source()).copied().unwrap_or(0);
            if degree == 0 {
                continue;
            }
            let share = DAMPING * scores[&edge.source()] / degree as f64;
            if let Some(slot) = next.get_mut(&edge.target()) {
                *slot += share;
            }
        }
        scores = next;
    }

    scores
        .into_iter()
        .filter_map(|(idx, score)| graph.node_weight(idx).map(|n| (n.id.clone(), score)))
        .collect()
}

/// Percentile (0..=1) of each node's centrality within the current
/// graph; this is the blast-radius factor applied to severity.
#[must_use]
pub fn centrality_percentiles(scores: &HashMap<NodeId, f64>) -> HashMap<NodeId, f64> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let mut ordered: Vec<f64> = scores.values().copied().collect();
    ordered.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let total = ordered.len() as f64;

    scores
        .iter()
        .map(|(id, score)| {
            let rank = ordered.partition_point(|&value| value <= *score);
            (id.clone(), rank as f64 / total)
        })
        .collect()
}

/// Types whose method count exceeds the threshold, most methods first.
#[must_use]
pub fn god_types(state: &GraphState, method_threshold: u32) -> Vec<NodeId> {
    let graph = state.petgraph();
    let mut hits: Vec<(&NodeId, u32)> = graph
        .node_indices()
        .filter_map(|idx| graph.node_weight(idx))
        .filter(|node| node.id.kind == NodeKind::Type && node.method_count >= method_threshold)
        .map(|node| (&node.id, node.method_count))
        .collect();
    hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    hits.into_iter().map(|(id, _)| id.clone()).collect()
}

/// Methods whose cyclomatic complexity exceeds the threshold.
#[must_use]
pub fn complex_methods(state: &GraphState, complexity_threshold: u32) -> Vec<NodeId> {
    let graph = state.petgraph();
    let mut hits: Vec<(&NodeId, u32)> = graph
        .node_indices()
        .filter_map(|idx| graph.node_weight(idx))
        .filter(|node| {
            node.id.kind == NodeKind::Method && node.complexity >= complexity_threshold
        })
        .map(|node| (&node.id, node.complexity))
        .collect();
    hits.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    hits.into_iter().map(|(id, _)| id.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_protocol::{EdgeRecord, Fingerprint, LayerRule, Span, StructuralNode};
    use pretty_assertions::assert_eq;

    fn file_node(file: &str) -> StructuralNode {
        StructuralNode {
            id: NodeId::file(file),
            span: Span::default(),
            fingerprint: Fingerprint::from_digest(file.as_bytes()),
            complexity: 0,
            method_count: 0,
            revision: Revision::default(),
        }
    }

    fn depends(source: &str, target: &str) -> EdgeRecord {
        EdgeRecord {
            source: NodeId::file(source),
            target: NodeId::file(target),
            kind: EdgeKind::DependsOn,
        }
    }

    fn graph_of(deps: &[(&str, &[&str])]) -> GraphState {
        let mut state = GraphState::new();
        for (file, targets) in deps {
            let edges = targets.iter().map(|t| depends(file, t)).collect();
            state
                .apply_delta(file, vec![file_node(file)], edges)
                .unwrap();
        }
        state
    }

    #[test]
    fn three_cycle_reports_canonical_rotation() {
        let state = graph_of(&[
            ("a.py", &["b.py"]),
            ("b.py", &["c.py"]),
            ("c.py", &["a.py"]),
        ]);

        let cycles = dependency_cycles(&state);
        assert_eq!(
            cycles,
            vec![vec![
                NodeId::file("a.py"),
                NodeId::file("b.py"),
                NodeId::file("c.py"),
            ]]
        );
    }

    #[test]
    fn shorter_cycles_come_first_and_output_is_stable() {
        let state = graph_of(&[
            ("a.py", &["b.py"]),
            ("b.py", &["a.py", "c.py"]),
            ("c.py", &["d.py"]),
            ("d.py", &["b.py"]),
        ]);

        let cycles = dependency_cycles(&state);
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0].len(), 2);
        assert_eq!(cycles[0][0], NodeId::file("a.py"));
        assert_eq!(cycles[1].len(), 3);

        // Re-deriving from the same snapshot is reproducible.
        assert_eq!(cycles, dependency_cycles(&state));
    }

    #[test]
    fn acyclic_graph_reports_no_cycles() {
        let state = graph_of(&[("a.py", &["b.py"]), ("b.py", &["c.py"]), ("c.py", &[])]);
        assert!(dependency_cycles(&state).is_empty());
    }

    #[test]
    fn forbidden_layer_edge_is_flagged() {
        let state = graph_of(&[
            ("src/domain/user.py", &["src/infra/db.py"]),
            ("src/infra/db.py", &[]),
        ]);
        let policy = LayerPolicy {
            layers: vec![
                LayerRule {
                    name: "domain".to_string(),
                    path_patterns: vec!["domain".to_string()],
                },
                LayerRule {
                    name: "infrastructure".to_string(),
                    path_patterns: vec!["infra".to_string()],
                },
            ],
            forbidden: vec![("domain".to_string(), "infrastructure".to_string())],
        };

        let violations = layer_violations(&state, &policy);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].from_layer, "domain");
        assert_eq!(violations[0].to_layer, "infrastructure");

        // The reverse direction is allowed by this policy.
        let reversed = graph_of(&[
            ("src/infra/db.py", &["src/domain/user.py"]),
            ("src/domain/user.py", &[]),
        ]);
        assert!(layer_violations(&reversed, &policy).is_empty());
    }

    #[test]
    fn hub_file_has_highest_centrality() {
        let state = graph_of(&[
            ("hub.py", &[]),
            ("a.py", &["hub.py"]),
            ("b.py", &["hub.py"]),
            ("c.py", &["hub.py", "a.py"]),
        ]);

        for kind in [CentralityKind::InDegree, CentralityKind::PageRank] {
            let scores = centrality(&state, kind);
            let hub = scores[&NodeId::file("hub.py")];
            for (id, score) in &scores {
                if id.file != "hub.py" {
                    assert!(hub > *score, "{kind:?}: hub must dominate {id}");
                }
            }

            let percentiles = centrality_percentiles(&scores);
            assert!((percentiles[&NodeId::file("hub.py")] - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn report_lists_unparsable_files_and_revision() {
        let mut state = graph_of(&[("a.py", &[])]);
        state.mark_unparsable("broken.py", vec![Span::default()]);

        let report = FactReport::compute(&state, &LayerPolicy::default(), None);
        assert_eq!(report.revision, state.revision());
        assert_eq!(report.needs_syntax_fix, vec!["broken.py".to_string()]);
        assert!(!report.partial);
    }
}
