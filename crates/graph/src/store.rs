use crate::error::{GraphError, Result};
use advisor_protocol::{EdgeKind, EdgeRecord, NodeId, Revision, Span, StructuralNode};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// The structural graph: sole owner of nodes and edges.
///
/// Mutation happens through whole-file transactions (`apply_delta`,
/// `remove_file`, `mark_unparsable`); each commit bumps the revision.
/// Cross-file edges whose target is not present yet are parked in a
/// pending set and linked the moment the target node appears, which is
/// what makes deltas converge to the same graph regardless of arrival
/// order.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    graph: StableDiGraph<StructuralNode, EdgeKind>,
    ids: HashMap<NodeId, NodeIndex>,
    by_file: HashMap<String, Vec<NodeIndex>>,
    /// Missing target id -> edges waiting for it.
    pending: HashMap<NodeId, Vec<(NodeId, EdgeKind)>>,
    /// Files whose last parse failed; their prior subtree is kept
    /// (stale-but-valid) and fact queries treat them as unknown.
    unparsable: HashMap<String, Vec<Span>>,
    revision: Revision,
}

impl GraphState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_revision(revision: Revision) -> Self {
        Self {
            revision,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&StructuralNode> {
        self.ids.get(id).and_then(|&idx| self.graph.node_weight(idx))
    }

    #[must_use]
    pub fn contains_file(&self, file: &str) -> bool {
        self.by_file.contains_key(file)
    }

    /// Nodes owned by a file, ordered by source position.
    #[must_use]
    pub fn nodes_in_file(&self, file: &str) -> Vec<&StructuralNode> {
        let mut nodes: Vec<&StructuralNode> = self
            .by_file
            .get(file)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .unwrap_or_default();
        nodes.sort_by_key(|node| (node.span.start_byte, node.id.clone()));
        nodes
    }

    /// All committed edges, as flat records.
    #[must_use]
    pub fn edge_records(&self) -> Vec<EdgeRecord> {
        let mut records: Vec<EdgeRecord> = self
            .graph
            .edge_references()
            .filter_map(|edge| {
                let source = self.graph.node_weight(edge.source())?.id.clone();
                let target = self.graph.node_weight(edge.target())?.id.clone();
                Some(EdgeRecord {
                    source,
                    target,
                    kind: *edge.weight(),
                })
            })
            .collect();
        records.sort_by(|a, b| (&a.source, &a.target, a.kind as u8).cmp(&(&b.source, &b.target, b.kind as u8)));
        records
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    #[must_use]
    pub fn unparsable_files(&self) -> &HashMap<String, Vec<Span>> {
        &self.unparsable
    }

    /// Replace a file's whole subtree in one all-or-nothing transaction:
    /// detach-delete every node owned by the file (cascading edge
    /// removal), insert the new node/edge set, link any pending edges
    /// whose targets just appeared.
    pub fn apply_delta(
        &mut self,
        file: &str,
        nodes: Vec<StructuralNode>,
        edges: Vec<EdgeRecord>,
    ) -> Result<Revision> {
        // Validate before touching anything so a bad delta leaves the
        // prior revision intact.
        let new_ids: HashSet<&NodeId> = nodes.iter().map(|node| &node.id).collect();
        for node in &nodes {
            if node.id.file != file {
                return Err(GraphError::InvalidDelta(format!(
                    "node {} does not belong to {file}",
                    node.id
                )));
            }
        }
        if new_ids.len() != nodes.len() {
            return Err(GraphError::InvalidDelta(format!(
                "duplicate node ids in delta for {file}"
            )));
        }
        for edge in &edges {
            if !new_ids.contains(&edge.source) {
                return Err(GraphError::InvalidDelta(format!(
                    "edge source {} is not part of the delta for {file}",
                    edge.source
                )));
            }
        }

        self.detach(file);

        let next = self.revision.next();
        let mut inserted: Vec<(NodeId, NodeIndex)> = Vec::with_capacity(nodes.len());
        for mut node in nodes {
            node.revision = next;
            let id = node.id.clone();
            let idx = self.graph.add_node(node);
            self.ids.insert(id.clone(), idx);
            self.by_file
                .entry(file.to_string())
                .or_default()
                .push(idx);
            inserted.push((id, idx));
        }

        for edge in edges {
            let Some(&source_idx) = self.ids.get(&edge.source) else {
                continue;
            };
            if let Some(&target_idx) = self.ids.get(&edge.target) {
                self.add_edge_unique(source_idx, target_idx, edge.kind);
            } else {
                self.park_pending(edge.source, edge.target, edge.kind);
            }
        }

        // Newly present nodes satisfy edges other files were waiting on.
        for (id, idx) in inserted {
            let Some(waiters) = self.pending.remove(&id) else {
                continue;
            };
            for (source, kind) in waiters {
                if let Some(&source_idx) = self.ids.get(&source) {
                    self.add_edge_unique(source_idx, idx, kind);
                } else {
                    self.park_pending(source, id.clone(), kind);
                }
            }
        }

        self.unparsable.remove(file);
        self.revision = next;
        log::debug!(
            "applied delta for {file} at {next}: {} nodes, {} edges total",
            self.graph.node_count(),
            self.graph.edge_count()
        );
        Ok(next)
    }

    /// Detach-delete with no recreate, for deleted/renamed files.
    /// Idempotent: removing an absent file is a no-op, not an error.
    pub fn remove_file(&mut self, file: &str) -> Revision {
        let had_nodes = self.by_file.contains_key(file);
        let had_mark = self.unparsable.remove(file).is_some();
        if !had_nodes {
            if had_mark {
                self.revision = self.revision.next();
            }
            return self.revision;
        }
        self.detach(file);
        self.revision = self.revision.next();
        self.revision
    }

    /// Record a parse failure. The file's prior subtree is deliberately
    /// left untouched: stale-but-valid beats empty.
    pub fn mark_unparsable(&mut self, file: &str, error_spans: Vec<Span>) -> Revision {
        self.unparsable.insert(file.to_string(), error_spans);
        self.revision = self.revision.next();
        self.revision
    }

    fn detach(&mut self, file: &str) {
        let Some(indices) = self.by_file.remove(file) else {
            return;
        };

        // Incoming cross-file edges survive as pending entries so they
        // relink if the file's nodes come back under the same ids.
        for &idx in &indices {
            let Some(node) = self.graph.node_weight(idx) else {
                continue;
            };
            let target_id = node.id.clone();
            let incoming: Vec<(NodeIndex, EdgeKind)> = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .map(|edge| (edge.source(), *edge.weight()))
                .collect();
            for (source_idx, kind) in incoming {
                let source_id = match self.graph.node_weight(source_idx) {
                    Some(source) => source.id.clone(),
                    None => continue,
                };
                if source_id.file != file {
                    self.park_pending(source_id, target_id.clone(), kind);
                }
            }
        }

        for idx in indices {
            if let Some(node) = self.graph.node_weight(idx) {
                self.ids.remove(&node.id.clone());
            }
            self.graph.remove_node(idx);
        }

        // Pending edges sourced from the detached file die with it; the
        // new parse re-emits whatever still holds.
        for waiters in self.pending.values_mut() {
            waiters.retain(|(source, _)| source.file != file);
        }
        self.pending.retain(|_, waiters| !waiters.is_empty());
    }

    fn park_pending(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) {
        let waiters = self.pending.entry(target).or_default();
        if !waiters.iter().any(|(s, k)| *s == source && *k == kind) {
            waiters.push((source, kind));
        }
    }

    fn add_edge_unique(&mut self, source: NodeIndex, target: NodeIndex, kind: EdgeKind) {
        let exists = self
            .graph
            .edges(source)
            .any(|edge| edge.target() == target && *edge.weight() == kind);
        if !exists {
            self.graph.add_edge(source, target, kind);
        }
    }

    /// Consistency check: every edge endpoint must resolve through the id
    /// index. A failure names the file to force-rescan.
    pub fn verify_integrity(&self) -> Result<()> {
        for edge in self.graph.edge_references() {
            for endpoint in [edge.source(), edge.target()] {
                let Some(node) = self.graph.node_weight(endpoint) else {
                    return Err(GraphError::DanglingReference {
                        file: String::new(),
                        detail: "edge endpoint without node weight".to_string(),
                    });
                };
                if self.ids.get(&node.id) != Some(&endpoint) {
                    return Err(GraphError::DanglingReference {
                        file: node.id.file.clone(),
                        detail: format!("node {} missing from id index", node.id),
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn petgraph(&self) -> &StableDiGraph<StructuralNode, EdgeKind> {
        &self.graph
    }

    pub(crate) fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    pub(crate) fn pending_edges(&self) -> Vec<(NodeId, NodeId, EdgeKind)> {
        let mut flat: Vec<(NodeId, NodeId, EdgeKind)> = self
            .pending
            .iter()
            .flat_map(|(target, waiters)| {
                waiters
                    .iter()
                    .map(|(source, kind)| (source.clone(), target.clone(), *kind))
            })
            .collect();
        flat.sort();
        flat
    }

    pub(crate) fn restore_pending(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) {
        self.park_pending(source, target, kind);
    }

    pub(crate) fn restore_unparsable(&mut self, unparsable: HashMap<String, Vec<Span>>) {
        self.unparsable = unparsable;
    }

    /// Restore a node from a persisted snapshot, keeping its recorded
    /// revision instead of stamping a new one.
    pub(crate) fn restore_node(&mut self, node: StructuralNode) {
        let id = node.id.clone();
        let file = id.file.clone();
        let idx = self.graph.add_node(node);
        self.ids.insert(id, idx);
        self.by_file.entry(file).or_default().push(idx);
    }

    /// Restore a committed edge; both endpoints must already exist.
    pub(crate) fn restore_edge(&mut self, edge: &EdgeRecord) -> Result<()> {
        let source = self.ids.get(&edge.source).copied().ok_or_else(|| {
            GraphError::DanglingReference {
                file: edge.source.file.clone(),
                detail: format!("persisted edge source {} missing", edge.source),
            }
        })?;
        let target = self.ids.get(&edge.target).copied().ok_or_else(|| {
            GraphError::DanglingReference {
                file: edge.target.file.clone(),
                detail: format!("persisted edge target {} missing", edge.target),
            }
        })?;
        self.add_edge_unique(source, target, edge.kind);
        Ok(())
    }

    pub(crate) fn force_revision(&mut self, revision: Revision) {
        self.revision = revision;
    }

    #[must_use]
    pub fn files_sorted(&self) -> Vec<String> {
        let mut files: Vec<String> = self.by_file.keys().cloned().collect();
        files.sort();
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_protocol::{Fingerprint, NodeKind};

    fn node(file: &str, name: &str, kind: NodeKind) -> StructuralNode {
        let id = if kind == NodeKind::File {
            NodeId::file(file)
        } else {
            NodeId::named(file, name, kind)
        };
        StructuralNode {
            id,
            span: Span::default(),
            fingerprint: Fingerprint::from_digest(name.as_bytes()),
            complexity: 0,
            method_count: 0,
            revision: Revision::default(),
        }
    }

    fn file_unit(file: &str, deps: &[&str]) -> (Vec<StructuralNode>, Vec<EdgeRecord>) {
        let nodes = vec![node(file, file, NodeKind::File)];
        let edges = deps
            .iter()
            .map(|dep| EdgeRecord {
                source: NodeId::file(file),
                target: NodeId::file(*dep),
                kind: EdgeKind::DependsOn,
            })
            .collect();
        (nodes, edges)
    }

    #[test]
    fn revision_is_monotonic_per_commit() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &[]);
        let r1 = state.apply_delta("a.py", nodes, edges).unwrap();
        let (nodes, edges) = file_unit("b.py", &[]);
        let r2 = state.apply_delta("b.py", nodes, edges).unwrap();
        assert!(r2 > r1);
        assert_eq!(state.revision(), r2);
    }

    #[test]
    fn delete_removes_every_touching_edge() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &["b.py"]);
        state.apply_delta("a.py", nodes, edges).unwrap();
        let (nodes, edges) = file_unit("b.py", &["a.py"]);
        state.apply_delta("b.py", nodes, edges).unwrap();
        assert_eq!(state.edge_count(), 2);

        state.remove_file("b.py");

        assert!(!state.contains_file("b.py"));
        let records = state.edge_records();
        assert!(
            records
                .iter()
                .all(|e| e.source.file != "b.py" && e.target.file != "b.py"),
            "no edge may reference the deleted file: {records:?}"
        );
        state.verify_integrity().unwrap();
    }

    #[test]
    fn remove_is_idempotent() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &[]);
        state.apply_delta("a.py", nodes, edges).unwrap();
        let r1 = state.remove_file("a.py");
        let r2 = state.remove_file("a.py");
        assert_eq!(r1, r2);
    }

    #[test]
    fn deferred_edges_link_in_any_arrival_order() {
        // a depends on b; apply a first, then b.
        let mut forward = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &["b.py"]);
        forward.apply_delta("a.py", nodes, edges).unwrap();
        assert_eq!(forward.edge_count(), 0);
        let (nodes, edges) = file_unit("b.py", &[]);
        forward.apply_delta("b.py", nodes, edges).unwrap();

        // Same deltas, reverse order.
        let mut reverse = GraphState::new();
        let (nodes, edges) = file_unit("b.py", &[]);
        reverse.apply_delta("b.py", nodes, edges).unwrap();
        let (nodes, edges) = file_unit("a.py", &["b.py"]);
        reverse.apply_delta("a.py", nodes, edges).unwrap();

        assert_eq!(forward.edge_records(), reverse.edge_records());
        assert_eq!(forward.edge_count(), 1);
    }

    #[test]
    fn incoming_edges_relink_after_recreate() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &["b.py"]);
        state.apply_delta("a.py", nodes, edges).unwrap();
        let (nodes, edges) = file_unit("b.py", &[]);
        state.apply_delta("b.py", nodes, edges).unwrap();
        assert_eq!(state.edge_count(), 1);

        // b changes: detach-delete then recreate. a's edge must survive
        // the round trip without a re-parse of a.
        let (nodes, edges) = file_unit("b.py", &[]);
        state.apply_delta("b.py", nodes, edges).unwrap();
        assert_eq!(state.edge_count(), 1);
        state.verify_integrity().unwrap();
    }

    #[test]
    fn reapplying_same_delta_creates_no_duplicate_edges() {
        let mut state = GraphState::new();
        for _ in 0..3 {
            let (nodes, edges) = file_unit("a.py", &["b.py"]);
            state.apply_delta("a.py", nodes, edges).unwrap();
            let (nodes, edges) = file_unit("b.py", &["a.py"]);
            state.apply_delta("b.py", nodes, edges).unwrap();
        }
        assert_eq!(state.edge_count(), 2);
    }

    #[test]
    fn bad_delta_leaves_prior_revision_intact() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &[]);
        let before = state.apply_delta("a.py", nodes, edges).unwrap();

        let stray = vec![node("other.py", "other.py", NodeKind::File)];
        let err = state.apply_delta("a.py", stray, Vec::new()).unwrap_err();
        assert!(matches!(err, GraphError::InvalidDelta(_)));
        assert_eq!(state.revision(), before);
        assert!(state.contains_file("a.py"));
    }

    #[test]
    fn unparsable_mark_keeps_prior_subtree() {
        let mut state = GraphState::new();
        let (nodes, edges) = file_unit("a.py", &[]);
        state.apply_delta("a.py", nodes, edges).unwrap();
        state.mark_unparsable("a.py", vec![Span::default()]);

        assert!(state.contains_file("a.py"));
        assert!(state.unparsable_files().contains_key("a.py"));

        // A successful re-parse clears the mark.
        let (nodes, edges) = file_unit("a.py", &[]);
        state.apply_delta("a.py", nodes, edges).unwrap();
        assert!(!state.unparsable_files().contains_key("a.py"));
    }
}
