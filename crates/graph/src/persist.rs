use crate::error::Result;
use crate::store::GraphState;
use advisor_protocol::{EdgeKind, EdgeRecord, NodeId, Revision, Span, StructuralNode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Flat persisted layout: node table, edge table, deferred edges, parse
/// failures, and the revision counter: everything needed to resume
/// after a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphTables {
    pub nodes: Vec<StructuralNode>,
    pub edges: Vec<EdgeRecord>,
    pub pending: Vec<(NodeId, NodeId, EdgeKind)>,
    pub unparsable: HashMap<String, Vec<Span>>,
    pub revision: Revision,
}

impl GraphState {
    #[must_use]
    pub fn to_tables(&self) -> GraphTables {
        let mut nodes: Vec<StructuralNode> = Vec::with_capacity(self.node_count());
        for file in self.files_sorted() {
            nodes.extend(self.nodes_in_file(&file).into_iter().cloned());
        }
        GraphTables {
            nodes,
            edges: self.edge_records(),
            pending: self.pending_edges(),
            unparsable: self.unparsable_files().clone(),
            revision: self.revision(),
        }
    }

    /// Rebuild a state from persisted tables. Node revisions are kept as
    /// recorded; an edge referencing a missing node means the snapshot is
    /// corrupt and surfaces as a dangling-reference error so the caller
    /// can force a rebuild.
    pub fn from_tables(tables: GraphTables) -> Result<Self> {
        let mut state = Self::new();
        for node in tables.nodes {
            state.restore_node(node);
        }
        for edge in &tables.edges {
            state.restore_edge(edge)?;
        }
        for (source, target, kind) in tables.pending {
            state.restore_pending(source, target, kind);
        }
        state.restore_unparsable(tables.unparsable);
        state.force_revision(tables.revision);
        Ok(state)
    }

    /// Atomic snapshot write: serialize, write to a sibling temp file,
    /// rename into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string(&self.to_tables())?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let tables: GraphTables = serde_json::from_str(&json)?;
        Self::from_tables(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use advisor_protocol::Fingerprint;
    use tempfile::TempDir;

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

    #[test]
    fn snapshot_round_trip_preserves_graph_and_revision() {
        let mut state = GraphState::new();
        state
            .apply_delta(
                "a.py",
                vec![file_node("a.py")],
                vec![EdgeRecord {
                    source: NodeId::file("a.py"),
                    target: NodeId::file("b.py"),
                    kind: EdgeKind::DependsOn,
                }],
            )
            .unwrap();
        state
            .apply_delta("b.py", vec![file_node("b.py")], Vec::new())
            .unwrap();
        state.mark_unparsable("c.py", vec![Span::default()]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        state.save(&path).unwrap();

        let restored = GraphState::load(&path).unwrap();
        assert_eq!(restored.revision(), state.revision());
        assert_eq!(restored.edge_records(), state.edge_records());
        assert_eq!(
            restored.unparsable_files().keys().collect::<Vec<_>>(),
            state.unparsable_files().keys().collect::<Vec<_>>()
        );
        restored.verify_integrity().unwrap();
    }
}
