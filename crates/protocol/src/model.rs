use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically increasing graph revision. Survives restarts via the
/// persisted snapshot.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl Revision {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Source span of a structural node (1-based lines, byte offsets into the
/// file content).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start_line: usize,
    pub end_line: usize,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl Span {
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.end_byte.saturating_sub(self.start_byte)
    }
}

/// Structural fingerprint: hex-encoded SHA-256 over the canonical
/// normalized form of a code block. Insensitive to local identifier
/// names, comments, and whitespace; sensitive to external call names and
/// control-flow shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn from_digest(digest: &[u8]) -> Self {
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of structural node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum NodeKind {
    File,
    Type,
    Interface,
    Method,
}

/// Stable node identifier: file path plus qualified name plus kind.
/// Files use the bare path as their qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub file: String,
    pub qualified_name: String,
    pub kind: NodeKind,
}

impl NodeId {
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            qualified_name: path.clone(),
            file: path,
            kind: NodeKind::File,
        }
    }

    #[must_use]
    pub fn named(file: impl Into<String>, qualified_name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            file: file.into(),
            qualified_name: qualified_name.into(),
            kind,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == NodeKind::File {
            f.write_str(&self.file)
        } else {
            write!(f, "{}::{}", self.file, self.qualified_name)
        }
    }
}

/// A node in the structural graph. Never mutated in place: delta updates
/// replace a file's whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralNode {
    pub id: NodeId,
    pub span: Span,
    pub fingerprint: Fingerprint,
    /// Cyclomatic complexity for methods, 0 otherwise.
    #[serde(default)]
    pub complexity: u32,
    /// Number of contained methods for types, 0 otherwise.
    #[serde(default)]
    pub method_count: u32,
    pub revision: Revision,
}

/// Directed relation between two structural nodes. Uniqueness is on
/// (source, target, kind); multiple kinds may connect the same pair.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum EdgeKind {
    DependsOn,
    Implements,
    Calls,
    Contains,
}

/// Flat edge record emitted by extraction and applied by the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// Raw import as written in the source, kept alongside resolved
/// `DependsOn` edges so the scoring engine can categorize concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub module: String,
    pub names: Vec<String>,
}
