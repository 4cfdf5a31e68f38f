//! # Advisor Graph
//!
//! The structural graph store and its read-side derivations.
//!
//! ## Architecture
//!
//! ```text
//! ParsedUnit[]
//!     │
//!     ├──> Graph Store (single writer)
//!     │      ├─ detach-delete + recreate per file, one transaction
//!     │      ├─ deferred cross-file edges (no zombie edges, any order)
//!     │      └─ monotonic revision, JSON persistence
//!     │
//!     ├──> Fact Engine (pure reads over a snapshot)
//!     │      ├─ dependency cycles, deterministic order
//!     │      ├─ layering violations against the configured policy
//!     │      └─ centrality / blast-radius percentiles
//!     │
//!     └──> Context Expander
//!            └─ bounded, pruned, reproducible neighborhoods
//! ```
//!
//! The store itself is plain data: exactly one writer task owns it and
//! publishes immutable snapshots; everything in `facts` and `expander`
//! is a pure function over such a snapshot.

mod error;
mod expander;
mod facts;
mod persist;
mod store;

pub use error::{GraphError, Result};
pub use expander::{expand, IncludedNode, Neighborhood, RenderMode};
pub use facts::{
    centrality, centrality_percentiles, complex_methods, dependency_cycles, god_types,
    layer_violations, FactReport, LayerViolation,
};
pub use persist::GraphTables;
pub use store::GraphState;
