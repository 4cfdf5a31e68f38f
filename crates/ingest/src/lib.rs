//! # Advisor Ingest
//!
//! Ingestion coordination: parallel parse workers feeding one graph
//! writer.
//!
//! ```text
//! file events / genesis file list
//!     │
//!     ├──> worker pool (read + parse + extract, bounded fan-out)
//!     │      └─ ParsedUnit | unparsable marker
//!     │
//!     └──> write queue (two lanes, interactive drained first)
//!            └─ single consumer owns GraphState
//!                 ├─ batched transactions, bounded batch size
//!                 ├─ per-path sequence numbers drop stale parses
//!                 └─ publishes Arc snapshots, persists in background
//! ```
//!
//! The graph has exactly one writer in the whole process: delta updates
//! and bulk-scan batches go through the same consumer, so write
//! contention queues instead of erroring.

mod coordinator;
mod error;
mod events;
mod scanner;
mod stats;

pub use coordinator::{IngestConfig, IngestionCoordinator, ScanReport};
pub use error::{IngestError, Result};
pub use events::{FileEvent, FileEventKind};
pub use scanner::FileScanner;
pub use stats::ScanStats;
