//! # Advisor Engine
//!
//! The facade over the structural graph and semantic cache: ingestion,
//! fact derivation, scoring, cache lookups, and the hand-off to the
//! external inference collaborator.
//!
//! ## On-save data flow
//!
//! ```text
//! file event
//!     │ delta update (priority lane)
//!     ▼
//! graph snapshot ── fingerprint focal unit
//!     │                  │
//!     │         ignored? cached? ──> stored verdict (no inference)
//!     │                  │ miss
//!     ▼                  ▼
//! facts + neighborhood + score ──> context bundle ──> inference
//!                                                        │
//!            background queue <── verdict + violation ───┘
//! ```
//!
//! Cross-component calls go through the component contracts; the engine
//! never reaches into another crate's internals. All configuration is
//! one immutable value loaded at startup.

mod config;
mod error;
mod facade;
mod inference;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use facade::{Advisor, Verdict};
pub use inference::{ContextBundle, InferenceClient, VerdictStream};
