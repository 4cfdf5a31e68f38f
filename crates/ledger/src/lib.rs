//! # Advisor Ledger
//!
//! Content-addressed cache and ledger: verdicts keyed by structural
//! fingerprint plus rule-set version, ignore records keyed by block
//! fingerprint, and violation records with attached embeddings.
//!
//! Lookups are direct key reads (no scans) so they stay fast regardless
//! of ledger size. Writes are append-style: a verdict is never mutated
//! in place; a changed fingerprint simply produces a new key, and a
//! rule-set version change makes every old key miss without any
//! explicit deletion.

mod error;
mod ledger;
mod types;

pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use types::{CacheEntry, CacheKey, IgnoreRecord, ViolationRecord};
