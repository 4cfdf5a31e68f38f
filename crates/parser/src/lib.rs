//! # Advisor Parser
//!
//! Parse Adapter boundary and structural extraction.
//!
//! ## Architecture
//!
//! ```text
//! file content
//!     │
//!     ├──> ParseAdapter (tree-sitter)
//!     │      └─ SyntaxTree | Unparsable(error spans)
//!     │
//!     ├──> Extraction
//!     │      ├─ File/Type/Interface/Method nodes (with spans)
//!     │      ├─ Contains / Calls / DependsOn / Implements edges
//!     │      └─ raw import records for concern analysis
//!     │
//!     └──> Normalizer/Hasher
//!            └─ structural fingerprint per block
//! ```
//!
//! Workers in the ingestion coordinator call [`parse_file`] and ship the
//! resulting [`UnitOutcome`] to the single graph writer; nothing in this
//! crate touches the graph store.

mod adapter;
mod error;
mod extract;
mod language;
mod normalize;

pub use adapter::{ParseAdapter, ParseOutcome, SyntaxTree, TreeSitterAdapter};
pub use error::{ParserError, Result};
pub use extract::{extract_unit, ParsedUnit};
pub use language::Language;
pub use normalize::{fingerprint_block, fingerprint_source};

use advisor_protocol::Span;

/// Outcome of parsing one file: a flat structural record, or an explicit
/// unparsable marker so one bad file never aborts a scan.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Parsed(ParsedUnit),
    Unparsable {
        file: String,
        error_spans: Vec<Span>,
    },
}

/// Parse and extract a single file end to end.
pub fn parse_file(adapter: &mut dyn ParseAdapter, path: &str, content: &str) -> Result<UnitOutcome> {
    let Some(language) = Language::from_path(path) else {
        return Err(ParserError::UnsupportedLanguage(path.to_string()));
    };

    match adapter.parse(content, language)? {
        ParseOutcome::Tree(tree) => {
            let unit = extract_unit(path, content, &tree)?;
            Ok(UnitOutcome::Parsed(unit))
        }
        ParseOutcome::Unparsable { error_spans } => {
            log::warn!("{path}: unparsable ({} error spans)", error_spans.len());
            Ok(UnitOutcome::Unparsable {
                file: path.to_string(),
                error_spans,
            })
        }
    }
}
