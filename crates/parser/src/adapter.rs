use crate::error::{ParserError, Result};
use crate::language::Language;
use advisor_protocol::Span;
use std::collections::HashMap;
use tree_sitter::{Node, Parser, Tree};

/// A successfully parsed file. Content is kept by the caller; the tree
/// only borrows byte offsets into it.
pub struct SyntaxTree {
    pub tree: Tree,
    pub language: Language,
}

/// Result of a parse attempt. Unparsable content is an explicit outcome,
/// not an error: the caller keeps the file's prior graph subtree and
/// surfaces a needs-syntax-fix fact instead.
pub enum ParseOutcome {
    Tree(SyntaxTree),
    Unparsable { error_spans: Vec<Span> },
}

/// Parse Adapter contract. The engine consumes this boundary; anything
/// that can turn file content into a syntax tree (or admit it cannot)
/// can stand behind it.
pub trait ParseAdapter: Send {
    fn parse(&mut self, content: &str, hint: Language) -> Result<ParseOutcome>;
}

/// Tree-sitter backed adapter covering the bundled grammars.
pub struct TreeSitterAdapter {
    parsers: HashMap<Language, Parser>,
}

impl TreeSitterAdapter {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    fn parser_for(&mut self, language: Language) -> Result<&mut Parser> {
        if !self.parsers.contains_key(&language) {
            let ts_language = language.tree_sitter_language()?;
            let mut parser = Parser::new();
            parser
                .set_language(&ts_language)
                .map_err(|e| ParserError::TreeSitter(format!("Failed to set language: {e}")))?;
            self.parsers.insert(language, parser);
        }
        Ok(self
            .parsers
            .get_mut(&language)
            .ok_or_else(|| ParserError::TreeSitter("parser registry corrupted".to_string()))?)
    }
}

impl Default for TreeSitterAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ParseAdapter for TreeSitterAdapter {
    fn parse(&mut self, content: &str, hint: Language) -> Result<ParseOutcome> {
        let parser = self.parser_for(hint)?;
        let tree = parser
            .parse(content, None)
            .ok_or_else(|| ParserError::TreeSitter("parse returned no tree".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let mut error_spans = Vec::new();
            collect_error_spans(root, &mut error_spans);
            return Ok(ParseOutcome::Unparsable { error_spans });
        }

        Ok(ParseOutcome::Tree(SyntaxTree {
            tree,
            language: hint,
        }))
    }
}

fn collect_error_spans(node: Node, spans: &mut Vec<Span>) {
    if node.is_error() || node.is_missing() {
        spans.push(span_of(node));
        return;
    }
    if !node.has_error() {
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_spans(child, spans);
    }
}

pub(crate) fn span_of(node: Node) -> Span {
    Span {
        start_line: node.start_position().row + 1,
        end_line: node.end_position().row + 1,
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_rust() {
        let mut adapter = TreeSitterAdapter::new();
        let outcome = adapter.parse("fn main() {}", Language::Rust).unwrap();
        assert!(matches!(outcome, ParseOutcome::Tree(_)));
    }

    #[test]
    fn broken_source_is_unparsable_not_an_error() {
        let mut adapter = TreeSitterAdapter::new();
        let outcome = adapter
            .parse("fn broken( {{{{", Language::Rust)
            .unwrap();
        match outcome {
            ParseOutcome::Unparsable { error_spans } => assert!(!error_spans.is_empty()),
            ParseOutcome::Tree(_) => panic!("expected unparsable marker"),
        }
    }
}
