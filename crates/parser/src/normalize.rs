use crate::language::Language;
use advisor_protocol::Fingerprint;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Structural fingerprint of one code block.
///
/// Locally bound identifiers (parameters, local bindings, loop binders)
/// become positional placeholders; names of external calls, imports,
/// fields, and types are preserved verbatim, as are literals and
/// control-flow shape. Comments and whitespace never reach the canonical
/// form. Normalization is deliberately conservative: a name we cannot
/// classify as local stays as written, because under-stripping only
/// costs cache hits while over-stripping can collide distinct blocks.
#[must_use]
pub fn fingerprint_block(node: Node, content: &str, language: Language) -> Fingerprint {
    let mut bindings = HashSet::new();
    collect_bindings(node, content, language, &mut bindings);

    // Names that are themselves definitions (functions, types) stay
    // external even if a local elsewhere shadows them.
    let mut defined = HashSet::new();
    collect_definition_names(node, content, &mut defined);
    for name in defined {
        bindings.remove(&name);
    }

    let mut canonical = String::with_capacity(node.end_byte() - node.start_byte());
    let mut assigned: HashMap<String, usize> = HashMap::new();
    serialize(
        node,
        content,
        language,
        &bindings,
        &mut assigned,
        &mut canonical,
    );

    digest(canonical.as_bytes())
}

/// Fallback fingerprint for content the parse adapter could not turn
/// into a tree: hash the raw bytes so the contract stays total.
#[must_use]
pub fn fingerprint_source(content: &str) -> Fingerprint {
    digest(content.as_bytes())
}

fn digest(bytes: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    Fingerprint::from_digest(digest.as_slice())
}

/// Gather names with a binding occurrence inside the block. Anything not
/// collected here is treated as external during serialization.
fn collect_bindings(node: Node, content: &str, language: Language, out: &mut HashSet<String>) {
    let kind = node.kind();
    match language {
        Language::Rust => match kind {
            "parameter" | "let_declaration" | "let_condition" | "for_expression" => {
                if let Some(pattern) = node.child_by_field_name("pattern") {
                    collect_identifiers(pattern, content, out);
                }
            }
            "closure_parameters" => collect_identifiers(node, content, out),
            _ => {}
        },
        Language::Python => match kind {
            "parameters" | "lambda_parameters" => collect_identifiers(node, content, out),
            "assignment" | "augmented_assignment" | "for_statement" => {
                if let Some(left) = node.child_by_field_name("left") {
                    collect_identifiers(left, content, out);
                }
            }
            _ => {}
        },
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_bindings(child, content, language, out);
    }
}

fn collect_definition_names(node: Node, content: &str, out: &mut HashSet<String>) {
    if matches!(
        node.kind(),
        "function_item"
            | "function_definition"
            | "struct_item"
            | "enum_item"
            | "trait_item"
            | "class_definition"
    ) {
        if let Some(name) = node.child_by_field_name("name") {
            out.insert(content[name.start_byte()..name.end_byte()].to_string());
        }
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_definition_names(child, content, out);
    }
}

fn collect_identifiers(node: Node, content: &str, out: &mut HashSet<String>) {
    if node.kind() == "identifier" {
        out.insert(content[node.start_byte()..node.end_byte()].to_string());
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_identifiers(child, content, out);
    }
}

fn is_literal(kind: &str, language: Language) -> bool {
    match language {
        Language::Rust => matches!(
            kind,
            "string_literal"
                | "raw_string_literal"
                | "char_literal"
                | "integer_literal"
                | "float_literal"
                | "boolean_literal"
        ),
        Language::Python => matches!(
            kind,
            "string" | "concatenated_string" | "integer" | "float" | "true" | "false" | "none"
        ),
    }
}

fn serialize(
    node: Node,
    content: &str,
    language: Language,
    bindings: &HashSet<String>,
    assigned: &mut HashMap<String, usize>,
    out: &mut String,
) {
    let kind = node.kind();

    if kind.contains("comment") {
        return;
    }

    // Placeholder numbering is per function scope: renames inside one
    // method must not shift the numbering of any other.
    if matches!(kind, "function_item" | "function_definition") {
        out.push('(');
        out.push_str(kind);
        let mut scoped: HashMap<String, usize> = HashMap::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            serialize(child, content, language, bindings, &mut scoped, out);
        }
        out.push(')');
        return;
    }

    // Standalone string expressions are docstrings in Python.
    if language == Language::Python
        && kind == "expression_statement"
        && node.named_child_count() == 1
        && node
            .named_child(0)
            .is_some_and(|child| child.kind() == "string")
    {
        return;
    }

    if is_literal(kind, language) {
        out.push(' ');
        out.push_str(&content[node.start_byte()..node.end_byte()]);
        return;
    }

    if node.child_count() == 0 {
        let text = &content[node.start_byte()..node.end_byte()];
        out.push(' ');
        if kind == "identifier" && bindings.contains(text) {
            let next = assigned.len();
            let slot = *assigned.entry(text.to_string()).or_insert(next);
            out.push('$');
            out.push_str(&slot.to_string());
        } else {
            out.push_str(text);
        }
        return;
    }

    out.push('(');
    out.push_str(kind);
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        serialize(child, content, language, bindings, assigned, out);
    }
    out.push(')');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{ParseAdapter, ParseOutcome, TreeSitterAdapter};

    fn fingerprint_of(source: &str, language: Language) -> Fingerprint {
        let mut adapter = TreeSitterAdapter::new();
        match adapter.parse(source, language).unwrap() {
            ParseOutcome::Tree(tree) => {
                fingerprint_block(tree.tree.root_node(), source, language)
            }
            ParseOutcome::Unparsable { .. } => panic!("test source must parse"),
        }
    }

    #[test]
    fn rust_local_rename_keeps_fingerprint() {
        let original = r"
fn total(items: &[u32]) -> u32 {
    let mut sum = 0;
    for item in items {
        sum += process(item);
    }
    sum
}
";
        let renamed = r"
fn total(entries: &[u32]) -> u32 {
    let mut acc = 0;
    for entry in entries {
        acc += process(entry);
    }
    acc
}
";
        assert_eq!(
            fingerprint_of(original, Language::Rust),
            fingerprint_of(renamed, Language::Rust)
        );
    }

    #[test]
    fn rust_external_call_rename_changes_fingerprint() {
        let original = "fn run(x: u32) -> u32 { process(x) }";
        let changed = "fn run(x: u32) -> u32 { transform(x) }";
        assert_ne!(
            fingerprint_of(original, Language::Rust),
            fingerprint_of(changed, Language::Rust)
        );
    }

    #[test]
    fn comments_and_whitespace_are_cosmetic() {
        let original = "fn run(x: u32) -> u32 { process(x) }";
        let commented = r"
fn run(x: u32) -> u32 {
    // resolved externally
    process(x)
}
";
        assert_eq!(
            fingerprint_of(original, Language::Rust),
            fingerprint_of(commented, Language::Rust)
        );
    }

    #[test]
    fn python_local_rename_keeps_fingerprint() {
        let original = r"
def total(items):
    result = 0
    for item in items:
        result += process(item)
    return result
";
        let renamed = r"
def total(rows):
    acc = 0
    for row in rows:
        acc += process(row)
    return acc
";
        assert_eq!(
            fingerprint_of(original, Language::Python),
            fingerprint_of(renamed, Language::Python)
        );
    }

    #[test]
    fn python_docstring_is_cosmetic() {
        let original = "def run(x):\n    return process(x)\n";
        let documented = "def run(x):\n    \"\"\"Run it.\"\"\"\n    return process(x)\n";
        assert_eq!(
            fingerprint_of(original, Language::Python),
            fingerprint_of(documented, Language::Python)
        );
    }

    #[test]
    fn raw_fallback_is_stable_and_content_sensitive() {
        let broken = "def broken(:\n";
        assert_eq!(fingerprint_source(broken), fingerprint_source(broken));
        assert_ne!(
            fingerprint_source(broken),
            fingerprint_source("def broken(:\n    pass\n")
        );
    }

    #[test]
    fn control_flow_shape_is_structural() {
        let looped = "def run(xs):\n    for x in xs:\n        process(x)\n";
        let guarded = "def run(xs):\n    if xs:\n        process(xs)\n";
        assert_ne!(
            fingerprint_of(looped, Language::Python),
            fingerprint_of(guarded, Language::Python)
        );
    }
}
