use crate::adapter::{span_of, SyntaxTree};
use crate::error::Result;
use crate::language::Language;
use crate::normalize::fingerprint_block;
use advisor_protocol::{
    EdgeKind, EdgeRecord, ImportRecord, NodeId, NodeKind, Revision, StructuralNode,
};
use std::collections::{HashMap, HashSet};
use tree_sitter::Node;

/// Flat structural record for one file: everything the graph writer
/// needs to replace the file's subtree in a single transaction.
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub file: String,
    pub language: String,
    pub nodes: Vec<StructuralNode>,
    pub edges: Vec<EdgeRecord>,
    pub imports: Vec<ImportRecord>,
    pub lines: usize,
}

/// Walk a parsed tree into a [`ParsedUnit`].
pub fn extract_unit(path: &str, content: &str, tree: &SyntaxTree) -> Result<ParsedUnit> {
    let root = tree.tree.root_node();
    let language = tree.language;

    let mut cx = Collector {
        path,
        content,
        language,
        nodes: Vec::new(),
        edges: Vec::new(),
        imports: Vec::new(),
        method_bodies: Vec::new(),
        base_refs: Vec::new(),
        type_slots: HashMap::new(),
    };

    cx.push_node(NodeId::file(path), root, 0);

    match language {
        Language::Rust => cx.walk_rust(root),
        Language::Python => cx.walk_python(root),
    }

    cx.link_calls();
    cx.link_bases();

    Ok(ParsedUnit {
        file: path.to_string(),
        language: language.as_str().to_string(),
        nodes: cx.nodes,
        edges: cx.edges,
        imports: cx.imports,
        lines: content.lines().count(),
    })
}

struct Collector<'a> {
    path: &'a str,
    content: &'a str,
    language: Language,
    nodes: Vec<StructuralNode>,
    edges: Vec<EdgeRecord>,
    imports: Vec<ImportRecord>,
    /// Method id plus its body node, linked to in-file callees afterwards.
    method_bodies: Vec<(NodeId, Node<'a>)>,
    /// (subtype id, base name) pairs resolved once all types are known.
    base_refs: Vec<(NodeId, String)>,
    /// Type name -> index into `nodes`, for method counting.
    type_slots: HashMap<String, usize>,
}

impl<'a> Collector<'a> {
    fn text(&self, node: Node) -> &'a str {
        &self.content[node.start_byte()..node.end_byte()]
    }

    fn name_of(&self, node: Node) -> Option<&'a str> {
        node.child_by_field_name("name").map(|n| self.text(n))
    }

    fn push_node(&mut self, id: NodeId, node: Node, complexity: u32) {
        self.nodes.push(StructuralNode {
            id,
            span: span_of(node),
            fingerprint: fingerprint_block(node, self.content, self.language),
            complexity,
            method_count: 0,
            revision: Revision::default(),
        });
    }

    fn push_edge(&mut self, source: NodeId, target: NodeId, kind: EdgeKind) {
        self.edges.push(EdgeRecord {
            source,
            target,
            kind,
        });
    }

    fn file_id(&self) -> NodeId {
        NodeId::file(self.path)
    }

    fn complexity_of(&self, body: Node) -> u32 {
        let decisions = self.language.decision_kinds();
        let mut count = 1u32;
        count_decisions(body, decisions, &mut count);
        count
    }

    // --- Rust ---

    fn walk_rust(&mut self, scope: Node<'a>) {
        let mut cursor = scope.walk();
        let children: Vec<Node<'a>> = scope.children(&mut cursor).collect();

        for child in children {
            match child.kind() {
                "use_declaration" => self.rust_import(child),
                "function_item" => {
                    if let Some(name) = self.name_of(child) {
                        self.add_method(name.to_string(), child, self.file_id());
                    }
                }
                "struct_item" | "enum_item" => {
                    if let Some(name) = self.name_of(child) {
                        self.add_type(name.to_string(), child, NodeKind::Type);
                    }
                }
                "trait_item" => {
                    if let Some(name) = self.name_of(child) {
                        let trait_name = name.to_string();
                        let trait_id = self.add_type(trait_name.clone(), child, NodeKind::Interface);
                        if let Some(body) = child.child_by_field_name("body") {
                            self.rust_members(body, &trait_name, trait_id);
                        }
                    }
                }
                "impl_item" => self.rust_impl(child),
                "mod_item" => {
                    if let Some(body) = child.child_by_field_name("body") {
                        self.walk_rust(body);
                    }
                }
                _ => {}
            }
        }
    }

    fn rust_impl(&mut self, node: Node<'a>) {
        let Some(type_node) = node.child_by_field_name("type") else {
            return;
        };
        let type_name = base_type_name(self.text(type_node)).to_string();

        let container = self
            .type_slots
            .get(&type_name)
            .map_or_else(|| self.file_id(), |&slot| self.nodes[slot].id.clone());

        if let Some(trait_node) = node.child_by_field_name("trait") {
            let trait_name = base_type_name(self.text(trait_node)).to_string();
            if container.kind == NodeKind::Type {
                self.base_refs.push((container.clone(), trait_name));
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            self.rust_members(body, &type_name, container);
        }
    }

    fn rust_members(&mut self, body: Node<'a>, owner_name: &str, container: NodeId) {
        let mut cursor = body.walk();
        let members: Vec<Node<'a>> = body.children(&mut cursor).collect();
        for member in members {
            if member.kind() != "function_item" {
                continue;
            }
            let Some(name) = self.name_of(member) else {
                continue;
            };
            let qualified = format!("{owner_name}::{name}");
            self.add_method(qualified, member, container.clone());
            if let Some(&slot) = self.type_slots.get(owner_name) {
                self.nodes[slot].method_count += 1;
            }
        }
    }

    fn rust_import(&mut self, node: Node<'a>) {
        let Some(argument) = node.child_by_field_name("argument") else {
            return;
        };
        let module = self.text(argument).to_string();
        let names = module
            .rsplit("::")
            .next()
            .map(|tail| vec![tail.trim_matches(|c| c == '{' || c == '}' || c == ' ').to_string()])
            .unwrap_or_default();
        if let Some(target) = resolve_rust_import(&module) {
            self.push_edge(self.file_id(), NodeId::file(target), EdgeKind::DependsOn);
        }
        self.imports.push(ImportRecord { module, names });
    }

    // --- Python ---

    fn walk_python(&mut self, root: Node<'a>) {
        let mut cursor = root.walk();
        let children: Vec<Node<'a>> = root.children(&mut cursor).collect();
        for child in children {
            self.python_item(child, None);
        }
    }

    fn python_item(&mut self, node: Node<'a>, parent_class: Option<&NodeId>) {
        match node.kind() {
            "decorated_definition" => {
                if let Some(inner) = node.child_by_field_name("definition") {
                    self.python_item(inner, parent_class);
                }
            }
            "class_definition" => self.python_class(node),
            "function_definition" => {
                if let Some(name) = self.name_of(node) {
                    let (qualified, container) = match parent_class {
                        Some(class_id) => (
                            format!("{}.{name}", class_id.qualified_name),
                            class_id.clone(),
                        ),
                        None => (name.to_string(), self.file_id()),
                    };
                    self.add_method(qualified, node, container);
                }
            }
            "import_statement" | "import_from_statement" => self.python_import(node),
            _ => {}
        }
    }

    fn python_class(&mut self, node: Node<'a>) {
        let Some(name) = self.name_of(node) else {
            return;
        };
        let class_name = name.to_string();

        let kind = if self.python_is_abstract(node) {
            NodeKind::Interface
        } else {
            NodeKind::Type
        };
        let class_id = self.add_type(class_name.clone(), node, kind);

        if let Some(bases) = node.child_by_field_name("superclasses") {
            let mut cursor = bases.walk();
            for base in bases.children(&mut cursor) {
                if base.kind() == "identifier" {
                    self.base_refs
                        .push((class_id.clone(), self.text(base).to_string()));
                }
            }
        }

        if let Some(body) = node.child_by_field_name("body") {
            let mut cursor = body.walk();
            let members: Vec<Node<'a>> = body.children(&mut cursor).collect();
            let mut method_count = 0u32;
            for member in members {
                let target = match member.kind() {
                    "decorated_definition" => member.child_by_field_name("definition"),
                    _ => Some(member),
                };
                if target.is_some_and(|m| m.kind() == "function_definition") {
                    method_count += 1;
                }
                self.python_item(member, Some(&class_id));
            }
            if let Some(&slot) = self.type_slots.get(&class_name) {
                self.nodes[slot].method_count = method_count;
            }
        }
    }

    fn python_is_abstract(&self, class_node: Node<'a>) -> bool {
        if let Some(bases) = class_node.child_by_field_name("superclasses") {
            let text = self.text(bases);
            if text.contains("ABC") {
                return true;
            }
        }
        if let Some(body) = class_node.child_by_field_name("body") {
            let mut cursor = body.walk();
            for member in body.children(&mut cursor) {
                if member.kind() == "decorated_definition"
                    && self.text(member).contains("abstractmethod")
                {
                    return true;
                }
            }
        }
        false
    }

    fn python_import(&mut self, node: Node<'a>) {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if child.kind() == "dotted_name" {
                        let module = self.text(child).to_string();
                        self.add_python_dependency(&module);
                        self.imports.push(ImportRecord {
                            names: vec![module.clone()],
                            module,
                        });
                    }
                }
            }
            "import_from_statement" => {
                let Some(module_node) = node.child_by_field_name("module_name") else {
                    return;
                };
                let module = self.text(module_node).to_string();
                let mut names = Vec::new();
                let mut cursor = node.walk();
                for child in node.children(&mut cursor) {
                    if matches!(child.kind(), "dotted_name" | "identifier") {
                        let name = self.text(child);
                        if name != module {
                            names.push(name.to_string());
                        }
                    }
                }
                self.add_python_dependency(&module);
                self.imports.push(ImportRecord { module, names });
            }
            _ => {}
        }
    }

    fn add_python_dependency(&mut self, module: &str) {
        // Single-segment imports are third-party or stdlib; only dotted
        // module paths can resolve to project files.
        if !module.contains('.') || module.starts_with('.') {
            return;
        }
        let candidate = format!("{}.py", module.replace('.', "/"));
        self.push_edge(self.file_id(), NodeId::file(candidate), EdgeKind::DependsOn);
    }

    // --- shared ---

    fn add_type(&mut self, name: String, node: Node<'a>, kind: NodeKind) -> NodeId {
        let id = NodeId::named(self.path, name.clone(), kind);
        self.type_slots.insert(name, self.nodes.len());
        self.push_node(id.clone(), node, 0);
        self.push_edge(self.file_id(), id.clone(), EdgeKind::Contains);
        id
    }

    fn add_method(&mut self, qualified: String, node: Node<'a>, container: NodeId) {
        let id = NodeId::named(self.path, qualified, NodeKind::Method);
        let complexity = node
            .child_by_field_name("body")
            .map_or(1, |body| self.complexity_of(body));
        self.push_node(id.clone(), node, complexity);
        self.push_edge(container, id.clone(), EdgeKind::Contains);
        if let Some(body) = node.child_by_field_name("body") {
            self.method_bodies.push((id, body));
        }
    }

    /// Second phase: link calls to same-file methods by simple name.
    fn link_calls(&mut self) {
        let mut by_name: HashMap<String, NodeId> = HashMap::new();
        for node in &self.nodes {
            if node.id.kind != NodeKind::Method {
                continue;
            }
            let simple = simple_name(&node.id.qualified_name);
            by_name.entry(simple.to_string()).or_insert_with(|| node.id.clone());
        }

        let mut seen: HashSet<(NodeId, NodeId)> = HashSet::new();
        let bodies = std::mem::take(&mut self.method_bodies);
        for (caller, body) in &bodies {
            let mut names = Vec::new();
            collect_call_names(*body, self.content, self.language, &mut names);
            for name in names {
                let Some(target) = by_name.get(&name) else {
                    continue;
                };
                if target == caller {
                    continue;
                }
                if seen.insert((caller.clone(), target.clone())) {
                    self.push_edge(caller.clone(), target.clone(), EdgeKind::Calls);
                }
            }
        }
        self.method_bodies = bodies;
    }

    /// Second phase: `impl Trait for Type` / class bases resolved against
    /// in-file types only; cross-file inheritance stays unlinked.
    fn link_bases(&mut self) {
        let refs = std::mem::take(&mut self.base_refs);
        for (subtype, base_name) in refs {
            if let Some(&slot) = self.type_slots.get(&base_name) {
                let base_id = self.nodes[slot].id.clone();
                self.push_edge(subtype, base_id, EdgeKind::Implements);
            }
        }
    }
}

fn count_decisions(node: Node, decisions: &[&str], count: &mut u32) {
    if decisions.contains(&node.kind()) {
        *count += 1;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        count_decisions(child, decisions, count);
    }
}

fn collect_call_names(node: Node, content: &str, language: Language, out: &mut Vec<String>) {
    let is_call = match language {
        Language::Rust => node.kind() == "call_expression",
        Language::Python => node.kind() == "call",
    };

    if is_call {
        if let Some(function) = node.child_by_field_name("function") {
            let name = match function.kind() {
                "identifier" => Some(&content[function.start_byte()..function.end_byte()]),
                "field_expression" => function
                    .child_by_field_name("field")
                    .map(|f| &content[f.start_byte()..f.end_byte()]),
                "attribute" => function
                    .child_by_field_name("attribute")
                    .map(|f| &content[f.start_byte()..f.end_byte()]),
                "scoped_identifier" => function
                    .child_by_field_name("name")
                    .map(|f| &content[f.start_byte()..f.end_byte()]),
                _ => None,
            };
            if let Some(name) = name {
                out.push(name.to_string());
            }
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_call_names(child, content, language, out);
    }
}

fn simple_name(qualified: &str) -> &str {
    qualified
        .rsplit("::")
        .next()
        .and_then(|tail| tail.rsplit('.').next())
        .unwrap_or(qualified)
}

fn base_type_name(text: &str) -> &str {
    text.split('<').next().unwrap_or(text).trim()
}

/// `crate::`-rooted paths resolve to `src/...` candidates; everything
/// else is external.
fn resolve_rust_import(module: &str) -> Option<String> {
    let rest = module.strip_prefix("crate::")?;
    let segments: Vec<&str> = rest
        .split("::")
        .take_while(|segment| {
            !segment.starts_with(char::is_uppercase)
                && !segment.starts_with('{')
                && *segment != "*"
        })
        .collect();
    if segments.is_empty() {
        return None;
    }
    Some(format!("src/{}.rs", segments.join("/")))
}
