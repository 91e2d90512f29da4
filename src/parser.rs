use tree_sitter::{Node, Parser, Tree};

use crate::mutants::OperatorKind;

fn parse(source: &str) -> Option<Tree> {
    let mut parser = Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser.set_language(&language.into()).expect("Failed to set Python grammar");
    parser.parse(source, None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    /// 1-based.
    pub line: usize,
    pub column: usize,
    pub missing: bool,
}

/// Error and missing nodes reported by the Python grammar. An unparsable
/// source yields a single issue at 1:1.
pub fn syntax_errors(source: &str) -> Vec<SyntaxIssue> {
    let Some(tree) = parse(source) else {
        return vec![SyntaxIssue { line: 1, column: 1, missing: false }];
    };
    let root = tree.root_node();
    let mut issues = Vec::new();
    if root.has_error() {
        collect_errors(root, &mut issues);
    }
    issues
}

fn collect_errors(node: Node, issues: &mut Vec<SyntaxIssue>) {
    if node.is_error() || node.is_missing() {
        issues.push(SyntaxIssue {
            line: node.start_position().row + 1,
            column: node.start_position().column + 1,
            missing: node.is_missing(),
        });
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if child.has_error() || child.is_missing() {
                collect_errors(child, issues);
            }
        }
    }
}

pub fn is_valid(source: &str) -> bool {
    syntax_errors(source).is_empty()
}

/// Names of `test_*` methods defined directly in class bodies, in source
/// order. Functions nested inside methods do not count.
pub fn list_test_methods(source: &str) -> Vec<String> {
    class_methods(source).into_iter().map(|(_, method)| method).collect()
}

/// `test_*` methods defined directly in the first class named `class_name`.
pub fn class_test_methods(source: &str, class_name: &str) -> Vec<String> {
    let methods = class_methods(source);
    let Some(owner) = methods.iter().find(|(class, _)| class.name == class_name).map(|(class, _)| class.start)
    else {
        return Vec::new();
    };
    methods
        .into_iter()
        .filter(|(class, _)| class.start == owner)
        .map(|(_, method)| method)
        .collect()
}

struct ClassRef {
    name: String,
    start: usize,
}

fn class_methods(source: &str) -> Vec<(ClassRef, String)> {
    let Some(tree) = parse(source) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    collect_test_methods(tree.root_node(), source, &mut found);
    found
}

fn collect_test_methods(node: Node, source: &str, found: &mut Vec<(ClassRef, String)>) {
    if node.kind() == "class_definition" {
        let class_name = node.child_by_field_name("name").map(|n| node_text(n, source)).unwrap_or("");
        if let Some(body) = node.child_by_field_name("body") {
            for i in 0..body.named_child_count() {
                let Some(name) = body.named_child(i).and_then(|member| method_name(member, source)) else {
                    continue;
                };
                if name.starts_with("test_") {
                    let class = ClassRef { name: class_name.to_string(), start: node.start_byte() };
                    found.push((class, name.to_string()));
                }
            }
        }
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_test_methods(child, source, found);
        }
    }
}

/// Name of a function defined by `node`, looking through decorators.
fn method_name<'a>(node: Node<'a>, source: &'a str) -> Option<&'a str> {
    let def = match node.kind() {
        "function_definition" => node,
        "decorated_definition" => node.child_by_field_name("definition")?,
        _ => return None,
    };
    if def.kind() != "function_definition" {
        return None;
    }
    Some(node_text(def.child_by_field_name("name")?, source))
}

/// A source line worth mutating, with the operator that targets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    /// 1-based.
    pub line: usize,
    pub kind: OperatorKind,
}

/// Operators and literals inside function bodies, in source order, one entry
/// per (line, operator). Docstrings and print/logging calls are skipped.
pub fn mutation_candidates(source: &str) -> Vec<Candidate> {
    let Some(tree) = parse(source) else {
        return Vec::new();
    };
    let mut candidates = Vec::new();
    collect_functions(tree.root_node(), source, &mut candidates);
    candidates
}

fn collect_functions(node: Node, source: &str, out: &mut Vec<Candidate>) {
    if node.kind() == "function_definition" {
        if let Some(body) = node.child_by_field_name("body") {
            walk_node(body, source, out);
        }
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            collect_functions(child, source, out);
        }
    }
}

fn walk_node(node: Node, source: &str, out: &mut Vec<Candidate>) {
    if should_skip_node(node, source) {
        return;
    }

    let kind = match node.kind() {
        "comparison_operator" if has_child_kind(node, &[">", "<", "=="]) => {
            Some(OperatorKind::ComparisonReplace)
        }
        "binary_operator" if has_child_kind(node, &["+", "-", "*", "/"]) => {
            Some(OperatorKind::ArithmeticReplace)
        }
        "true" | "false" | "integer" => Some(OperatorKind::ConstantReplace),
        _ => None,
    };
    if let Some(kind) = kind {
        let candidate = Candidate { line: node.start_position().row + 1, kind };
        if !out.contains(&candidate) {
            out.push(candidate);
        }
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk_node(child, source, out);
        }
    }
}

fn has_child_kind(node: Node, kinds: &[&str]) -> bool {
    (0..node.child_count())
        .filter_map(|i| node.child(i))
        .any(|child| kinds.contains(&child.kind()))
}

fn should_skip_node(node: Node, source: &str) -> bool {
    if node.kind() == "call" {
        if let Some(func) = node.child(0) {
            let text = node_text(func, source);
            if text == "print" || text.starts_with("logging.") || text.starts_with("logger.") {
                return true;
            }
        }
    }
    // Docstrings
    if node.kind() == "expression_statement" && node.child_count() == 1 {
        if let Some(child) = node.child(0) {
            if child.kind() == "string" {
                return true;
            }
        }
    }
    node.kind() == "string"
}

fn node_text<'a>(node: Node<'a>, source: &'a str) -> &'a str {
    &source[node.start_byte()..node.end_byte()]
}
