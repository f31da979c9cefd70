//! Flat CSS tree produced by the evaluator, and its text form.

use super::parser::GroupKind;

/// A resolved `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
}

/// A node of plain CSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CssNode {
    /// Style rule with a resolved selector list
    Rule { selectors: Vec<String>, declarations: Vec<Declaration> },
    /// `@media` / `@supports` block
    Group { kind: GroupKind, condition: String, nodes: Vec<CssNode> },
    /// Any other block at-rule; `prelude` includes the at-keyword
    AtRule { prelude: String, declarations: Vec<Declaration>, nodes: Vec<CssNode> },
    /// At-rule without a block
    Statement(String),
}

/// Print nodes as CSS text, preceded by any plain `@import` statements.
pub fn print(imports: &[String], nodes: &[CssNode]) -> String {
    let mut out = String::new();
    // @charset has to come before imports.
    for node in nodes {
        if let CssNode::Statement(s) = node {
            if s.starts_with("@charset") {
                out.push_str(s);
                out.push_str(";\n");
            }
        }
    }
    for import in imports {
        out.push_str(import);
        out.push('\n');
    }
    for node in nodes {
        if matches!(node, CssNode::Statement(s) if s.starts_with("@charset")) {
            continue;
        }
        print_node(node, 0, &mut out);
    }
    out
}

fn print_node(node: &CssNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node {
        CssNode::Rule { selectors, declarations } => {
            out.push_str(&format!("{}{} {{\n", indent, selectors.join(", ")));
            print_declarations(declarations, depth + 1, out);
            out.push_str(&format!("{}}}\n", indent));
        }
        CssNode::Group { kind, condition, nodes } => {
            out.push_str(&format!("{}@{} {} {{\n", indent, kind.keyword(), condition));
            for child in nodes {
                print_node(child, depth + 1, out);
            }
            out.push_str(&format!("{}}}\n", indent));
        }
        CssNode::AtRule { prelude, declarations, nodes } => {
            out.push_str(&format!("{}{} {{\n", indent, prelude));
            print_declarations(declarations, depth + 1, out);
            for child in nodes {
                print_node(child, depth + 1, out);
            }
            out.push_str(&format!("{}}}\n", indent));
        }
        CssNode::Statement(text) => {
            out.push_str(&format!("{}{};\n", indent, text));
        }
    }
}

fn print_declarations(declarations: &[Declaration], depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    for decl in declarations {
        out.push_str(&format!("{}{}: {};\n", indent, decl.property, decl.value));
    }
}
