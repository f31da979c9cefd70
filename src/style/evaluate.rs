//! Evaluates parsed stylesheet items into plain CSS nodes.
//!
//! Variables are lexically scoped and lazy: every variable of a block is
//! visible throughout the block, the last definition wins, and a value is
//! only resolved when something references it. Nested rules are flattened
//! with `&` substitution, `@media`/`@supports` blocks bubble out of rules,
//! and mixin calls splice the called rule's body in place.

use std::collections::HashMap;

use super::css::{CssNode, Declaration};
use super::import::string_end;
use super::math;
use super::parser::{mixin_name, GroupKind, Item};
use super::StyleError;

/// Evaluate a parsed stylesheet.
pub fn evaluate(items: &[Item]) -> Result<Vec<CssNode>, StyleError> {
    let mut mixins = HashMap::new();
    collect_mixins(items, &mut mixins);
    let mut evaluator = Evaluator { mixins, scopes: Vec::new(), resolving: Vec::new(), calls: Vec::new() };
    let mut out = Vec::new();
    evaluator.block(items, &Context::default(), &mut out)?;
    Ok(out)
}

fn collect_mixins<'a>(items: &'a [Item], out: &mut HashMap<String, Vec<&'a [Item]>>) {
    for item in items {
        if let Item::Rule { selector, items: body } = item {
            if let Some((name, _)) = mixin_name(selector) {
                out.entry(name.to_string()).or_default().push(body.as_slice());
            }
            collect_mixins(body, out);
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Context {
    /// Resolved selectors of the enclosing rule; empty at the top level
    selectors: Vec<String>,
    /// Condition of the enclosing `@media` block
    media: Option<String>,
}

struct Evaluator<'a> {
    mixins: HashMap<String, Vec<&'a [Item]>>,
    scopes: Vec<HashMap<&'a str, &'a str>>,
    /// Variables currently being resolved
    resolving: Vec<String>,
    /// Mixins currently being expanded
    calls: Vec<String>,
}

impl<'a> Evaluator<'a> {
    fn block(&mut self, items: &'a [Item], ctx: &Context, out: &mut Vec<CssNode>) -> Result<(), StyleError> {
        let mut declarations = Vec::new();
        let mut nested = Vec::new();
        self.items(items, ctx, &mut declarations, &mut nested, false)?;

        if let Some(first) = declarations.first() {
            if ctx.selectors.is_empty() {
                return Err(StyleError::Syntax {
                    message: "declaration outside of a rule".to_string(),
                    context: format!("{}: {}", first.property, first.value),
                });
            }
            out.push(CssNode::Rule { selectors: ctx.selectors.clone(), declarations });
        }
        out.extend(nested);
        Ok(())
    }

    fn items(
        &mut self,
        items: &'a [Item],
        ctx: &Context,
        declarations: &mut Vec<Declaration>,
        nested: &mut Vec<CssNode>,
        important: bool,
    ) -> Result<(), StyleError> {
        let scope = items
            .iter()
            .filter_map(|item| match item {
                Item::Variable { name, value } => Some((name.as_str(), value.as_str())),
                _ => None,
            })
            .collect();
        self.scopes.push(scope);
        let result = items.iter().try_for_each(|item| self.item(item, ctx, declarations, nested, important));
        self.scopes.pop();
        result
    }

    fn item(
        &mut self,
        item: &'a Item,
        ctx: &Context,
        declarations: &mut Vec<Declaration>,
        nested: &mut Vec<CssNode>,
        important: bool,
    ) -> Result<(), StyleError> {
        match item {
            Item::Variable { .. } => {}
            Item::Declaration { property, value } => {
                let property = self.interpolate(property)?;
                let mut value = self.value(value)?;
                if important && !value.ends_with("!important") {
                    value.push_str(" !important");
                }
                declarations.push(Declaration { property, value });
            }
            Item::Rule { selector, items } => {
                if mixin_name(selector).is_some_and(|(_, definition_only)| definition_only) {
                    return Ok(());
                }
                let selector = self.interpolate(selector)?;
                let child = Context {
                    selectors: join_selectors(&ctx.selectors, &split_list(&selector)),
                    media: ctx.media.clone(),
                };
                self.block(items, &child, nested)?;
            }
            Item::MixinCall { name, important: call_important } => {
                let Some(bodies) = self.mixins.get(name).cloned() else {
                    return Err(StyleError::UndefinedMixin(name.clone()));
                };
                if self.calls.contains(name) {
                    return Err(StyleError::RecursiveMixin(name.clone()));
                }
                self.calls.push(name.clone());
                let important = important || *call_important;
                let result =
                    bodies.into_iter().try_for_each(|body| self.items(body, ctx, declarations, nested, important));
                self.calls.pop();
                result?;
            }
            Item::Group { kind, condition, items } => {
                let condition = self.value(condition)?;
                let condition = match (kind, &ctx.media) {
                    (GroupKind::Media, Some(outer)) => format!("{} and {}", outer, condition),
                    _ => condition,
                };
                let media = match kind {
                    GroupKind::Media => Some(condition.clone()),
                    GroupKind::Supports => ctx.media.clone(),
                };
                let child = Context { selectors: ctx.selectors.clone(), media };
                let mut inner = Vec::new();
                self.block(items, &child, &mut inner)?;

                // Nested media blocks already carry the joined condition.
                let (bubbled, own): (Vec<_>, Vec<_>) = match kind {
                    GroupKind::Media => inner
                        .into_iter()
                        .partition(|n| matches!(n, CssNode::Group { kind: GroupKind::Media, .. })),
                    GroupKind::Supports => (Vec::new(), inner),
                };
                if !own.is_empty() {
                    nested.push(CssNode::Group { kind: *kind, condition, nodes: own });
                }
                nested.extend(bubbled);
            }
            Item::AtRule { prelude, items } => {
                let prelude = self.interpolate(prelude)?;
                let mut at_declarations = Vec::new();
                let mut nodes = Vec::new();
                self.items(items, &Context::default(), &mut at_declarations, &mut nodes, false)?;
                nested.push(CssNode::AtRule { prelude, declarations: at_declarations, nodes });
            }
            Item::Statement(text) => nested.push(CssNode::Statement(self.interpolate(text)?)),
        }
        Ok(())
    }

    /// Resolve a variable in the scope that defines it.
    fn variable(&mut self, name: &str) -> Result<String, StyleError> {
        if self.resolving.iter().any(|n| n == name) {
            return Err(StyleError::RecursiveVariable(name.to_string()));
        }
        let Some(depth) = self.scopes.iter().rposition(|scope| scope.contains_key(name)) else {
            return Err(StyleError::UndefinedVariable(name.to_string()));
        };
        let raw = self.scopes[depth][name];

        self.resolving.push(name.to_string());
        let hidden = self.scopes.split_off(depth + 1);
        let result = self.value(raw);
        self.scopes.extend(hidden);
        self.resolving.pop();
        result
    }

    /// Replace `@{name}` with the unquoted variable value.
    fn interpolate(&mut self, text: &str) -> Result<String, StyleError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("@{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(StyleError::Syntax {
                    message: "unterminated interpolation".to_string(),
                    context: text.to_string(),
                });
            };
            let value = self.variable(after[..end].trim())?;
            out.push_str(unquote(&value));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Fully resolve a value: interpolation, variables, escapes, arithmetic.
    fn value(&mut self, raw: &str) -> Result<String, StyleError> {
        let text = self.interpolate(raw)?;
        let text = self.substitute(&text)?;
        let text = unescape(&text);
        let text = math::evaluate_parens(&text);
        Ok(collapse_whitespace(&text))
    }

    /// Replace `@name` references outside strings.
    fn substitute(&mut self, text: &str) -> Result<String, StyleError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '"' || c == '\'' {
                let end = string_end(&chars, i);
                out.extend(&chars[i..end]);
                i = end;
            } else if c == '@' && chars.get(i + 1).is_some_and(|n| n.is_alphabetic() || *n == '_') {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '-' || chars[end] == '_') {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(&self.variable(&name)?);
                i = end;
            } else {
                out.push(c);
                i += 1;
            }
        }
        Ok(out)
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') && bytes[bytes.len() - 1] == bytes[0] {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Turn `~"text"` escapes into their raw contents.
fn unescape(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '~' && matches!(chars.get(i + 1), Some('"') | Some('\'')) {
            let end = string_end(&chars, i + 1);
            let inner_end = end.saturating_sub(1).max(i + 2);
            out.extend(&chars[i + 2..inner_end]);
            i = end;
        } else if c == '"' || c == '\'' {
            let end = string_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '"' || c == '\'' {
            let end = string_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
        } else if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            out.push(' ');
        } else {
            out.push(c);
            i += 1;
        }
    }
    out.trim().to_string()
}

/// Split a selector list at top-level commas.
fn split_list(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in selector.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
        .iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Combine parent and child selector lists.
fn join_selectors(parents: &[String], children: &[String]) -> Vec<String> {
    if parents.is_empty() {
        return children.iter().map(|c| c.replace('&', "").trim().to_string()).collect();
    }
    let mut out = Vec::with_capacity(parents.len() * children.len());
    for parent in parents {
        for child in children {
            if child.contains('&') {
                out.push(child.replace('&', parent));
            } else {
                out.push(format!("{} {}", parent, child));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::css::print;
    use crate::style::import::strip_comments;
    use crate::style::parser::parse;

    fn compile(source: &str) -> Result<String, StyleError> {
        let items = parse(&strip_comments(source))?;
        Ok(print(&[], &evaluate(&items)?))
    }

    #[test]
    fn test_variables_are_lazy_and_scoped() {
        let css = compile("@c: red;\n.a { @c: blue; color: @c; width: @w; }\n.b { color: @c; }\n@w: 10px;").unwrap();
        assert_eq!(css, ".a {\n  color: blue;\n  width: 10px;\n}\n.b {\n  color: red;\n}\n");
    }

    #[test]
    fn test_variable_resolves_in_defining_scope() {
        let css = compile("@a: 1px; @b: @a;\n.x { @a: 2px; width: @b; height: @a; }").unwrap();
        assert_eq!(css, ".x {\n  width: 1px;\n  height: 2px;\n}\n");
    }

    #[test]
    fn test_nesting_cross_product() {
        let css = compile(".a, .b { &:hover, .c { x: y; } > li { z: w; } }").unwrap();
        assert_eq!(css, ".a:hover, .a .c, .b:hover, .b .c {\n  x: y;\n}\n.a > li, .b > li {\n  z: w;\n}\n");
    }

    #[test]
    fn test_parent_declarations_come_first() {
        let css = compile(".a { .b { x: 1; } color: red; }").unwrap();
        assert_eq!(css, ".a {\n  color: red;\n}\n.a .b {\n  x: 1;\n}\n");
    }

    #[test]
    fn test_media_bubbling() {
        let css =
            compile(".a { color: red; @media (min-width: 768px) { color: blue; @media print { x: y; } } }").unwrap();
        assert_eq!(
            css,
            ".a {\n  color: red;\n}\n@media (min-width: 768px) {\n  .a {\n    color: blue;\n  }\n}\n@media (min-width: 768px) and print {\n  .a {\n    x: y;\n  }\n}\n"
        );
    }

    #[test]
    fn test_mixins() {
        let css = compile(
            ".rounded() { border-radius: 4px; }\n.clearfix { zoom: 1; }\n.btn { .rounded; .clearfix(); &:hover { .rounded() !important; } }",
        )
        .unwrap();
        assert!(!css.contains(".rounded"));
        assert!(css.contains(".clearfix {\n  zoom: 1;\n}"));
        assert!(css.contains(".btn {\n  border-radius: 4px;\n  zoom: 1;\n}"));
        assert!(css.contains(".btn:hover {\n  border-radius: 4px !important;\n}"));
    }

    #[test]
    fn test_math_and_interpolation() {
        let css = compile(
            "@g: 20px; @name: banner; @prop: color;\n.@{name} { margin: (@g * 2) (@g / 2); border-@{prop}: red; content: \"@{name}\"; }",
        )
        .unwrap();
        assert_eq!(css, ".banner {\n  margin: 40px 10px;\n  border-color: red;\n  content: \"banner\";\n}\n");
    }

    #[test]
    fn test_escaped_media_variable() {
        let css = compile("@tablet: ~\"(max-width: 768px)\";\n@media @tablet { .a { b: c; } }").unwrap();
        assert_eq!(css, "@media (max-width: 768px) {\n  .a {\n    b: c;\n  }\n}\n");
    }

    #[test]
    fn test_at_rules_are_kept() {
        let css = compile("@font-face { font-family: X; }\n@keyframes spin { from { opacity: 0; } to { opacity: 1; } }")
            .unwrap();
        assert_eq!(
            css,
            "@font-face {\n  font-family: X;\n}\n@keyframes spin {\n  from {\n    opacity: 0;\n  }\n  to {\n    opacity: 1;\n  }\n}\n"
        );
    }

    #[test]
    fn test_errors() {
        assert_eq!(compile(".a { color: @nope; }").unwrap_err(), StyleError::UndefinedVariable("nope".into()));
        assert_eq!(compile("@a: @b; @b: @a; .x { y: @a; }").unwrap_err(), StyleError::RecursiveVariable("a".into()));
        assert_eq!(compile(".a { .missing; }").unwrap_err(), StyleError::UndefinedMixin(".missing".into()));
        assert!(matches!(compile("color: red;").unwrap_err(), StyleError::Syntax { .. }));
    }
}
