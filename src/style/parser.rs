//! Parser for the stylesheet dialect.
//!
//! Works on comment-free text and produces a tree of [`Item`]s. Values and
//! selectors are kept as raw text; variables, interpolation and arithmetic
//! are resolved later by the evaluator.

use super::import::string_end;
use super::StyleError;

/// Conditional group rules that bubble out of nested rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    Media,
    Supports,
}

impl GroupKind {
    /// The at-keyword without `@`.
    pub fn keyword(self) -> &'static str {
        match self {
            GroupKind::Media => "media",
            GroupKind::Supports => "supports",
        }
    }
}

/// One statement or block of the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `@name: value;`
    Variable { name: String, value: String },
    /// `property: value;`
    Declaration { property: String, value: String },
    /// `selector { ... }`
    Rule { selector: String, items: Vec<Item> },
    /// `.name;` or `.name();`
    MixinCall { name: String, important: bool },
    /// `@media` / `@supports` block
    Group { kind: GroupKind, condition: String, items: Vec<Item> },
    /// Any other at-rule with a block, e.g. `@font-face`, `@keyframes spin`
    AtRule { prelude: String, items: Vec<Item> },
    /// At-rule without a block, e.g. `@charset "utf-8"`
    Statement(String),
}

/// Parse comment-free source into items.
pub fn parse(source: &str) -> Result<Vec<Item>, StyleError> {
    let mut parser = Parser { chars: source.chars().collect(), pos: 0 };
    parser.block(true)
}

/// Name of the mixin a selector defines, and whether it is a definition only
/// (written with `()` and never emitted).
pub fn mixin_name(selector: &str) -> Option<(&str, bool)> {
    let selector = selector.trim();
    let (name, definition_only) = match selector.strip_suffix(')') {
        Some(rest) => {
            let open = rest.rfind('(')?;
            if !rest[open + 1..].trim().is_empty() {
                return None;
            }
            (rest[..open].trim_end(), true)
        }
        None => (selector, false),
    };
    let mut chars = name.chars();
    let lead = chars.next()?;
    let valid = (lead == '.' || lead == '#')
        && name.len() > 1
        && chars.all(|c| c.is_alphanumeric() || c == '-' || c == '_');
    valid.then_some((name, definition_only))
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn block(&mut self, top: bool) -> Result<Vec<Item>, StyleError> {
        let mut items = Vec::new();
        loop {
            let (text, terminator) = self.chunk();
            match terminator {
                Some('{') => {
                    let prelude = text.trim().to_string();
                    if prelude.is_empty() {
                        return Err(syntax("block without a selector", &text));
                    }
                    let body = self.block(false)?;
                    items.push(block_item(prelude, body));
                }
                Some(';') => {
                    if !text.trim().is_empty() {
                        items.push(statement(text.trim())?);
                    }
                }
                Some('}') => {
                    if top {
                        return Err(syntax("unexpected '}'", &text));
                    }
                    if !text.trim().is_empty() {
                        items.push(statement(text.trim())?);
                    }
                    return Ok(items);
                }
                _ => {
                    if !top {
                        return Err(syntax("unclosed block", &text));
                    }
                    if !text.trim().is_empty() {
                        items.push(statement(text.trim())?);
                    }
                    return Ok(items);
                }
            }
        }
    }

    /// Read up to the next `;`, `{` or `}` outside strings and parentheses.
    fn chunk(&mut self) -> (String, Option<char>) {
        let mut text = String::new();
        let mut depth = 0usize;
        while let Some(&c) = self.chars.get(self.pos) {
            match c {
                '"' | '\'' => {
                    let end = string_end(&self.chars, self.pos);
                    text.extend(&self.chars[self.pos..end]);
                    self.pos = end;
                    continue;
                }
                '@' if self.chars.get(self.pos + 1) == Some(&'{') => {
                    while let Some(&c) = self.chars.get(self.pos) {
                        text.push(c);
                        self.pos += 1;
                        if c == '}' {
                            break;
                        }
                    }
                    continue;
                }
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ';' | '{' | '}' if depth == 0 => {
                    self.pos += 1;
                    return (text, Some(c));
                }
                _ => {}
            }
            text.push(c);
            self.pos += 1;
        }
        (text, None)
    }
}

fn block_item(prelude: String, items: Vec<Item>) -> Item {
    if let Some(rest) = at_keyword(&prelude, "media") {
        Item::Group { kind: GroupKind::Media, condition: rest.to_string(), items }
    } else if let Some(rest) = at_keyword(&prelude, "supports") {
        Item::Group { kind: GroupKind::Supports, condition: rest.to_string(), items }
    } else if prelude.starts_with('@') {
        Item::AtRule { prelude, items }
    } else {
        Item::Rule { selector: prelude, items }
    }
}

fn at_keyword<'a>(prelude: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = prelude.strip_prefix('@')?.strip_prefix(keyword)?;
    (rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || c == '('))
        .then(|| rest.trim())
}

fn statement(text: &str) -> Result<Item, StyleError> {
    if let Some(rest) = text.strip_prefix('@') {
        if !rest.starts_with('{') {
            let name_len =
                rest.find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_')).unwrap_or(rest.len());
            let after = rest[name_len..].trim_start();
            if name_len > 0 {
                if let Some(value) = after.strip_prefix(':') {
                    return Ok(Item::Variable {
                        name: rest[..name_len].to_string(),
                        value: value.trim().to_string(),
                    });
                }
            }
            return Ok(Item::Statement(text.to_string()));
        }
    }

    let (call, important) = match text.strip_suffix("!important") {
        Some(rest) => (rest.trim_end(), true),
        None => (text, false),
    };
    if let Some((name, _)) = mixin_name(call) {
        return Ok(Item::MixinCall { name: name.to_string(), important });
    }

    match split_declaration(text) {
        Some((property, value)) if !property.is_empty() => Ok(Item::Declaration {
            property: property.to_string(),
            value: value.to_string(),
        }),
        _ => Err(syntax("expected a declaration", text)),
    }
}

/// Split `property: value` at the first colon outside `@{...}`.
fn split_declaration(text: &str) -> Option<(&str, &str)> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'@' if bytes.get(i + 1) == Some(&b'{') => {
                i += text[i..].find('}')? + 1;
                continue;
            }
            b':' => return Some((text[..i].trim(), text[i + 1..].trim())),
            _ => {}
        }
        i += 1;
    }
    None
}

fn syntax(message: &str, context: &str) -> StyleError {
    let context: String = context.split_whitespace().collect::<Vec<_>>().join(" ");
    let context = match context.char_indices().nth(60) {
        Some((cut, _)) => format!("{}...", &context[..cut]),
        None => context,
    };
    StyleError::Syntax { message: message.to_string(), context }
}
