//! SVG sprite builder.
//!
//! Each icon is minified and wrapped in a `<symbol>` whose id is the icon's
//! file stem, so `home.svg` becomes addressable as `#home`:
//!
//! ```text
//! <svg xmlns="http://www.w3.org/2000/svg"><symbol id="home" viewBox="0 0 24 24">...</symbol></svg>
//! ```
//!
//! `<defs>` declared inside icons are moved into one shared `<defs>` at the
//! top of the document, where every symbol can reference them.

use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for sprite assembly failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SpriteError {
    /// Two icons map to the same symbol id
    #[error("Duplicate sprite id '{id}' from {} and {}", .first.display(), .second.display())]
    DuplicateId { id: String, first: PathBuf, second: PathBuf },
    /// Icon has no `<svg>` root element
    #[error("No <svg> root element in '{}'", .0.display())]
    MissingRoot(PathBuf),
    /// Icon is not UTF-8 text
    #[error("Icon '{}' is not valid UTF-8", .0.display())]
    Encoding(PathBuf),
    /// Icon has no usable file stem
    #[error("Cannot derive a symbol id from '{}'", .0.display())]
    InvalidName(PathBuf),
}

impl SpriteError {
    /// Id collisions are configuration errors; everything else is content.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SpriteError::DuplicateId { .. })
    }
}

struct Patterns {
    removals: Vec<Regex>,
    between_tags: Regex,
    root: Regex,
    view_box: Regex,
    aspect: Regex,
    defs: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |p: &str| Regex::new(p).unwrap_or_else(|e| unreachable!("sprite pattern is valid: {e}"));
        Patterns {
            removals: [
                r"(?s)<\?xml.*?\?>",
                r"(?is)<!DOCTYPE[^>\[]*(\[.*?\])?\s*>",
                r"(?s)<!--.*?-->",
                r"(?s)<metadata\b[^>]*/>",
                r"(?s)<metadata\b.*?</metadata>",
                r"(?s)<(?:sodipodi|inkscape):[\w-]+\b[^>]*/>",
                r"(?s)<(?:sodipodi|inkscape):[\w-]+\b[^>]*>.*?</(?:sodipodi|inkscape):[\w-]+>",
                r#"\s+xmlns:(?:sodipodi|inkscape)\s*=\s*"[^"]*""#,
                r#"\s+(?:sodipodi|inkscape):[\w-]+\s*=\s*"[^"]*""#,
            ]
            .iter()
            .map(|p| compile(p))
            .collect(),
            between_tags: compile(r">\s+<"),
            root: compile(r"(?s)<svg\b([^>]*?)(/?)>"),
            view_box: compile(r#"\bviewBox\s*=\s*(?:"([^"]*)"|'([^']*)')"#),
            aspect: compile(r#"\bpreserveAspectRatio\s*=\s*(?:"([^"]*)"|'([^']*)')"#),
            defs: compile(r"(?s)<defs\b[^>]*?(?:/>|>(.*?)</defs>)"),
        }
    })
}

/// Minify one icon's markup.
pub fn minify_svg(svg: &str) -> String {
    let p = patterns();
    let mut text = svg.to_string();
    for pattern in &p.removals {
        text = pattern.replace_all(&text, "").into_owned();
    }
    p.between_tags.replace_all(&text, "><").trim().to_string()
}

fn attribute(pattern: &Regex, attrs: &str) -> Option<String> {
    let caps = pattern.captures(attrs)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

/// Escape text for use inside a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// One icon converted for the sprite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// The `<symbol>` element
    pub element: String,
    /// Contents of the icon's `<defs>`, to be hoisted to the document
    pub defs: String,
}

/// Turn one icon into a `<symbol>` element, taking its `<defs>` out.
pub fn symbol(id: &str, svg: &str, source: &Path) -> Result<Symbol, SpriteError> {
    let p = patterns();
    let minified = minify_svg(svg);
    let caps = p.root.captures(&minified).ok_or_else(|| SpriteError::MissingRoot(source.to_path_buf()))?;
    let (Some(whole), Some(attrs)) = (caps.get(0), caps.get(1)) else {
        return Err(SpriteError::MissingRoot(source.to_path_buf()));
    };
    let self_closing = caps.get(2).is_some_and(|m| !m.as_str().is_empty());

    let inner = if self_closing {
        ""
    } else {
        let rest = &minified[whole.end()..];
        let close = rest.rfind("</svg>").ok_or_else(|| SpriteError::MissingRoot(source.to_path_buf()))?;
        &rest[..close]
    };

    let mut defs = String::new();
    for caps in p.defs.captures_iter(inner) {
        if let Some(body) = caps.get(1) {
            defs.push_str(body.as_str());
        }
    }
    let inner = p.defs.replace_all(inner, "");

    let mut element = format!("<symbol id=\"{}\"", escape_attr(id));
    if let Some(view_box) = attribute(&p.view_box, attrs.as_str()) {
        element.push_str(&format!(" viewBox=\"{}\"", view_box));
    }
    if let Some(aspect) = attribute(&p.aspect, attrs.as_str()) {
        element.push_str(&format!(" preserveAspectRatio=\"{}\"", aspect));
    }
    element.push('>');
    element.push_str(&inner);
    element.push_str("</symbol>");
    Ok(Symbol { element, defs })
}

/// Symbol id for an icon path: its file stem.
pub fn symbol_id(path: &Path) -> Result<String, SpriteError> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SpriteError::InvalidName(path.to_path_buf()))
}

/// Combine icons into one inline sprite document.
///
/// Icons are `(path, contents)` pairs; symbols are emitted sorted by id.
pub fn build_sprite(icons: &[(PathBuf, Vec<u8>)]) -> Result<String, SpriteError> {
    let mut by_id: BTreeMap<String, &Path> = BTreeMap::new();
    for (path, _) in icons {
        let id = symbol_id(path)?;
        if let Some(first) = by_id.insert(id.clone(), path) {
            return Err(SpriteError::DuplicateId { id, first: first.to_path_buf(), second: path.clone() });
        }
    }

    let mut symbols = BTreeMap::new();
    for (path, contents) in icons {
        let text = std::str::from_utf8(contents).map_err(|_| SpriteError::Encoding(path.clone()))?;
        let id = symbol_id(path)?;
        symbols.insert(id.clone(), symbol(&id, text, path)?);
    }

    let mut defs = String::new();
    let mut body = String::new();
    for symbol in symbols.into_values() {
        defs.push_str(&symbol.defs);
        body.push_str(&symbol.element);
    }

    let mut doc = String::from("<svg xmlns=\"http://www.w3.org/2000/svg\"");
    if body.contains("xlink:") || defs.contains("xlink:") {
        doc.push_str(" xmlns:xlink=\"http://www.w3.org/1999/xlink\"");
    }
    doc.push('>');
    if !defs.is_empty() {
        doc.push_str("<defs>");
        doc.push_str(&defs);
        doc.push_str("</defs>");
    }
    doc.push_str(&body);
    doc.push_str("</svg>");
    Ok(doc)
}
