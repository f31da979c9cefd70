//! `@import` resolution and comment stripping for stylesheet sources.

use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::StyleError;

/// An entry stylesheet with every preprocessor import spliced in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Source {
    /// Plain CSS `@import` statements, kept for the output
    pub css_imports: Vec<String>,
    /// Comment-free source text
    pub body: String,
}

fn import_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"@import\s*(?:\((?P<options>[^)]*)\))?\s*(?P<target>url\([^)]*\)|"[^"]*"|'[^']*')(?P<media>[^;]*);"#,
        )
        .unwrap_or_else(|e| unreachable!("import pattern is valid: {e}"))
    })
}

/// Load `entry` and resolve its imports recursively.
///
/// Each file is included once; importing a file that is still being
/// expanded is a cycle.
pub fn load(entry: &Path) -> Result<Source, StyleError> {
    let mut loader = Loader::default();
    let body = loader.file(entry, None)?;
    Ok(Source { css_imports: loader.css_imports, body })
}

/// Resolve imports in already-loaded text that came from `file`.
pub fn load_str(text: &str, file: &Path) -> Result<Source, StyleError> {
    let mut loader = Loader::default();
    loader.stack.push(canonical(file));
    let body = loader.expand(&strip_comments(text), file)?;
    Ok(Source { css_imports: loader.css_imports, body })
}

#[derive(Default)]
struct Loader {
    stack: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    css_imports: Vec<String>,
}

impl Loader {
    fn file(&mut self, path: &Path, from: Option<&Path>) -> Result<String, StyleError> {
        let text = fs::read_to_string(path).map_err(|e| match from {
            Some(from) if e.kind() == std::io::ErrorKind::NotFound => StyleError::MissingImport {
                path: path.to_path_buf(),
                from: from.to_path_buf(),
            },
            _ => StyleError::Io(path.to_path_buf(), e.to_string()),
        })?;

        let key = canonical(path);
        self.stack.push(key.clone());
        self.seen.insert(key);
        let result = self.expand(&strip_comments(&text), path);
        self.stack.pop();
        result
    }

    fn expand(&mut self, text: &str, file: &Path) -> Result<String, StyleError> {
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        let mut out = String::with_capacity(text.len());
        let mut last = 0;

        for caps in import_pattern().captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&text[last..whole.start()]);
            last = whole.end();

            let options = caps.name("options").map_or("", |m| m.as_str());
            let target = caps.name("target").map_or("", |m| m.as_str());
            let media = caps.name("media").map_or("", |m| m.as_str()).trim();

            match preprocessor_path(target, options, media) {
                Some(rel) => {
                    let resolved = dir.join(rel);
                    let key = canonical(&resolved);
                    if self.stack.contains(&key) {
                        return Err(StyleError::CircularImport(resolved));
                    }
                    if self.seen.contains(&key) {
                        continue;
                    }
                    out.push_str(&self.file(&resolved, Some(file))?);
                    out.push('\n');
                }
                None => {
                    let statement = if media.is_empty() {
                        format!("@import {};", target)
                    } else {
                        format!("@import {} {};", target, media)
                    };
                    if !self.css_imports.contains(&statement) {
                        self.css_imports.push(statement);
                    }
                }
            }
        }

        out.push_str(&text[last..]);
        Ok(out)
    }
}

/// The file to splice for an import, or `None` when it stays a CSS import.
fn preprocessor_path(target: &str, options: &str, media: &str) -> Option<PathBuf> {
    if target.starts_with("url(") || !media.is_empty() {
        return None;
    }
    if options.split(',').any(|o| o.trim() == "css") {
        return None;
    }
    let path = target.trim_matches(|c| c == '"' || c == '\'');
    if path.contains("://") || path.starts_with("//") {
        return None;
    }
    let path = PathBuf::from(path);
    match path.extension().and_then(|e| e.to_str()) {
        Some("css") => None,
        Some(_) => Some(path),
        None => Some(path.with_extension("less")),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Remove `//` and `/* */` comments, leaving strings and `url()` intact.
pub fn strip_comments(source: &str) -> String {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '"' || c == '\'' {
            let end = string_end(&chars, i);
            out.extend(&chars[i..end]);
            i = end;
        } else if c == '/' && next == Some('*') {
            let mut j = i + 2;
            while j + 1 < chars.len() && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            i = (j + 2).min(chars.len());
            out.push(' ');
        } else if c == '/' && next == Some('/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if starts_with_url(&chars, i) {
            let mut j = i + 4;
            while j < chars.len() && chars[j] != ')' {
                if chars[j] == '"' || chars[j] == '\'' {
                    j = string_end(&chars, j);
                } else {
                    j += 1;
                }
            }
            let end = (j + 1).min(chars.len());
            out.extend(&chars[i..end]);
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    out
}

fn starts_with_url(chars: &[char], i: usize) -> bool {
    chars.len() >= i + 4
        && chars[i..i + 4].iter().map(|c| c.to_ascii_lowercase()).eq("url(".chars())
        && (i == 0 || !(chars[i - 1].is_alphanumeric() || chars[i - 1] == '-'))
}

/// Index just past the string literal starting at `start`.
pub(crate) fn string_end(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}
