//! File inclusion directives
//!
//! Supports the `<prefix>include("path")` syntax for splicing fragment files
//! into markup and scripts, and `<prefix>include("path", { ...json... })` to
//! pass variables that the fragment references as `<prefix>name`.
//! Paths are resolved relative to the including file's directory.
//!
//! Markup uses the `@@` prefix; scripts use `//@@` so the directive stays a
//! valid line comment.

use regex::Regex;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for include resolution failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum IncludeError {
    /// Circular include detected
    #[error("Circular include detected: {}", .0.display())]
    CircularInclude(PathBuf),
    /// File not found
    #[error("Include file not found '{}' (referenced from {}:{line})", .path.display(), .from.display())]
    FileNotFound { path: PathBuf, from: PathBuf, line: usize },
    /// Directive could not be parsed
    #[error("Malformed include directive in {}:{line}: {message}", .file.display())]
    Malformed { file: PathBuf, line: usize, message: String },
    /// IO error reading file
    #[error("Error reading include file '{}': {1}", .0.display())]
    IoError(PathBuf, String),
}

/// Variables visible to an included fragment.
pub type IncludeContext = Map<String, Value>;

/// A parsed include directive.
#[derive(Debug, Clone, PartialEq)]
struct Directive {
    /// Byte range of the whole directive in the source text
    start: usize,
    end: usize,
    /// Path as written
    path: String,
    /// Variables passed to the fragment
    context: IncludeContext,
}

/// Resolves include directives for one marker prefix.
#[derive(Debug, Clone)]
pub struct IncludeResolver {
    prefix: String,
    variable: Regex,
}

impl IncludeResolver {
    /// Create a resolver for the given marker prefix (e.g. `@@`).
    pub fn new(prefix: &str) -> Self {
        let variable = Regex::new(&format!(r"{}([A-Za-z_][A-Za-z0-9_.\-]*)", regex::escape(prefix)))
            .unwrap_or_else(|_| unreachable!("escaped prefix always forms a valid regex"));
        Self { prefix: prefix.to_string(), variable }
    }

    /// The marker prefix this resolver handles.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Read `path` and resolve every directive in it, recursively.
    pub fn process_file(&self, path: &Path) -> Result<String, IncludeError> {
        let content =
            fs::read_to_string(path).map_err(|e| IncludeError::IoError(path.to_path_buf(), e.to_string()))?;
        self.process(&content, path)
    }

    /// Resolve every directive in `content`, which was read from `file`.
    pub fn process(&self, content: &str, file: &Path) -> Result<String, IncludeError> {
        let mut stack = vec![canonical(file)];
        self.expand(content, file, &IncludeContext::new(), &mut stack)
    }

    fn expand(
        &self,
        content: &str,
        file: &Path,
        context: &IncludeContext,
        stack: &mut Vec<PathBuf>,
    ) -> Result<String, IncludeError> {
        let content = self.substitute(content, context);
        let directives = self.parse_directives(&content, file)?;
        if directives.is_empty() {
            return Ok(content);
        }

        let base = file.parent().unwrap_or_else(|| Path::new("."));
        let mut out = String::with_capacity(content.len());
        let mut cursor = 0;

        for directive in directives {
            out.push_str(&content[cursor..directive.start]);
            cursor = directive.end;

            let target = base.join(&directive.path);
            if !target.is_file() {
                return Err(IncludeError::FileNotFound {
                    path: target,
                    from: file.to_path_buf(),
                    line: line_of(&content, directive.start),
                });
            }

            let key = canonical(&target);
            if stack.contains(&key) {
                return Err(IncludeError::CircularInclude(target));
            }

            let fragment = fs::read_to_string(&target)
                .map_err(|e| IncludeError::IoError(target.clone(), e.to_string()))?;

            let mut merged = context.clone();
            merged.extend(directive.context);

            stack.push(key);
            let expanded = self.expand(&fragment, &target, &merged, stack)?;
            stack.pop();

            out.push_str(&expanded);
        }

        out.push_str(&content[cursor..]);
        Ok(out)
    }

    /// Replace `<prefix>name` tokens with values from `context`.
    ///
    /// Unknown names are left untouched.
    fn substitute(&self, content: &str, context: &IncludeContext) -> String {
        if context.is_empty() {
            return content.to_string();
        }

        self.variable
            .replace_all(content, |caps: &regex::Captures<'_>| {
                let whole = &caps[0];
                let name = &caps[1];
                if name == "include" || name.starts_with("include.") {
                    return whole.to_string();
                }
                // A sentence ending in a variable leaves a trailing dot on the name.
                let trimmed = name.trim_end_matches('.');
                match lookup(context, trimmed) {
                    Some(value) => {
                        format!("{}{}", render_value(value), &name[trimmed.len()..])
                    }
                    None => whole.to_string(),
                }
            })
            .into_owned()
    }

    fn parse_directives(&self, content: &str, file: &Path) -> Result<Vec<Directive>, IncludeError> {
        let marker = format!("{}include", self.prefix);
        let mut directives = Vec::new();
        let mut search = 0;

        while let Some(offset) = content[search..].find(&marker) {
            let start = search + offset;
            let after = start + marker.len();
            // `@@include_once` and friends are not include directives.
            let rest = &content[after..];
            let args_start = after + (rest.len() - rest.trim_start().len());
            if !content[args_start..].starts_with('(') {
                search = after;
                continue;
            }

            let malformed = |message: &str| IncludeError::Malformed {
                file: file.to_path_buf(),
                line: line_of(content, start),
                message: message.to_string(),
            };

            let (path, context, end) =
                parse_arguments(content, args_start + 1).map_err(|m| malformed(&m))?;
            directives.push(Directive { start, end, path, context });
            search = end;
        }

        Ok(directives)
    }
}

/// Parse `"path"[, {json}])` starting just after the opening parenthesis.
///
/// Returns the path, the context object and the byte offset after `)`.
fn parse_arguments(content: &str, mut i: usize) -> Result<(String, IncludeContext, usize), String> {
    let bytes = content.as_bytes();
    i = skip_ws(bytes, i);

    let quote = *bytes.get(i).ok_or("unexpected end of input")?;
    if quote != b'"' && quote != b'\'' {
        return Err("expected a quoted path".to_string());
    }
    let path_start = i + 1;
    let path_end = content[path_start..]
        .find(quote as char)
        .map(|n| path_start + n)
        .ok_or("unterminated path string")?;
    let path = content[path_start..path_end].trim().to_string();
    if path.is_empty() {
        return Err("empty include path".to_string());
    }
    i = skip_ws(bytes, path_end + 1);

    let mut context = IncludeContext::new();
    if bytes.get(i) == Some(&b',') {
        i = skip_ws(bytes, i + 1);
        if bytes.get(i) != Some(&b'{') {
            return Err("expected a JSON object after ','".to_string());
        }
        let object_end = balanced_object_end(bytes, i).ok_or("unterminated JSON object")?;
        let value: Value = serde_json::from_str(&content[i..object_end])
            .map_err(|e| format!("invalid JSON context: {}", e))?;
        if let Value::Object(map) = value {
            context = map;
        }
        i = skip_ws(bytes, object_end);
    }

    if bytes.get(i) != Some(&b')') {
        return Err("expected ')'".to_string());
    }
    Ok((path, context, i + 1))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Offset just past the `}` matching the `{` at `start`, honouring strings.
fn balanced_object_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn lookup<'a>(context: &'a IncludeContext, dotted: &str) -> Option<&'a Value> {
    let mut parts = dotted.split('.');
    let mut value = context.get(parts.next()?)?;
    for part in parts {
        value = value.as_object()?.get(part)?;
    }
    Some(value)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn line_of(content: &str, offset: usize) -> usize {
    content[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
