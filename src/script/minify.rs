//! Conservative, token-based JavaScript minifier.
//!
//! Comments are dropped (except `/*! ... */` banners) and whitespace is
//! collapsed. A line break survives whenever automatic semicolon insertion
//! could depend on it: it is only removed when the previous token cannot end
//! a statement or the next token cannot start one. String, template and
//! regular-expression literals are copied verbatim.

use super::ScriptError;

/// Keywords after which `/` starts a regular expression.
const REGEX_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

const PUNCTUATORS: &[&str] = &[
    ">>>=", "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "&&=", "||=", "??=", "=>", "==", "!=",
    "<=", ">=", "&&", "||", "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=",
    "**", "<<", ">>",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Number,
    Punct,
    Literal,
}

struct Token {
    kind: Kind,
    text: String,
}

impl Token {
    fn first(&self) -> char {
        self.text.chars().next().unwrap_or(' ')
    }

    fn last(&self) -> char {
        self.text.chars().last().unwrap_or(' ')
    }
}

/// Minify JavaScript source.
pub fn minify(source: &str) -> Result<String, ScriptError> {
    let chars: Vec<char> = source.chars().collect();
    let mut out = String::with_capacity(source.len());
    let mut prev: Option<Token> = None;
    let mut saw_space = false;
    let mut saw_newline = false;
    // Set after a banner comment, which always ends its own line.
    let mut fresh_line = false;
    let mut i = 0;

    if source.starts_with("#!") {
        while i < chars.len() && chars[i] != '\n' {
            out.push(chars[i]);
            i += 1;
        }
        out.push('\n');
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        if c.is_whitespace() {
            saw_space = true;
            saw_newline |= is_line_break(c);
            i += 1;
            continue;
        }

        if c == '/' && next == Some('/') {
            while i < chars.len() && !is_line_break(chars[i]) {
                i += 1;
            }
            continue;
        }

        if c == '/' && next == Some('*') {
            let start = i;
            let Some(end) = find_comment_end(&chars, i + 2) else {
                return Err(ScriptError::UnterminatedComment { line: line_of(&chars, start) });
            };
            i = end;
            if chars.get(start + 2) == Some(&'!') {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.extend(&chars[start..end]);
                out.push('\n');
                saw_space = false;
                saw_newline = false;
                fresh_line = true;
                continue;
            }
            saw_space = true;
            saw_newline |= chars[start..end].iter().copied().any(is_line_break);
            continue;
        }

        let start = i;
        let kind = if c == '"' || c == '\'' {
            i = scan_string(&chars, i)?;
            Kind::Literal
        } else if c == '`' {
            i = scan_template(&chars, i)?;
            Kind::Literal
        } else if c == '/' && regex_allowed(prev.as_ref()) {
            i = scan_regex(&chars, i)?;
            Kind::Literal
        } else if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            i = scan_number(&chars, i);
            Kind::Number
        } else if is_word_char(c) || c == '\\' {
            i = scan_word(&chars, i);
            Kind::Word
        } else {
            i += punctuator_len(&chars, i);
            Kind::Punct
        };

        let token = Token { kind, text: chars[start..i].iter().collect() };
        if let Some(p) = prev.as_ref().filter(|_| !fresh_line) {
            if saw_newline && newline_matters(p, &token) {
                out.push('\n');
            } else if saw_space && needs_space(p, &token) {
                out.push(' ');
            }
        }
        out.push_str(&token.text);
        prev = Some(token);
        saw_space = false;
        saw_newline = false;
        fresh_line = false;
    }

    Ok(out.trim_end().to_string())
}

fn is_line_break(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$' || (!c.is_ascii() && !c.is_whitespace())
}

/// Scan an identifier, including `\uXXXX` and `\u{...}` escapes.
fn scan_word(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() {
        if chars[i] == '\\' {
            i += 1;
            if chars.get(i) == Some(&'u') && chars.get(i + 1) == Some(&'{') {
                while i < chars.len() && chars[i] != '}' {
                    i += 1;
                }
                i = (i + 1).min(chars.len());
            }
        } else if is_word_char(chars[i]) {
            i += 1;
        } else {
            break;
        }
    }
    i
}

fn line_of(chars: &[char], pos: usize) -> usize {
    chars[..pos.min(chars.len())].iter().filter(|c| **c == '\n').count() + 1
}

/// Whether dropping a line break between `prev` and `next` could change
/// how the program parses.
fn newline_matters(prev: &Token, next: &Token) -> bool {
    let continues = prev.kind == Kind::Punct
        && prev.text != "++"
        && prev.text != "--"
        && "{([,;:?=+-*/%&|^!~<>.".contains(prev.last());
    let joins = matches!(next.kind, Kind::Punct)
        && ")]},;:?.=*/%&|^<>".contains(next.first())
        && next.text != "...";
    !(continues || joins)
}

/// Whether two tokens originally separated by whitespace must stay apart.
fn needs_space(prev: &Token, next: &Token) -> bool {
    let (a, b) = (prev.last(), next.first());
    ((is_word_char(a) || prev.kind == Kind::Word) && (is_word_char(b) || b == '\\'))
        || (a == '+' && b == '+')
        || (a == '-' && b == '-')
        || (a == '/' && b == '/')
        || (prev.kind == Kind::Number && b == '.')
}

fn regex_allowed(prev: Option<&Token>) -> bool {
    match prev {
        None => true,
        Some(t) => match t.kind {
            Kind::Punct => !matches!(t.text.as_str(), ")" | "]"),
            Kind::Word => REGEX_KEYWORDS.contains(&t.text.as_str()),
            Kind::Number | Kind::Literal => false,
        },
    }
}

fn punctuator_len(chars: &[char], i: usize) -> usize {
    PUNCTUATORS
        .iter()
        .find(|p| {
            let len = p.chars().count();
            chars.len() >= i + len && chars[i..i + len].iter().copied().eq(p.chars())
        })
        .map_or(1, |p| p.chars().count())
}

fn find_comment_end(chars: &[char], mut i: usize) -> Option<usize> {
    while i + 1 < chars.len() {
        if chars[i] == '*' && chars[i + 1] == '/' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

fn scan_string(chars: &[char], start: usize) -> Result<usize, ScriptError> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return Ok(i + 1),
            c if is_line_break(c) => break,
            _ => i += 1,
        }
    }
    Err(ScriptError::UnterminatedString { line: line_of(chars, start) })
}

fn scan_template(chars: &[char], start: usize) -> Result<usize, ScriptError> {
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Ok(i + 1),
            '$' if chars.get(i + 1) == Some(&'{') => i = scan_substitution(chars, i + 2, start)?,
            _ => i += 1,
        }
    }
    Err(ScriptError::UnterminatedTemplate { line: line_of(chars, start) })
}

/// Skip a `${ ... }` body, returning the index after its closing brace.
fn scan_substitution(chars: &[char], mut i: usize, template_start: usize) -> Result<usize, ScriptError> {
    let mut depth = 1usize;
    while i < chars.len() {
        match chars[i] {
            '"' | '\'' => i = scan_string(chars, i)?,
            '`' => i = scan_template(chars, i)?,
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => i += 1,
        }
    }
    Err(ScriptError::UnterminatedTemplate { line: line_of(chars, template_start) })
}

fn scan_regex(chars: &[char], start: usize) -> Result<usize, ScriptError> {
    let mut i = start + 1;
    let mut in_class = false;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '[' => {
                in_class = true;
                i += 1;
            }
            ']' => {
                in_class = false;
                i += 1;
            }
            '/' if !in_class => {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_alphabetic() {
                    i += 1;
                }
                return Ok(i);
            }
            c if is_line_break(c) => break,
            _ => i += 1,
        }
    }
    Err(ScriptError::UnterminatedRegex { line: line_of(chars, start) })
}

fn scan_number(chars: &[char], start: usize) -> usize {
    let hex = chars[start] == '0' && matches!(chars.get(start + 1), Some('x') | Some('X'));
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        let exponent_sign =
            !hex && (c == '+' || c == '-') && i > start && matches!(chars[i - 1], 'e' | 'E');
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || exponent_sign {
            i += 1;
        } else {
            break;
        }
    }
    i
}
