//! Deterministic HTML pretty printer.
//!
//! The markup is parsed into a loose tree (unknown nesting is tolerated, stray
//! closing tags are dropped) and printed with one block element per line.
//! Runs of text and inline elements stay together on a line with collapsed
//! whitespace. `pre` and `textarea` bodies are kept byte for byte; `script`
//! and `style` bodies are re-indented as a block.
//!
//! Formatting already formatted output returns it unchanged.

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "button", "cite", "code", "data", "dfn", "em", "i",
    "img", "input", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong", "sub",
    "sup", "time", "u", "var", "wbr",
];

const RAW_ELEMENTS: &[&str] = &["script", "style", "pre", "textarea"];

/// Elements closed implicitly when a sibling of the same name opens.
const SELF_NESTING_CLOSERS: &[&str] = &["li", "p", "option", "tr", "td", "th", "dt", "dd"];

/// Options for [`format_html`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Spaces per nesting level
    pub indent_size: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { indent_size: 4 }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Element(Element),
    Text(String),
    Comment(String),
    Doctype(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    /// Name as written
    name: String,
    /// Lowercase name for comparisons
    key: String,
    /// Normalised attribute text, without surrounding whitespace
    attrs: String,
    self_closing: bool,
    children: Vec<Node>,
    /// Body of raw-text elements
    raw: Option<String>,
}

impl Element {
    fn is_void(&self) -> bool {
        self.self_closing || VOID_ELEMENTS.contains(&self.key.as_str())
    }

    fn open_tag(&self) -> String {
        let mut tag = format!("<{}", self.name);
        if !self.attrs.is_empty() {
            tag.push(' ');
            tag.push_str(&self.attrs);
        }
        if self.self_closing {
            tag.push_str(" /");
        }
        tag.push('>');
        tag
    }

    fn close_tag(&self) -> String {
        format!("</{}>", self.name)
    }
}

enum Token {
    Open { name: String, attrs: String, self_closing: bool },
    Close(String),
    Text(String),
    Comment(String),
    Doctype(String),
}

/// Format an HTML document or fragment.
pub fn format_html(input: &str, options: &FormatOptions) -> String {
    let nodes = build_tree(tokenize(input));
    let mut printer = Printer { indent: " ".repeat(options.indent_size), out: String::new() };
    printer.block_children(&nodes, 0);
    printer.out
}

fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    let mut text_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let next = bytes.get(i + 1).copied().unwrap_or(0);
        let token_end;
        let token;

        if input[i..].starts_with("<!--") {
            let end = input[i + 4..].find("-->").map(|n| i + 4 + n + 3).unwrap_or(bytes.len());
            token = Token::Comment(input[i..end].to_string());
            token_end = end;
        } else if next == b'!' || next == b'?' {
            let end = input[i..].find('>').map(|n| i + n + 1).unwrap_or(bytes.len());
            token = Token::Doctype(collapse_whitespace(&input[i..end]));
            token_end = end;
        } else if next == b'/' && bytes.get(i + 2).is_some_and(u8::is_ascii_alphabetic) {
            let end = input[i..].find('>').map(|n| i + n + 1).unwrap_or(bytes.len());
            let name = input[i + 2..end].trim_end_matches('>').trim().to_string();
            token = Token::Close(name);
            token_end = end;
        } else if next.is_ascii_alphabetic() {
            let end = tag_end(bytes, i + 1);
            let inner = input[i + 1..end].trim_end_matches('>');
            let (inner, self_closing) = match inner.trim_end().strip_suffix('/') {
                Some(rest) => (rest, true),
                None => (inner, false),
            };
            let name_len = inner
                .find(|c: char| c.is_whitespace())
                .unwrap_or(inner.len());
            let name = inner[..name_len].to_string();
            let attrs = normalize_attrs(&inner[name_len..]);
            let key = name.to_ascii_lowercase();

            if text_start < i {
                tokens.push(Token::Text(input[text_start..i].to_string()));
            }
            tokens.push(Token::Open { name, attrs, self_closing });
            i = end;
            text_start = end;

            if !self_closing && RAW_ELEMENTS.contains(&key.as_str()) {
                let close = format!("</{}", key);
                let body_end = find_ci(&input[i..], &close).map(|n| i + n).unwrap_or(bytes.len());
                tokens.push(Token::Text(input[i..body_end].to_string()));
                i = body_end;
                text_start = body_end;
            }
            continue;
        } else {
            i += 1;
            continue;
        }

        if text_start < i {
            tokens.push(Token::Text(input[text_start..i].to_string()));
        }
        tokens.push(token);
        i = token_end;
        text_start = token_end;
    }

    if text_start < bytes.len() {
        tokens.push(Token::Text(input[text_start..].to_string()));
    }
    tokens
}

/// Offset just past the `>` closing a tag, skipping quoted attribute values.
fn tag_end(bytes: &[u8], mut i: usize) -> usize {
    let mut quote = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return i + 1,
            None => {}
        }
        i += 1;
    }
    bytes.len()
}

fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

/// Collapse whitespace between attributes, leaving quoted values untouched.
fn normalize_attrs(attrs: &str) -> String {
    let mut out = String::with_capacity(attrs.len());
    let mut quote = None;
    let mut pending_space = false;
    for c in attrs.trim().chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && !out.is_empty() && c != '=' && !out.ends_with('=') {
                    out.push(' ');
                }
                pending_space = false;
                if c == '"' || c == '\'' {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }
    out
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn build_tree(tokens: Vec<Token>) -> Vec<Node> {
    // Stack of open elements; index 0 is a synthetic root.
    let mut stack: Vec<Element> = vec![Element {
        name: String::new(),
        key: String::new(),
        attrs: String::new(),
        self_closing: false,
        children: Vec::new(),
        raw: None,
    }];

    fn close_top(stack: &mut Vec<Element>) {
        if stack.len() > 1 {
            if let Some(done) = stack.pop() {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::Element(done));
                }
            }
        }
    }

    let mut awaiting_raw = false;
    for token in tokens {
        match token {
            Token::Open { name, attrs, self_closing } => {
                let key = name.to_ascii_lowercase();
                if SELF_NESTING_CLOSERS.contains(&key.as_str())
                    && stack.last().is_some_and(|top| top.key == key)
                {
                    close_top(&mut stack);
                }
                let element =
                    Element { name, key, attrs, self_closing, children: Vec::new(), raw: None };
                if element.is_void() {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(Node::Element(element));
                    }
                } else {
                    awaiting_raw = RAW_ELEMENTS.contains(&element.key.as_str());
                    stack.push(element);
                }
            }
            Token::Text(text) if awaiting_raw => {
                awaiting_raw = false;
                if let Some(top) = stack.last_mut() {
                    top.raw = Some(text);
                }
            }
            Token::Close(name) => {
                awaiting_raw = false;
                let key = name.to_ascii_lowercase();
                if let Some(pos) = stack.iter().rposition(|e| e.key == key) {
                    if pos > 0 {
                        while stack.len() > pos {
                            close_top(&mut stack);
                        }
                    }
                }
            }
            other => {
                awaiting_raw = false;
                let node = match other {
                    Token::Text(t) => Node::Text(t),
                    Token::Comment(c) => Node::Comment(c),
                    Token::Doctype(d) => Node::Doctype(d),
                    Token::Open { .. } | Token::Close(_) => continue,
                };
                if let Some(top) = stack.last_mut() {
                    top.children.push(node);
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().map(|root| root.children).unwrap_or_default()
}

fn is_inline(node: &Node) -> bool {
    match node {
        Node::Text(_) => true,
        Node::Comment(_) | Node::Doctype(_) => false,
        Node::Element(e) => {
            INLINE_ELEMENTS.contains(&e.key.as_str())
                && e.raw.is_none()
                && e.children.iter().all(is_inline)
        }
    }
}

fn render_inline(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&collapse_whitespace(t)),
        Node::Element(e) => {
            out.push_str(&e.open_tag());
            if !e.is_void() {
                for child in &e.children {
                    render_inline(child, out);
                }
                out.push_str(&e.close_tag());
            }
        }
        Node::Comment(c) => out.push_str(c),
        Node::Doctype(d) => out.push_str(d),
    }
}

fn inline_run(nodes: &[&Node]) -> String {
    let mut text = String::new();
    for node in nodes {
        render_inline(node, &mut text);
    }
    collapse_whitespace(&text).trim().to_string()
}

struct Printer {
    indent: String,
    out: String,
}

impl Printer {
    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.out.push_str(&self.indent);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn block_children(&mut self, nodes: &[Node], depth: usize) {
        let mut run: Vec<&Node> = Vec::new();
        for node in nodes {
            if is_inline(node) {
                run.push(node);
                continue;
            }
            self.flush_run(&mut run, depth);
            match node {
                Node::Element(e) => self.element(e, depth),
                Node::Comment(c) => self.line(depth, c.trim()),
                Node::Doctype(d) => self.line(depth, d.trim()),
                Node::Text(_) => {}
            }
        }
        self.flush_run(&mut run, depth);
    }

    fn flush_run(&mut self, run: &mut Vec<&Node>, depth: usize) {
        if run.is_empty() {
            return;
        }
        let text = inline_run(run);
        if !text.is_empty() {
            self.line(depth, &text);
        }
        run.clear();
    }

    fn element(&mut self, e: &Element, depth: usize) {
        if e.is_void() {
            self.line(depth, &e.open_tag());
            return;
        }

        if let Some(raw) = &e.raw {
            self.raw_element(e, raw, depth);
            return;
        }

        if e.children.iter().all(is_inline) {
            let refs: Vec<&Node> = e.children.iter().collect();
            let body = inline_run(&refs);
            self.line(depth, &format!("{}{}{}", e.open_tag(), body, e.close_tag()));
            return;
        }

        self.line(depth, &e.open_tag());
        // Children of <html> stay at the document's level.
        let child_depth = if e.key == "html" { depth } else { depth + 1 };
        self.block_children(&e.children, child_depth);
        self.line(depth, &e.close_tag());
    }

    fn raw_element(&mut self, e: &Element, raw: &str, depth: usize) {
        if e.key == "pre" || e.key == "textarea" {
            self.line(depth, &format!("{}{}{}", e.open_tag(), raw, e.close_tag()));
            return;
        }

        if raw.trim().is_empty() {
            self.line(depth, &format!("{}{}", e.open_tag(), e.close_tag()));
            return;
        }

        self.line(depth, &e.open_tag());
        for line in reindent_block(raw) {
            if line.is_empty() {
                self.out.push('\n');
            } else {
                self.line(depth + 1, &line);
            }
        }
        self.line(depth, &e.close_tag());
    }
}

/// Strip the common leading indentation and surrounding blank lines.
fn reindent_block(raw: &str) -> Vec<String> {
    let lines: Vec<&str> = raw.lines().map(str::trim_end).collect();
    let first = lines.iter().position(|l| !l.is_empty()).unwrap_or(lines.len());
    let last = lines.iter().rposition(|l| !l.is_empty()).map(|n| n + 1).unwrap_or(first);
    let body = &lines[first..last];

    let common = body
        .iter()
        .filter(|l| !l.is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    body.iter()
        .map(|l| if l.is_empty() { String::new() } else { l[common..].to_string() })
        .collect()
}
