//! Arithmetic inside plain parentheses: `(@gutter * 2)` becomes `40px`.
//!
//! Function calls such as `calc(...)` or `url(...)` are left alone, and a
//! parenthesised group that is not a pure arithmetic expression (a media
//! feature like `(max-width: 600px)`) is kept as written.

use super::import::string_end;

#[derive(Debug, Clone, PartialEq)]
struct Dimension {
    value: f64,
    unit: String,
}

/// Evaluate every arithmetic parenthesised group in `value`.
pub fn evaluate_parens(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let (out, _) = walk(&chars, 0, false);
    out
}

/// Copy `chars` from `start`, evaluating groups. Returns the text and the
/// index just past the closing parenthesis when `nested`.
fn walk(chars: &[char], start: usize, nested: bool) -> (String, usize) {
    let mut out = String::new();
    let mut i = start;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let end = string_end(chars, i);
                out.extend(&chars[i..end]);
                i = end;
            }
            '(' => {
                let is_call = out.chars().last().is_some_and(|p| p.is_alphanumeric() || p == '-' || p == '_');
                let (inner, end) = walk(chars, i + 1, true);
                match (is_call, evaluate(&inner)) {
                    (false, Some(result)) => out.push_str(&result),
                    _ => {
                        out.push('(');
                        out.push_str(&inner);
                        out.push(')');
                    }
                }
                i = end;
            }
            ')' if nested => return (out, i + 1),
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    (out, i)
}

/// Evaluate a bare arithmetic expression; `None` if it is anything else.
pub fn evaluate(expr: &str) -> Option<String> {
    let tokens = tokenize(expr)?;
    if !tokens.iter().any(|t| matches!(t, Token::Op(_))) {
        return None;
    }
    let mut parser = ExprParser { tokens: &tokens, pos: 0 };
    let result = parser.sum()?;
    if parser.pos != tokens.len() {
        return None;
    }
    Some(format!("{}{}", format_number(result.value), result.unit))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Dimension),
    Op(char),
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let expects_operand = matches!(tokens.last(), None | Some(Token::Op(_)));
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' || (c == '-' && expects_operand) {
            let start = i;
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let number: String = chars[start..i].iter().collect();
            let unit_start = i;
            while i < chars.len() && (chars[i].is_ascii_alphabetic() || chars[i] == '%') {
                i += 1;
            }
            let unit: String = chars[unit_start..i].iter().collect();
            let value = number.parse::<f64>().ok()?;
            tokens.push(Token::Num(Dimension { value, unit }));
        } else if matches!(c, '+' | '-' | '*' | '/') {
            tokens.push(Token::Op(c));
            i += 1;
        } else {
            return None;
        }
    }
    Some(tokens)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl ExprParser<'_> {
    fn sum(&mut self) -> Option<Dimension> {
        let mut left = self.product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.tokens.get(self.pos) {
            self.pos += 1;
            let right = self.product()?;
            let value = if *op == '+' { left.value + right.value } else { left.value - right.value };
            left = Dimension { value, unit: pick_unit(left.unit, right.unit) };
        }
        Some(left)
    }

    fn product(&mut self) -> Option<Dimension> {
        let mut left = self.operand()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.tokens.get(self.pos) {
            self.pos += 1;
            let right = self.operand()?;
            let value = if *op == '*' {
                left.value * right.value
            } else {
                if right.value == 0.0 {
                    return None;
                }
                left.value / right.value
            };
            left = Dimension { value, unit: pick_unit(left.unit, right.unit) };
        }
        Some(left)
    }

    fn operand(&mut self) -> Option<Dimension> {
        match self.tokens.get(self.pos) {
            Some(Token::Num(d)) => {
                self.pos += 1;
                Some(d.clone())
            }
            _ => None,
        }
    }
}

/// The first operand's unit wins; unitless operands adopt the other's.
fn pick_unit(left: String, right: String) -> String {
    if left.is_empty() {
        right
    } else {
        left
    }
}

/// Round to eight decimals and drop trailing zeros.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1e8).round() / 1e8;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}
