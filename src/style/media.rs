//! Media query ordering.
//!
//! Top-level `@media` blocks move after all other nodes, blocks with the
//! same condition are merged in order of appearance, and the merged blocks
//! are sorted by breakpoint.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

use super::css::CssNode;
use super::parser::GroupKind;
use crate::config::MediaSort;

/// Breakpoint class of a media condition.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Breakpoint {
    /// Upper bound only, in px
    Max(f64),
    /// Lower bound (possibly with an upper bound too), in px
    Min(f64),
    Other,
}

fn width_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(min|max)-width\s*:\s*(-?\d*\.?\d+)\s*(px|em|rem)?")
            .unwrap_or_else(|e| unreachable!("width pattern is valid: {e}"))
    })
}

fn classify(condition: &str) -> Breakpoint {
    let mut min = None;
    let mut max = None;
    for caps in width_pattern().captures_iter(condition) {
        let Ok(value) = caps[2].parse::<f64>() else { continue };
        let px = match caps.get(3).map(|m| m.as_str()) {
            Some("em") | Some("rem") => value * 16.0,
            _ => value,
        };
        match &caps[1] {
            "min" => min = min.or(Some(px)),
            _ => max = max.or(Some(px)),
        }
    }
    match (min, max) {
        (Some(min), _) => Breakpoint::Min(min),
        (None, Some(max)) => Breakpoint::Max(max),
        (None, None) => Breakpoint::Other,
    }
}

fn rank(bp: Breakpoint, order: MediaSort) -> u8 {
    match (bp, order) {
        (Breakpoint::Max(_), MediaSort::DesktopFirst) | (Breakpoint::Min(_), MediaSort::MobileFirst) => 0,
        (Breakpoint::Min(_), MediaSort::DesktopFirst) | (Breakpoint::Max(_), MediaSort::MobileFirst) => 1,
        (Breakpoint::Other, _) => 2,
    }
}

/// Compare two media conditions for output order.
pub fn compare(a: &str, b: &str, order: MediaSort) -> Ordering {
    let (ka, kb) = (classify(a), classify(b));
    rank(ka, order).cmp(&rank(kb, order)).then_with(|| match (ka, kb) {
        // Widest upper bound first.
        (Breakpoint::Max(x), Breakpoint::Max(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        // Narrowest lower bound first.
        (Breakpoint::Min(x), Breakpoint::Min(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    })
}

/// Merge and reorder top-level media blocks.
pub fn sort_media(nodes: Vec<CssNode>, order: MediaSort) -> Vec<CssNode> {
    let mut rest = Vec::with_capacity(nodes.len());
    let mut groups: Vec<(String, Vec<CssNode>)> = Vec::new();

    for node in nodes {
        match node {
            CssNode::Group { kind: GroupKind::Media, condition, nodes } => {
                match groups.iter_mut().find(|(c, _)| *c == condition) {
                    Some((_, existing)) => existing.extend(nodes),
                    None => groups.push((condition, nodes)),
                }
            }
            other => rest.push(other),
        }
    }

    groups.sort_by(|(a, _), (b, _)| compare(a, b, order));
    rest.extend(
        groups.into_iter().map(|(condition, nodes)| CssNode::Group { kind: GroupKind::Media, condition, nodes }),
    );
    rest
}
