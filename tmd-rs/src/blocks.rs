//! Block extraction.
//!
//! A document is split into named blocks by marker lines:
//!
//! ```text
//! -[extends] blog.post
//! -[title]
//! Hello
//! -[body]
//! # Heading
//! ```
//!
//! Scanning is a two-state machine ([`State::Searching`] until the first
//! marker, then [`State::InBlock`]).  Text before the first marker belongs
//! to no block.  `//` starts a line comment unless it directly follows `:`.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::error::CompileError;

/// Reserved block holding the main content.
pub const BODY: &str = "body";
/// Reserved block naming the parent template.
pub const EXTENDS: &str = "extends";
/// Reserved block of `name: kind => expression` declarations.
pub const CONTEXT: &str = "context";
/// Reserved block of `name(a[, b]) <= expression` filter declarations.
pub const FILTERS: &str = "filters";

// ── Blocks ────────────────────────────────────────────────────────────────────

/// Block name → trimmed content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Blocks {
    map: HashMap<String, String>,
    /// First-appearance order, used when blocks are emitted.
    order: Vec<String>,
}

impl Blocks {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Remove a block, returning its content.
    pub fn take(&mut self, name: &str) -> Option<String> {
        let content = self.map.remove(name)?;
        self.order.retain(|n| n != name);
        Some(content)
    }

    /// Blocks in the order they first appeared.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.order
            .iter()
            .filter_map(|n| self.map.get(n).map(|c| (n.as_str(), c.as_str())))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    fn insert(&mut self, name: String, content: String) {
        if self.map.insert(name.clone(), content).is_none() {
            self.order.push(name);
        }
    }
}

// ── Scanner ───────────────────────────────────────────────────────────────────

enum State {
    Searching,
    InBlock { name: String, lines: Vec<String> },
}

enum Marker<'a> {
    /// `-[name] rest`
    Open { name: &'a str, rest: &'a str },
    /// Starts with `-[` but has no `]` or an empty name.
    Malformed,
    NotMarker,
}

fn classify_line(line: &str) -> Marker<'_> {
    let Some(after) = line.trim_start_matches([' ', '\t']).strip_prefix("-[") else {
        return Marker::NotMarker;
    };
    match after.split_once(']') {
        Some((name, rest)) if !name.trim().is_empty() => Marker::Open {
            name: name.trim(),
            rest,
        },
        _ => Marker::Malformed,
    }
}

/// Remove `//` line comments, keeping `://` (URL schemes) intact.
pub fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    for (i, line) in src.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&line[..comment_start(line).unwrap_or(line.len())]);
    }
    out
}

fn comment_start(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut from = 0;
    while let Some(off) = line[from..].find("//") {
        let at = from + off;
        if at == 0 || bytes[at - 1] != b':' {
            return Some(at);
        }
        from = at + 2;
    }
    None
}

/// Split `src` into blocks.
///
/// Names and contents are trimmed; a repeated name keeps the last content.
/// A malformed marker line fails in `strict` mode and is kept as content
/// otherwise.
pub fn extract(src: &str, strict: bool) -> Result<Blocks, CompileError> {
    let text = strip_comments(src);
    let mut blocks = Blocks::default();
    let mut state = State::Searching;

    for (lineno, line) in text.lines().enumerate() {
        match classify_line(line) {
            Marker::Open { name, rest } => {
                if let State::InBlock { name, lines } = std::mem::replace(&mut state, State::Searching) {
                    close_block(&mut blocks, name, lines);
                }
                let mut lines = Vec::new();
                if !rest.trim().is_empty() {
                    lines.push(rest.to_owned());
                }
                state = State::InBlock {
                    name: name.to_owned(),
                    lines,
                };
            }
            Marker::Malformed if strict => {
                return Err(CompileError::Syntax(format!(
                    "line {}: malformed block marker '{}'",
                    lineno + 1,
                    line.trim()
                )));
            }
            marker => {
                if matches!(marker, Marker::Malformed) {
                    warn!(line = lineno + 1, "malformed block marker kept as content");
                }
                if let State::InBlock { lines, .. } = &mut state {
                    lines.push(line.to_owned());
                }
            }
        }
    }
    if let State::InBlock { name, lines } = state {
        close_block(&mut blocks, name, lines);
    }

    debug!(count = blocks.len(), names = ?blocks.order, "blocks extracted");
    Ok(blocks)
}

fn close_block(blocks: &mut Blocks, name: String, lines: Vec<String>) {
    let content = lines.join("\n").trim().to_owned();
    blocks.insert(name, content);
}

/// Join soft-wrapped lines: a backslash, optional spaces or tabs, then a
/// newline, is removed.
pub fn join_continuations(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let ws = after.len() - after.trim_start_matches([' ', '\t', '\r']).len();
        if after[ws..].starts_with('\n') {
            rest = &after[ws + 1..];
        } else {
            out.push('\\');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_blocks() {
        let b = extract("-[title]\n  Hello  \n-[body]\nline one\nline two\n", false).unwrap();
        assert_eq!(b.get("title"), Some("Hello"));
        assert_eq!(b.get(BODY), Some("line one\nline two"));
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn text_after_marker_is_content() {
        let b = extract("-[extends] blog.post\n-[body]hi", false).unwrap();
        assert_eq!(b.get(EXTENDS), Some("blog.post"));
        assert_eq!(b.get(BODY), Some("hi"));
    }

    #[test]
    fn no_markers_means_no_blocks() {
        let b = extract("just some text\nmore", false).unwrap();
        assert!(b.is_empty());
    }

    #[test]
    fn preamble_is_discarded() {
        let b = extract("stray\n-[body]\nkept", false).unwrap();
        assert_eq!(b.get(BODY), Some("kept"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn last_occurrence_wins() {
        let b = extract("-[a]\none\n-[a]\ntwo", false).unwrap();
        assert_eq!(b.get("a"), Some("two"));
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn names_are_trimmed() {
        let b = extract("-[ title ]\nx", false).unwrap();
        assert_eq!(b.get("title"), Some("x"));
    }

    #[test]
    fn internal_whitespace_is_preserved() {
        let b = extract("-[body]\n\n  a\n\n\n  b  \n\n", false).unwrap();
        assert_eq!(b.get(BODY), Some("a\n\n\n  b"));
    }

    #[test]
    fn comments_are_stripped() {
        let b = extract("-[body]\nkeep // drop\n// whole line\nnext", false).unwrap();
        assert_eq!(b.get(BODY), Some("keep \n\nnext"));
    }

    #[test]
    fn urls_survive_comment_stripping() {
        assert_eq!(
            strip_comments("see https://example.com/x // note"),
            "see https://example.com/x "
        );
    }

    #[test]
    fn malformed_marker_lenient_and_strict() {
        let src = "-[body]\n-[oops\ntext";
        let b = extract(src, false).unwrap();
        assert_eq!(b.get(BODY), Some("-[oops\ntext"));
        assert!(matches!(extract(src, true), Err(CompileError::Syntax(_))));
        assert!(extract("-[]\n", true).is_err());
    }

    #[test]
    fn take_removes_block() {
        let mut b = extract("-[context]\nx: str => 'a'\n-[body]\nb", false).unwrap();
        assert_eq!(b.take(CONTEXT).as_deref(), Some("x: str => 'a'"));
        assert!(!b.contains(CONTEXT));
        assert_eq!(b.iter().map(|(n, _)| n).collect::<Vec<_>>(), vec![BODY]);
    }

    #[test]
    fn iteration_follows_source_order() {
        let b = extract("-[z]\n1\n-[a]\n2\n-[m]\n3", false).unwrap();
        let names: Vec<&str> = b.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["z", "a", "m"]);
    }

    #[test]
    fn continuation_joins_lines() {
        assert_eq!(join_continuations("one \\\ntwo"), "one two");
        assert_eq!(join_continuations("one\\  \t\ntwo"), "onetwo");
        assert_eq!(join_continuations("a\\b"), "a\\b");
        assert_eq!(join_continuations("end\\"), "end\\");
    }
}
