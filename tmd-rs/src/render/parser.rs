//! Template lexer and parser.
//!
//! Source text is split into text, `{{ variable }}`, `{% tag %}` and
//! `{# comment #}` tokens, then parsed into a [`Node`] tree.  Tag bodies
//! nest: `block`, `if`/`elif`/`else`, `for`/`empty`, and `comment`.

use std::collections::HashSet;

use crate::error::RenderError;
use crate::script::expr::{tokenize, Expr, Parser, Token as ExprToken};
use crate::script::Value;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Text,
    Var,
    Tag,
    Comment,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    content: String,
    line: usize,
}

fn lex(src: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = src;
    let mut line = 1;

    let push = |tokens: &mut Vec<Token>, kind: TokenKind, content: &str, line: &mut usize| {
        tokens.push(Token {
            kind,
            content: content.to_owned(),
            line: *line,
        });
        *line += content.matches('\n').count();
    };

    loop {
        let next = ["{{", "{%", "{#"]
            .iter()
            .filter_map(|open| rest.find(open).map(|i| (i, *open)))
            .min_by_key(|(i, _)| *i);
        let Some((start, open)) = next else {
            break;
        };
        let close = match open {
            "{{" => "}}",
            "{%" => "%}",
            _ => "#}",
        };
        let Some(len) = rest[start + 2..].find(close) else {
            break;
        };
        if start > 0 {
            push(&mut tokens, TokenKind::Text, &rest[..start], &mut line);
        }
        let inner = &rest[start + 2..start + 2 + len];
        let kind = match open {
            "{{" => TokenKind::Var,
            "{%" => TokenKind::Tag,
            _ => TokenKind::Comment,
        };
        // Delimiters count toward line numbers through `inner` only.
        push(&mut tokens, kind, inner, &mut line);
        rest = &rest[start + 2 + len + 2..];
    }
    if !rest.is_empty() {
        push(&mut tokens, TokenKind::Text, rest, &mut line);
    }
    tokens
}

// ── AST ───────────────────────────────────────────────────────────────────────

/// A literal or a dotted variable path.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Path(Vec<String>),
}

/// `operand|filter:arg|filter`
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpr {
    pub base: Operand,
    pub filters: Vec<(String, Option<Operand>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Var(FilterExpr),
    Block {
        name: String,
        body: Vec<Node>,
    },
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Vec<Node>,
    },
    For {
        targets: Vec<String>,
        iterable: FilterExpr,
        reversed: bool,
        body: Vec<Node>,
        empty: Vec<Node>,
    },
    Include(FilterExpr),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub extends: Option<FilterExpr>,
    pub nodes: Vec<Node>,
}

impl Template {
    /// Names of every filter referenced anywhere in the template.
    pub fn filter_names(&self) -> HashSet<&str> {
        fn add<'a>(fx: &'a FilterExpr, out: &mut HashSet<&'a str>) {
            out.extend(fx.filters.iter().map(|(n, _)| n.as_str()));
        }
        fn walk<'a>(nodes: &'a [Node], out: &mut HashSet<&'a str>) {
            for node in nodes {
                match node {
                    Node::Text(_) => {}
                    Node::Var(fx) | Node::Include(fx) => add(fx, out),
                    Node::Block { body, .. } => walk(body, out),
                    Node::If { branches, otherwise } => {
                        for (_, body) in branches {
                            walk(body, out);
                        }
                        walk(otherwise, out);
                    }
                    Node::For {
                        iterable,
                        body,
                        empty,
                        ..
                    } => {
                        add(iterable, out);
                        walk(body, out);
                        walk(empty, out);
                    }
                }
            }
        }
        let mut out = HashSet::new();
        if let Some(fx) = &self.extends {
            add(fx, &mut out);
        }
        walk(&self.nodes, &mut out);
        out
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse template source.
pub fn parse(src: &str) -> Result<Template, RenderError> {
    let tokens = lex(src);
    let mut p = TemplateParser {
        tokens,
        pos: 0,
        block_names: HashSet::new(),
    };
    let mut extends = None;
    let mut seen_non_text = false;
    let mut nodes = Vec::new();

    while p.pos < p.tokens.len() {
        let tok = &p.tokens[p.pos];
        if tok.kind == TokenKind::Tag && first_word(&tok.content) == "extends" {
            if seen_non_text || extends.is_some() {
                return Err(syntax(tok.line, "'extends' must be the first tag in the template"));
            }
            let arg = rest_after(&tok.content, "extends");
            if arg.is_empty() {
                return Err(syntax(tok.line, "'extends' takes one argument"));
            }
            extends = Some(parse_filter_expr(arg, tok.line)?);
            p.pos += 1;
            continue;
        }
        if tok.kind != TokenKind::Text && tok.kind != TokenKind::Comment {
            seen_non_text = true;
        }
        let (mut chunk, end) = p.parse_until(&[])?;
        debug_assert!(end.is_none());
        nodes.append(&mut chunk);
    }
    Ok(Template { extends, nodes })
}

struct TemplateParser {
    tokens: Vec<Token>,
    pos: usize,
    block_names: HashSet<String>,
}

/// The tag that ended a `parse_until`, with its arguments and line.
struct EndTag {
    name: String,
    args: String,
    line: usize,
}

impl TemplateParser {
    /// Parse nodes until one of `ends` (or end of input when `ends` is
    /// empty).  With an empty `ends`, stops after one top-level node so the
    /// caller can police `extends`.
    fn parse_until(&mut self, ends: &[&str]) -> Result<(Vec<Node>, Option<EndTag>), RenderError> {
        let mut nodes = Vec::new();
        while self.pos < self.tokens.len() {
            let tok = self.tokens[self.pos].clone();
            self.pos += 1;
            match tok.kind {
                TokenKind::Text => nodes.push(Node::Text(tok.content)),
                TokenKind::Comment => {}
                TokenKind::Var => {
                    let content = tok.content.trim();
                    if content.is_empty() {
                        return Err(syntax(tok.line, "empty variable tag"));
                    }
                    nodes.push(Node::Var(parse_filter_expr(content, tok.line)?));
                }
                TokenKind::Tag => {
                    let name = first_word(&tok.content);
                    let args = rest_after(&tok.content, name);
                    if ends.contains(&name) {
                        return Ok((
                            nodes,
                            Some(EndTag {
                                name: name.to_owned(),
                                args: args.to_owned(),
                                line: tok.line,
                            }),
                        ));
                    }
                    nodes.push(self.parse_tag(name, args, tok.line)?);
                }
            }
            if ends.is_empty() {
                break;
            }
        }
        if ends.is_empty() {
            Ok((nodes, None))
        } else {
            Err(RenderError::Syntax(format!(
                "Unclosed tag. Looking for one of: {}",
                ends.join(", ")
            )))
        }
    }

    fn parse_tag(&mut self, name: &str, args: &str, line: usize) -> Result<Node, RenderError> {
        match name {
            "block" => {
                let block = args.trim();
                if block.is_empty() || block.contains(char::is_whitespace) {
                    return Err(syntax(line, "'block' takes one argument"));
                }
                if !self.block_names.insert(block.to_owned()) {
                    return Err(syntax(
                        line,
                        &format!("'block' tag with name '{block}' appears more than once"),
                    ));
                }
                let (body, end) = self.parse_until(&["endblock"])?;
                let end = end.ok_or_else(|| unclosed(line, "block"))?;
                let end_name = end.args.trim();
                if !end_name.is_empty() && end_name != block {
                    return Err(syntax(
                        end.line,
                        &format!("expected 'endblock' or 'endblock {block}', found 'endblock {end_name}'"),
                    ));
                }
                Ok(Node::Block {
                    name: block.to_owned(),
                    body,
                })
            }
            "if" => {
                let mut branches = Vec::new();
                let mut cond = parse_condition(args, line)?;
                loop {
                    let (body, end) = self.parse_until(&["elif", "else", "endif"])?;
                    let end = end.ok_or_else(|| unclosed(line, "if"))?;
                    branches.push((cond, body));
                    match end.name.as_str() {
                        "elif" => cond = parse_condition(&end.args, end.line)?,
                        "else" => {
                            let (otherwise, end) = self.parse_until(&["endif"])?;
                            end.ok_or_else(|| unclosed(line, "if"))?;
                            return Ok(Node::If { branches, otherwise });
                        }
                        _ => {
                            return Ok(Node::If {
                                branches,
                                otherwise: Vec::new(),
                            })
                        }
                    }
                }
            }
            "for" => {
                let (targets, iterable, reversed) = parse_for_header(args, line)?;
                let (body, end) = self.parse_until(&["empty", "endfor"])?;
                let end = end.ok_or_else(|| unclosed(line, "for"))?;
                let empty = if end.name == "empty" {
                    let (empty, end) = self.parse_until(&["endfor"])?;
                    end.ok_or_else(|| unclosed(line, "for"))?;
                    empty
                } else {
                    Vec::new()
                };
                Ok(Node::For {
                    targets,
                    iterable,
                    reversed,
                    body,
                    empty,
                })
            }
            "include" => {
                if args.trim().is_empty() {
                    return Err(syntax(line, "'include' takes one argument"));
                }
                Ok(Node::Include(parse_filter_expr(args.trim(), line)?))
            }
            "comment" => {
                self.parse_until(&["endcomment"])?
                    .1
                    .ok_or_else(|| unclosed(line, "comment"))?;
                Ok(Node::Text(String::new()))
            }
            "extends" => Err(syntax(line, "'extends' must be the first tag in the template")),
            "" => Err(syntax(line, "empty block tag")),
            other => Err(syntax(line, &format!("Invalid block tag: '{other}'"))),
        }
    }
}

fn syntax(line: usize, msg: &str) -> RenderError {
    RenderError::Syntax(format!("line {line}: {msg}"))
}

fn unclosed(line: usize, tag: &str) -> RenderError {
    syntax(line, &format!("Unclosed tag '{tag}'"))
}

fn first_word(content: &str) -> &str {
    content.split_whitespace().next().unwrap_or("")
}

fn rest_after<'a>(content: &'a str, word: &str) -> &'a str {
    let t = content.trim_start();
    t.strip_prefix(word).unwrap_or(t).trim()
}

// ── Filter expressions ────────────────────────────────────────────────────────

/// Split on `sep` outside single or double quotes.
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote = None;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == sep => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

pub fn parse_operand(s: &str, line: usize) -> Result<Operand, RenderError> {
    let s = s.trim();
    let quoted = s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')));
    if quoted {
        return Ok(Operand::Literal(Value::Str(s[1..s.len() - 1].to_owned())));
    }
    match s {
        "True" => return Ok(Operand::Literal(Value::Bool(true))),
        "False" => return Ok(Operand::Literal(Value::Bool(false))),
        "None" => return Ok(Operand::Literal(Value::None)),
        _ => {}
    }
    if let Ok(n) = s.parse::<i64>() {
        return Ok(Operand::Literal(Value::Int(n)));
    }
    if let Ok(x) = s.parse::<f64>() {
        if s.contains('.') && !s.starts_with('.') {
            return Ok(Operand::Literal(Value::Float(x)));
        }
    }
    let segments: Vec<String> = s.split('.').map(str::to_owned).collect();
    let valid = segments.iter().all(|seg| {
        !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_')
    });
    if !valid || segments[0].starts_with('_') {
        return Err(syntax(line, &format!("Could not parse the remainder: '{s}'")));
    }
    Ok(Operand::Path(segments))
}

pub fn parse_filter_expr(s: &str, line: usize) -> Result<FilterExpr, RenderError> {
    let mut parts = split_unquoted(s, '|').into_iter();
    let base = parse_operand(parts.next().unwrap_or(""), line)?;
    let mut filters = Vec::new();
    for part in parts {
        let mut pieces = split_unquoted(part, ':').into_iter();
        let name = pieces.next().unwrap_or("").trim();
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(syntax(line, &format!("Could not parse filter: '{part}'")));
        }
        let rest: Vec<&str> = pieces.collect();
        let arg = if rest.is_empty() {
            None
        } else {
            Some(parse_operand(&rest.join(":"), line)?)
        };
        filters.push((name.to_owned(), arg));
    }
    Ok(FilterExpr { base, filters })
}

// ── Conditions and loops ──────────────────────────────────────────────────────

/// Parse an `if` condition with the sandbox grammar, reading `a.b` (not a
/// method call) as `a['b']`.
pub fn parse_condition(src: &str, line: usize) -> Result<Expr, RenderError> {
    if src.trim().is_empty() {
        return Err(syntax(line, "'if' needs a condition"));
    }
    let raw = tokenize(src).map_err(|e| syntax(line, &e))?;
    let mut tokens = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match (&raw[i], raw.get(i + 1), raw.get(i + 2)) {
            (ExprToken::Dot, Some(ExprToken::Ident(name)), next) if next != Some(&ExprToken::LParen) => {
                tokens.push(ExprToken::LBracket);
                tokens.push(ExprToken::Str(name.clone()));
                tokens.push(ExprToken::RBracket);
                i += 2;
            }
            (tok, _, _) => {
                tokens.push(tok.clone());
                i += 1;
            }
        }
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr().map_err(|e| syntax(line, &e))?;
    if !parser.at_end() {
        return Err(syntax(line, &format!("unused input in condition '{}'", src.trim())));
    }
    Ok(expr)
}

fn parse_for_header(args: &str, line: usize) -> Result<(Vec<String>, FilterExpr, bool), RenderError> {
    let words: Vec<&str> = args.split_whitespace().collect();
    let in_pos = words
        .iter()
        .position(|w| *w == "in")
        .ok_or_else(|| syntax(line, "'for' statements should use the format 'for x in y'"))?;
    let (iter_words, reversed) = match words[in_pos + 1..] {
        [ref head @ .., "reversed"] => (head.to_vec(), true),
        ref all => (all.to_vec(), false),
    };
    if iter_words.is_empty() {
        return Err(syntax(line, "'for' statements should use the format 'for x in y'"));
    }
    let iterable = parse_filter_expr(&iter_words.join(" "), line)?;

    let targets: Vec<String> = words[..in_pos]
        .join(" ")
        .split(',')
        .map(|t| t.trim().to_owned())
        .collect();
    if targets
        .iter()
        .any(|t| t.is_empty() || !t.chars().all(|c| c.is_alphanumeric() || c == '_'))
    {
        return Err(syntax(line, &format!("'for' tag received an invalid argument: '{args}'")));
    }
    Ok((targets, iterable, reversed))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
