//! Sandbox expression lexer, AST, parser, and evaluator.
//!
//! The language is a closed expression language: literals,
//! list and dict displays, identifiers, arithmetic, comparisons, boolean
//! operators, the conditional expression, subscripts and slices, and calls
//! restricted to the allow-list in [`super::builtins`] plus functions bound
//! in scope.  There is no assignment, attribute access, import, or lambda.
//!
//! Operator precedence (lowest → highest):
//!   conditional  →  or  →  and  →  not  →  comparison  →
//!   additive  →  multiplicative  →  unary  →  power  →  postfix  →  primary

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::builtins::{call_builtin, call_method};
use super::value::{check_footprint, check_seq_len, dict_insert, Function, Value};

/// Deepest bracket/operator nesting the parser accepts.
pub const MAX_NESTING: usize = 64;

/// Deepest chain of user-function calls the evaluator allows.
pub const MAX_CALL_DEPTH: usize = 32;

// ── EvalContext ───────────────────────────────────────────────────────────────

/// Variable lookup interface used by the evaluator.
///
/// The sandbox implements this over its layered scope; function calls use a
/// private frame that only exposes the parameters.
pub trait EvalContext {
    /// Look up a variable.
    fn get_var(&self, name: &str) -> Option<Value>;

    /// Current user-function call depth.
    fn call_depth(&self) -> usize {
        0
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // Keywords
    And,
    Or,
    Not,
    In,
    If,
    Else,
    True,
    False,
    None,
    Def,
    Return,

    // Operators
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt,
    Le,
    Gt,
    Ge,

    // Misc
    Assign,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Eof,
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

struct Lexer {
    src: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn new(src: &str) -> Self {
        Lexer {
            src: src.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.src.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r' | '\n') => self.pos += 1,
                Some('#') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn read_number(&mut self, first: char) -> Result<Token, String> {
        let mut s = String::new();
        s.push(first);
        let mut is_float = first == '.';

        while let Some(c @ '0'..='9') = self.peek() {
            s.push(c);
            self.pos += 1;
        }
        if !is_float && self.peek() == Some('.') && matches!(self.peek2(), Some('0'..='9')) {
            is_float = true;
            s.push('.');
            self.pos += 1;
            while let Some(c @ '0'..='9') = self.peek() {
                s.push(c);
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            let mut exp = String::from("e");
            self.pos += 1;
            if let Some(sign @ ('+' | '-')) = self.peek() {
                exp.push(sign);
                self.pos += 1;
            }
            if matches!(self.peek(), Some('0'..='9')) {
                while let Some(c @ '0'..='9') = self.peek() {
                    exp.push(c);
                    self.pos += 1;
                }
                is_float = true;
                s.push_str(&exp);
            } else {
                self.pos = save;
            }
        }

        if is_float {
            s.parse()
                .map(Token::Float)
                .map_err(|_| format!("invalid number literal '{s}'"))
        } else {
            s.parse()
                .map(Token::Int)
                .map_err(|_| format!("integer literal too large: {s}"))
        }
    }

    fn read_string(&mut self, quote: char) -> Result<Token, String> {
        let mut s = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err("unterminated string literal".into()),
                Some('\\') => match self.advance() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c @ ('\\' | '\'' | '"')) => s.push(c),
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => return Err("unterminated string literal".into()),
                },
                Some(c) if c == quote => break,
                Some(c) => s.push(c),
            }
        }
        Ok(Token::Str(s))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut s = String::new();
        s.push(first);
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        match s.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "in" => Token::In,
            "if" => Token::If,
            "else" => Token::Else,
            "True" => Token::True,
            "False" => Token::False,
            "None" => Token::None,
            "def" => Token::Def,
            "return" => Token::Return,
            _ => Token::Ident(s),
        }
    }

    fn next_token(&mut self) -> Result<Token, String> {
        self.skip_ws();
        let ch = match self.advance() {
            None => return Ok(Token::Eof),
            Some(c) => c,
        };

        Ok(match ch {
            '0'..='9' => return self.read_number(ch),
            '.' if matches!(self.peek(), Some('0'..='9')) => return self.read_number(ch),
            '"' | '\'' => return self.read_string(ch),
            c if c.is_alphabetic() || c == '_' => self.read_ident(c),
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => {
                if self.eat('*') {
                    Token::StarStar
                } else {
                    Token::Star
                }
            }
            '/' => {
                if self.eat('/') {
                    Token::SlashSlash
                } else {
                    Token::Slash
                }
            }
            '%' => Token::Percent,
            '=' => {
                if self.eat('=') {
                    Token::Eq
                } else {
                    Token::Assign
                }
            }
            '!' => {
                if self.eat('=') {
                    Token::Ne
                } else {
                    return Err("unexpected character '!'".into());
                }
            }
            '<' => {
                if self.eat('=') {
                    Token::Le
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.eat('=') {
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            c => return Err(format!("unexpected character '{c}'")),
        })
    }
}

/// Split `src` into tokens, ending with [`Token::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let mut lexer = Lexer::new(src);
    let mut tokens = Vec::new();
    loop {
        let t = lexer.next_token()?;
        let done = t == Token::Eof;
        tokens.push(t);
        if done {
            break;
        }
    }
    Ok(tokens)
}

// ── AST ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    Pow,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    List(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` chains as `a < b and b <= c`, evaluating `b` once.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    /// `then if cond else otherwise`, stored as (cond, then, otherwise).
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Method(Box<Expr>, String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    Slice(
        Box<Expr>,
        Option<Box<Expr>>,
        Option<Box<Expr>>,
        Option<Box<Expr>>,
    ),
}

impl Expr {
    /// Rename free variables (and by-name calls) according to `map`.
    ///
    /// All renames happen in one traversal, so `{x → a, a → b}` swaps rather
    /// than chains.  Method names are attributes, not variables, and are left
    /// alone.
    pub fn rename_vars(&self, map: &HashMap<&str, &str>) -> Expr {
        let r = |e: &Expr| e.rename_vars(map);
        let rb = |e: &Expr| Box::new(e.rename_vars(map));
        let rename = |name: &str| map.get(name).map_or(name, |n| *n).to_owned();
        match self {
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Var(name) => Expr::Var(rename(name)),
            Expr::List(items) => Expr::List(items.iter().map(r).collect()),
            Expr::Dict(pairs) => Expr::Dict(pairs.iter().map(|(k, v)| (r(k), r(v))).collect()),
            Expr::Unary(op, e) => Expr::Unary(*op, rb(e)),
            Expr::Binary(op, l, rhs) => Expr::Binary(*op, rb(l), rb(rhs)),
            Expr::Compare(first, rest) => Expr::Compare(
                rb(first),
                rest.iter().map(|(op, e)| (*op, r(e))).collect(),
            ),
            Expr::Conditional(c, t, e) => Expr::Conditional(rb(c), rb(t), rb(e)),
            Expr::Call(name, args) => Expr::Call(rename(name), args.iter().map(r).collect()),
            Expr::Method(obj, name, args) => {
                Expr::Method(rb(obj), name.clone(), args.iter().map(r).collect())
            }
            Expr::Index(obj, idx) => Expr::Index(rb(obj), rb(idx)),
            Expr::Slice(obj, a, b, c) => Expr::Slice(
                rb(obj),
                a.as_deref().map(rb),
                b.as_deref().map(rb),
                c.as_deref().map(rb),
            ),
        }
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, args: &[Expr]) -> fmt::Result {
    for (i, a) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{a}")?;
    }
    Ok(())
}

/// Prints source that parses back to the same tree (binary forms are fully
/// parenthesised).
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{}", v.repr()),
            Expr::Var(name) => write!(f, "{name}"),
            Expr::List(items) => {
                write!(f, "[")?;
                fmt_args(f, items)?;
                write!(f, "]")
            }
            Expr::Dict(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Expr::Unary(op, e) => match op {
                UnaryOp::Neg => write!(f, "(-{e})"),
                UnaryOp::Pos => write!(f, "(+{e})"),
                UnaryOp::Not => write!(f, "(not {e})"),
            },
            Expr::Binary(op, l, r) => {
                let sym = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::FloorDiv => "//",
                    BinOp::Rem => "%",
                    BinOp::Pow => "**",
                    BinOp::And => "and",
                    BinOp::Or => "or",
                };
                write!(f, "({l} {sym} {r})")
            }
            Expr::Compare(first, rest) => {
                write!(f, "({first}")?;
                for (op, e) in rest {
                    let sym = match op {
                        CmpOp::Eq => "==",
                        CmpOp::Ne => "!=",
                        CmpOp::Lt => "<",
                        CmpOp::Le => "<=",
                        CmpOp::Gt => ">",
                        CmpOp::Ge => ">=",
                        CmpOp::In => "in",
                        CmpOp::NotIn => "not in",
                    };
                    write!(f, " {sym} {e}")?;
                }
                write!(f, ")")
            }
            Expr::Conditional(c, t, e) => write!(f, "({t} if {c} else {e})"),
            Expr::Call(name, args) => {
                write!(f, "{name}(")?;
                fmt_args(f, args)?;
                write!(f, ")")
            }
            Expr::Method(obj, name, args) => {
                write!(f, "{obj}.{name}(")?;
                fmt_args(f, args)?;
                write!(f, ")")
            }
            Expr::Index(obj, idx) => write!(f, "{obj}[{idx}]"),
            Expr::Slice(obj, a, b, c) => {
                write!(f, "{obj}[")?;
                if let Some(a) = a {
                    write!(f, "{a}")?;
                }
                write!(f, ":")?;
                if let Some(b) = b {
                    write!(f, "{b}")?;
                }
                if let Some(c) = c {
                    write!(f, ":{c}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    pub fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    pub fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    pub fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    pub fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == expected {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn expect(&mut self, expected: &Token, what: &str) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {what}, found {}", describe(self.peek())))
        }
    }

    pub fn expect_ident(&mut self, what: &str) -> Result<String, String> {
        match self.advance() {
            Token::Ident(name) => Ok(name),
            other => Err(format!("expected {what}, found {}", describe(&other))),
        }
    }

    pub fn at_end(&self) -> bool {
        self.peek() == &Token::Eof
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err("expression nested too deeply".into());
        }
        Ok(())
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        self.enter()?;
        let result = self.parse_conditional();
        self.depth -= 1;
        result
    }

    fn parse_conditional(&mut self) -> Result<Expr, String> {
        let then = self.parse_or()?;
        if self.eat(&Token::If) {
            let cond = self.parse_or()?;
            self.expect(&Token::Else, "'else' in conditional expression")?;
            let otherwise = self.parse_expr()?;
            Ok(Expr::Conditional(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ))
        } else {
            Ok(then)
        }
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.eat(&Token::Or) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_not()?;
        while self.eat(&Token::And) {
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Not) {
            self.enter()?;
            let inner = self.parse_not();
            self.depth -= 1;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let first = self.parse_additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Token::Eq => CmpOp::Eq,
                Token::Ne => CmpOp::Ne,
                Token::Lt => CmpOp::Lt,
                Token::Le => CmpOp::Le,
                Token::Gt => CmpOp::Gt,
                Token::Ge => CmpOp::Ge,
                Token::In => CmpOp::In,
                Token::Not if self.peek_at(1) == &Token::In => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.parse_additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::SlashSlash => BinOp::FloorDiv,
                Token::Percent => BinOp::Rem,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let op = match self.peek() {
            Token::Minus => UnaryOp::Neg,
            Token::Plus => UnaryOp::Pos,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        self.enter()?;
        let inner = self.parse_unary();
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(inner?)))
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_postfix()?;
        if self.eat(&Token::StarStar) {
            self.enter()?;
            let exp = self.parse_unary();
            self.depth -= 1;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exp?)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Token::LBracket => {
                    self.pos += 1;
                    expr = self.parse_subscript(expr)?;
                }
                Token::Dot => {
                    self.pos += 1;
                    let name = self.expect_ident("method name after '.'")?;
                    if !self.eat(&Token::LParen) {
                        return Err(format!("attribute access is not allowed: '.{name}'"));
                    }
                    let args = self.parse_args()?;
                    expr = Expr::Method(Box::new(expr), name, args);
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_subscript(&mut self, obj: Expr) -> Result<Expr, String> {
        let start = if matches!(self.peek(), Token::Colon) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        if !self.eat(&Token::Colon) {
            self.expect(&Token::RBracket, "']'")?;
            let idx = start.ok_or_else(|| "empty subscript".to_owned())?;
            return Ok(Expr::Index(Box::new(obj), Box::new(idx)));
        }
        let stop = if matches!(self.peek(), Token::Colon | Token::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        let step = if self.eat(&Token::Colon) && self.peek() != &Token::RBracket {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(&Token::RBracket, "']'")?;
        Ok(Expr::Slice(Box::new(obj), start.map(Box::new), stop, step))
    }

    /// Arguments after an opening `(`, through the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, String> {
        let mut args = Vec::new();
        while self.peek() != &Token::RParen {
            args.push(self.parse_expr()?);
            if !self.eat(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen, "')' after arguments")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let tok = self.advance();
        match tok {
            Token::Int(n) => Ok(Expr::Literal(Value::Int(n))),
            Token::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Token::Str(mut s) => {
                // Adjacent literals concatenate: "a" "b" == "ab".
                while let Token::Str(next) = self.peek() {
                    s.push_str(next);
                    self.pos += 1;
                }
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::None => Ok(Expr::Literal(Value::None)),
            Token::Ident(name) => {
                if name.starts_with("__") {
                    return Err(format!("names beginning with '__' are reserved: '{name}'"));
                }
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(Expr::Call(name, args))
                } else {
                    Ok(Expr::Var(name))
                }
            }
            Token::LParen => {
                let inner = self.parse_expr()?;
                if self.peek() == &Token::Comma {
                    return Err("tuples are not supported; use a list".into());
                }
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                while self.peek() != &Token::RBracket {
                    items.push(self.parse_expr()?);
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBracket, "']' to close list")?;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                let mut pairs = Vec::new();
                while self.peek() != &Token::RBrace {
                    let key = self.parse_expr()?;
                    self.expect(&Token::Colon, "':' in dict display")?;
                    let value = self.parse_expr()?;
                    pairs.push((key, value));
                    if !self.eat(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RBrace, "'}' to close dict")?;
                Ok(Expr::Dict(pairs))
            }
            other => Err(format!("unexpected {}", describe(&other))),
        }
    }
}

fn describe(tok: &Token) -> String {
    match tok {
        Token::Eof => "end of input".to_owned(),
        Token::Ident(name) => format!("name '{name}'"),
        Token::Str(s) => format!("string {}", Value::Str(s.clone()).repr()),
        Token::Int(n) => format!("number {n}"),
        Token::Float(x) => format!("number {x}"),
        other => format!("{other:?}"),
    }
}

/// Parse a complete expression string into an AST.
pub fn parse_expr(src: &str) -> Result<Expr, String> {
    let tokens = tokenize(src)?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expr()?;
    if !parser.at_end() {
        return Err(format!("unexpected {} after expression", describe(parser.peek())));
    }
    Ok(expr)
}

// ── Evaluator ─────────────────────────────────────────────────────────────────

/// Evaluate an [`Expr`] AST node against the given context.
pub fn eval_expr(expr: &Expr, ctx: &dyn EvalContext) -> Result<Value, String> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Var(name) => ctx
            .get_var(name)
            .ok_or_else(|| format!("name '{name}' is not defined")),

        Expr::List(items) => {
            check_seq_len(items.len())?;
            let mut out = Vec::with_capacity(items.len());
            let mut size = 2usize;
            for e in items {
                let v = eval_expr(e, ctx)?;
                size = size.saturating_add(v.footprint());
                check_footprint(size)?;
                out.push(v);
            }
            Ok(Value::List(out))
        }

        Expr::Dict(pairs) => {
            let mut out = Vec::with_capacity(pairs.len());
            let mut size = 2usize;
            for (k, v) in pairs {
                let key = eval_expr(k, ctx)?;
                let value = eval_expr(v, ctx)?;
                size = size.saturating_add(key.footprint()).saturating_add(value.footprint());
                check_footprint(size)?;
                dict_insert(&mut out, key, value)?;
            }
            Ok(Value::Dict(out))
        }

        Expr::Unary(op, inner) => {
            let v = eval_expr(inner, ctx)?;
            match op {
                UnaryOp::Neg => v.neg(),
                UnaryOp::Pos => v.pos(),
                UnaryOp::Not => Ok(Value::Bool(!v.truthy())),
            }
        }

        Expr::Binary(op, lhs, rhs) => {
            // Short-circuit; `and`/`or` yield an operand, not a bool.
            match op {
                BinOp::And => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.truthy() { eval_expr(rhs, ctx) } else { Ok(l) };
                }
                BinOp::Or => {
                    let l = eval_expr(lhs, ctx)?;
                    return if l.truthy() { Ok(l) } else { eval_expr(rhs, ctx) };
                }
                _ => {}
            }
            let l = eval_expr(lhs, ctx)?;
            let r = eval_expr(rhs, ctx)?;
            match op {
                BinOp::Add => l.add(&r),
                BinOp::Sub => l.sub(&r),
                BinOp::Mul => l.mul(&r),
                BinOp::Div => l.div(&r),
                BinOp::FloorDiv => l.floor_div(&r),
                BinOp::Rem => l.rem(&r),
                BinOp::Pow => l.pow(&r),
                BinOp::And | BinOp::Or => unreachable!("handled above"),
            }
        }

        Expr::Compare(first, rest) => {
            let mut left = eval_expr(first, ctx)?;
            for (op, e) in rest {
                let right = eval_expr(e, ctx)?;
                if !compare(*op, &left, &right)? {
                    return Ok(Value::Bool(false));
                }
                left = right;
            }
            Ok(Value::Bool(true))
        }

        Expr::Conditional(cond, then, otherwise) => {
            if eval_expr(cond, ctx)?.truthy() {
                eval_expr(then, ctx)
            } else {
                eval_expr(otherwise, ctx)
            }
        }

        Expr::Call(name, arg_exprs) => {
            let args = eval_args(arg_exprs, ctx)?;
            if let Some(Value::Func(func)) = ctx.get_var(name) {
                return func.call_at(args, ctx.call_depth() + 1);
            }
            if ctx.get_var(name).is_some() {
                return Err(format!("'{name}' is not callable"));
            }
            call_builtin(name, args)
                .unwrap_or_else(|| Err(format!("name '{name}' is not an allowed function")))
        }

        Expr::Method(obj, name, arg_exprs) => {
            let recv = eval_expr(obj, ctx)?;
            let args = eval_args(arg_exprs, ctx)?;
            call_method(&recv, name, args)
        }

        Expr::Index(obj, idx) => {
            let o = eval_expr(obj, ctx)?;
            let i = eval_expr(idx, ctx)?;
            o.index(&i)
        }

        Expr::Slice(obj, start, stop, step) => {
            let o = eval_expr(obj, ctx)?;
            let bound = |e: &Option<Box<Expr>>| -> Result<Option<i64>, String> {
                match e {
                    None => Ok(None),
                    Some(e) => match eval_expr(e, ctx)? {
                        Value::None => Ok(None),
                        v => v
                            .as_index()
                            .map(Some)
                            .ok_or_else(|| "slice indices must be integers or None".to_owned()),
                    },
                }
            };
            o.slice(bound(start)?, bound(stop)?, bound(step)?)
        }
    }
}

fn eval_args(exprs: &[Expr], ctx: &dyn EvalContext) -> Result<Vec<Value>, String> {
    let mut args = Vec::with_capacity(exprs.len());
    for e in exprs {
        args.push(eval_expr(e, ctx)?);
    }
    Ok(args)
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, String> {
    use std::cmp::Ordering;
    Ok(match op {
        CmpOp::Eq => l.py_eq(r),
        CmpOp::Ne => !l.py_eq(r),
        CmpOp::Lt => l.py_cmp(r)? == Ordering::Less,
        CmpOp::Le => l.py_cmp(r)? != Ordering::Greater,
        CmpOp::Gt => l.py_cmp(r)? == Ordering::Greater,
        CmpOp::Ge => l.py_cmp(r)? != Ordering::Less,
        CmpOp::In => r.contains(l)?,
        CmpOp::NotIn => !r.contains(l)?,
    })
}

// ── Function calls ────────────────────────────────────────────────────────────

/// Scope of a running function body: its parameters, nothing else.
struct Frame {
    locals: HashMap<String, Value>,
    depth: usize,
}

impl EvalContext for Frame {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }

    fn call_depth(&self) -> usize {
        self.depth
    }
}

impl Function {
    /// Call with positional arguments; missing trailing arguments take their
    /// declared defaults.
    pub fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        self.call_at(args, 1)
    }

    fn call_at(&self, args: Vec<Value>, depth: usize) -> Result<Value, String> {
        if depth > MAX_CALL_DEPTH {
            return Err("maximum call depth exceeded".into());
        }
        if args.len() > self.params.len() {
            return Err(format!(
                "{}() takes {} arguments but {} were given",
                self.name,
                self.params.len(),
                args.len()
            ));
        }
        let mut locals = HashMap::with_capacity(self.params.len());
        let mut args = args.into_iter();
        for p in &self.params {
            let v = match args.next() {
                Some(v) => v,
                None => p.default.clone().ok_or_else(|| {
                    format!("{}() missing required argument: '{}'", self.name, p.name)
                })?,
            };
            locals.insert(p.name.clone(), v);
        }
        eval_expr(&self.body, &Frame { locals, depth })
    }
}

/// Convenience: parse and evaluate an expression string.
pub fn eval_str(src: &str, ctx: &dyn EvalContext) -> Result<Value, String> {
    let expr = parse_expr(src)?;
    eval_expr(&expr, ctx)
}

/// Wrap a parsed body as a callable [`Value`].
pub fn make_function(name: &str, params: Vec<super::value::Param>, body: Expr) -> Value {
    Value::Func(Arc::new(Function {
        name: name.to_owned(),
        params,
        body,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::value::Param;

    // ── Minimal EvalContext for tests ─────────────────────────────────────────

    struct TestCtx {
        vars: HashMap<String, Value>,
    }

    impl TestCtx {
        fn new() -> Self {
            TestCtx {
                vars: HashMap::new(),
            }
        }
        fn with(mut self, k: &str, v: Value) -> Self {
            self.vars.insert(k.into(), v);
            self
        }
    }

    impl EvalContext for TestCtx {
        fn get_var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }
    }

    fn eval(src: &str) -> Value {
        eval_str(src, &TestCtx::new()).expect("eval failed")
    }

    fn s(v: &str) -> Value {
        Value::Str(v.into())
    }

    #[test]
    fn literals() {
        assert_eq!(eval("42"), Value::Int(42));
        assert_eq!(eval("2.5"), Value::Float(2.5));
        assert_eq!(eval("'hello'"), s("hello"));
        assert_eq!(eval("\"a\" 'b'"), s("ab"));
        assert_eq!(eval("None"), Value::None);
        assert_eq!(eval("True"), Value::Bool(true));
        assert_eq!(eval("1e3"), Value::Float(1000.0));
    }

    #[test]
    fn containers() {
        assert_eq!(
            eval("[1, 'two', [3]]"),
            Value::List(vec![Value::Int(1), s("two"), Value::List(vec![Value::Int(3)])])
        );
        assert_eq!(
            eval("{'a': 1, 'b': 2,}"),
            Value::Dict(vec![(s("a"), Value::Int(1)), (s("b"), Value::Int(2))])
        );
        assert_eq!(eval("[]"), Value::List(vec![]));
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(eval("2 + 3 * 4"), Value::Int(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::Int(20));
        assert_eq!(eval("7 // 2"), Value::Int(3));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("-2 ** 2"), Value::Int(-4));
        assert_eq!(eval("2 ** 3 ** 2"), Value::Int(512));
    }

    #[test]
    fn boolean_operators_return_operands() {
        assert_eq!(eval("0 or 'x'"), s("x"));
        assert_eq!(eval("'' and 1"), s(""));
        assert_eq!(eval("not []"), Value::Bool(true));
    }

    #[test]
    fn chained_comparison() {
        assert_eq!(eval("1 < 2 < 3"), Value::Bool(true));
        assert_eq!(eval("1 < 3 < 2"), Value::Bool(false));
        assert_eq!(eval("'a' in 'cat'"), Value::Bool(true));
        assert_eq!(eval("3 not in [1, 2]"), Value::Bool(true));
    }

    #[test]
    fn conditional_expression() {
        assert_eq!(eval("'yes' if 1 else 'no'"), s("yes"));
        assert_eq!(eval("'yes' if 0 else 'no'"), s("no"));
    }

    #[test]
    fn subscripts() {
        assert_eq!(eval("'hello'[1]"), s("e"));
        assert_eq!(eval("'hello'[::-1]"), s("olleh"));
        assert_eq!(eval("[1, 2, 3][-1]"), Value::Int(3));
        assert_eq!(eval("{'k': 'v'}['k']"), s("v"));
    }

    #[test]
    fn variable_lookup() {
        let ctx = TestCtx::new().with("x", Value::Int(7));
        assert_eq!(eval_str("x + 1", &ctx), Ok(Value::Int(8)));
        assert!(eval_str("y", &ctx).unwrap_err().contains("not defined"));
    }

    #[test]
    fn calls_are_allow_listed() {
        assert_eq!(eval("len('abc')"), Value::Int(3));
        assert_eq!(eval("'abc'.upper()"), s("ABC"));
        assert!(eval_str("open('x')", &TestCtx::new()).is_err());
        assert!(parse_expr("x.__class__").is_err());
    }

    #[test]
    fn user_function_values_are_callable() {
        let double = make_function(
            "double",
            vec![Param { name: "a".into(), default: None }],
            parse_expr("a * 2").unwrap(),
        );
        let ctx = TestCtx::new().with("double", double);
        assert_eq!(eval_str("double(21)", &ctx), Ok(Value::Int(42)));
    }

    #[test]
    fn function_bodies_do_not_see_caller_scope() {
        let peek = make_function("peek", vec![], parse_expr("secret").unwrap());
        let ctx = TestCtx::new()
            .with("peek", peek)
            .with("secret", s("hidden"));
        assert!(eval_str("peek()", &ctx).is_err());
    }

    #[test]
    fn defaults_and_arity() {
        let f = Function {
            name: "f".into(),
            params: vec![
                Param { name: "a".into(), default: None },
                Param { name: "b".into(), default: Some(Value::None) },
            ],
            body: parse_expr("[a, b]").unwrap(),
        };
        assert_eq!(
            f.call(vec![Value::Int(1)]),
            Ok(Value::List(vec![Value::Int(1), Value::None]))
        );
        assert!(f.call(vec![]).is_err());
        assert!(f.call(vec![Value::None, Value::None, Value::None]).is_err());
    }

    #[test]
    fn runaway_recursion_is_stopped() {
        let f = make_function(
            "f",
            vec![Param { name: "a".into(), default: None }],
            parse_expr("a(a)").unwrap(),
        );
        let Value::Func(func) = f.clone() else { unreachable!() };
        let err = func.call(vec![f]).unwrap_err();
        assert!(err.contains("call depth"));
    }

    #[test]
    fn nesting_limit() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(parse_expr(&deep).unwrap_err().contains("too deeply"));
    }

    #[test]
    fn syntax_errors() {
        assert!(parse_expr("1 +").is_err());
        assert!(parse_expr("'unterminated").is_err());
        assert!(parse_expr("(1, 2)").is_err());
        assert!(parse_expr("a b").is_err());
        assert!(parse_expr("x = 1").is_err());
    }

    #[test]
    fn display_round_trips() {
        for src in [
            "a + b * 2",
            "[x, {'k': y[1:2]}]",
            "'s' if not a else b.upper()",
            "-(a ** 2) // 3",
            "a not in b and c <= d",
            "len(xs[::-1])",
        ] {
            let expr = parse_expr(src).unwrap();
            let printed = expr.to_string();
            assert_eq!(parse_expr(&printed).unwrap(), expr, "{src} → {printed}");
        }
    }

    #[test]
    fn rename_is_simultaneous_and_word_exact() {
        let expr = parse_expr("x + maxval + y.upper() + xs").unwrap();
        let map = HashMap::from([("x", "a"), ("y", "b")]);
        assert_eq!(expr.rename_vars(&map).to_string(), "(((a + maxval) + b.upper()) + xs)");

        let swap = HashMap::from([("b", "a"), ("a", "b")]);
        let expr = parse_expr("b - a").unwrap();
        assert_eq!(expr.rename_vars(&swap).to_string(), "(a - b)");
    }
}
