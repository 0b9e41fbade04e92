//! Sandbox statement AST and program-level parser.
//!
//! A program is a sequence of logical lines.  Each non-empty, non-comment
//! line is either an assignment (`name = expr`) or a single-expression
//! function definition (`def name(a, b=default): return expr`).  Lines are
//! joined while brackets are open or when a line ends in `\`, and a `def`
//! header ending in `:` takes its `return` from the next line.

use super::expr::{tokenize, Expr, Parser, Token};

/// A parsed sandbox statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `name = expr`
    Assign { name: String, value: Expr },
    /// `def name(params): return body`
    Def {
        name: String,
        params: Vec<(String, Option<Expr>)>,
        body: Expr,
    },
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// Parse a sandbox program into statements.
///
/// Errors carry the 1-based line number of the logical line that failed.
pub fn parse_program(src: &str) -> Result<Vec<Stmt>, String> {
    let mut stmts = Vec::new();
    for (lineno, line) in logical_lines(src)? {
        let stmt = parse_stmt(&line).map_err(|e| format!("line {lineno}: {e}"))?;
        stmts.push(stmt);
    }
    Ok(stmts)
}

/// Parse one logical line.
pub fn parse_stmt(line: &str) -> Result<Stmt, String> {
    let mut p = Parser::new(tokenize(line)?);

    let stmt = if p.eat(&Token::Def) {
        let name = p.expect_ident("function name after 'def'")?;
        check_name(&name)?;
        p.expect(&Token::LParen, "'(' after function name")?;
        let mut params: Vec<(String, Option<Expr>)> = Vec::new();
        while p.peek() != &Token::RParen {
            let param = p.expect_ident("parameter name")?;
            check_name(&param)?;
            if params.iter().any(|(n, _)| *n == param) {
                return Err(format!("duplicate argument '{param}' in function definition"));
            }
            let default = if p.eat(&Token::Assign) {
                Some(p.parse_expr()?)
            } else {
                if params.iter().any(|(_, d)| d.is_some()) {
                    return Err("non-default argument follows default argument".into());
                }
                None
            };
            params.push((param, default));
            if !p.eat(&Token::Comma) {
                break;
            }
        }
        p.expect(&Token::RParen, "')' after parameters")?;
        p.expect(&Token::Colon, "':' after function signature")?;
        p.expect(&Token::Return, "'return' (function bodies are a single return)")?;
        let body = p.parse_expr()?;
        Stmt::Def { name, params, body }
    } else if matches!(p.peek(), Token::Ident(_)) && p.peek_at(1) == &Token::Assign {
        let name = p.expect_ident("assignment target")?;
        check_name(&name)?;
        p.advance();
        let value = p.parse_expr()?;
        Stmt::Assign { name, value }
    } else {
        return Err("expected 'name = expression' or 'def'".into());
    };

    if !p.at_end() {
        return Err("unexpected trailing input".into());
    }
    Ok(stmt)
}

fn check_name(name: &str) -> Result<(), String> {
    if name.starts_with("__") {
        Err(format!("names beginning with '__' are reserved: '{name}'"))
    } else {
        Ok(())
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Group physical lines into logical lines, numbered by their first line.
fn logical_lines(src: &str) -> Result<Vec<(usize, String)>, String> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (i, raw) in src.lines().enumerate() {
        let lineno = i + 1;
        if pending.is_none() && is_blank_or_comment(raw) {
            continue;
        }
        let (start, mut buf) = pending.take().unwrap_or((lineno, String::new()));
        if !buf.is_empty() {
            buf.push(' ');
        }

        let (text, continued) = match raw.trim_end().strip_suffix('\\') {
            Some(head) => (head, true),
            None => (raw, false),
        };
        buf.push_str(text.trim());

        let def_header = buf.starts_with("def ") && buf.ends_with(':');
        if continued || def_header || bracket_depth(&buf) > 0 {
            pending = Some((start, buf));
        } else {
            out.push((start, buf));
        }
    }

    if let Some((start, _)) = pending {
        return Err(format!("line {start}: unexpected end of input"));
    }
    Ok(out)
}

fn is_blank_or_comment(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

/// Net count of open brackets outside string literals.
fn bracket_depth(s: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '#' => break,
                _ => {}
            },
        }
    }
    depth
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::parse_expr;

    #[test]
    fn assignment() {
        let stmts = parse_program("x = 1 + 2").unwrap();
        assert_eq!(
            stmts,
            vec![Stmt::Assign {
                name: "x".into(),
                value: parse_expr("1 + 2").unwrap()
            }]
        );
    }

    #[test]
    fn def_with_default() {
        let stmts = parse_program("def f(a, b=None): return a").unwrap();
        match &stmts[0] {
            Stmt::Def { name, params, body } => {
                assert_eq!(name, "f");
                assert_eq!(params.len(), 2);
                assert!(params[0].1.is_none());
                assert!(params[1].1.is_some());
                assert_eq!(body, &Expr::Var("a".into()));
            }
            other => panic!("expected def, got {other:?}"),
        }
    }

    #[test]
    fn def_body_on_next_line() {
        let stmts = parse_program("def f(a):\n    return a * 2\n").unwrap();
        assert!(matches!(&stmts[0], Stmt::Def { name, .. } if name == "f"));
    }

    #[test]
    fn open_brackets_continue_the_line() {
        let src = "xs = [\n  1,\n  2,\n]\ny = 3";
        let stmts = parse_program(src).unwrap();
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn backslash_continues_the_line() {
        let stmts = parse_program("x = 1 + \\\n  2").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let stmts = parse_program("# heading\n\nx = 1  # trailing\n").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn errors_carry_line_numbers() {
        let err = parse_program("x = 1\ny = (").unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
        let err = parse_program("x = 1\nprint(x)").unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn dunder_names_are_reserved() {
        assert!(parse_stmt("__x = 1").is_err());
        assert!(parse_stmt("def __f(a): return a").is_err());
        assert!(parse_stmt("def f(__a): return 1").is_err());
        assert!(parse_stmt("x = __import__('os')").is_err());
    }

    #[test]
    fn parameter_order_is_checked() {
        assert!(parse_stmt("def f(a=1, b): return a").is_err());
        assert!(parse_stmt("def f(a, a): return a").is_err());
    }
}
