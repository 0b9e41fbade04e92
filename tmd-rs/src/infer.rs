//! Context inference from `-[context]` declarations.
//!
//! Each line reads `name: kind => expression` with `kind` one of `list`,
//! `dict`, or `str`.  A `dict` expression is written without its braces.
//! The declarations become one sandbox program whose bindings are merged
//! over the caller's context.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::CompileError;
use crate::script::{exec_harvest, Value};
use crate::var::Context;

/// Declared kind of a context binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    List,
    Dict,
    Str,
}

impl Kind {
    pub fn parse(s: &str) -> Option<Kind> {
        match s {
            "list" => Some(Kind::List),
            "dict" => Some(Kind::Dict),
            "str" => Some(Kind::Str),
            _ => None,
        }
    }

    fn matches(self, v: &Value) -> bool {
        matches!(
            (self, v),
            (Kind::List, Value::List(_)) | (Kind::Dict, Value::Dict(_)) | (Kind::Str, Value::Str(_))
        )
    }
}

/// One parsed declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub kind: Kind,
    pub expression: String,
}

impl Binding {
    /// The sandbox statement this declaration becomes.
    fn statement(&self) -> String {
        match self.kind {
            Kind::List | Kind::Str => format!("{} = {}", self.name, self.expression),
            Kind::Dict => format!("{} = {{{}}}", self.name, self.expression),
        }
    }
}

fn decl_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\w+)\s*:\s*(\w*)\s*=>\s*(.*?)\s*$").expect("declaration regex")
    })
}

/// Parse the declarations of a context block.
///
/// Lenient mode skips unmatched lines and unknown kinds with a warning;
/// strict mode rejects them.
pub fn parse_bindings(block: &str, strict: bool) -> Result<Vec<Binding>, CompileError> {
    let mut out = Vec::new();
    for (i, line) in block.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(caps) = decl_re().captures(line) else {
            if strict {
                return Err(CompileError::Syntax(format!(
                    "context line {}: expected 'name: kind => expression'",
                    i + 1
                )));
            }
            warn!(line = i + 1, "skipping unrecognised context declaration");
            continue;
        };
        let name = &caps[1];
        let Some(kind) = Kind::parse(&caps[2]) else {
            if strict {
                return Err(CompileError::Syntax(format!(
                    "context line {}: unknown kind '{}' for '{name}' (expected list, dict or str)",
                    i + 1,
                    &caps[2]
                )));
            }
            warn!(line = i + 1, name, kind = &caps[2], "skipping context declaration of unknown kind");
            continue;
        };
        out.push(Binding {
            name: name.to_owned(),
            kind,
            expression: caps[3].to_owned(),
        });
    }
    Ok(out)
}

/// Evaluate a context block against `ctx` and return the enriched context.
pub fn infer(block: &str, ctx: &Context, strict: bool) -> Result<Context, CompileError> {
    let bindings = parse_bindings(block, strict)?;
    if bindings.is_empty() {
        return Ok(ctx.clone());
    }
    let program: Vec<String> = bindings.iter().map(Binding::statement).collect();
    let out = exec_harvest(&program.join("\n"), ctx)?;

    if strict {
        for b in &bindings {
            if let Some(v) = out.get(&b.name) {
                if !b.kind.matches(v) {
                    return Err(CompileError::Evaluation(format!(
                        "'{}' was declared {:?} but evaluated to {}",
                        b.name,
                        b.kind,
                        v.type_name()
                    )));
                }
            }
        }
    }
    debug!(count = bindings.len(), "context inferred");
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::eval_str;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    #[test]
    fn list_and_str_are_verbatim() {
        let out = infer("tags: list => ['a', 'b']\ntitle: str => 'Hi ' + 'there'", &Context::new(), false).unwrap();
        assert_eq!(out.get("tags"), Some(&Value::List(vec![s("a"), s("b")])));
        assert_eq!(out.get("title"), Some(&s("Hi there")));
    }

    #[test]
    fn dict_gets_braces() {
        let out = infer("meta: dict => 'k': 1, 'j': [2]", &Context::new(), false).unwrap();
        let expected = eval_str("{'k': 1, 'j': [2]}", &Context::new()).unwrap();
        assert_eq!(out.get("meta"), Some(&expected));
    }

    #[test]
    fn caller_values_are_visible_and_kept() {
        let ctx: Context = [("user", "ann"), ("site", "x")].into_iter().collect();
        let out = infer("greeting: str => 'hello ' + user", &ctx, false).unwrap();
        assert_eq!(out.get("greeting"), Some(&s("hello ann")));
        assert_eq!(out.get("site"), Some(&s("x")));
    }

    #[test]
    fn new_bindings_win() {
        let ctx: Context = [("title", "old")].into_iter().collect();
        let out = infer("title: str => 'new'", &ctx, false).unwrap();
        assert_eq!(out.get("title"), Some(&s("new")));
    }

    #[test]
    fn unknown_kind_is_skipped_when_lenient() {
        let out = infer("n: int => 5\nm: str => 'ok'", &Context::new(), false).unwrap();
        assert!(!out.contains("n"));
        assert_eq!(out.get("m"), Some(&s("ok")));
    }

    #[test]
    fn unknown_kind_is_an_error_when_strict() {
        let err = infer("n: int => 5", &Context::new(), true).unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
    }

    #[test]
    fn garbage_lines_lenient_and_strict() {
        let out = infer("this is not a declaration\nx: str => 'y'", &Context::new(), false).unwrap();
        assert_eq!(out.get("x"), Some(&s("y")));
        assert!(infer("this is not a declaration", &Context::new(), true).is_err());
    }

    #[test]
    fn strict_checks_declared_kind() {
        assert!(infer("x: list => 'not a list'", &Context::new(), false).is_ok());
        let err = infer("x: list => 'not a list'", &Context::new(), true).unwrap_err();
        assert!(matches!(err, CompileError::Evaluation(_)));
    }

    #[test]
    fn expression_errors_abort() {
        let err = infer("x: str => (", &Context::new(), false).unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
        let err = infer("x: str => missing_name", &Context::new(), false).unwrap_err();
        assert!(matches!(err, CompileError::Evaluation(_)));
    }

    #[test]
    fn blank_block_changes_nothing() {
        let ctx: Context = [("a", 1i64)].into_iter().collect();
        assert_eq!(infer("\n  \n", &ctx, true).unwrap(), ctx);
    }

    #[test]
    fn parse_bindings_captures_fields() {
        let b = parse_bindings("  nav :dict=>  'home': '/'  ", false).unwrap();
        assert_eq!(
            b,
            vec![Binding {
                name: "nav".into(),
                kind: Kind::Dict,
                expression: "'home': '/'".into()
            }]
        );
    }
}
