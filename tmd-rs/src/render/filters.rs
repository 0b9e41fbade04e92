//! Built-in template filters and HTML escaping.
//!
//! Values travel through a filter chain together with a "safe" flag: safe
//! text is emitted as-is, anything else is HTML-escaped on output.

use std::sync::OnceLock;

use regex::Regex;

use crate::markup::{linebreaks, linebreaksbr};
use crate::script::builtins::title_case;
use crate::script::Value;

/// Names of the built-in filters.
pub const BUILTIN_FILTERS: &[&str] = &[
    "upper",
    "lower",
    "title",
    "capfirst",
    "length",
    "default",
    "join",
    "first",
    "last",
    "safe",
    "escape",
    "linebreaks",
    "linebreaksbr",
    "striptags",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTIN_FILTERS.contains(&name)
}

/// Escape `& < > " '` for HTML.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*?>").expect("tag regex"))
}

pub fn strip_tags(s: &str) -> String {
    tag_re().replace_all(s, "").into_owned()
}

fn text(v: &Value, safe: bool) -> String {
    if safe {
        v.to_string()
    } else {
        escape_html(&v.to_string())
    }
}

/// Apply a built-in filter.  Returns `None` if `name` is not built in.
pub fn apply(
    name: &str,
    value: Value,
    safe: bool,
    arg: Option<Value>,
) -> Option<Result<(Value, bool), String>> {
    let out = match name {
        "upper" => (Value::Str(value.to_string().to_uppercase()), safe),
        "lower" => (Value::Str(value.to_string().to_lowercase()), safe),
        "title" => (Value::Str(title_case(&value.to_string())), safe),
        "capfirst" => {
            let s = value.to_string();
            let mut chars = s.chars();
            let capped = match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            (Value::Str(capped), safe)
        }
        "length" => {
            let n = match &value {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Dict(pairs) => pairs.len(),
                _ => 0,
            };
            (Value::Int(n as i64), true)
        }
        "default" => {
            let Some(arg) = arg else {
                return Some(Err("default requires 2 arguments, 1 provided".into()));
            };
            if value.truthy() {
                (value, safe)
            } else {
                (arg, true)
            }
        }
        "join" => {
            let Value::List(items) = &value else {
                return Some(Ok((value, safe)));
            };
            let sep = arg.map(|a| a.to_string()).unwrap_or_default();
            let parts: Vec<String> = items.iter().map(|v| text(v, safe)).collect();
            (Value::Str(parts.join(&escape_html(&sep))), true)
        }
        "first" | "last" => {
            let picked = match &value {
                Value::List(items) if name == "first" => items.first().cloned(),
                Value::List(items) => items.last().cloned(),
                Value::Str(s) if name == "first" => s.chars().next().map(|c| c.to_string().into()),
                Value::Str(s) => s.chars().last().map(|c| c.to_string().into()),
                _ => None,
            };
            (picked.unwrap_or_else(|| Value::from("")), safe)
        }
        "safe" => (value, true),
        "escape" => (Value::Str(text(&value, safe)), true),
        "linebreaks" => (Value::Str(linebreaks(&text(&value, safe))), true),
        "linebreaksbr" => (Value::Str(linebreaksbr(&text(&value, safe))), true),
        "striptags" => (Value::Str(strip_tags(&value.to_string())), safe),
        _ => return None,
    };
    Some(Ok(out))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(name: &str, v: Value, arg: Option<Value>) -> (Value, bool) {
        apply(name, v, false, arg).expect("builtin").expect("filter failed")
    }

    #[test]
    fn every_listed_filter_is_handled() {
        for name in BUILTIN_FILTERS {
            assert!(apply(name, Value::from("x"), false, Some(Value::from("y"))).is_some(), "{name}");
        }
        assert!(apply("nope", Value::None, false, None).is_none());
    }

    #[test]
    fn case_filters() {
        assert_eq!(run("upper", "ab".into(), None).0, Value::from("AB"));
        assert_eq!(run("title", "hello there".into(), None).0, Value::from("Hello There"));
        assert_eq!(run("capfirst", "hello".into(), None).0, Value::from("Hello"));
    }

    #[test]
    fn length_and_default() {
        assert_eq!(run("length", Value::List(vec![Value::None; 3]), None).0, Value::Int(3));
        assert_eq!(run("default", "".into(), Some("x".into())).0, Value::from("x"));
        assert_eq!(run("default", "v".into(), Some("x".into())).0, Value::from("v"));
        assert!(apply("default", Value::None, false, None).unwrap().is_err());
    }

    #[test]
    fn join_escapes_items() {
        let items = Value::List(vec!["<a>".into(), "b".into()]);
        let (v, safe) = run("join", items, Some(", ".into()));
        assert_eq!(v, Value::from("&lt;a&gt;, b"));
        assert!(safe);
    }

    #[test]
    fn first_and_last() {
        let items = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(run("first", items.clone(), None).0, Value::Int(1));
        assert_eq!(run("last", items, None).0, Value::Int(2));
        assert_eq!(run("last", "abc".into(), None).0, Value::from("c"));
        assert_eq!(run("first", Value::List(vec![]), None).0, Value::from(""));
    }

    #[test]
    fn safety_flags() {
        assert!(run("safe", "<b>".into(), None).1);
        assert_eq!(run("escape", "<b>".into(), None).0, Value::from("&lt;b&gt;"));
        assert_eq!(
            run("linebreaks", "a<b\n\nc".into(), None).0,
            Value::from("<p>a&lt;b</p>\n\n<p>c</p>")
        );
        let (v, safe) = apply("linebreaksbr", "<i>\n".into(), true, None).unwrap().unwrap();
        assert_eq!(v, Value::from("<i><br>"));
        assert!(safe);
    }

    #[test]
    fn striptags_removes_markup() {
        assert_eq!(strip_tags("<p>Hi <b>there</b></p>"), "Hi there");
    }

    #[test]
    fn escape_html_covers_quotes() {
        assert_eq!(escape_html(r#"<'&">"#), "&lt;&#x27;&amp;&quot;&gt;");
    }
}
