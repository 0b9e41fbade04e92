//! Filter compilation and the filter registry.
//!
//! A `-[filters]` line `name(x[, y]) <= expression` becomes a sandbox
//! function `def name(a, b=None): return expression'`, where `expression'`
//! has `x` renamed to `a` and `y` to `b`.  Compiled filters are registered
//! by name into a [`FilterRegistry`] that the renderer consults.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::error::CompileError;
use crate::script::expr::parse_expr;
use crate::script::{exec_fetch, Function, Value};

/// Stand-in second parameter when only one is declared.  Names beginning
/// with `__` cannot be written by authors, so nothing can refer to it.
const NO_SECOND_PARAM: &str = "___";

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name → compiled filter.  Registration overwrites.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: RwLock<HashMap<String, Arc<Function>>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a filter.
    pub fn register(&self, name: impl Into<String>, func: Arc<Function>) {
        let name = name.into();
        let mut map = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if map.insert(name.clone(), func).is_some() {
            debug!(name = %name, "filter replaced");
        } else {
            debug!(name = %name, "filter registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Function>> {
        self.filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sorted names of all registered filters.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .filters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.filters.write().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

// ── Declarations ──────────────────────────────────────────────────────────────

/// One parsed filter declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

fn filter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\w+)\s*\(\s*(\w+)\s*(?:,\s*(\w+)\s*)?\)\s*<=\s*(.+?)\s*$")
            .expect("filter regex")
    })
}

/// Parse a declaration line; `None` if it does not match the grammar.
pub fn parse_def(line: &str) -> Option<FilterDef> {
    let caps = filter_re().captures(line)?;
    let mut params = vec![caps[2].to_owned()];
    if let Some(second) = caps.get(3) {
        params.push(second.as_str().to_owned());
    }
    Some(FilterDef {
        name: caps[1].to_owned(),
        params,
        body: caps[4].to_owned(),
    })
}

impl FilterDef {
    /// The sandbox program defining this filter.
    ///
    /// Parameters are renamed on the parsed expression, so only free
    /// identifiers change (never substrings, strings, or method names).
    pub fn synthesize(&self) -> Result<String, CompileError> {
        let expr = parse_expr(&self.body)
            .map_err(|e| CompileError::Syntax(format!("filter '{}': {e}", self.name)))?;
        let second = self.params.get(1).map_or(NO_SECOND_PARAM, String::as_str);
        let renames = HashMap::from([(self.params[0].as_str(), "a"), (second, "b")]);
        let body = expr.rename_vars(&renames);
        Ok(format!("def {}(a, b=None): return {body}", self.name))
    }

    /// Compile to a callable.
    pub fn compile(&self) -> Result<Arc<Function>, CompileError> {
        if self.name.starts_with('_') {
            return Err(CompileError::ForbiddenName(self.name.clone()));
        }
        let src = self.synthesize()?;
        match exec_fetch(&src, &self.name)? {
            Value::Func(f) => Ok(f),
            other => Err(CompileError::Evaluation(format!(
                "filter '{}' compiled to {}, not a function",
                self.name,
                other.type_name()
            ))),
        }
    }
}

/// Compile every line of a filters block and register the results.
///
/// Returns the names registered, in declaration order.
pub fn compile_filters(
    lines: &[&str],
    registry: &FilterRegistry,
    strict: bool,
) -> Result<Vec<String>, CompileError> {
    let mut registered = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let Some(def) = parse_def(line) else {
            if strict {
                return Err(CompileError::Syntax(format!(
                    "filters line {}: expected 'name(param[, param]) <= expression'",
                    i + 1
                )));
            }
            warn!(line = i + 1, "skipping unrecognised filter declaration");
            continue;
        };
        let func = def.compile()?;
        registry.register(def.name.clone(), func);
        registered.push(def.name);
    }
    Ok(registered)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn compile_one(line: &str) -> Result<Arc<Function>, CompileError> {
        parse_def(line).expect("line should parse").compile()
    }

    #[test]
    fn parse_one_and_two_params() {
        let d = parse_def("shout(x) <= x.upper()").unwrap();
        assert_eq!(d.name, "shout");
        assert_eq!(d.params, vec!["x"]);
        assert_eq!(d.body, "x.upper()");

        let d = parse_def("  pad ( s , n ) <=  s + ' ' * n  ").unwrap();
        assert_eq!(d.params, vec!["s", "n"]);
        assert_eq!(d.body, "s + ' ' * n");
    }

    #[test]
    fn non_matching_lines() {
        assert!(parse_def("no arrow here").is_none());
        assert!(parse_def("f() <= 1").is_none());
        assert!(parse_def("f(a, b, c) <= a").is_none());
    }

    #[test]
    fn one_param_filter() {
        let f = compile_one("shout(x) <= x.upper() + '!'").unwrap();
        assert_eq!(f.call(vec![s("hi")]), Ok(s("HI!")));
    }

    #[test]
    fn two_param_filter() {
        let f = compile_one("wrap(text, tag) <= '<' + tag + '>' + text").unwrap();
        assert_eq!(f.call(vec![s("x"), s("b")]), Ok(s("<b>x")));
    }

    #[test]
    fn renaming_is_word_exact() {
        let d = parse_def("clip(x) <= x if len(x) < maxval else xs").unwrap();
        assert_eq!(
            d.synthesize().unwrap(),
            "def clip(a, b=None): return (a if (len(a) < maxval) else xs)"
        );
    }

    #[test]
    fn renaming_handles_parameters_named_a_and_b() {
        let f = compile_one("swap(b, a) <= a + b").unwrap();
        assert_eq!(f.call(vec![s("1"), s("2")]), Ok(s("21")));
    }

    #[test]
    fn string_contents_are_not_renamed() {
        let f = compile_one("label(x) <= 'x=' + x").unwrap();
        assert_eq!(f.call(vec![s("7")]), Ok(s("x=7")));
    }

    #[test]
    fn leading_underscore_is_forbidden() {
        let err = compile_one("_bad(x) <= x").unwrap_err();
        assert_eq!(err, CompileError::ForbiddenName("_bad".into()));
    }

    #[test]
    fn bad_body_is_a_syntax_failure() {
        let err = compile_one("f(x) <= x +").unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
    }

    #[test]
    fn compile_filters_registers_and_skips() {
        let reg = FilterRegistry::new();
        let names = compile_filters(
            &["up(x) <= x.upper()", "", "garbage", "low(x) <= x.lower()"],
            &reg,
            false,
        )
        .unwrap();
        assert_eq!(names, vec!["up", "low"]);
        assert_eq!(reg.names(), vec!["low", "up"]);
        assert!(compile_filters(&["garbage"], &reg, true).is_err());
    }

    #[test]
    fn forbidden_name_aborts_even_when_lenient() {
        let reg = FilterRegistry::new();
        let err = compile_filters(&["ok(x) <= x", "_no(x) <= x"], &reg, false).unwrap_err();
        assert!(matches!(err, CompileError::ForbiddenName(_)));
    }

    #[test]
    fn registration_overwrites() {
        let reg = FilterRegistry::new();
        compile_filters(&["f(x) <= 1"], &reg, false).unwrap();
        compile_filters(&["f(x) <= 2"], &reg, false).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("f").unwrap().call(vec![Value::None]), Ok(Value::Int(2)));
        reg.clear();
        assert!(reg.is_empty());
    }
}
