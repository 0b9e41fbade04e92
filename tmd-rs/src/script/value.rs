//! Runtime value type for the sandbox expression language.
//!
//! Values cover the small data model authors use in
//! `-[context]` and `-[filters]` blocks: `None`, booleans, integers, floats,
//! strings, lists, insertion-ordered dicts, and compiled filter functions.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::expr::Expr;

/// Longest list (or `range`) a snippet may build.
pub const MAX_SEQUENCE_LEN: usize = 100_000;

/// Longest string (in bytes) a snippet may build.
pub const MAX_STR_BYTES: usize = 1 << 20;

/// Largest [`Value::footprint`] a single list or dict may reach.
pub const MAX_VALUE_BYTES: usize = 16 << 20;

// ── Function ──────────────────────────────────────────────────────────────────

/// A single-expression function produced by a `def` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Expr,
}

/// A declared parameter; `default` was evaluated when the `def` ran.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// A sandbox runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// Insertion-ordered; keys are unique under [`Value::py_eq`].
    Dict(Vec<(Value, Value)>),
    Func(Arc<Function>),
}

/// Numeric view of a value (`bool` counts as an integer).
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }
}

fn fmt_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_owned()
    } else if x.is_infinite() {
        if x > 0.0 { "inf".to_owned() } else { "-inf".to_owned() }
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.repr()),
        }
    }
}

impl Value {
    /// Source-form rendering: strings are quoted, containers show their items' reprs.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".to_owned(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => fmt_float(*x),
            Value::Str(s) => repr_str(s),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Dict(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Func(func) => format!("<function {}>", func.name),
        }
    }

    /// Upper bound on the length of [`Value::repr`], computed without
    /// building it.  Also stands in for the memory a value holds.
    pub fn footprint(&self) -> usize {
        match self {
            Value::None | Value::Bool(_) => 5,
            Value::Int(_) => 20,
            Value::Float(_) => 24,
            Value::Str(s) => s.len().saturating_mul(2).saturating_add(2),
            Value::List(items) => items
                .iter()
                .fold(2usize, |acc, v| acc.saturating_add(v.footprint()).saturating_add(2)),
            Value::Dict(pairs) => pairs.iter().fold(2usize, |acc, (k, v)| {
                acc.saturating_add(k.footprint())
                    .saturating_add(v.footprint())
                    .saturating_add(4)
            }),
            Value::Func(func) => func.name.len().saturating_add(12),
        }
    }

    /// Truthiness: zero, empty, `None` and `False` are false.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
            Value::Func(_) => true,
        }
    }

    /// Name of the type, as shown in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Func(_) => "function",
        }
    }

    fn num(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(x) => Some(Num::Float(*x)),
            _ => None,
        }
    }

    /// Integer view, used for indices and counts.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_hashable(&self) -> bool {
        matches!(
            self,
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    // ── Equality and ordering ─────────────────────────────────────────────────

    /// Equality: numbers compare across int/float/bool, containers deeply.
    pub fn py_eq(&self, rhs: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.num(), rhs.num()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => x == y,
                _ => a.as_f64() == b.as_f64(),
            };
        }
        match (self, rhs) {
            (Value::None, Value::None) => true,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.py_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| dict_get(b, k).is_some_and(|w| v.py_eq(w)))
            }
            (Value::Func(a), Value::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Ordering (`<`, `<=`, …); mixed types are a `TypeError`.
    pub fn py_cmp(&self, rhs: &Value) -> Result<Ordering, String> {
        if let (Some(a), Some(b)) = (self.num(), rhs.num()) {
            return Ok(match (a, b) {
                (Num::Int(x), Num::Int(y)) => x.cmp(&y),
                _ => a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(Ordering::Equal),
            });
        }
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.py_eq(y) {
                        return x.py_cmp(y);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(format!(
                "'<' not supported between instances of '{}' and '{}'",
                self.type_name(),
                rhs.type_name()
            )),
        }
    }

    /// Membership (`in`) with `self` as the container.
    pub fn contains(&self, item: &Value) -> Result<bool, String> {
        match (self, item) {
            (Value::Str(hay), Value::Str(needle)) => Ok(hay.contains(needle.as_str())),
            (Value::Str(_), other) => Err(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            )),
            (Value::List(items), _) => Ok(items.iter().any(|v| v.py_eq(item))),
            (Value::Dict(pairs), _) => Ok(dict_get(pairs, item).is_some()),
            _ => Err(format!(
                "argument of type '{}' is not iterable",
                self.type_name()
            )),
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    fn type_error(op: &str, a: &Value, b: &Value) -> String {
        format!(
            "unsupported operand type(s) for {op}: '{}' and '{}'",
            a.type_name(),
            b.type_name()
        )
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, String> {
        if let (Some(a), Some(b)) = (self.num(), rhs.num()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => x
                    .checked_add(y)
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow".to_owned()),
                _ => Ok(Value::Float(a.as_f64() + b.as_f64())),
            };
        }
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => {
                check_str_len(a.len() + b.len())?;
                Ok(Value::Str(format!("{a}{b}")))
            }
            (Value::List(a), Value::List(b)) => {
                check_seq_len(a.len() + b.len())?;
                check_footprint(self.footprint().saturating_add(rhs.footprint()))?;
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            _ => Err(Self::type_error("+", self, rhs)),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, String> {
        match (self.num(), rhs.num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x
                .checked_sub(y)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned()),
            (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() - b.as_f64())),
            _ => Err(Self::type_error("-", self, rhs)),
        }
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, String> {
        match (self, rhs) {
            (Value::Str(s), n) | (n, Value::Str(s)) if n.as_index().is_some() => {
                let count = n.as_index().unwrap_or(0).max(0) as usize;
                check_str_len(s.len().saturating_mul(count))?;
                return Ok(Value::Str(s.repeat(count)));
            }
            (Value::List(items), n) | (n, Value::List(items)) if n.as_index().is_some() => {
                let count = n.as_index().unwrap_or(0).max(0) as usize;
                check_seq_len(items.len().saturating_mul(count))?;
                let each: usize = items.iter().fold(0, |acc, v| acc.saturating_add(v.footprint()));
                check_footprint(each.saturating_mul(count))?;
                let mut out = Vec::with_capacity(items.len() * count);
                for _ in 0..count {
                    out.extend(items.iter().cloned());
                }
                return Ok(Value::List(out));
            }
            _ => {}
        }
        match (self.num(), rhs.num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x
                .checked_mul(y)
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned()),
            (Some(a), Some(b)) => Ok(Value::Float(a.as_f64() * b.as_f64())),
            _ => Err(Self::type_error("*", self, rhs)),
        }
    }

    /// True division (`/`): always produces a float.
    pub fn div(&self, rhs: &Value) -> Result<Value, String> {
        match (self.num(), rhs.num()) {
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    return Err("division by zero".into());
                }
                Ok(Value::Float(a.as_f64() / b.as_f64()))
            }
            _ => Err(Self::type_error("/", self, rhs)),
        }
    }

    /// Floor division (`//`).
    pub fn floor_div(&self, rhs: &Value) -> Result<Value, String> {
        match (self.num(), rhs.num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => {
                if y == 0 {
                    return Err("integer division or modulo by zero".into());
                }
                let q = x.checked_div(y).ok_or_else(|| "integer overflow".to_owned())?;
                Ok(Value::Int(if x % y != 0 && ((x < 0) != (y < 0)) { q - 1 } else { q }))
            }
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    return Err("float floor division by zero".into());
                }
                Ok(Value::Float((a.as_f64() / b.as_f64()).floor()))
            }
            _ => Err(Self::type_error("//", self, rhs)),
        }
    }

    /// Modulo (`%`): the result takes the sign of the divisor.
    pub fn rem(&self, rhs: &Value) -> Result<Value, String> {
        match (self.num(), rhs.num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => {
                if y == 0 {
                    return Err("integer division or modulo by zero".into());
                }
                let r = x.checked_rem(y).ok_or_else(|| "integer overflow".to_owned())?;
                Ok(Value::Int(if r != 0 && ((r < 0) != (y < 0)) { r + y } else { r }))
            }
            (Some(a), Some(b)) => {
                let (x, y) = (a.as_f64(), b.as_f64());
                if y == 0.0 {
                    return Err("float modulo".into());
                }
                let r = x % y;
                Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (y < 0.0)) { r + y } else { r }))
            }
            _ => Err(Self::type_error("%", self, rhs)),
        }
    }

    pub fn pow(&self, rhs: &Value) -> Result<Value, String> {
        match (self.num(), rhs.num()) {
            (Some(Num::Int(x)), Some(Num::Int(y))) if y >= 0 => {
                let exp = u32::try_from(y).map_err(|_| "integer overflow".to_owned())?;
                x.checked_pow(exp)
                    .map(Value::Int)
                    .ok_or_else(|| "integer overflow".to_owned())
            }
            (Some(a), Some(b)) => {
                if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                    return Err("0.0 cannot be raised to a negative power".into());
                }
                Ok(Value::Float(a.as_f64().powf(b.as_f64())))
            }
            _ => Err(Self::type_error("**", self, rhs)),
        }
    }

    pub fn neg(&self) -> Result<Value, String> {
        match self.num() {
            Some(Num::Int(n)) => n
                .checked_neg()
                .map(Value::Int)
                .ok_or_else(|| "integer overflow".to_owned()),
            Some(Num::Float(x)) => Ok(Value::Float(-x)),
            None => Err(format!("bad operand type for unary -: '{}'", self.type_name())),
        }
    }

    pub fn pos(&self) -> Result<Value, String> {
        match self.num() {
            Some(Num::Int(n)) => Ok(Value::Int(n)),
            Some(Num::Float(x)) => Ok(Value::Float(x)),
            None => Err(format!("bad operand type for unary +: '{}'", self.type_name())),
        }
    }

    // ── Subscripts ────────────────────────────────────────────────────────────

    /// `self[idx]`.
    pub fn index(&self, idx: &Value) -> Result<Value, String> {
        match self {
            Value::List(items) => {
                let i = seq_index(items.len(), idx, "list")?;
                Ok(items[i].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let i = seq_index(chars.len(), idx, "string")?;
                Ok(Value::Str(chars[i].to_string()))
            }
            Value::Dict(pairs) => dict_get(pairs, idx)
                .cloned()
                .ok_or_else(|| format!("KeyError: {}", idx.repr())),
            other => Err(format!("'{}' object is not subscriptable", other.type_name())),
        }
    }

    /// `self[start:stop:step]`.
    pub fn slice(
        &self,
        start: Option<i64>,
        stop: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, String> {
        let step = step.unwrap_or(1);
        if step == 0 {
            return Err("slice step cannot be zero".into());
        }
        match self {
            Value::List(items) => {
                let picked = slice_indices(items.len(), start, stop, step);
                Ok(Value::List(picked.into_iter().map(|i| items[i].clone()).collect()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked = slice_indices(chars.len(), start, stop, step);
                Ok(Value::Str(picked.into_iter().map(|i| chars[i]).collect()))
            }
            other => Err(format!("'{}' object is not subscriptable", other.type_name())),
        }
    }
}

// ── Sequence helpers ──────────────────────────────────────────────────────────

fn seq_index(len: usize, idx: &Value, what: &str) -> Result<usize, String> {
    let i = idx
        .as_index()
        .ok_or_else(|| format!("{what} indices must be integers, not {}", idx.type_name()))?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(format!("{what} index out of range"));
    }
    Ok(resolved as usize)
}

/// Indices selected by a `start:stop:step` slice over a sequence of `len` items.
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let clamp = |v: i64, lo: i64, hi: i64| -> i64 {
        let v = if v < 0 { v + len } else { v };
        v.clamp(lo, hi)
    };
    let mut out = Vec::new();
    if step > 0 {
        let mut i = start.map_or(0, |s| clamp(s, 0, len));
        let end = stop.map_or(len, |s| clamp(s, 0, len));
        while i < end {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    } else {
        let mut i = start.map_or(len - 1, |s| clamp(s, -1, len - 1));
        let end = stop.map_or(-1, |s| clamp(s, -1, len - 1));
        while i > end {
            out.push(i as usize);
            match i.checked_add(step) {
                Some(next) => i = next,
                None => break,
            }
        }
    }
    out
}

pub(crate) fn check_seq_len(n: usize) -> Result<(), String> {
    if n > MAX_SEQUENCE_LEN {
        return Err(format!("sequence too long ({n} items, limit {MAX_SEQUENCE_LEN})"));
    }
    Ok(())
}

pub(crate) fn check_footprint(n: usize) -> Result<(), String> {
    if n > MAX_VALUE_BYTES {
        return Err(format!("value too large (~{n} bytes, limit {MAX_VALUE_BYTES})"));
    }
    Ok(())
}

pub(crate) fn check_str_len(n: usize) -> Result<(), String> {
    if n > MAX_STR_BYTES {
        return Err(format!("string too long ({n} bytes, limit {MAX_STR_BYTES})"));
    }
    Ok(())
}

// ── Dict helpers ──────────────────────────────────────────────────────────────

/// Look up `key` in an ordered dict.
pub fn dict_get<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k.py_eq(key)).map(|(_, v)| v)
}

/// Insert or replace `key`, keeping the original position on replace.
pub fn dict_insert(pairs: &mut Vec<(Value, Value)>, key: Value, value: Value) -> Result<(), String> {
    if !key.is_hashable() {
        return Err(format!("unhashable type: '{}'", key.type_name()));
    }
    match pairs.iter_mut().find(|(k, _)| k.py_eq(&key)) {
        Some(slot) => slot.1 = value,
        None => pairs.push((key, value)),
    }
    Ok(())
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_owned())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::Str(v.into())
    }

    #[test]
    fn display_is_the_plain_string_form() {
        assert_eq!(Value::Int(42).to_string(), "42");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(2.5).to_string(), "2.5");
        assert_eq!(Value::None.to_string(), "None");
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(s("hello").to_string(), "hello");
        assert_eq!(
            Value::List(vec![Value::Int(1), s("a")]).to_string(),
            "[1, 'a']"
        );
        assert_eq!(
            Value::Dict(vec![(s("k"), Value::Int(2))]).to_string(),
            "{'k': 2}"
        );
    }

    #[test]
    fn repr_picks_quote() {
        assert_eq!(s("it's").repr(), "\"it's\"");
        assert_eq!(s("plain").repr(), "'plain'");
    }

    #[test]
    fn truthiness() {
        assert!(!Value::None.truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!s("").truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(s("0").truthy());
        assert!(Value::Float(0.5).truthy());
    }

    #[test]
    fn numeric_equality_crosses_types() {
        assert!(Value::Int(1).py_eq(&Value::Float(1.0)));
        assert!(Value::Bool(true).py_eq(&Value::Int(1)));
        assert!(!Value::Int(1).py_eq(&s("1")));
    }

    #[test]
    fn arithmetic() {
        let a = Value::Int(7);
        let b = Value::Int(2);
        assert_eq!(a.add(&b), Ok(Value::Int(9)));
        assert_eq!(a.sub(&b), Ok(Value::Int(5)));
        assert_eq!(a.mul(&b), Ok(Value::Int(14)));
        assert_eq!(a.div(&b), Ok(Value::Float(3.5)));
        assert_eq!(a.floor_div(&b), Ok(Value::Int(3)));
        assert_eq!(a.pow(&b), Ok(Value::Int(49)));
    }

    #[test]
    fn modulo_follows_divisor_sign() {
        assert_eq!(Value::Int(-7).rem(&Value::Int(3)), Ok(Value::Int(2)));
        assert_eq!(Value::Int(7).rem(&Value::Int(-3)), Ok(Value::Int(-2)));
        assert_eq!(Value::Int(-7).floor_div(&Value::Int(2)), Ok(Value::Int(-4)));
    }

    #[test]
    fn division_by_zero() {
        assert!(Value::Int(1).div(&Value::Int(0)).is_err());
        assert!(Value::Int(1).floor_div(&Value::Int(0)).is_err());
        assert!(Value::Int(1).rem(&Value::Int(0)).is_err());
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(Value::Int(i64::MAX).add(&Value::Int(1)).is_err());
        assert!(Value::Int(2).pow(&Value::Int(100)).is_err());
    }

    #[test]
    fn string_and_list_operators() {
        assert_eq!(s("ab").add(&s("cd")), Ok(s("abcd")));
        assert_eq!(s("ab").mul(&Value::Int(3)), Ok(s("ababab")));
        assert_eq!(Value::Int(2).mul(&s("x")), Ok(s("xx")));
        assert_eq!(
            Value::List(vec![Value::Int(1)]).add(&Value::List(vec![Value::Int(2)])),
            Ok(Value::List(vec![Value::Int(1), Value::Int(2)]))
        );
        assert!(s("a").add(&Value::Int(1)).is_err());
    }

    #[test]
    fn repetition_is_capped() {
        assert!(s("x").mul(&Value::Int((MAX_STR_BYTES + 1) as i64)).is_err());
        assert!(Value::List(vec![Value::None])
            .mul(&Value::Int((MAX_SEQUENCE_LEN + 1) as i64))
            .is_err());
    }

    #[test]
    fn nested_copies_are_bounded_by_footprint() {
        let big = Value::List(vec![s(&"x".repeat(MAX_STR_BYTES))]);
        assert!(big.mul(&Value::Int(1000)).is_err());
        let half = big.mul(&Value::Int(4)).unwrap();
        assert!(half.add(&half).is_err());
        assert!(Value::List(vec![Value::Int(0); 1000]).footprint() < 30_000);
    }

    #[test]
    fn huge_slice_steps_stop_at_the_end() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            list.slice(Some(1), None, Some(i64::MAX)),
            Ok(Value::List(vec![Value::Int(2)]))
        );
        assert_eq!(
            list.slice(Some(-1), None, Some(i64::MIN)),
            Ok(Value::List(vec![Value::Int(3)]))
        );
        assert_eq!(s("abc").slice(None, None, Some(i64::MAX - 1)), Ok(s("a")));
    }

    #[test]
    fn indexing_and_slicing() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(list.index(&Value::Int(-1)), Ok(Value::Int(3)));
        assert!(list.index(&Value::Int(3)).is_err());
        assert_eq!(
            list.slice(Some(1), None, None),
            Ok(Value::List(vec![Value::Int(2), Value::Int(3)]))
        );
        assert_eq!(s("hello").slice(None, None, Some(-1)), Ok(s("olleh")));
        assert_eq!(s("hello").slice(Some(1), Some(-1), None), Ok(s("ell")));
    }

    #[test]
    fn dict_lookup_and_insert() {
        let mut pairs = Vec::new();
        dict_insert(&mut pairs, s("a"), Value::Int(1)).unwrap();
        dict_insert(&mut pairs, s("b"), Value::Int(2)).unwrap();
        dict_insert(&mut pairs, s("a"), Value::Int(3)).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(dict_get(&pairs, &s("a")), Some(&Value::Int(3)));
        assert!(dict_insert(&mut pairs, Value::List(vec![]), Value::None).is_err());
    }

    #[test]
    fn membership() {
        assert_eq!(s("hello").contains(&s("ell")), Ok(true));
        let list = Value::List(vec![Value::Int(1)]);
        assert_eq!(list.contains(&Value::Float(1.0)), Ok(true));
        assert!(Value::Int(1).contains(&Value::Int(1)).is_err());
    }

    #[test]
    fn ordering() {
        assert_eq!(Value::Int(1).py_cmp(&Value::Float(1.5)), Ok(Ordering::Less));
        assert_eq!(s("b").py_cmp(&s("a")), Ok(Ordering::Greater));
        assert!(s("a").py_cmp(&Value::Int(1)).is_err());
    }
}
