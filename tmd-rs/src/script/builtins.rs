//! Allow-listed functions and methods.
//!
//! Each function receives a `Vec<Value>` of already-evaluated arguments and
//! returns `Result<Value, String>`.  Anything not named here is unavailable
//! to sandboxed code: there is no file, process, network, or import surface.

use std::cmp::Ordering;

use super::value::{check_footprint, check_seq_len, check_str_len, dict_get, dict_insert, Value};

/// Dispatch a built-in function call.
///
/// Returns `None` if the function name is not a built-in (caller reports the
/// name as unknown).
pub fn call_builtin(name: &str, args: Vec<Value>) -> Option<Result<Value, String>> {
    // Ok(None) → not a builtin; `.transpose()` turns that into the outer shape.
    fn inner(name: &str, args: Vec<Value>) -> Result<Option<Value>, String> {
        Ok(Some(match name {
            // ── Conversions ──────────────────────────────────────────────────
            "str" | "repr" => {
                let empty = Value::Str(String::new());
                let v = if name == "repr" { get(&args, 0, name)? } else { args.first().unwrap_or(&empty) };
                check_footprint(v.footprint())?;
                let out = if name == "str" { v.to_string() } else { v.repr() };
                check_str_len(out.len())?;
                Value::Str(out)
            }
            "bool" => Value::Bool(args.first().is_some_and(Value::truthy)),
            "int" => match args.first() {
                None => Value::Int(0),
                Some(Value::Str(s)) => Value::Int(
                    s.trim()
                        .replace('_', "")
                        .parse()
                        .map_err(|_| format!("invalid literal for int(): {}", Value::Str(s.clone()).repr()))?,
                ),
                Some(Value::Float(x)) => {
                    if !x.is_finite() {
                        return Err("cannot convert float infinity or NaN to integer".into());
                    }
                    Value::Int(x.trunc() as i64)
                }
                Some(v) => Value::Int(
                    v.as_index()
                        .ok_or_else(|| format!("int() argument must be a string or a number, not '{}'", v.type_name()))?,
                ),
            },
            "float" => match args.first() {
                None => Value::Float(0.0),
                Some(Value::Str(s)) => Value::Float(
                    s.trim()
                        .parse()
                        .map_err(|_| format!("could not convert string to float: {}", Value::Str(s.clone()).repr()))?,
                ),
                Some(Value::Float(x)) => Value::Float(*x),
                Some(v) => Value::Float(
                    v.as_index()
                        .ok_or_else(|| format!("float() argument must be a string or a number, not '{}'", v.type_name()))?
                        as f64,
                ),
            },
            "list" => Value::List(match args.first() {
                None => Vec::new(),
                Some(v) => iter_values(v)?,
            }),
            "dict" => match args.first() {
                None => Value::Dict(Vec::new()),
                Some(Value::Dict(pairs)) => Value::Dict(pairs.clone()),
                Some(v) => {
                    let mut out = Vec::new();
                    for item in iter_values(v)? {
                        match item {
                            Value::List(kv) if kv.len() == 2 => {
                                let mut kv = kv.into_iter();
                                let (k, v) = (kv.next().unwrap_or_default(), kv.next().unwrap_or_default());
                                dict_insert(&mut out, k, v)?;
                            }
                            _ => return Err("dict() needs a sequence of [key, value] pairs".into()),
                        }
                    }
                    Value::Dict(out)
                }
            },

            // ── Sequences ────────────────────────────────────────────────────
            "len" => {
                let n = match get(&args, 0, name)? {
                    Value::Str(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Dict(pairs) => pairs.len(),
                    other => return Err(format!("object of type '{}' has no len()", other.type_name())),
                };
                Value::Int(n as i64)
            }
            "range" => {
                let ints: Vec<i64> = args
                    .iter()
                    .map(|v| v.as_index().ok_or_else(|| format!("'{}' object cannot be interpreted as an integer", v.type_name())))
                    .collect::<Result<_, _>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => return Err(format!("range expected 1 to 3 arguments, got {}", ints.len())),
                };
                if step == 0 {
                    return Err("range() arg 3 must not be zero".into());
                }
                let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
                let span = if step > 0 { stop - start } else { start - stop };
                let count = if span <= 0 { 0 } else { (span - 1) / step.abs() + 1 };
                check_seq_len(usize::try_from(count).unwrap_or(usize::MAX))?;
                // Every element lies between start and stop, so it fits in an i64.
                Value::List((0..count).map(|i| Value::Int((start + i * step) as i64)).collect())
            }
            "sorted" => {
                let mut items = iter_values(get(&args, 0, name)?)?;
                sort_values(&mut items)?;
                if args.get(1).is_some_and(Value::truthy) {
                    items.reverse();
                }
                Value::List(items)
            }
            "reversed" => {
                let mut items = iter_values(get(&args, 0, name)?)?;
                items.reverse();
                Value::List(items)
            }
            "enumerate" => {
                let start = args.get(1).and_then(Value::as_index).unwrap_or(0);
                let items = iter_values(get(&args, 0, name)?)?;
                Value::List(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::List(vec![Value::Int(start + i as i64), v]))
                        .collect(),
                )
            }
            "zip" => {
                let seqs: Vec<Vec<Value>> = args.iter().map(iter_values).collect::<Result<_, _>>()?;
                let n = seqs.iter().map(Vec::len).min().unwrap_or(0);
                Value::List(
                    (0..n)
                        .map(|i| Value::List(seqs.iter().map(|s| s[i].clone()).collect()))
                        .collect(),
                )
            }
            "any" => Value::Bool(iter_values(get(&args, 0, name)?)?.iter().any(Value::truthy)),
            "all" => Value::Bool(iter_values(get(&args, 0, name)?)?.iter().all(Value::truthy)),

            // ── Numbers ──────────────────────────────────────────────────────
            "abs" => match get(&args, 0, name)? {
                Value::Float(x) => Value::Float(x.abs()),
                v => {
                    let n = v
                        .as_index()
                        .ok_or_else(|| format!("bad operand type for abs(): '{}'", v.type_name()))?;
                    Value::Int(n.checked_abs().ok_or("integer overflow")?)
                }
            },
            "min" | "max" => {
                let items = if args.len() == 1 { iter_values(&args[0])? } else { args };
                let mut it = items.into_iter();
                let mut best = it
                    .next()
                    .ok_or_else(|| format!("{name}() arg is an empty sequence"))?;
                let want = if name == "min" { Ordering::Less } else { Ordering::Greater };
                for v in it {
                    if v.py_cmp(&best)? == want {
                        best = v;
                    }
                }
                best
            }
            "sum" => {
                let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
                for v in iter_values(get(&args, 0, name)?)? {
                    total = total.add(&v)?;
                }
                total
            }
            "round" => {
                let v = get(&args, 0, name)?;
                let x = match v {
                    Value::Float(x) => *x,
                    other => {
                        let n = other
                            .as_index()
                            .ok_or_else(|| format!("type {} doesn't define __round__", other.type_name()))?;
                        if args.len() < 2 {
                            return Ok(Some(Value::Int(n)));
                        }
                        n as f64
                    }
                };
                match args.get(1).and_then(Value::as_index) {
                    None => {
                        if !x.is_finite() {
                            return Err("cannot convert float infinity or NaN to integer".into());
                        }
                        Value::Int(x.round_ties_even() as i64)
                    }
                    Some(digits) => {
                        let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
                        Value::Float((x * scale).round_ties_even() / scale)
                    }
                }
            }

            _ => return Ok(None),
        }))
    }
    inner(name, args).transpose()
}

/// Dispatch a method call on a receiver value.
pub fn call_method(recv: &Value, name: &str, args: Vec<Value>) -> Result<Value, String> {
    match recv {
        Value::Str(s) => str_method(s, name, &args),
        Value::List(items) => match name {
            "index" => {
                let needle = get(&args, 0, name)?;
                items
                    .iter()
                    .position(|v| v.py_eq(needle))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| format!("{} is not in list", needle.repr()))
            }
            "count" => {
                let needle = get(&args, 0, name)?;
                Ok(Value::Int(items.iter().filter(|v| v.py_eq(needle)).count() as i64))
            }
            _ => Err(no_method(recv, name)),
        },
        Value::Dict(pairs) => match name {
            "get" => {
                let key = get(&args, 0, name)?;
                Ok(dict_get(pairs, key)
                    .cloned()
                    .unwrap_or_else(|| args.get(1).cloned().unwrap_or_default()))
            }
            "keys" => Ok(Value::List(pairs.iter().map(|(k, _)| k.clone()).collect())),
            "values" => Ok(Value::List(pairs.iter().map(|(_, v)| v.clone()).collect())),
            "items" => Ok(Value::List(
                pairs
                    .iter()
                    .map(|(k, v)| Value::List(vec![k.clone(), v.clone()]))
                    .collect(),
            )),
            _ => Err(no_method(recv, name)),
        },
        _ => Err(no_method(recv, name)),
    }
}

fn str_method(s: &str, name: &str, args: &[Value]) -> Result<Value, String> {
    let out = match name {
        "upper" => s.to_uppercase(),
        "lower" => s.to_lowercase(),
        "title" => title_case(s),
        "capitalize" => {
            let mut chars = s.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }
        }
        "strip" | "lstrip" | "rstrip" => {
            let set = match args.first() {
                None | Some(Value::None) => None,
                Some(v) => Some(get_str(v, name)?.to_owned()),
            };
            let pred = |c: char| match &set {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            match name {
                "strip" => s.trim_matches(pred),
                "lstrip" => s.trim_start_matches(pred),
                _ => s.trim_end_matches(pred),
            }
            .to_owned()
        }
        "replace" => {
            let from = get_str(get(args, 0, name)?, name)?;
            let to = get_str(get(args, 1, name)?, name)?;
            let hits = s.matches(from).count();
            check_str_len(
                (s.len() - hits * from.len()).saturating_add(hits.saturating_mul(to.len())),
            )?;
            s.replace(from, to)
        }
        "zfill" => {
            let width = get(args, 0, name)?.as_index().unwrap_or(0).max(0) as usize;
            check_str_len(width)?;
            let len = s.chars().count();
            if len >= width {
                s.to_owned()
            } else {
                let (sign, digits) = match s.strip_prefix(['-', '+']) {
                    Some(rest) => (&s[..1], rest),
                    None => ("", s),
                };
                format!("{sign}{}{digits}", "0".repeat(width - len))
            }
        }
        "join" => {
            let mut parts = Vec::new();
            let mut total = 0usize;
            for v in iter_values(get(args, 0, name)?)? {
                match v {
                    Value::Str(p) => {
                        total = total.saturating_add(p.len());
                        if !parts.is_empty() {
                            total = total.saturating_add(s.len());
                        }
                        check_str_len(total)?;
                        parts.push(p);
                    }
                    other => {
                        return Err(format!(
                            "sequence item: expected str instance, {} found",
                            other.type_name()
                        ))
                    }
                }
            }
            parts.join(s)
        }
        "format" => format_positional(s, args)?,

        // Non-string results.
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => {
                    check_seq_len(s.split_whitespace().count())?;
                    s.split_whitespace().map(Value::from).collect()
                }
                Some(v) => {
                    let sep = get_str(v, name)?;
                    if sep.is_empty() {
                        return Err("empty separator".into());
                    }
                    check_seq_len(s.matches(sep).count().saturating_add(1))?;
                    s.split(sep).map(Value::from).collect()
                }
            };
            return Ok(Value::List(parts));
        }
        "splitlines" => {
            check_seq_len(s.lines().count())?;
            return Ok(Value::List(s.lines().map(Value::from).collect()));
        }
        "startswith" => return Ok(Value::Bool(s.starts_with(get_str(get(args, 0, name)?, name)?))),
        "endswith" => return Ok(Value::Bool(s.ends_with(get_str(get(args, 0, name)?, name)?))),
        "find" => {
            let needle = get_str(get(args, 0, name)?, name)?;
            return Ok(Value::Int(
                s.find(needle)
                    .map_or(-1, |byte| s[..byte].chars().count() as i64),
            ));
        }
        "count" => {
            let needle = get_str(get(args, 0, name)?, name)?;
            let n = if needle.is_empty() { s.chars().count() + 1 } else { s.matches(needle).count() };
            return Ok(Value::Int(n as i64));
        }
        "isdigit" => return Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))),
        "isalpha" => return Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        _ => return Err(no_method(&Value::Str(s.to_owned()), name)),
    };
    Ok(Value::Str(out))
}

/// `str.format` with `{}` / `{N}` fields and `{{` `}}` escapes.
fn format_positional(template: &str, args: &[Value]) -> Result<String, String> {
    let mut out = String::new();
    let mut next_auto = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err("single '{' encountered in format string".into()),
                    }
                }
                let idx = if field.is_empty() {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    field
                        .parse::<usize>()
                        .map_err(|_| format!("unsupported format field '{{{field}}}'"))?
                };
                let v = args
                    .get(idx)
                    .ok_or_else(|| format!("format index {idx} out of range"))?;
                let field = v.to_string();
                check_str_len(out.len().saturating_add(field.len()))?;
                out.push_str(&field);
            }
            '}' => return Err("single '}' encountered in format string".into()),
            c => out.push(c),
        }
    }
    Ok(out)
}

/// Title case: uppercase after any non-letter.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = true;
        } else {
            out.push(c);
            prev_letter = false;
        }
    }
    out
}

/// Expand an iterable into its items: list items, string characters, dict keys.
pub fn iter_values(v: &Value) -> Result<Vec<Value>, String> {
    match v {
        Value::List(items) => Ok(items.clone()),
        Value::Str(s) => {
            check_seq_len(s.chars().count())?;
            Ok(s.chars().map(|c| Value::Str(c.to_string())).collect())
        }
        Value::Dict(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
        other => Err(format!("'{}' object is not iterable", other.type_name())),
    }
}

fn sort_values(items: &mut [Value]) -> Result<(), String> {
    let mut err = None;
    items.sort_by(|a, b| {
        a.py_cmp(b).unwrap_or_else(|e| {
            err.get_or_insert(e);
            Ordering::Equal
        })
    });
    err.map_or(Ok(()), Err)
}

fn no_method(recv: &Value, name: &str) -> String {
    format!("'{}' object has no allowed method '{name}'", recv.type_name())
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn get<'a>(args: &'a [Value], idx: usize, name: &str) -> Result<&'a Value, String> {
    args.get(idx)
        .ok_or_else(|| format!("{name}: argument {idx} missing"))
}

fn get_str<'a>(v: &'a Value, name: &str) -> Result<&'a str, String> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(format!("{name}: expected str, got {}", other.type_name())),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
