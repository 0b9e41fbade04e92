//! Expression sandbox entry points.
//!
//! A [`Sandbox`] runs a parsed program over its own local bindings, with an
//! optional read-only outer scope.  Lookups see locals first, then the outer
//! scope, then the allow-listed built-ins; nothing is ever written back to
//! the outer scope.

use std::collections::HashMap;

use tracing::trace;

use super::expr::{eval_expr, make_function, EvalContext};
use super::stmt::{parse_program, Stmt};
use super::value::{Param, Value};
use crate::error::SandboxError;
use crate::var::Context;

// ── Sandbox ───────────────────────────────────────────────────────────────────

struct Sandbox<'a> {
    outer: Option<&'a Context>,
    locals: HashMap<String, Value>,
    /// Binding order, so harvesting is deterministic.
    order: Vec<String>,
}

impl<'a> Sandbox<'a> {
    fn new(outer: Option<&'a Context>) -> Self {
        Sandbox {
            outer,
            locals: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn bind(&mut self, name: String, value: Value) {
        if !self.locals.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.locals.insert(name, value);
    }

    fn run(&mut self, src: &str) -> Result<(), SandboxError> {
        let program = parse_program(src).map_err(SandboxError::Syntax)?;
        for stmt in program {
            match stmt {
                Stmt::Assign { name, value } => {
                    let v = eval_expr(&value, &*self).map_err(|e| SandboxError::Eval(format!("{name}: {e}")))?;
                    trace!(name = %name, value = %v.repr(), "sandbox assign");
                    self.bind(name, v);
                }
                Stmt::Def { name, params, body } => {
                    let mut resolved = Vec::with_capacity(params.len());
                    for (pname, default) in params {
                        let default = match default {
                            Some(e) => Some(eval_expr(&e, &*self).map_err(SandboxError::Eval)?),
                            None => None,
                        };
                        resolved.push(Param { name: pname, default });
                    }
                    trace!(name = %name, "sandbox def");
                    let func = make_function(&name, resolved, body);
                    self.bind(name, func);
                }
            }
        }
        Ok(())
    }
}

impl EvalContext for Sandbox<'_> {
    fn get_var(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.locals.get(name) {
            return Some(v.clone());
        }
        self.outer.and_then(|ctx| ctx.get(name).cloned())
    }
}

// ── Entry points ──────────────────────────────────────────────────────────────

/// Run `src` in an empty scope and return the value it bound to `name`.
pub fn exec_fetch(src: &str, name: &str) -> Result<Value, SandboxError> {
    let mut sandbox = Sandbox::new(None);
    sandbox.run(src)?;
    sandbox
        .locals
        .remove(name)
        .ok_or_else(|| SandboxError::Missing(name.to_owned()))
}

/// Run `src` with `scope` as a read-only outer scope and return `scope`
/// merged with every binding the snippet introduced (new bindings win).
pub fn exec_harvest(src: &str, scope: &Context) -> Result<Context, SandboxError> {
    let mut sandbox = Sandbox::new(Some(scope));
    sandbox.run(src)?;
    let mut out = scope.clone();
    let Sandbox { mut locals, order, .. } = sandbox;
    for name in order {
        if let Some(v) = locals.remove(&name) {
            out.set(name, v);
        }
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
