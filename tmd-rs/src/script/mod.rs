//! Restricted expression sandbox.
//!
//! Author-supplied snippets from `-[context]` and `-[filters]` blocks run
//! here.  The language is a closed, small subset:
//!
//! - Statements: `name = expr` and `def name(a, b=default): return expr`
//! - Literals, lists, dicts, arithmetic, comparisons, `and`/`or`/`not`
//! - Conditional expressions, subscripts and slices
//! - Calls limited to an allow-list of built-ins and string/list/dict methods
//!
//! # Quick start
//!
//! ```rust
//! use tmd::script::{exec_harvest, Value};
//! use tmd::Context;
//!
//! let ctx = exec_harvest("x = 6\ny = x * 7", &Context::new()).unwrap();
//! assert_eq!(ctx.get("y"), Some(&Value::Int(42)));
//! ```

pub mod builtins;
pub mod expr;
pub mod sandbox;
pub mod stmt;
pub mod value;

// Re-exports for convenience.
pub use expr::EvalContext;
pub use sandbox::{exec_fetch, exec_harvest};
pub use value::{Function, Value};
