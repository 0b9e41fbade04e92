//! TMD: a line-oriented markup language compiled to HTML.
//!
//! A document is a sequence of `-[name]` blocks.  Four names are reserved:
//! `extends` picks the parent template, `context` declares typed variables,
//! `filters` defines template filters, and `body` holds the page text, which
//! goes through inline markup (`# heading`, `**bold**`, `[label](url)`, …)
//! and paragraph conversion.  Everything else becomes a template block.
//!
//! ```
//! use tmd::{Compiler, Context, Options};
//! use tmd::config::Probe;
//!
//! let compiler = Compiler::new(Options { probe: Probe::Offline, ..Options::default() });
//! let mut ctx = Context::new();
//! let html = compiler.compile("-[body]\nHello **world**", &mut ctx);
//! assert!(html.contains("<p>Hello <b>world</b></p>"));
//! ```

pub mod blocks;
pub mod classify;
pub mod cli;
pub mod compile;
pub mod config;
pub mod embedded;
pub mod error;
pub mod filters;
pub mod infer;
pub mod markup;
pub mod render;
pub mod script;
pub mod var;

pub use compile::{Compiler, IntermediateTemplate};
pub use config::Options;
pub use error::CompileError;
pub use filters::FilterRegistry;
pub use var::Context;
