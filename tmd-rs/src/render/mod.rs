//! HTML template rendering.
//!
//! The compiler hands an [`IntermediateTemplate`] to a [`TemplateRenderer`].
//! [`Engine`] is the built-in renderer: a small Django-style language with
//! `extends`/`block` inheritance, `if`, `for`, `include`, and `|filter` chains
//! that consult the compiler's [`FilterRegistry`].

pub mod engine;
pub mod filters;
pub mod loader;
pub mod parser;

pub use engine::Engine;
pub use loader::Loader;
pub use parser::parse;

use crate::compile::IntermediateTemplate;
use crate::error::RenderError;
use crate::filters::FilterRegistry;
use crate::var::Context;

/// Turns an assembled template into the final document.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: &IntermediateTemplate,
        ctx: &Context,
        registry: &FilterRegistry,
    ) -> Result<String, RenderError>;
}
