//! Error types for compilation, the sandbox, and rendering.

use thiserror::Error;

/// Failure inside the expression sandbox.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SandboxError {
    /// The snippet did not parse.
    #[error("syntax error: {0}")]
    Syntax(String),
    /// The snippet parsed but failed while running.
    #[error("{0}")]
    Eval(String),
    /// The snippet ran but never bound the requested name.
    #[error("name '{0}' is not defined")]
    Missing(String),
}

/// Failure reported by a template renderer.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("template syntax error: {0}")]
    Syntax(String),
    #[error("template not found: {0}")]
    NotFound(String),
    /// A filter or loop failed while rendering.
    #[error("{0}")]
    Evaluation(String),
}

/// A compilation-aborting failure.
///
/// [`crate::Compiler::compile`] turns every variant into the inline error
/// document; [`crate::Compiler::try_compile`] returns it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Generated or author-supplied code failed to parse.
    #[error("{0}")]
    Syntax(String),
    /// A filter name begins with `_`.
    #[error("invalid filter name '{0}': names beginning with '_' are reserved")]
    ForbiddenName(String),
    /// A context expression parsed but failed to evaluate.
    #[error("{0}")]
    Evaluation(String),
    /// The renderer rejected the assembled template.
    #[error("{0}")]
    TemplateSyntax(String),
    /// A referenced template could not be loaded.
    #[error("{0}")]
    TemplateNotFound(String),
}

impl From<SandboxError> for CompileError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Syntax(_) => CompileError::Syntax(e.to_string()),
            SandboxError::Eval(_) | SandboxError::Missing(_) => {
                CompileError::Evaluation(e.to_string())
            }
        }
    }
}

impl From<RenderError> for CompileError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Syntax(_) => CompileError::TemplateSyntax(e.to_string()),
            RenderError::NotFound(name) => CompileError::TemplateNotFound(name),
            RenderError::Evaluation(msg) => CompileError::Evaluation(msg),
        }
    }
}

impl CompileError {
    /// Second line of the error document.
    pub fn hint(&self) -> String {
        match self {
            CompileError::ForbiddenName(_) => {
                "This error can occur if filter or tag names begin with `_`".to_owned()
            }
            CompileError::TemplateNotFound(name) => {
                format!("\nInvalid value for -[extends] or -[include], {name} not found")
            }
            _ => String::new(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
