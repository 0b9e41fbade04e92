//! The compiler driver.
//!
//! ```text
//! source ─▶ blocks ─▶ extends target
//!                  ─▶ -[filters] ─▶ FilterRegistry
//!                  ─▶ -[context] ─▶ Context
//!                  ─▶ other blocks ─────────────┐
//!                  ─▶ body ─▶ markup ─▶ <p> ────┴▶ IntermediateTemplate ─▶ renderer
//! ```
//!
//! [`Compiler::compile`] never fails: any [`CompileError`] becomes the inline
//! error document.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::blocks::{self, join_continuations, BODY, CONTEXT, EXTENDS, FILTERS};
use crate::classify::{HttpProbe, Offline, ResourceClassifier};
use crate::config::{Options, Probe};
use crate::error::CompileError;
use crate::filters::{compile_filters, FilterRegistry};
use crate::infer::infer;
use crate::markup::{self, linebreaks};
use crate::render::filters::escape_html;
use crate::render::{Engine, Loader, TemplateRenderer};
use crate::var::Context;

/// Parent template when `-[extends]` is absent, empty, or `default`.
pub const DEFAULT_BASE: &str = "base/_base.html";

// ── IntermediateTemplate ──────────────────────────────────────────────────────

/// What the compiler hands to the renderer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IntermediateTemplate {
    pub extends_target: String,
    /// Non-reserved blocks in source order.
    pub blocks: Vec<(String, String)>,
    /// Body after markup rewriting, before paragraph conversion.
    pub body: String,
}

impl IntermediateTemplate {
    /// Template-language text: the extends tag, one block per named block,
    /// then the paragraph-converted body.
    pub fn to_source(&self) -> String {
        let quote = if self.extends_target.contains('\'') { '"' } else { '\'' };
        let mut out = format!("{{% extends {quote}{}{quote} %}}", self.extends_target);
        for (name, content) in &self.blocks {
            out.push_str(&format!("{{% block {name} %}} {content} {{% endblock %}}"));
        }
        out.push_str(&format!(
            "{{% block body %}}{}{{% endblock %}}",
            linebreaks(&self.body)
        ));
        out
    }
}

impl fmt::Display for IntermediateTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_source())
    }
}

/// Template name for an `-[extends]` block: dots become path separators and
/// `.html` is appended.
pub fn extends_target(block: Option<&str>, default: &str) -> String {
    match block.map(str::trim) {
        None | Some("") | Some("default") => default.to_owned(),
        Some(name) => format!("{}.html", name.replace('.', "/")),
    }
}

/// The inline document shown in place of a failed compilation.
pub fn error_document(err: &CompileError) -> String {
    format!(
        "Something went wrong :( <br>{}<br>{}",
        linebreaks(&escape_html(&err.to_string())),
        linebreaks(&escape_html(&err.hint()))
    )
}

// ── Compiler ──────────────────────────────────────────────────────────────────

pub struct Compiler {
    options: Options,
    registry: Arc<FilterRegistry>,
    renderer: Box<dyn TemplateRenderer>,
    classifier: Box<dyn ResourceClassifier>,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("options", &self.options)
            .field("filters", &self.registry.names())
            .finish_non_exhaustive()
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl Compiler {
    /// A compiler with the built-in [`Engine`] and the classifier `options`
    /// select.  An HTTP probe that cannot start falls back to [`Offline`].
    pub fn new(options: Options) -> Self {
        let mut loader = Loader::new();
        if let Some(dir) = &options.template_dir {
            loader = loader.with_dir(dir);
        }
        let classifier: Box<dyn ResourceClassifier> = match options.probe {
            Probe::Http => {
                match HttpProbe::new(Duration::from_millis(options.probe_timeout_ms)) {
                    Ok(probe) => Box::new(probe),
                    Err(e) => {
                        warn!(error = %e, "link probe unavailable; links will not become images");
                        Box::new(Offline)
                    }
                }
            }
            Probe::Offline => Box::new(Offline),
        };
        Self {
            options,
            registry: Arc::new(FilterRegistry::new()),
            renderer: Box::new(Engine::new(loader)),
            classifier,
        }
    }

    pub fn with_renderer(mut self, renderer: impl TemplateRenderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_classifier(mut self, classifier: impl ResourceClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Share a registry with other compilers.
    pub fn with_registry(mut self, registry: Arc<FilterRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Run every stage up to, but not including, rendering.
    ///
    /// Registers the document's filters and enriches `ctx` with its context
    /// block as side effects.
    pub fn build(&self, source: &str, ctx: &mut Context) -> Result<IntermediateTemplate, CompileError> {
        let strict = self.options.strict;
        let mut blocks = blocks::extract(source, strict)?;

        let extends_target =
            extends_target(blocks.take(EXTENDS).as_deref(), &self.options.base_template);
        debug!(target = %extends_target, "extends");

        if let Some(filters) = blocks.take(FILTERS) {
            let lines: Vec<&str> = filters.lines().collect();
            let names = compile_filters(&lines, &self.registry, strict)?;
            debug!(?names, "filters registered");
        }

        if let Some(decls) = blocks.take(CONTEXT) {
            *ctx = infer(&decls, ctx, strict)?;
        }

        let body = blocks.take(BODY).unwrap_or_else(|| source.to_owned());
        let body = markup::transform(&join_continuations(&body), self.classifier.as_ref());

        Ok(IntermediateTemplate {
            extends_target,
            blocks: blocks
                .iter()
                .map(|(name, content)| (name.to_owned(), content.to_owned()))
                .collect(),
            body,
        })
    }

    /// Compile and render, reporting failure to the caller.  On success
    /// `ctx["text"]` holds the document.
    pub fn try_compile(&self, source: &str, ctx: &mut Context) -> Result<String, CompileError> {
        let template = self.build(source, ctx)?;
        let out = self.renderer.render(&template, ctx, &self.registry)?;
        ctx.set("text", out.clone());
        Ok(out)
    }

    /// Compile and render.  Failures produce the error document, which is
    /// also stored in `ctx["text"]`.
    pub fn compile(&self, source: &str, ctx: &mut Context) -> String {
        match self.try_compile(source, ctx) {
            Ok(out) => out,
            Err(e) => {
                warn!(error = %e, "compilation failed");
                let doc = error_document(&e);
                ctx.set("text", doc.clone());
                doc
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
