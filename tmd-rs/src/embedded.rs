//! Embedded default templates.
//!
//! Everything under the crate's `templates/` directory that a document can
//! reach without configuration is baked into the binary at compile time via
//! `include_str!()`, so `tmd` works without any installed template tree.
//!
//! # Resolution order (see [`crate::render::Loader`])
//! 1. `-T<dir>` / `template_dir` → load from that directory on disk
//! 2. Templates added in memory  → [`crate::render::Loader::add`]
//! 3. **These embedded files**   → load from the binary (no disk access)

/// A single embedded template.
pub struct EmbeddedFile {
    pub name: &'static str,
    pub content: &'static str,
}

/// All embedded templates, by their lookup name.
pub static EMBEDDED_TEMPLATES: &[EmbeddedFile] = &[
    EmbeddedFile { name: "base/_base.html", content: include_str!("../templates/base/_base.html") },
];

/// Look up an embedded template by name.
pub fn get_embedded(name: &str) -> Option<&'static str> {
    EMBEDDED_TEMPLATES
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.content)
}

/// Iterate over all embedded templates as `(name, content)` pairs.
pub fn all_embedded() -> impl Iterator<Item = (&'static str, &'static str)> {
    EMBEDDED_TEMPLATES.iter().map(|f| (f.name, f.content))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
