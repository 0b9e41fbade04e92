//! Template lookup: a directory on disk, then in-memory sources, then the
//! templates compiled into the binary.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::embedded::get_embedded;
use crate::error::RenderError;

#[derive(Debug, Clone, Default)]
pub struct Loader {
    dir: Option<PathBuf>,
    memory: HashMap<String, String>,
}

impl Loader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `dir` before the in-memory and embedded templates.
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Register an in-memory template, replacing any previous one.
    pub fn add(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.memory.insert(name.into(), source.into());
    }

    pub fn load(&self, name: &str) -> Result<String, RenderError> {
        if !is_relative_name(name) {
            debug!(name, "refusing template name outside the search path");
            return Err(RenderError::NotFound(name.to_owned()));
        }
        if let Some(dir) = &self.dir {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(src) => {
                    debug!(path = %path.display(), "loaded template");
                    return Ok(src);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "template not on disk"),
            }
        }
        if let Some(src) = self.memory.get(name) {
            return Ok(src.clone());
        }
        get_embedded(name)
            .map(str::to_owned)
            .ok_or_else(|| RenderError::NotFound(name.to_owned()))
    }
}

/// Only plain relative paths: no root, no `..`, no drive prefix.
fn is_relative_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name)
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
