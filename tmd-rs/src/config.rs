//! Compiler options and the `.tmdrc` file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set strict=on` | reject malformed context/filter lines and markers |
//! | `/set base_template=<name>` | parent template when `-[extends]` is absent |
//! | `/set template_dir=<dir>` | search `<dir>` for templates first |
//! | `/set probe=http\|offline` | how links are classified as images |
//! | `/set probe_timeout=<ms>` | per-link probe timeout |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! `/set <name> <value>` (space instead of `=`) is accepted too.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::compile::DEFAULT_BASE;

// ── Options ───────────────────────────────────────────────────────────────────

/// How `[label](target)` links are classified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Probe {
    /// `HEAD` request to the target.
    #[default]
    Http,
    /// Never probe; every link stays a link.
    Offline,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub strict: bool,
    pub base_template: String,
    pub template_dir: Option<PathBuf>,
    pub probe: Probe,
    pub probe_timeout_ms: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict: false,
            base_template: DEFAULT_BASE.to_owned(),
            template_dir: None,
            probe: Probe::Http,
            probe_timeout_ms: 2000,
        }
    }
}

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl Options {
    /// Parse an rc string on top of the defaults.
    ///
    /// Returns the options and any errors on recognised lines; bad lines
    /// leave the affected option unchanged.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut opts = Options::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));

            if cmd == "set" {
                let tokens = split_args(args_str.trim());
                if let Err(message) = opts.apply_set(&tokens) {
                    errors.push(ConfigError { line: lineno, message });
                }
            }
        }

        (opts, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one `/set` directive.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "strict" => self.strict = parse_flag(value)?,
            "base_template" => {
                if value.is_empty() {
                    return Err("/set: base_template cannot be empty".into());
                }
                self.base_template = value.to_owned();
            }
            "template_dir" => {
                self.template_dir = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "probe" => {
                self.probe = match value {
                    "http" => Probe::Http,
                    "offline" | "off" => Probe::Offline,
                    other => return Err(format!("/set: unknown probe '{other}'")),
                }
            }
            "probe_timeout" => {
                self.probe_timeout_ms = value
                    .parse()
                    .map_err(|_| format!("/set: invalid timeout '{value}'"))?;
            }
            other => return Err(format!("/set: unknown option '{other}'")),
        }
        Ok(())
    }

    fn apply_set(&mut self, tokens: &[String]) -> Result<(), String> {
        if tokens.is_empty() {
            return Err("/set: requires an argument".into());
        }
        let (name, value) = if let Some(eq) = tokens[0].find('=') {
            let mut value = tokens[0][eq + 1..].to_owned();
            for t in &tokens[1..] {
                value.push(' ');
                value.push_str(t);
            }
            (tokens[0][..eq].to_owned(), value)
        } else if tokens.len() >= 2 {
            (tokens[0].clone(), tokens[1..].join(" "))
        } else {
            return Err(format!("/set: missing value for '{}'", tokens[0]));
        };
        if name.is_empty() {
            return Err("/set: option name cannot be empty".into());
        }
        self.set(&name, &value)
    }
}

fn parse_flag(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" => Ok(true),
        "off" | "0" | "false" | "no" => Ok(false),
        _ => Err(format!("/set: expected on or off, got '{value}'")),
    }
}

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the rc file: `./.tmdrc`, then `tmdrc` in the platform config
/// directory.  Returns the first path that exists.
pub fn find_rc() -> Option<PathBuf> {
    let local = PathBuf::from("./.tmdrc");
    if local.exists() {
        return Some(local);
    }
    ProjectDirs::from("", "", "tmd")
        .map(|dirs| dirs.config_dir().join("tmdrc"))
        .filter(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = Options::default();
        assert!(!o.strict);
        assert_eq!(o.base_template, "base/_base.html");
        assert_eq!(o.probe, Probe::Http);
        assert_eq!(o.probe_timeout_ms, 2000);
    }

    #[test]
    fn set_equals_syntax() {
        let (o, errs) = Options::load_str("/set strict=on\n/set probe=offline\n");
        assert!(errs.is_empty());
        assert!(o.strict);
        assert_eq!(o.probe, Probe::Offline);
    }

    #[test]
    fn set_space_syntax() {
        let (o, errs) = Options::load_str("/set template_dir \"my templates\"");
        assert!(errs.is_empty());
        assert_eq!(o.template_dir, Some(PathBuf::from("my templates")));
    }

    #[test]
    fn set_timeout() {
        let (o, _) = Options::load_str("/set probe_timeout=250");
        assert_eq!(o.probe_timeout_ms, 250);
    }

    #[test]
    fn bad_values_are_reported_with_line_numbers() {
        let (o, errs) = Options::load_str("; header\n/set strict=maybe\n/set colour=red\n/set");
        assert_eq!(errs.len(), 3);
        assert_eq!(errs[0].line, 2);
        assert_eq!(errs[1].line, 3);
        assert!(errs[1].to_string().contains("colour"));
        assert!(!o.strict);
    }

    #[test]
    fn comments_and_unknown_commands_ignored() {
        let (o, errs) = Options::load_str(";; /set strict=on\n/def foo = bar\nplain text\n");
        assert!(errs.is_empty());
        assert_eq!(o, Options::default());
    }

    #[test]
    fn load_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".tmdrc");
        std::fs::write(&path, "/set base_template=site/page.html\n").unwrap();
        let (o, errs) = Options::load_file(&path).unwrap();
        assert!(errs.is_empty());
        assert_eq!(o.base_template, "site/page.html");
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#"a "b c" d"#), vec!["a", "b c", "d"]);
    }
}
