//! Command-line argument parsing.
//!
//! Usage:
//!   tmd [-f[<file>]] [-T<dir>] [-o<file>] [-D name=value]... [-snd] [--emit-template] <file|->

use std::path::PathBuf;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Config-file specification.
    pub config: ConfigFile,
    /// Template directory override (`-T<dir>`).
    pub template_dir: Option<PathBuf>,
    /// Output file (`-o<file>`); stdout when absent.
    pub output: Option<PathBuf>,
    /// Context seeds (`-D name=value`).
    pub defines: Vec<(String, String)>,
    /// Strict mode (`-s`).
    pub strict: bool,
    /// Never probe links (`-n`).
    pub offline: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// Print the intermediate template instead of rendering.
    pub emit_template: bool,
    /// Document to compile.
    pub input: Input,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search `./.tmdrc`, then the platform config directory (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

#[derive(Debug, Default, PartialEq)]
pub enum Input {
    /// `-` or no positional argument.
    #[default]
    Stdin,
    File(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }
        if arg == "--emit-template" {
            args.emit_template = true;
            i += 1;
            continue;
        }
        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                's' => args.strict = true,
                'n' => args.offline = true,
                'd' => args.debug = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && i + 2 < argv.len() {
                        // `-f <file> <input>`; a lone trailing word is the input.
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                c @ ('T' | 'o' | 'D') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{c} requires an argument"));
                    };
                    match c {
                        'T' => args.template_dir = Some(PathBuf::from(value)),
                        'o' => args.output = Some(PathBuf::from(value)),
                        _ => {
                            let (name, val) = value
                                .split_once('=')
                                .ok_or_else(|| format!("-D expects name=value, got '{value}'"))?;
                            if name.is_empty() {
                                return Err("-D: name cannot be empty".to_owned());
                            }
                            args.defines.push((name.to_owned(), val.to_owned()));
                        }
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => {}
        1 => {
            let p = positional.remove(0);
            if p != "-" {
                args.input = Input::File(PathBuf::from(p));
            }
        }
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

pub fn usage() -> &'static str {
    "usage: tmd [-f[<file>]] [-T<dir>] [-o<file>] [-D name=value]... [-snd] [--emit-template] <file|->"
}

// ── Tests ─────────────────────────────────────────────────────────────────────
