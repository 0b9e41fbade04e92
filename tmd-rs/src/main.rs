use std::io::{Read, Write};

use tracing_subscriber::EnvFilter;

use tmd::cli::{self, ConfigFile, Input};
use tmd::config::{find_rc, Options, Probe};
use tmd::{Compiler, Context};

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tmd: {e}");
            eprintln!("{}", cli::usage());
            std::process::exit(2);
        }
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("TMD_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // ── Options: rc file, then flags ──────────────────────────────────────────
    let rc = match args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path),
        ConfigFile::Search => find_rc(),
    };
    let mut options = Options::default();
    if let Some(path) = rc {
        match Options::load_file(&path) {
            Ok((loaded, errors)) => {
                for e in errors {
                    eprintln!("tmd: {}: {e}", path.display());
                }
                options = loaded;
            }
            Err(e) => eprintln!("tmd: warning: {}: {e}", path.display()),
        }
    }
    if args.strict {
        options.strict = true;
    }
    if args.offline {
        options.probe = Probe::Offline;
    }
    if let Some(dir) = args.template_dir {
        options.template_dir = Some(dir);
    }

    // ── Input ─────────────────────────────────────────────────────────────────
    let source = match &args.input {
        Input::Stdin => {
            let mut s = String::new();
            std::io::stdin().read_to_string(&mut s).map(|_| s)
        }
        Input::File(path) => std::fs::read_to_string(path),
    };
    let source = match source {
        Ok(s) => s,
        Err(e) => {
            eprintln!("tmd: can't read input: {e}");
            std::process::exit(1);
        }
    };

    let mut ctx: Context = args.defines.into_iter().collect();
    let compiler = Compiler::new(options);

    let output = if args.emit_template {
        match compiler.build(&source, &mut ctx) {
            Ok(t) => t.to_source(),
            Err(e) => {
                eprintln!("tmd: {e}");
                std::process::exit(1);
            }
        }
    } else {
        compiler.compile(&source, &mut ctx)
    };

    // ── Output ────────────────────────────────────────────────────────────────
    let written = match &args.output {
        Some(path) => std::fs::write(path, output),
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(output.as_bytes()).and_then(|()| out.flush())
        }
    };
    if let Err(e) = written {
        eprintln!("tmd: can't write output: {e}");
        std::process::exit(1);
    }
}
