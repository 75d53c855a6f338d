#![deny(clippy::all)]

use anyhow::Context;
use std::{fs, path::PathBuf, process};
use structopt::StructOpt;
use wavelang::{compile, CompilerOptions};

/// WaveLang compiler: lowers one instrument's source files into a binary
/// instrument file.
#[derive(Debug, StructOpt)]
#[structopt(name = "wavelang")]
struct Opt {
    /// Path to the top-level source file.
    #[structopt(parse(from_os_str))]
    source_path: PathBuf,

    /// Path to write the compiled instrument to. Defaults to the source
    /// file's stem with a `.wvi` extension.
    #[structopt(long = "output", short = "o", parse(from_os_str))]
    output_path: Option<PathBuf>,

    /// Additional directories searched for top-level (dot-free) imports.
    #[structopt(long = "library-dir", parse(from_os_str))]
    library_dirs: Vec<PathBuf>,

    /// Disables the graph optimizer; only useful for debugging it.
    #[structopt(long = "no-optimize")]
    no_optimize: bool,
}

fn default_output_path(source_path: &std::path::Path) -> PathBuf {
    source_path.with_extension("wvi")
}

fn run(opt: Opt) -> anyhow::Result<()> {
    let options = CompilerOptions {
        library_dirs: opt.library_dirs,
        optimizations_enabled: !opt.no_optimize,
    };

    let result = compile(&opt.source_path, &options);
    for diagnostic in result.diagnostics.diagnostics() {
        eprintln!("{}", diagnostic);
    }

    let instrument = match result.instrument {
        Some(instrument) => instrument,
        None => anyhow::bail!(
            "compilation failed with {} error(s)",
            result.diagnostics.error_count()
        ),
    };

    let output_path = opt.output_path.unwrap_or_else(|| default_output_path(&opt.source_path));
    fs::write(&output_path, &instrument.bytes)
        .with_context(|| format!("failed to write compiled instrument to {:?}", output_path))?;
    log::info!(
        "wrote {} ({} variant(s)) to {:?}",
        output_path.display(),
        instrument.task_graphs.len(),
        output_path
    );

    Ok(())
}

fn main() {
    env_logger::init();
    let opt = Opt::from_args();
    if let Err(err) = run(opt) {
        eprintln!("error: {:#}", err);
        process::exit(1);
    }
}
