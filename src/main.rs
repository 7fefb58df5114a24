//! Command-line entry point: argument parsing, predefined-macro/I/O wiring,
//! and mapping the run's outcome to a process exit code.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use redsea_pp::{FsResolver, Options, Preprocessor, TextRenderer};
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

/// A standalone C preprocessor.
#[derive(Parser, Debug)]
#[command(name = "pp", version, about = "A standalone C preprocessor", disable_help_flag = true)]
struct Args {
    /// Input file, or `-` (also the default) for stdin.
    #[arg(default_value = "-")]
    input: String,

    /// Add a directory to the `#include` search path. Repeatable.
    #[arg(short = 'I', value_name = "dir")]
    include_dirs: Vec<PathBuf>,

    /// Define a macro, as `name` or `name=definition`. Repeatable.
    #[arg(short = 'D', value_name = "name[=def]")]
    defines: Vec<String>,

    /// Undefine a macro, applied after all `-D` options. Repeatable.
    #[arg(short = 'U', value_name = "name")]
    undefines: Vec<String>,

    /// Write output here instead of stdout.
    #[arg(short = 'o', value_name = "file")]
    output: Option<PathBuf>,

    /// Write diagnostics here instead of stderr.
    #[arg(short = 'e', value_name = "file")]
    diagnostics_output: Option<PathBuf>,

    /// Enable trigraph substitution.
    #[arg(long = "trigraphs")]
    trigraphs: bool,

    /// Print usage and exit with nonzero status.
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    help: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    run(args)
}

fn run(args: Args) -> Result<ExitCode> {
    if args.help {
        Args::command().print_help().ok();
        println!();
        return Ok(ExitCode::FAILURE);
    }

    let options = Options {
        include_dirs: args.include_dirs,
        defines: args.defines,
        undefines: args.undefines,
        trigraphs: args.trigraphs,
    };
    let mut pp = Preprocessor::new(options, Box::new(FsResolver));

    let (path, source) = read_input(&args.input)?;
    let output = pp.run(path, &source);

    write_diagnostics(&args.diagnostics_output, pp.diagnostics())?;
    write_output(&args.output, &output)?;

    Ok(if pp.diagnostics().has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn read_input(input: &str) -> Result<(PathBuf, String)> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        return Ok((PathBuf::from("<stdin>"), buf));
    }
    let path = PathBuf::from(input);
    let content = fs::read_to_string(&path)
        .with_context(|| format!("cannot open input file '{}'", path.display()))?;
    Ok((path, content))
}

fn write_output(output: &Option<PathBuf>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text)
                .with_context(|| format!("cannot open output file '{}'", path.display()))?;
        }
        None => {
            io::stdout().write_all(text.as_bytes())?;
        }
    }
    Ok(())
}

fn write_diagnostics(path: &Option<PathBuf>, diags: &redsea_pp::Diagnostics) -> Result<()> {
    let rendered = TextRenderer::render_all(diags);
    match path {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("cannot open output file '{}'", path.display()))?;
        }
        None => {
            io::stderr().write_all(rendered.as_bytes())?;
        }
    }
    Ok(())
}
