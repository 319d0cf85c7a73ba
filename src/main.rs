use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use impc::{compile_source, Options, Severity};

/// Compiles a program for the accumulator machine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Source file; standard input when omitted.
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,
    /// Where to write the machine code; standard output when omitted.
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,
    /// TOML file with compiler options.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Skip the AST and peephole optimizers.
    #[arg(long)]
    no_optimize: bool,
    /// How to treat constant array indices outside the declared range.
    #[arg(long, value_enum)]
    bounds: Option<Severity>,
    /// Prefix instructions with their address; repeat for more logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> anyhow::Result<Options> {
        let mut options = match &self.config {
            Some(path) => Options::load(path).with_context(|| format!("loading {}", path.display()))?,
            None => Options::default(),
        };
        if self.no_optimize {
            options.optimize = false;
        }
        if let Some(b) = self.bounds {
            options.bounds = b;
        }
        if self.verbose > 0 {
            options.verbose = true;
        }
        Ok(options)
    }
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: logging is already initialized");
    }

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let options = cli.options()?;
    let src = match &cli.input {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?,
        None => std::io::read_to_string(std::io::stdin()).context("reading standard input")?,
    };

    // warnings are logged as they are found
    let compiled = compile_source(&src, &options)?;
    let text = compiled.render(options.verbose);
    match &cli.output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?,
        None => print!("{text}"),
    }
    Ok(())
}
