use std::path::PathBuf;
use std::process;

use clap::Parser;
use colored::Colorize;
use postfix_jit::{errors::CompileError, CompiledProblem, Problem};
use tracing_subscriber::EnvFilter;

/// Sample points per routine for `--verify`.
const VERIFY_SAMPLES: usize = 256;

#[derive(Parser)]
#[command(name = "postfix-jit")]
#[command(about = "Compile three postfix expressions and their derivatives into x87 NASM routines")]
#[command(version)]
struct Args {
    /// Problem file: a range `a b` on the first line, then three postfix expressions
    input: PathBuf,

    /// Write the assembly unit here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print every expression and its derivative in infix form
    #[arg(long)]
    print_trees: bool,

    /// JIT-compile the routines and check them against the trees across the range
    #[arg(long)]
    verify: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,postfix_jit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("{} {}", "error:".red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn run(args: &Args) -> Result<(), CompileError> {
    let problem = Problem::from_file(&args.input)?;
    let compiled = problem.compile()?;

    if args.print_trees {
        print_trees(&compiled);
    }
    if args.verify {
        compiled.verify(VERIFY_SAMPLES)?;
    }

    let text = compiled.unit().to_string();
    match &args.output {
        Some(path) => std::fs::write(path, text)?,
        None => print!("{text}"),
    }
    Ok(())
}

fn print_trees(compiled: &CompiledProblem) {
    let (a, b) = compiled.range();
    eprintln!("{} [{a}, {b}]", "range".cyan());
    for (label, expr) in compiled.trees() {
        eprintln!("{} = {}", format!("{label:>5}").cyan(), expr);
    }
}
