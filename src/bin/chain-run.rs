//! CLI tool to run chain scripts against input data.

use clap::Parser;
use lazychain_rs::{OpTrace, execute_script_traced};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process;

/// Run a chain script against input data, one element per input line.
#[derive(Parser)]
#[command(name = "chain-run")]
struct Cli {
    /// Chain script file
    script: String,

    /// Input data file (or /dev/stdin)
    input: String,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    output: Option<String>,

    /// Show paths and element counts on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Show every applied operation on stderr
    #[arg(long)]
    trace: bool,
}

/// What a successful run leaves behind.
struct Outcome {
    output: String,
    counts: (usize, usize),
    trace: Vec<OpTrace>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(message) = run(&cli) {
        eprintln!("{message}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), String> {
    let script = read_file("script", &cli.script)?;
    let input_text = read_file("input", &cli.input)?;

    if cli.verbose {
        eprintln!("Script: {}", cli.script);
        eprintln!("Input:  {}", cli.input);
        eprintln!("Output: {}", cli.output.as_deref().unwrap_or("(stdout)"));
    }

    let (output, input_count, output_count, trace) =
        execute_script_traced(&input_text, &script).map_err(|e| format!("Script error: {e}"))?;
    let outcome = Outcome {
        output,
        counts: (input_count, output_count),
        trace,
    };

    report(cli, &outcome);
    match &cli.output {
        Some(path) => write_file(path, &outcome.output),
        None => write_stdout(&outcome.output),
    }
}

fn read_file(kind: &str, path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|e| format!("Error reading {kind} file '{path}': {e}"))
}

/// Trace lines and the element counts go to stderr, as asked for.
fn report(cli: &Cli, outcome: &Outcome) {
    if cli.trace {
        for op in &outcome.trace {
            eprintln!("{op}");
        }
    }
    if cli.verbose {
        let (input_count, output_count) = outcome.counts;
        eprintln!("Processed {input_count} -> {output_count} elements");
    }
}

fn write_file(path: &str, output: &str) -> Result<(), String> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Error creating output directory for '{path}': {e}"))?;
    }
    fs::write(path, output).map_err(|e| format!("Error writing output file '{path}': {e}"))
}

fn write_stdout(output: &str) -> Result<(), String> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(output.as_bytes())
        .and_then(|()| {
            if output.is_empty() || output.ends_with('\n') {
                Ok(())
            } else {
                stdout.write_all(b"\n")
            }
        })
        .map_err(|e| format!("Error writing output: {e}"))
}
