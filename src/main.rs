//! `piperc` command line: emit assembly, run a program, or build a native
//! executable from a `.pi` source file.
//!
//! The binary is a thin shell over the library surface. It renders caret
//! diagnostics on stderr and forwards the executed program's exit code.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::{Parser, Subcommand};

use piperc::{Arch, PiperError, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "piperc", version, about = "Compiler and runner for the Piper language")]
struct Cli {
  /// Target architecture: x86-64, arm, x86 or default.
  #[arg(long, global = true, default_value = "x86-64")]
  arch: Arch,

  /// Enable debug logging.
  #[arg(long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Compile a source file and print (or write) the generated assembly.
  Emit {
    /// Piper source file.
    file: PathBuf,
    /// Write the assembly here instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Compile and execute a source file, printing its output.
  Run {
    /// Piper source file.
    file: PathBuf,
    /// Assemble, link and execute natively instead of interpreting.
    #[arg(long)]
    native: bool,
    /// Timeout in seconds for each native child process.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
    /// Keep the native path's temporary artifacts.
    #[arg(long)]
    keep_temps: bool,
    /// Print a per-statement execution trace to stderr.
    #[arg(long)]
    trace: bool,
  },
  /// Write the generated assembly to a file, optionally producing a binary.
  Build {
    /// Piper source file.
    file: PathBuf,
    /// Where to write the assembly text.
    #[arg(short, long)]
    output: PathBuf,
    /// Also link a native executable at this path.
    #[arg(long)]
    bin: Option<PathBuf>,
    /// Timeout in seconds for each toolchain invocation.
    #[arg(long, default_value_t = 10)]
    timeout: u64,
  },
}

fn main() {
  let cli = Cli::parse();

  if cli.verbose {
    tracing_subscriber::fmt()
      .with_target(false)
      .with_level(true)
      .with_max_level(tracing::Level::DEBUG)
      .with_writer(std::io::stderr)
      .init();
  }

  let code = match run(cli) {
    Ok(code) => code,
    Err(code) => code,
  };
  process::exit(code);
}

/// Dispatch one subcommand; the value is the process exit code either way.
fn run(cli: Cli) -> Result<i32, i32> {
  match cli.command {
    Command::Emit { file, output } => {
      let source = read_source(&file)?;
      let asm = piperc::compile_to_assembly(&source, cli.arch)
        .map_err(|err| report_compile(&err, &source))?;
      match output {
        Some(path) => fs::write(&path, asm).map_err(|err| {
          eprintln!("piperc: failed to write {}: {err}", path.display());
          1
        })?,
        None => print!("{asm}"),
      }
      Ok(0)
    }
    Command::Run {
      file,
      native,
      timeout,
      keep_temps,
      trace,
    } => {
      let source = read_source(&file)?;
      let options = RunOptions {
        native,
        timeout: Duration::from_secs(timeout),
        keep_artifacts: keep_temps,
        trace,
      };
      let result =
        piperc::run_source(&source, cli.arch, &options).map_err(|err| report(&err, &source))?;
      for line in &result.trace {
        eprintln!("{line}");
      }
      print!("{}", result.stdout);
      Ok(result.exit_code)
    }
    Command::Build {
      file,
      output,
      bin,
      timeout,
    } => {
      let source = read_source(&file)?;
      let options = RunOptions {
        timeout: Duration::from_secs(timeout),
        ..RunOptions::default()
      };
      let report = piperc::build_executable(&source, cli.arch, &output, bin.as_deref(), &options)
        .map_err(|err| report(&err, &source))?;
      eprintln!("wrote {}", report.asm_path.display());
      if let Some(bin_path) = report.bin_path {
        eprintln!("wrote {}", bin_path.display());
      }
      Ok(0)
    }
  }
}

fn read_source(path: &Path) -> Result<String, i32> {
  fs::read_to_string(path).map_err(|err| {
    eprintln!("piperc: cannot read {}: {err}", path.display());
    1
  })
}

fn report(err: &PiperError, source: &str) -> i32 {
  match err {
    PiperError::Compile { source: err } => report_compile(err, source),
    PiperError::Toolchain { source: err } => {
      eprintln!("piperc: {}: {err}", err.stage().name());
      1
    }
  }
}

fn report_compile(err: &piperc::CompileError, source: &str) -> i32 {
  eprintln!("{}", err.render_diagnostic(source));
  1
}
