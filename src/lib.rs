//! Compiler core for the Piper language: crate root wiring the pipeline.
//!
//! The stages are intentionally small and composable so they can be evolved
//! independently:
//! - `tokenizer` performs lexical analysis and produces a flat token stream.
//! - `parser` owns all syntactic knowledge and returns the statement AST.
//! - `sema` resolves identifiers and types, producing a `CheckedProgram`.
//! - `codegen` lowers a checked program into GAS assembly for an explicit
//!   target architecture.
//! - `runner` interprets a checked program (the default execution strategy);
//!   `toolchain` assembles, links and executes it natively (the optional
//!   export path).
//! - `error` centralises the taxonomy shared by all of the above.
//!
//! Every call is independent: no state is retained between compilations, so
//! callers may compile concurrently.

pub mod error;
pub mod parser;
pub mod runner;
pub mod sema;
pub mod tokenizer;
pub mod ty;

mod codegen;
mod toolchain;

use std::path::Path;

pub use codegen::{Arch, InstrKind, Instruction, render};
pub use error::{CompileError, CompileResult, PiperError, Stage, ToolchainError};
pub use runner::{RunOptions, RunResult};
pub use sema::CheckedProgram;
pub use toolchain::BuildReport;

pub use tokenizer::{Lexed, tokenize};

/// Compile a source string into an instruction sequence for `arch`.
pub fn compile(source: &str, arch: Arch) -> CompileResult<Vec<Instruction>> {
  codegen::generate(&front_end(source)?, arch)
}

/// Compile a source string all the way to assembly text.
pub fn compile_to_assembly(source: &str, arch: Arch) -> CompileResult<String> {
  let instructions = compile(source, arch)?;
  Ok(render(&instructions, arch))
}

/// Compile and execute, capturing stdout and the exit code. Interprets by
/// default; `options.native` selects the assemble/link/execute path.
pub fn run_source(
  source: &str,
  arch: Arch,
  options: &RunOptions,
) -> Result<RunResult, PiperError> {
  let checked = front_end(source)?;
  if options.native {
    let instructions = codegen::generate(&checked, arch)?;
    let asm = render(&instructions, arch);
    Ok(toolchain::run_native(&asm, arch, options)?)
  } else {
    Ok(runner::interpret(&checked, options)?)
  }
}

/// Export surface: write the generated assembly to `asm_path` and, when
/// `bin_path` is given, drive the native toolchain to produce a binary there.
pub fn build_executable(
  source: &str,
  arch: Arch,
  asm_path: &Path,
  bin_path: Option<&Path>,
  options: &RunOptions,
) -> Result<BuildReport, PiperError> {
  let asm = compile_to_assembly(source, arch)?;
  Ok(toolchain::build_executable(
    &asm, arch, asm_path, bin_path, options,
  )?)
}

/// Lex, parse and check: the shared front half of every surface.
fn front_end(source: &str) -> CompileResult<CheckedProgram> {
  let lexed = tokenizer::tokenize(source);
  let program = parser::parse(&lexed.tokens, source)?;
  sema::check(program)
}
