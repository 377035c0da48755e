//! The portable execution strategy: interpret a checked program directly,
//! with no host-toolchain dependency and no temporary files.
//!
//! The interpreter runs the same support scan as the code generator, so both
//! execution strategies accept exactly the same programs and produce the
//! same observable output. A non-zero exit code is data in the result, never
//! an error.

use std::time::Duration;

use tracing::debug;

use crate::codegen::ensure_supported;
use crate::error::CompileResult;
use crate::parser::{Expr, Stmt, unparse_expr};
use crate::sema::CheckedProgram;

/// Knobs for the run/build surfaces.
#[derive(Debug, Clone)]
pub struct RunOptions {
  /// Assemble, link and execute natively instead of interpreting.
  pub native: bool,
  /// Upper bound for each child process on the native path.
  pub timeout: Duration,
  /// Keep the native path's temporary artifacts instead of removing them.
  pub keep_artifacts: bool,
  /// Record a per-statement execution trace.
  pub trace: bool,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self {
      native: false,
      timeout: Duration::from_secs(10),
      keep_artifacts: false,
      trace: false,
    }
  }
}

/// What a program run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
  pub stdout: String,
  pub exit_code: i32,
  /// Per-statement trace, empty unless requested.
  pub trace: Vec<String>,
}

/// Interpret a checked program, capturing its output.
pub fn interpret(checked: &CheckedProgram, options: &RunOptions) -> CompileResult<RunResult> {
  let program = checked.program();
  ensure_supported(program)?;

  let mut stdout = String::new();
  let mut trace = Vec::new();

  for stmt in &program.stmts {
    // The support scan leaves only string-literal prints.
    let Stmt::Print { arg, pos } = stmt else {
      continue;
    };
    let Expr::Str { value, .. } = arg else {
      continue;
    };
    debug!(line = pos.line, "print");
    if options.trace {
      trace.push(format!("line {}: print({})", pos.line, unparse_expr(arg)));
    }
    stdout.push_str(value);
    stdout.push('\n');
  }

  Ok(RunResult {
    stdout,
    exit_code: 0,
    trace,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::CompileError;
  use crate::parser::parse;
  use crate::sema::check;
  use crate::tokenizer::tokenize;

  fn checked(source: &str) -> CheckedProgram {
    check(parse(&tokenize(source).tokens, source).unwrap()).unwrap()
  }

  #[test]
  fn prints_each_literal_with_a_newline() {
    let result = interpret(&checked("print(\"a\")\nprint('b')"), &RunOptions::default());
    let result = result.unwrap();
    assert_eq!(result.stdout, "a\nb\n");
    assert_eq!(result.exit_code, 0);
    assert!(result.trace.is_empty());
  }

  #[test]
  fn empty_program_exits_cleanly_with_no_output() {
    let result = interpret(&checked("# nothing\n"), &RunOptions::default()).unwrap();
    assert_eq!(result.stdout, "");
    assert_eq!(result.exit_code, 0);
  }

  #[test]
  fn rejects_what_the_generator_rejects() {
    let options = RunOptions::default();
    let err = interpret(&checked("x = 1\nwhile x { print(x) }"), &options).unwrap_err();
    let CompileError::UnsupportedConstruct { construct, .. } = err else {
      panic!("expected UnsupportedConstruct, got {err:?}");
    };
    assert!(construct.contains("while"));
  }

  #[test]
  fn trace_names_lines_and_statements() {
    let options = RunOptions {
      trace: true,
      ..RunOptions::default()
    };
    let result = interpret(&checked("print(\"x\")\n\nprint(\"y\")"), &options).unwrap();
    assert_eq!(
      result.trace,
      vec!["line 1: print(\"x\")", "line 3: print(\"y\")"]
    );
  }
}
