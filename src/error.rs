//! The error taxonomy shared across the compilation pipeline and the
//! execution harness.
//!
//! Every stage returns exactly one error or a full success, never a partial
//! result. Errors carry the source position where one exists, and expose the
//! stage they came from so an embedding front-end can render structured
//! diagnostics without parsing message strings. The core itself presents
//! nothing; `render_diagnostic` is offered to CLI-style callers and formats
//! messages in a style reminiscent of chibicc, pointing at the offending
//! character with a caret.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use snafu::Snafu;

use crate::tokenizer::Pos;
use crate::ty::Type;

pub type CompileResult<T> = Result<T, CompileError>;

/// Pipeline stage an error originated in, for the embedding front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Lexer,
  Parser,
  Checker,
  Codegen,
  Assemble,
  Link,
  Execute,
}

impl Stage {
  pub fn name(&self) -> &'static str {
    match self {
      Stage::Lexer => "lexer",
      Stage::Parser => "parser",
      Stage::Checker => "checker",
      Stage::Codegen => "codegen",
      Stage::Assemble => "assemble",
      Stage::Link => "link",
      Stage::Execute => "execute",
    }
  }
}

/// An error from one of the four compilation stages.
#[derive(Debug, Snafu)]
pub enum CompileError {
  #[snafu(display("{pos}: {message}"))]
  Lex { pos: Pos, message: String },

  #[snafu(display("{pos}: {message}"))]
  Syntax { pos: Pos, message: String },

  #[snafu(display("{pos}: undefined identifier \"{name}\""))]
  UndefinedIdentifier { pos: Pos, name: String },

  #[snafu(display("{pos}: \"{name}\" is already defined at {previous}"))]
  DuplicateDeclaration {
    pos: Pos,
    previous: Pos,
    name: String,
  },

  #[snafu(display("{pos}: type mismatch: expected {expected}, found {found}"))]
  TypeMismatch {
    pos: Pos,
    expected: Type,
    found: Type,
  },

  #[snafu(display("{pos}: unsupported construct: {construct}"))]
  UnsupportedConstruct { pos: Pos, construct: String },

  #[snafu(display("unknown architecture \"{name}\""))]
  UnknownArchitecture { name: String },
}

impl CompileError {
  pub fn stage(&self) -> Stage {
    match self {
      CompileError::Lex { .. } => Stage::Lexer,
      CompileError::Syntax { .. } => Stage::Parser,
      CompileError::UndefinedIdentifier { .. }
      | CompileError::DuplicateDeclaration { .. }
      | CompileError::TypeMismatch { .. } => Stage::Checker,
      CompileError::UnsupportedConstruct { .. } | CompileError::UnknownArchitecture { .. } => {
        Stage::Codegen
      }
    }
  }

  pub fn pos(&self) -> Option<Pos> {
    match self {
      CompileError::Lex { pos, .. }
      | CompileError::Syntax { pos, .. }
      | CompileError::UndefinedIdentifier { pos, .. }
      | CompileError::DuplicateDeclaration { pos, .. }
      | CompileError::TypeMismatch { pos, .. }
      | CompileError::UnsupportedConstruct { pos, .. } => Some(*pos),
      CompileError::UnknownArchitecture { .. } => None,
    }
  }

  /// Format the error as a quoted source line with a caret under the
  /// offending character.
  pub fn render_diagnostic(&self, source: &str) -> String {
    let Some(pos) = self.pos() else {
      return format!("error: {self}");
    };
    let line_text = source.lines().nth(pos.line.saturating_sub(1)).unwrap_or("");
    let marker = format!("{}^", " ".repeat(pos.column)); // column is 1-based, plus the opening quote
    format!("'{line_text}'\n{marker} {self}")
  }
}

/// An error from the native assemble/link/execute path.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ToolchainError {
  #[snafu(display("required tool \"{tool}\" was not found on PATH"))]
  ToolMissing { tool: String, source: which::Error },

  #[snafu(display("assembler failed:\n{stderr}"))]
  AssemblerFailed { stderr: String },

  #[snafu(display("linker failed:\n{stderr}"))]
  LinkerFailed { stderr: String },

  #[snafu(display("failed to run {what}: {source}"))]
  Spawn { what: String, source: io::Error },

  #[snafu(display("{what} did not finish within {limit:?} and was killed"))]
  Timeout { what: String, limit: Duration },

  #[snafu(display("failed to write {}: {source}", path.display()))]
  WriteArtifact { path: PathBuf, source: io::Error },
}

impl ToolchainError {
  pub fn stage(&self) -> Stage {
    match self {
      ToolchainError::ToolMissing { tool, .. } => {
        if tool == "as" {
          Stage::Assemble
        } else {
          Stage::Link
        }
      }
      ToolchainError::AssemblerFailed { .. } | ToolchainError::WriteArtifact { .. } => {
        Stage::Assemble
      }
      ToolchainError::LinkerFailed { .. } => Stage::Link,
      ToolchainError::Spawn { what, .. } | ToolchainError::Timeout { what, .. } => {
        match what.as_str() {
          "assembler" => Stage::Assemble,
          "linker" => Stage::Link,
          _ => Stage::Execute,
        }
      }
    }
  }
}

/// Union of the two error families, returned by the run/build surfaces.
#[derive(Debug, Snafu)]
pub enum PiperError {
  #[snafu(display("{source}"), context(false))]
  Compile { source: CompileError },

  #[snafu(display("{source}"), context(false))]
  Toolchain { source: ToolchainError },
}

impl PiperError {
  pub fn stage(&self) -> Stage {
    match self {
      PiperError::Compile { source } => source.stage(),
      PiperError::Toolchain { source } => source.stage(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stages_map_to_taxonomy() {
    let err = CompileError::UndefinedIdentifier {
      pos: Pos::start(),
      name: "x".into(),
    };
    assert_eq!(err.stage(), Stage::Checker);
    assert_eq!(err.stage().name(), "checker");

    let err = CompileError::UnknownArchitecture { name: "mips".into() };
    assert_eq!(err.stage(), Stage::Codegen);
    assert!(err.pos().is_none());
  }

  #[test]
  fn diagnostic_points_at_the_offending_line() {
    let source = "print(1)\nprint(oops)";
    let err = CompileError::UndefinedIdentifier {
      pos: Pos {
        offset: 15,
        line: 2,
        column: 7,
      },
      name: "oops".into(),
    };
    let rendered = err.render_diagnostic(source);
    assert!(rendered.contains("'print(oops)'"));
    assert!(rendered.contains("undefined identifier \"oops\""));
  }
}
