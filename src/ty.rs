//! The Piper type system: two structural types, used only to reject
//! mismatched operands during semantic checking.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
  Int,
  Str,
}

impl Type {
  pub fn is_integer(&self) -> bool {
    matches!(self, Type::Int)
  }

  /// The name diagnostics use, matching the language reference rather than
  /// the Rust enum variant.
  pub fn name(&self) -> &'static str {
    match self {
      Type::Int => "integer",
      Type::Str => "string",
    }
  }
}

impl fmt::Display for Type {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
