//! Semantic checking: resolve identifiers and assign types in one pre-order
//! pass over the tree.
//!
//! Piper has no declaration keyword, so the first assignment to a name in a
//! scope declares it with the type of its right-hand side. A second
//! assignment to the same name in the same frame is a duplicate declaration;
//! an assignment in an inner block shadows the outer binding. Blocks push
//! and pop symbol-table frames, searched innermost first.

use std::collections::HashMap;

use crate::error::{CompileError, CompileResult};
use crate::parser::{Expr, Program, Stmt};
use crate::tokenizer::Pos;
use crate::ty::Type;

/// A program that passed semantic checking. `check` is the only constructor,
/// so holding one proves the tree is well-formed – code generation and the
/// interpreter accept nothing else.
#[derive(Debug, Clone)]
pub struct CheckedProgram {
  program: Program,
}

impl CheckedProgram {
  pub fn program(&self) -> &Program {
    &self.program
  }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
  ty: Type,
  pos: Pos,
}

/// Stack of symbol-table frames, innermost last. Lives for one `check` pass.
struct Scopes {
  frames: Vec<HashMap<String, Binding>>,
}

impl Scopes {
  fn new() -> Self {
    Self {
      frames: vec![HashMap::new()],
    }
  }

  fn push(&mut self) {
    self.frames.push(HashMap::new());
  }

  fn pop(&mut self) {
    self.frames.pop();
  }

  fn lookup(&self, name: &str) -> Option<Binding> {
    self
      .frames
      .iter()
      .rev()
      .find_map(|frame| frame.get(name).copied())
  }

  /// Declare `name` in the innermost frame; duplicate declarations within
  /// the same frame are an error even when an outer binding exists.
  fn declare(&mut self, name: &str, ty: Type, pos: Pos) -> CompileResult<()> {
    let frame = self.frames.last_mut().ok_or(CompileError::Syntax {
      pos,
      message: "internal error: no open scope".to_string(),
    })?;
    if let Some(previous) = frame.get(name) {
      return Err(CompileError::DuplicateDeclaration {
        pos,
        previous: previous.pos,
        name: name.to_string(),
      });
    }
    frame.insert(name.to_string(), Binding { ty, pos });
    Ok(())
  }
}

/// Check a parsed program, consuming it into its proof-carrying wrapper.
pub fn check(program: Program) -> CompileResult<CheckedProgram> {
  let mut scopes = Scopes::new();
  for stmt in &program.stmts {
    check_stmt(stmt, &mut scopes)?;
  }
  Ok(CheckedProgram { program })
}

fn check_stmt(stmt: &Stmt, scopes: &mut Scopes) -> CompileResult<()> {
  match stmt {
    Stmt::Print { arg, .. } => {
      // print accepts either type.
      check_expr(arg, scopes)?;
      Ok(())
    }
    Stmt::Expr { expr, .. } => {
      check_expr(expr, scopes)?;
      Ok(())
    }
    Stmt::Return { value, .. } => {
      if let Some(value) = value {
        expect_integer(value, scopes)?;
      }
      Ok(())
    }
    Stmt::If {
      cond,
      then,
      otherwise,
      ..
    } => {
      expect_integer(cond, scopes)?;
      check_block(then, scopes)?;
      if let Some(else_body) = otherwise {
        check_block(else_body, scopes)?;
      }
      Ok(())
    }
    Stmt::While { cond, body, .. } => {
      expect_integer(cond, scopes)?;
      check_block(body, scopes)
    }
  }
}

fn check_block(stmts: &[Stmt], scopes: &mut Scopes) -> CompileResult<()> {
  scopes.push();
  let result = stmts.iter().try_for_each(|stmt| check_stmt(stmt, scopes));
  scopes.pop();
  result
}

fn check_expr(expr: &Expr, scopes: &mut Scopes) -> CompileResult<Type> {
  match expr {
    Expr::Num { .. } => Ok(Type::Int),
    Expr::Str { .. } => Ok(Type::Str),
    Expr::Var { name, pos } => match scopes.lookup(name) {
      Some(binding) => Ok(binding.ty),
      None => Err(CompileError::UndefinedIdentifier {
        pos: *pos,
        name: name.clone(),
      }),
    },
    Expr::Neg { operand, .. } => {
      expect_integer(operand, scopes)?;
      Ok(Type::Int)
    }
    Expr::Binary { lhs, rhs, .. } => {
      // All binary operators, comparisons included, work on integers and
      // produce an integer.
      expect_integer(lhs, scopes)?;
      expect_integer(rhs, scopes)?;
      Ok(Type::Int)
    }
    Expr::Assign { name, value, pos } => {
      let ty = check_expr(value, scopes)?;
      scopes.declare(name, ty, *pos)?;
      Ok(ty)
    }
  }
}

fn expect_integer(expr: &Expr, scopes: &mut Scopes) -> CompileResult<()> {
  let found = check_expr(expr, scopes)?;
  if found.is_integer() {
    Ok(())
  } else {
    Err(CompileError::TypeMismatch {
      pos: expr.pos(),
      expected: Type::Int,
      found,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::tokenizer::tokenize;

  fn check_source(source: &str) -> CompileResult<CheckedProgram> {
    check(parse(&tokenize(source).tokens, source)?)
  }

  #[test]
  fn undefined_identifiers_never_pass() {
    let err = check_source("print(undefinedVar)").unwrap_err();
    let CompileError::UndefinedIdentifier { name, .. } = err else {
      panic!("expected UndefinedIdentifier, got {err:?}");
    };
    assert_eq!(name, "undefinedVar");
  }

  #[test]
  fn first_assignment_declares() {
    assert!(check_source("x = 1\nprint(x)").is_ok());
    assert!(check_source("s = \"hi\"\nprint(s)").is_ok());
  }

  #[test]
  fn duplicate_declaration_in_one_frame_is_rejected() {
    let err = check_source("x = 1\nx = 2").unwrap_err();
    let CompileError::DuplicateDeclaration { name, previous, pos } = err else {
      panic!("expected DuplicateDeclaration, got {err:?}");
    };
    assert_eq!(name, "x");
    assert_eq!(previous.line, 1);
    assert_eq!(pos.line, 2);
  }

  #[test]
  fn inner_frames_shadow_and_expire() {
    // Shadowing in a block is allowed and the binding ends with the block.
    assert!(check_source("x = 1\nif x { x = 2\nprint(x) }").is_ok());
    let err = check_source("if 1 { y = 2 }\nprint(y)").unwrap_err();
    assert!(matches!(err, CompileError::UndefinedIdentifier { .. }));
  }

  #[test]
  fn binary_operands_must_be_integers() {
    let err = check_source("x = \"s\" + 1").unwrap_err();
    let CompileError::TypeMismatch { expected, found, .. } = err else {
      panic!("expected TypeMismatch, got {err:?}");
    };
    assert_eq!(expected, Type::Int);
    assert_eq!(found, Type::Str);
  }

  #[test]
  fn conditions_and_return_values_must_be_integers() {
    assert!(matches!(
      check_source("if \"s\" { print(1) }").unwrap_err(),
      CompileError::TypeMismatch { .. }
    ));
    assert!(matches!(
      check_source("return \"s\"").unwrap_err(),
      CompileError::TypeMismatch { .. }
    ));
    assert!(check_source("while 0 { print(1) }").is_ok());
  }
}
