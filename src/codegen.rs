//! Code generation: lower a checked program into GAS-syntax assembly for an
//! explicitly chosen target.
//!
//! The instruction selection is deliberately tiny: each `print` of a string
//! literal becomes a `.data` entry plus a raw `write` syscall, and the
//! program ends with an `exit(0)` syscall. Everything else is rejected up
//! front with `UnsupportedConstruct` – the generator never emits a wrong or
//! empty program for source it does not understand. The target architecture
//! is a caller-supplied parameter, never detected from the host, so the same
//! source produces byte-identical assembly on any machine.

use std::fmt;
use std::str::FromStr;

use crate::error::{CompileError, CompileResult};
use crate::parser::{Expr, Program, Stmt, unparse_expr};
use crate::sema::CheckedProgram;

/// Target architecture for code generation. All three use the Linux syscall
/// ABI; they differ in syscall numbers, registers and the trap instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Arch {
  X86_64,
  Arm,
  /// 32-bit x86, the documented fallback target.
  #[default]
  X86,
}

impl Arch {
  pub fn name(&self) -> &'static str {
    match self {
      Arch::X86_64 => "x86-64",
      Arch::Arm => "arm",
      Arch::X86 => "x86",
    }
  }

  /// Comment leader accepted by GNU `as` for this target.
  fn comment_leader(&self) -> &'static str {
    match self {
      Arch::X86_64 | Arch::X86 => "#",
      Arch::Arm => "@",
    }
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Arch {
  type Err = CompileError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "x86-64" | "x86_64" | "amd64" => Ok(Arch::X86_64),
      "arm" | "arm32" | "armv7" => Ok(Arch::Arm),
      "x86" | "i386" | "i686" | "default" => Ok(Arch::X86),
      _ => Err(CompileError::UnknownArchitecture {
        name: s.to_string(),
      }),
    }
  }
}

/// One emitted assembly line. Immutable after emission; an ordered vector of
/// these is the output program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
  pub kind: InstrKind,
  pub mnemonic: String,
  pub operands: String,
  pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrKind {
  /// A machine instruction, rendered indented.
  Op,
  /// An assembler directive such as `.section` or `.ascii`.
  Directive,
  /// A label definition, rendered flush left with a trailing colon.
  Label,
}

impl Instruction {
  fn op(mnemonic: &str, operands: impl Into<String>) -> Self {
    Self {
      kind: InstrKind::Op,
      mnemonic: mnemonic.to_string(),
      operands: operands.into(),
      comment: None,
    }
  }

  fn directive(mnemonic: &str, operands: impl Into<String>) -> Self {
    Self {
      kind: InstrKind::Directive,
      mnemonic: mnemonic.to_string(),
      operands: operands.into(),
      comment: None,
    }
  }

  fn label(name: impl Into<String>) -> Self {
    Self {
      kind: InstrKind::Label,
      mnemonic: name.into(),
      operands: String::new(),
      comment: None,
    }
  }

  fn with_comment(mut self, comment: impl Into<String>) -> Self {
    self.comment = Some(comment.into());
    self
  }
}

/// Reject everything the instruction selection does not cover, naming the
/// construct. Shared with the interpreter so both execution strategies
/// accept exactly the same programs.
///
/// The scan runs in two phases: control-flow statements first, so a program
/// shaped by an unsupported `while` is reported as `while` even when its body
/// also contains unsupported expressions.
pub(crate) fn ensure_supported(program: &Program) -> CompileResult<()> {
  for stmt in &program.stmts {
    scan_control_flow(stmt)?;
  }
  for stmt in &program.stmts {
    scan_stmt_exprs(stmt)?;
  }
  Ok(())
}

fn scan_control_flow(stmt: &Stmt) -> CompileResult<()> {
  let construct = match stmt {
    Stmt::If { .. } => "\"if\"",
    Stmt::While { .. } => "\"while\"",
    Stmt::Return { .. } => "\"return\"",
    Stmt::Print { .. } | Stmt::Expr { .. } => return Ok(()),
  };
  Err(CompileError::UnsupportedConstruct {
    pos: stmt.pos(),
    construct: construct.to_string(),
  })
}

fn scan_stmt_exprs(stmt: &Stmt) -> CompileResult<()> {
  match stmt {
    Stmt::Print { arg, .. } => match arg {
      Expr::Str { .. } => Ok(()),
      other => Err(unsupported_expr(other, true)),
    },
    Stmt::Expr { expr, .. } => Err(unsupported_expr(expr, false)),
    // Rejected by the control-flow phase already.
    Stmt::If { .. } | Stmt::While { .. } | Stmt::Return { .. } => Ok(()),
  }
}

fn unsupported_expr(expr: &Expr, printing: bool) -> CompileError {
  let construct = match (expr, printing) {
    (Expr::Assign { .. }, _) => "assignment".to_string(),
    (Expr::Binary { op, .. }, _) => format!("\"{}\"", op.symbol()),
    (Expr::Neg { .. }, _) => "unary minus".to_string(),
    (Expr::Num { .. } | Expr::Var { .. }, true) => {
      format!("printing a non-literal value ({})", unparse_expr(expr))
    }
    (_, true) => format!("printing {}", unparse_expr(expr)),
    (_, false) => format!("expression statement ({})", unparse_expr(expr)),
  };
  CompileError::UnsupportedConstruct {
    pos: expr.pos(),
    construct,
  }
}

/// Collect the string literals a supported program prints, in order.
fn print_literals(program: &Program) -> Vec<&str> {
  program
    .stmts
    .iter()
    .filter_map(|stmt| match stmt {
      Stmt::Print {
        arg: Expr::Str { value, .. },
        ..
      } => Some(value.as_str()),
      _ => None,
    })
    .collect()
}

/// Lower a checked program into an instruction sequence for `arch`.
pub fn generate(checked: &CheckedProgram, arch: Arch) -> CompileResult<Vec<Instruction>> {
  let program = checked.program();
  ensure_supported(program)?;

  let literals = print_literals(program);
  let mut out = Vec::new();

  if !literals.is_empty() {
    out.push(Instruction::directive(".section", ".data"));
    for (index, literal) in literals.iter().enumerate() {
      out.push(Instruction::label(format!("msg{index}")));
      // The emitted buffer carries the trailing newline; `print` always
      // ends the line.
      out.push(Instruction::directive(
        ".ascii",
        format!("\"{}\\n\"", escape_ascii(literal)),
      ));
      out.push(Instruction::directive(
        ".set",
        format!("len{index}, . - msg{index}"),
      ));
    }
  }

  out.push(Instruction::directive(".section", ".text"));
  out.push(Instruction::directive(".global", "main"));
  out.push(Instruction::label("main"));

  for index in 0..literals.len() {
    emit_write(&mut out, arch, index);
  }
  emit_exit(&mut out, arch);

  Ok(out)
}

/// `write(1, msgN, lenN)` in the target's syscall convention.
fn emit_write(out: &mut Vec<Instruction>, arch: Arch, index: usize) {
  match arch {
    Arch::X86_64 => {
      out.push(
        Instruction::op("mov", "$1, %rax").with_comment(format!("write(1, msg{index}, len{index})")),
      );
      out.push(Instruction::op("mov", "$1, %rdi"));
      out.push(Instruction::op("lea", format!("msg{index}(%rip), %rsi")));
      out.push(Instruction::op("mov", format!("$len{index}, %rdx")));
      out.push(Instruction::op("syscall", ""));
    }
    Arch::X86 => {
      out.push(
        Instruction::op("mov", "$4, %eax").with_comment(format!("write(1, msg{index}, len{index})")),
      );
      out.push(Instruction::op("mov", "$1, %ebx"));
      out.push(Instruction::op("mov", format!("$msg{index}, %ecx")));
      out.push(Instruction::op("mov", format!("$len{index}, %edx")));
      out.push(Instruction::op("int", "$0x80"));
    }
    Arch::Arm => {
      out.push(Instruction::op("mov", "r7, #4").with_comment(format!(
        "write(1, msg{index}, len{index})"
      )));
      out.push(Instruction::op("mov", "r0, #1"));
      out.push(Instruction::op("ldr", format!("r1, =msg{index}")));
      out.push(Instruction::op("ldr", format!("r2, =len{index}")));
      out.push(Instruction::op("svc", "#0"));
    }
  }
}

/// `exit(0)` in the target's syscall convention.
fn emit_exit(out: &mut Vec<Instruction>, arch: Arch) {
  match arch {
    Arch::X86_64 => {
      out.push(Instruction::op("mov", "$60, %rax").with_comment("exit(0)"));
      out.push(Instruction::op("mov", "$0, %rdi"));
      out.push(Instruction::op("syscall", ""));
    }
    Arch::X86 => {
      out.push(Instruction::op("mov", "$1, %eax").with_comment("exit(0)"));
      out.push(Instruction::op("mov", "$0, %ebx"));
      out.push(Instruction::op("int", "$0x80"));
    }
    Arch::Arm => {
      out.push(Instruction::op("mov", "r7, #1").with_comment("exit(0)"));
      out.push(Instruction::op("mov", "r0, #0"));
      out.push(Instruction::op("svc", "#0"));
    }
  }
}

/// Render an instruction sequence as assembly text GNU `as` accepts.
pub fn render(instructions: &[Instruction], arch: Arch) -> String {
  let leader = arch.comment_leader();
  let mut asm = String::new();
  for ins in instructions {
    match ins.kind {
      InstrKind::Label => asm.push_str(&format!("{}:", ins.mnemonic)),
      InstrKind::Directive | InstrKind::Op => {
        if ins.operands.is_empty() {
          asm.push_str(&format!("  {}", ins.mnemonic));
        } else {
          asm.push_str(&format!("  {} {}", ins.mnemonic, ins.operands));
        }
      }
    }
    if let Some(comment) = &ins.comment {
      asm.push_str(&format!("  {leader} {comment}"));
    }
    asm.push('\n');
  }
  asm
}

/// Escape a literal for a double-quoted `.ascii` directive. Non-printable
/// bytes fall back to octal escapes.
fn escape_ascii(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for byte in text.bytes() {
    match byte {
      b'\\' => out.push_str("\\\\"),
      b'"' => out.push_str("\\\""),
      b'\n' => out.push_str("\\n"),
      b'\t' => out.push_str("\\t"),
      b'\r' => out.push_str("\\r"),
      0x20..=0x7e => out.push(byte as char),
      other => out.push_str(&format!("\\{other:03o}")),
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::parser::parse;
  use crate::sema::check;
  use crate::tokenizer::tokenize;

  fn checked(source: &str) -> CheckedProgram {
    check(parse(&tokenize(source).tokens, source).unwrap()).unwrap()
  }

  fn asm(source: &str, arch: Arch) -> String {
    render(&generate(&checked(source), arch).unwrap(), arch)
  }

  #[test]
  fn arch_parses_spelling_variants_and_rejects_the_rest() {
    assert_eq!("x86_64".parse::<Arch>().unwrap(), Arch::X86_64);
    assert_eq!("ARM".parse::<Arch>().unwrap(), Arch::Arm);
    assert_eq!("default".parse::<Arch>().unwrap(), Arch::X86);
    assert_eq!(Arch::default(), Arch::X86);
    let err = "mips".parse::<Arch>().unwrap_err();
    assert!(matches!(err, CompileError::UnknownArchitecture { .. }));
  }

  #[test]
  fn print_emits_data_and_a_write_syscall() {
    let asm = asm("print(\"Hello, World!\")", Arch::X86_64);
    assert!(asm.contains("msg0:"));
    assert!(asm.contains(".ascii \"Hello, World!\\n\""));
    assert!(asm.contains("lea msg0(%rip), %rsi"));
    assert!(asm.contains("mov $60, %rax"));
  }

  #[test]
  fn assembly_differs_per_arch() {
    let source = "print(\"hi\")";
    let x64 = asm(source, Arch::X86_64);
    let x86 = asm(source, Arch::X86);
    let arm = asm(source, Arch::Arm);
    assert!(x64.contains("syscall") && !x64.contains("int $0x80"));
    assert!(x86.contains("int $0x80"));
    assert!(arm.contains("svc #0") && arm.contains("@ exit(0)"));
    assert_ne!(x64, x86);
    assert_ne!(x86, arm);
  }

  #[test]
  fn output_is_deterministic() {
    let source = "print(\"a\")\nprint(\"b\")";
    assert_eq!(asm(source, Arch::X86_64), asm(source, Arch::X86_64));
    let asm = asm(source, Arch::X86_64);
    assert!(asm.contains("msg0:") && asm.contains("msg1:"));
  }

  #[test]
  fn empty_program_compiles_to_bare_exit() {
    let instructions = generate(&checked(""), Arch::X86).unwrap();
    let asm = render(&instructions, Arch::X86);
    assert!(!asm.contains(".data"));
    assert!(asm.contains("mov $1, %eax"));
  }

  #[test]
  fn control_flow_is_reported_before_expressions() {
    let err = generate(&checked("x = 1\nwhile x { print(x) }"), Arch::X86_64).unwrap_err();
    let CompileError::UnsupportedConstruct { construct, .. } = err else {
      panic!("expected UnsupportedConstruct, got {err:?}");
    };
    assert!(construct.contains("while"));
  }

  #[test]
  fn unsupported_expressions_are_named() {
    let err = generate(&checked("x = 1"), Arch::X86_64).unwrap_err();
    let CompileError::UnsupportedConstruct { construct, .. } = err else {
      panic!("expected UnsupportedConstruct, got {err:?}");
    };
    assert_eq!(construct, "assignment");

    let err = generate(&checked("print(1 + 2)"), Arch::X86_64).unwrap_err();
    assert!(err.to_string().contains("\"+\""));

    let err = generate(&checked("print(7)"), Arch::X86_64).unwrap_err();
    assert!(err.to_string().contains("non-literal"));
  }

  #[test]
  fn literals_escape_cleanly() {
    let asm = asm("print(\"say \\\"hi\\\"\\tok\")", Arch::X86);
    assert!(asm.contains(r#".ascii "say \"hi\"\tok\n""#));
  }
}
