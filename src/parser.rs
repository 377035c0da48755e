//! Recursive-descent parser producing the Piper statement and expression AST.
//!
//! The parser mirrors the classic chibicc structure: a precedence-climbing
//! set of expression helpers plus a thin statement layer, so sequencing lives
//! outside the expression tree. Statements are terminated by a newline, a
//! `;`, or a closing `}`; blank lines between statements are skipped. The
//! parser stops at the first error and reports it with the offending token's
//! position – no multi-error batching.

use crate::error::{CompileError, CompileResult};
use crate::tokenizer::{Pos, Token, TokenKind, describe_token, token_text};

/// Binary operators recognised by the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
  Add,
  Sub,
  Mul,
  Div,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

impl BinaryOp {
  pub fn symbol(&self) -> &'static str {
    match self {
      BinaryOp::Add => "+",
      BinaryOp::Sub => "-",
      BinaryOp::Mul => "*",
      BinaryOp::Div => "/",
      BinaryOp::Eq => "==",
      BinaryOp::Ne => "!=",
      BinaryOp::Lt => "<",
      BinaryOp::Le => "<=",
      BinaryOp::Gt => ">",
      BinaryOp::Ge => ">=",
    }
  }
}

/// Expression tree produced by the parser. Every node owns its children and
/// remembers where it came from.
#[derive(Debug, Clone)]
pub enum Expr {
  Num {
    value: i64,
    pos: Pos,
  },
  Str {
    value: String,
    pos: Pos,
  },
  Var {
    name: String,
    pos: Pos,
  },
  Neg {
    operand: Box<Expr>,
    pos: Pos,
  },
  Binary {
    op: BinaryOp,
    lhs: Box<Expr>,
    rhs: Box<Expr>,
    pos: Pos,
  },
  Assign {
    name: String,
    value: Box<Expr>,
    pos: Pos,
  },
}

impl Expr {
  pub fn pos(&self) -> Pos {
    match self {
      Expr::Num { pos, .. }
      | Expr::Str { pos, .. }
      | Expr::Var { pos, .. }
      | Expr::Neg { pos, .. }
      | Expr::Binary { pos, .. }
      | Expr::Assign { pos, .. } => *pos,
    }
  }
}

/// One statement. Blocks are plain vectors; the tree is built once per
/// compile and owned exclusively top-down.
#[derive(Debug, Clone)]
pub enum Stmt {
  Print {
    arg: Expr,
    pos: Pos,
  },
  If {
    cond: Expr,
    then: Vec<Stmt>,
    otherwise: Option<Vec<Stmt>>,
    pos: Pos,
  },
  While {
    cond: Expr,
    body: Vec<Stmt>,
    pos: Pos,
  },
  Return {
    value: Option<Expr>,
    pos: Pos,
  },
  Expr {
    expr: Expr,
    pos: Pos,
  },
}

impl Stmt {
  pub fn pos(&self) -> Pos {
    match self {
      Stmt::Print { pos, .. }
      | Stmt::If { pos, .. }
      | Stmt::While { pos, .. }
      | Stmt::Return { pos, .. }
      | Stmt::Expr { pos, .. } => *pos,
    }
  }
}

/// A whole source file: `Program := Stmt* EOF`.
#[derive(Debug, Clone)]
pub struct Program {
  pub stmts: Vec<Stmt>,
}

/// Parse a token stream into a program. An `Invalid` token anywhere in the
/// stream surfaces here as a lexer-stage error; the lexer itself never fails.
pub fn parse(tokens: &[Token], source: &str) -> CompileResult<Program> {
  if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Invalid) {
    return Err(CompileError::Lex {
      pos: bad.loc,
      message: bad
        .text
        .clone()
        .unwrap_or_else(|| "invalid token".to_string()),
    });
  }

  let mut stream = TokenStream::new(tokens, source);
  let stmts = parse_stmts_until(&mut stream, None)?;
  Ok(Program { stmts })
}

/// Parse statements until `closer` (a punctuator such as `}`) or end of
/// input. The closer itself is not consumed.
fn parse_stmts_until(stream: &mut TokenStream, closer: Option<&str>) -> CompileResult<Vec<Stmt>> {
  let mut stmts = Vec::new();

  loop {
    stream.skip_newlines();
    if stream.is_eof() {
      if let Some(closer) = closer {
        return Err(stream.error_here(format!("expected \"{closer}\", but got end of input")));
      }
      return Ok(stmts);
    }
    if let Some(closer) = closer
      && stream.peek_punct(closer)
    {
      return Ok(stmts);
    }
    stmts.push(parse_stmt(stream)?);
  }
}

fn parse_stmt(stream: &mut TokenStream) -> CompileResult<Stmt> {
  if let Some(keyword) = stream.peek_keyword() {
    let pos = stream.current_pos();
    match keyword.as_str() {
      "print" => return parse_print(stream, pos),
      "if" => return parse_if(stream, pos),
      "while" => return parse_while(stream, pos),
      "return" => return parse_return(stream, pos),
      "else" => {
        return Err(stream.error_here("\"else\" without a preceding \"if\""));
      }
      "for" => {
        return Err(stream.error_here("\"for\" is reserved but not implemented"));
      }
      _ => {}
    }
  }

  let pos = stream.current_pos();
  let expr = parse_expr(stream)?;
  stream.expect_terminator()?;
  Ok(Stmt::Expr { expr, pos })
}

/// `PrintStmt := "print" "(" Expr ")" Term`
fn parse_print(stream: &mut TokenStream, pos: Pos) -> CompileResult<Stmt> {
  stream.advance();
  stream.skip("(")?;
  if stream.peek_punct(")") {
    return Err(stream.error_here("print needs an argument"));
  }
  let arg = parse_expr(stream)?;
  stream.skip(")")?;
  stream.expect_terminator()?;
  Ok(Stmt::Print { arg, pos })
}

/// `IfStmt := "if" Expr Block ("else" (Block | IfStmt))?`. The `else` must
/// follow the closing `}` on the same logical statement, i.e. before any
/// newline.
fn parse_if(stream: &mut TokenStream, pos: Pos) -> CompileResult<Stmt> {
  stream.advance();
  let cond = parse_expr(stream)?;
  let then = parse_block(stream)?;

  let otherwise = if stream.peek_keyword().as_deref() == Some("else") {
    stream.advance();
    if stream.peek_keyword().as_deref() == Some("if") {
      let else_pos = stream.current_pos();
      Some(vec![parse_if(stream, else_pos)?])
    } else {
      Some(parse_block(stream)?)
    }
  } else {
    None
  };

  Ok(Stmt::If {
    cond,
    then,
    otherwise,
    pos,
  })
}

/// `WhileStmt := "while" Expr Block`
fn parse_while(stream: &mut TokenStream, pos: Pos) -> CompileResult<Stmt> {
  stream.advance();
  let cond = parse_expr(stream)?;
  let body = parse_block(stream)?;
  Ok(Stmt::While { cond, body, pos })
}

/// `ReturnStmt := "return" Expr? Term`
fn parse_return(stream: &mut TokenStream, pos: Pos) -> CompileResult<Stmt> {
  stream.advance();
  let value = if stream.at_terminator() {
    None
  } else {
    Some(parse_expr(stream)?)
  };
  stream.expect_terminator()?;
  Ok(Stmt::Return { value, pos })
}

/// `Block := "{" Stmt* "}"`
fn parse_block(stream: &mut TokenStream) -> CompileResult<Vec<Stmt>> {
  stream.skip("{")?;
  let stmts = parse_stmts_until(stream, Some("}"))?;
  stream.skip("}")?;
  Ok(stmts)
}

fn parse_expr(stream: &mut TokenStream) -> CompileResult<Expr> {
  parse_assign(stream)
}

/// `Assign := Equality ("=" Assign)?` – right-associative, and the left side
/// must be a plain identifier.
fn parse_assign(stream: &mut TokenStream) -> CompileResult<Expr> {
  let node = parse_equality(stream)?;

  if stream.peek_punct("=") {
    let eq_pos = stream.current_pos();
    stream.advance();
    let Expr::Var { name, pos } = node else {
      return Err(CompileError::Syntax {
        pos: eq_pos,
        message: "left side of \"=\" must be an identifier".to_string(),
      });
    };
    let value = parse_assign(stream)?;
    return Ok(Expr::Assign {
      name,
      value: Box::new(value),
      pos,
    });
  }

  Ok(node)
}

fn parse_equality(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_relational(stream)?;

  loop {
    let op = match stream.peek_punct_text() {
      Some("==") => BinaryOp::Eq,
      Some("!=") => BinaryOp::Ne,
      _ => break,
    };
    let pos = stream.current_pos();
    stream.advance();
    let rhs = parse_relational(stream)?;
    node = binary(op, node, rhs, pos);
  }

  Ok(node)
}

fn parse_relational(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_add(stream)?;

  loop {
    let op = match stream.peek_punct_text() {
      Some("<") => BinaryOp::Lt,
      Some("<=") => BinaryOp::Le,
      Some(">") => BinaryOp::Gt,
      Some(">=") => BinaryOp::Ge,
      _ => break,
    };
    let pos = stream.current_pos();
    stream.advance();
    let rhs = parse_add(stream)?;
    node = binary(op, node, rhs, pos);
  }

  Ok(node)
}

fn parse_add(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_mul(stream)?;

  loop {
    let op = match stream.peek_punct_text() {
      Some("+") => BinaryOp::Add,
      Some("-") => BinaryOp::Sub,
      _ => break,
    };
    let pos = stream.current_pos();
    stream.advance();
    let rhs = parse_mul(stream)?;
    node = binary(op, node, rhs, pos);
  }

  Ok(node)
}

fn parse_mul(stream: &mut TokenStream) -> CompileResult<Expr> {
  let mut node = parse_unary(stream)?;

  loop {
    let op = match stream.peek_punct_text() {
      Some("*") => BinaryOp::Mul,
      Some("/") => BinaryOp::Div,
      _ => break,
    };
    let pos = stream.current_pos();
    stream.advance();
    let rhs = parse_unary(stream)?;
    node = binary(op, node, rhs, pos);
  }

  Ok(node)
}

fn parse_unary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.peek_punct("+") {
    stream.advance();
    return parse_unary(stream);
  }

  if stream.peek_punct("-") {
    let pos = stream.current_pos();
    stream.advance();
    let operand = parse_unary(stream)?;
    return Ok(Expr::Neg {
      operand: Box::new(operand),
      pos,
    });
  }

  parse_primary(stream)
}

/// `Primary := NUM | STR | IDENT | "(" Expr ")"`
fn parse_primary(stream: &mut TokenStream) -> CompileResult<Expr> {
  if stream.peek_punct("(") {
    stream.advance();
    let node = parse_expr(stream)?;
    stream.skip(")")?;
    return Ok(node);
  }

  let pos = stream.current_pos();
  match stream.peek_kind() {
    Some(TokenKind::Num) => {
      let value = stream.take_value();
      Ok(Expr::Num { value, pos })
    }
    Some(TokenKind::Str) => {
      let value = stream.take_text();
      Ok(Expr::Str { value, pos })
    }
    Some(TokenKind::Ident) => {
      let name = stream.take_lexeme();
      Ok(Expr::Var { name, pos })
    }
    _ => {
      let got = stream.describe_current();
      Err(stream.error_here(format!("expected an expression, but got \"{got}\"")))
    }
  }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, pos: Pos) -> Expr {
  Expr::Binary {
    op,
    lhs: Box::new(lhs),
    rhs: Box::new(rhs),
    pos,
  }
}

/// Lightweight cursor over the token slice.
struct TokenStream<'a> {
  tokens: &'a [Token],
  source: &'a str,
  pos: usize,
}

impl<'a> TokenStream<'a> {
  fn new(tokens: &'a [Token], source: &'a str) -> Self {
    Self {
      tokens,
      source,
      pos: 0,
    }
  }

  fn peek(&self) -> Option<&Token> {
    self.tokens.get(self.pos)
  }

  fn peek_kind(&self) -> Option<TokenKind> {
    self.peek().map(|t| t.kind)
  }

  fn advance(&mut self) {
    if self.pos < self.tokens.len() {
      self.pos += 1;
    }
  }

  /// Position of the current token, or just past the source on overrun.
  fn current_pos(&self) -> Pos {
    match self.peek() {
      Some(token) => token.loc,
      None => self
        .tokens
        .last()
        .map(|t| t.loc)
        .unwrap_or_else(Pos::start),
    }
  }

  fn describe_current(&self) -> String {
    describe_token(self.peek(), self.source)
  }

  fn error_here(&self, message: impl Into<String>) -> CompileError {
    CompileError::Syntax {
      pos: self.current_pos(),
      message: message.into(),
    }
  }

  fn peek_punct_text(&self) -> Option<&'a str> {
    self
      .peek()
      .filter(|t| t.kind == TokenKind::Punctuator)
      .map(|t| token_text(t, self.source))
  }

  fn peek_punct(&self, op: &str) -> bool {
    self.peek_punct_text() == Some(op)
  }

  fn peek_keyword(&self) -> Option<String> {
    self
      .peek()
      .filter(|t| t.kind == TokenKind::Keyword)
      .map(|t| token_text(t, self.source).to_string())
  }

  fn skip(&mut self, op: &str) -> CompileResult<()> {
    if self.peek_punct(op) {
      self.advance();
      Ok(())
    } else {
      let got = self.describe_current();
      Err(self.error_here(format!("expected \"{op}\", but got \"{got}\"")))
    }
  }

  fn skip_newlines(&mut self) {
    while self.peek_kind() == Some(TokenKind::Newline) {
      self.advance();
    }
  }

  /// True when the current token can end a statement without being consumed.
  fn at_terminator(&self) -> bool {
    self.is_eof()
      || self.peek_kind() == Some(TokenKind::Newline)
      || self.peek_punct(";")
      || self.peek_punct("}")
  }

  /// Consume a statement terminator: a newline or `;`, or lookahead at `}`
  /// or end of input.
  fn expect_terminator(&mut self) -> CompileResult<()> {
    if self.is_eof() || self.peek_punct("}") {
      return Ok(());
    }
    if self.peek_kind() == Some(TokenKind::Newline) || self.peek_punct(";") {
      self.advance();
      return Ok(());
    }
    let got = self.describe_current();
    Err(self.error_here(format!(
      "expected a newline or \";\" after statement, but got \"{got}\""
    )))
  }

  /// Consume the current `Num` token. Callers check the kind first.
  fn take_value(&mut self) -> i64 {
    let value = self.peek().and_then(|t| t.value).unwrap_or_default();
    self.advance();
    value
  }

  /// Consume the current `Str` token. Callers check the kind first.
  fn take_text(&mut self) -> String {
    let text = self.peek().and_then(|t| t.text.clone()).unwrap_or_default();
    self.advance();
    text
  }

  /// Consume the current token, returning its raw lexeme.
  fn take_lexeme(&mut self) -> String {
    let text = self
      .peek()
      .map(|t| token_text(t, self.source).to_string())
      .unwrap_or_default();
    self.advance();
    text
  }

  fn is_eof(&self) -> bool {
    matches!(self.peek_kind(), None | Some(TokenKind::Eof))
  }
}

/// Canonical printer for a program. Parsing its output reproduces the same
/// tree, which is what the round-trip tests lean on; the execution trace
/// uses [`unparse_expr`] for single statements.
pub fn unparse(program: &Program) -> String {
  let mut out = String::new();
  for stmt in &program.stmts {
    write_stmt(stmt, 0, &mut out);
  }
  out
}

fn write_stmt(stmt: &Stmt, indent: usize, out: &mut String) {
  let pad = "  ".repeat(indent);
  match stmt {
    Stmt::Print { arg, .. } => {
      out.push_str(&format!("{pad}print({})\n", unparse_expr(arg)));
    }
    Stmt::Expr { expr, .. } => {
      out.push_str(&format!("{pad}{}\n", unparse_expr(expr)));
    }
    Stmt::Return { value: None, .. } => {
      out.push_str(&format!("{pad}return\n"));
    }
    Stmt::Return {
      value: Some(value), ..
    } => {
      out.push_str(&format!("{pad}return {}\n", unparse_expr(value)));
    }
    Stmt::While { cond, body, .. } => {
      out.push_str(&format!("{pad}while {} {{\n", unparse_expr(cond)));
      for stmt in body {
        write_stmt(stmt, indent + 1, out);
      }
      out.push_str(&format!("{pad}}}\n"));
    }
    Stmt::If {
      cond,
      then,
      otherwise,
      ..
    } => {
      out.push_str(&format!("{pad}if {} {{\n", unparse_expr(cond)));
      for stmt in then {
        write_stmt(stmt, indent + 1, out);
      }
      match otherwise {
        None => out.push_str(&format!("{pad}}}\n")),
        Some(else_body) => {
          out.push_str(&format!("{pad}}} else {{\n"));
          for stmt in else_body {
            write_stmt(stmt, indent + 1, out);
          }
          out.push_str(&format!("{pad}}}\n"));
        }
      }
    }
  }
}

/// Render one expression back to source form. Binary and unary nodes are
/// fully parenthesised so the printed text re-parses to the same shape.
pub fn unparse_expr(expr: &Expr) -> String {
  match expr {
    Expr::Num { value, .. } => value.to_string(),
    Expr::Str { value, .. } => quote_string(value),
    Expr::Var { name, .. } => name.clone(),
    Expr::Neg { operand, .. } => format!("(-{})", unparse_expr(operand)),
    Expr::Binary { op, lhs, rhs, .. } => format!(
      "({} {} {})",
      unparse_expr(lhs),
      op.symbol(),
      unparse_expr(rhs)
    ),
    Expr::Assign { name, value, .. } => format!("{name} = {}", unparse_expr(value)),
  }
}

fn quote_string(value: &str) -> String {
  let mut out = String::with_capacity(value.len() + 2);
  out.push('"');
  for c in value.chars() {
    match c {
      '\n' => out.push_str("\\n"),
      '\t' => out.push_str("\\t"),
      '\r' => out.push_str("\\r"),
      '\\' => out.push_str("\\\\"),
      '"' => out.push_str("\\\""),
      _ => out.push(c),
    }
  }
  out.push('"');
  out
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tokenizer::tokenize;

  fn parse_source(source: &str) -> CompileResult<Program> {
    parse(&tokenize(source).tokens, source)
  }

  #[test]
  fn parses_a_print_statement() {
    let program = parse_source("print(\"hi\")").unwrap();
    assert_eq!(program.stmts.len(), 1);
    let Stmt::Print { arg, .. } = &program.stmts[0] else {
      panic!("expected a print statement");
    };
    let Expr::Str { value, .. } = arg else {
      panic!("expected a string argument");
    };
    assert_eq!(value, "hi");
  }

  #[test]
  fn empty_program_is_valid() {
    let program = parse_source("").unwrap();
    assert!(program.stmts.is_empty());
    let program = parse_source("\n\n# just a comment\n").unwrap();
    assert!(program.stmts.is_empty());
  }

  #[test]
  fn unterminated_print_reports_end_of_input() {
    let err = parse_source("print(").unwrap_err();
    let CompileError::Syntax { pos, message } = err else {
      panic!("expected a syntax error, got {err:?}");
    };
    assert_eq!(pos.offset, "print(".len());
    assert!(message.contains("end of input"));
  }

  #[test]
  fn empty_print_argument_is_its_own_error() {
    let err = parse_source("print()").unwrap_err();
    assert!(err.to_string().contains("print needs an argument"));
  }

  #[test]
  fn unbalanced_parens_point_at_the_gap() {
    let err = parse_source("print((1 + 2)").unwrap_err();
    assert!(err.to_string().contains("expected \")\""));
  }

  #[test]
  fn missing_terminator_is_reported() {
    let err = parse_source("print(1) print(2)").unwrap_err();
    assert!(err.to_string().contains("after statement"));
  }

  #[test]
  fn invalid_tokens_surface_as_lex_errors() {
    let err = parse_source("print(@)").unwrap_err();
    assert!(matches!(err, CompileError::Lex { .. }));
  }

  #[test]
  fn reserved_for_and_stray_else_are_rejected() {
    let err = parse_source("for x { }").unwrap_err();
    assert!(err.to_string().contains("\"for\" is reserved"));
    let err = parse_source("else { }").unwrap_err();
    assert!(err.to_string().contains("without a preceding \"if\""));
  }

  #[test]
  fn if_else_chains_nest() {
    let program = parse_source("if x { print(1) } else if y { print(2) } else { print(3) }");
    let program = program.unwrap();
    let Stmt::If { otherwise, .. } = &program.stmts[0] else {
      panic!("expected an if statement");
    };
    let nested = otherwise.as_ref().unwrap();
    assert!(matches!(nested[0], Stmt::If { .. }));
  }

  #[test]
  fn assignment_requires_an_identifier_target() {
    let err = parse_source("1 = 2").unwrap_err();
    assert!(err.to_string().contains("must be an identifier"));
  }

  #[test]
  fn precedence_follows_the_ladder() {
    let program = parse_source("x = 1 + 2 * 3 == 7").unwrap();
    assert_eq!(
      unparse(&program).trim_end(),
      "x = ((1 + (2 * 3)) == 7)"
    );
  }

  #[test]
  fn parse_unparse_is_idempotent() {
    let sources = [
      "print(\"Hello, World!\")",
      "x = 1\nwhile x < 10 { x = x + 1; print(x) }",
      "if a == b { print(\"eq\") } else { print(\"ne\") }",
      "return (-1) + 2\nprint('quotes \"inside\"')",
    ];
    for source in sources {
      let once = unparse(&parse_source(source).unwrap());
      let twice = unparse(&parse_source(&once).unwrap());
      assert_eq!(once, twice, "unparse not canonical for {source:?}");
    }
  }
}
