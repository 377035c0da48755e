//! Lexical analysis: turns raw Piper source into a flat vector of tokens.
//!
//! The tokenizer is total – it never fails. Anything it cannot recognise
//! becomes an `Invalid` token carrying a diagnostic, which the parser turns
//! into a lexer-stage error. Multi-character punctuators are matched before
//! single-character ones to avoid ambiguity. Comments (`#` to end of line)
//! are dropped from the stream, but their spans are recorded so a
//! highlighting front-end can still paint them.

use std::fmt;

/// Reserved words of the language. `for` is reserved but has no production.
pub const KEYWORDS: [&str; 6] = ["print", "if", "else", "while", "for", "return"];

/// A position in the source text. `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
  pub offset: usize,
  pub line: usize,
  pub column: usize,
}

impl Pos {
  pub fn start() -> Self {
    Self {
      offset: 0,
      line: 1,
      column: 1,
    }
  }
}

impl fmt::Display for Pos {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.line, self.column)
  }
}

/// Kinds of tokens recognised by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
  Keyword,
  Ident,
  Num,
  Str,
  Punctuator,
  Newline,
  Invalid,
  Eof,
}

/// Thin wrapper for lexical information needed by later stages.
///
/// `value` carries the parsed payload of a `Num` token; `text` carries the
/// decoded payload of a `Str` token, or the diagnostic of an `Invalid` one.
/// The raw lexeme is always recoverable from the source via [`token_text`].
#[derive(Debug, Clone)]
pub struct Token {
  pub kind: TokenKind,
  pub value: Option<i64>,
  pub text: Option<String>,
  pub loc: Pos,
  pub len: usize,
}

impl Token {
  /// Convenience constructor to keep the `tokenize` loop readable.
  pub fn new(kind: TokenKind, loc: Pos, len: usize) -> Self {
    Self {
      kind,
      value: None,
      text: None,
      loc,
      len,
    }
  }

  pub fn with_value(mut self, value: i64) -> Self {
    self.value = Some(value);
    self
  }

  pub fn with_text(mut self, text: impl Into<String>) -> Self {
    self.text = Some(text.into());
    self
  }
}

/// Span of a `#` comment, kept for syntax-highlighting consumers.
#[derive(Debug, Clone, Copy)]
pub struct CommentSpan {
  pub pos: Pos,
  pub len: usize,
}

/// Everything the lexer produced: the token stream plus the comment spans
/// that were dropped from it.
#[derive(Debug, Clone)]
pub struct Lexed {
  pub tokens: Vec<Token>,
  pub comments: Vec<CommentSpan>,
}

/// Cursor over the source that keeps line/column bookkeeping in one place.
/// `bump` is the only way to advance, so positions cannot drift.
struct Cursor<'a> {
  src: &'a str,
  pos: Pos,
}

impl<'a> Cursor<'a> {
  fn new(src: &'a str) -> Self {
    Self {
      src,
      pos: Pos::start(),
    }
  }

  fn rest(&self) -> &'a str {
    &self.src[self.pos.offset..]
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos.offset += c.len_utf8();
    if c == '\n' {
      self.pos.line += 1;
      self.pos.column = 1;
    } else {
      self.pos.column += 1;
    }
    Some(c)
  }

  fn eat_while(&mut self, pred: impl Fn(char) -> bool) {
    while self.peek().is_some_and(&pred) {
      self.bump();
    }
  }
}

/// Lex the input into a token stream terminated by exactly one `Eof` marker.
/// Total: every input, however malformed, produces a stream.
pub fn tokenize(input: &str) -> Lexed {
  let mut tokens = Vec::new();
  let mut comments = Vec::new();
  let mut cur = Cursor::new(input);

  while let Some(c) = cur.peek() {
    let start = cur.pos;

    if c == '\n' {
      cur.bump();
      tokens.push(Token::new(TokenKind::Newline, start, 1));
      continue;
    }

    if c.is_whitespace() {
      cur.bump();
      continue;
    }

    if c == '#' {
      cur.eat_while(|c| c != '\n');
      comments.push(CommentSpan {
        pos: start,
        len: cur.pos.offset - start.offset,
      });
      continue;
    }

    if c.is_ascii_digit() {
      cur.eat_while(|c| c.is_ascii_digit());
      let text = &input[start.offset..cur.pos.offset];
      let token = match text.parse::<i64>() {
        Ok(value) => Token::new(TokenKind::Num, start, text.len()).with_value(value),
        Err(_) => Token::new(TokenKind::Invalid, start, text.len())
          .with_text(format!("number literal \"{text}\" does not fit in 64 bits")),
      };
      tokens.push(token);
      continue;
    }

    if c == '"' || c == '\'' {
      tokens.push(lex_string(&mut cur, c));
      continue;
    }

    if c.is_ascii_alphabetic() || c == '_' {
      cur.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
      let text = &input[start.offset..cur.pos.offset];
      let kind = if KEYWORDS.contains(&text) {
        TokenKind::Keyword
      } else {
        TokenKind::Ident
      };
      tokens.push(Token::new(kind, start, text.len()));
      continue;
    }

    if let Some(op) = ["==", "!=", "<=", ">="]
      .into_iter()
      .find(|op| cur.rest().starts_with(op))
    {
      cur.bump();
      cur.bump();
      tokens.push(Token::new(TokenKind::Punctuator, start, op.len()));
      continue;
    }

    if matches!(
      c,
      '+' | '-' | '*' | '/' | '(' | ')' | '{' | '}' | ';' | '=' | '<' | '>'
    ) {
      cur.bump();
      tokens.push(Token::new(TokenKind::Punctuator, start, 1));
      continue;
    }

    cur.bump();
    tokens.push(
      Token::new(TokenKind::Invalid, start, c.len_utf8())
        .with_text(format!("unexpected character '{c}'")),
    );
  }

  tokens.push(Token::new(TokenKind::Eof, cur.pos, 0));
  Lexed { tokens, comments }
}

/// Lex a string literal delimited by `quote` (`"` or `'`), decoding escapes.
/// The opening quote has not been consumed yet.
fn lex_string(cur: &mut Cursor, quote: char) -> Token {
  let start = cur.pos;
  cur.bump();
  let mut decoded = String::new();

  loop {
    match cur.peek() {
      None | Some('\n') => {
        let len = cur.pos.offset - start.offset;
        return Token::new(TokenKind::Invalid, start, len).with_text("unterminated string literal");
      }
      Some(c) if c == quote => {
        cur.bump();
        let len = cur.pos.offset - start.offset;
        return Token::new(TokenKind::Str, start, len).with_text(decoded);
      }
      Some('\\') => {
        cur.bump();
        let escape = cur.bump();
        match escape {
          Some('n') => decoded.push('\n'),
          Some('t') => decoded.push('\t'),
          Some('r') => decoded.push('\r'),
          Some('\\') => decoded.push('\\'),
          Some('"') => decoded.push('"'),
          Some('\'') => decoded.push('\''),
          other => {
            cur.eat_while(|c| c != '\n');
            let len = cur.pos.offset - start.offset;
            let what = other.map_or("end of line".to_string(), |c| format!("'\\{c}'"));
            return Token::new(TokenKind::Invalid, start, len)
              .with_text(format!("unknown escape {what} in string literal"));
          }
        }
      }
      Some(c) => {
        cur.bump();
        decoded.push(c);
      }
    }
  }
}

/// Return the slice from the source that produced this token.
pub fn token_text<'a>(token: &Token, source: &'a str) -> &'a str {
  let end = token.loc.offset + token.len;
  &source[token.loc.offset..end]
}

/// Human-friendly description used in diagnostics.
pub fn describe_token(token: Option<&Token>, source: &str) -> String {
  match token {
    Some(t) => match t.kind {
      TokenKind::Eof => "end of input".to_string(),
      TokenKind::Newline => "newline".to_string(),
      _ => token_text(t, source).to_string(),
    },
    None => "end of input".to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn kinds(source: &str) -> Vec<TokenKind> {
    tokenize(source).tokens.iter().map(|t| t.kind).collect()
  }

  #[test]
  fn stream_always_ends_in_eof() {
    for source in ["", "print", "1 + 2", "\u{1F980}", "\"open", "# only a comment"] {
      let lexed = tokenize(source);
      assert_eq!(lexed.tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
      let eofs = lexed
        .tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Eof)
        .count();
      assert_eq!(eofs, 1, "exactly one Eof for {source:?}");
    }
  }

  #[test]
  fn keywords_are_reserved() {
    let source = "print while forloop";
    let lexed = tokenize(source);
    assert_eq!(lexed.tokens[0].kind, TokenKind::Keyword);
    assert_eq!(lexed.tokens[1].kind, TokenKind::Keyword);
    // `forloop` is a plain identifier, not the keyword `for` plus `loop`.
    assert_eq!(lexed.tokens[2].kind, TokenKind::Ident);
    assert_eq!(token_text(&lexed.tokens[2], source), "forloop");
  }

  #[test]
  fn lexemes_cover_the_source() {
    let source = "x = 1 #note\nprint(\"hi\")";
    let lexed = tokenize(source);
    let mut covered: usize = lexed.tokens.iter().map(|t| t.len).sum();
    covered += lexed.comments.iter().map(|c| c.len).sum::<usize>();
    let blanks = source.chars().filter(|c| *c == ' ').count();
    assert_eq!(covered + blanks, source.len());
  }

  #[test]
  fn string_escapes_decode() {
    let lexed = tokenize(r#""a\tb\n" 'it\'s'"#);
    assert_eq!(lexed.tokens[0].text.as_deref(), Some("a\tb\n"));
    assert_eq!(lexed.tokens[1].text.as_deref(), Some("it's"));
  }

  #[test]
  fn bad_input_becomes_invalid_tokens() {
    assert_eq!(kinds("@"), vec![TokenKind::Invalid, TokenKind::Eof]);
    assert_eq!(kinds("\"open"), vec![TokenKind::Invalid, TokenKind::Eof]);
    assert_eq!(
      kinds("99999999999999999999"),
      vec![TokenKind::Invalid, TokenKind::Eof]
    );
    let lexed = tokenize(r#""bad \q escape""#);
    assert_eq!(lexed.tokens[0].kind, TokenKind::Invalid);
    assert!(lexed.tokens[0].text.as_deref().is_some_and(|t| t.contains("\\q")));
  }

  #[test]
  fn newlines_are_tokens_and_positions_track_lines() {
    let lexed = tokenize("a\n  b");
    assert_eq!(lexed.tokens[0].loc.line, 1);
    assert_eq!(lexed.tokens[1].kind, TokenKind::Newline);
    assert_eq!(lexed.tokens[2].loc.line, 2);
    assert_eq!(lexed.tokens[2].loc.column, 3);
  }

  #[test]
  fn comments_keep_their_spans() {
    let source = "# first\nprint(1) # second";
    let lexed = tokenize(source);
    assert_eq!(lexed.comments.len(), 2);
    assert_eq!(lexed.comments[0].pos.line, 1);
    assert_eq!(lexed.comments[0].len, "# first".len());
    assert_eq!(lexed.comments[1].pos.line, 2);
  }
}
