//! SQL statement scanning for `pg_dump` plain-text output.
//!
//! The scanner only needs to find statement boundaries, so it tracks the
//! constructs that can hide a `;` (string literals, quoted identifiers,
//! dollar-quoted bodies and comments) and otherwise passes text through.

use std::sync::Arc;

use crate::error::{ExtractError, Result};

/// Lexical context carried from one input line to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    Normal,
    /// `'...'`; `escapes` is set for `E'...'` strings.
    Quoted { escapes: bool },
    QuotedIdent,
    /// Inside `$tag$ ... $tag$`; holds the full delimiter.
    Dollar(String),
    LineComment,
    BlockComment(u32),
}

/// Splits a stream of SQL text into statements.
#[derive(Debug)]
pub struct StatementScanner {
    state: ScanState,
    current: Vec<u8>,
}

impl Default for StatementScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementScanner {
    /// Create a scanner positioned between statements.
    pub fn new() -> Self {
        Self {
            state: ScanState::Normal,
            current: Vec::with_capacity(256),
        }
    }

    /// Discard any partial statement and return to the initial state.
    pub fn reset(&mut self) {
        self.state = ScanState::Normal;
        self.current.clear();
    }

    /// Describe the construct left open, if the input stopped inside one.
    pub fn unterminated(&self) -> Option<&'static str> {
        match self.state {
            ScanState::Quoted { .. } => Some("a string literal"),
            ScanState::QuotedIdent => Some("a quoted identifier"),
            ScanState::Dollar(_) => Some("a dollar-quoted string"),
            ScanState::BlockComment(_) => Some("a block comment"),
            ScanState::Normal | ScanState::LineComment => None,
        }
    }

    /// Scan one chunk of input (normally a line including its newline).
    ///
    /// Each statement completed by a `;` in this chunk is appended to `out`,
    /// trimmed and without the terminator. Comments are replaced by a
    /// single space.
    pub fn feed<E: Extend<String>>(&mut self, text: &str, out: &mut E) {
        let bytes = text.as_bytes();
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();

            match &mut self.state {
                ScanState::Normal => match b {
                    b';' => {
                        let stmt = String::from_utf8_lossy(&self.current).trim().to_string();
                        self.current.clear();
                        if !stmt.is_empty() {
                            out.extend(std::iter::once(stmt));
                        }
                    }
                    b'\'' => {
                        let escapes = self.has_escape_prefix();
                        self.current.push(b);
                        self.state = ScanState::Quoted { escapes };
                    }
                    b'"' => {
                        self.current.push(b);
                        self.state = ScanState::QuotedIdent;
                    }
                    b'$' => {
                        if let Some(tag) = self.dollar_tag(&text[i..]) {
                            self.current.extend_from_slice(tag.as_bytes());
                            i += tag.len();
                            self.state = ScanState::Dollar(tag);
                            continue;
                        }
                        self.current.push(b);
                    }
                    b'-' if next == Some(b'-') => {
                        self.state = ScanState::LineComment;
                        i += 2;
                        continue;
                    }
                    b'/' if next == Some(b'*') => {
                        self.current.push(b' ');
                        self.state = ScanState::BlockComment(1);
                        i += 2;
                        continue;
                    }
                    _ => self.current.push(b),
                },

                ScanState::Quoted { escapes } => {
                    if *escapes && b == b'\\' {
                        self.current.push(b);
                        if let Some(n) = next {
                            self.current.push(n);
                            i += 1;
                        }
                    } else if b == b'\'' {
                        self.current.push(b);
                        if next == Some(b'\'') {
                            self.current.push(b'\'');
                            i += 1;
                        } else {
                            self.state = ScanState::Normal;
                        }
                    } else {
                        self.current.push(b);
                    }
                }

                ScanState::QuotedIdent => {
                    self.current.push(b);
                    if b == b'"' {
                        if next == Some(b'"') {
                            self.current.push(b'"');
                            i += 1;
                        } else {
                            self.state = ScanState::Normal;
                        }
                    }
                }

                ScanState::Dollar(tag) => {
                    if b == b'$' && text[i..].starts_with(tag.as_str()) {
                        let len = tag.len();
                        self.current.extend_from_slice(&bytes[i..i + len]);
                        self.state = ScanState::Normal;
                        i += len;
                        continue;
                    }
                    self.current.push(b);
                }

                ScanState::LineComment => {
                    if b == b'\n' {
                        self.current.push(b'\n');
                        self.state = ScanState::Normal;
                    }
                }

                ScanState::BlockComment(depth) => {
                    if b == b'/' && next == Some(b'*') {
                        *depth += 1;
                        i += 2;
                        continue;
                    }
                    if b == b'*' && next == Some(b'/') {
                        *depth -= 1;
                        if *depth == 0 {
                            self.current.push(b' ');
                            self.state = ScanState::Normal;
                        }
                        i += 2;
                        continue;
                    }
                }
            }

            i += 1;
        }
    }

    /// `E'...'` or `e'...'`, where the `E` is not the tail of a longer word.
    fn has_escape_prefix(&self) -> bool {
        match self.current.as_slice() {
            [.., prev, b'E' | b'e'] => !is_ident_byte(*prev),
            [b'E' | b'e'] => true,
            _ => false,
        }
    }

    /// Match an opening `$tag$` / `$$` at the start of `rest`.
    ///
    /// A `$` that continues an identifier (`foo$bar`) or starts a positional
    /// parameter (`$1`) is not a delimiter.
    fn dollar_tag(&self, rest: &str) -> Option<String> {
        if self.current.last().copied().is_some_and(is_ident_byte) {
            return None;
        }

        let bytes = rest.as_bytes();
        let mut j = 1;
        while j < bytes.len() && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_') {
            if j == 1 && bytes[j].is_ascii_digit() {
                return None;
            }
            j += 1;
        }

        if bytes.get(j) == Some(&b'$') {
            Some(rest[..=j].to_string())
        } else {
            None
        }
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Header of a `COPY ... FROM stdin;` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHeader {
    /// Schema qualifier, if present.
    pub schema: Option<String>,
    /// Unqualified table name.
    pub table: String,
    /// Column names in data order.
    pub columns: Arc<[String]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Unquoted identifier or key word, lower-cased.
    Word(String),
    /// `"..."` identifier, case preserved.
    Quoted(String),
    Punct(char),
    Other,
}

fn lex(stmt: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = stmt.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '"' => {
                let mut ident = String::new();
                while let Some(c) = chars.next() {
                    if c == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            ident.push('"');
                        } else {
                            break;
                        }
                    } else {
                        ident.push(c);
                    }
                }
                tokens.push(Token::Quoted(ident));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                word.extend(c.to_lowercase());
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '$' {
                        word.extend(c.to_lowercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Word(word));
            }
            '(' | ')' | ',' | '.' => tokens.push(Token::Punct(c)),
            _ => tokens.push(Token::Other),
        }
    }

    tokens
}

fn starts_with_copy(stmt: &str) -> bool {
    let head: String = stmt
        .trim_start()
        .chars()
        .take_while(|c| c.is_alphabetic())
        .collect();
    head.eq_ignore_ascii_case("copy")
}

/// Parse a statement as `COPY [schema.]table (col, ...) FROM stdin`.
///
/// Returns `Ok(None)` for every other statement, including `COPY`s that do
/// not read from stdin. A stdin `COPY` whose header cannot be understood is a
/// structural error, since its data block could not be decoded.
pub fn parse_copy_statement(stmt: &str) -> Result<Option<CopyHeader>> {
    if !starts_with_copy(stmt) {
        return Ok(None);
    }

    let tokens = lex(stmt);
    let from_stdin = tokens.windows(2).position(|w| {
        matches!((&w[0], &w[1]), (Token::Word(a), Token::Word(b)) if a == "from" && b == "stdin")
    });
    let Some(from_pos) = from_stdin else {
        return Ok(None);
    };

    let malformed = |what: &str| {
        ExtractError::structural(format!("{} in COPY statement: {}", what, stmt))
    };

    let mut it = tokens[1..from_pos].iter().peekable();

    let first = it
        .next()
        .and_then(identifier)
        .ok_or_else(|| malformed("expected a table name"))?;
    let (schema, table) = if it.peek() == Some(&&Token::Punct('.')) {
        it.next();
        let table = it
            .next()
            .and_then(identifier)
            .ok_or_else(|| malformed("expected a table name after schema"))?;
        (Some(first), table)
    } else {
        (None, first)
    };

    if it.next() != Some(&Token::Punct('(')) {
        return Err(malformed("expected column name list"));
    }

    let mut columns = Vec::new();
    loop {
        let column = it
            .next()
            .and_then(identifier)
            .ok_or_else(|| malformed("expected a column name"))?;
        columns.push(column);

        match it.next() {
            Some(Token::Punct(',')) => continue,
            Some(Token::Punct(')')) => break,
            _ => return Err(malformed("invalid column name list")),
        }
    }

    if it.next().is_some() {
        return Err(malformed("unexpected text before FROM"));
    }

    Ok(Some(CopyHeader {
        schema,
        table,
        columns: columns.into(),
    }))
}

fn identifier(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) | Token::Quoted(w) => Some(w.clone()),
        _ => None,
    }
}
