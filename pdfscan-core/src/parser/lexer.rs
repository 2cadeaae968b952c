//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2.
//!
//! The lexer never fails: bytes it cannot classify come back as
//! [`TokenKind::Mismatch`] tokens and the parser decides whether that is fatal.
//! Every token carries its raw lexeme and the 1-based line/column it started at.

use std::borrow::Cow;

/// Reserved words of the object, xref and CMap grammars.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "obj",
    "endobj",
    "stream",
    "endstream",
    "xref",
    "trailer",
    "startxref",
    "true",
    "false",
    "null",
    "R",
    "BT",
    "ET",
    "begincmap",
    "endcmap",
    "beginbfchar",
    "endbfchar",
    "beginbfrange",
    "endbfrange",
    "begincodespacerange",
    "endcodespacerange",
];

/// Check whether a bare word is one of the grammar keywords
pub fn is_reserved_keyword(word: &str) -> bool {
    RESERVED_KEYWORDS.contains(&word)
}

/// Token classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Integer or decimal number, optionally signed
    Number,
    /// `/Name`
    Name,
    /// `( ... )` with escapes already resolved
    LiteralString,
    /// Single `<` or `>` around hex strings
    HexDelim,
    /// `[` or `]`
    ArrayDelim,
    /// `<<` or `>>`
    DictDelim,
    /// Bare word: grammar keywords, content operators, `{ } , : =`
    Keyword,
    /// `\n`, `\r\n` or a bare `\r`
    Newline,
    /// Space, tab, form feed or NUL runs
    Whitespace,
    /// Bytes the lexer could not classify
    Mismatch,
}

/// Decoded payload of a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Lexing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LexMode {
    /// Structural syntax: numbers are converted to [`TokenValue::Integer`]/[`TokenValue::Real`]
    #[default]
    Text,
    /// Content streams: number values stay as their raw bytes
    Bytes,
}

/// A lexical unit
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: TokenValue,
    /// Raw source bytes of the token
    pub lexeme: Vec<u8>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    /// True for a keyword token spelled exactly `keyword`
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Keyword && self.lexeme == keyword.as_bytes()
    }

    /// True for a delimiter token (`<`, `>`, `<<`, `>>`, `[`, `]`) spelled `delim`
    pub fn is_delim(&self, delim: &str) -> bool {
        matches!(
            self.kind,
            TokenKind::HexDelim | TokenKind::ArrayDelim | TokenKind::DictDelim
        ) && self.lexeme == delim.as_bytes()
    }

    /// Newlines and whitespace
    pub fn is_trivia(&self) -> bool {
        matches!(self.kind, TokenKind::Newline | TokenKind::Whitespace)
    }

    /// Name without the leading slash
    pub fn name(&self) -> Option<&str> {
        match (&self.kind, &self.value) {
            (TokenKind::Name, TokenValue::Text(name)) => Some(name),
            _ => None,
        }
    }

    /// Integer value of a number token, whatever mode it was lexed in
    pub fn integer(&self) -> Option<i64> {
        if self.kind != TokenKind::Number {
            return None;
        }
        match &self.value {
            TokenValue::Integer(i) => Some(*i),
            TokenValue::Bytes(raw) => std::str::from_utf8(raw).ok()?.parse().ok(),
            _ => None,
        }
    }

    /// Numeric value of a number token as a float
    pub fn real(&self) -> Option<f64> {
        if self.kind != TokenKind::Number {
            return None;
        }
        match &self.value {
            TokenValue::Integer(i) => Some(*i as f64),
            TokenValue::Real(r) => Some(*r),
            TokenValue::Bytes(raw) => parse_real(raw),
            TokenValue::Text(_) => None,
        }
    }

    /// Lexeme as text (lossy)
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.lexeme)
    }

    /// Short human readable form used in error messages
    pub fn describe(&self) -> String {
        let mut text: String = self.text().chars().take(32).collect();
        if self.lexeme.len() > 32 {
            text.push_str("...");
        }
        match self.kind {
            TokenKind::Number => format!("number {text}"),
            TokenKind::Name => format!("name '{text}'"),
            TokenKind::LiteralString => format!("string {text}"),
            TokenKind::Keyword => format!("keyword '{text}'"),
            TokenKind::HexDelim | TokenKind::ArrayDelim | TokenKind::DictDelim => {
                format!("'{text}'")
            }
            TokenKind::Newline => "newline".to_string(),
            TokenKind::Whitespace => "whitespace".to_string(),
            TokenKind::Mismatch => format!("unrecognized input {text:?}"),
        }
    }
}

/// PDF whitespace other than line breaks
fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | 0x0C | 0x00)
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

/// Single character tokens that are not part of a bare word
fn is_punctuation(b: u8) -> bool {
    matches!(b, b'{' | b'}' | b',' | b':' | b'=')
}

/// Characters allowed inside names and bare words
fn is_regular(b: u8) -> bool {
    b.is_ascii_graphic() && !is_delimiter(b)
}

fn is_word_char(b: u8) -> bool {
    is_regular(b) && !is_punctuation(b)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn parse_real(raw: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(raw).ok()?;
    // "5." and "-.5" are valid PDF reals
    let text = text.strip_suffix('.').unwrap_or(text);
    match text {
        "" | "+" | "-" => None,
        _ => text.parse().ok(),
    }
}

/// PDF Lexer over an in-memory buffer
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    input: &'a [u8],
    position: usize,
    line: usize,
    column: usize,
    mode: LexMode,
}

impl<'a> Lexer<'a> {
    /// Create a lexer in [`LexMode::Text`]
    pub fn new(input: &'a [u8]) -> Self {
        Self::with_mode(input, LexMode::Text)
    }

    pub fn with_mode(input: &'a [u8], mode: LexMode) -> Self {
        Self {
            input,
            position: 0,
            line: 1,
            column: 1,
            mode,
        }
    }

    /// Continue line/column numbering from an earlier part of the same file
    pub fn starting_at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Line/column of byte `offset` in `input`
    pub fn location_of(input: &[u8], offset: usize) -> (usize, usize) {
        let mut lexer = Lexer::new(input);
        lexer.advance(offset);
        (lexer.line, lexer.column)
    }

    /// Byte offset of the next unread byte
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn mode(&self) -> LexMode {
        self.mode
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.position + offset).copied()
    }

    /// Consume `n` bytes, keeping line/column in step
    fn advance(&mut self, n: usize) {
        let end = (self.position + n).min(self.input.len());
        for i in self.position..end {
            match self.input[i] {
                b'\n' => {
                    self.line += 1;
                    self.column = 1;
                }
                b'\r' => {
                    // \r\n counts once, on the \n
                    if self.input.get(i + 1) != Some(&b'\n') {
                        self.line += 1;
                        self.column = 1;
                    }
                }
                _ => self.column += 1,
            }
        }
        self.position = end;
    }

    fn scan_while(&self, start: usize, pred: impl Fn(u8) -> bool) -> usize {
        self.input[start..]
            .iter()
            .position(|&b| !pred(b))
            .map_or(self.input.len(), |len| start + len)
    }

    /// Get the next token, or `None` at end of input
    pub fn next_token(&mut self) -> Option<Token> {
        loop {
            let ch = self.peek_at(0)?;
            if ch == b'%' {
                self.skip_comment();
                continue;
            }

            let (line, column, start) = (self.line, self.column, self.position);
            let (kind, value, len) = match ch {
                b'\n' => (TokenKind::Newline, None, 1),
                b'\r' => {
                    let len = if self.peek_at(1) == Some(b'\n') { 2 } else { 1 };
                    (TokenKind::Newline, None, len)
                }
                _ if is_blank(ch) => {
                    let end = self.scan_while(start, is_blank);
                    (TokenKind::Whitespace, None, end - start)
                }
                b'/' => {
                    let end = self.scan_while(start + 1, is_regular);
                    let name = latin1(&self.input[start + 1..end]);
                    (TokenKind::Name, Some(TokenValue::Text(name)), end - start)
                }
                b'(' => match self.scan_literal_string(start) {
                    Some((bytes, end)) => (
                        TokenKind::LiteralString,
                        Some(TokenValue::Bytes(bytes)),
                        end - start,
                    ),
                    None => (TokenKind::Mismatch, None, 1),
                },
                b'<' | b'>' => {
                    if self.peek_at(1) == Some(ch) {
                        (TokenKind::DictDelim, None, 2)
                    } else {
                        (TokenKind::HexDelim, None, 1)
                    }
                }
                b'[' | b']' => (TokenKind::ArrayDelim, None, 1),
                _ if is_punctuation(ch) => (TokenKind::Keyword, None, 1),
                _ if self.starts_number() => {
                    let (value, len) = self.scan_number(start);
                    (TokenKind::Number, Some(value), len)
                }
                _ if is_word_char(ch) => {
                    let end = self.scan_while(start, is_word_char);
                    (TokenKind::Keyword, None, end - start)
                }
                _ => {
                    // ')' without an opener, control bytes, 8-bit bytes
                    let end = self.scan_while(start + 1, |b| {
                        !(b.is_ascii_graphic() || b.is_ascii_whitespace() || b == 0)
                    });
                    (TokenKind::Mismatch, None, end - start)
                }
            };

            let lexeme = self.input[start..start + len].to_vec();
            let value = value.unwrap_or_else(|| match kind {
                TokenKind::Mismatch => TokenValue::Bytes(lexeme.clone()),
                _ => TokenValue::Text(latin1(&lexeme)),
            });
            self.advance(len);

            return Some(Token {
                kind,
                value,
                lexeme,
                line,
                column,
            });
        }
    }

    fn skip_comment(&mut self) {
        let end = self.scan_while(self.position, |b| b != b'\n' && b != b'\r');
        self.advance(end - self.position);
    }

    fn starts_number(&self) -> bool {
        let digit_at = |i: usize| self.peek_at(i).is_some_and(|b| b.is_ascii_digit());
        match self.peek_at(0) {
            Some(b'0'..=b'9') => true,
            Some(b'.') => digit_at(1),
            Some(b'+' | b'-') => digit_at(1) || (self.peek_at(1) == Some(b'.') && digit_at(2)),
            _ => false,
        }
    }

    fn scan_number(&self, start: usize) -> (TokenValue, usize) {
        let mut end = start;
        if matches!(self.input[end], b'+' | b'-') {
            end += 1;
        }
        end = self.scan_while(end, |b| b.is_ascii_digit());
        let mut is_real = false;
        if self.input.get(end) == Some(&b'.') {
            is_real = true;
            end = self.scan_while(end + 1, |b| b.is_ascii_digit());
        }

        let raw = &self.input[start..end];
        let value = match self.mode {
            LexMode::Bytes => TokenValue::Bytes(raw.to_vec()),
            LexMode::Text if is_real => TokenValue::Real(parse_real(raw).unwrap_or(0.0)),
            LexMode::Text => match std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok()) {
                Some(i) => TokenValue::Integer(i),
                // Out of i64 range
                None => TokenValue::Real(parse_real(raw).unwrap_or(0.0)),
            },
        };
        (value, end - start)
    }

    /// Scan a balanced literal string starting at `(`.
    /// Returns the unescaped bytes and the end offset, or `None` if unterminated.
    fn scan_literal_string(&self, start: usize) -> Option<(Vec<u8>, usize)> {
        let input = self.input;
        let mut out = Vec::new();
        let mut depth = 1usize;
        let mut i = start + 1;

        while i < input.len() {
            let ch = input[i];
            i += 1;
            match ch {
                b'\\' => {
                    let escaped = *input.get(i)?;
                    i += 1;
                    match escaped {
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'0'..=b'7' => {
                            let mut value = u32::from(escaped - b'0');
                            for _ in 0..2 {
                                match input.get(i) {
                                    Some(&d @ b'0'..=b'7') => {
                                        value = value * 8 + u32::from(d - b'0');
                                        i += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((value & 0xFF) as u8);
                        }
                        // Line continuation
                        b'\r' => {
                            if input.get(i) == Some(&b'\n') {
                                i += 1;
                            }
                        }
                        b'\n' => {}
                        other => out.push(other),
                    }
                }
                b'(' => {
                    depth += 1;
                    out.push(ch);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some((out, i));
                    }
                    out.push(ch);
                }
                _ => out.push(ch),
            }
        }
        None
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

/// Tokenize a whole buffer
pub fn tokenize(input: &[u8], mode: LexMode) -> Vec<Token> {
    Lexer::with_mode(input, mode).collect()
}
