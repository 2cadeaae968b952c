//! Token cursor
//!
//! Parsing functions take a `&mut TokenCursor` instead of keeping lookahead
//! state of their own. Whitespace and newline tokens are dropped on
//! construction; the grammar never depends on them.

use super::lexer::{LexMode, Lexer, Token, TokenKind};
use super::{ParseError, ParseResult};

#[derive(Debug, Clone)]
pub struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
    /// Location reported when input runs out
    end: (usize, usize),
}

impl TokenCursor {
    /// Build a cursor from any token sequence
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut end = (1, 1);
        let tokens: Vec<Token> = tokens
            .into_iter()
            .inspect(|t| end = end_of(t))
            .filter(|t| !t.is_trivia())
            .collect();
        Self {
            tokens,
            pos: 0,
            end,
        }
    }

    /// Tokenize `input` in the given mode and wrap the result
    pub fn from_bytes(input: &[u8], mode: LexMode) -> Self {
        Self::new(Lexer::with_mode(input, mode))
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    /// Look `n` tokens ahead (0 is the next token)
    pub fn peek_nth(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Current position, for [`TokenCursor::rewind`]
    pub fn mark(&self) -> usize {
        self.pos
    }

    /// Return to a position taken with [`TokenCursor::mark`]
    pub fn rewind(&mut self, mark: usize) {
        self.pos = mark.min(self.tokens.len());
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Tokens not consumed yet
    pub fn remaining(&self) -> &[Token] {
        &self.tokens[self.pos.min(self.tokens.len())..]
    }

    /// Consume the next token, failing at end of input
    pub fn next_or_eof(&mut self, expected: &str) -> ParseResult<&Token> {
        if self.is_at_end() {
            return Err(self.eof(expected));
        }
        let pos = self.pos;
        self.pos += 1;
        Ok(&self.tokens[pos])
    }

    /// Consume the next token if it is the keyword `keyword`
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Require the keyword `keyword` as the next token
    pub fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        match self.peek() {
            Some(token) if token.is_keyword(keyword) => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(unexpected(keyword, token)),
            None => Err(self.eof(keyword)),
        }
    }

    /// Require an integer number as the next token
    pub fn expect_integer(&mut self, expected: &str) -> ParseResult<i64> {
        match self.peek() {
            Some(token) => match token.integer() {
                Some(value) => {
                    self.pos += 1;
                    Ok(value)
                }
                None => Err(unexpected(expected, token)),
            },
            None => Err(self.eof(expected)),
        }
    }

    /// Error for running out of tokens
    pub fn eof(&self, expected: &str) -> ParseError {
        ParseError::UnexpectedEof {
            expected: expected.to_string(),
            line: self.end.0,
            column: self.end.1,
        }
    }
}

/// Error for a token that does not fit the grammar at this point
pub fn unexpected(expected: &str, found: &Token) -> ParseError {
    ParseError::UnexpectedToken {
        expected: expected.to_string(),
        found: found.describe(),
        line: found.line,
        column: found.column,
    }
}

/// Line/column just past a token
fn end_of(token: &Token) -> (usize, usize) {
    match token.kind {
        TokenKind::Newline => (token.line + 1, 1),
        _ => {
            let (mut line, mut column) = (token.line, token.column);
            let mut bytes = token.lexeme.iter().peekable();
            while let Some(&b) = bytes.next() {
                match b {
                    b'\n' => (line, column) = (line + 1, 1),
                    b'\r' if bytes.peek() != Some(&&b'\n') => (line, column) = (line + 1, 1),
                    b'\r' => {}
                    _ => column += 1,
                }
            }
            (line, column)
        }
    }
}
