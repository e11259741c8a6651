//! Lexer for the netlist-Verilog subset the source reader accepts.
//!
//! Handles identifiers, decimal integers, punctuation, the operator set
//! `& | ^ + - ~`, and line/block comments. Tokens carry their source line
//! for error reporting.

use crate::error::EngineError;

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `module` keyword.
    Module,
    /// `endmodule` keyword.
    Endmodule,
    /// `wire` keyword.
    Wire,
    /// `input` keyword.
    Input,
    /// `output` keyword.
    Output,
    /// `assign` keyword.
    Assign,
    /// An identifier.
    Ident,
    /// A decimal integer literal.
    Number,
    /// `(`.
    LParen,
    /// `)`.
    RParen,
    /// `[`.
    LBracket,
    /// `]`.
    RBracket,
    /// `:`.
    Colon,
    /// `;`.
    Semi,
    /// `,`.
    Comma,
    /// `.`.
    Dot,
    /// `=`.
    Equals,
    /// `&`.
    Amp,
    /// `|`.
    Pipe,
    /// `^`.
    Caret,
    /// `+`.
    Plus,
    /// `-`.
    Minus,
    /// `~`.
    Tilde,
    /// End of input.
    Eof,
}

/// One lexed token with its text and source line.
#[derive(Debug, Clone)]
pub struct Token {
    /// The token kind.
    pub kind: TokenKind,
    /// The token's source text (empty for punctuation and EOF).
    pub text: String,
    /// 1-based source line.
    pub line: u32,
}

/// Lexes source text into tokens. The result always ends with an EOF token.
pub fn lex(source: &str, file: &str) -> Result<Vec<Token>, EngineError> {
    let mut lexer = Lexer {
        source: source.as_bytes(),
        pos: 0,
        line: 1,
        file,
    };
    lexer.lex_all()
}

struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    file: &'a str,
}

impl Lexer<'_> {
    fn lex_all(&mut self) -> Result<Vec<Token>, EngineError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments()?;
            if self.pos >= self.source.len() {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line: self.line,
                });
                return Ok(tokens);
            }
            tokens.push(self.next_token()?);
        }
    }

    fn peek(&self) -> u8 {
        if self.pos < self.source.len() {
            self.source[self.pos]
        } else {
            0
        }
    }

    fn peek_at(&self, offset: usize) -> u8 {
        let idx = self.pos + offset;
        if idx < self.source.len() {
            self.source[idx]
        } else {
            0
        }
    }

    fn bump(&mut self) {
        if self.source[self.pos] == b'\n' {
            self.line += 1;
        }
        self.pos += 1;
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            file: self.file.to_string(),
            line: self.line,
            message: message.into(),
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), EngineError> {
        loop {
            while self.pos < self.source.len() && self.peek().is_ascii_whitespace() {
                self.bump();
            }
            if self.peek() == b'/' && self.peek_at(1) == b'/' {
                while self.pos < self.source.len() && self.peek() != b'\n' {
                    self.bump();
                }
                continue;
            }
            if self.peek() == b'/' && self.peek_at(1) == b'*' {
                self.bump();
                self.bump();
                loop {
                    if self.pos >= self.source.len() {
                        return Err(self.error("unterminated block comment"));
                    }
                    if self.peek() == b'*' && self.peek_at(1) == b'/' {
                        self.bump();
                        self.bump();
                        break;
                    }
                    self.bump();
                }
                continue;
            }
            return Ok(());
        }
    }

    fn next_token(&mut self) -> Result<Token, EngineError> {
        let line = self.line;
        let b = self.peek();

        if b.is_ascii_alphabetic() || b == b'_' {
            let start = self.pos;
            while self.pos < self.source.len()
                && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_')
            {
                self.bump();
            }
            let text = std::str::from_utf8(&self.source[start..self.pos])
                .expect("ascii checked")
                .to_string();
            let kind = match text.as_str() {
                "module" => TokenKind::Module,
                "endmodule" => TokenKind::Endmodule,
                "wire" => TokenKind::Wire,
                "input" => TokenKind::Input,
                "output" => TokenKind::Output,
                "assign" => TokenKind::Assign,
                _ => TokenKind::Ident,
            };
            return Ok(Token { kind, text, line });
        }

        if b.is_ascii_digit() {
            let start = self.pos;
            while self.pos < self.source.len() && self.peek().is_ascii_digit() {
                self.bump();
            }
            let text = std::str::from_utf8(&self.source[start..self.pos])
                .expect("ascii checked")
                .to_string();
            return Ok(Token {
                kind: TokenKind::Number,
                text,
                line,
            });
        }

        let kind = match b {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semi,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            b'=' => TokenKind::Equals,
            b'&' => TokenKind::Amp,
            b'|' => TokenKind::Pipe,
            b'^' => TokenKind::Caret,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'~' => TokenKind::Tilde,
            other => {
                return Err(self.error(format!("unexpected character {:?}", other as char)));
            }
        };
        self.bump();
        Ok(Token {
            kind,
            text: String::new(),
            line,
        })
    }
}
