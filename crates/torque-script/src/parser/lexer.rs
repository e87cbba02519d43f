//! Hand-written lexer for TorqueScript source text.
//!
//! The grammar is treated as an external artifact in the original engine
//! (spec.md §1 lists "the grammar file itself and the generated parser
//! tables" as out of scope); since no such generated parser is available
//! here, this module and [`super::Parser`] implement the grammar directly.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Integer(i32),
    Float(f32),
    StringLit(String),
    TaggedStringLit(String),
    Ident(String),
    LocalVar(String),
    GlobalVar(String),

    // keywords
    Function,
    Package,
    If,
    Else,
    While,
    For,
    Switch,
    Case,
    Or,
    Default,
    Break,
    Continue,
    Return,
    New,
    Datablock,

    // punctuation / operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pipe,
    Amp,
    AmpAmp,
    PipePipe,
    Bang,
    EqEq,
    BangEq,
    DollarEq,
    BangDollarEq,
    Lt,
    Gt,
    GtEq,
    Eq,
    PlusEq,
    PlusPlus,
    MinusMinus,
    At,
    Spc,
    TabSep,
    Nl,
    ColonColon,
    Dot,
    Comma,
    Semi,
    Colon,
    Question,
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,

    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub tok: Tok,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

pub struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_cont(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b' ' | b'\t' | b'\r' | b'\n') => {
                    self.advance();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    self.advance();
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c == b'*' && self.peek_at(1) == Some(b'/') {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_ident_path(&mut self) -> String {
        let mut s = String::new();
        loop {
            let start = self.pos;
            while self.peek().is_some_and(is_ident_cont) {
                self.advance();
            }
            s.push_str(std::str::from_utf8(&self.src[start..self.pos]).unwrap());
            if self.peek() == Some(b':') && self.peek_at(1) == Some(b':') {
                // Only fold `::` into the path if followed by another
                // identifier character; otherwise it's the qualifier token.
                if self.peek_at(2).is_some_and(is_ident_start) {
                    self.advance();
                    self.advance();
                    s.push_str("::");
                    continue;
                }
            }
            break;
        }
        s
    }

    fn lex_string(&mut self, quote: u8) -> Result<String, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            match self.advance() {
                None => {
                    return Err(LexError {
                        line,
                        column,
                        message: "unterminated string literal".into(),
                    })
                }
                Some(c) if c == quote => break,
                Some(b'\\') => match self.advance() {
                    Some(b'n') => s.push('\n'),
                    Some(b't') => s.push('\t'),
                    Some(b'x') => {
                        let mut hex = String::new();
                        for _ in 0..2 {
                            if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                                hex.push(self.advance().unwrap() as char);
                            } else {
                                break;
                            }
                        }
                        if hex.is_empty() {
                            return Err(LexError {
                                line: self.line,
                                column: self.column,
                                message: "\\x escape requires 1-2 hex digits".into(),
                            });
                        }
                        let byte = u8::from_str_radix(&hex, 16).unwrap_or(0);
                        s.push(byte as char);
                    }
                    Some(b'c') => {
                        if let Some(d) = self.peek() {
                            if d.is_ascii_digit() {
                                self.advance();
                                let n = d - b'0';
                                let mapped = match n {
                                    0..=1 => 0x02 + n,
                                    2 => 0x04,
                                    3 => 0x05,
                                    4 => 0x06,
                                    5 => 0x07,
                                    6 => 0x08,
                                    7 => 0x0B,
                                    8 => 0x0C,
                                    9 => 0x0E,
                                    _ => 0x02,
                                };
                                s.push(mapped as char);
                            }
                        }
                    }
                    Some(other) => s.push(other as char),
                    None => {
                        return Err(LexError {
                            line,
                            column,
                            message: "unterminated string literal".into(),
                        })
                    }
                },
                Some(c) => s.push(c as char),
            }
        }
        Ok(s)
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let Some(c) = self.peek() else {
            return Ok(Spanned {
                tok: Tok::Eof,
                line,
                column,
            });
        };

        let tok = match c {
            b'0'..=b'9' => self.lex_number()?,
            b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.lex_number()?,
            b'"' => Tok::StringLit(self.lex_string(b'"')?),
            b'\'' => Tok::TaggedStringLit(self.lex_string(b'\'')?),
            b'%' => {
                self.advance();
                let path = self.lex_ident_path();
                if path.is_empty() {
                    Tok::Percent
                } else {
                    Tok::LocalVar(path)
                }
            }
            b'$' => {
                self.advance();
                if self.peek_at(0) == Some(b'=') {
                    self.advance();
                    Tok::DollarEq
                } else {
                    Tok::GlobalVar(self.lex_ident_path())
                }
            }
            c if is_ident_start(c) => {
                let ident = self.lex_ident_path();
                match ident.as_str() {
                    "function" => Tok::Function,
                    "package" => Tok::Package,
                    "if" => Tok::If,
                    "else" => Tok::Else,
                    "while" => Tok::While,
                    "for" => Tok::For,
                    "switch" => Tok::Switch,
                    "case" => Tok::Case,
                    "or" => Tok::Or,
                    "default" => Tok::Default,
                    "break" => Tok::Break,
                    "continue" => Tok::Continue,
                    "return" => Tok::Return,
                    "new" => Tok::New,
                    "datablock" => Tok::Datablock,
                    "SPC" => Tok::Spc,
                    "TAB" => Tok::TabSep,
                    "NL" => Tok::Nl,
                    _ => Tok::Ident(ident),
                }
            }
            b'+' => {
                self.advance();
                if self.peek() == Some(b'+') {
                    self.advance();
                    Tok::PlusPlus
                } else if self.peek() == Some(b'=') {
                    self.advance();
                    Tok::PlusEq
                } else {
                    Tok::Plus
                }
            }
            b'-' => {
                self.advance();
                if self.peek() == Some(b'-') {
                    self.advance();
                    Tok::MinusMinus
                } else {
                    Tok::Minus
                }
            }
            b'*' => {
                self.advance();
                Tok::Star
            }
            b'/' => {
                self.advance();
                Tok::Slash
            }
            b'%' => unreachable!(),
            b'|' => {
                self.advance();
                if self.peek() == Some(b'|') {
                    self.advance();
                    Tok::PipePipe
                } else {
                    Tok::Pipe
                }
            }
            b'&' => {
                self.advance();
                if self.peek() == Some(b'&') {
                    self.advance();
                    Tok::AmpAmp
                } else {
                    Tok::Amp
                }
            }
            b'!' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    Tok::BangEq
                } else if self.peek() == Some(b'$') && self.peek_at(1) == Some(b'=') {
                    self.advance();
                    self.advance();
                    Tok::BangDollarEq
                } else {
                    Tok::Bang
                }
            }
            b'=' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    Tok::EqEq
                } else {
                    Tok::Eq
                }
            }
            b'<' => {
                self.advance();
                Tok::Lt
            }
            b'>' => {
                self.advance();
                if self.peek() == Some(b'=') {
                    self.advance();
                    Tok::GtEq
                } else {
                    Tok::Gt
                }
            }
            b'@' => {
                self.advance();
                Tok::At
            }
            b':' => {
                self.advance();
                if self.peek() == Some(b':') {
                    self.advance();
                    Tok::ColonColon
                } else {
                    Tok::Colon
                }
            }
            b'.' => {
                self.advance();
                Tok::Dot
            }
            b',' => {
                self.advance();
                Tok::Comma
            }
            b';' => {
                self.advance();
                Tok::Semi
            }
            b'?' => {
                self.advance();
                Tok::Question
            }
            b'{' => {
                self.advance();
                Tok::LBrace
            }
            b'}' => {
                self.advance();
                Tok::RBrace
            }
            b'(' => {
                self.advance();
                Tok::LParen
            }
            b')' => {
                self.advance();
                Tok::RParen
            }
            b'[' => {
                self.advance();
                Tok::LBracket
            }
            b']' => {
                self.advance();
                Tok::RBracket
            }
            other => {
                return Err(LexError {
                    line,
                    column,
                    message: format!("unexpected character '{}'", other as char),
                })
            }
        };

        Ok(Spanned { tok, line, column })
    }

    fn lex_number(&mut self) -> Result<Tok, LexError> {
        let start = self.pos;
        let mut is_float = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit() || c == b'f') {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.advance();
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.advance();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if self.peek() == Some(b'f') {
            is_float = true;
            self.advance();
        }
        let text: String = self.src[start..self.pos]
            .iter()
            .map(|&b| b as char)
            .filter(|c| *c != 'f')
            .collect();
        if is_float {
            Ok(Tok::Float(text.parse().unwrap_or(0.0)))
        } else {
            Ok(Tok::Integer(text.parse().unwrap_or(0)))
        }
    }
}
