//! A reader for [EDN](https://github.com/edn-format/edn), the notation that model files are
//! written in.
//!
//! Only reading is supported. Input is tokenized in full by [`Lexer`] and then read into a
//! [`Value`] tree by a small recursive-descent reader. Maps and sets keep their document order,
//! which callers rely on when they enumerate states.
//!
//! ```
//! use hmm_stats::edn::{self, Value};
//!
//! let value = edn::parse("{:a [1 2.5 -Infinity]}").unwrap();
//! let items = value.get(&Value::keyword("a")).and_then(Value::as_seq).unwrap();
//! assert_eq!(items[0], Value::Integer(1));
//! assert_eq!(items[2], Value::symbol("-Infinity"));
//! ```
use crate::error::SyntaxError;
use itertools::Itertools;
use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;
use tracing::trace;

/// A single EDN form.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde-1", derive(serde::Serialize))]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Char(char),
    Keyword(String),
    Symbol(String),
    List(Vec<Value>),
    Vector(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Tagged(String, Box<Value>),
}

impl Value {
    pub fn keyword(name: &str) -> Self {
        Value::Keyword(name.to_owned())
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(name.to_owned())
    }

    /// The name of a symbol, keyword or string.
    pub fn name(&self) -> Option<&str> {
        match self {
            Value::Symbol(name) | Value::Keyword(name) | Value::String(name) => Some(name),
            _ => None,
        }
    }

    /// Numeric value of an integer or float. Integers wider than 53 bits lose precision.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Integer(i) => Some(i as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    /// The elements of a list or vector.
    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Vector(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up `key` in a map. Returns `None` if this is not a map or the key is absent.
    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.as_map()?
            .iter()
            .find(|(k, _v)| k == key)
            .map(|(_k, v)| v)
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Value::Symbol(s) if s == name)
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Char(_) => "character",
            Value::Keyword(_) => "keyword",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Vector(_) => "vector",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Tagged(..) => "tagged element",
        }
    }

    /// A short description for error messages, e.g. `symbol foo`.
    pub fn describe(&self) -> String {
        match self {
            Value::List(_) | Value::Vector(_) | Value::Set(_) | Value::Map(_) => {
                self.kind().to_owned()
            }
            _ => format!("{} {}", self.kind(), self),
        }
    }
}

fn write_seq(f: &mut fmt::Formatter, open: &str, items: &[Value], close: &str) -> fmt::Result {
    write!(f, "{}{}{}", open, items.iter().join(" "), close)
}

fn write_string(f: &mut fmt::Formatter, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        match ch {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            '\u{8}' => f.write_str("\\b")?,
            '\u{c}' => f.write_str("\\f")?,
            c if c.is_control() => write!(f, "\\u{:04x}", c as u32)?,
            c => write!(f, "{}", c)?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => write!(f, "##NaN"),
            Value::Float(x) if x.is_infinite() => {
                write!(f, "{}", if *x > 0.0 { "##Inf" } else { "##-Inf" })
            }
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write_string(f, s),
            Value::Char(c) => match c {
                '\n' => write!(f, "\\newline"),
                ' ' => write!(f, "\\space"),
                '\t' => write!(f, "\\tab"),
                '\r' => write!(f, "\\return"),
                _ => write!(f, "\\{}", c),
            },
            Value::Keyword(name) => write!(f, ":{}", name),
            Value::Symbol(name) => write!(f, "{}", name),
            Value::List(items) => write_seq(f, "(", items, ")"),
            Value::Vector(items) => write_seq(f, "[", items, "]"),
            Value::Set(items) => write_seq(f, "#{", items, "}"),
            Value::Map(entries) => write!(
                f,
                "{{{}}}",
                entries
                    .iter()
                    .map(|(k, v)| format!("{} {}", k, v))
                    .join(", ")
            ),
            Value::Tagged(tag, value) => write!(f, "#{} {}", tag, value),
        }
    }
}

/// Token kinds produced by the [`Lexer`]
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    OpenList,
    CloseList,
    OpenVector,
    CloseVector,
    OpenMap,
    CloseMap,
    /// `#{`
    OpenSet,
    /// `#_`
    Discard,
    /// `#name`
    Tag(String),
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Str(String),
    Char(char),
    Keyword(String),
    Symbol(String),
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TokenKind::OpenList => write!(f, "'('"),
            TokenKind::CloseList => write!(f, "')'"),
            TokenKind::OpenVector => write!(f, "'['"),
            TokenKind::CloseVector => write!(f, "']'"),
            TokenKind::OpenMap => write!(f, "'{{'"),
            TokenKind::CloseMap => write!(f, "'}}'"),
            TokenKind::OpenSet => write!(f, "'#{{'"),
            TokenKind::Discard => write!(f, "'#_'"),
            TokenKind::Tag(tag) => write!(f, "tag #{}", tag),
            TokenKind::Nil => write!(f, "nil"),
            TokenKind::Bool(b) => write!(f, "{}", b),
            TokenKind::Integer(i) => write!(f, "integer {}", i),
            TokenKind::Float(x) => write!(f, "float {}", x),
            TokenKind::Str(s) => write!(f, "string {:?}", s),
            TokenKind::Char(c) => write!(f, "character {:?}", c),
            TokenKind::Keyword(k) => write!(f, "keyword :{}", k),
            TokenKind::Symbol(s) => write!(f, "symbol {}", s),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

/// A token with its byte position in the input
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize) -> Self {
        Self { kind, position }
    }
}

fn is_whitespace(ch: char) -> bool {
    ch.is_whitespace() || ch == ','
}

fn is_symbol_start(ch: char) -> bool {
    ch.is_alphabetic() || ".*+!-_?$%&=<>/'".contains(ch)
}

fn is_symbol_char(ch: char) -> bool {
    ch.is_alphanumeric() || ".*+!-_?$%&=<>/':#".contains(ch)
}

/// Tokenizer for EDN text
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    /// Tokenize the entire input. The last token is always [`TokenKind::Eof`].
    pub fn tokenize(&mut self) -> Result<Vec<Token>, SyntaxError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    pub fn next_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace_and_comments();

        let (pos, ch) = match self.chars.peek() {
            Some(&pair) => pair,
            None => return Ok(Token::new(TokenKind::Eof, self.input.len())),
        };

        let kind = match ch {
            '(' | ')' | '[' | ']' | '{' | '}' => {
                self.chars.next();
                match ch {
                    '(' => TokenKind::OpenList,
                    ')' => TokenKind::CloseList,
                    '[' => TokenKind::OpenVector,
                    ']' => TokenKind::CloseVector,
                    '{' => TokenKind::OpenMap,
                    _ => TokenKind::CloseMap,
                }
            }
            '#' => self.read_dispatch(pos)?,
            '"' => TokenKind::Str(self.read_string(pos)?),
            '\\' => TokenKind::Char(self.read_char(pos)?),
            ':' => {
                self.chars.next();
                let name = self.read_run(is_symbol_char);
                if name.is_empty() {
                    return Err(SyntaxError::UnexpectedChar { ch, position: pos });
                }
                TokenKind::Keyword(name)
            }
            '0'..='9' => self.read_number(pos)?,
            '+' | '-' if self.peek_second().map_or(false, |c| c.is_ascii_digit()) => {
                self.read_number(pos)?
            }
            _ if is_symbol_start(ch) => match self.read_run(is_symbol_char).as_str() {
                "nil" => TokenKind::Nil,
                "true" => TokenKind::Bool(true),
                "false" => TokenKind::Bool(false),
                name => TokenKind::Symbol(name.to_owned()),
            },
            _ => return Err(SyntaxError::UnexpectedChar { ch, position: pos }),
        };

        Ok(Token::new(kind, pos))
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.peek().map(|&(_, c)| c)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(&(_, ch)) = self.chars.peek() {
            if is_whitespace(ch) {
                self.chars.next();
            } else if ch == ';' {
                while let Some((_, c)) = self.chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn read_run(&mut self, accept: fn(char) -> bool) -> String {
        let mut run = String::new();
        while let Some(&(_, ch)) = self.chars.peek() {
            if !accept(ch) {
                break;
            }
            run.push(ch);
            self.chars.next();
        }
        run
    }

    fn read_dispatch(&mut self, pos: usize) -> Result<TokenKind, SyntaxError> {
        self.chars.next(); // '#'
        match self.chars.peek() {
            Some(&(_, '{')) => {
                self.chars.next();
                Ok(TokenKind::OpenSet)
            }
            Some(&(_, '_')) => {
                self.chars.next();
                Ok(TokenKind::Discard)
            }
            Some(&(_, '#')) => {
                self.chars.next();
                let text = self.read_run(is_symbol_char);
                match text.as_str() {
                    "Inf" => Ok(TokenKind::Float(f64::INFINITY)),
                    "-Inf" => Ok(TokenKind::Float(f64::NEG_INFINITY)),
                    "NaN" => Ok(TokenKind::Float(f64::NAN)),
                    _ => Err(SyntaxError::InvalidNumber {
                        text: format!("##{}", text),
                        position: pos,
                    }),
                }
            }
            Some(&(_, ch)) if ch.is_alphabetic() => {
                Ok(TokenKind::Tag(self.read_run(is_symbol_char)))
            }
            Some(&(position, ch)) => Err(SyntaxError::UnexpectedChar { ch, position }),
            None => Err(SyntaxError::UnexpectedEof {
                expected: "a dispatch character after '#'",
            }),
        }
    }

    fn read_string(&mut self, start: usize) -> Result<String, SyntaxError> {
        self.chars.next(); // opening quote
        let mut s = String::new();
        while let Some((pos, ch)) = self.chars.next() {
            match ch {
                '"' => return Ok(s),
                '\\' => {
                    let escaped = match self.chars.next() {
                        Some((_, 't')) => '\t',
                        Some((_, 'r')) => '\r',
                        Some((_, 'n')) => '\n',
                        Some((_, 'b')) => '\u{8}',
                        Some((_, 'f')) => '\u{c}',
                        Some((_, '\\')) => '\\',
                        Some((_, '"')) => '"',
                        Some((_, 'u')) => {
                            let hex: String = (0..4)
                                .filter_map(|_| self.chars.next())
                                .map(|(_, c)| c)
                                .collect();
                            u32::from_str_radix(&hex, 16)
                                .ok()
                                .and_then(std::char::from_u32)
                                .ok_or_else(|| SyntaxError::InvalidEscape {
                                    escape: format!("u{}", hex),
                                    position: pos,
                                })?
                        }
                        Some((_, other)) => {
                            return Err(SyntaxError::InvalidEscape {
                                escape: other.to_string(),
                                position: pos,
                            })
                        }
                        None => break,
                    };
                    s.push(escaped);
                }
                _ => s.push(ch),
            }
        }
        Err(SyntaxError::UnterminatedString(start))
    }

    fn read_char(&mut self, start: usize) -> Result<char, SyntaxError> {
        self.chars.next(); // backslash
        let first = match self.chars.next() {
            Some((_, c)) => c,
            None => {
                return Err(SyntaxError::UnexpectedEof {
                    expected: "a character after '\\'",
                })
            }
        };
        let mut text = first.to_string();
        if first.is_alphanumeric() {
            text.push_str(&self.read_run(char::is_alphanumeric));
        }

        let invalid = || SyntaxError::InvalidChar {
            text: text.clone(),
            position: start,
        };
        match text.as_str() {
            "newline" => Ok('\n'),
            "space" => Ok(' '),
            "tab" => Ok('\t'),
            "return" => Ok('\r'),
            "backspace" => Ok('\u{8}'),
            "formfeed" => Ok('\u{c}'),
            _ if text.chars().count() == 1 => Ok(first),
            _ if first == 'u' && text.len() == 5 => u32::from_str_radix(&text[1..], 16)
                .ok()
                .and_then(std::char::from_u32)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    fn read_number(&mut self, start: usize) -> Result<TokenKind, SyntaxError> {
        let text = self.read_run(|c| c.is_ascii_alphanumeric() || "+-.".contains(c));
        let invalid = || SyntaxError::InvalidNumber {
            text: text.clone(),
            position: start,
        };

        if let Some(digits) = text.strip_suffix('N') {
            return digits.parse().map(TokenKind::Integer).map_err(|_| invalid());
        }
        if let Some(digits) = text.strip_suffix('M') {
            return digits.parse().map(TokenKind::Float).map_err(|_| invalid());
        }
        if text.contains(|c: char| c == '.' || c == 'e' || c == 'E') {
            text.parse().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse().map(TokenKind::Integer).map_err(|_| invalid())
        }
    }
}

/// Collections, tags and discards nested deeper than this are rejected
pub const MAX_DEPTH: usize = 256;

/// Recursive-descent reader over a token stream
struct Reader {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Reader {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof, which is never consumed
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn read_form(&mut self) -> Result<Value, SyntaxError> {
        if self.depth == MAX_DEPTH {
            return Err(SyntaxError::TooDeep {
                position: self.peek().position,
            });
        }
        self.depth += 1;
        let value = self.read_nested_form();
        self.depth -= 1;
        value
    }

    fn read_nested_form(&mut self) -> Result<Value, SyntaxError> {
        let Token { kind, position } = self.advance();
        let value = match kind {
            TokenKind::Eof => {
                return Err(SyntaxError::UnexpectedEof {
                    expected: "a value",
                })
            }
            TokenKind::OpenList => Value::List(self.read_seq(TokenKind::CloseList)?),
            TokenKind::OpenVector => Value::Vector(self.read_seq(TokenKind::CloseVector)?),
            TokenKind::OpenSet => {
                let items = self.read_seq(TokenKind::CloseMap)?;
                check_unique(items.iter(), position)?;
                Value::Set(items)
            }
            TokenKind::OpenMap => {
                let forms = self.read_seq(TokenKind::CloseMap)?;
                if forms.len() % 2 != 0 {
                    return Err(SyntaxError::OddMapEntries(position));
                }
                let entries: Vec<(Value, Value)> = forms.into_iter().tuples().collect();
                check_unique(entries.iter().map(|(k, _v)| k), position)?;
                Value::Map(entries)
            }
            TokenKind::CloseList | TokenKind::CloseVector | TokenKind::CloseMap => {
                return Err(SyntaxError::UnexpectedToken {
                    found: kind.to_string(),
                    position,
                })
            }
            TokenKind::Discard => {
                self.read_form()?;
                return self.read_form();
            }
            TokenKind::Tag(tag) => Value::Tagged(tag, Box::new(self.read_form()?)),
            TokenKind::Nil => Value::Nil,
            TokenKind::Bool(b) => Value::Bool(b),
            TokenKind::Integer(i) => Value::Integer(i),
            TokenKind::Float(x) => Value::Float(x),
            TokenKind::Str(s) => Value::String(s),
            TokenKind::Char(c) => Value::Char(c),
            TokenKind::Keyword(name) => Value::Keyword(name),
            TokenKind::Symbol(name) => Value::Symbol(name),
        };
        Ok(value)
    }

    fn read_seq(&mut self, close: TokenKind) -> Result<Vec<Value>, SyntaxError> {
        let mut items = Vec::new();
        loop {
            let kind = self.peek().kind.clone();
            if kind == close {
                self.advance();
                return Ok(items);
            }
            match kind {
                TokenKind::Eof => {
                    return Err(SyntaxError::UnexpectedEof {
                        expected: "a closing delimiter",
                    })
                }
                TokenKind::Discard => {
                    self.advance();
                    self.read_form()?;
                }
                _ => items.push(self.read_form()?),
            }
        }
    }

    fn skip_discards(&mut self) -> Result<(), SyntaxError> {
        while self.peek().kind == TokenKind::Discard {
            self.advance();
            self.read_form()?;
        }
        Ok(())
    }
}

fn check_unique<'v>(
    mut keys: impl Iterator<Item = &'v Value> + Clone,
    position: usize,
) -> Result<(), SyntaxError> {
    while let Some(key) = keys.next() {
        if keys.clone().any(|other| other == key) {
            return Err(SyntaxError::DuplicateKey {
                key: key.to_string(),
                position,
            });
        }
    }
    Ok(())
}

/// Read exactly one EDN value from `text`.
pub fn parse(text: &str) -> Result<Value, SyntaxError> {
    let tokens = Lexer::new(text).tokenize()?;
    trace!(tokens = tokens.len(), "tokenized EDN input");

    let mut reader = Reader {
        tokens,
        pos: 0,
        depth: 0,
    };
    reader.skip_discards()?;
    if reader.peek().kind == TokenKind::Eof {
        return Err(SyntaxError::EmptyInput);
    }
    let value = reader.read_form()?;
    reader.skip_discards()?;
    let next = reader.peek();
    if next.kind != TokenKind::Eof {
        return Err(SyntaxError::TrailingInput(next.position));
    }
    Ok(value)
}
