use crate::error::{SyntaxErrorKind, YalError, YalResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    LParen,
    RParen,
    Quote,
    Dot,
    Int(i64),
    Real(f64),
    Str(String),
    Symbol(String),
    Bool(bool),
}

/// A token and the byte offset where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Hand-rolled tokenizer over a source string. Holds nothing but its position.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer { input, pos: 0 }
    }

    /// Start lexing at byte offset `pos`.
    pub fn at(input: &'a str, pos: usize) -> Self {
        Lexer { input, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    pub fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }
            if self.peek() == Some(';') {
                while let Some(ch) = self.advance() {
                    if ch == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Next token, or None once only whitespace and comments remain.
    pub fn next_token(&mut self) -> YalResult<Option<Token>> {
        self.skip_whitespace_and_comments();
        let offset = self.pos;
        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(None),
        };

        let kind = match ch {
            '(' => {
                self.advance();
                TokenKind::LParen
            }
            ')' => {
                self.advance();
                TokenKind::RParen
            }
            '\'' => {
                self.advance();
                TokenKind::Quote
            }
            '"' => self.read_string()?,
            _ => self.read_word()?,
        };
        Ok(Some(Token { kind, offset }))
    }

    fn read_string(&mut self) -> YalResult<TokenKind> {
        let start = self.pos;
        self.advance(); // opening quote
        let mut text = String::new();
        loop {
            let escape_at = self.pos;
            match self.advance() {
                None => {
                    return Err(YalError::syntax(SyntaxErrorKind::UnterminatedString, start))
                }
                Some('"') => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escaped = match self.advance() {
                        None => {
                            return Err(YalError::syntax(
                                SyntaxErrorKind::UnterminatedString,
                                start,
                            ))
                        }
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('\\') => '\\',
                        Some('"') => '"',
                        Some(other) => {
                            return Err(YalError::syntax(
                                SyntaxErrorKind::BadEscape(other),
                                escape_at,
                            ))
                        }
                    };
                    text.push(escaped);
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn read_word(&mut self) -> YalResult<TokenKind> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if is_delimiter(ch) {
                break;
            }
            self.advance();
        }
        let word = &self.input[start..self.pos];

        if word == "." {
            return Ok(TokenKind::Dot);
        }
        if let Some(rest) = word.strip_prefix('#') {
            return match rest {
                "t" => Ok(TokenKind::Bool(true)),
                "f" => Ok(TokenKind::Bool(false)),
                _ => Err(YalError::syntax(SyntaxErrorKind::UnexpectedChar('#'), start)),
            };
        }
        if let Some(x) = non_finite(word) {
            return Ok(TokenKind::Real(x));
        }
        if looks_numeric(word) {
            return parse_number(word)
                .ok_or_else(|| {
                    YalError::syntax(SyntaxErrorKind::MalformedNumber(word.to_string()), start)
                });
        }
        Ok(TokenKind::Symbol(word.to_string()))
    }
}

fn is_delimiter(ch: char) -> bool {
    ch.is_whitespace() || matches!(ch, '(' | ')' | '\'' | '"' | ';')
}

/// A word is numeric if it starts with a digit, or a sign or `.` followed by
/// a digit (`-1`, `+.5`, `.5`). `+`, `-` and `...` stay symbols.
fn looks_numeric(word: &str) -> bool {
    let bytes = word.as_bytes();
    let unsigned = match bytes.first() {
        Some(b'+') | Some(b'-') => &bytes[1..],
        _ => bytes,
    };
    match unsigned {
        [d, ..] if d.is_ascii_digit() => true,
        [b'.', d, ..] if d.is_ascii_digit() => true,
        _ => false,
    }
}

/// The spellings the printer uses for infinities and NaN.
fn non_finite(word: &str) -> Option<f64> {
    match word {
        "+inf" => Some(f64::INFINITY),
        "-inf" => Some(f64::NEG_INFINITY),
        "+nan" | "-nan" => Some(f64::NAN),
        _ => None,
    }
}

fn parse_number(word: &str) -> Option<TokenKind> {
    let digits = word.strip_prefix(|c: char| c == '+' || c == '-').unwrap_or(word);
    if digits.bytes().all(|b| b.is_ascii_digit()) {
        return word.parse::<i64>().ok().map(TokenKind::Int);
    }
    word.parse::<f64>().ok().map(TokenKind::Real)
}
