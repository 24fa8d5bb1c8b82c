use crate::error::{SyntaxErrorKind, YalError, YalResult};
use crate::heap::Heap;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

/// Deepest nesting of lists and quotes the reader accepts.
pub const MAX_READ_DEPTH: usize = 512;

/// Recursive-descent reader: turns source text into heap-resident values.
/// Keeps no state between calls beyond the position in its input.
pub struct Reader<'a> {
    lexer: Lexer<'a>,
    heap: &'a mut Heap,
    symbols: &'a mut SymbolTable,
    depth: usize,
}

impl<'a> Reader<'a> {
    pub fn new(input: &'a str, heap: &'a mut Heap, symbols: &'a mut SymbolTable) -> Self {
        Reader {
            lexer: Lexer::new(input),
            heap,
            symbols,
            depth: 0,
        }
    }

    /// Read one expression. Returns None at end of input.
    pub fn read(&mut self) -> YalResult<Option<Value>> {
        match self.lexer.next_token()? {
            Some(token) => self.read_expr(token).map(Some),
            None => Ok(None),
        }
    }

    /// Byte offset just past the last expression read.
    pub fn position(&self) -> usize {
        self.lexer.position()
    }


    fn read_expr(&mut self, token: Token) -> YalResult<Value> {
        match token.kind {
            TokenKind::LParen => self.nested(token.offset, |r| r.read_list(token.offset)),
            TokenKind::RParen => Err(YalError::syntax(SyntaxErrorKind::UnexpectedClose, token.offset)),
            TokenKind::Dot => Err(YalError::syntax(SyntaxErrorKind::BadDot, token.offset)),
            TokenKind::Quote => self.nested(token.offset, |r| r.read_quote(token.offset)),
            TokenKind::Int(n) => Ok(Value::Int(n)),
            TokenKind::Real(x) => Ok(Value::Real(x)),
            TokenKind::Bool(b) => Ok(Value::Bool(b)),
            TokenKind::Str(text) => Ok(Value::Str(self.heap.alloc_string(&text)?)),
            TokenKind::Symbol(name) => {
                if name == "nil" {
                    Ok(Value::Nil)
                } else {
                    Ok(Value::Symbol(self.symbols.intern(&name)))
                }
            }
        }
    }

    fn nested(
        &mut self,
        offset: usize,
        read: impl FnOnce(&mut Self) -> YalResult<Value>,
    ) -> YalResult<Value> {
        if self.depth >= MAX_READ_DEPTH {
            return Err(YalError::syntax(SyntaxErrorKind::TooDeep, offset));
        }
        self.depth += 1;
        let result = read(self);
        self.depth -= 1;
        result
    }

    /// Read a list: (a b c) or (a . b) or (a b . c)
    fn read_list(&mut self, open: usize) -> YalResult<Value> {
        let unclosed = || YalError::syntax(SyntaxErrorKind::UnclosedList, open);
        let mut elements = Vec::new();
        let mut tail = Value::Nil;

        loop {
            let token = self.lexer.next_token()?.ok_or_else(unclosed)?;
            match token.kind {
                TokenKind::RParen => break,
                TokenKind::Dot => {
                    if elements.is_empty() {
                        return Err(YalError::syntax(SyntaxErrorKind::BadDot, token.offset));
                    }
                    let datum = self.lexer.next_token()?.ok_or_else(unclosed)?;
                    if matches!(datum.kind, TokenKind::RParen | TokenKind::Dot) {
                        return Err(YalError::syntax(SyntaxErrorKind::BadDot, token.offset));
                    }
                    tail = self.read_expr(datum)?;
                    let close = self.lexer.next_token()?.ok_or_else(unclosed)?;
                    if close.kind != TokenKind::RParen {
                        return Err(YalError::syntax(SyntaxErrorKind::BadDot, token.offset));
                    }
                    break;
                }
                _ => elements.push(self.read_expr(token)?),
            }
        }

        self.heap.list_with_tail(&elements, tail)
    }

    /// 'x -> (quote x)
    fn read_quote(&mut self, offset: usize) -> YalResult<Value> {
        let token = self
            .lexer
            .next_token()?
            .ok_or_else(|| YalError::syntax(SyntaxErrorKind::UnexpectedEof, offset))?;
        let quoted = self.read_expr(token)?;
        self.heap.list(&[Value::Symbol(sym::QUOTE), quoted])
    }
}

/// Read a single expression from a string.
pub fn read_str(input: &str, heap: &mut Heap, symbols: &mut SymbolTable) -> YalResult<Value> {
    let mut reader = Reader::new(input, heap, symbols);
    reader
        .read()?
        .ok_or_else(|| YalError::syntax(SyntaxErrorKind::UnexpectedEof, input.len()))
}

/// Read one expression starting at byte offset `pos`.
/// Returns `Ok(Some((value, new_pos)))` or `Ok(None)` if only whitespace/comments remain.
/// Error offsets are relative to the start of `input`.
pub fn read_one_at(
    input: &str,
    pos: usize,
    heap: &mut Heap,
    symbols: &mut SymbolTable,
) -> YalResult<Option<(Value, usize)>> {
    let mut reader = Reader {
        lexer: Lexer::at(input, pos),
        heap,
        symbols,
        depth: 0,
    };
    match reader.read()? {
        Some(val) => Ok(Some((val, reader.position()))),
        None => Ok(None),
    }
}
