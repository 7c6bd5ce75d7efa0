use crate::error::Error;

/// #Notes
/// The condition grammar only has four kinds of delimiters; everything in
///  between is a raw clause that [crate::clause] picks apart later. Keywords
///  are only delimiters on word boundaries, so `brand = ?` or `ORDER_ID > ?`
///  stay whole.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenType {
    ParenLeft,
    ParenRight,
    And,
    Or,
    Fragment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,

    // Byte indexes into the source
    pub start: usize,
    pub end: usize,
}

#[inline]
pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// This type simply holds a reference to the source and an index, so it's
///  cheap to copy.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input str,
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input str) -> Self {
        Self { source, current: 0 }
    }

    #[inline]
    fn bytes(&self) -> &'input [u8] {
        self.source.as_bytes()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.bytes().get(self.current).copied()
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    #[inline]
    fn consume_whitespace(&mut self) {
        self.consume_while(|b| b.is_ascii_whitespace());
    }

    /// True if a logical keyword starts at the current position and stands
    ///  alone as a word. Does not advance.
    fn at_keyword(&self, keyword: &[u8]) -> bool {
        let bytes = self.bytes();
        if self.current > 0 && is_word_byte(bytes[self.current - 1]) {
            return false;
        }
        let remainder = &bytes[self.current..];
        if keyword.len() > remainder.len() {
            return false;
        }
        // after the above check we can safely slice to keyword.len()
        remainder[..keyword.len()].eq_ignore_ascii_case(keyword)
            && !remainder.get(keyword.len()).copied().is_some_and(is_word_byte)
    }

    /// Advances past a quoted literal. Quotes have no escape sequences: the
    ///  literal ends at the next matching quote.
    fn consume_quoted(&mut self, term: u8) -> Result<(), Error> {
        let start = self.current;
        self.current += 1;
        self.consume_while(|b| b != term);
        if self.is_empty() {
            return Err(Error::UnterminatedString { position: start });
        }
        // consume closing term
        self.current += 1;
        Ok(())
    }

    fn consume_fragment(&mut self) -> Result<(), Error> {
        while let Some(c) = self.peek() {
            match c {
                b'(' | b')' => break,
                b'\'' | b'"' => self.consume_quoted(c)?,
                b'a' | b'A' | b'o' | b'O' if self.at_keyword(b"and") || self.at_keyword(b"or") => {
                    break;
                }
                _ => self.current += 1,
            }
        }
        Ok(())
    }

    /// Returns the slice of the source that this token was lexed from.
    #[inline]
    pub fn source_of(&self, token: &Token) -> &'input str {
        &self.source[token.start..token.end]
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.consume_whitespace();

        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let start = self.current;

        macro_rules! tok {
            ($name:ident, $len:expr) => {{
                self.current += $len;
                Token {
                    ty: TokenType::$name,
                    start,
                    end: self.current,
                }
            }};
        }

        Ok(Some(match c {
            b'(' => tok!(ParenLeft, 1),
            b')' => tok!(ParenRight, 1),
            _ if self.at_keyword(b"and") => tok!(And, 3),
            _ if self.at_keyword(b"or") => tok!(Or, 2),
            _ => {
                self.consume_fragment()?;
                // Whitespace before the next delimiter isn't part of the fragment
                let mut end = self.current;
                while end > start && self.bytes()[end - 1].is_ascii_whitespace() {
                    end -= 1;
                }
                Token {
                    ty: TokenType::Fragment,
                    start,
                    end,
                }
            }
        }))
    }
}

/// Splits a whole template into tokens.
pub fn tokenize(source: &str) -> Result<Vec<Token>, Error> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::with_capacity(8);
    while let Some(tok) = lexer.next_token()? {
        tokens.push(tok);
    }
    Ok(tokens)
}
