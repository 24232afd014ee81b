//! Lexer for the host language
//!
//! Converts source code into a stream of tokens. Spans are byte offsets so
//! the exact text of any node can be sliced back out of the source.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{Error, Result, Span};

/// The lexer state
pub struct Lexer {
    /// Source code as chars
    source: Vec<char>,
    /// Byte offset of every char, plus one trailing entry for the end
    offsets: Vec<usize>,
    /// Current position in source
    pos: usize,
    /// Start position of current token
    start: usize,
    /// File ID for span tracking
    file_id: usize,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: usize) -> Self {
        let mut offsets: Vec<usize> = source.char_indices().map(|(i, _)| i).collect();
        offsets.push(source.len());
        Self {
            source: source.chars().collect(),
            offsets,
            pos: 0,
            start: 0,
            file_id,
        }
    }

    /// Get the current character without advancing
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    /// Get the next character without advancing
    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    /// Advance to the next character
    fn advance(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    /// Consume `expected` if it is next
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Check if we've reached the end of input
    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    /// Create a span from start to current position
    fn make_span(&self) -> Span {
        Span::new(self.offsets[self.start], self.offsets[self.pos], self.file_id)
    }

    /// Create a token with the current span
    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.make_span())
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                c if c.is_whitespace() => {
                    self.advance();
                }
                // Line comment
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                // Block comment
                '/' if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    while !self.is_at_end() {
                        if self.peek() == Some('*') && self.peek_next() == Some('/') {
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

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().collect();
        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    /// Read a number literal
    fn read_number(&mut self) -> Result<Token> {
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance();
            } else if c == '.' && !is_float && self.peek_next().is_some_and(|n| n.is_ascii_digit()) {
                is_float = true;
                self.advance();
            } else {
                break;
            }
        }

        let text: String = self.source[self.start..self.pos].iter().filter(|c| **c != '_').collect();
        let invalid = |lexer: &Self| Error::InvalidLiteral { text: text.clone(), span: lexer.make_span() };

        if is_float || self.peek().is_some_and(|c| c == 'd' || c == 'D') {
            self.eat('d');
            self.eat('D');
            let value = text.parse().map_err(|_| invalid(self))?;
            return Ok(self.make_token(TokenKind::FloatLit(value)));
        }

        let value: i64 = text.parse().map_err(|_| invalid(self))?;
        if self.eat('L') || self.eat('l') {
            Ok(self.make_token(TokenKind::LongLit(value)))
        } else {
            Ok(self.make_token(TokenKind::IntLit(value)))
        }
    }

    /// Read one escape sequence after a backslash
    fn read_escape(&mut self) -> Result<char> {
        let c = match self.advance() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('u') => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = self
                        .advance()
                        .and_then(|d| d.to_digit(16))
                        .ok_or(Error::UnterminatedLiteral { span: self.make_span() })?;
                    code = code * 16 + digit;
                }
                char::from_u32(code).ok_or(Error::UnterminatedLiteral { span: self.make_span() })?
            }
            Some(other) => other,
            None => return Err(Error::UnterminatedLiteral { span: self.make_span() }),
        };
        Ok(c)
    }

    /// Read a string literal
    fn read_string(&mut self) -> Result<Token> {
        self.advance(); // consume opening quote

        let mut value = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => value.push(self.read_escape()?),
                Some('\n') | None => return Err(Error::UnterminatedLiteral { span: self.make_span() }),
                Some(c) => value.push(c),
            }
        }

        Ok(self.make_token(TokenKind::StringLit(value)))
    }

    /// Read a character literal
    fn read_char(&mut self) -> Result<Token> {
        self.advance(); // consume opening quote

        let c = match self.advance() {
            Some('\\') => self.read_escape()?,
            Some('\'') | Some('\n') | None => {
                return Err(Error::UnterminatedLiteral { span: self.make_span() })
            }
            Some(c) => c,
        };

        if !self.eat('\'') {
            return Err(Error::UnterminatedLiteral { span: self.make_span() });
        }

        Ok(self.make_token(TokenKind::CharLit(c)))
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Result<Token> {
        self.skip_whitespace();
        self.start = self.pos;

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::eof(self.make_span())),
        };

        // Identifiers and keywords
        if c.is_alphabetic() || c == '_' {
            return Ok(self.read_identifier());
        }

        // Numbers
        if c.is_ascii_digit() {
            return self.read_number();
        }

        if c == '"' {
            return self.read_string();
        }

        if c == '\'' {
            return self.read_char();
        }

        self.advance();

        // Operators and punctuation
        let kind = match c {
            '+' => {
                if self.eat('=') {
                    TokenKind::PlusEq
                } else if self.eat('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('=') {
                    TokenKind::MinusEq
                } else if self.eat('-') {
                    TokenKind::MinusMinus
                } else {
                    TokenKind::Minus
                }
            }
            '*' => if self.eat('=') { TokenKind::StarEq } else { TokenKind::Star },
            '/' => if self.eat('=') { TokenKind::SlashEq } else { TokenKind::Slash },
            '%' => if self.eat('=') { TokenKind::PercentEq } else { TokenKind::Percent },
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else if self.eat('>') {
                    TokenKind::FatArrow
                } else {
                    TokenKind::Eq
                }
            }
            '!' => if self.eat('=') { TokenKind::Ne } else { TokenKind::Not },
            '<' => if self.eat('=') { TokenKind::Le } else { TokenKind::Lt },
            // `>>` is never produced so nested generic argument lists close cleanly
            '>' => if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt },
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            '?' => if self.eat('?') { TokenKind::QuestionQuestion } else { TokenKind::Question },
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            _ => TokenKind::Unknown(c),
        };

        Ok(self.make_token(kind))
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> Result<Vec<Token>> {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_attribute_and_method() {
        let tokens = kinds("[GeneratesMethod(nameof(Get))] static int X() => 3;");
        assert!(matches!(tokens[0], TokenKind::LBracket));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "GeneratesMethod"));
        assert!(matches!(tokens[3], TokenKind::Nameof));
        assert!(matches!(tokens[8], TokenKind::RBracket));
        assert!(matches!(tokens[9], TokenKind::Static));
        assert!(matches!(tokens[14], TokenKind::FatArrow));
        assert!(matches!(tokens[15], TokenKind::IntLit(3)));
        assert!(matches!(tokens.last(), Some(TokenKind::Eof)));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.14 7L 1_000 2d");
        assert!(matches!(tokens[0], TokenKind::IntLit(42)));
        assert!(matches!(tokens[1], TokenKind::FloatLit(f) if (f - 3.14).abs() < 0.001));
        assert!(matches!(tokens[2], TokenKind::LongLit(7)));
        assert!(matches!(tokens[3], TokenKind::IntLit(1000)));
        assert!(matches!(tokens[4], TokenKind::FloatLit(f) if f == 2.0));
    }

    #[test]
    fn test_member_access_on_integer() {
        let tokens = kinds("x.Length");
        assert!(matches!(tokens[1], TokenKind::Dot));
    }

    #[test]
    fn test_strings_and_chars() {
        let tokens = kinds(r#""a\"b\n" 'x' '\'' "A""#);
        assert!(matches!(tokens[0], TokenKind::StringLit(ref s) if s == "a\"b\n"));
        assert!(matches!(tokens[1], TokenKind::CharLit('x')));
        assert!(matches!(tokens[2], TokenKind::CharLit('\'')));
        assert!(matches!(tokens[3], TokenKind::StringLit(ref s) if s == "A"));
    }

    #[test]
    fn test_unterminated_string() {
        let err = Lexer::new("\"abc\n", 0).tokenize().unwrap_err();
        assert!(matches!(err, Error::UnterminatedLiteral { .. }));
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = Lexer::new("\"é\" x", 0).tokenize().unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 4, 0));
        assert_eq!(tokens[1].span, Span::new(5, 6, 0));
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = kinds("// line\n/* block */ a");
        assert!(matches!(tokens[0], TokenKind::Ident(ref s) if s == "a"));
    }
}
