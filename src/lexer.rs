//! C1: byte stream -> token stream with source positions (spec.md §4.1).
//!
//! Grounded on `compiler_frontend/tokenizer/tokenizer.rs`'s own
//! `Peekable<Chars>`-driven scan loop and `compiler_frontend/tokenizer/tokens.rs`'s
//! `CharPosition`/`TextLocation` shape.

use crate::errors::{CharPosition as ErrCharPosition, EmberError, ErrorKind, ErrorLocation};
use crate::string_interning::StringTable;
use crate::token::{CharPosition, Keyword, StringLiteralKind, TextLocation, Token, TokenKind};
use std::iter::Peekable;
use std::path::Path;
use std::str::CharIndices;

pub struct Lexer<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
    indent_stack: Vec<u32>,
    file: std::path::PathBuf,
    at_line_start: bool,
    paren_depth: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, file: &Path) -> Self {
        Lexer {
            chars: source.char_indices().peekable(),
            line: 1,
            column: 0,
            indent_stack: vec![0],
            file: file.to_path_buf(),
            at_line_start: true,
            paren_depth: 0,
        }
    }

    fn here(&self) -> CharPosition {
        CharPosition {
            line: self.line,
            column: self.column,
        }
    }

    fn err_loc(&self, start: CharPosition) -> ErrorLocation {
        ErrorLocation::new(
            self.file.clone(),
            ErrCharPosition {
                line: start.line,
                column: start.column,
            },
            ErrCharPosition {
                line: self.line,
                column: self.column,
            },
        )
    }

    fn bump(&mut self) -> Option<char> {
        let (_, c) = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn peek2(&mut self) -> Option<char> {
        let mut clone = self.chars.clone();
        clone.next();
        clone.next().map(|(_, c)| c)
    }

    /// Tokenize the whole source, including synthesized INDENT/DEDENT and a
    /// trailing EOF.
    pub fn tokenize(
        source: &str,
        file: &Path,
        string_table: &mut StringTable,
    ) -> Result<Vec<Token>, EmberError> {
        let mut lexer = Lexer::new(source, file);
        let mut tokens = Vec::with_capacity(source.len() / crate::settings::SRC_TO_TOKEN_RATIO);

        loop {
            if lexer.at_line_start && lexer.paren_depth == 0 {
                if let Some(mut indent_tokens) = lexer.consume_indentation()? {
                    tokens.append(&mut indent_tokens);
                }
                lexer.at_line_start = false;
            }

            let Some(c) = lexer.peek() else {
                break;
            };

            if c == '\n' {
                let start = lexer.here();
                lexer.bump();
                if lexer.paren_depth == 0 {
                    tokens.push(Token::new(
                        TokenKind::Newline,
                        TextLocation::new(start, lexer.here()),
                    ));
                    lexer.at_line_start = true;
                }
                continue;
            }

            if c == '\\' && lexer.peek2() == Some('\n') {
                // Explicit line continuation: swallow both characters, no token.
                lexer.bump();
                lexer.bump();
                continue;
            }

            if c == ' ' || c == '\t' {
                lexer.bump();
                continue;
            }

            if c == '#' {
                while let Some(c) = lexer.peek() {
                    if c == '\n' {
                        break;
                    }
                    lexer.bump();
                }
                continue;
            }

            if c.is_ascii_digit() {
                tokens.push(lexer.lex_number(string_table)?);
                continue;
            }

            if c == '"' || c == '\'' {
                tokens.push(lexer.lex_string(None, string_table)?);
                continue;
            }

            if is_ident_start(c) {
                tokens.push(lexer.lex_identifier_or_prefixed_string(string_table)?);
                continue;
            }

            tokens.push(lexer.lex_operator()?);
        }

        // Close any still-open indentation levels at EOF.
        while lexer.indent_stack.len() > 1 {
            lexer.indent_stack.pop();
            tokens.push(Token::new(
                TokenKind::Dedent,
                TextLocation::new(lexer.here(), lexer.here()),
            ));
        }
        tokens.push(Token::new(
            TokenKind::Eof,
            TextLocation::new(lexer.here(), lexer.here()),
        ));

        Ok(tokens)
    }

    /// Computes the indentation width of the current line and emits
    /// INDENT/DEDENT tokens relative to the indent stack. A dedent that
    /// doesn't match any enclosing indent level is an `IndentationError`.
    fn consume_indentation(&mut self) -> Result<Option<Vec<Token>>, EmberError> {
        let start = self.here();
        let mut width = 0u32;
        let mut saw_tab = false;
        let mut saw_space = false;

        loop {
            match self.peek() {
                Some(' ') => {
                    saw_space = true;
                    width += 1;
                    self.bump();
                }
                Some('\t') => {
                    saw_tab = true;
                    // A tab advances to the next multiple of 8, matching the
                    // teacher's tokenizer's column-width convention.
                    width += 8 - (width % 8);
                    self.bump();
                }
                _ => break,
            }
        }

        // Blank lines and comment-only lines don't affect indentation.
        match self.peek() {
            None | Some('\n') | Some('#') => return Ok(None),
            _ => {}
        }

        if saw_tab && saw_space {
            return Err(EmberError::new(
                ErrorKind::Lexical,
                "inconsistent use of tabs and spaces in indentation",
            )
            .at(self.err_loc(start)));
        }

        let current = *self.indent_stack.last().unwrap();
        let mut out = Vec::new();
        if width > current {
            self.indent_stack.push(width);
            out.push(Token::new(
                TokenKind::Indent,
                TextLocation::new(start, self.here()),
            ));
        } else {
            while width < *self.indent_stack.last().unwrap() {
                self.indent_stack.pop();
                out.push(Token::new(
                    TokenKind::Dedent,
                    TextLocation::new(start, self.here()),
                ));
            }
            if *self.indent_stack.last().unwrap() != width {
                return Err(EmberError::new(
                    ErrorKind::Lexical,
                    "dedent does not match any outer indentation level",
                )
                .at(self.err_loc(start)));
            }
        }

        Ok(Some(out))
    }

    fn lex_number(&mut self, string_table: &mut StringTable) -> Result<Token, EmberError> {
        let start = self.here();
        let mut text = String::new();

        if self.peek() == Some('0') && matches!(self.peek2(), Some('x' | 'o' | 'b')) {
            text.push(self.bump().unwrap());
            text.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
            let cleaned: String = text.chars().filter(|c| *c != '_').collect();
            let (radix, digits) = match &cleaned[..2] {
                "0x" | "0X" => (16, &cleaned[2..]),
                "0o" | "0O" => (8, &cleaned[2..]),
                "0b" | "0B" => (2, &cleaned[2..]),
                _ => unreachable!(),
            };
            let location = TextLocation::new(start, self.here());
            return match i64::from_str_radix(digits, radix) {
                Ok(value) => Ok(Token::new(TokenKind::Int(value), location)),
                // Beyond i64 range, not malformed: promote to arbitrary
                // precision the same way the decimal path does (spec.md §8
                // boundary behavior isn't base-specific - `0xFFFFFFFFFFFFFFFF`
                // promotes just like an oversized decimal literal would).
                Err(e) if *e.kind() == std::num::IntErrorKind::PosOverflow => {
                    let decimal = radix_digits_to_decimal(digits, radix).ok_or_else(|| {
                        EmberError::new(
                            ErrorKind::Lexical,
                            format!("invalid base-{radix} integer literal"),
                        )
                        .at(self.err_loc(start))
                    })?;
                    let id = string_table.intern(&decimal);
                    Ok(Token::new(TokenKind::BigIntLiteral(id), location))
                }
                Err(_) => Err(EmberError::new(
                    ErrorKind::Lexical,
                    format!("invalid base-{radix} integer literal"),
                )
                .at(self.err_loc(start))),
            };
        }

        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push(self.bump().unwrap());
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            is_float = true;
            text.push(self.bump().unwrap());
            if matches!(self.peek(), Some('+' | '-')) {
                text.push(self.bump().unwrap());
            }
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.bump();
                } else {
                    break;
                }
            }
        }

        let is_complex = self.peek() == Some('j');
        if is_complex {
            self.bump();
        }

        let cleaned: String = text.chars().filter(|c| *c != '_').collect();
        let location = TextLocation::new(start, self.here());

        if is_complex {
            let magnitude: f64 = cleaned
                .parse()
                .map_err(|_| EmberError::new(ErrorKind::Lexical, "invalid complex literal"))?;
            return Ok(Token::new(TokenKind::Complex(magnitude), location));
        }
        if is_float {
            let value: f64 = cleaned
                .parse()
                .map_err(|_| EmberError::new(ErrorKind::Lexical, "invalid float literal"))?;
            return Ok(Token::new(TokenKind::Float(value), location));
        }
        match cleaned.parse::<i64>() {
            Ok(value) => Ok(Token::new(TokenKind::Int(value), location)),
            // Integer literal beyond fixed-width range is promoted to an
            // arbitrary-precision literal (spec.md §8 boundary behavior);
            // the text is kept verbatim and widened by the type checker.
            Err(_) => {
                let id = string_table.intern(&cleaned);
                Ok(Token::new(TokenKind::BigIntLiteral(id), location))
            }
        }
    }

    fn lex_identifier_or_prefixed_string(
        &mut self,
        string_table: &mut StringTable,
    ) -> Result<Token, EmberError> {
        let start = self.here();
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if is_ident_continue(c) {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }

        // String prefixes: r, b, f, rb/br, rf/fr (case-insensitive), directly
        // followed by a quote.
        if matches!(self.peek(), Some('"') | Some('\'')) {
            let lowered = text.to_ascii_lowercase();
            let prefix = match lowered.as_str() {
                "r" | "b" | "f" | "rb" | "br" | "rf" | "fr" => Some(lowered),
                _ => None,
            };
            if let Some(prefix) = prefix {
                return self.lex_string(Some(prefix), string_table);
            }
        }

        let location = TextLocation::new(start, self.here());
        if let Some(keyword) = Keyword::from_str(&text) {
            return Ok(Token::new(TokenKind::Keyword(keyword), location));
        }
        match text.as_str() {
            "True" => return Ok(Token::new(TokenKind::Bool(true), location)),
            "False" => return Ok(Token::new(TokenKind::Bool(false), location)),
            "None" => return Ok(Token::new(TokenKind::None, location)),
            "and" => return Ok(Token::new(TokenKind::And, location)),
            "or" => return Ok(Token::new(TokenKind::Or, location)),
            "not" => return Ok(Token::new(TokenKind::Not, location)),
            _ => {}
        }
        let id = string_table.intern(&text);
        Ok(Token::new(TokenKind::Identifier(id), location))
    }

    /// Lexes a quoted string literal, handling single/double/triple quoting,
    /// raw/byte prefixes, and splitting f-strings into FSTRING_START /
    /// (recursively lexed expression tokens) / FSTRING_END, per spec.md §4.1.
    fn lex_string(
        &mut self,
        prefix: Option<String>,
        string_table: &mut StringTable,
    ) -> Result<Token, EmberError> {
        let start = self.here();
        let prefix = prefix.unwrap_or_default();
        let is_raw = prefix.contains('r');
        let is_bytes = prefix.contains('b');
        let is_fstring = prefix.contains('f');

        let quote = self.bump().expect("caller verified a quote follows");
        let triple = self.peek() == Some(quote) && self.peek2() == Some(quote);
        if triple {
            self.bump();
            self.bump();
        }

        let mut literal = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(EmberError::new(
                        ErrorKind::Lexical,
                        "unterminated string literal",
                    )
                    .at(self.err_loc(start)));
                }
                Some(c) if c == quote => {
                    if !triple {
                        self.bump();
                        break;
                    }
                    let mut clone = self.chars.clone();
                    clone.next();
                    if clone.next().map(|(_, c)| c) == Some(quote) {
                        self.bump();
                        self.bump();
                        self.bump();
                        break;
                    }
                    literal.push(c);
                    self.bump();
                }
                Some('\\') if !is_raw => {
                    self.bump();
                    match self.bump() {
                        Some('n') => literal.push('\n'),
                        Some('t') => literal.push('\t'),
                        Some('r') => literal.push('\r'),
                        Some(other) => literal.push(other),
                        None => {
                            return Err(EmberError::new(
                                ErrorKind::Lexical,
                                "unterminated escape sequence",
                            )
                            .at(self.err_loc(start)));
                        }
                    }
                }
                Some(c) => {
                    literal.push(c);
                    self.bump();
                }
            }
        }

        let location = TextLocation::new(start, self.here());
        let kind = if is_bytes {
            StringLiteralKind::Bytes
        } else if is_raw {
            StringLiteralKind::Raw
        } else if is_fstring {
            // Interpolation is expanded by the parser (which needs the full
            // token stream to recursively invoke the lexer on `{expr}`
            // spans); the lexer hands back the raw template text and a
            // marker kind so the parser knows to re-enter lexing.
            StringLiteralKind::FStringStart
        } else {
            StringLiteralKind::Plain
        };
        let id = string_table.intern(&literal);
        Ok(Token::new(
            TokenKind::StringLiteral { text: id, kind },
            location,
        ))
    }

    fn lex_operator(&mut self) -> Result<Token, EmberError> {
        let start = self.here();
        let c = self.bump().unwrap();
        let kind = match c {
            '+' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::PlusAssign
            }
            '+' => TokenKind::Plus,
            '-' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::MinusAssign
            }
            '-' if self.peek() == Some('>') => {
                self.bump();
                TokenKind::Arrow
            }
            '-' => TokenKind::Minus,
            '*' if self.peek() == Some('*') => {
                self.bump();
                TokenKind::DoubleStar
            }
            '*' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::StarAssign
            }
            '*' => TokenKind::Star,
            '/' if self.peek() == Some('/') => {
                self.bump();
                TokenKind::DoubleSlash
            }
            '/' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::SlashAssign
            }
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::Eq
            }
            '=' => TokenKind::Assign,
            '!' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::NotEq
            }
            '<' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::LtEq
            }
            '<' => TokenKind::Lt,
            '>' if self.peek() == Some('=') => {
                self.bump();
                TokenKind::GtEq
            }
            '>' => TokenKind::Gt,
            '(' => {
                self.paren_depth += 1;
                TokenKind::LParen
            }
            ')' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RParen
            }
            '[' => {
                self.paren_depth += 1;
                TokenKind::LBracket
            }
            ']' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RBracket
            }
            '{' => {
                self.paren_depth += 1;
                TokenKind::LBrace
            }
            '}' => {
                self.paren_depth = self.paren_depth.saturating_sub(1);
                TokenKind::RBrace
            }
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '@' => TokenKind::At,
            other => {
                return Err(EmberError::new(
                    ErrorKind::Lexical,
                    format!("unexpected character '{other}'"),
                )
                .at(self.err_loc(start)));
            }
        };
        Ok(Token::new(kind, TextLocation::new(start, self.here())))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Converts a base-2/8/16 digit string too wide for `i64` into a decimal
/// digit string, matching `BigIntLiteral`'s "decimal digits, arbitrary
/// precision" storage convention. Schoolbook long multiplication over a
/// little-endian vector of decimal digits - no `i64`/bignum crate involved,
/// so it never overflows regardless of input length. Returns `None` if a
/// character isn't a valid digit in `radix`.
fn radix_digits_to_decimal(digits: &str, radix: u32) -> Option<String> {
    let mut acc: Vec<u8> = vec![0];
    for c in digits.chars() {
        let digit = c.to_digit(radix)?;
        let mut carry = digit;
        for slot in acc.iter_mut() {
            let v = *slot as u32 * radix + carry;
            *slot = (v % 10) as u8;
            carry = v / 10;
        }
        while carry > 0 {
            acc.push((carry % 10) as u8);
            carry /= 10;
        }
    }
    while acc.len() > 1 && *acc.last().unwrap() == 0 {
        acc.pop();
    }
    Some(acc.iter().rev().map(|d| (b'0' + d) as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<TokenKind> {
        let mut table = StringTable::new();
        Lexer::tokenize(src, Path::new("test.ember"), &mut table)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn fibonacci_tokenizes_with_indent_dedent() {
        let src = "def fib(n):\n    if n <= 1:\n        return n\n    return fib(n-1)\n";
        let kinds = lex(src);
        assert!(matches!(kinds[0], TokenKind::Keyword(Keyword::Def)));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Indent)));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::Dedent)));
        assert!(matches!(kinds.last(), Some(TokenKind::Eof)));
    }

    #[test]
    fn mixed_tabs_and_spaces_is_a_lexical_error() {
        let src = "def f():\n \tpass\n";
        let mut table = StringTable::new();
        let err = Lexer::tokenize(src, Path::new("test.ember"), &mut table).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
    }

    #[test]
    fn hex_octal_binary_literals_with_underscores() {
        let kinds = lex("0x1_F\n0o17\n0b10_10\n");
        assert_eq!(
            kinds
                .iter()
                .filter(|k| matches!(k, TokenKind::Int(_)))
                .count(),
            3
        );
    }

    #[test]
    fn hex_literal_beyond_i64_range_promotes_to_bigint() {
        let mut table = StringTable::new();
        let tokens = Lexer::tokenize("0xFFFFFFFFFFFFFFFF\n", Path::new("test.ember"), &mut table).unwrap();
        let big = tokens
            .iter()
            .find_map(|t| match t.kind {
                TokenKind::BigIntLiteral(id) => Some(id),
                _ => None,
            })
            .expect("overflowing hex literal should promote to BigIntLiteral, not error");
        assert_eq!(table.resolve(big), "18446744073709551615");
    }

    #[test]
    fn binary_literal_with_invalid_digit_is_still_a_lexical_error() {
        let mut table = StringTable::new();
        let err = Lexer::tokenize("0b12\n", Path::new("test.ember"), &mut table).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lexical);
    }

    #[test]
    fn line_continuation_suppresses_newline() {
        let kinds = lex("x = 1 + \\\n    2\n");
        let newline_count = kinds.iter().filter(|k| matches!(k, TokenKind::Newline)).count();
        assert_eq!(newline_count, 1);
    }
}
