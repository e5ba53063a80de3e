//! Token data model (spec.md §3: "Token. Tag ..., lexeme slice, line,
//! column"; §4.1 for the significant-whitespace / string / numeric forms).

use crate::string_interning::StringId;
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CharPosition {
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct TextLocation {
    pub start: CharPosition,
    pub end: CharPosition,
}

impl TextLocation {
    pub fn new(start: CharPosition, end: CharPosition) -> Self {
        Self { start, end }
    }
}

impl PartialOrd for TextLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.start
                .line
                .cmp(&other.start.line)
                .then(self.start.column.cmp(&other.start.column)),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NumberLiteral {
    Int,
    BigInt,
    Float,
    Complex,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringLiteralKind {
    Plain,
    Raw,
    Bytes,
    FStringStart,
    FStringMiddle,
    FStringEnd,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    BigIntLiteral(StringId), // decimal digits, arbitrary precision, stored as text
    Float(f64),
    Complex(f64),
    Bool(bool),
    None,
    StringLiteral {
        text: StringId,
        kind: StringLiteralKind,
    },
    Identifier(StringId),
    Keyword(Keyword),

    // Punctuation / operators
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Arrow,
    At,

    // Structure
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Def,
    Class,
    If,
    Elif,
    Else,
    For,
    While,
    Return,
    Yield,
    Raise,
    Try,
    Except,
    Finally,
    Import,
    From,
    As,
    Async,
    Await,
    Pass,
    Break,
    Continue,
    In,
    Is,
    Lambda,
    With,
    Global,
    Nonlocal,
    Del,
}

impl Keyword {
    pub fn from_str(s: &str) -> Option<Self> {
        use Keyword::*;
        Some(match s {
            "def" => Def,
            "class" => Class,
            "if" => If,
            "elif" => Elif,
            "else" => Else,
            "for" => For,
            "while" => While,
            "return" => Return,
            "yield" => Yield,
            "raise" => Raise,
            "try" => Try,
            "except" => Except,
            "finally" => Finally,
            "import" => Import,
            "from" => From,
            "as" => As,
            "async" => Async,
            "await" => Await,
            "pass" => Pass,
            "break" => Break,
            "continue" => Continue,
            "in" => In,
            "is" => Is,
            "lambda" => Lambda,
            "with" => With,
            "global" => Global,
            "nonlocal" => Nonlocal,
            "del" => Del,
            _ => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: TextLocation,
}

impl Token {
    pub fn new(kind: TokenKind, location: TextLocation) -> Self {
        Self { kind, location }
    }
}
