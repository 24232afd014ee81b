//! Token definitions for the host language

use crate::utils::Span;
use std::fmt;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn eof(span: Span) -> Self {
        Self { kind: TokenKind::Eof, span }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    Namespace,
    Using,
    Class,
    Struct,
    Interface,
    Enum,
    Public,
    Private,
    Protected,
    Internal,
    Static,
    Partial,
    Readonly,
    Return,
    If,
    Else,
    While,
    For,
    Foreach,
    In,
    Var,
    New,
    True,
    False,
    Null,
    Default,
    Switch,
    Case,
    Break,
    Continue,
    Throw,
    Nameof,

    // ============ Literals ============
    /// Identifier
    Ident(String),
    /// Integer literal
    IntLit(i64),
    /// Integer literal with an `L` suffix
    LongLit(i64),
    /// Floating point literal
    FloatLit(f64),
    /// String literal
    StringLit(String),
    /// Character literal
    CharLit(char),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Eq,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// ++
    PlusPlus,
    /// --
    MinusMinus,
    /// =>
    FatArrow,
    /// .
    Dot,
    /// ?
    Question,
    /// ??
    QuestionQuestion,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// :
    Colon,
    /// ;
    Semicolon,

    // ============ Special ============
    /// End of file
    Eof,
    /// Unknown/invalid character
    Unknown(char),
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "namespace" => Some(TokenKind::Namespace),
            "using" => Some(TokenKind::Using),
            "class" => Some(TokenKind::Class),
            "struct" => Some(TokenKind::Struct),
            "interface" => Some(TokenKind::Interface),
            "enum" => Some(TokenKind::Enum),
            "public" => Some(TokenKind::Public),
            "private" => Some(TokenKind::Private),
            "protected" => Some(TokenKind::Protected),
            "internal" => Some(TokenKind::Internal),
            "static" => Some(TokenKind::Static),
            "partial" => Some(TokenKind::Partial),
            "readonly" => Some(TokenKind::Readonly),
            "return" => Some(TokenKind::Return),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "for" => Some(TokenKind::For),
            "foreach" => Some(TokenKind::Foreach),
            "in" => Some(TokenKind::In),
            "var" => Some(TokenKind::Var),
            "new" => Some(TokenKind::New),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "default" => Some(TokenKind::Default),
            "switch" => Some(TokenKind::Switch),
            "case" => Some(TokenKind::Case),
            "break" => Some(TokenKind::Break),
            "continue" => Some(TokenKind::Continue),
            "throw" => Some(TokenKind::Throw),
            "nameof" => Some(TokenKind::Nameof),
            _ => None,
        }
    }

    /// Whether this token can start a member or type modifier list
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            TokenKind::Public
                | TokenKind::Private
                | TokenKind::Protected
                | TokenKind::Internal
                | TokenKind::Static
                | TokenKind::Partial
                | TokenKind::Readonly
        )
    }

    /// Binding power of a binary operator (for precedence climbing).
    /// Returns None if not a binary operator
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            TokenKind::QuestionQuestion => Some(1),
            TokenKind::OrOr => Some(2),
            TokenKind::AndAnd => Some(3),
            TokenKind::EqEq | TokenKind::Ne => Some(4),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(5),
            TokenKind::Plus | TokenKind::Minus => Some(6),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(7),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::IntLit(v) | TokenKind::LongLit(v) => write!(f, "number {}", v),
            TokenKind::FloatLit(v) => write!(f, "number {}", v),
            TokenKind::StringLit(s) => write!(f, "string {:?}", s),
            TokenKind::CharLit(c) => write!(f, "char {:?}", c),
            TokenKind::Eof => write!(f, "end of file"),
            TokenKind::Unknown(c) => write!(f, "'{}'", c),
            other => {
                let text = match other {
                    TokenKind::Plus => "+",
                    TokenKind::Minus => "-",
                    TokenKind::Star => "*",
                    TokenKind::Slash => "/",
                    TokenKind::Percent => "%",
                    TokenKind::Eq => "=",
                    TokenKind::EqEq => "==",
                    TokenKind::Ne => "!=",
                    TokenKind::Lt => "<",
                    TokenKind::Le => "<=",
                    TokenKind::Gt => ">",
                    TokenKind::Ge => ">=",
                    TokenKind::AndAnd => "&&",
                    TokenKind::OrOr => "||",
                    TokenKind::Not => "!",
                    TokenKind::PlusEq => "+=",
                    TokenKind::MinusEq => "-=",
                    TokenKind::StarEq => "*=",
                    TokenKind::SlashEq => "/=",
                    TokenKind::PercentEq => "%=",
                    TokenKind::PlusPlus => "++",
                    TokenKind::MinusMinus => "--",
                    TokenKind::FatArrow => "=>",
                    TokenKind::Dot => ".",
                    TokenKind::Question => "?",
                    TokenKind::QuestionQuestion => "??",
                    TokenKind::LParen => "(",
                    TokenKind::RParen => ")",
                    TokenKind::LBrace => "{",
                    TokenKind::RBrace => "}",
                    TokenKind::LBracket => "[",
                    TokenKind::RBracket => "]",
                    TokenKind::Comma => ",",
                    TokenKind::Colon => ":",
                    TokenKind::Semicolon => ";",
                    keyword => return write!(f, "keyword '{}'", format!("{:?}", keyword).to_lowercase()),
                };
                write!(f, "'{}'", text)
            }
        }
    }
}
