//! Error handling for the host front end and compiler

use crate::utils::{SourceMap, Span};
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Front-end and compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Lexer / Parser Errors ====================

    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Expected {0}")]
    Expected(String, Span),

    #[error("Expected identifier")]
    ExpectedIdent { span: Span },

    #[error("Expected type")]
    ExpectedType { span: Span },

    #[error("Expected expression")]
    ExpectedExpr { span: Span },

    #[error("Unterminated literal")]
    UnterminatedLiteral { span: Span },

    #[error("Invalid literal: {text}")]
    InvalidLiteral { text: String, span: Span },

    // ==================== Semantic Errors ====================

    #[error("The name '{name}' does not exist in the current context")]
    UndefinedVariable { name: String, span: Span },

    #[error("Duplicate definition: {name}")]
    DuplicateDefinition { name: String, span: Span },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Argument count mismatch calling '{name}': expected {expected}, got {got}")]
    ArgCountMismatch {
        name: String,
        expected: usize,
        got: usize,
        span: Span,
    },

    #[error("Expression is not callable")]
    NotCallable { span: Span },

    #[error("Undefined type: {name}")]
    UndefinedType { name: String, span: Span },

    #[error("'{ty}' does not contain a definition for '{member}'")]
    UnknownMember { ty: String, member: String, span: Span },

    #[error("An object reference is required for the non-static member '{name}'")]
    InstanceMemberFromStatic { name: String, span: Span },

    #[error("Partial method '{method}' must have an implementation part")]
    MissingPartialImplementation { method: String, span: Span },

    #[error("The switch statement contains multiple cases with the label value '{label}'")]
    DuplicateCaseLabel { label: String, span: Span },

    #[error("Attribute type '{name}' could not be found")]
    AttributeNotFound { name: String, span: Span },

    #[error("An attribute argument must be a constant expression")]
    NonConstantAttributeArgument { span: Span },

    #[error("The left-hand side of an assignment must be a variable or indexer")]
    InvalidAssignmentTarget { span: Span },

    #[error("No enclosing loop out of which to break or continue")]
    NoEnclosingLoop { span: Span },

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Get the span associated with this error
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::UnexpectedToken { span, .. } => Some(*span),
            Self::Expected(_, span) => Some(*span),
            Self::ExpectedIdent { span } => Some(*span),
            Self::ExpectedType { span } => Some(*span),
            Self::ExpectedExpr { span } => Some(*span),
            Self::UnterminatedLiteral { span } => Some(*span),
            Self::InvalidLiteral { span, .. } => Some(*span),
            Self::UndefinedVariable { span, .. } => Some(*span),
            Self::DuplicateDefinition { span, .. } => Some(*span),
            Self::TypeMismatch { span, .. } => Some(*span),
            Self::ArgCountMismatch { span, .. } => Some(*span),
            Self::NotCallable { span } => Some(*span),
            Self::UndefinedType { span, .. } => Some(*span),
            Self::UnknownMember { span, .. } => Some(*span),
            Self::InstanceMemberFromStatic { span, .. } => Some(*span),
            Self::MissingPartialImplementation { span, .. } => Some(*span),
            Self::DuplicateCaseLabel { span, .. } => Some(*span),
            Self::AttributeNotFound { span, .. } => Some(*span),
            Self::NonConstantAttributeArgument { span } => Some(*span),
            Self::InvalidAssignmentTarget { span } => Some(*span),
            Self::NoEnclosingLoop { span } => Some(*span),
            Self::Io(_) => None,
        }
    }

    /// Render as `path:line:column: message`
    pub fn render(&self, sources: &SourceMap) -> String {
        match self.span() {
            Some(span) => format!("{}: {}", sources.describe(span), self),
            None => self.to_string(),
        }
    }
}
