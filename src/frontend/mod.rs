//! Frontend module - Lexer, Parser, Semantic Model

pub mod token;
pub mod lexer;
pub mod ast;
pub mod parser;
pub mod references;
pub mod semantic;
