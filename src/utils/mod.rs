//! Utility module

mod span;
mod error;

pub use span::{SourceMap, Span};
pub use error::{Error, Result};
