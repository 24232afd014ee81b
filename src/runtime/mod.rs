//! Runtime - values, library loading and the execution arena

pub mod arena;
pub mod library;
pub mod value;
