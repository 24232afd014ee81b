//! Standard library - builtins available to generator code

pub mod builtins;
