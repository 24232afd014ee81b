//! Middle-end module - IR and lowering

pub mod ir;
pub mod ir_gen;
