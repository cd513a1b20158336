//! The archiving library under test: shape probing, the compatibility
//! adapter and the out-of-process binding.

pub mod adapter;
pub mod library;
pub mod process;
pub mod shape;
