//! Internal utilities shared by the analysis and code generation modules.

mod bitset;

pub(crate) use bitset::BlockSet;
