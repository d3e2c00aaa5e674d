//! The mid-level representation: a control-flow graph of a function body
//! whose edges are the places execution may suspend.

#[macro_use]
pub mod indexed_vec;

pub mod analysis;
pub mod build;
pub mod dump;
pub mod extract;
pub mod repr;
pub mod transform;
pub mod translate;
pub mod traversal;

#[cfg(test)]
pub mod test_util;
