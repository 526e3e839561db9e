//! Utilities to work with sum trees outside of a running system: snapshot files of a store, and
//! graphviz rendering of a tree.
pub mod dump;
pub mod error;
pub mod snapshot;

pub use error::Error;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
