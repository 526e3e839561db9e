//! # Sum trees
//!
//! A persistent ordered map from byte string keys to non-negative weights, stored as a tree of
//! nodes in an ordered key value store. Every branch keeps the accumulated weight of each of its
//! children, so the total weight of all keys smaller than, equal to, or greater than a given key
//! can be computed by reading a single path from the root to a leaf.
//!
//! ## Storage layout
//!
//! Each node is stored under the storage key `node/ ‖ level ‖ key`, where `level` is a big endian
//! u16 and `key` is the minimum key of the subtree the node covers. Leaves are at level `0`, and
//! each leaf holds the weight of exactly one key. Because the storage keys of higher levels sort
//! after the lower ones, the root is always the last entry in the `node/` namespace, so there is
//! no need to store a root pointer.
//!
//! Nodes are [dag-cbor] encoded, see the [node] module. Trees written with the older json
//! encoding can be converted in place using [migrate](fn.migrate.html).
//!
//! ## Balancing
//!
//! The tree is kept balanced like a [B-Tree]: branches hold between `min_children` and
//! `max_children` children, all leaves are at level `0`, and every path from the root to a leaf
//! has the same length. The shape is determined by the [Config], which is not persisted.
//!
//! ## Multiple trees
//!
//! A store holds at most one tree. To keep several independent trees in one store, wrap it in a
//! [PrefixStore].
//!
//! [dag-cbor]: https://ipld.io/specs/codecs/dag-cbor/spec/
//! [B-Tree]: https://en.wikipedia.org/wiki/B-tree
//! [node]: node/index.html
//! [Config]: struct.Config.html
//! [PrefixStore]: store/struct.PrefixStore.html
pub mod config;
pub mod error;
pub mod keys;
pub mod legacy;
pub mod migrate;
pub mod node;
pub mod store;
pub mod tree;
mod util;

pub use config::Config;
pub use error::Error;
pub use migrate::{migrate, MigrationSummary};
pub use node::{Branch, Child, Leaf, Node, Weight};
pub use store::{ArcKvStore, KeyValue, KvStore, MemStore, PrefixStore, ReadOnlyStore};
pub use tree::{find_root, SplitAcc, Tree};
pub use util::BoxedIter;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
