//! icicle-treehash: SHA-256 tree hashing for archival uploads
//!
//! # Overview
//! - `tree`: split a source into 1 MiB leaves and hash each one
//! - `combine`: fold leaf or part hashes pairwise into a single root
//!
//! The same root comes out whether a file is hashed whole or as
//! power-of-two-MiB parts whose roots are combined afterwards.

pub mod combine;
pub mod tree;

pub use combine::{combine, hash_pair};
pub use tree::{
    leaf_hashes, tree_hash, tree_hash_bytes, tree_hash_file, tree_hash_reader, HashSource,
    LeafHashes, TreeHash, EMPTY_TREE_HASH, LEAF_SIZE,
};
