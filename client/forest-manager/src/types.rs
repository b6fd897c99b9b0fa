use std::fmt::Debug;

use hash_db::Hasher;
use shp_types::{FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH};
use sp_trie::CompactProof;
use trie_db::TrieLayout;

pub use shp_file_metadata::Leaf;

pub type HasherOutT<T> = <<T as TrieLayout>::Hash as Hasher>::Out;

/// Metadata of a file, the value stored in the forest under its file key.
pub type FileMetadata =
    shp_file_metadata::FileMetadata<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

/// What a forest proof shows about one challenged key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Proven<K, D: Debug> {
    /// The challenged key is itself a file key in the forest.
    ExactKey(Leaf<K, D>),
    /// The closest file keys below and above the challenged key. At most one side is missing.
    NeighbourKeys((Option<Leaf<K, D>>, Option<Leaf<K, D>>)),
    /// The forest is empty, so there is nothing to prove.
    Empty,
}

impl<K, D: Debug> Proven<K, D> {
    pub fn new_exact_key(key: K, data: D) -> Self {
        Proven::ExactKey(Leaf { key, data })
    }

    pub fn new_neighbour_keys(
        left: Option<Leaf<K, D>>,
        right: Option<Leaf<K, D>>,
    ) -> Result<Self, &'static str> {
        match (left, right) {
            (None, None) => Err("a challenged key needs at least one neighbour"),
            (left, right) => Ok(Proven::NeighbourKeys((left, right))),
        }
    }
}

/// A forest proof together with what it shows, one entry of `proven` per challenged key and in
/// the same order.
pub struct ForestProof<T: TrieLayout> {
    pub proven: Vec<Proven<HasherOutT<T>, ()>>,
    pub proof: CompactProof,
    /// Forest root the proof was generated against.
    pub root: HasherOutT<T>,
}
