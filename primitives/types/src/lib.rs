//! Types shared by every StorageHub component.
//!
//! Entities never point at each other directly: a Provider, a bucket, a file and a payment
//! stream are only linked through the identifiers defined here.

#![cfg_attr(not(feature = "std"), no_std)]

use sp_core::{Hasher, H256};
use sp_runtime::traits::BlakeTwo256;
use sp_std::vec::Vec;
use sp_trie::LayoutV1;

pub use sp_runtime::AccountId32;

/// The size of the hash output in bytes.
pub const H_LENGTH: usize = BlakeTwo256::LENGTH;

/// The file chunk size in bytes. This is the size of the leaf nodes in the Merkle
/// Patricia Trie that is constructed for each file.
pub const FILE_CHUNK_SIZE: u64 = 2u64.pow(10);

/// The number of challenges for a file, depending on the size of the file.
/// A file gets one challenge for every `FILE_SIZE_TO_CHALLENGES` bytes (rounded up).
pub const FILE_SIZE_TO_CHALLENGES: u64 = 2u64.pow(25);

/// A hash of some data used by the chain.
pub type Hash = H256;

/// The hashing algorithm used.
pub type Hashing = BlakeTwo256;

/// The layout of the storage proofs merkle trie.
pub type StorageProofsMerkleTrieLayout = LayoutV1<BlakeTwo256>;

/// Type representing the storage data units in StorageHub.
pub type StorageDataUnit = u64;

pub type AccountId = AccountId32;
pub type Balance = u128;
pub type BlockNumber = u32;

/// The protocol's discrete unit of time. One tick is produced per block unless the
/// challenges ticker is paused.
pub type TickNumber = u32;

pub type ProviderId = H256;
pub type BucketId = H256;
pub type MerkleHash = H256;
pub type FileKey = H256;
pub type Fingerprint = H256;
pub type RandomnessOutput = H256;
pub type ThresholdType = u32;
pub type ReplicationTarget = u32;
pub type FileLocation = Vec<u8>;
pub type PeerId = Vec<u8>;
pub type MultiAddress = Vec<u8>;

/// Root of an empty Merkle Patricia Forest. Every Provider and bucket starts with it.
pub fn default_merkle_root() -> MerkleHash {
    sp_trie::empty_trie_root::<StorageProofsMerkleTrieLayout>()
}
