#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Compact, Decode, Encode};
use core::fmt::{Debug, Display};
use num_bigint::BigUint;
use scale_info::TypeInfo;
use serde::{Deserialize, Serialize};
use shp_traits::AsCompact;
use sp_core::Hasher;
use sp_std::vec::Vec;


/// A hash of `H_LENGTH` bytes.
pub type Hash<const H_LENGTH: usize> = [u8; H_LENGTH];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMetadataError {
    InvalidFileSize,
    InvalidFingerprint,
}

/// Everything that identifies a file in StorageHub.
///
/// The SCALE encoding of this struct is the value stored in a Provider's forest under the file
/// key, and hashing that same encoding is what produces the file key. Changing any field (even
/// just the location) yields a different file.
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode, Serialize, Deserialize)]
pub struct FileMetadata<const H_LENGTH: usize, const CHUNK_SIZE: u64, const SIZE_TO_CHALLENGES: u64>
{
    owner: Vec<u8>,
    bucket_id: Vec<u8>,
    location: Vec<u8>,
    #[codec(compact)]
    file_size: u64,
    fingerprint: Fingerprint<H_LENGTH>,
}

impl<const H_LENGTH: usize, const CHUNK_SIZE: u64, const SIZE_TO_CHALLENGES: u64>
    FileMetadata<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>
{
    /// Build the metadata of a file, rejecting empty files.
    pub fn new(
        owner: Vec<u8>,
        bucket_id: Vec<u8>,
        location: Vec<u8>,
        size: u64,
        fingerprint: Fingerprint<H_LENGTH>,
    ) -> Result<Self, FileMetadataError> {
        if size == 0 {
            return Err(FileMetadataError::InvalidFileSize);
        }

        Ok(Self {
            owner,
            bucket_id,
            location,
            file_size: size,
            fingerprint,
        })
    }

    /// Decode metadata read back from a forest leaf, applying the same checks as [`Self::new`].
    pub fn decode_leaf(mut bytes: &[u8]) -> Result<Self, FileMetadataError> {
        let metadata =
            Self::decode(&mut bytes).map_err(|_| FileMetadataError::InvalidFingerprint)?;
        if metadata.file_size == 0 {
            return Err(FileMetadataError::InvalidFileSize);
        }
        Ok(metadata)
    }

    pub fn owner(&self) -> &Vec<u8> {
        &self.owner
    }

    pub fn bucket_id(&self) -> &Vec<u8> {
        &self.bucket_id
    }

    pub fn location(&self) -> &Vec<u8> {
        &self.location
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn fingerprint(&self) -> &Fingerprint<H_LENGTH> {
        &self.fingerprint
    }

    pub fn file_key<T: Hasher>(&self) -> T::Out {
        T::hash(self.encode().as_slice())
    }

    /// Number of chunks a Provider is challenged on when proving it stores this file.
    ///
    /// One per started `SIZE_TO_CHALLENGES` bytes, saturating at `u32::MAX`.
    pub fn chunks_to_check(&self) -> u32 {
        let challenges = self.file_size.div_ceil(SIZE_TO_CHALLENGES);
        u32::try_from(challenges).unwrap_or(u32::MAX)
    }

    pub fn chunks_count(&self) -> u64 {
        self.file_size.div_ceil(CHUNK_SIZE)
    }

    pub fn last_chunk_id(&self) -> ChunkId {
        ChunkId::new(self.chunks_count().saturating_sub(1))
    }

    /// Expected size of the chunk with id `chunk_id`. Every chunk is `CHUNK_SIZE` long except
    /// possibly the last one.
    pub fn chunk_size_at(&self, chunk_id: u64) -> usize {
        let last = self.chunks_count().saturating_sub(1);
        if chunk_id == last {
            let remainder = self.file_size % CHUNK_SIZE;
            if remainder == 0 {
                CHUNK_SIZE as usize
            } else {
                remainder as usize
            }
        } else {
            CHUNK_SIZE as usize
        }
    }
}

/// Commitment to the content of a file: the root of the Merkle Patricia Trie built over its
/// chunks, keyed by [`ChunkId::as_trie_key`].
#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, TypeInfo, Hash)]
pub struct Fingerprint<const H_LENGTH: usize>(Hash<H_LENGTH>);

impl<const H_LENGTH: usize> Default for Fingerprint<H_LENGTH> {
    fn default() -> Self {
        Self([0u8; H_LENGTH])
    }
}

impl<const H_LENGTH: usize> Fingerprint<H_LENGTH> {
    pub fn as_hash(&self) -> Hash<H_LENGTH> {
        self.0
    }

    pub fn try_from_slice(bytes: &[u8]) -> Result<Self, FileMetadataError> {
        let hash: Hash<H_LENGTH> = bytes
            .try_into()
            .map_err(|_| FileMetadataError::InvalidFingerprint)?;
        Ok(Self(hash))
    }
}

impl<const H_LENGTH: usize> Debug for Fingerprint<H_LENGTH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Fingerprint(0x{})", hex::encode(self.0))
    }
}

impl<const H_LENGTH: usize> Display for Fingerprint<H_LENGTH> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl<const H_LENGTH: usize> Serialize for Fingerprint<H_LENGTH> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.0.to_vec().serialize(serializer)
    }
}

impl<'de, const H_LENGTH: usize> Deserialize<'de> for Fingerprint<H_LENGTH> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Self::try_from_slice(&bytes)
            .map_err(|_| serde::de::Error::invalid_length(bytes.len(), &"a hash"))
    }
}

impl<const H_LENGTH: usize> From<Hash<H_LENGTH>> for Fingerprint<H_LENGTH> {
    fn from(hash: Hash<H_LENGTH>) -> Self {
        Self(hash)
    }
}

impl From<sp_core::H256> for Fingerprint<32> {
    fn from(hash: sp_core::H256) -> Self {
        Self(hash.0)
    }
}

impl From<Fingerprint<32>> for sp_core::H256 {
    fn from(fingerprint: Fingerprint<32>) -> Self {
        sp_core::H256(fingerprint.0)
    }
}

impl<const H_LENGTH: usize> AsRef<[u8]> for Fingerprint<H_LENGTH> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Zero-based index of a [`Chunk`] within its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TypeInfo, Encode, Decode, Ord, PartialOrd, Hash)]
pub struct ChunkId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkIdError {
    InvalidChunkId,
}

impl ChunkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// The chunk selected by a challenge: the challenge read as a big endian integer, modulo
    /// the number of chunks in the file.
    pub fn from_challenge(challenge: &[u8], chunks_count: u64) -> Self {
        if chunks_count == 0 {
            return Self(0);
        }
        let challenged_chunk = BigUint::from_bytes_be(challenge) % chunks_count;
        // The remainder is below `chunks_count`, so it always has at most one u64 digit.
        Self(challenged_chunk.iter_u64_digits().next().unwrap_or(0))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_trie_key(&self) -> Vec<u8> {
        AsCompact(self.0).encode()
    }

    pub fn from_trie_key(key: &[u8]) -> Result<Self, ChunkIdError> {
        let id = Compact::<u64>::decode(&mut &key[..])
            .map_err(|_| ChunkIdError::InvalidChunkId)?
            .0;
        Ok(Self(id))
    }
}

/// Raw bytes of a file chunk.
pub type Chunk = Vec<u8>;

/// The value stored at each leaf of a file's chunk trie.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct ChunkWithId {
    pub chunk_id: ChunkId,
    pub data: Chunk,
}

/// A key together with the data stored under it in a trie.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Leaf<K, D: Debug> {
    pub key: K,
    pub data: D,
}

impl<K, D: Debug> Leaf<K, D> {
    pub fn new(key: K, data: D) -> Self {
        Self { key, data }
    }
}
