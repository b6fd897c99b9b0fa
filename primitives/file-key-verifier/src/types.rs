use codec::{Decode, Encode};
use scale_info::TypeInfo;
use shp_file_metadata::{Chunk, ChunkId, ChunkWithId, FileMetadata, Leaf};
use sp_std::vec::Vec;
use sp_trie::{CompactProof, TrieDBBuilder, TrieLayout};
use trie_db::Trie;

/// Proof that some chunks of a file belong to it: the file's metadata plus a compact proof of
/// those chunks against the metadata's fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, TypeInfo, Encode, Decode)]
pub struct FileKeyProof<const H_LENGTH: usize, const CHUNK_SIZE: u64, const SIZE_TO_CHALLENGES: u64>
{
    pub file_metadata: FileMetadata<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>,
    pub proof: CompactProof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvenFileKeyError {
    /// The fingerprint from FileMetadata can not be converted to the output of the trie's hasher.
    FingerprintAndTrieHashMismatch,
    /// The root hash of the trie does not match the expected root hash.
    TrieAndExpectedRootMismatch,
    /// A leaf of the trie does not hold a [`ChunkWithId`] matching its key.
    InvalidChunk(ChunkId),
}

impl<const H_LENGTH: usize, const CHUNK_SIZE: u64, const SIZE_TO_CHALLENGES: u64>
    FileKeyProof<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>
{
    pub fn new(
        file_metadata: FileMetadata<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>,
        proof: CompactProof,
    ) -> Self {
        Self {
            file_metadata,
            proof,
        }
    }

    /// The chunks contained in the proof, after checking it against the file's fingerprint.
    ///
    /// This is how a Provider receiving a file in batches of chunks extracts them.
    pub fn proven<T: TrieLayout>(&self) -> Result<Vec<Leaf<ChunkId, Chunk>>, ProvenFileKeyError>
    where
        <T::Hash as sp_core::Hasher>::Out: TryFrom<[u8; H_LENGTH]>,
    {
        let expected_root: <T::Hash as sp_core::Hasher>::Out = self
            .file_metadata
            .fingerprint()
            .as_hash()
            .try_into()
            .map_err(|_| ProvenFileKeyError::FingerprintAndTrieHashMismatch)?;

        // This generates a partial trie based on the proof and checks that the root hash matches the `expected_root`.
        let (memdb, root) = self
            .proof
            .to_memory_db::<T::Hash>(Some(&expected_root))
            .map_err(|_| ProvenFileKeyError::TrieAndExpectedRootMismatch)?;

        let trie = TrieDBBuilder::<T>::new(&memdb, &root).build();

        let mut proven = Vec::new();

        // Chunks whose nodes are not part of the proof fail to be read and are simply not proven.
        for id in 0..self.file_metadata.chunks_count() {
            let chunk_id = ChunkId::new(id);
            let Ok(Some(encoded)) = trie.get(&chunk_id.as_trie_key()) else {
                continue;
            };
            let chunk = ChunkWithId::decode(&mut encoded.as_slice())
                .map_err(|_| ProvenFileKeyError::InvalidChunk(chunk_id))?;
            if chunk.chunk_id != chunk_id {
                return Err(ProvenFileKeyError::InvalidChunk(chunk_id));
            }
            proven.push(Leaf::new(chunk_id, chunk.data));
        }

        Ok(proven)
    }
}
