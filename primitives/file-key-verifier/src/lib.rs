#![cfg_attr(not(feature = "std"), no_std)]

use sp_std::collections::btree_set::BTreeSet;

use codec::Decode;
use shp_file_metadata::{ChunkId, ChunkWithId};
use shp_traits::CommitmentVerifier;
use sp_runtime::DispatchError;
use sp_trie::{TrieDBBuilder, TrieLayout};
use trie_db::Trie;

mod types;
pub use types::{FileKeyProof, ProvenFileKeyError};

#[cfg(test)]
mod tests;

/// Verifies key proofs: the commitment is a file key, and each challenge names the chunk at
/// index `challenge mod chunks_count`, which must be in the proof under the file's fingerprint.
pub struct FileKeyVerifier<
    T: TrieLayout,
    const H_LENGTH: usize,
    const CHUNK_SIZE: u64,
    const SIZE_TO_CHALLENGES: u64,
> {
    pub _phantom: core::marker::PhantomData<T>,
}

impl<
        T: TrieLayout,
        const H_LENGTH: usize,
        const CHUNK_SIZE: u64,
        const SIZE_TO_CHALLENGES: u64,
    > CommitmentVerifier for FileKeyVerifier<T, H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>
where
    <T::Hash as sp_core::Hasher>::Out: TryFrom<[u8; H_LENGTH]> + Ord,
{
    type Proof = FileKeyProof<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
    type Commitment = <T::Hash as sp_core::Hasher>::Out;
    type Challenge = <T::Hash as sp_core::Hasher>::Out;

    /// Verifies a proof against a file key (i.e. commitment) and a set of challenges.
    ///
    /// The file key is recomputed from the metadata in the proof, the number of challenges must
    /// match the file size, and every challenged chunk must be present in the proof with the
    /// fingerprint as root.
    fn verify_proof(
        expected_file_key: &Self::Commitment,
        challenges: &[Self::Challenge],
        proof: &Self::Proof,
    ) -> Result<BTreeSet<Self::Challenge>, DispatchError> {
        if challenges.is_empty() {
            return Err("No challenges provided.".into());
        }

        let file_metadata = &proof.file_metadata;
        if file_metadata.file_size() == 0 {
            return Err("File size cannot be zero.".into());
        }

        let file_key = file_metadata.file_key::<T::Hash>();
        if &file_key != expected_file_key {
            return Err(
                "File key provided should be equal to the file key constructed from the proof."
                    .into(),
            );
        }

        if challenges.len() != file_metadata.chunks_to_check() as usize {
            return Err(
                "Number of challenges does not match the number of chunks that should have been challenged for a file of this size.".into(),
            );
        }

        let expected_root: Self::Commitment = file_metadata
            .fingerprint()
            .as_hash()
            .try_into()
            .map_err(|_| "Failed to convert fingerprint to a hasher output.")?;

        // Fails unless the proof rebuilds a partial trie rooted at the fingerprint.
        let (memdb, root) = proof
            .proof
            .to_memory_db::<T::Hash>(Some(&expected_root))
            .map_err(|_| {
                "Failed to convert proof to memory DB, root doesn't match with expected."
            })?;

        let trie = TrieDBBuilder::<T>::new(&memdb, &root).build();
        let chunks_count = file_metadata.chunks_count();

        let mut proven_challenges = BTreeSet::new();
        for challenge in challenges {
            let chunk_id = ChunkId::from_challenge(challenge.as_ref(), chunks_count);

            let encoded_chunk = trie
                .get(&chunk_id.as_trie_key())
                .map_err(|_| "The proof is invalid. The challenge does not exist in the trie.")?
                .ok_or("The proof is invalid. The challenged chunk was not found in the trie.")?;

            let chunk = ChunkWithId::decode(&mut encoded_chunk.as_slice())
                .map_err(|_| "The proof is invalid. The challenged leaf is not a chunk.")?;
            if chunk.chunk_id != chunk_id {
                return Err("The proof is invalid. The chunk id does not match its key.".into());
            }

            proven_challenges.insert(*challenge);
        }

        Ok(proven_challenges)
    }
}
