#![cfg_attr(not(feature = "std"), no_std)]

use sp_std::{collections::btree_set::BTreeSet, vec::Vec};

use shp_traits::{
    ChallengeKeyInclusion, CommitmentVerifier, InclusionProofVerifier, ProofDeltaApplier,
    TrieMutation,
};
use sp_runtime::DispatchError;
use sp_trie::{
    empty_trie_root, CompactProof, MemoryDB, TrieConfiguration, TrieDBBuilder, TrieDBMutBuilder,
    TrieMut,
};
use trie_db::TrieIterator;

#[cfg(test)]
mod tests;

type HashOut<T> = <<T as sp_trie::TrieLayout>::Hash as sp_core::Hasher>::Out;

/// Verifies forest proofs: the commitment is a forest root, and a challenge is answered by the
/// file key it names or by the two file keys around it.
pub struct ForestVerifier<T: TrieConfiguration, const H_LENGTH: usize>(
    core::marker::PhantomData<T>,
);

impl<T: TrieConfiguration, const H_LENGTH: usize> ForestVerifier<T, H_LENGTH>
where
    HashOut<T>: for<'a> TryFrom<&'a [u8; H_LENGTH]>,
{
    fn to_key(raw: &[u8]) -> Result<HashOut<T>, DispatchError> {
        let raw: &[u8; H_LENGTH] = raw
            .try_into()
            .map_err(|_| "Failed to convert proven key to a fixed size array.")?;

        raw.try_into()
            .map_err(|_| "Failed to convert proven key.".into())
    }
}

impl<T: TrieConfiguration, const H_LENGTH: usize> CommitmentVerifier
    for ForestVerifier<T, H_LENGTH>
where
    HashOut<T>: for<'a> TryFrom<&'a [u8; H_LENGTH]>,
{
    type Proof = CompactProof;
    type Commitment = HashOut<T>;
    type Challenge = HashOut<T>;

    /// Verifies a proof against a root (i.e. commitment) and a set of challenges, without any
    /// expectation about whether each challenge is in the forest.
    fn verify_proof(
        root: &Self::Commitment,
        challenges: &[Self::Challenge],
        proof: &Self::Proof,
    ) -> Result<BTreeSet<Self::Challenge>, DispatchError> {
        let challenges = challenges
            .iter()
            .map(|challenge| (*challenge, None))
            .collect::<Vec<_>>();

        Self::verify_proof_with_inclusion(root, &challenges, proof)
    }
}

impl<T: TrieConfiguration, const H_LENGTH: usize> InclusionProofVerifier
    for ForestVerifier<T, H_LENGTH>
where
    HashOut<T>: for<'a> TryFrom<&'a [u8; H_LENGTH]>,
{
    /// Every challenge must be answered by its own leaf or by the two adjacent leaves around
    /// it. A challenge paired with a [`ChallengeKeyInclusion`] must also be answered the way
    /// the inclusion says.
    ///
    /// An empty forest proves nothing: every challenge is trivially not included in it.
    fn verify_proof_with_inclusion(
        root: &Self::Commitment,
        challenges: &[(Self::Challenge, Option<ChallengeKeyInclusion>)],
        proof: &Self::Proof,
    ) -> Result<BTreeSet<Self::Challenge>, DispatchError> {
        if challenges.is_empty() {
            return Err("No challenges provided.".into());
        }

        if *root == empty_trie_root::<T>() {
            if challenges
                .iter()
                .any(|(_, inclusion)| *inclusion == Some(ChallengeKeyInclusion::Included))
            {
                return Err("Challenge key is expected to be included in the proof.".into());
            }
            return Ok(BTreeSet::new());
        }

        // Fails unless the proof rebuilds a partial trie with exactly this root.
        let (memdb, root) = proof.to_memory_db::<T::Hash>(Some(root)).map_err(|_| {
            "Failed to convert proof to memory DB, root doesn't match with expected."
        })?;

        let trie = TrieDBBuilder::<T>::new(&memdb, &root).build();

        let mut trie_de_iter = trie
            .into_double_ended_iter()
            .map_err(|_| "Failed to create trie iterator.")?;

        let mut proven_keys = BTreeSet::new();

        for (challenge, expected_inclusion) in challenges {
            trie_de_iter
                .seek(challenge.as_ref())
                .map_err(|_| "Failed to seek challenged key.")?;

            // The challenged leaf itself, or the first leaf above it.
            let next_leaf = trie_de_iter
                .next()
                .transpose()
                .map_err(|_| "Failed to get next leaf.")?;

            // The last leaf below it.
            let prev_leaf = trie_de_iter
                .next_back()
                .transpose()
                .map_err(|_| "Failed to get previous leaf.")?;

            let challenge = challenge.as_ref();
            match (prev_leaf, next_leaf) {
                // Scenario 1: the challenge is a leaf of the trie.
                (_, Some((next_key, _))) if next_key.as_slice() == challenge => {
                    if let Some(ChallengeKeyInclusion::NotIncluded) = expected_inclusion {
                        return Err(
                            "Challenge key is not expected to be included in the proof.".into()
                        );
                    }
                    proven_keys.insert(Self::to_key(&next_key)?);
                }
                // Scenario 2: the challenge lies between two consecutive leaves.
                (Some((prev_key, _)), Some((next_key, _)))
                    if prev_key.as_slice() < challenge && challenge < next_key.as_slice() =>
                {
                    if let Some(ChallengeKeyInclusion::Included) = expected_inclusion {
                        return Err("Challenge key is expected to be included in the proof.".into());
                    }
                    proven_keys.insert(Self::to_key(&prev_key)?);
                    proven_keys.insert(Self::to_key(&next_key)?);
                }
                // Scenario 3: the challenge is before the first leaf.
                (None, Some((next_key, _))) => {
                    if let Some(ChallengeKeyInclusion::Included) = expected_inclusion {
                        return Err("Challenge key is expected to be included in the proof.".into());
                    }
                    proven_keys.insert(Self::to_key(&next_key)?);
                }
                // Scenario 4: the challenge is after the last leaf.
                (Some((prev_key, _)), None) => {
                    if let Some(ChallengeKeyInclusion::Included) = expected_inclusion {
                        return Err("Challenge key is expected to be included in the proof.".into());
                    }
                    proven_keys.insert(Self::to_key(&prev_key)?);
                }
                (None, None) => {
                    return Err("No leaves provided in proof.".into());
                }
                _ => {
                    return Err("Proof is invalid.".into());
                }
            }
        }

        Ok(proven_keys)
    }
}

impl<T: TrieConfiguration, const H_LENGTH: usize> ProofDeltaApplier<T::Hash>
    for ForestVerifier<T, H_LENGTH>
where
    HashOut<T>: for<'a> TryFrom<&'a [u8; H_LENGTH]>,
{
    type Proof = CompactProof;
    type Key = HashOut<T>;

    /// Applies `mutations` in order on the partial trie reconstructed from `proof`.
    ///
    /// Every key touched must be reachable in the proof, otherwise the trie cannot be updated
    /// and the whole delta fails.
    fn apply_delta(
        root: &HashOut<T>,
        mutations: &[(Self::Key, TrieMutation)],
        proof: &Self::Proof,
    ) -> Result<(MemoryDB<T::Hash>, HashOut<T>, Vec<(Self::Key, Option<Vec<u8>>)>), DispatchError>
    {
        if mutations.is_empty() {
            return Err("No mutations provided.".into());
        }

        let (mut memdb, mut new_root) = if *root == empty_trie_root::<T>() {
            (MemoryDB::<T::Hash>::default(), *root)
        } else {
            // A `CompactProof` memdb is keyed for reading only, so the nodes go through a
            // `StorageProof` to build a memdb that can be mutated.
            let (storage_proof, proof_root) = proof
                .to_storage_proof::<T::Hash>(Some(root))
                .map_err(|_| {
                    "Failed to convert proof to memory DB, root doesn't match with expected."
                })?;
            (storage_proof.to_memory_db(), proof_root)
        };

        let mut old_values = Vec::with_capacity(mutations.len());
        {
            let mut trie = if new_root == empty_trie_root::<T>() {
                TrieDBMutBuilder::<T>::new(&mut memdb, &mut new_root).build()
            } else {
                TrieDBMutBuilder::<T>::from_existing(&mut memdb, &mut new_root).build()
            };

            for (key, mutation) in mutations {
                let old_value = trie
                    .get(key.as_ref())
                    .map_err(|_| "Failed to read mutated key from trie.")?;

                match mutation {
                    TrieMutation::Add(add) => {
                        trie.insert(key.as_ref(), &add.value)
                            .map_err(|_| "Failed to insert key into trie.")?;
                    }
                    TrieMutation::Remove(_) => {
                        trie.remove(key.as_ref())
                            .map_err(|_| "Failed to remove key from trie.")?;
                    }
                }

                old_values.push((*key, old_value));
            }

            // Committing the trie recomputes the root.
            trie.commit();
        }

        Ok((memdb, new_root, old_values))
    }
}
