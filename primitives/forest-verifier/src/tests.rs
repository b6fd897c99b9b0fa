use codec::Encode;
use shp_traits::{
    ChallengeKeyInclusion, CommitmentVerifier, InclusionProofVerifier, ProofDeltaApplier,
    TrieAddMutation, TrieMutation, TrieRemoveMutation,
};
use sp_core::{Hasher, H256, U256};
use sp_runtime::traits::BlakeTwo256;
use sp_trie::{
    empty_trie_root, recorder::Recorder, CompactProof, LayoutV1, MemoryDB, Trie, TrieDBBuilder,
    TrieDBMutBuilder, TrieMut,
};
use trie_db::TrieIterator;

use crate::ForestVerifier;

type Layout = LayoutV1<BlakeTwo256>;
type Verifier = ForestVerifier<Layout, { BlakeTwo256::LENGTH }>;

/// Build a forest of `count` leaves keyed by the hash of their (fake) metadata.
///
/// Returns the trie, its root and the sorted keys.
fn build_forest(count: u32) -> (MemoryDB<BlakeTwo256>, H256, Vec<H256>) {
    let mut memdb = MemoryDB::<BlakeTwo256>::default();
    let mut root = H256::default();
    let mut keys = Vec::new();
    {
        let mut trie = TrieDBMutBuilder::<Layout>::new(&mut memdb, &mut root).build();
        for i in 0..count {
            let metadata = (b"owner", b"bucket", i, 1024u64).encode();
            let key = BlakeTwo256::hash(&metadata);
            trie.insert(key.as_ref(), &metadata).unwrap();
            keys.push(key);
        }
    }
    keys.sort();
    (memdb, root, keys)
}

/// Record the nodes visited while answering each challenge the way a Provider would:
/// the exact leaf, or the leaves around the challenged key.
fn prove(memdb: &MemoryDB<BlakeTwo256>, root: H256, challenges: &[H256]) -> CompactProof {
    let recorder: Recorder<BlakeTwo256> = Recorder::default();
    {
        // Creating trie inside of closure to drop it before generating proof.
        let mut trie_recorder = recorder.as_trie_recorder(root);
        let trie = TrieDBBuilder::<Layout>::new(memdb, &root)
            .with_recorder(&mut trie_recorder)
            .build();
        let mut iter = trie.into_double_ended_iter().unwrap();
        for challenge in challenges {
            iter.seek(challenge.as_ref()).unwrap();
            let next = iter.next();
            iter.next_back();
            // Exact match: also record the leaf after it so the leaf can be removed.
            if let Some(Ok((key, _))) = next {
                if key.as_slice() == challenge.as_ref() {
                    iter.seek(challenge.as_ref()).unwrap();
                    iter.next();
                    iter.next();
                }
            }
        }
    }
    recorder
        .drain_storage_proof()
        .to_compact_proof::<BlakeTwo256>(root)
        .expect("Failed to create compact proof from recorder")
}

/// A key strictly between `keys[0]` and `keys[1]`.
fn key_between_first_two(keys: &[H256]) -> H256 {
    let challenge = H256::from_uint(&(keys[0].into_uint() + U256::one()));
    assert!(keys[0] < challenge && challenge < keys[1]);
    challenge
}

mod verify_proof_tests {
    use super::*;

    #[test]
    fn challenge_exact_key_is_proven() {
        let (memdb, root, keys) = build_forest(20);
        let challenge = keys[7];
        let proof = prove(&memdb, root, &[challenge]);

        let proven = Verifier::verify_proof(&root, &[challenge], &proof).unwrap();

        assert_eq!(proven.into_iter().collect::<Vec<_>>(), vec![challenge]);
    }

    #[test]
    fn challenge_between_keys_proves_both_neighbours() {
        let (memdb, root, keys) = build_forest(20);
        let challenge = key_between_first_two(&keys);
        let proof = prove(&memdb, root, &[challenge]);

        let proven = Verifier::verify_proof(&root, &[challenge], &proof).unwrap();

        assert_eq!(proven.into_iter().collect::<Vec<_>>(), vec![keys[0], keys[1]]);
    }

    #[test]
    fn challenge_before_first_key_proves_first_key() {
        let (memdb, root, keys) = build_forest(20);
        let challenge = H256::zero();
        let proof = prove(&memdb, root, &[challenge]);

        let proven = Verifier::verify_proof(&root, &[challenge], &proof).unwrap();

        assert_eq!(proven.into_iter().collect::<Vec<_>>(), vec![keys[0]]);
    }

    #[test]
    fn challenge_after_last_key_proves_last_key() {
        let (memdb, root, keys) = build_forest(20);
        let challenge = H256::repeat_byte(0xff);
        let proof = prove(&memdb, root, &[challenge]);

        let proven = Verifier::verify_proof(&root, &[challenge], &proof).unwrap();

        assert_eq!(proven.into_iter().collect::<Vec<_>>(), vec![keys[19]]);
    }

    #[test]
    fn multiple_challenges_are_proven_together() {
        let (memdb, root, keys) = build_forest(20);
        let challenges = vec![keys[3], key_between_first_two(&keys), keys[12]];
        let proof = prove(&memdb, root, &challenges);

        let proven = Verifier::verify_proof(&root, &challenges, &proof).unwrap();

        assert!(proven.contains(&keys[0]));
        assert!(proven.contains(&keys[1]));
        assert!(proven.contains(&keys[3]));
        assert!(proven.contains(&keys[12]));
    }

    #[test]
    fn proof_for_another_root_fails() {
        let (memdb, root, keys) = build_forest(20);
        let proof = prove(&memdb, root, &[keys[0]]);

        assert!(Verifier::verify_proof(&H256::repeat_byte(3), &[keys[0]], &proof).is_err());
    }

    #[test]
    fn proof_missing_challenged_path_fails() {
        let (memdb, root, keys) = build_forest(20);
        let proof = prove(&memdb, root, &[keys[0]]);

        assert!(Verifier::verify_proof(&root, &[keys[19]], &proof).is_err());
    }

    #[test]
    fn no_challenges_fails() {
        let (memdb, root, keys) = build_forest(5);
        let proof = prove(&memdb, root, &[keys[0]]);

        assert!(Verifier::verify_proof(&root, &[], &proof).is_err());
    }

    #[test]
    fn expected_non_inclusion_of_present_key_fails() {
        let (memdb, root, keys) = build_forest(20);
        let proof = prove(&memdb, root, &[keys[4]]);

        assert!(Verifier::verify_proof_with_inclusion(
            &root,
            &[(keys[4], Some(ChallengeKeyInclusion::NotIncluded))],
            &proof
        )
        .is_err());
        assert!(Verifier::verify_proof_with_inclusion(
            &root,
            &[(keys[4], Some(ChallengeKeyInclusion::Included))],
            &proof
        )
        .is_ok());
    }

    #[test]
    fn expected_inclusion_of_absent_key_fails() {
        let (memdb, root, keys) = build_forest(20);
        let challenge = key_between_first_two(&keys);
        let proof = prove(&memdb, root, &[challenge]);

        assert!(Verifier::verify_proof_with_inclusion(
            &root,
            &[(challenge, Some(ChallengeKeyInclusion::Included))],
            &proof
        )
        .is_err());
        assert!(Verifier::verify_proof_with_inclusion(
            &root,
            &[(challenge, Some(ChallengeKeyInclusion::NotIncluded))],
            &proof
        )
        .is_ok());
    }

    #[test]
    fn empty_forest_proves_non_inclusion_of_anything() {
        let root = empty_trie_root::<Layout>();
        let proof = CompactProof {
            encoded_nodes: vec![],
        };
        let challenge = BlakeTwo256::hash(b"file");

        let proven = Verifier::verify_proof_with_inclusion(
            &root,
            &[(challenge, Some(ChallengeKeyInclusion::NotIncluded))],
            &proof,
        )
        .unwrap();
        assert!(proven.is_empty());

        assert!(Verifier::verify_proof_with_inclusion(
            &root,
            &[(challenge, Some(ChallengeKeyInclusion::Included))],
            &proof
        )
        .is_err());
    }
}

mod apply_delta_tests {
    use super::*;

    /// Root of a full trie built from scratch with `keys` and their values.
    fn full_root(entries: &[(H256, Vec<u8>)]) -> H256 {
        let mut memdb = MemoryDB::<BlakeTwo256>::default();
        let mut root = H256::default();
        {
            let mut trie = TrieDBMutBuilder::<Layout>::new(&mut memdb, &mut root).build();
            for (key, value) in entries {
                trie.insert(key.as_ref(), value).unwrap();
            }
        }
        root
    }

    fn entries_of(memdb: &MemoryDB<BlakeTwo256>, root: H256) -> Vec<(H256, Vec<u8>)> {
        let trie = TrieDBBuilder::<Layout>::new(memdb, &root).build();
        trie.iter()
            .unwrap()
            .map(|item| {
                let (key, value) = item.unwrap();
                (H256::from_slice(&key), value)
            })
            .collect()
    }

    #[test]
    fn add_key_with_non_inclusion_proof() {
        let (memdb, root, _) = build_forest(20);
        let new_key = BlakeTwo256::hash(b"new file");
        let proof = prove(&memdb, root, &[new_key]);

        let (_, new_root, old_values) = Verifier::apply_delta(
            &root,
            &[(
                new_key,
                TrieMutation::Add(TrieAddMutation::new(b"metadata".to_vec())),
            )],
            &proof,
        )
        .unwrap();

        let mut expected = entries_of(&memdb, root);
        expected.push((new_key, b"metadata".to_vec()));
        assert_eq!(new_root, full_root(&expected));
        assert_eq!(old_values, vec![(new_key, None)]);
    }

    #[test]
    fn remove_key_with_inclusion_proof() {
        let (memdb, root, keys) = build_forest(20);
        let removed = keys[9];
        let proof = prove(&memdb, root, &[removed]);
        let entries = entries_of(&memdb, root);
        let removed_value = entries
            .iter()
            .find(|(key, _)| *key == removed)
            .map(|(_, value)| value.clone());

        let (_, new_root, old_values) = Verifier::apply_delta(
            &root,
            &[(removed, TrieMutation::Remove(TrieRemoveMutation))],
            &proof,
        )
        .unwrap();

        let expected = entries
            .into_iter()
            .filter(|(key, _)| *key != removed)
            .collect::<Vec<_>>();
        assert_eq!(new_root, full_root(&expected));
        assert_eq!(old_values, vec![(removed, removed_value)]);
    }

    #[test]
    fn add_to_empty_forest() {
        let root = empty_trie_root::<Layout>();
        let key = BlakeTwo256::hash(b"first file");
        let proof = CompactProof {
            encoded_nodes: vec![],
        };

        let (memdb, new_root, _) = Verifier::apply_delta(
            &root,
            &[(
                key,
                TrieMutation::Add(TrieAddMutation::new(b"metadata".to_vec())),
            )],
            &proof,
        )
        .unwrap();

        assert_ne!(new_root, root);
        assert_eq!(new_root, full_root(&[(key, b"metadata".to_vec())]));
        assert_eq!(entries_of(&memdb, new_root), vec![(key, b"metadata".to_vec())]);
    }

    #[test]
    fn mutation_outside_proof_fails() {
        let (memdb, root, keys) = build_forest(20);
        let proof = prove(&memdb, root, &[keys[0]]);

        assert!(Verifier::apply_delta(
            &root,
            &[(keys[19], TrieMutation::Remove(TrieRemoveMutation))],
            &proof
        )
        .is_err());
    }

    #[test]
    fn no_mutations_fails() {
        let (memdb, root, keys) = build_forest(5);
        let proof = prove(&memdb, root, &[keys[0]]);

        assert!(Verifier::apply_delta(&root, &[], &proof).is_err());
    }
}
