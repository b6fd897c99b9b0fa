use codec::Encode;
use shp_file_metadata::{ChunkId, ChunkWithId, Fingerprint};
use shp_traits::CommitmentVerifier;
use sp_core::{Hasher, H256};
use sp_runtime::traits::BlakeTwo256;
use sp_trie::{
    recorder::Recorder, CompactProof, LayoutV1, MemoryDB, Trie, TrieDBBuilder, TrieDBMutBuilder,
    TrieMut,
};

use crate::{FileKeyProof, FileKeyVerifier, ProvenFileKeyError};

type Layout = LayoutV1<BlakeTwo256>;

const H_LENGTH: usize = 32;
const CHUNK_SIZE: u64 = 64;
const SIZE_TO_CHALLENGES: u64 = 128;

type FileMetadata = shp_file_metadata::FileMetadata<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
type Verifier = FileKeyVerifier<Layout, H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
type Proof = FileKeyProof<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;

/// 4 full chunks plus a 10 byte one: 5 chunks, 3 challenges.
fn file_data() -> Vec<u8> {
    (0..266u32).map(|i| (i % 251) as u8).collect()
}

/// Merklise `data` in `CHUNK_SIZE` chunks, returning the chunk trie and its root.
fn merklise(data: &[u8]) -> (MemoryDB<BlakeTwo256>, H256) {
    let mut memdb = MemoryDB::<BlakeTwo256>::default();
    let mut root = H256::default();
    {
        let mut trie = TrieDBMutBuilder::<Layout>::new(&mut memdb, &mut root).build();
        for (id, chunk) in data.chunks(CHUNK_SIZE as usize).enumerate() {
            let chunk_id = ChunkId::new(id as u64);
            let value = ChunkWithId {
                chunk_id,
                data: chunk.to_vec(),
            };
            trie.insert(&chunk_id.as_trie_key(), &value.encode())
                .unwrap();
        }
    }
    (memdb, root)
}

fn prove_chunks(memdb: &MemoryDB<BlakeTwo256>, root: H256, chunk_ids: &[ChunkId]) -> CompactProof {
    let recorder: Recorder<BlakeTwo256> = Recorder::default();
    {
        // Creating trie inside of closure to drop it before generating proof.
        let mut trie_recorder = recorder.as_trie_recorder(root);
        let trie = TrieDBBuilder::<Layout>::new(memdb, &root)
            .with_recorder(&mut trie_recorder)
            .build();
        for chunk_id in chunk_ids {
            trie.get(&chunk_id.as_trie_key()).unwrap().unwrap();
        }
    }
    recorder
        .drain_storage_proof()
        .to_compact_proof::<BlakeTwo256>(root)
        .expect("Failed to create compact proof from recorder")
}

fn metadata_for(data: &[u8], root: H256) -> FileMetadata {
    FileMetadata::new(
        b"owner".to_vec(),
        b"bucket".to_vec(),
        b"path/to/file".to_vec(),
        data.len() as u64,
        Fingerprint::from(root.0),
    )
    .unwrap()
}

/// Challenges that land on the given chunks of a file with `chunks_count` chunks.
fn challenges_for(chunk_ids: &[u64], chunks_count: u64) -> Vec<H256> {
    chunk_ids
        .iter()
        .map(|id| {
            let challenge = H256::from_low_u64_be(id + chunks_count * 7);
            assert_eq!(
                ChunkId::from_challenge(challenge.as_ref(), chunks_count),
                ChunkId::new(*id)
            );
            challenge
        })
        .collect()
}

#[test]
fn verify_proof_with_all_challenged_chunks_succeeds() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    assert_eq!(metadata.chunks_count(), 5);
    assert_eq!(metadata.chunks_to_check(), 3);

    let challenges = challenges_for(&[0, 2, 4], metadata.chunks_count());
    let proof = Proof::new(
        metadata.clone(),
        prove_chunks(
            &memdb,
            root,
            &[ChunkId::new(0), ChunkId::new(2), ChunkId::new(4)],
        ),
    );

    let proven =
        Verifier::verify_proof(&metadata.file_key::<BlakeTwo256>(), &challenges, &proof).unwrap();

    assert_eq!(proven.len(), 3);
    assert!(challenges.iter().all(|c| proven.contains(c)));
}

#[test]
fn verify_proof_fails_if_file_key_does_not_match() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    let challenges = challenges_for(&[0, 1, 2], metadata.chunks_count());
    let proof = Proof::new(
        metadata,
        prove_chunks(
            &memdb,
            root,
            &[ChunkId::new(0), ChunkId::new(1), ChunkId::new(2)],
        ),
    );

    let other_file_key = BlakeTwo256::hash(b"another file");
    assert!(Verifier::verify_proof(&other_file_key, &challenges, &proof).is_err());
}

#[test]
fn verify_proof_fails_with_wrong_number_of_challenges() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    let challenges = challenges_for(&[0, 1], metadata.chunks_count());
    let proof = Proof::new(
        metadata.clone(),
        prove_chunks(&memdb, root, &[ChunkId::new(0), ChunkId::new(1)]),
    );

    assert!(
        Verifier::verify_proof(&metadata.file_key::<BlakeTwo256>(), &challenges, &proof).is_err()
    );
}

#[test]
fn verify_proof_fails_if_challenged_chunk_is_missing_from_proof() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    let challenges = challenges_for(&[0, 2, 3], metadata.chunks_count());
    // Chunk 3 is challenged but not proven.
    let proof = Proof::new(
        metadata.clone(),
        prove_chunks(&memdb, root, &[ChunkId::new(0), ChunkId::new(2)]),
    );

    assert!(
        Verifier::verify_proof(&metadata.file_key::<BlakeTwo256>(), &challenges, &proof).is_err()
    );
}

#[test]
fn verify_proof_fails_if_proof_is_for_another_fingerprint() {
    let data = file_data();
    let (_, root) = merklise(&data);
    let metadata = metadata_for(&data, root);

    let mut tampered = data.clone();
    tampered[265] ^= 0xff;
    let (tampered_memdb, tampered_root) = merklise(&tampered);
    let challenges = challenges_for(&[0, 2, 4], metadata.chunks_count());
    let proof = Proof::new(
        metadata.clone(),
        prove_chunks(
            &tampered_memdb,
            tampered_root,
            &[ChunkId::new(0), ChunkId::new(2), ChunkId::new(4)],
        ),
    );

    assert!(
        Verifier::verify_proof(&metadata.file_key::<BlakeTwo256>(), &challenges, &proof).is_err()
    );
}

#[test]
fn verify_proof_fails_without_challenges() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    let proof = Proof::new(
        metadata.clone(),
        prove_chunks(&memdb, root, &[ChunkId::new(0)]),
    );

    assert!(Verifier::verify_proof(&metadata.file_key::<BlakeTwo256>(), &[], &proof).is_err());
}

#[test]
fn proven_returns_the_chunks_in_the_proof() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, root);
    let proof = Proof::new(
        metadata,
        prove_chunks(&memdb, root, &[ChunkId::new(1), ChunkId::new(4)]),
    );

    let mut proven = proof.proven::<Layout>().unwrap();
    proven.sort_by_key(|leaf| leaf.key);

    assert_eq!(proven.len(), 2);
    assert_eq!(proven[0].key, ChunkId::new(1));
    assert_eq!(proven[0].data, data[64..128].to_vec());
    assert_eq!(proven[1].key, ChunkId::new(4));
    assert_eq!(proven[1].data, data[256..].to_vec());
}

#[test]
fn proven_fails_if_root_does_not_match_fingerprint() {
    let data = file_data();
    let (memdb, root) = merklise(&data);
    let metadata = metadata_for(&data, H256::repeat_byte(1));
    let proof = Proof::new(metadata, prove_chunks(&memdb, root, &[ChunkId::new(0)]));

    assert_eq!(
        proof.proven::<Layout>(),
        Err(ProvenFileKeyError::TrieAndExpectedRootMismatch)
    );
}
