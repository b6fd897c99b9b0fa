use hash_db::Hasher;
use shp_file_metadata::{Chunk, ChunkId, Fingerprint, Leaf};
use shp_types::{FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH};
use sp_trie::CompactProof;
use trie_db::TrieLayout;

pub type HasherOutT<T> = <<T as TrieLayout>::Hash as Hasher>::Out;

pub type FileMetadata =
    shp_file_metadata::FileMetadata<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

/// Proof of some chunks of a file, together with the metadata identifying the file.
pub type FileKeyProof =
    shp_file_key_verifier::FileKeyProof<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileProofError {
    /// The proof was generated from a trie whose root is not the fingerprint of the file.
    FingerprintMismatch,
}

/// Proof of chunks of a file trie, before it is tied to the file's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileProof {
    /// The file chunks (and ids) that were proven.
    pub proven: Vec<Leaf<ChunkId, Chunk>>,
    /// The compact proof.
    pub proof: CompactProof,
    /// The root hash of the trie, also known as the fingerprint of the file.
    pub fingerprint: Fingerprint<H_LENGTH>,
}

impl FileProof {
    pub fn to_file_key_proof(self, metadata: FileMetadata) -> Result<FileKeyProof, FileProofError> {
        if *metadata.fingerprint() != self.fingerprint {
            return Err(FileProofError::FingerprintMismatch);
        }

        Ok(FileKeyProof::new(metadata, self.proof))
    }
}
