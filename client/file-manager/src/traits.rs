use std::collections::HashSet;

use shp_file_metadata::{Chunk, ChunkId};
use trie_db::TrieLayout;

use crate::types::{FileKeyProof, FileMetadata, FileProof, HasherOutT};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FileStorageWriteError {
    #[error("File does not exist")]
    FileDoesNotExist,
    #[error("File chunk already exists")]
    FileChunkAlreadyExists,
    #[error("Failed to get file chunk")]
    FailedToGetFileChunk,
    #[error("Failed to insert file chunk")]
    FailedToInsertFileChunk,
    #[error("Chunk {0:?} does not belong to the file")]
    InvalidChunk(ChunkId),
    #[error("Failed to get stored chunks count")]
    FailedToGetStoredChunksCount,
    #[error("Chunk count overflow")]
    ChunkCountOverflow,
    #[error("Failed to check file completion: {0}")]
    FailedToCheckFileCompletion(FileStorageError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FileStorageError {
    #[error("File already exists")]
    FileAlreadyExists,
    #[error("File does not exist")]
    FileDoesNotExist,
    #[error("File chunk does not exist")]
    FileChunkDoesNotExist,
    #[error("Failed to get file chunk")]
    FailedToGetFileChunk,
    #[error("Failed to parse chunk with id")]
    FailedToParseChunkWithId,
    #[error("Failed to generate compact proof")]
    FailedToGenerateCompactProof,
    #[error("Failed to construct file key proof")]
    FailedToConstructFileKeyProof,
    #[error("Failed to construct trie iterator")]
    FailedToConstructTrieIter,
    #[error("File is incomplete")]
    IncompleteFile,
    #[error("Fingerprint and stored file mismatch")]
    FingerprintAndStoredFileMismatch,
    #[error("File data trie missing for a file with metadata")]
    MissingFileDataTrie,
}

/// Result of writing a chunk, telling whether the file has all of its chunks now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStorageWriteOutcome {
    FileComplete,
    FileIncomplete,
}

/// The chunks of a single file, stored in a Merkle Patricia Trie whose root is the file's
/// fingerprint once every chunk is written.
pub trait FileDataTrie<T: TrieLayout> {
    /// Get the root of the trie.
    fn get_root(&self) -> &HasherOutT<T>;

    /// Generate a proof for the chunks in `chunk_ids`.
    fn generate_proof(&self, chunk_ids: &HashSet<ChunkId>) -> Result<FileProof, FileStorageError>;

    /// Get a chunk from the trie.
    fn get_chunk(&self, chunk_id: &ChunkId) -> Result<Chunk, FileStorageError>;

    /// Write a chunk in the trie. Fails if the chunk is already there.
    fn write_chunk(&mut self, chunk_id: &ChunkId, data: &Chunk)
        -> Result<(), FileStorageWriteError>;

    /// Remove every chunk from the trie.
    fn delete(&mut self) -> Result<(), FileStorageWriteError>;
}

/// Storage interface to be implemented by the storage providers.
pub trait FileStorage<T: TrieLayout>: 'static {
    type FileDataTrie: FileDataTrie<T> + Send + Sync;

    /// Create a new, empty, file data trie.
    fn new_file_data_trie(&self) -> Self::FileDataTrie;

    /// Generate proof for a set of chunks of a complete file.
    fn generate_proof(
        &self,
        file_key: &HasherOutT<T>,
        chunk_ids: &HashSet<ChunkId>,
    ) -> Result<FileKeyProof, FileStorageError>;

    /// Number of chunks of the file written so far.
    fn stored_chunks_count(&self, key: &HasherOutT<T>) -> Result<u64, FileStorageError>;

    /// Remove a file from storage.
    fn delete_file(&mut self, key: &HasherOutT<T>) -> Result<(), FileStorageError>;

    /// Get metadata for a file.
    fn get_metadata(&self, key: &HasherOutT<T>) -> Result<Option<FileMetadata>, FileStorageError>;

    /// Whether every chunk of the file is stored and they match its fingerprint.
    fn is_file_complete(&self, key: &HasherOutT<T>) -> Result<bool, FileStorageError>;

    /// Inserts a new file with no chunks. Chunks are written with [`Self::write_chunk`].
    fn insert_file(
        &mut self,
        key: HasherOutT<T>,
        metadata: FileMetadata,
    ) -> Result<(), FileStorageError>;

    /// Inserts a new file together with its (possibly partial) data.
    fn insert_file_with_data(
        &mut self,
        key: HasherOutT<T>,
        metadata: FileMetadata,
        file_data: Self::FileDataTrie,
    ) -> Result<(), FileStorageError>;

    /// Get a file chunk from storage.
    fn get_chunk(
        &self,
        file_key: &HasherOutT<T>,
        chunk_id: &ChunkId,
    ) -> Result<Chunk, FileStorageError>;

    /// Write a file chunk in storage.
    fn write_chunk(
        &mut self,
        file_key: &HasherOutT<T>,
        chunk_id: &ChunkId,
        data: &Chunk,
    ) -> Result<FileStorageWriteOutcome, FileStorageWriteError>;
}
