use std::collections::{HashMap, HashSet};

use codec::{Decode, Encode};
use log::{debug, error};
use shp_file_metadata::{Chunk, ChunkId, ChunkWithId, Fingerprint, Leaf};
use shp_types::FILE_CHUNK_SIZE;
use sp_trie::{recorder::Recorder, MemoryDB, Trie, TrieDBBuilder, TrieLayout, TrieMut};
use trie_db::TrieDBMutBuilder;

use crate::{
    traits::{
        FileDataTrie, FileStorage, FileStorageError, FileStorageWriteError,
        FileStorageWriteOutcome,
    },
    types::{FileKeyProof, FileMetadata, FileProof, HasherOutT},
    LOG_TARGET,
};

pub struct InMemoryFileDataTrie<T: TrieLayout + 'static> {
    root: HasherOutT<T>,
    memdb: MemoryDB<T::Hash>,
}

impl<T: TrieLayout + 'static> InMemoryFileDataTrie<T> {
    pub fn new() -> Self {
        let (memdb, root) = MemoryDB::<T::Hash>::default_with_root();

        Self { root, memdb }
    }

    /// Split `data` in chunks of `FILE_CHUNK_SIZE` bytes and write all of them.
    ///
    /// The root of the resulting trie is the fingerprint of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FileStorageWriteError> {
        let mut file_trie = Self::new();
        for (id, chunk) in data.chunks(FILE_CHUNK_SIZE as usize).enumerate() {
            file_trie.write_chunk(&ChunkId::new(id as u64), &chunk.to_vec())?;
        }

        Ok(file_trie)
    }

    fn count_chunks(&self) -> Result<u64, FileStorageError> {
        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root).build();
        let chunks = trie
            .iter()
            .map_err(|_| FileStorageError::FailedToConstructTrieIter)?
            .count();

        Ok(chunks as u64)
    }
}

impl<T: TrieLayout + 'static> Default for InMemoryFileDataTrie<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_chunk(encoded_chunk: &[u8]) -> Result<ChunkWithId, FileStorageError> {
    ChunkWithId::decode(&mut &encoded_chunk[..])
        .map_err(|_| FileStorageError::FailedToParseChunkWithId)
}

impl<T: TrieLayout> FileDataTrie<T> for InMemoryFileDataTrie<T> {
    fn get_root(&self) -> &HasherOutT<T> {
        &self.root
    }

    fn generate_proof(&self, chunk_ids: &HashSet<ChunkId>) -> Result<FileProof, FileStorageError> {
        let recorder: Recorder<T::Hash> = Recorder::default();

        // Every node read through the recorder ends up in the proof.
        let mut trie_recorder = recorder.as_trie_recorder(self.root);

        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root)
            .with_recorder(&mut trie_recorder)
            .build();

        let mut proven = Vec::with_capacity(chunk_ids.len());
        for chunk_id in chunk_ids {
            let encoded_chunk: Vec<u8> = trie
                .get(&chunk_id.as_trie_key())
                .map_err(|_| FileStorageError::FailedToGetFileChunk)?
                .ok_or(FileStorageError::FileChunkDoesNotExist)?;

            let decoded_chunk = decode_chunk(&encoded_chunk)?;
            proven.push(Leaf::new(decoded_chunk.chunk_id, decoded_chunk.data));
        }

        // The recorder stays borrowed until both are gone.
        drop(trie);
        drop(trie_recorder);

        let proof = recorder
            .drain_storage_proof()
            .to_compact_proof::<T::Hash>(self.root)
            .map_err(|_| FileStorageError::FailedToGenerateCompactProof)?;

        let fingerprint = Fingerprint::try_from_slice(self.root.as_ref())
            .map_err(|_| FileStorageError::FingerprintAndStoredFileMismatch)?;

        Ok(FileProof {
            proven,
            proof,
            fingerprint,
        })
    }

    fn get_chunk(&self, chunk_id: &ChunkId) -> Result<Chunk, FileStorageError> {
        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root).build();

        let encoded_chunk = trie
            .get(&chunk_id.as_trie_key())
            .map_err(|_| FileStorageError::FailedToGetFileChunk)?
            .ok_or(FileStorageError::FileChunkDoesNotExist)?;

        Ok(decode_chunk(&encoded_chunk)?.data)
    }

    fn write_chunk(
        &mut self,
        chunk_id: &ChunkId,
        data: &Chunk,
    ) -> Result<(), FileStorageWriteError> {
        let mut trie = TrieDBMutBuilder::<T>::from_existing(&mut self.memdb, &mut self.root).build();

        // Chunks are write-once.
        if trie
            .contains(&chunk_id.as_trie_key())
            .map_err(|_| FileStorageWriteError::FailedToGetFileChunk)?
        {
            return Err(FileStorageWriteError::FileChunkAlreadyExists);
        }

        let encoded_chunk = ChunkWithId {
            chunk_id: *chunk_id,
            data: data.clone(),
        }
        .encode();
        trie.insert(&chunk_id.as_trie_key(), &encoded_chunk)
            .map_err(|_| FileStorageWriteError::FailedToInsertFileChunk)?;

        // Commits to `memdb` and updates `root`.
        drop(trie);

        Ok(())
    }

    fn delete(&mut self) -> Result<(), FileStorageWriteError> {
        let (memdb, root) = MemoryDB::<T::Hash>::default_with_root();
        self.root = root;
        self.memdb = memdb;

        Ok(())
    }
}

/// Keeps the files a Provider stores in memory, each in its own chunk trie.
pub struct InMemoryFileStorage<T: TrieLayout + 'static> {
    metadata: HashMap<HasherOutT<T>, FileMetadata>,
    file_data: HashMap<HasherOutT<T>, InMemoryFileDataTrie<T>>,
    chunk_counts: HashMap<HasherOutT<T>, u64>,
}

impl<T: TrieLayout> InMemoryFileStorage<T> {
    pub fn new() -> Self {
        Self {
            metadata: HashMap::new(),
            file_data: HashMap::new(),
            chunk_counts: HashMap::new(),
        }
    }

    fn file_data(&self, key: &HasherOutT<T>) -> Result<&InMemoryFileDataTrie<T>, FileStorageError> {
        self.file_data.get(key).ok_or_else(|| {
            error!(target: LOG_TARGET, "Invariant broken! Metadata for file key {:?} found but no associated trie", key);
            FileStorageError::MissingFileDataTrie
        })
    }
}

impl<T: TrieLayout> Default for InMemoryFileStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TrieLayout + Send + Sync + 'static> FileStorage<T> for InMemoryFileStorage<T> {
    type FileDataTrie = InMemoryFileDataTrie<T>;

    fn new_file_data_trie(&self) -> Self::FileDataTrie {
        InMemoryFileDataTrie::new()
    }

    fn generate_proof(
        &self,
        file_key: &HasherOutT<T>,
        chunk_ids: &HashSet<ChunkId>,
    ) -> Result<FileKeyProof, FileStorageError> {
        let metadata = self
            .metadata
            .get(file_key)
            .ok_or(FileStorageError::FileDoesNotExist)?;

        if !self.is_file_complete(file_key)? {
            return Err(FileStorageError::IncompleteFile);
        }

        self.file_data(file_key)?
            .generate_proof(chunk_ids)?
            .to_file_key_proof(metadata.clone())
            .map_err(|e| {
                error!(target: LOG_TARGET, "{:?}", e);
                FileStorageError::FailedToConstructFileKeyProof
            })
    }

    fn stored_chunks_count(&self, key: &HasherOutT<T>) -> Result<u64, FileStorageError> {
        self.chunk_counts
            .get(key)
            .copied()
            .ok_or(FileStorageError::FileDoesNotExist)
    }

    fn delete_file(&mut self, key: &HasherOutT<T>) -> Result<(), FileStorageError> {
        self.metadata.remove(key);
        self.file_data.remove(key);
        self.chunk_counts.remove(key);

        Ok(())
    }

    fn get_metadata(&self, key: &HasherOutT<T>) -> Result<Option<FileMetadata>, FileStorageError> {
        Ok(self.metadata.get(key).cloned())
    }

    fn is_file_complete(&self, key: &HasherOutT<T>) -> Result<bool, FileStorageError> {
        let metadata = self
            .metadata
            .get(key)
            .ok_or(FileStorageError::FileDoesNotExist)?;
        let file_data = self.file_data(key)?;

        if metadata.fingerprint().as_ref() != file_data.get_root().as_ref() {
            return Ok(false);
        }

        Ok(metadata.chunks_count() == self.stored_chunks_count(key)?)
    }

    fn insert_file(
        &mut self,
        key: HasherOutT<T>,
        metadata: FileMetadata,
    ) -> Result<(), FileStorageError> {
        let empty_file_trie = self.new_file_data_trie();
        self.insert_file_with_data(key, metadata, empty_file_trie)
    }

    fn insert_file_with_data(
        &mut self,
        key: HasherOutT<T>,
        metadata: FileMetadata,
        file_data: Self::FileDataTrie,
    ) -> Result<(), FileStorageError> {
        if self.metadata.contains_key(&key) {
            return Err(FileStorageError::FileAlreadyExists);
        }

        let chunk_count = file_data.count_chunks()?;

        self.metadata.insert(key, metadata);
        self.file_data.insert(key, file_data);
        self.chunk_counts.insert(key, chunk_count);

        Ok(())
    }

    fn get_chunk(
        &self,
        file_key: &HasherOutT<T>,
        chunk_id: &ChunkId,
    ) -> Result<Chunk, FileStorageError> {
        self.file_data
            .get(file_key)
            .ok_or(FileStorageError::FileDoesNotExist)?
            .get_chunk(chunk_id)
    }

    fn write_chunk(
        &mut self,
        file_key: &HasherOutT<T>,
        chunk_id: &ChunkId,
        data: &Chunk,
    ) -> Result<FileStorageWriteOutcome, FileStorageWriteError> {
        let metadata = self
            .metadata
            .get(file_key)
            .ok_or(FileStorageWriteError::FileDoesNotExist)?;

        // Every chunk but the last one is `FILE_CHUNK_SIZE` long.
        if chunk_id.as_u64() >= metadata.chunks_count()
            || data.len() != metadata.chunk_size_at(chunk_id.as_u64())
        {
            return Err(FileStorageWriteError::InvalidChunk(*chunk_id));
        }

        let file_data = self
            .file_data
            .get_mut(file_key)
            .ok_or(FileStorageWriteError::FileDoesNotExist)?;

        file_data.write_chunk(chunk_id, data)?;
        debug!(target: LOG_TARGET, "Chunk {:?} written for file key {:?}", chunk_id, file_key);

        let current_count = self
            .chunk_counts
            .get(file_key)
            .ok_or(FileStorageWriteError::FailedToGetStoredChunksCount)?;

        let new_count = current_count
            .checked_add(1)
            .ok_or(FileStorageWriteError::ChunkCountOverflow)?;

        self.chunk_counts.insert(*file_key, new_count);

        match self.is_file_complete(file_key) {
            Ok(true) => Ok(FileStorageWriteOutcome::FileComplete),
            Ok(false) => Ok(FileStorageWriteOutcome::FileIncomplete),
            Err(e) => {
                error!(target: LOG_TARGET, "Failed to check file completion status for file key {:?}: {:?}", file_key, e);
                Err(FileStorageWriteError::FailedToCheckFileCompletion(e))
            }
        }
    }
}
