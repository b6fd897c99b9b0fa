use std::{collections::HashMap, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use codec::Encode;
use log::debug;
use shp_types::{AccountId, StorageProofsMerkleTrieLayout, H_LENGTH};
use sp_trie::{
    recorder::Recorder, CompactProof, MemoryDB, Trie, TrieDBBuilder, TrieLayout, TrieMut,
};
use tokio::sync::RwLock;
use trie_db::{NodeCodec, TrieDBMutBuilder};

use crate::{
    error::{ErrorT, ForestStorageError},
    prove::prove,
    traits::{ForestStorage, ForestStorageHandler},
    types::{FileMetadata, ForestProof, HasherOutT, Proven},
    utils::{convert_raw_bytes_to_hasher_out, decode_file_metadata},
    LOG_TARGET,
};

/// A forest kept entirely in memory. Every node ever written stays in the database, so
/// cloning it is a cheap way to snapshot the forest.
pub struct InMemoryForestStorage<T: TrieLayout + 'static> {
    root: HasherOutT<T>,
    memdb: MemoryDB<T::Hash>,
}

impl<T: TrieLayout> InMemoryForestStorage<T> {
    /// An empty forest. Its root is the root of an empty trie, same as the one a Provider
    /// starts with on chain.
    pub fn new() -> Self {
        Self {
            root: T::Codec::hashed_null_node(),
            memdb: MemoryDB::default(),
        }
    }
}

impl<T: TrieLayout> Default for InMemoryForestStorage<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TrieLayout> Clone for InMemoryForestStorage<T> {
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            memdb: self.memdb.clone(),
        }
    }
}

impl<T: TrieLayout + Send + Sync> ForestStorage<T> for InMemoryForestStorage<T>
where
    HasherOutT<T>: TryFrom<[u8; H_LENGTH]>,
{
    fn root(&self) -> HasherOutT<T> {
        self.root
    }

    fn contains_file_key(&self, file_key: &HasherOutT<T>) -> Result<bool, ErrorT<T>> {
        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root).build();
        Ok(trie.contains(file_key.as_ref())?)
    }

    fn get_file_metadata(
        &self,
        file_key: &HasherOutT<T>,
    ) -> Result<Option<FileMetadata>, ErrorT<T>> {
        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root).build();

        trie.get(file_key.as_ref())?
            .map(|raw_metadata| decode_file_metadata::<T>(&raw_metadata))
            .transpose()
    }

    fn get_all_files(&self) -> Result<Vec<(HasherOutT<T>, FileMetadata)>, ErrorT<T>> {
        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root).build();

        let mut files = Vec::new();
        for leaf in trie.iter()? {
            let (key, value) = leaf?;
            let file_key = convert_raw_bytes_to_hasher_out::<T>(key)?;
            files.push((file_key, decode_file_metadata::<T>(&value)?));
        }

        Ok(files)
    }

    fn generate_proof(
        &self,
        challenged_file_keys: Vec<HasherOutT<T>>,
    ) -> Result<ForestProof<T>, ErrorT<T>> {
        // An empty forest proves nothing, and verifiers accept any proof against its root.
        if self.root == T::Codec::hashed_null_node() {
            return Ok(ForestProof {
                proven: challenged_file_keys.iter().map(|_| Proven::Empty).collect(),
                proof: CompactProof {
                    encoded_nodes: Vec::new(),
                },
                root: self.root,
            });
        }

        let recorder: Recorder<T::Hash> = Recorder::default();

        // A `TrieRecorder` is needed to create a proof of the "visited" leafs, by the end of this process.
        let mut trie_recorder = recorder.as_trie_recorder(self.root);

        let trie = TrieDBBuilder::<T>::new(&self.memdb, &self.root)
            .with_recorder(&mut trie_recorder)
            .build();

        // Get the proven leaves or leaf
        let proven = challenged_file_keys
            .iter()
            .map(|file_key| prove::<T>(&trie, file_key))
            .collect::<Result<Vec<_>, _>>()?;

        // Drop the `trie_recorder` to release the `self` and `recorder`
        drop(trie);
        drop(trie_recorder);

        // Generate proof
        let proof = recorder
            .drain_storage_proof()
            .to_compact_proof::<T::Hash>(self.root)
            .map_err(|_| ForestStorageError::<HasherOutT<T>>::FailedToGenerateCompactProof)?;

        Ok(ForestProof {
            proven,
            proof,
            root: self.root,
        })
    }

    fn insert_files_metadata(
        &mut self,
        files_metadata: &[FileMetadata],
    ) -> Result<Vec<HasherOutT<T>>, ErrorT<T>> {
        let mut file_keys = Vec::with_capacity(files_metadata.len());
        for metadata in files_metadata {
            let file_key = metadata.file_key::<T::Hash>();
            if file_keys.contains(&file_key) || self.contains_file_key(&file_key)? {
                return Err(ForestStorageError::FileKeyAlreadyExists(file_key).into());
            }
            file_keys.push(file_key);
        }

        if file_keys.is_empty() {
            return Ok(file_keys);
        }

        let mut trie = TrieDBMutBuilder::<T>::from_existing(&mut self.memdb, &mut self.root).build();

        for (file_key, metadata) in file_keys.iter().zip(files_metadata) {
            trie.insert(file_key.as_ref(), &metadata.encode())
                .map_err(|_| ForestStorageError::FailedToInsertFileKey(*file_key))?;
        }

        // Committing recomputes the root.
        trie.commit();
        drop(trie);

        debug!(target: LOG_TARGET, "Inserted {} file keys, new forest root {:?}", file_keys.len(), self.root);

        Ok(file_keys)
    }

    fn delete_file_key(&mut self, file_key: &HasherOutT<T>) -> Result<(), ErrorT<T>> {
        let mut trie = TrieDBMutBuilder::<T>::from_existing(&mut self.memdb, &mut self.root).build();

        // Remove the file key from the trie.
        trie.remove(file_key.as_ref())
            .map_err(|_| ForestStorageError::FailedToRemoveFileKey(*file_key))?;
        trie.commit();

        Ok(())
    }

    fn get_files_by_user(
        &self,
        user: &AccountId,
    ) -> Result<Vec<(HasherOutT<T>, FileMetadata)>, ErrorT<T>> {
        let owner = user.encode();

        Ok(self
            .get_all_files()?
            .into_iter()
            .filter(|(_, metadata)| *metadata.owner() == owner)
            .collect())
    }
}

/// Keeps the forests of a node in memory, keyed by Provider or bucket id.
///
/// Clones share the forests that existed when they were cloned, but not the ones created
/// afterwards.
#[derive(Clone, Default)]
pub struct InMemoryForestStorageHandler {
    forests: HashMap<Vec<u8>, Arc<RwLock<InMemoryForestStorage<StorageProofsMerkleTrieLayout>>>>,
}

impl InMemoryForestStorageHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForestStorageHandler for InMemoryForestStorageHandler {
    type Key = Vec<u8>;
    type FS = InMemoryForestStorage<StorageProofsMerkleTrieLayout>;

    async fn get(&self, key: &Self::Key) -> Option<Arc<RwLock<Self::FS>>> {
        self.forests.get(key).cloned()
    }

    async fn create(&mut self, key: &Self::Key) -> Result<Arc<RwLock<Self::FS>>> {
        let forest_storage = Arc::new(RwLock::new(InMemoryForestStorage::new()));
        self.forests.insert(key.clone(), forest_storage.clone());

        debug!(target: LOG_TARGET, "Created forest storage for key {:?}", key);

        Ok(forest_storage)
    }

    async fn remove_forest_storage(&mut self, key: &Self::Key) {
        self.forests.remove(key);
    }

    async fn snapshot(
        &mut self,
        src_key: &Self::Key,
        dest_key: &Self::Key,
    ) -> Option<Arc<RwLock<Self::FS>>> {
        let source = self.forests.get(src_key)?.clone();
        let copy = Arc::new(RwLock::new(source.read().await.clone()));
        self.forests.insert(dest_key.clone(), copy.clone());

        Some(copy)
    }
}
