use std::{fmt::Debug, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use shp_types::{AccountId, StorageProofsMerkleTrieLayout};
use tokio::sync::RwLock;
use trie_db::TrieLayout;

use crate::{
    error::ErrorT,
    types::{FileMetadata, ForestProof, HasherOutT},
};

/// A Provider's forest: the trie of the metadata of every file it stores, keyed by file key.
pub trait ForestStorage<T: TrieLayout>: 'static {
    /// Root of the forest trie, which the chain tracks as the Provider's root.
    fn root(&self) -> HasherOutT<T>;
    fn contains_file_key(&self, file_key: &HasherOutT<T>) -> Result<bool, ErrorT<T>>;
    /// Get the file metadata for a file key.
    fn get_file_metadata(
        &self,
        file_key: &HasherOutT<T>,
    ) -> Result<Option<FileMetadata>, ErrorT<T>>;
    fn get_all_files(&self) -> Result<Vec<(HasherOutT<T>, FileMetadata)>, ErrorT<T>>;
    /// Prove each challenged key, or the two file keys around it when it is not in the forest.
    fn generate_proof(
        &self,
        challenged_keys: Vec<HasherOutT<T>>,
    ) -> Result<ForestProof<T>, ErrorT<T>>;
    /// Insert files metadata and get back the file keys (hash of the metadata) that were inserted.
    ///
    /// Fails without inserting anything if one of the files is already in the forest.
    fn insert_files_metadata(
        &mut self,
        files_metadata: &[FileMetadata],
    ) -> Result<Vec<HasherOutT<T>>, ErrorT<T>>;
    /// Delete a file key. Deleting a key that is not in the forest is a no-op.
    fn delete_file_key(&mut self, file_key: &HasherOutT<T>) -> Result<(), ErrorT<T>>;
    /// Files owned by `user`, in file key order.
    fn get_files_by_user(
        &self,
        user: &AccountId,
    ) -> Result<Vec<(HasherOutT<T>, FileMetadata)>, ErrorT<T>>;
}

/// Keeps the forests a node works with, each under its own key.
#[async_trait]
pub trait ForestStorageHandler {
    /// The key type used to identify forest storage instances.
    type Key: From<Vec<u8>> + AsRef<[u8]> + Debug + Send + Sync;
    /// Type representing the forest storage instance.
    type FS: ForestStorage<StorageProofsMerkleTrieLayout> + Send + Sync;

    async fn get(&self, key: &Self::Key) -> Option<Arc<RwLock<Self::FS>>>;
    /// Create an empty forest under `key`, replacing any forest already there.
    async fn create(&mut self, key: &Self::Key) -> Result<Arc<RwLock<Self::FS>>>;
    async fn remove_forest_storage(&mut self, key: &Self::Key);

    /// Copy the forest under `src_key` to `dest_key`. `None` if there is no forest under `src_key`.
    async fn snapshot(
        &mut self,
        src_key: &Self::Key,
        dest_key: &Self::Key,
    ) -> Option<Arc<RwLock<Self::FS>>>;

    async fn get_or_create(&mut self, key: &Self::Key) -> Result<Arc<RwLock<Self::FS>>> {
        if let Some(forest_storage) = self.get(key).await {
            Ok(forest_storage)
        } else {
            self.create(key).await
        }
    }
}
