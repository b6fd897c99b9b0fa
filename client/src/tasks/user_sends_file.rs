use std::{collections::HashSet, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use codec::Encode;
use log::{debug, info, warn};
use sh_runtime::AccountId;
use shc_file_manager::traits::{FileDataTrie, FileStorage};
use shp_file_metadata::ChunkId;
use shp_types::{BucketId, FileKey, FileLocation, Hashing, FILE_CHUNK_SIZE};
use tokio::sync::RwLock;

use crate::{
    tasks::bsp_upload_file::BspUploadFileTask,
    types::{
        FileKeyProof, FileMetadata, FileStorageT, ShNodeType, BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE,
    },
};

const LOG_TARGET: &str = "user-sends-file-task";

/// Something able to receive the chunks of a file, such as a BSP that volunteered for it.
#[async_trait]
pub trait FileUploadTarget: Send + Sync {
    /// Sends a batch of chunks. Returns whether the receiver now has the whole file.
    async fn upload_request(&self, file_key: FileKey, proof: FileKeyProof) -> anyhow::Result<bool>;
}

#[async_trait]
impl<NT: ShNodeType> FileUploadTarget for BspUploadFileTask<NT> {
    async fn upload_request(&self, file_key: FileKey, proof: FileKeyProof) -> anyhow::Result<bool> {
        self.handle_remote_upload_request(file_key, proof).await
    }
}

/// [`UserSendsFileTask`]: the user side of a storage request. It splits the user's files into
/// chunks and sends them, in batches, to the BSPs volunteering to store them.
pub struct UserSendsFileTask<FL: FileStorageT> {
    file_storage: Arc<RwLock<FL>>,
}

impl<FL: FileStorageT> Clone for UserSendsFileTask<FL> {
    fn clone(&self) -> Self {
        Self {
            file_storage: self.file_storage.clone(),
        }
    }
}

impl<FL: FileStorageT> UserSendsFileTask<FL> {
    pub fn new(file_storage: Arc<RwLock<FL>>) -> Self {
        Self { file_storage }
    }

    /// Chunks `data`, stores it in the user's file storage and returns the metadata of the
    /// file, from which the storage request is issued.
    pub async fn load_file_in_storage(
        &self,
        owner: &AccountId,
        bucket_id: BucketId,
        location: FileLocation,
        data: &[u8],
    ) -> anyhow::Result<(FileKey, FileMetadata)> {
        let mut write_file_storage = self.file_storage.write().await;

        let mut file_data = write_file_storage.new_file_data_trie();
        for (id, chunk) in data.chunks(FILE_CHUNK_SIZE as usize).enumerate() {
            file_data.write_chunk(&ChunkId::new(id as u64), &chunk.to_vec())?;
        }

        let metadata = FileMetadata::new(
            owner.encode(),
            bucket_id.as_ref().to_vec(),
            location,
            data.len() as u64,
            (*file_data.get_root()).into(),
        )
        .map_err(|e| anyhow!("Invalid file metadata: {:?}", e))?;

        let file_key = metadata.file_key::<Hashing>();
        write_file_storage.insert_file_with_data(file_key, metadata.clone(), file_data)?;

        info!(
            target: LOG_TARGET,
            "Loaded file {:x} of {} bytes, fingerprint {}",
            file_key,
            data.len(),
            metadata.fingerprint()
        );

        Ok((file_key, metadata))
    }

    /// Sends the file to the first target that accepts it.
    pub async fn upload_file_to_targets(
        &self,
        targets: &[&dyn FileUploadTarget],
        file_key: FileKey,
    ) -> anyhow::Result<()> {
        for target in targets {
            match self.send_chunks(*target, file_key).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(target: LOG_TARGET, "{:?}", err);
                    continue;
                }
            }
        }

        Err(anyhow!("Failed to send file {:x} to any of the targets", file_key))
    }

    /// Sends every chunk of the file to `target`, in batches of at most
    /// [`BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE`] bytes.
    ///
    /// Stops as soon as the target reports having the entire file.
    pub async fn send_chunks(
        &self,
        target: &dyn FileUploadTarget,
        file_key: FileKey,
    ) -> anyhow::Result<()> {
        let metadata = self
            .file_storage
            .read()
            .await
            .get_metadata(&file_key)?
            .ok_or_else(|| anyhow!("File {:x} is not in the user's file storage", file_key))?;

        debug!(target: LOG_TARGET, "Attempting to send chunks of file key {:x}", file_key);

        let mut current_batch = Vec::new();
        let mut current_batch_size = 0usize;

        for chunk_id in 0..metadata.chunks_count() {
            let chunk_size = metadata.chunk_size_at(chunk_id);

            if !current_batch.is_empty()
                && current_batch_size + chunk_size > BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE
            {
                if self
                    .send_batch(target, file_key, &current_batch, current_batch_size)
                    .await?
                {
                    return Ok(());
                }
                current_batch.clear();
                current_batch_size = 0;
            }

            current_batch.push(ChunkId::new(chunk_id));
            current_batch_size += chunk_size;
        }

        if !current_batch.is_empty()
            && self
                .send_batch(target, file_key, &current_batch, current_batch_size)
                .await?
        {
            return Ok(());
        }

        Err(anyhow!(
            "Sent every chunk of file {:x} but the target does not have the entire file",
            file_key
        ))
    }

    async fn send_batch(
        &self,
        target: &dyn FileUploadTarget,
        file_key: FileKey,
        batch: &[ChunkId],
        batch_size: usize,
    ) -> anyhow::Result<bool> {
        debug!(
            target: LOG_TARGET,
            "Sending batch of {} chunks (total size: {} bytes) for file {:x}",
            batch.len(),
            batch_size,
            file_key
        );

        let proof = self
            .file_storage
            .read()
            .await
            .generate_proof(&file_key, &batch.iter().copied().collect::<HashSet<_>>())
            .map_err(|e| {
                anyhow!(
                    "Failed to generate proof for batch of file {:x}\n Error: {:?}",
                    file_key,
                    e
                )
            })?;

        let file_complete = target.upload_request(file_key, proof).await?;
        if file_complete {
            info!(
                target: LOG_TARGET,
                "Stopping file upload process. Target has the entire file {:x}",
                file_key
            );
        }

        Ok(file_complete)
    }
}
