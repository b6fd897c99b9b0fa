use std::collections::{HashMap, HashSet};

use log::{debug, error, info, trace, warn};
use serde::Deserialize;
use sh_runtime::RuntimeCall;
use shc_file_manager::traits::{FileStorage, FileStorageError, FileStorageWriteError, FileStorageWriteOutcome};
use shc_forest_lock::ForestRootWriteGuard;
use shc_forest_manager::traits::ForestStorage;
use shp_types::{FileKey, Hashing, StorageDataUnit, StorageProofsMerkleTrieLayout};

use pallet_file_system::{FileKeyWithProof, QueryConfirmChunksToProveForFileError};

use crate::{
    blockchain_service::find_event,
    handler::StorageHubHandler,
    types::{
        ConfirmStoringRequest, FileKeyProof, NewStorageRequest, ShNodeType,
        BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE,
    },
};

const LOG_TARGET: &str = "bsp-upload-file-task";

#[derive(thiserror::Error, Debug)]
pub enum BspUploadError {
    #[error("File size cannot be zero")]
    InvalidFileSize,
    #[error("File of {size} bytes is bigger than the maximum of {max} bytes")]
    FileTooBig { size: StorageDataUnit, max: StorageDataUnit },
    #[error("Invalid file metadata")]
    InvalidFileMetadata,
    #[error("File key {expected:x} does not match the metadata of the request ({computed:x})")]
    FileKeyMismatch { expected: FileKey, computed: FileKey },
    #[error("Storage request is no longer open to volunteers")]
    StorageRequestClosed,
    #[error("Failed to volunteer: {0}")]
    VolunteerFailed(String),
    #[error("File metadata not found")]
    FileMetadataNotFound,
    #[error("Fingerprint mismatch")]
    FingerprintMismatch,
    #[error("Expected at least one proven chunk but got none")]
    NoProvenChunks,
    #[error("Total batch size {total_size} bytes exceeds maximum allowed size of {max_size} bytes")]
    BatchSizeExceeded { total_size: usize, max_size: usize },
    #[error("Failed to verify and get proven file key chunks: {0}")]
    ChunkVerificationFailed(String),
    #[error("Failed to write chunk of file {file_key:x}: {error}")]
    ChunkWriteFailed { file_key: FileKey, error: FileStorageWriteError },
    #[error("Confirm storing was included without a BspConfirmedStoring event")]
    ConfirmedStoringEventMissing,
    #[error("Failed to generate proofs for ALL the requested files")]
    ProofGenerationFailed,
    #[error("Failed to confirm storing after {max_retries} retries: {last_error}")]
    ConfirmationFailed { max_retries: u32, last_error: String },
}

/// Configuration of the [`BspUploadFileTask`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BspUploadFileConfig {
    /// Files bigger than this are not volunteered for. `None` means no limit.
    pub max_file_size: Option<StorageDataUnit>,
}

/// Takes a file from the moment its storage request shows up on chain until it is part of the
/// BSP's forest.
///
/// The flow is split into three parts:
///
/// - [`Self::handle_new_storage_request`]: volunteers for the file once the BSP's threshold
///   allows it, registering the file in file storage so chunks can be received.
/// - [`Self::handle_remote_upload_request`]: writes the chunks sent by the user. When the file
///   is complete, a confirm storing request is queued.
/// - [`Self::process_confirm_storing_requests`]: run by the node with the forest root write
///   lock held, confirms a batch of queued files in a single `bsp_confirm_storing` and adds
///   them to the local forest.
pub struct BspUploadFileTask<NT: ShNodeType> {
    storage_hub_handler: StorageHubHandler<NT>,
    config: BspUploadFileConfig,
}

impl<NT: ShNodeType> Clone for BspUploadFileTask<NT> {
    fn clone(&self) -> Self {
        Self {
            storage_hub_handler: self.storage_hub_handler.clone(),
            config: self.config.clone(),
        }
    }
}

impl<NT: ShNodeType> BspUploadFileTask<NT> {
    pub fn new(storage_hub_handler: StorageHubHandler<NT>) -> Self {
        Self {
            config: storage_hub_handler.provider_config.bsp_upload_file.clone(),
            storage_hub_handler,
        }
    }

    pub async fn handle_new_storage_request(&self, event: NewStorageRequest) -> anyhow::Result<()> {
        info!(
            target: LOG_TARGET,
            "Initiating BSP volunteer for file_key {:x}, location 0x{}, fingerprint {:x}",
            event.file_key,
            hex::encode(&event.location),
            event.fingerprint
        );

        if event.size == 0 {
            error!(target: LOG_TARGET, "File size cannot be 0");
            return Err(BspUploadError::InvalidFileSize.into());
        }

        if let Some(max) = self.config.max_file_size {
            if event.size > max {
                warn!(
                    target: LOG_TARGET,
                    "Skipping file key {:x}: {} bytes is over the limit of {} bytes",
                    event.file_key,
                    event.size,
                    max
                );
                return Err(BspUploadError::FileTooBig {
                    size: event.size,
                    max,
                }
                .into());
            }
        }

        // A file already in the forest is never volunteered for again.
        let fs = self.storage_hub_handler.current_forest().await?;
        if fs.read().await.contains_file_key(&event.file_key)? {
            info!(
                target: LOG_TARGET,
                "Skipping file key {:x} NewStorageRequest because we are already storing it.",
                event.file_key
            );
            return Ok(());
        }

        let metadata = event
            .file_metadata()
            .map_err(|_| BspUploadError::InvalidFileMetadata)?;

        let file_key = metadata.file_key::<Hashing>();
        if file_key != event.file_key {
            return Err(BspUploadError::FileKeyMismatch {
                expected: event.file_key,
                computed: file_key,
            }
            .into());
        }

        let blockchain = &self.storage_hub_handler.blockchain;
        let bsp_id = self.storage_hub_handler.bsp_id;

        // Query runtime for the earliest tick where the BSP can volunteer for the file.
        let earliest_volunteer_tick =
            blockchain.query_file_earliest_volunteer_tick(bsp_id, file_key)?;

        // The extrinsic is sent one tick before, so it is included in the block of the
        // earliest tick.
        let tick_to_wait_to_submit_volunteer = earliest_volunteer_tick.saturating_sub(1);

        info!(
            target: LOG_TARGET,
            "Waiting for tick {:?} to volunteer for file {:x}",
            tick_to_wait_to_submit_volunteer,
            file_key
        );
        blockchain
            .wait_for_tick(tick_to_wait_to_submit_volunteer)
            .await;

        // The storage request could have been fulfilled or expired while waiting.
        if !blockchain.is_storage_request_open_to_volunteers(file_key)? {
            warn!(
                target: LOG_TARGET,
                "Storage request for file key {:x} is no longer open to volunteers. Skipping volunteering.",
                file_key
            );
            return Err(BspUploadError::StorageRequestClosed.into());
        }

        // Register the file so its chunks can be received.
        match self
            .storage_hub_handler
            .file_storage
            .write()
            .await
            .insert_file(file_key, metadata)
        {
            Ok(()) => {}
            Err(FileStorageError::FileAlreadyExists) => {
                debug!(target: LOG_TARGET, "File {:x} already in file storage", file_key);
            }
            Err(e) => return Err(e.into()),
        }

        let call = RuntimeCall::FileSystem(pallet_file_system::Call::bsp_volunteer { file_key });
        let result = blockchain
            .submit_extrinsic_with_retry(call, self.storage_hub_handler.provider_config.max_try_count)
            .await;

        if let Err(e) = result {
            error!(
                target: LOG_TARGET,
                "Failed to volunteer for file {:x}: {}",
                file_key,
                e
            );
            self.unvolunteer_file(file_key).await;
            return Err(BspUploadError::VolunteerFailed(e.to_string()).into());
        }

        info!(target: LOG_TARGET, "Volunteered for file {:x}", file_key);

        Ok(())
    }

    /// Writes a batch of chunks sent by the user.
    ///
    /// Returns whether the file is complete. Once it is, its storage is queued to be confirmed.
    pub async fn handle_remote_upload_request(
        &self,
        file_key: FileKey,
        file_key_proof: FileKeyProof,
    ) -> anyhow::Result<bool> {
        trace!(target: LOG_TARGET, "Received remote upload request for file {:x}", file_key);

        let metadata = self
            .storage_hub_handler
            .file_storage
            .read()
            .await
            .get_metadata(&file_key)?
            .ok_or(BspUploadError::FileMetadataNotFound)?;

        if metadata.fingerprint() != file_key_proof.file_metadata.fingerprint() {
            error!(
                target: LOG_TARGET,
                "Fingerprint mismatch for file {:x}",
                file_key
            );
            return Err(BspUploadError::FingerprintMismatch.into());
        }

        let proven = file_key_proof
            .proven::<StorageProofsMerkleTrieLayout>()
            .map_err(|e| {
                error!(target: LOG_TARGET, "Failed to verify and get proven file key chunks: {:?}", e);
                BspUploadError::ChunkVerificationFailed(format!("{:?}", e))
            })?;

        if proven.is_empty() {
            return Err(BspUploadError::NoProvenChunks.into());
        }

        let total_size: usize = proven.iter().map(|chunk| chunk.data.len()).sum();
        if total_size > BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE {
            return Err(BspUploadError::BatchSizeExceeded {
                total_size,
                max_size: BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE,
            }
            .into());
        }

        let mut file_complete = false;
        let mut write_file_storage = self.storage_hub_handler.file_storage.write().await;
        for chunk in proven {
            match write_file_storage.write_chunk(&file_key, &chunk.key, &chunk.data) {
                Ok(FileStorageWriteOutcome::FileComplete) => file_complete = true,
                Ok(FileStorageWriteOutcome::FileIncomplete) => {}
                Err(FileStorageWriteError::FileChunkAlreadyExists) => {
                    trace!(
                        target: LOG_TARGET,
                        "Chunk {:?} of file {:x} already stored",
                        chunk.key,
                        file_key
                    );
                }
                Err(error) => {
                    error!(
                        target: LOG_TARGET,
                        "Failed to write chunk {:?} of file {:x}: {}",
                        chunk.key,
                        file_key,
                        error
                    );
                    return Err(BspUploadError::ChunkWriteFailed { file_key, error }.into());
                }
            }
        }
        drop(write_file_storage);

        if file_complete {
            info!(
                target: LOG_TARGET,
                "File {:x} is complete, queueing confirm storing request",
                file_key
            );
            self.storage_hub_handler
                .blockchain
                .queue_confirm_bsp_request(ConfirmStoringRequest::new(file_key));
        }

        Ok(file_complete)
    }

    /// Confirms storing a batch of files, adding the confirmed ones to the local forest.
    ///
    /// `forest_root_write_guard` is held until the confirmation is included and the local
    /// forest is updated.
    pub async fn process_confirm_storing_requests(
        &self,
        forest_root_write_guard: ForestRootWriteGuard,
        confirm_storing_requests: Vec<ConfirmStoringRequest>,
    ) -> anyhow::Result<()> {
        info!(
            target: LOG_TARGET,
            "Processing ConfirmStoringRequest: {:?}",
            confirm_storing_requests,
        );

        let blockchain = &self.storage_hub_handler.blockchain;
        let bsp_id = self.storage_hub_handler.bsp_id;
        let max_try_count = self.storage_hub_handler.provider_config.max_try_count;

        let requeue = |mut request: ConfirmStoringRequest, reason: &str| {
            request.increment_try_count();
            if request.try_count > max_try_count {
                error!(target: LOG_TARGET, "{} for file {:x}.\nMax try count exceeded! Dropping request!", reason, request.file_key);
            } else {
                error!(target: LOG_TARGET, "{} for file {:x}.\nEnqueuing file key again! (retry {}/{})", reason, request.file_key, request.try_count, max_try_count);
                blockchain.queue_confirm_bsp_request(request);
            }
        };

        let mut requests_with_chunks_to_prove = Vec::new();
        for request in confirm_storing_requests {
            match blockchain.query_bsp_confirm_chunks_to_prove_for_file(bsp_id, request.file_key) {
                Ok(chunks_to_prove) => requests_with_chunks_to_prove.push((request, chunks_to_prove)),
                Err(QueryConfirmChunksToProveForFileError::StorageRequestNotFound) => {
                    trace!(target: LOG_TARGET, "Skipping {:x} for stale storage request not found in chain state.", request.file_key);
                }
                Err(QueryConfirmChunksToProveForFileError::InvalidFileMetadata) => {
                    trace!(target: LOG_TARGET, "Skipping {:x}. Runtime could not build the metadata of the file.", request.file_key);
                }
            }
        }

        if requests_with_chunks_to_prove.is_empty() {
            trace!(target: LOG_TARGET, "Skipping ConfirmStoringRequest: No keys to confirm after querying chunks to prove.");
            return Ok(());
        }

        let read_file_storage = self.storage_hub_handler.file_storage.read().await;
        let mut file_keys_and_proofs = Vec::new();
        let mut file_metadatas = HashMap::new();
        let mut requests = Vec::new();
        for (request, chunks_to_prove) in requests_with_chunks_to_prove {
            match (
                read_file_storage.generate_proof(
                    &request.file_key,
                    &HashSet::from_iter(chunks_to_prove),
                ),
                read_file_storage.get_metadata(&request.file_key),
            ) {
                (Ok(proof), Ok(Some(metadata))) => {
                    file_keys_and_proofs.push(FileKeyWithProof {
                        file_key: request.file_key,
                        proof,
                    });
                    file_metadatas.insert(request.file_key, metadata);
                    requests.push(request);
                }
                _ => requeue(request, "Failed to generate proof or get metadatas"),
            }
        }
        // Not held across the extrinsic.
        drop(read_file_storage);

        if file_keys_and_proofs.is_empty() {
            error!(target: LOG_TARGET, "Failed to generate proofs for ALL the requested files.");
            return Err(BspUploadError::ProofGenerationFailed.into());
        }

        let file_keys = file_keys_and_proofs
            .iter()
            .map(|file_key_with_proof| file_key_with_proof.file_key)
            .collect::<Vec<_>>();

        let fs = self.storage_hub_handler.current_forest().await?;

        // Generate a proof of non-inclusion (executed in block to drop the read lock on the forest storage).
        let non_inclusion_forest_proof = { fs.read().await.generate_proof(file_keys)? };

        let call = RuntimeCall::FileSystem(pallet_file_system::Call::bsp_confirm_storing {
            non_inclusion_forest_proof: non_inclusion_forest_proof.proof,
            file_keys_and_proofs,
        });

        let inclusion = match blockchain
            .submit_extrinsic_with_retry(call, max_try_count)
            .await
        {
            Ok(inclusion) => inclusion,
            Err(e) => {
                for request in requests {
                    requeue(request, "Failed to confirm storing");
                }
                return Err(BspUploadError::ConfirmationFailed {
                    max_retries: max_try_count,
                    last_error: e.to_string(),
                }
                .into());
            }
        };

        let Some((confirmed_file_keys, skipped_file_keys, new_root)) =
            find_event(&inclusion, |event| match event {
                sh_runtime::RuntimeEvent::FileSystem(
                    pallet_file_system::Event::BspConfirmedStoring {
                        confirmed_file_keys,
                        skipped_file_keys,
                        new_root,
                        ..
                    },
                ) => Some((
                    confirmed_file_keys.clone(),
                    skipped_file_keys.clone(),
                    *new_root,
                )),
                _ => None,
            })
        else {
            for request in requests {
                requeue(request, "Confirm storing included without a BspConfirmedStoring event");
            }
            return Err(BspUploadError::ConfirmedStoringEventMissing.into());
        };

        if !skipped_file_keys.is_empty() {
            warn!(
                target: LOG_TARGET,
                "File keys skipped by the runtime when confirming: {:?}",
                skipped_file_keys
            );
        }

        // Add the confirmed files to the local forest.
        let confirmed_metadatas = confirmed_file_keys
            .iter()
            .filter_map(|file_key| file_metadatas.get(file_key).cloned())
            .collect::<Vec<_>>();
        let local_root = {
            let mut write_fs = fs.write().await;
            write_fs.insert_files_metadata(&confirmed_metadatas)?;
            write_fs.root()
        };

        if local_root != new_root {
            error!(
                target: LOG_TARGET,
                "CRITICAL❗️❗️ Local forest root {:x} does not match the on-chain root {:x} after confirming storing",
                local_root,
                new_root
            );
        } else {
            info!(
                target: LOG_TARGET,
                "Confirmed storing {} file(s), new forest root {:x}",
                confirmed_file_keys.len(),
                new_root
            );
        }

        // Release the forest root write lock and finish the task.
        drop(forest_root_write_guard);

        Ok(())
    }

    async fn unvolunteer_file(&self, file_key: FileKey) {
        warn!(target: LOG_TARGET, "Unvolunteering file {:x}", file_key);

        if let Err(e) = self
            .storage_hub_handler
            .file_storage
            .write()
            .await
            .delete_file(&file_key)
        {
            error!(
                target: LOG_TARGET,
                "Failed to delete file {:x} from file storage: {}",
                file_key,
                e
            );
        }
    }
}
