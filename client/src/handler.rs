use std::{
    fmt::{self, Debug},
    sync::Arc,
};

use anyhow::anyhow;
use log::{debug, error, info, warn};
use shc_forest_manager::traits::ForestStorageHandler;
use shp_types::{FileKey, ProviderId, TickNumber};
use tokio::{
    sync::{broadcast::error::RecvError, RwLock},
    task::JoinHandle,
};

use crate::{
    blockchain_service::{BlockNotification, BlockchainService},
    config::BspConfig,
    tasks::{
        bsp_stop_storing::BspStopStoringTask, bsp_submit_proof::BspSubmitProofTask,
        bsp_upload_file::BspUploadFileTask,
    },
    types::{ForestStorageKey, NewStorageRequest, ShNodeType, CURRENT_FOREST_KEY},
};

const LOG_TARGET: &str = "storage-hub-handler";

/// Represents the handler for the Storage Hub service.
///
/// Holds everything the tasks of a node share. Cloning it is cheap: every clone refers to the
/// same chain, file storage and forests.
pub struct StorageHubHandler<NT: ShNodeType> {
    /// The handle to the chain, signing with the BSP's account.
    pub blockchain: BlockchainService,
    /// The file storage layer implementation to use.
    pub file_storage: Arc<RwLock<NT::FL>>,
    /// The forest storage layer which tracks the forest of the BSP.
    pub forest_storage_handler: NT::FSH,
    /// The configuration parameters for the Provider.
    pub provider_config: BspConfig,
    /// The Provider id of the BSP running this node.
    pub bsp_id: ProviderId,
}

impl<NT: ShNodeType> Debug for StorageHubHandler<NT> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHubHandler")
            .field("bsp_id", &self.bsp_id)
            .field("provider_config", &self.provider_config)
            .finish()
    }
}

impl<NT: ShNodeType> Clone for StorageHubHandler<NT> {
    fn clone(&self) -> StorageHubHandler<NT> {
        Self {
            blockchain: self.blockchain.clone(),
            file_storage: self.file_storage.clone(),
            forest_storage_handler: self.forest_storage_handler.clone(),
            provider_config: self.provider_config.clone(),
            bsp_id: self.bsp_id,
        }
    }
}

impl<NT: ShNodeType> StorageHubHandler<NT> {
    pub fn new(
        blockchain: BlockchainService,
        file_storage: Arc<RwLock<NT::FL>>,
        forest_storage_handler: NT::FSH,
        provider_config: BspConfig,
        bsp_id: ProviderId,
    ) -> Self {
        Self {
            blockchain,
            file_storage,
            forest_storage_handler,
            provider_config,
            bsp_id,
        }
    }

    /// The forest of the BSP running this node.
    pub async fn current_forest(
        &self,
    ) -> anyhow::Result<Arc<RwLock<<NT::FSH as ForestStorageHandler>::FS>>> {
        let current_forest_key = ForestStorageKey::from(CURRENT_FOREST_KEY.to_vec());
        self.forest_storage_handler
            .get(&current_forest_key)
            .await
            .ok_or_else(|| anyhow!("CRITICAL❗️❗️ Failed to get forest storage."))
    }

    /// Stop storing `file_key`, running both phases of the protocol in the background.
    pub fn spawn_stop_storing(&self, file_key: FileKey) -> JoinHandle<anyhow::Result<()>> {
        let task = BspStopStoringTask::new(self.clone());
        tokio::spawn(async move { task.stop_storing(file_key).await })
    }

    /// Follow the chain and run the BSP tasks until the returned handle is aborted.
    ///
    /// - Every `NewStorageRequest` spawns a [`BspUploadFileTask`] that volunteers for it.
    /// - Whenever the forest root write lock is free, the next forest root write is started:
    ///   the proof for the BSP's challenge tick if it is due, otherwise a batch of the queued
    ///   confirm storing requests.
    pub fn start_bsp_tasks(self) -> JoinHandle<()> {
        info!(target: LOG_TARGET, "Starting BSP tasks");

        // Subscribed before spawning so no block imported from now on is missed.
        let mut blocks = self.blockchain.subscribe_blocks();
        let mut lock_released = self
            .blockchain
            .forest_root_write_locks()
            .gate(&self.bsp_id)
            .subscribe();

        tokio::spawn(async move {
            let mut last_proof_tick_attempted = None;

            loop {
                self.process_forest_root_writes(&mut last_proof_tick_attempted);

                tokio::select! {
                    block = blocks.recv() => match block {
                        Ok(block) => self.handle_block_import(block),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: LOG_TARGET, "Missed {} block notifications", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    released = lock_released.recv() => {
                        if let Err(RecvError::Closed) = released {
                            break;
                        }
                    }
                    _ = self.blockchain.pending_work().notified() => {}
                }
            }

            info!(target: LOG_TARGET, "BSP tasks stopped");
        })
    }

    fn handle_block_import(&self, block: BlockNotification) {
        debug!(
            target: LOG_TARGET,
            "Block {} imported at tick {}",
            block.block_number,
            block.tick
        );

        for record in &block.events {
            if let Some(request) = NewStorageRequest::from_runtime_event(&record.event) {
                let task = BspUploadFileTask::new(self.clone());
                tokio::spawn(async move {
                    let file_key = request.file_key;
                    if let Err(e) = task.handle_new_storage_request(request).await {
                        error!(
                            target: LOG_TARGET,
                            "Failed to handle NewStorageRequest for file {:x}: {:?}",
                            file_key,
                            e
                        );
                    }
                });
            }
        }
    }

    /// Start the next forest root write, if there is one and the lock is free.
    ///
    /// Proofs take priority over confirmations: a late proof gets the BSP slashed, a late
    /// confirmation only delays it.
    fn process_forest_root_writes(&self, last_proof_tick_attempted: &mut Option<TickNumber>) {
        let current_tick = self.blockchain.current_tick();

        if let Some(proof_tick) = self
            .blockchain
            .query_next_challenge_tick_for_provider(self.bsp_id)
        {
            if current_tick >= proof_tick && *last_proof_tick_attempted != Some(proof_tick) {
                // Nothing else is started while the proof waits for the lock.
                let Some(guard) = self
                    .blockchain
                    .forest_root_write_locks()
                    .try_acquire(&self.bsp_id)
                else {
                    return;
                };

                *last_proof_tick_attempted = Some(proof_tick);
                let task = BspSubmitProofTask::new(self.clone());
                tokio::spawn(async move {
                    if let Err(e) = task.submit_proof(guard, proof_tick).await {
                        error!(
                            target: LOG_TARGET,
                            "Failed to submit proof for tick {}: {:?}",
                            proof_tick,
                            e
                        );
                    }
                });
                return;
            }
        }

        if self.blockchain.pending_confirm_storing_requests() == 0 {
            return;
        }

        // Lock first, then take from the queue, so nothing is lost if the lock is taken.
        let Some(guard) = self
            .blockchain
            .forest_root_write_locks()
            .try_acquire(&self.bsp_id)
        else {
            return;
        };

        let max_batch = self
            .provider_config
            .max_batch_confirm_storage_requests
            .min(self.blockchain.query_max_batch_confirm_storage_requests())
            .max(1);
        let requests = self
            .blockchain
            .take_confirm_storing_requests(max_batch as usize);
        if requests.is_empty() {
            return;
        }

        let task = BspUploadFileTask::new(self.clone());
        tokio::spawn(async move {
            if let Err(e) = task.process_confirm_storing_requests(guard, requests).await {
                error!(target: LOG_TARGET, "Failed to confirm storing: {:?}", e);
            }
        });
    }
}
