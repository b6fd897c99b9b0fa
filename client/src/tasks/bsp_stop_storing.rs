use anyhow::anyhow;
use codec::Decode;
use log::{error, info, warn};
use serde::Deserialize;
use sh_runtime::{AccountId, RuntimeCall, RuntimeEvent};
use shc_file_manager::traits::FileStorage;
use shc_forest_manager::traits::ForestStorage;
use shp_types::{BucketId, FileKey, Fingerprint, TickNumber};

use crate::{blockchain_service::find_event, handler::StorageHubHandler, types::ShNodeType};

const LOG_TARGET: &str = "bsp-stop-storing-task";

/// Configuration of the [`BspStopStoringTask`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BspStopStoringConfig {
    /// Whether the BSP offers to serve the file to the BSP that takes over storing it.
    pub can_serve: bool,
}

impl Default for BspStopStoringConfig {
    fn default() -> Self {
        Self { can_serve: true }
    }
}

/// BSP Stop Storing Task: Handles the two-phase process of a BSP voluntarily stopping
/// storage of a file.
///
/// - Phase 1, [`Self::request_stop_storing`]: reads the file's metadata from the forest and
///   submits `bsp_request_stop_storing` with an inclusion proof. The forest root does not
///   change yet.
/// - The runtime makes the BSP wait `MinWaitForStopStoring` ticks, so it can't drop a file
///   right after being challenged for it.
/// - Phase 2, [`Self::confirm_stop_storing`]: submits `bsp_confirm_stop_storing` with a new
///   inclusion proof, then removes the file from the local forest and file storage.
///
/// Both phases hold the forest root write lock while generating and submitting their proof.
pub struct BspStopStoringTask<NT: ShNodeType> {
    storage_hub_handler: StorageHubHandler<NT>,
    config: BspStopStoringConfig,
}

impl<NT: ShNodeType> Clone for BspStopStoringTask<NT> {
    fn clone(&self) -> Self {
        Self {
            storage_hub_handler: self.storage_hub_handler.clone(),
            config: self.config.clone(),
        }
    }
}

impl<NT: ShNodeType> BspStopStoringTask<NT> {
    pub fn new(storage_hub_handler: StorageHubHandler<NT>) -> Self {
        Self {
            config: storage_hub_handler.provider_config.bsp_stop_storing.clone(),
            storage_hub_handler,
        }
    }

    /// Run both phases, waiting in between for as long as the runtime requires.
    pub async fn stop_storing(&self, file_key: FileKey) -> anyhow::Result<()> {
        let tick_when_requested = self.request_stop_storing(file_key).await?;

        let min_wait = self
            .storage_hub_handler
            .blockchain
            .query_min_wait_for_stop_storing();
        // The confirmation is included in the block after the one it is sent at.
        let tick_to_confirm = tick_when_requested
            .saturating_add(min_wait)
            .saturating_sub(1);

        info!(
            target: LOG_TARGET,
            "Waiting for tick {} to confirm stop storing file {:x}",
            tick_to_confirm,
            file_key
        );
        self.storage_hub_handler
            .blockchain
            .wait_for_tick(tick_to_confirm)
            .await;

        self.confirm_stop_storing(file_key).await
    }

    /// Phase 1. Returns the tick at which the request was registered on chain.
    pub async fn request_stop_storing(&self, file_key: FileKey) -> anyhow::Result<TickNumber> {
        info!(target: LOG_TARGET, "Requesting to stop storing file {:x}", file_key);

        let blockchain = &self.storage_hub_handler.blockchain;
        let bsp_id = self.storage_hub_handler.bsp_id;
        let guard = blockchain.forest_root_write_locks().acquire(&bsp_id).await?;

        let fs = self.storage_hub_handler.current_forest().await?;
        let (metadata, inclusion_forest_proof) = {
            let read_fs = fs.read().await;
            let metadata = read_fs
                .get_file_metadata(&file_key)?
                .ok_or_else(|| anyhow!("File {:x} is not in the forest of this BSP", file_key))?;
            let proof = read_fs.generate_proof(vec![file_key])?;
            (metadata, proof.proof)
        };

        let owner = AccountId::decode(&mut metadata.owner().as_slice())
            .map_err(|e| anyhow!("Failed to decode owner of file {:x}: {:?}", file_key, e))?;
        let bucket_id = BucketId::decode(&mut metadata.bucket_id().as_slice())
            .map_err(|e| anyhow!("Failed to decode bucket of file {:x}: {:?}", file_key, e))?;

        let call = RuntimeCall::FileSystem(pallet_file_system::Call::bsp_request_stop_storing {
            file_key,
            bucket_id,
            location: metadata.location().clone(),
            owner,
            fingerprint: Fingerprint::from(metadata.fingerprint().as_hash()),
            size: metadata.file_size(),
            can_serve: self.config.can_serve,
            inclusion_forest_proof,
        });

        let inclusion = blockchain
            .submit_extrinsic_with_retry(call, self.storage_hub_handler.provider_config.max_try_count)
            .await
            .map_err(|e| {
                error!(target: LOG_TARGET, "Failed to request stop storing file {:x}: {}", file_key, e);
                anyhow!("Failed to request stop storing: {}", e)
            })?;

        drop(guard);

        let tick_when_requested = blockchain
            .query_pending_stop_storing_request(bsp_id, file_key)
            .map(|pending| pending.tick_when_requested)
            .unwrap_or(inclusion.tick);

        info!(
            target: LOG_TARGET,
            "Requested to stop storing file {:x} at tick {}",
            file_key,
            tick_when_requested
        );

        Ok(tick_when_requested)
    }

    /// Phase 2. Removes the file from the local forest and file storage once confirmed.
    pub async fn confirm_stop_storing(&self, file_key: FileKey) -> anyhow::Result<()> {
        let blockchain = &self.storage_hub_handler.blockchain;
        let bsp_id = self.storage_hub_handler.bsp_id;

        if blockchain
            .query_pending_stop_storing_request(bsp_id, file_key)
            .is_none()
        {
            warn!(
                target: LOG_TARGET,
                "No pending stop storing request for file {:x}",
                file_key
            );
            return Err(anyhow!("No pending stop storing request for file {:x}", file_key));
        }

        let guard = blockchain.forest_root_write_locks().acquire(&bsp_id).await?;

        let fs = self.storage_hub_handler.current_forest().await?;
        let inclusion_forest_proof = fs.read().await.generate_proof(vec![file_key])?.proof;

        let call = RuntimeCall::FileSystem(pallet_file_system::Call::bsp_confirm_stop_storing {
            file_key,
            inclusion_forest_proof,
        });

        let inclusion = blockchain
            .submit_extrinsic_with_retry(call, self.storage_hub_handler.provider_config.max_try_count)
            .await
            .map_err(|e| {
                error!(target: LOG_TARGET, "Failed to confirm stop storing file {:x}: {}", file_key, e);
                anyhow!("Failed to confirm stop storing: {}", e)
            })?;

        let new_root = find_event(&inclusion, |event| match event {
            RuntimeEvent::FileSystem(pallet_file_system::Event::BspConfirmStoppedStoring {
                file_key: confirmed,
                new_root,
                ..
            }) if *confirmed == file_key => Some(*new_root),
            _ => None,
        })
        .ok_or_else(|| anyhow!("Stop storing confirmed without a BspConfirmStoppedStoring event"))?;

        let local_root = {
            let mut write_fs = fs.write().await;
            write_fs.delete_file_key(&file_key)?;
            write_fs.root()
        };

        drop(guard);

        if local_root != new_root {
            error!(
                target: LOG_TARGET,
                "CRITICAL❗️❗️ Local forest root {:x} does not match the on-chain root {:x} after stopping storing",
                local_root,
                new_root
            );
        }

        if let Err(e) = self
            .storage_hub_handler
            .file_storage
            .write()
            .await
            .delete_file(&file_key)
        {
            warn!(target: LOG_TARGET, "Failed to delete file {:x} from file storage: {}", file_key, e);
        }

        info!(target: LOG_TARGET, "Stopped storing file {:x}", file_key);

        Ok(())
    }
}
