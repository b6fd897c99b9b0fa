use std::{marker::PhantomData, sync::Arc};

use anyhow::anyhow;
use log::info;
use sh_runtime::AccountId;
use shc_file_manager::in_memory::InMemoryFileStorage;
use shc_forest_manager::traits::ForestStorageHandler;
use tokio::sync::RwLock;

use crate::{
    blockchain_service::{BlockchainService, InProcessChain},
    config::BspConfig,
    handler::StorageHubHandler,
    tasks::{
        bsp_stop_storing::BspStopStoringConfig, bsp_submit_proof::BspSubmitProofConfig,
        bsp_upload_file::BspUploadFileConfig,
    },
    types::{
        BspProvider, ForestStorageKey, InMemoryStorageLayer, ShNodeType, ShRole, ShStorageLayer,
        CURRENT_FOREST_KEY,
    },
};

const LOG_TARGET: &str = "storage-hub-builder";

/// Builder for the [`StorageHubHandler`].
///
/// Abstracted over [`ShRole`] `R` and [`ShStorageLayer`] `S` to avoid any callers from having to
/// know the internals of the StorageHub system, such as the right storage layers to use for a
/// given role.
pub struct StorageHubBuilder<R, S>
where
    R: ShRole,
    S: ShStorageLayer,
    (R, S): ShNodeType,
{
    chain: Option<InProcessChain>,
    account: Option<AccountId>,
    file_storage: Option<Arc<RwLock<<(R, S) as ShNodeType>::FL>>>,
    forest_storage_handler: Option<<(R, S) as ShNodeType>::FSH>,
    config: BspConfig,
    _marker: PhantomData<(R, S)>,
}

/// Common components to build for any given configuration of [`ShRole`] and [`ShStorageLayer`].
impl<R: ShRole, S: ShStorageLayer> StorageHubBuilder<R, S>
where
    (R, S): ShNodeType,
{
    pub fn new() -> Self {
        Self {
            chain: None,
            account: None,
            file_storage: None,
            forest_storage_handler: None,
            config: BspConfig::default(),
            _marker: PhantomData,
        }
    }

    /// Set the chain the node follows, and the account it signs its extrinsics with.
    pub fn with_blockchain(&mut self, chain: InProcessChain, account: AccountId) -> &mut Self {
        self.chain = Some(chain);
        self.account = Some(account);
        self
    }

    pub fn with_config(&mut self, config: BspConfig) -> &mut Self {
        self.config = config;
        self
    }

    pub fn with_bsp_upload_file_config(&mut self, config: BspUploadFileConfig) -> &mut Self {
        self.config.bsp_upload_file = config;
        self
    }

    pub fn with_bsp_submit_proof_config(&mut self, config: BspSubmitProofConfig) -> &mut Self {
        self.config.bsp_submit_proof = config;
        self
    }

    pub fn with_bsp_stop_storing_config(&mut self, config: BspStopStoringConfig) -> &mut Self {
        self.config.bsp_stop_storing = config;
        self
    }
}

impl<R: ShRole, S: ShStorageLayer> Default for StorageHubBuilder<R, S>
where
    (R, S): ShNodeType,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Abstraction trait to build the Storage Layer of a [`ShNodeType`].
///
/// This trait is implemented for `StorageHubBuilder<R, S>` where `R` is a [`ShRole`] and `S` is a
/// [`ShStorageLayer`].
pub trait StorageLayerBuilder {
    fn setup_storage_layer(&mut self) -> &mut Self;
}

impl StorageLayerBuilder for StorageHubBuilder<BspProvider, InMemoryStorageLayer> {
    fn setup_storage_layer(&mut self) -> &mut Self {
        self.file_storage = Some(Arc::new(RwLock::new(InMemoryFileStorage::new())));
        self.forest_storage_handler =
            Some(<(BspProvider, InMemoryStorageLayer) as ShNodeType>::FSH::new());

        self
    }
}

/// Abstraction trait to build the [`StorageHubHandler`].
///
/// This trait is implemented by the different [`StorageHubBuilder`] variants, and builds a
/// [`StorageHubHandler`] with the required configuration for the corresponding [`ShRole`].
#[async_trait::async_trait]
pub trait Buildable<NT: ShNodeType> {
    async fn build(self) -> anyhow::Result<StorageHubHandler<NT>>;
}

#[async_trait::async_trait]
impl<S: ShStorageLayer + Send> Buildable<(BspProvider, S)> for StorageHubBuilder<BspProvider, S>
where
    (BspProvider, S): ShNodeType,
{
    async fn build(self) -> anyhow::Result<StorageHubHandler<(BspProvider, S)>> {
        let chain = self
            .chain
            .ok_or_else(|| anyhow!("Blockchain not set. Use `with_blockchain` first."))?;
        let account = self
            .account
            .ok_or_else(|| anyhow!("Account not set. Use `with_blockchain` first."))?;
        let file_storage = self
            .file_storage
            .ok_or_else(|| anyhow!("File Storage not set. Use `setup_storage_layer` first."))?;
        let mut forest_storage_handler = self.forest_storage_handler.ok_or_else(|| {
            anyhow!("Forest Storage Handler not set. Use `setup_storage_layer` first.")
        })?;

        let blockchain =
            BlockchainService::new(chain, account, self.config.extrinsic_timeout_ticks);
        let bsp_id = blockchain.query_bsp_id()?;

        // The BSP's forest has to exist before the first task needs it.
        let current_forest_key = ForestStorageKey::from(CURRENT_FOREST_KEY.to_vec());
        forest_storage_handler
            .get_or_create(&current_forest_key)
            .await?;

        info!(target: LOG_TARGET, "Built StorageHub handler for BSP {:x}", bsp_id);

        Ok(StorageHubHandler::new(
            blockchain,
            file_storage,
            forest_storage_handler,
            self.config,
            bsp_id,
        ))
    }
}
