//! The node's view of the chain: extrinsic submission, tick tracking and runtime queries.

pub mod chain;

use std::{collections::VecDeque, sync::Arc};

use parking_lot::Mutex;
use pallet_file_system::{PendingStopStoringRequest, StorageRequestMetadata};
use pallet_proofs_dealer::CustomChallenge;
use sh_runtime::{
    apis::{FileSystemApi, ProofsDealerApi, StorageProvidersApi},
    AccountId, Runtime, RuntimeCall, RuntimeEvent, Transaction,
};
use shc_forest_lock::ForestRootWriteLocks;
use shp_file_metadata::ChunkId;
use shp_types::{FileKey, MerkleHash, ProviderId, RandomnessOutput, TickNumber};
use sp_runtime::{transaction_validity::TransactionValidityError, DispatchError};
use tokio::sync::{broadcast::error::RecvError, Notify};

pub use chain::{BlockNotification, ExtrinsicInclusion, InProcessChain, SealingMode};

use crate::types::ConfirmStoringRequest;

const LOG_TARGET: &str = "blockchain-service";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockchainServiceError {
    #[error("extrinsic is invalid: {0:?}")]
    InvalidTransaction(TransactionValidityError),
    #[error("extrinsic failed: {0:?}")]
    ExtrinsicFailed(DispatchError),
    #[error("extrinsic was not included before tick {0}")]
    Timeout(TickNumber),
    #[error("the chain dropped the extrinsic watcher")]
    WatcherDropped,
    #[error("account {0} is not a Backup Storage Provider")]
    NotABsp(AccountId),
    #[error("runtime API call failed: {0}")]
    RuntimeApi(String),
}

/// Handle used by a node to interact with the chain, signing with the node's account.
///
/// It also holds the state shared by every task of the node: the forest root write locks and
/// the queue of files waiting for their storage to be confirmed.
#[derive(Clone)]
pub struct BlockchainService {
    chain: InProcessChain,
    caller: AccountId,
    extrinsic_timeout_ticks: TickNumber,
    forest_root_write_locks: Arc<ForestRootWriteLocks<ProviderId>>,
    pending_confirm_storing_requests: Arc<Mutex<VecDeque<ConfirmStoringRequest>>>,
    pending_work: Arc<Notify>,
}

impl BlockchainService {
    pub fn new(chain: InProcessChain, caller: AccountId, extrinsic_timeout_ticks: TickNumber) -> Self {
        Self {
            chain,
            caller,
            extrinsic_timeout_ticks,
            forest_root_write_locks: Arc::new(ForestRootWriteLocks::new()),
            pending_confirm_storing_requests: Arc::new(Mutex::new(VecDeque::new())),
            pending_work: Arc::new(Notify::new()),
        }
    }

    pub fn chain(&self) -> &InProcessChain {
        &self.chain
    }

    pub fn caller(&self) -> &AccountId {
        &self.caller
    }

    pub fn forest_root_write_locks(&self) -> &ForestRootWriteLocks<ProviderId> {
        &self.forest_root_write_locks
    }

    pub fn subscribe_blocks(&self) -> tokio::sync::broadcast::Receiver<BlockNotification> {
        self.chain.subscribe()
    }

    pub fn current_tick(&self) -> TickNumber {
        self.chain.current_tick()
    }

    /// Resolves once the challenges ticker is at `tick` or past it.
    pub async fn wait_for_tick(&self, tick: TickNumber) {
        // Subscribe before checking, so a block imported in between is not missed.
        let mut blocks = self.chain.subscribe();
        if self.current_tick() >= tick {
            return;
        }

        loop {
            match blocks.recv().await {
                Ok(block) if block.tick >= tick => return,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!(target: LOG_TARGET, "Missed {} block notifications", skipped);
                    if self.current_tick() >= tick {
                        return;
                    }
                }
                // The chain handle lives in `self`, so the sender can't be gone.
                Err(RecvError::Closed) => return,
            }
        }
    }

    pub async fn wait_for_num_ticks(&self, num_ticks: TickNumber) {
        self.wait_for_tick(self.current_tick().saturating_add(num_ticks))
            .await
    }

    /// Sign `call` with the node's account, submit it and wait for it to be included.
    ///
    /// Fails with [`BlockchainServiceError::Timeout`] if it is not in a block after
    /// `extrinsic_timeout_ticks` ticks.
    pub async fn submit_extrinsic(
        &self,
        call: RuntimeCall,
    ) -> Result<ExtrinsicInclusion, BlockchainServiceError> {
        let start_tick = self.current_tick();
        let timeout_tick = start_tick.saturating_add(self.extrinsic_timeout_ticks);
        let inclusion = self
            .chain
            .submit(Transaction::signed(self.caller.clone(), call));

        let inclusion = tokio::select! {
            biased;
            inclusion = inclusion => inclusion.map_err(|_| BlockchainServiceError::WatcherDropped)?,
            _ = self.wait_for_tick(timeout_tick) => {
                return Err(BlockchainServiceError::Timeout(timeout_tick));
            }
        };

        match &inclusion.result {
            Err(e) => Err(BlockchainServiceError::InvalidTransaction(*e)),
            Ok(Err(e)) => Err(BlockchainServiceError::ExtrinsicFailed(*e)),
            Ok(Ok(_)) => Ok(inclusion),
        }
    }

    /// Like [`Self::submit_extrinsic`], resubmitting up to `max_retries` times when the
    /// extrinsic times out. Failed extrinsics are not retried.
    pub async fn submit_extrinsic_with_retry(
        &self,
        call: RuntimeCall,
        max_retries: u32,
    ) -> Result<ExtrinsicInclusion, BlockchainServiceError> {
        let mut attempt = 0;
        loop {
            match self.submit_extrinsic(call.clone()).await {
                Err(BlockchainServiceError::Timeout(tick)) if attempt < max_retries => {
                    attempt += 1;
                    log::warn!(
                        target: LOG_TARGET,
                        "Extrinsic timed out at tick {}, retrying ({}/{})",
                        tick,
                        attempt,
                        max_retries
                    );
                }
                result => return result,
            }
        }
    }

    pub fn query_storage_provider_id(&self, who: &AccountId) -> Option<ProviderId> {
        self.chain.read(|| Runtime::get_storage_provider_id(who))
    }

    pub fn query_is_bsp(&self, provider_id: ProviderId) -> bool {
        self.chain.read(|| Runtime::is_bsp(provider_id))
    }

    /// The Provider id of the node's account, if it is a registered BSP.
    pub fn query_bsp_id(&self) -> Result<ProviderId, BlockchainServiceError> {
        self.query_storage_provider_id(&self.caller)
            .filter(|id| self.query_is_bsp(*id))
            .ok_or_else(|| BlockchainServiceError::NotABsp(self.caller.clone()))
    }

    pub fn query_file_earliest_volunteer_tick(
        &self,
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<TickNumber, BlockchainServiceError> {
        self.chain
            .read(|| Runtime::query_earliest_file_volunteer_tick(bsp_id, file_key))
            .map_err(|e| BlockchainServiceError::RuntimeApi(format!("{:?}", e)))
    }

    pub fn is_storage_request_open_to_volunteers(
        &self,
        file_key: FileKey,
    ) -> Result<bool, BlockchainServiceError> {
        self.chain
            .read(|| Runtime::is_storage_request_open_to_volunteers(file_key))
            .map_err(|e| BlockchainServiceError::RuntimeApi(format!("{:?}", e)))
    }

    pub fn query_bsp_confirm_chunks_to_prove_for_file(
        &self,
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<Vec<ChunkId>, pallet_file_system::QueryConfirmChunksToProveForFileError> {
        self.chain
            .read(|| Runtime::query_bsp_confirm_chunks_to_prove_for_file(bsp_id, file_key))
    }

    pub fn query_storage_request(&self, file_key: FileKey) -> Option<StorageRequestMetadata<Runtime>> {
        self.chain.read(|| Runtime::storage_request(file_key))
    }

    pub fn query_pending_stop_storing_request(
        &self,
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Option<PendingStopStoringRequest<Runtime>> {
        self.chain
            .read(|| Runtime::pending_stop_storing_request(bsp_id, file_key))
    }

    pub fn query_min_wait_for_stop_storing(&self) -> TickNumber {
        self.chain.read(|| Runtime::query_min_wait_for_stop_storing())
    }

    pub fn query_max_batch_confirm_storage_requests(&self) -> u32 {
        self.chain
            .read(|| Runtime::query_max_batch_confirm_storage_requests())
    }

    pub fn query_challenge_seed(
        &self,
        tick: TickNumber,
    ) -> Result<RandomnessOutput, BlockchainServiceError> {
        self.chain
            .read(|| Runtime::get_challenge_seed(tick))
            .map_err(|e| BlockchainServiceError::RuntimeApi(format!("{:?}", e)))
    }

    pub fn query_next_challenge_tick_for_provider(&self, provider_id: ProviderId) -> Option<TickNumber> {
        self.chain
            .read(|| Runtime::get_next_tick_to_submit_proof_for(provider_id))
    }

    pub fn query_last_tick_provider_submitted_proof(
        &self,
        provider_id: ProviderId,
    ) -> Option<TickNumber> {
        self.chain
            .read(|| Runtime::get_last_tick_provider_submitted_proof(provider_id))
    }

    pub fn query_forest_challenges_from_seed(
        &self,
        seed: RandomnessOutput,
        provider_id: ProviderId,
    ) -> Vec<RandomnessOutput> {
        self.chain
            .read(|| Runtime::get_forest_challenges_from_seed(seed, provider_id))
    }

    pub fn query_challenges_from_seed(
        &self,
        seed: RandomnessOutput,
        file_key: FileKey,
        count: u32,
    ) -> Vec<RandomnessOutput> {
        self.chain
            .read(|| Runtime::get_challenges_from_seed(seed, file_key, count))
    }

    pub fn query_checkpoint_challenges_to_answer(&self, provider_id: ProviderId) -> Vec<CustomChallenge> {
        self.chain
            .read(|| Runtime::get_checkpoint_challenges_to_answer(provider_id))
    }

    pub fn query_bsp_root(&self, bsp_id: ProviderId) -> Option<MerkleHash> {
        self.chain.read(|| Runtime::get_bsp_root(bsp_id))
    }

    /// Queue a file whose storage should be confirmed on chain.
    ///
    /// Requests are sent in batches by the node, whenever the forest root write lock is free.
    pub fn queue_confirm_bsp_request(&self, request: ConfirmStoringRequest) {
        self.pending_confirm_storing_requests
            .lock()
            .push_back(request);
        self.pending_work.notify_one();
    }

    /// Take up to `max` queued confirm storing requests, skipping repeated file keys.
    pub fn take_confirm_storing_requests(&self, max: usize) -> Vec<ConfirmStoringRequest> {
        let mut queue = self.pending_confirm_storing_requests.lock();
        let mut batch: Vec<ConfirmStoringRequest> = Vec::new();
        while batch.len() < max {
            let Some(request) = queue.pop_front() else {
                break;
            };
            if batch.iter().any(|r| r.file_key == request.file_key) {
                continue;
            }
            batch.push(request);
        }
        batch
    }

    pub fn pending_confirm_storing_requests(&self) -> usize {
        self.pending_confirm_storing_requests.lock().len()
    }

    /// Notified whenever new work is queued for the node.
    pub fn pending_work(&self) -> &Notify {
        &self.pending_work
    }
}

/// The first event of an extrinsic matching `f`.
pub fn find_event<T>(
    inclusion: &ExtrinsicInclusion,
    f: impl FnMut(&RuntimeEvent) -> Option<T>,
) -> Option<T> {
    inclusion.events.iter().find_map(f)
}
