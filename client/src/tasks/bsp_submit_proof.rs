use std::collections::{BTreeMap, BTreeSet, HashSet};

use anyhow::anyhow;
use log::{debug, error, info, trace, warn};
use serde::Deserialize;
use sh_runtime::{RuntimeCall, RuntimeEvent};
use shc_file_manager::traits::FileStorage;
use shc_forest_lock::ForestRootWriteGuard;
use shc_forest_manager::{traits::ForestStorage, types::Proven};
use shp_file_metadata::ChunkId;
use shp_types::{FileKey, ProviderId, RandomnessOutput, TickNumber};

use pallet_proofs_dealer::{CustomChallenge, KeyProof, Proof};

use crate::{
    blockchain_service::find_event,
    handler::StorageHubHandler,
    types::{FileKeyProof, ShNodeType},
};

const LOG_TARGET: &str = "bsp-submit-proof-task";

/// Configuration of the [`BspSubmitProofTask`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BspSubmitProofConfig {
    /// Times a proof submission is retried when it is not included in time.
    pub max_submission_attempts: u32,
}

impl Default for BspSubmitProofConfig {
    fn default() -> Self {
        Self {
            max_submission_attempts: 5,
        }
    }
}

/// Everything needed to answer the challenges of a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitProofRequest {
    pub provider_id: ProviderId,
    pub tick: TickNumber,
    pub seed: RandomnessOutput,
    pub forest_challenges: Vec<FileKey>,
    pub checkpoint_challenges: Vec<CustomChallenge>,
}

/// BSP Submit Proof Task: Handles the submission of proofs for the challenges of the BSP's
/// forest.
///
/// It is run by the node, with the forest root write lock held, once the challenges ticker
/// reaches the tick the BSP should submit its next proof for:
///
/// - Derives the forest challenges from the tick's seed, adding the checkpoint challenges the
///   BSP has not answered yet.
/// - Generates the forest proof and a key proof for every file key proven in it.
/// - Submits the proof and, if checkpoint challenges removed file keys from the forest,
///   removes them from the local forest and file storage too.
pub struct BspSubmitProofTask<NT: ShNodeType> {
    storage_hub_handler: StorageHubHandler<NT>,
    config: BspSubmitProofConfig,
}

impl<NT: ShNodeType> Clone for BspSubmitProofTask<NT> {
    fn clone(&self) -> Self {
        Self {
            storage_hub_handler: self.storage_hub_handler.clone(),
            config: self.config.clone(),
        }
    }
}

impl<NT: ShNodeType> BspSubmitProofTask<NT> {
    pub fn new(storage_hub_handler: StorageHubHandler<NT>) -> Self {
        Self {
            config: storage_hub_handler.provider_config.bsp_submit_proof.clone(),
            storage_hub_handler,
        }
    }

    /// Gather the challenges the BSP has to answer for `tick`.
    pub fn build_submit_proof_request(&self, tick: TickNumber) -> anyhow::Result<SubmitProofRequest> {
        let blockchain = &self.storage_hub_handler.blockchain;
        let provider_id = self.storage_hub_handler.bsp_id;

        let seed = blockchain.query_challenge_seed(tick)?;
        let mut forest_challenges = blockchain.query_forest_challenges_from_seed(seed, provider_id);

        let checkpoint_challenges = blockchain.query_checkpoint_challenges_to_answer(provider_id);
        forest_challenges.extend(checkpoint_challenges.iter().map(|challenge| challenge.key));

        Ok(SubmitProofRequest {
            provider_id,
            tick,
            seed,
            forest_challenges,
            checkpoint_challenges,
        })
    }

    pub async fn submit_proof(
        &self,
        forest_root_write_guard: ForestRootWriteGuard,
        tick: TickNumber,
    ) -> anyhow::Result<()> {
        let request = self.build_submit_proof_request(tick)?;

        info!(
            target: LOG_TARGET,
            "Processing SubmitProofRequest for tick {} with {} forest challenges and {} checkpoint challenges",
            request.tick,
            request.forest_challenges.len(),
            request.checkpoint_challenges.len()
        );

        // Exiting early is important so that the provider doesn't get stuck trying to submit an
        // outdated proof.
        self.check_if_proof_is_outdated(&request)?;

        let fs = self.storage_hub_handler.current_forest().await?;

        // Each challenge is answered by a file key in the forest, or by the keys around it.
        let forest_proof = fs
            .read()
            .await
            .generate_proof(request.forest_challenges.clone())
            .map_err(|e| anyhow!("Failed to generate forest proof: {:?}", e))?;

        let mut proven_keys = BTreeSet::new();
        for key in forest_proof.proven {
            match key {
                Proven::ExactKey(leaf) => {
                    proven_keys.insert(leaf.key);
                }
                Proven::NeighbourKeys((left, right)) => {
                    if left.is_none() && right.is_none() {
                        error!(target: LOG_TARGET, "Both left and right leaves in forest proof are None. This should not be possible.");
                    }
                    proven_keys.extend(left.into_iter().chain(right).map(|leaf| leaf.key));
                }
                Proven::Empty => {
                    error!(target: LOG_TARGET, "Forest proof generated with empty forest. This should not be possible, as this provider shouldn't have been challenged with an empty forest.");
                }
            }
        }

        // Every file key found in the forest needs a proof over its challenged chunks.
        let mut key_proofs = BTreeMap::new();
        for file_key in &proven_keys {
            key_proofs.insert(*file_key, self.generate_key_proof(*file_key, request.seed).await?);
        }

        let call = RuntimeCall::ProofsDealer(pallet_proofs_dealer::Call::submit_proof {
            proof: Proof {
                forest_proof: forest_proof.proof,
                key_proofs,
            },
            // The proof is submitted with the account of the BSP.
            provider: None,
        });

        let inclusion = self
            .storage_hub_handler
            .blockchain
            .submit_extrinsic_with_retry(call, self.config.max_submission_attempts)
            .await
            .map_err(|e| {
                error!(target: LOG_TARGET, "❌ Failed to submit proof due to: {}", e);
                anyhow!("Failed to submit proof due to: {}", e)
            })?;

        trace!(target: LOG_TARGET, "Proof submitted successfully");

        let mutations = find_event(&inclusion, |event| match event {
            RuntimeEvent::ProofsDealer(pallet_proofs_dealer::Event::MutationsAppliedForProvider {
                provider_id,
                removed_keys,
                new_root,
                ..
            }) if *provider_id == request.provider_id => Some((removed_keys.clone(), *new_root)),
            _ => None,
        });

        if let Some((removed_keys, new_root)) = mutations {
            self.apply_removals(&removed_keys, new_root).await?;
        }

        drop(forest_root_write_guard);

        Ok(())
    }

    fn check_if_proof_is_outdated(&self, request: &SubmitProofRequest) -> anyhow::Result<()> {
        let next_challenge_tick = self
            .storage_hub_handler
            .blockchain
            .query_next_challenge_tick_for_provider(request.provider_id);

        if next_challenge_tick != Some(request.tick) {
            warn!(target: LOG_TARGET, "The proof for tick [{:?}] is not the next one to be submitted. Next challenge tick is [{:?}]", request.tick, next_challenge_tick);
            return Err(anyhow!(
                "The proof for tick [{:?}] is not the next one to be submitted.",
                request.tick,
            ));
        }

        Ok(())
    }

    async fn generate_key_proof(
        &self,
        file_key: FileKey,
        seed: RandomnessOutput,
    ) -> anyhow::Result<KeyProof<FileKeyProof>> {
        let metadata = self
            .storage_hub_handler
            .file_storage
            .read()
            .await
            .get_metadata(&file_key)
            .map_err(|e| anyhow!("Error retrieving file metadata: {:?}", e))?
            .ok_or_else(|| anyhow!("File metadata not found for file key {:x}", file_key))?;

        let challenge_count = metadata.chunks_to_check();

        let file_key_challenges = self
            .storage_hub_handler
            .blockchain
            .query_challenges_from_seed(seed, file_key, challenge_count);

        let chunks_count = metadata.chunks_count();
        let chunks_to_prove = file_key_challenges
            .iter()
            .map(|challenge| ChunkId::from_challenge(challenge.as_ref(), chunks_count))
            .collect::<HashSet<_>>();

        let proof = self
            .storage_hub_handler
            .file_storage
            .read()
            .await
            .generate_proof(&file_key, &chunks_to_prove)
            .map_err(|e| anyhow!("File is not in storage, or proof does not exist: {:?}", e))?;

        Ok(KeyProof {
            proof,
            challenge_count,
        })
    }

    /// Remove from the local forest and file storage the file keys that checkpoint challenges
    /// removed on chain.
    async fn apply_removals(&self, removed_keys: &[FileKey], new_root: FileKey) -> anyhow::Result<()> {
        info!(
            target: LOG_TARGET,
            "Applying {} checkpoint challenge removals to the local forest",
            removed_keys.len()
        );

        let fs = self.storage_hub_handler.current_forest().await?;
        let local_root = {
            let mut write_fs = fs.write().await;
            for file_key in removed_keys {
                write_fs.delete_file_key(file_key)?;
            }
            write_fs.root()
        };

        let mut write_file_storage = self.storage_hub_handler.file_storage.write().await;
        for file_key in removed_keys {
            if let Err(e) = write_file_storage.delete_file(file_key) {
                warn!(target: LOG_TARGET, "Failed to delete file {:x} from file storage: {}", file_key, e);
            }
        }
        drop(write_file_storage);

        let onchain_root = self
            .storage_hub_handler
            .blockchain
            .query_bsp_root(self.storage_hub_handler.bsp_id);
        debug!(target: LOG_TARGET, "On-chain forest root after removals: {:?}", onchain_root);

        if local_root != new_root {
            error!(
                target: LOG_TARGET,
                "CRITICAL❗️❗️ Local forest root {:x} does not match the on-chain root {:x} after applying removals",
                local_root,
                new_root
            );
            return Err(anyhow!("Local forest root does not match the on-chain root"));
        }

        Ok(())
    }
}
