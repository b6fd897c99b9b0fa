use codec::Encode;
use frame_support::{
    ensure,
    pallet_prelude::DispatchResult,
    traits::{fungible::Mutate, tokens::Preservation, Get},
};
use shp_file_metadata::FileMetadata;
use shp_traits::{
    ChallengeKeyInclusion, CommitmentVerifier, InclusionProofVerifier, MutateProvidersInterface,
    ProofDeltaApplier, ProofSubmittersInterface, ProofsDealerInterface, ReadProvidersInterface,
    TrieMutation, TrieRemoveMutation,
};
use shp_types::{
    Balance, FileKey, Hashing, MerkleHash, ProviderId, RandomnessOutput, TickNumber,
    FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH,
};
use sp_runtime::{
    traits::{Convert, Hash},
    DispatchError,
};
use sp_std::{collections::btree_set::BTreeSet, vec::Vec};

use crate::{pallet::*, types::*, LOG_TARGET};

type FileMetadataFor = FileMetadata<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

impl<T> Pallet<T>
where
    T: Config,
{
    /// Add custom challenge to the challenges queue.
    ///
    /// Check if sender is a registered Provider. If it is not, charge a fee for the challenge.
    /// This is to prevent spamming the network with challenges. If the challenge is already
    /// queued, just return. Otherwise, add the challenge to the queue.
    ///
    /// Failures:
    /// - `ChallengesQueueOverflow`: If the challenges queue is full.
    /// - `FeeChargeFailed`: If the fee transfer to the treasury account fails.
    pub fn do_challenge(who: &T::AccountId, key: &MerkleHash) -> DispatchResult {
        // Check the queue first so that a challenge that can't be queued is never charged.
        let queue = ChallengesQueue::<T>::get();
        if queue.contains(key) {
            return Ok(());
        }
        ensure!(
            (queue.len() as u32) < T::ChallengesQueueLength::get(),
            Error::<T>::ChallengesQueueOverflow
        );

        // Charge a fee for the challenge if the sender is not a Provider.
        if T::ProvidersPallet::get_provider_id(who).is_none() {
            T::NativeBalance::transfer(
                who,
                &T::Treasury::get(),
                T::ChallengesFee::get(),
                Preservation::Expendable,
            )
            .map_err(|_| Error::<T>::FeeChargeFailed)?;
        }

        Self::enqueue_challenge(key)
    }

    /// Validate a proof submitted by `provider_id` and apply its consequences.
    ///
    /// The proof answers the challenges of the tick in the Provider's
    /// `next_tick_to_submit_proof_for`: the random challenges derived from that tick's seed,
    /// and the checkpoint challenges of any checkpoint round the Provider hasn't proven yet.
    ///
    /// Returns the tick that was proven.
    pub fn do_submit_proof(
        provider_id: &ProviderId,
        proof: &ProofFor<T>,
    ) -> Result<TickNumber, DispatchError> {
        // Check that the submitter is a registered Provider.
        ensure!(
            T::ProvidersPallet::is_provider(provider_id),
            Error::<T>::NotProvider
        );

        // Providers without a challenge cycle are not storing anything yet.
        let record = ProviderToProofSubmissionRecord::<T>::get(provider_id)
            .ok_or(Error::<T>::NoRecordOfLastSubmittedProof)?;

        // Get the root of the Provider's forest.
        let root = T::ProvidersPallet::get_root(provider_id)
            .ok_or(Error::<T>::ProviderRootNotFound)?;
        ensure!(
            root != T::ProvidersPallet::get_default_root(),
            Error::<T>::ZeroRoot
        );

        let stake = T::ProvidersPallet::get_stake(provider_id)
            .ok_or(Error::<T>::ProviderStakeNotFound)?;

        // The proof must be submitted within the tolerance window after the tick it proves.
        let current_tick = ChallengesTicker::<T>::get();
        let challenges_tick = record.next_tick_to_submit_proof_for;
        ensure!(
            challenges_tick <= current_tick,
            Error::<T>::ChallengesTickNotReached
        );
        let seed = TickToChallengesSeed::<T>::get(challenges_tick)
            .ok_or(Error::<T>::ChallengesTickTooOld)?;
        ensure!(
            current_tick < challenges_tick.saturating_add(T::ChallengeTicksTolerance::get()),
            Error::<T>::ChallengesTickTooLate
        );

        // Build the challenges for the forest proof.
        let mut challenges = Self::generate_challenges_from_seed(
            seed,
            provider_id,
            T::RandomChallengesPerBlock::get(),
        );
        let checkpoint_challenges =
            Self::checkpoint_challenges_to_answer(record.last_tick_proven, challenges_tick);
        challenges.extend(checkpoint_challenges.iter().map(|challenge| challenge.key));

        let challenges_with_inclusion = challenges
            .iter()
            .map(|challenge| (*challenge, None::<ChallengeKeyInclusion>))
            .collect::<Vec<_>>();

        // Verify the forest proof.
        let forest_keys_proven = T::ForestVerifier::verify_proof_with_inclusion(
            &root,
            &challenges_with_inclusion,
            &proof.forest_proof,
        )
        .map_err(|_| Error::<T>::ForestProofVerificationFailed)?;

        // Every key proven in the forest needs its key proof, and nothing else.
        ensure!(!proof.key_proofs.is_empty(), Error::<T>::EmptyKeyProofs);
        ensure!(
            proof.key_proofs.len() == forest_keys_proven.len(),
            Error::<T>::IncorrectNumberOfKeyProofs
        );

        // Verify each key proof against challenges derived from the same seed and the file key.
        for file_key in forest_keys_proven.iter() {
            let key_proof = proof
                .key_proofs
                .get(file_key)
                .ok_or(Error::<T>::KeyProofNotFound)?;

            let key_challenges =
                Self::generate_challenges_from_seed(seed, file_key, key_proof.challenge_count);

            let proven = T::KeyVerifier::verify_proof(file_key, &key_challenges, &key_proof.proof)
                .map_err(|_| Error::<T>::KeyProofVerificationFailed)?;
            ensure!(
                key_challenges
                    .iter()
                    .all(|challenge| proven.contains(challenge)),
                Error::<T>::KeyProofVerificationFailed
            );
        }

        // Remove from the forest the checkpoint challenges that requested it.
        let mutations = checkpoint_challenges
            .iter()
            .filter(|challenge| {
                challenge.should_remove_key && forest_keys_proven.contains(&challenge.key)
            })
            .map(|challenge| challenge.key)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|key| (key, TrieMutation::from(TrieRemoveMutation::default())))
            .collect::<Vec<_>>();

        let mut new_root = root;
        if !mutations.is_empty() {
            new_root = Self::apply_checkpoint_removals(provider_id, &root, &mutations, proof)?;
        }

        ValidProofSubmittersLastTicks::<T>::mutate(current_tick, |submitters| {
            submitters
                .get_or_insert_with(BTreeSet::new)
                .insert(*provider_id);
        });

        // A Provider whose forest is now empty has nothing left to prove.
        if new_root == T::ProvidersPallet::get_default_root() {
            Self::do_stop_challenge_cycle(provider_id)?;

            log::debug!(
                target: LOG_TARGET,
                "Proof of {:?} for tick {} emptied its forest, challenge cycle stopped",
                provider_id,
                challenges_tick
            );

            return Ok(challenges_tick);
        }

        // Move the Provider's challenge cycle forward.
        let period = Self::stake_to_challenge_period(stake);
        let next_tick_to_submit_proof_for = challenges_tick.saturating_add(period);
        Self::move_deadline(
            provider_id,
            record.next_tick_to_submit_proof_for,
            next_tick_to_submit_proof_for,
        );

        ProviderToProofSubmissionRecord::<T>::insert(
            provider_id,
            ProofSubmissionRecord {
                last_tick_proven: challenges_tick,
                next_tick_to_submit_proof_for,
            },
        );

        log::debug!(
            target: LOG_TARGET,
            "Proof of {:?} for tick {} accepted, next one due for tick {}",
            provider_id,
            challenges_tick,
            next_tick_to_submit_proof_for
        );

        Ok(challenges_tick)
    }

    /// Generate and store the challenge seed of `tick`, chaining it to the seed of the previous
    /// tick, and prune the seed that fell out of the history.
    pub fn do_new_challenge_seed(tick: TickNumber) {
        let previous_seed =
            TickToChallengesSeed::<T>::get(tick.saturating_sub(1)).unwrap_or_default();
        let seed = Hashing::hash(&(previous_seed, tick).encode());

        TickToChallengesSeed::<T>::insert(tick, seed);

        let history_length = T::ChallengeHistoryLength::get();
        if tick > history_length {
            TickToChallengesSeed::<T>::remove(tick - history_length - 1);
        }

        Self::deposit_event(Event::<T>::NewChallengeSeed {
            challenges_ticker: tick,
            seed,
        });
    }

    /// Include up to `MaxCustomChallengesPerBlock` queued challenges in a new checkpoint round,
    /// priority challenges first.
    pub fn do_new_checkpoint_challenge(tick: TickNumber) {
        let max_challenges = T::MaxCustomChallengesPerBlock::get() as usize;

        let mut challenges: Vec<CustomChallenge> = PriorityChallengesQueue::<T>::mutate(|queue| {
            let from_priority = max_challenges.min(queue.len());
            queue.drain(..from_priority).collect()
        });

        ChallengesQueue::<T>::mutate(|queue| {
            let from_regular = (max_challenges - challenges.len()).min(queue.len());
            challenges.extend(queue.drain(..from_regular).map(|key| CustomChallenge {
                key,
                should_remove_key: false,
            }));
        });

        TickToCheckpointChallenges::<T>::insert(tick, challenges.clone());
        LastCheckpointTick::<T>::set(tick);

        // Checkpoints are sparse, so every one older than the history is looked for.
        let history_start = tick.saturating_sub(T::ChallengeHistoryLength::get());
        let stale = TickToCheckpointChallenges::<T>::iter_keys()
            .filter(|checkpoint_tick| *checkpoint_tick < history_start)
            .collect::<Vec<_>>();
        for checkpoint_tick in stale {
            TickToCheckpointChallenges::<T>::remove(checkpoint_tick);
        }

        log::debug!(
            target: LOG_TARGET,
            "Checkpoint at tick {} with {} custom challenges",
            tick,
            challenges.len()
        );

        Self::deposit_event(Event::<T>::NewCheckpointChallenge {
            challenges_ticker: tick,
            challenges,
        });
    }

    /// Mark as slashable every Provider whose deadline is `tick`, and move its challenge cycle
    /// one period forward as if it had proven the tick it missed.
    pub fn do_check_slashable_providers(tick: TickNumber) {
        let providers = TickToProvidersDeadlines::<T>::drain_prefix(tick)
            .map(|(provider, _)| provider)
            .collect::<Vec<_>>();

        for provider in providers {
            // Providers that left the registry are no longer challenged.
            let Some(stake) = T::ProvidersPallet::get_stake(&provider) else {
                ProviderToProofSubmissionRecord::<T>::remove(&provider);
                continue;
            };

            let Some(mut record) = ProviderToProofSubmissionRecord::<T>::get(&provider) else {
                log::warn!(
                    target: LOG_TARGET,
                    "Provider {:?} had a deadline but no submission record",
                    provider
                );
                continue;
            };

            SlashableProviders::<T>::mutate(&provider, |accrued| {
                *accrued = Some(accrued.unwrap_or_default().saturating_add(1))
            });

            // Checkpoints up to the missed tick are accounted for by the slash, so the next
            // proof only answers the ones after it.
            let period = Self::stake_to_challenge_period(stake);
            record.last_tick_proven = record.next_tick_to_submit_proof_for;
            record.next_tick_to_submit_proof_for =
                record.next_tick_to_submit_proof_for.saturating_add(period);
            ProviderToProofSubmissionRecord::<T>::insert(&provider, record);

            let next_challenge_deadline = record
                .next_tick_to_submit_proof_for
                .saturating_add(T::ChallengeTicksTolerance::get());
            TickToProvidersDeadlines::<T>::insert(next_challenge_deadline, provider, ());

            log::info!(
                target: LOG_TARGET,
                "Provider {:?} missed its deadline at tick {} and is now slashable",
                provider,
                tick
            );

            Self::deposit_event(Event::<T>::SlashableProvider {
                provider,
                next_challenge_deadline,
            });
        }

        let history_length = T::ChallengeHistoryLength::get();
        if tick > history_length {
            ValidProofSubmittersLastTicks::<T>::remove(tick - history_length - 1);
        }
    }

    /// Start, or restart, the challenge cycle of `provider_id` from the current tick.
    ///
    /// The Provider will have to submit its first proof for the tick one challenge period away.
    pub fn do_initialise_challenge_cycle(provider_id: &ProviderId) -> DispatchResult {
        ensure!(
            T::ProvidersPallet::is_provider(provider_id),
            Error::<T>::NotProvider
        );
        let stake = T::ProvidersPallet::get_stake(provider_id)
            .ok_or(Error::<T>::ProviderStakeNotFound)?;

        let current_tick = ChallengesTicker::<T>::get();
        let next_tick_to_submit_proof_for =
            current_tick.saturating_add(Self::stake_to_challenge_period(stake));

        if let Some(record) = ProviderToProofSubmissionRecord::<T>::get(provider_id) {
            Self::remove_deadline(provider_id, record.next_tick_to_submit_proof_for);
        }

        let next_challenge_deadline =
            next_tick_to_submit_proof_for.saturating_add(T::ChallengeTicksTolerance::get());
        ProviderToProofSubmissionRecord::<T>::insert(
            provider_id,
            ProofSubmissionRecord {
                last_tick_proven: current_tick,
                next_tick_to_submit_proof_for,
            },
        );
        TickToProvidersDeadlines::<T>::insert(next_challenge_deadline, provider_id, ());

        Self::deposit_event(Event::<T>::NewChallengeCycleInitialised {
            current_tick,
            next_challenge_deadline,
            provider: *provider_id,
        });

        Ok(())
    }

    /// Stop challenging `provider_id`. Its pending deadline is dropped.
    pub fn do_stop_challenge_cycle(provider_id: &ProviderId) -> DispatchResult {
        if let Some(record) = ProviderToProofSubmissionRecord::<T>::take(provider_id) {
            Self::remove_deadline(provider_id, record.next_tick_to_submit_proof_for);
            log::debug!(target: LOG_TARGET, "Stopped challenge cycle of {:?}", provider_id);
        }

        Ok(())
    }

    /// Add a challenge to the regular queue, ignoring duplicates.
    pub fn enqueue_challenge(key: &MerkleHash) -> DispatchResult {
        ChallengesQueue::<T>::try_mutate(|queue| {
            // Check if challenge is already queued. If it is, just return.
            if queue.contains(key) {
                return Ok(());
            }

            ensure!(
                (queue.len() as u32) < T::ChallengesQueueLength::get(),
                Error::<T>::ChallengesQueueOverflow
            );
            queue.push(*key);

            Ok(())
        })
    }

    /// Add a challenge to the priority queue, ignoring duplicates of the same key.
    pub fn enqueue_challenge_with_priority(
        key: &MerkleHash,
        should_remove_key: bool,
    ) -> DispatchResult {
        PriorityChallengesQueue::<T>::try_mutate(|queue| {
            // Check if challenge is already queued. If it is, just return.
            if queue.iter().any(|challenge| challenge.key == *key) {
                return Ok(());
            }

            ensure!(
                (queue.len() as u32) < T::ChallengesQueueLength::get(),
                Error::<T>::PriorityChallengesQueueOverflow
            );
            queue.push(CustomChallenge {
                key: *key,
                should_remove_key,
            });

            Ok(())
        })
    }

    /// Deterministically derive `count` challenges for `provider_id` from `seed`.
    ///
    /// Each challenge is the hash of the seed, the Provider (or file key) and the challenge index.
    pub fn generate_challenges_from_seed(
        seed: RandomnessOutput,
        provider_id: &ProviderId,
        count: u32,
    ) -> Vec<RandomnessOutput> {
        (0..count)
            .map(|i| Hashing::hash(&(seed, provider_id, i).encode()))
            .collect()
    }

    /// Number of ticks between two proofs of a Provider with `stake`. Never zero.
    pub fn stake_to_challenge_period(stake: Balance) -> TickNumber {
        T::StakeToChallengePeriod::convert(stake).max(1)
    }

    /// The challenge seed of `tick`, if it is still in the history.
    pub fn get_challenge_seed(tick: TickNumber) -> Result<RandomnessOutput, GetChallengeSeedError> {
        if tick > ChallengesTicker::<T>::get() {
            return Err(GetChallengeSeedError::TickIsInTheFuture);
        }

        TickToChallengesSeed::<T>::get(tick).ok_or(GetChallengeSeedError::TickBeyondLastSeedStored)
    }

    pub fn get_checkpoint_challenges(
        tick: TickNumber,
    ) -> Result<Vec<CustomChallenge>, GetCheckpointChallengesError> {
        if tick > LastCheckpointTick::<T>::get() {
            return Err(GetCheckpointChallengesError::TickGreaterThanLastCheckpointTick);
        }

        TickToCheckpointChallenges::<T>::get(tick)
            .ok_or(GetCheckpointChallengesError::NoCheckpointChallengesInTick)
    }

    pub fn get_last_checkpoint_challenge_tick() -> TickNumber {
        LastCheckpointTick::<T>::get()
    }

    pub fn get_last_tick_provider_submitted_proof(provider_id: &ProviderId) -> Option<TickNumber> {
        ProviderToProofSubmissionRecord::<T>::get(provider_id).map(|record| record.last_tick_proven)
    }

    pub fn get_next_tick_to_submit_proof_for(provider_id: &ProviderId) -> Option<TickNumber> {
        ProviderToProofSubmissionRecord::<T>::get(provider_id)
            .map(|record| record.next_tick_to_submit_proof_for)
    }

    /// The last tick at which `provider_id` can still submit its next proof.
    pub fn get_next_deadline_tick(provider_id: &ProviderId) -> Option<TickNumber> {
        Self::get_next_tick_to_submit_proof_for(provider_id)
            .map(|tick| tick.saturating_add(T::ChallengeTicksTolerance::get()))
    }

    pub fn get_challenge_period(
        provider_id: &ProviderId,
    ) -> Result<TickNumber, GetChallengePeriodError> {
        let stake = T::ProvidersPallet::get_stake(provider_id)
            .ok_or(GetChallengePeriodError::ProviderNotRegistered)?;

        Ok(Self::stake_to_challenge_period(stake))
    }

    /// The challenges of every checkpoint in `(last_tick_proven, challenges_tick]`, oldest first.
    pub fn checkpoint_challenges_to_answer(
        last_tick_proven: TickNumber,
        challenges_tick: TickNumber,
    ) -> Vec<CustomChallenge> {
        if last_tick_proven >= challenges_tick {
            return Vec::new();
        }

        let mut checkpoints = TickToCheckpointChallenges::<T>::iter()
            .filter(|(tick, _)| *tick > last_tick_proven && *tick <= challenges_tick)
            .collect::<Vec<_>>();
        checkpoints.sort_by_key(|(tick, _)| *tick);

        checkpoints
            .into_iter()
            .flat_map(|(_, challenges)| challenges)
            .collect()
    }

    /// Apply the removals requested by checkpoint challenges, returning the Provider's new root.
    fn apply_checkpoint_removals(
        provider_id: &ProviderId,
        root: &MerkleHash,
        mutations: &[(MerkleHash, TrieMutation)],
        proof: &ProofFor<T>,
    ) -> Result<MerkleHash, DispatchError> {
        let (_, new_root, old_values) =
            T::ForestVerifier::apply_delta(root, mutations, &proof.forest_proof)
                .map_err(|_| Error::<T>::FailedToApplyDelta)?;

        // Free the capacity the removed files were using.
        for (file_key, old_value) in old_values.iter() {
            let Some(old_value) = old_value else {
                continue;
            };
            let size = match FileMetadataFor::decode_leaf(old_value) {
                Ok(metadata) => metadata.file_size(),
                Err(e) => {
                    log::warn!(
                        target: LOG_TARGET,
                        "Removed key {:?} does not hold file metadata: {:?}",
                        file_key,
                        e
                    );
                    continue;
                }
            };
            if let Err(e) = T::ProvidersPallet::decrease_capacity_used(provider_id, size) {
                log::warn!(
                    target: LOG_TARGET,
                    "Failed to decrease capacity used by {:?}: {:?}",
                    provider_id,
                    e
                );
            }
        }

        T::ProvidersPallet::update_root(provider_id, new_root)?;

        Self::deposit_event(Event::<T>::MutationsAppliedForProvider {
            provider_id: *provider_id,
            removed_keys: mutations.iter().map(|(key, _)| *key).collect(),
            old_root: *root,
            new_root,
        });

        Ok(new_root)
    }

    fn move_deadline(
        provider_id: &ProviderId,
        old_tick_to_prove: TickNumber,
        new_tick_to_prove: TickNumber,
    ) {
        Self::remove_deadline(provider_id, old_tick_to_prove);

        let tolerance = T::ChallengeTicksTolerance::get();
        TickToProvidersDeadlines::<T>::insert(
            new_tick_to_prove.saturating_add(tolerance),
            provider_id,
            (),
        );
    }

    fn remove_deadline(provider_id: &ProviderId, tick_to_prove: TickNumber) {
        let deadline = tick_to_prove.saturating_add(T::ChallengeTicksTolerance::get());
        TickToProvidersDeadlines::<T>::remove(deadline, provider_id);
    }
}

impl<T: Config> ProofsDealerInterface for Pallet<T> {
    type ForestProof = ForestProof;
    type KeyProof = KeyVerifierProofFor<T>;

    fn verify_forest_proof(
        provider_id: &ProviderId,
        challenges: &[(MerkleHash, Option<ChallengeKeyInclusion>)],
        proof: &Self::ForestProof,
    ) -> Result<BTreeSet<MerkleHash>, DispatchError> {
        let root = T::ProvidersPallet::get_root(provider_id)
            .ok_or(Error::<T>::ProviderRootNotFound)?;

        Self::verify_generic_forest_proof(&root, challenges, proof)
    }

    fn verify_generic_forest_proof(
        root: &MerkleHash,
        challenges: &[(MerkleHash, Option<ChallengeKeyInclusion>)],
        proof: &Self::ForestProof,
    ) -> Result<BTreeSet<MerkleHash>, DispatchError> {
        T::ForestVerifier::verify_proof_with_inclusion(root, challenges, proof)
            .map_err(|_| Error::<T>::ForestProofVerificationFailed.into())
    }

    fn verify_key_proof(
        file_key: &FileKey,
        challenges: &[RandomnessOutput],
        proof: &Self::KeyProof,
    ) -> Result<BTreeSet<RandomnessOutput>, DispatchError> {
        T::KeyVerifier::verify_proof(file_key, challenges, proof)
            .map_err(|_| Error::<T>::KeyProofVerificationFailed.into())
    }

    fn generate_challenges_from_seed(
        seed: RandomnessOutput,
        provider_id: &ProviderId,
        count: u32,
    ) -> Vec<RandomnessOutput> {
        Pallet::<T>::generate_challenges_from_seed(seed, provider_id, count)
    }

    fn apply_delta(
        provider_id: &ProviderId,
        mutations: &[(MerkleHash, TrieMutation)],
        proof: &Self::ForestProof,
    ) -> Result<MerkleHash, DispatchError> {
        let root = T::ProvidersPallet::get_root(provider_id)
            .ok_or(Error::<T>::ProviderRootNotFound)?;

        Self::generic_apply_delta(&root, mutations, proof)
    }

    fn generic_apply_delta(
        root: &MerkleHash,
        mutations: &[(MerkleHash, TrieMutation)],
        proof: &Self::ForestProof,
    ) -> Result<MerkleHash, DispatchError> {
        let (_, new_root, _) = T::ForestVerifier::apply_delta(root, mutations, proof)
            .map_err(|_| Error::<T>::FailedToApplyDelta)?;

        Ok(new_root)
    }

    fn challenge(key: &MerkleHash) -> DispatchResult {
        Self::enqueue_challenge(key)
    }

    fn challenge_with_priority(key: &MerkleHash, should_remove_key: bool) -> DispatchResult {
        Self::enqueue_challenge_with_priority(key, should_remove_key)
    }

    fn initialise_challenge_cycle(provider_id: &ProviderId) -> DispatchResult {
        Self::do_initialise_challenge_cycle(provider_id)
    }

    fn stop_challenge_cycle(provider_id: &ProviderId) -> DispatchResult {
        Self::do_stop_challenge_cycle(provider_id)
    }
}

impl<T: Config> ProofSubmittersInterface for Pallet<T> {
    fn get_current_tick() -> TickNumber {
        ChallengesTicker::<T>::get()
    }

    fn get_proof_submitters_for_tick(tick: &TickNumber) -> Option<BTreeSet<ProviderId>> {
        ValidProofSubmittersLastTicks::<T>::get(tick)
    }

    fn get_accrued_failed_proof_submissions(provider_id: &ProviderId) -> Option<u32> {
        SlashableProviders::<T>::get(provider_id)
    }

    fn clear_accrued_failed_proof_submissions(provider_id: &ProviderId) {
        SlashableProviders::<T>::remove(provider_id);
    }
}
