//! Read-only queries the off-chain Provider agent runs against the chain state.

use pallet_file_system::{
    IsStorageRequestOpenToVolunteersError, PendingStopStoringRequest,
    QueryConfirmChunksToProveForFileError, QueryFileEarliestVolunteerTickError,
    StorageRequestMetadata,
};
use pallet_payment_streams::{DynamicRatePaymentStream, FixedRatePaymentStream};
use pallet_proofs_dealer::{
    CustomChallenge, GetChallengePeriodError, GetChallengeSeedError, GetCheckpointChallengesError,
};
use shp_file_metadata::ChunkId;
use shp_traits::{ProofSubmittersInterface, ReadBucketsInterface, ReadProvidersInterface};
use shp_types::{
    AccountId, BucketId, FileKey, MerkleHash, ProviderId, RandomnessOutput, StorageDataUnit,
    TickNumber,
};
use sp_runtime::traits::Get;

use crate::{FileSystem, PaymentStreams, ProofsDealer, Providers, Runtime};

pub trait FileSystemApi {
    fn query_earliest_file_volunteer_tick(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<TickNumber, QueryFileEarliestVolunteerTickError>;

    fn is_storage_request_open_to_volunteers(
        file_key: FileKey,
    ) -> Result<bool, IsStorageRequestOpenToVolunteersError>;

    fn query_bsp_confirm_chunks_to_prove_for_file(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<Vec<ChunkId>, QueryConfirmChunksToProveForFileError>;

    fn storage_request(file_key: FileKey) -> Option<StorageRequestMetadata<Runtime>>;

    fn pending_stop_storing_request(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Option<PendingStopStoringRequest<Runtime>>;

    fn query_min_wait_for_stop_storing() -> TickNumber;

    fn query_max_batch_confirm_storage_requests() -> u32;
}

pub trait ProofsDealerApi {
    fn get_current_tick() -> TickNumber;

    fn get_challenge_seed(tick: TickNumber) -> Result<RandomnessOutput, GetChallengeSeedError>;

    fn get_challenge_period(provider_id: ProviderId) -> Result<TickNumber, GetChallengePeriodError>;

    fn get_checkpoint_challenge_period() -> TickNumber;

    fn get_checkpoint_challenges(
        tick: TickNumber,
    ) -> Result<Vec<CustomChallenge>, GetCheckpointChallengesError>;

    fn get_last_checkpoint_challenge_tick() -> TickNumber;

    fn get_last_tick_provider_submitted_proof(provider_id: ProviderId) -> Option<TickNumber>;

    fn get_next_tick_to_submit_proof_for(provider_id: ProviderId) -> Option<TickNumber>;

    fn get_next_deadline_tick(provider_id: ProviderId) -> Option<TickNumber>;

    fn get_slashable_count(provider_id: ProviderId) -> Option<u32>;

    /// The random challenges of `provider_id` for the tick of `seed`.
    fn get_forest_challenges_from_seed(
        seed: RandomnessOutput,
        provider_id: ProviderId,
    ) -> Vec<RandomnessOutput>;

    /// The chunk challenges of a file, derived like the ones checked in a proof.
    fn get_challenges_from_seed(
        seed: RandomnessOutput,
        file_key: FileKey,
        count: u32,
    ) -> Vec<RandomnessOutput>;

    /// The checkpoint challenges `provider_id` has to answer in its next proof.
    fn get_checkpoint_challenges_to_answer(provider_id: ProviderId) -> Vec<CustomChallenge>;
}

pub trait StorageProvidersApi {
    fn get_storage_provider_id(who: &AccountId) -> Option<ProviderId>;

    fn is_bsp(provider_id: ProviderId) -> bool;

    fn get_bsp_root(bsp_id: ProviderId) -> Option<MerkleHash>;

    fn get_bucket_root(bucket_id: BucketId) -> Option<MerkleHash>;

    fn query_available_capacity(provider_id: ProviderId) -> StorageDataUnit;

    fn query_used_capacity(provider_id: ProviderId) -> StorageDataUnit;
}

pub trait PaymentStreamsApi {
    fn get_fixed_rate_payment_stream(
        provider_id: ProviderId,
        user: &AccountId,
    ) -> Option<FixedRatePaymentStream>;

    fn get_dynamic_rate_payment_stream(
        provider_id: ProviderId,
        user: &AccountId,
    ) -> Option<DynamicRatePaymentStream>;

    fn get_users_with_payment_stream_with_provider(provider_id: ProviderId) -> Vec<AccountId>;

    fn is_user_without_funds(user: &AccountId) -> bool;
}

impl FileSystemApi for Runtime {
    fn query_earliest_file_volunteer_tick(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<TickNumber, QueryFileEarliestVolunteerTickError> {
        FileSystem::query_earliest_file_volunteer_tick(bsp_id, file_key)
    }

    fn is_storage_request_open_to_volunteers(
        file_key: FileKey,
    ) -> Result<bool, IsStorageRequestOpenToVolunteersError> {
        FileSystem::is_storage_request_open_to_volunteers(file_key)
    }

    fn query_bsp_confirm_chunks_to_prove_for_file(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<Vec<ChunkId>, QueryConfirmChunksToProveForFileError> {
        FileSystem::query_confirm_chunks_to_prove_for_file(bsp_id, file_key)
    }

    fn storage_request(file_key: FileKey) -> Option<StorageRequestMetadata<Runtime>> {
        FileSystem::storage_request(&file_key)
    }

    fn pending_stop_storing_request(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Option<PendingStopStoringRequest<Runtime>> {
        FileSystem::pending_stop_storing_request(&bsp_id, &file_key)
    }

    fn query_min_wait_for_stop_storing() -> TickNumber {
        <Runtime as pallet_file_system::Config>::MinWaitForStopStoring::get()
    }

    fn query_max_batch_confirm_storage_requests() -> u32 {
        <Runtime as pallet_file_system::Config>::MaxBatchConfirmStorageRequests::get()
    }
}

impl ProofsDealerApi for Runtime {
    fn get_current_tick() -> TickNumber {
        <ProofsDealer as ProofSubmittersInterface>::get_current_tick()
    }

    fn get_challenge_seed(tick: TickNumber) -> Result<RandomnessOutput, GetChallengeSeedError> {
        ProofsDealer::get_challenge_seed(tick)
    }

    fn get_challenge_period(provider_id: ProviderId) -> Result<TickNumber, GetChallengePeriodError> {
        ProofsDealer::get_challenge_period(&provider_id)
    }

    fn get_checkpoint_challenge_period() -> TickNumber {
        <Runtime as pallet_proofs_dealer::Config>::CheckpointChallengePeriod::get()
    }

    fn get_checkpoint_challenges(
        tick: TickNumber,
    ) -> Result<Vec<CustomChallenge>, GetCheckpointChallengesError> {
        ProofsDealer::get_checkpoint_challenges(tick)
    }

    fn get_last_checkpoint_challenge_tick() -> TickNumber {
        ProofsDealer::get_last_checkpoint_challenge_tick()
    }

    fn get_last_tick_provider_submitted_proof(provider_id: ProviderId) -> Option<TickNumber> {
        ProofsDealer::get_last_tick_provider_submitted_proof(&provider_id)
    }

    fn get_next_tick_to_submit_proof_for(provider_id: ProviderId) -> Option<TickNumber> {
        ProofsDealer::get_next_tick_to_submit_proof_for(&provider_id)
    }

    fn get_next_deadline_tick(provider_id: ProviderId) -> Option<TickNumber> {
        ProofsDealer::get_next_deadline_tick(&provider_id)
    }

    fn get_slashable_count(provider_id: ProviderId) -> Option<u32> {
        pallet_proofs_dealer::SlashableProviders::<Runtime>::get(provider_id)
    }

    fn get_forest_challenges_from_seed(
        seed: RandomnessOutput,
        provider_id: ProviderId,
    ) -> Vec<RandomnessOutput> {
        ProofsDealer::generate_challenges_from_seed(
            seed,
            &provider_id,
            <Runtime as pallet_proofs_dealer::Config>::RandomChallengesPerBlock::get(),
        )
    }

    fn get_challenges_from_seed(
        seed: RandomnessOutput,
        file_key: FileKey,
        count: u32,
    ) -> Vec<RandomnessOutput> {
        ProofsDealer::generate_challenges_from_seed(seed, &file_key, count)
    }

    fn get_checkpoint_challenges_to_answer(provider_id: ProviderId) -> Vec<CustomChallenge> {
        let (Some(last_tick_proven), Some(next_tick)) = (
            ProofsDealer::get_last_tick_provider_submitted_proof(&provider_id),
            ProofsDealer::get_next_tick_to_submit_proof_for(&provider_id),
        ) else {
            return Vec::new();
        };

        ProofsDealer::checkpoint_challenges_to_answer(last_tick_proven, next_tick)
    }
}

impl StorageProvidersApi for Runtime {
    fn get_storage_provider_id(who: &AccountId) -> Option<ProviderId> {
        <Providers as ReadProvidersInterface>::get_provider_id(who)
    }

    fn is_bsp(provider_id: ProviderId) -> bool {
        <Providers as ReadProvidersInterface>::is_bsp(&provider_id)
    }

    fn get_bsp_root(bsp_id: ProviderId) -> Option<MerkleHash> {
        <Providers as ReadProvidersInterface>::get_root(&bsp_id)
    }

    fn get_bucket_root(bucket_id: BucketId) -> Option<MerkleHash> {
        <Providers as ReadBucketsInterface>::get_root_bucket(&bucket_id)
    }

    fn query_available_capacity(provider_id: ProviderId) -> StorageDataUnit {
        <Providers as ReadProvidersInterface>::available_capacity(&provider_id)
    }

    fn query_used_capacity(provider_id: ProviderId) -> StorageDataUnit {
        Providers::capacity_of(&provider_id).1
    }
}

impl PaymentStreamsApi for Runtime {
    fn get_fixed_rate_payment_stream(
        provider_id: ProviderId,
        user: &AccountId,
    ) -> Option<FixedRatePaymentStream> {
        PaymentStreams::get_fixed_rate_payment_stream_info(&provider_id, user)
    }

    fn get_dynamic_rate_payment_stream(
        provider_id: ProviderId,
        user: &AccountId,
    ) -> Option<DynamicRatePaymentStream> {
        PaymentStreams::get_dynamic_rate_payment_stream_info(&provider_id, user)
    }

    fn get_users_with_payment_stream_with_provider(provider_id: ProviderId) -> Vec<AccountId> {
        PaymentStreams::get_users_with_payment_stream_with_provider(&provider_id)
    }

    fn is_user_without_funds(user: &AccountId) -> bool {
        PaymentStreams::is_user_without_funds(user)
    }
}
