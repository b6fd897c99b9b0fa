pub mod runtime_params;

use frame_support::{
    derive_impl,
    dispatch::DispatchClass,
    parameter_types,
    traits::{
        tokens::imbalance::ResolveTo, ConstU128, ConstU32, ConstU64, ConstU8, VariantCountOf,
    },
    weights::constants::{BlockExecutionWeight, ExtrinsicBaseWeight, RocksDbWeight},
};
use frame_system::limits::{BlockLength, BlockWeights};
use pallet_transaction_payment::{ConstFeeMultiplier, FungibleAdapter, Multiplier};
use runtime_params::*;
use shp_file_key_verifier::FileKeyVerifier;
use shp_forest_verifier::ForestVerifier;
use shp_types::{StorageProofsMerkleTrieLayout, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH};
use sp_runtime::{traits::IdentityLookup, FixedPointNumber};
use sp_weights::IdentityFee;

use crate::{
    AccountId, Balance, Balances, Block, Hash, Nonce, PalletInfo, PaymentStreams,
    ProofsDealer, Providers, Runtime, RuntimeCall, RuntimeEvent, RuntimeFreezeReason,
    RuntimeHoldReason, RuntimeOrigin, RuntimeTask, System, AVERAGE_ON_INITIALIZE_RATIO,
    EXISTENTIAL_DEPOSIT, MAXIMUM_BLOCK_WEIGHT, NORMAL_DISPATCH_RATIO,
};

parameter_types! {
    pub const BlockHashCount: u32 = 4096;

    pub RuntimeBlockLength: BlockLength =
        BlockLength::max_with_normal_ratio(5 * 1024 * 1024, NORMAL_DISPATCH_RATIO);
    pub RuntimeBlockWeights: BlockWeights = BlockWeights::builder()
        .base_block(BlockExecutionWeight::get())
        .for_class(DispatchClass::all(), |weights| {
            weights.base_extrinsic = ExtrinsicBaseWeight::get();
        })
        .for_class(DispatchClass::Normal, |weights| {
            weights.max_total = Some(NORMAL_DISPATCH_RATIO * MAXIMUM_BLOCK_WEIGHT);
        })
        .for_class(DispatchClass::Operational, |weights| {
            weights.max_total = Some(MAXIMUM_BLOCK_WEIGHT);
            // Operational transactions have some extra reserved space, so that they
            // are included even if block reached `MAXIMUM_BLOCK_WEIGHT`.
            weights.reserved = Some(
                MAXIMUM_BLOCK_WEIGHT - NORMAL_DISPATCH_RATIO * MAXIMUM_BLOCK_WEIGHT
            );
        })
        .avg_block_initialization(AVERAGE_ON_INITIALIZE_RATIO)
        .build_or_panic();
    pub const SS58Prefix: u16 = 42;
}

/// The default types are being injected by [`derive_impl`](`frame_support::derive_impl`) from
/// [`SoloChainDefaultConfig`](`struct@frame_system::config_preludes::SolochainDefaultConfig`),
/// but overridden as needed.
#[derive_impl(frame_system::config_preludes::SolochainDefaultConfig)]
impl frame_system::Config for Runtime {
    /// The block type for the runtime.
    type Block = Block;
    /// Block & extrinsics weights: base values and limits.
    type BlockWeights = RuntimeBlockWeights;
    /// The maximum length of a block (in bytes).
    type BlockLength = RuntimeBlockLength;
    /// The identifier used to distinguish between accounts.
    type AccountId = AccountId;
    /// The lookup mechanism to get account ID from whatever is passed in dispatchers.
    type Lookup = IdentityLookup<AccountId>;
    /// The type for storing how many extrinsics an account has signed.
    type Nonce = Nonce;
    /// The type for hashing blocks and tries.
    type Hash = Hash;
    /// Maximum number of block number to block hash mappings to keep (oldest pruned first).
    type BlockHashCount = BlockHashCount;
    /// The weight of database operations that the runtime can invoke.
    type DbWeight = RocksDbWeight;
    /// The data to be stored in an account.
    type AccountData = pallet_balances::AccountData<Balance>;
    /// This is used as an identifier of the chain. 42 is the generic substrate prefix.
    type SS58Prefix = SS58Prefix;
    type MaxConsumers = ConstU32<16>;
    type SystemWeightInfo = ();
}

impl pallet_balances::Config for Runtime {
    type MaxLocks = ConstU32<50>;
    type MaxReserves = ();
    type ReserveIdentifier = [u8; 8];
    /// The type for recording an account's balance.
    type Balance = Balance;
    /// The ubiquitous event type.
    type RuntimeEvent = RuntimeEvent;
    type DustRemoval = ();
    type ExistentialDeposit = ConstU128<EXISTENTIAL_DEPOSIT>;
    type AccountStore = System;
    type WeightInfo = ();
    type FreezeIdentifier = RuntimeFreezeReason;
    type MaxFreezes = VariantCountOf<RuntimeFreezeReason>;
    type RuntimeHoldReason = RuntimeHoldReason;
    type RuntimeFreezeReason = RuntimeFreezeReason;
    type DoneSlashHandler = ();
}

parameter_types! {
    pub FeeMultiplier: Multiplier = Multiplier::one();
}

impl pallet_transaction_payment::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type OnChargeTransaction = FungibleAdapter<Balances, ResolveTo<TreasuryAccount, Balances>>;
    type OperationalFeeMultiplier = ConstU8<5>;
    type WeightToFee = IdentityFee<Balance>;
    type LengthToFee = IdentityFee<Balance>;
    type FeeMultiplierUpdate = ConstFeeMultiplier<FeeMultiplier>;
    type WeightInfo = ();
}

impl pallet_sudo::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type RuntimeCall = RuntimeCall;
    type WeightInfo = ();
}

impl pallet_storage_providers::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProofDealer = ProofsDealer;
    type SpMinDeposit = ConstU128<SP_MIN_DEPOSIT>;
    type SpMinCapacity = ConstU64<SP_MIN_CAPACITY>;
    type MaxMultiAddressAmount = ConstU32<MAX_MULTI_ADDRESS_AMOUNT>;
    type MaxBuckets = ConstU32<MAX_BUCKETS_PER_MSP>;
    type SlashAmountPerMissedProof = ConstU128<SLASH_AMOUNT_PER_MISSED_PROOF>;
    type Treasury = TreasuryAccount;
}

impl pallet_proofs_dealer::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type ProvidersPallet = Providers;
    type NativeBalance = Balances;
    type ForestVerifier = ForestVerifier<StorageProofsMerkleTrieLayout, H_LENGTH>;
    type KeyProof = pallet_file_system::FileKeyProof;
    type KeyVerifier = FileKeyVerifier<
        StorageProofsMerkleTrieLayout,
        H_LENGTH,
        FILE_CHUNK_SIZE,
        FILE_SIZE_TO_CHALLENGES,
    >;
    type StakeToChallengePeriod = StakeToChallengePeriod;
    type RandomChallengesPerBlock = ConstU32<RANDOM_CHALLENGES_PER_BLOCK>;
    type MaxCustomChallengesPerBlock = ConstU32<MAX_CUSTOM_CHALLENGES_PER_BLOCK>;
    type ChallengesQueueLength = ConstU32<CHALLENGES_QUEUE_LENGTH>;
    type CheckpointChallengePeriod = ConstU32<CHECKPOINT_CHALLENGE_PERIOD>;
    type ChallengeHistoryLength = ConstU32<CHALLENGE_HISTORY_LENGTH>;
    type ChallengeTicksTolerance = ConstU32<CHALLENGE_TICKS_TOLERANCE>;
    type ChallengesFee = ConstU128<CHALLENGES_FEE>;
    type Treasury = TreasuryAccount;
}

impl pallet_payment_streams::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProvidersPallet = Providers;
    type ProofSubmitters = ProofsDealer;
    type NewStreamDeposit = ConstU32<NEW_STREAM_DEPOSIT>;
    type CurrentPricePerUnitPerTick = ConstU128<PRICE_PER_UNIT_PER_TICK>;
}

impl pallet_file_system::Config for Runtime {
    type RuntimeEvent = RuntimeEvent;
    type Providers = Providers;
    type ProofDealer = ProofsDealer;
    type PaymentStreams = PaymentStreams;
    type UserSolvency = PaymentStreams;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type StakeToThresholdStart = StakeToThresholdStart;
    type TickRangeToMaximumThreshold = ConstU32<TICK_RANGE_TO_MAXIMUM_THRESHOLD>;
    type DefaultReplicationTarget = ConstU32<DEFAULT_REPLICATION_TARGET>;
    type MaxReplicationTarget = ConstU32<MAX_REPLICATION_TARGET>;
    type StorageRequestTtl = ConstU32<STORAGE_REQUEST_TTL>;
    type MaxExpiredItemsInBlock = ConstU32<MAX_EXPIRED_ITEMS_IN_BLOCK>;
    type MinWaitForStopStoring = ConstU32<MIN_WAIT_FOR_STOP_STORING>;
    type StorageRequestCreationDeposit = ConstU128<STORAGE_REQUEST_CREATION_DEPOSIT>;
    type BspStopStoringFilePenalty = ConstU128<BSP_STOP_STORING_FILE_PENALTY>;
    type BucketFixedRate = ConstU128<BUCKET_FIXED_RATE>;
    type MaxFilePathSize = ConstU32<MAX_FILE_PATH_SIZE>;
    type MaxNumberOfPeerIds = ConstU32<MAX_NUMBER_OF_PEER_IDS>;
    type MaxBatchConfirmStorageRequests = ConstU32<MAX_BATCH_CONFIRM_STORAGE_REQUESTS>;
    type Treasury = TreasuryAccount;
}
