use crate as pallet_file_system;
use frame_support::{
    assert_ok, derive_impl, parameter_types,
    traits::{
        ConstU128, ConstU32, ConstU64, Everything, OnFinalize, OnIdle, OnInitialize, OnPoll,
    },
    weights::{constants::RocksDbWeight, Weight, WeightMeter},
};
use frame_system as system;
use shp_file_key_verifier::FileKeyVerifier;
use shp_forest_verifier::ForestVerifier;
use shp_types::{
    AccountId, Balance, ProviderId, StorageProofsMerkleTrieLayout, ThresholdType, TickNumber,
    FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH,
};
use sp_core::H256;
use sp_runtime::{
    traits::{BlakeTwo256, Convert, IdentityLookup},
    BuildStorage,
};

type Block = frame_system::mocking::MockBlock<Test>;

pub const ALICE: AccountId = AccountId::new([1u8; 32]);
pub const BOB: AccountId = AccountId::new([2u8; 32]);
pub const CHARLIE: AccountId = AccountId::new([3u8; 32]);
pub const DAVE: AccountId = AccountId::new([4u8; 32]);
pub const EVE: AccountId = AccountId::new([5u8; 32]);
pub const FERDIE: AccountId = AccountId::new([6u8; 32]);
pub const TREASURY: AccountId = AccountId::new([99u8; 32]);

/// Operated by `BOB`.
pub const MSP_ID: ProviderId = H256([20u8; 32]);
/// Operated by `CHARLIE`, with enough stake to volunteer straight away.
pub const BSP_1: ProviderId = H256([21u8; 32]);
/// Operated by `DAVE`, with enough stake to volunteer straight away.
pub const BSP_2: ProviderId = H256([22u8; 32]);
/// Operated by `EVE`, with the minimum stake.
pub const BSP_3: ProviderId = H256([23u8; 32]);

pub const INITIAL_BALANCE: Balance = 1_000_000;
pub const MIN_STAKE: Balance = 100;
pub const HIGH_STAKE: Balance = 1_000;
pub const PROVIDER_CAPACITY: u64 = 100_000;

pub const STORAGE_REQUEST_TTL: TickNumber = 50;
pub const TICK_RANGE_TO_MAXIMUM_THRESHOLD: TickNumber = 20;
pub const MAX_EXPIRED_ITEMS_IN_BLOCK: u32 = 2;
pub const MIN_WAIT_FOR_STOP_STORING: TickNumber = 5;
pub const STORAGE_REQUEST_DEPOSIT: Balance = 10;
pub const STOP_STORING_PENALTY: Balance = 50;
pub const BUCKET_FIXED_RATE: Balance = 2;
pub const MAX_BATCH_CONFIRM: u32 = 5;
pub const CHALLENGE_PERIOD: TickNumber = 1_000;

// Configure a mock runtime to test the pallet.
#[frame_support::runtime]
mod test_runtime {
    #[runtime::runtime]
    #[runtime::derive(
        RuntimeCall,
        RuntimeEvent,
        RuntimeError,
        RuntimeOrigin,
        RuntimeFreezeReason,
        RuntimeHoldReason,
        RuntimeSlashReason,
        RuntimeLockId,
        RuntimeTask
    )]
    pub struct Test;

    #[runtime::pallet_index(0)]
    pub type System = frame_system;
    #[runtime::pallet_index(1)]
    pub type Balances = pallet_balances;
    #[runtime::pallet_index(2)]
    pub type StorageProviders = pallet_storage_providers;
    #[runtime::pallet_index(3)]
    pub type ProofsDealer = pallet_proofs_dealer;
    #[runtime::pallet_index(4)]
    pub type PaymentStreams = pallet_payment_streams;
    #[runtime::pallet_index(5)]
    pub type FileSystem = crate;
}

parameter_types! {
    pub const SS58Prefix: u8 = 42;
    pub const TreasuryAccount: AccountId = TREASURY;
}

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl system::Config for Test {
    type BaseCallFilter = Everything;
    type BlockWeights = ();
    type BlockLength = ();
    type DbWeight = RocksDbWeight;
    type RuntimeOrigin = RuntimeOrigin;
    type RuntimeCall = RuntimeCall;
    type Nonce = u64;
    type Hash = H256;
    type Hashing = BlakeTwo256;
    type AccountId = AccountId;
    type Lookup = IdentityLookup<Self::AccountId>;
    type Block = Block;
    type RuntimeEvent = RuntimeEvent;
    type Version = ();
    type PalletInfo = PalletInfo;
    type AccountData = pallet_balances::AccountData<Balance>;
    type OnNewAccount = ();
    type OnKilledAccount = ();
    type SystemWeightInfo = ();
    type SS58Prefix = SS58Prefix;
    type OnSetCode = ();
    type MaxConsumers = ConstU32<16>;
}

impl pallet_balances::Config for Test {
    type Balance = Balance;
    type DustRemoval = ();
    type RuntimeEvent = RuntimeEvent;
    type ExistentialDeposit = ConstU128<1>;
    type AccountStore = System;
    type WeightInfo = ();
    type MaxLocks = ConstU32<10>;
    type MaxReserves = ();
    type ReserveIdentifier = [u8; 8];
    type RuntimeHoldReason = RuntimeHoldReason;
    type RuntimeFreezeReason = ();
    type FreezeIdentifier = ();
    type MaxFreezes = ConstU32<10>;
    type DoneSlashHandler = ();
}

impl pallet_storage_providers::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProofDealer = ProofsDealer;
    type SpMinDeposit = ConstU128<MIN_STAKE>;
    type SpMinCapacity = ConstU64<2>;
    type MaxMultiAddressAmount = ConstU32<5>;
    type MaxBuckets = ConstU32<5>;
    type SlashAmountPerMissedProof = ConstU128<30>;
    type Treasury = TreasuryAccount;
}

/// Long enough for no BSP to miss a proof while a test runs.
pub struct StakeToChallengePeriod;
impl Convert<Balance, TickNumber> for StakeToChallengePeriod {
    fn convert(_stake: Balance) -> TickNumber {
        CHALLENGE_PERIOD
    }
}

impl pallet_proofs_dealer::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type ProvidersPallet = StorageProviders;
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
    type RandomChallengesPerBlock = ConstU32<4>;
    type MaxCustomChallengesPerBlock = ConstU32<2>;
    type ChallengesQueueLength = ConstU32<3>;
    type CheckpointChallengePeriod = ConstU32<CHALLENGE_PERIOD>;
    type ChallengeHistoryLength = ConstU32<30>;
    type ChallengeTicksTolerance = ConstU32<5>;
    type ChallengesFee = ConstU128<10>;
    type Treasury = TreasuryAccount;
}

impl pallet_payment_streams::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProvidersPallet = StorageProviders;
    type ProofSubmitters = ProofsDealer;
    type NewStreamDeposit = ConstU32<1>;
    type CurrentPricePerUnitPerTick = ConstU128<1>;
}

/// BSPs with at least `HIGH_STAKE` can volunteer for any file as soon as it is requested. The
/// threshold of the rest starts at zero and grows over `TICK_RANGE_TO_MAXIMUM_THRESHOLD` ticks.
pub struct StakeToThresholdStart;
impl Convert<Balance, ThresholdType> for StakeToThresholdStart {
    fn convert(stake: Balance) -> ThresholdType {
        if stake >= HIGH_STAKE {
            ThresholdType::MAX
        } else {
            0
        }
    }
}

impl pallet_file_system::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type Providers = StorageProviders;
    type ProofDealer = ProofsDealer;
    type PaymentStreams = PaymentStreams;
    type UserSolvency = PaymentStreams;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type StakeToThresholdStart = StakeToThresholdStart;
    type TickRangeToMaximumThreshold = ConstU32<TICK_RANGE_TO_MAXIMUM_THRESHOLD>;
    type DefaultReplicationTarget = ConstU32<1>;
    type MaxReplicationTarget = ConstU32<5>;
    type StorageRequestTtl = ConstU32<STORAGE_REQUEST_TTL>;
    type MaxExpiredItemsInBlock = ConstU32<MAX_EXPIRED_ITEMS_IN_BLOCK>;
    type MinWaitForStopStoring = ConstU32<MIN_WAIT_FOR_STOP_STORING>;
    type StorageRequestCreationDeposit = ConstU128<STORAGE_REQUEST_DEPOSIT>;
    type BspStopStoringFilePenalty = ConstU128<STOP_STORING_PENALTY>;
    type BucketFixedRate = ConstU128<BUCKET_FIXED_RATE>;
    type MaxFilePathSize = ConstU32<64>;
    type MaxNumberOfPeerIds = ConstU32<2>;
    type MaxBatchConfirmStorageRequests = ConstU32<MAX_BATCH_CONFIRM>;
    type Treasury = TreasuryAccount;
}

pub fn multiaddresses() -> Vec<Vec<u8>> {
    vec![b"/ip4/127.0.0.1/udp/1234".to_vec()]
}

pub struct ExtBuilder;
impl ExtBuilder {
    /// Funds the accounts and signs up `MSP_ID`, `BSP_1`, `BSP_2` and `BSP_3`.
    pub fn build() -> sp_io::TestExternalities {
        let mut t = system::GenesisConfig::<Test>::default()
            .build_storage()
            .unwrap();

        let mut balances = [ALICE, BOB, CHARLIE, DAVE, EVE, FERDIE]
            .into_iter()
            .map(|who| (who, INITIAL_BALANCE))
            .collect::<Vec<_>>();
        balances.push((TREASURY, 1));
        pallet_balances::GenesisConfig::<Test> {
            balances,
            ..Default::default()
        }
        .assimilate_storage(&mut t)
        .unwrap();

        let mut ext = sp_io::TestExternalities::new(t);
        ext.execute_with(|| {
            System::set_block_number(1);

            assert_ok!(StorageProviders::force_msp_sign_up(
                RuntimeOrigin::root(),
                BOB,
                MSP_ID,
                PROVIDER_CAPACITY,
                multiaddresses(),
                MIN_STAKE
            ));
            for (who, bsp_id, stake) in [
                (CHARLIE, BSP_1, HIGH_STAKE),
                (DAVE, BSP_2, HIGH_STAKE),
                (EVE, BSP_3, MIN_STAKE),
            ] {
                assert_ok!(StorageProviders::force_bsp_sign_up(
                    RuntimeOrigin::root(),
                    who,
                    bsp_id,
                    PROVIDER_CAPACITY,
                    multiaddresses(),
                    stake
                ));
            }

            System::reset_events();
        });
        ext
    }
}

/// Advance one block, running the hooks the executive would.
pub fn next_block() {
    AllPalletsWithSystem::on_finalize(System::block_number());
    System::set_block_number(System::block_number() + 1);
    AllPalletsWithSystem::on_initialize(System::block_number());
    AllPalletsWithSystem::on_poll(System::block_number(), &mut WeightMeter::new());
    AllPalletsWithSystem::on_idle(System::block_number(), Weight::MAX);
}

/// Advance blocks until the challenges ticker reaches `tick`.
pub fn run_to_tick(tick: TickNumber) {
    while pallet_proofs_dealer::ChallengesTicker::<Test>::get() < tick {
        next_block();
    }
}

/// Flag `who` as without funds, as the payment streams do when a charge fails.
pub fn flag_user_without_funds(who: &AccountId) {
    pallet_payment_streams::UsersWithoutFunds::<Test>::insert(who, ());
}
