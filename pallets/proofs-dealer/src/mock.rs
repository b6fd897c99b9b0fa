use crate as pallet_proofs_dealer;
use frame_support::{
    derive_impl, parameter_types,
    traits::{ConstU128, ConstU32, Everything, OnFinalize, OnIdle, OnInitialize, OnPoll},
    weights::{constants::RocksDbWeight, Weight, WeightMeter},
};
use frame_system as system;
use shp_file_key_verifier::{FileKeyProof, FileKeyVerifier};
use shp_forest_verifier::ForestVerifier;
use shp_types::{
    AccountId, Balance, ProviderId, StorageDataUnit, StorageProofsMerkleTrieLayout, TickNumber,
    H_LENGTH,
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
pub const TREASURY: AccountId = AccountId::new([99u8; 32]);

pub const ALICE_BSP: ProviderId = H256([11u8; 32]);

/// Small chunks so that test files span several of them.
pub const CHUNK_SIZE: u64 = 64;
pub const SIZE_TO_CHALLENGES: u64 = 128;

pub const CHALLENGES_FEE: Balance = 10;
pub const CHALLENGE_TICKS_TOLERANCE: TickNumber = 5;
pub const CHECKPOINT_CHALLENGE_PERIOD: TickNumber = 10;
pub const CHALLENGE_HISTORY_LENGTH: TickNumber = 30;

pub type MockKeyProof = FileKeyProof<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;

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
    pub type ProofsDealer = crate;
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
    type MaxConsumers = frame_support::traits::ConstU32<16>;
    type RuntimeTask = ();
    type ExtensionsWeightInfo = ();
    type SingleBlockMigrations = ();
    type MultiBlockMigrator = ();
    type PreInherents = ();
    type PostInherents = ();
    type PostTransactions = ();
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
    type SpMinDeposit = ConstU128<100>;
    type SpMinCapacity = frame_support::traits::ConstU64<2>;
    type MaxMultiAddressAmount = ConstU32<5>;
    type MaxBuckets = ConstU32<2>;
    type SlashAmountPerMissedProof = ConstU128<30>;
    type Treasury = TreasuryAccount;
}

/// One tick of challenge period for every 10 units of stake.
pub struct StakeToChallengePeriod;
impl Convert<Balance, TickNumber> for StakeToChallengePeriod {
    fn convert(stake: Balance) -> TickNumber {
        TickNumber::try_from(stake / 10).unwrap_or(TickNumber::MAX)
    }
}

impl pallet_proofs_dealer::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type ProvidersPallet = StorageProviders;
    type NativeBalance = Balances;
    type ForestVerifier = ForestVerifier<StorageProofsMerkleTrieLayout, H_LENGTH>;
    type KeyProof = MockKeyProof;
    type KeyVerifier =
        FileKeyVerifier<StorageProofsMerkleTrieLayout, H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
    type StakeToChallengePeriod = StakeToChallengePeriod;
    type RandomChallengesPerBlock = ConstU32<4>;
    type MaxCustomChallengesPerBlock = ConstU32<2>;
    type ChallengesQueueLength = ConstU32<3>;
    type CheckpointChallengePeriod = ConstU32<CHECKPOINT_CHALLENGE_PERIOD>;
    type ChallengeHistoryLength = ConstU32<CHALLENGE_HISTORY_LENGTH>;
    type ChallengeTicksTolerance = ConstU32<CHALLENGE_TICKS_TOLERANCE>;
    type ChallengesFee = ConstU128<CHALLENGES_FEE>;
    type Treasury = TreasuryAccount;
}

// Build genesis storage according to the mock runtime.
pub fn new_test_ext() -> sp_io::TestExternalities {
    let mut t = system::GenesisConfig::<Test>::default()
        .build_storage()
        .unwrap();

    pallet_balances::GenesisConfig::<Test> {
        balances: vec![
            (ALICE, 1_000),
            (BOB, 1_000),
            (CHARLIE, 1_000),
            (TREASURY, 1),
        ],
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();

    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| System::set_block_number(1));
    ext
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

/// Give Alice's BSP the forest with `root`, using `used` bytes of its capacity.
pub fn set_bsp_forest(root: H256, used: StorageDataUnit) {
    use shp_traits::MutateProvidersInterface;

    frame_support::assert_ok!(StorageProviders::update_root(&ALICE_BSP, root));
    frame_support::assert_ok!(StorageProviders::increase_capacity_used(&ALICE_BSP, used));
}
