use crate as pallet_storage_providers;
use frame_support::{
    derive_impl, parameter_types,
    traits::{ConstU128, ConstU32, ConstU64, Everything},
    weights::constants::RocksDbWeight,
};
use frame_system as system;
use shp_file_key_verifier::{FileKeyProof, FileKeyVerifier};
use shp_forest_verifier::ForestVerifier;
use shp_types::{AccountId, Balance, ProviderId, StorageProofsMerkleTrieLayout, TickNumber, H_LENGTH};
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
pub const BOB_MSP: ProviderId = H256([12u8; 32]);

const CHUNK_SIZE: u64 = 1024;
const SIZE_TO_CHALLENGES: u64 = CHUNK_SIZE * 10;

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
    pub type StorageProviders = crate;
    #[runtime::pallet_index(3)]
    pub type ProofsDealer = pallet_proofs_dealer;
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

impl crate::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProofDealer = ProofsDealer;
    type SpMinDeposit = ConstU128<100>;
    type SpMinCapacity = ConstU64<2>;
    type MaxMultiAddressAmount = ConstU32<5>;
    type MaxBuckets = ConstU32<2>;
    type SlashAmountPerMissedProof = ConstU128<30>;
    type Treasury = TreasuryAccount;
}

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
    type KeyProof = FileKeyProof<H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
    type KeyVerifier =
        FileKeyVerifier<StorageProofsMerkleTrieLayout, H_LENGTH, CHUNK_SIZE, SIZE_TO_CHALLENGES>;
    type StakeToChallengePeriod = StakeToChallengePeriod;
    type RandomChallengesPerBlock = ConstU32<4>;
    type MaxCustomChallengesPerBlock = ConstU32<2>;
    type ChallengesQueueLength = ConstU32<10>;
    type CheckpointChallengePeriod = ConstU32<10>;
    type ChallengeHistoryLength = ConstU32<30>;
    type ChallengeTicksTolerance = ConstU32<5>;
    type ChallengesFee = ConstU128<10>;
    type Treasury = TreasuryAccount;
}

// Build genesis storage according to the mock runtime.
pub fn new_test_ext() -> sp_io::TestExternalities {
    let mut t = system::GenesisConfig::<Test>::default()
        .build_storage()
        .unwrap();

    pallet_balances::GenesisConfig::<Test> {
        balances: vec![(ALICE, 1_000), (BOB, 1_000), (CHARLIE, 1_000), (TREASURY, 1)],
        ..Default::default()
    }
    .assimilate_storage(&mut t)
    .unwrap();

    let mut ext = sp_io::TestExternalities::new(t);
    ext.execute_with(|| System::set_block_number(1));
    ext
}

pub fn multiaddresses() -> Vec<Vec<u8>> {
    vec![b"/ip4/127.0.0.1/udp/1234".to_vec()]
}
