use crate as pallet_payment_streams;
use frame_support::{
    derive_impl, parameter_types,
    traits::{
        ConstU128, ConstU32, ConstU64, Everything, OnFinalize, OnIdle, OnInitialize, OnPoll,
    },
    weights::{constants::RocksDbWeight, Weight, WeightMeter},
};
use frame_system as system;
use shp_traits::ProofSubmittersInterface;
use shp_types::{AccountId, Balance, ProviderId, TickNumber};
use sp_core::H256;
use sp_runtime::{
    traits::{BlakeTwo256, IdentityLookup},
    BuildStorage,
};
use std::collections::{BTreeMap, BTreeSet};

type Block = frame_system::mocking::MockBlock<Test>;

pub const ALICE: AccountId = AccountId::new([1u8; 32]);
pub const BOB: AccountId = AccountId::new([2u8; 32]);
pub const CHARLIE: AccountId = AccountId::new([3u8; 32]);
pub const TREASURY: AccountId = AccountId::new([99u8; 32]);

pub const ALICE_BSP: ProviderId = H256([11u8; 32]);
pub const BOB_MSP: ProviderId = H256([12u8; 32]);

pub const NEW_STREAM_DEPOSIT: TickNumber = 10;
pub const PRICE_PER_UNIT_PER_TICK: Balance = 1;

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
    pub type PaymentStreams = crate;
}

parameter_types! {
    pub const SS58Prefix: u8 = 42;
    pub const TreasuryAccount: AccountId = TREASURY;
    /// Tick of the proofs dealer.
    pub storage CurrentTick: TickNumber = 0;
    /// Providers that submitted a valid proof in each tick.
    pub storage ProofSubmitters: BTreeMap<TickNumber, BTreeSet<ProviderId>> = BTreeMap::new();
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

/// Stands in for the proofs dealer: the tick and the valid proof submitters are set by the tests.
pub struct MockSubmittingProviders;
impl ProofSubmittersInterface for MockSubmittingProviders {
    fn get_current_tick() -> TickNumber {
        CurrentTick::get()
    }

    fn get_proof_submitters_for_tick(tick: &TickNumber) -> Option<BTreeSet<ProviderId>> {
        ProofSubmitters::get().get(tick).cloned()
    }

    fn get_accrued_failed_proof_submissions(_provider_id: &ProviderId) -> Option<u32> {
        None
    }

    fn clear_accrued_failed_proof_submissions(_provider_id: &ProviderId) {}
}

impl pallet_storage_providers::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProofDealer = MockSubmittingProviders;
    type SpMinDeposit = ConstU128<100>;
    type SpMinCapacity = ConstU64<2>;
    type MaxMultiAddressAmount = ConstU32<5>;
    type MaxBuckets = ConstU32<2>;
    type SlashAmountPerMissedProof = ConstU128<30>;
    type Treasury = TreasuryAccount;
}

impl crate::Config for Test {
    type RuntimeEvent = RuntimeEvent;
    type NativeBalance = Balances;
    type RuntimeHoldReason = RuntimeHoldReason;
    type ProvidersPallet = StorageProviders;
    type ProofSubmitters = MockSubmittingProviders;
    type NewStreamDeposit = ConstU32<NEW_STREAM_DEPOSIT>;
    type CurrentPricePerUnitPerTick = ConstU128<PRICE_PER_UNIT_PER_TICK>;
}

pub struct ExtBuilder;
impl ExtBuilder {
    pub fn build() -> sp_io::TestExternalities {
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
}

/// Advance the proofs dealer tick until `tick`, running a block for every tick.
pub fn run_to_tick(tick: TickNumber) {
    while CurrentTick::get() < tick {
        CurrentTick::set(&(CurrentTick::get() + 1));
        next_block();
    }
}

/// Runs a full block, polling the pallets at its start.
pub fn next_block() {
    let block = System::block_number();
    AllPalletsWithSystem::on_finalize(block);
    AllPalletsWithSystem::on_idle(block, Weight::MAX);

    System::set_block_number(block + 1);
    AllPalletsWithSystem::on_initialize(block + 1);
    AllPalletsWithSystem::on_poll(block + 1, &mut WeightMeter::new());
}

/// Register `provider` as a valid proof submitter at `tick`, and advance past it so that the
/// pallet registers it.
pub fn prove_at(provider: ProviderId, tick: TickNumber) {
    run_to_tick(tick);
    let mut submitters = ProofSubmitters::get();
    submitters.entry(tick).or_default().insert(provider);
    ProofSubmitters::set(&submitters);
    run_to_tick(tick + 1);
}

pub fn multiaddresses() -> Vec<Vec<u8>> {
    vec![b"/ip4/127.0.0.1/udp/1234".to_vec()]
}
