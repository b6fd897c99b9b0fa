//! # StorageHub Runtime
//!
//! Composes the StorageHub pallets into a FRAME runtime, executed natively.
//!
//! Blocks are built by [`frame_executive::Executive`]:
//!
//! 1. The challenges ticker and the payment streams ticker advance (`on_poll`), generating the
//!    tick's challenge seed, checkpoint challenges and marking Providers that missed their
//!    proof as slashable.
//! 2. Signed extrinsics are applied in order. If a call fails, every change it made is rolled
//!    back, except for the transaction fee.
//! 3. Expired storage requests are cleaned up (`on_idle`) with the weight left in the block.
#![recursion_limit = "256"]

pub mod apis;
pub mod configs;
pub mod dev_chain;
pub mod genesis_config_presets;


use frame_support::weights::{constants::WEIGHT_REF_TIME_PER_SECOND, Weight};
use sp_runtime::{generic, traits::BlakeTwo256, MultiSignature, Perbill};

pub use configs::runtime_params::TREASURY_ACCOUNT;
pub use dev_chain::{DevChain, Transaction};
pub use frame_system::Phase;
pub use shp_types::{AccountId, Balance, BlockNumber, Hash};

pub const LOG_TARGET: &str = "runtime::storage-hub";

/// Alias to 512-bit hash when used in the context of a transaction signature on the chain.
pub type Signature = MultiSignature;

/// Index of a transaction in the chain.
pub type Nonce = u32;

/// The address format for describing accounts.
pub type Address = AccountId;

/// Block header type as expected by this runtime.
pub type Header = generic::Header<BlockNumber, BlakeTwo256>;

/// Block type as expected by this runtime.
pub type Block = generic::Block<Header, UncheckedExtrinsic>;

/// The `TransactionExtension` to the basic transaction logic.
pub type TxExtension = (
    frame_system::CheckNonZeroSender<Runtime>,
    frame_system::CheckNonce<Runtime>,
    frame_system::CheckWeight<Runtime>,
    pallet_transaction_payment::ChargeTransactionPayment<Runtime>,
);

/// Unchecked extrinsic type as expected by this runtime.
pub type UncheckedExtrinsic =
    generic::UncheckedExtrinsic<Address, RuntimeCall, Signature, TxExtension>;

/// The payload being signed in transactions.
pub type SignedPayload = generic::SignedPayload<RuntimeCall, TxExtension>;

/// Executive: handles dispatch to the various modules.
pub type Executive = frame_executive::Executive<
    Runtime,
    Block,
    frame_system::ChainContext<Runtime>,
    Runtime,
    AllPalletsWithSystem,
>;

pub type EventRecord = frame_system::EventRecord<RuntimeEvent, Hash>;

// Unit = the base number of indivisible units for balances
pub const UNIT: Balance = 1_000_000_000_000;
pub const MILLIUNIT: Balance = 1_000_000_000;
pub const MICROUNIT: Balance = 1_000_000;

/// The existential deposit.
pub const EXISTENTIAL_DEPOSIT: Balance = MILLIUNIT;

/// We assume that ~5% of the block weight is consumed by `on_initialize` handlers. This is
/// used to limit the maximal weight of a single extrinsic.
const AVERAGE_ON_INITIALIZE_RATIO: Perbill = Perbill::from_percent(5);

/// We allow `Normal` extrinsics to fill up the block up to 75%, the rest can be used by
/// `Operational` extrinsics.
const NORMAL_DISPATCH_RATIO: Perbill = Perbill::from_percent(75);

/// We allow for 2 seconds of compute with a 6 second average block.
pub const MAXIMUM_BLOCK_WEIGHT: Weight =
    Weight::from_parts(WEIGHT_REF_TIME_PER_SECOND.saturating_mul(2), u64::MAX);

// Create the runtime by composing the FRAME pallets that were previously configured.
#[frame_support::runtime]
mod runtime {
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
    pub struct Runtime;

    // System support stuff.
    #[runtime::pallet_index(0)]
    pub type System = frame_system;

    // Monetary stuff.
    #[runtime::pallet_index(10)]
    pub type Balances = pallet_balances;
    #[runtime::pallet_index(11)]
    pub type TransactionPayment = pallet_transaction_payment;

    // Governance stuff.
    #[runtime::pallet_index(20)]
    pub type Sudo = pallet_sudo;

    // Storage Hub
    #[runtime::pallet_index(40)]
    pub type Providers = pallet_storage_providers;
    #[runtime::pallet_index(41)]
    pub type FileSystem = pallet_file_system;
    #[runtime::pallet_index(42)]
    pub type ProofsDealer = pallet_proofs_dealer;
    #[runtime::pallet_index(43)]
    pub type PaymentStreams = pallet_payment_streams;
}
