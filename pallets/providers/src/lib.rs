//! # Storage Providers Pallet
//!
//! This pallet works as the registry of Main Storage Providers (MSPs) and Backup Storage
//! Providers (BSPs), and of the buckets MSPs store.
//!
//! It keeps, for each Provider, its capacity and how much of it is used, its multiaddresses and
//! (for BSPs) the root of the Merkle Patricia Forest with every file it stores. Each bucket has
//! its own root instead. Stake is the balance held from the Provider's account under
//! [`HoldReason::StorageProviderDeposit`].
//!
//! Providers that failed to submit proofs can be slashed by anyone. A Provider whose stake falls
//! below [`Config::SpMinDeposit`] is flagged as insolvent until it tops up its deposit.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod types;
mod utils;

#[cfg(test)]
mod mock;


pub use pallet::*;

pub const LOG_TARGET: &str = "runtime::storage-providers";

#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use frame_support::{
        dispatch::DispatchResultWithPostInfo, pallet_prelude::*, traits::fungible::*,
        Blake2_128Concat,
    };
    use frame_system::pallet_prelude::*;
    use shp_traits::ProofSubmittersInterface;
    use shp_types::{Balance, BucketId, MerkleHash, MultiAddress, ProviderId, StorageDataUnit};
    use sp_std::vec::Vec;

    /// Configure the pallet by specifying the parameters and types on which it depends.
    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Because this pallet emits events, it depends on the runtime's definition of an event.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// Type to access the Balances pallet (using the fungible trait from frame_support)
        type NativeBalance: Inspect<Self::AccountId, Balance = Balance>
            + Mutate<Self::AccountId>
            + hold::Inspect<Self::AccountId, Reason = Self::RuntimeHoldReason>
            + hold::Mutate<Self::AccountId, Reason = Self::RuntimeHoldReason>;

        /// The overarching hold reason
        type RuntimeHoldReason: From<HoldReason>;

        /// The proofs dealer, which keeps count of the proofs each Provider failed to submit.
        type ProofDealer: ProofSubmittersInterface;

        /// The minimum amount that an account has to deposit to become a storage provider.
        #[pallet::constant]
        type SpMinDeposit: Get<Balance>;

        /// The minimum capacity a storage provider can offer.
        #[pallet::constant]
        type SpMinCapacity: Get<StorageDataUnit>;

        /// The maximum amount of multiaddresses that a Storage Provider can have.
        #[pallet::constant]
        type MaxMultiAddressAmount: Get<u32>;

        /// The maximum amount of Buckets that a MSP can have.
        #[pallet::constant]
        type MaxBuckets: Get<u32>;

        /// Amount of stake slashed for every proof a Provider failed to submit.
        #[pallet::constant]
        type SlashAmountPerMissedProof: Get<Balance>;

        /// Account receiving slashed funds.
        #[pallet::constant]
        type Treasury: Get<Self::AccountId>;
    }

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(_);

    // Storage:

    /// The mapping from an AccountId to a MainStorageProviderId.
    ///
    /// This storage is updated in:
    /// - [force_msp_sign_up](crate::dispatchables::force_msp_sign_up), which adds a new entry to the map.
    /// - [msp_sign_off](crate::dispatchables::msp_sign_off), which removes the corresponding entry from the map.
    #[pallet::storage]
    pub type AccountIdToMainStorageProviderId<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, ProviderId>;

    /// The mapping from a MainStorageProviderId to a MainStorageProvider.
    ///
    /// This storage is updated in:
    /// - [force_msp_sign_up](crate::dispatchables::force_msp_sign_up) and [msp_sign_off](crate::dispatchables::msp_sign_off).
    /// - [change_capacity](crate::dispatchables::change_capacity), which changes the entry's `capacity`.
    /// - bucket additions, removals and size changes, which change `buckets` and `capacity_used`.
    #[pallet::storage]
    pub type MainStorageProviders<T: Config> =
        StorageMap<_, Blake2_128Concat, ProviderId, MainStorageProvider<T>>;

    /// The mapping from an AccountId to a BackupStorageProviderId.
    ///
    /// This storage is updated in:
    /// - [force_bsp_sign_up](crate::dispatchables::force_bsp_sign_up), which adds a new entry to the map.
    /// - [bsp_sign_off](crate::dispatchables::bsp_sign_off), which removes the corresponding entry from the map.
    #[pallet::storage]
    pub type AccountIdToBackupStorageProviderId<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, ProviderId>;

    /// The mapping from a BackupStorageProviderId to a BackupStorageProvider.
    ///
    /// This storage is updated in:
    /// - [force_bsp_sign_up](crate::dispatchables::force_bsp_sign_up) and [bsp_sign_off](crate::dispatchables::bsp_sign_off).
    /// - [change_capacity](crate::dispatchables::change_capacity), which changes the entry's `capacity`.
    /// - [update_root](shp_traits::MutateProvidersInterface::update_root) and the capacity used
    ///   changes, called by other pallets when files are added or removed from the BSP's forest.
    #[pallet::storage]
    pub type BackupStorageProviders<T: Config> =
        StorageMap<_, Blake2_128Concat, ProviderId, BackupStorageProvider<T>>;

    /// The mapping from a BucketId to that bucket's metadata.
    ///
    /// This storage is updated in:
    /// - [add_bucket](shp_traits::MutateBucketsInterface::add_bucket), which adds a new entry to the map.
    /// - [change_root_bucket](shp_traits::MutateBucketsInterface::change_root_bucket), which changes the corresponding bucket's root.
    /// - [unassign_msp_from_bucket](shp_traits::MutateBucketsInterface::unassign_msp_from_bucket), which detaches it from its MSP.
    #[pallet::storage]
    pub type Buckets<T: Config> = StorageMap<_, Blake2_128Concat, BucketId, Bucket<T>>;

    /// The total amount of storage capacity all BSPs have.
    #[pallet::storage]
    pub type TotalBspsCapacity<T: Config> = StorageValue<_, StorageDataUnit, ValueQuery>;

    /// The total amount of storage capacity of BSPs that is currently in use.
    #[pallet::storage]
    pub type UsedBspsCapacity<T: Config> = StorageValue<_, StorageDataUnit, ValueQuery>;

    /// Providers whose stake fell below the minimum after being slashed.
    ///
    /// This storage is updated in:
    /// - [slash](crate::dispatchables::slash), which adds the Provider if its stake is now below the minimum.
    /// - [top_up_deposit](crate::dispatchables::top_up_deposit), which removes it once the stake is back.
    #[pallet::storage]
    pub type InsolventProviders<T: Config> = StorageMap<_, Blake2_128Concat, ProviderId, ()>;

    // Events & Errors:

    /// The events that can be emitted by this pallet
    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// A Main Storage Provider was registered. Provides information about that MSP's account
        /// id, its id, its multiaddresses and the total data it can store.
        MspSignUpSuccess {
            who: T::AccountId,
            msp_id: ProviderId,
            multiaddresses: Vec<MultiAddress>,
            capacity: StorageDataUnit,
        },

        /// A Backup Storage Provider was registered. Provides information about that BSP's account
        /// id, its id, its multiaddresses and the total data it can store.
        BspSignUpSuccess {
            who: T::AccountId,
            bsp_id: ProviderId,
            multiaddresses: Vec<MultiAddress>,
            capacity: StorageDataUnit,
        },

        MspSignOffSuccess { who: T::AccountId, msp_id: ProviderId },

        BspSignOffSuccess { who: T::AccountId, bsp_id: ProviderId },

        /// A Provider has changed its capacity successfully.
        CapacityChanged {
            who: T::AccountId,
            provider_id: ProviderId,
            old_capacity: StorageDataUnit,
            new_capacity: StorageDataUnit,
        },

        /// A Provider has been slashed for the proofs it failed to submit.
        Slashed {
            provider_id: ProviderId,
            amount: Balance,
        },

        /// After being slashed, a Provider's stake is below the minimum and it must top up.
        AwaitingTopUp { provider_id: ProviderId },

        /// A Provider topped up its deposit and is solvent again.
        TopUpFulfilled {
            provider_id: ProviderId,
            amount: Balance,
        },

        BucketRootChanged {
            bucket_id: BucketId,
            old_root: MerkleHash,
            new_root: MerkleHash,
        },
    }

    /// The errors that can be thrown by this pallet to inform users about what went wrong
    #[pallet::error]
    pub enum Error<T> {
        // Sign up errors:
        /// The account is already registered as a MSP or BSP.
        AlreadyRegistered,
        /// The Provider id is already used by another Provider.
        ProviderIdAlreadyUsed,
        /// The Provider did not give any multiaddress.
        NoMultiAddress,
        /// The Provider gave more multiaddresses than allowed.
        TooManyMultiAddresses,
        /// The capacity is below the minimum required by the runtime.
        StorageTooLow,
        /// The stake is below the minimum required by the runtime.
        StakeTooLow,

        // Deposit errors:
        /// The account does not have enough free balance for the deposit.
        NotEnoughBalance,
        /// The runtime could not hold the deposit from the account.
        CannotHoldDeposit,

        // Sign off errors:
        /// The Provider still stores data.
        StorageStillInUse,
        /// The MSP still stores buckets.
        MspStillHasBuckets,

        // Capacity errors:
        /// Tried to change the capacity to less than the used storage.
        NewCapacityLessThanUsedStorage,
        /// Tried to change the capacity to the one it already has.
        NewCapacityEqualsCurrentCapacity,
        /// Tried to change the capacity to zero (there are specific extrinsics to sign off).
        NewCapacityCantBeZero,
        /// The Provider does not have enough available capacity.
        NotEnoughCapacity,
        /// Tried to free more capacity than the Provider uses (Inconsistency error).
        CapacityUsedUnderflow,

        // Slashing errors:
        /// The Provider has no failed proof submissions to be slashed for.
        ProviderNotSlashable,

        // General errors:
        /// The account or id is not registered as a Provider.
        NotRegistered,
        /// The Provider is not a BSP.
        NotABsp,
        /// The Provider is not a MSP.
        NotAnMsp,
        /// A Provider id is assigned to an account but its data is missing (Inconsistency error).
        SpRegisteredButDataNotFound,
        /// The bucket id is not found in storage.
        BucketNotFound,
        /// The bucket id already exists in storage.
        BucketAlreadyExists,
        /// The MSP reached its maximum amount of buckets.
        AppendBucketToMspFailed,
        /// The bucket is not stored by any MSP.
        BucketHasNoMsp,
    }

    /// This enum holds the HoldReasons for this pallet, allowing the runtime to identify each held balance with different reasons separately
    #[pallet::composite_enum]
    pub enum HoldReason {
        /// Deposit that a Storage Provider has to pay to be registered as such
        StorageProviderDeposit,
    }

    /// Dispatchables (extrinsics) exposed by this pallet
    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Register `who` as a Main Storage Provider with id `msp_id`.
        ///
        /// The dispatch origin for this call must be Root.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that `who` is not already registered and `msp_id` is not taken.
        /// 2. Check the multiaddresses, the capacity and the stake against the runtime minimums.
        /// 3. Hold `stake` from `who`.
        /// 4. Register the MSP with no buckets.
        ///
        /// Emits `MspSignUpSuccess` event when successful.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn force_msp_sign_up(
            origin: OriginFor<T>,
            who: T::AccountId,
            msp_id: ProviderId,
            capacity: StorageDataUnit,
            multiaddresses: Vec<MultiAddress>,
            stake: Balance,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_msp_sign_up(&who, msp_id, capacity, multiaddresses.clone(), stake)?;

            Self::deposit_event(Event::<T>::MspSignUpSuccess {
                who,
                msp_id,
                multiaddresses,
                capacity,
            });

            Ok(().into())
        }

        /// Register `who` as a Backup Storage Provider with id `bsp_id`.
        ///
        /// The dispatch origin for this call must be Root.
        ///
        /// The BSP starts with an empty forest, so its root is the default root. Its stake is what
        /// later determines how early it can volunteer for files and how often it is challenged.
        ///
        /// Emits `BspSignUpSuccess` event when successful.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn force_bsp_sign_up(
            origin: OriginFor<T>,
            who: T::AccountId,
            bsp_id: ProviderId,
            capacity: StorageDataUnit,
            multiaddresses: Vec<MultiAddress>,
            stake: Balance,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_bsp_sign_up(&who, bsp_id, capacity, multiaddresses.clone(), stake)?;

            Self::deposit_event(Event::<T>::BspSignUpSuccess {
                who,
                bsp_id,
                multiaddresses,
                capacity,
            });

            Ok(().into())
        }

        /// Sign off the signer as a Main Storage Provider, releasing its stake.
        ///
        /// Fails with `MspStillHasBuckets` while the MSP stores any bucket.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn msp_sign_off(origin: OriginFor<T>) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let msp_id = Self::do_msp_sign_off(&who)?;

            Self::deposit_event(Event::<T>::MspSignOffSuccess { who, msp_id });

            Ok(().into())
        }

        /// Sign off the signer as a Backup Storage Provider, releasing its stake.
        ///
        /// Fails with `StorageStillInUse` while the BSP stores any file.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn bsp_sign_off(origin: OriginFor<T>) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let bsp_id = Self::do_bsp_sign_off(&who)?;

            Self::deposit_event(Event::<T>::BspSignOffSuccess { who, bsp_id });

            Ok(().into())
        }

        /// Change the capacity offered by the signer's Provider.
        ///
        /// The new capacity cannot be zero, equal to the current one, below the runtime minimum or
        /// below what the Provider is already using.
        ///
        /// Emits `CapacityChanged` event when successful.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn change_capacity(
            origin: OriginFor<T>,
            new_capacity: StorageDataUnit,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (provider_id, old_capacity) = Self::do_change_capacity(&who, new_capacity)?;

            Self::deposit_event(Event::<T>::CapacityChanged {
                who,
                provider_id,
                old_capacity,
                new_capacity,
            });

            Ok(().into())
        }

        /// Slash a Provider for the proofs it failed to submit.
        ///
        /// The dispatch origin for this call must be Signed, by any account.
        ///
        /// [`Config::SlashAmountPerMissedProof`] is slashed for every failed submission accrued, capped
        /// at the Provider's stake, and moved to the treasury. The accrued count is then cleared.
        ///
        /// Emits `Slashed`, and `AwaitingTopUp` if the stake ends up below the minimum.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn slash(origin: OriginFor<T>, provider_id: ProviderId) -> DispatchResultWithPostInfo {
            ensure_signed(origin)?;

            Self::do_slash(&provider_id)?;

            Ok(().into())
        }

        /// Add `amount` to the signer's Provider stake.
        ///
        /// Emits `TopUpFulfilled` if the Provider was insolvent and its stake is back above the
        /// minimum.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn top_up_deposit(origin: OriginFor<T>, amount: Balance) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            Self::do_top_up_deposit(&who, amount)?;

            Ok(().into())
        }
    }
}
