//! # Payment Streams Pallet
//!
//! This pallet provides the functionality to create, update, delete and charge payment streams.
//!
//! A payment stream goes from a User to a Provider and is either fixed-rate (a constant amount per
//! tick) or dynamic-rate (an amount of storage provided, priced by an accumulated price index).
//! Providers can only charge up to the last tick they proved they were storing data, which is
//! taken from the proofs dealer's valid proof submitters.
//!
//! Notes: the global price per unit of storage is a constant of the runtime. This pallet keeps the
//! accumulated price index since genesis, advancing it by that price on every tick.
#![cfg_attr(not(feature = "std"), no_std)]

pub mod types;
mod utils;

#[cfg(test)]
mod mock;

#[cfg(test)]
mod tests;

pub use pallet::*;
pub use types::*;

pub const LOG_TARGET: &str = "runtime::payment-streams";

#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use frame_support::{
        dispatch::DispatchResultWithPostInfo,
        pallet_prelude::*,
        traits::fungible::{hold, Inspect, Mutate},
        weights::WeightMeter,
        Blake2_128Concat,
    };
    use frame_system::pallet_prelude::*;
    use shp_traits::{ProofSubmittersInterface, ReadProvidersInterface};
    use shp_types::{Balance, ProviderId, StorageDataUnit, TickNumber};

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

        /// The trait for reading provider data.
        type ProvidersPallet: ReadProvidersInterface<AccountId = Self::AccountId>;

        /// The source of the current tick and of the Providers that submitted valid proofs.
        type ProofSubmitters: ProofSubmittersInterface;

        /// The number of ticks that correspond to the deposit that a User has to pay to open a
        /// payment stream. This means that, from the balance of the User for which the payment
        /// stream is being created, the amount `NewStreamDeposit * rate` will be held as a
        /// deposit.
        #[pallet::constant]
        type NewStreamDeposit: Get<TickNumber>;

        /// The price of storing one unit of data for one tick. Dynamic-rate payment streams are
        /// charged by the accumulated sum of this price.
        #[pallet::constant]
        type CurrentPricePerUnitPerTick: Get<Balance>;
    }

    #[pallet::pallet]
    pub struct Pallet<T>(_);

    // Storage:

    /// The double mapping from a Provider, to its provided Users, to their fixed-rate payment
    /// streams.
    ///
    /// This storage is updated in:
    /// - [create_fixed_rate_payment_stream](Pallet::create_fixed_rate_payment_stream), which adds
    ///   a new entry to the map.
    /// - [delete_fixed_rate_payment_stream](Pallet::delete_fixed_rate_payment_stream), which
    ///   removes the corresponding entry from the map.
    /// - [update_fixed_rate_payment_stream](Pallet::update_fixed_rate_payment_stream), which
    ///   updates the entry's `rate`.
    /// - [charge_payment_streams](Pallet::charge_payment_streams), which updates the entry's
    ///   `last_charged_tick`.
    #[pallet::storage]
    pub type FixedRatePaymentStreams<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        ProviderId,
        Blake2_128Concat,
        T::AccountId,
        FixedRatePaymentStream,
    >;

    /// The double mapping from a Provider, to its provided Users, to their dynamic-rate payment
    /// streams.
    ///
    /// Updated in the same places as `FixedRatePaymentStreams`, with `amount_provided` and
    /// `price_index_when_last_charged` in place of `rate` and `last_charged_tick`.
    #[pallet::storage]
    pub type DynamicRatePaymentStreams<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        ProviderId,
        Blake2_128Concat,
        T::AccountId,
        DynamicRatePaymentStream,
    >;

    /// The mapping from a Provider to its last chargeable tick and price index.
    ///
    /// Updated in `on_poll` with the Providers that submitted a valid proof in the previous
    /// tick.
    #[pallet::storage]
    pub type LastChargeableInfo<T: Config> =
        StorageMap<_, Blake2_128Concat, ProviderId, ProviderLastChargeableInfo, ValueQuery>;

    /// Users that were found without funds to pay one of their payment streams.
    #[pallet::storage]
    pub type UsersWithoutFunds<T: Config> = StorageMap<_, Blake2_128Concat, T::AccountId, ()>;

    /// The number of payment streams each User has open.
    #[pallet::storage]
    pub type RegisteredUsers<T: Config> =
        StorageMap<_, Blake2_128Concat, T::AccountId, u32, ValueQuery>;

    /// A counter of blocks, incremented at the start of every block.
    #[pallet::storage]
    pub type OnPollTicker<T: Config> = StorageValue<_, TickNumber, ValueQuery>;

    /// The sum of `CurrentPricePerUnitPerTick` over every tick since genesis.
    #[pallet::storage]
    pub type AccumulatedPriceIndex<T: Config> = StorageValue<_, Balance, ValueQuery>;

    /// The last tick of the proofs dealer whose proof submitters were processed.
    #[pallet::storage]
    pub type LastSubmittersTickRegistered<T: Config> = StorageValue<_, TickNumber, ValueQuery>;

    // Events & Errors:

    /// The events that can be emitted by this pallet
    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// Event emitted when a fixed-rate payment stream is created. Provides information about
        /// the User and Provider of the stream and the initial rate of the stream.
        FixedRatePaymentStreamCreated {
            user_account: T::AccountId,
            provider_id: ProviderId,
            rate: Balance,
        },
        /// Event emitted when a fixed-rate payment stream is updated.
        FixedRatePaymentStreamUpdated {
            user_account: T::AccountId,
            provider_id: ProviderId,
            new_rate: Balance,
        },
        /// Event emitted when a fixed-rate payment stream is removed.
        FixedRatePaymentStreamDeleted {
            user_account: T::AccountId,
            provider_id: ProviderId,
        },
        /// Event emitted when a dynamic-rate payment stream is created. Provides information
        /// about the User and Provider of the stream and the initial amount provided.
        DynamicRatePaymentStreamCreated {
            user_account: T::AccountId,
            provider_id: ProviderId,
            amount_provided: StorageDataUnit,
        },
        DynamicRatePaymentStreamUpdated {
            user_account: T::AccountId,
            provider_id: ProviderId,
            new_amount_provided: StorageDataUnit,
        },
        DynamicRatePaymentStreamDeleted {
            user_account: T::AccountId,
            provider_id: ProviderId,
        },
        /// Event emitted when a payment is charged. Provides information about the User and
        /// Provider of the stream and the amount that was charged.
        PaymentStreamCharged {
            user_account: T::AccountId,
            provider_id: ProviderId,
            amount: Balance,
        },
        /// Event emitted when the last chargeable tick and price index of a Provider is updated.
        LastChargeableInfoUpdated {
            provider_id: ProviderId,
            last_chargeable_tick: TickNumber,
            last_chargeable_price_index: Balance,
        },
        /// Event emitted when a User that has been charged does not have enough funds to pay.
        UserWithoutFunds { who: T::AccountId },
        /// Event emitted when a User flagged without funds paid all of its debt, or has no
        /// payment streams left.
        UserSolvent { who: T::AccountId },
    }

    /// The errors that can be thrown by this pallet to inform users about what went wrong
    #[pallet::error]
    pub enum Error<T> {
        /// Error thrown when a User or Provider tries to create a payment stream that already
        /// exists.
        PaymentStreamAlreadyExists,
        /// Error thrown when a User or Provider tries to update or delete a payment stream that
        /// does not exist.
        PaymentStreamNotFound,
        /// Error thrown when a User tries to charge a payment stream and it's not a registered
        /// Provider.
        NotAProvider,
        /// Error thrown when the owner account of a registered Provider can't be found.
        ProviderInconsistencyError,
        /// Error thrown when the User does not have enough funds to pay the deposit of a new
        /// stream.
        CannotHoldDeposit,
        /// Error thrown when trying to update the rate of a fixed-rate payment stream to the same
        /// rate as before.
        UpdateRateToSameRate,
        /// Error thrown when trying to update the amount provided of a dynamic-rate payment
        /// stream to the same amount as before.
        UpdateAmountToSameAmount,
        /// Error thrown when trying to create a new fixed-rate payment stream with rate 0 or
        /// update the rate of an existing one to 0 (should use `delete_fixed_rate_payment_stream`
        /// instead).
        RateCantBeZero,
        /// Error thrown when trying to create a new dynamic-rate payment stream with amount
        /// provided 0 or update the amount provided of an existing one to 0.
        AmountProvidedCantBeZero,
        /// Error thrown when the amount to charge or to hold does not fit in a balance.
        ChargeOverflow,
        /// Error thrown when trying to operate when the User has been flagged for not having
        /// enough funds.
        UserWithoutFunds,
    }

    /// This enum holds the HoldReasons for this pallet, allowing the runtime to identify each
    /// held balance with different reasons separately
    #[pallet::composite_enum]
    pub enum HoldReason {
        /// Deposit that a User has to pay to create a payment stream
        PaymentStreamDeposit,
    }

    /// Dispatchables (extrinsics) exposed by this pallet
    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Dispatchable extrinsic that allows root to add a fixed-rate payment stream from a User
        /// to a Provider.
        ///
        /// The dispatch origin for this call must be Root (Payment streams should only be added
        /// by traits in other pallets, this extrinsic is for manual testing).
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the extrinsic was executed by the root origin
        /// 2. Check that the payment stream does not already exist
        /// 3. Check that the User has enough funds to pay the deposit
        /// 4. Hold the deposit from the User
        /// 5. Update the Payment Streams storage to add the new payment stream
        ///
        /// Emits `FixedRatePaymentStreamCreated` event when successful.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn create_fixed_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
            rate: Balance,
        ) -> DispatchResultWithPostInfo {
            // Check that the extrinsic was executed by the root origin
            ensure_root(origin)?;

            // Execute checks and logic, update storage
            Self::do_create_fixed_rate_payment_stream(&provider_id, &user_account, rate)?;

            // Emit the corresponding event
            Self::deposit_event(Event::<T>::FixedRatePaymentStreamCreated {
                user_account,
                provider_id,
                rate,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows root to update an existing fixed-rate payment
        /// stream between a User and a Provider.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the extrinsic was executed by the root origin
        /// 2. Check that the payment stream exists
        /// 3. Charge the payment stream at the old rate
        /// 4. Adjust the deposit held from the User to the new rate
        /// 5. Update the Payment Streams storage to update the payment stream
        ///
        /// Emits `FixedRatePaymentStreamUpdated` event when successful.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn update_fixed_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
            new_rate: Balance,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_update_fixed_rate_payment_stream(&provider_id, &user_account, new_rate)?;

            Self::deposit_event(Event::<T>::FixedRatePaymentStreamUpdated {
                user_account,
                provider_id,
                new_rate,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows root to delete an existing fixed-rate payment
        /// stream between a User and a Provider.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the extrinsic was executed by the root origin
        /// 2. Check that the payment stream exists
        /// 3. Charge the payment stream one last time, covering what the User can't pay with its
        ///    deposit
        /// 4. Release the rest of the deposit and remove the payment stream
        ///
        /// Emits `FixedRatePaymentStreamDeleted` event when successful.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn delete_fixed_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_delete_fixed_rate_payment_stream(&provider_id, &user_account)?;

            Self::deposit_event(Event::<T>::FixedRatePaymentStreamDeleted {
                user_account,
                provider_id,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows root to add a dynamic-rate payment stream from a
        /// User to a Provider.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the extrinsic was executed by the root origin
        /// 2. Check that the payment stream does not already exist
        /// 3. Check that the User has enough funds to pay the deposit
        /// 4. Hold the deposit from the User
        /// 5. Update the Payment Streams storage to add the new payment stream
        ///
        /// Emits `DynamicRatePaymentStreamCreated` event when successful.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn create_dynamic_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
            amount_provided: StorageDataUnit,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_create_dynamic_rate_payment_stream(
                &provider_id,
                &user_account,
                amount_provided,
            )?;

            Self::deposit_event(Event::<T>::DynamicRatePaymentStreamCreated {
                user_account,
                provider_id,
                amount_provided,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows root to update an existing dynamic-rate payment
        /// stream between a User and a Provider.
        ///
        /// The payment stream is charged with the old amount provided before being updated.
        ///
        /// Emits `DynamicRatePaymentStreamUpdated` event when successful.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn update_dynamic_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
            new_amount_provided: StorageDataUnit,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_update_dynamic_rate_payment_stream(
                &provider_id,
                &user_account,
                new_amount_provided,
            )?;

            Self::deposit_event(Event::<T>::DynamicRatePaymentStreamUpdated {
                user_account,
                provider_id,
                new_amount_provided,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows root to delete an existing dynamic-rate payment
        /// stream between a User and a Provider.
        ///
        /// Emits `DynamicRatePaymentStreamDeleted` event when successful.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn delete_dynamic_rate_payment_stream(
            origin: OriginFor<T>,
            provider_id: ProviderId,
            user_account: T::AccountId,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_delete_dynamic_rate_payment_stream(&provider_id, &user_account)?;

            Self::deposit_event(Event::<T>::DynamicRatePaymentStreamDeleted {
                user_account,
                provider_id,
            });

            Ok(().into())
        }

        /// Dispatchable extrinsic that allows Providers to charge a payment stream from a User.
        ///
        /// The dispatch origin for this call must be Signed, by the owner account of a registered
        /// Provider.
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the extrinsic was signed and get the signer.
        /// 2. Check that the signer is a registered Provider
        /// 3. Check that a payment stream between the signer and the User exists
        /// 4. Charge the fixed-rate stream up to the Provider's last chargeable tick, and the
        ///    dynamic-rate stream up to the price index at that tick
        /// 5. If the User can't pay, flag it as without funds
        ///
        /// Emits a `PaymentStreamCharged` event when successful, and `UserWithoutFunds` if the
        /// User was flagged.
        ///
        /// Notes: a Provider could have both a fixed-rate and a dynamic-rate payment stream with
        /// a User. Both are charged.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn charge_payment_streams(
            origin: OriginFor<T>,
            user_account: T::AccountId,
        ) -> DispatchResultWithPostInfo {
            // Check that the extrinsic was signed and get the signer.
            let provider_account = ensure_signed(origin)?;

            // Check that the signer is a registered Provider
            let provider_id = T::ProvidersPallet::get_provider_id(&provider_account)
                .ok_or(Error::<T>::NotAProvider)?;

            // Execute checks and logic, update storage
            let outcome = Self::do_charge_payment_streams(&provider_id, &user_account)?;

            Self::deposit_event(Event::<T>::PaymentStreamCharged {
                user_account,
                provider_id,
                amount: outcome.charged,
            });

            Ok(().into())
        }
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        /// Runs at the start of every block, after the proofs dealer advanced its ticker.
        ///
        /// Advances this pallet's ticker and the accumulated price index, and moves forward the
        /// last chargeable tick of every Provider that submitted a valid proof in the previous
        /// tick.
        fn on_poll(_n: BlockNumberFor<T>, weight: &mut WeightMeter) {
            OnPollTicker::<T>::mutate(|ticker| *ticker = ticker.saturating_add(1));
            AccumulatedPriceIndex::<T>::mutate(|index| {
                *index = index.saturating_add(T::CurrentPricePerUnitPerTick::get())
            });
            weight.consume(T::DbWeight::get().reads_writes(2, 2));

            Self::do_update_last_chargeable_info(weight);
        }
    }
}
