use frame_support::{
    ensure,
    pallet_prelude::DispatchResult,
    traits::{
        fungible::{InspectHold, Mutate, MutateHold},
        tokens::{Fortitude, Precision, Preservation, Restriction},
        Get,
    },
    weights::WeightMeter,
};
use shp_traits::{
    PaymentStreamsInterface, ProofSubmittersInterface, ReadProvidersInterface,
    ReadUserSolvencyInterface,
};
use shp_types::{Balance, ProviderId, StorageDataUnit};
use sp_runtime::DispatchError;
use sp_std::{collections::btree_set::BTreeSet, vec::Vec};

use crate::{pallet::*, types::*, LOG_TARGET};

impl<T> Pallet<T>
where
    T: Config,
{
    /// This function holds the logic that checks if a fixed-rate payment stream can be created
    /// and, if so, stores the payment stream in the `FixedRatePaymentStreams` mapping and holds
    /// the deposit from the User.
    pub fn do_create_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        rate: Balance,
    ) -> DispatchResult {
        // Check that the given ID belongs to an actual Provider
        ensure!(
            T::ProvidersPallet::is_provider(provider_id),
            Error::<T>::NotAProvider
        );

        // Check that the rate is not 0
        ensure!(rate != 0, Error::<T>::RateCantBeZero);

        // Check that a fixed-rate payment stream between that Provider and User does not exist yet
        ensure!(
            !FixedRatePaymentStreams::<T>::contains_key(provider_id, user_account),
            Error::<T>::PaymentStreamAlreadyExists
        );

        // Check that the User is not flagged as without funds
        ensure!(
            !Self::is_user_without_funds(user_account),
            Error::<T>::UserWithoutFunds
        );

        // Hold the deposit from the User: `NewStreamDeposit` ticks of the stream's rate
        let deposit = rate
            .checked_mul(Balance::from(T::NewStreamDeposit::get()))
            .ok_or(Error::<T>::ChargeOverflow)?;
        Self::hold_deposit(user_account, deposit)?;

        // The User is charged from the tick the stream was created
        let current_tick = T::ProofSubmitters::get_current_tick();
        FixedRatePaymentStreams::<T>::insert(
            provider_id,
            user_account,
            FixedRatePaymentStream {
                rate,
                last_charged_tick: current_tick,
                user_deposit: deposit,
                out_of_funds_tick: None,
            },
        );
        RegisteredUsers::<T>::mutate(user_account, |count| *count = count.saturating_add(1));

        log::debug!(
            target: LOG_TARGET,
            "Fixed-rate payment stream from {:?} to {:?} created with rate {}",
            user_account,
            provider_id,
            rate
        );

        Ok(())
    }

    /// This function holds the logic that checks if a fixed-rate payment stream can be updated
    /// and, if so, charges the payment stream at the old rate, adjusts the User's deposit and
    /// stores the new rate.
    pub fn do_update_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        new_rate: Balance,
    ) -> DispatchResult {
        // Ensure that the new rate is not 0 (should use remove instead)
        ensure!(new_rate != 0, Error::<T>::RateCantBeZero);

        // Check that a fixed-rate payment stream between that Provider and User exists
        let stream = FixedRatePaymentStreams::<T>::get(provider_id, user_account)
            .ok_or(Error::<T>::PaymentStreamNotFound)?;

        // Verify that the new rate is different from the old one
        ensure!(stream.rate != new_rate, Error::<T>::UpdateRateToSameRate);

        // Charge the payment stream with the old rate before updating it
        let payee = Self::payee_of(provider_id)?;
        let outcome = Self::charge_fixed_rate_payment_stream(provider_id, user_account, &payee)?;
        ensure!(outcome.unpaid == 0, Error::<T>::UserWithoutFunds);

        // Adjust the deposit to the new rate
        let new_deposit = new_rate
            .checked_mul(Balance::from(T::NewStreamDeposit::get()))
            .ok_or(Error::<T>::ChargeOverflow)?;
        Self::adjust_deposit(user_account, stream.user_deposit, new_deposit)?;

        FixedRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
            if let Some(stream) = stream {
                stream.rate = new_rate;
                stream.user_deposit = new_deposit;
            }
        });

        Ok(())
    }

    /// This function holds the logic that checks if a fixed-rate payment stream can be deleted
    /// and, if so, charges it one last time and removes it.
    ///
    /// Whatever the User can't pay of that last charge is taken from the stream's deposit, and
    /// the rest of the deposit is released.
    pub fn do_delete_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
    ) -> DispatchResult {
        ensure!(
            FixedRatePaymentStreams::<T>::contains_key(provider_id, user_account),
            Error::<T>::PaymentStreamNotFound
        );

        // Charge the payment stream before deleting it
        let payee = Self::payee_of(provider_id)?;
        let outcome = Self::charge_fixed_rate_payment_stream(provider_id, user_account, &payee)?;

        let stream = FixedRatePaymentStreams::<T>::take(provider_id, user_account)
            .ok_or(Error::<T>::PaymentStreamNotFound)?;
        Self::settle_deposit(user_account, &payee, stream.user_deposit, outcome.unpaid)?;
        Self::unregister_stream(user_account);

        log::debug!(
            target: LOG_TARGET,
            "Fixed-rate payment stream from {:?} to {:?} deleted",
            user_account,
            provider_id
        );

        Ok(())
    }

    /// This function holds the logic that checks if a dynamic-rate payment stream can be created
    /// and, if so, stores it starting at the current accumulated price index.
    pub fn do_create_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        amount_provided: StorageDataUnit,
    ) -> DispatchResult {
        // Check that the given ID belongs to an actual Provider
        ensure!(
            T::ProvidersPallet::is_provider(provider_id),
            Error::<T>::NotAProvider
        );

        // Check that the amount provided is not 0
        ensure!(amount_provided != 0, Error::<T>::AmountProvidedCantBeZero);

        // Check that a dynamic-rate payment stream between that Provider and User does not exist yet
        ensure!(
            !DynamicRatePaymentStreams::<T>::contains_key(provider_id, user_account),
            Error::<T>::PaymentStreamAlreadyExists
        );

        // Check that the User is not flagged as without funds
        ensure!(
            !Self::is_user_without_funds(user_account),
            Error::<T>::UserWithoutFunds
        );

        let deposit = Self::dynamic_rate_deposit(amount_provided)?;
        Self::hold_deposit(user_account, deposit)?;

        DynamicRatePaymentStreams::<T>::insert(
            provider_id,
            user_account,
            DynamicRatePaymentStream {
                amount_provided,
                price_index_when_last_charged: AccumulatedPriceIndex::<T>::get(),
                user_deposit: deposit,
                out_of_funds_tick: None,
            },
        );
        RegisteredUsers::<T>::mutate(user_account, |count| *count = count.saturating_add(1));

        log::debug!(
            target: LOG_TARGET,
            "Dynamic-rate payment stream from {:?} to {:?} created for {} units",
            user_account,
            provider_id,
            amount_provided
        );

        Ok(())
    }

    /// This function holds the logic that checks if a dynamic-rate payment stream can be updated
    /// and, if so, charges it with the old amount provided and stores the new one.
    pub fn do_update_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        new_amount_provided: StorageDataUnit,
    ) -> DispatchResult {
        ensure!(
            new_amount_provided != 0,
            Error::<T>::AmountProvidedCantBeZero
        );

        let stream = DynamicRatePaymentStreams::<T>::get(provider_id, user_account)
            .ok_or(Error::<T>::PaymentStreamNotFound)?;

        ensure!(
            stream.amount_provided != new_amount_provided,
            Error::<T>::UpdateAmountToSameAmount
        );

        // Charge the payment stream with the old amount before updating it
        let payee = Self::payee_of(provider_id)?;
        let outcome = Self::charge_dynamic_rate_payment_stream(provider_id, user_account, &payee)?;
        ensure!(outcome.unpaid == 0, Error::<T>::UserWithoutFunds);

        let new_deposit = Self::dynamic_rate_deposit(new_amount_provided)?;
        Self::adjust_deposit(user_account, stream.user_deposit, new_deposit)?;

        DynamicRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
            if let Some(stream) = stream {
                stream.amount_provided = new_amount_provided;
                stream.user_deposit = new_deposit;
            }
        });

        Ok(())
    }

    /// This function holds the logic that checks if a dynamic-rate payment stream can be deleted
    /// and, if so, charges it one last time and removes it, settling the User's debt with the
    /// stream's deposit.
    pub fn do_delete_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
    ) -> DispatchResult {
        ensure!(
            DynamicRatePaymentStreams::<T>::contains_key(provider_id, user_account),
            Error::<T>::PaymentStreamNotFound
        );

        let payee = Self::payee_of(provider_id)?;
        let outcome = Self::charge_dynamic_rate_payment_stream(provider_id, user_account, &payee)?;

        let stream = DynamicRatePaymentStreams::<T>::take(provider_id, user_account)
            .ok_or(Error::<T>::PaymentStreamNotFound)?;
        Self::settle_deposit(user_account, &payee, stream.user_deposit, outcome.unpaid)?;
        Self::unregister_stream(user_account);

        log::debug!(
            target: LOG_TARGET,
            "Dynamic-rate payment stream from {:?} to {:?} deleted",
            user_account,
            provider_id
        );

        Ok(())
    }

    /// This function holds the logic that charges every payment stream between a Provider and a
    /// User, up to the Provider's last chargeable tick and price index.
    ///
    /// A User that can't pay is flagged as without funds and the streams it couldn't pay record
    /// the tick it ran out of funds. A flagged User that pays all of its streams is unflagged.
    pub fn do_charge_payment_streams(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
    ) -> Result<ChargeOutcome, DispatchError> {
        // Check that a payment stream between that Provider and User exists
        ensure!(
            FixedRatePaymentStreams::<T>::contains_key(provider_id, user_account)
                || DynamicRatePaymentStreams::<T>::contains_key(provider_id, user_account),
            Error::<T>::PaymentStreamNotFound
        );

        let payee = Self::payee_of(provider_id)?;
        let current_tick = T::ProofSubmitters::get_current_tick();

        let fixed = Self::charge_fixed_rate_payment_stream(provider_id, user_account, &payee)?;
        if fixed.unpaid > 0 {
            FixedRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
                if let Some(stream) = stream {
                    stream.out_of_funds_tick.get_or_insert(current_tick);
                }
            });
        }

        let dynamic = Self::charge_dynamic_rate_payment_stream(provider_id, user_account, &payee)?;
        if dynamic.unpaid > 0 {
            DynamicRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
                if let Some(stream) = stream {
                    stream.out_of_funds_tick.get_or_insert(current_tick);
                }
            });
        }

        let outcome = fixed.merge(dynamic);
        if outcome.unpaid > 0 {
            Self::flag_user_without_funds(user_account);
        } else if Self::is_user_without_funds(user_account)
            && !Self::has_streams_out_of_funds(user_account)
        {
            Self::unflag_user(user_account);
        }

        Ok(outcome)
    }

    /// Moves forward the last chargeable tick and price index of every Provider that submitted a
    /// valid proof in the previous tick of the proofs dealer.
    pub(crate) fn do_update_last_chargeable_info(weight: &mut WeightMeter) {
        let tick_to_process = T::ProofSubmitters::get_current_tick().saturating_sub(1);
        weight.consume(T::DbWeight::get().reads(2));
        if tick_to_process <= LastSubmittersTickRegistered::<T>::get() {
            return;
        }

        let price_index = AccumulatedPriceIndex::<T>::get();
        let submitters =
            T::ProofSubmitters::get_proof_submitters_for_tick(&tick_to_process).unwrap_or_default();
        for provider_id in submitters {
            LastChargeableInfo::<T>::insert(
                provider_id,
                ProviderLastChargeableInfo {
                    last_chargeable_tick: tick_to_process,
                    price_index,
                },
            );
            weight.consume(T::DbWeight::get().writes(1));

            Self::deposit_event(Event::<T>::LastChargeableInfoUpdated {
                provider_id,
                last_chargeable_tick: tick_to_process,
                last_chargeable_price_index: price_index,
            });
        }

        LastSubmittersTickRegistered::<T>::set(tick_to_process);
        weight.consume(T::DbWeight::get().writes(1));
    }

    /// How far a Provider can charge its payment streams.
    ///
    /// MSPs are not challenged, so they can charge up to the current tick.
    pub fn get_last_chargeable_info(provider_id: &ProviderId) -> ProviderLastChargeableInfo {
        if T::ProvidersPallet::is_msp(provider_id) {
            return ProviderLastChargeableInfo {
                last_chargeable_tick: T::ProofSubmitters::get_current_tick(),
                price_index: AccumulatedPriceIndex::<T>::get(),
            };
        }

        LastChargeableInfo::<T>::get(provider_id)
    }

    pub fn get_fixed_rate_payment_stream_info(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
    ) -> Option<FixedRatePaymentStream> {
        FixedRatePaymentStreams::<T>::get(provider_id, user_account)
    }

    pub fn get_dynamic_rate_payment_stream_info(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
    ) -> Option<DynamicRatePaymentStream> {
        DynamicRatePaymentStreams::<T>::get(provider_id, user_account)
    }

    /// Returns the Users that have a payment stream, of any kind, with the given Provider.
    pub fn get_users_with_payment_stream_with_provider(
        provider_id: &ProviderId,
    ) -> Vec<T::AccountId> {
        let users: BTreeSet<T::AccountId> =
            FixedRatePaymentStreams::<T>::iter_key_prefix(provider_id)
                .chain(DynamicRatePaymentStreams::<T>::iter_key_prefix(provider_id))
                .collect();
        users.into_iter().collect()
    }

    /// Returns the Providers the given User has a payment stream, of any kind, with.
    pub fn get_providers_with_payment_stream_with_user(
        user_account: &T::AccountId,
    ) -> Vec<ProviderId> {
        let providers: BTreeSet<ProviderId> = FixedRatePaymentStreams::<T>::iter_keys()
            .chain(DynamicRatePaymentStreams::<T>::iter_keys())
            .filter(|(_, user)| user == user_account)
            .map(|(provider, _)| provider)
            .collect();
        providers.into_iter().collect()
    }

    pub fn get_payment_streams_count_of_user(user_account: &T::AccountId) -> u32 {
        RegisteredUsers::<T>::get(user_account)
    }

    pub fn is_user_without_funds(user_account: &T::AccountId) -> bool {
        UsersWithoutFunds::<T>::contains_key(user_account)
    }

    pub fn get_accumulated_price_index() -> Balance {
        AccumulatedPriceIndex::<T>::get()
    }

    /// Charges a fixed-rate payment stream up to the Provider's last chargeable tick.
    ///
    /// If the User can't pay, nothing is transferred and the owed amount is returned as unpaid.
    fn charge_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        payee: &T::AccountId,
    ) -> Result<ChargeOutcome, DispatchError> {
        let Some(stream) = FixedRatePaymentStreams::<T>::get(provider_id, user_account) else {
            return Ok(ChargeOutcome::default());
        };

        let last_chargeable_tick = Self::get_last_chargeable_info(provider_id).last_chargeable_tick;
        if last_chargeable_tick <= stream.last_charged_tick {
            return Ok(ChargeOutcome::default());
        }

        let ticks = Balance::from(last_chargeable_tick - stream.last_charged_tick);
        let amount = stream
            .rate
            .checked_mul(ticks)
            .ok_or(Error::<T>::ChargeOverflow)?;

        if T::NativeBalance::transfer(user_account, payee, amount, Preservation::Preserve).is_err()
        {
            return Ok(ChargeOutcome {
                charged: 0,
                unpaid: amount,
            });
        }

        FixedRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
            if let Some(stream) = stream {
                stream.last_charged_tick = last_chargeable_tick;
                stream.out_of_funds_tick = None;
            }
        });

        Ok(ChargeOutcome {
            charged: amount,
            unpaid: 0,
        })
    }

    /// Charges a dynamic-rate payment stream up to the price index of the Provider's last
    /// chargeable tick.
    fn charge_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &T::AccountId,
        payee: &T::AccountId,
    ) -> Result<ChargeOutcome, DispatchError> {
        let Some(stream) = DynamicRatePaymentStreams::<T>::get(provider_id, user_account) else {
            return Ok(ChargeOutcome::default());
        };

        let price_index = Self::get_last_chargeable_info(provider_id).price_index;
        if price_index <= stream.price_index_when_last_charged {
            return Ok(ChargeOutcome::default());
        }

        let amount = Balance::from(stream.amount_provided)
            .checked_mul(price_index - stream.price_index_when_last_charged)
            .ok_or(Error::<T>::ChargeOverflow)?;

        if T::NativeBalance::transfer(user_account, payee, amount, Preservation::Preserve).is_err()
        {
            return Ok(ChargeOutcome {
                charged: 0,
                unpaid: amount,
            });
        }

        DynamicRatePaymentStreams::<T>::mutate(provider_id, user_account, |stream| {
            if let Some(stream) = stream {
                stream.price_index_when_last_charged = price_index;
                stream.out_of_funds_tick = None;
            }
        });

        Ok(ChargeOutcome {
            charged: amount,
            unpaid: 0,
        })
    }

    fn dynamic_rate_deposit(amount_provided: StorageDataUnit) -> Result<Balance, DispatchError> {
        Balance::from(amount_provided)
            .checked_mul(T::CurrentPricePerUnitPerTick::get())
            .and_then(|rate| rate.checked_mul(Balance::from(T::NewStreamDeposit::get())))
            .ok_or_else(|| Error::<T>::ChargeOverflow.into())
    }

    fn payee_of(provider_id: &ProviderId) -> Result<T::AccountId, DispatchError> {
        T::ProvidersPallet::get_owner_account(provider_id)
            .ok_or_else(|| Error::<T>::ProviderInconsistencyError.into())
    }

    fn hold_deposit(user_account: &T::AccountId, deposit: Balance) -> DispatchResult {
        let reason: T::RuntimeHoldReason = HoldReason::PaymentStreamDeposit.into();
        ensure!(
            T::NativeBalance::can_hold(&reason, user_account, deposit),
            Error::<T>::CannotHoldDeposit
        );
        T::NativeBalance::hold(&reason, user_account, deposit)
            .map_err(|_| Error::<T>::CannotHoldDeposit)?;
        Ok(())
    }

    fn adjust_deposit(
        user_account: &T::AccountId,
        old_deposit: Balance,
        new_deposit: Balance,
    ) -> DispatchResult {
        if new_deposit > old_deposit {
            Self::hold_deposit(user_account, new_deposit - old_deposit)
        } else {
            let reason: T::RuntimeHoldReason = HoldReason::PaymentStreamDeposit.into();
            T::NativeBalance::release(
                &reason,
                user_account,
                old_deposit - new_deposit,
                Precision::Exact,
            )?;
            Ok(())
        }
    }

    /// Pays the Provider what the User still owes from the deposit, and releases the rest of it.
    fn settle_deposit(
        user_account: &T::AccountId,
        payee: &T::AccountId,
        deposit: Balance,
        unpaid: Balance,
    ) -> DispatchResult {
        let reason: T::RuntimeHoldReason = HoldReason::PaymentStreamDeposit.into();
        let covered = unpaid.min(deposit);
        if covered > 0 {
            T::NativeBalance::transfer_on_hold(
                &reason,
                user_account,
                payee,
                covered,
                Precision::BestEffort,
                Restriction::Free,
                Fortitude::Polite,
            )?;
            log::warn!(
                target: LOG_TARGET,
                "{} owed by {:?} were paid from its deposit, {} were left unpaid",
                covered,
                user_account,
                unpaid - covered
            );
        }
        T::NativeBalance::release(
            &reason,
            user_account,
            deposit - covered,
            Precision::BestEffort,
        )?;
        Ok(())
    }

    /// Decrements the User's count of streams. A User with no streams left has no debt to be
    /// flagged for.
    fn unregister_stream(user_account: &T::AccountId) {
        let remaining = RegisteredUsers::<T>::mutate_exists(user_account, |count| {
            let remaining = count.unwrap_or_default().saturating_sub(1);
            *count = (remaining > 0).then_some(remaining);
            remaining
        });

        if remaining == 0 && Self::is_user_without_funds(user_account) {
            Self::unflag_user(user_account);
        }
    }

    fn has_streams_out_of_funds(user_account: &T::AccountId) -> bool {
        FixedRatePaymentStreams::<T>::iter()
            .any(|(_, user, stream)| user == *user_account && stream.out_of_funds_tick.is_some())
            || DynamicRatePaymentStreams::<T>::iter().any(|(_, user, stream)| {
                user == *user_account && stream.out_of_funds_tick.is_some()
            })
    }

    fn flag_user_without_funds(user_account: &T::AccountId) {
        if UsersWithoutFunds::<T>::contains_key(user_account) {
            return;
        }

        UsersWithoutFunds::<T>::insert(user_account, ());
        log::warn!(
            target: LOG_TARGET,
            "User {:?} has no funds to pay its payment streams",
            user_account
        );
        Self::deposit_event(Event::<T>::UserWithoutFunds {
            who: user_account.clone(),
        });
    }

    fn unflag_user(user_account: &T::AccountId) {
        UsersWithoutFunds::<T>::remove(user_account);
        Self::deposit_event(Event::<T>::UserSolvent {
            who: user_account.clone(),
        });
    }
}

impl<T: Config> PaymentStreamsInterface for Pallet<T> {
    type AccountId = T::AccountId;

    fn create_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        rate: Balance,
    ) -> DispatchResult {
        Self::do_create_fixed_rate_payment_stream(provider_id, user_account, rate)
    }

    fn update_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        new_rate: Balance,
    ) -> DispatchResult {
        Self::do_update_fixed_rate_payment_stream(provider_id, user_account, new_rate)
    }

    fn delete_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> DispatchResult {
        Self::do_delete_fixed_rate_payment_stream(provider_id, user_account)
    }

    fn get_fixed_rate_payment_stream_rate(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> Option<Balance> {
        Self::get_fixed_rate_payment_stream_info(provider_id, user_account)
            .map(|stream| stream.rate)
    }

    fn create_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        amount_provided: StorageDataUnit,
    ) -> DispatchResult {
        Self::do_create_dynamic_rate_payment_stream(provider_id, user_account, amount_provided)
    }

    fn update_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        new_amount_provided: StorageDataUnit,
    ) -> DispatchResult {
        Self::do_update_dynamic_rate_payment_stream(provider_id, user_account, new_amount_provided)
    }

    fn delete_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> DispatchResult {
        Self::do_delete_dynamic_rate_payment_stream(provider_id, user_account)
    }

    fn get_dynamic_rate_payment_stream_amount_provided(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> Option<StorageDataUnit> {
        Self::get_dynamic_rate_payment_stream_info(provider_id, user_account)
            .map(|stream| stream.amount_provided)
    }
}

impl<T: Config> ReadUserSolvencyInterface for Pallet<T> {
    type AccountId = T::AccountId;

    fn is_user_insolvent(user_account: &Self::AccountId) -> bool {
        Self::is_user_without_funds(user_account)
    }
}
