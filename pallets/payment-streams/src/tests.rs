use crate::{
    mock::*, AccumulatedPriceIndex, Error, Event, HoldReason, LastSubmittersTickRegistered,
    OnPollTicker, ProviderLastChargeableInfo,
};
use frame_support::{
    assert_err, assert_noop, assert_ok,
    traits::{
        fungible::{InspectHold, Mutate},
        OnPoll,
    },
    weights::WeightMeter,
};
use frame_system::pallet_prelude::BlockNumberFor;
use shp_traits::{PaymentStreamsInterface, ReadUserSolvencyInterface};
use shp_types::AccountId;
use sp_runtime::DispatchError;

fn sign_up_alice_bsp() {
    assert_ok!(StorageProviders::force_bsp_sign_up(
        RuntimeOrigin::root(),
        ALICE,
        ALICE_BSP,
        1_000,
        multiaddresses(),
        200
    ));
}

fn sign_up_bob_msp() {
    assert_ok!(StorageProviders::force_msp_sign_up(
        RuntimeOrigin::root(),
        BOB,
        BOB_MSP,
        1_000,
        multiaddresses(),
        200
    ));
}

fn held_deposit(who: &AccountId) -> u128 {
    Balances::balance_on_hold(&HoldReason::PaymentStreamDeposit.into(), who)
}

fn payment_streams_events() -> Vec<Event<Test>> {
    System::events()
        .into_iter()
        .filter_map(|record| match record.event {
            RuntimeEvent::PaymentStreams(event) => Some(event),
            _ => None,
        })
        .collect()
}

mod fixed_rate_streams {
    use super::*;

    #[test]
    fn create_holds_deposit_and_starts_at_current_tick() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(3);

            // Create a fixed-rate payment stream from Charlie to Alice's BSP
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));

            // The deposit is `NewStreamDeposit` ticks of the rate
            assert_eq!(held_deposit(&CHARLIE), 100);
            assert_eq!(Balances::free_balance(&CHARLIE), 900);

            let stream =
                PaymentStreams::get_fixed_rate_payment_stream_info(&ALICE_BSP, &CHARLIE).unwrap();
            assert_eq!(stream.rate, 10);
            assert_eq!(stream.last_charged_tick, 3);
            assert_eq!(stream.user_deposit, 100);
            assert_eq!(stream.out_of_funds_tick, None);
            assert_eq!(PaymentStreams::get_payment_streams_count_of_user(&CHARLIE), 1);

            System::assert_last_event(
                Event::FixedRatePaymentStreamCreated {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    rate: 10,
                }
                .into(),
            );
        });
    }

    #[test]
    fn create_fails_with_invalid_parameters() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            // Only Root can create payment streams manually
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::signed(CHARLIE),
                    ALICE_BSP,
                    CHARLIE,
                    10
                ),
                DispatchError::BadOrigin
            );

            // The Provider must be registered
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    BOB_MSP,
                    CHARLIE,
                    10
                ),
                Error::<Test>::NotAProvider
            );

            // The rate can't be zero
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    0
                ),
                Error::<Test>::RateCantBeZero
            );

            // The User must be able to pay the deposit
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    200
                ),
                Error::<Test>::CannotHoldDeposit
            );

            // There can only be one fixed-rate payment stream per Provider and User
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    20
                ),
                Error::<Test>::PaymentStreamAlreadyExists
            );
        });
    }

    #[test]
    fn update_charges_old_rate_and_adjusts_deposit() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));

            // Alice proves she stores the data at tick 5
            prove_at(ALICE_BSP, 5);

            // Update the rate of the stream
            assert_ok!(PaymentStreams::update_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                20
            ));

            // Charlie paid 5 ticks at the old rate and 100 more of deposit
            assert_eq!(Balances::free_balance(&ALICE), 1_000 - 200 + 50);
            assert_eq!(held_deposit(&CHARLIE), 200);
            assert_eq!(Balances::free_balance(&CHARLIE), 1_000 - 200 - 50);

            let stream =
                PaymentStreams::get_fixed_rate_payment_stream_info(&ALICE_BSP, &CHARLIE).unwrap();
            assert_eq!(stream.rate, 20);
            assert_eq!(stream.last_charged_tick, 5);

            System::assert_last_event(
                Event::FixedRatePaymentStreamUpdated {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    new_rate: 20,
                }
                .into(),
            );

            // Lowering the rate releases part of the deposit
            assert_ok!(PaymentStreams::update_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                5
            ));
            assert_eq!(held_deposit(&CHARLIE), 50);
        });
    }

    #[test]
    fn update_fails_with_invalid_parameters() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            // The stream must exist
            assert_noop!(
                PaymentStreams::update_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    20
                ),
                Error::<Test>::PaymentStreamNotFound
            );

            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));

            // The new rate must be different and not zero
            assert_noop!(
                PaymentStreams::update_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    10
                ),
                Error::<Test>::UpdateRateToSameRate
            );
            assert_noop!(
                PaymentStreams::update_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    0
                ),
                Error::<Test>::RateCantBeZero
            );
        });
    }

    #[test]
    fn delete_charges_and_releases_deposit() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));
            prove_at(ALICE_BSP, 5);

            // Delete the stream
            assert_ok!(PaymentStreams::delete_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE
            ));

            // Charlie paid 5 ticks and got the whole deposit back
            assert_eq!(Balances::free_balance(&CHARLIE), 950);
            assert_eq!(held_deposit(&CHARLIE), 0);
            assert_eq!(Balances::free_balance(&ALICE), 850);
            assert_eq!(
                PaymentStreams::get_fixed_rate_payment_stream_info(&ALICE_BSP, &CHARLIE),
                None
            );
            assert_eq!(PaymentStreams::get_payment_streams_count_of_user(&CHARLIE), 0);

            System::assert_last_event(
                Event::FixedRatePaymentStreamDeleted {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                }
                .into(),
            );

            // It can't be deleted twice
            assert_noop!(
                PaymentStreams::delete_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE
                ),
                Error::<Test>::PaymentStreamNotFound
            );
        });
    }
}

mod dynamic_rate_streams {
    use super::*;

    #[test]
    fn create_holds_deposit_at_current_price() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            run_to_tick(4);

            assert_ok!(PaymentStreams::create_dynamic_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));

            // Deposit: amount provided x price per unit x `NewStreamDeposit` ticks
            assert_eq!(held_deposit(&CHARLIE), 500);

            let stream =
                PaymentStreams::get_dynamic_rate_payment_stream_info(&ALICE_BSP, &CHARLIE)
                    .unwrap();
            assert_eq!(stream.amount_provided, 50);
            assert_eq!(stream.price_index_when_last_charged, 4);

            System::assert_last_event(
                Event::DynamicRatePaymentStreamCreated {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    amount_provided: 50,
                }
                .into(),
            );
        });
    }

    #[test]
    fn create_and_update_fail_with_invalid_amounts() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            assert_noop!(
                PaymentStreams::create_dynamic_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    0
                ),
                Error::<Test>::AmountProvidedCantBeZero
            );

            assert_ok!(PaymentStreams::create_dynamic_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));

            assert_noop!(
                PaymentStreams::update_dynamic_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    50
                ),
                Error::<Test>::UpdateAmountToSameAmount
            );
            assert_noop!(
                PaymentStreams::update_dynamic_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    0
                ),
                Error::<Test>::AmountProvidedCantBeZero
            );
            assert_noop!(
                PaymentStreams::create_dynamic_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    10
                ),
                Error::<Test>::PaymentStreamAlreadyExists
            );
        });
    }

    #[test]
    fn charge_uses_price_index_of_last_proof() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_dynamic_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));

            // Alice proves at tick 5, registered when the price index is 6
            prove_at(ALICE_BSP, 5);
            assert_eq!(
                PaymentStreams::get_last_chargeable_info(&ALICE_BSP),
                ProviderLastChargeableInfo {
                    last_chargeable_tick: 5,
                    price_index: 6,
                }
            );

            // Time passing without proofs doesn't make more chargeable
            run_to_tick(10);

            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));

            assert_eq!(Balances::free_balance(&CHARLIE), 1_000 - 500 - 300);
            System::assert_last_event(
                Event::PaymentStreamCharged {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    amount: 300,
                }
                .into(),
            );

            let stream =
                PaymentStreams::get_dynamic_rate_payment_stream_info(&ALICE_BSP, &CHARLIE)
                    .unwrap();
            assert_eq!(stream.price_index_when_last_charged, 6);
        });
    }

    #[test]
    fn update_and_delete_through_the_interface() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            // Other pallets manage dynamic-rate streams through the interface
            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::create_dynamic_rate_payment_stream(
                    &ALICE_BSP, &CHARLIE, 20
                )
            );
            assert_eq!(
                <PaymentStreams as PaymentStreamsInterface>::get_dynamic_rate_payment_stream_amount_provided(
                    &ALICE_BSP, &CHARLIE
                ),
                Some(20)
            );

            prove_at(ALICE_BSP, 2);

            // Growing the amount charges the old one and holds more deposit
            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::update_dynamic_rate_payment_stream(
                    &ALICE_BSP, &CHARLIE, 30
                )
            );
            assert_eq!(held_deposit(&CHARLIE), 300);
            assert_eq!(Balances::free_balance(&CHARLIE), 1_000 - 300 - 20 * 3);

            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::delete_dynamic_rate_payment_stream(
                    &ALICE_BSP, &CHARLIE
                )
            );
            assert_eq!(held_deposit(&CHARLIE), 0);
            assert_eq!(
                <PaymentStreams as PaymentStreamsInterface>::get_dynamic_rate_payment_stream_amount_provided(
                    &ALICE_BSP, &CHARLIE
                ),
                None
            );

            // Interface calls don't emit events of their own
            assert!(!payment_streams_events().iter().any(|event| matches!(
                event,
                Event::DynamicRatePaymentStreamCreated { .. }
                    | Event::DynamicRatePaymentStreamUpdated { .. }
                    | Event::DynamicRatePaymentStreamDeleted { .. }
            )));
        });
    }
}

mod charging {
    use super::*;

    #[test]
    fn charge_fails_if_caller_is_not_a_provider_or_stream_missing() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            assert_noop!(
                PaymentStreams::charge_payment_streams(RuntimeOrigin::signed(CHARLIE), BOB),
                Error::<Test>::NotAProvider
            );
            assert_noop!(
                PaymentStreams::charge_payment_streams(RuntimeOrigin::signed(ALICE), CHARLIE),
                Error::<Test>::PaymentStreamNotFound
            );
        });
    }

    #[test]
    fn bsp_without_proofs_charges_nothing() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                10
            ));
            run_to_tick(20);

            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));

            assert_eq!(Balances::free_balance(&CHARLIE), 900);
            System::assert_last_event(
                Event::PaymentStreamCharged {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    amount: 0,
                }
                .into(),
            );
        });
    }

    #[test]
    fn msp_charges_up_to_current_tick() {
        ExtBuilder::build().execute_with(|| {
            sign_up_bob_msp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                BOB_MSP,
                CHARLIE,
                10
            ));
            run_to_tick(3);

            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(BOB),
                CHARLIE
            ));

            assert_eq!(Balances::free_balance(&BOB), 1_000 - 200 + 30);
            let stream =
                PaymentStreams::get_fixed_rate_payment_stream_info(&BOB_MSP, &CHARLIE).unwrap();
            assert_eq!(stream.last_charged_tick, 3);
        });
    }

    #[test]
    fn user_without_funds_is_flagged() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            sign_up_bob_msp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));

            // 20 ticks proven at 50 per tick is more than Charlie's free balance
            prove_at(ALICE_BSP, 20);
            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));

            // Nothing was transferred and Charlie is flagged
            assert_eq!(Balances::free_balance(&CHARLIE), 500);
            assert!(<PaymentStreams as ReadUserSolvencyInterface>::is_user_insolvent(&CHARLIE));
            System::assert_has_event(Event::UserWithoutFunds { who: CHARLIE }.into());
            let stream =
                PaymentStreams::get_fixed_rate_payment_stream_info(&ALICE_BSP, &CHARLIE).unwrap();
            assert_eq!(stream.out_of_funds_tick, Some(21));
            assert_eq!(stream.last_charged_tick, 0);

            // A flagged User can't open new payment streams
            assert_noop!(
                PaymentStreams::create_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    BOB_MSP,
                    CHARLIE,
                    1
                ),
                Error::<Test>::UserWithoutFunds
            );

            // Nor can its streams be updated until it pays
            assert_noop!(
                PaymentStreams::update_fixed_rate_payment_stream(
                    RuntimeOrigin::root(),
                    ALICE_BSP,
                    CHARLIE,
                    10
                ),
                Error::<Test>::UserWithoutFunds
            );
        });
    }

    #[test]
    fn flagged_user_that_pays_is_unflagged() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));
            prove_at(ALICE_BSP, 20);
            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));
            assert!(PaymentStreams::is_user_without_funds(&CHARLIE));

            // Charlie gets funds and is charged again
            assert_ok!(<Balances as Mutate<AccountId>>::mint_into(&CHARLIE, 1_000));
            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));

            assert_eq!(Balances::free_balance(&CHARLIE), 500);
            assert!(!PaymentStreams::is_user_without_funds(&CHARLIE));
            System::assert_has_event(Event::UserSolvent { who: CHARLIE }.into());
            System::assert_last_event(
                Event::PaymentStreamCharged {
                    user_account: CHARLIE,
                    provider_id: ALICE_BSP,
                    amount: 1_000,
                }
                .into(),
            );
        });
    }

    #[test]
    fn deleting_stream_of_user_without_funds_pays_from_deposit() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));
            prove_at(ALICE_BSP, 20);
            assert_ok!(PaymentStreams::charge_payment_streams(
                RuntimeOrigin::signed(ALICE),
                CHARLIE
            ));

            assert_ok!(PaymentStreams::delete_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE
            ));

            // The whole deposit went to Alice, the rest of the debt is lost
            assert_eq!(Balances::free_balance(&ALICE), 1_000 - 200 + 500);
            assert_eq!(Balances::free_balance(&CHARLIE), 500);
            assert_eq!(held_deposit(&CHARLIE), 0);

            // Without streams, Charlie is no longer flagged
            assert!(!<PaymentStreams as ReadUserSolvencyInterface>::is_user_insolvent(&CHARLIE));
            System::assert_has_event(Event::UserSolvent { who: CHARLIE }.into());
        });
    }

    #[test]
    fn update_fails_if_user_cannot_pay() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            assert_ok!(PaymentStreams::create_fixed_rate_payment_stream(
                RuntimeOrigin::root(),
                ALICE_BSP,
                CHARLIE,
                50
            ));
            prove_at(ALICE_BSP, 20);

            assert_err!(
                <PaymentStreams as PaymentStreamsInterface>::update_fixed_rate_payment_stream(
                    &ALICE_BSP, &CHARLIE, 10
                ),
                Error::<Test>::UserWithoutFunds
            );
            assert_eq!(
                <PaymentStreams as PaymentStreamsInterface>::get_fixed_rate_payment_stream_rate(
                    &ALICE_BSP, &CHARLIE
                ),
                Some(50)
            );
        });
    }
}

mod last_chargeable_info {
    use super::*;

    #[test]
    fn on_poll_advances_ticker_and_price_index() {
        ExtBuilder::build().execute_with(|| {
            run_to_tick(3);

            assert_eq!(OnPollTicker::<Test>::get(), 3);
            assert_eq!(AccumulatedPriceIndex::<Test>::get(), 3);
            assert_eq!(PaymentStreams::get_accumulated_price_index(), 3);
        });
    }

    #[test]
    fn proof_submitters_of_previous_tick_are_registered_once() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();

            prove_at(ALICE_BSP, 4);

            System::assert_last_event(
                Event::LastChargeableInfoUpdated {
                    provider_id: ALICE_BSP,
                    last_chargeable_tick: 4,
                    last_chargeable_price_index: 5,
                }
                .into(),
            );
            assert_eq!(LastSubmittersTickRegistered::<Test>::get(), 4);

            // Polling again in the same tick of the proofs dealer doesn't register them again
            let events = System::events().len();
            <PaymentStreams as OnPoll<BlockNumberFor<Test>>>::on_poll(
                System::block_number(),
                &mut WeightMeter::new(),
            );
            assert_eq!(System::events().len(), events);
            assert_eq!(
                PaymentStreams::get_last_chargeable_info(&ALICE_BSP).last_chargeable_tick,
                4
            );
        });
    }

    #[test]
    fn queries_list_streams_by_provider_and_user() {
        ExtBuilder::build().execute_with(|| {
            sign_up_alice_bsp();
            sign_up_bob_msp();
            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::create_fixed_rate_payment_stream(
                    &BOB_MSP, &CHARLIE, 5
                )
            );
            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::create_dynamic_rate_payment_stream(
                    &ALICE_BSP, &CHARLIE, 10
                )
            );
            assert_ok!(
                <PaymentStreams as PaymentStreamsInterface>::create_dynamic_rate_payment_stream(
                    &BOB_MSP, &CHARLIE, 10
                )
            );

            assert_eq!(
                PaymentStreams::get_users_with_payment_stream_with_provider(&BOB_MSP),
                vec![CHARLIE]
            );
            assert_eq!(
                PaymentStreams::get_providers_with_payment_stream_with_user(&CHARLIE),
                vec![ALICE_BSP, BOB_MSP]
            );
            assert_eq!(PaymentStreams::get_payment_streams_count_of_user(&CHARLIE), 3);
        });
    }
}
