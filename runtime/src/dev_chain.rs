//! Block production on top of a natively executed state.
//!
//! Transactions are signed with the development keyring when they are applied, using the nonce
//! the signer has at that point. Root calls are wrapped in `sudo` and signed by the sudo key.

use codec::Encode;
use shp_types::TickNumber;
use sp_keyring::Sr25519Keyring;
use sp_runtime::{
    traits::Header as _,
    transaction_validity::{InvalidTransaction, TransactionValidityError, UnknownTransaction},
    ApplyExtrinsicResult, DispatchError,
};

use crate::{
    genesis_config_presets::GenesisConfig, AccountId, BlockNumber, EventRecord, Executive, Hash,
    Header, ProofsDealer, Runtime, RuntimeCall, SignedPayload, System, TxExtension,
    UncheckedExtrinsic, LOG_TARGET,
};

/// Who a [`Transaction`] is dispatched as.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionOrigin {
    Signed(AccountId),
    /// Dispatched through `sudo`.
    Root,
}

/// A call waiting to be signed and included in a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub origin: TransactionOrigin,
    pub call: RuntimeCall,
}

impl Transaction {
    pub fn signed(who: AccountId, call: RuntimeCall) -> Self {
        Self {
            origin: TransactionOrigin::Signed(who),
            call,
        }
    }

    pub fn root(call: RuntimeCall) -> Self {
        Self {
            origin: TransactionOrigin::Root,
            call,
        }
    }
}

/// The state of the chain and the hash of its last block.
pub struct DevChain {
    ext: sp_io::TestExternalities,
    parent_hash: Hash,
}

impl DevChain {
    pub fn new(mut ext: sp_io::TestExternalities) -> Self {
        let parent_hash = ext.execute_with(|| System::block_hash(System::block_number()));
        Self { ext, parent_hash }
    }

    pub fn from_genesis(genesis: GenesisConfig) -> Result<Self, DispatchError> {
        Ok(Self::new(genesis.build()?))
    }

    /// Run `f` against the current state.
    pub fn execute_with<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.ext.execute_with(f)
    }

    pub fn block_number(&mut self) -> BlockNumber {
        self.execute_with(System::block_number)
    }

    pub fn current_tick(&mut self) -> TickNumber {
        self.execute_with(pallet_proofs_dealer::ChallengesTicker::<Runtime>::get)
    }

    pub fn is_ticker_paused(&mut self) -> bool {
        self.execute_with(pallet_proofs_dealer::ChallengesTickerPaused::<Runtime>::get)
    }

    /// Events of the last block.
    pub fn events(&mut self) -> Vec<EventRecord> {
        self.execute_with(System::events)
    }

    /// Build a block with `transactions`, returning the result of applying each of them.
    pub fn next_block(&mut self, transactions: Vec<Transaction>) -> Vec<ApplyExtrinsicResult> {
        let parent_hash = self.parent_hash;
        let (header, results) = self.ext.execute_with(|| {
            let number = System::block_number().saturating_add(1);
            Executive::initialize_block(&Header::new(
                number,
                Default::default(),
                Default::default(),
                parent_hash,
                Default::default(),
            ));
            Executive::inherents_applied();

            let results = transactions
                .into_iter()
                .map(|transaction| sign(transaction).and_then(Executive::apply_extrinsic))
                .collect::<Vec<_>>();

            (Executive::finalize_block(), results)
        });

        self.parent_hash = header.hash();
        log::debug!(
            target: LOG_TARGET,
            "Built block {} ({:?}) at tick {}",
            header.number,
            self.parent_hash,
            self.current_tick()
        );

        results
    }

    /// Build empty blocks until the challenges ticker reaches `tick`.
    ///
    /// Does nothing while the ticker is paused.
    pub fn run_to_tick(&mut self, tick: TickNumber) {
        while self.current_tick() < tick && !self.is_ticker_paused() {
            self.next_block(Vec::new());
        }
    }
}

/// Sign `transaction` with the development key of its signer.
fn sign(transaction: Transaction) -> Result<UncheckedExtrinsic, TransactionValidityError> {
    let (signer, call) = match transaction.origin {
        TransactionOrigin::Signed(who) => (who, transaction.call),
        TransactionOrigin::Root => {
            let key = pallet_sudo::Key::<Runtime>::get()
                .ok_or(TransactionValidityError::Invalid(InvalidTransaction::BadSigner))?;
            let call = RuntimeCall::Sudo(pallet_sudo::Call::sudo {
                call: Box::new(transaction.call),
            });
            (key, call)
        }
    };

    let keyring = Sr25519Keyring::from_account_id(&signer)
        .ok_or(TransactionValidityError::Unknown(UnknownTransaction::CannotLookup))?;

    let extra: TxExtension = (
        frame_system::CheckNonZeroSender::<Runtime>::new(),
        frame_system::CheckNonce::<Runtime>::from(System::account_nonce(&signer)),
        frame_system::CheckWeight::<Runtime>::new(),
        pallet_transaction_payment::ChargeTransactionPayment::<Runtime>::from(0),
    );

    let raw_payload = SignedPayload::new(call.clone(), extra.clone())?;
    let signature = raw_payload.using_encoded(|payload| keyring.sign(payload));

    Ok(UncheckedExtrinsic::new_signed(
        call,
        signer,
        signature.into(),
        extra,
    ))
}
