//! # Proofs Dealer Pallet
//!
//! Challenges Providers to prove they still store the files they committed to, verifies their
//! proofs and flags the ones that miss their deadlines as slashable.
//!
//! Time is measured in ticks of the challenges ticker, which advances once per block unless it is
//! paused. Each tick gets a challenge seed, from which every Provider derives its own random
//! challenges. Every `CheckpointChallengePeriod` ticks the queued custom challenges are included
//! in a checkpoint that all Providers have to answer in their next proof.
//!
//! A Provider's challenge period is a function of its stake: Providers with more stake submit
//! proofs less often, but for more challenges accumulated.
#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;

pub mod types;
pub mod utils;

#[cfg(test)]
mod mock;

#[cfg(test)]
mod tests;

pub use types::*;

pub const LOG_TARGET: &str = "runtime::proofs-dealer";

#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use frame_support::{
        dispatch::{DispatchResultWithPostInfo, Pays},
        pallet_prelude::*,
        traits::fungible,
        weights::WeightMeter,
        Blake2_128Concat,
    };
    use frame_system::pallet_prelude::*;
    use shp_traits::{
        CommitmentVerifier, InclusionProofVerifier, MutateProvidersInterface, ProofDeltaApplier,
        ReadProvidersInterface,
    };
    use shp_types::{
        Balance, FileKey, Hashing, MerkleHash, ProviderId, RandomnessOutput, TickNumber,
    };
    use sp_runtime::traits::Convert;
    use sp_std::{collections::btree_set::BTreeSet, vec::Vec};
    use sp_trie::CompactProof;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Because this pallet emits events, it depends on the runtime's definition of an event.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// The Providers pallet.
        /// To check if whoever submits a proof is a registered Provider, and to update its root
        /// when checkpoint challenges remove keys from its forest.
        type ProvidersPallet: ReadProvidersInterface<AccountId = Self::AccountId>
            + MutateProvidersInterface;

        /// The type used to charge the fee for manual challenges.
        type NativeBalance: fungible::Inspect<Self::AccountId, Balance = Balance>
            + fungible::Mutate<Self::AccountId>;

        /// The type used to verify Merkle Patricia Forest proofs and to apply mutations to them.
        type ForestVerifier: InclusionProofVerifier<
                Proof = CompactProof,
                Commitment = MerkleHash,
                Challenge = MerkleHash,
            > + ProofDeltaApplier<Hashing, Proof = CompactProof, Key = MerkleHash>;

        /// The proof of the chunks of a single file.
        type KeyProof: Parameter;

        /// The type used to verify the proofs of the chunks of a file.
        type KeyVerifier: CommitmentVerifier<
            Proof = Self::KeyProof,
            Commitment = FileKey,
            Challenge = RandomnessOutput,
        >;

        /// Maps a Provider's stake to the number of ticks between its proofs.
        ///
        /// Must be non-decreasing: more stake never means being challenged more often.
        type StakeToChallengePeriod: Convert<Balance, TickNumber>;

        /// The number of random challenges each Provider has to answer per proof.
        #[pallet::constant]
        type RandomChallengesPerBlock: Get<u32>;

        /// The maximum number of custom challenges included in a checkpoint.
        #[pallet::constant]
        type MaxCustomChallengesPerBlock: Get<u32>;

        /// The length of each of the challenges queues.
        ///
        /// This limits the number of manual challenges waiting for a checkpoint.
        #[pallet::constant]
        type ChallengesQueueLength: Get<u32>;

        /// The number of ticks in between checkpoint challenge rounds.
        ///
        /// These checkpoint challenge rounds have to be answered by ALL Providers, and this is
        /// enforced by the `submit_proof` extrinsic.
        #[pallet::constant]
        type CheckpointChallengePeriod: Get<TickNumber>;

        /// The number of ticks that challenge seeds are kept for. Proofs for older ticks can no
        /// longer be submitted.
        #[pallet::constant]
        type ChallengeHistoryLength: Get<TickNumber>;

        /// The number of ticks a Provider has, after the tick it has to prove, to submit its proof.
        #[pallet::constant]
        type ChallengeTicksTolerance: Get<TickNumber>;

        /// The fee charged for submitting a challenge.
        /// This fee goes to the Treasury, and is used to prevent spam. Registered Providers are
        /// exempt from this fee.
        #[pallet::constant]
        type ChallengesFee: Get<Balance>;

        /// The account to which the fees for submitting a challenge are transferred.
        #[pallet::constant]
        type Treasury: Get<Self::AccountId>;
    }

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(_);

    /// A counter of ticks, used as the time reference of the challenge cycles.
    ///
    /// It is incremented at the start of every block unless it is paused.
    #[pallet::storage]
    pub type ChallengesTicker<T: Config> = StorageValue<_, TickNumber, ValueQuery>;

    /// Whether the challenges ticker is paused.
    #[pallet::storage]
    pub type ChallengesTickerPaused<T: Config> = StorageValue<_, bool, ValueQuery>;

    /// The challenge seed of every tick still in the history.
    ///
    /// Entries older than `ChallengeHistoryLength` ticks are removed.
    #[pallet::storage]
    pub type TickToChallengesSeed<T: Config> =
        StorageMap<_, Twox64Concat, TickNumber, RandomnessOutput>;

    /// The custom challenges included in each checkpoint still in the history.
    #[pallet::storage]
    pub type TickToCheckpointChallenges<T: Config> =
        StorageMap<_, Twox64Concat, TickNumber, Vec<CustomChallenge>>;

    /// The tick of the last checkpoint challenge round.
    #[pallet::storage]
    pub type LastCheckpointTick<T: Config> = StorageValue<_, TickNumber, ValueQuery>;

    /// A queue of keys that have been challenged manually.
    ///
    /// The elements in this queue will be challenged in the coming checkpoints, always
    /// ensuring that the maximum number of custom challenges per checkpoint is not exceeded.
    #[pallet::storage]
    pub type ChallengesQueue<T: Config> = StorageValue<_, Vec<MerkleHash>, ValueQuery>;

    /// A priority queue of keys that have been challenged manually.
    ///
    /// The difference between this and `ChallengesQueue` is that the challenges in this queue
    /// are given priority over the others. So this queue is emptied before any of the challenges
    /// in the `ChallengesQueue` are dispatched. This queue is not accessible to the public.
    #[pallet::storage]
    pub type PriorityChallengesQueue<T: Config> =
        StorageValue<_, Vec<CustomChallenge>, ValueQuery>;

    /// The proof submission record of each Provider with an active challenge cycle.
    #[pallet::storage]
    pub type ProviderToProofSubmissionRecord<T: Config> =
        StorageMap<_, Blake2_128Concat, ProviderId, ProofSubmissionRecord>;

    /// The Providers that have to submit a proof before each tick.
    ///
    /// A Provider is moved forward every time it submits a proof. Those still in an entry when
    /// its tick is reached failed to submit their proof and are marked as slashable.
    #[pallet::storage]
    pub type TickToProvidersDeadlines<T: Config> =
        StorageDoubleMap<_, Twox64Concat, TickNumber, Blake2_128Concat, ProviderId, ()>;

    /// The number of proof submissions each Provider failed since it was last slashed.
    #[pallet::storage]
    pub type SlashableProviders<T: Config> = StorageMap<_, Blake2_128Concat, ProviderId, u32>;

    /// The Providers that submitted a valid proof in each tick still in the history.
    #[pallet::storage]
    pub type ValidProofSubmittersLastTicks<T: Config> =
        StorageMap<_, Twox64Concat, TickNumber, BTreeSet<ProviderId>>;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// A manual challenge was submitted.
        NewChallenge {
            who: T::AccountId,
            key_challenged: MerkleHash,
        },

        /// A priority challenge was submitted.
        NewPriorityChallenge {
            key_challenged: MerkleHash,
            should_remove_key: bool,
        },

        /// A proof was accepted.
        ProofAccepted {
            provider_id: ProviderId,
            last_tick_proven: TickNumber,
        },

        /// A new challenge seed was generated.
        NewChallengeSeed {
            challenges_ticker: TickNumber,
            seed: RandomnessOutput,
        },

        /// A new checkpoint challenge was generated.
        NewCheckpointChallenge {
            challenges_ticker: TickNumber,
            challenges: Vec<CustomChallenge>,
        },

        /// A Provider missed its proof deadline and can be slashed.
        SlashableProvider {
            provider: ProviderId,
            next_challenge_deadline: TickNumber,
        },

        /// A Provider's challenge cycle was initialised.
        NewChallengeCycleInitialised {
            current_tick: TickNumber,
            next_challenge_deadline: TickNumber,
            provider: ProviderId,
        },

        /// The checkpoint challenges of a proof removed keys from the Provider's forest.
        MutationsAppliedForProvider {
            provider_id: ProviderId,
            removed_keys: Vec<MerkleHash>,
            old_root: MerkleHash,
            new_root: MerkleHash,
        },

        /// The challenges ticker was paused or resumed.
        ChallengesTickerSet { paused: bool },
    }

    #[pallet::error]
    pub enum Error<T> {
        // General errors
        /// The proof submitter is not a registered Provider.
        NotProvider,

        // `challenge` extrinsic errors
        /// The ChallengesQueue is full. No more manual challenges can be made
        /// until some of the challenges in the queue are dispatched.
        ChallengesQueueOverflow,

        /// The PriorityChallengesQueue is full. No more priority challenges can be made
        /// until some of the challenges in the queue are dispatched.
        PriorityChallengesQueueOverflow,

        /// The fee for submitting a challenge could not be charged.
        FeeChargeFailed,

        // `submit_proof` extrinsic errors
        /// There are no key proofs submitted.
        EmptyKeyProofs,

        /// The root for the Provider could not be found.
        ProviderRootNotFound,

        /// Provider is submitting a proof when they have a zero root.
        /// Providers with zero roots are not providing any service, so they should not be
        /// submitting proofs.
        ZeroRoot,

        /// Provider is submitting a proof but there is no record of the last tick they
        /// submitted a proof for.
        /// Providers who are required to submit proofs should always have a record of the
        /// last tick they submitted a proof for, otherwise it means they haven't started
        /// providing service for any user yet.
        NoRecordOfLastSubmittedProof,

        /// The Provider's stake could not be found.
        ProviderStakeNotFound,

        /// The tick the Provider has to prove has not been reached yet.
        ChallengesTickNotReached,

        /// The seed of the tick the Provider has to prove is no longer stored.
        ChallengesTickTooOld,

        /// The Provider is submitting a proof after its tolerance window closed.
        ChallengesTickTooLate,

        /// The forest proof submitted by the Provider is invalid.
        /// This could be because the proof is not valid for the root, or because the proof is
        /// not sufficient for the challenges made.
        ForestProofVerificationFailed,

        /// There is at least one key proven in the forest proof, that does not have a
        /// corresponding key proof.
        KeyProofNotFound,

        /// A key proof submitted by the Provider is invalid.
        /// This could be because the proof is not valid for the root of that key, or because
        /// the proof is not sufficient for the challenges made.
        KeyProofVerificationFailed,

        /// The number of key proofs submitted does not match the number of keys proven in the
        /// forest proof.
        IncorrectNumberOfKeyProofs,

        /// Failed to apply delta to the forest proof partial trie.
        FailedToApplyDelta,
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Introduce a new challenge.
        ///
        /// This function allows anyone to add a new challenge to the `ChallengesQueue`.
        /// The challenge will be dispatched in the coming checkpoints.
        /// Regular users are charged a small fee for submitting a challenge, which
        /// goes to the Treasury. Unless the one calling is a registered Provider.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn challenge(origin: OriginFor<T>, key: MerkleHash) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            Self::do_challenge(&who, &key)?;

            Self::deposit_event(Event::<T>::NewChallenge {
                who,
                key_challenged: key,
            });

            Ok(().into())
        }

        /// Introduce a new priority challenge. Only Root can do this.
        ///
        /// If `should_remove_key` is true, every Provider that proves the key is included in its
        /// forest when answering the checkpoint will have it removed.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn priority_challenge(
            origin: OriginFor<T>,
            key: MerkleHash,
            should_remove_key: bool,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::enqueue_challenge_with_priority(&key, should_remove_key)?;

            Self::deposit_event(Event::<T>::NewPriorityChallenge {
                key_challenged: key,
                should_remove_key,
            });

            Ok(().into())
        }

        /// For a Provider to submit a proof.
        ///
        /// Checks that `provider` is a registered Provider. If none is provided, the proof
        /// submitter is considered to be the Provider.
        /// The tick the proof answers is the Provider's `next_tick_to_submit_proof_for`. The proof
        /// has to answer the random challenges of that tick's seed and, if there was a checkpoint
        /// since the last tick the Provider proved, the checkpoint challenges as well.
        ///
        /// If valid:
        /// - Applies the removals requested by the checkpoint challenges it proves.
        /// - Pushes forward the Provider's deadline by its challenge period, unless the removals
        ///   left its forest empty, in which case its challenge cycle is stopped.
        /// - Registers the Provider as a valid submitter for this tick.
        ///
        /// Execution of this extrinsic is refunded if the proof is valid.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn submit_proof(
            origin: OriginFor<T>,
            proof: ProofFor<T>,
            provider: Option<ProviderId>,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            // Getting provider from the origin if none is provided.
            let provider = match provider {
                Some(provider) => provider,
                None => T::ProvidersPallet::get_provider_id(&who).ok_or(Error::<T>::NotProvider)?,
            };

            let last_tick_proven = Self::do_submit_proof(&provider, &proof)?;

            Self::deposit_event(Event::<T>::ProofAccepted {
                provider_id: provider,
                last_tick_proven,
            });

            // Successful proofs are free.
            Ok(Pays::No.into())
        }

        /// Initialise a Provider's challenge cycle. Only Root can do this.
        ///
        /// Sets the last tick the Provider submitted a proof for to the current tick, and sets the
        /// deadlines for submitting a proof from there on.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn force_initialise_challenge_cycle(
            origin: OriginFor<T>,
            provider: ProviderId,
        ) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            Self::do_initialise_challenge_cycle(&provider)?;

            Ok(().into())
        }

        /// Pause or resume the challenges ticker. Only Root can do this.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn set_paused(origin: OriginFor<T>, paused: bool) -> DispatchResultWithPostInfo {
            ensure_root(origin)?;

            ChallengesTickerPaused::<T>::set(paused);

            Self::deposit_event(Event::<T>::ChallengesTickerSet { paused });

            Ok(().into())
        }
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        /// Runs at the start of every block, before any extrinsic.
        ///
        /// Advances the challenges ticker and, for the new tick:
        /// - Generates the challenge seed and prunes the ones out of the history.
        /// - Generates a checkpoint if it's time to.
        /// - Marks the Providers whose deadline is this tick as slashable.
        fn on_poll(_n: BlockNumberFor<T>, weight: &mut WeightMeter) {
            weight.consume(T::DbWeight::get().reads(1));
            if ChallengesTickerPaused::<T>::get() {
                return;
            }

            let tick = ChallengesTicker::<T>::get().saturating_add(1);
            ChallengesTicker::<T>::set(tick);

            Self::do_new_challenge_seed(tick);

            if tick >= LastCheckpointTick::<T>::get().saturating_add(T::CheckpointChallengePeriod::get())
            {
                Self::do_new_checkpoint_challenge(tick);
            }

            Self::do_check_slashable_providers(tick);

            weight.consume(T::DbWeight::get().reads_writes(4, 4));
        }
    }
}
