#![cfg_attr(not(feature = "std"), no_std)]

use codec::{Decode, Encode, HasCompact, MaxEncodedLen};
use core::fmt::Debug;
use frame_support::{dispatch::DispatchResult, Parameter};
use scale_info::TypeInfo;
use shp_types::{
    Balance, BucketId, FileKey, MerkleHash, ProviderId, RandomnessOutput, StorageDataUnit,
    TickNumber,
};
use sp_core::Hasher;
use sp_runtime::{traits::Member, DispatchError};
use sp_std::{collections::btree_set::BTreeSet, vec::Vec};
use sp_trie::MemoryDB;

#[derive(Encode)]
pub struct AsCompact<T: HasCompact>(#[codec(compact)] pub T);

/// Whether a challenged key is expected to be present in the commitment being proven.
///
/// Used when the caller knows the answer beforehand, e.g. a BSP confirming it stores a new file
/// must prove the file key is *not* yet in its forest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, TypeInfo, MaxEncodedLen)]
pub enum ChallengeKeyInclusion {
    Included,
    NotIncluded,
}

#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub struct TrieAddMutation {
    pub value: Vec<u8>,
}

impl TrieAddMutation {
    pub fn new(value: Vec<u8>) -> Self {
        Self { value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default, Encode, Decode, TypeInfo)]
pub struct TrieRemoveMutation;

/// A change to a single key of a Merkle Patricia Forest.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum TrieMutation {
    Add(TrieAddMutation),
    Remove(TrieRemoveMutation),
}

impl From<TrieAddMutation> for TrieMutation {
    fn from(mutation: TrieAddMutation) -> Self {
        TrieMutation::Add(mutation)
    }
}

impl From<TrieRemoveMutation> for TrieMutation {
    fn from(mutation: TrieRemoveMutation) -> Self {
        TrieMutation::Remove(mutation)
    }
}

/// A verifier of proofs against a cryptographic commitment.
pub trait CommitmentVerifier {
    /// The type that represents the proof.
    type Proof;
    /// The type that represents the commitment (e.g. a Merkle root)
    type Commitment;
    /// The type that represents the challenges which a proof is being verified against.
    type Challenge: Ord;

    /// Verify a proof against a commitment and a set of challenges.
    ///
    /// Returns the set of keys that the proof actually proves, which is not necessarily the
    /// same as the challenges (e.g. neighbouring keys for a non-existent challenged key).
    fn verify_proof(
        expected_commitment: &Self::Commitment,
        challenges: &[Self::Challenge],
        proof: &Self::Proof,
    ) -> Result<BTreeSet<Self::Challenge>, DispatchError>;
}

/// A [`CommitmentVerifier`] that can also enforce the expected inclusion of each challenge.
pub trait InclusionProofVerifier: CommitmentVerifier {
    fn verify_proof_with_inclusion(
        expected_commitment: &Self::Commitment,
        challenges: &[(Self::Challenge, Option<ChallengeKeyInclusion>)],
        proof: &Self::Proof,
    ) -> Result<BTreeSet<Self::Challenge>, DispatchError>;
}

/// Applies a batch of mutations to a partial trie reconstructed from a proof.
pub trait ProofDeltaApplier<H: Hasher> {
    type Proof;
    type Key;

    /// Returns the partial trie after the mutations, its new root, and for every mutated key
    /// the value it held before the mutation.
    fn apply_delta(
        root: &H::Out,
        mutations: &[(Self::Key, TrieMutation)],
        proof: &Self::Proof,
    ) -> Result<(MemoryDB<H>, H::Out, Vec<(Self::Key, Option<Vec<u8>>)>), DispatchError>;
}

/// A trait to read information about Storage Providers present in the registry, such as if
/// they are a BSP or MSP, their stake, capacity and forest root.
pub trait ReadProvidersInterface {
    /// Type that can be used to identify accounts.
    type AccountId: Parameter + Member + Debug + Ord + MaxEncodedLen;

    /// Get the Provider ID owned by an account, if any.
    fn get_provider_id(who: &Self::AccountId) -> Option<ProviderId>;

    fn get_owner_account(provider_id: &ProviderId) -> Option<Self::AccountId>;

    fn is_bsp(provider_id: &ProviderId) -> bool;

    fn is_msp(provider_id: &ProviderId) -> bool;

    fn is_provider(provider_id: &ProviderId) -> bool {
        Self::is_bsp(provider_id) || Self::is_msp(provider_id)
    }

    fn get_stake(provider_id: &ProviderId) -> Option<Balance>;

    /// Minimum stake a Provider needs to be a participant of the network.
    fn get_min_stake() -> Balance;

    /// Forest root of a BSP. MSPs keep one root per bucket instead.
    fn get_root(provider_id: &ProviderId) -> Option<MerkleHash>;

    fn get_default_root() -> MerkleHash;

    fn get_capacity(provider_id: &ProviderId) -> StorageDataUnit;

    fn get_used_capacity(provider_id: &ProviderId) -> StorageDataUnit;

    fn available_capacity(provider_id: &ProviderId) -> StorageDataUnit;

    fn is_provider_insolvent(provider_id: &ProviderId) -> bool;
}

/// A trait to mutate the state of Storage Providers present in the registry.
pub trait MutateProvidersInterface: ReadProvidersInterface {
    fn update_root(provider_id: &ProviderId, new_root: MerkleHash) -> DispatchResult;

    /// Increase the used capacity of a Storage Provider. To be called when confirming that
    /// it's storing a new file.
    fn increase_capacity_used(provider_id: &ProviderId, delta: StorageDataUnit) -> DispatchResult;

    /// Decrease the used capacity of a Storage Provider. To be called when a file is removed
    /// from its forest.
    fn decrease_capacity_used(provider_id: &ProviderId, delta: StorageDataUnit) -> DispatchResult;
}

/// A trait to read information about buckets registered in the system, such as their owner and
/// the MSP ID of the MSP that's storing it.
pub trait ReadBucketsInterface {
    /// Type that can be used to identify accounts.
    type AccountId: Parameter + Member + Debug + Ord + MaxEncodedLen;

    fn bucket_exists(bucket_id: &BucketId) -> bool;

    /// Get the MSP ID of the MSP that's storing a bucket.
    fn get_msp_of_bucket(bucket_id: &BucketId) -> Option<ProviderId>;

    fn is_bucket_stored_by_msp(msp_id: &ProviderId, bucket_id: &BucketId) -> bool {
        Self::get_msp_of_bucket(bucket_id).as_ref() == Some(msp_id)
    }

    fn get_bucket_owner(bucket_id: &BucketId) -> Option<Self::AccountId>;

    fn is_bucket_owner(who: &Self::AccountId, bucket_id: &BucketId) -> bool {
        Self::get_bucket_owner(bucket_id).as_ref() == Some(who)
    }

    fn get_root_bucket(bucket_id: &BucketId) -> Option<MerkleHash>;

    fn get_bucket_size(bucket_id: &BucketId) -> Option<StorageDataUnit>;

    /// Derive the Bucket Id of a bucket from its owner and name.
    fn derive_bucket_id(owner: &Self::AccountId, name: &[u8]) -> BucketId;
}

/// A trait to change the state of buckets registered in the system.
pub trait MutateBucketsInterface: ReadBucketsInterface {
    /// Add a new bucket, optionally stored by an MSP, owned by `owner`.
    fn add_bucket(
        msp_id: Option<ProviderId>,
        owner: &Self::AccountId,
        bucket_id: BucketId,
        private: bool,
    ) -> DispatchResult;

    fn change_root_bucket(bucket_id: &BucketId, new_root: MerkleHash) -> DispatchResult;

    fn increase_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult;

    fn decrease_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult;

    /// Detach the bucket from its MSP, releasing the capacity the MSP was using for it.
    fn unassign_msp_from_bucket(bucket_id: &BucketId) -> DispatchResult;
}

/// The interface of the Proofs Dealer, used by other components to verify proofs, apply
/// mutations to forests and manage Providers' challenge cycles.
pub trait ProofsDealerInterface {
    /// Proof of (non-)inclusion of keys in a Merkle Patricia Forest.
    type ForestProof;
    /// Proof of a file's chunks against its fingerprint.
    type KeyProof;

    /// Verify a proof against the current forest root of `provider_id`.
    fn verify_forest_proof(
        provider_id: &ProviderId,
        challenges: &[(MerkleHash, Option<ChallengeKeyInclusion>)],
        proof: &Self::ForestProof,
    ) -> Result<BTreeSet<MerkleHash>, DispatchError>;

    /// Verify a proof against an arbitrary root, e.g. a bucket root.
    fn verify_generic_forest_proof(
        root: &MerkleHash,
        challenges: &[(MerkleHash, Option<ChallengeKeyInclusion>)],
        proof: &Self::ForestProof,
    ) -> Result<BTreeSet<MerkleHash>, DispatchError>;

    fn verify_key_proof(
        file_key: &FileKey,
        challenges: &[RandomnessOutput],
        proof: &Self::KeyProof,
    ) -> Result<BTreeSet<RandomnessOutput>, DispatchError>;

    /// Deterministically derive `count` challenges for `provider_id` from `seed`.
    fn generate_challenges_from_seed(
        seed: RandomnessOutput,
        provider_id: &ProviderId,
        count: u32,
    ) -> Vec<RandomnessOutput>;

    /// Apply mutations to the forest of `provider_id`, returning the resulting root.
    /// The Provider's root in the registry is not updated.
    fn apply_delta(
        provider_id: &ProviderId,
        mutations: &[(MerkleHash, TrieMutation)],
        proof: &Self::ForestProof,
    ) -> Result<MerkleHash, DispatchError>;

    /// Apply mutations to the forest committed to by `root`, returning the resulting root.
    fn generic_apply_delta(
        root: &MerkleHash,
        mutations: &[(MerkleHash, TrieMutation)],
        proof: &Self::ForestProof,
    ) -> Result<MerkleHash, DispatchError>;

    /// Enqueue a challenge for the next checkpoint.
    fn challenge(key: &MerkleHash) -> DispatchResult;

    /// Enqueue a challenge with priority, optionally forcing its removal from every forest
    /// that proves it.
    fn challenge_with_priority(key: &MerkleHash, should_remove_key: bool) -> DispatchResult;

    /// Start (or restart) the challenge cycle of a Provider from the current tick.
    fn initialise_challenge_cycle(provider_id: &ProviderId) -> DispatchResult;

    /// Stop challenging a Provider, e.g. because it no longer stores any file.
    fn stop_challenge_cycle(provider_id: &ProviderId) -> DispatchResult;
}

/// Information about Providers that submitted proofs, used to charge and slash them.
pub trait ProofSubmittersInterface {
    /// The current tick of the challenges ticker.
    fn get_current_tick() -> TickNumber;

    /// The Providers that submitted a valid proof in `tick`, if any.
    fn get_proof_submitters_for_tick(tick: &TickNumber) -> Option<BTreeSet<ProviderId>>;

    fn get_accrued_failed_proof_submissions(provider_id: &ProviderId) -> Option<u32>;

    fn clear_accrued_failed_proof_submissions(provider_id: &ProviderId);
}

/// Management of the payment streams between users and Providers.
pub trait PaymentStreamsInterface {
    /// Type that can be used to identify accounts.
    type AccountId: Parameter + Member + Debug + Ord + MaxEncodedLen;

    fn create_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        rate: Balance,
    ) -> DispatchResult;

    fn update_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        new_rate: Balance,
    ) -> DispatchResult;

    fn delete_fixed_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> DispatchResult;

    /// Current rate of a fixed-rate payment stream, if it exists.
    fn get_fixed_rate_payment_stream_rate(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> Option<Balance>;

    fn create_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        amount_provided: StorageDataUnit,
    ) -> DispatchResult;

    fn update_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
        new_amount_provided: StorageDataUnit,
    ) -> DispatchResult;

    fn delete_dynamic_rate_payment_stream(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> DispatchResult;

    /// Amount provided by a dynamic-rate payment stream, if it exists.
    fn get_dynamic_rate_payment_stream_amount_provided(
        provider_id: &ProviderId,
        user_account: &Self::AccountId,
    ) -> Option<StorageDataUnit>;
}

/// Solvency of users as seen by the payment streams.
pub trait ReadUserSolvencyInterface {
    /// Type that can be used to identify accounts.
    type AccountId: Parameter + Member + Debug + Ord + MaxEncodedLen;

    fn is_user_insolvent(user_account: &Self::AccountId) -> bool;
}
