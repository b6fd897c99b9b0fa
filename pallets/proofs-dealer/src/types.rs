use codec::{Decode, Encode, MaxEncodedLen};
use frame_support::pallet_prelude::*;
use scale_info::TypeInfo;
use shp_types::{MerkleHash, TickNumber};
use sp_std::collections::btree_map::BTreeMap;

/// A Provider's answer to the challenges of one tick.
///
/// The forest proof shows which file keys answer the challenges, and there is one key proof
/// for every file key it proves to be in the forest.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct Proof<F, K> {
    pub forest_proof: F,
    /// Keyed by the file keys the forest proof proves.
    pub key_proofs: BTreeMap<MerkleHash, KeyProof<K>>,
}

/// Proof over the chunks of one file.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct KeyProof<K> {
    pub proof: K,
    /// Number of chunk challenges derived from the seed for this file.
    pub challenge_count: u32,
}

/// Where a Provider is in its challenge cycle.
///
/// The two ticks are one challenge period apart. A missed deadline moves both of them forward a
/// period, as if the Provider had proven the tick it missed.
#[derive(RuntimeDebug, Encode, Decode, TypeInfo, PartialEq, Eq, Clone, Copy, MaxEncodedLen)]
pub struct ProofSubmissionRecord {
    /// Tick whose seed the latest accepted (or missed) proof answered.
    pub last_tick_proven: TickNumber,
    /// Always greater than `last_tick_proven`.
    pub next_tick_to_submit_proof_for: TickNumber,
}

/// A key every Provider has to answer for at the next checkpoint.
///
/// With `should_remove_key` set, a Provider whose proof shows the key in its forest also
/// has the key removed from its root.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, Clone, PartialEq, Eq, MaxEncodedLen)]
pub struct CustomChallenge {
    pub key: MerkleHash,
    pub should_remove_key: bool,
}

/// Reasons a challenge seed can't be returned for a tick.
#[derive(RuntimeDebug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum GetChallengeSeedError {
    /// The seed was pruned from the history.
    TickBeyondLastSeedStored,
    TickIsInTheFuture,
}

/// Reasons the checkpoint challenges of a tick can't be returned.
#[derive(RuntimeDebug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum GetCheckpointChallengesError {
    TickGreaterThanLastCheckpointTick,
    NoCheckpointChallengesInTick,
}

/// Reasons the challenge period of a Provider can't be computed.
#[derive(RuntimeDebug, Clone, Copy, PartialEq, Eq, Encode, Decode, TypeInfo)]
pub enum GetChallengePeriodError {
    ProviderNotRegistered,
}

/// The proof of (non-)inclusion of keys in a Merkle Patricia Forest.
pub type ForestProof = sp_trie::CompactProof;

/// Proof type of the configured file key verifier.
pub type KeyVerifierProofFor<T> = <T as crate::Config>::KeyProof;

/// Syntactic sugar for the proof a Provider submits in the proofs pallet.
pub type ProofFor<T> = Proof<ForestProof, KeyVerifierProofFor<T>>;
