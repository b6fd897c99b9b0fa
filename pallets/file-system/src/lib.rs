//! # File System Pallet
//!
//! - [`Config`]
//! - [`Call`]
//!
//! ## Overview
//!
//! The file system pallet provides the following functionality:
//!
//! - Manages storage buckets and the storage requests of the files in them
//! - Gates BSP volunteering with a per file and per BSP threshold that opens up over time
//! - Authorises the mutations of the Merkle Patricia Forests of BSPs and buckets
//! - Exposes all file related actions a user or storage provider can execute
//!
//! ## Interface
//!
//! ### Dispatchable Functions
//!
//! - `create_bucket`: Create a new bucket stored by an MSP.
//! - `issue_storage_request`: Issue a new storage request to store a file.
//! - `revoke_storage_request`: Revoke a storage request before it is fulfilled.
//! - `msp_respond_storage_requests_multiple_buckets`: MSP accepts or rejects storage requests.
//! - `msp_stop_storing_bucket`: MSP stops storing a bucket.
//! - `bsp_volunteer`: BSP volunteers to store a file for a given storage request.
//! - `bsp_confirm_storing`: BSP confirms storing a batch of files it volunteered for.
//! - `bsp_request_stop_storing`: BSP starts the two-phase process of stopping storing a file.
//! - `bsp_confirm_stop_storing`: BSP finishes stopping storing a file.
//! - `stop_storing_for_insolvent_user`: Provider drops a file of a user that can't pay.
//! - `delete_file_for_incomplete_storage_request`: Remove copies left by an unfinished request.
//!
//! ## Hooks
//!
//! - `on_idle`: Cleanup all expired storage requests.
#![cfg_attr(not(feature = "std"), no_std)]

pub use pallet::*;

pub mod types;
mod utils;

#[cfg(test)]
mod mock;


pub use types::*;

pub const LOG_TARGET: &str = "runtime::file-system";

#[frame_support::pallet]
pub mod pallet {
    use super::types::*;
    use frame_support::{
        dispatch::DispatchResultWithPostInfo,
        pallet_prelude::*,
        traits::fungible::{hold, Inspect, Mutate},
        Blake2_128Concat,
    };
    use frame_system::pallet_prelude::*;
    use shp_traits::{
        MutateBucketsInterface, MutateProvidersInterface, PaymentStreamsInterface,
        ProofSubmittersInterface, ProofsDealerInterface, ReadBucketsInterface,
        ReadProvidersInterface, ReadUserSolvencyInterface,
    };
    use shp_types::{
        Balance, BucketId, FileKey, FileLocation, Fingerprint, MerkleHash, PeerId, ProviderId,
        ReplicationTarget, StorageDataUnit, ThresholdType, TickNumber,
    };
    use sp_runtime::{traits::Convert, DispatchError};
    use sp_std::vec::Vec;

    #[pallet::config]
    pub trait Config: frame_system::Config {
        /// Because this pallet emits events, it depends on the runtime's definition of an event.
        type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

        /// The Providers pallet, which keeps the roots and capacities of Providers and the
        /// buckets they store.
        type Providers: ReadProvidersInterface<AccountId = Self::AccountId>
            + MutateProvidersInterface
            + ReadBucketsInterface<AccountId = Self::AccountId>
            + MutateBucketsInterface;

        /// The Proofs Dealer pallet, used to verify proofs, apply mutations to forests and read
        /// the current tick.
        type ProofDealer: ProofsDealerInterface<ForestProof = ForestProof, KeyProof = FileKeyProof>
            + ProofSubmittersInterface;

        /// The Payment Streams pallet, through which users pay the Providers storing their files.
        type PaymentStreams: PaymentStreamsInterface<AccountId = Self::AccountId>;

        /// Whether a user is flagged as without funds.
        type UserSolvency: ReadUserSolvencyInterface<AccountId = Self::AccountId>;

        /// Type to access the Balances pallet (using the fungible trait from frame_support)
        type NativeBalance: Inspect<Self::AccountId, Balance = Balance>
            + Mutate<Self::AccountId>
            + hold::Inspect<Self::AccountId, Reason = Self::RuntimeHoldReason>
            + hold::Mutate<Self::AccountId, Reason = Self::RuntimeHoldReason>;

        /// The overarching hold reason
        type RuntimeHoldReason: From<HoldReason>;

        /// Maps a BSP's stake to the starting point of its volunteering threshold for a file
        /// replicated once. Must be non-decreasing: more stake never means volunteering later.
        type StakeToThresholdStart: Convert<Balance, ThresholdType>;

        /// The number of ticks it takes for the volunteering threshold of every BSP to reach its
        /// maximum, from the tick the storage request was issued.
        #[pallet::constant]
        type TickRangeToMaximumThreshold: Get<TickNumber>;

        /// The replication target used when a storage request does not specify one.
        #[pallet::constant]
        type DefaultReplicationTarget: Get<ReplicationTarget>;

        /// Maximum number of BSPs that can store a file.
        #[pallet::constant]
        type MaxReplicationTarget: Get<ReplicationTarget>;

        /// Time-to-live for a storage request, in ticks.
        #[pallet::constant]
        type StorageRequestTtl: Get<TickNumber>;

        /// Maximum number of storage requests expiring in the same tick.
        #[pallet::constant]
        type MaxExpiredItemsInBlock: Get<u32>;

        /// Minimum number of ticks a BSP has to wait between requesting to stop storing a file and
        /// confirming it.
        #[pallet::constant]
        type MinWaitForStopStoring: Get<TickNumber>;

        /// Deposit held from a user when issuing a storage request.
        #[pallet::constant]
        type StorageRequestCreationDeposit: Get<Balance>;

        /// Penalty paid to the treasury by a BSP that stops storing a file.
        #[pallet::constant]
        type BspStopStoringFilePenalty: Get<Balance>;

        /// The rate per tick a user pays to an MSP for each bucket it stores for them.
        #[pallet::constant]
        type BucketFixedRate: Get<Balance>;

        /// Maximum byte size of a file path.
        #[pallet::constant]
        type MaxFilePathSize: Get<u32>;

        /// Maximum number of peer ids a user can provide in a storage request.
        #[pallet::constant]
        type MaxNumberOfPeerIds: Get<u32>;

        /// Maximum number of files a BSP can confirm in a single call.
        #[pallet::constant]
        type MaxBatchConfirmStorageRequests: Get<u32>;

        /// The account that receives the stop storing penalties.
        #[pallet::constant]
        type Treasury: Get<Self::AccountId>;
    }

    #[pallet::pallet]
    #[pallet::without_storage_info]
    pub struct Pallet<T>(_);

    /// The open storage requests, by file key.
    #[pallet::storage]
    pub type StorageRequests<T: Config> =
        StorageMap<_, Blake2_128Concat, FileKey, StorageRequestMetadata<T>>;

    /// The BSPs that volunteered for each storage request, and whether they confirmed.
    ///
    /// Entries are removed together with their storage request.
    #[pallet::storage]
    pub type StorageRequestBsps<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        FileKey,
        Blake2_128Concat,
        ProviderId,
        StorageRequestBspsMetadata,
    >;

    /// A map of ticks to the storage requests that expire in them.
    ///
    /// Each entry holds at most `MaxExpiredItemsInBlock` file keys.
    #[pallet::storage]
    pub type StorageRequestExpirations<T: Config> =
        StorageMap<_, Blake2_128Concat, TickNumber, Vec<FileKey>, ValueQuery>;

    /// The first tick at which a new storage request may expire.
    ///
    /// Storage requests issued while a tick is full are pushed to the following one, and this
    /// never goes back so that expirations keep the order in which requests were issued.
    #[pallet::storage]
    pub type NextAvailableStorageRequestExpirationTick<T: Config> =
        StorageValue<_, TickNumber, ValueQuery>;

    /// The first tick whose expired storage requests have not been cleaned up yet.
    ///
    /// `on_idle` catches up from here to the current tick, so ticks skipped for lack of weight
    /// are cleaned up later.
    #[pallet::storage]
    pub type NextStartingTickToCleanUp<T: Config> = StorageValue<_, TickNumber, ValueQuery>;

    /// The first phase of BSPs stopping storing files, by BSP and file key.
    #[pallet::storage]
    pub type PendingStopStoringRequests<T: Config> = StorageDoubleMap<
        _,
        Blake2_128Concat,
        ProviderId,
        Blake2_128Concat,
        FileKey,
        PendingStopStoringRequest<T>,
    >;

    /// Storage requests that ended without being fulfilled while some Provider already stored
    /// the file.
    #[pallet::storage]
    pub type IncompleteStorageRequests<T: Config> =
        StorageMap<_, Blake2_128Concat, FileKey, IncompleteStorageRequestMetadata<T>>;

    #[pallet::event]
    #[pallet::generate_deposit(pub(super) fn deposit_event)]
    pub enum Event<T: Config> {
        /// Notifies that a new bucket has been created.
        NewBucket {
            who: T::AccountId,
            msp_id: ProviderId,
            bucket_id: BucketId,
            name: Vec<u8>,
            private: bool,
        },

        /// Notifies that a new file has been requested to be stored.
        NewStorageRequest {
            who: T::AccountId,
            file_key: FileKey,
            bucket_id: BucketId,
            location: FileLocation,
            fingerprint: Fingerprint,
            size: StorageDataUnit,
            peer_ids: Vec<PeerId>,
            expires_at: TickNumber,
        },

        /// Notifies that an MSP has accepted storing a batch of files of one of its buckets.
        MspAcceptedStorageRequests {
            msp_id: ProviderId,
            bucket_id: BucketId,
            file_keys: Vec<FileKey>,
            new_bucket_root: MerkleHash,
        },

        /// Notifies that a BSP has been accepted to store a given file.
        AcceptedBspVolunteer {
            bsp_id: ProviderId,
            bucket_id: BucketId,
            location: FileLocation,
            fingerprint: Fingerprint,
            owner: T::AccountId,
            size: StorageDataUnit,
        },

        /// Notifies that a BSP confirmed storing a batch of files.
        BspConfirmedStoring {
            who: T::AccountId,
            bsp_id: ProviderId,
            confirmed_file_keys: Vec<FileKey>,
            skipped_file_keys: Vec<FileKey>,
            new_root: MerkleHash,
        },

        /// Notifies that a storage request for a file key has been fulfilled.
        StorageRequestFulfilled { file_key: FileKey },

        /// Notifies the expiration of a storage request.
        StorageRequestExpired { file_key: FileKey },

        /// Notifies that a storage request has been revoked by the user who initiated it.
        StorageRequestRevoked { file_key: FileKey },

        /// Notifies that a storage request has been rejected by the MSP.
        StorageRequestRejected {
            file_key: FileKey,
            msp_id: ProviderId,
            bucket_id: BucketId,
            reason: RejectedStorageRequestReason,
        },

        /// Notifies that a storage request ended while some Provider stores the file, which now
        /// has to be removed from their forests.
        IncompleteStorageRequest { file_key: FileKey },

        /// Notifies that every copy left by an incomplete storage request was removed.
        IncompleteStorageRequestCleanedUp { file_key: FileKey },

        /// Notifies that a file of an incomplete storage request was removed from a BSP forest,
        /// or from its bucket when `bsp_id` is `None`.
        FileDeletedFromIncompleteStorageRequest {
            file_key: FileKey,
            bsp_id: Option<ProviderId>,
            new_root: MerkleHash,
        },

        /// Notifies that a BSP has opened a request to stop storing a file.
        BspRequestedToStopStoring {
            bsp_id: ProviderId,
            file_key: FileKey,
            owner: T::AccountId,
            location: FileLocation,
        },

        /// Notifies that a BSP has stopped storing a file.
        BspConfirmStoppedStoring {
            bsp_id: ProviderId,
            file_key: FileKey,
            new_root: MerkleHash,
        },

        /// Notifies that a Provider has stopped storing a file of an insolvent user.
        SpStopStoringInsolventUser {
            sp_id: ProviderId,
            file_key: FileKey,
            owner: T::AccountId,
            location: FileLocation,
            new_root: MerkleHash,
        },

        /// Notifies that an MSP has stopped storing a bucket.
        MspStoppedStoringBucket {
            msp_id: ProviderId,
            owner: T::AccountId,
            bucket_id: BucketId,
        },

        /// Notifies that an MSP has stopped storing a bucket of an insolvent user.
        MspStopStoringBucketInsolventUser {
            msp_id: ProviderId,
            owner: T::AccountId,
            bucket_id: BucketId,
        },

        /// Notifies that a BSP's challenge cycle has been initialised, after it confirmed its
        /// first file.
        BspChallengeCycleInitialised {
            who: T::AccountId,
            bsp_id: ProviderId,
        },

        /// The deposit of a storage request could not be given back to its owner.
        FailedToReleaseStorageRequestCreationDeposit {
            file_key: FileKey,
            owner: T::AccountId,
            amount_to_release: Balance,
            error: DispatchError,
        },
    }

    #[pallet::error]
    pub enum Error<T> {
        // General errors
        /// Account is not a registered Storage Provider.
        NotASp,
        /// Account is not a BSP.
        NotABsp,
        /// Account is not an MSP.
        NotAMsp,
        /// The user is flagged as without funds by the payment streams.
        OperationNotAllowedWithInsolventUser,
        /// The Provider is insolvent and can't take new files.
        OperationNotAllowedForInsolventProvider,
        /// The metadata given does not correspond to the file key.
        InvalidFileKeyMetadata,
        /// The deposit could not be held from the user.
        CannotHoldDeposit,
        /// The expiration tick of a storage request would overflow.
        MaxTickNumberReached,
        /// Unreachable: a value that must exist could not be found.
        ImpossibleFailedToGetValue,

        // Bucket errors
        /// Bucket does not exist.
        BucketNotFound,
        /// Account is not the owner of the bucket.
        NotBucketOwner,
        /// The MSP is not storing the bucket.
        MspNotStoringBucket,

        // Storage request errors
        /// Storage request not registered for the given file key.
        StorageRequestNotFound,
        /// Only the owner of a storage request can revoke it.
        StorageRequestNotAuthorized,
        /// There is already an open storage request for the file.
        FileHasActiveStorageRequest,
        /// The file still has copies from an incomplete storage request to be removed.
        FileHasIncompleteStorageRequest,
        /// There is no incomplete storage request for the file.
        IncompleteStorageRequestNotFound,
        /// Files of size zero can't be stored.
        FileSizeCannotBeZero,
        /// The file location exceeds `MaxFilePathSize`.
        FileLocationTooLong,
        /// More peer ids than `MaxNumberOfPeerIds` were given.
        TooManyPeerIds,
        /// A storage request has to be replicated at least once.
        ReplicationTargetCannotBeZero,
        /// The replication target is above `MaxReplicationTarget`.
        ReplicationTargetExceedsMaximum,

        // Volunteering errors
        /// Number of BSPs required for storage request has been reached.
        StorageRequestBspsRequiredFulfilled,
        /// BSP already volunteered to store the given file.
        BspAlreadyVolunteered,
        /// BSP's volunteering threshold does not allow it to volunteer yet.
        BspNotEligibleToVolunteer,
        /// The Provider does not have enough free capacity for the file.
        InsufficientAvailableCapacity,

        // Confirming errors
        /// None of the files given could be confirmed.
        NoFileKeysToConfirm,
        /// More files than `MaxBatchConfirmStorageRequests` were given.
        TooManyStorageRequestResponses,
        /// BSP has not volunteered to store the given file.
        BspNotVolunteered,
        /// BSP has already confirmed storing the given file.
        BspAlreadyConfirmed,
        /// The forest proof is not valid for the Provider's root or does not prove what it
        /// should.
        ForestProofVerificationFailed,
        /// The proof of the file's chunks is not valid.
        KeyProofVerificationFailed,
        /// The forest root could not be updated with the mutations.
        RootNotUpdated,
        /// The MSP was not selected to store the file.
        NotSelectedMsp,
        /// The MSP already accepted storing the file.
        MspAlreadyConfirmed,
        /// The file does not belong to the bucket it was responded for.
        InvalidBucketIdFileKeyPair,

        // Stop storing errors
        /// The BSP already requested to stop storing the file.
        PendingStopStoringRequestAlreadyExists,
        /// The BSP did not request to stop storing the file.
        PendingStopStoringRequestNotFound,
        /// The BSP has to wait `MinWaitForStopStoring` ticks since its request.
        MinWaitForStopStoringNotReached,
        /// The forest proof does not prove the file is stored.
        ExpectedInclusionProof,
        /// The BSP could not pay the penalty for stopping storing a file.
        CannotPayStopStoringPenalty,
        /// The user is not insolvent.
        UserNotInsolvent,
        /// The Provider does not have to remove the file.
        ProviderNotStoringFile,
    }

    /// A reason for the pallet placing a hold on funds.
    #[pallet::composite_enum]
    pub enum HoldReason {
        /// Deposit that a user has to pay to create a storage request
        StorageRequestCreationDeposit,
    }

    #[pallet::call]
    impl<T: Config> Pallet<T> {
        /// Create a new bucket stored by `msp_id`, owned by the caller.
        ///
        /// The bucket id is derived from the owner and `name`. If the runtime charges a fixed
        /// rate per bucket, the fixed-rate payment stream between the owner and the MSP is opened
        /// or increased by it.
        #[pallet::call_index(0)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn create_bucket(
            origin: OriginFor<T>,
            msp_id: ProviderId,
            name: Vec<u8>,
            private: bool,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let bucket_id = Self::do_create_bucket(&who, &msp_id, &name, private)?;

            Self::deposit_event(Event::NewBucket {
                who,
                msp_id,
                bucket_id,
                name,
                private,
            });

            Ok(().into())
        }

        /// Issue a new storage request for a file
        ///
        /// This extrinsic will perform the following checks and logic:
        /// 1. Check that the bucket exists and is owned by the caller
        /// 2. Check the size, location, peer ids and replication target of the file
        /// 3. Check that `msp_id` is an MSP storing the bucket
        /// 4. Check that the caller is not flagged as without funds
        /// 5. Check that there is no active or incomplete storage request for the file
        /// 6. Hold the storage request creation deposit from the caller
        /// 7. Register the storage request and schedule its expiration
        ///
        /// Emits `NewStorageRequest` event when successful, which BSPs listen to in order to
        /// volunteer to store the file.
        #[pallet::call_index(1)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn issue_storage_request(
            origin: OriginFor<T>,
            bucket_id: BucketId,
            location: FileLocation,
            fingerprint: Fingerprint,
            size: StorageDataUnit,
            msp_id: ProviderId,
            peer_ids: Vec<PeerId>,
            replication_target: Option<ReplicationTarget>,
        ) -> DispatchResultWithPostInfo {
            // Check that the extrinsic was signed and get the signer
            let who = ensure_signed(origin)?;

            // Perform validations and register storage request
            let (file_key, request) = Self::do_issue_storage_request(
                &who,
                bucket_id,
                location,
                fingerprint,
                size,
                msp_id,
                peer_ids,
                replication_target,
            )?;

            // BSPs listen to this event and volunteer to store the file
            Self::deposit_event(Event::NewStorageRequest {
                who,
                file_key,
                bucket_id,
                location: request.location,
                fingerprint,
                size,
                peer_ids: request.user_peer_ids,
                expires_at: request.expires_at,
            });

            Ok(().into())
        }

        /// Revoke storage request
        ///
        /// Only the owner of the storage request can revoke it. Its deposit is given back, and if
        /// some Provider already confirmed storing the file an incomplete storage request is
        /// registered so that those copies are removed.
        #[pallet::call_index(2)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn revoke_storage_request(
            origin: OriginFor<T>,
            file_key: FileKey,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            Self::do_revoke_storage_request(&who, &file_key)?;

            Self::deposit_event(Event::StorageRequestRevoked { file_key });

            Ok(().into())
        }

        /// Used by an MSP to accept or reject the storage requests of the buckets it stores.
        ///
        /// Accepted files of each bucket are checked against their key proofs and added to the
        /// bucket's forest in a single mutation, proven by one non-inclusion proof. Rejected
        /// requests are closed.
        #[pallet::call_index(3)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn msp_respond_storage_requests_multiple_buckets(
            origin: OriginFor<T>,
            storage_request_msp_response: Vec<MspStorageRequestResponse>,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            Self::do_msp_respond_storage_requests_multiple_buckets(
                &who,
                storage_request_msp_response,
            )?;

            Ok(().into())
        }

        /// Used by an MSP to stop storing a bucket, releasing the capacity it used.
        #[pallet::call_index(4)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn msp_stop_storing_bucket(
            origin: OriginFor<T>,
            bucket_id: BucketId,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (msp_id, owner) = Self::do_msp_stop_storing_bucket(&who, &bucket_id)?;

            Self::deposit_event(Event::MspStoppedStoringBucket {
                msp_id,
                owner,
                bucket_id,
            });

            Ok(().into())
        }

        /// Used by an MSP to stop storing a bucket of a user flagged as without funds, closing
        /// its fixed-rate payment stream with them.
        #[pallet::call_index(5)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn msp_stop_storing_bucket_for_insolvent_user(
            origin: OriginFor<T>,
            bucket_id: BucketId,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (msp_id, owner) =
                Self::do_msp_stop_storing_bucket_for_insolvent_user(&who, &bucket_id)?;

            Self::deposit_event(Event::MspStopStoringBucketInsolventUser {
                msp_id,
                owner,
                bucket_id,
            });

            Ok(().into())
        }

        /// Used by a BSP to volunteer for storing a file.
        ///
        /// The transaction will fail if the current tick is before the earliest tick at which
        /// the BSP can volunteer, which depends on the XOR between the hash of the file key and
        /// the BSP id and on the BSP's stake. A BSP is strongly advised to check it beforehand
        /// with [`Pallet::query_earliest_file_volunteer_tick`]. Another reason for failure is if
        /// the maximum number of BSPs has been reached.
        #[pallet::call_index(6)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn bsp_volunteer(origin: OriginFor<T>, file_key: FileKey) -> DispatchResultWithPostInfo {
            // Check that the extrinsic was signed and get the signer.
            let who = ensure_signed(origin)?;

            // Perform validations and register Storage Provider as BSP for file.
            let (bsp_id, request) = Self::do_bsp_volunteer(&who, &file_key)?;

            // Emit new BSP volunteer event.
            Self::deposit_event(Event::AcceptedBspVolunteer {
                bsp_id,
                bucket_id: request.bucket_id,
                location: request.location,
                fingerprint: request.fingerprint,
                owner: request.owner,
                size: request.size,
            });

            Ok(().into())
        }

        /// Used by a BSP to confirm it is storing a batch of files it volunteered for.
        ///
        /// This is a best-effort batch: every file is checked on its own (storage request, key
        /// proof and non-inclusion in the BSP's forest) and the ones that fail are skipped. The
        /// rest are added to the BSP's forest in a single mutation, and the call fails only if
        /// none of them could be confirmed.
        ///
        /// The first file confirmed by a BSP with an empty forest starts its challenge cycle.
        #[pallet::call_index(7)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn bsp_confirm_storing(
            origin: OriginFor<T>,
            non_inclusion_forest_proof: ForestProof,
            file_keys_and_proofs: Vec<FileKeyWithProof>,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (bsp_id, confirmed_file_keys, skipped_file_keys, new_root) =
                Self::do_bsp_confirm_storing(
                    &who,
                    &non_inclusion_forest_proof,
                    file_keys_and_proofs,
                )?;

            Self::deposit_event(Event::BspConfirmedStoring {
                who,
                bsp_id,
                confirmed_file_keys,
                skipped_file_keys,
                new_root,
            });

            Ok(().into())
        }

        /// Executed by a BSP to request to stop storing a file.
        ///
        /// The BSP pays a penalty to the treasury and stops being paid for the file straight
        /// away, but has to keep it in its forest until it confirms with
        /// [`Pallet::bsp_confirm_stop_storing`], after `MinWaitForStopStoring` ticks. If there is
        /// an open storage request for the file, one more BSP is required for it (or, if this
        /// BSP confirmed it, its slot is given back). Otherwise a new storage request is created
        /// for a single BSP, with this BSP as data server if `can_serve`.
        #[pallet::call_index(8)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn bsp_request_stop_storing(
            origin: OriginFor<T>,
            file_key: FileKey,
            bucket_id: BucketId,
            location: FileLocation,
            owner: T::AccountId,
            fingerprint: Fingerprint,
            size: StorageDataUnit,
            can_serve: bool,
            inclusion_forest_proof: ForestProof,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let bsp_id = Self::do_bsp_request_stop_storing(
                &who,
                &file_key,
                bucket_id,
                location.clone(),
                &owner,
                fingerprint,
                size,
                can_serve,
                &inclusion_forest_proof,
            )?;

            Self::deposit_event(Event::BspRequestedToStopStoring {
                bsp_id,
                file_key,
                owner,
                location,
            });

            Ok(().into())
        }

        /// Executed by a BSP to confirm it stops storing a file, removing it from its forest.
        ///
        /// Only possible `MinWaitForStopStoring` ticks after the BSP requested it, so that a BSP
        /// can't drop a file the moment it is challenged for it.
        #[pallet::call_index(9)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn bsp_confirm_stop_storing(
            origin: OriginFor<T>,
            file_key: FileKey,
            inclusion_forest_proof: ForestProof,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (bsp_id, new_root) =
                Self::do_bsp_confirm_stop_storing(&who, &file_key, &inclusion_forest_proof)?;

            Self::deposit_event(Event::BspConfirmStoppedStoring {
                bsp_id,
                file_key,
                new_root,
            });

            Ok(().into())
        }

        /// Executed by a Provider to stop storing a file of a user flagged as without funds.
        ///
        /// There is no waiting period nor penalty: the file is removed from the BSP's forest, or
        /// from the bucket's forest for MSPs, straight away.
        #[pallet::call_index(10)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn stop_storing_for_insolvent_user(
            origin: OriginFor<T>,
            file_key: FileKey,
            bucket_id: BucketId,
            location: FileLocation,
            owner: T::AccountId,
            fingerprint: Fingerprint,
            size: StorageDataUnit,
            inclusion_forest_proof: ForestProof,
        ) -> DispatchResultWithPostInfo {
            let who = ensure_signed(origin)?;

            let (sp_id, new_root) = Self::do_sp_stop_storing_for_insolvent_user(
                &who,
                &file_key,
                bucket_id,
                location.clone(),
                &owner,
                fingerprint,
                size,
                &inclusion_forest_proof,
            )?;

            Self::deposit_event(Event::SpStopStoringInsolventUser {
                sp_id,
                file_key,
                owner,
                location,
                new_root,
            });

            Ok(().into())
        }

        /// Remove a file left by an incomplete storage request from the forest of `bsp_id`, or
        /// from its bucket's forest if `bsp_id` is `None`.
        ///
        /// Anyone can call this, with a proof of the file being in that forest.
        #[pallet::call_index(11)]
        #[pallet::weight(Weight::from_parts(10_000, 0) + T::DbWeight::get().writes(1))]
        pub fn delete_file_for_incomplete_storage_request(
            origin: OriginFor<T>,
            file_key: FileKey,
            bsp_id: Option<ProviderId>,
            forest_proof: ForestProof,
        ) -> DispatchResultWithPostInfo {
            ensure_signed(origin)?;

            let new_root =
                Self::do_delete_file_for_incomplete_storage_request(&file_key, bsp_id, &forest_proof)?;

            Self::deposit_event(Event::FileDeletedFromIncompleteStorageRequest {
                file_key,
                bsp_id,
                new_root,
            });

            Ok(().into())
        }
    }

    #[pallet::hooks]
    impl<T: Config> Hooks<BlockNumberFor<T>> for Pallet<T> {
        /// Runs at the end of every block, after every extrinsic.
        ///
        /// Expires the storage requests whose expiration tick has been reached, as far as the
        /// remaining weight allows.
        fn on_idle(_n: BlockNumberFor<T>, remaining_weight: Weight) -> Weight {
            Self::do_expire_storage_requests(remaining_weight)
        }
    }
}
