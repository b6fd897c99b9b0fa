use codec::{Decode, Encode};
use frame_support::{
    CloneNoBound, EqNoBound, PartialEqNoBound, RuntimeDebug, RuntimeDebugNoBound,
};
use scale_info::TypeInfo;
use shp_types::{
    Balance, BucketId, FileKey, FileLocation, Fingerprint, PeerId, ProviderId, ReplicationTarget,
    StorageDataUnit, TickNumber, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES, H_LENGTH,
};
use sp_std::vec::Vec;

use crate::Config;

/// Metadata of a file as committed to in the forests of the Providers storing it.
pub type FileMetadata =
    shp_file_metadata::FileMetadata<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

/// Proof of the chunks of a file, checked when a Provider confirms it stores it.
pub type FileKeyProof =
    shp_file_key_verifier::FileKeyProof<H_LENGTH, FILE_CHUNK_SIZE, FILE_SIZE_TO_CHALLENGES>;

/// Proof of (non-)inclusion of file keys in a forest.
pub type ForestProof = sp_trie::CompactProof;

/// Ephemeral metadata of a storage request.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct StorageRequestMetadata<T: Config> {
    /// Tick at which the storage request was made.
    ///
    /// It is the starting point of the volunteering threshold of every BSP.
    pub requested_at: TickNumber,
    /// Tick at which the storage request expires if it is not fulfilled.
    pub expires_at: TickNumber,
    /// AccountId of the user who owns the data being stored.
    pub owner: T::AccountId,
    /// Bucket id where this file is stored.
    pub bucket_id: BucketId,
    /// User defined name of the file being stored.
    pub location: FileLocation,
    /// Identifier of the data being stored.
    pub fingerprint: Fingerprint,
    /// Size of the data being stored.
    ///
    /// SPs will use this to determine if they have enough space to store the data.
    /// This is also used to verify that the data sent by the user matches the size specified here.
    pub size: StorageDataUnit,
    /// MSP who is requested to store the data, and whether it already accepted it.
    ///
    /// This is `None` when a storage request is created solely to replicate data to other BSPs.
    pub msp: Option<(ProviderId, bool)>,
    /// Peer Ids of the user who requested the storage.
    ///
    /// SPs will expect a connection request to be initiated by the user with this Peer Id.
    pub user_peer_ids: Vec<PeerId>,
    /// List of storage providers that can serve the data that is requested to be stored.
    ///
    /// This is useful when a BSP stops storing data and automatically creates a new storage
    /// request, since it can serve the data to be replicated to other BSPs without the user
    /// having it stored on their local machine.
    pub data_server_sps: Vec<ProviderId>,
    /// Number of BSPs requested to store the data.
    ///
    /// The storage request will be dropped/complete once all the required BSPs have confirmed
    /// that they are storing the data after volunteering to store it.
    pub bsps_required: ReplicationTarget,
    /// Number of BSPs that have successfully volunteered AND confirmed that they are storing the data.
    ///
    /// This starts at 0 and increases up to `bsps_required`.
    pub bsps_confirmed: ReplicationTarget,
    /// Number of BSPs that have volunteered to store the data.
    ///
    /// There can be more than `bsps_required` volunteers, but it is essentially a race for BSPs
    /// to confirm that they are storing the data.
    pub bsps_volunteered: ReplicationTarget,
    /// Deposit held from the owner when the request was issued, released once it is resolved.
    pub deposit_paid: Balance,
}

impl<T: Config> StorageRequestMetadata<T> {
    pub fn to_file_metadata(&self) -> Result<FileMetadata, shp_file_metadata::FileMetadataError> {
        FileMetadata::new(
            self.owner.encode(),
            self.bucket_id.as_ref().to_vec(),
            self.location.clone(),
            self.size,
            self.fingerprint.into(),
        )
    }

    /// Whether the MSP side of the request is resolved: either there is no MSP or it accepted.
    pub fn msp_resolved(&self) -> bool {
        self.msp.map_or(true, |(_, accepted)| accepted)
    }

    pub fn bsps_fulfilled(&self) -> bool {
        self.bsps_confirmed >= self.bsps_required
    }

    pub fn is_fulfilled(&self) -> bool {
        self.msp_resolved() && self.bsps_fulfilled()
    }
}

/// Ephemeral BSP storage request tracking metadata.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy, Default)]
pub struct StorageRequestBspsMetadata {
    /// Confirmed that the data is being stored.
    pub confirmed: bool,
}

/// Phase 1 of a BSP stopping to store a file. Removed once the BSP confirms it after
/// `MinWaitForStopStoring` ticks.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct PendingStopStoringRequest<T: Config> {
    pub tick_when_requested: TickNumber,
    pub file_owner: T::AccountId,
    pub file_size: StorageDataUnit,
}

/// A storage request that was expired, revoked or rejected after some Provider already stored
/// the file. Anyone can remove those copies, one Provider at a time.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct IncompleteStorageRequestMetadata<T: Config> {
    pub owner: T::AccountId,
    pub bucket_id: BucketId,
    pub location: FileLocation,
    pub file_size: StorageDataUnit,
    pub fingerprint: Fingerprint,
    /// BSPs that confirmed storing the file and still have it in their forest.
    pub pending_bsp_removals: Vec<ProviderId>,
    /// Whether the file still has to be removed from the bucket's forest.
    pub pending_bucket_removal: bool,
}

impl<T: Config> IncompleteStorageRequestMetadata<T> {
    pub fn is_cleaned_up(&self) -> bool {
        self.pending_bsp_removals.is_empty() && !self.pending_bucket_removal
    }
}

/// Why an MSP rejected a storage request.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub enum RejectedStorageRequestReason {
    ReachedMaximumCapacity,
    ReceivedInvalidProof,
    FileKeyAlreadyStored,
    RequestExpired,
    InternalError,
}

#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct RejectedStorageRequest {
    pub file_key: FileKey,
    pub reason: RejectedStorageRequestReason,
}

#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct FileKeyWithProof {
    pub file_key: FileKey,
    pub proof: FileKeyProof,
}

/// Files of a bucket that an MSP accepts, with a single non-inclusion proof for all of them
/// against the bucket's root.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct MspAcceptedBatchStorageRequests {
    pub file_keys_and_proofs: Vec<FileKeyWithProof>,
    pub non_inclusion_forest_proof: ForestProof,
}

/// The response of an MSP to the storage requests of one of its buckets.
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone)]
pub struct MspStorageRequestResponse {
    pub bucket_id: BucketId,
    pub accept: Option<MspAcceptedBatchStorageRequests>,
    pub reject: Vec<RejectedStorageRequest>,
}

/// Errors of [`Pallet::query_earliest_file_volunteer_tick`](crate::Pallet::query_earliest_file_volunteer_tick).
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub enum QueryFileEarliestVolunteerTickError {
    NotABsp,
    StorageRequestNotFound,
    ThresholdArithmeticError,
}

/// Errors of [`Pallet::is_storage_request_open_to_volunteers`](crate::Pallet::is_storage_request_open_to_volunteers).
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub enum IsStorageRequestOpenToVolunteersError {
    StorageRequestNotFound,
}

/// Errors of [`Pallet::query_confirm_chunks_to_prove_for_file`](crate::Pallet::query_confirm_chunks_to_prove_for_file).
#[derive(Encode, Decode, TypeInfo, RuntimeDebug, PartialEq, Eq, Clone, Copy)]
pub enum QueryConfirmChunksToProveForFileError {
    StorageRequestNotFound,
    InvalidFileMetadata,
}
