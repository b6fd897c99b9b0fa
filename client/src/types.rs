use codec::Encode;
use shc_file_manager::{in_memory::InMemoryFileStorage, traits::FileStorage};
use shc_forest_manager::{
    in_memory::InMemoryForestStorageHandler, traits::ForestStorageHandler,
};
use sh_runtime::RuntimeEvent;
use shp_types::{
    AccountId, BucketId, FileKey, FileLocation, Fingerprint, PeerId, StorageDataUnit,
    StorageProofsMerkleTrieLayout, TickNumber,
};

/// Key under which the forest of the Provider running this node is kept.
pub const CURRENT_FOREST_KEY: &[u8] = b":current_forest_key";

/// Maximum size of the chunks sent in a single upload request.
pub const BATCH_CHUNK_FILE_TRANSFER_MAX_SIZE: usize = 2 * 1024 * 1024;

pub type ForestStorageKey = Vec<u8>;

pub type FileMetadata = shc_file_manager::types::FileMetadata;
pub type FileKeyProof = shc_file_manager::types::FileKeyProof;

/// A StorageHub node must [`FileStorage`] and a [`ForestStorageHandler`] to store and retrieve
/// Files and Forests, respectively.
///
/// A [`ShRole`] and a [`ShStorageLayer`] together define a [`ShNodeType`].
pub trait ShNodeType: Send + Sync + 'static {
    type FL: FileStorageT;
    type FSH: BspForestStorageHandlerT;
}

pub trait ShRole {}

/// Role of a node run by a Backup Storage Provider.
pub struct BspProvider;
impl ShRole for BspProvider {}

pub trait ShStorageLayer {}

/// Files and forests are kept in memory, and lost when the node stops.
pub struct InMemoryStorageLayer;
impl ShStorageLayer for InMemoryStorageLayer {}

impl ShNodeType for (BspProvider, InMemoryStorageLayer) {
    type FL = InMemoryFileStorage<StorageProofsMerkleTrieLayout>;
    type FSH = InMemoryForestStorageHandler;
}

/// [`FileStorage`] over the [`StorageProofsMerkleTrieLayout`] the runtime verifies against.
pub trait FileStorageT: FileStorage<StorageProofsMerkleTrieLayout> + Send + Sync {}
impl FileStorageT for InMemoryFileStorage<StorageProofsMerkleTrieLayout> {}

/// Forest storage handler a BSP node can run with.
pub trait BspForestStorageHandlerT:
    ForestStorageHandler<Key = ForestStorageKey> + Clone + Send + Sync + 'static
{
}
impl BspForestStorageHandlerT for InMemoryForestStorageHandler {}

/// A file whose storage is waiting to be confirmed on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmStoringRequest {
    pub file_key: FileKey,
    pub try_count: u32,
}

impl ConfirmStoringRequest {
    pub fn new(file_key: FileKey) -> Self {
        Self {
            file_key,
            try_count: 0,
        }
    }

    pub fn increment_try_count(&mut self) {
        self.try_count += 1;
    }
}

/// A user asked the network to store a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStorageRequest {
    pub who: AccountId,
    pub file_key: FileKey,
    pub bucket_id: BucketId,
    pub location: FileLocation,
    pub fingerprint: Fingerprint,
    pub size: StorageDataUnit,
    pub user_peer_ids: Vec<PeerId>,
    pub expires_at: TickNumber,
}

impl NewStorageRequest {
    pub fn from_runtime_event(event: &RuntimeEvent) -> Option<Self> {
        match event {
            RuntimeEvent::FileSystem(pallet_file_system::Event::NewStorageRequest {
                who,
                file_key,
                bucket_id,
                location,
                fingerprint,
                size,
                peer_ids,
                expires_at,
            }) => Some(Self {
                who: who.clone(),
                file_key: *file_key,
                bucket_id: *bucket_id,
                location: location.clone(),
                fingerprint: *fingerprint,
                size: *size,
                user_peer_ids: peer_ids.clone(),
                expires_at: *expires_at,
            }),
            _ => None,
        }
    }

    /// The metadata of the file, as committed to by its file key.
    pub fn file_metadata(&self) -> Result<FileMetadata, shp_file_metadata::FileMetadataError> {
        FileMetadata::new(
            self.who.encode(),
            self.bucket_id.as_ref().to_vec(),
            self.location.clone(),
            self.size,
            self.fingerprint.into(),
        )
    }
}
