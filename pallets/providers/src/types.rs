use codec::{Decode, Encode};
use frame_support::pallet_prelude::*;
use scale_info::TypeInfo;
use shp_types::{BucketId, MerkleHash, MultiAddress, ProviderId, StorageDataUnit};
use sp_std::vec::Vec;

use crate::Config;

/// Structure that represents a Backup Storage Provider. It holds the total data that the BSP is
/// able to store, the amount of data that it is storing, its libp2p multiaddresses, and the root
/// of the Merkle Patricia Forest of the files it stores.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct BackupStorageProvider<T: Config> {
    pub capacity: StorageDataUnit,
    pub capacity_used: StorageDataUnit,
    pub multiaddresses: Vec<MultiAddress>,
    pub root: MerkleHash,
    pub owner_account: T::AccountId,
}

/// Structure that represents a Main Storage Provider. MSPs do not have a single forest: each
/// bucket they store has its own root.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct MainStorageProvider<T: Config> {
    pub buckets: Vec<BucketId>,
    pub capacity: StorageDataUnit,
    pub capacity_used: StorageDataUnit,
    pub multiaddresses: Vec<MultiAddress>,
    pub owner_account: T::AccountId,
}

/// Structure that represents a Bucket. It holds the root of the Merkle Patricia Forest of its
/// files, the account that owns it and the MSP storing it, if any.
#[derive(Encode, Decode, TypeInfo, RuntimeDebugNoBound, PartialEqNoBound, EqNoBound, CloneNoBound)]
#[scale_info(skip_type_params(T))]
pub struct Bucket<T: Config> {
    pub root: MerkleHash,
    pub user_id: T::AccountId,
    pub msp_id: Option<ProviderId>,
    pub private: bool,
    pub size: StorageDataUnit,
}

/// Either kind of Provider, as registered in the pallet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ProviderKind {
    Backup,
    Main,
}
