use codec::Encode;
use shp_file_metadata::Fingerprint;
use sp_trie::MemoryDB;
use trie_db::{TrieDBMutBuilder, TrieLayout, TrieMut};

use crate::types::{FileMetadata, HasherOutT};

/// Metadata of a 64 byte file owned by `owner`, stored at `location` in a bucket.
pub fn file_metadata(owner: &[u8], location: &[u8]) -> FileMetadata {
    FileMetadata::new(
        owner.to_vec(),
        b"bucket".to_vec(),
        location.to_vec(),
        64,
        Fingerprint::default(),
    )
    .unwrap()
}

/// Build a Merkle Patricia Forest.
///
/// Each leaf is the metadata of a file, keyed by its file key.
pub fn build_merkle_patricia_forest<T: TrieLayout>(
) -> (MemoryDB<T::Hash>, HasherOutT<T>, Vec<HasherOutT<T>>) {
    let user_ids = [
        b"01", b"02", b"03", b"04", b"05", b"06", b"07", b"08", b"09", b"10", b"11", b"12", b"13",
        b"14", b"15", b"16", b"17", b"18", b"19", b"20", b"21", b"22", b"23", b"24", b"25", b"26",
        b"27", b"28", b"29", b"30", b"31", b"32",
    ];

    let file_leaves = user_ids
        .iter()
        .map(|user_id| {
            let mut location = user_id.to_vec();
            location.extend_from_slice(b"/sample64b");
            let metadata = file_metadata(b"owner", &location);
            (metadata.file_key::<T::Hash>(), metadata.encode())
        })
        .collect::<Vec<_>>();

    // Construct the Merkle Patricia Forest
    let mut memdb = MemoryDB::<T::Hash>::default();
    let mut root = Default::default();

    let mut file_keys = Vec::new();
    {
        let mut merkle_forest_trie = TrieDBMutBuilder::<T>::new(&mut memdb, &mut root).build();

        // Insert file leaf and metadata into the Merkle Patricia Forest.
        for (file_key, metadata) in &file_leaves {
            merkle_forest_trie
                .insert(file_key.as_ref(), metadata)
                .unwrap();

            file_keys.push(*file_key);
        }
    }
    (memdb, root, file_keys)
}
