use shp_types::H_LENGTH;
use trie_db::TrieLayout;

use crate::{
    error::{ErrorT, ForestStorageError},
    types::{FileMetadata, HasherOutT},
};

/// Convert a key read from the trie into the hasher output it was built from.
pub(crate) fn convert_raw_bytes_to_hasher_out<T: TrieLayout>(
    key: Vec<u8>,
) -> Result<HasherOutT<T>, ErrorT<T>>
where
    HasherOutT<T>: TryFrom<[u8; H_LENGTH]>,
{
    let key: [u8; H_LENGTH] = key
        .try_into()
        .map_err(|_| ForestStorageError::<HasherOutT<T>>::FailedToParseKey)?;

    <HasherOutT<T>>::try_from(key)
        .map_err(|_| ForestStorageError::<HasherOutT<T>>::FailedToParseKey.into())
}

/// Decode a leaf value back into the metadata of the file it belongs to.
pub(crate) fn decode_file_metadata<T: TrieLayout>(raw: &[u8]) -> Result<FileMetadata, ErrorT<T>> {
    FileMetadata::decode_leaf(raw)
        .map_err(|_| ForestStorageError::<HasherOutT<T>>::FailedToDecodeValue.into())
}
