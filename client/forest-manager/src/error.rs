use trie_db::CError;

use crate::types::HasherOutT;

pub(crate) type ErrorT<T> = Error<HasherOutT<T>, CError<T>>;

type BoxTrieError<H, CodecError> = Box<trie_db::TrieError<H, CodecError>>;

/// Everything that can go wrong reading or writing a forest: either the forest itself refused
/// the operation, or the underlying trie failed.
#[derive(thiserror::Error, Debug)]
pub enum Error<H, CodecError> {
    #[error("Forest storage error: {0}")]
    ForestStorage(ForestStorageError<H>),
    #[error(transparent)]
    Trie(BoxTrieError<H, CodecError>),
}

impl<H, CodecError> From<BoxTrieError<H, CodecError>> for Error<H, CodecError> {
    fn from(e: BoxTrieError<H, CodecError>) -> Self {
        Error::Trie(e)
    }
}

impl<H, CodecError> From<ForestStorageError<H>> for Error<H, CodecError> {
    fn from(e: ForestStorageError<H>) -> Self {
        Error::ForestStorage(e)
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ForestStorageError<H> {
    #[error("Failed to create trie iterator")]
    FailedToCreateTrieIterator,
    #[error("Failed to insert file key: ({0:x?})")]
    FailedToInsertFileKey(H),
    #[error("Failed to remove file key: ({0:x?})")]
    FailedToRemoveFileKey(H),
    /// A batch insertion is all or nothing, so one duplicate rejects the whole batch.
    #[error("File key already in the forest: ({0:x?})")]
    FileKeyAlreadyExists(H),
    #[error("Trie key is not a file key")]
    FailedToParseKey,
    #[error("Trie leaf is not the metadata of a file")]
    FailedToDecodeValue,
    #[error("Failed to generate compact proof")]
    FailedToGenerateCompactProof,
    #[error("Failed to construct proven leaves")]
    FailedToConstructProvenLeaves,
}
