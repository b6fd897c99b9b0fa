use shp_types::H_LENGTH;
use trie_db::{TrieIterator, TrieLayout};

use crate::{
    error::{ErrorT, ForestStorageError},
    types::{HasherOutT, Leaf, Proven},
    utils::convert_raw_bytes_to_hasher_out,
};

/// Determines the presence and relationship of a challenged file key within a trie structure,
/// by attempting to find leaves that are exact matches or close neighbors to the challenged key.
///
/// Walking the trie this way is what records the nodes of the proof, so the proof of a key
/// that is not in the forest carries the path to its neighbours. That is enough for the
/// verifier to insert the key, and with the extra step on exact matches, to remove it.
///
/// Returns:
/// 1. An exact match.
/// 2. Neighbouring leaves (previous and next to the challenged key).
/// 3. The leaf before the challenged key (if it is greater than the largest key in the trie).
/// 4. The leaf after the challenged key (if it is smaller than the smallest key in the trie).
/// 5. [`Proven::Empty`] if the trie has no leaves.
pub(crate) fn prove<T: TrieLayout>(
    trie: &trie_db::TrieDB<'_, '_, T>,
    challenged_file_key: &HasherOutT<T>,
) -> Result<Proven<HasherOutT<T>, ()>, ErrorT<T>>
where
    HasherOutT<T>: TryFrom<[u8; H_LENGTH]>,
{
    // Create an iterator over the leaf nodes.
    let mut iter = trie
        .into_double_ended_iter()
        .map_err(|_| ForestStorageError::<HasherOutT<T>>::FailedToCreateTrieIterator)?;

    // Position the iterator close to or on the challenged key.
    iter.seek(challenged_file_key.as_ref())?;

    let next = iter.next().transpose()?;
    let prev = iter.next_back().transpose()?;

    let challenged = challenged_file_key.as_ref();
    let neighbours = |left: Option<Leaf<HasherOutT<T>, ()>>,
                      right: Option<Leaf<HasherOutT<T>, ()>>|
     -> Result<Proven<HasherOutT<T>, ()>, ErrorT<T>> {
        Proven::new_neighbour_keys(left, right).map_err(|_| {
            ForestStorageError::<HasherOutT<T>>::FailedToConstructProvenLeaves.into()
        })
    };

    match (prev, next) {
        // Scenario 1: Exact match
        (_, Some((key, _))) if challenged == key.as_slice() => {
            // Recording the neighbours too lets a verifier remove the key from the partial trie.
            iter.next().transpose()?;
            iter.next_back().transpose()?;
            Ok(Proven::new_exact_key(
                convert_raw_bytes_to_hasher_out::<T>(key)?,
                (),
            ))
        }
        // Scenario 2: Between two keys
        (Some((prev_key, _)), Some((next_key, _)))
            if prev_key.as_slice() < challenged && challenged < next_key.as_slice() =>
        {
            let prev_leaf = Leaf::new(convert_raw_bytes_to_hasher_out::<T>(prev_key)?, ());
            let next_leaf = Leaf::new(convert_raw_bytes_to_hasher_out::<T>(next_key)?, ());

            neighbours(Some(prev_leaf), Some(next_leaf))
        }
        // Scenario 3: Before the first leaf
        (None, Some((key, _))) if challenged < key.as_slice() => {
            let leaf = Leaf::new(convert_raw_bytes_to_hasher_out::<T>(key)?, ());

            neighbours(None, Some(leaf))
        }
        // Scenario 4: After the last leaf
        (Some((key, _)), None) if challenged > key.as_slice() => {
            let leaf = Leaf::new(convert_raw_bytes_to_hasher_out::<T>(key)?, ());

            neighbours(Some(leaf), None)
        }
        _ => Ok(Proven::Empty),
    }
}
