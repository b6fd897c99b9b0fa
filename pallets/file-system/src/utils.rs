use codec::{Decode, Encode};
use frame_support::{
    ensure,
    pallet_prelude::{DispatchResult, Weight},
    traits::{
        fungible::{Mutate, MutateHold},
        tokens::{Precision, Preservation},
        Get,
    },
    weights::WeightMeter,
};
use shp_file_metadata::ChunkId;
use shp_traits::{
    ChallengeKeyInclusion, MutateBucketsInterface, MutateProvidersInterface,
    PaymentStreamsInterface, ProofSubmittersInterface, ProofsDealerInterface,
    ReadBucketsInterface, ReadProvidersInterface, ReadUserSolvencyInterface, TrieAddMutation,
    TrieMutation, TrieRemoveMutation,
};
use shp_types::{
    Balance, BucketId, FileKey, FileLocation, Fingerprint, Hashing, MerkleHash, PeerId,
    ProviderId, ReplicationTarget, StorageDataUnit, ThresholdType, TickNumber,
};
use sp_runtime::{
    traits::{Convert, Hash},
    ArithmeticError, DispatchError,
};
use sp_std::{
    collections::{btree_map::BTreeMap, btree_set::BTreeSet},
    vec,
    vec::Vec,
};

use crate::*;

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// Create a bucket for `who` stored by `msp_id`, charging the bucket's fixed rate.
    pub fn do_create_bucket(
        who: &T::AccountId,
        msp_id: &ProviderId,
        name: &[u8],
        private: bool,
    ) -> Result<BucketId, DispatchError> {
        // Check that the MSP exists
        ensure!(T::Providers::is_msp(msp_id), Error::<T>::NotAMsp);

        // Check that the user can pay for it
        ensure!(
            !T::UserSolvency::is_user_insolvent(who),
            Error::<T>::OperationNotAllowedWithInsolventUser
        );

        let bucket_id = T::Providers::derive_bucket_id(who, name);
        T::Providers::add_bucket(Some(*msp_id), who, bucket_id, private)?;

        Self::increase_msp_fixed_rate(msp_id, who)?;

        log::debug!(
            target: LOG_TARGET,
            "Bucket {:?} created for {:?}, stored by {:?}",
            bucket_id,
            who,
            msp_id
        );

        Ok(bucket_id)
    }

    /// Validate a storage request issued by a user and register it.
    pub fn do_issue_storage_request(
        who: &T::AccountId,
        bucket_id: BucketId,
        location: FileLocation,
        fingerprint: Fingerprint,
        size: StorageDataUnit,
        msp_id: ProviderId,
        peer_ids: Vec<PeerId>,
        replication_target: Option<ReplicationTarget>,
    ) -> Result<(FileKey, StorageRequestMetadata<T>), DispatchError> {
        // Check that the bucket exists and the sender owns it
        ensure!(
            T::Providers::bucket_exists(&bucket_id),
            Error::<T>::BucketNotFound
        );
        ensure!(
            T::Providers::is_bucket_owner(who, &bucket_id),
            Error::<T>::NotBucketOwner
        );

        // Check the file itself
        ensure!(size > 0, Error::<T>::FileSizeCannotBeZero);
        ensure!(
            location.len() as u32 <= T::MaxFilePathSize::get(),
            Error::<T>::FileLocationTooLong
        );
        ensure!(
            peer_ids.len() as u32 <= T::MaxNumberOfPeerIds::get(),
            Error::<T>::TooManyPeerIds
        );

        // Check that the MSP is the one storing the bucket
        ensure!(T::Providers::is_msp(&msp_id), Error::<T>::NotAMsp);
        ensure!(
            T::Providers::is_bucket_stored_by_msp(&msp_id, &bucket_id),
            Error::<T>::MspNotStoringBucket
        );

        // Check the replication target
        let replication_target =
            replication_target.unwrap_or_else(T::DefaultReplicationTarget::get);
        ensure!(
            replication_target > 0,
            Error::<T>::ReplicationTargetCannotBeZero
        );
        ensure!(
            replication_target <= T::MaxReplicationTarget::get(),
            Error::<T>::ReplicationTargetExceedsMaximum
        );

        // Check that the user can pay for it
        ensure!(
            !T::UserSolvency::is_user_insolvent(who),
            Error::<T>::OperationNotAllowedWithInsolventUser
        );

        let request = StorageRequestMetadata::<T> {
            requested_at: T::ProofDealer::get_current_tick(),
            expires_at: 0,
            owner: who.clone(),
            bucket_id,
            location,
            fingerprint,
            size,
            msp: Some((msp_id, false)),
            user_peer_ids: peer_ids,
            data_server_sps: Vec::new(),
            bsps_required: replication_target,
            bsps_confirmed: 0,
            bsps_volunteered: 0,
            deposit_paid: T::StorageRequestCreationDeposit::get(),
        };
        let file_key = Self::compute_file_key(&request)?;

        let request = Self::do_request_storage(&file_key, request)?;

        Ok((file_key, request))
    }

    /// Register a storage request for `file_key`, holding its deposit from the owner and
    /// scheduling its expiration. Returns the request as stored.
    pub fn do_request_storage(
        file_key: &FileKey,
        mut request: StorageRequestMetadata<T>,
    ) -> Result<StorageRequestMetadata<T>, DispatchError> {
        // Check that there is nothing going on with this file already
        ensure!(
            !StorageRequests::<T>::contains_key(file_key),
            Error::<T>::FileHasActiveStorageRequest
        );
        ensure!(
            !IncompleteStorageRequests::<T>::contains_key(file_key),
            Error::<T>::FileHasIncompleteStorageRequest
        );

        let expires_at = Self::next_expiration_insertion_tick()?;
        request.expires_at = expires_at;

        if request.deposit_paid > 0 {
            let reason: T::RuntimeHoldReason = HoldReason::StorageRequestCreationDeposit.into();
            T::NativeBalance::hold(&reason, &request.owner, request.deposit_paid)
                .map_err(|_| Error::<T>::CannotHoldDeposit)?;
        }

        StorageRequestExpirations::<T>::append(expires_at, *file_key);
        NextAvailableStorageRequestExpirationTick::<T>::put(expires_at);
        StorageRequests::<T>::insert(file_key, request.clone());

        log::debug!(
            target: LOG_TARGET,
            "Storage request for file key {:?} registered, expiring at tick {}",
            file_key,
            expires_at
        );

        Ok(request)
    }

    pub fn do_revoke_storage_request(who: &T::AccountId, file_key: &FileKey) -> DispatchResult {
        let request =
            StorageRequests::<T>::get(file_key).ok_or(Error::<T>::StorageRequestNotFound)?;

        // Check that the caller is the owner of the storage request
        ensure!(
            &request.owner == who,
            Error::<T>::StorageRequestNotAuthorized
        );

        Self::close_storage_request(file_key, &request);

        Ok(())
    }

    pub fn do_bsp_volunteer(
        who: &T::AccountId,
        file_key: &FileKey,
    ) -> Result<(ProviderId, StorageRequestMetadata<T>), DispatchError> {
        // Check that the caller is a BSP able to take new files
        let bsp_id = Self::ensure_bsp(who)?;
        ensure!(
            !T::Providers::is_provider_insolvent(&bsp_id),
            Error::<T>::OperationNotAllowedForInsolventProvider
        );

        let mut request =
            StorageRequests::<T>::get(file_key).ok_or(Error::<T>::StorageRequestNotFound)?;

        // Check that the storage request still needs BSPs
        ensure!(
            !request.bsps_fulfilled(),
            Error::<T>::StorageRequestBspsRequiredFulfilled
        );

        // Check that the BSP did not volunteer already
        ensure!(
            !StorageRequestBsps::<T>::contains_key(file_key, bsp_id),
            Error::<T>::BspAlreadyVolunteered
        );

        // Check that the BSP has room for the file
        ensure!(
            T::Providers::available_capacity(&bsp_id) >= request.size,
            Error::<T>::InsufficientAvailableCapacity
        );

        // Check that the BSP's threshold allows it to volunteer by now
        let earliest_volunteer_tick =
            Self::compute_earliest_volunteer_tick(&bsp_id, file_key, &request)?;
        ensure!(
            T::ProofDealer::get_current_tick() >= earliest_volunteer_tick,
            Error::<T>::BspNotEligibleToVolunteer
        );

        request.bsps_volunteered = request
            .bsps_volunteered
            .checked_add(1)
            .ok_or(ArithmeticError::Overflow)?;

        StorageRequestBsps::<T>::insert(file_key, bsp_id, StorageRequestBspsMetadata::default());
        StorageRequests::<T>::insert(file_key, request.clone());

        Ok((bsp_id, request))
    }

    /// Confirm the files of `file_keys_and_proofs` that can be confirmed, returning the BSP, the
    /// confirmed and skipped file keys and the BSP's new root.
    pub fn do_bsp_confirm_storing(
        who: &T::AccountId,
        non_inclusion_forest_proof: &ForestProof,
        file_keys_and_proofs: Vec<FileKeyWithProof>,
    ) -> Result<(ProviderId, Vec<FileKey>, Vec<FileKey>, MerkleHash), DispatchError> {
        let bsp_id = Self::ensure_bsp(who)?;

        ensure!(
            !file_keys_and_proofs.is_empty(),
            Error::<T>::NoFileKeysToConfirm
        );
        ensure!(
            file_keys_and_proofs.len() as u32 <= T::MaxBatchConfirmStorageRequests::get(),
            Error::<T>::TooManyStorageRequestResponses
        );

        let old_root =
            T::Providers::get_root(&bsp_id).ok_or(Error::<T>::ImpossibleFailedToGetValue)?;

        // Check every file on its own, skipping the ones that fail
        let available_capacity = T::Providers::available_capacity(&bsp_id);
        let mut seen = BTreeSet::new();
        let mut accepted = Vec::new();
        let mut skipped_file_keys = Vec::new();
        let mut total_size: StorageDataUnit = 0;
        for FileKeyWithProof { file_key, proof } in file_keys_and_proofs {
            if !seen.insert(file_key) {
                skipped_file_keys.push(file_key);
                continue;
            }

            match Self::check_file_to_confirm(&bsp_id, &file_key, &proof, non_inclusion_forest_proof)
            {
                Ok((request, metadata)) => {
                    let new_total_size = total_size.saturating_add(request.size);
                    if new_total_size > available_capacity {
                        log::warn!(
                            target: LOG_TARGET,
                            "Skipping confirmation of file key {:?} by BSP {:?}: not enough capacity",
                            file_key,
                            bsp_id
                        );
                        skipped_file_keys.push(file_key);
                        continue;
                    }
                    total_size = new_total_size;
                    accepted.push((file_key, request, metadata));
                }
                Err(error) => {
                    log::warn!(
                        target: LOG_TARGET,
                        "Skipping confirmation of file key {:?} by BSP {:?}: {:?}",
                        file_key,
                        bsp_id,
                        error
                    );
                    skipped_file_keys.push(file_key);
                }
            }
        }

        ensure!(!accepted.is_empty(), Error::<T>::NoFileKeysToConfirm);

        // Add every accepted file to the forest in one go
        let mutations = accepted
            .iter()
            .map(|(file_key, _, metadata)| {
                (
                    *file_key,
                    TrieMutation::Add(TrieAddMutation::new(metadata.encode())),
                )
            })
            .collect::<Vec<_>>();
        let new_root = T::ProofDealer::apply_delta(&bsp_id, &mutations, non_inclusion_forest_proof)
            .map_err(|_| Error::<T>::RootNotUpdated)?;
        ensure!(new_root != old_root, Error::<T>::RootNotUpdated);

        // A BSP storing its first file starts being challenged
        if old_root == T::Providers::get_default_root() {
            T::ProofDealer::initialise_challenge_cycle(&bsp_id)?;
            Self::deposit_event(Event::BspChallengeCycleInitialised {
                who: who.clone(),
                bsp_id,
            });
        }

        T::Providers::update_root(&bsp_id, new_root)?;
        T::Providers::increase_capacity_used(&bsp_id, total_size)?;

        // The owners start paying the BSP for the new files
        let mut size_per_owner: BTreeMap<T::AccountId, StorageDataUnit> = BTreeMap::new();
        for (_, request, _) in accepted.iter() {
            let amount = size_per_owner.entry(request.owner.clone()).or_default();
            *amount = amount.saturating_add(request.size);
        }
        for (owner, size) in size_per_owner {
            Self::increase_bsp_dynamic_amount(&bsp_id, &owner, size)?;
        }

        let mut confirmed_file_keys = Vec::with_capacity(accepted.len());
        for (file_key, mut request, _) in accepted {
            request.bsps_confirmed = request.bsps_confirmed.saturating_add(1);

            StorageRequestBsps::<T>::insert(
                file_key,
                bsp_id,
                StorageRequestBspsMetadata { confirmed: true },
            );

            if request.is_fulfilled() {
                Self::fulfil_storage_request(&file_key, &request);
            } else {
                StorageRequests::<T>::insert(file_key, request);
            }
            confirmed_file_keys.push(file_key);
        }

        Ok((bsp_id, confirmed_file_keys, skipped_file_keys, new_root))
    }

    pub fn do_msp_respond_storage_requests_multiple_buckets(
        who: &T::AccountId,
        responses: Vec<MspStorageRequestResponse>,
    ) -> DispatchResult {
        // Check that the caller is an MSP
        let msp_id = T::Providers::get_provider_id(who).ok_or(Error::<T>::NotAMsp)?;
        ensure!(T::Providers::is_msp(&msp_id), Error::<T>::NotAMsp);

        for response in responses {
            // Check that the MSP is storing the bucket
            ensure!(
                T::Providers::is_bucket_stored_by_msp(&msp_id, &response.bucket_id),
                Error::<T>::MspNotStoringBucket
            );

            for rejected in response.reject {
                Self::do_msp_reject_storage_request(&msp_id, &response.bucket_id, rejected)?;
            }

            if let Some(accepted) = response.accept {
                Self::do_msp_accept_storage_requests(&msp_id, &response.bucket_id, accepted)?;
            }
        }

        Ok(())
    }

    fn do_msp_accept_storage_requests(
        msp_id: &ProviderId,
        bucket_id: &BucketId,
        accepted: MspAcceptedBatchStorageRequests,
    ) -> DispatchResult {
        ensure!(
            !accepted.file_keys_and_proofs.is_empty(),
            Error::<T>::NoFileKeysToConfirm
        );
        ensure!(
            !T::Providers::is_provider_insolvent(msp_id),
            Error::<T>::OperationNotAllowedForInsolventProvider
        );

        let mut files = Vec::with_capacity(accepted.file_keys_and_proofs.len());
        let mut total_size: StorageDataUnit = 0;
        for FileKeyWithProof { file_key, proof } in accepted.file_keys_and_proofs.iter() {
            let request =
                StorageRequests::<T>::get(file_key).ok_or(Error::<T>::StorageRequestNotFound)?;

            // Check that the file belongs to this bucket and this MSP was selected for it
            ensure!(
                &request.bucket_id == bucket_id,
                Error::<T>::InvalidBucketIdFileKeyPair
            );
            match request.msp {
                Some((id, accepted)) if &id == msp_id => {
                    ensure!(!accepted, Error::<T>::MspAlreadyConfirmed)
                }
                _ => return Err(Error::<T>::NotSelectedMsp.into()),
            }
            ensure!(
                !files.iter().any(|(key, _, _)| key == file_key),
                Error::<T>::MspAlreadyConfirmed
            );

            // Check that the MSP has the file's data
            let metadata = request
                .to_file_metadata()
                .map_err(|_| Error::<T>::InvalidFileKeyMetadata)?;
            let challenges = T::ProofDealer::generate_challenges_from_seed(
                *file_key,
                msp_id,
                metadata.chunks_to_check(),
            );
            T::ProofDealer::verify_key_proof(file_key, &challenges, proof)
                .map_err(|_| Error::<T>::KeyProofVerificationFailed)?;

            total_size = total_size
                .checked_add(request.size)
                .ok_or(ArithmeticError::Overflow)?;
            files.push((*file_key, request, metadata));
        }

        ensure!(
            T::Providers::available_capacity(msp_id) >= total_size,
            Error::<T>::InsufficientAvailableCapacity
        );

        // Check that none of the files is in the bucket yet, and add them
        let old_root =
            T::Providers::get_root_bucket(bucket_id).ok_or(Error::<T>::BucketNotFound)?;
        let challenges = files
            .iter()
            .map(|(file_key, _, _)| (*file_key, Some(ChallengeKeyInclusion::NotIncluded)))
            .collect::<Vec<_>>();
        T::ProofDealer::verify_generic_forest_proof(
            &old_root,
            &challenges,
            &accepted.non_inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::ForestProofVerificationFailed)?;

        let mutations = files
            .iter()
            .map(|(file_key, _, metadata)| {
                (
                    *file_key,
                    TrieMutation::Add(TrieAddMutation::new(metadata.encode())),
                )
            })
            .collect::<Vec<_>>();
        let new_bucket_root = T::ProofDealer::generic_apply_delta(
            &old_root,
            &mutations,
            &accepted.non_inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::RootNotUpdated)?;

        T::Providers::change_root_bucket(bucket_id, new_bucket_root)?;
        T::Providers::increase_bucket_size(bucket_id, total_size)?;

        Self::deposit_event(Event::MspAcceptedStorageRequests {
            msp_id: *msp_id,
            bucket_id: *bucket_id,
            file_keys: files.iter().map(|(file_key, _, _)| *file_key).collect(),
            new_bucket_root,
        });

        for (file_key, mut request, _) in files {
            request.msp = Some((*msp_id, true));
            if request.is_fulfilled() {
                Self::fulfil_storage_request(&file_key, &request);
            } else {
                StorageRequests::<T>::insert(file_key, request);
            }
        }

        Ok(())
    }

    fn do_msp_reject_storage_request(
        msp_id: &ProviderId,
        bucket_id: &BucketId,
        rejected: RejectedStorageRequest,
    ) -> DispatchResult {
        let file_key = rejected.file_key;
        let request =
            StorageRequests::<T>::get(file_key).ok_or(Error::<T>::StorageRequestNotFound)?;

        ensure!(
            &request.bucket_id == bucket_id,
            Error::<T>::InvalidBucketIdFileKeyPair
        );
        match request.msp {
            Some((id, accepted)) if &id == msp_id => {
                ensure!(!accepted, Error::<T>::MspAlreadyConfirmed)
            }
            _ => return Err(Error::<T>::NotSelectedMsp.into()),
        }

        Self::close_storage_request(&file_key, &request);

        Self::deposit_event(Event::StorageRequestRejected {
            file_key,
            msp_id: *msp_id,
            bucket_id: *bucket_id,
            reason: rejected.reason,
        });

        Ok(())
    }

    pub fn do_msp_stop_storing_bucket(
        who: &T::AccountId,
        bucket_id: &BucketId,
    ) -> Result<(ProviderId, T::AccountId), DispatchError> {
        let (msp_id, owner) = Self::ensure_msp_storing_bucket(who, bucket_id)?;

        T::Providers::unassign_msp_from_bucket(bucket_id)?;
        Self::decrease_msp_fixed_rate(&msp_id, &owner)?;

        Ok((msp_id, owner))
    }

    pub fn do_msp_stop_storing_bucket_for_insolvent_user(
        who: &T::AccountId,
        bucket_id: &BucketId,
    ) -> Result<(ProviderId, T::AccountId), DispatchError> {
        let (msp_id, owner) = Self::ensure_msp_storing_bucket(who, bucket_id)?;

        // Check that the owner of the bucket is insolvent
        ensure!(
            T::UserSolvency::is_user_insolvent(&owner),
            Error::<T>::UserNotInsolvent
        );

        T::Providers::unassign_msp_from_bucket(bucket_id)?;

        // An insolvent user can't have its stream updated, so it is closed altogether
        if T::PaymentStreams::get_fixed_rate_payment_stream_rate(&msp_id, &owner).is_some() {
            T::PaymentStreams::delete_fixed_rate_payment_stream(&msp_id, &owner)?;
        }

        Ok((msp_id, owner))
    }

    pub fn do_bsp_request_stop_storing(
        who: &T::AccountId,
        file_key: &FileKey,
        bucket_id: BucketId,
        location: FileLocation,
        owner: &T::AccountId,
        fingerprint: Fingerprint,
        size: StorageDataUnit,
        can_serve: bool,
        inclusion_forest_proof: &ForestProof,
    ) -> Result<ProviderId, DispatchError> {
        let bsp_id = Self::ensure_bsp(who)?;

        // Check that the BSP did not already request it
        ensure!(
            !PendingStopStoringRequests::<T>::contains_key(bsp_id, file_key),
            Error::<T>::PendingStopStoringRequestAlreadyExists
        );

        // Check that the metadata corresponds to the file key
        let metadata =
            Self::ensure_file_metadata(file_key, owner, &bucket_id, &location, fingerprint, size)?;

        // Copies of an incomplete storage request have to be cleaned up first
        ensure!(
            !IncompleteStorageRequests::<T>::contains_key(file_key),
            Error::<T>::FileHasIncompleteStorageRequest
        );

        // Check that the file is in the BSP's forest
        Self::ensure_included_in_provider_forest(&bsp_id, file_key, inclusion_forest_proof)?;

        // Pay the penalty for stopping storing the file
        let penalty = T::BspStopStoringFilePenalty::get();
        if penalty > 0 {
            T::NativeBalance::transfer(who, &T::Treasury::get(), penalty, Preservation::Preserve)
                .map_err(|_| Error::<T>::CannotPayStopStoringPenalty)?;
        }

        match StorageRequests::<T>::get(file_key) {
            Some(mut request) => {
                match StorageRequestBsps::<T>::get(file_key, bsp_id) {
                    // The BSP confirmed this same request: give its slot back
                    Some(StorageRequestBspsMetadata { confirmed: true }) => {
                        request.bsps_confirmed = request.bsps_confirmed.saturating_sub(1);
                        request.bsps_volunteered = request.bsps_volunteered.saturating_sub(1);
                    }
                    // The BSP stores the file from before this request: one more BSP is needed
                    Some(StorageRequestBspsMetadata { confirmed: false }) => {
                        request.bsps_volunteered = request.bsps_volunteered.saturating_sub(1);
                        request.bsps_required = request
                            .bsps_required
                            .checked_add(1)
                            .ok_or(ArithmeticError::Overflow)?;
                    }
                    None => {
                        request.bsps_required = request
                            .bsps_required
                            .checked_add(1)
                            .ok_or(ArithmeticError::Overflow)?;
                    }
                }
                if can_serve && !request.data_server_sps.contains(&bsp_id) {
                    request.data_server_sps.push(bsp_id);
                }

                StorageRequestBsps::<T>::remove(file_key, bsp_id);
                StorageRequests::<T>::insert(file_key, request);
            }
            None => {
                let request = StorageRequestMetadata::<T> {
                    requested_at: T::ProofDealer::get_current_tick(),
                    expires_at: 0,
                    owner: owner.clone(),
                    bucket_id,
                    location: metadata.location().clone(),
                    fingerprint,
                    size,
                    msp: None,
                    user_peer_ids: Vec::new(),
                    data_server_sps: if can_serve { vec![bsp_id] } else { Vec::new() },
                    bsps_required: 1,
                    bsps_confirmed: 0,
                    bsps_volunteered: 0,
                    deposit_paid: 0,
                };
                let request = Self::do_request_storage(file_key, request)?;

                Self::deposit_event(Event::NewStorageRequest {
                    who: owner.clone(),
                    file_key: *file_key,
                    bucket_id,
                    location,
                    fingerprint,
                    size,
                    peer_ids: Vec::new(),
                    expires_at: request.expires_at,
                });
            }
        }

        // The BSP stops being paid for the file
        Self::decrease_bsp_dynamic_amount(&bsp_id, owner, size)?;

        PendingStopStoringRequests::<T>::insert(
            bsp_id,
            file_key,
            PendingStopStoringRequest::<T> {
                tick_when_requested: T::ProofDealer::get_current_tick(),
                file_owner: owner.clone(),
                file_size: size,
            },
        );

        Ok(bsp_id)
    }

    pub fn do_bsp_confirm_stop_storing(
        who: &T::AccountId,
        file_key: &FileKey,
        inclusion_forest_proof: &ForestProof,
    ) -> Result<(ProviderId, MerkleHash), DispatchError> {
        let bsp_id = Self::ensure_bsp(who)?;

        let pending = PendingStopStoringRequests::<T>::get(bsp_id, file_key)
            .ok_or(Error::<T>::PendingStopStoringRequestNotFound)?;

        // Check that enough time has passed since the request
        ensure!(
            T::ProofDealer::get_current_tick()
                >= pending
                    .tick_when_requested
                    .saturating_add(T::MinWaitForStopStoring::get()),
            Error::<T>::MinWaitForStopStoringNotReached
        );

        Self::ensure_included_in_provider_forest(&bsp_id, file_key, inclusion_forest_proof)?;
        let new_root = Self::remove_file_from_bsp_forest(
            &bsp_id,
            file_key,
            pending.file_size,
            inclusion_forest_proof,
        )?;

        PendingStopStoringRequests::<T>::remove(bsp_id, file_key);

        Ok((bsp_id, new_root))
    }

    pub fn do_sp_stop_storing_for_insolvent_user(
        who: &T::AccountId,
        file_key: &FileKey,
        bucket_id: BucketId,
        location: FileLocation,
        owner: &T::AccountId,
        fingerprint: Fingerprint,
        size: StorageDataUnit,
        inclusion_forest_proof: &ForestProof,
    ) -> Result<(ProviderId, MerkleHash), DispatchError> {
        let sp_id = T::Providers::get_provider_id(who).ok_or(Error::<T>::NotASp)?;

        // Check that the owner of the file is insolvent
        ensure!(
            T::UserSolvency::is_user_insolvent(owner),
            Error::<T>::UserNotInsolvent
        );

        Self::ensure_file_metadata(file_key, owner, &bucket_id, &location, fingerprint, size)?;

        if T::Providers::is_bsp(&sp_id) {
            Self::ensure_included_in_provider_forest(&sp_id, file_key, inclusion_forest_proof)?;
            let new_root =
                Self::remove_file_from_bsp_forest(&sp_id, file_key, size, inclusion_forest_proof)?;

            PendingStopStoringRequests::<T>::remove(sp_id, file_key);

            // An insolvent user can't have its stream updated, so it is closed altogether
            if T::PaymentStreams::get_dynamic_rate_payment_stream_amount_provided(&sp_id, owner)
                .is_some()
            {
                T::PaymentStreams::delete_dynamic_rate_payment_stream(&sp_id, owner)?;
            }

            Ok((sp_id, new_root))
        } else {
            ensure!(
                T::Providers::is_bucket_stored_by_msp(&sp_id, &bucket_id),
                Error::<T>::MspNotStoringBucket
            );
            let new_root =
                Self::remove_file_from_bucket(&bucket_id, file_key, size, inclusion_forest_proof)?;

            Ok((sp_id, new_root))
        }
    }

    pub fn do_delete_file_for_incomplete_storage_request(
        file_key: &FileKey,
        bsp_id: Option<ProviderId>,
        forest_proof: &ForestProof,
    ) -> Result<MerkleHash, DispatchError> {
        let mut incomplete = IncompleteStorageRequests::<T>::get(file_key)
            .ok_or(Error::<T>::IncompleteStorageRequestNotFound)?;

        let new_root = match bsp_id {
            Some(bsp_id) => {
                ensure!(
                    incomplete.pending_bsp_removals.contains(&bsp_id),
                    Error::<T>::ProviderNotStoringFile
                );
                Self::ensure_included_in_provider_forest(&bsp_id, file_key, forest_proof)?;
                let new_root = Self::remove_file_from_bsp_forest(
                    &bsp_id,
                    file_key,
                    incomplete.file_size,
                    forest_proof,
                )?;

                if let Err(error) = Self::decrease_bsp_dynamic_amount(
                    &bsp_id,
                    &incomplete.owner,
                    incomplete.file_size,
                ) {
                    log::warn!(
                        target: LOG_TARGET,
                        "Failed to update the payment stream of {:?} with BSP {:?}: {:?}",
                        incomplete.owner,
                        bsp_id,
                        error
                    );
                }

                incomplete.pending_bsp_removals.retain(|id| id != &bsp_id);
                new_root
            }
            None => {
                ensure!(
                    incomplete.pending_bucket_removal,
                    Error::<T>::ProviderNotStoringFile
                );
                let new_root = Self::remove_file_from_bucket(
                    &incomplete.bucket_id,
                    file_key,
                    incomplete.file_size,
                    forest_proof,
                )?;

                incomplete.pending_bucket_removal = false;
                new_root
            }
        };

        if incomplete.is_cleaned_up() {
            IncompleteStorageRequests::<T>::remove(file_key);
            Self::deposit_event(Event::IncompleteStorageRequestCleanedUp {
                file_key: *file_key,
            });
        } else {
            IncompleteStorageRequests::<T>::insert(file_key, incomplete);
        }

        Ok(new_root)
    }

    /// Expire the storage requests of every tick from [`NextStartingTickToCleanUp`] up to the
    /// current tick, while `remaining_weight` allows it.
    ///
    /// A tick is only cleaned up if the weight of expiring all of its storage requests is
    /// available, so the ones left are picked up by a later block.
    pub fn do_expire_storage_requests(remaining_weight: Weight) -> Weight {
        let db_weight = T::DbWeight::get();
        let mut meter = WeightMeter::with_limit(remaining_weight);

        if meter.try_consume(db_weight.reads(2)).is_err() {
            return meter.consumed();
        }
        let current_tick = T::ProofDealer::get_current_tick();
        let mut tick = NextStartingTickToCleanUp::<T>::get();

        let weight_per_tick = db_weight.reads_writes(1, 2).saturating_add(
            Self::weight_to_expire_storage_request()
                .saturating_mul(T::MaxExpiredItemsInBlock::get().into()),
        );

        while tick <= current_tick && meter.can_consume(weight_per_tick) {
            meter.consume(db_weight.reads_writes(1, 2));

            for file_key in StorageRequestExpirations::<T>::take(tick) {
                meter.consume(Self::weight_to_expire_storage_request());

                let Some(request) = StorageRequests::<T>::get(file_key) else {
                    continue;
                };

                Self::close_storage_request(&file_key, &request);

                Self::deposit_event(Event::StorageRequestExpired { file_key });
            }

            tick = match tick.checked_add(1) {
                Some(next) => next,
                None => break,
            };
        }

        NextStartingTickToCleanUp::<T>::put(tick);

        meter.consumed()
    }

    fn weight_to_expire_storage_request() -> Weight {
        T::DbWeight::get().reads_writes(3, 5)
    }

    /// The earliest tick at which `bsp_id` can volunteer for the storage request of `file_key`.
    ///
    /// Never earlier than the current tick: once the BSP is eligible, the result is the current
    /// tick.
    pub fn query_earliest_file_volunteer_tick(
        bsp_id: ProviderId,
        file_key: FileKey,
    ) -> Result<TickNumber, QueryFileEarliestVolunteerTickError> {
        let request = StorageRequests::<T>::get(file_key)
            .ok_or(QueryFileEarliestVolunteerTickError::StorageRequestNotFound)?;

        if !T::Providers::is_bsp(&bsp_id) {
            return Err(QueryFileEarliestVolunteerTickError::NotABsp);
        }

        let earliest = Self::compute_earliest_volunteer_tick(&bsp_id, &file_key, &request)
            .map_err(|_| QueryFileEarliestVolunteerTickError::ThresholdArithmeticError)?;

        Ok(earliest.max(T::ProofDealer::get_current_tick()))
    }

    pub fn is_storage_request_open_to_volunteers(
        file_key: FileKey,
    ) -> Result<bool, IsStorageRequestOpenToVolunteersError> {
        let request = StorageRequests::<T>::get(file_key)
            .ok_or(IsStorageRequestOpenToVolunteersError::StorageRequestNotFound)?;

        Ok(!request.bsps_fulfilled())
    }

    /// The chunks `provider_id` has to prove to confirm storing the file of `file_key`.
    pub fn query_confirm_chunks_to_prove_for_file(
        provider_id: ProviderId,
        file_key: FileKey,
    ) -> Result<Vec<ChunkId>, QueryConfirmChunksToProveForFileError> {
        let request = StorageRequests::<T>::get(file_key)
            .ok_or(QueryConfirmChunksToProveForFileError::StorageRequestNotFound)?;
        let metadata = request
            .to_file_metadata()
            .map_err(|_| QueryConfirmChunksToProveForFileError::InvalidFileMetadata)?;

        let chunks_count = metadata.chunks_count();
        let mut chunks = T::ProofDealer::generate_challenges_from_seed(
            file_key,
            &provider_id,
            metadata.chunks_to_check(),
        )
        .iter()
        .map(|challenge| ChunkId::from_challenge(challenge.as_ref(), chunks_count))
        .collect::<Vec<_>>();
        chunks.sort();
        chunks.dedup();

        Ok(chunks)
    }

    pub fn storage_request(file_key: &FileKey) -> Option<StorageRequestMetadata<T>> {
        StorageRequests::<T>::get(file_key)
    }

    /// The BSPs that volunteered for the storage request of `file_key`, and whether they
    /// confirmed.
    pub fn storage_request_bsps(file_key: &FileKey) -> Vec<(ProviderId, bool)> {
        StorageRequestBsps::<T>::iter_prefix(file_key)
            .map(|(bsp_id, record)| (bsp_id, record.confirmed))
            .collect()
    }

    pub fn pending_stop_storing_request(
        bsp_id: &ProviderId,
        file_key: &FileKey,
    ) -> Option<PendingStopStoringRequest<T>> {
        PendingStopStoringRequests::<T>::get(bsp_id, file_key)
    }

    pub fn incomplete_storage_request(
        file_key: &FileKey,
    ) -> Option<IncompleteStorageRequestMetadata<T>> {
        IncompleteStorageRequests::<T>::get(file_key)
    }

    /// Earliest tick at which `bsp_id` can volunteer for `request`, without saturating at the
    /// current tick.
    ///
    /// The threshold of a BSP starts at a value that grows with its stake and the replication
    /// target of the request, and grows linearly from the tick the request was issued until it
    /// reaches the maximum after `TickRangeToMaximumThreshold` ticks. The BSP can volunteer
    /// once its threshold reaches its distance to the file.
    pub fn compute_earliest_volunteer_tick(
        bsp_id: &ProviderId,
        file_key: &FileKey,
        request: &StorageRequestMetadata<T>,
    ) -> Result<TickNumber, DispatchError> {
        let stake = T::Providers::get_stake(bsp_id).ok_or(Error::<T>::NotABsp)?;
        let distance = Self::compute_bsp_xor(bsp_id, file_key)?;
        let (threshold_start, threshold_slope) =
            Self::compute_threshold_parameters(stake, request.bsps_required);

        if distance <= threshold_start {
            return Ok(request.requested_at);
        }

        let ticks_to_reach_distance = (distance - threshold_start).div_ceil(threshold_slope);

        Ok(request.requested_at.saturating_add(ticks_to_reach_distance))
    }

    /// The starting point and the growth per tick of a BSP's volunteering threshold.
    pub fn compute_threshold_parameters(
        stake: Balance,
        replication_target: ReplicationTarget,
    ) -> (ThresholdType, ThresholdType) {
        let threshold_start =
            T::StakeToThresholdStart::convert(stake).saturating_mul(replication_target);

        let tick_range = T::TickRangeToMaximumThreshold::get().max(1);
        let threshold_slope = ((ThresholdType::MAX - threshold_start) / tick_range).max(1);

        (threshold_start, threshold_slope)
    }

    /// The distance between a BSP and a file: the XOR of the BSP id and the hash of the file
    /// key, read as a [`ThresholdType`].
    pub fn compute_bsp_xor(
        bsp_id: &ProviderId,
        file_key: &FileKey,
    ) -> Result<ThresholdType, DispatchError> {
        let file_key_hash = <Hashing as Hash>::hash(file_key.as_ref());
        let xor = file_key_hash
            .as_ref()
            .iter()
            .zip(bsp_id.as_ref().iter())
            .map(|(a, b)| a ^ b)
            .collect::<Vec<u8>>();

        let distance = ThresholdType::decode(&mut xor.as_slice())
            .map_err(|_| Error::<T>::ImpossibleFailedToGetValue)?;

        Ok(distance)
    }

    fn compute_file_key(request: &StorageRequestMetadata<T>) -> Result<FileKey, DispatchError> {
        let metadata = request
            .to_file_metadata()
            .map_err(|_| Error::<T>::InvalidFileKeyMetadata)?;

        Ok(metadata.file_key::<Hashing>())
    }

    /// Check one of the files a BSP is confirming, returning its storage request and metadata.
    fn check_file_to_confirm(
        bsp_id: &ProviderId,
        file_key: &FileKey,
        proof: &FileKeyProof,
        non_inclusion_forest_proof: &ForestProof,
    ) -> Result<(StorageRequestMetadata<T>, FileMetadata), DispatchError> {
        let request =
            StorageRequests::<T>::get(file_key).ok_or(Error::<T>::StorageRequestNotFound)?;

        // Check that the BSP volunteered and did not confirm yet
        let record = StorageRequestBsps::<T>::get(file_key, bsp_id)
            .ok_or(Error::<T>::BspNotVolunteered)?;
        ensure!(!record.confirmed, Error::<T>::BspAlreadyConfirmed);
        ensure!(
            !request.bsps_fulfilled(),
            Error::<T>::StorageRequestBspsRequiredFulfilled
        );

        // Check that the owner can pay for it
        ensure!(
            !T::UserSolvency::is_user_insolvent(&request.owner),
            Error::<T>::OperationNotAllowedWithInsolventUser
        );

        // Check that the BSP has the file's data
        let metadata = request
            .to_file_metadata()
            .map_err(|_| Error::<T>::InvalidFileKeyMetadata)?;
        let challenges = T::ProofDealer::generate_challenges_from_seed(
            *file_key,
            bsp_id,
            metadata.chunks_to_check(),
        );
        T::ProofDealer::verify_key_proof(file_key, &challenges, proof)
            .map_err(|_| Error::<T>::KeyProofVerificationFailed)?;

        // Check that the file is not in the BSP's forest yet
        T::ProofDealer::verify_forest_proof(
            bsp_id,
            &[(*file_key, Some(ChallengeKeyInclusion::NotIncluded))],
            non_inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::ForestProofVerificationFailed)?;

        Ok((request, metadata))
    }

    /// Remove a storage request that ended without being fulfilled: gives the deposit back and
    /// registers an incomplete storage request if some Provider already stored the file.
    fn close_storage_request(file_key: &FileKey, request: &StorageRequestMetadata<T>) {
        let confirmed_bsps = Self::remove_storage_request(file_key, request);

        let pending_bucket_removal = matches!(request.msp, Some((_, true)));
        if !confirmed_bsps.is_empty() || pending_bucket_removal {
            IncompleteStorageRequests::<T>::insert(
                file_key,
                IncompleteStorageRequestMetadata::<T> {
                    owner: request.owner.clone(),
                    bucket_id: request.bucket_id,
                    location: request.location.clone(),
                    file_size: request.size,
                    fingerprint: request.fingerprint,
                    pending_bsp_removals: confirmed_bsps,
                    pending_bucket_removal,
                },
            );
            Self::deposit_event(Event::IncompleteStorageRequest {
                file_key: *file_key,
            });
        }

        Self::release_storage_request_deposit(file_key, request);
    }

    fn fulfil_storage_request(file_key: &FileKey, request: &StorageRequestMetadata<T>) {
        Self::remove_storage_request(file_key, request);
        Self::release_storage_request_deposit(file_key, request);

        Self::deposit_event(Event::StorageRequestFulfilled {
            file_key: *file_key,
        });
    }

    /// Remove a storage request with its volunteers and expiration, returning the BSPs that
    /// confirmed it.
    fn remove_storage_request(
        file_key: &FileKey,
        request: &StorageRequestMetadata<T>,
    ) -> Vec<ProviderId> {
        StorageRequests::<T>::remove(file_key);

        let confirmed_bsps = StorageRequestBsps::<T>::drain_prefix(file_key)
            .filter(|(_, record)| record.confirmed)
            .map(|(bsp_id, _)| bsp_id)
            .collect::<Vec<_>>();

        StorageRequestExpirations::<T>::mutate_exists(request.expires_at, |expiring| {
            if let Some(keys) = expiring {
                keys.retain(|key| key != file_key);
                if keys.is_empty() {
                    *expiring = None;
                }
            }
        });

        confirmed_bsps
    }

    /// Give the deposit of a storage request back to its owner, reporting it by event if it
    /// fails.
    fn release_storage_request_deposit(file_key: &FileKey, request: &StorageRequestMetadata<T>) {
        if request.deposit_paid == 0 {
            return;
        }

        let reason: T::RuntimeHoldReason = HoldReason::StorageRequestCreationDeposit.into();
        if let Err(error) = T::NativeBalance::release(
            &reason,
            &request.owner,
            request.deposit_paid,
            Precision::Exact,
        ) {
            log::warn!(
                target: LOG_TARGET,
                "Failed to release the deposit of the storage request of {:?}: {:?}",
                file_key,
                error
            );
            Self::deposit_event(Event::FailedToReleaseStorageRequestCreationDeposit {
                file_key: *file_key,
                owner: request.owner.clone(),
                amount_to_release: request.deposit_paid,
                error,
            });
        }
    }

    /// The first tick after the storage request TTL with room for one more expiration.
    fn next_expiration_insertion_tick() -> Result<TickNumber, DispatchError> {
        let min_expiration_tick = T::ProofDealer::get_current_tick()
            .checked_add(T::StorageRequestTtl::get())
            .ok_or(Error::<T>::MaxTickNumberReached)?;
        let max_items = T::MaxExpiredItemsInBlock::get().max(1);

        let mut tick =
            min_expiration_tick.max(NextAvailableStorageRequestExpirationTick::<T>::get());
        while StorageRequestExpirations::<T>::decode_len(tick).unwrap_or(0) as u32 >= max_items {
            tick = tick
                .checked_add(1)
                .ok_or(Error::<T>::MaxTickNumberReached)?;
        }

        Ok(tick)
    }

    fn ensure_bsp(who: &T::AccountId) -> Result<ProviderId, DispatchError> {
        let bsp_id = T::Providers::get_provider_id(who).ok_or(Error::<T>::NotABsp)?;
        ensure!(T::Providers::is_bsp(&bsp_id), Error::<T>::NotABsp);
        Ok(bsp_id)
    }

    fn ensure_msp_storing_bucket(
        who: &T::AccountId,
        bucket_id: &BucketId,
    ) -> Result<(ProviderId, T::AccountId), DispatchError> {
        let msp_id = T::Providers::get_provider_id(who).ok_or(Error::<T>::NotAMsp)?;
        ensure!(T::Providers::is_msp(&msp_id), Error::<T>::NotAMsp);
        ensure!(
            T::Providers::is_bucket_stored_by_msp(&msp_id, bucket_id),
            Error::<T>::MspNotStoringBucket
        );
        let owner =
            T::Providers::get_bucket_owner(bucket_id).ok_or(Error::<T>::BucketNotFound)?;

        Ok((msp_id, owner))
    }

    /// Rebuild the metadata of a file and check that it corresponds to `file_key`.
    fn ensure_file_metadata(
        file_key: &FileKey,
        owner: &T::AccountId,
        bucket_id: &BucketId,
        location: &FileLocation,
        fingerprint: Fingerprint,
        size: StorageDataUnit,
    ) -> Result<FileMetadata, DispatchError> {
        let metadata = FileMetadata::new(
            owner.encode(),
            bucket_id.as_ref().to_vec(),
            location.clone(),
            size,
            fingerprint.into(),
        )
        .map_err(|_| Error::<T>::InvalidFileKeyMetadata)?;
        ensure!(
            &metadata.file_key::<Hashing>() == file_key,
            Error::<T>::InvalidFileKeyMetadata
        );

        Ok(metadata)
    }

    fn ensure_included_in_provider_forest(
        provider_id: &ProviderId,
        file_key: &FileKey,
        inclusion_forest_proof: &ForestProof,
    ) -> DispatchResult {
        let proven = T::ProofDealer::verify_forest_proof(
            provider_id,
            &[(*file_key, Some(ChallengeKeyInclusion::Included))],
            inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::ForestProofVerificationFailed)?;
        ensure!(proven.contains(file_key), Error::<T>::ExpectedInclusionProof);

        Ok(())
    }

    /// Remove a file from a BSP's forest, stopping its challenge cycle if the forest ends up
    /// empty.
    fn remove_file_from_bsp_forest(
        bsp_id: &ProviderId,
        file_key: &FileKey,
        size: StorageDataUnit,
        inclusion_forest_proof: &ForestProof,
    ) -> Result<MerkleHash, DispatchError> {
        let new_root = T::ProofDealer::apply_delta(
            bsp_id,
            &[(*file_key, TrieMutation::Remove(TrieRemoveMutation))],
            inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::RootNotUpdated)?;

        T::Providers::update_root(bsp_id, new_root)?;
        T::Providers::decrease_capacity_used(bsp_id, size)?;

        if new_root == T::Providers::get_default_root() {
            T::ProofDealer::stop_challenge_cycle(bsp_id)?;
        }

        log::debug!(
            target: LOG_TARGET,
            "File key {:?} removed from the forest of BSP {:?}",
            file_key,
            bsp_id
        );

        Ok(new_root)
    }

    fn remove_file_from_bucket(
        bucket_id: &BucketId,
        file_key: &FileKey,
        size: StorageDataUnit,
        inclusion_forest_proof: &ForestProof,
    ) -> Result<MerkleHash, DispatchError> {
        let root = T::Providers::get_root_bucket(bucket_id).ok_or(Error::<T>::BucketNotFound)?;

        let proven = T::ProofDealer::verify_generic_forest_proof(
            &root,
            &[(*file_key, Some(ChallengeKeyInclusion::Included))],
            inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::ForestProofVerificationFailed)?;
        ensure!(proven.contains(file_key), Error::<T>::ExpectedInclusionProof);

        let new_root = T::ProofDealer::generic_apply_delta(
            &root,
            &[(*file_key, TrieMutation::Remove(TrieRemoveMutation))],
            inclusion_forest_proof,
        )
        .map_err(|_| Error::<T>::RootNotUpdated)?;

        T::Providers::change_root_bucket(bucket_id, new_root)?;
        T::Providers::decrease_bucket_size(bucket_id, size)?;

        Ok(new_root)
    }

    fn increase_msp_fixed_rate(msp_id: &ProviderId, user: &T::AccountId) -> DispatchResult {
        let bucket_rate = T::BucketFixedRate::get();
        if bucket_rate == 0 {
            return Ok(());
        }

        match T::PaymentStreams::get_fixed_rate_payment_stream_rate(msp_id, user) {
            Some(rate) => {
                let new_rate = rate
                    .checked_add(bucket_rate)
                    .ok_or(ArithmeticError::Overflow)?;
                T::PaymentStreams::update_fixed_rate_payment_stream(msp_id, user, new_rate)
            }
            None => T::PaymentStreams::create_fixed_rate_payment_stream(msp_id, user, bucket_rate),
        }
    }

    fn decrease_msp_fixed_rate(msp_id: &ProviderId, user: &T::AccountId) -> DispatchResult {
        let bucket_rate = T::BucketFixedRate::get();
        if bucket_rate == 0 {
            return Ok(());
        }

        match T::PaymentStreams::get_fixed_rate_payment_stream_rate(msp_id, user) {
            Some(rate) if rate > bucket_rate => {
                T::PaymentStreams::update_fixed_rate_payment_stream(msp_id, user, rate - bucket_rate)
            }
            Some(_) => T::PaymentStreams::delete_fixed_rate_payment_stream(msp_id, user),
            None => Ok(()),
        }
    }

    fn increase_bsp_dynamic_amount(
        bsp_id: &ProviderId,
        user: &T::AccountId,
        size: StorageDataUnit,
    ) -> DispatchResult {
        match T::PaymentStreams::get_dynamic_rate_payment_stream_amount_provided(bsp_id, user) {
            Some(amount_provided) => {
                let new_amount_provided = amount_provided
                    .checked_add(size)
                    .ok_or(ArithmeticError::Overflow)?;
                T::PaymentStreams::update_dynamic_rate_payment_stream(
                    bsp_id,
                    user,
                    new_amount_provided,
                )
            }
            None => T::PaymentStreams::create_dynamic_rate_payment_stream(bsp_id, user, size),
        }
    }

    fn decrease_bsp_dynamic_amount(
        bsp_id: &ProviderId,
        user: &T::AccountId,
        size: StorageDataUnit,
    ) -> DispatchResult {
        match T::PaymentStreams::get_dynamic_rate_payment_stream_amount_provided(bsp_id, user) {
            Some(amount_provided) if amount_provided > size => {
                T::PaymentStreams::update_dynamic_rate_payment_stream(
                    bsp_id,
                    user,
                    amount_provided - size,
                )
            }
            Some(_) => T::PaymentStreams::delete_dynamic_rate_payment_stream(bsp_id, user),
            None => Ok(()),
        }
    }
}
