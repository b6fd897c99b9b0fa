use crate::types::{BackupStorageProvider, Bucket, MainStorageProvider, ProviderKind};
use crate::*;
use codec::Encode;
use frame_support::{
    ensure,
    pallet_prelude::DispatchResult,
    sp_runtime::{traits::Hash, ArithmeticError, DispatchError},
    traits::{
        fungible::{InspectHold, MutateHold},
        tokens::{Fortitude, Precision, Restriction},
        Get,
    },
};
use shp_traits::{
    MutateBucketsInterface, MutateProvidersInterface, ProofSubmittersInterface,
    ReadBucketsInterface, ReadProvidersInterface,
};
use shp_types::{
    default_merkle_root, Balance, BucketId, Hashing, MerkleHash, MultiAddress, ProviderId,
    StorageDataUnit,
};
use sp_std::vec::Vec;

impl<T> Pallet<T>
where
    T: pallet::Config,
{
    /// Checks shared by both kinds of sign up: the account and the id must be unused, and the
    /// multiaddresses, capacity and stake must be within the runtime limits. The stake is then
    /// held from `who`.
    fn check_and_hold_sign_up(
        who: &T::AccountId,
        provider_id: &ProviderId,
        capacity: StorageDataUnit,
        multiaddresses: &[MultiAddress],
        stake: Balance,
    ) -> DispatchResult {
        ensure!(
            !AccountIdToMainStorageProviderId::<T>::contains_key(who)
                && !AccountIdToBackupStorageProviderId::<T>::contains_key(who),
            Error::<T>::AlreadyRegistered
        );
        ensure!(
            !MainStorageProviders::<T>::contains_key(provider_id)
                && !BackupStorageProviders::<T>::contains_key(provider_id),
            Error::<T>::ProviderIdAlreadyUsed
        );
        ensure!(!multiaddresses.is_empty(), Error::<T>::NoMultiAddress);
        ensure!(
            multiaddresses.len() <= T::MaxMultiAddressAmount::get() as usize,
            Error::<T>::TooManyMultiAddresses
        );
        ensure!(capacity >= T::SpMinCapacity::get(), Error::<T>::StorageTooLow);
        ensure!(stake >= T::SpMinDeposit::get(), Error::<T>::StakeTooLow);
        ensure!(
            T::NativeBalance::can_hold(&HoldReason::StorageProviderDeposit.into(), who, stake),
            Error::<T>::NotEnoughBalance
        );

        T::NativeBalance::hold(&HoldReason::StorageProviderDeposit.into(), who, stake)
            .map_err(|_| Error::<T>::CannotHoldDeposit)?;

        Ok(())
    }

    pub fn do_msp_sign_up(
        who: &T::AccountId,
        msp_id: ProviderId,
        capacity: StorageDataUnit,
        multiaddresses: Vec<MultiAddress>,
        stake: Balance,
    ) -> DispatchResult {
        Self::check_and_hold_sign_up(who, &msp_id, capacity, &multiaddresses, stake)?;

        AccountIdToMainStorageProviderId::<T>::insert(who, msp_id);
        MainStorageProviders::<T>::insert(
            msp_id,
            MainStorageProvider {
                buckets: Vec::new(),
                capacity,
                capacity_used: 0,
                multiaddresses,
                owner_account: who.clone(),
            },
        );

        log::debug!(target: LOG_TARGET, "MSP {:?} signed up with capacity {}", msp_id, capacity);
        Ok(())
    }

    pub fn do_bsp_sign_up(
        who: &T::AccountId,
        bsp_id: ProviderId,
        capacity: StorageDataUnit,
        multiaddresses: Vec<MultiAddress>,
        stake: Balance,
    ) -> DispatchResult {
        Self::check_and_hold_sign_up(who, &bsp_id, capacity, &multiaddresses, stake)?;

        AccountIdToBackupStorageProviderId::<T>::insert(who, bsp_id);
        BackupStorageProviders::<T>::insert(
            bsp_id,
            BackupStorageProvider {
                capacity,
                capacity_used: 0,
                multiaddresses,
                root: default_merkle_root(),
                owner_account: who.clone(),
            },
        );
        TotalBspsCapacity::<T>::mutate(|total| *total = total.saturating_add(capacity));

        log::debug!(target: LOG_TARGET, "BSP {:?} signed up with capacity {}", bsp_id, capacity);
        Ok(())
    }

    pub fn do_msp_sign_off(who: &T::AccountId) -> Result<ProviderId, DispatchError> {
        let msp_id =
            AccountIdToMainStorageProviderId::<T>::get(who).ok_or(Error::<T>::NotRegistered)?;
        let msp = MainStorageProviders::<T>::get(&msp_id)
            .ok_or(Error::<T>::SpRegisteredButDataNotFound)?;
        ensure!(msp.buckets.is_empty(), Error::<T>::MspStillHasBuckets);
        ensure!(msp.capacity_used == 0, Error::<T>::StorageStillInUse);

        T::NativeBalance::release_all(
            &HoldReason::StorageProviderDeposit.into(),
            who,
            Precision::BestEffort,
        )?;

        AccountIdToMainStorageProviderId::<T>::remove(who);
        MainStorageProviders::<T>::remove(&msp_id);
        InsolventProviders::<T>::remove(&msp_id);

        Ok(msp_id)
    }

    pub fn do_bsp_sign_off(who: &T::AccountId) -> Result<ProviderId, DispatchError> {
        let bsp_id =
            AccountIdToBackupStorageProviderId::<T>::get(who).ok_or(Error::<T>::NotRegistered)?;
        let bsp = BackupStorageProviders::<T>::get(&bsp_id)
            .ok_or(Error::<T>::SpRegisteredButDataNotFound)?;
        ensure!(bsp.capacity_used == 0, Error::<T>::StorageStillInUse);

        T::NativeBalance::release_all(
            &HoldReason::StorageProviderDeposit.into(),
            who,
            Precision::BestEffort,
        )?;

        AccountIdToBackupStorageProviderId::<T>::remove(who);
        BackupStorageProviders::<T>::remove(&bsp_id);
        InsolventProviders::<T>::remove(&bsp_id);
        TotalBspsCapacity::<T>::mutate(|total| *total = total.saturating_sub(bsp.capacity));

        Ok(bsp_id)
    }

    /// Changes the capacity of the Provider registered for `who`, returning its id and the
    /// capacity it had before.
    pub fn do_change_capacity(
        who: &T::AccountId,
        new_capacity: StorageDataUnit,
    ) -> Result<(ProviderId, StorageDataUnit), DispatchError> {
        ensure!(new_capacity != 0, Error::<T>::NewCapacityCantBeZero);

        let (provider_id, kind) = Self::provider_of_account(who).ok_or(Error::<T>::NotRegistered)?;
        let (old_capacity, capacity_used) = match kind {
            ProviderKind::Main => {
                let msp = MainStorageProviders::<T>::get(&provider_id)
                    .ok_or(Error::<T>::SpRegisteredButDataNotFound)?;
                (msp.capacity, msp.capacity_used)
            }
            ProviderKind::Backup => {
                let bsp = BackupStorageProviders::<T>::get(&provider_id)
                    .ok_or(Error::<T>::SpRegisteredButDataNotFound)?;
                (bsp.capacity, bsp.capacity_used)
            }
        };

        ensure!(
            new_capacity != old_capacity,
            Error::<T>::NewCapacityEqualsCurrentCapacity
        );
        ensure!(
            new_capacity >= capacity_used,
            Error::<T>::NewCapacityLessThanUsedStorage
        );
        ensure!(
            new_capacity >= T::SpMinCapacity::get(),
            Error::<T>::StorageTooLow
        );

        match kind {
            ProviderKind::Main => {
                MainStorageProviders::<T>::mutate(&provider_id, |msp| {
                    if let Some(msp) = msp {
                        msp.capacity = new_capacity;
                    }
                });
            }
            ProviderKind::Backup => {
                BackupStorageProviders::<T>::mutate(&provider_id, |bsp| {
                    if let Some(bsp) = bsp {
                        bsp.capacity = new_capacity;
                    }
                });
                TotalBspsCapacity::<T>::mutate(|total| {
                    *total = total
                        .saturating_sub(old_capacity)
                        .saturating_add(new_capacity)
                });
            }
        }

        Ok((provider_id, old_capacity))
    }

    /// Slash `provider_id` for every proof submission it failed since it was last slashed.
    ///
    /// The amount is capped at the Provider's stake. If the stake left is below
    /// [`Config::SpMinDeposit`] the Provider is flagged as insolvent.
    pub fn do_slash(provider_id: &ProviderId) -> DispatchResult {
        let owner = Self::owner_of(provider_id).ok_or(Error::<T>::NotRegistered)?;

        let accrued = T::ProofDealer::get_accrued_failed_proof_submissions(provider_id)
            .unwrap_or_default();
        ensure!(accrued > 0, Error::<T>::ProviderNotSlashable);

        let reason: T::RuntimeHoldReason = HoldReason::StorageProviderDeposit.into();
        let stake = T::NativeBalance::balance_on_hold(&reason, &owner);
        let amount = T::SlashAmountPerMissedProof::get()
            .saturating_mul(accrued.into())
            .min(stake);

        let slashed = T::NativeBalance::transfer_on_hold(
            &reason,
            &owner,
            &T::Treasury::get(),
            amount,
            Precision::BestEffort,
            Restriction::Free,
            Fortitude::Polite,
        )?;
        T::ProofDealer::clear_accrued_failed_proof_submissions(provider_id);

        log::debug!(
            target: LOG_TARGET,
            "Slashed {} from Provider {:?} for {} missed proofs",
            slashed,
            provider_id,
            accrued
        );
        Self::deposit_event(Event::<T>::Slashed {
            provider_id: *provider_id,
            amount: slashed,
        });

        if stake.saturating_sub(slashed) < T::SpMinDeposit::get()
            && !InsolventProviders::<T>::contains_key(provider_id)
        {
            InsolventProviders::<T>::insert(provider_id, ());
            Self::deposit_event(Event::<T>::AwaitingTopUp {
                provider_id: *provider_id,
            });
        }

        Ok(())
    }

    pub fn do_top_up_deposit(who: &T::AccountId, amount: Balance) -> DispatchResult {
        let (provider_id, _) = Self::provider_of_account(who).ok_or(Error::<T>::NotRegistered)?;
        let reason: T::RuntimeHoldReason = HoldReason::StorageProviderDeposit.into();
        ensure!(
            T::NativeBalance::can_hold(&reason, who, amount),
            Error::<T>::NotEnoughBalance
        );
        T::NativeBalance::hold(&reason, who, amount).map_err(|_| Error::<T>::CannotHoldDeposit)?;

        let stake = T::NativeBalance::balance_on_hold(&reason, who);
        if stake >= T::SpMinDeposit::get() && InsolventProviders::<T>::take(&provider_id).is_some()
        {
            Self::deposit_event(Event::<T>::TopUpFulfilled {
                provider_id,
                amount,
            });
        }

        Ok(())
    }

    /// Registers a new bucket. Buckets stored by an MSP count towards its used capacity as
    /// their size grows.
    pub fn do_add_bucket(
        msp_id: Option<ProviderId>,
        owner: &T::AccountId,
        bucket_id: BucketId,
        private: bool,
    ) -> DispatchResult {
        ensure!(
            !Buckets::<T>::contains_key(&bucket_id),
            Error::<T>::BucketAlreadyExists
        );

        if let Some(msp_id) = msp_id {
            MainStorageProviders::<T>::try_mutate(&msp_id, |msp| -> DispatchResult {
                let msp = msp.as_mut().ok_or(Error::<T>::NotAnMsp)?;
                ensure!(
                    msp.buckets.len() < T::MaxBuckets::get() as usize,
                    Error::<T>::AppendBucketToMspFailed
                );
                msp.buckets.push(bucket_id);
                Ok(())
            })?;
        }

        Buckets::<T>::insert(
            bucket_id,
            Bucket {
                root: default_merkle_root(),
                user_id: owner.clone(),
                msp_id,
                private,
                size: 0,
            },
        );

        Ok(())
    }

    pub fn do_change_root_bucket(bucket_id: &BucketId, new_root: MerkleHash) -> DispatchResult {
        let old_root = Buckets::<T>::try_mutate(bucket_id, |bucket| {
            let bucket = bucket.as_mut().ok_or(Error::<T>::BucketNotFound)?;
            Ok::<_, DispatchError>(core::mem::replace(&mut bucket.root, new_root))
        })?;

        Self::deposit_event(Event::<T>::BucketRootChanged {
            bucket_id: *bucket_id,
            old_root,
            new_root,
        });

        Ok(())
    }

    /// Grow the size of a bucket, which also takes that much capacity from its MSP.
    pub fn do_increase_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult {
        Buckets::<T>::try_mutate(bucket_id, |bucket| {
            let bucket = bucket.as_mut().ok_or(Error::<T>::BucketNotFound)?;
            bucket.size = bucket
                .size
                .checked_add(delta)
                .ok_or(ArithmeticError::Overflow)?;
            if let Some(msp_id) = bucket.msp_id {
                Self::do_increase_capacity_used(&msp_id, delta)?;
            }
            Ok(())
        })
    }

    pub fn do_decrease_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult {
        Buckets::<T>::try_mutate(bucket_id, |bucket| {
            let bucket = bucket.as_mut().ok_or(Error::<T>::BucketNotFound)?;
            bucket.size = bucket
                .size
                .checked_sub(delta)
                .ok_or(ArithmeticError::Underflow)?;
            if let Some(msp_id) = bucket.msp_id {
                Self::do_decrease_capacity_used(&msp_id, delta)?;
            }
            Ok(())
        })
    }

    /// Detach a bucket from the MSP storing it, giving the MSP back the capacity it used.
    pub fn do_unassign_msp_from_bucket(bucket_id: &BucketId) -> DispatchResult {
        Buckets::<T>::try_mutate(bucket_id, |bucket| {
            let bucket = bucket.as_mut().ok_or(Error::<T>::BucketNotFound)?;
            let msp_id = bucket.msp_id.take().ok_or(Error::<T>::BucketHasNoMsp)?;

            Self::do_decrease_capacity_used(&msp_id, bucket.size)?;
            MainStorageProviders::<T>::mutate(&msp_id, |msp| {
                if let Some(msp) = msp {
                    msp.buckets.retain(|id| id != bucket_id);
                }
            });

            Ok(())
        })
    }

    pub fn do_increase_capacity_used(
        provider_id: &ProviderId,
        delta: StorageDataUnit,
    ) -> DispatchResult {
        if let Some(mut msp) = MainStorageProviders::<T>::get(provider_id) {
            let new_used = msp
                .capacity_used
                .checked_add(delta)
                .ok_or(ArithmeticError::Overflow)?;
            ensure!(new_used <= msp.capacity, Error::<T>::NotEnoughCapacity);
            msp.capacity_used = new_used;
            MainStorageProviders::<T>::insert(provider_id, msp);
        } else if let Some(mut bsp) = BackupStorageProviders::<T>::get(provider_id) {
            let new_used = bsp
                .capacity_used
                .checked_add(delta)
                .ok_or(ArithmeticError::Overflow)?;
            ensure!(new_used <= bsp.capacity, Error::<T>::NotEnoughCapacity);
            bsp.capacity_used = new_used;
            BackupStorageProviders::<T>::insert(provider_id, bsp);
            UsedBspsCapacity::<T>::mutate(|used| *used = used.saturating_add(delta));
        } else {
            return Err(Error::<T>::NotRegistered.into());
        }
        Ok(())
    }

    pub fn do_decrease_capacity_used(
        provider_id: &ProviderId,
        delta: StorageDataUnit,
    ) -> DispatchResult {
        if let Some(mut msp) = MainStorageProviders::<T>::get(provider_id) {
            msp.capacity_used = msp
                .capacity_used
                .checked_sub(delta)
                .ok_or(Error::<T>::CapacityUsedUnderflow)?;
            MainStorageProviders::<T>::insert(provider_id, msp);
        } else if let Some(mut bsp) = BackupStorageProviders::<T>::get(provider_id) {
            bsp.capacity_used = bsp
                .capacity_used
                .checked_sub(delta)
                .ok_or(Error::<T>::CapacityUsedUnderflow)?;
            BackupStorageProviders::<T>::insert(provider_id, bsp);
            UsedBspsCapacity::<T>::mutate(|used| *used = used.saturating_sub(delta));
        } else {
            return Err(Error::<T>::NotRegistered.into());
        }
        Ok(())
    }

    pub fn do_update_root(provider_id: &ProviderId, new_root: MerkleHash) -> DispatchResult {
        BackupStorageProviders::<T>::try_mutate(provider_id, |bsp| {
            let bsp = bsp.as_mut().ok_or(Error::<T>::NotABsp)?;
            bsp.root = new_root;
            Ok(())
        })
    }

    /// The id and kind of the Provider registered for `who`, if any.
    pub fn provider_of_account(who: &T::AccountId) -> Option<(ProviderId, ProviderKind)> {
        AccountIdToBackupStorageProviderId::<T>::get(who)
            .map(|id| (id, ProviderKind::Backup))
            .or_else(|| {
                AccountIdToMainStorageProviderId::<T>::get(who).map(|id| (id, ProviderKind::Main))
            })
    }

    pub fn owner_of(provider_id: &ProviderId) -> Option<T::AccountId> {
        BackupStorageProviders::<T>::get(provider_id)
            .map(|bsp| bsp.owner_account)
            .or_else(|| MainStorageProviders::<T>::get(provider_id).map(|msp| msp.owner_account))
    }

    pub fn stake_of(provider_id: &ProviderId) -> Option<Balance> {
        Self::owner_of(provider_id).map(|owner| {
            T::NativeBalance::balance_on_hold(&HoldReason::StorageProviderDeposit.into(), &owner)
        })
    }

    /// Capacity and used capacity of a Provider, zero for unknown ids.
    pub fn capacity_of(provider_id: &ProviderId) -> (StorageDataUnit, StorageDataUnit) {
        BackupStorageProviders::<T>::get(provider_id)
            .map(|bsp| (bsp.capacity, bsp.capacity_used))
            .or_else(|| {
                MainStorageProviders::<T>::get(provider_id).map(|msp| (msp.capacity, msp.capacity_used))
            })
            .unwrap_or_default()
    }

    /// Bucket ids are the hash of the owner followed by the bucket name.
    pub fn derive_bucket_id(owner: &T::AccountId, name: &[u8]) -> BucketId {
        let mut preimage = owner.encode();
        preimage.extend_from_slice(name);
        Hashing::hash(&preimage)
    }
}

impl<T: pallet::Config> ReadProvidersInterface for pallet::Pallet<T> {
    type AccountId = T::AccountId;

    fn get_provider_id(who: &Self::AccountId) -> Option<ProviderId> {
        Self::provider_of_account(who).map(|(id, _)| id)
    }

    fn get_owner_account(provider_id: &ProviderId) -> Option<Self::AccountId> {
        Self::owner_of(provider_id)
    }

    fn is_bsp(provider_id: &ProviderId) -> bool {
        BackupStorageProviders::<T>::contains_key(provider_id)
    }

    fn is_msp(provider_id: &ProviderId) -> bool {
        MainStorageProviders::<T>::contains_key(provider_id)
    }

    fn get_stake(provider_id: &ProviderId) -> Option<Balance> {
        Self::stake_of(provider_id)
    }

    fn get_min_stake() -> Balance {
        T::SpMinDeposit::get()
    }

    fn get_root(provider_id: &ProviderId) -> Option<MerkleHash> {
        BackupStorageProviders::<T>::get(provider_id).map(|bsp| bsp.root)
    }

    fn get_default_root() -> MerkleHash {
        default_merkle_root()
    }

    fn get_capacity(provider_id: &ProviderId) -> StorageDataUnit {
        Self::capacity_of(provider_id).0
    }

    fn get_used_capacity(provider_id: &ProviderId) -> StorageDataUnit {
        Self::capacity_of(provider_id).1
    }

    fn available_capacity(provider_id: &ProviderId) -> StorageDataUnit {
        let (capacity, used) = Self::capacity_of(provider_id);
        capacity.saturating_sub(used)
    }

    fn is_provider_insolvent(provider_id: &ProviderId) -> bool {
        InsolventProviders::<T>::contains_key(provider_id)
    }
}

impl<T: pallet::Config> MutateProvidersInterface for pallet::Pallet<T> {
    fn update_root(provider_id: &ProviderId, new_root: MerkleHash) -> DispatchResult {
        Self::do_update_root(provider_id, new_root)
    }

    fn increase_capacity_used(provider_id: &ProviderId, delta: StorageDataUnit) -> DispatchResult {
        Self::do_increase_capacity_used(provider_id, delta)
    }

    fn decrease_capacity_used(provider_id: &ProviderId, delta: StorageDataUnit) -> DispatchResult {
        Self::do_decrease_capacity_used(provider_id, delta)
    }
}

impl<T: pallet::Config> ReadBucketsInterface for pallet::Pallet<T> {
    type AccountId = T::AccountId;

    fn bucket_exists(bucket_id: &BucketId) -> bool {
        Buckets::<T>::contains_key(bucket_id)
    }

    fn get_msp_of_bucket(bucket_id: &BucketId) -> Option<ProviderId> {
        Buckets::<T>::get(bucket_id).and_then(|bucket| bucket.msp_id)
    }

    fn get_bucket_owner(bucket_id: &BucketId) -> Option<Self::AccountId> {
        Buckets::<T>::get(bucket_id).map(|bucket| bucket.user_id)
    }

    fn get_root_bucket(bucket_id: &BucketId) -> Option<MerkleHash> {
        Buckets::<T>::get(bucket_id).map(|bucket| bucket.root)
    }

    fn get_bucket_size(bucket_id: &BucketId) -> Option<StorageDataUnit> {
        Buckets::<T>::get(bucket_id).map(|bucket| bucket.size)
    }

    fn derive_bucket_id(owner: &Self::AccountId, name: &[u8]) -> BucketId {
        Pallet::<T>::derive_bucket_id(owner, name)
    }
}

impl<T: pallet::Config> MutateBucketsInterface for pallet::Pallet<T> {
    fn add_bucket(
        msp_id: Option<ProviderId>,
        owner: &Self::AccountId,
        bucket_id: BucketId,
        private: bool,
    ) -> DispatchResult {
        Self::do_add_bucket(msp_id, owner, bucket_id, private)
    }

    fn change_root_bucket(bucket_id: &BucketId, new_root: MerkleHash) -> DispatchResult {
        Self::do_change_root_bucket(bucket_id, new_root)
    }

    fn increase_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult {
        Self::do_increase_bucket_size(bucket_id, delta)
    }

    fn decrease_bucket_size(bucket_id: &BucketId, delta: StorageDataUnit) -> DispatchResult {
        Self::do_decrease_bucket_size(bucket_id, delta)
    }

    fn unassign_msp_from_bucket(bucket_id: &BucketId) -> DispatchResult {
        Self::do_unassign_msp_from_bucket(bucket_id)
    }
}
