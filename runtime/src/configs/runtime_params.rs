use crate::{Balance, UNIT};
use frame_support::parameter_types;
use shp_types::{AccountId, StorageDataUnit, ThresholdType, TickNumber};
use sp_runtime::traits::Convert;

/// Minimum stake of a Storage Provider.
pub const SP_MIN_DEPOSIT: Balance = 100 * UNIT;
pub const SP_MIN_CAPACITY: StorageDataUnit = 2;
pub const MAX_MULTI_ADDRESS_AMOUNT: u32 = 5;
pub const MAX_BUCKETS_PER_MSP: u32 = 1_000;
pub const SLASH_AMOUNT_PER_MISSED_PROOF: Balance = 20 * UNIT;

pub const RANDOM_CHALLENGES_PER_BLOCK: u32 = 10;
pub const MAX_CUSTOM_CHALLENGES_PER_BLOCK: u32 = 10;
pub const CHALLENGES_QUEUE_LENGTH: u32 = 100;
pub const CHALLENGE_HISTORY_LENGTH: TickNumber = 200;
pub const CHALLENGE_TICKS_TOLERANCE: TickNumber = 50;
pub const CHALLENGES_FEE: Balance = UNIT;

/// Challenge period of a Provider with the minimum stake.
pub const MIN_CHALLENGE_PERIOD: TickNumber = 20;
pub const MAX_CHALLENGE_PERIOD: TickNumber = 60;
/// Stake above the minimum that adds one tick to the challenge period.
pub const STAKE_PER_CHALLENGE_PERIOD_TICK: Balance = 100 * UNIT;
/// Every Provider sees at least one checkpoint between two proofs.
pub const CHECKPOINT_CHALLENGE_PERIOD: TickNumber = MAX_CHALLENGE_PERIOD + 1;

pub const NEW_STREAM_DEPOSIT: TickNumber = 10;
/// Price of storing one byte for one tick.
pub const PRICE_PER_UNIT_PER_TICK: Balance = 1_000;

pub const TICK_RANGE_TO_MAXIMUM_THRESHOLD: TickNumber = 30;
pub const DEFAULT_REPLICATION_TARGET: u32 = 1;
pub const MAX_REPLICATION_TARGET: u32 = 5;
pub const STORAGE_REQUEST_TTL: TickNumber = 40;
pub const MAX_EXPIRED_ITEMS_IN_BLOCK: u32 = 100;
pub const MIN_WAIT_FOR_STOP_STORING: TickNumber = 10;
pub const STORAGE_REQUEST_CREATION_DEPOSIT: Balance = UNIT;
pub const BSP_STOP_STORING_FILE_PENALTY: Balance = UNIT;
pub const BUCKET_FIXED_RATE: Balance = 10;
pub const MAX_FILE_PATH_SIZE: u32 = 512;
pub const MAX_NUMBER_OF_PEER_IDS: u32 = 5;
pub const MAX_BATCH_CONFIRM_STORAGE_REQUESTS: u32 = 10;

/// Share of the threshold space a BSP starts with, per `SP_MIN_DEPOSIT` of stake.
pub const THRESHOLD_START_PER_MIN_DEPOSIT: ThresholdType = ThresholdType::MAX / 100;

/// Account of the treasury, derived from the `py/trsry` pallet id the same way a module
/// account is.
pub const TREASURY_ACCOUNT: AccountId = AccountId::new(module_account(*b"py/trsry"));

const fn module_account(id: [u8; 8]) -> [u8; 32] {
    let mut account = [0u8; 32];
    let prefix = *b"modl";
    let mut i = 0;
    while i < prefix.len() {
        account[i] = prefix[i];
        i += 1;
    }
    let mut j = 0;
    while j < id.len() {
        account[prefix.len() + j] = id[j];
        j += 1;
    }
    account
}

parameter_types! {
    pub const TreasuryAccount: AccountId = TREASURY_ACCOUNT;
}

/// The threshold of a BSP starts proportional to its stake, so BSPs with more at stake get to
/// volunteer earlier.
pub struct StakeToThresholdStart;
impl Convert<Balance, ThresholdType> for StakeToThresholdStart {
    fn convert(stake: Balance) -> ThresholdType {
        let deposits = ThresholdType::try_from(stake / SP_MIN_DEPOSIT).unwrap_or(ThresholdType::MAX);
        deposits.saturating_mul(THRESHOLD_START_PER_MIN_DEPOSIT)
    }
}

/// Providers with more stake get challenged less often, capped at `MAX_CHALLENGE_PERIOD`.
pub struct StakeToChallengePeriod;
impl Convert<Balance, TickNumber> for StakeToChallengePeriod {
    fn convert(stake: Balance) -> TickNumber {
        let extra = stake.saturating_sub(SP_MIN_DEPOSIT) / STAKE_PER_CHALLENGE_PERIOD_TICK;
        let extra = TickNumber::try_from(extra).unwrap_or(TickNumber::MAX);
        MIN_CHALLENGE_PERIOD
            .saturating_add(extra)
            .min(MAX_CHALLENGE_PERIOD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn treasury_is_a_module_account() {
        let bytes: &[u8] = TREASURY_ACCOUNT.as_ref();
        assert_eq!(&bytes[..12], b"modlpy/trsry");
        assert!(bytes[12..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn threshold_start_grows_with_stake() {
        assert_eq!(StakeToThresholdStart::convert(0), 0);
        assert_eq!(
            StakeToThresholdStart::convert(SP_MIN_DEPOSIT),
            THRESHOLD_START_PER_MIN_DEPOSIT
        );
        assert!(
            StakeToThresholdStart::convert(10 * SP_MIN_DEPOSIT)
                > StakeToThresholdStart::convert(2 * SP_MIN_DEPOSIT)
        );
        assert_eq!(StakeToThresholdStart::convert(Balance::MAX), ThresholdType::MAX);
    }

    #[test]
    fn challenge_period_grows_with_stake_up_to_the_maximum() {
        assert_eq!(StakeToChallengePeriod::convert(SP_MIN_DEPOSIT), MIN_CHALLENGE_PERIOD);
        assert_eq!(
            StakeToChallengePeriod::convert(SP_MIN_DEPOSIT + 5 * STAKE_PER_CHALLENGE_PERIOD_TICK),
            MIN_CHALLENGE_PERIOD + 5
        );
        assert_eq!(StakeToChallengePeriod::convert(Balance::MAX), MAX_CHALLENGE_PERIOD);
    }
}
