//! # StorageHub Runtime genesis config presets

use codec::Encode;
use shp_types::{MultiAddress, ProviderId, StorageDataUnit};
use sp_core::{hashing::blake2_256, sr25519, Pair, Public, H256};
use sp_runtime::{
    traits::{IdentifyAccount, Verify},
    BuildStorage, DispatchError,
};

use crate::{
    configs::runtime_params::SP_MIN_DEPOSIT, AccountId, Balance, BalancesConfig, Providers,
    RuntimeGenesisConfig, RuntimeOrigin, Signature, SudoConfig, System, EXISTENTIAL_DEPOSIT,
    TREASURY_ACCOUNT, UNIT,
};

type AccountPublic = <Signature as Verify>::Signer;

pub const DEVELOPMENT_PRESET: &str = "development";

/// Initial balance of every endowed development account.
pub const ENDOWMENT: Balance = 10_000 * UNIT;

/// Capacity of every development Provider: 1 GiB.
pub const DEV_PROVIDER_CAPACITY: StorageDataUnit = 1024 * 1024 * 1024;

/// Helper function to generate a crypto pair from seed
pub fn get_from_seed<TPublic: Public>(seed: &str) -> <TPublic::Pair as Pair>::Public {
    TPublic::Pair::from_string(&format!("//{}", seed), None)
        .expect("static values are valid; qed")
        .public()
}

/// Helper function to generate an account ID from seed
pub fn get_account_id_from_seed<TPublic: Public>(seed: &str) -> AccountId
where
    AccountPublic: From<<TPublic::Pair as Pair>::Public>,
{
    AccountPublic::from(get_from_seed::<TPublic>(seed)).into_account()
}

/// Account of a development seed such as `"Alice"`.
pub fn dev_account(seed: &str) -> AccountId {
    get_account_id_from_seed::<sr25519::Public>(seed)
}

/// Provider id a development account signs up with.
pub fn dev_provider_id(who: &AccountId) -> ProviderId {
    H256(blake2_256(&(b"provider", who).encode()))
}

/// A Storage Provider registered at genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenesisProvider {
    pub who: AccountId,
    pub provider_id: ProviderId,
    pub capacity: StorageDataUnit,
    pub multiaddresses: Vec<MultiAddress>,
    pub stake: Balance,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GenesisConfig {
    pub balances: Vec<(AccountId, Balance)>,
    pub sudo: Option<AccountId>,
    pub msps: Vec<GenesisProvider>,
    pub bsps: Vec<GenesisProvider>,
}

impl GenesisConfig {
    /// Build the state at block zero.
    ///
    /// Providers are signed up through their root calls, so they hold their stake and start
    /// their challenge cycles like any other Provider.
    pub fn build(self) -> Result<sp_io::TestExternalities, DispatchError> {
        let mut balances = vec![(TREASURY_ACCOUNT, EXISTENTIAL_DEPOSIT)];
        balances.extend(self.balances);

        let storage = RuntimeGenesisConfig {
            balances: BalancesConfig {
                balances,
                ..Default::default()
            },
            sudo: SudoConfig { key: self.sudo },
            ..Default::default()
        }
        .build_storage()
        .map_err(|e| {
            log::error!(target: crate::LOG_TARGET, "Failed to build genesis storage: {}", e);
            DispatchError::Other("genesis storage could not be built")
        })?;

        let mut ext = sp_io::TestExternalities::new(storage);
        ext.execute_with(|| -> Result<(), DispatchError> {
            for msp in self.msps {
                Providers::force_msp_sign_up(
                    RuntimeOrigin::root(),
                    msp.who,
                    msp.provider_id,
                    msp.capacity,
                    msp.multiaddresses,
                    msp.stake,
                )
                .map_err(|e| e.error)?;
            }
            for bsp in self.bsps {
                Providers::force_bsp_sign_up(
                    RuntimeOrigin::root(),
                    bsp.who,
                    bsp.provider_id,
                    bsp.capacity,
                    bsp.multiaddresses,
                    bsp.stake,
                )
                .map_err(|e| e.error)?;
            }

            System::reset_events();
            Ok(())
        })?;

        Ok(ext)
    }
}

fn dev_provider(seed: &str, port: u16, stake: Balance) -> GenesisProvider {
    let who = dev_account(seed);
    GenesisProvider {
        provider_id: dev_provider_id(&who),
        who,
        capacity: DEV_PROVIDER_CAPACITY,
        multiaddresses: vec![format!("/ip4/127.0.0.1/tcp/{port}").into_bytes()],
        stake,
    }
}

pub fn testnet_genesis(
    endowed_accounts: Vec<AccountId>,
    root: Option<AccountId>,
    msps: Vec<GenesisProvider>,
    bsps: Vec<GenesisProvider>,
) -> GenesisConfig {
    GenesisConfig {
        balances: endowed_accounts
            .into_iter()
            .map(|who| (who, ENDOWMENT))
            .collect(),
        sudo: root,
        msps,
        bsps,
    }
}

/// `Alice` is the sudo key. `Bob` runs an MSP. `Charlie` and `Dave` run BSPs, `Charlie` with
/// ten times the minimum stake.
pub fn development_config_genesis() -> GenesisConfig {
    testnet_genesis(
        ["Alice", "Bob", "Charlie", "Dave", "Eve", "Ferdie"]
            .into_iter()
            .map(dev_account)
            .collect(),
        Some(dev_account("Alice")),
        vec![dev_provider("Bob", 30350, SP_MIN_DEPOSIT)],
        vec![
            dev_provider("Charlie", 30351, 10 * SP_MIN_DEPOSIT),
            dev_provider("Dave", 30352, SP_MIN_DEPOSIT),
        ],
    )
}

/// Provides the genesis config of a named preset.
pub fn get_preset(id: &str) -> Option<GenesisConfig> {
    match id {
        DEVELOPMENT_PRESET => Some(development_config_genesis()),
        _ => None,
    }
}

/// List of supported presets.
pub fn preset_names() -> Vec<&'static str> {
    vec![DEVELOPMENT_PRESET]
}
