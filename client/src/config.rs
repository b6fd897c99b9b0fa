use std::path::Path;

use serde::Deserialize;
use shp_types::TickNumber;

use crate::tasks::{
    bsp_stop_storing::BspStopStoringConfig, bsp_submit_proof::BspSubmitProofConfig,
    bsp_upload_file::BspUploadFileConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration of a Backup Storage Provider node.
///
/// Every field is optional in the TOML file, missing ones take their default value:
///
/// ```toml
/// max_try_count = 5
/// max_batch_confirm_storage_requests = 4
///
/// [bsp_submit_proof]
/// max_submission_attempts = 3
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BspConfig {
    /// Times a confirm storing request is retried before it is dropped.
    pub max_try_count: u32,
    /// Maximum number of files confirmed in a single extrinsic.
    ///
    /// The runtime's own limit applies if it is lower.
    pub max_batch_confirm_storage_requests: u32,
    /// Ticks to wait for an extrinsic to be included before giving up on it.
    pub extrinsic_timeout_ticks: TickNumber,
    pub bsp_upload_file: BspUploadFileConfig,
    pub bsp_submit_proof: BspSubmitProofConfig,
    pub bsp_stop_storing: BspStopStoringConfig,
}

impl Default for BspConfig {
    fn default() -> Self {
        Self {
            max_try_count: 3,
            max_batch_confirm_storage_requests: 10,
            extrinsic_timeout_ticks: 10,
            bsp_upload_file: BspUploadFileConfig::default(),
            bsp_submit_proof: BspSubmitProofConfig::default(),
            bsp_stop_storing: BspStopStoringConfig::default(),
        }
    }
}

impl BspConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            log::error!("Fail to read config file {:?}: {}", path, e);
            e
        })?;

        Self::from_toml_str(&contents)
    }
}
