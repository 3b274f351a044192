//! Session configuration loaded from a TOML file.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::core::error::{StakingError, StakingResult};
use crate::core::types::Address;

/// Staking session configuration loaded from TOML file
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StakingConfig {
    /// Staking pool contract address; also the ERC-20 spender approvals
    /// are granted to.
    pub pool: Address,

    /// Address of the token being staked.
    pub stake_token: Address,

    /// Whether submission acknowledgements are sent through the
    /// notification sink in addition to terminal outcomes.
    #[serde(default = "default_notify_submissions")]
    pub notify_submissions: bool,
}

fn default_notify_submissions() -> bool {
    true
}

impl StakingConfig {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> StakingResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            StakingError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: StakingConfig = toml::from_str(&content).map_err(|e| {
            StakingError::Config(format!("Failed to parse config file {}: {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &str) -> StakingResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StakingError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content).map_err(|e| {
            StakingError::Config(format!("Failed to write config file {}: {}", path, e))
        })?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> StakingResult<()> {
        if self.pool.is_empty() {
            return Err(StakingError::Config(
                "pool address must not be empty".to_string(),
            ));
        }
        if self.stake_token.is_empty() {
            return Err(StakingError::Config(
                "stake_token address must not be empty".to_string(),
            ));
        }
        if self.pool == self.stake_token {
            return Err(StakingError::Config(
                "pool and stake_token must be different contracts".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            pool: Address::new(""),
            stake_token: Address::new(""),
            notify_submissions: true,
        }
    }
}

/// Create example configuration file
pub fn create_example_config(path: &str) -> StakingResult<()> {
    let example_config = StakingConfig {
        pool: Address::new("0x8f5b2b7608e3e3a3dc0426c3396420fbf1849454"),
        stake_token: Address::new("0x6b175474e89094c44da98b954eedeac495271d0f"),
        notify_submissions: true,
    };
    example_config.save(path)?;
    Ok(())
}
