//! Vault Configuration
//!
//! Creation-time parameters, loadable from TOML or from `YIELDVAULT_*`
//! environment variables (a `.env` file is honoured). Every loader runs
//! [`VaultConfig::validate`] before handing the config out.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use yieldvault_common::constants::{adapter, breaker, fees};
use yieldvault_common::errors::{VaultError, VaultResult};
use yieldvault_common::types::{derive_id, AssetId, RiskProfile};
use yieldvault_common::{circuit_breaker, fees as fee_engine};

/// Vault creation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Share token name
    pub name: String,
    /// Share token symbol
    pub symbol: String,
    /// Label of the underlying asset; hashed into the asset id
    pub asset: String,
    pub risk_profile: RiskProfile,
    pub performance_fee_bps: u64,
    pub management_fee_bps: u64,
    pub loss_threshold_bps: u64,
    pub breaker_cooldown_secs: u64,
    /// Timeout applied to every strategy adapter call
    pub adapter_timeout_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: "YieldVault USDC".to_string(),
            symbol: "yvUSDC".to_string(),
            asset: "USDC".to_string(),
            risk_profile: RiskProfile::Moderate,
            performance_fee_bps: fees::DEFAULT_PERFORMANCE_FEE_BPS,
            management_fee_bps: fees::DEFAULT_MANAGEMENT_FEE_BPS,
            loss_threshold_bps: breaker::DEFAULT_LOSS_THRESHOLD_BPS,
            breaker_cooldown_secs: breaker::DEFAULT_COOLDOWN_SECS,
            adapter_timeout_ms: adapter::DEFAULT_TIMEOUT_MS,
        }
    }
}

impl VaultConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> VaultResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `YIELDVAULT_*` variables on top of the defaults
    pub fn from_env() -> VaultResult<Self> {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(v) = std::env::var("YIELDVAULT_NAME") {
            config.name = v;
        }
        if let Ok(v) = std::env::var("YIELDVAULT_SYMBOL") {
            config.symbol = v;
        }
        if let Ok(v) = std::env::var("YIELDVAULT_ASSET") {
            config.asset = v;
        }
        if let Ok(v) = std::env::var("YIELDVAULT_RISK_PROFILE") {
            config.risk_profile = parse_risk_profile(&v)?;
        }
        env_override("YIELDVAULT_PERFORMANCE_FEE_BPS", &mut config.performance_fee_bps)?;
        env_override("YIELDVAULT_MANAGEMENT_FEE_BPS", &mut config.management_fee_bps)?;
        env_override("YIELDVAULT_LOSS_THRESHOLD_BPS", &mut config.loss_threshold_bps)?;
        env_override("YIELDVAULT_BREAKER_COOLDOWN_SECS", &mut config.breaker_cooldown_secs)?;
        env_override("YIELDVAULT_ADAPTER_TIMEOUT_MS", &mut config.adapter_timeout_ms)?;

        config.validate()?;
        Ok(config)
    }

    /// Check every bound
    pub fn validate(&self) -> VaultResult<()> {
        if self.name.trim().is_empty() || self.symbol.trim().is_empty() {
            return Err(invalid_config("name and symbol are required"));
        }
        if self.asset.trim().is_empty() {
            return Err(invalid_config("asset is required"));
        }
        if self.adapter_timeout_ms == 0 {
            return Err(invalid_config("adapter_timeout_ms must be positive"));
        }
        fee_engine::validate_performance_fee(self.performance_fee_bps).map_err(invalid)?;
        fee_engine::validate_management_fee(self.management_fee_bps).map_err(invalid)?;
        circuit_breaker::validate_threshold(self.loss_threshold_bps).map_err(invalid)?;
        circuit_breaker::validate_cooldown(self.breaker_cooldown_secs).map_err(invalid)?;
        Ok(())
    }

    pub fn asset_id(&self) -> AssetId {
        derive_id("yieldvault:asset", &self.asset)
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_millis(self.adapter_timeout_ms)
    }
}

fn invalid(err: VaultError) -> VaultError {
    invalid_config(err.to_string())
}

fn invalid_config(reason: impl Into<String>) -> VaultError {
    VaultError::InvalidConfig { reason: reason.into() }
}

fn env_override<T: FromStr>(key: &str, slot: &mut T) -> VaultResult<()> {
    if let Ok(raw) = std::env::var(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| invalid_config(format!("{key}: cannot parse {raw:?}")))?;
    }
    Ok(())
}

fn parse_risk_profile(raw: &str) -> VaultResult<RiskProfile> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "conservative" => Ok(RiskProfile::Conservative),
        "moderate" => Ok(RiskProfile::Moderate),
        "aggressive" => Ok(RiskProfile::Aggressive),
        other => Err(invalid_config(format!("unknown risk profile {other:?}"))),
    }
}
