//! Vault simulation
//!
//! Drives one vault through a year against two simulated lending markets
//! on a manual clock and prints the resulting vault info and performance.
//!
//! Configuration comes from `YIELDVAULT_*` variables (see `VaultConfig`).
//! Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yieldvault_common::access_control::{AuthContext, Role};
use yieldvault_common::clock::ManualClock;
use yieldvault_common::constants::time::{DAY, YEAR};
use yieldvault_common::errors::VaultResult;
use yieldvault_common::types::address_from_label;
use yieldvault_strategy::{LendingMarketConfig, LendingStrategy};
use yieldvault_vault::{Vault, VaultConfig};

const START: u64 = 1_700_000_000;
const DEPOSIT: u64 = 1_000_000_000_000;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = VaultConfig::from_env().context("loading vault config")?;
    let clock = Arc::new(ManualClock::new(START));

    let admin = AuthContext::with_roles(address_from_label("admin"), &[Role::Admin]);
    let keeper = AuthContext::with_roles(address_from_label("keeper"), &[Role::Keeper]);
    let depositor = address_from_label("depositor");

    let vault = Vault::new(&config, admin.caller, address_from_label("treasury"), clock.clone())
        .context("creating vault")?;

    let stable = LendingMarketConfig {
        name: "compound-usdc".to_string(),
        supply_apy_bps: 450,
        ..LendingMarketConfig::default()
    };
    let boosted = LendingMarketConfig {
        name: "aave-usdc".to_string(),
        protocol: "Aave".to_string(),
        risk_score: 4,
        supply_apy_bps: 380,
        reward_per_sec: 1_000,
        ..LendingMarketConfig::default()
    };
    let stable = Arc::new(LendingStrategy::new(stable, clock.clone()));
    let boosted = Arc::new(LendingStrategy::new(boosted, clock.clone()));
    vault.add_strategy(&admin, stable.clone(), 6_000).await?;
    vault.add_strategy(&admin, boosted.clone(), 3_500).await?;

    vault.deposit(&AuthContext::user(depositor), DEPOSIT, depositor).await?;
    vault.rebalance(&keeper).await?;

    // weekly harvest and rebalance, daily management fee
    for day in 1..=YEAR / DAY {
        clock.advance(DAY);
        vault.collect_fees(&keeper).await?;
        if day % 7 == 0 {
            let status = vault.keeper_status().await?;
            if !status.harvestable.is_empty() {
                let harvest = vault.harvest_yield(&keeper).await;
                if let Some(report) = keeper_step(day, "harvest", harvest)? {
                    info!(
                        day,
                        harvested = report.harvested,
                        fee = report.performance_fee,
                        failed = report.failed,
                        "weekly harvest"
                    );
                }
            }
            if status.rebalance_due {
                keeper_step(day, "rebalance", vault.rebalance(&keeper).await)?;
            }
        }
    }

    for (name, market) in [("compound-usdc", &stable), ("aave-usdc", &boosted)] {
        info!(
            market = name,
            harvested = market.total_harvested(),
            unsold_rewards = market.pending_rewards(),
            "market summary"
        );
    }

    let vault_info = vault.vault_info().await?;
    let performance = vault.performance_metrics().await;
    println!("{}", serde_json::to_string_pretty(&vault_info)?);
    println!("{}", serde_json::to_string_pretty(&performance)?);
    Ok(())
}

/// Keep the simulation going through rejections a keeper would retry
fn keeper_step<T>(day: u64, task: &str, result: VaultResult<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_expected_rejection() => {
            debug!(day, task, error = %e, "keeper task skipped");
            Ok(None)
        }
        Err(e) if e.is_recoverable() => {
            warn!(day, task, error = %e, code = e.code(), "keeper task failed, retrying next week");
            Ok(None)
        }
        Err(e) => {
            if e.is_fatal() {
                error!(day, task, error = %e, code = e.code(), "vault integrity failure");
            }
            Err(anyhow::Error::new(e).context(format!("{task} on day {day}")))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "yieldvault_vault=info,yieldvault_strategy=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
