//! Reference Lending Strategy
//!
//! Simulated money market in the style of a Compound/Aave supply position:
//!
//! - supplied balance grows at a fixed supply APY, accrued per second
//! - a reward token is emitted per second while funds are supplied and is
//!   sold for the underlying at harvest, at an internal price minus swap
//!   slippage
//! - the market can run short of cash (`available_liquidity`), making
//!   withdrawals partial
//! - the market can be paused, failing every call but `emergency_exit`
//!
//! The position also exposes knobs (`apply_loss`, `set_paused`,
//! `set_available_liquidity`) used by tests and the simulation binary.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use yieldvault_common::clock::Clock;
use yieldvault_common::constants::{bps, precision, time};
use yieldvault_common::types::Address;

use crate::adapter::{
    strategy_id_from_name, StrategyAdapter, StrategyError, StrategyInfo, StrategyResult,
};

/// Market parameters
#[derive(Debug, Clone)]
pub struct LendingMarketConfig {
    /// Strategy display name
    pub name: String,
    /// Protocol label
    pub protocol: String,
    /// Risk score reported in `info`
    pub risk_score: u8,
    /// Supply APY (basis points)
    pub supply_apy_bps: u64,
    /// Reward tokens emitted per second while supplied
    pub reward_per_sec: u64,
    /// Underlying per reward token, scaled by `PRICE_SCALE`
    pub reward_price: u128,
    /// Swap slippage applied when selling rewards (basis points)
    pub swap_slippage_bps: u64,
}

impl Default for LendingMarketConfig {
    fn default() -> Self {
        Self {
            name: "lending".to_string(),
            protocol: "Compound".to_string(),
            risk_score: 3,
            supply_apy_bps: 400,
            reward_per_sec: 0,
            reward_price: precision::PRICE_SCALE,
            swap_slippage_bps: 30,
        }
    }
}

#[derive(Debug, Default)]
struct Position {
    vault: Option<Address>,
    /// Supplied balance including accrued interest
    balance: u64,
    /// Portion of `balance` that is principal
    principal: u64,
    reward_tokens: u64,
    last_accrual: u64,
    paused: bool,
    /// Cash the market can pay out; `None` = unlimited
    available_liquidity: Option<u64>,
    total_harvested: u64,
}

/// Simulated lending market position
pub struct LendingStrategy {
    id: [u8; 32],
    config: LendingMarketConfig,
    clock: Arc<dyn Clock>,
    position: Mutex<Position>,
}

impl LendingStrategy {
    pub fn new(config: LendingMarketConfig, clock: Arc<dyn Clock>) -> Self {
        let position = Position { last_accrual: clock.now(), ..Position::default() };
        Self {
            id: strategy_id_from_name(&config.name),
            config,
            clock,
            position: Mutex::new(position),
        }
    }

    /// Pause or resume the market
    pub fn set_paused(&self, paused: bool) {
        self.position.lock().paused = paused;
    }

    /// Cap the cash the market can pay out; `None` removes the cap
    pub fn set_available_liquidity(&self, liquidity: Option<u64>) {
        self.position.lock().available_liquidity = liquidity;
    }

    /// Write down the supplied balance by `loss_bps` (bad debt)
    pub fn apply_loss(&self, loss_bps: u64) {
        let mut position = self.position.lock();
        let loss = (position.balance as u128 * loss_bps.min(bps::DENOMINATOR) as u128
            / bps::DENOMINATOR as u128) as u64;
        position.balance -= loss;
        position.principal = position.principal.min(position.balance);
        warn!(strategy = %self.config.name, loss, "lending position written down");
    }

    /// Total yield paid to the vault since creation
    pub fn total_harvested(&self) -> u64 {
        self.position.lock().total_harvested
    }

    /// Unsold reward tokens
    pub fn pending_rewards(&self) -> u64 {
        self.position.lock().reward_tokens
    }

    fn accrue(&self, position: &mut Position) -> StrategyResult<()> {
        let now = self.clock.now();
        let elapsed = now.saturating_sub(position.last_accrual);
        position.last_accrual = position.last_accrual.max(now);
        if elapsed == 0 || position.balance == 0 {
            return Ok(());
        }

        let accrued = position.balance as u128 * self.config.supply_apy_bps as u128;
        let interest = accrued * elapsed as u128 / (bps::DENOMINATOR as u128 * time::YEAR as u128);
        let interest = u64::try_from(interest).map_err(|_| StrategyError::Overflow)?;
        position.balance = position.balance.checked_add(interest).ok_or(StrategyError::Overflow)?;

        let rewards = self.config.reward_per_sec.saturating_mul(elapsed);
        position.reward_tokens = position.reward_tokens.saturating_add(rewards);
        Ok(())
    }

    fn reward_value(&self, reward_tokens: u64) -> u64 {
        let gross = reward_tokens as u128 * self.config.reward_price / precision::PRICE_SCALE;
        let slippage = self.config.swap_slippage_bps.min(bps::DENOMINATOR);
        let net = gross * (bps::DENOMINATOR - slippage) as u128 / bps::DENOMINATOR as u128;
        u64::try_from(net).unwrap_or(u64::MAX)
    }

    fn release(position: &mut Position, amount: u64) -> u64 {
        let cash = position.available_liquidity.unwrap_or(u64::MAX);
        let actual = amount.min(position.balance).min(cash);
        position.balance -= actual;
        position.principal = position.principal.saturating_sub(actual);
        if let Some(liquidity) = position.available_liquidity.as_mut() {
            *liquidity -= actual;
        }
        actual
    }

    fn ensure_open(position: &Position) -> StrategyResult<()> {
        if position.paused {
            return Err(StrategyError::MarketPaused);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StrategyAdapter for LendingStrategy {
    fn id(&self) -> [u8; 32] {
        self.id
    }

    fn info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.config.name.clone(),
            protocol: self.config.protocol.clone(),
            risk_score: self.config.risk_score,
            apy_bps: self.config.supply_apy_bps,
        }
    }

    async fn authorize_vault(&self, vault: Address) -> StrategyResult<()> {
        let mut position = self.position.lock();
        match position.vault {
            Some(bound) if bound != vault => Err(StrategyError::Unauthorized { vault: bound }),
            _ => {
                position.vault = Some(vault);
                Ok(())
            }
        }
    }

    async fn estimated_total_assets(&self) -> StrategyResult<u64> {
        let mut position = self.position.lock();
        self.accrue(&mut position)?;
        Ok(position.balance)
    }

    async fn can_harvest(&self) -> StrategyResult<bool> {
        let mut position = self.position.lock();
        if position.paused {
            return Ok(false);
        }
        self.accrue(&mut position)?;
        Ok(position.balance > position.principal || self.reward_value(position.reward_tokens) > 0)
    }

    async fn deposit(&self, amount: u64) -> StrategyResult<()> {
        if amount == 0 {
            return Err(StrategyError::InvalidAmount { amount });
        }
        let mut position = self.position.lock();
        Self::ensure_open(&position)?;
        self.accrue(&mut position)?;
        position.balance = position.balance.checked_add(amount).ok_or(StrategyError::Overflow)?;
        position.principal = position.principal.checked_add(amount).ok_or(StrategyError::Overflow)?;
        if let Some(liquidity) = position.available_liquidity.as_mut() {
            *liquidity = liquidity.saturating_add(amount);
        }
        debug!(strategy = %self.config.name, amount, balance = position.balance, "supplied");
        Ok(())
    }

    async fn withdraw(&self, amount: u64) -> StrategyResult<u64> {
        if amount == 0 {
            return Err(StrategyError::InvalidAmount { amount });
        }
        let mut position = self.position.lock();
        Self::ensure_open(&position)?;
        self.accrue(&mut position)?;
        let actual = Self::release(&mut position, amount);
        if actual < amount {
            debug!(strategy = %self.config.name, requested = amount, actual, "partial withdrawal");
        }
        Ok(actual)
    }

    async fn withdraw_all(&self) -> StrategyResult<u64> {
        let mut position = self.position.lock();
        Self::ensure_open(&position)?;
        self.accrue(&mut position)?;
        let balance = position.balance;
        Ok(Self::release(&mut position, balance))
    }

    async fn harvest(&self) -> StrategyResult<u64> {
        let mut position = self.position.lock();
        Self::ensure_open(&position)?;
        self.accrue(&mut position)?;

        let interest = position.balance.saturating_sub(position.principal);
        let cash = position.available_liquidity.unwrap_or(u64::MAX);
        let realized_interest = interest.min(cash);
        position.balance -= realized_interest;
        if let Some(liquidity) = position.available_liquidity.as_mut() {
            *liquidity -= realized_interest;
        }

        let rewards = self.reward_value(position.reward_tokens);
        position.reward_tokens = 0;

        let harvested = realized_interest.saturating_add(rewards);
        position.total_harvested = position.total_harvested.saturating_add(harvested);
        info!(strategy = %self.config.name, interest = realized_interest, rewards, "harvested");
        Ok(harvested)
    }

    async fn emergency_exit(&self) -> StrategyResult<u64> {
        let mut position = self.position.lock();
        self.accrue(&mut position)?;
        let balance = position.balance;
        let recovered = Self::release(&mut position, balance);
        let rewards = self.reward_value(position.reward_tokens);
        position.reward_tokens = 0;
        warn!(
            strategy = %self.config.name,
            recovered,
            stranded = position.balance,
            "emergency exit"
        );
        Ok(recovered.saturating_add(rewards))
    }
}
