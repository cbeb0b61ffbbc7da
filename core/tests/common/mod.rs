//! Shared fixtures for the integration tests: a configurable mock
//! strategy with externally drivable balances (so tests can simulate
//! yield accruing inside a strategy), a fixed-rate swap router, and a
//! standard vault setup.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tide_core::asset::{AssetConfig, AssetId};
use tide_core::config::PRICE_SCALE;
use tide_core::harvest::{HarvestError, SwapRouter};
use tide_core::oracle::InMemoryOracle;
use tide_core::strategy::{Strategy, StrategyError};
use tide_core::vault::{RedeemMode, VaultConfig, VaultCore};

pub const GOVERNOR: &str = "tide:governor";
pub const ALICE: &str = "tide:alice";
pub const BOB: &str = "tide:bob";

/// One whole receipt token in smallest units (8 decimals).
pub const UNIT: u64 = 100_000_000;
/// One whole USDC in native units (6 decimals).
pub const USDC_UNIT: u64 = 1_000_000;

pub fn usdc() -> AssetConfig {
    AssetConfig::new("USDC", 6, "tide:issuer")
}

pub fn dai() -> AssetConfig {
    AssetConfig::new("DAI", 18, "tide:issuer")
}

// ---------------------------------------------------------------------------
// MockStrategy
// ---------------------------------------------------------------------------

/// Handle to a mock strategy's custody book, shared with the test so that
/// yield can be simulated after the adapter has been boxed into the vault.
#[derive(Clone, Default)]
pub struct StrategyProbe {
    balances: Arc<Mutex<HashMap<AssetId, u64>>>,
    rewards: Arc<Mutex<Vec<(AssetId, u64)>>>,
}

impl StrategyProbe {
    /// Current custody balance of an asset.
    pub fn balance(&self, asset: &AssetId) -> u64 {
        self.balances.lock().unwrap().get(asset).copied().unwrap_or(0)
    }

    /// Simulates yield accruing inside the strategy.
    pub fn accrue(&self, asset: &AssetId, amount: u64) {
        *self.balances.lock().unwrap().entry(*asset).or_insert(0) += amount;
    }

    /// Simulates a loss inside the strategy (saturating at zero).
    pub fn drain(&self, asset: &AssetId, amount: u64) {
        let mut balances = self.balances.lock().unwrap();
        let held = balances.entry(*asset).or_insert(0);
        *held = held.saturating_sub(amount);
    }

    /// Queues reward tokens for the next `collect_rewards` call.
    pub fn add_rewards(&self, asset: AssetId, amount: u64) {
        self.rewards.lock().unwrap().push((asset, amount));
    }
}

/// In-memory strategy adapter for tests.
pub struct MockStrategy {
    probe: StrategyProbe,
    /// Cap on any single withdrawal, to simulate illiquid positions.
    withdraw_limit: Option<u64>,
    /// Assets this strategy accepts; `None` accepts everything.
    supported: Option<Vec<AssetId>>,
}

impl MockStrategy {
    pub fn new() -> (Self, StrategyProbe) {
        let probe = StrategyProbe::default();
        (
            Self {
                probe: probe.clone(),
                withdraw_limit: None,
                supported: None,
            },
            probe,
        )
    }

    pub fn with_withdraw_limit(limit: u64) -> (Self, StrategyProbe) {
        let (mut strategy, probe) = Self::new();
        strategy.withdraw_limit = Some(limit);
        (strategy, probe)
    }

    pub fn supporting_only(assets: Vec<AssetId>) -> (Self, StrategyProbe) {
        let (mut strategy, probe) = Self::new();
        strategy.supported = Some(assets);
        (strategy, probe)
    }
}

impl Strategy for MockStrategy {
    fn deposit(&mut self, asset: &AssetId, amount: u64) -> Result<(), StrategyError> {
        if !self.supports_asset(asset) {
            return Err(StrategyError::AdapterFailure(format!(
                "unsupported asset {asset}"
            )));
        }
        self.probe.accrue(asset, amount);
        Ok(())
    }

    fn withdraw(
        &mut self,
        _recipient: &String,
        asset: &AssetId,
        amount: u64,
    ) -> Result<u64, StrategyError> {
        let mut balances = self.probe.balances.lock().unwrap();
        let held = balances.entry(*asset).or_insert(0);
        let mut taken = amount.min(*held);
        if let Some(limit) = self.withdraw_limit {
            taken = taken.min(limit);
        }
        *held -= taken;
        Ok(taken)
    }

    fn withdraw_all(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
        let mut balances = self.probe.balances.lock().unwrap();
        Ok(balances.drain().filter(|(_, v)| *v > 0).collect())
    }

    fn check_balance(&self, asset: &AssetId) -> u64 {
        self.probe.balance(asset)
    }

    fn supports_asset(&self, asset: &AssetId) -> bool {
        match &self.supported {
            Some(list) => list.contains(asset),
            None => true,
        }
    }

    fn collect_rewards(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
        Ok(std::mem::take(&mut *self.probe.rewards.lock().unwrap()))
    }
}

// ---------------------------------------------------------------------------
// FixedRateRouter
// ---------------------------------------------------------------------------

/// Swap router with a fixed price (1e8 scale) for every pair.
pub struct FixedRateRouter {
    pub rate: u64,
}

impl SwapRouter for FixedRateRouter {
    fn swap(
        &mut self,
        _token_in: &AssetId,
        _token_out: &AssetId,
        amount_in: u64,
        min_out: u64,
    ) -> Result<u64, HarvestError> {
        let out = ((amount_in as u128 * self.rate as u128) / PRICE_SCALE as u128) as u64;
        if out < min_out {
            return Err(HarvestError::SwapFailed(format!(
                "fixed-rate router: {out} < {min_out}"
            )));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Vault setup
// ---------------------------------------------------------------------------

/// A vault over USDC at peg price, with no claim delay so that claim
/// tests run without sleeping. Delay behavior gets its own tests.
pub fn setup_vault() -> (VaultCore, AssetId) {
    let asset = usdc();
    let asset_id = asset.id;

    let mut oracle = InMemoryOracle::new();
    oracle.set_price(asset_id, PRICE_SCALE);

    let config = VaultConfig {
        governor: GOVERNOR.to_string(),
        base_asset: asset_id,
        buffer_bps: 1_000,
        rebase_drift_bps: 1_000,
        claim_delay: Duration::ZERO,
        redeem_mode: RedeemMode::ProRata,
    };

    let mut vault = VaultCore::new(config, Box::new(oracle));
    vault.support_asset(GOVERNOR, asset).unwrap();
    (vault, asset_id)
}

/// Same vault, but with a price other than peg for the collateral.
pub fn setup_vault_with_price(price: u64) -> (VaultCore, AssetId) {
    let asset = usdc();
    let asset_id = asset.id;

    let mut oracle = InMemoryOracle::new();
    oracle.set_price(asset_id, price);

    let config = VaultConfig {
        governor: GOVERNOR.to_string(),
        base_asset: asset_id,
        buffer_bps: 1_000,
        rebase_drift_bps: 1_000,
        claim_delay: Duration::ZERO,
        redeem_mode: RedeemMode::ProRata,
    };

    let mut vault = VaultCore::new(config, Box::new(oracle));
    vault.support_asset(GOVERNOR, asset).unwrap();
    (vault, asset_id)
}

/// Registers a mock strategy and makes it the asset's default.
pub fn attach_default_strategy(vault: &mut VaultCore, asset: &AssetId) -> (tide_core::StrategyId, StrategyProbe) {
    let (strategy, probe) = MockStrategy::new();
    let id = vault
        .register_strategy(GOVERNOR, Box::new(strategy), 100)
        .unwrap();
    vault.set_default_strategy(GOVERNOR, asset, Some(id)).unwrap();
    (id, probe)
}
