//! # Harvester -- Reward Collection & Conversion
//!
//! Strategies earn reward tokens that are not vault collateral (governance
//! tokens, incentive emissions). The harvester pulls those rewards out,
//! swaps them into the vault's base asset through a [`SwapRouter`], and
//! lands the proceeds back in vault cash -- where the next rebase turns
//! them into yield for every holder, and the withdrawal queue passively
//! soaks up whatever it is owed first.
//!
//! The router is an external collaborator behind a one-method interface.
//! The core neither knows nor cares whether it is an AMM aggregator or an
//! OTC desk; it only requires that `swap` honors `min_out` or fails.

use thiserror::Error;

use crate::asset::AssetId;
use crate::config::{BPS_SCALE, PRICE_SCALE};
use crate::math::mul_div_floor;
use crate::strategy::StrategyId;
use crate::vault::{VaultCore, VaultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during harvest operations.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The router could not complete a swap (illiquid pair, min-out miss).
    #[error("swap failed: {0}")]
    SwapFailed(String),

    /// A vault operation inside the harvest failed.
    #[error("vault error during harvest: {0}")]
    Vault(#[from] VaultError),
}

// ---------------------------------------------------------------------------
// SwapRouter
// ---------------------------------------------------------------------------

/// The capability the harvester requires from a swap venue.
pub trait SwapRouter {
    /// Swaps `amount_in` of `token_in` for at least `min_out` of
    /// `token_out`, returning the amount actually received.
    fn swap(
        &mut self,
        token_in: &AssetId,
        token_out: &AssetId,
        amount_in: u64,
        min_out: u64,
    ) -> Result<u64, HarvestError>;
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Drives the collect → swap → land cycle for one vault.
pub struct Harvester {
    router: Box<dyn SwapRouter>,
    /// Haircut applied to the naive 1:1 estimate when computing `min_out`
    /// for reward swaps, in bps. Rewards are volatile tokens; some
    /// slippage is the cost of doing business, unbounded slippage is not.
    slippage_bps: u64,
}

impl Harvester {
    /// Creates a harvester over a swap router with the given slippage
    /// tolerance in bps.
    pub fn new(router: Box<dyn SwapRouter>, slippage_bps: u64) -> Self {
        Self {
            router,
            slippage_bps: slippage_bps.min(BPS_SCALE),
        }
    }

    /// Harvests one strategy: collects its rewards, swaps each reward
    /// asset into the vault's base asset, and deposits the proceeds.
    ///
    /// Returns the total base-asset amount landed (native units). Rewards
    /// already denominated in the base asset skip the swap.
    pub fn harvest(
        &mut self,
        vault: &mut VaultCore,
        strategy: &StrategyId,
    ) -> Result<u64, HarvestError> {
        let base_asset = vault.config().base_asset;
        let rewards = vault.collect_strategy_rewards(strategy)?;

        let mut proceeds: u64 = 0;
        for (reward_asset, amount) in rewards {
            if amount == 0 {
                continue;
            }
            let received = if reward_asset == base_asset {
                amount
            } else {
                let min_out = mul_div_floor(
                    amount as u128,
                    (BPS_SCALE - self.slippage_bps) as u128,
                    BPS_SCALE as u128,
                )
                .expect("slippage haircut is bounded") as u64;
                self.router
                    .swap(&reward_asset, &base_asset, amount, min_out)?
            };
            proceeds = proceeds
                .checked_add(received)
                .ok_or(VaultError::AmountOverflow)?;
        }

        if proceeds > 0 {
            vault.deposit_yield(&base_asset, proceeds)?;
            vault.metrics().harvests_total.inc();
        }
        tracing::info!(strategy = %strategy, proceeds, "harvest complete");
        Ok(proceeds)
    }

    /// The configured slippage tolerance.
    pub fn slippage_bps(&self) -> u64 {
        self.slippage_bps
    }
}

/// Converts a reward amount to a conservative base-asset estimate at a
/// given reward price (1e8 fixed point). Helper for router implementations
/// that quote in prices rather than amounts.
pub fn estimate_proceeds(amount_in: u64, reward_price: u64) -> u64 {
    mul_div_floor(amount_in as u128, reward_price as u128, PRICE_SCALE as u128)
        .map(|v| u64::try_from(v).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
