//! # Allocation Engine
//!
//! Routes collateral between vault cash and yield strategies, and computes
//! the authoritative backing value the ledger trusts for rebasing.
//!
//! ## Capital State Machine
//!
//! For any one asset, capital is either *unallocated* (vault cash) or
//! *allocated* (strategy custody). The only transitions are `allocate`
//! (cash → strategy), `redeem`/`withdraw_all_from` (strategy → cash →
//! out), and `reallocate` (strategy → strategy). No other code path moves
//! asset custody, and strategies never reach into vault cash themselves.
//!
//! ## Pricing
//!
//! Mint and redeem read the oracle once per asset and clamp toward the
//! peg, in opposite directions (see [`crate::oracle`]). The clamp
//! direction is load-bearing: it is what makes an off-peg oracle read a
//! missed-profit event for the caller instead of a drain on the vault.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{RedeemMode, VaultCore, VaultError};
use crate::asset::{AssetConfig, AssetId};
use crate::config::{BPS_SCALE, PRICE_SCALE};
use crate::ledger::LedgerError;
use crate::ledger::RebaseOutcome;
use crate::math::{from_token_units, mul_div_ceil, mul_div_floor, to_token_units};
use crate::oracle::{clamp_for_mint, clamp_for_redeem};
use crate::strategy::{StrategyError, StrategyId};

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Receipt returned by a successful redemption, with the full payout
/// basket. The caller uses it to settle the actual asset transfers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    /// Receipt tokens burned.
    pub token_amount: u64,
    /// Payout legs: `(asset, amount in native units)`.
    pub outputs: Vec<(AssetId, u64)>,
    /// When the redemption executed (UTC).
    pub timestamp: DateTime<Utc>,
}

/// One planned redemption payout leg.
struct RedemptionLeg {
    asset: AssetId,
    decimals: u8,
    native_out: u64,
}

impl VaultCore {
    // -----------------------------------------------------------------------
    // Mint
    // -----------------------------------------------------------------------

    /// Deposits `amount` native units of `asset` and mints receipt tokens
    /// to `caller` at the mint-clamped oracle price.
    ///
    /// If the asset's liquid cash afterwards exceeds the configured buffer
    /// share of its book, the surplus is pushed to the asset's default
    /// strategy in the same operation.
    ///
    /// # Errors
    ///
    /// [`VaultError::SlippageExceeded`] when the minted amount is below
    /// `min_out`; [`VaultError::CapitalPaused`] while paused; asset and
    /// oracle errors as they occur. A failed mint changes nothing.
    pub fn mint(
        &mut self,
        caller: &str,
        asset: &AssetId,
        amount: u64,
        min_out: u64,
    ) -> Result<u64, VaultError> {
        self.enter()?;
        let result = self.mint_inner(caller, asset, amount, min_out);
        self.exit();
        result
    }

    fn mint_inner(
        &mut self,
        caller: &str,
        asset: &AssetId,
        amount: u64,
        min_out: u64,
    ) -> Result<u64, VaultError> {
        self.ensure_not_paused()?;
        if amount == 0 {
            return Err(LedgerError::AmountMustBePositive.into());
        }
        let cfg = self.assets.get(asset)?.clone();
        if !cfg.mint_allowed {
            return Err(crate::asset::AssetError::MintDisabled(*asset).into());
        }

        let price = clamp_for_mint(self.oracle.price(asset)?);
        let value_units =
            to_token_units(amount, cfg.decimals).ok_or(VaultError::AmountOverflow)?;
        let tokens_out = mul_div_floor(value_units as u128, price as u128, PRICE_SCALE as u128)
            .ok_or(VaultError::AmountOverflow)?;
        let tokens_out =
            u64::try_from(tokens_out).expect("peg clamp bounds mint output to the deposit value");
        if tokens_out < min_out {
            return Err(VaultError::SlippageExceeded {
                minimum: min_out,
                actual: tokens_out,
            });
        }

        self.ledger.mint(caller, tokens_out)?;
        self.cash.credit(&cfg.id, amount);
        // The deposit is booked at this point; a misbehaving strategy must
        // not unwind it. Surplus that fails to allocate stays as cash and
        // the next allocate() retries.
        if let Err(error) = self.rebalance_asset(&cfg) {
            tracing::warn!(asset = %cfg.symbol, %error, "auto-allocation failed; surplus kept liquid");
        }
        self.refill_queue();

        self.metrics.mints_total.inc();
        self.metrics.total_supply.set(self.ledger.total_supply() as i64);
        tracing::info!(caller, asset = %cfg.symbol, amount, tokens_out, "mint");
        Ok(tokens_out)
    }

    // -----------------------------------------------------------------------
    // Redeem
    // -----------------------------------------------------------------------

    /// Burns `token_amount` from `caller` and pays out collateral at
    /// redeem-clamped prices, pulling from strategies when vault cash
    /// falls short.
    ///
    /// `min_asset_out` is the minimum acceptable payout, measured as the
    /// basket's total quantity normalized to token units.
    ///
    /// # Errors
    ///
    /// [`VaultError::LiquidityError`] when neither cash nor the default
    /// strategy can source a leg -- route through the withdrawal queue
    /// instead. A failed redemption burns nothing (strategy pulls that
    /// already happened are value-neutral: the funds simply sit in vault
    /// cash instead of the strategy).
    pub fn redeem(
        &mut self,
        caller: &str,
        token_amount: u64,
        min_asset_out: u64,
    ) -> Result<Redemption, VaultError> {
        self.enter()?;
        let result = self.redeem_inner(caller, token_amount, min_asset_out);
        self.exit();
        result
    }

    fn redeem_inner(
        &mut self,
        caller: &str,
        token_amount: u64,
        min_asset_out: u64,
    ) -> Result<Redemption, VaultError> {
        if token_amount == 0 {
            return Err(LedgerError::AmountMustBePositive.into());
        }
        let available = self.ledger.balance_of(caller);
        if token_amount > available {
            return Err(LedgerError::InsufficientBalance {
                account: caller.to_string(),
                available,
                requested: token_amount,
            }
            .into());
        }

        let legs = self.plan_redemption(token_amount)?;

        let delivered: u64 = legs
            .iter()
            .map(|leg| to_token_units(leg.native_out, leg.decimals).unwrap_or(0))
            .sum();
        if delivered < min_asset_out {
            return Err(VaultError::SlippageExceeded {
                minimum: min_asset_out,
                actual: delivered,
            });
        }

        // Source liquidity for every leg before burning anything.
        for leg in &legs {
            self.source_liquidity(leg)?;
        }

        self.ledger.burn(caller, token_amount)?;
        let mut outputs = Vec::with_capacity(legs.len());
        for leg in &legs {
            self.cash
                .debit(&leg.asset, leg.native_out)
                .expect("liquidity sourced above");
            outputs.push((leg.asset, leg.native_out));
        }

        self.metrics.redeems_total.inc();
        self.metrics.total_supply.set(self.ledger.total_supply() as i64);
        tracing::info!(caller, token_amount, legs = outputs.len(), "redeem");

        Ok(Redemption {
            token_amount,
            outputs,
            timestamp: Utc::now(),
        })
    }

    /// Read-only redemption estimate: the basket `token_amount` would pay
    /// out right now, with no balance requirement and no state change.
    pub fn preview_redeem(&self, token_amount: u64) -> Result<Vec<(AssetId, u64)>, VaultError> {
        let legs = self.plan_redemption(token_amount)?;
        Ok(legs.into_iter().map(|l| (l.asset, l.native_out)).collect())
    }

    /// Computes the payout basket for a redemption at current prices and
    /// holdings.
    fn plan_redemption(&self, token_amount: u64) -> Result<Vec<RedemptionLeg>, VaultError> {
        let shares: Vec<(AssetConfig, u64)> = match self.config.redeem_mode {
            RedeemMode::SingleAsset(asset) => {
                vec![(self.assets.get(&asset)?.clone(), token_amount)]
            }
            RedeemMode::ProRata => {
                let mut holdings = Vec::new();
                let mut total_units: u64 = 0;
                for id in self.assets.ids() {
                    let cfg = self.assets.get(&id)?.clone();
                    let units = self.holding_in_token_units(&cfg)?;
                    if units > 0 {
                        total_units = units
                            .checked_add(total_units)
                            .ok_or(VaultError::AmountOverflow)?;
                        holdings.push((cfg, units));
                    }
                }
                if total_units == 0 {
                    return Err(VaultError::LiquidityError {
                        asset: self.config.base_asset,
                        needed: token_amount,
                        available: 0,
                    });
                }
                holdings
                    .into_iter()
                    .map(|(cfg, units)| {
                        let share = mul_div_floor(
                            token_amount as u128,
                            units as u128,
                            total_units as u128,
                        )
                        .expect("share arithmetic bounded by token_amount");
                        (cfg, share as u64)
                    })
                    .filter(|(_, share)| *share > 0)
                    .collect()
            }
        };

        let mut legs = Vec::with_capacity(shares.len());
        for (cfg, value_share) in shares {
            let price = clamp_for_redeem(self.oracle.price(&cfg.id)?);
            let quantity_tokens =
                mul_div_floor(value_share as u128, PRICE_SCALE as u128, price as u128)
                    .expect("redeem clamp bounds quantity to the value share");
            let native_out = from_token_units(quantity_tokens as u64, cfg.decimals)
                .ok_or(VaultError::AmountOverflow)?;
            legs.push(RedemptionLeg {
                asset: cfg.id,
                decimals: cfg.decimals,
                native_out,
            });
        }
        Ok(legs)
    }

    /// Ensures unreserved vault cash covers a payout leg, pulling the
    /// shortfall from the asset's default strategy if there is one.
    fn source_liquidity(&mut self, leg: &RedemptionLeg) -> Result<(), VaultError> {
        let reserved = self.reserved_native(&leg.asset, leg.decimals)?;
        let liquid = self.cash.balance(&leg.asset).saturating_sub(reserved);
        if liquid >= leg.native_out {
            return Ok(());
        }
        let shortfall = leg.native_out - liquid;

        let default_strategy = self.assets.get(&leg.asset)?.default_strategy;
        if let Some(id) = default_strategy.filter(|id| self.strategies.is_approved(id)) {
            let pulled = self.strategies.adapter_mut(&id)?.withdraw(
                &super::VAULT_ADDRESS.to_string(),
                &leg.asset,
                shortfall,
            )?;
            self.cash.credit(&leg.asset, pulled);
            tracing::debug!(asset = %leg.asset, pulled, "strategy withdrawal for redemption");
        }

        let liquid = self.cash.balance(&leg.asset).saturating_sub(reserved);
        if liquid < leg.native_out {
            return Err(VaultError::LiquidityError {
                asset: leg.asset,
                needed: leg.native_out,
                available: liquid,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Total Value
    // -----------------------------------------------------------------------

    /// Sums the vault's raw held balances plus every approved strategy's
    /// balances, converted to token units.
    ///
    /// This is the single number the ledger trusts for rebasing, and the
    /// most safety-critical read in the system: a wrong answer moves every
    /// balance in the book.
    pub fn check_total_value(&self) -> Result<u64, VaultError> {
        let mut total: u64 = 0;
        for id in self.assets.ids() {
            let cfg = self.assets.get(&id)?;
            let units = self.holding_in_token_units(cfg)?;
            total = total.checked_add(units).ok_or(VaultError::AmountOverflow)?;
        }
        Ok(total)
    }

    /// One asset's total holding (cash + approved strategies) in token
    /// units.
    fn holding_in_token_units(&self, cfg: &AssetConfig) -> Result<u64, VaultError> {
        let native = self
            .cash
            .balance(&cfg.id)
            .checked_add(self.strategies.total_balance(&cfg.id))
            .ok_or(VaultError::AmountOverflow)?;
        to_token_units(native, cfg.decimals).ok_or(VaultError::AmountOverflow)
    }

    /// A strategy's holding of one asset, native units (read-only).
    pub fn strategy_balance(&self, id: &StrategyId, asset: &AssetId) -> Result<u64, VaultError> {
        Ok(self.strategies.adapter(id)?.check_balance(asset))
    }

    // -----------------------------------------------------------------------
    // Allocate / Reallocate
    // -----------------------------------------------------------------------

    /// Sweeps every asset's above-buffer cash into its default strategy.
    ///
    /// Idempotent: calling it when nothing needs moving performs no
    /// strategy calls and returns zero. Callable by anyone -- allocation
    /// only ever moves capital along the configured route.
    pub fn allocate(&mut self) -> Result<u64, VaultError> {
        self.enter()?;
        let result = self.allocate_inner();
        self.exit();
        result
    }

    fn allocate_inner(&mut self) -> Result<u64, VaultError> {
        self.ensure_not_paused()?;
        let mut moved: u64 = 0;
        for id in self.assets.ids() {
            let cfg = self.assets.get(&id)?.clone();
            moved += self.rebalance_asset(&cfg)?;
        }
        if moved > 0 {
            tracing::info!(moved, "allocation sweep");
        }
        Ok(moved)
    }

    /// Pushes one asset's surplus (liquid cash above the buffer share of
    /// its book) into its default strategy. No-op when there is no default
    /// strategy, it isn't approved, or nothing is above the buffer.
    pub(crate) fn rebalance_asset(&mut self, cfg: &AssetConfig) -> Result<u64, VaultError> {
        let Some(strategy_id) = cfg.default_strategy else {
            return Ok(0);
        };
        if !self.strategies.is_approved(&strategy_id) {
            return Ok(0);
        }

        let cash = self.cash.balance(&cfg.id);
        let reserved = self.reserved_native(&cfg.id, cfg.decimals)?;
        let liquid = cash.saturating_sub(reserved);
        let book = cash
            .checked_add(self.strategies.total_balance(&cfg.id))
            .ok_or(VaultError::AmountOverflow)?;
        let buffer = mul_div_ceil(book as u128, self.config.buffer_bps as u128, BPS_SCALE as u128)
            .ok_or(VaultError::AmountOverflow)? as u64;
        if liquid <= buffer {
            return Ok(0);
        }
        let surplus = liquid - buffer;

        let adapter = self.strategies.adapter_mut(&strategy_id)?;
        if !adapter.supports_asset(&cfg.id) {
            tracing::warn!(asset = %cfg.symbol, strategy = %strategy_id, "default strategy does not support asset; skipping allocation");
            return Ok(0);
        }
        adapter.deposit(&cfg.id, surplus)?;
        self.cash
            .debit(&cfg.id, surplus)
            .expect("surplus is bounded by liquid cash");

        tracing::debug!(asset = %cfg.symbol, surplus, strategy = %strategy_id, "surplus allocated");
        Ok(surplus)
    }

    /// Moves capital between two registered strategies. Pure reallocation:
    /// total value is unchanged beyond rounding dust.
    ///
    /// # Errors
    ///
    /// [`StrategyError::InvalidStrategy`] when either endpoint is not a
    /// registered, approved strategy; [`StrategyError::UnsupportedAsset`]
    /// when the destination cannot hold one of the assets;
    /// [`VaultError::MismatchedArrayLengths`] on malformed input. All
    /// validation happens before any capital moves.
    pub fn reallocate(
        &mut self,
        caller: &str,
        from: &StrategyId,
        to: &StrategyId,
        assets: &[AssetId],
        amounts: &[u64],
    ) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.enter()?;
        let result = self.reallocate_inner(from, to, assets, amounts);
        self.exit();
        result
    }

    fn reallocate_inner(
        &mut self,
        from: &StrategyId,
        to: &StrategyId,
        assets: &[AssetId],
        amounts: &[u64],
    ) -> Result<(), VaultError> {
        if assets.len() != amounts.len() {
            return Err(VaultError::MismatchedArrayLengths {
                assets: assets.len(),
                amounts: amounts.len(),
            });
        }
        if !self.strategies.is_approved(from) {
            return Err(StrategyError::InvalidStrategy(*from).into());
        }
        if !self.strategies.is_approved(to) {
            return Err(StrategyError::InvalidStrategy(*to).into());
        }
        let destination = self.strategies.adapter(to)?;
        for asset in assets {
            if !destination.supports_asset(asset) {
                return Err(StrategyError::UnsupportedAsset {
                    strategy: *to,
                    asset: *asset,
                }
                .into());
            }
        }

        for (asset, amount) in assets.iter().zip(amounts) {
            let pulled = self.strategies.adapter_mut(from)?.withdraw(
                &super::VAULT_ADDRESS.to_string(),
                asset,
                *amount,
            )?;
            self.strategies.adapter_mut(to)?.deposit(asset, pulled)?;
            tracing::info!(%asset, amount = pulled, %from, %to, "capital reallocated");
        }
        Ok(())
    }

    /// Recalls everything a strategy holds back into vault cash.
    pub fn withdraw_all_from(
        &mut self,
        caller: &str,
        strategy: &StrategyId,
    ) -> Result<Vec<(AssetId, u64)>, VaultError> {
        self.ensure_governor(caller)?;
        self.enter()?;
        let result = self.withdraw_all_inner(strategy);
        self.exit();
        result
    }

    fn withdraw_all_inner(
        &mut self,
        strategy: &StrategyId,
    ) -> Result<Vec<(AssetId, u64)>, VaultError> {
        let returned = self.strategies.adapter_mut(strategy)?.withdraw_all()?;
        for (asset, amount) in &returned {
            self.cash.credit(asset, *amount);
        }
        self.refill_queue();
        tracing::info!(strategy = %strategy, legs = returned.len(), "strategy liquidated to vault");
        Ok(returned)
    }

    // -----------------------------------------------------------------------
    // Rebase
    // -----------------------------------------------------------------------

    /// Measures backing value and adjusts the exchange rate so supply
    /// matches it.
    ///
    /// Unclaimed withdrawal tickets were already burned out of supply but
    /// their backing still sits in the vault, so the queue's outstanding
    /// total is excluded from the value before comparing against supply --
    /// otherwise every queued exit would masquerade as yield.
    ///
    /// A failed rebase ([`LedgerError::UnsafeRebase`]) leaves the
    /// last-good rate in place and is never retried automatically.
    pub fn rebase(&mut self) -> Result<RebaseOutcome, VaultError> {
        self.enter()?;
        let result = self.rebase_inner();
        self.exit();
        result
    }

    fn rebase_inner(&mut self) -> Result<RebaseOutcome, VaultError> {
        let gross = self.check_total_value()?;
        let net = gross.saturating_sub(self.queue.outstanding());
        let outcome = self.ledger.rebase(net, self.config.rebase_drift_bps)?;

        self.metrics.total_value.set(net as i64);
        self.metrics.total_supply.set(outcome.supply_after as i64);
        if outcome.applied {
            self.metrics.rebases_total.inc();
            self.metrics
                .rebase_yield_units
                .observe((outcome.supply_after - outcome.supply_before) as f64);
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Yield Landing
    // -----------------------------------------------------------------------

    /// Pulls accrued reward tokens out of a strategy. The rewards are
    /// returned to the caller (the harvester), not booked as collateral --
    /// swap proceeds come back via [`deposit_yield`](Self::deposit_yield).
    pub fn collect_strategy_rewards(
        &mut self,
        strategy: &StrategyId,
    ) -> Result<Vec<(AssetId, u64)>, VaultError> {
        self.enter()?;
        let result = self
            .strategies
            .adapter_mut(strategy)
            .and_then(|a| a.collect_rewards())
            .map_err(VaultError::from);
        self.exit();
        result
    }

    /// Lands harvested (or donated) collateral in vault cash and lets the
    /// withdrawal queue soak up what it is owed.
    pub fn deposit_yield(&mut self, asset: &AssetId, amount: u64) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(LedgerError::AmountMustBePositive.into());
        }
        self.assets.get(asset)?;
        self.cash.credit(asset, amount);
        self.refill_queue();
        tracing::info!(%asset, amount, "yield landed in vault");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal Helpers
    // -----------------------------------------------------------------------

    /// Queue-reserved cash for an asset, in native units (zero for
    /// everything but the base asset). Rounded up so the reservation
    /// always covers the committed token amount.
    fn reserved_native(&self, asset: &AssetId, decimals: u8) -> Result<u64, VaultError> {
        if *asset != self.config.base_asset {
            return Ok(0);
        }
        let reserved_tokens = self.queue.reserved();
        if reserved_tokens == 0 {
            return Ok(0);
        }
        let mut native =
            from_token_units(reserved_tokens, decimals).ok_or(VaultError::AmountOverflow)?;
        let roundtrip = to_token_units(native, decimals).ok_or(VaultError::AmountOverflow)?;
        if roundtrip < reserved_tokens {
            native += 1;
        }
        Ok(native)
    }
}
