//! # Vault Core -- Allocation Engine & Withdrawal Queue
//!
//! The vault is where the money lives in TIDE. Collateral comes in through
//! `mint`, gets routed between vault cash and yield strategies, backs an
//! elastic receipt-token supply, and leaves through `redeem` or the
//! asynchronous withdrawal queue. If the ledger is the book of claims, the
//! vault is the book of assets -- and the one component that may never let
//! the two diverge.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs        -- VaultCore context object, config, cash book, write-lock handle
//! allocation.rs -- mint/redeem/allocate/reallocate/rebase/total-value
//! queue.rs      -- asynchronous withdrawal queue (request/claim lifecycle)
//! ```
//!
//! ## Execution Model
//!
//! Every public entry point executes atomically to completion. There is no
//! ambient global state: a [`VaultCore`] is a plain owned value, and tests
//! run as many independent vaults in one process as they like. Under real
//! concurrency, wrap the core in a [`VaultHandle`] -- one write lock over
//! the whole context object, because nearly every operation reads and
//! writes the global exchange rate or the queue totals.
//!
//! External strategy and oracle calls are the only points where control
//! leaves the core. Any entry point that calls out and then mutates ledger
//! state runs inside the reentrancy guard: a re-entering adapter gets
//! [`VaultError::ReentrantCall`], not a view of half-applied state.

pub mod allocation;
pub mod queue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::{asset_id_map, AssetError, AssetId, AssetRegistry};
use crate::config::{DEFAULT_BUFFER_BPS, DEFAULT_CLAIM_DELAY, DEFAULT_REBASE_DRIFT_BPS};
use crate::ledger::{Address, LedgerError, RebasingLedger};
use crate::metrics::VaultMetrics;
use crate::oracle::{OracleError, PriceOracle};
use crate::strategy::{Strategy, StrategyError, StrategyId, StrategyMeta, StrategyRegistry};

pub use allocation::Redemption;
pub use queue::{QueueError, QueueTotals, WithdrawalQueue, WithdrawalReceipt, WithdrawalRequest};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by vault entry points.
///
/// Three families, with different retry semantics:
/// - validation and authorization errors are final for the call;
/// - liquidity errors are state-dependent and may legitimately succeed on
///   a later attempt (after `add_withdrawal_queue_liquidity`, a harvest,
///   or fresh mints) -- the vault itself never retries;
/// - invariant violations do not appear here at all: they panic.
#[derive(Debug, Error)]
pub enum VaultError {
    /// A ledger operation failed (insufficient balance, unsafe rebase...).
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An asset registry operation failed.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// A strategy registry or adapter operation failed.
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// The price oracle refused the read.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// A withdrawal queue operation failed.
    #[error("withdrawal queue error: {0}")]
    Queue(#[from] QueueError),

    /// The mint or redemption produced less than the caller's minimum.
    #[error("slippage exceeded: minimum {minimum}, actual {actual}")]
    SlippageExceeded {
        /// The caller-supplied minimum output.
        minimum: u64,
        /// What the operation would actually have produced.
        actual: u64,
    },

    /// Neither vault cash nor strategy withdrawals can cover the amount.
    ///
    /// Transient: the caller should route through the withdrawal queue
    /// (or retry after liquidity returns).
    #[error("insufficient liquidity for asset {asset}: needed {needed}, available {available}")]
    LiquidityError {
        /// The asset that could not be sourced.
        asset: AssetId,
        /// Native units required.
        needed: u64,
        /// Native units actually available.
        available: u64,
    },

    /// Capital movements are paused by governance.
    #[error("capital movements are paused")]
    CapitalPaused,

    /// The caller is not authorized for this operation.
    #[error("caller {caller} is not authorized")]
    CallerNotAuthorized {
        /// The rejected caller.
        caller: Address,
    },

    /// Parallel arrays of different lengths were passed.
    #[error("mismatched array lengths: {assets} assets, {amounts} amounts")]
    MismatchedArrayLengths {
        /// Length of the asset array.
        assets: usize,
        /// Length of the amount array.
        amounts: usize,
    },

    /// A unit conversion overflowed the supply range.
    #[error("amount overflows the representable supply range")]
    AmountOverflow,

    /// An external adapter re-entered the vault mid-operation.
    #[error("reentrant call into the vault core")]
    ReentrantCall,
}

// ---------------------------------------------------------------------------
// VaultConfig
// ---------------------------------------------------------------------------

/// How redemptions are paid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RedeemMode {
    /// A pro-rata basket of every supported asset, weighted by the vault's
    /// current holdings.
    ProRata,
    /// Everything in one configured asset.
    SingleAsset(AssetId),
}

/// Runtime-tunable vault parameters.
///
/// The corresponding hard bounds live in [`crate::config`]; setters on the
/// vault refuse values past them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Address allowed to perform governance operations.
    pub governor: Address,

    /// The asset the withdrawal queue pays out in. Must be registered
    /// before the first queue operation.
    pub base_asset: AssetId,

    /// Fraction of each asset's book kept liquid in the vault, in bps.
    pub buffer_bps: u64,

    /// Rebase (and request-withdrawal) drift band, in bps.
    pub rebase_drift_bps: u64,

    /// Minimum age of a withdrawal request before it can be claimed.
    pub claim_delay: Duration,

    /// Redemption payout mode.
    pub redeem_mode: RedeemMode,
}

impl VaultConfig {
    /// Creates a config with library defaults for everything tunable.
    pub fn new(governor: &str, base_asset: AssetId) -> Self {
        Self {
            governor: governor.to_string(),
            base_asset,
            buffer_bps: DEFAULT_BUFFER_BPS,
            rebase_drift_bps: DEFAULT_REBASE_DRIFT_BPS,
            claim_delay: DEFAULT_CLAIM_DELAY,
            redeem_mode: RedeemMode::ProRata,
        }
    }
}

// ---------------------------------------------------------------------------
// CashBook
// ---------------------------------------------------------------------------

/// The vault's raw held balances, per asset, in native smallest units.
///
/// Mutated only by the allocation engine and the withdrawal queue.
/// Strategies never touch vault cash -- capital reaches them exclusively
/// through their own deposit/withdraw interface.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CashBook {
    /// Held amounts indexed by asset.
    #[serde(with = "asset_id_map")]
    balances: HashMap<AssetId, u64>,
}

impl CashBook {
    /// Creates an empty cash book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holding of an asset (zero when never held).
    pub fn balance(&self, asset: &AssetId) -> u64 {
        self.balances.get(asset).copied().unwrap_or(0)
    }

    /// Adds funds to an asset's holding.
    pub fn credit(&mut self, asset: &AssetId, amount: u64) -> u64 {
        let entry = self.balances.entry(*asset).or_insert(0);
        *entry = entry
            .checked_add(amount)
            .expect("cash book overflow; supply checks should have caught this first");
        *entry
    }

    /// Removes funds from an asset's holding. Returns the remaining
    /// balance, or `None` when the holding cannot cover the debit (the
    /// book is unchanged in that case).
    pub fn debit(&mut self, asset: &AssetId, amount: u64) -> Option<u64> {
        let entry = self.balances.get_mut(asset)?;
        if *entry < amount {
            return None;
        }
        *entry -= amount;
        Some(*entry)
    }
}

// ---------------------------------------------------------------------------
// VaultCore
// ---------------------------------------------------------------------------

/// The vault's own address, used as the recipient of strategy withdrawals.
pub const VAULT_ADDRESS: &str = "tide:vault";

/// The single-owner context object tying the whole accounting core
/// together: ledger, asset registry, strategy registry, oracle, cash book,
/// and withdrawal queue.
///
/// # Thread Safety
///
/// `VaultCore` is `Send` but deliberately not shared: one writer at a
/// time, via `&mut self`. Use [`VaultHandle`] to serialize concurrent
/// callers behind a single write lock.
pub struct VaultCore {
    /// Runtime-tunable parameters.
    config: VaultConfig,
    /// The elastic-supply claim book.
    ledger: RebasingLedger,
    /// Supported collateral assets.
    assets: AssetRegistry,
    /// Registered yield strategies.
    strategies: StrategyRegistry,
    /// The price source. External, untrusted beyond its bounds contract.
    oracle: Box<dyn PriceOracle>,
    /// Raw held collateral.
    cash: CashBook,
    /// The asynchronous withdrawal queue.
    queue: WithdrawalQueue,
    /// When `true`, mint and allocation paths are halted.
    paused: bool,
    /// Reentrancy guard flag.
    entered: bool,
    /// Prometheus handles for this vault instance.
    metrics: VaultMetrics,
}

impl VaultCore {
    /// Creates a new empty vault.
    ///
    /// The base asset named in `config` (and any other collateral) must be
    /// registered via [`support_asset`](Self::support_asset) before use.
    pub fn new(config: VaultConfig, oracle: Box<dyn PriceOracle>) -> Self {
        Self {
            config,
            ledger: RebasingLedger::new(),
            assets: AssetRegistry::new(),
            strategies: StrategyRegistry::new(),
            oracle,
            cash: CashBook::new(),
            queue: WithdrawalQueue::new(),
            paused: false,
            entered: false,
            metrics: VaultMetrics::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Read Side
    // -----------------------------------------------------------------------

    /// The active configuration.
    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Receipt-token balance of an account.
    pub fn balance_of(&self, account: &str) -> u64 {
        self.ledger.balance_of(account)
    }

    /// Total receipt-token supply.
    pub fn total_supply(&self) -> u64 {
        self.ledger.total_supply()
    }

    /// Direct access to the ledger (read-only).
    pub fn ledger(&self) -> &RebasingLedger {
        &self.ledger
    }

    /// Direct access to the asset registry (read-only).
    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    /// Registry metadata for all strategies.
    pub fn strategy_metas(&self) -> Vec<StrategyMeta> {
        self.strategies.metas()
    }

    /// Raw vault cash held for an asset, native units.
    pub fn cash_balance(&self, asset: &AssetId) -> u64 {
        self.cash.balance(asset)
    }

    /// Whether capital movements are paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Prometheus handles for this vault.
    pub fn metrics(&self) -> &VaultMetrics {
        &self.metrics
    }

    // -----------------------------------------------------------------------
    // Ledger Pass-Throughs
    // -----------------------------------------------------------------------

    /// Transfers receipt tokens between two accounts.
    pub fn transfer(&mut self, from: &str, to: &str, amount: u64) -> Result<(), VaultError> {
        self.ledger.transfer(from, to, amount)?;
        Ok(())
    }

    /// Opts `account` out of rebasing, freezing its balance.
    pub fn rebase_opt_out(&mut self, account: &str) -> Result<(), VaultError> {
        self.ledger.opt_out(account)?;
        Ok(())
    }

    /// Opts `account` back into rebasing.
    pub fn rebase_opt_in(&mut self, account: &str) -> Result<(), VaultError> {
        self.ledger.opt_in(account)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Governance
    // -----------------------------------------------------------------------

    /// Registers a new supported collateral asset.
    pub fn support_asset(
        &mut self,
        caller: &str,
        config: crate::asset::AssetConfig,
    ) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.assets.add(config)?;
        Ok(())
    }

    /// Removes a supported asset. Refused while the vault's net holding
    /// (cash plus strategy balances) of the asset is nonzero.
    pub fn remove_asset(&mut self, caller: &str, asset: &AssetId) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        let holding = self.cash.balance(asset) + self.strategies.total_balance(asset);
        self.assets.remove(asset, holding)?;
        Ok(())
    }

    /// Registers a strategy adapter and returns its id.
    pub fn register_strategy(
        &mut self,
        caller: &str,
        adapter: Box<dyn Strategy>,
        weight: u32,
    ) -> Result<StrategyId, VaultError> {
        self.ensure_governor(caller)?;
        Ok(self.strategies.register(adapter, weight))
    }

    /// Re-attaches a strategy adapter under a known id (snapshot restore).
    pub fn attach_strategy(
        &mut self,
        caller: &str,
        id: StrategyId,
        adapter: Box<dyn Strategy>,
        weight: u32,
    ) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.strategies.register_with_id(id, adapter, weight);
        Ok(())
    }

    /// Sets a strategy's approval flag. Unapproved strategies receive no
    /// new capital and are excluded from total-value sweeps.
    pub fn set_strategy_approved(
        &mut self,
        caller: &str,
        id: &StrategyId,
        approved: bool,
    ) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.strategies.set_approved(id, approved)?;
        Ok(())
    }

    /// Removes a strategy. Refused while it holds any supported asset --
    /// liquidate first via [`withdraw_all_from`](Self::withdraw_all_from).
    pub fn remove_strategy(&mut self, caller: &str, id: &StrategyId) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        let assets = self.assets.ids();
        self.strategies.remove(id, &assets)?;
        // Drop dangling default-strategy references.
        for asset in assets {
            if let Ok(cfg) = self.assets.get_mut(&asset) {
                if cfg.default_strategy == Some(*id) {
                    cfg.default_strategy = None;
                }
            }
        }
        Ok(())
    }

    /// Points an asset's surplus allocation at a registered strategy
    /// (or clears it with `None`).
    pub fn set_default_strategy(
        &mut self,
        caller: &str,
        asset: &AssetId,
        strategy: Option<StrategyId>,
    ) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        if let Some(id) = strategy {
            if !self.strategies.is_approved(&id) {
                return Err(StrategyError::InvalidStrategy(id).into());
            }
            let supports = self.strategies.adapter(&id)?.supports_asset(asset);
            if !supports {
                return Err(StrategyError::UnsupportedAsset {
                    strategy: id,
                    asset: *asset,
                }
                .into());
            }
        }
        self.assets.get_mut(asset)?.default_strategy = strategy;
        Ok(())
    }

    /// Halts mint and allocation paths.
    pub fn pause_capital(&mut self, caller: &str) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.paused = true;
        tracing::warn!("capital movements paused");
        Ok(())
    }

    /// Resumes mint and allocation paths.
    pub fn unpause_capital(&mut self, caller: &str) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.paused = false;
        tracing::info!("capital movements resumed");
        Ok(())
    }

    /// Sets the liquidity buffer fraction, in bps.
    pub fn set_buffer(&mut self, caller: &str, buffer_bps: u64) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.config.buffer_bps = buffer_bps.min(crate::config::BPS_SCALE);
        Ok(())
    }

    /// Sets the rebase drift band, clamped to the hard ceiling.
    pub fn set_drift_band(&mut self, caller: &str, band_bps: u64) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.config.rebase_drift_bps = band_bps.min(crate::config::MAX_REBASE_DRIFT_BPS);
        Ok(())
    }

    /// Sets the withdrawal claim delay, clamped to the hard ceiling.
    pub fn set_claim_delay(&mut self, caller: &str, delay: Duration) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        self.config.claim_delay = delay.min(crate::config::MAX_CLAIM_DELAY);
        Ok(())
    }

    /// Sets the redemption payout mode.
    pub fn set_redeem_mode(&mut self, caller: &str, mode: RedeemMode) -> Result<(), VaultError> {
        self.ensure_governor(caller)?;
        if let RedeemMode::SingleAsset(asset) = mode {
            self.assets.get(&asset)?;
        }
        self.config.redeem_mode = mode;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internal Gates
    // -----------------------------------------------------------------------

    /// Rejects callers other than the configured governor.
    pub(crate) fn ensure_governor(&self, caller: &str) -> Result<(), VaultError> {
        if caller != self.config.governor {
            return Err(VaultError::CallerNotAuthorized {
                caller: caller.to_string(),
            });
        }
        Ok(())
    }

    /// Rejects capital movements while paused.
    pub(crate) fn ensure_not_paused(&self) -> Result<(), VaultError> {
        if self.paused {
            return Err(VaultError::CapitalPaused);
        }
        Ok(())
    }

    /// Enters the reentrancy guard.
    pub(crate) fn enter(&mut self) -> Result<(), VaultError> {
        if self.entered {
            return Err(VaultError::ReentrantCall);
        }
        self.entered = true;
        Ok(())
    }

    /// Leaves the reentrancy guard.
    pub(crate) fn exit(&mut self) {
        self.entered = false;
    }

    // -----------------------------------------------------------------------
    // Snapshot
    // -----------------------------------------------------------------------

    /// Captures all persistable state.
    ///
    /// Strategy adapters are external custody and are not serialized --
    /// only their registry metadata travels. After a restore, the operator
    /// re-attaches adapters by id via [`attach_strategy`](Self::attach_strategy).
    pub fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            config: self.config.clone(),
            ledger: self.ledger.clone(),
            assets: self.assets.clone(),
            strategy_metas: self.strategies.metas(),
            cash: self.cash.clone(),
            queue: self.queue.clone(),
            paused: self.paused,
            taken_at: Utc::now(),
        }
    }

    /// Rebuilds a vault from a snapshot and a fresh oracle.
    pub fn restore(snapshot: VaultSnapshot, oracle: Box<dyn PriceOracle>) -> Self {
        Self {
            config: snapshot.config,
            ledger: snapshot.ledger,
            assets: snapshot.assets,
            strategies: StrategyRegistry::new(),
            oracle,
            cash: snapshot.cash,
            queue: snapshot.queue,
            paused: snapshot.paused,
            entered: false,
            metrics: VaultMetrics::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// VaultSnapshot
// ---------------------------------------------------------------------------

/// The vault's complete persistable state at one instant.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultSnapshot {
    /// Runtime configuration.
    pub config: VaultConfig,
    /// The full claim book.
    pub ledger: RebasingLedger,
    /// Supported assets.
    pub assets: AssetRegistry,
    /// Strategy registry metadata (adapters re-attach at boot).
    pub strategy_metas: Vec<StrategyMeta>,
    /// Raw held collateral.
    pub cash: CashBook,
    /// The withdrawal queue, including the append-only request log.
    pub queue: WithdrawalQueue,
    /// Pause flag.
    pub paused: bool,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// VaultHandle
// ---------------------------------------------------------------------------

/// A shareable, write-lock-serialized handle to a vault.
///
/// Every public entry point both reads and writes the global exchange rate
/// or the queue totals, so there is exactly one lock and it covers the
/// whole context object. Readers that only need estimates take the read
/// side.
#[derive(Clone)]
pub struct VaultHandle {
    inner: Arc<RwLock<VaultCore>>,
}

impl VaultHandle {
    /// Wraps a vault core for shared use.
    pub fn new(core: VaultCore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(core)),
        }
    }

    /// Runs a read-only closure under the read lock.
    pub fn read<R>(&self, f: impl FnOnce(&VaultCore) -> R) -> R {
        f(&self.inner.read())
    }

    /// Runs a mutating closure under the write lock.
    pub fn write<R>(&self, f: impl FnOnce(&mut VaultCore) -> R) -> R {
        f(&mut self.inner.write())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
