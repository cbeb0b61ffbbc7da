//! # Yield Strategies
//!
//! A strategy is an external custody adapter: it takes collateral from the
//! vault, puts it to work somewhere (a lending market, an AMM position),
//! and hands it back on demand. The vault treats every strategy
//! polymorphically through the [`Strategy`] trait -- no adapter-specific
//! code leaks into the core.
//!
//! The [`StrategyRegistry`] tracks which adapters governance has approved
//! and enforces the one rule that matters most: **a strategy holding funds
//! cannot be removed.** Liquidate first, deregister second. Anything else
//! is how protocols strand collateral.
//!
//! Strategies never touch vault-held cash. Capital reaches them only
//! through their own `deposit`, and leaves only through their own
//! `withdraw`/`withdraw_all`, always driven by the allocation engine.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::asset::AssetId;
use crate::ledger::Address;

/// Unique identifier of a registered strategy.
pub type StrategyId = Uuid;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during strategy operations.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy is not registered (or not approved) with the vault.
    #[error("invalid strategy: {0}")]
    InvalidStrategy(StrategyId),

    /// The strategy does not support the requested asset.
    #[error("strategy {strategy} does not support asset {asset}")]
    UnsupportedAsset {
        /// The strategy that was asked.
        strategy: StrategyId,
        /// The asset it cannot hold.
        asset: AssetId,
    },

    /// Attempted to remove a strategy that still holds collateral.
    #[error("strategy {strategy} still holds {balance} units of asset {asset}")]
    NonZeroBalance {
        /// The strategy that was being removed.
        strategy: StrategyId,
        /// An asset it still holds.
        asset: AssetId,
        /// The held amount, in the asset's native units.
        balance: u64,
    },

    /// The adapter itself failed (downstream protocol revert, etc.).
    ///
    /// Surfaced verbatim; the vault does not retry.
    #[error("strategy adapter failure: {0}")]
    AdapterFailure(String),
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// The capability set every yield strategy adapter must implement.
///
/// All amounts are in the asset's native smallest units. An adapter is
/// trusted with custody of whatever the vault deposits, and untrusted in
/// every other respect -- the vault wraps calls into adapters with its
/// reentrancy guard and re-reads balances instead of trusting returns
/// where it matters.
pub trait Strategy {
    /// Accepts `amount` of `asset` from the vault into strategy custody.
    fn deposit(&mut self, asset: &AssetId, amount: u64) -> Result<(), StrategyError>;

    /// Returns `amount` of `asset` from strategy custody to `recipient`.
    ///
    /// Returns the amount actually withdrawn, which may be less than
    /// requested when the downstream position has slipped.
    fn withdraw(
        &mut self,
        recipient: &Address,
        asset: &AssetId,
        amount: u64,
    ) -> Result<u64, StrategyError>;

    /// Liquidates the entire position and returns everything held, as
    /// `(asset, amount)` pairs, to the vault.
    fn withdraw_all(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError>;

    /// Current custody balance of `asset`, in native units.
    fn check_balance(&self, asset: &AssetId) -> u64;

    /// Whether this strategy can hold `asset` at all.
    fn supports_asset(&self, asset: &AssetId) -> bool;

    /// Transfers accrued reward tokens out of the strategy.
    ///
    /// Returns `(reward_asset, amount)` pairs now held by the caller.
    /// Reward assets are usually *not* vault collateral; the harvester
    /// swaps them into the base asset before they touch the books.
    fn collect_rewards(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError>;
}

// ---------------------------------------------------------------------------
// StrategyEntry / StrategyMeta
// ---------------------------------------------------------------------------

/// Registry metadata for one strategy, separate from the live adapter so
/// that snapshots can persist it (adapters are external custody and are
/// re-attached by id at boot).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyMeta {
    /// Registry identifier.
    pub id: StrategyId,
    /// Relative allocation weight. Informational for rebalancing tools;
    /// the engine itself routes by each asset's default strategy.
    pub weight: u32,
    /// Whether governance has approved this strategy for allocation.
    pub approved: bool,
    /// When this strategy was registered.
    pub added_at: DateTime<Utc>,
}

/// A registered strategy: its metadata plus the live adapter.
pub struct StrategyEntry {
    /// Persistable registry metadata.
    pub meta: StrategyMeta,
    /// The adapter holding actual custody.
    adapter: Box<dyn Strategy>,
}

impl fmt::Debug for StrategyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyEntry")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// StrategyRegistry
// ---------------------------------------------------------------------------

/// The set of strategies governance has registered.
///
/// Owned by the vault core. The registry gates every adapter access on
/// the entry's `approved` flag, so revoking approval instantly fences a
/// strategy off from new capital without touching its custody.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    entries: HashMap<StrategyId, StrategyEntry>,
}

impl StrategyRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new strategy adapter and returns its id.
    ///
    /// The strategy starts approved; governance revokes approval to fence
    /// it off.
    pub fn register(&mut self, adapter: Box<dyn Strategy>, weight: u32) -> StrategyId {
        let id = Uuid::new_v4();
        self.register_with_id(id, adapter, weight);
        id
    }

    /// Registers an adapter under a caller-chosen id.
    ///
    /// Used when restoring from a snapshot, where ids must survive the
    /// restart so that asset configs keep pointing at the right strategy.
    pub fn register_with_id(&mut self, id: StrategyId, adapter: Box<dyn Strategy>, weight: u32) {
        tracing::info!(strategy = %id, weight, "strategy registered");
        self.entries.insert(
            id,
            StrategyEntry {
                meta: StrategyMeta {
                    id,
                    weight,
                    approved: true,
                    added_at: Utc::now(),
                },
                adapter,
            },
        );
    }

    /// Sets the approval flag on a strategy.
    pub fn set_approved(&mut self, id: &StrategyId, approved: bool) -> Result<(), StrategyError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or(StrategyError::InvalidStrategy(*id))?;
        entry.meta.approved = approved;
        tracing::info!(strategy = %id, approved, "strategy approval changed");
        Ok(())
    }

    /// Removes a strategy from the registry.
    ///
    /// # Errors
    ///
    /// Returns [`StrategyError::NonZeroBalance`] if the strategy still
    /// holds any of the `assets` passed in (the caller supplies the full
    /// supported-asset list). The entry is untouched on failure.
    pub fn remove(
        &mut self,
        id: &StrategyId,
        assets: &[AssetId],
    ) -> Result<StrategyMeta, StrategyError> {
        let entry = self
            .entries
            .get(id)
            .ok_or(StrategyError::InvalidStrategy(*id))?;

        for asset in assets {
            let balance = entry.adapter.check_balance(asset);
            if balance > 0 {
                return Err(StrategyError::NonZeroBalance {
                    strategy: *id,
                    asset: *asset,
                    balance,
                });
            }
        }

        let entry = self.entries.remove(id).expect("presence checked above");
        tracing::info!(strategy = %id, "strategy removed");
        Ok(entry.meta)
    }

    /// Returns the adapter for an *approved* strategy.
    pub fn adapter(&self, id: &StrategyId) -> Result<&dyn Strategy, StrategyError> {
        let entry = self
            .entries
            .get(id)
            .filter(|e| e.meta.approved)
            .ok_or(StrategyError::InvalidStrategy(*id))?;
        Ok(entry.adapter.as_ref())
    }

    /// Returns a mutable adapter for an *approved* strategy.
    pub fn adapter_mut(&mut self, id: &StrategyId) -> Result<&mut dyn Strategy, StrategyError> {
        let entry = self
            .entries
            .get_mut(id)
            .filter(|e| e.meta.approved)
            .ok_or(StrategyError::InvalidStrategy(*id))?;
        Ok(entry.adapter.as_mut())
    }

    /// Returns the metadata for a strategy regardless of approval.
    pub fn meta(&self, id: &StrategyId) -> Result<&StrategyMeta, StrategyError> {
        self.entries
            .get(id)
            .map(|e| &e.meta)
            .ok_or(StrategyError::InvalidStrategy(*id))
    }

    /// Returns `true` if the strategy is registered and approved.
    pub fn is_approved(&self, id: &StrategyId) -> bool {
        self.entries
            .get(id)
            .map(|e| e.meta.approved)
            .unwrap_or(false)
    }

    /// Sum of `check_balance(asset)` over all approved strategies, in the
    /// asset's native units.
    pub fn total_balance(&self, asset: &AssetId) -> u64 {
        self.entries
            .values()
            .filter(|e| e.meta.approved)
            .map(|e| e.adapter.check_balance(asset))
            .sum()
    }

    /// All registered strategy ids in a stable order.
    pub fn ids(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    /// All registry metadata, for snapshotting.
    pub fn metas(&self) -> Vec<StrategyMeta> {
        let mut metas: Vec<StrategyMeta> = self.entries.values().map(|e| e.meta.clone()).collect();
        metas.sort_by_key(|m| m.id);
        metas
    }

    /// Number of registered strategies.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no strategies are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Minimal in-memory adapter for registry tests.
    struct TestStrategy {
        balances: HashMap<AssetId, u64>,
    }

    impl TestStrategy {
        fn new() -> Self {
            Self {
                balances: HashMap::new(),
            }
        }
    }

    impl Strategy for TestStrategy {
        fn deposit(&mut self, asset: &AssetId, amount: u64) -> Result<(), StrategyError> {
            *self.balances.entry(*asset).or_insert(0) += amount;
            Ok(())
        }

        fn withdraw(
            &mut self,
            _recipient: &Address,
            asset: &AssetId,
            amount: u64,
        ) -> Result<u64, StrategyError> {
            let held = self.balances.entry(*asset).or_insert(0);
            let taken = amount.min(*held);
            *held -= taken;
            Ok(taken)
        }

        fn withdraw_all(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
            let out: Vec<(AssetId, u64)> =
                self.balances.drain().filter(|(_, v)| *v > 0).collect();
            Ok(out)
        }

        fn check_balance(&self, asset: &AssetId) -> u64 {
            self.balances.get(asset).copied().unwrap_or(0)
        }

        fn supports_asset(&self, _asset: &AssetId) -> bool {
            true
        }

        fn collect_rewards(&mut self) -> Result<Vec<(AssetId, u64)>, StrategyError> {
            Ok(Vec::new())
        }
    }

    fn usdc() -> AssetId {
        AssetId::derive("USDC", 6, "tide:issuer")
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = StrategyRegistry::new();
        let id = reg.register(Box::new(TestStrategy::new()), 100);

        assert!(reg.is_approved(&id));
        assert_eq!(reg.meta(&id).unwrap().weight, 100);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn unapproved_strategy_is_fenced_off() {
        let mut reg = StrategyRegistry::new();
        let id = reg.register(Box::new(TestStrategy::new()), 100);
        reg.set_approved(&id, false).unwrap();

        assert!(!reg.is_approved(&id));
        assert!(matches!(
            reg.adapter(&id),
            Err(StrategyError::InvalidStrategy(_))
        ));
        // Metadata stays visible for governance tooling.
        assert!(reg.meta(&id).is_ok());
    }

    #[test]
    fn remove_empty_strategy() {
        let mut reg = StrategyRegistry::new();
        let id = reg.register(Box::new(TestStrategy::new()), 100);

        let meta = reg.remove(&id, &[usdc()]).unwrap();
        assert_eq!(meta.id, id);
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_funded_strategy_rejected() {
        let mut reg = StrategyRegistry::new();
        let id = reg.register(Box::new(TestStrategy::new()), 100);
        reg.adapter_mut(&id).unwrap().deposit(&usdc(), 1_000).unwrap();

        let result = reg.remove(&id, &[usdc()]);
        assert!(matches!(
            result,
            Err(StrategyError::NonZeroBalance { balance: 1_000, .. })
        ));
        // Entry must survive the failed removal.
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.total_balance(&usdc()), 1_000);
    }

    #[test]
    fn total_balance_sums_approved_only() {
        let mut reg = StrategyRegistry::new();
        let a = reg.register(Box::new(TestStrategy::new()), 100);
        let b = reg.register(Box::new(TestStrategy::new()), 100);
        reg.adapter_mut(&a).unwrap().deposit(&usdc(), 300).unwrap();
        reg.adapter_mut(&b).unwrap().deposit(&usdc(), 200).unwrap();

        assert_eq!(reg.total_balance(&usdc()), 500);

        reg.set_approved(&b, false).unwrap();
        assert_eq!(reg.total_balance(&usdc()), 300);
    }

    #[test]
    fn register_with_id_preserves_id() {
        let mut reg = StrategyRegistry::new();
        let id = Uuid::new_v4();
        reg.register_with_id(id, Box::new(TestStrategy::new()), 50);
        assert!(reg.is_approved(&id));
    }

    #[test]
    fn meta_serialization_roundtrip() {
        let mut reg = StrategyRegistry::new();
        reg.register(Box::new(TestStrategy::new()), 75);

        let metas = reg.metas();
        let json = serde_json::to_string(&metas).expect("serialize");
        let recovered: Vec<StrategyMeta> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, metas);
    }
}
