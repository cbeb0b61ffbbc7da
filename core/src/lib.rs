// Copyright (c) 2026 Tidewater Systems. MIT License.
// See LICENSE for details.

//! # TIDE -- Elastic-Supply Multi-Strategy Vault, Accounting Core
//!
//! Users deposit stable collateral and receive a rebasing receipt token
//! whose balance grows as yield accrues. This crate is the accounting core
//! that makes that safe: elastic balance tracking with opt-out semantics,
//! multi-strategy capital routing behind a liquidity buffer, and an
//! asynchronous withdrawal queue that stays solvent under partial
//! liquidity. The three subsystems share one invariant -- total claims
//! against the vault never exceed backing value -- and every line here
//! exists to keep it.
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of a
//! collateral vault:
//!
//! - **ledger** -- Elastic balances via credits and one global exchange
//!   rate. Rebases are O(1), not O(holders).
//! - **asset** -- Supported-collateral registry with content-addressed ids.
//! - **oracle** -- Price boundary: bounds that fail instead of clamping,
//!   and the asymmetric peg clamps the allocation paths rely on.
//! - **strategy** -- The polymorphic yield-strategy seam and its registry.
//!   Funded strategies cannot be deregistered. Ever.
//! - **vault** -- The context object tying it together: mint, redeem,
//!   allocate, reallocate, rebase, and the withdrawal queue.
//! - **harvest** -- Reward collection and conversion back to collateral.
//! - **storage** -- Persistent snapshots over sled.
//! - **metrics** / **logging** -- prometheus and tracing plumbing.
//! - **config** / **math** -- Constants and checked fixed-point helpers.
//!
//! ## Design Philosophy
//!
//! 1. Correctness over performance (but rebases are still one write).
//! 2. No floating point anywhere near a balance.
//! 3. Rounding always favors the vault -- the caller eats the dust.
//! 4. If it touches money, it has tests. Plural.

pub mod asset;
pub mod config;
pub mod harvest;
pub mod ledger;
pub mod logging;
pub mod math;
pub mod metrics;
pub mod oracle;
pub mod storage;
pub mod strategy;
pub mod vault;

pub use asset::{AssetConfig, AssetError, AssetId, AssetRegistry};
pub use harvest::{Harvester, HarvestError, SwapRouter};
pub use ledger::{Account, Address, LedgerError, RebaseOutcome, RebasingLedger};
pub use metrics::VaultMetrics;
pub use oracle::{InMemoryOracle, OracleError, Price, PriceBounds, PriceOracle};
pub use storage::{StoreError, VaultStore};
pub use strategy::{Strategy, StrategyError, StrategyId, StrategyMeta, StrategyRegistry};
pub use vault::{
    QueueError, QueueTotals, Redemption, RedeemMode, VaultConfig, VaultCore, VaultError,
    VaultHandle, VaultSnapshot, WithdrawalQueue, WithdrawalReceipt, WithdrawalRequest,
};
