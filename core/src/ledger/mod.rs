//! # Rebasing Ledger -- Elastic Balances Without Per-Account Writes
//!
//! The receipt token's supply tracks the vault's backing value: when yield
//! lands, every holder's balance grows. Doing that with a write per account
//! would make rebasing O(holders); instead the ledger stores per-account
//! **credits** and one global **credits-per-token** exchange rate. A rebase
//! touches exactly one number and every rebasing balance moves with it.
//!
//! ## Architecture
//!
//! ```text
//! account.rs -- per-account credit balance and opt-out bookkeeping
//! ledger.rs  -- the ledger itself: mint/burn/transfer/rebase/opt-in/out
//! ```
//!
//! ## Design Principles
//!
//! 1. **All token amounts are `u64` in smallest-unit denomination.** The
//!    exchange rate is u128 fixed point at [`crate::config::RATE_SCALE`].
//!    No floating point anywhere near a balance.
//!
//! 2. **The exchange rate only decreases.** Supply can only expand relative
//!    to credits. A rebase that would shrink balances is refused (out of
//!    band) or skipped (in band), never applied -- so no holder ever sees a
//!    past balance retroactively reduced by rounding.
//!
//! 3. **Rounding favors the protocol.** Mint rounds credits down, burn
//!    rounds credits up, the rebase rate rounds up. Total claims stay at or
//!    below backing value, always.
//!
//! 4. **Opt-out freezes, never forfeits.** An account that opts out of
//!    rebasing keeps its exact balance at the moment of conversion and
//!    stops accruing -- built for contracts that cannot tolerate balance
//!    changes they didn't initiate.

pub mod account;
#[allow(clippy::module_inception)]
pub mod ledger;

pub use account::Account;
pub use ledger::{LedgerError, RebaseOutcome, RebasingLedger};

/// An account identifier. Opaque at this layer -- address encoding belongs
/// to whatever network the vault is embedded in.
pub type Address = String;
