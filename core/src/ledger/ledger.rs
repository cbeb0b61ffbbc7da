//! # The Rebasing Ledger
//!
//! Owns the account book and the three global numbers that define the
//! elastic supply: `total_credits` (rebasing accounts only), the global
//! `credits_per_token` exchange rate, and `non_rebasing_supply` (the fixed
//! token claims of opted-out accounts).
//!
//! ## Supply Identity
//!
//! ```text
//! total_supply == rebasing_supply + non_rebasing_supply
//! rebasing_supply == total_credits * RATE_SCALE / credits_per_token
//! ```
//!
//! Every operation maintains this identity. Opted-out accounts are tracked
//! by their *derived balance delta* so `non_rebasing_supply` is exactly the
//! sum of opted-out balances at all times, not an approximation.
//!
//! ## Rebase Safety
//!
//! `rebase` takes the authoritative backing value from the allocation
//! engine and refuses to apply it when it drifts outside the configured
//! band around the current supply -- an oracle glitch must trip a circuit
//! breaker, not rewrite every balance in the book. A failed rebase leaves
//! the last-good rate untouched and is never retried automatically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::account::Account;
use super::Address;
use crate::config::{INITIAL_CREDITS_PER_TOKEN, RATE_SCALE};
use crate::math::{mul_div_ceil, mul_div_floor, within_band_bps};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Zero-amount operations are rejected as caller bugs.
    #[error("amount must be positive")]
    AmountMustBePositive,

    /// Attempted to debit more than the account's derived balance.
    #[error("insufficient balance: available {available}, requested {requested} (account {account})")]
    InsufficientBalance {
        /// The account being debited.
        account: Address,
        /// Derived balance at the current rate.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Minting would push total supply past `u64::MAX`.
    ///
    /// If you're hitting this, someone is minting more than 18.4
    /// quintillion smallest units. That's either a bug or an attack.
    #[error("supply overflow: current {current}, minted {minted}")]
    SupplyOverflow {
        /// Total supply before the failed mint.
        current: u64,
        /// The mint amount that caused the overflow.
        minted: u64,
    },

    /// The proposed backing value drifts too far from the current supply.
    ///
    /// Deliberate circuit breaker: operator intervention required. The
    /// last-good exchange rate stays in place.
    #[error(
        "unsafe rebase: proposed value {proposed_value} outside {band_bps} bps band around supply {current_supply}"
    )]
    UnsafeRebase {
        /// Total supply before the rebase attempt.
        current_supply: u64,
        /// The backing value that was proposed.
        proposed_value: u64,
        /// The configured drift band in basis points.
        band_bps: u64,
    },

    /// The account has already opted out of rebasing.
    #[error("account {0} is already opted out of rebasing")]
    AlreadyOptedOut(Address),

    /// The account is not opted out, so there is nothing to opt into.
    #[error("account {0} is not opted out of rebasing")]
    NotOptedOut(Address),
}

// ---------------------------------------------------------------------------
// RebaseOutcome
// ---------------------------------------------------------------------------

/// Result of a successful `rebase` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebaseOutcome {
    /// Total supply before the rebase.
    pub supply_before: u64,
    /// Total supply after the rebase.
    pub supply_after: u64,
    /// The exchange rate now in effect.
    pub credits_per_token: u128,
    /// Whether the rate actually moved. `false` means the proposed value
    /// was inside the band but would not have grown supply, so the call
    /// was a deliberate no-op.
    pub applied: bool,
}

// ---------------------------------------------------------------------------
// RebasingLedger
// ---------------------------------------------------------------------------

/// The elastic-supply account book.
///
/// Not a global: the ledger is an owned field of the vault core, so tests
/// can run any number of independent instances in one process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RebasingLedger {
    /// Account records keyed by address.
    accounts: HashMap<Address, Account>,

    /// Sum of credits across *rebasing* accounts only.
    total_credits: u128,

    /// Global exchange rate, RATE_SCALE fixed point. Monotone
    /// non-increasing for the life of the ledger.
    credits_per_token: u128,

    /// Sum of opted-out accounts' fixed token claims.
    non_rebasing_supply: u64,
}

impl Default for RebasingLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RebasingLedger {
    /// Creates an empty ledger at the 1:1 initial exchange rate.
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            total_credits: 0,
            credits_per_token: INITIAL_CREDITS_PER_TOKEN,
            non_rebasing_supply: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Read Side
    // -----------------------------------------------------------------------

    /// The global exchange rate currently in effect.
    pub fn credits_per_token(&self) -> u128 {
        self.credits_per_token
    }

    /// Sum of credits across rebasing accounts.
    pub fn total_credits(&self) -> u128 {
        self.total_credits
    }

    /// Token supply held by opted-out accounts.
    pub fn non_rebasing_supply(&self) -> u64 {
        self.non_rebasing_supply
    }

    /// Token supply held by rebasing accounts, derived at the current rate.
    pub fn rebasing_supply(&self) -> u64 {
        let tokens = mul_div_floor(self.total_credits, RATE_SCALE, self.credits_per_token)
            .expect("rebasing supply arithmetic cannot overflow");
        u64::try_from(tokens).expect("rebasing supply exceeds u64 range")
    }

    /// Total token supply: rebasing plus non-rebasing.
    pub fn total_supply(&self) -> u64 {
        self.rebasing_supply() + self.non_rebasing_supply
    }

    /// Derived spendable balance of an account (zero for unknown accounts).
    pub fn balance_of(&self, account: &str) -> u64 {
        self.accounts
            .get(account)
            .map(|a| a.balance(self.credits_per_token))
            .unwrap_or(0)
    }

    /// Whether the account has opted out of rebasing.
    pub fn is_opted_out(&self, account: &str) -> bool {
        self.accounts
            .get(account)
            .map(|a| a.is_opted_out())
            .unwrap_or(false)
    }

    /// The raw account record, if one exists.
    pub fn account(&self, account: &str) -> Option<&Account> {
        self.accounts.get(account)
    }

    /// Iterates all account records (for conservation checks and
    /// snapshotting).
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    // -----------------------------------------------------------------------
    // Mint / Burn
    // -----------------------------------------------------------------------

    /// Mints `token_amount` to `account` at its effective rate.
    ///
    /// Credits are rounded down, so a mint can never create more claim
    /// than the tokens paid for.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AmountMustBePositive`] on zero amounts,
    /// [`LedgerError::SupplyOverflow`] past `u64::MAX` total supply.
    pub fn mint(&mut self, account: &str, token_amount: u64) -> Result<u64, LedgerError> {
        if token_amount == 0 {
            return Err(LedgerError::AmountMustBePositive);
        }
        let current = self.total_supply();
        if current.checked_add(token_amount).is_none() {
            return Err(LedgerError::SupplyOverflow {
                current,
                minted: token_amount,
            });
        }

        let rate = self.credits_per_token;
        let entry = self
            .accounts
            .entry(account.to_string())
            .or_insert_with(Account::new);

        let balance_before = entry.balance(rate);
        let credits = entry.credits_for_mint(token_amount, rate);
        entry.add_credits(credits);
        let balance_after = entry.balance(rate);

        if entry.is_opted_out() {
            self.non_rebasing_supply += balance_after - balance_before;
        } else {
            self.total_credits += credits;
        }

        tracing::debug!(account, amount = token_amount, "mint");
        Ok(balance_after)
    }

    /// Burns `token_amount` from `account`.
    ///
    /// Credits are rounded up (and a full-balance burn clears credit dust),
    /// so a burn always removes at least the claim it pays out.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`] when the derived balance at the
    /// *current* rate cannot cover the amount.
    pub fn burn(&mut self, account: &str, token_amount: u64) -> Result<u64, LedgerError> {
        if token_amount == 0 {
            return Err(LedgerError::AmountMustBePositive);
        }
        let rate = self.credits_per_token;
        let available = self.balance_of(account);
        if token_amount > available {
            return Err(LedgerError::InsufficientBalance {
                account: account.to_string(),
                available,
                requested: token_amount,
            });
        }

        let entry = self
            .accounts
            .get_mut(account)
            .expect("balance check above guarantees presence");
        let balance_before = entry.balance(rate);
        let credits = entry.credits_for_burn(token_amount, rate);
        entry.sub_credits(credits);
        let balance_after = entry.balance(rate);

        if entry.is_opted_out() {
            self.non_rebasing_supply -= balance_before - balance_after;
        } else {
            self.total_credits -= credits;
        }

        tracing::debug!(account, amount = token_amount, "burn");
        Ok(balance_after)
    }

    // -----------------------------------------------------------------------
    // Transfer
    // -----------------------------------------------------------------------

    /// Moves `token_amount` from `from` to `to`, converting at each side's
    /// own effective rate.
    ///
    /// Transferring into an opted-out account freezes that portion at the
    /// receiver's fixed rate; transferring out of one releases it. Mixed
    /// states are the normal case, not an edge case.
    pub fn transfer(&mut self, from: &str, to: &str, token_amount: u64) -> Result<(), LedgerError> {
        if token_amount == 0 {
            return Err(LedgerError::AmountMustBePositive);
        }
        let rate = self.credits_per_token;
        let available = self.balance_of(from);
        if token_amount > available {
            return Err(LedgerError::InsufficientBalance {
                account: from.to_string(),
                available,
                requested: token_amount,
            });
        }
        if from == to {
            // A self-transfer of a covered amount is a no-op.
            return Ok(());
        }

        // Debit side.
        let sender = self
            .accounts
            .get_mut(from)
            .expect("balance check above guarantees presence");
        let sender_before = sender.balance(rate);
        let debit_credits = sender.credits_for_burn(token_amount, rate);
        sender.sub_credits(debit_credits);
        let sender_after = sender.balance(rate);
        let sender_opted_out = sender.is_opted_out();

        if sender_opted_out {
            self.non_rebasing_supply -= sender_before - sender_after;
        } else {
            self.total_credits -= debit_credits;
        }

        // Credit side.
        let receiver = self
            .accounts
            .entry(to.to_string())
            .or_insert_with(Account::new);
        let receiver_before = receiver.balance(rate);
        let credit_credits = receiver.credits_for_mint(token_amount, rate);
        receiver.add_credits(credit_credits);
        let receiver_after = receiver.balance(rate);

        if receiver.is_opted_out() {
            self.non_rebasing_supply += receiver_after - receiver_before;
        } else {
            self.total_credits += credit_credits;
        }

        tracing::debug!(from, to, amount = token_amount, "transfer");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rebase
    // -----------------------------------------------------------------------

    /// Adjusts the exchange rate so total supply matches `new_total_value`.
    ///
    /// `new_total_value` is the authoritative backing value in token units
    /// -- the vault core computes it from cash plus strategy balances; the
    /// ledger trusts no other source.
    ///
    /// # Errors
    ///
    /// [`LedgerError::UnsafeRebase`] when the value is outside `band_bps`
    /// of the current supply. In-band values that would *shrink* supply
    /// are applied as a no-op (`applied == false`): the rate is monotone
    /// and an in-band dip is rounding noise, not yield.
    ///
    /// # Panics
    ///
    /// Panics if the recomputed rate would be zero -- that is an invariant
    /// violation (a bug), and continuing would corrupt every balance.
    pub fn rebase(&mut self, new_total_value: u64, band_bps: u64) -> Result<RebaseOutcome, LedgerError> {
        let supply_before = self.total_supply();

        if !within_band_bps(new_total_value as u128, supply_before as u128, band_bps) {
            return Err(LedgerError::UnsafeRebase {
                current_supply: supply_before,
                proposed_value: new_total_value,
                band_bps,
            });
        }

        let unchanged = RebaseOutcome {
            supply_before,
            supply_after: supply_before,
            credits_per_token: self.credits_per_token,
            applied: false,
        };

        // Nothing rebasing, or no backing left for rebasing claims after
        // the fixed ones: leave the rate alone.
        let Some(target) = new_total_value.checked_sub(self.non_rebasing_supply) else {
            tracing::warn!(
                new_total_value,
                non_rebasing = self.non_rebasing_supply,
                "rebase skipped: backing below non-rebasing claims"
            );
            return Ok(unchanged);
        };
        if self.total_credits == 0 || target == 0 {
            return Ok(unchanged);
        }

        let new_rate = mul_div_ceil(self.total_credits, RATE_SCALE, target as u128)
            .expect("rebase rate arithmetic cannot overflow");
        assert!(new_rate > 0, "computed zero exchange rate; ledger state is corrupt");

        if new_rate >= self.credits_per_token {
            // Supply would not grow. The rate never moves up.
            if new_rate > self.credits_per_token {
                tracing::warn!(
                    supply = supply_before,
                    proposed = new_total_value,
                    "rebase skipped: in-band value below current supply"
                );
            }
            return Ok(unchanged);
        }

        self.credits_per_token = new_rate;
        let supply_after = self.total_supply();
        tracing::info!(supply_before, supply_after, rate = new_rate, "rebase applied");

        Ok(RebaseOutcome {
            supply_before,
            supply_after,
            credits_per_token: new_rate,
            applied: true,
        })
    }

    // -----------------------------------------------------------------------
    // Opt-Out / Opt-In
    // -----------------------------------------------------------------------

    /// Opts `account` out of rebasing, freezing its balance at the current
    /// rate. The spendable balance is exactly unchanged by the conversion.
    pub fn opt_out(&mut self, account: &str) -> Result<(), LedgerError> {
        let rate = self.credits_per_token;
        let entry = self
            .accounts
            .entry(account.to_string())
            .or_insert_with(Account::new);
        if entry.is_opted_out() {
            return Err(LedgerError::AlreadyOptedOut(account.to_string()));
        }

        let balance = entry.balance(rate);
        let credits = entry.credits();
        entry.freeze_at(rate);

        self.total_credits -= credits;
        self.non_rebasing_supply += balance;

        tracing::info!(account, balance, "account opted out of rebasing");
        Ok(())
    }

    /// Opts `account` back into rebasing at the current global rate. The
    /// spendable balance differs by at most one unit of rounding.
    pub fn opt_in(&mut self, account: &str) -> Result<(), LedgerError> {
        let rate = self.credits_per_token;
        let entry = match self.accounts.get_mut(account) {
            Some(a) if a.is_opted_out() => a,
            _ => return Err(LedgerError::NotOptedOut(account.to_string())),
        };

        let balance = entry.balance(rate);
        let new_credits = mul_div_floor(balance as u128, rate, RATE_SCALE)
            .expect("opt-in credit arithmetic cannot overflow");
        entry.thaw_with(new_credits);

        self.non_rebasing_supply -= balance;
        self.total_credits += new_credits;

        tracing::info!(account, balance, "account opted into rebasing");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REBASE_DRIFT_BPS;

    const ALICE: &str = "tide:alice";
    const BOB: &str = "tide:bob";

    const BAND: u64 = DEFAULT_REBASE_DRIFT_BPS;

    #[test]
    fn mint_credits_balance_and_supply() {
        let mut ledger = RebasingLedger::new();
        let balance = ledger.mint(ALICE, 1_000).unwrap();

        assert_eq!(balance, 1_000);
        assert_eq!(ledger.balance_of(ALICE), 1_000);
        assert_eq!(ledger.total_supply(), 1_000);
        assert_eq!(ledger.non_rebasing_supply(), 0);
    }

    #[test]
    fn mint_zero_rejected() {
        let mut ledger = RebasingLedger::new();
        assert!(matches!(
            ledger.mint(ALICE, 0),
            Err(LedgerError::AmountMustBePositive)
        ));
    }

    #[test]
    fn burn_reduces_balance_and_supply() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        let remaining = ledger.burn(ALICE, 400).unwrap();

        assert_eq!(remaining, 600);
        assert_eq!(ledger.total_supply(), 600);
    }

    #[test]
    fn burn_more_than_balance_rejected() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        let result = ledger.burn(ALICE, 200);

        assert!(matches!(
            result,
            Err(LedgerError::InsufficientBalance {
                available: 100,
                requested: 200,
                ..
            })
        ));
        // Failed burn must not change state.
        assert_eq!(ledger.balance_of(ALICE), 100);
        assert_eq!(ledger.total_supply(), 100);
    }

    #[test]
    fn burn_checks_balance_at_current_rate_not_stale() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.rebase(1_100, BAND).unwrap();

        // 1_050 exceeds the pre-rebase balance but not the current one.
        assert!(ledger.burn(ALICE, 1_050).is_ok());
    }

    #[test]
    fn transfer_between_rebasing_accounts() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.transfer(ALICE, BOB, 300).unwrap();

        assert_eq!(ledger.balance_of(ALICE), 700);
        assert_eq!(ledger.balance_of(BOB), 300);
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn transfer_insufficient_rejected() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        assert!(matches!(
            ledger.transfer(ALICE, BOB, 200),
            Err(LedgerError::InsufficientBalance { .. })
        ));
    }

    #[test]
    fn transfer_into_opted_out_account_freezes_portion() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.opt_out(BOB).unwrap();
        ledger.transfer(ALICE, BOB, 400).unwrap();

        assert_eq!(ledger.balance_of(BOB), 400);
        assert_eq!(ledger.non_rebasing_supply(), 400);

        // Yield accrues to Alice only; Bob is frozen.
        ledger.rebase(1_100, BAND).unwrap();
        assert_eq!(ledger.balance_of(BOB), 400);
        let alice = ledger.balance_of(ALICE);
        assert!(alice >= 699 && alice <= 700, "alice: {alice}");
    }

    #[test]
    fn transfer_out_of_opted_out_account() {
        let mut ledger = RebasingLedger::new();
        ledger.opt_out(BOB).unwrap();
        ledger.mint(BOB, 500).unwrap();
        ledger.transfer(BOB, ALICE, 200).unwrap();

        assert_eq!(ledger.balance_of(BOB), 300);
        assert_eq!(ledger.balance_of(ALICE), 200);
        assert_eq!(ledger.non_rebasing_supply(), 300);
        assert_eq!(ledger.total_supply(), 500);
    }

    #[test]
    fn self_transfer_is_noop() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        ledger.transfer(ALICE, ALICE, 50).unwrap();
        assert_eq!(ledger.balance_of(ALICE), 100);
    }

    #[test]
    fn rebase_grows_all_rebasing_balances() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 600).unwrap();
        ledger.mint(BOB, 400).unwrap();

        let outcome = ledger.rebase(1_100, BAND).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.supply_before, 1_000);

        // Pro-rata: Alice 60%, Bob 40% of 1_100, each within 1 unit.
        let alice = ledger.balance_of(ALICE);
        let bob = ledger.balance_of(BOB);
        assert!(alice >= 659 && alice <= 660, "alice: {alice}");
        assert!(bob >= 439 && bob <= 440, "bob: {bob}");
        assert!(ledger.total_supply() <= 1_100);
        assert!(ledger.total_supply() >= 1_098);
    }

    #[test]
    fn rebase_outside_band_rejected() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();

        let result = ledger.rebase(2_000, BAND);
        assert!(matches!(result, Err(LedgerError::UnsafeRebase { .. })));
        // Last-good rate stays in place.
        assert_eq!(ledger.balance_of(ALICE), 1_000);
        assert_eq!(ledger.credits_per_token(), INITIAL_CREDITS_PER_TOKEN);
    }

    #[test]
    fn in_band_shrink_is_noop_not_error() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();

        let outcome = ledger.rebase(950, BAND).unwrap();
        assert!(!outcome.applied);
        assert_eq!(ledger.balance_of(ALICE), 1_000);
    }

    #[test]
    fn rate_is_monotone_across_rebases() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 10_000).unwrap();

        let mut last_rate = ledger.credits_per_token();
        for value in [10_500u64, 11_000, 10_900, 11_500] {
            let _ = ledger.rebase(value, BAND);
            let rate = ledger.credits_per_token();
            assert!(rate <= last_rate, "rate moved up: {last_rate} -> {rate}");
            last_rate = rate;
        }
    }

    #[test]
    fn rebase_with_no_rebasing_credits_is_noop() {
        let mut ledger = RebasingLedger::new();
        ledger.opt_out(ALICE).unwrap();
        ledger.mint(ALICE, 1_000).unwrap();

        let outcome = ledger.rebase(1_050, BAND).unwrap();
        assert!(!outcome.applied);
        assert_eq!(ledger.balance_of(ALICE), 1_000);
    }

    #[test]
    fn opt_out_preserves_balance_exactly() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.rebase(1_100, BAND).unwrap();

        let before = ledger.balance_of(ALICE);
        ledger.opt_out(ALICE).unwrap();
        assert_eq!(ledger.balance_of(ALICE), before);
        assert_eq!(ledger.total_supply(), before);
    }

    #[test]
    fn opt_in_preserves_balance_within_rounding() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.rebase(1_097, BAND).unwrap();
        ledger.opt_out(ALICE).unwrap();

        let before = ledger.balance_of(ALICE);
        ledger.opt_in(ALICE).unwrap();
        let after = ledger.balance_of(ALICE);
        assert!(before - after <= 1, "before {before}, after {after}");
    }

    #[test]
    fn double_opt_out_rejected() {
        let mut ledger = RebasingLedger::new();
        ledger.opt_out(ALICE).unwrap();
        assert!(matches!(
            ledger.opt_out(ALICE),
            Err(LedgerError::AlreadyOptedOut(_))
        ));
    }

    #[test]
    fn opt_in_without_opt_out_rejected() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 100).unwrap();
        assert!(matches!(
            ledger.opt_in(ALICE),
            Err(LedgerError::NotOptedOut(_))
        ));
    }

    #[test]
    fn conservation_under_mixed_operations() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 5_000).unwrap();
        ledger.mint(BOB, 3_000).unwrap();
        ledger.opt_out(BOB).unwrap();
        ledger.transfer(ALICE, BOB, 1_000).unwrap();
        ledger.rebase(8_400, BAND).unwrap();
        ledger.burn(ALICE, 500).unwrap();
        ledger.transfer(BOB, ALICE, 2_000).unwrap();

        let derived: u64 = [ALICE, BOB].iter().map(|a| ledger.balance_of(a)).sum();
        let supply = ledger.total_supply();
        // One unit of rounding tolerance per operation performed.
        assert!(supply.abs_diff(derived) <= 7, "supply {supply}, derived {derived}");
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let mut ledger = RebasingLedger::new();
        ledger.mint(ALICE, 1_000).unwrap();
        ledger.opt_out(BOB).unwrap();
        ledger.mint(BOB, 250).unwrap();
        ledger.rebase(1_300, BAND).unwrap();

        let json = serde_json::to_string(&ledger).expect("serialize");
        let recovered: RebasingLedger = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(recovered.total_supply(), ledger.total_supply());
        assert_eq!(recovered.balance_of(ALICE), ledger.balance_of(ALICE));
        assert_eq!(recovered.balance_of(BOB), ledger.balance_of(BOB));
        assert_eq!(recovered.credits_per_token(), ledger.credits_per_token());
    }
}
