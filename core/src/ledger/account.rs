//! # Per-Account Credit Bookkeeping
//!
//! An [`Account`] holds credits, not tokens. Its spendable token balance is
//! *derived* by dividing credits through an exchange rate: the global rate
//! for rebasing accounts, or the account's own frozen rate for accounts
//! that have opted out of rebasing.
//!
//! Nothing in this file mutates global totals -- that is the ledger's job.
//! An `Account` is pure arithmetic over its own fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RATE_SCALE;
use crate::math::{mul_div_ceil, mul_div_floor};

/// A single account's position in the rebasing ledger.
///
/// Serializable so that the whole account book can be snapshotted to disk
/// as one record per address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Credit balance in internal fixed units.
    credits: u128,

    /// Whether this account has opted out of rebasing.
    rebase_opt_out: bool,

    /// The exchange rate frozen at opt-out time. Zero (and meaningless)
    /// while the account is rebasing.
    fixed_credits_per_token: u128,

    /// Timestamp of the last balance-modifying operation.
    last_updated: DateTime<Utc>,
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}

impl Account {
    /// Creates a fresh rebasing account with zero credits.
    pub fn new() -> Self {
        Self {
            credits: 0,
            rebase_opt_out: false,
            fixed_credits_per_token: 0,
            last_updated: Utc::now(),
        }
    }

    /// Raw credit balance.
    pub fn credits(&self) -> u128 {
        self.credits
    }

    /// Whether this account is opted out of rebasing.
    pub fn is_opted_out(&self) -> bool {
        self.rebase_opt_out
    }

    /// The rate frozen at opt-out time (zero while rebasing).
    pub fn fixed_credits_per_token(&self) -> u128 {
        self.fixed_credits_per_token
    }

    /// When this account last changed.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// The exchange rate this account's balance is derived at.
    pub fn effective_rate(&self, global_credits_per_token: u128) -> u128 {
        if self.rebase_opt_out {
            self.fixed_credits_per_token
        } else {
            global_credits_per_token
        }
    }

    /// Spendable token balance at the given global rate, rounded down.
    pub fn balance(&self, global_credits_per_token: u128) -> u64 {
        let rate = self.effective_rate(global_credits_per_token);
        if rate == 0 {
            return 0;
        }
        let tokens = mul_div_floor(self.credits, RATE_SCALE, rate)
            .expect("balance arithmetic cannot overflow for in-range credits");
        u64::try_from(tokens).expect("derived balance exceeds u64 supply range")
    }

    /// Converts a token amount into credits at this account's rate,
    /// rounded **down** (used when crediting the account).
    pub fn credits_for_mint(&self, token_amount: u64, global_rate: u128) -> u128 {
        mul_div_floor(
            token_amount as u128,
            self.effective_rate(global_rate),
            RATE_SCALE,
        )
        .expect("mint credit arithmetic cannot overflow for u64 amounts")
    }

    /// Converts a token amount into credits at this account's rate,
    /// rounded **up** and clamped to the held credits (used when debiting).
    ///
    /// Debiting the account's entire derived balance always clears the
    /// credit balance to zero, so no unspendable dust survives a full exit.
    pub fn credits_for_burn(&self, token_amount: u64, global_rate: u128) -> u128 {
        let rate = self.effective_rate(global_rate);
        if token_amount == self.balance(global_rate) {
            return self.credits;
        }
        let credits = mul_div_ceil(token_amount as u128, rate, RATE_SCALE)
            .expect("burn credit arithmetic cannot overflow for u64 amounts");
        credits.min(self.credits)
    }

    /// Adds credits to the account.
    pub fn add_credits(&mut self, credits: u128) {
        self.credits += credits;
        self.last_updated = Utc::now();
    }

    /// Removes credits from the account. Callers check sufficiency first.
    pub fn sub_credits(&mut self, credits: u128) {
        debug_assert!(credits <= self.credits);
        self.credits -= credits;
        self.last_updated = Utc::now();
    }

    /// Freezes the account at the given rate, leaving rebasing.
    pub fn freeze_at(&mut self, rate: u128) {
        self.rebase_opt_out = true;
        self.fixed_credits_per_token = rate;
        self.last_updated = Utc::now();
    }

    /// Re-enters rebasing with a new credit balance valued at the global
    /// rate.
    pub fn thaw_with(&mut self, credits: u128) {
        self.credits = credits;
        self.rebase_opt_out = false;
        self.fixed_credits_per_token = 0;
        self.last_updated = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{INITIAL_CREDITS_PER_TOKEN, RATE_SCALE};

    #[test]
    fn fresh_account_is_empty_and_rebasing() {
        let a = Account::new();
        assert_eq!(a.credits(), 0);
        assert!(!a.is_opted_out());
        assert_eq!(a.balance(INITIAL_CREDITS_PER_TOKEN), 0);
    }

    #[test]
    fn balance_at_initial_rate_is_one_to_one() {
        let mut a = Account::new();
        a.add_credits(a.credits_for_mint(1_000, INITIAL_CREDITS_PER_TOKEN));
        assert_eq!(a.balance(INITIAL_CREDITS_PER_TOKEN), 1_000);
    }

    #[test]
    fn balance_grows_when_rate_drops() {
        let mut a = Account::new();
        a.add_credits(a.credits_for_mint(1_000, INITIAL_CREDITS_PER_TOKEN));
        // Rate drops 10% -> balance grows ~11%.
        let new_rate = RATE_SCALE * 9 / 10;
        assert_eq!(a.balance(new_rate), 1_111);
    }

    #[test]
    fn opted_out_balance_ignores_global_rate() {
        let mut a = Account::new();
        a.add_credits(a.credits_for_mint(1_000, INITIAL_CREDITS_PER_TOKEN));
        a.freeze_at(INITIAL_CREDITS_PER_TOKEN);

        let new_rate = RATE_SCALE / 2;
        assert_eq!(a.balance(new_rate), 1_000);
    }

    #[test]
    fn full_burn_clears_credit_dust() {
        let mut a = Account::new();
        // A rate that doesn't divide evenly leaves fractional credits.
        let rate = RATE_SCALE * 3 / 7;
        a.add_credits(a.credits_for_mint(1_000, rate));

        let bal = a.balance(rate);
        let credits = a.credits_for_burn(bal, rate);
        assert_eq!(credits, a.credits(), "full exit must clear all credits");
    }

    #[test]
    fn burn_rounds_against_the_holder() {
        let mut a = Account::new();
        let rate = RATE_SCALE * 3 / 7;
        a.add_credits(a.credits_for_mint(1_000, rate));

        let mint_credits = a.credits_for_mint(500, rate);
        let burn_credits = a.credits_for_burn(500, rate);
        assert!(burn_credits >= mint_credits);
        assert!(burn_credits - mint_credits <= 1);
    }

    #[test]
    fn account_serialization_roundtrip() {
        let mut a = Account::new();
        a.add_credits(12_345);
        a.freeze_at(RATE_SCALE);

        let json = serde_json::to_string(&a).expect("serialize");
        let recovered: Account = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, a);
    }
}
