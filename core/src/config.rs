//! # Vault Configuration & Constants
//!
//! Every magic number in TIDE lives here. If you're hardcoding a constant
//! somewhere else, you're doing it wrong and you owe the team coffee.
//!
//! These values define the economics of the vault. Several of them (buffer
//! ratio, drift band, claim delay) have runtime-tunable counterparts in
//! [`crate::vault::VaultConfig`] -- the constants below are the defaults and
//! the hard outer bounds governance cannot move past.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Receipt Token
// ---------------------------------------------------------------------------

/// Decimal places of the receipt token. 8 decimals, same as Bitcoin.
/// We're not reinventing this wheel.
pub const TOKEN_DECIMALS: u8 = 8;

/// One whole receipt token in smallest units (10^8).
pub const TOKEN_UNIT: u64 = 100_000_000;

// ---------------------------------------------------------------------------
// Fixed-Point Scales
// ---------------------------------------------------------------------------

/// Scale of the credits-per-token exchange rate. 1e12 gives the rate six
/// more significant digits than any token amount, so repeated rebases
/// accumulate rounding dust in the twelfth decimal place -- far below the
/// one-unit tolerance the accounting guarantees.
pub const RATE_SCALE: u128 = 1_000_000_000_000;

/// The exchange rate a fresh ledger starts at: 1 credit per token.
/// The rate only ever moves down from here (supply expands, never shrinks).
pub const INITIAL_CREDITS_PER_TOKEN: u128 = RATE_SCALE;

/// Scale of oracle prices. Prices are u64 fixed point with 8 decimals,
/// so `100_000_000` is exactly 1.0 -- the peg.
pub const PRICE_SCALE: u64 = 100_000_000;

/// The peg price. Mint clamps prices *down* to this, redeem clamps *up*.
/// The asymmetry is deliberate: each side rounds against the caller, never
/// against the vault.
pub const PRICE_PEG: u64 = PRICE_SCALE;

/// Basis-point denominator. 1 bp = 0.01%.
pub const BPS_SCALE: u64 = 10_000;

// ---------------------------------------------------------------------------
// Oracle Sanity Bounds
// ---------------------------------------------------------------------------

/// Default absolute price floor for a stable collateral asset: 0.70.
/// A reported price below this is an oracle malfunction, not a market move,
/// and the oracle must fail the read rather than return it.
pub const DEFAULT_PRICE_FLOOR: u64 = 70_000_000;

/// Default absolute price ceiling for a stable collateral asset: 1.30.
pub const DEFAULT_PRICE_CEILING: u64 = 130_000_000;

// ---------------------------------------------------------------------------
// Allocation Defaults
// ---------------------------------------------------------------------------

/// Default fraction of each asset's book kept liquid in the vault rather
/// than pushed into strategies: 10%. Redemptions inside the buffer never
/// touch a strategy, which keeps the common path cheap.
pub const DEFAULT_BUFFER_BPS: u64 = 1_000;

/// Default rebase drift band: 10%. A computed backing value more than this
/// far from the current supply fails the rebase instead of being applied.
/// Wide enough for a good week of yield, narrow enough to stop an oracle
/// glitch from rewriting every balance in the book.
pub const DEFAULT_REBASE_DRIFT_BPS: u64 = 1_000;

/// Hard ceiling on the configurable drift band: 50%. Past this the band
/// stops being a circuit breaker and starts being decoration.
pub const MAX_REBASE_DRIFT_BPS: u64 = 5_000;

// ---------------------------------------------------------------------------
// Withdrawal Queue
// ---------------------------------------------------------------------------

/// Default delay between requesting a withdrawal and being allowed to
/// claim it. Ten minutes is enough to make flash-loan games uneconomical
/// without meaningfully inconveniencing a human.
pub const DEFAULT_CLAIM_DELAY: Duration = Duration::from_secs(600);

/// Hard ceiling on the configurable claim delay: 7 days. A queue that
/// holds funds longer than a week is a trap, not a queue.
pub const MAX_CLAIM_DELAY: Duration = Duration::from_secs(7 * 24 * 3600);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_unit_matches_decimals() {
        assert_eq!(TOKEN_UNIT, 10u64.pow(TOKEN_DECIMALS as u32));
    }

    #[test]
    fn price_peg_is_one() {
        assert_eq!(PRICE_PEG, PRICE_SCALE);
    }

    #[test]
    fn oracle_bounds_straddle_the_peg() {
        // A sanity band that excludes the peg would reject every honest read.
        assert!(DEFAULT_PRICE_FLOOR < PRICE_PEG);
        assert!(DEFAULT_PRICE_CEILING > PRICE_PEG);
    }

    #[test]
    fn drift_band_defaults_within_ceiling() {
        assert!(DEFAULT_REBASE_DRIFT_BPS <= MAX_REBASE_DRIFT_BPS);
        assert!(MAX_REBASE_DRIFT_BPS < BPS_SCALE);
    }

    #[test]
    fn claim_delay_defaults_within_ceiling() {
        assert!(DEFAULT_CLAIM_DELAY <= MAX_CLAIM_DELAY);
    }

    #[test]
    fn initial_rate_is_exactly_one() {
        assert_eq!(INITIAL_CREDITS_PER_TOKEN, RATE_SCALE);
    }
}
