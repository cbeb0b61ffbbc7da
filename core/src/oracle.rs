//! # Price Oracle Boundary
//!
//! The vault consumes prices, it does not fetch them. A [`PriceOracle`]
//! implementation owns the feed plumbing; the core only requires that a
//! returned price is inside an absolute sanity band, and that an insane
//! read is a *failure*, never a silently clamped value.
//!
//! Clamping toward the peg is the allocation engine's job, and it is
//! asymmetric on purpose: minting clamps prices **down** to 1.0 so a
//! depegged-high read cannot over-mint, redemption clamps prices **up**
//! to 1.0 so a depegged-low read cannot over-pay. Reversing either
//! direction hands arbitrageurs the vault's collateral -- see
//! [`clamp_for_mint`] and [`clamp_for_redeem`].
//!
//! Prices are u64 fixed point at 1e8 scale ([`crate::config::PRICE_SCALE`]);
//! `100_000_000` is exactly 1.0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::asset::AssetId;
use crate::config::{DEFAULT_PRICE_CEILING, DEFAULT_PRICE_FLOOR, PRICE_PEG};

/// A unit price in 1e8 fixed point.
pub type Price = u64;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur when reading a price.
#[derive(Debug, Error)]
pub enum OracleError {
    /// No price is known for the asset.
    #[error("no price feed for asset {0}")]
    NoFeed(AssetId),

    /// The reported price is outside the configured absolute sanity band.
    ///
    /// This is an oracle malfunction, not a market condition. The read
    /// fails so that the caller's circuit breakers engage; it is never
    /// clamped into range.
    #[error("price {price} for asset {asset} outside sane range [{floor}, {ceiling}]")]
    PriceOutOfBounds {
        /// The asset whose price was read.
        asset: AssetId,
        /// The offending price (1e8 fixed point).
        price: Price,
        /// Lower bound of the sanity band.
        floor: Price,
        /// Upper bound of the sanity band.
        ceiling: Price,
    },
}

// ---------------------------------------------------------------------------
// PriceOracle
// ---------------------------------------------------------------------------

/// The capability the vault requires from a price source.
///
/// Implementations must enforce their own absolute bounds and fail reads
/// outside them. The vault treats any error from this trait as transient
/// and surfaces it to the caller unchanged.
pub trait PriceOracle {
    /// Returns the current unit price of `asset` in 1e8 fixed point.
    fn price(&self, asset: &AssetId) -> Result<Price, OracleError>;
}

// ---------------------------------------------------------------------------
// Peg clamps
// ---------------------------------------------------------------------------

/// Clamps a price for the mint path: never above 1.0.
///
/// A collateral asset trading above peg must not mint more receipt tokens
/// per unit than the peg implies.
pub fn clamp_for_mint(price: Price) -> Price {
    price.min(PRICE_PEG)
}

/// Clamps a price for the redeem path: never below 1.0.
///
/// A collateral asset trading below peg must not pay out more asset units
/// per token than the peg implies; above peg the real price applies, so
/// redeemers receive fewer units of the expensive asset.
pub fn clamp_for_redeem(price: Price) -> Price {
    price.max(PRICE_PEG)
}

// ---------------------------------------------------------------------------
// PriceBounds
// ---------------------------------------------------------------------------

/// Absolute sanity bounds for one asset's price feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBounds {
    /// Lowest price the oracle will report without failing.
    pub floor: Price,
    /// Highest price the oracle will report without failing.
    pub ceiling: Price,
}

impl Default for PriceBounds {
    fn default() -> Self {
        Self {
            floor: DEFAULT_PRICE_FLOOR,
            ceiling: DEFAULT_PRICE_CEILING,
        }
    }
}

// ---------------------------------------------------------------------------
// InMemoryOracle
// ---------------------------------------------------------------------------

/// A bounds-enforcing oracle over an in-memory price table.
///
/// This is the reference implementation used by tests, benchmarks, and the
/// demo. Production deployments wrap a real feed behind the same trait;
/// the bounds behavior is identical.
#[derive(Clone, Debug, Default)]
pub struct InMemoryOracle {
    prices: HashMap<AssetId, Price>,
    bounds: HashMap<AssetId, PriceBounds>,
}

impl InMemoryOracle {
    /// Creates an empty oracle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price for an asset with default sanity bounds.
    pub fn set_price(&mut self, asset: AssetId, price: Price) {
        self.prices.insert(asset, price);
        self.bounds.entry(asset).or_default();
    }

    /// Sets the sanity bounds for an asset.
    pub fn set_bounds(&mut self, asset: AssetId, bounds: PriceBounds) {
        self.bounds.insert(asset, bounds);
    }
}

impl PriceOracle for InMemoryOracle {
    fn price(&self, asset: &AssetId) -> Result<Price, OracleError> {
        let price = *self.prices.get(asset).ok_or(OracleError::NoFeed(*asset))?;
        let bounds = self.bounds.get(asset).copied().unwrap_or_default();
        if price < bounds.floor || price > bounds.ceiling {
            return Err(OracleError::PriceOutOfBounds {
                asset: *asset,
                price,
                floor: bounds.floor,
                ceiling: bounds.ceiling,
            });
        }
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
