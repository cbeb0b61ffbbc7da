//! # Collateral Assets
//!
//! Defines the collateral abstraction for the TIDE vault. Every asset the
//! vault accepts -- dollar stablecoins, wrapped fiat tokens, tokenized
//! T-bill shares -- is represented as an [`AssetConfig`] with a unique
//! [`AssetId`].
//!
//! Asset IDs are deterministic BLAKE3 hashes of the asset's canonical
//! properties (symbol, decimals, issuer). The same asset always gets the
//! same ID regardless of when or where it's registered -- no coordination
//! required between deployments.
//!
//! The [`AssetRegistry`] is the vault's source of truth for which assets
//! may be minted against, how their native units convert to receipt-token
//! units, and where surplus collateral gets allocated by default.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::StrategyId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during asset registry operations.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The asset is not registered with the vault.
    #[error("asset not supported: {0}")]
    AssetNotSupported(AssetId),

    /// Attempted to register an asset that already exists.
    #[error("asset already supported: {0}")]
    AlreadySupported(AssetId),

    /// Minting against this asset is currently disabled.
    #[error("minting is disabled for asset {0}")]
    MintDisabled(AssetId),

    /// Attempted to remove an asset the vault still holds value in.
    ///
    /// Removal with a nonzero holding would silently orphan collateral,
    /// so the registry refuses until the book for this asset is empty.
    #[error("asset {asset} still has a net holding of {holding} token units")]
    NonZeroHolding {
        /// The asset that was being removed.
        asset: AssetId,
        /// The vault's total holding (cash + strategies), in token units.
        holding: u64,
    },
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// A unique, content-addressed identifier for a collateral asset.
///
/// Computed as `BLAKE3(symbol || decimals || issuer)`. Two assets with
/// identical properties always produce the same ID, making this a natural
/// deduplication key across vault deployments.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId([u8; 32]);

impl AssetId {
    /// Creates an `AssetId` from a raw 32-byte hash.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the raw 32-byte identifier.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the hex-encoded asset ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a hex-encoded asset ID.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Derives an `AssetId` from the canonical asset properties.
    ///
    /// The hash input is `symbol || 0x00 || decimals || 0x00 || issuer`.
    /// The separator bytes prevent ambiguity when one field's suffix
    /// matches another field's prefix.
    pub fn derive(symbol: &str, decimals: u8, issuer: &str) -> Self {
        let mut preimage = Vec::with_capacity(symbol.len() + issuer.len() + 4);
        preimage.extend_from_slice(symbol.as_bytes());
        preimage.push(0x00);
        preimage.push(decimals);
        preimage.push(0x00);
        preimage.extend_from_slice(issuer.as_bytes());

        Self(*blake3::hash(&preimage).as_bytes())
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({}...)", &self.to_hex()[..12])
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::str::FromStr for AssetId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// ---------------------------------------------------------------------------
// Serde helper: serialize HashMap<AssetId, V> with hex-string keys
// ---------------------------------------------------------------------------

/// Serde helper module for serializing/deserializing `HashMap<AssetId, V>`
/// as a JSON object with hex-encoded string keys.
///
/// JSON requires map keys to be strings, but `AssetId` wraps `[u8; 32]`
/// which serde would serialize as an array. This module converts keys
/// to/from their hex representation so the map serializes correctly.
pub mod asset_id_map {
    use super::AssetId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::HashMap;

    pub fn serialize<V, S>(map: &HashMap<AssetId, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut ser_map = serializer.serialize_map(Some(map.len()))?;
        for (key, value) in map {
            ser_map.serialize_entry(&key.to_hex(), value)?;
        }
        ser_map.end()
    }

    pub fn deserialize<'de, V, D>(deserializer: D) -> Result<HashMap<AssetId, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let string_map: HashMap<String, V> = HashMap::deserialize(deserializer)?;
        string_map
            .into_iter()
            .map(|(key, value)| {
                AssetId::from_hex(&key)
                    .map(|id| (id, value))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// AssetConfig
// ---------------------------------------------------------------------------

/// Per-asset configuration record.
///
/// One of these exists for every collateral type the vault supports. The
/// `decimals` field drives unit conversion between the asset's native
/// smallest units and receipt-token units; everything else is routing and
/// gating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    /// Content-addressed identifier derived from this asset's properties.
    pub id: AssetId,

    /// Trading symbol (e.g., "USDC"). Display only.
    pub symbol: String,

    /// Decimal places of the asset's native smallest unit.
    ///
    /// Used to normalize amounts to receipt-token units. A 6-decimal
    /// asset amount of `1_000_000` is exactly one token unit's worth.
    pub decimals: u8,

    /// Strategy that receives this asset's surplus collateral on
    /// allocation. `None` means surplus stays in the vault as cash.
    pub default_strategy: Option<StrategyId>,

    /// Whether new deposits of this asset may mint receipt tokens.
    ///
    /// Turned off to wind an asset down: existing holdings keep backing
    /// supply and remain redeemable, but no new exposure accumulates.
    pub mint_allowed: bool,

    /// When this asset was added to the registry.
    pub added_at: DateTime<Utc>,
}

impl AssetConfig {
    /// Creates a new mintable asset config with no default strategy.
    pub fn new(symbol: &str, decimals: u8, issuer: &str) -> Self {
        Self {
            id: AssetId::derive(symbol, decimals, issuer),
            symbol: symbol.to_string(),
            decimals,
            default_strategy: None,
            mint_allowed: true,
            added_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// AssetRegistry
// ---------------------------------------------------------------------------

/// The set of collateral assets the vault supports.
///
/// Owned by the vault core; mutations arrive only through governance
/// entry points. Removal is refused while the vault's net holding of the
/// asset is nonzero -- the caller passes the current holding in, because
/// the registry does not know about cash books or strategies.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssetRegistry {
    /// Asset configs indexed by asset ID.
    #[serde(with = "asset_id_map")]
    assets: HashMap<AssetId, AssetConfig>,
}

impl AssetRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new supported asset.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::AlreadySupported`] if the ID is taken.
    pub fn add(&mut self, config: AssetConfig) -> Result<(), AssetError> {
        if self.assets.contains_key(&config.id) {
            return Err(AssetError::AlreadySupported(config.id));
        }
        tracing::info!(asset = %config.id, symbol = %config.symbol, "asset supported");
        self.assets.insert(config.id, config);
        Ok(())
    }

    /// Removes an asset, given the vault's current net holding of it.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::NonZeroHolding`] when `net_holding > 0` and
    /// [`AssetError::AssetNotSupported`] for unknown IDs.
    pub fn remove(&mut self, asset: &AssetId, net_holding: u64) -> Result<AssetConfig, AssetError> {
        if !self.assets.contains_key(asset) {
            return Err(AssetError::AssetNotSupported(*asset));
        }
        if net_holding > 0 {
            return Err(AssetError::NonZeroHolding {
                asset: *asset,
                holding: net_holding,
            });
        }
        tracing::info!(asset = %asset, "asset removed");
        Ok(self.assets.remove(asset).expect("presence checked above"))
    }

    /// Returns the config for a supported asset.
    pub fn get(&self, asset: &AssetId) -> Result<&AssetConfig, AssetError> {
        self.assets
            .get(asset)
            .ok_or(AssetError::AssetNotSupported(*asset))
    }

    /// Returns a mutable config for a supported asset.
    pub fn get_mut(&mut self, asset: &AssetId) -> Result<&mut AssetConfig, AssetError> {
        self.assets
            .get_mut(asset)
            .ok_or(AssetError::AssetNotSupported(*asset))
    }

    /// Returns `true` if the asset is registered.
    pub fn is_supported(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    /// Returns all supported asset IDs in a stable order.
    ///
    /// Sorted so that pro-rata redemption baskets and total-value sweeps
    /// iterate deterministically regardless of hash-map ordering.
    pub fn ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.assets.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of supported assets.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Returns `true` if no assets are registered.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
