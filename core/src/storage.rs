//! # VaultStore -- Persistent Storage Engine
//!
//! Durable storage for the vault's state, built on sled's embedded
//! key-value store.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to column families).
//! The store keeps one authoritative record plus per-record read indexes:
//!
//! | Tree       | Key                | Value                       |
//! |------------|--------------------|-----------------------------|
//! | `metadata` | `"snapshot"`       | `bincode(VaultSnapshot)`    |
//! | `accounts` | address (UTF-8)    | `bincode(Account)`          |
//! | `requests` | request id (8B BE) | `bincode(WithdrawalRequest)`|
//! | `assets`   | asset id (32B)     | `bincode(AssetConfig)`      |
//!
//! Request ids are stored big-endian so sled's lexicographic ordering
//! matches numeric ordering and range scans over the withdrawal log work
//! naturally.
//!
//! The snapshot blob in `metadata` is the source of truth and is written
//! last; the index trees are derived views for external inspectors,
//! rebuilt on every persist. A crash between index writes and the blob
//! write leaves stale indexes and a consistent blob -- the next persist
//! heals the indexes.
//!
//! Strategy adapters are external custody: only their registry metadata
//! travels inside the snapshot, and operators re-attach adapters by id
//! after a restore.

use sled::{Batch, Db, Tree};
use std::path::Path;

use crate::ledger::account::Account;
use crate::vault::{VaultSnapshot, WithdrawalRequest};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Well-known key in the `metadata` tree for the authoritative snapshot.
const META_SNAPSHOT: &[u8] = b"snapshot";

// ---------------------------------------------------------------------------
// VaultStore
// ---------------------------------------------------------------------------

/// Persistent storage engine for one vault.
///
/// # Thread Safety
///
/// sled is inherently thread-safe -- all trees support concurrent reads
/// and serialized writes. `VaultStore` can be shared via `Arc<VaultStore>`
/// without external synchronization.
#[derive(Debug, Clone)]
pub struct VaultStore {
    /// The underlying sled database handle.
    db: Db,
    /// Account index: address -> account record.
    accounts: Tree,
    /// Withdrawal log index: id (8B BE) -> request.
    requests: Tree,
    /// Asset config index: asset id (32B) -> config.
    assets: Tree,
    /// Authoritative snapshot and miscellaneous metadata.
    metadata: Tree,
}

impl VaultStore {
    /// Opens or creates a store at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Creates a temporary store that is cleaned up on drop.
    ///
    /// Ideal for tests -- no filesystem side effects, no cleanup needed.
    pub fn open_temporary() -> StoreResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees from an existing sled `Db`.
    fn from_db(db: Db) -> StoreResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let requests = db.open_tree("requests")?;
        let assets = db.open_tree("assets")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            accounts,
            requests,
            assets,
            metadata,
        })
    }

    // -- Persist / Load -----------------------------------------------------

    /// Writes a snapshot: index trees first, the authoritative blob last,
    /// then flushes to disk.
    pub fn persist(&self, snapshot: &VaultSnapshot) -> StoreResult<()> {
        let mut account_batch = Batch::default();
        for (address, account) in snapshot.ledger.accounts() {
            account_batch.insert(address.as_bytes(), encode(account)?);
        }

        let mut request_batch = Batch::default();
        for request in snapshot.queue.requests() {
            request_batch.insert(request.id.to_be_bytes().to_vec(), encode(request)?);
        }

        let mut asset_batch = Batch::default();
        for id in snapshot.assets.ids() {
            let config = snapshot
                .assets
                .get(&id)
                .expect("ids() only returns registered assets");
            asset_batch.insert(id.as_bytes().as_slice(), encode(config)?);
        }

        self.accounts.apply_batch(account_batch)?;
        self.requests.apply_batch(request_batch)?;
        self.assets.apply_batch(asset_batch)?;
        self.metadata.insert(META_SNAPSHOT, encode(snapshot)?)?;
        self.db.flush()?;

        tracing::debug!(
            accounts = self.accounts.len(),
            requests = self.requests.len(),
            "vault snapshot persisted"
        );
        Ok(())
    }

    /// Loads the last persisted snapshot, or `None` for a fresh store.
    pub fn load(&self) -> StoreResult<Option<VaultSnapshot>> {
        match self.metadata.get(META_SNAPSHOT)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    // -- Index Reads --------------------------------------------------------

    /// Reads one account record from the index.
    pub fn account(&self, address: &str) -> StoreResult<Option<Account>> {
        match self.accounts.get(address.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads one withdrawal request from the index.
    pub fn request(&self, id: u64) -> StoreResult<Option<WithdrawalRequest>> {
        match self.requests.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterates the withdrawal log index in id order, starting at
    /// `from_id`.
    pub fn requests_from(&self, from_id: u64) -> StoreResult<Vec<WithdrawalRequest>> {
        let mut out = Vec::new();
        for item in self.requests.range(from_id.to_be_bytes()..) {
            let (_, bytes) = item?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    /// Flushes all pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetConfig;
    use crate::oracle::InMemoryOracle;
    use crate::vault::{VaultConfig, VaultCore};

    const GOVERNOR: &str = "tide:governor";
    const ALICE: &str = "tide:alice";

    fn populated_vault() -> VaultCore {
        let asset = AssetConfig::new("USDC", 6, "tide:issuer");
        let mut oracle = InMemoryOracle::new();
        oracle.set_price(asset.id, crate::config::PRICE_SCALE);

        let mut vault = VaultCore::new(VaultConfig::new(GOVERNOR, asset.id), Box::new(oracle));
        vault.support_asset(GOVERNOR, asset.clone()).unwrap();
        vault.mint(ALICE, &asset.id, 5_000_000, 0).unwrap();
        vault.request_withdrawal(ALICE, 100_000_000).unwrap();
        vault
    }

    #[test]
    fn fresh_store_has_no_snapshot() {
        let store = VaultStore::open_temporary().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn persist_and_load_roundtrip() {
        let store = VaultStore::open_temporary().unwrap();
        let vault = populated_vault();
        store.persist(&vault.snapshot()).unwrap();

        let loaded = store.load().unwrap().expect("snapshot present");
        let restored = VaultCore::restore(loaded, Box::new(InMemoryOracle::new()));
        assert_eq!(restored.total_supply(), vault.total_supply());
        assert_eq!(restored.queue_totals(), vault.queue_totals());
        assert_eq!(restored.balance_of(ALICE), vault.balance_of(ALICE));
    }

    #[test]
    fn index_trees_are_queryable() {
        let store = VaultStore::open_temporary().unwrap();
        let vault = populated_vault();
        store.persist(&vault.snapshot()).unwrap();

        let account = store.account(ALICE).unwrap().expect("account indexed");
        assert!(account.credits() > 0);

        let request = store.request(0).unwrap().expect("request indexed");
        assert_eq!(request.requester, ALICE);
        assert_eq!(request.amount, 100_000_000);

        assert!(store.request(99).unwrap().is_none());
    }

    #[test]
    fn request_range_scan_is_ordered() {
        let store = VaultStore::open_temporary().unwrap();
        let mut vault = populated_vault();
        vault.request_withdrawal(ALICE, 50_000_000).unwrap();
        vault.request_withdrawal(ALICE, 25_000_000).unwrap();
        store.persist(&vault.snapshot()).unwrap();

        let all = store.requests_from(0).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));

        let tail = store.requests_from(1).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].id, 1);
    }

    #[test]
    fn persist_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault-db");

        let vault = populated_vault();
        {
            let store = VaultStore::open(&path).unwrap();
            store.persist(&vault.snapshot()).unwrap();
        }

        let store = VaultStore::open(&path).unwrap();
        let loaded = store.load().unwrap().expect("snapshot survives reopen");
        assert_eq!(loaded.ledger.total_supply(), vault.total_supply());
    }
}
