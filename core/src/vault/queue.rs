//! # Asynchronous Withdrawal Queue
//!
//! When redemption demand outstrips liquid collateral, the vault does not
//! revert and it does not block: it sells the withdrawer a *ticket*. The
//! tokens are burned immediately (they stop earning yield the moment the
//! exit is requested), the claim goes into an append-only log, and the
//! ticket becomes payable once the vault has committed enough liquidity to
//! cover every ticket ahead of it.
//!
//! ## FIFO Without Scanning
//!
//! Each request records the cumulative queued total at creation. A request
//! is claimable exactly when that running total is within the committed
//! (`claimable`) prefix -- an O(1) comparison, no list traversal. Two
//! cumulative counters (`queued`, `claimable`) and one paid counter
//! (`claimed`) describe the entire queue state:
//!
//! ```text
//! claimed <= claimable <= queued        (all cumulative, never decreasing)
//! queued - claimed == Σ unclaimed request amounts
//! ```
//!
//! ## Tickets Are Binding
//!
//! There is no cancellation. A request burns the tokens up front and is
//! settled only by claiming. The claim delay is a monotonic time check
//! against the request's creation time, not a scheduled task.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{VaultCore, VaultError};
use crate::asset::AssetId;
use crate::ledger::{Address, LedgerError};
use crate::math::{from_token_units, to_token_units, within_band_bps};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during withdrawal queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// No request exists with this id.
    #[error("unknown withdrawal request {0}")]
    UnknownRequest(u64),

    /// The claim delay has not elapsed yet.
    #[error("claim delay not met for request {id}: {remaining_secs}s remaining")]
    ClaimDelayNotMet {
        /// The request being claimed.
        id: u64,
        /// Seconds until the request becomes claimable.
        remaining_secs: i64,
    },

    /// Someone other than the requester tried to claim.
    ///
    /// Requests are tied 1:1 to their requester and cannot be reassigned.
    #[error("caller {caller} is not the requester of request {id}")]
    NotRequester {
        /// The request being claimed.
        id: u64,
        /// The rejected caller.
        caller: Address,
    },

    /// The request has already been paid out.
    #[error("withdrawal request {0} is already claimed")]
    AlreadyClaimed(u64),

    /// The committed liquidity does not yet cover this request's position.
    ///
    /// Transient: retry after `add_withdrawal_queue_liquidity` (or after
    /// any mint/harvest refills the queue passively).
    #[error(
        "request {id} is pending liquidity: position {cumulative_queued}, claimable {claimable}"
    )]
    QueuePendingLiquidity {
        /// The request being claimed.
        id: u64,
        /// Cumulative queued total up to and including this request.
        cumulative_queued: u64,
        /// The currently committed prefix.
        claimable: u64,
    },
}

// ---------------------------------------------------------------------------
// WithdrawalRequest
// ---------------------------------------------------------------------------

/// One entry in the append-only withdrawal log.
///
/// Never deleted; `claimed` flips exactly once. Indexable by id for
/// external viewers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Monotonic id, equal to the request's index in the log.
    pub id: u64,

    /// The account that burned tokens for this ticket. Claims pay only
    /// this address.
    pub requester: Address,

    /// Requested amount in receipt-token units.
    pub amount: u64,

    /// Cumulative queued total up to and including this request. A request
    /// is claimable once `cumulative_queued <= claimable` -- which is
    /// possible only after every earlier request's amount is covered too.
    pub cumulative_queued: u64,

    /// `true` while the request sits in the queue; cleared on claim.
    pub queued: bool,

    /// `true` once the request has been paid out.
    pub claimed: bool,

    /// When the request was created. The claim delay counts from here.
    pub requested_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// QueueTotals
// ---------------------------------------------------------------------------

/// The queue's aggregate counters. All three totals are cumulative for the
/// life of the vault and never decrease.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTotals {
    /// Cumulative requested amount (token units).
    pub queued: u64,
    /// Cumulative amount the vault has committed liquidity for.
    pub claimable: u64,
    /// Cumulative amount paid out.
    pub claimed: u64,
    /// Id the next request will receive.
    pub next_index: u64,
}

// ---------------------------------------------------------------------------
// WithdrawalQueue
// ---------------------------------------------------------------------------

/// The queue state: the append-only request log plus aggregate counters.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct WithdrawalQueue {
    requests: Vec<WithdrawalRequest>,
    totals: QueueTotals,
}

impl WithdrawalQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate counters.
    pub fn totals(&self) -> &QueueTotals {
        &self.totals
    }

    /// Looks up a request by id.
    pub fn request(&self, id: u64) -> Option<&WithdrawalRequest> {
        self.requests.get(id as usize)
    }

    /// The full request log, oldest first.
    pub fn requests(&self) -> &[WithdrawalRequest] {
        &self.requests
    }

    /// Total unclaimed demand: burned claims the vault still owes.
    pub fn outstanding(&self) -> u64 {
        self.totals.queued - self.totals.claimed
    }

    /// Committed-but-unpaid liquidity. This much of the vault's base-asset
    /// cash is spoken for and must not be redeemed or allocated away.
    pub fn reserved(&self) -> u64 {
        self.totals.claimable - self.totals.claimed
    }

    /// Appends a new request and returns its id.
    pub(crate) fn append(&mut self, requester: &str, amount: u64, now: DateTime<Utc>) -> u64 {
        let id = self.totals.next_index;
        let cumulative_queued = self.totals.queued + amount;
        self.requests.push(WithdrawalRequest {
            id,
            requester: requester.to_string(),
            amount,
            cumulative_queued,
            queued: true,
            claimed: false,
            requested_at: now,
        });
        self.totals.queued = cumulative_queued;
        self.totals.next_index += 1;
        id
    }

    /// Promotes up to `available` token units of queued demand to
    /// claimable. Returns the new claimable total.
    pub(crate) fn add_liquidity(&mut self, available: u64) -> u64 {
        let addable = (self.totals.queued - self.totals.claimable).min(available);
        if addable > 0 {
            self.totals.claimable += addable;
            tracing::debug!(added = addable, claimable = self.totals.claimable, "queue liquidity added");
        }
        self.totals.claimable
    }

    /// Validates every claim precondition without mutating anything.
    pub(crate) fn check_claimable(
        &self,
        caller: &str,
        id: u64,
        delay: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<&WithdrawalRequest, QueueError> {
        let request = self.request(id).ok_or(QueueError::UnknownRequest(id))?;

        if request.requester != caller {
            return Err(QueueError::NotRequester {
                id,
                caller: caller.to_string(),
            });
        }
        if request.claimed {
            return Err(QueueError::AlreadyClaimed(id));
        }

        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let claimable_at = request.requested_at + delay;
        if now < claimable_at {
            return Err(QueueError::ClaimDelayNotMet {
                id,
                remaining_secs: (claimable_at - now).num_seconds().max(1),
            });
        }

        if request.cumulative_queued > self.totals.claimable {
            return Err(QueueError::QueuePendingLiquidity {
                id,
                cumulative_queued: request.cumulative_queued,
                claimable: self.totals.claimable,
            });
        }

        Ok(request)
    }

    /// Marks a validated request as paid.
    pub(crate) fn mark_claimed(&mut self, id: u64) {
        let request = &mut self.requests[id as usize];
        debug_assert!(!request.claimed);
        request.claimed = true;
        request.queued = false;
        self.totals.claimed += request.amount;
    }
}

// ---------------------------------------------------------------------------
// WithdrawalReceipt
// ---------------------------------------------------------------------------

/// Receipt returned by a successful claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReceipt {
    /// The claimed request.
    pub id: u64,
    /// The asset paid out.
    pub asset: AssetId,
    /// Amount paid, in the asset's native units.
    pub amount_native: u64,
    /// Amount settled against the queue, in token units.
    pub amount_tokens: u64,
    /// When the claim executed (UTC).
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Vault entry points
// ---------------------------------------------------------------------------

impl VaultCore {
    /// Read access to the withdrawal queue.
    pub fn withdrawal_queue(&self) -> &WithdrawalQueue {
        &self.queue
    }

    /// The queue's aggregate counters.
    pub fn queue_totals(&self) -> QueueTotals {
        *self.queue.totals()
    }

    /// Burns `amount` receipt tokens from `caller` and enqueues a
    /// withdrawal ticket. Returns the request id.
    ///
    /// The burn is immediate -- queued withdrawals stop earning yield.
    /// Before burning, the vault checks that total claims (supply plus
    /// outstanding queue) stay within the rebase drift band of backing
    /// value; an under-backed vault refuses new tickets with
    /// [`VaultError::LiquidityError`] rather than locking in full-value
    /// claims it cannot honor.
    pub fn request_withdrawal(&mut self, caller: &str, amount: u64) -> Result<u64, VaultError> {
        self.enter()?;
        let result = self.request_withdrawal_inner(caller, amount);
        self.exit();
        result
    }

    fn request_withdrawal_inner(&mut self, caller: &str, amount: u64) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(LedgerError::AmountMustBePositive.into());
        }
        let available = self.ledger.balance_of(caller);
        if amount > available {
            return Err(LedgerError::InsufficientBalance {
                account: caller.to_string(),
                available,
                requested: amount,
            }
            .into());
        }

        // Solvency gate, mirroring the rebase band: compare raw backing
        // against every claim on it (live supply + unclaimed tickets).
        let value = self.check_total_value()?;
        let claims = self.ledger.total_supply() + self.queue.outstanding();
        if claims > 0
            && !within_band_bps(value as u128, claims as u128, self.config.rebase_drift_bps)
        {
            return Err(VaultError::LiquidityError {
                asset: self.config.base_asset,
                needed: claims,
                available: value,
            });
        }

        self.ledger.burn(caller, amount)?;
        let id = self.queue.append(caller, amount, Utc::now());

        tracing::info!(caller, amount, id, "withdrawal requested");
        self.sync_queue_metrics();
        Ok(id)
    }

    /// Recomputes how much queued demand the vault's current base-asset
    /// cash can cover and promotes it to claimable. Callable by anyone;
    /// also invoked passively after mints and harvests.
    ///
    /// Strategies are never touched here -- this only commits cash already
    /// sitting in the vault.
    pub fn add_withdrawal_queue_liquidity(&mut self) -> u64 {
        let claimable = self.refill_queue();
        self.sync_queue_metrics();
        claimable
    }

    /// Internal passive refill. Commits unreserved base-asset cash to the
    /// queue, in token units.
    pub(crate) fn refill_queue(&mut self) -> u64 {
        let Ok(base) = self.assets.get(&self.config.base_asset) else {
            // Queue not usable until the base asset is registered.
            return self.queue.totals().claimable;
        };
        let cash_tokens =
            to_token_units(self.cash.balance(&base.id), base.decimals).unwrap_or(u64::MAX);
        let available = cash_tokens.saturating_sub(self.queue.reserved());
        self.queue.add_liquidity(available)
    }

    /// Pays out a matured, liquidity-covered withdrawal request.
    ///
    /// Requires, in order: the request exists, `caller` is its requester,
    /// it is unclaimed, the claim delay has elapsed, and the committed
    /// prefix covers its queue position.
    pub fn claim_withdrawal(
        &mut self,
        caller: &str,
        id: u64,
    ) -> Result<WithdrawalReceipt, VaultError> {
        self.queue
            .check_claimable(caller, id, self.config.claim_delay, Utc::now())?;
        let receipt = self.pay_out(id)?;
        self.sync_queue_metrics();
        Ok(receipt)
    }

    /// Claims a batch of requests atomically: every id is validated before
    /// any payout happens, so one bad id fails the whole batch with no
    /// state change.
    pub fn claim_withdrawals(
        &mut self,
        caller: &str,
        ids: &[u64],
    ) -> Result<Vec<WithdrawalReceipt>, VaultError> {
        let now = Utc::now();
        let mut seen = std::collections::HashSet::new();
        for &id in ids {
            self.queue
                .check_claimable(caller, id, self.config.claim_delay, now)?;
            if !seen.insert(id) {
                // A duplicate would pass validation and then double-pay.
                return Err(QueueError::AlreadyClaimed(id).into());
            }
        }

        let mut receipts = Vec::with_capacity(ids.len());
        for &id in ids {
            receipts.push(self.pay_out(id)?);
        }
        self.sync_queue_metrics();
        Ok(receipts)
    }

    /// Transfers the payout for a validated request and marks it claimed.
    fn pay_out(&mut self, id: u64) -> Result<WithdrawalReceipt, VaultError> {
        let base = self.assets.get(&self.config.base_asset)?.clone();
        let request = self
            .queue
            .request(id)
            .expect("validated request must exist");
        let amount_tokens = request.amount;
        let requester = request.requester.clone();

        let amount_native =
            from_token_units(amount_tokens, base.decimals).ok_or(VaultError::AmountOverflow)?;
        let cash = self.cash.balance(&base.id);
        if self.cash.debit(&base.id, amount_native).is_none() {
            return Err(VaultError::LiquidityError {
                asset: base.id,
                needed: amount_native,
                available: cash,
            });
        }

        self.queue.mark_claimed(id);
        self.metrics.claims_total.inc();
        tracing::info!(id, requester = %requester, amount = amount_tokens, "withdrawal claimed");

        Ok(WithdrawalReceipt {
            id,
            asset: base.id,
            amount_native,
            amount_tokens,
            timestamp: Utc::now(),
        })
    }

    /// Pushes queue counters into the metrics gauges.
    fn sync_queue_metrics(&self) {
        let totals = self.queue.totals();
        self.metrics.queue_queued.set(totals.queued as i64);
        self.metrics.queue_claimable.set(totals.claimable as i64);
        self.metrics.queue_claimed.set(totals.claimed as i64);
        self.metrics
            .total_supply
            .set(self.ledger.total_supply() as i64);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
