//! # Prometheus Metrics
//!
//! Operational metrics for one vault instance. Each vault owns a dedicated
//! [`prometheus::Registry`] so that multiple vaults in one process (the
//! normal situation in tests) never collide on metric names.
//!
//! The vault has no HTTP surface -- embedders call [`VaultMetrics::encode`]
//! and serve the text however they like.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

/// Holds all Prometheus metric handles for a vault.
///
/// Clone-friendly (prometheus handles wrap `Arc` internally) so it can be
/// shared with background reporters.
#[derive(Clone)]
pub struct VaultMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of successful mints.
    pub mints_total: IntCounter,
    /// Total number of successful redemptions.
    pub redeems_total: IntCounter,
    /// Total number of rebase calls that moved the exchange rate.
    pub rebases_total: IntCounter,
    /// Total number of completed harvests.
    pub harvests_total: IntCounter,
    /// Total number of claimed withdrawal requests.
    pub claims_total: IntCounter,
    /// Current total receipt-token supply (smallest units).
    pub total_supply: IntGauge,
    /// Backing value at the last successful measurement (token units).
    pub total_value: IntGauge,
    /// Cumulative withdrawal demand (token units).
    pub queue_queued: IntGauge,
    /// Cumulative withdrawal demand with committed liquidity (token units).
    pub queue_claimable: IntGauge,
    /// Cumulative paid-out withdrawals (token units).
    pub queue_claimed: IntGauge,
    /// Distribution of per-rebase supply growth (token units).
    pub rebase_yield_units: Histogram,
}

impl VaultMetrics {
    /// Creates and registers all metrics. Call once per vault instance.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("tide".into()), None)
            .expect("failed to create prometheus registry");

        fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
            let c = IntCounter::new(name, help).expect("metric creation");
            registry.register(Box::new(c.clone())).expect("metric registration");
            c
        }

        fn gauge(registry: &Registry, name: &str, help: &str) -> IntGauge {
            let g = IntGauge::new(name, help).expect("metric creation");
            registry.register(Box::new(g.clone())).expect("metric registration");
            g
        }

        let mints_total = counter(&registry, "mints_total", "Total successful mints");
        let redeems_total = counter(&registry, "redeems_total", "Total successful redemptions");
        let rebases_total = counter(
            &registry,
            "rebases_total",
            "Total rebases that moved the exchange rate",
        );
        let harvests_total = counter(&registry, "harvests_total", "Total completed harvests");
        let claims_total = counter(
            &registry,
            "claims_total",
            "Total claimed withdrawal requests",
        );
        let total_supply = gauge(
            &registry,
            "total_supply_units",
            "Current receipt-token supply in smallest units",
        );
        let total_value = gauge(
            &registry,
            "total_value_units",
            "Backing value at last measurement, in token units",
        );
        let queue_queued = gauge(
            &registry,
            "withdrawal_queue_queued_units",
            "Cumulative requested withdrawal amount in token units",
        );
        let queue_claimable = gauge(
            &registry,
            "withdrawal_queue_claimable_units",
            "Cumulative claimable withdrawal amount in token units",
        );
        let queue_claimed = gauge(
            &registry,
            "withdrawal_queue_claimed_units",
            "Cumulative paid-out withdrawal amount in token units",
        );

        let rebase_yield_units = Histogram::with_opts(
            HistogramOpts::new(
                "rebase_yield_units",
                "Per-rebase supply growth in token units",
            )
            .buckets(vec![
                1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(rebase_yield_units.clone()))
            .expect("metric registration");

        Self {
            registry,
            mints_total,
            redeems_total,
            rebases_total,
            harvests_total,
            claims_total,
            total_supply,
            total_value,
            queue_queued,
            queue_claimable,
            queue_claimed,
            rebase_yield_units,
        }
    }

    /// Encodes all registered metrics into the Prometheus text exposition
    /// format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for VaultMetrics {
    fn default() -> Self {
        Self::new()
    }
}
