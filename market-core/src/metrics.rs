//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the marketplace.
//!
//! # Metrics
//!
//! - `market_orders_created_total` - Orders created and paid
//! - `market_orders_completed_total` - Orders confirmed (manual + auto)
//! - `market_orders_auto_confirmed_total` - Confirmations made by the sweep
//! - `market_orders_refunded_total` - Approved refunds
//! - `market_escrow_volume_total` - Sum of amounts frozen into escrow
//! - `market_provinces_lit_total` - First-time province lightings
//! - `market_title_promotions_total` - Title level promotions
//! - `market_unit_commit_duration_seconds` - Unit-of-work commit latency
//!
//! Collectors register against a per-instance registry, not the process
//! default, so independent engines (and tests) never collide.

use prometheus::{Counter, Histogram, HistogramOpts, IntCounter, Registry};
use std::fmt;
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Orders created and paid
    pub orders_created_total: IntCounter,

    /// Orders confirmed, manually or by the sweep
    pub orders_completed_total: IntCounter,

    /// Confirmations performed by the auto-confirm sweep
    pub orders_auto_confirmed_total: IntCounter,

    /// Approved refunds
    pub orders_refunded_total: IntCounter,

    /// Total amount moved into escrow
    pub escrow_volume_total: Counter,

    /// First-time province lightings
    pub provinces_lit_total: IntCounter,

    /// Title promotions
    pub title_promotions_total: IntCounter,

    /// Unit-of-work commit latency
    pub commit_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let orders_created_total = IntCounter::new(
            "market_orders_created_total",
            "Orders created and paid",
        )?;
        registry.register(Box::new(orders_created_total.clone()))?;

        let orders_completed_total = IntCounter::new(
            "market_orders_completed_total",
            "Orders confirmed (manual and auto)",
        )?;
        registry.register(Box::new(orders_completed_total.clone()))?;

        let orders_auto_confirmed_total = IntCounter::new(
            "market_orders_auto_confirmed_total",
            "Confirmations performed by the auto-confirm sweep",
        )?;
        registry.register(Box::new(orders_auto_confirmed_total.clone()))?;

        let orders_refunded_total = IntCounter::new(
            "market_orders_refunded_total",
            "Approved refunds",
        )?;
        registry.register(Box::new(orders_refunded_total.clone()))?;

        let escrow_volume_total = Counter::new(
            "market_escrow_volume_total",
            "Sum of amounts frozen into escrow",
        )?;
        registry.register(Box::new(escrow_volume_total.clone()))?;

        let provinces_lit_total = IntCounter::new(
            "market_provinces_lit_total",
            "First-time province lightings",
        )?;
        registry.register(Box::new(provinces_lit_total.clone()))?;

        let title_promotions_total = IntCounter::new(
            "market_title_promotions_total",
            "Title level promotions",
        )?;
        registry.register(Box::new(title_promotions_total.clone()))?;

        let commit_duration = Histogram::with_opts(
            HistogramOpts::new(
                "market_unit_commit_duration_seconds",
                "Unit-of-work commit latency",
            )
            .buckets(vec![0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0]),
        )?;
        registry.register(Box::new(commit_duration.clone()))?;

        Ok(Self {
            orders_created_total,
            orders_completed_total,
            orders_auto_confirmed_total,
            orders_refunded_total,
            escrow_volume_total,
            provinces_lit_total,
            title_promotions_total,
            commit_duration,
            registry,
        })
    }

    /// Record a created order and the amount frozen for it
    pub fn record_order_created(&self, amount: f64) {
        self.orders_created_total.inc();
        self.escrow_volume_total.inc_by(amount);
    }

    /// Record a confirmed order
    pub fn record_order_completed(&self, auto: bool) {
        self.orders_completed_total.inc();
        if auto {
            self.orders_auto_confirmed_total.inc();
        }
    }

    /// Record an approved refund
    pub fn record_order_refunded(&self) {
        self.orders_refunded_total.inc();
    }

    /// Record a first-time province lighting
    pub fn record_province_lit(&self) {
        self.provinces_lit_total.inc();
    }

    /// Record a title promotion
    pub fn record_title_promotion(&self) {
        self.title_promotions_total.inc();
    }

    /// Record unit commit duration
    pub fn record_commit_duration(&self, duration_seconds: f64) {
        self.commit_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics")
    }
}

impl fmt::Debug for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metrics")
            .field("orders_created", &self.orders_created_total.get())
            .field("orders_completed", &self.orders_completed_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.orders_created_total.get(), 0);
        assert_eq!(metrics.orders_refunded_total.get(), 0);
    }

    #[test]
    fn test_independent_instances() {
        // Two engines in one process must not collide
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();

        first.record_order_created(40.0);
        assert_eq!(first.orders_created_total.get(), 1);
        assert_eq!(second.orders_created_total.get(), 0);
    }

    #[test]
    fn test_record_order_completed() {
        let metrics = Metrics::new().unwrap();

        metrics.record_order_completed(false);
        assert_eq!(metrics.orders_completed_total.get(), 1);
        assert_eq!(metrics.orders_auto_confirmed_total.get(), 0);

        metrics.record_order_completed(true);
        assert_eq!(metrics.orders_completed_total.get(), 2);
        assert_eq!(metrics.orders_auto_confirmed_total.get(), 1);
    }

    #[test]
    fn test_escrow_volume_accumulates() {
        let metrics = Metrics::new().unwrap();
        metrics.record_order_created(40.0);
        metrics.record_order_created(25.5);
        assert!((metrics.escrow_volume_total.get() - 65.5).abs() < f64::EPSILON);
    }
}
