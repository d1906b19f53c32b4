//! Periodic auto-confirm sweep
//!
//! Scans shipped orders on an interval and confirms those past their
//! auto-confirm deadline on the buyer's behalf. The sweep goes through the
//! same confirmation path as manual receipt, so a buyer clicking confirm at
//! the same instant costs nothing: one of the two wins the row locks and the
//! other sees a completed order and backs off.

use crate::engine::OrderEngine;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Counters published by the sweep
#[derive(Debug, Clone, Default)]
pub struct SweepStats {
    /// Ticks executed
    pub ticks: u64,

    /// Orders confirmed across all ticks
    pub orders_confirmed: u64,

    /// Ticks that failed before finishing the scan
    pub failed_ticks: u64,

    /// Wall-clock time of the most recent tick
    pub last_tick_at: Option<DateTime<Utc>>,
}

/// Background task that auto-confirms overdue shipped orders
pub struct AutoConfirmSweep {
    engine: Arc<OrderEngine>,
    period: Duration,
    stats: RwLock<SweepStats>,
}

impl AutoConfirmSweep {
    /// Create a sweep over an engine with a fixed tick period
    pub fn new(engine: Arc<OrderEngine>, period: Duration) -> Self {
        Self {
            engine,
            period,
            stats: RwLock::new(SweepStats::default()),
        }
    }

    /// Spawn the sweep onto the runtime; abort the handle to stop it
    pub fn spawn(engine: Arc<OrderEngine>, period: Duration) -> (Arc<Self>, JoinHandle<()>) {
        let sweep = Arc::new(Self::new(engine, period));
        let handle = tokio::spawn(Arc::clone(&sweep).run());
        (sweep, handle)
    }

    /// Run the sweep loop forever
    pub async fn run(self: Arc<Self>) {
        tracing::info!(period_secs = self.period.as_secs(), "Auto-confirm sweep started");
        let mut ticker = interval(self.period);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// Execute one sweep pass
    pub async fn tick(&self) {
        match self.engine.auto_confirm_due().await {
            Ok(confirmed) => {
                if confirmed > 0 {
                    tracing::info!(confirmed, "Auto-confirm sweep confirmed overdue orders");
                }
                let mut stats = self.stats.write();
                stats.ticks += 1;
                stats.orders_confirmed += confirmed as u64;
                stats.last_tick_at = Some(Utc::now());
            }
            Err(err) => {
                tracing::warn!(%err, "Auto-confirm sweep tick failed");
                let mut stats = self.stats.write();
                stats.ticks += 1;
                stats.failed_ticks += 1;
                stats.last_tick_at = Some(Utc::now());
            }
        }

        // Locks accumulate one entry per distinct row; shed the idle ones
        self.engine.release_idle_locks();
    }

    /// Snapshot of the sweep counters
    pub fn stats(&self) -> SweepStats {
        self.stats.read().clone()
    }
}

impl fmt::Debug for AutoConfirmSweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoConfirmSweep")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{ListingRequest, Shipment};
    use market_core::{OrderStatus, Province, ShippingAddress};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient: "li hua".to_string(),
            phone: "13800000000".to_string(),
            city: Some("Kunming".to_string()),
            detail: "1 Dianchi Rd".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tick_confirms_overdue_orders() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            // Orders fall due the moment they ship
            auto_confirm_days: 0,
            ..Default::default()
        };
        let engine = Arc::new(OrderEngine::open(config).unwrap());

        let buyer = engine.directory().register("buyer", None, dec!(100)).unwrap();
        let seller = engine.directory().register("seller", None, dec!(0)).unwrap();
        let product = engine
            .catalog()
            .list_product(
                seller.account_id,
                ListingRequest {
                    title: "Pu'er tea cake".to_string(),
                    price: dec!(40),
                    province: Province::new("Yunnan").unwrap(),
                    stock: 1,
                },
            )
            .unwrap();

        let order = engine
            .create_order(buyer.account_id, product.product_id, address())
            .await
            .unwrap();
        engine
            .ship_order(
                order.order_id,
                seller.account_id,
                Shipment {
                    tracking_no: "SF100".to_string(),
                    carrier: "SF Express".to_string(),
                    province: Province::new("Yunnan").unwrap(),
                },
            )
            .await
            .unwrap();

        let sweep = AutoConfirmSweep::new(Arc::clone(&engine), Duration::from_secs(60));
        sweep.tick().await;

        let stats = sweep.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.orders_confirmed, 1);
        assert!(stats.last_tick_at.is_some());

        let confirmed = engine.order(&order.order_id).unwrap();
        assert_eq!(confirmed.status, OrderStatus::Completed);

        // Second tick finds nothing left to confirm
        sweep.tick().await;
        assert_eq!(sweep.stats().orders_confirmed, 1);
    }

    #[tokio::test]
    async fn test_tick_leaves_undue_orders_alone() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let engine = Arc::new(OrderEngine::open(config).unwrap());

        let buyer = engine.directory().register("buyer", None, dec!(100)).unwrap();
        let seller = engine.directory().register("seller", None, dec!(0)).unwrap();
        let product = engine
            .catalog()
            .list_product(
                seller.account_id,
                ListingRequest {
                    title: "Pu'er tea cake".to_string(),
                    price: dec!(40),
                    province: Province::new("Yunnan").unwrap(),
                    stock: 1,
                },
            )
            .unwrap();

        let order = engine
            .create_order(buyer.account_id, product.product_id, address())
            .await
            .unwrap();
        engine
            .ship_order(
                order.order_id,
                seller.account_id,
                Shipment {
                    tracking_no: "SF100".to_string(),
                    carrier: "SF Express".to_string(),
                    province: Province::new("Yunnan").unwrap(),
                },
            )
            .await
            .unwrap();

        let sweep = AutoConfirmSweep::new(Arc::clone(&engine), Duration::from_secs(60));
        sweep.tick().await;

        assert_eq!(sweep.stats().orders_confirmed, 0);
        let still_shipped = engine.order(&order.order_id).unwrap();
        assert_eq!(still_shipped.status, OrderStatus::Shipped);
    }
}
