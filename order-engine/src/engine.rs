//! Order lifecycle engine
//!
//! Drives escrow orders through their state machine: create freezes the
//! buyer's funds and takes stock, ship stamps carrier details and starts the
//! auto-confirm clock, confirm releases escrow and runs the map-lighting
//! pipeline, and the refund pair moves money back when arbitration approves.
//!
//! Every mutation re-reads its rows under held row locks and commits through
//! a single atomic unit of work, so concurrent calls against the same order
//! settle exactly once.
//!
//! # Example
//!
//! ```no_run
//! use order_engine::{EngineConfig, OrderEngine};
//!
//! # fn main() -> order_engine::Result<()> {
//! let engine = OrderEngine::open(EngineConfig::default())?;
//! let stats = engine.storage_stats()?;
//! println!("orders so far: {}", stats.total_orders);
//! # Ok(())
//! # }
//! ```

use crate::catalog::ProductCatalog;
use crate::config::EngineConfig;
use crate::directory::AccountDirectory;
use crate::lighting;
use crate::titles::TitleCatalog;
use crate::types::{LightingOutcome, MapProgress, OrderRole, Shipment};
use chrono::{Duration, Utc};
use market_core::{
    ledger, Account, AccountId, AuditEvent, AuditKind, Error, KeyedLocks, LockKey, Metrics, Order,
    OrderId, OrderStatus, PairKey, ProductId, Province, Result, ShippingAddress, Storage,
    StorageStats, Title, UnitOfWork,
};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Order-number allocation attempts before giving up
const ORDER_NO_ATTEMPTS: u32 = 5;

/// The marketplace order engine
pub struct OrderEngine {
    storage: Arc<Storage>,
    locks: Arc<KeyedLocks>,
    catalog: ProductCatalog,
    directory: AccountDirectory,
    titles: TitleCatalog,
    metrics: Metrics,
    config: EngineConfig,
}

impl OrderEngine {
    /// Open the engine, creating the store and seeding the title catalog on
    /// first run
    pub fn open(config: EngineConfig) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.core_config())?);
        let titles = TitleCatalog::open(&storage, &config.titles)?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("failed to build metrics registry: {}", e)))?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            order_no_prefix = %config.order_no_prefix,
            auto_confirm_days = config.auto_confirm_days,
            titles = titles.all().len(),
            "Order engine opened"
        );

        Ok(Self {
            catalog: ProductCatalog::new(Arc::clone(&storage)),
            directory: AccountDirectory::new(Arc::clone(&storage)),
            locks: Arc::new(KeyedLocks::new()),
            storage,
            titles,
            metrics,
            config,
        })
    }

    /// Product listing and lookup
    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Account registration and lookup
    pub fn directory(&self) -> &AccountDirectory {
        &self.directory
    }

    /// The title catalog, level ascending
    pub fn titles(&self) -> &[Title] {
        self.titles.all()
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drop row-lock entries that no task currently holds
    pub fn release_idle_locks(&self) {
        self.locks.release_idle();
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Create an order: freeze the price into escrow, take one unit of
    /// stock, and persist the order as paid.
    ///
    /// The order number is allocated under its own row lock; an allocation
    /// that collides with an existing number is retried with fresh
    /// randomness.
    pub async fn create_order(
        &self,
        buyer_id: AccountId,
        product_id: ProductId,
        shipping_address: ShippingAddress,
    ) -> Result<Order> {
        shipping_address.validate()?;

        for attempt in 1..=ORDER_NO_ATTEMPTS {
            let order_no = self.generate_order_no();
            let _locks = self
                .locks
                .acquire(vec![
                    LockKey::Account(buyer_id),
                    LockKey::Product(product_id),
                    LockKey::OrderNo(order_no.clone()),
                ])
                .await;

            if self.storage.order_no_exists(&order_no)? {
                tracing::debug!(%order_no, attempt, "Order number collision, regenerating");
                continue;
            }

            return self.create_order_locked(buyer_id, product_id, &shipping_address, order_no);
        }

        Err(Error::Storage(format!(
            "could not allocate a unique order number in {} attempts",
            ORDER_NO_ATTEMPTS
        )))
    }

    fn create_order_locked(
        &self,
        buyer_id: AccountId,
        product_id: ProductId,
        shipping_address: &ShippingAddress,
        order_no: String,
    ) -> Result<Order> {
        let now = Utc::now();

        let mut product = self.storage.get_product(&product_id)?;
        if !product.is_available() {
            return Err(Error::Precondition(format!(
                "product {} is not available",
                product_id
            )));
        }
        if product.seller == buyer_id {
            return Err(Error::Precondition(
                "buyer and seller must be different accounts".to_string(),
            ));
        }
        let mut buyer = self.storage.get_account(&buyer_id)?;

        let mut order = Order::new(
            order_no,
            product_id,
            buyer_id,
            product.seller,
            product.price,
            shipping_address.clone(),
            now,
        );

        let mut unit = self.storage.begin_unit();
        ledger::freeze(&mut unit, &mut buyer, order.amount, order.order_id, now)?;
        product.take_stock(now)?;
        unit.stage_product(&product)?;

        order.transition(OrderStatus::Paid, now)?;
        order.paid_at = Some(now);
        unit.stage_order_new(&order)?;
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::OrderCreated {
                buyer: order.buyer,
                seller: order.seller,
                amount: order.amount,
            },
            now,
        ))?;
        self.commit(unit)?;

        self.metrics
            .record_order_created(order.amount.to_f64().unwrap_or(0.0));
        tracing::info!(
            order_no = %order.order_no,
            buyer = %order.buyer,
            seller = %order.seller,
            amount = %order.amount,
            "Order created, funds in escrow"
        );
        Ok(order)
    }

    /// Ship a paid order: record carrier details, capture the seller's
    /// province, and start the auto-confirm clock
    pub async fn ship_order(
        &self,
        order_id: OrderId,
        seller_id: AccountId,
        shipment: Shipment,
    ) -> Result<Order> {
        shipment.validate()?;

        let _locks = self.locks.acquire(vec![LockKey::Order(order_id)]).await;
        let now = Utc::now();

        let mut order = self.storage.get_order(&order_id)?;
        if order.seller != seller_id {
            return Err(Error::Precondition(format!(
                "order {} does not belong to seller {}",
                order.order_no, seller_id
            )));
        }
        if order.status != OrderStatus::Paid {
            return Err(Error::Precondition(format!(
                "order {} cannot ship from status {}",
                order.order_no, order.status
            )));
        }

        let previous = order.status;
        order.transition(OrderStatus::Shipped, now)?;
        order.shipped_at = Some(now);
        order.tracking_no = Some(shipment.tracking_no.clone());
        order.carrier = Some(shipment.carrier.clone());
        order.seller_province = Some(shipment.province.clone());
        order.auto_confirm_due = Some(now + Duration::days(self.config.auto_confirm_days));

        let mut unit = self.storage.begin_unit();
        unit.stage_order(&order, previous)?;
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::OrderShipped {
                tracking_no: shipment.tracking_no,
                province: shipment.province,
            },
            now,
        ))?;
        self.commit(unit)?;

        tracing::info!(
            order_no = %order.order_no,
            tracking_no = %order.tracking_no.as_deref().unwrap_or(""),
            province = %order.seller_province.as_ref().map(|p| p.as_str()).unwrap_or(""),
            "Order shipped"
        );
        Ok(order)
    }

    /// Confirm receipt as the buyer: release escrow to the seller and run
    /// the lighting pipeline once
    pub async fn confirm_receipt(&self, order_id: OrderId, buyer_id: AccountId) -> Result<Order> {
        self.confirm(order_id, buyer_id, false).await
    }

    /// Confirm every shipped order whose auto-confirm deadline has passed,
    /// acting on the buyer's behalf. Returns the number confirmed.
    ///
    /// Each order is handled independently; an order that was manually
    /// confirmed or moved into a refund since the scan is skipped.
    pub async fn auto_confirm_due(&self) -> Result<usize> {
        let now = Utc::now();
        let shipped = self.storage.orders_with_status(OrderStatus::Shipped)?;

        let mut confirmed = 0;
        for order in shipped {
            let due = order.auto_confirm_due.map_or(false, |t| t <= now);
            if !due {
                continue;
            }
            match self.confirm(order.order_id, order.buyer, true).await {
                Ok(_) => confirmed += 1,
                Err(err) if err.is_client_error() => {
                    tracing::debug!(order_no = %order.order_no, %err, "Auto-confirm skipped");
                }
                Err(err) => {
                    tracing::warn!(order_no = %order.order_no, %err, "Auto-confirm failed");
                }
            }
        }
        Ok(confirmed)
    }

    async fn confirm(&self, order_id: OrderId, buyer_id: AccountId, auto: bool) -> Result<Order> {
        // The lock set depends on fields read from the order, so preview it,
        // lock, and re-read. The seller province is written exactly once (at
        // ship time), so a stale preview retries at most once.
        loop {
            let preview = self.storage.get_order(&order_id)?;
            let mut keys = vec![
                LockKey::Order(order_id),
                LockKey::Account(preview.buyer),
                LockKey::Account(preview.seller),
            ];
            if let Some(province) = preview.seller_province.clone() {
                keys.push(LockKey::Pair(PairKey::canonical(
                    preview.buyer,
                    preview.seller,
                    province,
                )));
            }
            let _locks = self.locks.acquire(keys).await;

            let order = self.storage.get_order(&order_id)?;
            if order.seller_province != preview.seller_province {
                continue;
            }
            return self.confirm_locked(order, buyer_id, auto);
        }
    }

    fn confirm_locked(&self, mut order: Order, buyer_id: AccountId, auto: bool) -> Result<Order> {
        let now = Utc::now();

        if order.buyer != buyer_id {
            return Err(Error::Precondition(format!(
                "order {} does not belong to buyer {}",
                order.order_no, buyer_id
            )));
        }
        if order.status != OrderStatus::Shipped {
            return Err(Error::Precondition(format!(
                "order {} cannot be confirmed from status {}",
                order.order_no, order.status
            )));
        }

        let mut buyer = self.storage.get_account(&order.buyer)?;
        let mut seller = self.storage.get_account(&order.seller)?;

        let previous = order.status;
        order.transition(OrderStatus::Completed, now)?;
        order.confirmed_at = Some(now);

        let mut unit = self.storage.begin_unit();
        ledger::release(&mut unit, &mut buyer, &mut seller, order.amount, order.order_id, now)?;

        let mut outcome = LightingOutcome::default();
        if !order.map_lit_triggered {
            if let Some(province) = order.seller_province.clone() {
                outcome = lighting::apply(
                    &self.storage,
                    &mut unit,
                    &mut buyer,
                    order.seller,
                    &province,
                    order.order_id,
                    self.titles.all(),
                    now,
                )?;
                order.map_lit_triggered = true;
            }
        }

        unit.stage_order(&order, previous)?;
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::OrderCompleted { auto },
            now,
        ))?;
        self.commit(unit)?;

        self.metrics.record_order_completed(auto);
        if outcome.newly_lit {
            self.metrics.record_province_lit();
        }
        if outcome.promoted_to.is_some() {
            self.metrics.record_title_promotion();
        }
        tracing::info!(
            order_no = %order.order_no,
            auto,
            rewarded = outcome.rewarded,
            newly_lit = outcome.newly_lit,
            promoted_to = outcome.promoted_to,
            "Order completed, escrow released"
        );
        Ok(order)
    }

    /// Request a refund as the buyer of a paid or shipped order
    pub async fn request_refund(
        &self,
        order_id: OrderId,
        buyer_id: AccountId,
        reason: &str,
    ) -> Result<Order> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::Validation(
                "refund reason must not be empty".to_string(),
            ));
        }

        let _locks = self.locks.acquire(vec![LockKey::Order(order_id)]).await;
        let now = Utc::now();

        let mut order = self.storage.get_order(&order_id)?;
        if order.buyer != buyer_id {
            return Err(Error::Precondition(format!(
                "only the buyer may request a refund for order {}",
                order.order_no
            )));
        }
        if order.status != OrderStatus::Paid && order.status != OrderStatus::Shipped {
            return Err(Error::Precondition(format!(
                "order {} cannot enter refund from status {}",
                order.order_no, order.status
            )));
        }

        let previous = order.status;
        order.transition(OrderStatus::Refunding, now)?;
        order.refund_reason = Some(reason.to_string());

        let mut unit = self.storage.begin_unit();
        unit.stage_order(&order, previous)?;
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::RefundRequested {
                reason: reason.to_string(),
            },
            now,
        ))?;
        self.commit(unit)?;

        tracing::info!(order_no = %order.order_no, reason, "Refund requested");
        Ok(order)
    }

    /// Arbitrate a pending refund.
    ///
    /// Approval returns the escrowed amount to the buyer, restocks the
    /// product, and terminates the order. Rejection resumes the order where
    /// it left off: shipped orders go back to shipped, unshipped to paid.
    /// The arbitration note is recorded either way.
    pub async fn process_refund(
        &self,
        order_id: OrderId,
        approved: bool,
        note: &str,
    ) -> Result<Order> {
        let preview = self.storage.get_order(&order_id)?;
        let _locks = self
            .locks
            .acquire(vec![
                LockKey::Order(order_id),
                LockKey::Account(preview.buyer),
                LockKey::Product(preview.product_id),
            ])
            .await;
        let now = Utc::now();

        let mut order = self.storage.get_order(&order_id)?;
        if order.status != OrderStatus::Refunding {
            return Err(Error::Precondition(format!(
                "order {} is not awaiting refund arbitration",
                order.order_no
            )));
        }

        let previous = order.status;
        order.arbitration_note = Some(note.to_string());

        let mut unit = self.storage.begin_unit();
        if approved {
            let mut buyer = self.storage.get_account(&order.buyer)?;
            ledger::refund(&mut unit, &mut buyer, order.amount, order.order_id, now)?;
            order.transition(OrderStatus::Refunded, now)?;

            let mut product = self.storage.get_product(&order.product_id)?;
            product.restock(now);
            unit.stage_product(&product)?;
            unit.stage_audit(&AuditEvent::for_order(
                order.order_id,
                AuditKind::RefundApproved,
                now,
            ))?;
        } else {
            let resumed = if order.shipped_at.is_some() {
                OrderStatus::Shipped
            } else {
                OrderStatus::Paid
            };
            order.transition(resumed, now)?;
            unit.stage_audit(&AuditEvent::for_order(
                order.order_id,
                AuditKind::RefundRejected,
                now,
            ))?;
        }
        unit.stage_order(&order, previous)?;
        self.commit(unit)?;

        if approved {
            self.metrics.record_order_refunded();
        }
        tracing::info!(
            order_no = %order.order_no,
            approved,
            status = %order.status,
            "Refund arbitrated"
        );
        Ok(order)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Fetch an order by ID
    pub fn order(&self, order_id: &OrderId) -> Result<Order> {
        self.storage.get_order(order_id)
    }

    /// Fetch an order by its human-facing number
    pub fn order_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        self.storage.get_order_by_no(order_no)
    }

    /// Orders an account participates in, newest first
    pub fn orders_for(&self, account_id: &AccountId, role: OrderRole) -> Result<Vec<Order>> {
        let mut orders = match role {
            OrderRole::Buyer => self.storage.orders_for_buyer(account_id)?,
            OrderRole::Seller => self.storage.orders_for_seller(account_id)?,
        };
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    /// Audit trail for one order, oldest first
    pub fn order_audit(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>> {
        self.storage.order_audit(order_id)
    }

    /// Fetch an account by ID
    pub fn account(&self, account_id: &AccountId) -> Result<Account> {
        self.storage.get_account(account_id)
    }

    /// Available and frozen balances for an account
    pub fn balance(&self, account_id: &AccountId) -> Result<(Decimal, Decimal)> {
        let account = self.storage.get_account(account_id)?;
        Ok((account.available, account.frozen))
    }

    /// Map progress for an account: lit provinces, current and next title,
    /// and percentage toward the next threshold
    pub fn map_progress(&self, account_id: &AccountId) -> Result<MapProgress> {
        let account = self.storage.get_account(account_id)?;

        let mut footprints = self.storage.footprints_for(account_id)?;
        footprints.retain(|f| f.lit);
        footprints.sort_by_key(|f| f.first_lit_at);

        let current_title = self.titles.by_level(account.title_level).cloned();
        let next_title = self.titles.next_after(account.title_level).cloned();
        let progress_pct = match &next_title {
            Some(next) if next.required_provinces > 0 => {
                let pct = account.provinces_lit as f64 / next.required_provinces as f64 * 100.0;
                pct.min(100.0)
            }
            _ => 0.0,
        };

        Ok(MapProgress {
            provinces_lit: account.provinces_lit,
            title_level: account.title_level,
            current_title,
            next_title,
            progress_pct,
            footprints,
        })
    }

    /// Provinces an account has lit, oldest first
    pub fn lit_provinces(&self, account_id: &AccountId) -> Result<Vec<Province>> {
        Ok(self
            .map_progress(account_id)?
            .footprints
            .into_iter()
            .map(|f| f.province)
            .collect())
    }

    /// Row counts for the underlying store
    pub fn storage_stats(&self) -> Result<StorageStats> {
        self.storage.get_stats()
    }

    // ------------------------------------------------------------------

    fn commit(&self, unit: UnitOfWork<'_>) -> Result<()> {
        let started = Instant::now();
        unit.commit()?;
        self.metrics
            .record_commit_duration(started.elapsed().as_secs_f64());
        Ok(())
    }

    fn generate_order_no(&self) -> String {
        let millis = Utc::now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{}{}{:06}", self.config.order_no_prefix, millis, suffix)
    }
}

impl fmt::Debug for OrderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
