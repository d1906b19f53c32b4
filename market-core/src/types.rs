//! Core types for the marketplace
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (Decimal for money)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account identifier (UUIDv7 for time-ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a fresh ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw bytes for storage keys
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Product identifier (UUIDv7 for time-ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Generate a fresh ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw bytes for storage keys
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order identifier (UUIDv7 for time-ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Generate a fresh ID
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Raw bytes for storage keys
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Province name, trimmed and non-empty
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Province(String);

impl Province {
    /// Create a validated province name
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::Validation(
                "province name must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Province {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketplace account with escrow-aware balances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Account ID
    pub account_id: AccountId,

    /// Display name
    pub display_name: String,

    /// Home province (optional profile field)
    pub home_province: Option<Province>,

    /// Spendable balance (exact decimal)
    pub available: Decimal,

    /// Balance held in escrow for in-flight orders
    pub frozen: Decimal,

    /// Number of distinct provinces this account has lit
    pub provinces_lit: u32,

    /// Current title level (starts at 1, never decreases)
    pub title_level: u8,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balances
    pub fn new(
        display_name: impl Into<String>,
        home_province: Option<Province>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id: AccountId::generate(),
            display_name: display_name.into(),
            home_province,
            available: Decimal::ZERO,
            frozen: Decimal::ZERO,
            provinces_lit: 0,
            title_level: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total of available and frozen funds
    pub fn total_balance(&self) -> Decimal {
        self.available + self.frozen
    }
}

/// Product listing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ProductStatus {
    /// Purchasable
    Listed = 1,
    /// Withdrawn by the seller
    Delisted = 2,
    /// Stock exhausted
    SoldOut = 3,
}

/// Product listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product ID
    pub product_id: ProductId,

    /// Selling account
    pub seller: AccountId,

    /// Listing title
    pub title: String,

    /// Unit price (exact decimal)
    pub price: Decimal,

    /// Province the listing is located in
    pub province: Province,

    /// Remaining stock
    pub stock: u32,

    /// Listing status
    pub status: ProductStatus,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new listed product
    pub fn new(
        seller: AccountId,
        title: impl Into<String>,
        price: Decimal,
        province: Province,
        stock: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id: ProductId::generate(),
            seller,
            title: title.into(),
            price,
            province,
            stock,
            status: ProductStatus::Listed,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the product can be purchased right now
    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Listed && self.stock > 0
    }

    /// Consume one unit of stock; flips to SoldOut at zero
    pub fn take_stock(&mut self, now: DateTime<Utc>) -> crate::Result<()> {
        if !self.is_available() {
            return Err(crate::Error::Precondition(format!(
                "product {} is not available",
                self.product_id
            )));
        }
        self.stock -= 1;
        if self.stock == 0 {
            self.status = ProductStatus::SoldOut;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Return one unit of stock; relists a SoldOut product
    pub fn restock(&mut self, now: DateTime<Utc>) {
        self.stock += 1;
        if self.status == ProductStatus::SoldOut {
            self.status = ProductStatus::Listed;
        }
        self.updated_at = now;
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    /// Created, funds not yet frozen
    PendingPayment = 1,
    /// Funds frozen in escrow
    Paid = 2,
    /// Seller handed the goods to a carrier
    Shipped = 3,
    /// Buyer confirmed receipt, funds released (terminal)
    Completed = 4,
    /// Abandoned before payment (terminal)
    Cancelled = 5,
    /// Buyer requested a refund, awaiting arbitration
    Refunding = 6,
    /// Refund approved, funds returned (terminal)
    Refunded = 7,
}

impl OrderStatus {
    /// Status byte used in index keys
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Check if the status admits no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// Allowed-transition table; all status changes are checked against it
    pub fn can_transition(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (PendingPayment, Paid)
                | (PendingPayment, Cancelled)
                | (Paid, Shipped)
                | (Paid, Refunding)
                | (Shipped, Completed)
                | (Shipped, Refunding)
                | (Refunding, Refunded)
                | (Refunding, Paid)
                | (Refunding, Shipped)
        )
    }

    /// Human-readable label for logs
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunding => "refunding",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Delivery address captured at order creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient name
    pub recipient: String,

    /// Contact phone
    pub phone: String,

    /// City (optional)
    pub city: Option<String>,

    /// Street-level detail
    pub detail: String,
}

impl ShippingAddress {
    /// Reject blank recipient or detail
    pub fn validate(&self) -> crate::Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(crate::Error::Validation(
                "shipping address recipient must not be empty".to_string(),
            ));
        }
        if self.detail.trim().is_empty() {
            return Err(crate::Error::Validation(
                "shipping address detail must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Escrow order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub order_id: OrderId,

    /// Human-facing order number, globally unique
    pub order_no: String,

    /// Purchased product
    pub product_id: ProductId,

    /// Buying account
    pub buyer: AccountId,

    /// Selling account
    pub seller: AccountId,

    /// Price snapshot at creation; immutable afterwards
    pub amount: Decimal,

    /// Current status
    pub status: OrderStatus,

    /// Delivery address
    pub shipping_address: ShippingAddress,

    /// Carrier tracking number (set at ship time)
    pub tracking_no: Option<String>,

    /// Carrier name (set at ship time)
    pub carrier: Option<String>,

    /// Seller's province, captured at ship time; drives map lighting
    pub seller_province: Option<Province>,

    /// Buyer's reason for requesting a refund
    pub refund_reason: Option<String>,

    /// Arbitration note recorded when a refund is decided
    pub arbitration_note: Option<String>,

    /// Whether the lighting pipeline already ran for this order
    pub map_lit_triggered: bool,

    /// Payment timestamp
    pub paid_at: Option<DateTime<Utc>>,

    /// Shipment timestamp
    pub shipped_at: Option<DateTime<Utc>>,

    /// Receipt confirmation timestamp
    pub confirmed_at: Option<DateTime<Utc>>,

    /// Deadline after which the sweep confirms on the buyer's behalf
    pub auto_confirm_due: Option<DateTime<Utc>>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in PendingPayment
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_no: impl Into<String>,
        product_id: ProductId,
        buyer: AccountId,
        seller: AccountId,
        amount: Decimal,
        shipping_address: ShippingAddress,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id: OrderId::generate(),
            order_no: order_no.into(),
            product_id,
            buyer,
            seller,
            amount,
            status: OrderStatus::PendingPayment,
            shipping_address,
            tracking_no: None,
            carrier: None,
            seller_province: None,
            refund_reason: None,
            arbitration_note: None,
            map_lit_triggered: false,
            paid_at: None,
            shipped_at: None,
            confirmed_at: None,
            auto_confirm_due: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, validated against the transition table
    pub fn transition(&mut self, to: OrderStatus, now: DateTime<Utc>) -> crate::Result<()> {
        if !self.status.can_transition(to) {
            return Err(crate::Error::Consistency(format!(
                "order {}: transition {} -> {} is not allowed",
                self.order_no, self.status, to
            )));
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

/// Canonical unordered account pair scoped to a province
///
/// The smaller UUID always comes first, so (a, b) and (b, a) map to the
/// same key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    /// Smaller account ID
    pub first: AccountId,

    /// Larger account ID
    pub second: AccountId,

    /// Province the reward applies to
    pub province: Province,
}

impl PairKey {
    /// Build the canonical key regardless of argument order
    pub fn canonical(a: AccountId, b: AccountId, province: Province) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self {
            first,
            second,
            province,
        }
    }

    /// Composite storage key bytes
    pub fn storage_key(&self) -> Vec<u8> {
        let province = self.province.as_str().as_bytes();
        let mut key = Vec::with_capacity(32 + province.len());
        key.extend_from_slice(self.first.as_bytes());
        key.extend_from_slice(self.second.as_bytes());
        key.extend_from_slice(province);
        key
    }
}

/// One-shot reward marker for an account pair in a province
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairLock {
    /// Smaller account ID
    pub first: AccountId,

    /// Larger account ID
    pub second: AccountId,

    /// Province the reward applies to
    pub province: Province,

    /// Whether the pair already produced a lighting reward (monotonic)
    pub rewarded: bool,

    /// Order that consumed the reward
    pub rewarded_by: Option<OrderId>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl PairLock {
    /// Create an unrewarded marker for the pair
    pub fn new(key: &PairKey, now: DateTime<Utc>) -> Self {
        Self {
            first: key.first,
            second: key.second,
            province: key.province.clone(),
            rewarded: false,
            rewarded_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Canonical key for this marker
    pub fn key(&self) -> PairKey {
        PairKey {
            first: self.first,
            second: self.second,
            province: self.province.clone(),
        }
    }

    /// Consume the one-shot reward; rejects a second consumption
    pub fn mark_rewarded(&mut self, order_id: OrderId, now: DateTime<Utc>) -> crate::Result<()> {
        if self.rewarded {
            return Err(crate::Error::Consistency(format!(
                "pair ({}, {}, {}) already rewarded",
                self.first, self.second, self.province
            )));
        }
        self.rewarded = true;
        self.rewarded_by = Some(order_id);
        self.updated_at = now;
        Ok(())
    }
}

/// Per-account, per-province lighting progress
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Footprint {
    /// Owning account
    pub account_id: AccountId,

    /// Province
    pub province: Province,

    /// Whether the province is lit on this account's map
    pub lit: bool,

    /// Number of qualifying rewards counted, including repeats once lit
    pub lit_count: u32,

    /// When the province first lit (set exactly once)
    pub first_lit_at: Option<DateTime<Utc>>,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Footprint {
    /// Create a footprint already lit by its first reward
    pub fn first(account_id: AccountId, province: Province, now: DateTime<Utc>) -> Self {
        Self {
            account_id,
            province,
            lit: true,
            lit_count: 1,
            first_lit_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Count a qualifying reward; returns true when the province newly lit
    pub fn record_reward(&mut self, now: DateTime<Utc>) -> bool {
        let newly_lit = !self.lit;
        if newly_lit {
            self.lit = true;
            self.first_lit_at = Some(now);
        }
        self.lit_count += 1;
        self.updated_at = now;
        newly_lit
    }
}

/// Static title reference row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Title {
    /// Title level (unique, ascending)
    pub level: u8,

    /// Display name
    pub name: String,

    /// Provinces that must be lit to hold this title
    pub required_provinces: u32,
}
