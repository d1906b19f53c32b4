//! Request and response types for the order engine

use market_core::{AccountId, Footprint, ProductStatus, Province, Result, Title};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A new listing submitted by a seller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRequest {
    /// Listing title
    pub title: String,

    /// Unit price
    pub price: Decimal,

    /// Province the product ships from
    pub province: Province,

    /// Units available
    pub stock: u32,
}

/// Filter for product listings; empty filter matches everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProductFilter {
    /// Only products shipping from this province
    pub province: Option<Province>,

    /// Only products in this status
    pub status: Option<ProductStatus>,

    /// Only products listed by this seller
    pub seller: Option<AccountId>,
}

/// Shipment details recorded when a seller ships an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    /// Carrier tracking number
    pub tracking_no: String,

    /// Carrier name
    pub carrier: String,

    /// Province the parcel ships from; drives map lighting on confirmation
    pub province: Province,
}

impl Shipment {
    /// Validate shipment fields
    pub fn validate(&self) -> Result<()> {
        if self.tracking_no.trim().is_empty() {
            return Err(market_core::Error::Validation(
                "tracking number must not be empty".to_string(),
            ));
        }
        if self.carrier.trim().is_empty() {
            return Err(market_core::Error::Validation(
                "carrier must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which side of an order an account is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    /// Orders the account placed
    Buyer,
    /// Orders the account sold
    Seller,
}

/// What the map-lighting pipeline did during one confirmation
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LightingOutcome {
    /// The buyer-seller-province pair was rewarded for the first time
    pub rewarded: bool,

    /// The buyer lit this province for the first time
    pub newly_lit: bool,

    /// Title level reached, if the confirmation promoted the buyer
    pub promoted_to: Option<u8>,
}

/// A buyer's map progress snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapProgress {
    /// Distinct provinces lit
    pub provinces_lit: u32,

    /// Current title level
    pub title_level: u8,

    /// Current title, if the catalog defines one at this level
    pub current_title: Option<Title>,

    /// Next title to chase, if any remains
    pub next_title: Option<Title>,

    /// Percentage toward the next title, capped at 100; zero at the top level
    pub progress_pct: f64,

    /// Lit footprints, oldest first
    pub footprints: Vec<Footprint>,
}
