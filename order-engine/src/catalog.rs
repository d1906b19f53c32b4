//! Product catalog

use crate::types::{ListingRequest, ProductFilter};
use market_core::{AccountId, Product, ProductId, Result, Storage};
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// Listing and lookup for products
#[derive(Clone)]
pub struct ProductCatalog {
    storage: Arc<Storage>,
}

impl ProductCatalog {
    pub(crate) fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// List a new product for a seller
    pub fn list_product(&self, seller: AccountId, request: ListingRequest) -> Result<Product> {
        if request.title.trim().is_empty() {
            return Err(market_core::Error::Validation(
                "product title must not be empty".to_string(),
            ));
        }
        if request.price <= Decimal::ZERO {
            return Err(market_core::Error::Validation(format!(
                "product price must be positive, got {}",
                request.price
            )));
        }
        if request.stock == 0 {
            return Err(market_core::Error::Validation(
                "product stock must be at least 1".to_string(),
            ));
        }
        // Fails with AccountNotFound for unknown sellers
        self.storage.get_account(&seller)?;

        let product = Product::new(
            seller,
            request.title,
            request.price,
            request.province,
            request.stock,
            Utc::now(),
        );

        let mut unit = self.storage.begin_unit();
        unit.stage_product(&product)?;
        unit.commit()?;

        tracing::info!(
            product = %product.product_id,
            seller = %seller,
            price = %product.price,
            stock = product.stock,
            province = %product.province,
            "Product listed"
        );
        Ok(product)
    }

    /// Fetch a product by ID
    pub fn get(&self, product_id: &ProductId) -> Result<Product> {
        self.storage.get_product(product_id)
    }

    /// Fetch a product, requiring it to be purchasable
    pub fn get_available(&self, product_id: &ProductId) -> Result<Product> {
        let product = self.storage.get_product(product_id)?;
        if !product.is_available() {
            return Err(market_core::Error::Precondition(format!(
                "product {} is not available",
                product_id
            )));
        }
        Ok(product)
    }

    /// All products matching the filter
    pub fn products(&self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut products = self.storage.products()?;
        products.retain(|p| {
            filter.province.as_ref().map_or(true, |v| &p.province == v)
                && filter.status.map_or(true, |v| p.status == v)
                && filter.seller.map_or(true, |v| p.seller == v)
        });
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }
}

impl fmt::Debug for ProductCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductCatalog").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{Account, Config, Province};
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Arc<Storage>, Account) {
        let dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let storage = Arc::new(Storage::open(&config).unwrap());
        let seller = Account::new("seller", None, Utc::now());
        let mut unit = storage.begin_unit();
        unit.stage_account(&seller).unwrap();
        unit.commit().unwrap();
        (dir, storage, seller)
    }

    fn listing(province: &str) -> ListingRequest {
        ListingRequest {
            title: "Pu'er tea cake".to_string(),
            price: dec!(40.00),
            province: Province::new(province).unwrap(),
            stock: 3,
        }
    }

    #[test]
    fn test_list_and_fetch_product() {
        let (_dir, storage, seller) = setup();
        let catalog = ProductCatalog::new(Arc::clone(&storage));

        let product = catalog
            .list_product(seller.account_id, listing("Yunnan"))
            .unwrap();
        let fetched = catalog.get_available(&product.product_id).unwrap();
        assert_eq!(fetched.stock, 3);
        assert_eq!(fetched.price, dec!(40.00));
    }

    #[test]
    fn test_listing_validation() {
        let (_dir, storage, seller) = setup();
        let catalog = ProductCatalog::new(storage);

        let mut bad_price = listing("Yunnan");
        bad_price.price = dec!(0);
        assert!(catalog.list_product(seller.account_id, bad_price).is_err());

        let mut no_stock = listing("Yunnan");
        no_stock.stock = 0;
        assert!(catalog.list_product(seller.account_id, no_stock).is_err());

        let mut blank = listing("Yunnan");
        blank.title = "  ".to_string();
        assert!(catalog.list_product(seller.account_id, blank).is_err());
    }

    #[test]
    fn test_unknown_seller_rejected() {
        let (_dir, storage, _seller) = setup();
        let catalog = ProductCatalog::new(storage);

        let ghost = AccountId::generate();
        let result = catalog.list_product(ghost, listing("Yunnan"));
        assert!(matches!(
            result,
            Err(market_core::Error::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_filter_by_province() {
        let (_dir, storage, seller) = setup();
        let catalog = ProductCatalog::new(storage);

        catalog
            .list_product(seller.account_id, listing("Yunnan"))
            .unwrap();
        catalog
            .list_product(seller.account_id, listing("Hainan"))
            .unwrap();

        let all = catalog.products(&ProductFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let filter = ProductFilter {
            province: Some(Province::new("Yunnan").unwrap()),
            ..Default::default()
        };
        let yunnan = catalog.products(&filter).unwrap();
        assert_eq!(yunnan.len(), 1);
        assert_eq!(yunnan[0].province.as_str(), "Yunnan");
    }
}
