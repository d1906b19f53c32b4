//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `accounts` - Account rows (key: account_id)
//! - `products` - Product listings (key: product_id)
//! - `orders` - Order rows (key: order_id)
//! - `pair_locks` - Anti-fraud pair markers (key: first || second || province)
//! - `footprints` - Per-account province progress (key: account_id || province)
//! - `titles` - Title reference rows (key: level)
//! - `audit` - Append-only audit log (key: event_id)
//! - `indices` - Secondary indices for fast lookups
//!
//! All multi-entity mutations go through [`UnitOfWork`], which stages writes
//! into a single `WriteBatch` and commits them atomically. Nothing staged is
//! visible until `commit`.

use crate::{
    audit::AuditEvent,
    error::{Error, Result},
    types::{
        Account, AccountId, Footprint, Order, OrderId, OrderStatus, PairKey, PairLock, Product,
        ProductId, Province, Title,
    },
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options,
    WriteBatch, DB,
};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ACCOUNTS: &str = "accounts";
const CF_PRODUCTS: &str = "products";
const CF_ORDERS: &str = "orders";
const CF_PAIR_LOCKS: &str = "pair_locks";
const CF_FOOTPRINTS: &str = "footprints";
const CF_TITLES: &str = "titles";
const CF_AUDIT: &str = "audit";
const CF_INDICES: &str = "indices";

/// Index key tags (CF_INDICES holds several index kinds side by side)
const IDX_ORDER_NO: &[u8] = b"no:";
const IDX_BUYER_ORDER: &[u8] = b"ob:";
const IDX_SELLER_ORDER: &[u8] = b"os:";
const IDX_STATUS_ORDER: &[u8] = b"st:";
const IDX_ORDER_AUDIT: &[u8] = b"oa:";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
    // Column family handles are stored in DB, accessed by name
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        // Enable statistics
        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_ACCOUNTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_PRODUCTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_ORDERS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_PAIR_LOCKS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_FOOTPRINTS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_TITLES, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_AUDIT, Self::cf_options_audit()),
            ColumnFamilyDescriptor::new(CF_INDICES, Self::cf_options_indices()),
        ];

        // Open database
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?} with 8 column families", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Row CFs are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_audit() -> Options {
        let mut opts = Options::default();
        // Append-only log, written once and rarely read
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_indices() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Indices benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Begin an atomic unit of work
    pub fn begin_unit(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            storage: self,
            batch: WriteBatch::default(),
            staged: 0,
        }
    }

    // Account operations

    /// Get account by ID
    pub fn get_account(&self, account_id: &AccountId) -> Result<Account> {
        self.read(CF_ACCOUNTS, account_id.as_bytes())?
            .ok_or(Error::AccountNotFound(*account_id))
    }

    // Product operations

    /// Get product by ID
    pub fn get_product(&self, product_id: &ProductId) -> Result<Product> {
        self.read(CF_PRODUCTS, product_id.as_bytes())?
            .ok_or(Error::ProductNotFound(*product_id))
    }

    /// Scan all products
    pub fn products(&self) -> Result<Vec<Product>> {
        let cf = self.cf_handle(CF_PRODUCTS)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut products = Vec::new();
        for item in iter {
            let (_, value) = item?;
            products.push(bincode::deserialize(&value)?);
        }

        Ok(products)
    }

    // Order operations

    /// Get order by ID
    pub fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        self.read(CF_ORDERS, order_id.as_bytes())?
            .ok_or(Error::OrderNotFound(*order_id))
    }

    /// Resolve an order number to its order ID
    pub fn order_id_by_no(&self, order_no: &str) -> Result<Option<OrderId>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let key = Self::index_key_order_no(order_no);

        match self.db.get_cf(&cf, &key)? {
            Some(value) => {
                let bytes: [u8; 16] = value.as_slice().try_into().map_err(|_| {
                    Error::Storage(format!("corrupt order-no index for {}", order_no))
                })?;
                Ok(Some(OrderId::from_uuid(Uuid::from_bytes(bytes))))
            }
            None => Ok(None),
        }
    }

    /// Whether an order number is already taken
    pub fn order_no_exists(&self, order_no: &str) -> Result<bool> {
        Ok(self.order_id_by_no(order_no)?.is_some())
    }

    /// Get order by its human-facing number
    pub fn get_order_by_no(&self, order_no: &str) -> Result<Option<Order>> {
        match self.order_id_by_no(order_no)? {
            Some(order_id) => Ok(Some(self.get_order(&order_id)?)),
            None => Ok(None),
        }
    }

    /// Orders where the account is the buyer
    pub fn orders_for_buyer(&self, buyer: &AccountId) -> Result<Vec<Order>> {
        let prefix = Self::index_key_buyer_order(buyer, None);
        self.orders_by_index_prefix(&prefix)
    }

    /// Orders where the account is the seller
    pub fn orders_for_seller(&self, seller: &AccountId) -> Result<Vec<Order>> {
        let prefix = Self::index_key_seller_order(seller, None);
        self.orders_by_index_prefix(&prefix)
    }

    /// Orders currently in the given status (via the maintained status index)
    pub fn orders_with_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let prefix = Self::index_key_status_order(status, None);
        self.orders_by_index_prefix(&prefix)
    }

    fn orders_by_index_prefix(&self, prefix: &[u8]) -> Result<Vec<Order>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let iter = self.db.prefix_iterator_cf(&cf, prefix);

        let mut orders = Vec::new();
        for item in iter {
            let (key, _) = item?;

            // The iterator does not stop at the prefix boundary on its own
            if !key.starts_with(prefix) {
                break;
            }

            // Order ID is the 16-byte suffix
            if key.len() == prefix.len() + 16 {
                let bytes: [u8; 16] = key[prefix.len()..].try_into().map_err(|_| {
                    Error::Storage("corrupt order index key".to_string())
                })?;
                let order_id = OrderId::from_uuid(Uuid::from_bytes(bytes));
                orders.push(self.get_order(&order_id)?);
            }
        }

        Ok(orders)
    }

    // Pair lock operations

    /// Look up the anti-fraud marker for a canonical pair
    pub fn find_pair_lock(&self, key: &PairKey) -> Result<Option<PairLock>> {
        self.read(CF_PAIR_LOCKS, &key.storage_key())
    }

    // Footprint operations

    /// Look up one footprint row
    pub fn find_footprint(
        &self,
        account_id: &AccountId,
        province: &Province,
    ) -> Result<Option<Footprint>> {
        self.read(CF_FOOTPRINTS, &Self::footprint_key(account_id, province))
    }

    /// All footprints for an account
    pub fn footprints_for(&self, account_id: &AccountId) -> Result<Vec<Footprint>> {
        let cf = self.cf_handle(CF_FOOTPRINTS)?;
        let prefix = account_id.as_bytes();
        let iter = self.db.prefix_iterator_cf(&cf, prefix);

        let mut footprints = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            footprints.push(bincode::deserialize(&value)?);
        }

        Ok(footprints)
    }

    // Title operations

    /// All title rows, ordered by level
    pub fn titles(&self) -> Result<Vec<Title>> {
        let cf = self.cf_handle(CF_TITLES)?;
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        let mut titles = Vec::new();
        for item in iter {
            let (_, value) = item?;
            titles.push(bincode::deserialize(&value)?);
        }

        Ok(titles)
    }

    // Audit operations

    /// Audit trail for one order, oldest first (event IDs are UUIDv7)
    pub fn order_audit(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>> {
        let cf = self.cf_handle(CF_INDICES)?;
        let prefix = Self::index_key_order_audit(order_id, None);
        let iter = self.db.prefix_iterator_cf(&cf, &prefix);

        let mut events = Vec::new();
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            if key.len() == prefix.len() + 16 {
                let bytes: [u8; 16] = key[prefix.len()..].try_into().map_err(|_| {
                    Error::Storage("corrupt audit index key".to_string())
                })?;
                let event_id = Uuid::from_bytes(bytes);
                if let Some(event) = self.read::<AuditEvent>(CF_AUDIT, event_id.as_bytes())? {
                    events.push(event);
                }
            }
        }

        Ok(events)
    }

    // Index key helpers

    fn index_key_order_no(order_no: &str) -> Vec<u8> {
        let mut key = IDX_ORDER_NO.to_vec();
        key.extend_from_slice(order_no.as_bytes());
        key
    }

    fn index_key_buyer_order(buyer: &AccountId, order_id: Option<&OrderId>) -> Vec<u8> {
        let mut key = IDX_BUYER_ORDER.to_vec();
        key.extend_from_slice(buyer.as_bytes());
        if let Some(oid) = order_id {
            key.extend_from_slice(oid.as_bytes());
        }
        key
    }

    fn index_key_seller_order(seller: &AccountId, order_id: Option<&OrderId>) -> Vec<u8> {
        let mut key = IDX_SELLER_ORDER.to_vec();
        key.extend_from_slice(seller.as_bytes());
        if let Some(oid) = order_id {
            key.extend_from_slice(oid.as_bytes());
        }
        key
    }

    fn index_key_status_order(status: OrderStatus, order_id: Option<&OrderId>) -> Vec<u8> {
        let mut key = IDX_STATUS_ORDER.to_vec();
        key.push(status.as_byte());
        if let Some(oid) = order_id {
            key.extend_from_slice(oid.as_bytes());
        }
        key
    }

    fn index_key_order_audit(order_id: &OrderId, event_id: Option<Uuid>) -> Vec<u8> {
        let mut key = IDX_ORDER_AUDIT.to_vec();
        key.extend_from_slice(order_id.as_bytes());
        if let Some(eid) = event_id {
            key.extend_from_slice(eid.as_bytes());
        }
        key
    }

    fn footprint_key(account_id: &AccountId, province: &Province) -> Vec<u8> {
        let mut key = account_id.as_bytes().to_vec();
        key.extend_from_slice(province.as_str().as_bytes());
        key
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            total_accounts: self.approximate_count(CF_ACCOUNTS)?,
            total_products: self.approximate_count(CF_PRODUCTS)?,
            total_orders: self.approximate_count(CF_ORDERS)?,
            total_audit_events: self.approximate_count(CF_AUDIT)?,
        })
    }

    fn approximate_count(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf_handle(cf_name)?;
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(&cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate account rows
    pub total_accounts: u64,
    /// Approximate product rows
    pub total_products: u64,
    /// Approximate order rows
    pub total_orders: u64,
    /// Approximate audit events
    pub total_audit_events: u64,
}

/// Atomic unit of work over a `WriteBatch`
///
/// Stage every mutation of one operation, then `commit` exactly once. A
/// dropped unit leaves no trace. Staging the same key twice is allowed; the
/// last staged value wins, so each component stages what it mutated without
/// coordinating.
pub struct UnitOfWork<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
    staged: usize,
}

impl UnitOfWork<'_> {
    /// Stage an account row
    pub fn stage_account(&mut self, account: &Account) -> Result<()> {
        let cf = self.storage.cf_handle(CF_ACCOUNTS)?;
        let value = bincode::serialize(account)?;
        self.batch.put_cf(&cf, account.account_id.as_bytes(), &value);
        self.staged += 1;
        Ok(())
    }

    /// Stage a product row
    pub fn stage_product(&mut self, product: &Product) -> Result<()> {
        let cf = self.storage.cf_handle(CF_PRODUCTS)?;
        let value = bincode::serialize(product)?;
        self.batch.put_cf(&cf, product.product_id.as_bytes(), &value);
        self.staged += 1;
        Ok(())
    }

    /// Stage a brand-new order: row, number index, party indices, status index
    ///
    /// The order-number index entry is the storage-level uniqueness
    /// constraint; callers check `order_no_exists` under the number's lock
    /// key before staging.
    pub fn stage_order_new(&mut self, order: &Order) -> Result<()> {
        let cf_orders = self.storage.cf_handle(CF_ORDERS)?;
        let value = bincode::serialize(order)?;
        self.batch.put_cf(&cf_orders, order.order_id.as_bytes(), &value);

        let cf_indices = self.storage.cf_handle(CF_INDICES)?;

        let idx_no = Storage::index_key_order_no(&order.order_no);
        self.batch.put_cf(&cf_indices, &idx_no, order.order_id.as_bytes());

        let idx_buyer = Storage::index_key_buyer_order(&order.buyer, Some(&order.order_id));
        self.batch.put_cf(&cf_indices, &idx_buyer, []);

        let idx_seller = Storage::index_key_seller_order(&order.seller, Some(&order.order_id));
        self.batch.put_cf(&cf_indices, &idx_seller, []);

        let idx_status = Storage::index_key_status_order(order.status, Some(&order.order_id));
        self.batch.put_cf(&cf_indices, &idx_status, []);

        self.staged += 1;
        Ok(())
    }

    /// Stage an updated order, keeping the status index current
    ///
    /// The old status entry is deleted and the new one written in the same
    /// batch; the index never disagrees with the row.
    pub fn stage_order(&mut self, order: &Order, previous_status: OrderStatus) -> Result<()> {
        let cf_orders = self.storage.cf_handle(CF_ORDERS)?;
        let value = bincode::serialize(order)?;
        self.batch.put_cf(&cf_orders, order.order_id.as_bytes(), &value);

        if previous_status != order.status {
            let cf_indices = self.storage.cf_handle(CF_INDICES)?;

            let old_idx = Storage::index_key_status_order(previous_status, Some(&order.order_id));
            self.batch.delete_cf(&cf_indices, &old_idx);

            let new_idx = Storage::index_key_status_order(order.status, Some(&order.order_id));
            self.batch.put_cf(&cf_indices, &new_idx, []);
        }

        self.staged += 1;
        Ok(())
    }

    /// Stage a pair-lock row
    pub fn stage_pair_lock(&mut self, lock: &PairLock) -> Result<()> {
        let cf = self.storage.cf_handle(CF_PAIR_LOCKS)?;
        let value = bincode::serialize(lock)?;
        self.batch.put_cf(&cf, lock.key().storage_key(), &value);
        self.staged += 1;
        Ok(())
    }

    /// Stage a footprint row
    pub fn stage_footprint(&mut self, footprint: &Footprint) -> Result<()> {
        let cf = self.storage.cf_handle(CF_FOOTPRINTS)?;
        let key = Storage::footprint_key(&footprint.account_id, &footprint.province);
        let value = bincode::serialize(footprint)?;
        self.batch.put_cf(&cf, &key, &value);
        self.staged += 1;
        Ok(())
    }

    /// Stage a title reference row
    pub fn stage_title(&mut self, title: &Title) -> Result<()> {
        let cf = self.storage.cf_handle(CF_TITLES)?;
        let value = bincode::serialize(title)?;
        self.batch.put_cf(&cf, [title.level], &value);
        self.staged += 1;
        Ok(())
    }

    /// Stage an audit event and its per-order index entry
    pub fn stage_audit(&mut self, event: &AuditEvent) -> Result<()> {
        let cf_audit = self.storage.cf_handle(CF_AUDIT)?;
        let value = bincode::serialize(event)?;
        self.batch.put_cf(&cf_audit, event.event_id.as_bytes(), &value);

        if let Some(order_id) = &event.order_id {
            let cf_indices = self.storage.cf_handle(CF_INDICES)?;
            let idx = Storage::index_key_order_audit(order_id, Some(event.event_id));
            self.batch.put_cf(&cf_indices, &idx, []);
        }

        self.staged += 1;
        Ok(())
    }

    /// Number of staged writes
    pub fn staged(&self) -> usize {
        self.staged
    }

    /// Atomically commit everything staged
    pub fn commit(self) -> Result<()> {
        let staged = self.staged;
        self.storage.db.write(self.batch)?;

        tracing::debug!(staged, "Unit of work committed");

        Ok(())
    }
}

impl fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("staged", &self.staged)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEvent, AuditKind};
    use crate::types::ShippingAddress;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_address() -> ShippingAddress {
        ShippingAddress {
            recipient: "Jin Wei".to_string(),
            phone: "13800000000".to_string(),
            city: None,
            detail: "12 Dianchi Road".to_string(),
        }
    }

    fn test_order(buyer: AccountId, seller: AccountId) -> Order {
        Order::new(
            format!("LM{}", Uuid::new_v4().simple()),
            ProductId::generate(),
            buyer,
            seller,
            dec!(40.00),
            test_address(),
            Utc::now(),
        )
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_ACCOUNTS).is_some());
        assert!(storage.db.cf_handle(CF_INDICES).is_some());
    }

    #[test]
    fn test_account_roundtrip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let account = Account::new("Jin Wei", None, Utc::now());
        assert!(matches!(
            storage.get_account(&account.account_id),
            Err(Error::AccountNotFound(_))
        ));

        let mut unit = storage.begin_unit();
        unit.stage_account(&account).unwrap();
        unit.commit().unwrap();

        let retrieved = storage.get_account(&account.account_id).unwrap();
        assert_eq!(retrieved.display_name, "Jin Wei");
        assert_eq!(retrieved.available, Decimal::ZERO);
    }

    #[test]
    fn test_dropped_unit_leaves_no_trace() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let account = Account::new("Jin Wei", None, Utc::now());
        {
            let mut unit = storage.begin_unit();
            unit.stage_account(&account).unwrap();
            // No commit
        }

        assert!(storage.get_account(&account.account_id).is_err());
    }

    #[test]
    fn test_order_indices_written_atomically() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let buyer = AccountId::generate();
        let seller = AccountId::generate();
        let mut order = test_order(buyer, seller);
        order.transition(OrderStatus::Paid, Utc::now()).unwrap();

        let mut unit = storage.begin_unit();
        unit.stage_order_new(&order).unwrap();
        unit.commit().unwrap();

        assert!(storage.order_no_exists(&order.order_no).unwrap());
        let by_no = storage.get_order_by_no(&order.order_no).unwrap().unwrap();
        assert_eq!(by_no.order_id, order.order_id);

        assert_eq!(storage.orders_for_buyer(&buyer).unwrap().len(), 1);
        assert_eq!(storage.orders_for_seller(&seller).unwrap().len(), 1);
        assert_eq!(storage.orders_with_status(OrderStatus::Paid).unwrap().len(), 1);
        assert!(storage
            .orders_with_status(OrderStatus::Shipped)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_status_index_follows_transitions() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut order = test_order(AccountId::generate(), AccountId::generate());
        order.transition(OrderStatus::Paid, Utc::now()).unwrap();

        let mut unit = storage.begin_unit();
        unit.stage_order_new(&order).unwrap();
        unit.commit().unwrap();

        let previous = order.status;
        order.transition(OrderStatus::Shipped, Utc::now()).unwrap();

        let mut unit = storage.begin_unit();
        unit.stage_order(&order, previous).unwrap();
        unit.commit().unwrap();

        assert!(storage.orders_with_status(OrderStatus::Paid).unwrap().is_empty());
        let shipped = storage.orders_with_status(OrderStatus::Shipped).unwrap();
        assert_eq!(shipped.len(), 1);
        assert_eq!(shipped[0].order_id, order.order_id);
    }

    #[test]
    fn test_footprint_prefix_scan_is_isolated() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let now = Utc::now();
        let alice = AccountId::generate();
        let bob = AccountId::generate();

        let mut unit = storage.begin_unit();
        for province in ["Yunnan", "Sichuan", "Guizhou"] {
            let footprint = Footprint::first(alice, Province::new(province).unwrap(), now);
            unit.stage_footprint(&footprint).unwrap();
        }
        let footprint = Footprint::first(bob, Province::new("Hainan").unwrap(), now);
        unit.stage_footprint(&footprint).unwrap();
        unit.commit().unwrap();

        assert_eq!(storage.footprints_for(&alice).unwrap().len(), 3);
        assert_eq!(storage.footprints_for(&bob).unwrap().len(), 1);

        let found = storage
            .find_footprint(&alice, &Province::new("Yunnan").unwrap())
            .unwrap();
        assert!(found.is_some());
        let missing = storage
            .find_footprint(&alice, &Province::new("Hainan").unwrap())
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_pair_lock_roundtrip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let now = Utc::now();
        let key = PairKey::canonical(
            AccountId::generate(),
            AccountId::generate(),
            Province::new("Yunnan").unwrap(),
        );

        assert!(storage.find_pair_lock(&key).unwrap().is_none());

        let mut lock = PairLock::new(&key, now);
        lock.mark_rewarded(OrderId::generate(), now).unwrap();

        let mut unit = storage.begin_unit();
        unit.stage_pair_lock(&lock).unwrap();
        unit.commit().unwrap();

        let found = storage.find_pair_lock(&key).unwrap().unwrap();
        assert!(found.rewarded);
        assert_eq!(found.rewarded_by, lock.rewarded_by);
    }

    #[test]
    fn test_order_audit_trail() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let now = Utc::now();
        let order = test_order(AccountId::generate(), AccountId::generate());

        let mut unit = storage.begin_unit();
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::OrderCreated {
                buyer: order.buyer,
                seller: order.seller,
                amount: order.amount,
            },
            now,
        ))
        .unwrap();
        unit.stage_audit(&AuditEvent::for_order(
            order.order_id,
            AuditKind::OrderCompleted { auto: false },
            now,
        ))
        .unwrap();
        unit.commit().unwrap();

        let trail = storage.order_audit(&order.order_id).unwrap();
        assert_eq!(trail.len(), 2);
        assert!(matches!(trail[0].kind, AuditKind::OrderCreated { .. }));
        assert!(matches!(trail[1].kind, AuditKind::OrderCompleted { auto: false }));
    }

    #[test]
    fn test_titles_ordered_by_level() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut unit = storage.begin_unit();
        for (level, name, required) in [(2u8, "Voyager", 10u32), (1, "Wanderer", 3)] {
            unit.stage_title(&Title {
                level,
                name: name.to_string(),
                required_provinces: required,
            })
            .unwrap();
        }
        unit.commit().unwrap();

        let titles = storage.titles().unwrap();
        assert_eq!(titles.len(), 2);
        assert_eq!(titles[0].level, 1);
        assert_eq!(titles[1].level, 2);
    }
}
