use crate::domain::ports::{PurchaseStore, SubscriptionStore};
use crate::domain::purchase::{Purchase, PurchaseId, PurchaseStatus, StatusChange, UserId};
use crate::domain::subscription::Subscription;
use crate::error::{CheckoutError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing purchase records.
pub const CF_PURCHASES: &str = "purchases";
/// Column Family for storing subscriptions, keyed by user.
pub const CF_SUBSCRIPTIONS: &str = "subscriptions";

/// A persistent store implementation using RocksDB.
///
/// Handles both `Purchase` and `Subscription` entities in separate Column
/// Families, values encoded as JSON. Read-modify-write sequences (status swap,
/// upsert) run under one async mutex so that a swap observes the latest status.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("purchases" and "subscriptions") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_purchases = ColumnFamilyDescriptor::new(CF_PURCHASES, Options::default());
        let cf_subscriptions = ColumnFamilyDescriptor::new(CF_SUBSCRIPTIONS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_purchases, cf_subscriptions])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            CheckoutError::InternalError(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        self.db.put_cf(cf, key, bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut items = Vec::new();
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            items.push(decode(&value)?);
        }
        Ok(items)
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CheckoutError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| {
        CheckoutError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {}", e),
        )))
    })
}

#[async_trait]
impl PurchaseStore for RocksDBStore {
    async fn create(&self, purchase: Purchase) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self
            .read::<Purchase>(CF_PURCHASES, purchase.id.as_bytes())?
            .is_some()
        {
            return Err(CheckoutError::InternalError(
                format!("purchase {} already exists", purchase.id).into(),
            ));
        }
        self.put(CF_PURCHASES, purchase.id.as_bytes(), &purchase)
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<Purchase>> {
        self.read(CF_PURCHASES, id.as_bytes())
    }

    async fn compare_and_swap_status(
        &self,
        id: PurchaseId,
        expected: PurchaseStatus,
        change: StatusChange,
    ) -> Result<Purchase> {
        let _guard = self.write_lock.lock().await;
        let mut purchase: Purchase = self
            .read(CF_PURCHASES, id.as_bytes())?
            .ok_or(CheckoutError::PurchaseNotFound(id))?;
        if purchase.status != expected {
            return Err(CheckoutError::PersistenceConflict {
                id,
                expected,
                actual: purchase.status,
            });
        }
        purchase.apply(change)?;
        self.put(CF_PURCHASES, id.as_bytes(), &purchase)?;
        Ok(purchase)
    }

    async fn pending(&self) -> Result<Vec<PurchaseId>> {
        let mut pending: Vec<Purchase> = self
            .scan::<Purchase>(CF_PURCHASES)?
            .into_iter()
            .filter(|p| p.status == PurchaseStatus::Pending)
            .collect();
        pending.sort_by_key(|p| p.created_at);
        Ok(pending.into_iter().map(|p| p.id).collect())
    }

    async fn all(&self) -> Result<Vec<Purchase>> {
        let mut all: Vec<Purchase> = self.scan(CF_PURCHASES)?;
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }
}

#[async_trait]
impl SubscriptionStore for RocksDBStore {
    async fn upsert_active(&self, subscription: Subscription) -> Result<Subscription> {
        let _guard = self.write_lock.lock().await;
        let key = subscription.user_id.as_str().as_bytes();
        self.put(CF_SUBSCRIPTIONS, key, &subscription)?;
        Ok(subscription)
    }

    async fn get(&self, user_id: &UserId) -> Result<Option<Subscription>> {
        self.read(CF_SUBSCRIPTIONS, user_id.as_str().as_bytes())
    }

    async fn all(&self) -> Result<Vec<Subscription>> {
        // Keys are user ids, so iteration order is already by user.
        self.scan(CF_SUBSCRIPTIONS)
    }
}
