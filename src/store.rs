use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use bincode::{
    config::standard,
    error::{DecodeError, EncodeError},
};
use chrono::{DateTime, Utc};
use parity_db::{BTreeIterator, ColId, Db, Options};
use std::{path::Path, sync::Mutex};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::orders::Order;

/// Orders keyed by id.
const COL_ORDERS: ColId = 0;
/// Secondary index: restaurant + placement time + order id, ordered.
const COL_BY_RESTAURANT: ColId = 1;
/// Counters.
const COL_META: ColId = 2;

const ORDER_SEQ_KEY: &[u8] = b"order_seq";

//Cursor (opaque to clients)
#[derive(serde::Serialize, serde::Deserialize)]
struct Cursor {
    placed_at_micros: i64,
    order_id: Uuid,
}

/// Errors from the order store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),
    #[error("Serialization/Deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("Invalid cursor")]
    BadCursor,

    #[error("order {0} does not exist")]
    Missing(Uuid),

    #[error("order {id} was modified concurrently (expected version {expected}, found {found})")]
    VersionConflict { id: Uuid, expected: u64, found: u64 },

    #[error("order {0}: restaurant and placement time are immutable")]
    ImmutableField(Uuid),

    #[error("restaurant index entry is corrupt")]
    CorruptIndex,

    #[error("order sequence counter is corrupt")]
    CorruptCounter,

    #[error("store write lock poisoned")]
    LockPoisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A ParityDB-backed order store.
///
/// Every write goes through `write_lock`, which gives each order
/// read-modify-write atomicity: [`Store::compare_and_swap`] re-reads the
/// stored version under the lock and refuses stale writes.
pub struct Store {
    db: Db,
    write_lock: Mutex<()>,
}

impl Store {
    /// Open (or create) a ParityDB at `path`. The restaurant index column is
    /// B-tree backed for prefix scans.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 3);
        opts.columns[COL_BY_RESTAURANT as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Store {
            db,
            write_lock: Mutex::new(()),
        })
    }

    /// Order of index keys must follow time order, including pre-1970 stamps.
    #[inline]
    fn time_key(micros: i64) -> [u8; 8] {
        ((micros as u64) ^ (1 << 63)).to_be_bytes()
    }

    #[inline]
    fn prefix(restaurant_id: &str) -> Vec<u8> {
        let mut k = Vec::with_capacity(restaurant_id.len() + 2);
        k.extend_from_slice(&(restaurant_id.len() as u16).to_be_bytes());
        k.extend_from_slice(restaurant_id.as_bytes());
        k
    }

    #[inline]
    fn index_key(restaurant_id: &str, placed_at_micros: i64, order_id: Uuid) -> Vec<u8> {
        let mut key = Self::prefix(restaurant_id);
        key.extend_from_slice(&Self::time_key(placed_at_micros));
        key.extend_from_slice(order_id.as_bytes());
        key
    }

    #[inline]
    fn encode_cursor(c: &Cursor) -> StoreResult<String> {
        Ok(B64.encode(serde_json::to_vec(c)?))
    }

    #[inline]
    fn decode_cursor(s: &str) -> StoreResult<Cursor> {
        let bytes = B64.decode(s).map_err(|_| StoreError::BadCursor)?;
        serde_json::from_slice(&bytes).map_err(|_| StoreError::BadCursor)
    }

    fn encode_order(order: &Order) -> StoreResult<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(order, standard())?)
    }

    fn decode_order(raw: &[u8]) -> StoreResult<Order> {
        let (order, _): (Order, usize) = bincode::serde::decode_from_slice(raw, standard())?;
        Ok(order)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn batch_for(order: &Order, with_index: bool) -> StoreResult<Vec<(ColId, Vec<u8>, Option<Vec<u8>>)>> {
        let mut batch = vec![(
            COL_ORDERS,
            order.id.as_bytes().to_vec(),
            Some(Self::encode_order(order)?),
        )];
        if with_index {
            if let Some(restaurant_id) = &order.restaurant_id {
                let key = Self::index_key(restaurant_id, order.placed_at.timestamp_micros(), order.id);
                batch.push((COL_BY_RESTAURANT, key, Some(order.id.as_bytes().to_vec())));
            }
        }
        Ok(batch)
    }

    /// Insert a brand-new order record as given.
    pub fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let _guard = self.lock()?;
        self.db.commit(Self::batch_for(order, true)?)?;
        Ok(())
    }

    /// Allocate the next sequential order number and insert the order built
    /// from it, in one commit.
    pub fn place_order(&self, build: impl FnOnce(String) -> Order) -> StoreResult<Order> {
        let _guard = self.lock()?;
        let seq = match self.db.get(COL_META, ORDER_SEQ_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_slice().try_into().map_err(|_| StoreError::CorruptCounter)?;
                u64::from_be_bytes(bytes) + 1
            }
            None => 1,
        };
        let order = build(format!("ORD-{seq:06}"));

        let mut batch = Self::batch_for(&order, true)?;
        batch.push((COL_META, ORDER_SEQ_KEY.to_vec(), Some(seq.to_be_bytes().to_vec())));
        self.db.commit(batch)?;
        debug!(order_id = %order.id, order_number = %order.order_number, "order placed");
        Ok(order)
    }

    pub fn get_order(&self, id: Uuid) -> StoreResult<Option<Order>> {
        match self.db.get(COL_ORDERS, id.as_bytes())? {
            Some(raw) => Ok(Some(Self::decode_order(&raw)?)),
            None => Ok(None),
        }
    }

    /// Write `updated` only if the stored record still carries
    /// `expected_version`. The stored copy gets `expected_version + 1`, which
    /// is also what the returned order carries.
    pub fn compare_and_swap(&self, updated: &Order, expected_version: u64) -> StoreResult<Order> {
        let _guard = self.lock()?;
        let current = self
            .get_order(updated.id)?
            .ok_or(StoreError::Missing(updated.id))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: updated.id,
                expected: expected_version,
                found: current.version,
            });
        }
        if current.restaurant_id != updated.restaurant_id || current.placed_at != updated.placed_at {
            return Err(StoreError::ImmutableField(updated.id));
        }
        let mut next = updated.clone();
        next.version = expected_version + 1;
        self.db.commit(Self::batch_for(&next, false)?)?;
        Ok(next)
    }

    /// All orders of a restaurant placed at or after `since`, oldest first.
    pub fn orders_for_restaurant_since(
        &self,
        restaurant_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<Vec<Order>> {
        let prefix = Self::prefix(restaurant_id);
        let mut start = prefix.clone();
        start.extend_from_slice(&Self::time_key(since.timestamp_micros()));

        let mut it: BTreeIterator<'_> = self.db.iter(COL_BY_RESTAURANT)?;
        it.seek(&start)?;
        let mut orders = Vec::new();
        while let Some((k, v)) = it.next()? {
            if !k.starts_with(&prefix) {
                break;
            }
            orders.push(self.order_from_index_value(&v)?);
        }
        Ok(orders)
    }

    fn order_from_index_value(&self, v: &[u8]) -> StoreResult<Order> {
        let id = Uuid::from_slice(v).map_err(|_| StoreError::CorruptIndex)?;
        self.get_order(id)?.ok_or(StoreError::Missing(id))
    }

    /// Page through a restaurant's orders by placement time, ascending.
    /// `after` is the opaque cursor returned by the previous page.
    pub fn page_restaurant_orders(
        &self,
        restaurant_id: &str,
        after: Option<&str>,
        limit: usize,
        filter: impl Fn(&Order) -> bool,
    ) -> StoreResult<(Vec<Order>, Option<String>)> {
        let mut it: BTreeIterator<'_> = self.db.iter(COL_BY_RESTAURANT)?;
        let prefix = Self::prefix(restaurant_id);

        let after_decoded = match after {
            None => None,
            Some(s) => Some(Self::decode_cursor(s)?),
        };
        if let Some(ref c) = after_decoded {
            let full = Self::index_key(restaurant_id, c.placed_at_micros, c.order_id);
            let mut check = self.db.iter(COL_BY_RESTAURANT)?;
            check.seek(&full)?;
            match check.next()? {
                Some((k, _)) if k == full => {}
                _ => return Err(StoreError::BadCursor),
            }
            // Start strictly after that exact key
            it.seek(&full)?;
            let _ = it.next()?; //consume the equal key
        } else {
            it.seek(&prefix)?;
        }

        let mut items = Vec::with_capacity(limit.min(256));
        let mut last_cursor: Option<String> = None;
        while items.len() < limit {
            match it.next()? {
                Some((k, v)) if k.starts_with(&prefix) => {
                    let order = self.order_from_index_value(&v)?;
                    last_cursor = Some(Self::encode_cursor(&Cursor {
                        placed_at_micros: order.placed_at.timestamp_micros(),
                        order_id: order.id,
                    })?);
                    if filter(&order) {
                        items.push(order);
                    }
                }
                _ => {
                    last_cursor = None;
                    break;
                }
            }
        }

        Ok((items, last_cursor))
    }
}
