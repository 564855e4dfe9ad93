use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::OrderStatus;

/// One entry of an order's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    /// Account id of whoever caused the change.
    pub updated_by: String,
    pub notes: Option<String>,
}

/// A customer order as persisted by the [`Store`](crate::store::Store).
///
/// - `status`, `status_history` and the terminal timestamps are only written
///   by [`lifecycle`](crate::lifecycle).
/// - `status_history` is append-only, never empty, non-decreasing in time, and
///   its last entry always matches `status`.
/// - `version` is bumped on every successful write and is what the store's
///   compare-and-swap checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    /// `None` only for legacy records that lost their restaurant link.
    pub restaurant_id: Option<String>,
    pub customer_id: String,
    pub total_amount: f64,
    pub placed_at: DateTime<Utc>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub notes: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub version: u64,
}

impl Order {
    /// A freshly placed order: `pending`, with a single history entry
    /// attributed to the customer.
    pub fn place(
        order_number: String,
        restaurant_id: String,
        customer_id: String,
        total_amount: f64,
        notes: Option<String>,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Order {
            id: Uuid::new_v4(),
            order_number,
            status: OrderStatus::Pending,
            restaurant_id: Some(restaurant_id),
            status_history: vec![StatusHistoryEntry {
                status: OrderStatus::Pending,
                timestamp: placed_at,
                updated_by: customer_id.clone(),
                notes: None,
            }],
            customer_id,
            total_amount,
            placed_at,
            notes,
            cancelled_at: None,
            delivered_at: None,
            actual_delivery_time: None,
            cancellation_reason: None,
            version: 0,
        }
    }

    pub fn last_history_entry(&self) -> Option<&StatusHistoryEntry> {
        self.status_history.last()
    }
}

/// What a status change hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderAck {
    pub id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
}

impl From<&Order> for OrderAck {
    fn from(order: &Order) -> Self {
        OrderAck {
            id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placed_order_starts_pending_with_one_entry() {
        let now = Utc::now();
        let order = Order::place(
            "ORD-000001".into(),
            "r-1".into(),
            "cust-1".into(),
            12.5,
            None,
            now,
        );
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.len(), 1);
        let entry = order.last_history_entry().unwrap();
        assert_eq!(entry.status, OrderStatus::Pending);
        assert_eq!(entry.updated_by, "cust-1");
        assert_eq!(entry.timestamp, now);
        assert_eq!(order.version, 0);
    }

    #[test]
    fn test_json_shape_is_camel_case() {
        let order = Order::place(
            "ORD-000002".into(),
            "r-1".into(),
            "cust-1".into(),
            7.0,
            Some("no onions".into()),
            Utc::now(),
        );
        let v = serde_json::to_value(&order).unwrap();
        assert_eq!(v["orderNumber"], "ORD-000002");
        assert_eq!(v["restaurantId"], "r-1");
        assert_eq!(v["status"], "pending");
        assert_eq!(v["statusHistory"][0]["updatedBy"], "cust-1");
        assert!(v["cancelledAt"].is_null());
    }
}
