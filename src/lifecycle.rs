//! Order status transitions.
//!
//! [`transition`] is the only writer of an order's `status`, its audit trail
//! and its terminal timestamps. It loads the order, checks that the caller
//! owns the order's restaurant, validates the requested status, applies the
//! change in memory with [`apply_transition`] and writes it back with a
//! version-checked compare-and-swap. A lost race surfaces as
//! [`AppError::Conflict`]; nothing is retried here.

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    errors::AppError,
    orders::{Order, StatusHistoryEntry},
    restaurants::RestaurantDirectory,
    status::OrderStatus,
    store::Store,
};

/// Applies a validated status change to `order` in memory.
///
/// - Terminal orders (`delivered`, `cancelled`) refuse any further change.
/// - A supplied `reason` is recorded as `cancellation_reason` whatever the
///   target status, and as the history entry's notes.
/// - Re-applying the current status is not a no-op: it appends another entry.
/// - The entry timestamp never goes backwards relative to the previous entry.
pub fn apply_transition(
    order: &mut Order,
    to: OrderStatus,
    actor_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if order.status.is_terminal() {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to,
        });
    }

    let now = match order.last_history_entry() {
        Some(last) if last.timestamp > now => last.timestamp,
        _ => now,
    };
    let reason = reason.map(str::trim).filter(|r| !r.is_empty());

    order.status = to;
    if let Some(reason) = reason {
        order.cancellation_reason = Some(reason.to_string());
    }
    order.status_history.push(StatusHistoryEntry {
        status: to,
        timestamp: now,
        updated_by: actor_id.to_string(),
        notes: reason.map(str::to_string),
    });

    match to {
        OrderStatus::Delivered => {
            order.delivered_at = Some(now);
            order.actual_delivery_time = Some(now);
        }
        OrderStatus::Cancelled => {
            order.cancelled_at = Some(now);
        }
        _ => {}
    }
    Ok(())
}

/// Moves order `order_id` to `requested_status` on behalf of `actor_id`.
///
/// Checks run in this order: the order exists, it links to a known
/// restaurant, `actor_id` owns that restaurant, the status is valid, the
/// order is not in a final state.
pub fn transition(
    store: &Store,
    restaurants: &RestaurantDirectory,
    order_id: Uuid,
    requested_status: &str,
    actor_id: &str,
    reason: Option<&str>,
) -> Result<Order, AppError> {
    transition_at(
        store,
        restaurants,
        order_id,
        requested_status,
        actor_id,
        reason,
        Utc::now(),
    )
}

pub fn transition_at(
    store: &Store,
    restaurants: &RestaurantDirectory,
    order_id: Uuid,
    requested_status: &str,
    actor_id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Order, AppError> {
    let mut order = store
        .get_order(order_id)?
        .ok_or(AppError::OrderNotFound(order_id))?;

    let restaurant = order
        .restaurant_id
        .as_deref()
        .and_then(|id| restaurants.find_by_id(id))
        .ok_or(AppError::NoAssociatedRestaurant)?;

    if restaurant.owner != actor_id {
        warn!(%order_id, restaurant = %restaurant.id, actor = actor_id, "status change denied");
        return Err(AppError::AccessDenied);
    }

    let to = OrderStatus::from_requested(requested_status)?;
    let from = order.status;
    let expected_version = order.version;
    apply_transition(&mut order, to, actor_id, reason, now)?;

    let stored = store.compare_and_swap(&order, expected_version)?;
    info!(
        %order_id,
        order_number = %stored.order_number,
        %from,
        %to,
        actor = actor_id,
        "order status updated"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;
    use crate::{geo::Coordinate, restaurants::Restaurant};

    fn directory() -> RestaurantDirectory {
        let restaurant = |id: &str, owner: &str| Restaurant {
            id: id.into(),
            owner: owner.into(),
            name: id.into(),
            address: "addr".into(),
            coordinate: Coordinate::new(28.6, 77.2),
            delivery_radius_km: 5.0,
            is_active: true,
        };
        RestaurantDirectory::new([restaurant("r-a", "owner-a"), restaurant("r-b", "owner-b")])
    }

    fn seeded(restaurant: &str) -> (tempfile::TempDir, Store, Order) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let order = store
            .place_order(|n| Order::place(n, restaurant.into(), "cust".into(), 20.0, None, Utc::now()))
            .unwrap();
        (dir, store, order)
    }

    #[test]
    fn test_transition_missing_order_is_not_found() {
        let (_tmp, store, _order) = seeded("r-a");
        let err = transition(&store, &directory(), Uuid::new_v4(), "confirmed", "owner-a", None)
            .unwrap_err();
        assert!(matches!(err, AppError::OrderNotFound(_)));
    }

    #[test]
    fn test_transition_by_other_restaurant_owner_is_denied() {
        let (_tmp, store, order) = seeded("r-a");
        let err = transition(&store, &directory(), order.id, "confirmed", "owner-b", None).unwrap_err();
        assert!(matches!(err, AppError::AccessDenied));
        let unchanged = store.get_order(order.id).unwrap().unwrap();
        assert_eq!(unchanged.status_history.len(), 1);
    }

    #[test]
    fn test_authorization_is_checked_before_status_validity() {
        let (_tmp, store, order) = seeded("r-a");
        let err = transition(&store, &directory(), order.id, "bogus", "owner-b", None).unwrap_err();
        assert!(matches!(err, AppError::AccessDenied));
    }

    #[test]
    fn test_transition_without_restaurant_link() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let mut order = Order::place("L-1".into(), "r-a".into(), "cust".into(), 1.0, None, Utc::now());
        order.restaurant_id = None;
        store.insert_order(&order).unwrap();

        let err = transition(&store, &directory(), order.id, "confirmed", "owner-a", None).unwrap_err();
        assert!(matches!(err, AppError::NoAssociatedRestaurant));
    }

    #[test]
    fn test_transition_to_unknown_restaurant_has_no_association() {
        let (_tmp, store, order) = seeded("r-gone");
        let err = transition(&store, &directory(), order.id, "confirmed", "owner-a", None).unwrap_err();
        assert!(matches!(err, AppError::NoAssociatedRestaurant));
    }

    #[test]
    fn test_invalid_status_is_rejected_with_value() {
        let (_tmp, store, order) = seeded("r-a");
        let err = transition(&store, &directory(), order.id, "unknown_status", "owner-a", None)
            .unwrap_err();
        match err {
            AppError::InvalidStatus(e) => assert_eq!(e.0, "unknown_status"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_successful_transition_appends_one_matching_entry() {
        let (_tmp, store, order) = seeded("r-a");
        let updated = transition(&store, &directory(), order.id, "Accepted", "owner-a", None).unwrap();

        assert_eq!(updated.status, OrderStatus::Confirmed);
        assert_eq!(updated.status_history.len(), order.status_history.len() + 1);
        let last = updated.last_history_entry().unwrap();
        assert_eq!(last.status, updated.status);
        assert_eq!(last.updated_by, "owner-a");
        assert_eq!(updated.version, order.version + 1);
        assert_eq!(store.get_order(order.id).unwrap().unwrap(), updated);
    }

    #[test]
    fn test_same_target_twice_appends_twice() {
        let (_tmp, store, order) = seeded("r-a");
        let dir = directory();
        transition(&store, &dir, order.id, "preparing", "owner-a", None).unwrap();
        let again = transition(&store, &dir, order.id, "preparing", "owner-a", None).unwrap();

        assert_eq!(again.status_history.len(), 3);
        let statuses: Vec<_> = again.status_history.iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![OrderStatus::Pending, OrderStatus::Preparing, OrderStatus::Preparing]
        );
    }

    #[test]
    fn test_delivery_stamps_delivery_times() {
        let (_tmp, store, order) = seeded("r-a");
        let now = Utc::now() + Duration::minutes(30);
        let updated =
            transition_at(&store, &directory(), order.id, "delivered", "owner-a", None, now).unwrap();
        assert_eq!(updated.delivered_at, Some(now));
        assert_eq!(updated.actual_delivery_time, Some(now));
        assert!(updated.cancelled_at.is_none());
    }

    #[test]
    fn test_rejection_cancels_with_reason() {
        let (_tmp, store, order) = seeded("r-a");
        let updated = transition(
            &store,
            &directory(),
            order.id,
            "REJECTED",
            "owner-a",
            Some("out of stock"),
        )
        .unwrap();
        assert_eq!(updated.status, OrderStatus::Cancelled);
        assert!(updated.cancelled_at.is_some());
        assert_eq!(updated.cancellation_reason.as_deref(), Some("out of stock"));
        assert_eq!(
            updated.last_history_entry().unwrap().notes.as_deref(),
            Some("out of stock")
        );
    }

    #[test]
    fn test_reason_sets_cancellation_reason_on_any_status() {
        let (_tmp, store, order) = seeded("r-a");
        let updated = transition(
            &store,
            &directory(),
            order.id,
            "preparing",
            "owner-a",
            Some("rush order"),
        )
        .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);
        assert_eq!(updated.cancellation_reason.as_deref(), Some("rush order"));
        assert!(updated.cancelled_at.is_none());
    }

    #[test]
    fn test_terminal_states_block_further_transitions() {
        let (_tmp, store, order) = seeded("r-a");
        let dir = directory();
        transition(&store, &dir, order.id, "delivered", "owner-a", None).unwrap();
        let err = transition(&store, &dir, order.id, "cancelled", "owner-a", None).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled
            }
        ));
        assert_eq!(store.get_order(order.id).unwrap().unwrap().status_history.len(), 2);
    }

    #[test]
    fn test_history_timestamps_never_go_backwards() {
        let mut order = Order::place("O".into(), "r-a".into(), "c".into(), 1.0, None, Utc::now());
        let earlier = order.placed_at - Duration::seconds(5);
        apply_transition(&mut order, OrderStatus::Confirmed, "owner-a", None, earlier).unwrap();
        let stamps: Vec<_> = order.status_history.iter().map(|e| e.timestamp).collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_stale_write_is_a_conflict() {
        let (_tmp, store, order) = seeded("r-a");
        // Someone else wins the race after we read.
        let mut theirs = order.clone();
        apply_transition(&mut theirs, OrderStatus::Confirmed, "owner-a", None, Utc::now()).unwrap();
        store.compare_and_swap(&theirs, order.version).unwrap();

        let mut ours = order.clone();
        apply_transition(&mut ours, OrderStatus::Cancelled, "owner-a", None, Utc::now()).unwrap();
        let err: AppError = store.compare_and_swap(&ours, order.version).unwrap_err().into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
