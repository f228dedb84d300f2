use std::collections::BTreeMap;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::Store;
use crate::models::{NewOrder, Order, Ticket};

/// In-process store with the same soft-delete and sequence behavior as
/// [`PgStore`](super::PgStore). Order ids come from a counter that, like a
/// Postgres sequence, advances even when the insert fails.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    tickets: BTreeMap<i32, Ticket>,
    orders: BTreeMap<i32, Order>,
    next_order_id: i32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tickets: BTreeMap::new(),
                orders: BTreeMap::new(),
                next_order_id: 1,
            }),
        }
    }

    /// Stands in for the ticket-management service creating a ticket.
    pub async fn insert_ticket(&self, ticket_id: i32, ticket_name: &str, quantity: i32) -> Ticket {
        let now = Utc::now();
        let ticket = Ticket {
            ticket_id,
            ticket_name: ticket_name.to_string(),
            total_quantity: quantity,
            current_quantity: quantity,
            created_at: Some(now),
            updated_at: Some(now),
            deleted_at: None,
        };
        self.inner.lock().await.tickets.insert(ticket_id, ticket.clone());
        ticket
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_ticket(&self, ticket_id: i32) -> Result<Option<Ticket>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tickets
            .get(&ticket_id)
            .filter(|t| t.deleted_at.is_none())
            .cloned())
    }

    async fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.tickets.get_mut(&ticket.ticket_id) {
            Some(stored) => {
                stored.current_quantity = ticket.current_quantity;
                stored.updated_at = Some(Utc::now());
                Ok(())
            }
            None => bail!("ticket {} no longer exists", ticket.ticket_id),
        }
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut inner = self.inner.lock().await;
        let order_id = inner.next_order_id;
        inner.next_order_id += 1;
        if inner.orders.contains_key(&order_id) {
            bail!("duplicate key value violates \"orders_pkey\": order_id={order_id}");
        }
        let created = Order {
            order_id,
            ticket_id: order.ticket_id,
            created_at: order.created_at,
            updated_at: order.updated_at,
            deleted_at: None,
        };
        inner.orders.insert(order_id, created.clone());
        Ok(created)
    }

    async fn all_orders_unscoped(&self) -> Result<Vec<Order>> {
        Ok(self.inner.lock().await.orders.values().cloned().collect())
    }

    async fn orders_for_ticket(&self, ticket_id: i32) -> Result<Vec<Order>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .orders
            .values()
            .filter(|o| o.ticket_id == ticket_id && !o.is_deleted())
            .cloned()
            .collect())
    }

    async fn delete_order(&self, order_id: i32) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        match inner.orders.get_mut(&order_id) {
            Some(order) if !order.is_deleted() => {
                let now = Utc::now();
                order.deleted_at = Some(now);
                order.updated_at = now;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn delete_orders_for_ticket_unscoped(&self, ticket_id: i32) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let mut affected = 0;
        for order in inner.orders.values_mut().filter(|o| o.ticket_id == ticket_id) {
            if order.deleted_at.is_none() {
                order.deleted_at = Some(now);
            }
            order.updated_at = now;
            affected += 1;
        }
        Ok(affected)
    }

    async fn reset_order_sequence(&self) -> Result<()> {
        self.inner.lock().await.next_order_id = 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn order_ids_increase_from_one() {
        let store = MemoryStore::new();
        let first = store.create_order(NewOrder::for_ticket(1)).await.unwrap();
        let second = store.create_order(NewOrder::for_ticket(1)).await.unwrap();
        assert_eq!((first.order_id, second.order_id), (1, 2));
    }

    #[tokio::test]
    async fn soft_deleted_orders_only_visible_unscoped() {
        let store = MemoryStore::new();
        let order = store.create_order(NewOrder::for_ticket(4)).await.unwrap();
        store.create_order(NewOrder::for_ticket(4)).await.unwrap();

        assert_eq!(store.delete_order(order.order_id).await.unwrap(), 1);
        assert_eq!(store.delete_order(order.order_id).await.unwrap(), 0);

        assert_eq!(store.orders_for_ticket(4).await.unwrap().len(), 1);
        let all = store.all_orders_unscoped().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].is_deleted());
    }

    #[tokio::test]
    async fn unscoped_ticket_delete_counts_already_deleted_rows() {
        let store = MemoryStore::new();
        let order = store.create_order(NewOrder::for_ticket(9)).await.unwrap();
        store.create_order(NewOrder::for_ticket(9)).await.unwrap();
        store.create_order(NewOrder::for_ticket(10)).await.unwrap();
        store.delete_order(order.order_id).await.unwrap();

        assert_eq!(store.delete_orders_for_ticket_unscoped(9).await.unwrap(), 2);
        assert_eq!(store.delete_orders_for_ticket_unscoped(11).await.unwrap(), 0);
        assert_eq!(store.orders_for_ticket(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unscoped_ticket_delete_keeps_first_deletion_time() {
        let store = MemoryStore::new();
        let order = store.create_order(NewOrder::for_ticket(9)).await.unwrap();
        store.delete_order(order.order_id).await.unwrap();
        let first = store.all_orders_unscoped().await.unwrap()[0].clone();

        assert_eq!(store.delete_orders_for_ticket_unscoped(9).await.unwrap(), 1);

        let again = store.all_orders_unscoped().await.unwrap()[0].clone();
        assert_eq!(again.deleted_at, first.deleted_at);
        assert!(again.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn reset_sequence_collides_with_existing_rows() {
        let store = MemoryStore::new();
        store.create_order(NewOrder::for_ticket(1)).await.unwrap();
        store.reset_order_sequence().await.unwrap();

        assert!(store.create_order(NewOrder::for_ticket(1)).await.is_err());
        // the failed insert still consumed id 1
        let next = store.create_order(NewOrder::for_ticket(1)).await.unwrap();
        assert_eq!(next.order_id, 2);
    }

    #[tokio::test]
    async fn save_ticket_only_touches_quantity() {
        let store = MemoryStore::new();
        let mut ticket = store.insert_ticket(5, "Main stage", 3).await;
        ticket.current_quantity = 2;
        ticket.ticket_name = "renamed".to_string();
        store.save_ticket(&ticket).await.unwrap();

        let stored = store.find_ticket(5).await.unwrap().unwrap();
        assert_eq!(stored.current_quantity, 2);
        assert_eq!(stored.ticket_name, "Main stage");
        assert_eq!(stored.total_quantity, 3);
    }

    #[tokio::test]
    async fn save_missing_ticket_fails() {
        let store = MemoryStore::new();
        let ticket = store.insert_ticket(1, "a", 1).await;
        let other = MemoryStore::new();
        assert!(other.save_ticket(&ticket).await.is_err());
    }
}
