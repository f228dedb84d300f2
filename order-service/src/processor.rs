//! Applies one order message to inventory.
//!
//! The ticket decrement and the order insert are separate writes. If the
//! insert fails after the decrement succeeded the ticket stays decremented
//! and no order exists; nothing compensates for it.

use shared::OrderMessage;
use tracing::{error, info, warn};

use crate::models::{NewOrder, Order};
use crate::store::DynStore;

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Created(Order),
    TicketNotFound,
    TicketLookupFailed,
    OutOfStock,
    StockUpdateFailed,
    /// Stock was decremented but the order row could not be written.
    OrderInsertFailed,
}

impl ProcessOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::TicketNotFound => "ticket_not_found",
            Self::TicketLookupFailed => "ticket_lookup_failed",
            Self::OutOfStock => "out_of_stock",
            Self::StockUpdateFailed => "stock_update_failed",
            Self::OrderInsertFailed => "order_insert_failed",
        }
    }
}

#[derive(Clone)]
pub struct OrderProcessor {
    store: DynStore,
}

impl OrderProcessor {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    pub async fn process(&self, message: OrderMessage) -> ProcessOutcome {
        let ticket_id = message.ticket_id;

        let mut ticket = match self.store.find_ticket(ticket_id).await {
            Ok(Some(ticket)) => ticket,
            Ok(None) => {
                warn!(ticket_id, "Ticket not found, dropping order");
                return ProcessOutcome::TicketNotFound;
            }
            Err(e) => {
                error!(ticket_id, error = %e, "Failed to look up ticket, dropping order");
                return ProcessOutcome::TicketLookupFailed;
            }
        };

        if !ticket.in_stock() {
            warn!(
                ticket_id,
                current_quantity = ticket.current_quantity,
                "No stock available for ticket"
            );
            return ProcessOutcome::OutOfStock;
        }

        ticket.current_quantity -= 1;
        if let Err(e) = self.store.save_ticket(&ticket).await {
            error!(ticket_id, error = %e, "Failed to update stock");
            return ProcessOutcome::StockUpdateFailed;
        }

        match self.store.create_order(NewOrder::for_ticket(ticket_id)).await {
            Ok(order) => {
                info!(
                    ticket_id,
                    order_id = order.order_id,
                    remaining = ticket.current_quantity,
                    "Order created successfully"
                );
                ProcessOutcome::Created(order)
            }
            Err(e) => {
                error!(
                    ticket_id,
                    error = %e,
                    "Failed to create order after stock was decremented; inventory leaked"
                );
                ProcessOutcome::OrderInsertFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use super::*;
    use crate::models::Ticket;
    use crate::store::{MemoryStore, Store};

    /// Delegates to a [`MemoryStore`] but refuses the configured writes.
    struct FaultyStore {
        inner: MemoryStore,
        fail_ticket_save: bool,
        fail_order_insert: bool,
    }

    #[async_trait]
    impl Store for FaultyStore {
        async fn find_ticket(&self, ticket_id: i32) -> Result<Option<Ticket>> {
            self.inner.find_ticket(ticket_id).await
        }
        async fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
            if self.fail_ticket_save {
                bail!("connection reset");
            }
            self.inner.save_ticket(ticket).await
        }
        async fn create_order(&self, order: NewOrder) -> Result<Order> {
            if self.fail_order_insert {
                bail!("connection reset");
            }
            self.inner.create_order(order).await
        }
        async fn all_orders_unscoped(&self) -> Result<Vec<Order>> {
            self.inner.all_orders_unscoped().await
        }
        async fn orders_for_ticket(&self, ticket_id: i32) -> Result<Vec<Order>> {
            self.inner.orders_for_ticket(ticket_id).await
        }
        async fn delete_order(&self, order_id: i32) -> Result<usize> {
            self.inner.delete_order(order_id).await
        }
        async fn delete_orders_for_ticket_unscoped(&self, ticket_id: i32) -> Result<usize> {
            self.inner.delete_orders_for_ticket_unscoped(ticket_id).await
        }
        async fn reset_order_sequence(&self) -> Result<()> {
            self.inner.reset_order_sequence().await
        }
    }

    async fn seeded(ticket_id: i32, quantity: i32) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert_ticket(ticket_id, "Concert", quantity).await;
        store
    }

    async fn quantity(store: &dyn Store, ticket_id: i32) -> i32 {
        store.find_ticket(ticket_id).await.unwrap().unwrap().current_quantity
    }

    #[tokio::test]
    async fn decrements_stock_and_creates_one_order() {
        let store = seeded(5, 3).await;
        let processor = OrderProcessor::new(store.clone());

        let outcome = processor.process(OrderMessage::new(5)).await;

        let ProcessOutcome::Created(order) = outcome.clone() else {
            panic!("expected order, got {outcome:?}");
        };
        assert_eq!(order.ticket_id, 5);
        assert_eq!(quantity(store.as_ref(), 5).await, 2);
        assert_eq!(store.all_orders_unscoped().await.unwrap(), vec![order]);
    }

    #[tokio::test]
    async fn last_ticket_can_be_sold_then_stock_is_exhausted() {
        let store = seeded(1, 1).await;
        let processor = OrderProcessor::new(store.clone());

        let first = processor.process(OrderMessage::new(1)).await;
        assert!(matches!(first, ProcessOutcome::Created(_)));
        assert_eq!(processor.process(OrderMessage::new(1)).await, ProcessOutcome::OutOfStock);
        assert_eq!(quantity(store.as_ref(), 1).await, 0);
        assert_eq!(store.all_orders_unscoped().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn zero_stock_leaves_everything_untouched() {
        let store = seeded(7, 0).await;
        let processor = OrderProcessor::new(store.clone());

        assert_eq!(processor.process(OrderMessage::new(7)).await, ProcessOutcome::OutOfStock);
        assert_eq!(quantity(store.as_ref(), 7).await, 0);
        assert!(store.orders_for_ticket(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_ticket_is_dropped() {
        let store = seeded(1, 4).await;
        let processor = OrderProcessor::new(store.clone());

        let outcome = processor.process(OrderMessage::new(99)).await;
        assert_eq!(outcome, ProcessOutcome::TicketNotFound);
        assert_eq!(quantity(store.as_ref(), 1).await, 4);
        assert!(store.all_orders_unscoped().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_stock_update_creates_no_order() {
        let inner = MemoryStore::new();
        inner.insert_ticket(2, "Opera", 5).await;
        let store = Arc::new(FaultyStore {
            inner,
            fail_ticket_save: true,
            fail_order_insert: false,
        });
        let processor = OrderProcessor::new(store.clone());

        let outcome = processor.process(OrderMessage::new(2)).await;
        assert_eq!(outcome, ProcessOutcome::StockUpdateFailed);
        assert_eq!(quantity(store.as_ref(), 2).await, 5);
        assert!(store.all_orders_unscoped().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_order_insert_keeps_the_decrement() {
        let inner = MemoryStore::new();
        inner.insert_ticket(3, "Ballet", 2).await;
        let store = Arc::new(FaultyStore {
            inner,
            fail_ticket_save: false,
            fail_order_insert: true,
        });
        let processor = OrderProcessor::new(store.clone());

        let outcome = processor.process(OrderMessage::new(3)).await;
        assert_eq!(outcome, ProcessOutcome::OrderInsertFailed);
        assert_eq!(quantity(store.as_ref(), 3).await, 1);
        assert!(store.all_orders_unscoped().await.unwrap().is_empty());
    }
}
