//! Persistence for tickets and orders.
//!
//! Orders are soft-deleted: default reads skip rows whose `deleted_at` is set,
//! the `*_unscoped` operations do not.

mod memory;
mod postgres;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{NewOrder, Order, Ticket};

pub use memory::MemoryStore;
pub use postgres::{run_migrations, PgStore};

pub type DynStore = Arc<dyn Store>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Live (not soft-deleted) ticket by primary key.
    async fn find_ticket(&self, ticket_id: i32) -> Result<Option<Ticket>>;

    /// Writes back the mutable columns of `ticket`.
    async fn save_ticket(&self, ticket: &Ticket) -> Result<()>;

    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Every order row, soft-deleted ones included.
    async fn all_orders_unscoped(&self) -> Result<Vec<Order>>;

    async fn orders_for_ticket(&self, ticket_id: i32) -> Result<Vec<Order>>;

    /// Soft-deletes one live order. Returns the number of rows affected.
    async fn delete_order(&self, order_id: i32) -> Result<usize>;

    /// Soft-deletes every order of a ticket without filtering out rows that
    /// are already deleted. Returns the number of rows affected.
    async fn delete_orders_for_ticket_unscoped(&self, ticket_id: i32) -> Result<usize>;

    /// Restarts the order primary-key sequence at 1. Existing rows are kept.
    async fn reset_order_sequence(&self) -> Result<()>;
}
