use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Ticket row. Only `current_quantity` is written by this service; the
/// descriptive columns belong to the ticket-management service.
#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::tickets)]
#[diesel(primary_key(ticket_id))]
pub struct Ticket {
    pub ticket_id: i32,
    pub ticket_name: String,
    pub total_quantity: i32,
    pub current_quantity: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn in_stock(&self) -> bool {
        self.current_quantity >= 1
    }
}

#[derive(Debug, Clone, PartialEq, Queryable, Identifiable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(primary_key(order_id))]
pub struct Order {
    pub order_id: i32,
    pub ticket_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder {
    pub ticket_id: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn for_ticket(ticket_id: i32) -> Self {
        let now = Utc::now();
        Self {
            ticket_id,
            created_at: now,
            updated_at: now,
        }
    }
}
