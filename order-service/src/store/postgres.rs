use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use super::Store;
use crate::models::{NewOrder, Order, Ticket};
use crate::schema::{orders, tickets};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

const RESET_ORDER_SEQUENCE_SQL: &str = "ALTER SEQUENCE orders_order_id_seq RESTART WITH 1";

type DbPool = bb8::Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

pub fn run_migrations(database_url: &str) -> Result<()> {
    info!("Running database migrations...");
    let mut conn = PgConnection::establish(database_url)?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow!("Migration error: {}", e))?;
    info!(applied = applied.len(), "Migrations completed successfully");
    Ok(())
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Builds the pool and checks out one connection so a bad URL or an
    /// unreachable server fails here rather than on the first request.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = bb8::Pool::builder().build(config).await?;
        drop(pool.get().await?);
        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_ticket(&self, ticket_id: i32) -> Result<Option<Ticket>> {
        let mut conn = self.pool.get().await?;
        let ticket = tickets::table
            .filter(tickets::ticket_id.eq(ticket_id))
            .filter(tickets::deleted_at.is_null())
            .first::<Ticket>(&mut conn)
            .await
            .optional()?;
        Ok(ticket)
    }

    async fn save_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let updated = diesel::update(tickets::table.filter(tickets::ticket_id.eq(ticket.ticket_id)))
            .set((
                tickets::current_quantity.eq(ticket.current_quantity),
                tickets::updated_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)
            .await?;
        if updated == 0 {
            bail!("ticket {} no longer exists", ticket.ticket_id);
        }
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let mut conn = self.pool.get().await?;
        let created = diesel::insert_into(orders::table)
            .values(&order)
            .get_result::<Order>(&mut conn)
            .await?;
        Ok(created)
    }

    async fn all_orders_unscoped(&self) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .order(orders::order_id.asc())
            .load::<Order>(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn orders_for_ticket(&self, ticket_id: i32) -> Result<Vec<Order>> {
        let mut conn = self.pool.get().await?;
        let rows = orders::table
            .filter(orders::ticket_id.eq(ticket_id))
            .filter(orders::deleted_at.is_null())
            .order(orders::order_id.asc())
            .load::<Order>(&mut conn)
            .await?;
        Ok(rows)
    }

    async fn delete_order(&self, order_id: i32) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let affected = diesel::update(
            orders::table
                .filter(orders::order_id.eq(order_id))
                .filter(orders::deleted_at.is_null()),
        )
        .set((orders::deleted_at.eq(Some(now)), orders::updated_at.eq(now)))
        .execute(&mut conn)
        .await?;
        Ok(affected)
    }

    async fn delete_orders_for_ticket_unscoped(&self, ticket_id: i32) -> Result<usize> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();
        let affected = conn
            .transaction::<_, anyhow::Error, _>(|conn| {
                Box::pin(async move {
                    // rows deleted earlier keep their first deletion time
                    diesel::update(
                        orders::table
                            .filter(orders::ticket_id.eq(ticket_id))
                            .filter(orders::deleted_at.is_null()),
                    )
                    .set(orders::deleted_at.eq(Some(now)))
                    .execute(conn)
                    .await?;

                    let touched =
                        diesel::update(orders::table.filter(orders::ticket_id.eq(ticket_id)))
                            .set(orders::updated_at.eq(now))
                            .execute(conn)
                            .await?;
                    Ok(touched)
                })
            })
            .await?;
        Ok(affected)
    }

    async fn reset_order_sequence(&self) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::sql_query(RESET_ORDER_SEQUENCE_SQL)
            .execute(&mut conn)
            .await?;
        Ok(())
    }
}
