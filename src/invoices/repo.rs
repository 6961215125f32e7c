use async_trait::async_trait;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use time::Date;
use tracing::debug;
use uuid::Uuid;

use super::dto::{InvoiceInput, NewInvoice};

pub const ITEMS_PER_PAGE: i64 = 6;

/// Writes issued by the invoice actions. One statement per call.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert(&self, invoice: &NewInvoice) -> anyhow::Result<()>;
    async fn update(&self, id: &str, changes: &InvoiceInput) -> anyhow::Result<()>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct PgInvoiceStore {
    db: PgPool,
}

impl PgInvoiceStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceStore {
    async fn insert(&self, invoice: &NewInvoice) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (customer_id, amount, status, date)
            VALUES ($1::uuid, $2, $3, $4)
            "#,
        )
        .bind(&invoice.customer_id)
        .bind(invoice.amount_cents)
        .bind(invoice.status.as_str())
        .bind(invoice.date)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn update(&self, id: &str, changes: &InvoiceInput) -> anyhow::Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE invoices
               SET customer_id = $1::uuid, amount = $2, status = $3
             WHERE id = $4::uuid
            "#,
        )
        .bind(&changes.customer_id)
        .bind(changes.amount_cents)
        .bind(changes.status.as_str())
        .bind(id)
        .execute(&self.db)
        .await?;
        debug!(%id, rows = res.rows_affected(), "invoice updated");
        Ok(())
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let res = sqlx::query(r#"DELETE FROM invoices WHERE id = $1::uuid"#)
            .bind(id)
            .execute(&self.db)
            .await?;
        debug!(%id, rows = res.rows_affected(), "invoice deleted");
        Ok(())
    }
}

// ---- Queries ----

#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub date: Date,
    pub amount: i32,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: i32,
    pub status: String,
}

fn pattern(query: &str) -> String {
    format!("%{}%", query)
}

/// One page of invoices whose customer, amount, date or status matches `query`.
pub async fn fetch_filtered(
    db: &PgPool,
    query: &str,
    current_page: i64,
) -> anyhow::Result<Vec<InvoiceRow>> {
    let offset = page_offset(current_page);
    let rows = sqlx::query_as::<_, InvoiceRow>(
        r#"
        SELECT invoices.id, invoices.customer_id, customers.name, customers.email,
               customers.image_url, invoices.date, invoices.amount, invoices.status
          FROM invoices
          JOIN customers ON invoices.customer_id = customers.id
         WHERE customers.name ILIKE $1
            OR customers.email ILIKE $1
            OR invoices.amount::text ILIKE $1
            OR invoices.date::text ILIKE $1
            OR invoices.status ILIKE $1
         ORDER BY invoices.date DESC
         LIMIT $2 OFFSET $3
        "#,
    )
    .bind(pattern(query))
    .bind(ITEMS_PER_PAGE)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn fetch_pages(db: &PgPool, query: &str) -> anyhow::Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
          FROM invoices
          JOIN customers ON invoices.customer_id = customers.id
         WHERE customers.name ILIKE $1
            OR customers.email ILIKE $1
            OR invoices.amount::text ILIKE $1
            OR invoices.date::text ILIKE $1
            OR invoices.status ILIKE $1
        "#,
    )
    .bind(pattern(query))
    .fetch_one(db)
    .await?;
    Ok(total_pages(count))
}

/// Rows to skip for `page`, clamped so the product cannot overflow.
pub fn page_offset(page: i64) -> i64 {
    (page.clamp(1, i64::MAX / ITEMS_PER_PAGE) - 1) * ITEMS_PER_PAGE
}

pub fn total_pages(count: i64) -> i64 {
    (count + ITEMS_PER_PAGE - 1) / ITEMS_PER_PAGE
}

pub async fn fetch_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<InvoiceRecord>> {
    let row = sqlx::query_as::<_, InvoiceRecord>(
        r#"
        SELECT id, customer_id, amount, status
          FROM invoices
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}
