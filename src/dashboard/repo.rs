use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Revenue {
    pub month: String,
    pub revenue: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct LatestInvoiceRow {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub email: String,
    pub amount: i32,
}

#[derive(Debug, Clone, Default, PartialEq, FromRow)]
pub struct InvoiceTotals {
    pub paid: i64,
    pub pending: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardCounts {
    pub invoices: i64,
    pub customers: i64,
    pub totals: InvoiceTotals,
}

pub async fn fetch_revenue(db: &PgPool) -> anyhow::Result<Vec<Revenue>> {
    let rows = sqlx::query_as::<_, Revenue>(r#"SELECT month, revenue FROM revenue"#)
        .fetch_all(db)
        .await?;
    Ok(rows)
}

pub async fn fetch_latest_invoices(db: &PgPool) -> anyhow::Result<Vec<LatestInvoiceRow>> {
    let rows = sqlx::query_as::<_, LatestInvoiceRow>(
        r#"
        SELECT invoices.id, customers.name, customers.image_url, customers.email, invoices.amount
          FROM invoices
          JOIN customers ON invoices.customer_id = customers.id
         ORDER BY invoices.date DESC
         LIMIT 5
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

pub async fn fetch_card_data(db: &PgPool) -> anyhow::Result<CardCounts> {
    let invoice_count = sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM invoices"#).fetch_one(db);
    let customer_count =
        sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM customers"#).fetch_one(db);
    let totals = sqlx::query_as::<_, InvoiceTotals>(
        r#"
        SELECT COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0 END), 0)::bigint AS paid,
               COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0 END), 0)::bigint AS pending
          FROM invoices
        "#,
    )
    .fetch_one(db);

    let (invoices, customers, totals) = tokio::try_join!(invoice_count, customer_count, totals)?;
    Ok(CardCounts {
        invoices,
        customers,
        totals,
    })
}
