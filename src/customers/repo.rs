use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Option in the invoice form's customer select.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CustomerField {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomerTotalsRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub total_invoices: i64,
    pub total_pending: i64,
    pub total_paid: i64,
}

pub async fn fetch_customers(db: &PgPool) -> anyhow::Result<Vec<CustomerField>> {
    let rows = sqlx::query_as::<_, CustomerField>(
        r#"
        SELECT id, name
          FROM customers
         ORDER BY name ASC
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Customers whose name or email matches `query`, with invoice totals in cents.
pub async fn fetch_filtered_customers(
    db: &PgPool,
    query: &str,
) -> anyhow::Result<Vec<CustomerTotalsRow>> {
    let rows = sqlx::query_as::<_, CustomerTotalsRow>(
        r#"
        SELECT customers.id, customers.name, customers.email, customers.image_url,
               COUNT(invoices.id) AS total_invoices,
               COALESCE(SUM(CASE WHEN invoices.status = 'pending' THEN invoices.amount ELSE 0 END), 0)::bigint AS total_pending,
               COALESCE(SUM(CASE WHEN invoices.status = 'paid' THEN invoices.amount ELSE 0 END), 0)::bigint AS total_paid
          FROM customers
          LEFT JOIN invoices ON customers.id = invoices.customer_id
         WHERE customers.name ILIKE $1
            OR customers.email ILIKE $1
         GROUP BY customers.id, customers.name, customers.email, customers.image_url
         ORDER BY customers.name ASC
        "#,
    )
    .bind(format!("%{}%", query))
    .fetch_all(db)
    .await?;
    Ok(rows)
}
