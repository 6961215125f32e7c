use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::repo::{self, CustomerTotalsRow};
use crate::{error::AppError, format::format_currency, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CustomerSearch {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct CustomersTableRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub total_invoices: i64,
    pub total_pending: String,
    pub total_paid: String,
}

impl From<CustomerTotalsRow> for CustomersTableRow {
    fn from(r: CustomerTotalsRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            email: r.email,
            image_url: r.image_url,
            total_invoices: r.total_invoices,
            total_pending: format_currency(r.total_pending),
            total_paid: format_currency(r.total_paid),
        }
    }
}

pub fn customer_routes() -> Router<AppState> {
    Router::new().route("/dashboard/customers", get(list_customers))
}

#[instrument(skip(state))]
pub async fn list_customers(
    State(state): State<AppState>,
    Query(search): Query<CustomerSearch>,
) -> Result<Json<Vec<CustomersTableRow>>, AppError> {
    let rows = repo::fetch_filtered_customers(&state.db, &search.query).await?;
    Ok(Json(rows.into_iter().map(CustomersTableRow::from).collect()))
}
