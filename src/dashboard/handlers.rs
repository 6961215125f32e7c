use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use super::repo::{self, CardCounts, LatestInvoiceRow, Revenue};
use crate::{
    auth::{adapter::SessionUser, session::CurrentUser},
    error::AppError,
    format::format_currency,
    state::AppState,
};

#[derive(Debug, Serialize, PartialEq)]
pub struct CardData {
    pub number_of_invoices: i64,
    pub number_of_customers: i64,
    pub total_paid_invoices: String,
    pub total_pending_invoices: String,
}

impl From<CardCounts> for CardData {
    fn from(c: CardCounts) -> Self {
        Self {
            number_of_invoices: c.invoices,
            number_of_customers: c.customers,
            total_paid_invoices: format_currency(c.totals.paid),
            total_pending_invoices: format_currency(c.totals.pending),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LatestInvoice {
    pub id: Uuid,
    pub name: String,
    pub image_url: String,
    pub email: String,
    pub amount: String,
}

impl From<LatestInvoiceRow> for LatestInvoice {
    fn from(r: LatestInvoiceRow) -> Self {
        Self {
            id: r.id,
            name: r.name,
            image_url: r.image_url,
            email: r.email,
            amount: format_currency(i64::from(r.amount)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Overview {
    pub user: SessionUser,
    pub cards: CardData,
    pub revenue: Vec<Revenue>,
    pub latest_invoices: Vec<LatestInvoice>,
}

pub fn overview_routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(overview))
}

#[instrument(skip(state))]
pub async fn overview(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Overview>, AppError> {
    let (cards, revenue, latest) = tokio::try_join!(
        repo::fetch_card_data(&state.db),
        repo::fetch_revenue(&state.db),
        repo::fetch_latest_invoices(&state.db),
    )?;
    Ok(Json(Overview {
        user,
        cards: cards.into(),
        revenue,
        latest_invoices: latest.into_iter().map(LatestInvoice::from).collect(),
    }))
}
