use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use super::dto::{
    CreateInvoicePage, EditInvoicePage, InvoiceForm, InvoiceSearch, InvoicesPage, InvoicesTableRow,
};
use super::{repo, services};
use crate::{
    actions::ActionResult,
    customers,
    error::AppError,
    format::{format_currency, format_date_to_local},
    state::AppState,
    validation::RawForm,
};

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/invoices", get(list_invoices).post(create_invoice))
        .route("/dashboard/invoices/create", get(create_invoice_page))
        .route("/dashboard/invoices/:id", post(update_invoice))
        .route("/dashboard/invoices/:id/edit", get(edit_invoice_page))
        .route("/dashboard/invoices/:id/delete", post(delete_invoice))
}

/// Served from the view cache until an invoice action invalidates it.
#[instrument(skip(state))]
pub async fn list_invoices(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    Query(search): Query<InvoiceSearch>,
) -> Result<Json<Value>, AppError> {
    let key = uri.to_string();
    let db = &state.db;
    let search = &search;
    let view = state
        .views
        .get_or_render(&key, || async move {
            let (rows, total_pages) = tokio::try_join!(
                repo::fetch_filtered(db, &search.query, search.page),
                repo::fetch_pages(db, &search.query),
            )?;
            let page = InvoicesPage {
                invoices: rows
                    .into_iter()
                    .map(|r| InvoicesTableRow {
                        id: r.id,
                        customer_id: r.customer_id,
                        name: r.name,
                        email: r.email,
                        image_url: r.image_url,
                        date: format_date_to_local(r.date),
                        amount: format_currency(i64::from(r.amount)),
                        status: r.status,
                    })
                    .collect(),
                total_pages,
                current_page: search.page,
            };
            Ok(serde_json::to_value(&page)?)
        })
        .await?;
    Ok(Json(view))
}

#[instrument(skip(state))]
pub async fn create_invoice_page(
    State(state): State<AppState>,
) -> Result<Json<CreateInvoicePage>, AppError> {
    let customers = customers::repo::fetch_customers(&state.db).await?;
    Ok(Json(CreateInvoicePage { customers }))
}

#[instrument(skip(state))]
pub async fn edit_invoice_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EditInvoicePage>, AppError> {
    let (invoice, customers) = tokio::try_join!(
        repo::fetch_by_id(&state.db, id),
        customers::repo::fetch_customers(&state.db),
    )?;
    let invoice = invoice.ok_or(AppError::NotFound)?;
    Ok(Json(EditInvoicePage {
        invoice: InvoiceForm {
            id: invoice.id,
            customer_id: invoice.customer_id,
            amount: f64::from(invoice.amount) / 100.0,
            status: invoice.status,
        },
        customers,
    }))
}

#[instrument(skip(state, form))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Form(form): Form<RawForm>,
) -> ActionResult {
    services::create_invoice(&state, &form).await
}

#[instrument(skip(state, form))]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<RawForm>,
) -> ActionResult {
    services::update_invoice(&state, &id, &form).await
}

#[instrument(skip(state))]
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> (StatusCode, String) {
    match services::delete_invoice(&state, &id).await {
        Ok(message) => (StatusCode::OK, message.to_string()),
        Err(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
    }
}
