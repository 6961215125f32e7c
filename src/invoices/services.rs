use time::OffsetDateTime;
use tracing::{debug, error, info, instrument};

use super::dto::{InvoiceInput, NewInvoice};
use crate::actions::{ActionResult, FormState};
use crate::state::AppState;
use crate::validation::RawForm;

pub const INVOICES_PATH: &str = "/dashboard/invoices";

#[instrument(skip(st, form))]
pub async fn create_invoice(st: &AppState, form: &RawForm) -> ActionResult {
    let input = match InvoiceInput::validate(form) {
        Ok(input) => input,
        Err(errors) => {
            debug!(?errors, "create invoice rejected");
            return ActionResult::Invalid(FormState::invalid(
                errors,
                "Missing Fields. Failed to Create Invoice.",
            ));
        }
    };

    let invoice = NewInvoice {
        customer_id: input.customer_id,
        amount_cents: input.amount_cents,
        status: input.status,
        date: OffsetDateTime::now_utc().date(),
    };

    if let Err(e) = st.invoices.insert(&invoice).await {
        error!(error = %e, customer_id = %invoice.customer_id, "insert invoice failed");
        return ActionResult::Failed(FormState::message(format!(
            "Database Error: Failed to Create Invoice. {e}"
        )));
    }

    info!(
        customer_id = %invoice.customer_id,
        amount = invoice.amount_cents,
        status = %invoice.status,
        "invoice created"
    );
    st.views.invalidate(INVOICES_PATH).await;
    ActionResult::redirect(INVOICES_PATH)
}

#[instrument(skip(st, form))]
pub async fn update_invoice(st: &AppState, id: &str, form: &RawForm) -> ActionResult {
    let input = match InvoiceInput::validate(form) {
        Ok(input) => input,
        Err(errors) => {
            debug!(?errors, "update invoice rejected");
            return ActionResult::Invalid(FormState::invalid(
                errors,
                "Missing Fields. Failed to Update Invoice.",
            ));
        }
    };

    if let Err(e) = st.invoices.update(id, &input).await {
        error!(error = %e, %id, "update invoice failed");
        return ActionResult::Failed(FormState::message(format!(
            "Database Error: Failed to Update Invoice. {e}"
        )));
    }

    info!(%id, "invoice updated");
    st.views.invalidate(INVOICES_PATH).await;
    ActionResult::redirect(INVOICES_PATH)
}

/// No redirect: the listing stays where it is and re-renders.
#[instrument(skip(st))]
pub async fn delete_invoice(st: &AppState, id: &str) -> Result<&'static str, String> {
    if let Err(e) = st.invoices.delete(id).await {
        error!(error = %e, %id, "delete invoice failed");
        return Err(format!("Database Error: Failed to Delete Invoice. {e}"));
    }
    info!(%id, "invoice deleted");
    st.views.invalidate(INVOICES_PATH).await;
    Ok("Deleted Invoice.")
}
