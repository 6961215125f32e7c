use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::customers::repo::CustomerField;
use crate::validation::{FieldErrors, RawForm, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Paid,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
        }
    }
}

impl FromStr for InvoiceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvoiceStatus::Pending),
            "paid" => Ok(InvoiceStatus::Paid),
            _ => Err(()),
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated invoice form. `amount_cents` is always positive.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceInput {
    pub customer_id: String,
    pub amount_cents: i32,
    pub status: InvoiceStatus,
}

/// Row written by the create action.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub customer_id: String,
    pub amount_cents: i32,
    pub status: InvoiceStatus,
    pub date: Date,
}

impl InvoiceInput {
    /// Fields `customerId`, `amount` (dollars) and `status`.
    pub fn validate(form: &RawForm) -> Result<Self, FieldErrors> {
        let mut v = Validator::new(form);
        let customer_id = v.required("customerId", "Please select a customer.");
        let amount = v.number("amount", "Please enter a valid amount.");
        let amount = v.greater_than("amount", amount, 0.0, "Please enter an amount greater than $0.");
        let amount_cents = amount.and_then(|dollars| match to_cents(dollars) {
            Some(0) => {
                v.reject("amount", "Please enter an amount greater than $0.");
                None
            }
            Some(cents) => Some(cents),
            None => {
                v.reject("amount", "Please enter a smaller amount.");
                None
            }
        });
        let status = v.one_of::<InvoiceStatus>("status", "Please select an invoice status.");

        let input = customer_id
            .zip(amount_cents)
            .zip(status)
            .map(|((customer_id, amount_cents), status)| InvoiceInput {
                customer_id: customer_id.to_string(),
                amount_cents,
                status,
            });
        v.finish(input)
    }
}

/// Dollars to whole cents. `None` when the result does not fit the column.
pub fn to_cents(dollars: f64) -> Option<i32> {
    let cents = (dollars * 100.0).round();
    if cents < 0.0 || cents > i32::MAX as f64 {
        return None;
    }
    Some(cents as i32)
}

#[derive(Debug, Deserialize)]
pub struct InvoiceSearch {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_page", deserialize_with = "lenient_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

/// Anything that is not a positive integer reads as the first page.
fn lenient_page<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|page| *page >= 1)
        .unwrap_or_else(default_page))
}

#[derive(Debug, Serialize)]
pub struct InvoicesTableRow {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub email: String,
    pub image_url: String,
    pub date: String,
    pub amount: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct InvoicesPage {
    pub invoices: Vec<InvoicesTableRow>,
    pub total_pages: i64,
    pub current_page: i64,
}

/// Invoice as the edit form shows it, amount back in dollars.
#[derive(Debug, Serialize)]
pub struct InvoiceForm {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub amount: f64,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct EditInvoicePage {
    pub invoice: InvoiceForm,
    pub customers: Vec<CustomerField>,
}

#[derive(Debug, Serialize)]
pub struct CreateInvoicePage {
    pub customers: Vec<CustomerField>,
}
