//! Pushes invoices to Xero as accounts-receivable invoices.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::XeroConfig;
use crate::error::AppError;
use crate::models::{Invoice, InvoiceLineItem};
use crate::pricing::CalculationMode;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invoices of type {0} cannot be synced")]
    UnsupportedType(String),
    #[error("xero request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("xero rejected the invoice ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("xero response did not include an invoice id")]
    MissingInvoiceId,
}

impl From<SyncError> for AppError {
    fn from(value: SyncError) -> Self {
        match value {
            SyncError::UnsupportedType(_) => AppError::bad_request(value.to_string()),
            _ => AppError::bad_gateway(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroInvoice {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    pub contact: XeroContact,
    pub invoice_number: String,
    pub reference: Option<String>,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub line_amount_types: &'static str,
    pub status: &'static str,
    pub line_items: Vec<XeroLineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroContact {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XeroLineItem {
    pub description: String,
    pub quantity: f64,
    pub unit_amount: f64,
    pub discount_rate: f64,
    pub account_code: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XeroInvoicesResponse {
    #[serde(default)]
    invoices: Vec<XeroInvoiceRef>,
}

#[derive(Deserialize)]
struct XeroInvoiceRef {
    #[serde(rename = "InvoiceID")]
    invoice_id: Option<String>,
}

fn xero_status(invoice_type: &str) -> Result<&'static str, SyncError> {
    match invoice_type {
        "SUBMITTED" => Ok("SUBMITTED"),
        "APPROVED" => Ok("AUTHORISED"),
        other => Err(SyncError::UnsupportedType(other.to_string())),
    }
}

pub fn build_invoice_payload(
    invoice: &Invoice,
    items: &[InvoiceLineItem],
    contact_name: &str,
    account_code: &str,
) -> Result<XeroInvoice, SyncError> {
    let status = xero_status(&invoice.invoice_type)?;
    let line_items = items
        .iter()
        .map(|item| XeroLineItem {
            description: match item.description.as_deref() {
                Some(description) if !description.trim().is_empty() => {
                    format!("{} - {}", item.name, description.trim())
                }
                _ => item.name.clone(),
            },
            quantity: item.quantity,
            unit_amount: item.price,
            discount_rate: match item.mode() {
                CalculationMode::Full => item.discount_percent,
                CalculationMode::Simple => 0.0,
            },
            account_code: account_code.to_string(),
        })
        .collect();

    Ok(XeroInvoice {
        kind: "ACCREC",
        contact: XeroContact {
            name: contact_name.to_string(),
        },
        invoice_number: invoice.invoice_number.clone(),
        reference: invoice.job_id.map(|id| format!("job:{id}")),
        date: invoice.issue_date.format("%Y-%m-%d").to_string(),
        due_date: invoice
            .due_date
            .map(|date| date.format("%Y-%m-%d").to_string()),
        line_amount_types: "Exclusive",
        status,
        line_items,
    })
}

#[async_trait]
pub trait AccountingSync: Send + Sync + 'static {
    /// Sends the invoice and returns the remote invoice id.
    async fn push_invoice(&self, invoice: &XeroInvoice) -> Result<String, SyncError>;

    fn account_code(&self) -> &str;
}

pub struct XeroClient {
    http: Client,
    config: XeroConfig,
}

impl XeroClient {
    pub fn new(config: XeroConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AccountingSync for XeroClient {
    async fn push_invoice(&self, invoice: &XeroInvoice) -> Result<String, SyncError> {
        let url = format!("{}/Invoices", self.config.api_base);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .header("xero-tenant-id", &self.config.tenant_id)
            .header("accept", "application/json")
            .json(&serde_json::json!({ "Invoices": [invoice] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: XeroInvoicesResponse = response.json().await?;
        parsed
            .invoices
            .into_iter()
            .find_map(|entry| entry.invoice_id)
            .ok_or(SyncError::MissingInvoiceId)
    }

    fn account_code(&self) -> &str {
        &self.config.sales_account_code
    }
}
