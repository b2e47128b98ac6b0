use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use crate::pricing::{CalculationMode, LineItemAmounts};
use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = companies)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub logo_url: Option<String>,
    pub primary_color: Option<String>,
    pub abn: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = companies)]
pub struct NewCompany {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = company_access)]
pub struct NewCompanyAccess {
    pub user_id: Uuid,
    pub company_id: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = customers)]
pub struct Customer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub postal_address: Option<String>,
    pub pricing_tier: Option<String>,
    pub default_markup_percent: Option<f64>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = customers)]
pub struct NewCustomer {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address: Option<String>,
    pub postal_address: Option<String>,
    pub pricing_tier: Option<String>,
    pub default_markup_percent: Option<f64>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub site_address: Option<String>,
    pub status: String,
    pub phase: String,
    pub scheduled_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub company_id: Uuid,
    pub customer_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub site_address: Option<String>,
    pub status: String,
    pub phase: String,
    pub scheduled_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = invoices)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub job_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub invoice_number: String,
    pub invoice_type: String,
    pub delivery_status: String,
    pub payment_status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub subtotal: f64,
    pub discount_total: f64,
    pub tax_total: f64,
    pub total: f64,
    pub xero_invoice_id: Option<String>,
    pub xero_synced_at: Option<NaiveDateTime>,
    pub xero_sync_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoices)]
pub struct NewInvoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub job_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub invoice_number: String,
    pub invoice_type: String,
    pub delivery_status: String,
    pub payment_status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = invoice_line_items)]
#[diesel(belongs_to(Invoice))]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub position: i32,
    pub name: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub cost: f64,
    pub price: f64,
    pub markup_percent: f64,
    pub tax_percent: f64,
    pub discount_percent: f64,
    pub total: f64,
    pub calculation_mode: String,
    pub created_at: NaiveDateTime,
}

impl InvoiceLineItem {
    pub fn amounts(&self) -> LineItemAmounts {
        LineItemAmounts {
            quantity: self.quantity,
            price: self.price,
            discount_percent: self.discount_percent,
            tax_percent: self.tax_percent,
            markup_percent: self.markup_percent,
        }
    }

    pub fn mode(&self) -> CalculationMode {
        CalculationMode::from_stored(&self.calculation_mode)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = invoice_line_items)]
pub struct NewInvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub position: i32,
    pub name: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub cost: f64,
    pub price: f64,
    pub markup_percent: f64,
    pub tax_percent: f64,
    pub discount_percent: f64,
    pub total: f64,
    pub calculation_mode: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = service_catalogs)]
pub struct ServiceCatalog {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_catalogs)]
pub struct NewServiceCatalog {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations, Serialize)]
#[diesel(table_name = service_catalog_items)]
#[diesel(belongs_to(ServiceCatalog, foreign_key = catalog_id))]
pub struct ServiceCatalogItem {
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cost: f64,
    pub price: f64,
    pub markup_percent: f64,
    pub tax_percent: f64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = service_catalog_items)]
pub struct NewServiceCatalogItem {
    pub id: Uuid,
    pub catalog_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub cost: f64,
    pub price: f64,
    pub markup_percent: f64,
    pub tax_percent: f64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Serialize)]
#[diesel(table_name = tasks)]
pub struct Task {
    pub id: Uuid,
    pub company_id: Uuid,
    pub job_id: Option<Uuid>,
    pub description: String,
    pub assignee_ids: Vec<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub completed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tasks)]
pub struct NewTask {
    pub id: Uuid,
    pub company_id: Uuid,
    pub job_id: Option<Uuid>,
    pub description: String,
    pub assignee_ids: Vec<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
