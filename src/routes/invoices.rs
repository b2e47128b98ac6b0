use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{
        Customer, Invoice, InvoiceLineItem, NewInvoice, NewInvoiceLineItem, ServiceCatalog,
        ServiceCatalogItem,
    },
    permissions::Capability,
    pricing::{CalculationMode, InvoiceTotals, LineItemAmounts},
    schema::{customers, invoice_line_items, invoices, jobs, service_catalog_items, service_catalogs},
    state::AppState,
    tenant::TenantContext,
    utils::json::{ensure_object, patch_field, patch_text},
    xero::build_invoice_payload,
};

pub const INVOICE_TYPES: &[&str] = &["DRAFT", "SUBMITTED", "APPROVED", "VOIDED", "DELETED"];
pub const DELIVERY_STATUSES: &[&str] = &["not_sent", "sent", "viewed"];
pub const PAYMENT_STATUSES: &[&str] = &["unpaid", "partially_paid", "paid", "overdue"];

#[derive(Deserialize, Default)]
pub struct InvoiceQuery {
    pub job_id: Option<Uuid>,
    pub payment_status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineItemInput {
    pub name: String,
    pub description: Option<String>,
    pub quantity: f64,
    #[serde(default)]
    pub cost: f64,
    pub price: f64,
    #[serde(default)]
    pub markup_percent: f64,
    #[serde(default)]
    pub tax_percent: f64,
    #[serde(default)]
    pub discount_percent: f64,
}

impl LineItemInput {
    fn amounts(&self) -> LineItemAmounts {
        LineItemAmounts {
            quantity: self.quantity,
            price: self.price,
            discount_percent: self.discount_percent,
            tax_percent: self.tax_percent,
            markup_percent: self.markup_percent,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateInvoiceRequest {
    pub job_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub invoice_type: Option<String>,
    pub delivery_status: Option<String>,
    pub payment_status: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[serde(default)]
    pub line_items: Vec<LineItemInput>,
}

#[derive(Deserialize)]
pub struct QuickInvoiceRequest {
    pub job_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub line_items: Vec<LineItemInput>,
}

#[derive(Deserialize)]
pub struct AddCatalogItemRequest {
    pub catalog_item_id: Uuid,
    pub quantity: f64,
}

#[derive(Serialize)]
pub struct InvoiceResponse {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = invoices)]
struct InvoiceChangeset {
    job_id: Option<Option<Uuid>>,
    customer_id: Option<Option<Uuid>>,
    invoice_type: Option<String>,
    delivery_status: Option<String>,
    payment_status: Option<String>,
    issue_date: Option<NaiveDate>,
    due_date: Option<Option<NaiveDate>>,
    notes: Option<Option<String>>,
}

impl InvoiceChangeset {
    fn is_empty(&self) -> bool {
        self.job_id.is_none()
            && self.customer_id.is_none()
            && self.invoice_type.is_none()
            && self.delivery_status.is_none()
            && self.payment_status.is_none()
            && self.issue_date.is_none()
            && self.due_date.is_none()
            && self.notes.is_none()
    }
}

fn one_of(field: &str, value: &str, allowed: &[&str]) -> AppResult<String> {
    if allowed.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(AppError::bad_request(format!(
            "invalid {field} '{value}'. Allowed: {}",
            allowed.join(", ")
        )))
    }
}

fn validate_line_items(items: &[LineItemInput]) -> AppResult<()> {
    for item in items {
        if item.name.trim().is_empty() {
            return Err(AppError::bad_request("line item name must not be empty"));
        }
        if !item.cost.is_finite() || item.cost < 0.0 {
            return Err(AppError::bad_request("cost must not be negative"));
        }
        item.amounts().validate()?;
    }
    Ok(())
}

const INVOICE_PREFIX: &str = "INV-";

fn invoice_sequence(number: &str) -> Option<u64> {
    number.strip_prefix(INVOICE_PREFIX)?.parse().ok()
}

/// One past the highest `INV-` number the company still holds.
pub(crate) fn next_invoice_number(conn: &mut PgConnection, company_id: Uuid) -> QueryResult<String> {
    let numbers: Vec<String> = invoices::table
        .filter(invoices::company_id.eq(company_id))
        .filter(invoices::invoice_number.like(format!("{INVOICE_PREFIX}%")))
        .select(invoices::invoice_number)
        .load(conn)?;
    let highest = numbers
        .iter()
        .filter_map(|number| invoice_sequence(number))
        .max()
        .unwrap_or(0);
    Ok(format!("{INVOICE_PREFIX}{:05}", highest + 1))
}

fn load_invoice(
    conn: &mut PgConnection,
    ctx: &TenantContext,
    invoice_id: Uuid,
) -> AppResult<Invoice> {
    let invoice: Invoice = invoices::table
        .find(invoice_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("invoice not found"))?;
    ctx.ensure_can_access(invoice.company_id)?;
    Ok(invoice)
}

fn load_line_items(conn: &mut PgConnection, invoice_id: Uuid) -> QueryResult<Vec<InvoiceLineItem>> {
    invoice_line_items::table
        .filter(invoice_line_items::invoice_id.eq(invoice_id))
        .order(invoice_line_items::position.asc())
        .load(conn)
}

fn invoice_response(conn: &mut PgConnection, invoice_id: Uuid) -> AppResult<InvoiceResponse> {
    let invoice: Invoice = invoices::table.find(invoice_id).first(conn)?;
    let line_items = load_line_items(conn, invoice_id)?;
    Ok(InvoiceResponse {
        invoice,
        line_items,
    })
}

fn ensure_links(
    conn: &mut PgConnection,
    company_id: Uuid,
    job_id: Option<Uuid>,
    customer_id: Option<Uuid>,
) -> AppResult<()> {
    if let Some(job_id) = job_id {
        let owner: Option<Uuid> = jobs::table
            .find(job_id)
            .select(jobs::company_id)
            .first(conn)
            .optional()?;
        if owner != Some(company_id) {
            return Err(AppError::bad_request("job does not exist in this company"));
        }
    }
    if let Some(customer_id) = customer_id {
        let owner: Option<Uuid> = customers::table
            .find(customer_id)
            .select(customers::company_id)
            .first(conn)
            .optional()?;
        if owner != Some(company_id) {
            return Err(AppError::bad_request("customer does not exist in this company"));
        }
    }
    Ok(())
}

fn line_item_row(
    invoice_id: Uuid,
    position: i32,
    item: &LineItemInput,
    mode: CalculationMode,
) -> NewInvoiceLineItem {
    NewInvoiceLineItem {
        id: Uuid::new_v4(),
        invoice_id,
        position,
        name: item.name.trim().to_string(),
        description: item
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string),
        quantity: item.quantity,
        cost: item.cost,
        price: item.price,
        markup_percent: item.markup_percent,
        tax_percent: item.tax_percent,
        discount_percent: item.discount_percent,
        total: item.amounts().total(mode),
        calculation_mode: mode.as_str().to_string(),
    }
}

fn replace_line_items(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    items: &[LineItemInput],
    mode: CalculationMode,
) -> QueryResult<()> {
    diesel::delete(
        invoice_line_items::table.filter(invoice_line_items::invoice_id.eq(invoice_id)),
    )
    .execute(conn)?;

    let rows: Vec<NewInvoiceLineItem> = items
        .iter()
        .zip(1..)
        .map(|(item, position)| line_item_row(invoice_id, position, item, mode))
        .collect();
    if !rows.is_empty() {
        diesel::insert_into(invoice_line_items::table)
            .values(&rows)
            .execute(conn)?;
    }
    Ok(())
}

/// Recomputes and stores the invoice totals from its current line items.
fn refresh_totals(conn: &mut PgConnection, invoice_id: Uuid) -> QueryResult<InvoiceTotals> {
    let items = load_line_items(conn, invoice_id)?;
    let priced: Vec<(LineItemAmounts, CalculationMode)> = items
        .iter()
        .map(|item| (item.amounts(), item.mode()))
        .collect();
    let totals = InvoiceTotals::from_items(priced.iter().map(|(amounts, mode)| (amounts, *mode)));

    diesel::update(invoices::table.find(invoice_id))
        .set((
            invoices::subtotal.eq(totals.subtotal),
            invoices::discount_total.eq(totals.discount_total),
            invoices::tax_total.eq(totals.tax_total),
            invoices::total.eq(totals.total),
        ))
        .execute(conn)?;
    Ok(totals)
}

struct InvoiceDraft {
    job_id: Option<Uuid>,
    customer_id: Option<Uuid>,
    invoice_type: String,
    delivery_status: String,
    payment_status: String,
    issue_date: NaiveDate,
    due_date: Option<NaiveDate>,
    notes: Option<String>,
}

fn insert_invoice(
    conn: &mut PgConnection,
    company_id: Uuid,
    draft: InvoiceDraft,
    items: &[LineItemInput],
    mode: CalculationMode,
) -> AppResult<Uuid> {
    conn.transaction::<_, AppError, _>(|conn| {
        ensure_links(conn, company_id, draft.job_id, draft.customer_id)?;
        let new_invoice = NewInvoice {
            id: Uuid::new_v4(),
            company_id,
            job_id: draft.job_id,
            customer_id: draft.customer_id,
            invoice_number: next_invoice_number(conn, company_id)?,
            invoice_type: draft.invoice_type,
            delivery_status: draft.delivery_status,
            payment_status: draft.payment_status,
            issue_date: draft.issue_date,
            due_date: draft.due_date,
            notes: draft.notes,
        };
        diesel::insert_into(invoices::table)
            .values(&new_invoice)
            .execute(conn)?;
        replace_line_items(conn, new_invoice.id, items, mode)?;
        refresh_totals(conn, new_invoice.id)?;
        Ok(new_invoice.id)
    })
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list_invoices(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<InvoiceQuery>,
) -> AppResult<Json<Vec<Invoice>>> {
    user.permissions().require(Capability::ViewFinancials)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let mut query = invoices::table
        .filter(invoices::company_id.eq(ctx.effective_company_id()))
        .into_boxed();
    if let Some(job_id) = params.job_id {
        query = query.filter(invoices::job_id.eq(job_id));
    }
    if let Some(status) = params.payment_status.as_deref().filter(|s| !s.is_empty()) {
        let status = one_of("payment_status", status, PAYMENT_STATUSES)?;
        query = query.filter(invoices::payment_status.eq(status));
    }

    let rows: Vec<Invoice> = query
        .order((invoices::issue_date.desc(), invoices::invoice_number.desc()))
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceResponse>> {
    user.permissions().require(Capability::ViewFinancials)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_invoice(&mut conn, &ctx, invoice_id)?;
    Ok(Json(invoice_response(&mut conn, invoice_id)?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateInvoiceRequest>,
) -> AppResult<(StatusCode, Json<InvoiceResponse>)> {
    user.permissions().require(Capability::ManageInvoices)?;
    validate_line_items(&payload.line_items)?;

    let draft = InvoiceDraft {
        job_id: payload.job_id,
        customer_id: payload.customer_id,
        invoice_type: one_of(
            "invoice_type",
            payload.invoice_type.as_deref().unwrap_or("DRAFT"),
            INVOICE_TYPES,
        )?,
        delivery_status: one_of(
            "delivery_status",
            payload.delivery_status.as_deref().unwrap_or("not_sent"),
            DELIVERY_STATUSES,
        )?,
        payment_status: one_of(
            "payment_status",
            payload.payment_status.as_deref().unwrap_or("unpaid"),
            PAYMENT_STATUSES,
        )?,
        issue_date: payload
            .issue_date
            .unwrap_or_else(|| Utc::now().date_naive()),
        due_date: payload.due_date,
        notes: clean(payload.notes),
    };

    let ctx = user.tenant();
    let company_id = ctx.effective_company_id();
    let mut conn = state.tenant_db(&ctx)?;
    let invoice_id = insert_invoice(
        &mut conn,
        company_id,
        draft,
        &payload.line_items,
        CalculationMode::Full,
    )?;

    let response = invoice_response(&mut conn, invoice_id)?;
    tracing::info!(
        invoice_id = %invoice_id,
        company_id = %company_id,
        invoice_number = %response.invoice.invoice_number,
        total = response.invoice.total,
        "invoice created"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn create_quick_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<QuickInvoiceRequest>,
) -> AppResult<(StatusCode, Json<InvoiceResponse>)> {
    user.permissions().require(Capability::ManageInvoices)?;
    if payload.line_items.is_empty() {
        return Err(AppError::bad_request("a quick invoice needs at least one line item"));
    }
    validate_line_items(&payload.line_items)?;

    let draft = InvoiceDraft {
        job_id: payload.job_id,
        customer_id: payload.customer_id,
        invoice_type: "DRAFT".to_string(),
        delivery_status: "not_sent".to_string(),
        payment_status: "unpaid".to_string(),
        issue_date: Utc::now().date_naive(),
        due_date: payload.due_date,
        notes: clean(payload.notes),
    };

    let ctx = user.tenant();
    let company_id = ctx.effective_company_id();
    let mut conn = state.tenant_db(&ctx)?;
    let invoice_id = insert_invoice(
        &mut conn,
        company_id,
        draft,
        &payload.line_items,
        CalculationMode::Simple,
    )?;

    tracing::info!(invoice_id = %invoice_id, company_id = %company_id, "quick invoice created");
    Ok((StatusCode::CREATED, Json(invoice_response(&mut conn, invoice_id)?)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<InvoiceResponse>> {
    user.permissions().require(Capability::ManageInvoices)?;
    ensure_object(&body).map_err(AppError::bad_request)?;

    let required_choice = |field: &str, allowed: &[&str]| -> AppResult<Option<String>> {
        patch_text(&body, field)
            .and_then(|patch| patch.into_required(field))
            .map_err(AppError::bad_request)?
            .map(|value| one_of(field, &value, allowed))
            .transpose()
    };

    let changes = InvoiceChangeset {
        job_id: patch_field::<Uuid>(&body, "job_id")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        customer_id: patch_field::<Uuid>(&body, "customer_id")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        invoice_type: required_choice("invoice_type", INVOICE_TYPES)?,
        delivery_status: required_choice("delivery_status", DELIVERY_STATUSES)?,
        payment_status: required_choice("payment_status", PAYMENT_STATUSES)?,
        issue_date: patch_field::<NaiveDate>(&body, "issue_date")
            .and_then(|patch| patch.into_required("issue_date"))
            .map_err(AppError::bad_request)?,
        due_date: patch_field::<NaiveDate>(&body, "due_date")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        notes: patch_text(&body, "notes")
            .map_err(AppError::bad_request)?
            .into_nullable(),
    };

    let line_items = patch_field::<Vec<LineItemInput>>(&body, "line_items")
        .and_then(|patch| patch.into_required("line_items"))
        .map_err(AppError::bad_request)?;
    if let Some(items) = &line_items {
        validate_line_items(items)?;
    }

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_invoice(&mut conn, &ctx, invoice_id)?;

    conn.transaction::<_, AppError, _>(|conn| {
        ensure_links(
            conn,
            existing.company_id,
            changes.job_id.flatten(),
            changes.customer_id.flatten(),
        )?;
        if !changes.is_empty() {
            diesel::update(invoices::table.find(invoice_id))
                .set(&changes)
                .execute(conn)?;
        }
        if let Some(items) = &line_items {
            replace_line_items(conn, invoice_id, items, CalculationMode::Full)?;
            refresh_totals(conn, invoice_id)?;
        }
        Ok(())
    })?;

    Ok(Json(invoice_response(&mut conn, invoice_id)?))
}

pub async fn add_catalog_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<AddCatalogItemRequest>,
) -> AppResult<(StatusCode, Json<InvoiceResponse>)> {
    user.permissions().require(Capability::ManageInvoices)?;

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let invoice = load_invoice(&mut conn, &ctx, invoice_id)?;

    let (catalog_item, catalog): (ServiceCatalogItem, ServiceCatalog) = service_catalog_items::table
        .inner_join(service_catalogs::table)
        .filter(service_catalog_items::id.eq(payload.catalog_item_id))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("catalog item not found"))?;
    if catalog.company_id != invoice.company_id {
        return Err(AppError::bad_request("catalog item belongs to another company"));
    }

    let input = LineItemInput {
        name: catalog_item.name,
        description: catalog_item.description,
        quantity: payload.quantity,
        cost: catalog_item.cost,
        price: catalog_item.price,
        markup_percent: catalog_item.markup_percent,
        tax_percent: catalog_item.tax_percent,
        discount_percent: 0.0,
    };
    validate_line_items(std::slice::from_ref(&input))?;

    conn.transaction::<_, AppError, _>(|conn| {
        let last: Option<i32> = invoice_line_items::table
            .filter(invoice_line_items::invoice_id.eq(invoice_id))
            .select(diesel::dsl::max(invoice_line_items::position))
            .first(conn)?;
        let row = line_item_row(
            invoice_id,
            last.unwrap_or(0) + 1,
            &input,
            CalculationMode::Simple,
        );
        diesel::insert_into(invoice_line_items::table)
            .values(&row)
            .execute(conn)?;
        refresh_totals(conn, invoice_id)?;
        Ok(())
    })?;

    Ok((StatusCode::CREATED, Json(invoice_response(&mut conn, invoice_id)?)))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::ManageInvoices)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_invoice(&mut conn, &ctx, invoice_id)?;

    diesel::delete(invoices::table.find(invoice_id)).execute(&mut conn)?;
    tracing::info!(invoice_id = %invoice_id, user_id = %user.user_id, "invoice deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sync_to_xero(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceResponse>> {
    user.permissions().require(Capability::ManageInvoices)?;
    let accounting = state
        .accounting
        .clone()
        .ok_or_else(|| AppError::bad_request("xero integration is not configured"))?;

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let invoice = load_invoice(&mut conn, &ctx, invoice_id)?;
    let items = load_line_items(&mut conn, invoice_id)?;

    let customer_id = invoice
        .customer_id
        .ok_or_else(|| AppError::bad_request("invoice needs a customer before it can be synced"))?;
    let customer: Customer = customers::table.find(customer_id).first(&mut conn)?;

    let payload = build_invoice_payload(&invoice, &items, &customer.name, accounting.account_code())?;

    match accounting.push_invoice(&payload).await {
        Ok(remote_id) => {
            diesel::update(invoices::table.find(invoice_id))
                .set((
                    invoices::xero_invoice_id.eq(Some(remote_id.as_str())),
                    invoices::xero_synced_at.eq(Some(Utc::now().naive_utc())),
                    invoices::xero_sync_error.eq(None::<String>),
                ))
                .execute(&mut conn)?;
            tracing::info!(invoice_id = %invoice_id, xero_invoice_id = %remote_id, "invoice synced to xero");
        }
        Err(err) => {
            let message = err.to_string();
            diesel::update(invoices::table.find(invoice_id))
                .set(invoices::xero_sync_error.eq(Some(message.as_str())))
                .execute(&mut conn)?;
            tracing::warn!(invoice_id = %invoice_id, error = %message, "xero sync failed");
            return Err(err.into());
        }
    }

    Ok(Json(invoice_response(&mut conn, invoice_id)?))
}
