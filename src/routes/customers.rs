use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Customer, NewCustomer},
    permissions::Capability,
    schema::customers,
    state::AppState,
    utils::{
        json::{ensure_object, patch_field, patch_text},
        validation::normalize_email,
    },
};

#[derive(Deserialize, Default)]
pub struct CustomerQuery {
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCustomerRequest {
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

#[derive(AsChangeset, Default)]
#[diesel(table_name = customers)]
struct CustomerChangeset {
    name: Option<String>,
    contact_name: Option<Option<String>>,
    email: Option<Option<String>>,
    phone: Option<Option<String>>,
    billing_address: Option<Option<String>>,
    postal_address: Option<Option<String>>,
    pricing_tier: Option<Option<String>>,
    default_markup_percent: Option<Option<f64>>,
    notes: Option<Option<String>>,
}

impl CustomerChangeset {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.contact_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.billing_address.is_none()
            && self.postal_address.is_none()
            && self.pricing_tier.is_none()
            && self.default_markup_percent.is_none()
            && self.notes.is_none()
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_markup(markup: Option<f64>) -> AppResult<()> {
    match markup {
        Some(value) if !value.is_finite() || value < 0.0 => Err(AppError::bad_request(
            "default_markup_percent must not be negative",
        )),
        _ => Ok(()),
    }
}

fn load_customer(
    conn: &mut PgConnection,
    user: &AuthenticatedUser,
    customer_id: Uuid,
) -> AppResult<Customer> {
    let customer: Customer = customers::table
        .find(customer_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("customer not found"))?;
    user.tenant().ensure_can_access(customer.company_id)?;
    Ok(customer)
}

pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<CustomerQuery>,
) -> AppResult<Json<Vec<Customer>>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let mut query = customers::table
        .filter(customers::company_id.eq(ctx.effective_company_id()))
        .into_boxed();

    if let Some(term) = params.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = format!("%{}%", term.replace('%', "\\%").replace('_', "\\_"));
        query = query.filter(
            customers::name
                .ilike(pattern.clone())
                .or(customers::email.ilike(pattern)),
        );
    }

    let rows: Vec<Customer> = query.order(customers::name.asc()).load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
) -> AppResult<Json<Customer>> {
    let mut conn = state.tenant_db(&user.tenant())?;
    Ok(Json(load_customer(&mut conn, &user, customer_id)?))
}

pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> AppResult<(StatusCode, Json<Customer>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    check_markup(payload.default_markup_percent)?;
    let email = clean(payload.email)
        .map(|raw| normalize_email(&raw))
        .transpose()
        .map_err(AppError::bad_request)?;

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let new_customer = NewCustomer {
        id: Uuid::new_v4(),
        company_id: ctx.effective_company_id(),
        name: name.to_string(),
        contact_name: clean(payload.contact_name),
        email,
        phone: clean(payload.phone),
        billing_address: clean(payload.billing_address),
        postal_address: clean(payload.postal_address),
        pricing_tier: clean(payload.pricing_tier),
        default_markup_percent: payload.default_markup_percent,
        notes: clean(payload.notes),
    };

    let customer: Customer = diesel::insert_into(customers::table)
        .values(&new_customer)
        .get_result(&mut conn)?;

    tracing::info!(customer_id = %customer.id, company_id = %customer.company_id, "customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<Customer>> {
    ensure_object(&body).map_err(AppError::bad_request)?;

    let email = match patch_text(&body, "email")
        .map_err(AppError::bad_request)?
        .into_nullable()
    {
        Some(Some(raw)) => Some(Some(normalize_email(&raw).map_err(AppError::bad_request)?)),
        other => other,
    };

    let default_markup_percent = patch_field::<f64>(&body, "default_markup_percent")
        .map_err(AppError::bad_request)?
        .into_nullable();
    check_markup(default_markup_percent.flatten())?;

    let changes = CustomerChangeset {
        name: patch_text(&body, "name")
            .and_then(|patch| patch.into_required("name"))
            .map_err(AppError::bad_request)?,
        contact_name: patch_text(&body, "contact_name")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        email,
        phone: patch_text(&body, "phone")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        billing_address: patch_text(&body, "billing_address")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        postal_address: patch_text(&body, "postal_address")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        pricing_tier: patch_text(&body, "pricing_tier")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        default_markup_percent,
        notes: patch_text(&body, "notes")
            .map_err(AppError::bad_request)?
            .into_nullable(),
    };

    let mut conn = state.tenant_db(&user.tenant())?;
    let existing = load_customer(&mut conn, &user, customer_id)?;
    if changes.is_empty() {
        return Ok(Json(existing));
    }

    let customer: Customer = diesel::update(customers::table.find(customer_id))
        .set(&changes)
        .get_result(&mut conn)?;
    Ok(Json(customer))
}

pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(customer_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::DeleteRecords)?;
    let mut conn = state.tenant_db(&user.tenant())?;
    load_customer(&mut conn, &user, customer_id)?;

    diesel::delete(customers::table.find(customer_id)).execute(&mut conn)?;
    tracing::info!(customer_id = %customer_id, user_id = %user.user_id, "customer deleted");
    Ok(StatusCode::NO_CONTENT)
}
