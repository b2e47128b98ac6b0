use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewServiceCatalog, NewServiceCatalogItem, ServiceCatalog, ServiceCatalogItem},
    permissions::Capability,
    schema::{service_catalog_items, service_catalogs},
    state::AppState,
    tenant::TenantContext,
    utils::json::{ensure_object, patch_field, patch_text},
};

#[derive(Deserialize)]
pub struct CreateCatalogRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateCatalogItemRequest {
    pub name: String,
    pub description: Option<String>,
    pub unit: Option<String>,
    #[serde(default)]
    pub cost: f64,
    pub price: f64,
    #[serde(default)]
    pub markup_percent: f64,
    #[serde(default)]
    pub tax_percent: f64,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    #[serde(flatten)]
    pub catalog: ServiceCatalog,
    pub items: Vec<ServiceCatalogItem>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = service_catalogs)]
struct CatalogChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = service_catalog_items)]
struct CatalogItemChangeset {
    name: Option<String>,
    description: Option<Option<String>>,
    unit: Option<Option<String>>,
    cost: Option<f64>,
    price: Option<f64>,
    markup_percent: Option<f64>,
    tax_percent: Option<f64>,
}

impl CatalogItemChangeset {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.unit.is_none()
            && self.cost.is_none()
            && self.price.is_none()
            && self.markup_percent.is_none()
            && self.tax_percent.is_none()
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn check_amount(field: &str, value: f64) -> AppResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(AppError::bad_request(format!("{field} must not be negative")));
    }
    Ok(())
}

fn check_percent(field: &str, value: f64) -> AppResult<()> {
    check_amount(field, value)?;
    if value > 100.0 {
        return Err(AppError::bad_request(format!("{field} must be between 0 and 100")));
    }
    Ok(())
}

fn load_catalog(
    conn: &mut PgConnection,
    ctx: &TenantContext,
    catalog_id: Uuid,
) -> AppResult<ServiceCatalog> {
    let catalog: ServiceCatalog = service_catalogs::table
        .find(catalog_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("catalog not found"))?;
    ctx.ensure_can_access(catalog.company_id)?;
    Ok(catalog)
}

fn load_items(conn: &mut PgConnection, catalog_id: Uuid) -> QueryResult<Vec<ServiceCatalogItem>> {
    service_catalog_items::table
        .filter(service_catalog_items::catalog_id.eq(catalog_id))
        .order(service_catalog_items::name.asc())
        .load(conn)
}

pub async fn list_catalogs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<ServiceCatalog>>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let rows = service_catalogs::table
        .filter(service_catalogs::company_id.eq(ctx.effective_company_id()))
        .order(service_catalogs::name.asc())
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_catalog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(catalog_id): Path<Uuid>,
) -> AppResult<Json<CatalogResponse>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let catalog = load_catalog(&mut conn, &ctx, catalog_id)?;
    let items = load_items(&mut conn, catalog_id)?;
    Ok(Json(CatalogResponse { catalog, items }))
}

pub async fn create_catalog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCatalogRequest>,
) -> AppResult<(StatusCode, Json<ServiceCatalog>)> {
    user.permissions().require(Capability::ManageInvoices)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let catalog: ServiceCatalog = diesel::insert_into(service_catalogs::table)
        .values(&NewServiceCatalog {
            id: Uuid::new_v4(),
            company_id: ctx.effective_company_id(),
            name: name.to_string(),
            description: clean(payload.description),
        })
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(catalog)))
}

pub async fn update_catalog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(catalog_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<ServiceCatalog>> {
    user.permissions().require(Capability::ManageInvoices)?;
    ensure_object(&body).map_err(AppError::bad_request)?;

    let changes = CatalogChangeset {
        name: patch_text(&body, "name")
            .and_then(|patch| patch.into_required("name"))
            .map_err(AppError::bad_request)?,
        description: patch_text(&body, "description")
            .map_err(AppError::bad_request)?
            .into_nullable(),
    };

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_catalog(&mut conn, &ctx, catalog_id)?;
    if changes.name.is_none() && changes.description.is_none() {
        return Ok(Json(existing));
    }

    let catalog = diesel::update(service_catalogs::table.find(catalog_id))
        .set(&changes)
        .get_result(&mut conn)?;
    Ok(Json(catalog))
}

pub async fn delete_catalog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(catalog_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::ManageInvoices)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_catalog(&mut conn, &ctx, catalog_id)?;
    diesel::delete(service_catalogs::table.find(catalog_id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_catalog_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(catalog_id): Path<Uuid>,
    Json(payload): Json<CreateCatalogItemRequest>,
) -> AppResult<(StatusCode, Json<ServiceCatalogItem>)> {
    user.permissions().require(Capability::ManageInvoices)?;
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    check_amount("cost", payload.cost)?;
    check_amount("price", payload.price)?;
    check_amount("markup_percent", payload.markup_percent)?;
    check_percent("tax_percent", payload.tax_percent)?;

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_catalog(&mut conn, &ctx, catalog_id)?;

    let item: ServiceCatalogItem = diesel::insert_into(service_catalog_items::table)
        .values(&NewServiceCatalogItem {
            id: Uuid::new_v4(),
            catalog_id,
            name: name.to_string(),
            description: clean(payload.description),
            unit: clean(payload.unit),
            cost: payload.cost,
            price: payload.price,
            markup_percent: payload.markup_percent,
            tax_percent: payload.tax_percent,
        })
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(item)))
}

fn load_item(
    conn: &mut PgConnection,
    ctx: &TenantContext,
    catalog_id: Uuid,
    item_id: Uuid,
) -> AppResult<ServiceCatalogItem> {
    load_catalog(conn, ctx, catalog_id)?;
    service_catalog_items::table
        .filter(service_catalog_items::id.eq(item_id))
        .filter(service_catalog_items::catalog_id.eq(catalog_id))
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("catalog item not found"))
}

pub async fn update_catalog_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((catalog_id, item_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<Value>,
) -> AppResult<Json<ServiceCatalogItem>> {
    user.permissions().require(Capability::ManageInvoices)?;
    ensure_object(&body).map_err(AppError::bad_request)?;

    let number = |field: &str| -> AppResult<Option<f64>> {
        patch_field::<f64>(&body, field)
            .and_then(|patch| patch.into_required(field))
            .map_err(AppError::bad_request)
    };

    let changes = CatalogItemChangeset {
        name: patch_text(&body, "name")
            .and_then(|patch| patch.into_required("name"))
            .map_err(AppError::bad_request)?,
        description: patch_text(&body, "description")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        unit: patch_text(&body, "unit")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        cost: number("cost")?,
        price: number("price")?,
        markup_percent: number("markup_percent")?,
        tax_percent: number("tax_percent")?,
    };
    for (field, value) in [
        ("cost", changes.cost),
        ("price", changes.price),
        ("markup_percent", changes.markup_percent),
    ] {
        if let Some(value) = value {
            check_amount(field, value)?;
        }
    }
    if let Some(tax) = changes.tax_percent {
        check_percent("tax_percent", tax)?;
    }

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_item(&mut conn, &ctx, catalog_id, item_id)?;
    if changes.is_empty() {
        return Ok(Json(existing));
    }

    let item = diesel::update(service_catalog_items::table.find(item_id))
        .set(&changes)
        .get_result(&mut conn)?;
    Ok(Json(item))
}

pub async fn delete_catalog_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((catalog_id, item_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::ManageInvoices)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_item(&mut conn, &ctx, catalog_id, item_id)?;
    diesel::delete(service_catalog_items::table.find(item_id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
