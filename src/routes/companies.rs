use axum::{extract::State, Json};
use diesel::prelude::*;
use serde_json::Value;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::Company,
    permissions::{Capability, Role},
    schema::{companies, company_access},
    state::AppState,
    utils::{
        json::{ensure_object, patch_text, Patch},
        validation::{is_hex_color, normalize_email},
    },
};

#[derive(AsChangeset, Default)]
#[diesel(table_name = companies)]
struct CompanyChangeset {
    name: Option<String>,
    logo_url: Option<Option<String>>,
    primary_color: Option<Option<String>>,
    abn: Option<Option<String>>,
    email: Option<Option<String>>,
    phone: Option<Option<String>>,
    address: Option<Option<String>>,
}

impl CompanyChangeset {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.logo_url.is_none()
            && self.primary_color.is_none()
            && self.abn.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.address.is_none()
    }
}

pub async fn list_companies(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<Company>>> {
    let mut conn = state.db()?;

    let rows: Vec<Company> = if user.role == Role::Superadmin {
        companies::table
            .order(companies::name.asc())
            .load(&mut conn)?
    } else {
        let granted = company_access::table
            .filter(company_access::user_id.eq(user.user_id))
            .select(company_access::company_id);
        companies::table
            .filter(
                companies::id
                    .eq(user.company_id)
                    .or(companies::id.eq_any(granted)),
            )
            .order(companies::name.asc())
            .load(&mut conn)?
    };

    Ok(Json(rows))
}

pub async fn get_current_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<Company>> {
    let ctx = user.tenant();
    let mut conn = state.db()?;
    let company: Company = companies::table
        .find(ctx.effective_company_id())
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("company not found"))?;
    Ok(Json(company))
}

pub async fn update_current_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<Company>> {
    user.permissions().require(Capability::ManageCompany)?;
    ensure_object(&body).map_err(AppError::bad_request)?;

    let primary_color = patch_text(&body, "primary_color").map_err(AppError::bad_request)?;
    if let Patch::Value(color) = &primary_color {
        if !is_hex_color(color) {
            return Err(AppError::bad_request(
                "primary_color must be a hex colour such as #1a2b3c",
            ));
        }
    }

    let email = match patch_text(&body, "email").map_err(AppError::bad_request)?.into_nullable() {
        Some(Some(raw)) => Some(Some(normalize_email(&raw).map_err(AppError::bad_request)?)),
        other => other,
    };

    let changes = CompanyChangeset {
        name: patch_text(&body, "name")
            .and_then(|patch| patch.into_required("name"))
            .map_err(AppError::bad_request)?,
        logo_url: patch_text(&body, "logo_url")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        primary_color: primary_color.into_nullable(),
        abn: patch_text(&body, "abn")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        email,
        phone: patch_text(&body, "phone")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        address: patch_text(&body, "address")
            .map_err(AppError::bad_request)?
            .into_nullable(),
    };

    let company_id = user.tenant().effective_company_id();
    let mut conn = state.db()?;

    if !changes.is_empty() {
        diesel::update(companies::table.find(company_id))
            .set(&changes)
            .execute(&mut conn)?;
        tracing::info!(company_id = %company_id, user_id = %user.user_id, "company settings updated");
    }

    let company: Company = companies::table.find(company_id).first(&mut conn)?;
    Ok(Json(company))
}
