use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::{dsl::exists, prelude::*, PgConnection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{NewUser, User},
    permissions::{Capability, Role},
    schema::users,
    state::AppState,
    utils::{
        json::{ensure_object, patch_field, patch_text},
        validation::normalize_email,
    },
};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub role: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            company_id: user.company_id,
            email: user.email,
            role: user.role,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            avatar_url: user.avatar_url,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: Role,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
}

fn default_role() -> Role {
    Role::Staff
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct UpdateUserChangeset {
    email: Option<String>,
    role: Option<String>,
    first_name: Option<Option<String>>,
    last_name: Option<Option<String>>,
    phone: Option<Option<String>>,
}

pub(crate) fn email_taken(
    conn: &mut PgConnection,
    email: &str,
    except: Option<Uuid>,
) -> AppResult<bool> {
    let taken = match except {
        Some(user_id) => diesel::select(exists(
            users::table
                .filter(users::email.eq(email))
                .filter(users::id.ne(user_id)),
        ))
        .get_result(conn)?,
        None => diesel::select(exists(users::table.filter(users::email.eq(email))))
            .get_result(conn)?,
    };
    Ok(taken)
}

fn ensure_assignable(caller: &AuthenticatedUser, role: Role) -> AppResult<()> {
    if role == Role::Superadmin && caller.role != Role::Superadmin {
        return Err(AppError::forbidden("only superadmins may grant the superadmin role"));
    }
    if role == Role::Owner && !matches!(caller.role, Role::Owner | Role::Superadmin) {
        return Err(AppError::forbidden("only owners may grant the owner role"));
    }
    Ok(())
}

/// Owners and superadmins can only be changed by someone holding at least
/// the same role.
fn ensure_manageable(caller: &AuthenticatedUser, target_role: &str) -> AppResult<()> {
    if target_role == Role::Superadmin.as_str() && caller.role != Role::Superadmin {
        return Err(AppError::forbidden("only superadmins may change a superadmin"));
    }
    if target_role == Role::Owner.as_str()
        && !matches!(caller.role, Role::Owner | Role::Superadmin)
    {
        return Err(AppError::forbidden("only owners may change an owner"));
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub async fn list_users(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> AppResult<Json<Vec<UserResponse>>> {
    caller.permissions().require(Capability::ManageUsers)?;
    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let rows: Vec<User> = users::table
        .filter(users::company_id.eq(ctx.effective_company_id()))
        .order((users::last_name.asc(), users::first_name.asc(), users::email.asc()))
        .load(&mut conn)?;

    Ok(Json(rows.into_iter().map(UserResponse::from).collect()))
}

pub async fn create_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(payload): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    caller.permissions().require(Capability::ManageUsers)?;
    ensure_assignable(&caller, payload.role)?;

    let email = normalize_email(&payload.email).map_err(AppError::bad_request)?;
    password::validate_new_password(&payload.password).map_err(AppError::bad_request)?;

    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    if email_taken(&mut conn, &email, None)? {
        return Err(AppError::bad_request("email is already in use"));
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        company_id: ctx.effective_company_id(),
        email,
        password_hash: password::hash_password(&payload.password)?,
        role: payload.role.as_str().to_string(),
        first_name: trimmed(payload.first_name),
        last_name: trimmed(payload.last_name),
        phone: trimmed(payload.phone),
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)?;

    let user: User = users::table.find(new_user.id).first(&mut conn)?;
    tracing::info!(
        user_id = %user.id,
        company_id = %user.company_id,
        role = %user.role,
        created_by = %caller.user_id,
        "user created"
    );
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

pub async fn update_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<UserResponse>> {
    caller.permissions().require(Capability::ManageUsers)?;
    ensure_object(&body).map_err(AppError::bad_request)?;

    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing: User = users::table.find(user_id).first(&mut conn)?;
    ctx.ensure_can_access(existing.company_id)?;
    ensure_manageable(&caller, &existing.role)?;

    let mut changes = UpdateUserChangeset {
        first_name: patch_text(&body, "first_name")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        last_name: patch_text(&body, "last_name")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        phone: patch_text(&body, "phone")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        ..UpdateUserChangeset::default()
    };

    if let Some(raw) = patch_text(&body, "email")
        .and_then(|patch| patch.into_required("email"))
        .map_err(AppError::bad_request)?
    {
        let email = normalize_email(&raw).map_err(AppError::bad_request)?;
        if email_taken(&mut conn, &email, Some(user_id))? {
            return Err(AppError::bad_request("email is already in use"));
        }
        changes.email = Some(email);
    }

    if let Some(role) = patch_field::<Role>(&body, "role")
        .and_then(|patch| patch.into_required("role"))
        .map_err(AppError::bad_request)?
    {
        ensure_assignable(&caller, role)?;
        changes.role = Some(role.as_str().to_string());
    }

    if let Some(new_password) = patch_field::<String>(&body, "password")
        .and_then(|patch| patch.into_required("password"))
        .map_err(AppError::bad_request)?
    {
        password::validate_new_password(&new_password).map_err(AppError::bad_request)?;
        let hash = password::hash_password(&new_password)?;
        diesel::update(users::table.find(user_id))
            .set(users::password_hash.eq(hash))
            .execute(&mut conn)?;
    }

    let has_changes = changes.email.is_some()
        || changes.role.is_some()
        || changes.first_name.is_some()
        || changes.last_name.is_some()
        || changes.phone.is_some();
    if has_changes {
        diesel::update(users::table.find(user_id))
            .set(&changes)
            .execute(&mut conn)?;
    }

    let user: User = users::table.find(user_id).first(&mut conn)?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    caller.permissions().require(Capability::ManageUsers)?;
    if user_id == caller.user_id {
        return Err(AppError::bad_request("you cannot delete your own account"));
    }

    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing: User = users::table.find(user_id).first(&mut conn)?;
    ctx.ensure_can_access(existing.company_id)?;
    ensure_manageable(&caller, &existing.role)?;

    diesel::delete(users::table.find(user_id)).execute(&mut conn)?;
    tracing::info!(user_id = %user_id, deleted_by = %caller.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
