use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use axum_extra::{headers::Cookie, typed_header::TypedHeader};
use chrono::{Duration as ChronoDuration, Utc};
use diesel::prelude::*;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    auth::{jwt::SessionSubject, password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::{Company, NewRefreshToken, RefreshToken, User},
    permissions::{Capability, Permissions, Role},
    schema::{companies, company_access, refresh_tokens, users::dsl},
    state::AppState,
};

use crate::schema::refresh_tokens::dsl as refresh_dsl;

const REFRESH_COOKIE_NAME: &str = "refresh_token";

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: AuthenticatedUser,
    pub permissions: Permissions,
    pub effective_company_id: Uuid,
    pub impersonating: bool,
}

#[derive(Deserialize)]
pub struct SwitchCompanyRequest {
    pub company_id: Uuid,
}

#[derive(Deserialize)]
pub struct GodModeRequest {
    pub enabled: bool,
}

pub(crate) fn home_subject(user: &User) -> AppResult<SessionSubject> {
    let role: Role = user.role.parse().map_err(AppError::internal)?;
    Ok(SessionSubject {
        user_id: user.id,
        role,
        company_id: user.company_id,
        current_company_id: user.company_id,
        god_mode: false,
    })
}

fn access_token_response(
    state: &AppState,
    subject: &SessionSubject,
    email: &str,
) -> AppResult<LoginResponse> {
    let access_token = state
        .jwt
        .generate_token(subject, email)
        .map_err(AppError::from)?;

    Ok(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
    })
}

fn issue_refresh_token(
    state: &AppState,
    conn: &mut PgConnection,
    user_id: Uuid,
) -> AppResult<HeaderMap> {
    let now = Utc::now();
    let refresh_value = generate_refresh_token();
    let refresh_expires_at = now + ChronoDuration::days(state.config.refresh_token_expiry_days);

    let new_refresh = NewRefreshToken {
        id: Uuid::new_v4(),
        user_id,
        token_hash: hash_refresh_token(&refresh_value),
        issued_at: now.naive_utc(),
        expires_at: refresh_expires_at.naive_utc(),
    };

    diesel::insert_into(refresh_tokens::table)
        .values(&new_refresh)
        .execute(conn)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        SET_COOKIE,
        build_refresh_cookie(state, &refresh_value, refresh_expires_at)?,
    );
    Ok(headers)
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::bad_request("email and password are required"));
    }

    let mut conn = state.db()?;

    let user: User = dsl::users
        .filter(dsl::email.eq(&email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        tracing::info!(user_id = %user.id, "rejected login with wrong password");
        return Err(AppError::unauthorized());
    }

    let subject = home_subject(&user)?;
    let headers = issue_refresh_token(&state, &mut conn, user.id)?;
    tracing::info!(user_id = %user.id, company_id = %user.company_id, "user logged in");

    Ok((
        headers,
        Json(access_token_response(&state, &subject, &user.email)?),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, Json<LoginResponse>)> {
    let cookies = jar.ok_or_else(AppError::unauthorized)?;
    let refresh_value = cookies
        .get(REFRESH_COOKIE_NAME)
        .ok_or_else(AppError::unauthorized)?;

    let hashed = hash_refresh_token(refresh_value);
    let mut conn = state.db()?;
    let now_naive = Utc::now().naive_utc();

    let token = match refresh_dsl::refresh_tokens
        .filter(refresh_dsl::token_hash.eq(&hashed))
        .filter(refresh_dsl::revoked_at.is_null())
        .filter(refresh_dsl::expires_at.gt(now_naive))
        .first::<RefreshToken>(&mut conn)
    {
        Ok(token) => token,
        Err(diesel::result::Error::NotFound) => return Err(AppError::unauthorized()),
        Err(err) => return Err(AppError::from(err)),
    };

    diesel::update(refresh_dsl::refresh_tokens.filter(refresh_dsl::id.eq(token.id)))
        .set((
            refresh_dsl::revoked_at.eq(now_naive),
            refresh_dsl::updated_at.eq(now_naive),
        ))
        .execute(&mut conn)?;

    let user: User = dsl::users.find(token.user_id).first(&mut conn)?;
    let subject = home_subject(&user)?;
    let headers = issue_refresh_token(&state, &mut conn, user.id)?;

    Ok((
        headers,
        Json(access_token_response(&state, &subject, &user.email)?),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    jar: Option<TypedHeader<Cookie>>,
) -> AppResult<(HeaderMap, StatusCode)> {
    let mut conn = state.db()?;
    let now = Utc::now().naive_utc();
    let mut rows_affected = 0;

    if let Some(value) = jar.as_ref().and_then(|cookies| cookies.get(REFRESH_COOKIE_NAME)) {
        rows_affected = diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::token_hash.eq(hash_refresh_token(value)))
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    if rows_affected == 0 {
        diesel::update(
            refresh_dsl::refresh_tokens
                .filter(refresh_dsl::user_id.eq(user.user_id))
                .filter(refresh_dsl::revoked_at.is_null()),
        )
        .set((
            refresh_dsl::revoked_at.eq(now),
            refresh_dsl::updated_at.eq(now),
        ))
        .execute(&mut conn)?;
    }

    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, build_clear_refresh_cookie(&state)?);
    Ok((headers, StatusCode::NO_CONTENT))
}

pub async fn me(user: AuthenticatedUser) -> Json<MeResponse> {
    let ctx = user.tenant();
    Json(MeResponse {
        permissions: user.permissions(),
        effective_company_id: ctx.effective_company_id(),
        impersonating: ctx.is_cross_company() && !ctx.god_mode,
        user,
    })
}

pub async fn switch_company(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<SwitchCompanyRequest>,
) -> AppResult<Json<LoginResponse>> {
    user.permissions().require(Capability::SwitchCompany)?;
    let mut conn = state.db()?;

    let company: Company = companies::table
        .find(payload.company_id)
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("company not found"))?;

    if user.role != Role::Superadmin && company.id != user.company_id {
        let granted: bool = diesel::select(diesel::dsl::exists(
            company_access::table
                .filter(company_access::user_id.eq(user.user_id))
                .filter(company_access::company_id.eq(company.id)),
        ))
        .get_result(&mut conn)?;
        if !granted {
            return Err(AppError::forbidden("no access to the requested company"));
        }
    }

    let mut subject = user.subject();
    subject.current_company_id = company.id;

    tracing::info!(
        user_id = %user.user_id,
        from_company_id = %user.current_company_id,
        to_company_id = %company.id,
        "switched company context"
    );

    Ok(Json(access_token_response(&state, &subject, &user.email)?))
}

pub async fn set_god_mode(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<GodModeRequest>,
) -> AppResult<Json<LoginResponse>> {
    user.permissions().require(Capability::UseGodMode)?;

    let mut subject = user.subject();
    subject.god_mode = payload.enabled;

    tracing::warn!(
        user_id = %user.user_id,
        enabled = payload.enabled,
        "god mode toggled"
    );

    Ok(Json(access_token_response(&state, &subject, &user.email)?))
}

fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_refresh_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn build_refresh_cookie(
    state: &AppState,
    token: &str,
    expires_at: chrono::DateTime<Utc>,
) -> AppResult<HeaderValue> {
    let max_age = ChronoDuration::days(state.config.refresh_token_expiry_days).num_seconds();

    let mut parts = vec![format!("{}={}", REFRESH_COOKIE_NAME, token)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push(format!("Max-Age={}", max_age));
    parts.push(format!("Expires={}", expires_at.to_rfc2822()));
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn build_clear_refresh_cookie(state: &AppState) -> AppResult<HeaderValue> {
    let mut parts = vec![format!("{}=", REFRESH_COOKIE_NAME)];
    parts.push("Path=/".into());
    parts.push("HttpOnly".into());
    parts.push("SameSite=Strict".into());
    parts.push("Max-Age=0".into());
    parts.push("Expires=Thu, 01 Jan 1970 00:00:00 GMT".into());
    push_cookie_scope(state, &mut parts);

    HeaderValue::from_str(&parts.join("; ")).map_err(AppError::internal)
}

fn push_cookie_scope(state: &AppState, parts: &mut Vec<String>) {
    if state.config.refresh_cookie_secure {
        parts.push("Secure".into());
    }
    if let Some(domain) = &state.config.refresh_cookie_domain {
        parts.push(format!("Domain={}", domain));
    }
}
