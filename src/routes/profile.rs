use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    models::User,
    permissions::Permissions,
    schema::users,
    state::AppState,
    storage::{
        avatar_extension, avatar_file_from_url, avatar_file_name, avatar_url, save_and_record,
    },
    tenant::{resolve_target_user, ResolvedTarget},
    utils::{
        json::{ensure_object, patch_text},
        validation::normalize_email,
    },
};

use super::users::{email_taken, UserResponse};

const AVATAR_FIELD: &str = "avatar";

#[derive(Serialize)]
pub struct ProfileResponse {
    pub user: UserResponse,
    pub impersonating: bool,
    pub permissions: Permissions,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct AvatarResponse {
    pub avatar_url: String,
    pub content_type: String,
    pub user_id: uuid::Uuid,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = users)]
struct ProfileChangeset {
    email: Option<String>,
    first_name: Option<Option<String>>,
    last_name: Option<Option<String>>,
    phone: Option<Option<String>>,
}

impl ProfileChangeset {
    fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone.is_none()
    }
}

fn profile_response(
    user: User,
    target: &ResolvedTarget,
    caller: &AuthenticatedUser,
) -> ProfileResponse {
    ProfileResponse {
        user: UserResponse::from(user),
        impersonating: target.impersonating,
        permissions: caller.permissions(),
    }
}

pub async fn get_profile(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> AppResult<Json<ProfileResponse>> {
    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let target = resolve_target_user(&mut conn, &ctx)?;
    let user: User = users::table.find(target.user_id).first(&mut conn)?;
    Ok(Json(profile_response(user, &target, &caller)))
}

pub async fn update_profile(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(body): Json<Value>,
) -> AppResult<Json<ProfileResponse>> {
    ensure_object(&body).map_err(AppError::bad_request)?;

    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let target = resolve_target_user(&mut conn, &ctx)?;

    let mut changes = ProfileChangeset {
        first_name: patch_text(&body, "first_name")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        last_name: patch_text(&body, "last_name")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        phone: patch_text(&body, "phone")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        ..ProfileChangeset::default()
    };

    if let Some(raw) = patch_text(&body, "email")
        .map_err(AppError::bad_request)?
        .into_required("email")
        .map_err(AppError::bad_request)?
    {
        let email = normalize_email(&raw).map_err(AppError::bad_request)?;
        if email_taken(&mut conn, &email, Some(target.user_id))? {
            return Err(AppError::bad_request("email is already in use"));
        }
        changes.email = Some(email);
    }

    if !changes.is_empty() {
        diesel::update(users::table.find(target.user_id))
            .set(&changes)
            .execute(&mut conn)?;
    }

    let user: User = users::table.find(target.user_id).first(&mut conn)?;
    Ok(Json(profile_response(user, &target, &caller)))
}

pub async fn change_password(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    password::validate_new_password(&payload.new_password).map_err(AppError::bad_request)?;

    let mut conn = state.db()?;
    let user: User = users::table.find(caller.user_id).first(&mut conn)?;

    let valid = password::verify_password(&payload.current_password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;
    if !valid {
        return Err(AppError::unauthorized());
    }

    let password_hash = password::hash_password(&payload.new_password)?;
    diesel::update(users::table.find(user.id))
        .set(users::password_hash.eq(password_hash))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(StatusCode::NO_CONTENT)
}

struct AvatarUpload {
    bytes: Vec<u8>,
    extension: String,
}

async fn read_avatar_field(
    mut multipart: Multipart,
    max_bytes: usize,
) -> AppResult<AvatarUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart body: {err}")))?
    {
        if field.name() != Some(AVATAR_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| AppError::bad_request("avatar field must be a file"))?;
        let extension = avatar_extension(&file_name).map_err(AppError::bad_request)?;

        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read avatar: {err}")))?;
        if bytes.is_empty() {
            return Err(AppError::bad_request("avatar file is empty"));
        }
        if bytes.len() > max_bytes {
            return Err(AppError::bad_request(format!(
                "avatar exceeds the {max_bytes} byte limit"
            )));
        }

        return Ok(AvatarUpload {
            bytes: bytes.to_vec(),
            extension,
        });
    }

    Err(AppError::bad_request("missing avatar file"))
}

pub async fn upload_avatar(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<AvatarResponse>)> {
    let upload = read_avatar_field(multipart, state.config.max_avatar_bytes).await?;

    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let target = resolve_target_user(&mut conn, &ctx)?;
    let previous: User = users::table.find(target.user_id).first(&mut conn)?;

    let file_name = avatar_file_name(
        target.user_id,
        Utc::now().timestamp_millis(),
        &upload.extension,
    );
    let url = avatar_url(&file_name);
    save_and_record(state.avatars.as_ref(), &file_name, upload.bytes, || -> AppResult<()> {
        let updated = diesel::update(users::table.find(target.user_id))
            .set(users::avatar_url.eq(Some(url.as_str())))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(AppError::not_found_with("user not found"));
        }
        Ok(())
    })
    .await?;

    if let Some(old_file) = previous.avatar_url.as_deref().and_then(avatar_file_from_url) {
        if old_file != file_name {
            if let Err(err) = state.avatars.delete(old_file).await {
                tracing::warn!(file = %old_file, error = %err, "failed to remove previous avatar");
            }
        }
    }

    tracing::info!(
        caller_id = %caller.user_id,
        target_user_id = %target.user_id,
        impersonating = target.impersonating,
        "avatar updated"
    );

    Ok((
        StatusCode::CREATED,
        Json(AvatarResponse {
            avatar_url: url,
            content_type: mime_guess::from_ext(&upload.extension)
                .first_or_octet_stream()
                .to_string(),
            user_id: target.user_id,
        }),
    ))
}

pub async fn delete_avatar(
    State(state): State<AppState>,
    caller: AuthenticatedUser,
) -> AppResult<StatusCode> {
    let ctx = caller.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let target = resolve_target_user(&mut conn, &ctx)?;
    let user: User = users::table.find(target.user_id).first(&mut conn)?;

    diesel::update(users::table.find(target.user_id))
        .set(users::avatar_url.eq(None::<String>))
        .execute(&mut conn)?;

    if let Some(file) = user.avatar_url.as_deref().and_then(avatar_file_from_url) {
        if let Err(err) = state.avatars.delete(file).await {
            tracing::warn!(file = %file, error = %err, "failed to remove avatar file");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
