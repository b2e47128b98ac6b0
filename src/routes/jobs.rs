use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{Customer, Job, NewJob},
    permissions::Capability,
    phase::{map_status_to_phase, Phase},
    schema::{customers, jobs},
    state::AppState,
    tenant::TenantContext,
    utils::json::{ensure_object, patch_field, patch_text},
};

const DEFAULT_STATUS: &str = "pending";

#[derive(Deserialize, Default)]
pub struct JobQuery {
    pub phase: Option<String>,
    pub customer_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub title: String,
    pub customer_id: Option<Uuid>,
    pub description: Option<String>,
    pub site_address: Option<String>,
    pub status: Option<String>,
    pub scheduled_at: Option<NaiveDateTime>,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: String,
    pub phase: Phase,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = jobs)]
struct JobChangeset {
    title: Option<String>,
    customer_id: Option<Option<Uuid>>,
    description: Option<Option<String>>,
    site_address: Option<Option<String>>,
    status: Option<String>,
    phase: Option<String>,
    scheduled_at: Option<Option<NaiveDateTime>>,
}

impl JobChangeset {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.customer_id.is_none()
            && self.description.is_none()
            && self.site_address.is_none()
            && self.status.is_none()
            && self.scheduled_at.is_none()
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_status(raw: &str) -> AppResult<String> {
    let status = raw.trim();
    if status.is_empty() {
        return Err(AppError::bad_request("status must not be empty"));
    }
    Ok(status.to_string())
}

fn ensure_customer_in_company(
    conn: &mut PgConnection,
    ctx: &TenantContext,
    customer_id: Uuid,
) -> AppResult<()> {
    let customer: Customer = customers::table
        .find(customer_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::bad_request("customer does not exist"))?;
    if customer.company_id != ctx.effective_company_id() {
        return Err(AppError::bad_request("customer belongs to another company"));
    }
    Ok(())
}

pub(crate) fn load_job(conn: &mut PgConnection, ctx: &TenantContext, job_id: Uuid) -> AppResult<Job> {
    let job: Job = jobs::table
        .find(job_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("job not found"))?;
    ctx.ensure_can_access(job.company_id)?;
    Ok(job)
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<JobQuery>,
) -> AppResult<Json<Vec<Job>>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let mut query = jobs::table
        .filter(jobs::company_id.eq(ctx.effective_company_id()))
        .into_boxed();

    if let Some(raw) = params.phase.as_deref().filter(|p| !p.trim().is_empty()) {
        let phase: Phase = raw.parse().map_err(AppError::bad_request)?;
        query = query.filter(jobs::phase.eq(phase.as_str()));
    }
    if let Some(customer_id) = params.customer_id {
        query = query.filter(jobs::customer_id.eq(customer_id));
    }

    let rows: Vec<Job> = query
        .order((jobs::scheduled_at.asc().nulls_last(), jobs::created_at.desc()))
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn get_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
) -> AppResult<Json<Job>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    Ok(Json(load_job(&mut conn, &ctx, job_id)?))
}

pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<Job>)> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }
    let status = match payload.status.as_deref() {
        Some(raw) => clean_status(raw)?,
        None => DEFAULT_STATUS.to_string(),
    };
    let phase = map_status_to_phase(&status);

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    if let Some(customer_id) = payload.customer_id {
        ensure_customer_in_company(&mut conn, &ctx, customer_id)?;
    }

    let new_job = NewJob {
        id: Uuid::new_v4(),
        company_id: ctx.effective_company_id(),
        customer_id: payload.customer_id,
        title: title.to_string(),
        description: clean(payload.description),
        site_address: clean(payload.site_address),
        status,
        phase: phase.as_str().to_string(),
        scheduled_at: payload.scheduled_at,
    };

    let job: Job = diesel::insert_into(jobs::table)
        .values(&new_job)
        .get_result(&mut conn)?;

    tracing::info!(job_id = %job.id, company_id = %job.company_id, phase = %job.phase, "job created");
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn update_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<Job>> {
    ensure_object(&body).map_err(AppError::bad_request)?;

    let mut changes = JobChangeset {
        title: patch_text(&body, "title")
            .and_then(|patch| patch.into_required("title"))
            .map_err(AppError::bad_request)?,
        customer_id: patch_field::<Uuid>(&body, "customer_id")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        description: patch_text(&body, "description")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        site_address: patch_text(&body, "site_address")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        scheduled_at: patch_field::<NaiveDateTime>(&body, "scheduled_at")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        ..JobChangeset::default()
    };

    if let Some(status) = patch_text(&body, "status")
        .and_then(|patch| patch.into_required("status"))
        .map_err(AppError::bad_request)?
    {
        changes.phase = Some(map_status_to_phase(&status).as_str().to_string());
        changes.status = Some(status);
    }

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_job(&mut conn, &ctx, job_id)?;
    if let Some(Some(customer_id)) = changes.customer_id {
        ensure_customer_in_company(&mut conn, &ctx, customer_id)?;
    }
    if changes.is_empty() {
        return Ok(Json(existing));
    }

    let job: Job = diesel::update(jobs::table.find(job_id))
        .set(&changes)
        .get_result(&mut conn)?;
    Ok(Json(job))
}

pub async fn update_job_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> AppResult<Json<StatusResponse>> {
    let status = clean_status(&payload.status)?;
    let phase = map_status_to_phase(&status);

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_job(&mut conn, &ctx, job_id)?;

    diesel::update(jobs::table.find(job_id))
        .set((jobs::status.eq(&status), jobs::phase.eq(phase.as_str())))
        .execute(&mut conn)?;

    if existing.phase != phase.as_str() {
        tracing::info!(
            job_id = %job_id,
            from_phase = %existing.phase,
            to_phase = %phase,
            "job moved to a new phase"
        );
    }

    Ok(Json(StatusResponse {
        id: job_id,
        status,
        phase,
    }))
}

pub async fn delete_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(job_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::DeleteRecords)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_job(&mut conn, &ctx, job_id)?;

    diesel::delete(jobs::table.find(job_id)).execute(&mut conn)?;
    tracing::info!(job_id = %job_id, user_id = %user.user_id, "job deleted");
    Ok(StatusCode::NO_CONTENT)
}
