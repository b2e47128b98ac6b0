use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{dsl::count_star, prelude::*};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    models::{NewTask, Task},
    permissions::Capability,
    schema::{jobs, tasks, users},
    state::AppState,
    tenant::TenantContext,
    utils::json::{ensure_object, patch_field, patch_text},
};

#[derive(Deserialize, Default)]
pub struct TaskQuery {
    pub completed: Option<bool>,
    pub assignee_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub assignee_ids: Vec<Uuid>,
    pub due_date: Option<NaiveDate>,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = tasks)]
struct TaskChangeset {
    description: Option<String>,
    job_id: Option<Option<Uuid>>,
    assignee_ids: Option<Vec<Uuid>>,
    due_date: Option<Option<NaiveDate>>,
    completed: Option<bool>,
    completed_at: Option<Option<NaiveDateTime>>,
}

impl TaskChangeset {
    fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.job_id.is_none()
            && self.assignee_ids.is_none()
            && self.due_date.is_none()
            && self.completed.is_none()
    }
}

/// Sorted, de-duplicated assignee list, all of whom must belong to `company_id`.
fn checked_assignees(
    conn: &mut PgConnection,
    company_id: Uuid,
    mut assignee_ids: Vec<Uuid>,
) -> AppResult<Vec<Uuid>> {
    assignee_ids.sort();
    assignee_ids.dedup();
    if assignee_ids.is_empty() {
        return Ok(assignee_ids);
    }

    let known: i64 = users::table
        .filter(users::id.eq_any(&assignee_ids))
        .filter(users::company_id.eq(company_id))
        .select(count_star())
        .first(conn)?;
    if known != assignee_ids.len() as i64 {
        return Err(AppError::bad_request("assignees must be users of this company"));
    }
    Ok(assignee_ids)
}

fn ensure_job_in_company(conn: &mut PgConnection, company_id: Uuid, job_id: Uuid) -> AppResult<()> {
    let owner: Option<Uuid> = jobs::table
        .find(job_id)
        .select(jobs::company_id)
        .first(conn)
        .optional()?;
    if owner != Some(company_id) {
        return Err(AppError::bad_request("job does not exist in this company"));
    }
    Ok(())
}

fn load_task(conn: &mut PgConnection, ctx: &TenantContext, task_id: Uuid) -> AppResult<Task> {
    let task: Task = tasks::table
        .find(task_id)
        .first(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found_with("task not found"))?;
    ctx.ensure_can_access(task.company_id)?;
    Ok(task)
}

pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<TaskQuery>,
) -> AppResult<Json<Vec<Task>>> {
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;

    let mut query = tasks::table
        .filter(tasks::company_id.eq(ctx.effective_company_id()))
        .into_boxed();
    if let Some(completed) = params.completed {
        query = query.filter(tasks::completed.eq(completed));
    }
    if let Some(assignee_id) = params.assignee_id {
        query = query.filter(tasks::assignee_ids.contains(vec![assignee_id]));
    }

    let rows: Vec<Task> = query
        .order((tasks::completed.asc(), tasks::due_date.asc().nulls_last(), tasks::created_at.asc()))
        .load(&mut conn)?;
    Ok(Json(rows))
}

pub async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let description = payload.description.trim();
    if description.is_empty() {
        return Err(AppError::bad_request("description must not be empty"));
    }

    let ctx = user.tenant();
    let company_id = ctx.effective_company_id();
    let mut conn = state.tenant_db(&ctx)?;
    if let Some(job_id) = payload.job_id {
        ensure_job_in_company(&mut conn, company_id, job_id)?;
    }
    let assignee_ids = checked_assignees(&mut conn, company_id, payload.assignee_ids)?;

    let task: Task = diesel::insert_into(tasks::table)
        .values(&NewTask {
            id: Uuid::new_v4(),
            company_id,
            job_id: payload.job_id,
            description: description.to_string(),
            assignee_ids,
            due_date: payload.due_date,
        })
        .get_result(&mut conn)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
    Json(body): Json<Value>,
) -> AppResult<Json<Task>> {
    ensure_object(&body).map_err(AppError::bad_request)?;

    let mut changes = TaskChangeset {
        description: patch_text(&body, "description")
            .and_then(|patch| patch.into_required("description"))
            .map_err(AppError::bad_request)?,
        job_id: patch_field::<Uuid>(&body, "job_id")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        due_date: patch_field::<NaiveDate>(&body, "due_date")
            .map_err(AppError::bad_request)?
            .into_nullable(),
        completed: patch_field::<bool>(&body, "completed")
            .and_then(|patch| patch.into_required("completed"))
            .map_err(AppError::bad_request)?,
        ..TaskChangeset::default()
    };
    let assignees = patch_field::<Vec<Uuid>>(&body, "assignee_ids")
        .and_then(|patch| patch.into_required("assignee_ids"))
        .map_err(AppError::bad_request)?;

    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    let existing = load_task(&mut conn, &ctx, task_id)?;

    if let Some(Some(job_id)) = changes.job_id {
        ensure_job_in_company(&mut conn, existing.company_id, job_id)?;
    }
    if let Some(ids) = assignees {
        changes.assignee_ids = Some(checked_assignees(&mut conn, existing.company_id, ids)?);
    }
    match changes.completed {
        Some(true) if !existing.completed => {
            changes.completed_at = Some(Some(Utc::now().naive_utc()));
        }
        Some(false) => changes.completed_at = Some(None),
        _ => {}
    }

    if changes.is_empty() {
        return Ok(Json(existing));
    }

    let task: Task = diesel::update(tasks::table.find(task_id))
        .set(&changes)
        .get_result(&mut conn)?;
    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.permissions().require(Capability::DeleteRecords)?;
    let ctx = user.tenant();
    let mut conn = state.tenant_db(&ctx)?;
    load_task(&mut conn, &ctx, task_id)?;
    diesel::delete(tasks::table.find(task_id)).execute(&mut conn)?;
    Ok(StatusCode::NO_CONTENT)
}
