use crate::api::approval::{
    ApprovalTable, DecisionBody, load_context, owner_manager_id, record_transition,
    visibility_filters,
};
use crate::auth::auth::AuthUser;
use crate::domain::approval::{self, ApprovalStatus, Decision, RequestContext};
use crate::domain::overtime::overtime_hours;
use crate::error::{AppError, AppResult};
use crate::model::overtime_request::OvertimeRequest;
use crate::utils::db_utils::{Page, SqlValue, bind_values};
use actix_web::{HttpResponse, Responder, web};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

const OVERTIME_COLUMNS: &str = r#"
    r.id, r.business_unit_id, r.user_id, r.work_date, r.start_at, r.end_at, r.hours,
    r.reason, r.status, r.manager_action_by, r.manager_action_at, r.manager_comments,
    r.hr_action_by, r.hr_action_at, r.hr_comments, r.created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateOvertime {
    #[schema(example = "2026-02-10", format = "date", value_type = String)]
    pub work_date: NaiveDate,
    #[schema(example = "2026-02-10T17:00:00", value_type = String)]
    pub start_at: NaiveDateTime,
    #[schema(example = "2026-02-10T20:30:00", value_type = String)]
    pub end_at: NaiveDateTime,
    #[schema(example = "Release cut-over")]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct OvertimeListResponse {
    pub data: Vec<OvertimeRequest>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Deserialize, IntoParams)]
pub struct OvertimeFilter {
    pub user_id: Option<u64>,
    pub status: Option<ApprovalStatus>,
    #[param(value_type = Option<String>, format = "date")]
    pub from: Option<NaiveDate>,
    #[param(value_type = Option<String>, format = "date")]
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

async fn fetch_overtime(
    conn: &mut MySqlConnection,
    overtime_id: u64,
    business_unit_id: u64,
) -> AppResult<OvertimeRequest> {
    let sql = format!(
        "SELECT {OVERTIME_COLUMNS} FROM overtime_requests r WHERE r.id = ? AND r.business_unit_id = ?"
    );
    sqlx::query_as::<_, OvertimeRequest>(&sql)
        .bind(overtime_id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Overtime request not found"))
}

#[utoipa::path(
    post,
    path = "/api/overtime",
    request_body = CreateOvertime,
    responses(
        (status = 201, description = "Overtime request submitted", body = OvertimeRequest),
        (status = 400, description = "Invalid time range")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
#[instrument(name = "overtime_create", skip_all, fields(user_id = auth.user_id))]
pub async fn create_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateOvertime>,
) -> AppResult<impl Responder> {
    let hours = overtime_hours(payload.start_at, payload.end_at)?;
    if payload.start_at.date() != payload.work_date {
        return Err(AppError::validation("start_at must fall on work_date"));
    }

    let mut conn = pool.acquire().await?;
    let result = sqlx::query(
        r#"
        INSERT INTO overtime_requests
            (business_unit_id, user_id, work_date, start_at, end_at, hours, reason, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(auth.user_id)
    .bind(payload.work_date)
    .bind(payload.start_at)
    .bind(payload.end_at)
    .bind(hours)
    .bind(payload.reason.as_deref())
    .bind(ApprovalStatus::PendingManager.as_ref())
    .execute(&mut *conn)
    .await?;

    let created = fetch_overtime(&mut conn, result.last_insert_id(), auth.business_unit_id).await?;
    tracing::info!(overtime_id = created.id, %hours, "Overtime request submitted");
    Ok(HttpResponse::Created().json(created))
}

async fn decide_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    overtime_id: u64,
    decision: Decision,
    comments: Option<String>,
) -> AppResult<HttpResponse> {
    let mut tx = pool.begin().await?;

    let ctx = load_context(
        &mut tx,
        ApprovalTable::Overtime,
        overtime_id,
        auth.business_unit_id,
    )
    .await?;
    let transition = approval::decide(&auth, &ctx, decision, comments.as_deref())?;
    record_transition(
        &mut tx,
        ApprovalTable::Overtime,
        &ctx,
        transition,
        &auth,
        comments.as_deref(),
    )
    .await?;

    let updated = fetch_overtime(&mut tx, overtime_id, auth.business_unit_id).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/overtime/{overtime_id}/approve",
    params(("overtime_id" = u64, Path, description = "Overtime request id")),
    request_body(content = DecisionBody, content_type = "application/json"),
    responses(
        (status = 200, body = OvertimeRequest),
        (status = 403, description = "Not the manager / HR for this request"),
        (status = 409, description = "Request is not awaiting this decision")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
#[instrument(name = "overtime_approve", skip_all, fields(overtime_id = *path, actor = auth.user_id))]
pub async fn approve_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> AppResult<impl Responder> {
    let comments = body.and_then(|b| b.into_inner().comments);
    decide_overtime(auth, pool, path.into_inner(), Decision::Approve, comments).await
}

#[utoipa::path(
    put,
    path = "/api/overtime/{overtime_id}/reject",
    params(("overtime_id" = u64, Path, description = "Overtime request id")),
    request_body(content = DecisionBody, content_type = "application/json"),
    responses(
        (status = 200, body = OvertimeRequest),
        (status = 400, description = "Missing comment"),
        (status = 409, description = "Request already decided")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
#[instrument(name = "overtime_reject", skip_all, fields(overtime_id = *path, actor = auth.user_id))]
pub async fn reject_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<DecisionBody>,
) -> AppResult<impl Responder> {
    decide_overtime(
        auth,
        pool,
        path.into_inner(),
        Decision::Reject,
        body.into_inner().comments,
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/overtime/{overtime_id}",
    params(("overtime_id" = u64, Path, description = "Overtime request id")),
    responses(
        (status = 200, body = OvertimeRequest),
        (status = 404, description = "Overtime request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn get_overtime(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let overtime = fetch_overtime(&mut conn, path.into_inner(), auth.business_unit_id).await?;
    let manager = owner_manager_id(&mut conn, overtime.user_id).await?;

    let ctx = RequestContext {
        id: overtime.id,
        business_unit_id: overtime.business_unit_id,
        owner_id: overtime.user_id,
        owner_manager_id: manager,
        status: overtime.status,
    };
    if !approval::can_view(&auth, &ctx) {
        return Err(AppError::not_found("Overtime request not found"));
    }

    Ok(HttpResponse::Ok().json(overtime))
}

#[utoipa::path(
    get,
    path = "/api/overtime",
    params(OvertimeFilter),
    responses((status = 200, body = OvertimeListResponse)),
    security(("bearer_auth" = [])),
    tag = "Overtime"
)]
pub async fn overtime_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<OvertimeFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);

    let mut filters = visibility_filters(&auth);
    filters
        .push_opt("r.user_id = ?", query.user_id.map(SqlValue::U64))
        .push_opt(
            "r.status = ?",
            query.status.map(|s| SqlValue::String(s.as_ref().to_string())),
        )
        .push_opt("r.work_date >= ?", query.from.map(SqlValue::Date))
        .push_opt("r.work_date <= ?", query.to.map(SqlValue::Date));
    let where_sql = filters.where_sql();

    let count_sql = format!(
        "SELECT COUNT(*) FROM overtime_requests r JOIN users u ON u.id = r.user_id{where_sql}"
    );
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        r#"
        SELECT {OVERTIME_COLUMNS}
        FROM overtime_requests r
        JOIN users u ON u.id = r.user_id
        {where_sql}
        ORDER BY r.work_date DESC, r.id DESC
        LIMIT ? OFFSET ?
        "#
    );
    let data = bind_values!(sqlx::query_as::<_, OvertimeRequest>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(OvertimeListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}
