use crate::api::approval::{
    ApprovalTable, DecisionBody, load_context, owner_manager_id, record_transition,
    visibility_filters,
};
use crate::auth::auth::AuthUser;
use crate::domain::approval::{self, ApprovalStatus, Decision, RequestContext, Stage};
use crate::domain::leave::{self, LeaveType};
use crate::error::{AppError, AppResult};
use crate::model::leave_request::{LeaveBalance, LeaveRequest};
use crate::model::permission::Permission;
use crate::utils::db_utils::{Page, SqlValue, bind_values};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::MySqlPool;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

const LEAVE_COLUMNS: &str = r#"
    r.id, r.business_unit_id, r.user_id, r.leave_type, r.start_date, r.end_date, r.days,
    r.reason, r.status, r.manager_action_by, r.manager_action_at, r.manager_comments,
    r.hr_action_by, r.hr_action_at, r.hr_comments, r.created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct CreateLeave {
    #[schema(example = "2026-01-05", format = "date", value_type = String)]
    pub start_date: NaiveDate,
    #[schema(example = "2026-01-07", format = "date", value_type = String)]
    pub end_date: NaiveDate,
    pub leave_type: LeaveType,
    #[schema(example = "Family trip")]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LeaveListResponse {
    pub data: Vec<LeaveRequest>,
    #[schema(example = 1)]
    pub page: u32,
    #[schema(example = 10)]
    pub per_page: u32,
    #[schema(example = 1)]
    pub total: i64,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct LeaveFilter {
    /// Filter by requester
    pub user_id: Option<u64>,
    /// Filter by status, e.g. PENDING_HR
    pub status: Option<ApprovalStatus>,
    pub leave_type: Option<LeaveType>,
    /// Pagination page number (start with 1)
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Deserialize, IntoParams)]
pub struct BalanceQuery {
    /// Defaults to the caller
    pub user_id: Option<u64>,
    /// Defaults to the current year
    pub year: Option<u16>,
}

#[derive(Deserialize, ToSchema)]
pub struct SetBalance {
    pub user_id: u64,
    pub leave_type: LeaveType,
    #[schema(example = 2026)]
    pub year: u16,
    #[schema(example = 15)]
    pub allotted: u32,
}

fn context_of(leave: &LeaveRequest, owner_manager_id: Option<u64>) -> RequestContext {
    RequestContext {
        id: leave.id,
        business_unit_id: leave.business_unit_id,
        owner_id: leave.user_id,
        owner_manager_id,
        status: leave.status,
    }
}

async fn fetch_leave(
    conn: &mut sqlx::MySqlConnection,
    leave_id: u64,
    business_unit_id: u64,
) -> AppResult<LeaveRequest> {
    let sql = format!(
        "SELECT {LEAVE_COLUMNS} FROM leave_requests r WHERE r.id = ? AND r.business_unit_id = ?"
    );
    sqlx::query_as::<_, LeaveRequest>(&sql)
        .bind(leave_id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Leave request not found"))
}

/* =========================
Create leave request
========================= */
#[utoipa::path(
    post,
    path = "/api/leave",
    request_body(content = CreateLeave, description = "Leave request payload", content_type = "application/json"),
    responses(
        (status = 201, description = "Leave request submitted", body = LeaveRequest),
        (status = 400, description = "Invalid range or insufficient balance"),
        (status = 401, description = "Unauthorized"),
        (status = 409, description = "Overlaps an existing request")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
#[instrument(name = "leave_create", skip_all, fields(user_id = auth.user_id))]
pub async fn create_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateLeave>,
) -> AppResult<impl Responder> {
    let days = leave::validate_range(payload.start_date, payload.end_date)?;
    let year = payload.start_date.year();

    let mut tx = pool.begin().await?;

    let overlapping = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM leave_requests
        WHERE user_id = ? AND status <> ? AND start_date <= ? AND end_date >= ?
        "#,
    )
    .bind(auth.user_id)
    .bind(ApprovalStatus::Rejected.as_ref())
    .bind(payload.end_date)
    .bind(payload.start_date)
    .fetch_one(&mut *tx)
    .await?;

    if overlapping > 0 {
        return Err(AppError::conflict(
            "The requested dates overlap another leave request",
        ));
    }

    if payload.leave_type.is_balance_tracked() {
        let balance = sqlx::query_as::<_, (u32, u32)>(
            r#"
            SELECT allotted, used FROM leave_balances
            WHERE user_id = ? AND leave_type = ? AND year = ?
            FOR UPDATE
            "#,
        )
        .bind(auth.user_id)
        .bind(payload.leave_type.as_ref())
        .bind(year)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((allotted, used)) = balance else {
            return Err(AppError::validation(format!(
                "No {} leave allotted for {year}",
                payload.leave_type.as_ref()
            )));
        };

        let pending = sqlx::query_scalar::<_, u64>(
            r#"
            SELECT CAST(COALESCE(SUM(days), 0) AS UNSIGNED) FROM leave_requests
            WHERE user_id = ? AND leave_type = ? AND YEAR(start_date) = ?
            AND status IN (?, ?)
            "#,
        )
        .bind(auth.user_id)
        .bind(payload.leave_type.as_ref())
        .bind(year)
        .bind(ApprovalStatus::PendingManager.as_ref())
        .bind(ApprovalStatus::PendingHr.as_ref())
        .fetch_one(&mut *tx)
        .await?;

        leave::check_balance(days, allotted, used, pending as u32)?;
    }

    let result = sqlx::query(
        r#"
        INSERT INTO leave_requests
            (business_unit_id, user_id, leave_type, start_date, end_date, days, reason, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(auth.user_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.start_date)
    .bind(payload.end_date)
    .bind(days)
    .bind(payload.reason.as_deref())
    .bind(ApprovalStatus::PendingManager.as_ref())
    .execute(&mut *tx)
    .await?;

    let created = fetch_leave(&mut tx, result.last_insert_id(), auth.business_unit_id).await?;
    tx.commit().await?;

    tracing::info!(leave_id = created.id, days, "Leave request submitted");
    Ok(HttpResponse::Created().json(created))
}

async fn decide_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    leave_id: u64,
    decision: Decision,
    comments: Option<String>,
) -> AppResult<HttpResponse> {
    let mut tx = pool.begin().await?;

    let ctx = load_context(&mut tx, ApprovalTable::Leave, leave_id, auth.business_unit_id).await?;
    let transition = approval::decide(&auth, &ctx, decision, comments.as_deref())?;

    if transition.stage == Stage::Hr && transition.to == ApprovalStatus::Approved {
        let leave = fetch_leave(&mut tx, leave_id, auth.business_unit_id).await?;
        if leave.leave_type.is_balance_tracked() {
            let deducted = sqlx::query(
                r#"
                UPDATE leave_balances
                SET used = used + ?
                WHERE user_id = ? AND leave_type = ? AND year = ? AND allotted >= used + ?
                "#,
            )
            .bind(leave.days)
            .bind(leave.user_id)
            .bind(leave.leave_type.as_ref())
            .bind(leave.start_date.year())
            .bind(leave.days)
            .execute(&mut *tx)
            .await?;

            if deducted.rows_affected() == 0 {
                return Err(AppError::validation(
                    "Requester no longer has enough leave balance",
                ));
            }
        }
    }

    record_transition(
        &mut tx,
        ApprovalTable::Leave,
        &ctx,
        transition,
        &auth,
        comments.as_deref(),
    )
    .await?;

    let updated = fetch_leave(&mut tx, leave_id, auth.business_unit_id).await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Approve leave (manager, then HR)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/approve",
    params(("leave_id" = u64, Path, description = "ID of the leave request to approve")),
    request_body(content = DecisionBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Moved to the next stage", body = LeaveRequest),
        (status = 403, description = "Not the manager / HR for this request"),
        (status = 404, description = "Leave request not found"),
        (status = 409, description = "Request is not awaiting this decision")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
#[instrument(name = "leave_approve", skip_all, fields(leave_id = *path, actor = auth.user_id))]
pub async fn approve_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: Option<web::Json<DecisionBody>>,
) -> AppResult<impl Responder> {
    let comments = body.and_then(|b| b.into_inner().comments);
    decide_leave(auth, pool, path.into_inner(), Decision::Approve, comments).await
}

/* =========================
Reject leave (manager or HR)
========================= */
#[utoipa::path(
    put,
    path = "/api/leave/{leave_id}/reject",
    params(("leave_id" = u64, Path, description = "ID of the leave request to reject")),
    request_body(content = DecisionBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Leave rejected", body = LeaveRequest),
        (status = 400, description = "Missing comment"),
        (status = 403, description = "Not the manager / HR for this request"),
        (status = 409, description = "Request already decided")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
#[instrument(name = "leave_reject", skip_all, fields(leave_id = *path, actor = auth.user_id))]
pub async fn reject_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<DecisionBody>,
) -> AppResult<impl Responder> {
    decide_leave(
        auth,
        pool,
        path.into_inner(),
        Decision::Reject,
        body.into_inner().comments,
    )
    .await
}

/// for getting a leave application details endpoint
#[utoipa::path(
    get,
    path = "/api/leave/{leave_id}",
    params(("leave_id" = u64, Path, description = "ID of the leave request to fetch")),
    responses(
        (status = 200, description = "Leave request found", body = LeaveRequest),
        (status = 404, description = "Leave request not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn get_leave(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let leave_id = path.into_inner();
    let mut conn = pool.acquire().await?;

    let leave = fetch_leave(&mut conn, leave_id, auth.business_unit_id).await?;
    let manager = owner_manager_id(&mut conn, leave.user_id).await?;

    // Hidden rather than forbidden, so ids cannot be probed.
    if !approval::can_view(&auth, &context_of(&leave, manager)) {
        return Err(AppError::not_found("Leave request not found"));
    }

    Ok(HttpResponse::Ok().json(leave))
}

/// for getting leave applications endpoint
#[utoipa::path(
    get,
    path = "/api/leave",
    params(LeaveFilter),
    responses((status = 200, description = "Paginated leave list", body = LeaveListResponse)),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<LeaveFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);

    let mut filters = visibility_filters(&auth);
    filters
        .push_opt("r.user_id = ?", query.user_id.map(SqlValue::U64))
        .push_opt(
            "r.status = ?",
            query.status.map(|s| SqlValue::String(s.as_ref().to_string())),
        )
        .push_opt(
            "r.leave_type = ?",
            query.leave_type.map(|t| SqlValue::String(t.as_ref().to_string())),
        );
    let where_sql = filters.where_sql();

    let count_sql = format!(
        "SELECT COUNT(*) FROM leave_requests r JOIN users u ON u.id = r.user_id{where_sql}"
    );
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        r#"
        SELECT {LEAVE_COLUMNS}
        FROM leave_requests r
        JOIN users u ON u.id = r.user_id
        {where_sql}
        ORDER BY r.created_at DESC
        LIMIT ? OFFSET ?
        "#
    );
    let data = bind_values!(sqlx::query_as::<_, LeaveRequest>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(LeaveListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

/// Leave balances of a user for a year
#[utoipa::path(
    get,
    path = "/api/leave/balances",
    params(BalanceQuery),
    responses((status = 200, body = [LeaveBalance])),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn leave_balances(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<BalanceQuery>,
) -> AppResult<impl Responder> {
    let user_id = query.user_id.unwrap_or(auth.user_id);
    if user_id != auth.user_id {
        auth.require(Permission::ManageLeaveBalances)?;
    }
    let year = query
        .year
        .unwrap_or_else(|| chrono::Local::now().year() as u16);

    let balances = sqlx::query_as::<_, LeaveBalance>(
        r#"
        SELECT b.user_id, b.leave_type, b.year, b.allotted, b.used
        FROM leave_balances b
        JOIN users u ON u.id = b.user_id
        WHERE b.user_id = ? AND b.year = ? AND u.business_unit_id = ?
        ORDER BY b.leave_type
        "#,
    )
    .bind(user_id)
    .bind(year)
    .bind(auth.business_unit_id)
    .fetch_all(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(balances))
}

/// Set (or create) a user's allotment for a leave type and year
#[utoipa::path(
    put,
    path = "/api/leave/balances",
    request_body = SetBalance,
    responses(
        (status = 200, description = "Allotment saved"),
        (status = 400, description = "Allotment below days already used")
    ),
    security(("bearer_auth" = [])),
    tag = "Leave"
)]
pub async fn set_leave_balance(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<SetBalance>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageLeaveBalances)?;

    if !payload.leave_type.is_balance_tracked() {
        return Err(AppError::validation(format!(
            "{} leave has no allotment",
            payload.leave_type.as_ref()
        )));
    }

    let mut tx = pool.begin().await?;

    let in_unit = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND business_unit_id = ?",
    )
    .bind(payload.user_id)
    .bind(auth.business_unit_id)
    .fetch_one(&mut *tx)
    .await?;
    if in_unit == 0 {
        return Err(AppError::not_found("User not found"));
    }

    let used = sqlx::query_scalar::<_, u32>(
        "SELECT used FROM leave_balances WHERE user_id = ? AND leave_type = ? AND year = ? FOR UPDATE",
    )
    .bind(payload.user_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.year)
    .fetch_optional(&mut *tx)
    .await?
    .unwrap_or(0);

    if payload.allotted < used {
        return Err(AppError::validation(format!(
            "Allotment cannot be below the {used} day(s) already used"
        )));
    }

    sqlx::query(
        r#"
        INSERT INTO leave_balances (user_id, leave_type, year, allotted, used)
        VALUES (?, ?, ?, ?, 0)
        ON DUPLICATE KEY UPDATE allotted = VALUES(allotted)
        "#,
    )
    .bind(payload.user_id)
    .bind(payload.leave_type.as_ref())
    .bind(payload.year)
    .bind(payload.allotted)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = payload.user_id,
        leave_type = payload.leave_type.as_ref(),
        year = payload.year,
        allotted = payload.allotted,
        "Leave allotment saved"
    );
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Leave allotment saved"
    })))
}
