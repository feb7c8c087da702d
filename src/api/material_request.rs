use crate::auth::auth::AuthUser;
use crate::domain::material::{self, MaterialAction, MaterialStatus};
use crate::error::{AppError, AppResult};
use crate::model::material_request::{MaterialRequest, MaterialRequestItem};
use crate::model::permission::Permission;
use crate::utils::db_utils::{Filters, Page, SqlValue, bind_values};
use actix_web::{HttpResponse, Responder, web};
use chrono::Local;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use std::collections::HashSet;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

const REQUEST_COLUMNS: &str = r#"
    m.id, m.business_unit_id, m.reference, m.user_id, m.department_id, m.purpose,
    m.rec_approver_id, m.final_approver_id, m.status, m.submitted_at, m.rec_approved_at,
    m.final_approved_at, m.rejected_by, m.rejected_at, m.rejection_reason,
    m.acknowledged_by, m.acknowledged_at, m.supplier, m.po_number, m.posted_by,
    m.posted_at, m.done_at, m.is_marked_for_edit, m.marked_for_edit_by,
    m.marked_for_edit_at, m.edit_reason, m.edit_completed_at, m.created_at
"#;

#[derive(Deserialize, ToSchema)]
pub struct ItemInput {
    #[schema(example = "CEM-40KG")]
    pub item_code: String,
    #[schema(example = "Portland cement, 40kg bag")]
    pub description: String,
    #[schema(example = "BAG")]
    pub uom: String,
    #[schema(value_type = String, example = "20")]
    pub quantity: Decimal,
    pub remarks: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct MaterialRequestInput {
    /// Defaults to the requester's department
    pub department_id: Option<u64>,
    #[schema(example = "Slab repair, warehouse B")]
    pub purpose: String,
    pub rec_approver_id: u64,
    pub final_approver_id: u64,
    pub items: Vec<ItemInput>,
}

#[derive(Deserialize, ToSchema)]
pub struct ReasonBody {
    #[schema(example = "Wrong item code on line 2")]
    pub reason: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ItemDescription {
    pub id: u64,
    pub description: String,
}

#[derive(Deserialize, ToSchema)]
pub struct CompleteEditBody {
    pub items: Vec<ItemDescription>,
}

#[derive(Deserialize, ToSchema)]
pub struct ServeLine {
    pub item_id: u64,
    #[schema(value_type = String, example = "5")]
    pub quantity: Decimal,
}

#[derive(Deserialize, ToSchema)]
pub struct ServeBody {
    pub lines: Vec<ServeLine>,
}

#[derive(Deserialize, ToSchema)]
pub struct PostBody {
    #[schema(example = "ACME Builders Supply")]
    pub supplier: String,
    #[schema(example = "PO-2026-0113")]
    pub po_number: String,
}

#[derive(Serialize, ToSchema)]
pub struct MaterialRequestDetail {
    pub request: MaterialRequest,
    pub items: Vec<MaterialRequestItem>,
}

#[derive(Serialize, ToSchema)]
pub struct MaterialListResponse {
    pub data: Vec<MaterialRequest>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Deserialize, IntoParams)]
pub struct MaterialFilter {
    pub status: Option<MaterialStatus>,
    pub department_id: Option<u64>,
    /// Only requests raised by the caller
    pub mine: Option<bool>,
    /// Only requests waiting on the caller
    pub pending_my_action: Option<bool>,
    /// Reference or purpose
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn non_blank(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

async fn fetch_request(
    conn: &mut MySqlConnection,
    request_id: u64,
    business_unit_id: u64,
    for_update: bool,
) -> AppResult<MaterialRequest> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM material_requests m WHERE m.id = ? AND m.business_unit_id = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, MaterialRequest>(&sql)
        .bind(request_id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Material request not found"))
}

async fn fetch_items(
    conn: &mut MySqlConnection,
    request_id: u64,
    for_update: bool,
) -> AppResult<Vec<MaterialRequestItem>> {
    let sql = format!(
        r#"
        SELECT id, material_request_id, item_code, description, uom, quantity, quantity_served, remarks
        FROM material_request_items
        WHERE material_request_id = ?
        ORDER BY id{}
        "#,
        if for_update { " FOR UPDATE" } else { "" }
    );
    Ok(sqlx::query_as::<_, MaterialRequestItem>(&sql)
        .bind(request_id)
        .fetch_all(&mut *conn)
        .await?)
}

async fn detail(
    conn: &mut MySqlConnection,
    request_id: u64,
    business_unit_id: u64,
) -> AppResult<MaterialRequestDetail> {
    let request = fetch_request(conn, request_id, business_unit_id, false).await?;
    let items = fetch_items(conn, request_id, false).await?;
    Ok(MaterialRequestDetail { request, items })
}

/// Locks the request and checks `action` for the caller.
async fn lock_for(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    request_id: u64,
    action: MaterialAction,
) -> AppResult<(MaterialRequest, MaterialStatus)> {
    let request = fetch_request(conn, request_id, auth.business_unit_id, true).await?;
    let next = material::authorize(auth, &request.context(), action)?;
    Ok((request, next))
}

/// Conditional update guarded by the status the action was authorized on.
async fn update_request(
    conn: &mut MySqlConnection,
    request_id: u64,
    from: MaterialStatus,
    assignments: &str,
    values: Vec<SqlValue>,
) -> AppResult<()> {
    let sql = format!("UPDATE material_requests SET {assignments} WHERE id = ? AND status = ?");
    let result = bind_values!(sqlx::query(&sql), &values)
        .bind(request_id)
        .bind(from.as_ref())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict(
            "Material request was changed by someone else, reload and try again",
        ));
    }
    Ok(())
}

fn status_value(status: MaterialStatus) -> SqlValue {
    SqlValue::String(status.as_ref().to_string())
}

/// Approvers must be active users of the same business unit.
async fn check_approvers(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    rec_approver_id: u64,
    final_approver_id: u64,
) -> AppResult<()> {
    material::check_approvers(auth.user_id, rec_approver_id, final_approver_id)?;

    let found = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id IN (?, ?) AND business_unit_id = ? AND is_active = TRUE",
    )
    .bind(rec_approver_id)
    .bind(final_approver_id)
    .bind(auth.business_unit_id)
    .fetch_one(&mut *conn)
    .await?;

    if found != 2 {
        return Err(AppError::validation(
            "Approvers must be active users of your business unit",
        ));
    }
    Ok(())
}

async fn resolve_department(
    conn: &mut MySqlConnection,
    auth: &AuthUser,
    department_id: Option<u64>,
) -> AppResult<u64> {
    let department_id = match department_id {
        Some(id) => id,
        None => sqlx::query_scalar::<_, Option<u64>>("SELECT department_id FROM users WHERE id = ?")
            .bind(auth.user_id)
            .fetch_one(&mut *conn)
            .await?
            .ok_or_else(|| {
                AppError::validation("department_id is required, you have no department on file")
            })?,
    };

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM departments WHERE id = ? AND business_unit_id = ?",
    )
    .bind(department_id)
    .bind(auth.business_unit_id)
    .fetch_one(&mut *conn)
    .await?;
    if exists == 0 {
        return Err(AppError::validation("Department not found in your business unit"));
    }
    Ok(department_id)
}

async fn insert_items(
    conn: &mut MySqlConnection,
    request_id: u64,
    items: &[ItemInput],
) -> AppResult<()> {
    for item in items {
        sqlx::query(
            r#"
            INSERT INTO material_request_items
                (material_request_id, item_code, description, uom, quantity, remarks)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(request_id)
        .bind(item.item_code.trim())
        .bind(item.description.trim())
        .bind(item.uom.trim())
        .bind(item.quantity)
        .bind(item.remarks.as_deref())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

fn validate_input(payload: &MaterialRequestInput) -> AppResult<String> {
    let purpose = non_blank(&payload.purpose, "purpose")?;
    if payload.items.is_empty() {
        return Err(AppError::validation("A material request needs at least one item"));
    }
    for item in &payload.items {
        material::validate_line(&item.item_code, &item.description, &item.uom, item.quantity)?;
    }
    Ok(purpose)
}

/* =========================
Create (draft)
========================= */
#[utoipa::path(
    post,
    path = "/api/material-requests",
    request_body = MaterialRequestInput,
    responses(
        (status = 201, description = "Draft created", body = MaterialRequestDetail),
        (status = 400, description = "Invalid items or approvers")
    ),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
#[instrument(name = "mrs_create", skip_all, fields(user_id = auth.user_id))]
pub async fn create_material_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<MaterialRequestInput>,
) -> AppResult<impl Responder> {
    let purpose = validate_input(&payload)?;

    let mut tx = pool.begin().await?;
    check_approvers(&mut tx, &auth, payload.rec_approver_id, payload.final_approver_id).await?;
    let department_id = resolve_department(&mut tx, &auth, payload.department_id).await?;

    let today = Local::now().date_naive();
    let prefix = format!("MRS-{}-", today.format("%Y%m"));
    let last = sqlx::query_scalar::<_, String>(
        r#"
        SELECT reference FROM material_requests
        WHERE business_unit_id = ? AND reference LIKE ?
        ORDER BY reference DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(format!("{prefix}%"))
    .fetch_optional(&mut *tx)
    .await?;
    let reference = material::format_reference(today, material::next_sequence(last.as_deref()));

    let result = sqlx::query(
        r#"
        INSERT INTO material_requests
            (business_unit_id, reference, user_id, department_id, purpose,
             rec_approver_id, final_approver_id, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(&reference)
    .bind(auth.user_id)
    .bind(department_id)
    .bind(&purpose)
    .bind(payload.rec_approver_id)
    .bind(payload.final_approver_id)
    .bind(MaterialStatus::Draft.as_ref())
    .execute(&mut *tx)
    .await?;
    let request_id = result.last_insert_id();

    insert_items(&mut tx, request_id, &payload.items).await?;
    let created = detail(&mut tx, request_id, auth.business_unit_id).await?;
    tx.commit().await?;

    tracing::info!(request_id, %reference, "Material request drafted");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = MaterialRequestInput,
    responses(
        (status = 200, description = "Draft replaced", body = MaterialRequestDetail),
        (status = 409, description = "No longer a draft")
    ),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
#[instrument(name = "mrs_update_draft", skip_all, fields(request_id = *path))]
pub async fn update_draft(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<MaterialRequestInput>,
) -> AppResult<impl Responder> {
    let request_id = path.into_inner();
    let purpose = validate_input(&payload)?;

    let mut tx = pool.begin().await?;
    let (request, _) = lock_for(&mut tx, &auth, request_id, MaterialAction::UpdateDraft).await?;
    check_approvers(&mut tx, &auth, payload.rec_approver_id, payload.final_approver_id).await?;
    let department_id = match payload.department_id {
        Some(_) => resolve_department(&mut tx, &auth, payload.department_id).await?,
        None => request.department_id,
    };

    update_request(
        &mut tx,
        request_id,
        MaterialStatus::Draft,
        "purpose = ?, department_id = ?, rec_approver_id = ?, final_approver_id = ?",
        vec![
            SqlValue::String(purpose),
            SqlValue::U64(department_id),
            SqlValue::U64(payload.rec_approver_id),
            SqlValue::U64(payload.final_approver_id),
        ],
    )
    .await?;

    sqlx::query("DELETE FROM material_request_items WHERE material_request_id = ?")
        .bind(request_id)
        .execute(&mut *tx)
        .await?;
    insert_items(&mut tx, request_id, &payload.items).await?;

    let updated = detail(&mut tx, request_id, auth.business_unit_id).await?;
    tx.commit().await?;
    Ok(HttpResponse::Ok().json(updated))
}

/// Runs a transition whose only side effects are the status and `assignments`.
async fn simple_transition(
    auth: &AuthUser,
    pool: &MySqlPool,
    request_id: u64,
    action: MaterialAction,
    assignments: &str,
    mut values: Vec<SqlValue>,
) -> AppResult<HttpResponse> {
    let mut tx = pool.begin().await?;
    let (request, next) = lock_for(&mut tx, auth, request_id, action).await?;

    let mut all = vec![status_value(next)];
    all.append(&mut values);
    let set = if assignments.is_empty() {
        "status = ?".to_string()
    } else {
        format!("status = ?, {assignments}")
    };
    update_request(&mut tx, request_id, request.status, &set, all).await?;

    let updated = detail(&mut tx, request_id, auth.business_unit_id).await?;
    tx.commit().await?;

    tracing::info!(
        request_id,
        actor = auth.user_id,
        action = ?action,
        from = request.status.as_ref(),
        to = next.as_ref(),
        "Material request transition"
    );
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/submit",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 409, description = "Not a draft")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn submit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::Submit,
        "submitted_at = NOW()",
        vec![],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/cancel",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 409, description = "Already past recommending approval")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn cancel(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    simple_transition(&auth, &pool, path.into_inner(), MaterialAction::Cancel, "", vec![]).await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/rec-approve",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 403, description = "Not the recommending approver")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn rec_approve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::RecApprove,
        "rec_approved_at = NOW()",
        vec![],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/final-approve",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 403, description = "Not the final approver")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn final_approve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::FinalApprove,
        "final_approved_at = NOW()",
        vec![],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/reject",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = ReasonBody,
    responses((status = 200, body = MaterialRequestDetail), (status = 400, description = "Missing reason")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn reject(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ReasonBody>,
) -> AppResult<impl Responder> {
    let reason = non_blank(&body.reason, "reason")?;
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::Reject,
        "rejected_by = ?, rejected_at = NOW(), rejection_reason = ?",
        vec![SqlValue::U64(auth.user_id), SqlValue::String(reason)],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/mark-for-edit",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = ReasonBody,
    responses((status = 200, body = MaterialRequestDetail), (status = 403, description = "Not the current approver or a coordinator")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn mark_for_edit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ReasonBody>,
) -> AppResult<impl Responder> {
    let reason = non_blank(&body.reason, "reason")?;
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::MarkForEdit,
        "is_marked_for_edit = TRUE, marked_for_edit_by = ?, marked_for_edit_at = NOW(), \
         edit_reason = ?, edit_completed_at = NULL",
        vec![SqlValue::U64(auth.user_id), SqlValue::String(reason)],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/complete-edit",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = CompleteEditBody,
    responses((status = 200, body = MaterialRequestDetail), (status = 409, description = "Not marked for edit")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
#[instrument(name = "mrs_complete_edit", skip_all, fields(request_id = *path))]
pub async fn complete_edit(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<CompleteEditBody>,
) -> AppResult<impl Responder> {
    let request_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let (request, _) = lock_for(&mut tx, &auth, request_id, MaterialAction::CompleteEdit).await?;

    let known: HashSet<u64> = fetch_items(&mut tx, request_id, true)
        .await?
        .iter()
        .map(|item| item.id)
        .collect();

    for edit in &body.items {
        if !known.contains(&edit.id) {
            return Err(AppError::validation(format!(
                "Item {} is not on this request",
                edit.id
            )));
        }
        let description = non_blank(&edit.description, "description")?;
        sqlx::query("UPDATE material_request_items SET description = ? WHERE id = ?")
            .bind(description)
            .bind(edit.id)
            .execute(&mut *tx)
            .await?;
    }

    update_request(
        &mut tx,
        request_id,
        request.status,
        "is_marked_for_edit = FALSE, edit_completed_at = NOW()",
        vec![],
    )
    .await?;

    let updated = detail(&mut tx, request_id, auth.business_unit_id).await?;
    tx.commit().await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/acknowledge",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 409, description = "Already acknowledged")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn acknowledge(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::Acknowledge,
        "acknowledged_by = ?, acknowledged_at = NOW()",
        vec![SqlValue::U64(auth.user_id)],
    )
    .await
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/serve",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = ServeBody,
    responses(
        (status = 200, description = "Quantities served; FOR_POSTING once every line is complete", body = MaterialRequestDetail),
        (status = 400, description = "Quantity exceeds what remains")
    ),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
#[instrument(name = "mrs_serve", skip_all, fields(request_id = *path, actor = auth.user_id))]
pub async fn serve(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<ServeBody>,
) -> AppResult<impl Responder> {
    let request_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let (request, _) = lock_for(&mut tx, &auth, request_id, MaterialAction::Serve).await?;

    let items = fetch_items(&mut tx, request_id, true).await?;
    let mut lines: Vec<_> = items.iter().map(MaterialRequestItem::line_state).collect();
    let serves: Vec<(u64, Decimal)> = body.lines.iter().map(|l| (l.item_id, l.quantity)).collect();
    let fully_served = material::apply_serving(&mut lines, &serves)?;

    let touched: HashSet<u64> = serves.iter().map(|(id, _)| *id).collect();
    for line in lines.iter().filter(|l| touched.contains(&l.item_id)) {
        sqlx::query("UPDATE material_request_items SET quantity_served = ? WHERE id = ?")
            .bind(line.quantity_served)
            .bind(line.item_id)
            .execute(&mut *tx)
            .await?;
    }

    if fully_served {
        update_request(
            &mut tx,
            request_id,
            request.status,
            "status = ?",
            vec![status_value(MaterialStatus::ForPosting)],
        )
        .await?;
        tracing::info!(request_id, "Material request fully served");
    }

    let updated = detail(&mut tx, request_id, auth.business_unit_id).await?;
    tx.commit().await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    put,
    path = "/api/material-requests/{id}/post",
    params(("id" = u64, Path, description = "Material request id")),
    request_body = PostBody,
    responses((status = 200, body = MaterialRequestDetail), (status = 409, description = "Not ready for posting")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn post(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<PostBody>,
) -> AppResult<impl Responder> {
    let supplier = non_blank(&body.supplier, "supplier")?;
    let po_number = non_blank(&body.po_number, "po_number")?;
    simple_transition(
        &auth,
        &pool,
        path.into_inner(),
        MaterialAction::Post,
        "supplier = ?, po_number = ?, posted_by = ?, posted_at = NOW(), done_at = NOW()",
        vec![
            SqlValue::String(supplier),
            SqlValue::String(po_number),
            SqlValue::U64(auth.user_id),
        ],
    )
    .await
}

#[utoipa::path(
    get,
    path = "/api/material-requests/{id}",
    params(("id" = u64, Path, description = "Material request id")),
    responses((status = 200, body = MaterialRequestDetail), (status = 404, description = "Material request not found")),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn get_material_request(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let found = detail(&mut conn, path.into_inner(), auth.business_unit_id).await?;

    if !material::can_view(&auth, &found.request.context()) {
        return Err(AppError::not_found("Material request not found"));
    }
    Ok(HttpResponse::Ok().json(found))
}

fn list_filters(auth: &AuthUser, query: &MaterialFilter) -> Filters {
    let me = SqlValue::U64(auth.user_id);
    let mut filters = Filters::new();
    filters.push("m.business_unit_id = ?", [SqlValue::U64(auth.business_unit_id)]);

    if !auth.can(Permission::CoordinateMaterialRequests) {
        filters.push(
            "(m.user_id = ? OR m.rec_approver_id = ? OR m.final_approver_id = ?)",
            [me.clone(), me.clone(), me.clone()],
        );
    }
    if query.mine.unwrap_or(false) {
        filters.push("m.user_id = ?", [me.clone()]);
    }
    if query.pending_my_action.unwrap_or(false) {
        let mut clause = String::from(
            "((m.is_marked_for_edit = TRUE AND m.user_id = ?) OR (m.is_marked_for_edit = FALSE AND \
             ((m.status = ? AND m.rec_approver_id = ?) OR (m.status = ? AND m.final_approver_id = ?)",
        );
        let mut values = vec![
            me.clone(),
            status_value(MaterialStatus::ForRecApproval),
            me.clone(),
            status_value(MaterialStatus::ForFinalApproval),
            me,
        ];
        if auth.can(Permission::CoordinateMaterialRequests) {
            clause.push_str(" OR m.status IN (?, ?)");
            values.push(status_value(MaterialStatus::ForServing));
            values.push(status_value(MaterialStatus::ForPosting));
        }
        clause.push_str(")))");
        filters.push(&clause, values);
    }

    filters
        .push_opt("m.status = ?", query.status.map(status_value))
        .push_opt("m.department_id = ?", query.department_id.map(SqlValue::U64))
        .search(&["m.reference", "m.purpose"], query.search.as_deref());
    filters
}

#[utoipa::path(
    get,
    path = "/api/material-requests",
    params(MaterialFilter),
    responses((status = 200, body = MaterialListResponse)),
    security(("bearer_auth" = [])),
    tag = "Material Requests"
)]
pub async fn material_request_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<MaterialFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);
    let filters = list_filters(&auth, &query);
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM material_requests m{where_sql}");
    let total = bind_values!(sqlx::query_scalar::<_, i64>(&count_sql), filters.values())
        .fetch_one(pool.get_ref())
        .await?;

    let data_sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM material_requests m{where_sql} ORDER BY m.created_at DESC, m.id DESC LIMIT ? OFFSET ?"
    );
    let data = bind_values!(sqlx::query_as::<_, MaterialRequest>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(MaterialListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: 5,
            username: "u5".into(),
            role,
            business_unit_id: 3,
        }
    }

    fn filter(mine: bool, pending: bool) -> MaterialFilter {
        MaterialFilter {
            status: None,
            department_id: None,
            mine: Some(mine),
            pending_my_action: Some(pending),
            search: None,
            page: None,
            per_page: None,
        }
    }

    #[test]
    fn participants_only_for_regular_users() {
        let f = list_filters(&actor(Role::Employee), &filter(false, false));
        assert_eq!(
            f.where_sql(),
            " WHERE m.business_unit_id = ? AND (m.user_id = ? OR m.rec_approver_id = ? OR m.final_approver_id = ?)"
        );
    }

    #[test]
    fn coordinator_pending_includes_serving_and_posting() {
        let f = list_filters(&actor(Role::MrsCoordinator), &filter(false, true));
        let sql = f.where_sql();
        assert!(sql.contains("m.status IN (?, ?)"));
        assert!(!sql.contains("m.rec_approver_id = ? OR"));
        assert_eq!(f.values().len(), 8);
        assert_eq!(sql.matches('?').count(), f.values().len());
    }

    #[test]
    fn mine_narrows_to_requester() {
        let f = list_filters(&actor(Role::Manager), &filter(true, false));
        assert!(f.where_sql().ends_with("AND m.user_id = ?"));
    }

    #[test]
    fn blank_reason_rejected() {
        assert!(non_blank("   ", "reason").is_err());
        assert_eq!(non_blank(" ok ", "reason").unwrap(), "ok");
    }
}
