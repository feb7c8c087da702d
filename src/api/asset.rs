use crate::auth::auth::AuthUser;
use crate::config::Config;
use crate::domain::asset::{self, AssetStatus};
use crate::domain::depreciation::DepreciationMethod;
use crate::error::{AppError, AppResult};
use crate::model::asset::{Asset, AssetDeployment};
use crate::model::permission::Permission;
use crate::utils::db_utils::{
    Filters, Page, SqlValue, bind_values, build_update_sql, execute_update,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::{MySqlConnection, MySqlPool};
use std::collections::BTreeSet;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

pub const ASSET_COLUMNS: &str = r#"
    id, business_unit_id, code, description, category, serial_number, purchase_date,
    purchase_price, salvage_value, depreciation_method, useful_life_months,
    depreciation_start_date, accumulated_depreciation, current_book_value,
    last_depreciation_date, status, qr_token, retired_at, retirement_reason,
    disposal_date, disposed_at, created_at
"#;

const UPDATABLE_COLUMNS: &[&str] = &["description", "category", "serial_number"];

/// Required text columns may be changed but never cleared.
fn check_update(payload: &Map<String, Value>) -> AppResult<()> {
    for column in ["description", "category"] {
        if let Some(value) = payload.get(column) {
            if value.as_str().is_none_or(|v| v.trim().is_empty()) {
                return Err(AppError::validation(format!("{column} cannot be blank")));
            }
        }
    }
    Ok(())
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAsset {
    #[schema(example = "IT-LPT-0042")]
    pub code: String,
    #[schema(example = "ThinkPad T14 Gen 4")]
    pub description: String,
    #[schema(example = "IT Equipment")]
    pub category: String,
    pub serial_number: Option<String>,
    #[schema(value_type = String, format = "date", example = "2026-01-15")]
    pub purchase_date: NaiveDate,
    #[schema(value_type = String, example = "1500.00")]
    pub purchase_price: Decimal,
    #[schema(value_type = Option<String>, example = "150.00")]
    pub salvage_value: Option<Decimal>,
    pub depreciation_method: DepreciationMethod,
    #[schema(example = 36)]
    pub useful_life_months: u32,
    /// Defaults to the purchase date
    #[schema(value_type = Option<String>, format = "date")]
    pub depreciation_start_date: Option<NaiveDate>,
}

/// Accepted fields of a partial asset update.
#[derive(Deserialize, ToSchema)]
pub struct UpdateAsset {
    pub description: Option<String>,
    pub category: Option<String>,
    pub serial_number: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct AssetFilter {
    pub status: Option<AssetStatus>,
    pub category: Option<String>,
    /// Code, description or serial number
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Serialize, ToSchema)]
pub struct AssetListResponse {
    pub data: Vec<Asset>,
    pub page: u32,
    pub per_page: u32,
    pub total: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct DeployBody {
    pub user_id: u64,
    pub notes: Option<String>,
}

#[derive(Deserialize, ToSchema, Default)]
pub struct ReturnBody {
    pub notes: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct QrCode {
    pub asset_id: u64,
    #[schema(example = "http://localhost:8080/api/assets/qr/1b4e28ba-2fa1-11d2-883f-0016d3cca427")]
    pub payload: String,
}

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct Holder {
    pub user_id: u64,
    pub username: String,
    pub full_name: String,
    #[schema(value_type = String, format = "date-time")]
    pub deployed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct QrLookup {
    pub asset: Asset,
    /// Current holder when deployed
    pub holder: Option<Holder>,
}

#[derive(Deserialize, ToSchema)]
pub struct RetireBody {
    pub asset_ids: Vec<u64>,
    #[schema(example = "Beyond economical repair")]
    pub reason: String,
    /// Scheduled disposal, today or later
    #[schema(value_type = Option<String>, format = "date")]
    pub disposal_date: Option<NaiveDate>,
}

#[derive(Serialize, ToSchema)]
pub struct RetireSummary {
    pub retired: Vec<u64>,
    /// Assets whose open deployment was closed
    pub auto_returned: Vec<u64>,
}

pub async fn fetch_asset(
    conn: &mut MySqlConnection,
    asset_id: u64,
    business_unit_id: u64,
    for_update: bool,
) -> AppResult<Asset> {
    let sql = format!(
        "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ? AND business_unit_id = ?{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Asset>(&sql)
        .bind(asset_id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Asset not found"))
}

async fn set_status(
    conn: &mut MySqlConnection,
    asset_id: u64,
    from: AssetStatus,
    to: AssetStatus,
) -> AppResult<()> {
    let result = sqlx::query("UPDATE assets SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_ref())
        .bind(asset_id)
        .bind(from.as_ref())
        .execute(&mut *conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::conflict("Asset was changed by someone else, reload and try again"));
    }
    Ok(())
}

async fn close_deployment(
    conn: &mut MySqlConnection,
    asset_id: u64,
    notes: Option<&str>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE asset_deployments
        SET returned_at = NOW(), return_notes = ?
        WHERE asset_id = ? AND returned_at IS NULL
        "#,
    )
    .bind(notes)
    .bind(asset_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/* =========================
Register asset
========================= */
#[utoipa::path(
    post,
    path = "/api/assets",
    request_body = CreateAsset,
    responses(
        (status = 201, description = "Asset registered", body = Asset),
        (status = 400, description = "Invalid costing"),
        (status = 409, description = "Code already used in this business unit")
    ),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
#[instrument(name = "asset_create", skip_all, fields(code = %payload.code))]
pub async fn create_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<CreateAsset>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;

    let code = payload.code.trim();
    if code.is_empty() || payload.description.trim().is_empty() || payload.category.trim().is_empty() {
        return Err(AppError::validation("code, description and category are required"));
    }
    let salvage = payload.salvage_value.unwrap_or(Decimal::ZERO);
    asset::validate_costing(payload.purchase_price, salvage, payload.useful_life_months)?;

    let start = payload.depreciation_start_date.unwrap_or(payload.purchase_date);
    if start < payload.purchase_date {
        return Err(AppError::validation(
            "depreciation_start_date cannot precede purchase_date",
        ));
    }

    let qr_token = uuid::Uuid::new_v4().to_string();
    let mut conn = pool.acquire().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO assets
            (business_unit_id, code, description, category, serial_number, purchase_date,
             purchase_price, salvage_value, depreciation_method, useful_life_months,
             depreciation_start_date, accumulated_depreciation, current_book_value, status, qr_token)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(auth.business_unit_id)
    .bind(code)
    .bind(payload.description.trim())
    .bind(payload.category.trim())
    .bind(payload.serial_number.as_deref())
    .bind(payload.purchase_date)
    .bind(payload.purchase_price)
    .bind(salvage)
    .bind(payload.depreciation_method.as_ref())
    .bind(payload.useful_life_months)
    .bind(start)
    .bind(payload.purchase_price)
    .bind(AssetStatus::Available.as_ref())
    .bind(&qr_token)
    .execute(&mut *conn)
    .await
    .map_err(|e| match AppError::from(e) {
        AppError::Conflict(_) => AppError::conflict(format!("Asset code {code} already exists")),
        other => other,
    })?;

    let created = fetch_asset(&mut conn, result.last_insert_id(), auth.business_unit_id, false).await?;
    tracing::info!(asset_id = created.id, "Asset registered");
    Ok(HttpResponse::Created().json(created))
}

#[utoipa::path(
    get,
    path = "/api/assets",
    params(AssetFilter),
    responses((status = 200, body = AssetListResponse)),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn asset_list(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<AssetFilter>,
) -> AppResult<impl Responder> {
    let page = Page::new(query.page, query.per_page);

    let mut filters = Filters::new();
    filters
        .push("business_unit_id = ?", [SqlValue::U64(auth.business_unit_id)])
        .push_opt(
            "status = ?",
            query.status.map(|s| SqlValue::String(s.as_ref().to_string())),
        )
        .push_opt("category = ?", query.category.clone().map(SqlValue::String))
        .search(&["code", "description", "serial_number"], query.search.as_deref());
    let where_sql = filters.where_sql();

    let count_sql = format!("SELECT COUNT(*) FROM assets{where_sql}");
    let total = bind_values!(
        sqlx::query_scalar::<_, i64>(&count_sql),
        filters.values()
    )
    .fetch_one(pool.get_ref())
    .await?;

    let data_sql =
        format!("SELECT {ASSET_COLUMNS} FROM assets{where_sql} ORDER BY code LIMIT ? OFFSET ?");
    let data = bind_values!(sqlx::query_as::<_, Asset>(&data_sql), filters.values())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(AssetListResponse {
        data,
        page: page.page,
        per_page: page.per_page,
        total,
    }))
}

#[utoipa::path(
    get,
    path = "/api/assets/{asset_id}",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, body = Asset), (status = 404, description = "Asset not found")),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn get_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let found = fetch_asset(&mut conn, path.into_inner(), auth.business_unit_id, false).await?;
    Ok(HttpResponse::Ok().json(found))
}

/// Descriptive fields only; costing and status have their own operations.
#[utoipa::path(
    put,
    path = "/api/assets/{asset_id}",
    params(("asset_id" = u64, Path, description = "Asset id")),
    request_body = UpdateAsset,
    responses((status = 200, body = Asset), (status = 400, description = "Field cannot be updated")),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn update_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<Map<String, Value>>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;
    let asset_id = path.into_inner();

    check_update(&payload)?;
    let update = build_update_sql(
        "assets",
        &payload,
        UPDATABLE_COLUMNS,
        asset_id,
        &[("business_unit_id", SqlValue::U64(auth.business_unit_id))],
    )?;

    let mut conn = pool.acquire().await?;
    execute_update(&mut *conn, update).await?;

    let updated = fetch_asset(&mut conn, asset_id, auth.business_unit_id, false).await?;
    Ok(HttpResponse::Ok().json(updated))
}

/* =========================
Deploy / return
========================= */
#[utoipa::path(
    put,
    path = "/api/assets/{asset_id}/deploy",
    params(("asset_id" = u64, Path, description = "Asset id")),
    request_body = DeployBody,
    responses(
        (status = 200, description = "Asset deployed", body = AssetDeployment),
        (status = 409, description = "Asset not available")
    ),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
#[instrument(name = "asset_deploy", skip_all, fields(asset_id = *path, user_id = payload.user_id))]
pub async fn deploy_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: web::Json<DeployBody>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;
    let asset_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let found = fetch_asset(&mut tx, asset_id, auth.business_unit_id, true).await?;
    let next = asset::check_deploy(found.status)?;

    let holder_ok = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM users WHERE id = ? AND business_unit_id = ? AND is_active = TRUE",
    )
    .bind(payload.user_id)
    .bind(auth.business_unit_id)
    .fetch_one(&mut *tx)
    .await?;
    if holder_ok == 0 {
        return Err(AppError::validation("Assets can only be deployed to active users of your business unit"));
    }

    set_status(&mut tx, asset_id, found.status, next).await?;
    let result = sqlx::query(
        "INSERT INTO asset_deployments (asset_id, user_id, deployed_by, notes) VALUES (?, ?, ?, ?)",
    )
    .bind(asset_id)
    .bind(payload.user_id)
    .bind(auth.user_id)
    .bind(payload.notes.as_deref())
    .execute(&mut *tx)
    .await?;

    let deployment = sqlx::query_as::<_, AssetDeployment>(
        "SELECT id, asset_id, user_id, deployed_by, deployed_at, notes, returned_at, return_notes FROM asset_deployments WHERE id = ?",
    )
    .bind(result.last_insert_id())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!("Asset deployed");
    Ok(HttpResponse::Ok().json(deployment))
}

#[utoipa::path(
    put,
    path = "/api/assets/{asset_id}/return",
    params(("asset_id" = u64, Path, description = "Asset id")),
    request_body(content = ReturnBody, content_type = "application/json"),
    responses(
        (status = 200, description = "Asset returned", body = Asset),
        (status = 409, description = "Asset is not deployed")
    ),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
#[instrument(name = "asset_return", skip_all, fields(asset_id = *path))]
pub async fn return_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    payload: Option<web::Json<ReturnBody>>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;
    let asset_id = path.into_inner();
    let notes = payload.and_then(|p| p.into_inner().notes);

    let mut tx = pool.begin().await?;
    let found = fetch_asset(&mut tx, asset_id, auth.business_unit_id, true).await?;
    let next = asset::check_return(found.status)?;

    set_status(&mut tx, asset_id, found.status, next).await?;
    close_deployment(&mut tx, asset_id, notes.as_deref()).await?;

    let updated = fetch_asset(&mut tx, asset_id, auth.business_unit_id, false).await?;
    tx.commit().await?;

    tracing::info!("Asset returned");
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    get,
    path = "/api/assets/{asset_id}/deployments",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, body = [AssetDeployment])),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn deployment_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let asset_id = path.into_inner();
    let mut conn = pool.acquire().await?;
    fetch_asset(&mut conn, asset_id, auth.business_unit_id, false).await?;

    let history = sqlx::query_as::<_, AssetDeployment>(
        r#"
        SELECT id, asset_id, user_id, deployed_by, deployed_at, notes, returned_at, return_notes
        FROM asset_deployments
        WHERE asset_id = ?
        ORDER BY deployed_at DESC, id DESC
        "#,
    )
    .bind(asset_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(HttpResponse::Ok().json(history))
}

/* =========================
QR
========================= */
#[utoipa::path(
    get,
    path = "/api/assets/{asset_id}/qr",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, description = "Payload to encode in the asset's QR code", body = QrCode)),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn asset_qr(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let found = fetch_asset(&mut conn, path.into_inner(), auth.business_unit_id, false).await?;

    Ok(HttpResponse::Ok().json(QrCode {
        asset_id: found.id,
        payload: asset::qr_payload(&config.public_base_url, &config.api_prefix, &found.qr_token),
    }))
}

#[utoipa::path(
    get,
    path = "/api/assets/qr/{token}",
    params(("token" = String, Path, description = "QR token printed on the asset")),
    responses((status = 200, body = QrLookup), (status = 404, description = "Unknown QR token")),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn qr_lookup(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<String>,
) -> AppResult<impl Responder> {
    let token = path.into_inner();

    let sql = format!("SELECT {ASSET_COLUMNS} FROM assets WHERE qr_token = ? AND business_unit_id = ?");
    let found = sqlx::query_as::<_, Asset>(&sql)
        .bind(&token)
        .bind(auth.business_unit_id)
        .fetch_optional(pool.get_ref())
        .await?
        .ok_or_else(|| AppError::not_found("Unknown QR code"))?;

    let holder = sqlx::query_as::<_, Holder>(
        r#"
        SELECT u.id AS user_id, u.username, u.full_name, d.deployed_at
        FROM asset_deployments d
        JOIN users u ON u.id = d.user_id
        WHERE d.asset_id = ? AND d.returned_at IS NULL
        ORDER BY d.deployed_at DESC
        LIMIT 1
        "#,
    )
    .bind(found.id)
    .fetch_optional(pool.get_ref())
    .await?;

    Ok(HttpResponse::Ok().json(QrLookup { asset: found, holder }))
}

/* =========================
Retirement & disposal
========================= */
#[utoipa::path(
    post,
    path = "/api/assets/retire",
    request_body = RetireBody,
    responses(
        (status = 200, description = "All assets retired", body = RetireSummary),
        (status = 409, description = "An asset is already retired or disposed; nothing was changed")
    ),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
#[instrument(name = "asset_retire", skip_all, fields(count = payload.asset_ids.len()))]
pub async fn retire_assets(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: web::Json<RetireBody>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;

    let ids: BTreeSet<u64> = payload.asset_ids.iter().copied().collect();
    if ids.is_empty() {
        return Err(AppError::validation("asset_ids must not be empty"));
    }
    let reason = payload.reason.trim();
    if reason.is_empty() {
        return Err(AppError::validation("reason is required"));
    }
    asset::validate_disposal_date(payload.disposal_date, Local::now().date_naive())?;

    let mut tx = pool.begin().await?;
    let mut summary = RetireSummary {
        retired: Vec::with_capacity(ids.len()),
        auto_returned: Vec::new(),
    };

    // Ascending id order keeps lock acquisition consistent between batches.
    for asset_id in ids {
        let found = fetch_asset(&mut tx, asset_id, auth.business_unit_id, true).await?;
        let retirement = asset::check_retire(&found.code, found.status)?;

        if retirement.auto_return {
            close_deployment(&mut tx, asset_id, Some("Auto-returned on retirement")).await?;
            summary.auto_returned.push(asset_id);
        }

        let result = sqlx::query(
            r#"
            UPDATE assets
            SET status = ?, retired_at = NOW(), retirement_reason = ?, disposal_date = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(AssetStatus::Retired.as_ref())
        .bind(reason)
        .bind(payload.disposal_date)
        .bind(asset_id)
        .bind(found.status.as_ref())
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::conflict(format!(
                "Asset {} was changed by someone else",
                found.code
            )));
        }
        summary.retired.push(asset_id);
    }

    tx.commit().await?;
    tracing::info!(
        retired = summary.retired.len(),
        auto_returned = summary.auto_returned.len(),
        "Assets retired"
    );
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    put,
    path = "/api/assets/{asset_id}/dispose",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, body = Asset), (status = 409, description = "Asset is not retired")),
    security(("bearer_auth" = [])),
    tag = "Assets"
)]
pub async fn dispose_asset(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    auth.require(Permission::ManageAssets)?;
    let asset_id = path.into_inner();

    let mut tx = pool.begin().await?;
    let found = fetch_asset(&mut tx, asset_id, auth.business_unit_id, true).await?;
    let next = asset::check_dispose(found.status)?;

    sqlx::query("UPDATE assets SET status = ?, disposed_at = NOW() WHERE id = ? AND status = ?")
        .bind(next.as_ref())
        .bind(asset_id)
        .bind(found.status.as_ref())
        .execute(&mut *tx)
        .await?;

    let updated = fetch_asset(&mut tx, asset_id, auth.business_unit_id, false).await?;
    tx.commit().await?;

    tracing::info!(asset_id, "Asset disposed");
    Ok(HttpResponse::Ok().json(updated))
}

/// Disposes every retired asset whose disposal date has arrived.
pub async fn dispose_due(pool: &MySqlPool, today: NaiveDate) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE assets
        SET status = ?, disposed_at = NOW()
        WHERE status = ? AND disposal_date IS NOT NULL AND disposal_date <= ?
        "#,
    )
    .bind(AssetStatus::Disposed.as_ref())
    .bind(AssetStatus::Retired.as_ref())
    .bind(today)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn required_columns_cannot_be_cleared() {
        assert!(check_update(&obj(json!({"description": "Dell XPS 13"}))).is_ok());
        assert!(check_update(&obj(json!({"serial_number": null}))).is_ok());
        assert!(check_update(&obj(json!({"description": null}))).is_err());
        assert!(check_update(&obj(json!({"description": ""}))).is_err());
        assert!(check_update(&obj(json!({"category": "   "}))).is_err());
        assert!(check_update(&obj(json!({"category": 7}))).is_err());
    }
}
