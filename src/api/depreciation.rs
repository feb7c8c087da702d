use crate::api::asset::{ASSET_COLUMNS, fetch_asset};
use crate::auth::auth::AuthUser;
use crate::domain::asset::AssetStatus;
use crate::domain::calendar::{check_depreciation_window, last_day_of_month};
use crate::domain::depreciation::{self, SkipReason};
use crate::domain::ledger::{self, AccountType};
use crate::error::{AppError, AppResult};
use crate::model::asset::{Asset, DepreciationEntry};
use crate::model::permission::Permission;
use crate::utils::db_utils::{Filters, SqlValue, bind_values};
use actix_web::{HttpResponse, Responder, web};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlConnection, MySqlPool};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(Deserialize, ToSchema, Default)]
pub struct RunDepreciation {
    /// Restrict the run to these assets; all in-service assets otherwise
    pub asset_ids: Option<Vec<u64>>,
    /// Run outside the month-end window (admins only)
    #[serde(rename = "override", default)]
    pub override_calendar: bool,
    pub expense_account_id: Option<u64>,
    pub accumulated_account_id: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct PostedLine {
    pub asset_id: u64,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub book_value_after: Decimal,
}

#[derive(Serialize, ToSchema)]
pub struct SkippedAsset {
    pub asset_id: u64,
    pub reason: SkipReason,
}

#[derive(Serialize, ToSchema)]
pub struct RunSummary {
    #[schema(value_type = String, format = "date")]
    pub period: NaiveDate,
    pub processed: Vec<PostedLine>,
    pub skipped: Vec<SkippedAsset>,
    #[schema(value_type = String)]
    pub total_amount: Decimal,
}

async fn check_account(
    conn: &mut MySqlConnection,
    business_unit_id: u64,
    account_id: Option<u64>,
    role: &str,
    expected: AccountType,
) -> AppResult<()> {
    let Some(account_id) = account_id else {
        return Ok(());
    };

    let (account_type, is_active) = sqlx::query_as::<_, (String, bool)>(
        "SELECT account_type, is_active FROM gl_accounts WHERE id = ? AND business_unit_id = ?",
    )
    .bind(account_id)
    .bind(business_unit_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::validation(format!("The {role} account does not exist")))?;

    let account_type: AccountType = account_type
        .parse()
        .map_err(|_| AppError::Internal(format!("Unknown account type {account_type}")))?;
    ledger::check_depreciation_account(role, account_type, is_active, expected)
}

/// Month-end depreciation run for the caller's business unit.
#[utoipa::path(
    post,
    path = "/api/depreciation/run",
    request_body(content = RunDepreciation, content_type = "application/json"),
    responses(
        (status = 200, description = "Entries posted for the current month", body = RunSummary),
        (status = 400, description = "Outside the month-end window or invalid GL account"),
        (status = 403, description = "Missing permission, or override requested by a non-admin")
    ),
    security(("bearer_auth" = [])),
    tag = "Depreciation"
)]
#[instrument(name = "depreciation_run", skip_all, fields(actor = auth.user_id, business_unit_id = auth.business_unit_id))]
pub async fn run_depreciation(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    payload: Option<web::Json<RunDepreciation>>,
) -> AppResult<impl Responder> {
    auth.require(Permission::RunDepreciation)?;
    let payload = payload.map(|p| p.into_inner()).unwrap_or_default();

    let today = Local::now().date_naive();
    check_depreciation_window(&auth, today, payload.override_calendar)?;
    let period = last_day_of_month(today);

    let mut tx = pool.begin().await?;
    check_account(
        &mut tx,
        auth.business_unit_id,
        payload.expense_account_id,
        "expense",
        AccountType::Expense,
    )
    .await?;
    check_account(
        &mut tx,
        auth.business_unit_id,
        payload.accumulated_account_id,
        "accumulated depreciation",
        AccountType::Asset,
    )
    .await?;

    let mut filters = Filters::new();
    filters
        .push("business_unit_id = ?", [SqlValue::U64(auth.business_unit_id)])
        .push(
            "status IN (?, ?)",
            [
                SqlValue::String(AssetStatus::Available.as_ref().to_string()),
                SqlValue::String(AssetStatus::Deployed.as_ref().to_string()),
            ],
        );
    if let Some(ids) = payload.asset_ids.as_ref().filter(|ids| !ids.is_empty()) {
        let placeholders = vec!["?"; ids.len()].join(", ");
        filters.push(
            &format!("id IN ({placeholders})"),
            ids.iter().map(|id| SqlValue::U64(*id)),
        );
    }

    let sql = format!(
        "SELECT {ASSET_COLUMNS} FROM assets{} ORDER BY id FOR UPDATE",
        filters.where_sql()
    );
    let assets = bind_values!(sqlx::query_as::<_, Asset>(&sql), filters.values())
        .fetch_all(&mut *tx)
        .await?;

    if let Some(ids) = payload.asset_ids.as_ref() {
        if let Some(missing) = ids.iter().find(|id| !assets.iter().any(|a| a.id == **id)) {
            return Err(AppError::validation(format!(
                "Asset {missing} does not exist or is no longer in service"
            )));
        }
    }

    let mut summary = RunSummary {
        period,
        processed: Vec::new(),
        skipped: Vec::new(),
        total_amount: Decimal::ZERO,
    };

    for found in &assets {
        let amount = match depreciation::amount_for_period(&found.depreciation_basis(), period) {
            Ok(amount) => amount,
            Err(reason) => {
                summary.skipped.push(SkippedAsset {
                    asset_id: found.id,
                    reason,
                });
                continue;
            }
        };
        let book_value_after = found.current_book_value - amount;

        sqlx::query(
            r#"
            INSERT INTO depreciation_entries
                (asset_id, period, amount, book_value_after, expense_account_id,
                 accumulated_account_id, posted_by)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(found.id)
        .bind(period)
        .bind(amount)
        .bind(book_value_after)
        .bind(payload.expense_account_id)
        .bind(payload.accumulated_account_id)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE assets
            SET accumulated_depreciation = accumulated_depreciation + ?,
                current_book_value = ?,
                last_depreciation_date = ?
            WHERE id = ?
            "#,
        )
        .bind(amount)
        .bind(book_value_after)
        .bind(period)
        .bind(found.id)
        .execute(&mut *tx)
        .await?;

        summary.total_amount += amount;
        summary.processed.push(PostedLine {
            asset_id: found.id,
            amount,
            book_value_after,
        });
    }

    tx.commit().await?;

    tracing::info!(
        %period,
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        total = %summary.total_amount,
        "Depreciation run complete"
    );
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/assets/{asset_id}/depreciation/schedule",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, description = "Projected monthly schedule from the current book value", body = [ScheduleLine])),
    security(("bearer_auth" = [])),
    tag = "Depreciation"
)]
pub async fn depreciation_schedule(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let mut conn = pool.acquire().await?;
    let found = fetch_asset(&mut conn, path.into_inner(), auth.business_unit_id, false).await?;

    let lines = if found.status.in_service() {
        depreciation::schedule(&found.depreciation_basis())
    } else {
        Vec::new()
    };
    Ok(HttpResponse::Ok().json(lines))
}

#[utoipa::path(
    get,
    path = "/api/assets/{asset_id}/depreciation",
    params(("asset_id" = u64, Path, description = "Asset id")),
    responses((status = 200, body = [DepreciationEntry])),
    security(("bearer_auth" = [])),
    tag = "Depreciation"
)]
pub async fn depreciation_history(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<impl Responder> {
    let asset_id = path.into_inner();
    let mut conn = pool.acquire().await?;
    fetch_asset(&mut conn, asset_id, auth.business_unit_id, false).await?;

    let entries = sqlx::query_as::<_, DepreciationEntry>(
        r#"
        SELECT id, asset_id, period, amount, book_value_after, expense_account_id,
               accumulated_account_id, posted_by, posted_at
        FROM depreciation_entries
        WHERE asset_id = ?
        ORDER BY period
        "#,
    )
    .bind(asset_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(HttpResponse::Ok().json(entries))
}
