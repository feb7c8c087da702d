//! Persistence side of the manager → HR chain, shared by leave and overtime.

use serde::Deserialize;
use sqlx::{FromRow, MySqlConnection};
use utoipa::ToSchema;

use crate::auth::auth::AuthUser;
use crate::domain::approval::{ApprovalStatus, RequestContext, Stage, Transition};
use crate::error::{AppError, AppResult};
use crate::model::permission::Permission;
use crate::utils::db_utils::{Filters, SqlValue};

#[derive(Debug, Copy, Clone)]
pub enum ApprovalTable {
    Leave,
    Overtime,
}

impl ApprovalTable {
    pub fn table(self) -> &'static str {
        match self {
            ApprovalTable::Leave => "leave_requests",
            ApprovalTable::Overtime => "overtime_requests",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ApprovalTable::Leave => "Leave request",
            ApprovalTable::Overtime => "Overtime request",
        }
    }
}

#[derive(Deserialize, ToSchema, Default)]
pub struct DecisionBody {
    #[schema(example = "Covered by Maria")]
    pub comments: Option<String>,
}

#[derive(FromRow)]
struct ContextRow {
    id: u64,
    business_unit_id: u64,
    user_id: u64,
    manager_id: Option<u64>,
    #[sqlx(try_from = "String")]
    status: ApprovalStatus,
}

/// Loads and row-locks the request with its owner's current manager.
pub async fn load_context(
    conn: &mut MySqlConnection,
    kind: ApprovalTable,
    id: u64,
    business_unit_id: u64,
) -> AppResult<RequestContext> {
    let sql = format!(
        r#"
        SELECT r.id, r.business_unit_id, r.user_id, u.manager_id, r.status
        FROM {} r
        JOIN users u ON u.id = r.user_id
        WHERE r.id = ? AND r.business_unit_id = ?
        FOR UPDATE
        "#,
        kind.table()
    );

    let row = sqlx::query_as::<_, ContextRow>(&sql)
        .bind(id)
        .bind(business_unit_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found(format!("{} not found", kind.label())))?;

    Ok(RequestContext {
        id: row.id,
        business_unit_id: row.business_unit_id,
        owner_id: row.user_id,
        owner_manager_id: row.manager_id,
        status: row.status,
    })
}

/// Direct manager of `user_id`, used for read visibility.
pub async fn owner_manager_id(
    conn: &mut MySqlConnection,
    user_id: u64,
) -> AppResult<Option<u64>> {
    let manager = sqlx::query_scalar::<_, Option<u64>>("SELECT manager_id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(manager.flatten())
}

/// Writes the outcome of a decision, guarded by the status it was made on.
pub async fn record_transition(
    conn: &mut MySqlConnection,
    kind: ApprovalTable,
    ctx: &RequestContext,
    transition: Transition,
    actor: &AuthUser,
    comments: Option<&str>,
) -> AppResult<()> {
    let prefix = match transition.stage {
        Stage::Manager => "manager",
        Stage::Hr => "hr",
    };
    let sql = format!(
        r#"
        UPDATE {table}
        SET status = ?, {prefix}_action_by = ?, {prefix}_action_at = NOW(), {prefix}_comments = ?
        WHERE id = ? AND status = ?
        "#,
        table = kind.table()
    );

    let result = sqlx::query(&sql)
        .bind(transition.to.as_ref())
        .bind(actor.user_id)
        .bind(comments.map(str::trim).filter(|c| !c.is_empty()))
        .bind(ctx.id)
        .bind(transition.from.as_ref())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict(format!(
            "{} was changed by someone else, reload and try again",
            kind.label()
        )));
    }

    tracing::info!(
        request = kind.table(),
        id = ctx.id,
        actor = actor.user_id,
        from = transition.from.as_ref(),
        to = transition.to.as_ref(),
        "Approval transition recorded"
    );
    Ok(())
}

/// Row visibility for list endpoints, mirroring `approval::can_view`.
/// Expects the request table aliased `r` joined to its owner as `u`.
pub fn visibility_filters(actor: &AuthUser) -> Filters {
    let mut filters = Filters::new();
    filters.push("r.business_unit_id = ?", [SqlValue::U64(actor.business_unit_id)]);

    if !actor.can(Permission::ViewAllRequests) {
        filters.push(
            "(r.user_id = ? OR u.manager_id = ?)",
            [SqlValue::U64(actor.user_id), SqlValue::U64(actor.user_id)],
        );
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::role::Role;

    fn actor(role: Role) -> AuthUser {
        AuthUser {
            user_id: 8,
            username: "x".into(),
            role,
            business_unit_id: 2,
        }
    }

    #[test]
    fn employees_and_managers_see_own_and_reports() {
        for role in [Role::Employee, Role::Manager] {
            let f = visibility_filters(&actor(role));
            assert_eq!(
                f.where_sql(),
                " WHERE r.business_unit_id = ? AND (r.user_id = ? OR u.manager_id = ?)"
            );
        }
    }

    #[test]
    fn hr_sees_business_unit() {
        let f = visibility_filters(&actor(Role::Hr));
        assert_eq!(f.where_sql(), " WHERE r.business_unit_id = ?");
        assert_eq!(f.values(), &[SqlValue::U64(2)]);
    }
}
