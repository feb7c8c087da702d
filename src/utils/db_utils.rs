use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::AppError;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    U64(u64),
    I64(i64),
    Decimal(Decimal),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

/// Binds every [`SqlValue`] in order onto a `query`, `query_as` or
/// `query_scalar` builder.
macro_rules! bind_values {
    ($query:expr, $values:expr) => {{
        let mut q = $query;
        for value in $values {
            q = match value {
                $crate::utils::db_utils::SqlValue::String(v) => q.bind(v.clone()),
                $crate::utils::db_utils::SqlValue::U64(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::I64(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Decimal(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Bool(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Date(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::DateTime(v) => q.bind(*v),
                $crate::utils::db_utils::SqlValue::Null => q.bind(None::<String>),
            };
        }
        q
    }};
}
pub(crate) use bind_values;

/// ===============================
/// WHERE clause builder
/// ===============================
#[derive(Debug, Default)]
pub struct Filters {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// `clause` holds one `?` per value.
    pub fn push(&mut self, clause: &str, values: impl IntoIterator<Item = SqlValue>) -> &mut Self {
        self.clauses.push(clause.to_string());
        self.values.extend(values);
        self
    }

    pub fn push_opt(&mut self, clause: &str, value: Option<SqlValue>) -> &mut Self {
        if let Some(v) = value {
            self.push(clause, [v]);
        }
        self
    }

    /// `LIKE` search over several columns.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        let like = format!("%{term}%");
        let clause = columns
            .iter()
            .map(|c| format!("{c} LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.push(
            &format!("({clause})"),
            columns.iter().map(|_| SqlValue::String(like.clone())),
        )
    }

    pub fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build a partial UPDATE
/// ===============================
/// Only `allowed` columns may appear in `payload`; `scope` adds extra
/// `column = value` guards (tenant, status) after the id.
pub fn build_update_sql(
    table: &str,
    payload: &Map<String, Value>,
    allowed: &[&str],
    id: u64,
    scope: &[(&str, SqlValue)],
) -> Result<SqlUpdate, AppError> {
    if payload.is_empty() {
        return Err(AppError::validation("No fields provided for update"));
    }

    let mut assignments = Vec::with_capacity(payload.len());
    let mut values = Vec::with_capacity(payload.len() + 1 + scope.len());

    for (column, value) in payload {
        if !allowed.contains(&column.as_str()) {
            return Err(AppError::validation(format!("Field '{column}' cannot be updated")));
        }
        assignments.push(format!("{column} = ?"));
        values.push(json_to_sql(column, value)?);
    }

    let mut sql = format!("UPDATE {table} SET {} WHERE id = ?", assignments.join(", "));
    values.push(SqlValue::U64(id));

    for (column, value) in scope {
        sql.push_str(&format!(" AND {column} = ?"));
        values.push(value.clone());
    }

    Ok(SqlUpdate { sql, values })
}

fn json_to_sql(column: &str, value: &Value) -> Result<SqlValue, AppError> {
    Ok(match value {
        Value::String(s) => {
            if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                SqlValue::Date(d)
            } else if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                SqlValue::DateTime(dt)
            } else {
                SqlValue::String(s.clone())
            }
        }
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                SqlValue::U64(u)
            } else if let Some(i) = n.as_i64() {
                SqlValue::I64(i)
            } else {
                let parsed = n
                    .to_string()
                    .parse::<Decimal>()
                    .map_err(|_| AppError::validation(format!("Field '{column}' is not a valid number")))?;
                SqlValue::Decimal(parsed)
            }
        }
        Value::Bool(b) => SqlValue::Bool(*b),
        Value::Null => SqlValue::Null,
        _ => {
            return Err(AppError::validation(format!(
                "Field '{column}' has an unsupported JSON value type"
            )));
        }
    })
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::MySql>,
{
    let query = bind_values!(sqlx::query(&update.sql), &update.values);
    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}

/// ===============================
/// Pagination
/// ===============================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Page {
    pub page: u32,
    pub per_page: u32,
}

impl Page {
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.unwrap_or(10).clamp(1, 100),
        }
    }

    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn update_sql_with_scope() {
        let payload = obj(json!({"name": "Cash on hand"}));
        let update = build_update_sql(
            "gl_accounts",
            &payload,
            &["name", "description"],
            9,
            &[("business_unit_id", SqlValue::U64(2))],
        )
        .unwrap();

        assert_eq!(
            update.sql,
            "UPDATE gl_accounts SET name = ? WHERE id = ? AND business_unit_id = ?"
        );
        assert_eq!(
            update.values,
            vec![
                SqlValue::String("Cash on hand".into()),
                SqlValue::U64(9),
                SqlValue::U64(2)
            ]
        );
    }

    #[test]
    fn update_rejects_unknown_columns() {
        let payload = obj(json!({"status": "DISPOSED"}));
        let err = build_update_sql("assets", &payload, &["description"], 1, &[]).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn update_rejects_empty_payload() {
        assert!(build_update_sql("assets", &Map::new(), &["description"], 1, &[]).is_err());
    }

    #[test]
    fn json_values_are_typed() {
        assert_eq!(json_to_sql("d", &json!("2026-01-31")).unwrap(), SqlValue::Date(NaiveDate::from_ymd_opt(2026, 1, 31).unwrap()));
        assert_eq!(json_to_sql("n", &json!(5)).unwrap(), SqlValue::U64(5));
        assert_eq!(json_to_sql("n", &json!(-5)).unwrap(), SqlValue::I64(-5));
        assert_eq!(json_to_sql("p", &json!(12.5)).unwrap(), SqlValue::Decimal(Decimal::new(125, 1)));
        assert!(json_to_sql("x", &json!([1])).is_err());
    }

    #[test]
    fn filters_compose_where_clause() {
        let mut f = Filters::new();
        f.push("business_unit_id = ?", [SqlValue::U64(1)])
            .push_opt("status = ?", Some(SqlValue::String("AVAILABLE".into())))
            .push_opt("category = ?", None)
            .search(&["code", "description"], Some("laptop"));

        assert_eq!(
            f.where_sql(),
            " WHERE business_unit_id = ? AND status = ? AND (code LIKE ? OR description LIKE ?)"
        );
        assert_eq!(f.values().len(), 4);
    }

    #[test]
    fn blank_search_is_ignored() {
        let mut f = Filters::new();
        f.search(&["code"], Some("   "));
        assert_eq!(f.where_sql(), "");
    }

    #[test]
    fn page_bounds() {
        let p = Page::new(Some(0), Some(1000));
        assert_eq!((p.page, p.per_page), (1, 100));
        let p = Page::new(Some(3), Some(20));
        assert_eq!(p.offset(), 40);
        assert_eq!(Page::new(None, None).limit(), 10);
    }
}
