//! Confirmed-taken usernames, so repeat checks skip the database.

use futures_util::TryStreamExt;
use moka::future::Cache;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::utils::username_filter::normalize;

static TAKEN: Lazy<Cache<String, ()>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(200_000)
        .time_to_live(Duration::from_secs(24 * 60 * 60))
        .build()
});

pub async fn mark_taken(username: &str) {
    TAKEN.insert(normalize(username), ()).await;
}

pub fn is_taken(username: &str) -> bool {
    TAKEN.contains_key(&normalize(username))
}

/// Preloads users active in the last `days` days; those are the names
/// most likely to be tried again.
pub async fn warmup_username_cache(pool: &MySqlPool, days: u32) -> anyhow::Result<usize> {
    let mut rows = sqlx::query_scalar::<_, String>(
        r#"
        SELECT username
        FROM users
        WHERE last_login_at >= NOW() - INTERVAL ? DAY
        "#,
    )
    .bind(days)
    .fetch(pool);

    let mut total = 0;
    while let Some(username) = rows.try_next().await? {
        mark_taken(&username).await;
        total += 1;
    }

    log::info!("Username cache warmed with {total} users active in the last {days} days");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn taken_names_are_remembered() {
        assert!(!is_taken("cache.test.user"));
        mark_taken("Cache.Test.User").await;
        assert!(is_taken("cache.test.user"));
    }
}
