//! Background jobs started with the server.

use chrono::Local;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::api::asset::dispose_due;

/// Disposes retired assets once their scheduled disposal date arrives.
/// Runs immediately, then every `period`.
pub async fn disposal_sweeper(pool: MySqlPool, period: Duration) {
    let mut ticker = actix_web::rt::time::interval(period);
    loop {
        ticker.tick().await;

        let today = Local::now().date_naive();
        match dispose_due(&pool, today).await {
            Ok(0) => tracing::debug!(%today, "Disposal sweep: nothing due"),
            Ok(count) => tracing::info!(%today, count, "Disposal sweep disposed assets"),
            Err(e) => tracing::error!(error = %e, "Disposal sweep failed"),
        }
    }
}
