use anyhow::{Context, Result, anyhow};
use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub run_migrations: bool,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,
    /// Prefix of the URL encoded into asset QR codes
    pub public_base_url: String,
    /// Seconds between scheduled-disposal sweeps, 0 disables the sweeper
    pub disposal_sweep_secs: u64,

    /// Credentials of the first admin, created only while the users table is empty
    pub bootstrap_admin: Option<(String, String)>,

    pub log_dir: String,
    pub log_level: tracing::Level,
}

fn required(key: &str) -> Result<String> {
    env::var(key).map_err(|_| anyhow!("{key} must be set"))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} has invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parsed_or("RUN_MIGRATIONS", true)?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed_or("ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parsed_or("REFRESH_TOKEN_TTL", 604_800)?, // 7 days

            rate_login_per_min: parsed_or("RATE_LOGIN_PER_MIN", 60)?,
            rate_refresh_per_min: parsed_or("RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string())
                .trim_end_matches('/')
                .to_string(),
            disposal_sweep_secs: parsed_or("DISPOSAL_SWEEP_SECS", 3600)?,

            bootstrap_admin: env::var("BOOTSTRAP_ADMIN_USERNAME")
                .ok()
                .zip(env::var("BOOTSTRAP_ADMIN_PASSWORD").ok()),

            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: log_level
                .parse()
                .with_context(|| format!("LOG_LEVEL has invalid value {log_level:?}"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_or_falls_back_when_unset() {
        let v: u32 = parsed_or("BIZADMIN_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn parsed_or_rejects_garbage() {
        // SAFETY: the variable name is unique to this test
        unsafe { env::set_var("BIZADMIN_TEST_GARBAGE_TTL", "fifteen") };
        let err = parsed_or::<usize>("BIZADMIN_TEST_GARBAGE_TTL", 900).unwrap_err();
        assert!(err.to_string().contains("BIZADMIN_TEST_GARBAGE_TTL"));
    }

    #[test]
    fn required_names_missing_key() {
        let err = required("BIZADMIN_TEST_MISSING_SECRET").unwrap_err();
        assert_eq!(err.to_string(), "BIZADMIN_TEST_MISSING_SECRET must be set");
    }
}
