//! Probabilistic "has this username ever been issued" set.
//!
//! A miss is definitive and lets provisioning skip the database. A hit may
//! be a false positive and has to be confirmed.

use anyhow::Context;
use autoscale_cuckoo_filter::CuckooFilter;
use futures::TryStreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const INITIAL_CAPACITY: usize = 50_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(INITIAL_CAPACITY, FALSE_POSITIVE_RATE)));

fn read() -> RwLockReadGuard<'static, CuckooFilter<String>> {
    FILTER.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write() -> RwLockWriteGuard<'static, CuckooFilter<String>> {
    FILTER.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

pub fn might_exist(username: &str) -> bool {
    read().contains(&normalize(username))
}

pub fn insert(username: &str) {
    let username = normalize(username);
    let mut filter = write();
    if !filter.contains(&username) {
        filter.add(&username);
    }
}

/// Loads every username, `batch_size` per write lock.
pub async fn warmup_username_filter(pool: &MySqlPool, batch_size: usize) -> anyhow::Result<usize> {
    let mut rows = sqlx::query_scalar::<_, String>("SELECT username FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0;
    while let Some(username) = rows.try_next().await.context("username filter warmup")? {
        batch.push(normalize(&username));
        if batch.len() == batch_size {
            total += flush(&mut batch);
        }
    }
    total += flush(&mut batch);

    log::info!("Username filter warmed with {total} usernames");
    Ok(total)
}

fn flush(batch: &mut Vec<String>) -> usize {
    let count = batch.len();
    if count > 0 {
        let mut filter = write();
        for username in batch.drain(..) {
            filter.add(&username);
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_names_are_found_case_insensitively() {
        insert("  Filter.Test.User ");
        assert!(might_exist("filter.test.user"));
        assert!(might_exist("FILTER.TEST.USER"));
    }

    #[test]
    fn flush_drains_batch() {
        let mut batch = vec!["flush.a".to_string(), "flush.b".to_string()];
        assert_eq!(flush(&mut batch), 2);
        assert!(batch.is_empty());
        assert!(might_exist("flush.b"));
    }
}
