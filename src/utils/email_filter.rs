use anyhow::{Result, anyhow};
use autoscale_cuckoo_filter::CuckooFilter;
use futures::StreamExt;
use once_cell::sync::Lazy;
use sqlx::MySqlPool;
use std::sync::{PoisonError, RwLock};

/// Expected capacity and false-positive rate.
const FILTER_CAPACITY: usize = 100_000;
const FALSE_POSITIVE_RATE: f64 = 0.001;

static EMAIL_FILTER: Lazy<RwLock<CuckooFilter<String>>> =
    Lazy::new(|| RwLock::new(CuckooFilter::new(FILTER_CAPACITY, FALSE_POSITIVE_RATE)));

#[inline]
pub fn normalize(email: &str) -> String {
    email.trim().to_lowercase()
}

/// false => the email is definitely not registered (no false negatives)
pub fn might_exist(email: &str) -> bool {
    let email = normalize(email);
    EMAIL_FILTER
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(&email)
}

pub fn insert(email: &str) {
    let email = normalize(email);
    let mut filter = EMAIL_FILTER.write().unwrap_or_else(PoisonError::into_inner);
    if !filter.contains(&email) {
        filter.add(&email);
    }
}

pub fn remove(email: &str) {
    let email = normalize(email);
    EMAIL_FILTER
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&email);
}

/// Loads every registered email, streaming in batches.
pub async fn warmup_email_filter(pool: &MySqlPool, batch_size: usize) -> Result<()> {
    let mut stream = sqlx::query_as::<_, (String,)>("SELECT email FROM users").fetch(pool);

    let mut batch = Vec::with_capacity(batch_size);
    let mut total = 0usize;

    while let Some(row) = stream.next().await {
        let (email,) = row.map_err(|e| anyhow!("DB row fetch failed: {}", e))?;

        batch.push(normalize(&email));
        total += 1;

        if batch.len() == batch_size {
            insert_batch(&batch);
            batch.clear();
        }
    }

    if !batch.is_empty() {
        insert_batch(&batch);
    }

    tracing::info!(total, "Email filter warmup complete");
    Ok(())
}

fn insert_batch(emails: &[String]) {
    let mut filter = EMAIL_FILTER.write().unwrap_or_else(PoisonError::into_inner);

    for email in emails {
        if !filter.contains(email) {
            filter.add(email);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_email_is_found_case_insensitively() {
        insert("Filter.Case@Example.com");
        assert!(might_exist("filter.case@example.com"));
        assert!(might_exist("  FILTER.CASE@EXAMPLE.COM "));
    }

    #[test]
    fn removed_email_is_gone() {
        insert("filter.removed@example.com");
        remove("filter.removed@example.com");
        assert!(!might_exist("filter.removed@example.com"));
    }
}
