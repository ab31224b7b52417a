pub mod health;
pub mod notification;
pub mod project;
pub mod user;

use sqlx::MySqlConnection;

use crate::error::{AppError, AppResult};

/// Path ids arrive signed so that `0` and negatives get a readable 400.
pub fn positive_id(raw: i64, field: &str) -> AppResult<u64> {
    u64::try_from(raw)
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::validation(format!("{field} must be a positive integer")))
}

/// `?, ?, ?` for an `IN (...)` list of `n` values.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `%term%` for a case-insensitive `LIKE`, with the term's own wildcards
/// escaped by MySQL's default `\` escape character.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// True when every id in `ids` names a row of `table`. Duplicates are ignored.
pub async fn all_ids_exist(
    conn: &mut MySqlConnection,
    table: &'static str,
    ids: &[u64],
) -> Result<bool, sqlx::Error> {
    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    if unique.is_empty() {
        return Ok(true);
    }

    let sql = format!(
        "SELECT COUNT(*) FROM {table} WHERE id IN ({})",
        placeholders(unique.len())
    );
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for id in &unique {
        query = query.bind(id);
    }
    let found = query.fetch_one(conn).await?;

    Ok(found == unique.len() as i64)
}
