use chrono::NaiveDate;
use sqlx::{Executor, MySql};

/// SQL bindable value
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Json(serde_json::Value),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Collects `column = ?` assignments for a single-row UPDATE.
///
/// Column names are never taken from user input: callers pass `&'static str`
/// literals, so the generated SQL only varies in which known columns appear.
#[derive(Debug)]
pub struct UpdateBuilder {
    table: &'static str,
    sets: Vec<(&'static str, SqlValue)>,
}

impl UpdateBuilder {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            sets: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) -> &mut Self {
        self.sets.push((column, value.into()));
        self
    }

    pub fn set_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set(column, v);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.sets.iter().map(|(c, _)| *c).collect()
    }

    pub fn build(self, id_column: &'static str, id_value: u64) -> SqlUpdate {
        let set_clause = self
            .sets
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table, set_clause, id_column
        );

        let mut values: Vec<SqlValue> = self.sets.into_iter().map(|(_, v)| v).collect();
        values.push(SqlValue::U64(id_value));

        SqlUpdate { sql, values }
    }
}

pub async fn execute_update<'e, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::U64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Json(v) => query.bind(sqlx::types::Json(v)),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(executor).await?;
    Ok(result.rows_affected())
}
