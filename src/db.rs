use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tracing::info;

use crate::auth::password::hash_password;
use crate::config::Config;
use crate::jobs;

pub async fn init_db(config: &Config) -> Result<MySqlPool, sqlx::Error> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    Ok(pool)
}

/// Creates the bootstrap admin account unless its email is already taken.
pub async fn ensure_default_admin(pool: &MySqlPool, config: &Config) -> anyhow::Result<()> {
    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&config.default_admin_email)
    .fetch_one(pool)
    .await?;

    if exists {
        info!(email = %config.default_admin_email, "Default admin already present");
        return Ok(());
    }

    let hashed = hash_password(&config.default_admin_password)
        .map_err(|e| anyhow::anyhow!("failed to hash default admin password: {e}"))?;
    let today = jobs::today();

    let result = sqlx::query(
        r#"
        INSERT INTO users
        (first_name, last_name, middle_name, birth_date, phone, email,
         programming_language, password, role, hire_date, last_salary_increase_date)
        VALUES ('Default', 'Admin', 'User', '1970-01-01', '+0000000000', ?, 'N/A', ?, 'admin', '2020-04-04', ?)
        "#,
    )
    .bind(&config.default_admin_email)
    .bind(hashed)
    .bind(today)
    .execute(pool)
    .await;

    match result {
        Ok(_) => {
            info!(email = %config.default_admin_email, "Default admin created");
            Ok(())
        }
        // Another instance won the race.
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(()),
        Err(e) => Err(e.into()),
    }
}
