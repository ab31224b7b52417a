use std::env;
use std::str::FromStr;

use dotenvy::dotenv;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Automatic raise rules applied by the daily notification run.
#[derive(Clone, Debug, PartialEq)]
pub struct SalaryPolicy {
    pub step: f64,
    pub ceiling: f64,
    pub threshold: f64,
    pub review_months: u32,
}

impl Default for SalaryPolicy {
    fn default() -> Self {
        Self {
            step: 200.0,
            ceiling: 1500.0,
            threshold: 1400.0,
            review_months: 6,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RateLimits {
    pub login_per_min: u32,
    pub register_per_min: u32,
    pub protected_per_min: u32,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub access_token_ttl: usize,
    pub admin_secret_word: String,

    pub api_prefix: String,
    pub cors_origin: String,
    pub rate: RateLimits,

    pub notification_cron: String,
    pub salary: SalaryPolicy,

    pub default_admin_email: String,
    pub default_admin_password: String,

    pub log_dir: String,
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn or_default(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let defaults = SalaryPolicy::default();
        let salary = SalaryPolicy {
            step: parsed("SALARY_STEP", defaults.step)?,
            ceiling: parsed("SALARY_CEILING", defaults.ceiling)?,
            threshold: parsed("SALARY_THRESHOLD", defaults.threshold)?,
            review_months: parsed("SALARY_REVIEW_MONTHS", defaults.review_months)?,
        };

        Ok(Self {
            server_addr: or_default("SERVER_ADDR", "0.0.0.0:10000"),
            database_url: required("DATABASE_URL")?,
            db_max_connections: parsed("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parsed("ACCESS_TOKEN_TTL", 28_800)?, // 8h
            admin_secret_word: required("ADMIN_SECRET_WORD")?,

            api_prefix: or_default("API_PREFIX", "/api"),
            cors_origin: or_default("CORS_ORIGIN", "*"),
            rate: RateLimits {
                login_per_min: parsed("RATE_LOGIN_PER_MIN", 60)?,
                register_per_min: parsed("RATE_REGISTER_PER_MIN", 30)?,
                protected_per_min: parsed("RATE_PROTECTED_PER_MIN", 1000)?,
            },

            notification_cron: or_default("NOTIFICATION_CRON", "0 0 0 * * *"),
            salary,

            default_admin_email: or_default("DEFAULT_ADMIN_EMAIL", "admin1@example.com")
                .to_lowercase(),
            default_admin_password: or_default("DEFAULT_ADMIN_PASSWORD", "adminpassword"),

            log_dir: or_default("LOG_DIR", "logs"),
        })
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        Self {
            server_addr: "127.0.0.1:0".to_string(),
            database_url: "mysql://localhost/staff_portal_test".to_string(),
            db_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            access_token_ttl: 3600,
            admin_secret_word: "open-sesame".to_string(),
            api_prefix: "/api".to_string(),
            cors_origin: "*".to_string(),
            rate: RateLimits {
                login_per_min: 60,
                register_per_min: 30,
                protected_per_min: 1000,
            },
            notification_cron: "0 0 0 * * *".to_string(),
            salary: SalaryPolicy::default(),
            default_admin_email: "admin1@example.com".to_string(),
            default_admin_password: "adminpassword".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_salary_policy_matches_raise_rules() {
        let policy = SalaryPolicy::default();
        assert_eq!(policy.step, 200.0);
        assert_eq!(policy.ceiling, 1500.0);
        assert_eq!(policy.threshold, 1400.0);
        assert_eq!(policy.review_months, 6);
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let err = required("STAFF_PORTAL_SURELY_UNSET_VARIABLE").unwrap_err();
        assert_eq!(err.to_string(), "STAFF_PORTAL_SURELY_UNSET_VARIABLE must be set");
    }

    #[test]
    fn unset_number_falls_back_to_default() {
        let value: u32 = parsed("STAFF_PORTAL_SURELY_UNSET_NUMBER", 42).unwrap();
        assert_eq!(value, 42);
    }
}
