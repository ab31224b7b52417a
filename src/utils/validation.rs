use chrono::NaiveDate;

use crate::error::AppError;

/// Collects field errors and turns them into a single `AppError::Validation`.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.trim().chars().count();
        if len == 0 && min > 0 {
            self.push(format!("{field} is required"));
        } else if len < min || len > max {
            self.push(format!("{field} must be between {min} and {max} characters"));
        }
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.push(format!("{field} must not exceed {max} characters"));
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !is_email(value) {
            self.push(format!("{field} must be a valid email"));
        } else {
            self.length(field, value, 5, 80);
        }
    }

    pub fn date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        match parse_date(value) {
            Some(d) => Some(d),
            None => {
                self.push(format!("{field} must be a date in YYYY-MM-DD format"));
                None
            }
        }
    }

    pub fn url(&mut self, field: &str, value: &str) {
        if !is_url(value) {
            self.push(format!("{field} must be a valid URL"));
        }
    }

    pub fn non_negative(&mut self, field: &str, value: f64) {
        if !value.is_finite() || value < 0.0 {
            self.push(format!("{field} must be a non-negative number"));
        }
    }

    pub fn int_range(&mut self, field: &str, value: i64, min: i64, max: i64) {
        if value < min || value > max {
            self.push(format!("{field} must be an integer between {min} and {max}"));
        }
    }

    pub fn positive_ids(&mut self, field: &str, ids: &[i64]) {
        if ids.iter().any(|id| *id < 1) {
            self.push(format!("All {field} must be positive integers"));
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| value.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

pub fn is_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.chars().any(char::is_whitespace)
}

pub fn is_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    let host = rest.split('/').next().unwrap_or_default();
    host.contains('.') && !host.starts_with('.') && !value.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_email("john@company.com"));
        assert!(!is_email("john.company.com"));
        assert!(!is_email("john@company"));
        assert!(!is_email("jo hn@company.com"));
    }

    #[test]
    fn url_shapes() {
        assert!(is_url("https://github.com/someone"));
        assert!(is_url("linkedin.com/in/someone"));
        assert!(!is_url("not a url"));
    }

    #[test]
    fn dates_accept_plain_and_timestamp_prefix() {
        assert_eq!(parse_date("2024-02-29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(
            parse_date("2024-02-29T00:00:00.000Z"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(parse_date("2023-02-29"), None);
    }

    #[test]
    fn collects_every_failure() {
        let mut v = Validator::new();
        v.length("firstName", "", 2, 40);
        v.length("lastName", "X", 2, 40);
        v.email("email", "nope");
        match v.finish() {
            Err(AppError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn clean_input_passes() {
        let mut v = Validator::new();
        v.length("name", "Billing", 2, 100);
        v.non_negative("wage", 0.0);
        v.int_range("workingHoursPerWeek", 40, 0, 100);
        assert!(v.finish().is_ok());
    }
}
