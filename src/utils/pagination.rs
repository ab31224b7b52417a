use utoipa::ToSchema;

use crate::error::AppError;

pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Checks `page`/`limit` query values; `cap_limit` clamps large limits to
/// [`MAX_LIMIT`] instead of rejecting them.
pub fn resolve(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: i64,
    cap_limit: bool,
) -> Result<Page, AppError> {
    let mut errors = Vec::new();

    let page = page.unwrap_or(1);
    if page < 1 {
        errors.push("Page must be a positive integer".to_string());
    }

    let mut limit = limit.unwrap_or(default_limit);
    if limit < 1 {
        errors.push("Limit must be a positive integer".to_string());
    } else if limit > MAX_LIMIT {
        if cap_limit {
            limit = MAX_LIMIT;
        } else {
            errors.push(format!("Limit must be between 1 and {MAX_LIMIT}"));
        }
    }

    if errors.is_empty() && (page - 1).checked_mul(limit).is_none() {
        errors.push("Page is out of range".to_string());
    }

    if errors.is_empty() {
        Ok(Page { page, limit })
    } else {
        Err(AppError::Validation(errors))
    }
}

pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, ToSchema)]
pub enum SortOrder {
    #[serde(rename = "ASC")]
    #[default]
    Asc,
    #[serde(rename = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        assert_eq!(
            resolve(None, None, 10, true).unwrap(),
            Page { page: 1, limit: 10 }
        );
    }

    #[test]
    fn zero_and_negative_values_are_rejected() {
        assert!(matches!(
            resolve(Some(0), None, 10, true),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve(Some(-5), None, 10, true),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve(None, Some(-10), 10, true),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn large_limit_is_capped_or_rejected() {
        assert_eq!(resolve(None, Some(1000), 10, true).unwrap().limit, 100);
        assert!(resolve(None, Some(1000), 10, false).is_err());
    }

    #[test]
    fn page_with_overflowing_offset_is_rejected() {
        assert!(matches!(
            resolve(Some(i64::MAX), Some(10), 10, true),
            Err(AppError::Validation(_))
        ));
        let last = i64::MAX / 10 + 1;
        assert_eq!(
            resolve(Some(last), Some(10), 10, true).unwrap().offset(),
            (last - 1) * 10
        );
    }

    #[test]
    fn offset_and_page_count() {
        let page = Page { page: 3, limit: 20 };
        assert_eq!(page.offset(), 40);
        assert_eq!(total_pages(41, 20), 3);
        assert_eq!(total_pages(40, 20), 2);
        assert_eq!(total_pages(0, 20), 0);
    }
}
