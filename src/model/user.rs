use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use utoipa::ToSchema;

use crate::model::project::ProjectView;
use crate::model::role::Role;

/// Every column of `users`, in `User` field order.
pub const USER_COLUMNS: &str = r#"
    id, first_name, last_name, middle_name, birth_date, phone, email,
    programming_language, country, bank_card, password, role,
    registration_date, last_login_date, salary, last_salary_increase_date,
    position, mentor_name, vacation_dates, github_link, linkedin_link,
    admin_note, english_level, working_hours_per_week, hire_date,
    created_at, updated_at
"#;

impl TryFrom<String> for Role {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[schema(example = 7)]
    pub id: u64,
    #[schema(example = "John")]
    pub first_name: String,
    #[schema(example = "Doe")]
    pub last_name: String,
    pub middle_name: Option<String>,
    #[schema(example = "1990-05-17", value_type = Option<String>, format = "date")]
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    #[schema(example = "john.doe@company.com")]
    pub email: String,
    pub programming_language: Option<String>,
    pub country: Option<String>,
    pub bank_card: Option<String>,
    #[serde(skip_serializing, default)]
    #[schema(write_only)]
    pub password: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[schema(value_type = String, format = "date-time")]
    pub registration_date: NaiveDateTime,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub last_login_date: Option<NaiveDateTime>,
    #[schema(example = 400.0)]
    pub salary: f64,
    #[schema(value_type = Option<String>, format = "date")]
    pub last_salary_increase_date: Option<NaiveDate>,
    pub position: Option<String>,
    pub mentor_name: Option<String>,
    #[schema(value_type = Option<Vec<String>>)]
    pub vacation_dates: Option<Json<Vec<String>>>,
    pub github_link: Option<String>,
    pub linkedin_link: Option<String>,
    pub admin_note: Option<String>,
    pub english_level: Option<String>,
    pub working_hours_per_week: Option<i32>,
    #[schema(example = "2024-01-01", value_type = String, format = "date")]
    pub hire_date: NaiveDate,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

/// The part of a user record visible to other employees.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub middle_name: Option<String>,
    #[schema(value_type = Option<String>, format = "date")]
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub email: String,
    pub programming_language: Option<String>,
    pub position: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub registration_date: NaiveDateTime,
    pub country: Option<String>,
    pub mentor_name: Option<String>,
    pub english_level: Option<String>,
}

impl From<User> for UserSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            middle_name: user.middle_name,
            birth_date: user.birth_date,
            phone: user.phone,
            email: user.email,
            programming_language: user.programming_language,
            position: user.position,
            registration_date: user.registration_date,
            country: user.country,
            mentor_name: user.mentor_name,
            english_level: user.english_level,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(untagged)]
pub enum UserView {
    Full(User),
    Summary(UserSummary),
}

impl UserView {
    pub fn for_viewer(user: User, viewer_is_admin: bool) -> Self {
        if viewer_is_admin {
            UserView::Full(user)
        } else {
            UserView::Summary(user.into())
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserWithProjects {
    #[serde(flatten)]
    pub user: UserView,
    pub projects: Vec<ProjectView>,
}

#[cfg(test)]
pub(crate) fn sample_user(id: u64) -> User {
    let created = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .unwrap();
    User {
        id,
        first_name: "John".to_string(),
        last_name: "Doe".to_string(),
        middle_name: None,
        birth_date: NaiveDate::from_ymd_opt(1990, 5, 17),
        phone: Some("+10000000000".to_string()),
        email: format!("user{id}@example.com"),
        programming_language: Some("Rust".to_string()),
        country: None,
        bank_card: Some("4111111111111111".to_string()),
        password: "$argon2id$hash".to_string(),
        role: Role::Employee,
        registration_date: created,
        last_login_date: None,
        salary: 400.0,
        last_salary_increase_date: None,
        position: None,
        mentor_name: None,
        vacation_dates: None,
        github_link: None,
        linkedin_link: None,
        admin_note: Some("on probation".to_string()),
        english_level: None,
        working_hours_per_week: None,
        hire_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        created_at: created,
        updated_at: created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_never_serialized() {
        let value = serde_json::to_value(sample_user(1)).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["firstName"], "John");
        assert_eq!(value["role"], "employee");
    }

    #[test]
    fn employees_do_not_see_admin_fields() {
        let view = UserView::for_viewer(sample_user(1), false);
        let value = serde_json::to_value(view).unwrap();
        assert!(value.get("salary").is_none());
        assert!(value.get("bankCard").is_none());
        assert!(value.get("adminNote").is_none());
        assert_eq!(value["email"], "user1@example.com");
    }

    #[test]
    fn admins_see_salary() {
        let view = UserView::for_viewer(sample_user(1), true);
        let value = serde_json::to_value(view).unwrap();
        assert_eq!(value["salary"], 400.0);
        assert_eq!(value["adminNote"], "on probation");
    }

    #[test]
    fn projects_are_flattened_next_to_user_fields() {
        let value = serde_json::to_value(UserWithProjects {
            user: UserView::for_viewer(sample_user(3), false),
            projects: vec![],
        })
        .unwrap();
        assert_eq!(value["id"], 3);
        assert!(value["projects"].as_array().unwrap().is_empty());
    }
}
