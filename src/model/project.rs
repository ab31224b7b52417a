use chrono::NaiveDateTime;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Project {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub wage: f64,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A project as returned to a caller; `wage` is only present for admins.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "id": 1,
    "name": "Billing revamp",
    "description": "Rewrite of the invoice pipeline",
    "wage": 25.5,
    "active": true,
    "createdAt": "2024-01-01T09:00:00",
    "updatedAt": "2024-01-01T09:00:00"
}))]
pub struct ProjectView {
    pub id: u64,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wage: Option<f64>,
    pub active: bool,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: NaiveDateTime,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: NaiveDateTime,
}

impl ProjectView {
    pub fn for_viewer(project: Project, viewer_is_admin: bool) -> Self {
        Self {
            id: project.id,
            name: project.name,
            description: project.description,
            wage: viewer_is_admin.then_some(project.wage),
            active: project.active,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Row of the `user_projects` join used when attaching projects to users.
#[derive(Debug, sqlx::FromRow)]
pub struct UserProjectRow {
    pub user_id: u64,
    pub id: u64,
    pub name: String,
    pub description: String,
    pub wage: f64,
    pub active: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl UserProjectRow {
    pub fn into_parts(self) -> (u64, Project) {
        (
            self.user_id,
            Project {
                id: self.id,
                name: self.name,
                description: self.description,
                wage: self.wage,
                active: self.active,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
        )
    }
}

/// An employee assigned to a project.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMember {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub position: Option<String>,
    pub programming_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<f64>,
}

impl ProjectMember {
    pub fn hide_salary(mut self, viewer_is_admin: bool) -> Self {
        if !viewer_is_admin {
            self.salary = None;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn project() -> Project {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        Project {
            id: 1,
            name: "Billing".to_string(),
            description: "Invoice pipeline rewrite".to_string(),
            wage: 25.5,
            active: true,
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn wage_hidden_from_employees() {
        let value = serde_json::to_value(ProjectView::for_viewer(project(), false)).unwrap();
        assert!(value.get("wage").is_none());
        let value = serde_json::to_value(ProjectView::for_viewer(project(), true)).unwrap();
        assert_eq!(value["wage"], 25.5);
    }

    #[test]
    fn member_salary_hidden_from_employees() {
        let member = ProjectMember {
            id: 4,
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            email: "ann@example.com".into(),
            position: None,
            programming_language: Some("Go".into()),
            salary: Some(900.0),
        };
        let value = serde_json::to_value(member.clone().hide_salary(false)).unwrap();
        assert!(value.get("salary").is_none());
        let value = serde_json::to_value(member.hide_salary(true)).unwrap();
        assert_eq!(value["salary"], 900.0);
    }
}
