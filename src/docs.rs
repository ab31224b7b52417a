use crate::api::notification::{NotificationListResponse, NotificationQuery, NotificationSortBy};
use crate::api::project::{
    AddEmployeeReq, AssignEmployeesReq, CreateProjectReq, ProjectDetail, ProjectListResponse,
    ProjectMembersResponse, ProjectQuery, UpdateProjectReq,
};
use crate::api::user::{
    CreateUserReq, ListUsersQuery, UpdateUserReq, UserEnvelope, UserListResponse, UserSortBy,
    VacationDates,
};
use crate::model::notification::{Notification, NotificationType};
use crate::model::project::{ProjectMember, ProjectView};
use crate::model::role::Role;
use crate::model::user::{User, UserSummary, UserView, UserWithProjects};
use crate::models::{LoginReqDto, LoginResponse, RegisterReq};
use crate::utils::pagination::SortOrder;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Staff Portal API",
        version = "1.0.0",
        description = r#"
## Staff Portal

Backend for a company staff portal: employee records, projects, and an
admin notification feed fed by a daily background check.

### Key Features
- **Users**: registration, login, profiles, admin-managed employee records
- **Projects**: project catalogue and employee assignment
- **Notifications**: birthday and salary-review reminders, automatic raises,
  audit trail of employee self-edits

### Security
Everything under `/api` requires a JWT bearer token from `/auth/login`.
Salary, wage and admin notes are visible to admins only.
"#,
    ),
    paths(
        crate::auth::handlers::register,
        crate::auth::handlers::login,

        crate::api::health::health,

        crate::api::user::profile,
        crate::api::user::list_users,
        crate::api::user::get_user,
        crate::api::user::create_user,
        crate::api::user::update_user,
        crate::api::user::delete_user,

        crate::api::project::list_projects,
        crate::api::project::get_project,
        crate::api::project::create_project,
        crate::api::project::update_project,
        crate::api::project::delete_project,
        crate::api::project::assign_employees,
        crate::api::project::add_employee,
        crate::api::project::list_project_employees,
        crate::api::project::remove_employee,

        crate::api::notification::list_notifications,
        crate::api::notification::mark_as_read
    ),
    components(
        schemas(
            RegisterReq,
            LoginReqDto,
            LoginResponse,
            Role,
            User,
            UserSummary,
            UserView,
            UserWithProjects,
            VacationDates,
            CreateUserReq,
            UpdateUserReq,
            ListUsersQuery,
            UserSortBy,
            UserListResponse,
            UserEnvelope,
            SortOrder,
            ProjectView,
            ProjectMember,
            ProjectQuery,
            CreateProjectReq,
            UpdateProjectReq,
            AssignEmployeesReq,
            AddEmployeeReq,
            ProjectListResponse,
            ProjectDetail,
            ProjectMembersResponse,
            Notification,
            NotificationType,
            NotificationQuery,
            NotificationSortBy,
            NotificationListResponse
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Registration and login"),
        (name = "Users", description = "Employee records"),
        (name = "Projects", description = "Projects and assignments"),
        (name = "Notifications", description = "Admin notification feed"),
        (name = "Health", description = "Liveness probe"),
    )
)]
pub struct ApiDoc;

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;
        assert!(paths.contains_key("/auth/login"));
        assert!(paths.contains_key("/api/users/{id}"));
        assert!(paths.contains_key("/api/projects/{id}/employees/{employeeId}"));
        assert!(paths.contains_key("/api/notifications/{id}/mark-as-read"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
