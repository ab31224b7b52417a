use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction};
use tracing::{debug, info, instrument};
use utoipa::ToSchema;

use crate::{
    api::{all_ids_exist, contains_pattern, positive_id},
    auth::auth::AuthUser,
    error::{AppError, AppResult},
    model::project::{Project, ProjectMember, ProjectView},
    utils::{
        db_utils::{UpdateBuilder, execute_update},
        pagination,
        validation::Validator,
    },
};

const SEARCH_MAX: usize = 100;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ProjectQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct CreateProjectReq {
    #[schema(example = "Billing revamp")]
    pub name: String,
    #[schema(example = "Rewrite of the invoice pipeline")]
    pub description: String,
    #[schema(example = 25.5)]
    pub wage: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct UpdateProjectReq {
    pub name: Option<String>,
    pub description: Option<String>,
    pub wage: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignEmployeesReq {
    #[schema(example = json!([3, 4]))]
    pub employee_ids: Vec<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddEmployeeReq {
    #[schema(example = 3)]
    pub employee_id: i64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectListResponse {
    pub projects: Vec<ProjectView>,
    #[schema(example = 4)]
    pub total: i64,
    #[schema(example = 1)]
    pub page: i64,
    #[schema(example = 1)]
    pub total_pages: i64,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: ProjectView,
    pub employees: Vec<ProjectMember>,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectMembersResponse {
    pub employees: Vec<ProjectMember>,
}

/// Trimmed search term, `None` when blank.
fn search_term(raw: Option<&str>) -> AppResult<Option<String>> {
    let Some(term) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let mut v = Validator::new();
    v.max_length("search", term, SEARCH_MAX);
    v.finish()?;
    Ok(Some(term.to_string()))
}

fn validate_create(req: &CreateProjectReq) -> AppResult<()> {
    let mut v = Validator::new();
    v.length("name", &req.name, 2, 100);
    v.length("description", &req.description, 10, 5000);
    if let Some(wage) = req.wage {
        v.non_negative("wage", wage);
    }
    v.finish()
}

fn validate_update(req: &UpdateProjectReq) -> AppResult<()> {
    let mut v = Validator::new();
    if let Some(name) = &req.name {
        v.length("name", name, 2, 100);
    }
    if let Some(description) = &req.description {
        v.length("description", description, 10, 5000);
    }
    if let Some(wage) = req.wage {
        v.non_negative("wage", wage);
    }
    v.finish()
}

async fn find_project(pool: &MySqlPool, id: u64) -> AppResult<Project> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))
}

async fn lock_project(tx: &mut Transaction<'_, MySql>, id: u64) -> AppResult<()> {
    sqlx::query_scalar::<_, u64>("SELECT id FROM projects WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::NotFound("Project not found".into()))
}

/// Rejects `name` when another project (other than `except`) already uses it.
async fn ensure_name_free(
    tx: &mut Transaction<'_, MySql>,
    name: &str,
    except: Option<u64>,
) -> AppResult<()> {
    let taken = sqlx::query_scalar::<_, u64>(
        "SELECT id FROM projects WHERE name = ? AND id <> ? LIMIT 1 FOR UPDATE",
    )
    .bind(name)
    .bind(except.unwrap_or(0))
    .fetch_optional(&mut **tx)
    .await?;

    if taken.is_some() {
        return Err(AppError::BadRequest(
            "Project with this name already exists".into(),
        ));
    }
    Ok(())
}

async fn project_members(
    pool: &MySqlPool,
    project_id: u64,
    viewer_is_admin: bool,
) -> AppResult<Vec<ProjectMember>> {
    let members = sqlx::query_as::<_, ProjectMember>(
        r#"
        SELECT u.id, u.first_name, u.last_name, u.email, u.position,
               u.programming_language, u.salary
        FROM user_projects up
        JOIN users u ON u.id = up.user_id
        WHERE up.project_id = ?
        ORDER BY u.last_name ASC, u.first_name ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(members
        .into_iter()
        .map(|m| m.hide_salary(viewer_is_admin))
        .collect())
}

/// List projects
#[utoipa::path(
    get,
    path = "/api/projects",
    params(
        ("page", Query, description = "Page number, starting at 1"),
        ("limit", Query, description = "Items per page (1-100, default 100)"),
        ("active", Query, description = "Filter by active flag"),
        ("search", Query, description = "Case-insensitive substring of the name")
    ),
    responses(
        (status = 200, description = "Paginated project list", body = ProjectListResponse),
        (status = 400, description = "Invalid query parameters")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_projects(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ProjectQuery>,
) -> AppResult<HttpResponse> {
    let page = pagination::resolve(query.page, query.limit, 100, false)?;
    let search = search_term(query.search.as_deref())?;

    let mut conditions = Vec::new();
    if query.active.is_some() {
        conditions.push("active = ?");
    }
    if search.is_some() {
        conditions.push("LOWER(name) LIKE ?");
    }
    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let like = search.as_deref().map(contains_pattern);

    let count_sql = format!("SELECT COUNT(*) FROM projects {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(active) = query.active {
        count_query = count_query.bind(active);
    }
    if let Some(like) = &like {
        count_query = count_query.bind(like);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql =
        format!("SELECT * FROM projects {where_clause} ORDER BY name ASC LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page = page.page, limit = page.limit, "Fetching projects");

    let mut data_query = sqlx::query_as::<_, Project>(&data_sql);
    if let Some(active) = query.active {
        data_query = data_query.bind(active);
    }
    if let Some(like) = &like {
        data_query = data_query.bind(like);
    }
    let projects = data_query
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    Ok(HttpResponse::Ok().json(ProjectListResponse {
        projects: projects
            .into_iter()
            .map(|p| ProjectView::for_viewer(p, auth.is_admin()))
            .collect(),
        total,
        page: page.page,
        total_pages: pagination::total_pages(total, page.limit),
    }))
}

/// Get a project with its employees
#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(
        ("id", Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project with employees", body = ProjectDetail),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = positive_id(path.into_inner(), "id")?;
    let project = find_project(pool.get_ref(), id).await?;
    let employees = project_members(pool.get_ref(), id, auth.is_admin()).await?;

    Ok(HttpResponse::Ok().json(ProjectDetail {
        project: ProjectView::for_viewer(project, auth.is_admin()),
        employees,
    }))
}

/// Create a project
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectReq,
    responses(
        (status = 201, description = "Project created", body = ProjectView),
        (status = 400, description = "Validation failed or name already used", body = Object, example = json!({
            "error": "Project with this name already exists"
        })),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
#[instrument(name = "create_project", skip(auth, pool, req), fields(name = %req.name))]
pub async fn create_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    req: web::Json<CreateProjectReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    validate_create(&req)?;

    let name = req.name.trim();
    let mut tx = pool.begin().await?;
    ensure_name_free(&mut tx, name, None).await?;

    let result = sqlx::query(
        "INSERT INTO projects (name, description, wage, active) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(req.description.trim())
    .bind(req.wage.unwrap_or(0.0))
    .bind(req.active.unwrap_or(true))
    .execute(&mut *tx)
    .await;

    let id = match result {
        Ok(done) => done.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(AppError::BadRequest(
                "Project with this name already exists".into(),
            ));
        }
        Err(e) => return Err(e.into()),
    };
    tx.commit().await?;

    info!(project_id = id, "Project created");
    let project = find_project(pool.get_ref(), id).await?;
    Ok(HttpResponse::Created().json(ProjectView::for_viewer(project, true)))
}

/// Update a project
#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(
        ("id", Path, description = "Project ID")
    ),
    request_body = UpdateProjectReq,
    responses(
        (status = 200, description = "Project updated", body = ProjectView),
        (status = 400, description = "Validation failed or name already used"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn update_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    req: web::Json<UpdateProjectReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;
    validate_update(&req)?;

    let mut tx = pool.begin().await?;
    lock_project(&mut tx, id).await?;

    let name = req.name.as_deref().map(str::trim);
    if let Some(name) = name {
        ensure_name_free(&mut tx, name, Some(id)).await?;
    }

    let mut builder = UpdateBuilder::new("projects");
    builder
        .set_opt("name", name)
        .set_opt("description", req.description.as_deref().map(str::trim))
        .set_opt("wage", req.wage)
        .set_opt("active", req.active);

    let columns = builder.columns();
    if !builder.is_empty() {
        execute_update(&mut *tx, builder.build("id", id)).await?;
    }
    tx.commit().await?;

    info!(project_id = id, ?columns, "Project updated");
    let project = find_project(pool.get_ref(), id).await?;
    Ok(HttpResponse::Ok().json(ProjectView::for_viewer(project, true)))
}

/// Delete a project
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(
        ("id", Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project deleted", body = Object, example = json!({
            "message": "Project deleted successfully"
        })),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_project(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;

    let result = sqlx::query("DELETE FROM projects WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Project not found".into()));
    }

    info!(project_id = id, "Project deleted");
    Ok(HttpResponse::Ok().json(json!({ "message": "Project deleted successfully" })))
}

/// Replace the employees of a project
#[utoipa::path(
    post,
    path = "/api/projects/{id}/employees",
    params(
        ("id", Path, description = "Project ID")
    ),
    request_body = AssignEmployeesReq,
    responses(
        (status = 200, description = "Assignment replaced", body = ProjectMembersResponse),
        (status = 400, description = "Invalid or unknown employee ids"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
#[instrument(name = "assign_employees", skip(auth, pool, path, req))]
pub async fn assign_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    req: web::Json<AssignEmployeesReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;

    let mut v = Validator::new();
    v.positive_ids("employeeIds", &req.employee_ids);
    v.finish()?;
    let employee_ids: Vec<u64> = req
        .employee_ids
        .iter()
        .filter_map(|id| u64::try_from(*id).ok())
        .collect();

    let mut tx = pool.begin().await?;
    lock_project(&mut tx, id).await?;

    if !all_ids_exist(&mut *tx, "users", &employee_ids).await? {
        return Err(AppError::BadRequest(
            "One or more employees do not exist".into(),
        ));
    }

    sqlx::query("DELETE FROM user_projects WHERE project_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for user_id in &employee_ids {
        sqlx::query("INSERT IGNORE INTO user_projects (user_id, project_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    info!(project_id = id, count = employee_ids.len(), "Project employees replaced");
    let employees = project_members(pool.get_ref(), id, true).await?;
    Ok(HttpResponse::Ok().json(ProjectMembersResponse { employees }))
}

/// Add one employee to a project
#[utoipa::path(
    post,
    path = "/api/projects/{id}/employee",
    params(
        ("id", Path, description = "Project ID")
    ),
    request_body = AddEmployeeReq,
    responses(
        (status = 200, description = "Employee assigned", body = Object, example = json!({
            "message": "Employee added to project"
        })),
        (status = 400, description = "Invalid employee id"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Project or employee not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn add_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    req: web::Json<AddEmployeeReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;
    let employee_id = positive_id(req.employee_id, "employeeId")?;

    find_project(pool.get_ref(), id).await?;

    let exists = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE id = ?")
        .bind(employee_id)
        .fetch_optional(pool.get_ref())
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound("Employee not found".into()));
    }

    sqlx::query("INSERT IGNORE INTO user_projects (user_id, project_id) VALUES (?, ?)")
        .bind(employee_id)
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    info!(project_id = id, employee_id, "Employee added to project");
    Ok(HttpResponse::Ok().json(json!({ "message": "Employee added to project" })))
}

/// List the employees of a project
#[utoipa::path(
    get,
    path = "/api/projects/{id}/employees",
    params(
        ("id", Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Assigned employees", body = ProjectMembersResponse),
        (status = 404, description = "Project not found")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_project_employees(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = positive_id(path.into_inner(), "id")?;
    find_project(pool.get_ref(), id).await?;

    let employees = project_members(pool.get_ref(), id, auth.is_admin()).await?;
    Ok(HttpResponse::Ok().json(ProjectMembersResponse { employees }))
}

/// Remove an employee from a project
#[utoipa::path(
    delete,
    path = "/api/projects/{id}/employees/{employeeId}",
    params(
        ("id", Path, description = "Project ID"),
        ("employeeId", Path, description = "Employee ID")
    ),
    responses(
        (status = 200, description = "Employee removed", body = Object, example = json!({
            "message": "Employee removed from project"
        })),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "Employee is not assigned to this project")
    ),
    tag = "Projects",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn remove_employee(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<(i64, i64)>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let (id, employee_id) = path.into_inner();
    let id = positive_id(id, "id")?;
    let employee_id = positive_id(employee_id, "employeeId")?;

    let result = sqlx::query("DELETE FROM user_projects WHERE project_id = ? AND user_id = ?")
        .bind(id)
        .bind(employee_id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "Employee is not assigned to this project".into(),
        ));
    }

    info!(project_id = id, employee_id, "Employee removed from project");
    Ok(HttpResponse::Ok().json(json!({ "message": "Employee removed from project" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{caller, lazy_pool};
    use crate::error::{path_error_handler, query_error_handler};
    use crate::model::role::Role;
    use actix_web::{App, HttpMessage, dev::Service, http::StatusCode, test};

    #[::core::prelude::v1::test]
    fn blank_search_is_ignored() {
        assert_eq!(search_term(None).unwrap(), None);
        assert_eq!(search_term(Some("   ")).unwrap(), None);
        assert_eq!(
            search_term(Some("  billing ")).unwrap().as_deref(),
            Some("billing")
        );
        assert!(search_term(Some(&"a".repeat(101))).is_err());
    }

    #[::core::prelude::v1::test]
    fn project_fields_are_validated() {
        let ok = CreateProjectReq {
            name: "Billing".into(),
            description: "Invoice pipeline rewrite".into(),
            wage: Some(10.0),
            active: None,
        };
        assert!(validate_create(&ok).is_ok());

        let bad = CreateProjectReq {
            name: "B".into(),
            description: "short".into(),
            wage: Some(-1.0),
            active: None,
        };
        let Err(AppError::Validation(errors)) = validate_create(&bad) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 3);

        let partial = UpdateProjectReq {
            description: Some("tiny".into()),
            ..Default::default()
        };
        assert!(validate_update(&partial).is_err());
    }

    macro_rules! app_as {
        ($caller:expr) => {{
            let caller = $caller;
            test::init_service(
                App::new()
                    .app_data(web::Data::new(lazy_pool()))
                    .app_data(web::QueryConfig::default().error_handler(query_error_handler))
                    .app_data(web::PathConfig::default().error_handler(path_error_handler))
                    .wrap_fn(move |req, srv| {
                        req.extensions_mut().insert(caller.clone());
                        srv.call(req)
                    })
                    .route("/projects", web::get().to(list_projects))
                    .route("/projects", web::post().to(create_project))
                    .route("/projects/{id}", web::get().to(get_project))
                    .route(
                        "/projects/{id}/employees/{employeeId}",
                        web::delete().to(remove_employee),
                    ),
            )
            .await
        }};
    }

    #[actix_web::test]
    async fn limit_above_hundred_is_rejected() {
        let app = app_as!(caller(5, Role::Employee));
        let req = test::TestRequest::get().uri("/projects?limit=101").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn non_numeric_ids_are_rejected() {
        let app = app_as!(caller(1, Role::Admin));
        let req = test::TestRequest::get().uri("/projects/abc").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);

        let req = test::TestRequest::delete()
            .uri("/projects/3/employees/-1")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn employees_cannot_create_projects() {
        let app = app_as!(caller(5, Role::Employee));
        let req = test::TestRequest::post()
            .uri("/projects")
            .set_json(json!({ "name": "Billing", "description": "Invoice pipeline rewrite" }))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);
    }
}
