use std::collections::HashMap;

use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{MySql, MySqlPool, Transaction, types::Json};
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    api::{
        all_ids_exist, contains_pattern, notification::insert_notification, placeholders,
        positive_id,
    },
    auth::{
        auth::AuthUser,
        handlers::{is_email_available, remember_email},
        password::hash_password,
    },
    error::{AppError, AppResult},
    jobs,
    model::{
        notification::{NewNotification, NotificationType},
        project::{ProjectView, UserProjectRow},
        role::Role,
        user::{USER_COLUMNS, User, UserView, UserWithProjects},
    },
    utils::{
        db_utils::{SqlValue, UpdateBuilder, execute_update},
        email_cache, email_filter,
        pagination::{self, SortOrder},
        validation::Validator,
    },
};

pub const DEFAULT_SALARY: f64 = 400.0;

/// Fields only an admin may change through `PUT /users/{id}`.
pub const ADMIN_ONLY_FIELDS: [&str; 11] = [
    "hireDate",
    "adminNote",
    "englishLevel",
    "vacationDates",
    "mentorName",
    "position",
    "salary",
    "role",
    "password",
    "workingHoursPerWeek",
    "projectIds",
];

/// Accepts either a single date or a list of dates.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, ToSchema)]
#[serde(untagged)]
pub enum VacationDates {
    One(String),
    Many(Vec<String>),
}

impl VacationDates {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            VacationDates::One(date) => vec![date],
            VacationDates::Many(dates) => dates,
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateUserReq {
    #[schema(example = "ann.lee@company.com")]
    pub email: String,
    pub password: String,
    #[schema(example = "Ann")]
    pub first_name: String,
    #[schema(example = "Lee")]
    pub last_name: String,
    pub middle_name: Option<String>,
    #[schema(example = "1995-07-21", format = "date")]
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub programming_language: Option<String>,
    pub country: Option<String>,
    pub bank_card: Option<String>,
    pub position: Option<String>,
    pub mentor_name: Option<String>,
    pub github_link: Option<String>,
    pub linkedin_link: Option<String>,
    pub admin_note: Option<String>,
    pub english_level: Option<String>,
    pub working_hours_per_week: Option<i64>,
    #[schema(example = 400.0)]
    pub salary: Option<f64>,
    #[schema(example = "2024-01-01", format = "date")]
    pub hire_date: Option<String>,
    pub role: Option<Role>,
    pub vacation_dates: Option<VacationDates>,
    #[schema(example = json!([1, 2]))]
    pub project_ids: Option<Vec<i64>>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateUserReq {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub middle_name: Option<String>,
    #[schema(format = "date")]
    pub birth_date: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub programming_language: Option<String>,
    pub country: Option<String>,
    pub bank_card: Option<String>,
    pub linkedin_link: Option<String>,
    pub github_link: Option<String>,
    #[schema(format = "date")]
    pub hire_date: Option<String>,
    pub admin_note: Option<String>,
    pub english_level: Option<String>,
    pub vacation_dates: Option<VacationDates>,
    pub mentor_name: Option<String>,
    pub position: Option<String>,
    pub salary: Option<f64>,
    pub role: Option<Role>,
    pub password: Option<String>,
    pub working_hours_per_week: Option<i64>,
    pub project_ids: Option<Vec<i64>>,
}

impl UpdateUserReq {
    /// JSON names of every field present in the body.
    pub fn sent_fields(&self) -> Vec<&'static str> {
        let this = self;
        let mut sent = Vec::new();

        macro_rules! collect {
            ($($field:ident => $name:literal),* $(,)?) => {
                $( if this.$field.is_some() { sent.push($name); } )*
            };
        }

        collect!(
            first_name => "firstName",
            last_name => "lastName",
            middle_name => "middleName",
            birth_date => "birthDate",
            phone => "phone",
            email => "email",
            programming_language => "programmingLanguage",
            country => "country",
            bank_card => "bankCard",
            linkedin_link => "linkedinLink",
            github_link => "githubLink",
            hire_date => "hireDate",
            admin_note => "adminNote",
            english_level => "englishLevel",
            vacation_dates => "vacationDates",
            mentor_name => "mentorName",
            position => "position",
            salary => "salary",
            role => "role",
            password => "password",
            working_hours_per_week => "workingHoursPerWeek",
            project_ids => "projectIds",
        );

        sent
    }

    pub fn first_admin_only_field(&self) -> Option<&'static str> {
        self.sent_fields()
            .into_iter()
            .find(|f| ADMIN_ONLY_FIELDS.contains(f))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum UserSortBy {
    #[default]
    RegistrationDate,
    ProgrammingLanguage,
    Country,
    MentorName,
    EnglishLevel,
    Position,
}

impl UserSortBy {
    fn column(self) -> &'static str {
        match self {
            UserSortBy::RegistrationDate => "registration_date",
            UserSortBy::ProgrammingLanguage => "programming_language",
            UserSortBy::Country => "country",
            UserSortBy::MentorName => "mentor_name",
            UserSortBy::EnglishLevel => "english_level",
            UserSortBy::Position => "position",
        }
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub sort_by: Option<UserSortBy>,
    pub order: Option<SortOrder>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserListResponse {
    pub users: Vec<UserWithProjects>,
    #[schema(example = 25)]
    pub total: i64,
    #[schema(example = 1)]
    pub page: i64,
    #[schema(example = 3)]
    pub total_pages: i64,
}

#[derive(Serialize, ToSchema)]
pub struct UserEnvelope {
    #[schema(example = "User updated successfully")]
    pub message: String,
    pub user: UserWithProjects,
}

/// Typed values pulled out of a validated create/update body.
struct ParsedFields {
    birth_date: Option<NaiveDate>,
    hire_date: Option<NaiveDate>,
    vacation_dates: Option<Vec<String>>,
    project_ids: Option<Vec<u64>>,
}

fn check_vacation_dates(v: &mut Validator, dates: Option<&VacationDates>) -> Option<Vec<String>> {
    let dates = dates.cloned()?.into_vec();
    for date in &dates {
        v.date("vacationDates", date);
    }
    Some(dates.into_iter().map(|d| d.trim().to_string()).collect())
}

fn check_project_ids(v: &mut Validator, ids: Option<&Vec<i64>>) -> Option<Vec<u64>> {
    let ids = ids?;
    v.positive_ids("projectIds", ids);
    Some(ids.iter().filter_map(|id| u64::try_from(*id).ok()).collect())
}

fn check_optional_fields(
    v: &mut Validator,
    github_link: Option<&str>,
    linkedin_link: Option<&str>,
    salary: Option<f64>,
    working_hours: Option<i64>,
) {
    if let Some(link) = github_link {
        v.url("githubLink", link);
    }
    if let Some(link) = linkedin_link {
        v.url("linkedinLink", link);
    }
    if let Some(salary) = salary {
        v.non_negative("salary", salary);
    }
    if let Some(hours) = working_hours {
        v.int_range("workingHoursPerWeek", hours, 0, 168);
    }
}

fn validate_create(req: &CreateUserReq) -> AppResult<ParsedFields> {
    let mut v = Validator::new();

    v.email("email", &req.email);
    v.length("password", &req.password, 6, 20);
    v.length("firstName", &req.first_name, 2, 40);
    v.length("lastName", &req.last_name, 2, 40);
    if let Some(middle) = &req.middle_name {
        v.length("middleName", middle, 2, 40);
    }
    let birth_date = req.birth_date.as_deref().and_then(|d| v.date("birthDate", d));
    if let Some(phone) = &req.phone {
        v.length("phone", phone, 1, 50);
    }
    if let Some(lang) = &req.programming_language {
        v.length("programmingLanguage", lang, 1, 100);
    }
    let hire_date = req.hire_date.as_deref().and_then(|d| v.date("hireDate", d));
    check_optional_fields(
        &mut v,
        req.github_link.as_deref(),
        req.linkedin_link.as_deref(),
        req.salary,
        req.working_hours_per_week,
    );
    let vacation_dates = check_vacation_dates(&mut v, req.vacation_dates.as_ref());
    let project_ids = check_project_ids(&mut v, req.project_ids.as_ref());

    v.finish()?;
    Ok(ParsedFields {
        birth_date,
        hire_date,
        vacation_dates,
        project_ids,
    })
}

fn validate_update(req: &UpdateUserReq) -> AppResult<ParsedFields> {
    let mut v = Validator::new();

    if let Some(name) = &req.first_name {
        v.length("firstName", name, 2, 40);
    }
    if let Some(name) = &req.last_name {
        v.length("lastName", name, 2, 40);
    }
    if let Some(name) = &req.middle_name {
        v.length("middleName", name, 2, 40);
    }
    let birth_date = req.birth_date.as_deref().and_then(|d| v.date("birthDate", d));
    if let Some(phone) = &req.phone {
        v.length("phone", phone, 1, 50);
    }
    if let Some(email) = &req.email {
        v.email("email", email);
    }
    if let Some(lang) = &req.programming_language {
        v.length("programmingLanguage", lang, 1, 100);
    }
    if let Some(password) = &req.password {
        v.length("password", password, 6, 20);
    }
    let hire_date = req.hire_date.as_deref().and_then(|d| v.date("hireDate", d));
    check_optional_fields(
        &mut v,
        req.github_link.as_deref(),
        req.linkedin_link.as_deref(),
        req.salary,
        req.working_hours_per_week,
    );
    let vacation_dates = check_vacation_dates(&mut v, req.vacation_dates.as_ref());
    let project_ids = check_project_ids(&mut v, req.project_ids.as_ref());

    v.finish()?;
    Ok(ParsedFields {
        birth_date,
        hire_date,
        vacation_dates,
        project_ids,
    })
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value.as_ref().map(|v| v.trim().to_string())
}

pub async fn find_user(pool: &MySqlPool, id: u64) -> AppResult<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    let user = sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Loads the projects of every user in `user_ids`, keyed by user id.
async fn projects_by_user(
    pool: &MySqlPool,
    user_ids: &[u64],
    show_wage: bool,
) -> AppResult<HashMap<u64, Vec<ProjectView>>> {
    let mut grouped: HashMap<u64, Vec<ProjectView>> = HashMap::new();
    if user_ids.is_empty() {
        return Ok(grouped);
    }

    let sql = format!(
        r#"
        SELECT up.user_id, p.id, p.name, p.description, p.wage, p.active, p.created_at, p.updated_at
        FROM user_projects up
        JOIN projects p ON p.id = up.project_id
        WHERE up.user_id IN ({})
        ORDER BY p.name ASC
        "#,
        placeholders(user_ids.len())
    );

    let mut query = sqlx::query_as::<_, UserProjectRow>(&sql);
    for id in user_ids {
        query = query.bind(id);
    }

    for row in query.fetch_all(pool).await? {
        let (user_id, project) = row.into_parts();
        grouped
            .entry(user_id)
            .or_default()
            .push(ProjectView::for_viewer(project, show_wage));
    }

    Ok(grouped)
}

async fn with_projects(
    pool: &MySqlPool,
    users: Vec<User>,
    show_full: bool,
    show_wage: bool,
) -> AppResult<Vec<UserWithProjects>> {
    let ids: Vec<u64> = users.iter().map(|u| u.id).collect();
    let mut projects = projects_by_user(pool, &ids, show_wage).await?;

    Ok(users
        .into_iter()
        .map(|user| UserWithProjects {
            projects: projects.remove(&user.id).unwrap_or_default(),
            user: UserView::for_viewer(user, show_full),
        })
        .collect())
}

async fn load_with_projects(
    pool: &MySqlPool,
    id: u64,
    show_full: bool,
    show_wage: bool,
) -> AppResult<UserWithProjects> {
    let user = find_user(pool, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    with_projects(pool, vec![user], show_full, show_wage)
        .await?
        .pop()
        .ok_or_else(|| AppError::Internal("user vanished while loading projects".into()))
}

/// Fails with 400 unless every id names an existing project.
async fn ensure_projects_exist(
    tx: &mut Transaction<'_, MySql>,
    project_ids: &[u64],
) -> AppResult<()> {
    if !all_ids_exist(&mut **tx, "projects", project_ids).await? {
        return Err(AppError::BadRequest(
            "One or more projects do not exist".into(),
        ));
    }
    Ok(())
}

/// Makes `project_ids` the complete project set of the user.
async fn replace_user_projects(
    tx: &mut Transaction<'_, MySql>,
    user_id: u64,
    project_ids: &[u64],
) -> AppResult<()> {
    ensure_projects_exist(tx, project_ids).await?;

    sqlx::query("DELETE FROM user_projects WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

    for project_id in project_ids {
        sqlx::query("INSERT IGNORE INTO user_projects (user_id, project_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(project_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// Current user profile
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "The caller with their projects", body = UserWithProjects),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn profile(auth: AuthUser, pool: web::Data<MySqlPool>) -> AppResult<HttpResponse> {
    let user = load_with_projects(pool.get_ref(), auth.user_id, true, auth.is_admin()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// List users
#[utoipa::path(
    get,
    path = "/api/users",
    params(
        ("page", Query, description = "Page number, starting at 1"),
        ("limit", Query, description = "Items per page (default 10, capped at 100)"),
        ("firstName", Query, description = "Case-insensitive substring of the first name"),
        ("lastName", Query, description = "Case-insensitive substring of the last name"),
        ("sortBy", Query, description = "registrationDate | programmingLanguage | country | mentorName | englishLevel | position"),
        ("order", Query, description = "ASC | DESC")
    ),
    responses(
        (status = 200, description = "Paginated user list", body = UserListResponse),
        (status = 400, description = "Invalid query parameters")
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_users(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    query: web::Query<ListUsersQuery>,
) -> AppResult<HttpResponse> {
    let page = pagination::resolve(query.page, query.limit, 10, true)?;
    let sort = query.sort_by.unwrap_or_default().column();
    let order = query.order.unwrap_or_default().as_sql();

    let mut conditions = Vec::new();
    let mut bindings: Vec<String> = Vec::new();

    if let Some(first_name) = query.first_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("LOWER(first_name) LIKE ?");
        bindings.push(contains_pattern(first_name));
    }

    if let Some(last_name) = query.last_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        conditions.push("LOWER(last_name) LIKE ?");
        bindings.push(contains_pattern(last_name));
    }

    let where_clause = if conditions.is_empty() {
        "".to_string()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM users {where_clause}");
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for b in &bindings {
        count_query = count_query.bind(b);
    }
    let total = count_query.fetch_one(pool.get_ref()).await?;

    let data_sql = format!(
        "SELECT {USER_COLUMNS} FROM users {where_clause} ORDER BY {sort} {order}, id ASC LIMIT ? OFFSET ?"
    );
    debug!(sql = %data_sql, bindings = ?bindings, page = page.page, limit = page.limit, "Fetching users");

    let mut data_query = sqlx::query_as::<_, User>(&data_sql);
    for b in &bindings {
        data_query = data_query.bind(b);
    }
    let users = data_query
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool.get_ref())
        .await?;

    let users = with_projects(pool.get_ref(), users, auth.is_admin(), auth.is_admin()).await?;

    Ok(HttpResponse::Ok().json(UserListResponse {
        users,
        total,
        page: page.page,
        total_pages: pagination::total_pages(total, page.limit),
    }))
}

/// Get one user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(
        ("id", Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User with projects", body = UserWithProjects),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "User not found", body = Object, example = json!({
            "error": "User not found"
        }))
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    let id = positive_id(path.into_inner(), "id")?;
    let user = load_with_projects(pool.get_ref(), id, auth.is_admin(), auth.is_admin()).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// Create an employee
#[utoipa::path(
    post,
    path = "/api/users",
    request_body = CreateUserReq,
    responses(
        (status = 201, description = "Employee created", body = UserEnvelope),
        (status = 400, description = "Validation failed, duplicate email or unknown project"),
        (status = 403, description = "Caller is not an admin")
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
#[instrument(name = "create_user", skip(auth, pool, req), fields(admin_id = auth.user_id))]
pub async fn create_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    req: web::Json<CreateUserReq>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let parsed = validate_create(&req)?;

    let email = email_filter::normalize(&req.email);
    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(AppError::BadRequest(
            "User with this email already exists".into(),
        ));
    }

    let hashed = hash_password(&req.password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;
    let today = jobs::today();

    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO users
        (first_name, last_name, middle_name, birth_date, phone, email, programming_language,
         country, bank_card, password, role, salary, last_salary_increase_date, position,
         mentor_name, vacation_dates, github_link, linkedin_link, admin_note, english_level,
         working_hours_per_week, hire_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(trimmed(&req.middle_name))
    .bind(parsed.birth_date)
    .bind(trimmed(&req.phone))
    .bind(&email)
    .bind(trimmed(&req.programming_language))
    .bind(trimmed(&req.country))
    .bind(trimmed(&req.bank_card))
    .bind(hashed)
    .bind(req.role.unwrap_or_default().as_ref())
    .bind(req.salary.unwrap_or(DEFAULT_SALARY))
    .bind(today)
    .bind(trimmed(&req.position))
    .bind(trimmed(&req.mentor_name))
    .bind(parsed.vacation_dates.map(Json))
    .bind(trimmed(&req.github_link))
    .bind(trimmed(&req.linkedin_link))
    .bind(trimmed(&req.admin_note))
    .bind(trimmed(&req.english_level))
    .bind(req.working_hours_per_week)
    .bind(parsed.hire_date.unwrap_or(today))
    .execute(&mut *tx)
    .await;

    let user_id = match result {
        Ok(done) => done.last_insert_id(),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            remember_email(&email).await;
            return Err(AppError::BadRequest(
                "User with this email already exists".into(),
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(project_ids) = &parsed.project_ids {
        replace_user_projects(&mut tx, user_id, project_ids).await?;
    }

    let full_name = format!("{} {}", req.first_name.trim(), req.last_name.trim());
    insert_notification(
        &mut *tx,
        auth.user_id,
        &NewNotification {
            kind: NotificationType::EmployeeCreated,
            message: format!("New employee {full_name} was created"),
            event_date: today,
            related_user_id: user_id,
        },
    )
    .await?;

    tx.commit().await?;
    remember_email(&email).await;
    info!(user_id, "Employee created");

    let user = load_with_projects(pool.get_ref(), user_id, true, true).await?;
    Ok(HttpResponse::Created().json(UserEnvelope {
        message: "Employee created successfully".into(),
        user,
    }))
}

/// Update a user
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(
        ("id", Path, description = "User ID")
    ),
    request_body = UpdateUserReq,
    responses(
        (status = 200, description = "User updated", body = UserEnvelope),
        (status = 400, description = "Validation failed, email in use or unknown project"),
        (status = 403, description = "Not allowed to edit this user or field", body = Object, example = json!({
            "error": "You are not allowed to update the field: salary"
        })),
        (status = 404, description = "User not found")
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
#[instrument(name = "update_user", skip(auth, pool, path, req), fields(caller_id = auth.user_id))]
pub async fn update_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
    req: web::Json<UpdateUserReq>,
) -> AppResult<HttpResponse> {
    let id = positive_id(path.into_inner(), "id")?;
    auth.require_self_or_admin(id)?;

    if !auth.is_admin() {
        if let Some(field) = req.first_admin_only_field() {
            warn!(user_id = id, field, "Employee tried to update an admin-only field");
            return Err(AppError::Forbidden(format!(
                "You are not allowed to update the field: {field}"
            )));
        }
    }

    let parsed = validate_update(&req)?;
    let new_email = req.email.as_deref().map(email_filter::normalize);

    if let Some(email) = &new_email {
        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? AND id <> ? LIMIT 1)",
        )
        .bind(email)
        .bind(id)
        .fetch_one(pool.get_ref())
        .await?;
        if taken {
            return Err(AppError::BadRequest("Email is already in use".into()));
        }
    }

    let hashed = match &req.password {
        Some(password) => Some(
            hash_password(password)
                .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?,
        ),
        None => None,
    };

    let mut builder = UpdateBuilder::new("users");
    builder
        .set_opt("first_name", trimmed(&req.first_name))
        .set_opt("last_name", trimmed(&req.last_name))
        .set_opt("middle_name", trimmed(&req.middle_name))
        .set_opt("birth_date", parsed.birth_date)
        .set_opt("phone", trimmed(&req.phone))
        .set_opt("email", new_email.clone())
        .set_opt("programming_language", trimmed(&req.programming_language))
        .set_opt("country", trimmed(&req.country))
        .set_opt("bank_card", trimmed(&req.bank_card))
        .set_opt("linkedin_link", trimmed(&req.linkedin_link))
        .set_opt("github_link", trimmed(&req.github_link))
        .set_opt("hire_date", parsed.hire_date)
        .set_opt("admin_note", trimmed(&req.admin_note))
        .set_opt("english_level", trimmed(&req.english_level))
        .set_opt("mentor_name", trimmed(&req.mentor_name))
        .set_opt("position", trimmed(&req.position))
        .set_opt("salary", req.salary)
        .set_opt("role", req.role.map(|r| r.as_ref().to_string()))
        .set_opt("password", hashed)
        .set_opt("working_hours_per_week", req.working_hours_per_week);
    if let Some(dates) = parsed.vacation_dates {
        builder.set("vacation_dates", SqlValue::Json(json!(dates)));
    }

    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, (String, String, String)>(
        "SELECT email, first_name, last_name FROM users WHERE id = ? FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((old_email, first_name, last_name)) = current else {
        return Err(AppError::NotFound("User not found".into()));
    };

    if !builder.is_empty() {
        let update = builder.build("id", id);
        let result = execute_update(&mut *tx, update).await;
        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(AppError::BadRequest("Email is already in use".into()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(project_ids) = &parsed.project_ids {
        replace_user_projects(&mut tx, id, project_ids).await?;
    }

    let changed = req.sent_fields();
    if !auth.is_admin() && !changed.is_empty() {
        let admins = sqlx::query_scalar::<_, u64>("SELECT id FROM users WHERE role = 'admin'")
            .fetch_all(&mut *tx)
            .await?;

        let notification = NewNotification {
            kind: NotificationType::UserUpdate,
            message: format!(
                "User {first_name} {last_name} updated fields: {}",
                changed.join(", ")
            ),
            event_date: jobs::today(),
            related_user_id: id,
        };
        for admin_id in admins {
            insert_notification(&mut *tx, admin_id, &notification).await?;
        }
    }

    tx.commit().await?;

    if let Some(email) = &new_email {
        if *email != old_email {
            email_filter::remove(&old_email);
            email_cache::forget(&old_email).await;
            remember_email(email).await;
        }
    }

    info!(user_id = id, fields = ?changed, "User updated");

    let show_full = auth.is_admin() || auth.user_id == id;
    let user = load_with_projects(pool.get_ref(), id, show_full, auth.is_admin()).await?;
    Ok(HttpResponse::Ok().json(UserEnvelope {
        message: "User updated successfully".into(),
        user,
    }))
}

/// Delete an employee
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(
        ("id", Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Employee deleted", body = Object, example = json!({
            "message": "Employee deleted successfully"
        })),
        (status = 400, description = "Attempt to delete own account"),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No employee with this id")
    ),
    tag = "Users",
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_user(
    auth: AuthUser,
    pool: web::Data<MySqlPool>,
    path: web::Path<i64>,
) -> AppResult<HttpResponse> {
    auth.require_admin()?;
    let id = positive_id(path.into_inner(), "id")?;

    if id == auth.user_id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".into(),
        ));
    }

    let email = sqlx::query_scalar::<_, String>(
        "SELECT email FROM users WHERE id = ? AND role = 'employee'",
    )
    .bind(id)
    .fetch_optional(pool.get_ref())
    .await?
    .ok_or_else(|| AppError::NotFound("Employee not found".into()))?;

    let result = sqlx::query("DELETE FROM users WHERE id = ? AND role = 'employee'")
        .bind(id)
        .execute(pool.get_ref())
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".into()));
    }

    email_filter::remove(&email);
    email_cache::forget(&email).await;
    info!(user_id = id, admin_id = auth.user_id, "Employee deleted");

    Ok(HttpResponse::Ok().json(json!({ "message": "Employee deleted successfully" })))
}
