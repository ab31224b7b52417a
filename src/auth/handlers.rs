use actix_web::{HttpResponse, web};
use chrono::NaiveDate;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    auth::{
        jwt::generate_access_token,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult},
    jobs,
    model::role::Role,
    models::{LoginReqDto, LoginResponse, RegisterReq, UserSql},
    utils::{email_cache, email_filter, validation::Validator},
};

/// true  => email AVAILABLE
/// false => email TAKEN
pub async fn is_email_available(email: &str, pool: &MySqlPool) -> AppResult<bool> {
    let email = email_filter::normalize(email);

    // Cuckoo filter: a miss means the email was never stored.
    if !email_filter::might_exist(&email) {
        return Ok(true);
    }

    if email_cache::is_taken(&email).await {
        return Ok(false);
    }

    let exists = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ? LIMIT 1)",
    )
    .bind(&email)
    .fetch_one(pool)
    .await?;

    if exists {
        email_cache::mark_taken(&email).await;
    }

    Ok(!exists)
}

/// Records a freshly stored email in the filter and the cache.
pub async fn remember_email(email: &str) {
    email_filter::insert(email);
    email_cache::mark_taken(email).await;
}

pub fn validate_registration(req: &RegisterReq) -> AppResult<NaiveDate> {
    let mut v = Validator::new();

    v.email("email", &req.email);
    v.length("password", &req.password, 6, 20);
    v.length("firstName", &req.first_name, 2, 40);
    v.length("lastName", &req.last_name, 2, 40);
    v.length("middleName", &req.middle_name, 2, 40);
    let birth_date = v.date("birthDate", &req.birth_date);
    v.length("phone", &req.phone, 1, 50);
    v.length("programmingLanguage", &req.programming_language, 1, 100);

    v.finish()?;
    birth_date.ok_or_else(|| AppError::validation("birthDate must be a date in YYYY-MM-DD format"))
}

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterReq,
    responses(
        (status = 201, description = "User registered", body = Object, example = json!({
            "message": "User registered successfully",
            "userId": 12
        })),
        (status = 400, description = "Validation failed or email already used", body = Object, example = json!({
            "error": "User with this email already exists"
        })),
        (status = 403, description = "Wrong secret word for admin registration", body = Object, example = json!({
            "error": "Invalid secret word"
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_register", skip(req, pool, config), fields(email = %req.email))]
pub async fn register(
    req: web::Json<RegisterReq>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    let birth_date = validate_registration(&req)?;

    let role = req.role.unwrap_or_default();
    if role == Role::Admin && req.secret_word.as_deref() != Some(config.admin_secret_word.as_str())
    {
        warn!("Admin registration with wrong secret word");
        return Err(AppError::Forbidden("Invalid secret word".into()));
    }

    let email = email_filter::normalize(&req.email);
    if !is_email_available(&email, pool.get_ref()).await? {
        return Err(AppError::BadRequest(
            "User with this email already exists".into(),
        ));
    }

    let hashed = hash_password(&req.password)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;
    let today = jobs::today();

    let result = sqlx::query(
        r#"
        INSERT INTO users
        (first_name, last_name, middle_name, birth_date, phone, email,
         programming_language, password, role, hire_date, last_salary_increase_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.middle_name.trim())
    .bind(birth_date)
    .bind(req.phone.trim())
    .bind(&email)
    .bind(req.programming_language.trim())
    .bind(hashed)
    .bind(role.as_ref())
    .bind(today)
    .bind(today)
    .execute(pool.get_ref())
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

    remember_email(&email).await;
    info!(user_id, %role, "User registered");

    Ok(HttpResponse::Created().json(json!({
        "message": "User registered successfully",
        "userId": user_id
    })))
}

/// Log in and receive an access token
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 400, description = "Invalid credentials", body = Object, example = json!({
            "error": "Invalid credentials"
        }))
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_login", skip(pool, config, user), fields(email = %user.email))]
pub async fn login(
    user: web::Json<LoginReqDto>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    if user.email.trim().is_empty() || user.password.is_empty() {
        return Err(AppError::Validation(vec![
            "Email and password are required".into(),
        ]));
    }

    let email = email_filter::normalize(&user.email);

    let db_user = sqlx::query_as::<_, UserSql>(
        r#"
        SELECT id, email, password, role
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(&email)
    .fetch_optional(pool.get_ref())
    .await?;

    let Some(db_user) = db_user else {
        info!("Invalid credentials: user not found");
        return Err(AppError::BadRequest("Invalid credentials".into()));
    };

    if let Err(e) = verify_password(&user.password, &db_user.password) {
        info!(error = %e, "Invalid credentials: password mismatch");
        return Err(AppError::BadRequest("Invalid credentials".into()));
    }

    debug!(user_id = db_user.id, "Password verified");

    let token = generate_access_token(
        db_user.id,
        &db_user.email,
        db_user.role,
        &config.jwt_secret,
        config.access_token_ttl,
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))?;

    // Not fatal for the login itself.
    if let Err(e) = sqlx::query("UPDATE users SET last_login_date = NOW() WHERE id = ?")
        .bind(db_user.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login_date");
    }

    email_cache::mark_taken(&db_user.email).await;
    info!(user_id = db_user.id, "Login successful");

    Ok(HttpResponse::Ok().json(LoginResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::json_error_handler;
    use actix_web::{App, http::StatusCode, test};
    use crate::api::testing::lazy_pool;

    fn valid_request() -> RegisterReq {
        RegisterReq {
            email: "Jane.Roe@Company.com".into(),
            password: "s3cret!".into(),
            first_name: "Jane".into(),
            last_name: "Roe".into(),
            middle_name: "Marie".into(),
            birth_date: "1994-03-02".into(),
            phone: "+15550100".into(),
            programming_language: "Rust".into(),
            role: None,
            secret_word: None,
        }
    }

    #[::core::prelude::v1::test]
    fn valid_registration_passes() {
        let birth = validate_registration(&valid_request()).unwrap();
        assert_eq!(birth, NaiveDate::from_ymd_opt(1994, 3, 2).unwrap());
    }

    #[::core::prelude::v1::test]
    fn every_bad_field_is_reported() {
        let req = RegisterReq {
            email: "nope".into(),
            password: "123".into(),
            birth_date: "02.03.1994".into(),
            ..valid_request()
        };
        let Err(AppError::Validation(errors)) = validate_registration(&req) else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("email")));
        assert!(errors.iter().any(|e| e.starts_with("password")));
        assert!(errors.iter().any(|e| e.starts_with("birthDate")));
    }

    #[::core::prelude::v1::test]
    fn missing_fields_are_required() {
        let Err(AppError::Validation(errors)) = validate_registration(&RegisterReq::default())
        else {
            panic!("expected validation error");
        };
        assert!(errors.contains(&"firstName is required".to_string()));
        assert!(errors.contains(&"phone is required".to_string()));
    }

    #[actix_web::test]
    async fn admin_registration_needs_secret_word() {
        // The request is rejected before any query runs.
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(Config::for_tests()))
                .app_data(web::JsonConfig::default().error_handler(json_error_handler))
                .route("/auth/register", web::post().to(register)),
        )
        .await;

        let mut body = json!({
            "email": "boss@company.com",
            "password": "s3cret!",
            "firstName": "Big",
            "lastName": "Boss",
            "middleName": "The",
            "birthDate": "1980-01-01",
            "phone": "+15550101",
            "programmingLanguage": "Rust",
            "role": "admin",
            "secretWord": "guess"
        });

        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        body["birthDate"] = json!("yesterday");
        let req = test::TestRequest::post()
            .uri("/auth/register")
            .set_json(&body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
