use crate::auth::auth::AuthUser;
use crate::auth::jwt::{TokenError, expired_at, verify_token};
use crate::config::Config;
use crate::model::role::Role;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use chrono::DateTime;
use serde_json::json;
use sqlx::MySqlPool;
use tracing::{debug, error};

fn reject(req: ServiceRequest, resp: HttpResponse) -> Result<ServiceResponse<BoxBody>, Error> {
    Ok(req.into_response(resp.map_into_boxed_body()))
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned);

    let Some(token) = token else {
        return reject(
            req,
            HttpResponse::Unauthorized().json(json!({"error": "Token not provided"})),
        );
    };

    let claims = match verify_token(&token, &config.jwt_secret) {
        Ok(c) => c,
        Err(TokenError::Expired) => {
            let expired = expired_at(&token, &config.jwt_secret)
                .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
                .map(|dt| dt.to_rfc3339());
            return reject(
                req,
                HttpResponse::Unauthorized()
                    .json(json!({"error": "Token expired", "expiredAt": expired})),
            );
        }
        Err(TokenError::NotYetValid) => {
            return reject(
                req,
                HttpResponse::Forbidden().json(json!({"error": "Token not active yet"})),
            );
        }
        Err(e) => {
            debug!(error = %e, "Rejected bearer token");
            return reject(
                req,
                HttpResponse::Forbidden().json(json!({"error": "Invalid token"})),
            );
        }
    };

    let pool = req
        .app_data::<Data<MySqlPool>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Database pool missing"))?
        .clone();

    // The role may have changed since the token was issued; trust the database.
    let row = sqlx::query_as::<_, (String, String)>("SELECT email, role FROM users WHERE id = ?")
        .bind(claims.user_id)
        .fetch_optional(pool.get_ref())
        .await;

    let (email, role) = match row {
        Ok(Some((email, role))) => (email, role),
        Ok(None) => {
            return reject(
                req,
                HttpResponse::Unauthorized().json(json!({"error": "User not found"})),
            );
        }
        Err(e) => {
            error!(error = %e, user_id = claims.user_id, "Failed to load token owner");
            return reject(
                req,
                HttpResponse::InternalServerError().json(json!({"error": "Internal server error"})),
            );
        }
    };

    let Some(role) = Role::from_db(&role) else {
        return reject(
            req,
            HttpResponse::Unauthorized().json(json!({"error": "Invalid role"})),
        );
    };

    req.extensions_mut().insert(AuthUser {
        user_id: claims.user_id,
        email,
        role,
    });

    next.call(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::expired_token;
    use actix_web::{App, HttpResponse, http::StatusCode, middleware::from_fn, test, web};

    async fn ok() -> HttpResponse {
        HttpResponse::Ok().finish()
    }

    macro_rules! guarded_app {
        () => {
            test::init_service(
                App::new()
                    .app_data(Data::new(Config::for_tests()))
                    .service(
                        web::scope("/api")
                            .wrap(from_fn(auth_middleware))
                            .route("/users", web::get().to(ok)),
                    ),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn missing_token_is_unauthorized() {
        let app = guarded_app!();
        let req = test::TestRequest::get().uri("/api/users").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Token not provided");
    }

    #[actix_web::test]
    async fn expired_token_is_unauthorized_with_timestamp() {
        let app = guarded_app!();
        let token = expired_token(1, Role::Admin, &Config::for_tests().jwt_secret);
        let req = test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Token expired");
        assert!(body["expiredAt"].is_string());
    }

    #[actix_web::test]
    async fn malformed_token_is_forbidden() {
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", "Bearer invalid.token.here"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid token");
    }

    #[actix_web::test]
    async fn non_bearer_scheme_counts_as_missing() {
        let app = guarded_app!();
        let req = test::TestRequest::get()
            .uri("/api/users")
            .insert_header(("Authorization", "Basic dXNlcjpwYXNz"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }
}
