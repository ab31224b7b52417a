use crate::{
    api::{health, notification, project, user},
    auth::{handlers, middleware::auth_middleware},
    config::{Config, RateLimits},
    error::{json_error_handler, path_error_handler, query_error_handler},
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};
use std::sync::Arc;

type Limiter = Arc<Governor<PeerIpKeyExtractor, NoOpMiddleware>>;

/// Per-IP limiter allowing `requests_per_min` with an equal burst.
fn build_limiter(requests_per_min: u32) -> Limiter {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);

    let cfg = GovernorConfigBuilder::default()
        .milliseconds_per_request(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();

    Arc::new(Governor::new(&cfg))
}

/// Built once in `main` and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    login: Limiter,
    register: Limiter,
    protected: Limiter,
}

impl RateLimiters {
    pub fn from_config(rate: &RateLimits) -> Self {
        Self {
            login: build_limiter(rate.login_per_min),
            register: build_limiter(rate.register_per_min),
            protected: build_limiter(rate.protected_per_min),
        }
    }
}

/// Extractor failures render as `{"errors": [...]}` with status 400.
pub fn extractor_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error_handler))
        .app_data(web::QueryConfig::default().error_handler(query_error_handler))
        .app_data(web::PathConfig::default().error_handler(path_error_handler));
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    extractor_configs(cfg);

    cfg.route("/health", web::get().to(health::health));

    // Public routes
    cfg.service(
        web::scope("/auth")
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(
                web::resource("/register")
                    .wrap(limiters.register.clone())
                    .route(web::post().to(handlers::register)),
            ),
    );

    // Protected routes
    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware)) // authentication
            .wrap(limiters.protected.clone()) // rate limiting
            .service(web::resource("/profile").route(web::get().to(user::profile)))
            .service(
                web::scope("/users")
                    // /users
                    .service(
                        web::resource("")
                            .route(web::get().to(user::list_users))
                            .route(web::post().to(user::create_user)),
                    )
                    // /users/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(user::get_user))
                            .route(web::put().to(user::update_user))
                            .route(web::delete().to(user::delete_user)),
                    ),
            )
            .service(
                web::scope("/projects")
                    // /projects
                    .service(
                        web::resource("")
                            .route(web::get().to(project::list_projects))
                            .route(web::post().to(project::create_project)),
                    )
                    // /projects/{id}
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(project::get_project))
                            .route(web::put().to(project::update_project))
                            .route(web::delete().to(project::delete_project)),
                    )
                    // /projects/{id}/employees
                    .service(
                        web::resource("/{id}/employees")
                            .route(web::get().to(project::list_project_employees))
                            .route(web::post().to(project::assign_employees)),
                    )
                    // /projects/{id}/employee
                    .service(
                        web::resource("/{id}/employee").route(web::post().to(project::add_employee)),
                    )
                    // /projects/{id}/employees/{employeeId}
                    .service(
                        web::resource("/{id}/employees/{employee_id}")
                            .route(web::delete().to(project::remove_employee)),
                    ),
            )
            .service(
                web::scope("/notifications")
                    // /notifications
                    .service(
                        web::resource("").route(web::get().to(notification::list_notifications)),
                    )
                    // /notifications/{id}/mark-as-read
                    .service(
                        web::resource("/{id}/mark-as-read")
                            .route(web::patch().to(notification::mark_as_read)),
                    ),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::lazy_pool;
    use actix_web::{App, http::StatusCode, test};

    #[actix_web::test]
    async fn protected_scope_requires_a_token() {
        let config = Config::for_tests();
        let limiters = RateLimiters::from_config(&config.rate);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, &config, &limiters)),
        )
        .await;

        for uri in ["/api/users", "/api/projects", "/api/notifications", "/api/profile"] {
            let req = test::TestRequest::get()
                .uri(uri)
                .peer_addr("127.0.0.1:40000".parse().unwrap())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[actix_web::test]
    async fn limiter_rejects_requests_past_the_burst() {
        let app = test::init_service(
            App::new().service(
                web::resource("/limited")
                    .wrap(build_limiter(2))
                    .route(web::get().to(health::health)),
            ),
        )
        .await;

        let mut statuses = Vec::new();
        for _ in 0..3 {
            let req = test::TestRequest::get()
                .uri("/limited")
                .peer_addr("127.0.0.1:40001".parse().unwrap())
                .to_request();
            statuses.push(test::call_service(&app, req).await.status());
        }

        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );
    }

    #[actix_web::test]
    async fn health_is_public() {
        let config = Config::for_tests();
        let limiters = RateLimiters::from_config(&config.rate);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(lazy_pool()))
                .app_data(web::Data::new(config.clone()))
                .configure(|cfg| configure(cfg, &config, &limiters)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
