use actix_cors::Cors;
use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer, http::header};

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod jobs;
mod model;
mod models;
mod routes;
mod utils;

use config::Config;
use db::{ensure_default_admin, init_db};

use crate::docs::ApiDoc;
use crate::routes::RateLimiters;
use crate::utils::{email_cache, email_filter};
use tracing::{error, info};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

fn cors(origin: &str) -> Cors {
    let cors = Cors::default()
        .allowed_methods(["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
        .allowed_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(3600);

    if origin == "*" {
        cors.allow_any_origin()
    } else {
        cors.allowed_origin(origin)
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = Config::from_env().map_err(std::io::Error::other)?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    info!("Server starting...");

    let pool = init_db(&config).await.map_err(|e| {
        error!(error = %e, "Database initialisation failed");
        std::io::Error::other(e)
    })?;

    if let Err(e) = ensure_default_admin(&pool, &config).await {
        error!(error = %e, "Failed to create default admin");
    }

    let pool_for_filter_warmup = pool.clone();
    let pool_for_cache_warmup = pool.clone();

    actix_web::rt::spawn(async move {
        if let Err(e) = email_filter::warmup_email_filter(&pool_for_filter_warmup, 100).await {
            error!(error = %e, "Failed to warm up email filter");
        }
    });

    actix_web::rt::spawn(async move {
        // Users seen in the last 30 days, in batches of 250
        if let Err(e) = email_cache::warmup_email_cache(&pool_for_cache_warmup, 30, 250).await {
            error!(error = %e, "Failed to warm up email cache");
        }
    });

    let mut scheduler = jobs::schedule::start_scheduler(pool.clone(), &config)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to start notification scheduler");
            std::io::Error::other(e)
        })?;

    let server_addr = config.server_addr.clone();
    let limiters = RateLimiters::from_config(&config.rate);
    let config_data = Data::new(config);
    let pool_data = Data::new(pool);

    info!(addr = %server_addr, "Listening");

    let result = HttpServer::new(move || {
        let config = config_data.clone();
        let limiters = limiters.clone();

        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .wrap(cors(&config.cors_origin))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool_data.clone())
            .app_data(config.clone())
            .configure(|cfg| routes::configure(cfg, &config, &limiters))
    })
    .bind(server_addr)?
    .run()
    .await;

    if let Err(e) = scheduler.shutdown().await {
        error!(error = %e, "Failed to stop notification scheduler");
    }
    info!("Server stopped");

    result
}
