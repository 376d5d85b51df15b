use std::time::Duration;

use actix_web::middleware::{Logger, NormalizePath};
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod excel;
mod fiscal;
mod model;
mod models;
mod routes;
mod services;
mod store;
mod utils;

use config::Config;
use db::init_db;
use routes::Limiters;
use services::summary::SummaryCache;

use crate::docs::ApiDoc;
use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "YuKyu leave service"
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(
        addr = %config.server_addr,
        deduction = %config.leave.deduction_policy,
        carryover_cap = config.leave.carryover_cap_days,
        fiscal_start_month = config.leave.fiscal_year_start_month,
        "Server starting..."
    );

    let pool = Data::new(init_db(&config.database_url).await?);
    let limiters = Limiters::from_config(&config)?;
    let summaries = Data::new(SummaryCache::new(Duration::from_secs(
        config.summary_cache_ttl_secs,
    )));
    let policy = Data::new(config.leave.clone());
    let server_addr = config.server_addr.clone();
    let config = Data::new(config);

    HttpServer::new(move || {
        let routes_config = config.clone();
        let routes_limiters = limiters.clone();
        App::new()
            .wrap(Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard so JS/CSS assets match
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(pool.clone())
            .app_data(config.clone())
            .app_data(policy.clone())
            .app_data(summaries.clone())
            .service(index)
            // Configure auth + protected routes with rate limiting
            .configure(move |cfg| routes::configure(cfg, &routes_config, &routes_limiters))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind {server_addr}"))?
    .run()
    .await?;

    Ok(())
}
