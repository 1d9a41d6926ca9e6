use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use dotenvy::dotenv;
use std::sync::Arc;

use precore::clock::{Clock, SystemClock, local_day};
use precore::config::Config;
use precore::db::init_db;
use precore::docs::ApiDoc;
use precore::engine::AttendanceEngine;
use precore::repo::MySqlLedgerStore;
use precore::utils::report_cache;
use precore::{routes, sweep};

use tracing::info;
use tracing_appender::rolling;
use utoipa::OpenApi; // ← needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "Precore Running Smoothly!"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!("Server starting...");

    let pool = init_db(&config.database_url).await;

    let store: Arc<MySqlLedgerStore> = Arc::new(MySqlLedgerStore::new(pool));
    let clock = Arc::new(SystemClock);
    let offset = config.reference_offset();
    let engine = AttendanceEngine::new(
        store.clone(),
        clock.clone(),
        config.geofence_policy(),
        offset,
    );

    let server_addr = config.server_addr.clone();
    let config_data = config.clone();

    let warmup_store = store.clone();
    let warmup_today = local_day(clock.now(), offset);
    let warmup_days = config.report_cache_warmup_days;
    actix_web::rt::spawn(async move {
        if let Err(e) =
            report_cache::warmup_report_cache(warmup_store.as_ref(), warmup_today, warmup_days)
                .await
        {
            eprintln!("Failed to warmup report cache: {:?}", e);
        }
    });

    let sweep_store = store.clone();
    let sweep_clock = clock.clone();
    actix_web::rt::spawn(async move {
        sweep::run_scheduler(sweep_store, sweep_clock, offset).await;
    });

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← important: wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::new(engine.clone()))
            .app_data(Data::new(config.clone()))
            .service(index)
            // Configure protected routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config_data.clone()))
    })
    .bind(server_addr)?
    .run()
    .await
}
