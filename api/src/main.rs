mod config;
mod constants;
mod domain;
mod gemini;
mod models;
mod routes;
mod services;
mod slides;
mod speech;
mod storage;
#[cfg(test)]
mod testing;

use axum::http::Method;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use google_cloud_storage::client::Storage;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, StorageConfig};
use gemini::GeminiClient;
use services::assessments::TestService;
use services::auth::AuthService;
use services::books::BookService;
use services::catalog::{Catalog, PgCatalog};
use services::chapters::ChapterService;
use services::classes::ClassService;
use services::content::ContentGenerator;
use services::in_flight::InFlight;
use services::rate_limit::GENERATION_RATE_LIMITER;
use slides::SlideSpeakClient;
use speech::SpeechClient;
use storage::{DiskStore, GcsStore, ObjectRef, ObjectStore};

pub struct AppState {
    pub db: PgPool,
    pub auth: AuthService,
    pub classes: ClassService,
    pub books: BookService,
    pub chapters: Arc<ChapterService>,
    pub tests: TestService,
}

async fn build_store(config: &AppConfig) -> Arc<dyn ObjectStore> {
    match &config.storage {
        StorageConfig::Gcs { bucket } => {
            // GCS client uses GOOGLE_APPLICATION_CREDENTIALS env var
            let client = Storage::builder()
                .build()
                .await
                .expect("Failed to create GCS client");
            tracing::info!(%bucket, "Using GCS storage");
            Arc::new(GcsStore::new(
                client,
                bucket.clone(),
                config.public_base_url.clone(),
            ))
        }
        StorageConfig::Local { root, bucket } => {
            tracing::info!(root = %root.display(), "Using local disk storage");
            Arc::new(DiskStore::new(
                root.clone(),
                bucket.clone(),
                config.public_base_url.clone(),
            ))
        }
    }
}

/// `SUMMARY_TEMPLATE_OBJECT` is either a `gs://` reference or a name in our bucket.
fn summary_template(config: &AppConfig) -> Option<ObjectRef> {
    let name = config.summary_template_object.as_deref()?;
    if name.starts_with("gs://") {
        return Some(ObjectRef::parse(name).expect("Invalid SUMMARY_TEMPLATE_OBJECT"));
    }
    let bucket = match &config.storage {
        StorageConfig::Gcs { bucket } | StorageConfig::Local { bucket, .. } => bucket,
    };
    Some(ObjectRef::new(bucket.as_str(), name))
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chapterwise_api=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // External clients are built once and shared by every service
    let store = build_store(&config).await;
    let model = Arc::new(GeminiClient::new(&config.gemini));
    let speech = Arc::new(SpeechClient::new(&config.speech));
    let renderer = Arc::new(SlideSpeakClient::new(&config.slides));

    let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(pool.clone()));
    let content = Arc::new(ContentGenerator::new(model, store.clone()));
    let in_flight = Arc::new(InFlight::new());

    let chapters = Arc::new(ChapterService::new(
        catalog.clone(),
        store.clone(),
        content.clone(),
        speech,
        renderer,
        config.poll,
        in_flight.clone(),
        summary_template(&config),
    ));

    let state = Arc::new(AppState {
        auth: AuthService::new(pool.clone(), config.jwt_secret.clone()),
        classes: ClassService::new(pool.clone()),
        books: BookService::new(catalog.clone(), store, content.clone()),
        tests: TestService::new(catalog, chapters.clone(), content, in_flight),
        chapters,
        db: pool,
    });

    tokio::spawn(async {
        let mut tick = tokio::time::interval(Duration::from_secs(10 * 60));
        loop {
            tick.tick().await;
            GENERATION_RATE_LIMITER.cleanup(Duration::from_secs(60 * 60));
        }
    });

    let app = routes::build_routes()
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!(%addr, "Listening");
    // Peer addresses feed the per-IP rate limiter on the auth routes
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server failed");
}
