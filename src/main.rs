pub mod api;
mod config;
mod gtfs;

use std::path::Path;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use gtfs::schedule::ScheduleIndex;
use gtfs::static_data::load_tables;
use gtfs::DepartureBoard;

#[derive(OpenApi)]
#[openapi(
    info(title = "Live Departure Board API", version = "0.1.0"),
    paths(
        api::station::get_station_board,
        api::stations::list_stations,
        api::stations::lookup_stop,
        api::refresh::refresh_feed,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::station::StationBoardResponse,
        api::stations::StationSummary,
        api::stations::StationListResponse,
        api::stations::StopLookupResponse,
        api::refresh::RefreshResponse,
        api::health::HealthResponse,
        gtfs::DepartureRecord,
        gtfs::EventType,
    )),
    tags(
        (name = "board", description = "Live departure boards"),
        (name = "stations", description = "Station and stop metadata"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string());
    let config = Config::load(&config_path).expect("Failed to load config");
    config.validate().expect("Invalid config");
    tracing::info!(
        feed = %config.board.realtime_feed_url,
        timezone = %config.board.timezone,
        "Loaded configuration"
    );

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    let client = reqwest::Client::builder()
        .user_agent("liveboard/0.1.0")
        .build()
        .expect("Failed to build HTTP client");

    // Load static GTFS tables and build the schedule index
    let tables = load_tables(
        &client,
        Path::new(&config.board.static_dir),
        config.board.static_base_url.as_deref(),
    )
    .await;
    let index = Arc::new(ScheduleIndex::build(&tables));

    let board = Arc::new(DepartureBoard::new(config.board.clone(), client, index));

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(board))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!("Server running on http://{}", config.bind_addr);
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Live Departure Board API"
}
