use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use campus_api::{
    config::Config, db, middleware::auth::JwtSecret, routes, services,
    services::notifications::NotificationService, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let notifications = Arc::new(NotificationService::new(config.fcm_api_key.clone()));

    services::metrics::start(pool.clone());

    let state = AppState {
        db: pool,
        config: config.clone(),
        notifications,
    };

    // Build CORS: allow the app base domain. In development (localhost),
    // all origins are allowed.
    let base_url = config.app_base_url.clone();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let o = match origin.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        };
        if o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") {
            return true;
        }
        o == base_url
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    let jwt_secret = JwtSecret(config.jwt_secret.clone());

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/auth/push-token", post(routes::auth::register_push_token))
        // Students & classes
        .route("/students", get(routes::students::list_students).post(routes::students::create_student))
        .route("/students/{id}", put(routes::students::update_student))
        .route("/classes", get(routes::students::list_classes))
        // Shuttle transport
        .route("/transport/slots", get(routes::transport::list_slots))
        .route("/transport/vehicles", get(routes::transport::list_vehicles))
        .route("/transport/roster", get(routes::transport::get_roster))
        // Absence requests
        .route("/absences", post(routes::absences::create_request))
        .route("/absences/pending", get(routes::absences::list_pending))
        .route("/absences/mine", get(routes::absences::list_mine))
        .route("/absences/{id}/review", post(routes::absences::review_request))
        // Commitment board
        .route("/commitments/board", get(routes::commitments::get_board))
        .route("/commitments/advance", post(routes::commitments::advance_cell))
        .route("/commitments/send-to-parents", post(routes::commitments::send_to_parents))
        // Notices
        .route("/notices", get(routes::notices::list_notices).post(routes::notices::create_notice))
        .route("/notices/{id}", delete(routes::notices::deactivate_notice))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("campus API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
