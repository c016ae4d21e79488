use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod stores;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest(
            "/api/v1",
            api_routes().layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::auth::identity_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/questions",
            get(handlers::questions::list_questions).post(handlers::questions::create_question),
        )
        .nest("/user", user_routes())
        .nest("/quiz/sessions", session_routes())
}

fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/questions", get(handlers::questions::list_my_questions))
        .route("/progress", post(handlers::user::save_progress))
        .route("/score", post(handlers::user::save_score))
        .route("/dashboard", get(handlers::user::dashboard))
}

fn session_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::sessions::start_session))
        .route("/{id}", get(handlers::sessions::get_session))
        .route("/{id}/answers", post(handlers::sessions::submit_answer))
        .route("/{id}/tick", post(handlers::sessions::tick_session))
        .route("/{id}/next", post(handlers::sessions::next_question))
        .route("/{id}/restart", post(handlers::sessions::restart_session))
        .route("/{id}/stream", get(handlers::sse::session_stream))
}
