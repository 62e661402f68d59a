use std::sync::Arc;

use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::ConfigError, error::expose_error_detail, handler::*, middleware::mw_require_auth,
    AppState,
};

pub fn create_router(app_state: Arc<AppState>) -> Result<Router, ConfigError> {
    let origin = app_state.config.cors_origin_header()?;

    // Configure CORS settings for the application
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_credentials(true)
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE]);

    let development = app_state.config.development;

    let app = Router::new()
        .route("/api/todos", get(get_todos).post(create_todo))
        .route(
            "/api/todos/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route_layer(from_fn_with_state(app_state.clone(), mw_require_auth))
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/health", get(health_checker_handler))
        .fallback(route_not_found)
        .with_state(app_state);

    let app = if development {
        app.layer(from_fn(expose_error_detail))
    } else {
        app
    };

    Ok(app.layer(TraceLayer::new_for_http()).layer(cors))
}
