//! HTTP route definitions

use crate::{auth, handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

/// Create the main router
///
/// Requests pass request id, logging, panic recovery and admission control,
/// in that order, before reaching a route. Authorization is applied per route.
pub fn create_router(state: Arc<AppState>) -> Router {
    let admin_only = axum_middleware::from_fn_with_state(Arc::clone(&state), auth::require_admin);

    let router = Router::new()
        .route("/v1/healthcheck", get(handlers::health_check))
        .route("/v1/customers", post(handlers::register_customer))
        .route("/v1/customers/login", post(handlers::login_customer))
        .route(
            "/v1/admins",
            post(handlers::register_admin).route_layer(admin_only.clone()),
        )
        .route("/v1/admins/login", post(handlers::login_admin))
        .route(
            "/v1/furniture/images",
            post(handlers::upload_furniture_images).route_layer(admin_only),
        )
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size));

    let router = if state.config.cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router
        .layer(
            ServiceBuilder::new()
                .layer(axum_middleware::from_fn(middleware::request_id_middleware))
                .layer(axum_middleware::from_fn(middleware::logging_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(middleware::recover_panic))
                .layer(TimeoutLayer::new(state.config.request_timeout()))
                .layer(axum_middleware::from_fn_with_state(
                    Arc::clone(&state),
                    middleware::admission_middleware,
                )),
        )
        .with_state(state)
}
