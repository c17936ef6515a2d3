//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        .route("/v1/capabilities", get(handlers::get_capabilities))
        // Upload control plane
        .route("/v1/uploads", post(handlers::create_upload))
        .route(
            "/v1/uploads/{upload_id}",
            get(handlers::get_upload).delete(handlers::abort_upload),
        )
        .route(
            "/v1/uploads/{upload_id}/chunks/{chunk_index}",
            put(handlers::upload_chunk),
        )
        .route(
            "/v1/uploads/{upload_id}/progress",
            get(handlers::get_progress),
        )
        // File catalog
        .route("/v1/files", get(handlers::list_files))
        .route("/v1/files/{upload_id}", delete(handlers::delete_file))
        .route(
            "/v1/files/{upload_id}/download",
            get(handlers::download_file),
        )
        .route("/v1/files/{upload_id}/rename", post(handlers::rename_file))
        .route(
            "/v1/files/{upload_id}/tags",
            get(handlers::get_file_tags).put(handlers::set_file_tags),
        )
        // Tags
        .route(
            "/v1/tags",
            get(handlers::list_tags).post(handlers::create_tag),
        )
        .route("/v1/tags/{tag_id}", delete(handlers::delete_tag));

    let mut router = Router::new().merge(api_routes);

    // When enabled, restrict /metrics to the Prometheus scraper at the
    // network level.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
