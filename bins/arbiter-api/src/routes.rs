use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/attempts", post(handlers::start_attempt))
        .route("/attempts/:attempt_id", get(handlers::get_attempt))
        .route(
            "/attempts/:attempt_id/submissions",
            post(handlers::submit_for_attempt),
        )
        .route("/submissions", post(handlers::submit_practice))
        .route(
            "/job/:job_id",
            get(handlers::get_job_result).delete(handlers::cancel_job),
        )
        .route(
            "/assets",
            post(handlers::upload_asset).delete(handlers::delete_asset),
        )
        .route("/assets/presign", get(handlers::presign_asset))
        .route("/files/*key", get(handlers::serve_file))
        .route("/status", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
}
