//! Clinic API router.
//!
//! Middleware stack (outermost → innermost):
//! Extension(ApiContext) → audit → auth → handler.
//!
//! Extension must be outermost so both middleware layers can access the
//! shared context; audit sits outside auth so rejected requests are
//! recorded too.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::AppCore;

pub fn clinic_api_router(core: Arc<AppCore>) -> Router {
    let ctx = ApiContext::new(core);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    Router::new()
        .route("/test-requests", post(endpoints::test_requests::create))
        .route("/test-requests", get(endpoints::test_requests::list))
        .route("/test-requests/:id", get(endpoints::test_requests::get))
        .route(
            "/test-requests/:id/billing/generate",
            put(endpoints::test_requests::generate_bill),
        )
        .route(
            "/test-requests/:id/billing/paid",
            put(endpoints::test_requests::mark_paid),
        )
        .route(
            "/test-requests/:id/assign",
            put(endpoints::test_requests::assign),
        )
        .route(
            "/test-requests/:id/schedule-collection",
            put(endpoints::test_requests::schedule_collection),
        )
        .route(
            "/test-requests/:id/collection-status",
            put(endpoints::test_requests::collection_status),
        )
        .route(
            "/test-requests/:id/start-testing",
            put(endpoints::test_requests::start_testing),
        )
        .route(
            "/test-requests/:id/complete-testing",
            put(endpoints::test_requests::complete_testing),
        )
        .route(
            "/test-requests/:id/generate-report",
            put(endpoints::reports::generate),
        )
        .route(
            "/test-requests/:id/send-report",
            put(endpoints::test_requests::send_report),
        )
        .route(
            "/test-requests/:id/status",
            put(endpoints::test_requests::update_status),
        )
        .route(
            "/test-requests/:id/cancel",
            put(endpoints::test_requests::cancel),
        )
        .route(
            "/test-requests/:id",
            delete(endpoints::test_requests::delete),
        )
        .route(
            "/superadmin/doctors/working/test-request/:id/review",
            post(endpoints::review::review),
        )
        .route(
            "/test-requests/report-status/:id",
            get(endpoints::reports::status),
        )
        .route(
            "/test-requests/download-report/:id",
            get(endpoints::reports::download),
        )
        .route("/notifications", get(endpoints::notifications::list))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        .layer(axum::middleware::from_fn(middleware::audit::log_request))
        .layer(axum::Extension(ctx))
        .layer(CorsLayer::permissive())
}
