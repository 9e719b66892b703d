//! Access-audit middleware.
//!
//! Writes one audit row per request: actor, method + path, response
//! status. Runs outside auth so rejected requests are recorded too; the
//! actor comes from the response extensions auth attaches on success.
//! Audit writes never fail the request.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ApiContext;
use crate::db::repository::audit::log_access;
use crate::models::directory::StaffUser;

pub async fn log_request(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let ctx = req.extensions().get::<ApiContext>().cloned();

    let response = next.run(req).await;

    if let Some(ctx) = ctx {
        let actor = response
            .extensions()
            .get::<StaffUser>()
            .map(|u| u.id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());
        let status = response.status().as_u16();
        let outcome = format!("status:{status}");
        let result = ctx
            .core
            .open_db()
            .and_then(|conn| log_access(&conn, &actor, &format!("{method} {path}"), &outcome));
        if let Err(e) = result {
            tracing::warn!(actor, "audit write failed: {e}");
        }
    }

    response
}
