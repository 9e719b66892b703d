//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, hashes it, resolves the
//! session to an active staff user, and injects `StaffUser` into request
//! extensions for downstream handlers. The actor is also attached to the
//! response extensions so the outer audit layer can attribute the access.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{hash_token, ApiContext};
use crate::db::repository::audit::resolve_session;

pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let conn = ctx.core.open_db()?;
    let actor = resolve_session(&conn, &hash_token(&token))?.ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(actor.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(actor);
    Ok(response)
}
