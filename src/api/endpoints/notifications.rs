//! Notification feed endpoint.

use axum::extract::State;
use axum::{Extension, Json};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::db::repository::notification::list_for_recipient;
use crate::models::directory::StaffUser;
use crate::models::notification::Notification;

/// `GET /notifications` — the caller's own notifications, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(list_for_recipient(&conn, actor.id)?))
}
