//! Superadmin doctor review endpoint.
//!
//! The path is the one established clients already call; keep it
//! verbatim.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::directory::StaffUser;
use crate::models::test_request::TestRequest;
use crate::workflow::{Engine, ReviewInput};

/// `POST /superadmin/doctors/working/test-request/:id/review`
pub async fn review(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReviewInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).review(&actor, id, input)?))
}
