//! Test request lifecycle endpoints.
//!
//! Thin handlers: open a connection, hand the authenticated actor and
//! parsed input to the engine, serialize the updated request. All guard
//! and authorization logic lives in the engine.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::directory::StaffUser;
use crate::models::test_request::TestRequest;
use crate::workflow::{
    AssignLabStaffInput, CancelInput, CollectionStatusInput, CompleteTestingInput,
    CreateTestRequest, Engine, GenerateBillInput, MarkBillPaidInput, ScheduleCollectionInput,
    SendReportInput, StartTestingInput, StatusOverrideInput,
};

/// `POST /test-requests`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Json(input): Json<CreateTestRequest>,
) -> Result<(StatusCode, Json<TestRequest>), ApiError> {
    let conn = ctx.core.open_db()?;
    let tr = Engine::new(&conn).create(&actor, input)?;
    Ok((StatusCode::CREATED, Json(tr)))
}

/// `GET /test-requests`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
) -> Result<Json<Vec<TestRequest>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).list(&actor)?))
}

/// `GET /test-requests/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).get(&actor, id)?))
}

/// `PUT /test-requests/:id/billing/generate`
pub async fn generate_bill(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<GenerateBillInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).generate_bill(&actor, id, input)?))
}

/// `PUT /test-requests/:id/billing/paid`
///
/// The body is optional; `{"status": "payment_received"}` is accepted as
/// a synonym for `paid`.
pub async fn mark_paid(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    input: Option<Json<MarkBillPaidInput>>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    let input = input.map(|Json(i)| i).unwrap_or_default();
    Ok(Json(Engine::new(&conn).mark_bill_paid(&actor, id, input)?))
}

/// `PUT /test-requests/:id/assign`
pub async fn assign(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<AssignLabStaffInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).assign_lab_staff(&actor, id, input)?))
}

/// `PUT /test-requests/:id/schedule-collection`
pub async fn schedule_collection(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleCollectionInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(
        Engine::new(&conn).schedule_sample_collection(&actor, id, input)?,
    ))
}

/// `PUT /test-requests/:id/collection-status`
pub async fn collection_status(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<CollectionStatusInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(
        Engine::new(&conn).update_sample_collection_status(&actor, id, input)?,
    ))
}

/// `PUT /test-requests/:id/start-testing`
pub async fn start_testing(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<StartTestingInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).start_lab_testing(&actor, id, input)?))
}

/// `PUT /test-requests/:id/complete-testing`
pub async fn complete_testing(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<CompleteTestingInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(
        Engine::new(&conn).complete_lab_testing(&actor, id, input)?,
    ))
}

/// `PUT /test-requests/:id/send-report`
pub async fn send_report(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<SendReportInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).send_report(&actor, id, input)?))
}

/// `PUT /test-requests/:id/status` — raw status override.
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<StatusOverrideInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).update_status(&actor, id, input)?))
}

/// `PUT /test-requests/:id/cancel`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<CancelInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).cancel(&actor, id, input)?))
}

/// `DELETE /test-requests/:id` — soft delete.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let conn = ctx.core.open_db()?;
    Engine::new(&conn).delete(&actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}
