//! Report generation, status, and download endpoints.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::directory::StaffUser;
use crate::models::test_request::TestRequest;
use crate::report::PdfReportStore;
use crate::workflow::{Engine, GenerateReportInput, ReportStatusView};

/// `PUT /test-requests/:id/generate-report`
pub async fn generate(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<GenerateReportInput>,
) -> Result<Json<TestRequest>, ApiError> {
    let conn = ctx.core.open_db()?;
    let store = PdfReportStore::new(ctx.core.reports_dir());
    Ok(Json(
        Engine::new(&conn).generate_report(&actor, id, input, &store)?,
    ))
}

/// `GET /test-requests/report-status/:id`
pub async fn status(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReportStatusView>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(Engine::new(&conn).report_status(
        &actor,
        id,
        &ctx.core.reports_dir(),
    )?))
}

/// `GET /test-requests/download-report/:id` — streams the PDF artifact.
pub async fn download(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<StaffUser>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let conn = ctx.core.open_db()?;
    let (tr, path) = Engine::new(&conn).download_report(&actor, id, &ctx.core.reports_dir())?;

    let bytes =
        std::fs::read(&path).map_err(|e| ApiError::Internal(format!("report read: {e}")))?;
    let filename = format!("test-report-{}.pdf", tr.id);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
