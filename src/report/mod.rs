//! Report artifact generation and lookup.
//!
//! The engine talks to the store through a narrow trait so rendering can
//! later move off the request path without touching the workflow: status
//! only advances to `Report_Generated` once the artifact is durably
//! written.

pub mod pdf;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::test_request::TestRequest;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report rendering failed: {0}")]
    Render(String),

    #[error("report IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Renders a report artifact from a full request snapshot and returns
/// the stored file path.
pub trait ReportStore {
    fn render(
        &self,
        request: &TestRequest,
        summary: Option<&str>,
        interpretation: Option<&str>,
    ) -> Result<PathBuf, ReportError>;
}

/// PDF-on-disk store: one file per request under the reports directory.
pub struct PdfReportStore {
    reports_dir: PathBuf,
}

impl PdfReportStore {
    pub fn new(reports_dir: PathBuf) -> Self {
        Self { reports_dir }
    }
}

impl ReportStore for PdfReportStore {
    fn render(
        &self,
        request: &TestRequest,
        summary: Option<&str>,
        interpretation: Option<&str>,
    ) -> Result<PathBuf, ReportError> {
        let bytes = pdf::generate_report_pdf(request, summary, interpretation)?;
        std::fs::create_dir_all(&self.reports_dir)?;
        let path = self.reports_dir.join(format!("test-report-{}.pdf", request.id));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Resolve a stored report path against the filesystem.
///
/// Storage locations have not been stable historically, so the stored
/// string is tried through an ordered list of candidate strategies and
/// the first existing match wins: as stored (absolute), relative to the
/// working directory, then by filename under the reports directory.
pub fn resolve_report_path(stored: &str, reports_dir: &Path) -> Option<PathBuf> {
    let stored_path = PathBuf::from(stored);

    let mut candidates = vec![stored_path.clone()];
    if stored_path.is_relative() {
        if let Ok(cwd) = std::env::current_dir() {
            candidates.push(cwd.join(&stored_path));
        }
    }
    if let Some(file_name) = stored_path.file_name() {
        candidates.push(reports_dir.join(file_name));
    }

    candidates.into_iter().find(|p| p.is_file())
}
