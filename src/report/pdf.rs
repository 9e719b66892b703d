//! PDF layout for generated test reports via `printpdf`.

use std::io::BufWriter;

use printpdf::*;

use super::ReportError;
use crate::models::test_request::TestRequest;

/// Render a test report PDF from the full request snapshot.
/// Returns PDF bytes.
pub fn generate_report_pdf(
    tr: &TestRequest,
    summary: Option<&str>,
    interpretation: Option<&str>,
) -> Result<Vec<u8>, ReportError> {
    let title = format!("Lab Test Report — {}", tr.test_type);
    let (doc, page1, layer1) = PdfDocument::new(&title, Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;
    let courier = doc
        .add_builtin_font(BuiltinFont::Courier)
        .map_err(|e| ReportError::Render(format!("PDF font error: {e}")))?;

    let mut y = Mm(280.0);

    // Header
    layer.use_text(&title, 14.0, Mm(20.0), y, &bold);
    y -= Mm(6.0);
    layer.use_text(
        format!("{} ({})", tr.center_name, tr.center_code.as_deref().unwrap_or("-")),
        9.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(4.5);
    layer.use_text(
        format!("Patient: {}   Requested by: {}", tr.patient_name, tr.doctor_name),
        9.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(4.5);
    layer.use_text(
        format!("Urgency: {}   Request: {}", tr.urgency, tr.id),
        9.0,
        Mm(20.0),
        y,
        &font,
    );
    y -= Mm(8.0);

    // Result table
    if !tr.result_values.is_empty() {
        layer.use_text("RESULTS:", 11.0, Mm(20.0), y, &bold);
        y -= Mm(6.0);
        for rv in &tr.result_values {
            let flag = rv.status.as_deref().unwrap_or("");
            let text = format!(
                "  {} — {} {}  [{}]  {}",
                rv.parameter,
                rv.value,
                rv.unit.as_deref().unwrap_or(""),
                rv.normal_range.as_deref().unwrap_or("-"),
                flag
            );
            layer.use_text(&text, 8.0, Mm(25.0), y, &courier);
            y -= Mm(4.0);
        }
        y -= Mm(4.0);
    }

    // Free-text findings
    if let Some(results) = &tr.test_results {
        layer.use_text("FINDINGS:", 11.0, Mm(20.0), y, &bold);
        y -= Mm(6.0);
        for line in wrap_text(results, 90) {
            layer.use_text(&line, 9.0, Mm(25.0), y, &font);
            y -= Mm(4.5);
        }
        y -= Mm(4.0);
    }

    for (heading, text) in [
        ("SUMMARY:", summary),
        ("CLINICAL INTERPRETATION:", interpretation),
        ("CONCLUSION:", tr.conclusion.as_deref()),
        ("RECOMMENDATIONS:", tr.recommendations.as_deref()),
    ] {
        if let Some(text) = text {
            layer.use_text(heading, 11.0, Mm(20.0), y, &bold);
            y -= Mm(6.0);
            for line in wrap_text(text, 90) {
                layer.use_text(&line, 9.0, Mm(25.0), y, &font);
                y -= Mm(4.5);
            }
            y -= Mm(4.0);
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Render(format!("PDF save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ReportError::Render(format!("PDF buffer error: {e}")))
}

/// Naive word wrap at a character width per line.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for source_line in text.lines() {
        let mut current = String::new();
        for word in source_line.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}
