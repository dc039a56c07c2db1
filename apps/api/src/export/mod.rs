//! Export pipeline: Document → PDF (rasterized) or DOCX (translated).

use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::document::Document;
use crate::layout::DocxLayout;

pub mod docx;
pub mod gate;
pub mod html;
pub mod pdf;
pub mod raster;

pub use gate::{ExportGate, ExportState, ExportTicket};
pub use pdf::{PdfExporter, RasterFailurePolicy};
pub use raster::{CommandRasterizer, RasterError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Pdf,
    Docx,
}

impl ExportKind {
    pub fn extension(self) -> &'static str {
        match self {
            ExportKind::Pdf => "pdf",
            ExportKind::Docx => "docx",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportKind::Pdf => "application/pdf",
            ExportKind::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportKind::Pdf => "PDF",
            ExportKind::Docx => "DOCX",
        })
    }
}

/// `resume_<YYYY-MM-DD>.<ext>`
pub fn export_file_name(kind: ExportKind, date: NaiveDate) -> String {
    format!("resume_{}.{}", date.format("%Y-%m-%d"), kind.extension())
}

/// A finished export ready for download.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
    /// Pages rendered blank because rasterization failed (PDF only).
    pub skipped_pages: Vec<usize>,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("a {0} export is already running")]
    AlreadyRunning(ExportKind),

    #[error("page {page} could not be translated: {reason}")]
    Malformed { page: usize, reason: String },

    #[error("DOCX packaging failed: {0}")]
    Docx(String),

    #[error("PDF assembly failed: {0}")]
    Pdf(String),

    #[error("page {page} could not be rasterized: {source}")]
    Raster {
        page: usize,
        #[source]
        source: RasterError,
    },
}

/// Runs one export of `document`. The caller holds the gate ticket.
pub async fn export_document(
    kind: ExportKind,
    document: Document,
    pdf: &PdfExporter,
    docx_layout: &DocxLayout,
) -> Result<ExportedFile, ExportError> {
    let (bytes, skipped_pages) = match kind {
        ExportKind::Pdf => {
            let output = pdf.export(document.pages()).await?;
            (output.bytes, output.skipped_pages)
        }
        ExportKind::Docx => {
            let layout = docx_layout.clone();
            let bytes = tokio::task::spawn_blocking(move || {
                let blocks = docx::translate_pages(document.pages())?;
                docx::render_docx(&blocks, &layout)
            })
            .await
            .map_err(|e| ExportError::Docx(e.to_string()))??;
            (bytes, Vec::new())
        }
    };

    let file_name = export_file_name(kind, Utc::now().date_naive());
    info!("{kind} export ready: {file_name} ({} bytes)", bytes.len());
    Ok(ExportedFile {
        file_name,
        content_type: kind.content_type(),
        bytes,
        skipped_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::default_docx_layout;
    use crate::templates;

    #[test]
    fn test_file_names_are_date_stamped() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(export_file_name(ExportKind::Pdf, date), "resume_2024-03-07.pdf");
        assert_eq!(export_file_name(ExportKind::Docx, date), "resume_2024-03-07.docx");
    }

    #[tokio::test]
    async fn test_docx_export_of_template_document() {
        let mut document = Document::new();
        document.apply_template(templates::find(2).unwrap());
        document.add_page();
        document.update_content("<p>References on request</p>");

        let pdf = PdfExporter::new(
            std::sync::Arc::new(CommandRasterizer::new("/nonexistent/html-to-image", 1)),
            crate::layout::default_pdf_layout(),
            std::time::Duration::ZERO,
            RasterFailurePolicy::SkipPage,
        );
        let file = export_document(ExportKind::Docx, document, &pdf, &default_docx_layout())
            .await
            .unwrap();

        assert!(file.file_name.starts_with("resume_") && file.file_name.ends_with(".docx"));
        assert_eq!(file.content_type, ExportKind::Docx.content_type());
        assert!(file.bytes.starts_with(b"PK"));
        assert!(file.skipped_pages.is_empty());
    }
}
