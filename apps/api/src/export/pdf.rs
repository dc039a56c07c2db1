//! HTML → PDF through rasterization.
//!
//! Each page is rendered to a bitmap in order (surface, settle, rasterize, teardown)
//! and placed on its own A4 sheet. Rendering is sequential; only the final PDF
//! assembly runs on the blocking pool.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::raster::{RasterError, Rasterizer, RenderSurface};
use super::ExportError;
use crate::document::Page;
use crate::layout::{fit_to_printable, PdfLayout};

/// Default wait between building a surface and rasterizing it.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// Nominal bitmap density handed to the PDF writer; placement rescales anyway.
const IMAGE_DPI: f32 = 300.0;
const MM_PER_INCH: f32 = 25.4;

/// What to do when a single page cannot be rasterized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RasterFailurePolicy {
    /// Leave the page blank, report it, and keep going.
    #[default]
    SkipPage,
    /// Abort the whole export.
    FailExport,
}

impl FromStr for RasterFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" | "skip_page" => Ok(RasterFailurePolicy::SkipPage),
            "fail" | "fail_export" => Ok(RasterFailurePolicy::FailExport),
            other => Err(format!("unknown raster failure policy '{other}' (expected skip or fail)")),
        }
    }
}

/// Result of a PDF export.
#[derive(Debug, Clone)]
pub struct PdfOutput {
    pub bytes: Vec<u8>,
    /// Zero-based indices of pages left blank.
    pub skipped_pages: Vec<usize>,
}

pub struct PdfExporter {
    rasterizer: Arc<dyn Rasterizer>,
    layout: PdfLayout,
    settle: Duration,
    policy: RasterFailurePolicy,
}

impl PdfExporter {
    pub fn new(
        rasterizer: Arc<dyn Rasterizer>,
        layout: PdfLayout,
        settle: Duration,
        policy: RasterFailurePolicy,
    ) -> Self {
        Self {
            rasterizer,
            layout,
            settle,
            policy,
        }
    }

    pub fn policy(&self) -> RasterFailurePolicy {
        self.policy
    }

    /// Renders every page and assembles one PDF, one sheet per page.
    pub async fn export(&self, pages: &[Page]) -> Result<PdfOutput, ExportError> {
        let mut bitmaps = Vec::with_capacity(pages.len());
        let mut skipped_pages = Vec::new();

        for (index, page) in pages.iter().enumerate() {
            match self.render_page(page).await {
                Ok(bitmap) => bitmaps.push(Some(bitmap)),
                Err(e) if self.policy == RasterFailurePolicy::SkipPage => {
                    warn!("Page {index} could not be rasterized, leaving it blank: {e}");
                    skipped_pages.push(index);
                    bitmaps.push(None);
                }
                Err(e) => return Err(ExportError::Raster { page: index, source: e }),
            }
        }

        let layout = self.layout.clone();
        let bytes = tokio::task::spawn_blocking(move || assemble_pdf(&bitmaps, &layout))
            .await
            .map_err(|e| ExportError::Pdf(e.to_string()))??;

        info!(
            "Assembled PDF: {} pages, {} skipped, {} bytes",
            pages.len(),
            skipped_pages.len(),
            bytes.len()
        );
        Ok(PdfOutput {
            bytes,
            skipped_pages,
        })
    }

    async fn render_page(&self, page: &Page) -> Result<DynamicImage, RasterError> {
        let surface = RenderSurface::for_page(&page.content, &self.layout);
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        let bitmap = self.rasterizer.rasterize(&surface).await?;
        drop(surface);

        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(RasterError::Empty);
        }
        debug!("Page {} rasterized at {}x{}", page.id, bitmap.width(), bitmap.height());
        Ok(bitmap)
    }
}

/// Lays bitmaps onto A4 sheets. `None` entries become blank sheets.
pub fn assemble_pdf(bitmaps: &[Option<DynamicImage>], layout: &PdfLayout) -> Result<Vec<u8>, ExportError> {
    let width = Mm(layout.page_width_mm);
    let height = Mm(layout.page_height_mm);
    let (doc, first_page, first_layer) = PdfDocument::new("Resume", width, height, "Page 1");

    for (index, bitmap) in bitmaps.iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(width, height, format!("Page {}", index + 1))
        };

        let Some(bitmap) = bitmap else { continue };
        let Some(placement) = fit_to_printable(bitmap.width(), bitmap.height(), layout) else {
            continue;
        };

        let natural_w = bitmap.width() as f32 * MM_PER_INCH / IMAGE_DPI;
        let natural_h = bitmap.height() as f32 * MM_PER_INCH / IMAGE_DPI;
        let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(bitmap.to_rgb8()));

        // PDF space has its origin at the bottom-left corner.
        image.add_to_layer(
            doc.get_page(page).get_layer(layer),
            ImageTransform {
                translate_x: Some(Mm(placement.x_mm)),
                translate_y: Some(Mm(layout.page_height_mm - placement.y_mm - placement.height_mm)),
                scale_x: Some(placement.width_mm / natural_w),
                scale_y: Some(placement.height_mm / natural_h),
                dpi: Some(IMAGE_DPI),
                ..Default::default()
            },
        );
    }

    doc.save_to_bytes().map_err(|e| ExportError::Pdf(e.to_string()))
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use image::{Rgb, RgbImage};

    use super::*;
    use crate::layout::default_pdf_layout;

    /// Returns a small bitmap, failing on pages whose content contains "FAIL" and
    /// returning a zero-sized bitmap for "EMPTY".
    #[derive(Default)]
    struct FakeRasterizer {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, surface: &RenderSurface) -> Result<DynamicImage, RasterError> {
            self.seen.lock().unwrap().push(surface.html().to_string());
            if surface.html().contains("FAIL") {
                return Err(RasterError::Failed {
                    status: "exit status: 1".to_string(),
                    stderr: "render error".to_string(),
                });
            }
            if surface.html().contains("EMPTY") {
                return Ok(DynamicImage::ImageRgb8(RgbImage::new(0, 0)));
            }
            Ok(DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 56, Rgb([255, 255, 255]))))
        }
    }

    fn pages(contents: &[&str]) -> Vec<Page> {
        contents
            .iter()
            .enumerate()
            .map(|(i, c)| Page {
                id: (i as i64).into(),
                content: c.to_string(),
            })
            .collect()
    }

    fn exporter(rasterizer: Arc<FakeRasterizer>, policy: RasterFailurePolicy) -> PdfExporter {
        PdfExporter::new(rasterizer, default_pdf_layout(), DEFAULT_SETTLE, policy)
    }

    fn count_pages(pdf: &[u8]) -> usize {
        let page_dict = regex::Regex::new(r"/Type\s*/Page[^s]").unwrap();
        page_dict.find_iter(&String::from_utf8_lossy(pdf)).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_renders_pages_in_order() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let out = exporter(rasterizer.clone(), RasterFailurePolicy::SkipPage)
            .export(&pages(&["<p>one</p>", "<p class=\"ql-x\">two</p>", "<p>three</p>"]))
            .await
            .unwrap();

        assert!(out.bytes.starts_with(b"%PDF"));
        assert!(out.skipped_pages.is_empty());

        let seen = rasterizer.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("one") && seen[1].contains("two") && seen[2].contains("three"));
        assert!(!seen[1].contains("ql-x"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_is_skipped_and_reported() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let out = exporter(rasterizer, RasterFailurePolicy::SkipPage)
            .export(&pages(&["<p>ok</p>", "<p>FAIL</p>", "<p>EMPTY</p>", "<p>ok</p>"]))
            .await
            .unwrap();

        assert!(out.bytes.starts_with(b"%PDF"));
        assert_eq!(out.skipped_pages, vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_policy_aborts_export() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let err = exporter(rasterizer.clone(), RasterFailurePolicy::FailExport)
            .export(&pages(&["<p>ok</p>", "<p>FAIL</p>", "<p>never</p>"]))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Raster { page: 1, .. }));
        assert_eq!(rasterizer.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_interval_precedes_each_rasterization() {
        let rasterizer = Arc::new(FakeRasterizer::default());
        let start = tokio::time::Instant::now();
        exporter(rasterizer, RasterFailurePolicy::SkipPage)
            .export(&pages(&["<p>a</p>", "<p>b</p>"]))
            .await
            .unwrap();
        assert!(start.elapsed() >= DEFAULT_SETTLE * 2);
    }

    #[test]
    fn test_one_sheet_per_page_even_when_blank() {
        let layout = default_pdf_layout();
        let bitmap = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 40, Rgb([0, 0, 0])));
        let single = assemble_pdf(&[Some(bitmap.clone())], &layout).unwrap();
        let triple = assemble_pdf(&[Some(bitmap.clone()), None, Some(bitmap)], &layout).unwrap();

        assert!(single.starts_with(b"%PDF"));
        assert!(triple.len() > single.len());
        assert_eq!(count_pages(&single), 1);
        assert_eq!(count_pages(&triple), 3);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("skip".parse(), Ok(RasterFailurePolicy::SkipPage));
        assert_eq!("FAIL".parse(), Ok(RasterFailurePolicy::FailExport));
        assert_eq!("fail_export".parse(), Ok(RasterFailurePolicy::FailExport));
        assert!("retry".parse::<RasterFailurePolicy>().is_err());
        assert_eq!(RasterFailurePolicy::default(), RasterFailurePolicy::SkipPage);
    }
}
