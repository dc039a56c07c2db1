//! Page dimensions, margins and the bitmap fit rule.
//!
//! The raster surface is 794 × 1123 CSS px, i.e. A4 at 96 px/in, so a rendered page
//! maps back onto the sheet without distortion. The fit rule works width-first:
//! the bitmap fills the printable width, and only when that would overflow the
//! printable height is it shrunk uniformly to fit height instead.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// PDF layout
// ────────────────────────────────────────────────────────────────────────────

/// Output sheet and offscreen surface parameters for the PDF path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfLayout {
    pub page_width_mm: f32,
    pub page_height_mm: f32,
    /// Same inset on all four sides.
    pub margin_mm: f32,
    /// Fixed width of the offscreen surface, CSS px.
    pub surface_width_px: u32,
    pub surface_min_height_px: u32,
    pub surface_padding_px: u32,
    /// Device pixel ratio used when rasterizing.
    pub raster_scale: f32,
}

impl PdfLayout {
    pub fn printable_width_mm(&self) -> f32 {
        self.page_width_mm - 2.0 * self.margin_mm
    }

    pub fn printable_height_mm(&self) -> f32 {
        self.page_height_mm - 2.0 * self.margin_mm
    }
}

/// A4 portrait, 15 mm margins, 1.5× raster scale.
pub fn default_pdf_layout() -> PdfLayout {
    PdfLayout {
        page_width_mm: 210.0,
        page_height_mm: 297.0,
        margin_mm: 15.0,
        surface_width_px: 794,
        surface_min_height_px: 1123,
        surface_padding_px: 40,
        raster_scale: 1.5,
    }
}

/// Where a bitmap lands on the sheet. `x_mm`/`y_mm` are measured from the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImagePlacement {
    pub x_mm: f32,
    pub y_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
}

/// Scales a `width_px × height_px` bitmap into the printable area, preserving aspect
/// ratio. Returns `None` for a zero-sized bitmap.
pub fn fit_to_printable(width_px: u32, height_px: u32, layout: &PdfLayout) -> Option<ImagePlacement> {
    if width_px == 0 || height_px == 0 {
        return None;
    }

    let max_w = layout.printable_width_mm();
    let max_h = layout.printable_height_mm();
    let (w, h) = (width_px as f32, height_px as f32);

    let mut width_mm = max_w;
    let mut height_mm = h * max_w / w;
    if height_mm > max_h {
        height_mm = max_h;
        width_mm = w * max_h / h;
    }

    Some(ImagePlacement {
        x_mm: layout.margin_mm,
        y_mm: layout.margin_mm,
        width_mm,
        height_mm,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// DOCX layout
// ────────────────────────────────────────────────────────────────────────────

pub const TWIPS_PER_INCH: i32 = 1440;

/// Section properties for the DOCX path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocxLayout {
    /// Same inset on all four sides.
    pub margin_twips: i32,
}

/// 0.75" margins.
pub fn default_docx_layout() -> DocxLayout {
    DocxLayout {
        margin_twips: TWIPS_PER_INCH * 3 / 4,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
