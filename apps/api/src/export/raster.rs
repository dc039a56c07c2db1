//! Offscreen render surfaces and the rasterizer seam.
//!
//! A page is rendered by wrapping its HTML in a fixed-width document (the surface),
//! handing it to a [`Rasterizer`], and decoding the resulting bitmap. The shipped
//! implementation shells out to an HTML-to-image tool; tests plug in fakes.

use std::borrow::Cow;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use regex::Regex;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::layout::PdfLayout;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to start rasterizer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("rasterizer timed out after {0}s")]
    Timeout(u64),

    #[error("rasterizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("surface I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bitmap could not be decoded: {0}")]
    Decode(#[from] image::ImageError),

    #[error("rasterizer produced an empty bitmap")]
    Empty,
}

// ────────────────────────────────────────────────────────────────────────────
// Surface
// ────────────────────────────────────────────────────────────────────────────

/// Resets user-agent spacing so every surface lays out the same way.
const SURFACE_STYLESHEET: &str = "\
* { margin: 0; padding: 0; box-sizing: border-box; }
h1, h2, h3, h4, h5, h6 { margin: 16px 0 8px 0; font-weight: bold; }
p { margin: 8px 0; line-height: 1.5; }
ul, ol { margin: 8px 0; padding-left: 20px; }
li { margin: 4px 0; }";

fn editor_class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"class="[^"]*ql-[^"]*""#).expect("valid regex"))
}

/// Drops `class` attributes that carry editor (`ql-*`) styling.
pub fn strip_editor_classes(html: &str) -> Cow<'_, str> {
    editor_class_pattern().replace_all(html, "")
}

/// A self-contained HTML document holding one page, sized for rasterization.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    html: String,
    width_px: u32,
    scale: f32,
}

impl RenderSurface {
    pub fn for_page(content: &str, layout: &PdfLayout) -> Self {
        let body = strip_editor_classes(content);
        let html = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n\
             {SURFACE_STYLESHEET}\n\
             body {{ background-color: #ffffff; }}\n\
             .surface {{ width: {width}px; min-height: {min_height}px; padding: {padding}px; \
             background-color: #ffffff; font-family: 'Arial', 'Helvetica', sans-serif; \
             font-size: 14px; line-height: 1.6; color: #000000; box-sizing: border-box; }}\n\
             </style>\n</head>\n<body>\n<div class=\"surface\">{body}</div>\n</body>\n</html>\n",
            width = layout.surface_width_px,
            min_height = layout.surface_min_height_px,
            padding = layout.surface_padding_px,
        );
        Self {
            html,
            width_px: layout.surface_width_px,
            scale: layout.raster_scale,
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn width_px(&self) -> u32 {
        self.width_px
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Rasterizer
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Rasterizer: Send + Sync {
    /// Renders the surface to a bitmap at the surface's scale.
    async fn rasterize(&self, surface: &RenderSurface) -> Result<DynamicImage, RasterError>;
}

/// Runs an external HTML-to-PNG tool (`wkhtmltoimage`-compatible CLI).
pub struct CommandRasterizer {
    program: PathBuf,
    timeout_secs: u64,
}

impl CommandRasterizer {
    pub fn new(program: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            timeout_secs,
        }
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    async fn rasterize(&self, surface: &RenderSurface) -> Result<DynamicImage, RasterError> {
        // Removed with its contents when dropped, whichever way this returns.
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("page.html");
        let output = dir.path().join("page.png");
        tokio::fs::write(&input, surface.html()).await?;

        let child = Command::new(&self.program)
            .arg("--quiet")
            .args(["--format", "png"])
            .args(["--width", &surface.width_px().to_string()])
            .args(["--zoom", &surface.scale().to_string()])
            .arg(&input)
            .arg(&output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(RasterError::Spawn)?;

        let result = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| RasterError::Timeout(self.timeout_secs))??;

        if !result.status.success() {
            return Err(RasterError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let png = tokio::fs::read(&output).await?;
        debug!("Rasterized surface to {} bytes of PNG", png.len());

        let bitmap = tokio::task::spawn_blocking(move || image::load_from_memory(&png))
            .await
            .map_err(|e| RasterError::Io(std::io::Error::other(e)))??;
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return Err(RasterError::Empty);
        }
        Ok(bitmap)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
