use std::sync::Arc;

use crate::config::Config;
use crate::export::PdfExporter;
use crate::layout::DocxLayout;
use crate::session::{SessionFactory, SessionRegistry};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionRegistry,
    /// Store, HTTP client and timings every new session is built with.
    pub session_factory: SessionFactory,
    /// Pluggable rasterizer behind it. Default: CommandRasterizer.
    pub pdf: Arc<PdfExporter>,
    pub docx_layout: DocxLayout,
}
