pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
    Router,
};

use crate::session::handlers;
use crate::state::AppState;
use crate::upstream::{handlers as upstream, jobs::MAX_UPLOAD_BYTES};

/// Multipart framing on top of the largest accepted upload.
const UPLOAD_BODY_LIMIT: usize = MAX_UPLOAD_BYTES + 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/templates", get(handlers::handle_list_templates))
        // Editor sessions
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(handlers::handle_get_session).delete(handlers::handle_close_session),
        )
        .route("/api/v1/sessions/:id/pages", post(handlers::handle_add_page))
        .route(
            "/api/v1/sessions/:id/pages/current",
            put(handlers::handle_update_content),
        )
        .route(
            "/api/v1/sessions/:id/pages/:index/select",
            post(handlers::handle_select_page),
        )
        .route(
            "/api/v1/sessions/:id/pages/:index",
            delete(handlers::handle_delete_page),
        )
        .route(
            "/api/v1/sessions/:id/templates/:template_id",
            post(handlers::handle_apply_template),
        )
        .route("/api/v1/sessions/:id/save", post(handlers::handle_save))
        .route(
            "/api/v1/sessions/:id/saved",
            delete(handlers::handle_clear_saved),
        )
        // Export
        .route(
            "/api/v1/sessions/:id/export/pdf",
            post(handlers::handle_export_pdf),
        )
        .route(
            "/api/v1/sessions/:id/export/docx",
            post(handlers::handle_export_docx),
        )
        // Upstream account, jobs and analysis
        .route(
            "/api/v1/sessions/:id/auth/signup",
            post(upstream::handle_sign_up),
        )
        .route(
            "/api/v1/sessions/:id/auth/signin",
            post(upstream::handle_sign_in),
        )
        .route(
            "/api/v1/sessions/:id/auth/signout",
            post(upstream::handle_sign_out),
        )
        .route(
            "/api/v1/sessions/:id/auth/me",
            get(upstream::handle_current_user),
        )
        .route("/api/v1/sessions/:id/jobs", get(upstream::handle_search_jobs))
        .route(
            "/api/v1/sessions/:id/analysis",
            post(upstream::handle_analyze_resume).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .with_state(state)
}
