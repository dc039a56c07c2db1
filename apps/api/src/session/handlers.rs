use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::export::{self, ExportKind, ExportedFile};
use crate::session::{SessionView, SharedSession};
use crate::state::AppState;
use crate::templates::{self, Template};

pub const SKIPPED_PAGES_HEADER: &str = "x-skipped-pages";

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub profile: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateContentRequest {
    pub content: String,
}

#[derive(Serialize)]
pub struct SaveResponse {
    pub last_saved: DateTime<Utc>,
}

pub(crate) async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
}

/// GET /api/v1/templates
pub async fn handle_list_templates() -> Json<&'static [Template]> {
    Json(templates::list())
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    body: Option<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let Json(req) = body.unwrap_or_default();
    let profile = req.profile.map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
    if let Some(profile) = &profile {
        if profile.contains(':') {
            return Err(AppError::Validation("profile must not contain ':'".to_string()));
        }
    }

    let session = state.session_factory.open(profile).await;
    let view = session.view();
    state.sessions.insert(session).await;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let view = session.lock().await.view();
    Ok(Json(view))
}

/// DELETE /api/v1/sessions/:id
pub async fn handle_close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = state
        .sessions
        .remove(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))?;
    session.lock().await.close().await;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/pages
pub async fn handle_add_page(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.add_page();
    Ok((StatusCode::CREATED, Json(session.view())))
}

/// PUT /api/v1/sessions/:id/pages/current
pub async fn handle_update_content(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateContentRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.update_content(req.content);
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/pages/:index/select
pub async fn handle_select_page(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.select_page(index)?;
    Ok(Json(session.view()))
}

/// DELETE /api/v1/sessions/:id/pages/:index
pub async fn handle_delete_page(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.delete_page(index)?;
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/templates/:template_id
pub async fn handle_apply_template(
    State(state): State<AppState>,
    Path((id, template_id)): Path<(Uuid, u32)>,
) -> Result<Json<SessionView>, AppError> {
    let template = templates::find(template_id)
        .ok_or_else(|| AppError::NotFound(format!("Template {template_id} not found")))?;
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.apply_template(template);
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/save
pub async fn handle_save(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SaveResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let last_saved = session.lock().await.save().await?;
    Ok(Json(SaveResponse { last_saved }))
}

/// DELETE /api/v1/sessions/:id/saved
pub async fn handle_clear_saved(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = find_session(&state, id).await?;
    let mut session = session.lock().await;
    session.clear_saved().await?;
    Ok(Json(session.view()))
}

/// POST /api/v1/sessions/:id/export/pdf
pub async fn handle_export_pdf(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    run_export(&state, id, ExportKind::Pdf).await
}

/// POST /api/v1/sessions/:id/export/docx
pub async fn handle_export_docx(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    run_export(&state, id, ExportKind::Docx).await
}

async fn run_export(state: &AppState, id: Uuid, kind: ExportKind) -> Result<Response, AppError> {
    let session = find_session(state, id).await?;
    // The session lock is held only while claiming the gate and cloning the document.
    let (mut ticket, document) = session.lock().await.begin_export(kind)?;

    match export::export_document(kind, document, &state.pdf, &state.docx_layout).await {
        Ok(file) => download_response(file),
        Err(e) => {
            ticket.fail(e.to_string());
            Err(e.into())
        }
    }
}

fn download_response(file: ExportedFile) -> Result<Response, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(file.content_type));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file.file_name))
            .map_err(|e| AppError::Internal(e.into()))?,
    );
    if !file.skipped_pages.is_empty() {
        let skipped = file
            .skipped_pages
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        headers.insert(
            SKIPPED_PAGES_HEADER,
            HeaderValue::from_str(&skipped).map_err(|e| AppError::Internal(e.into()))?,
        );
    }
    Ok((headers, Bytes::from(file.bytes)).into_response())
}
