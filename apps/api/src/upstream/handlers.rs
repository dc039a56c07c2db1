use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::handlers::find_session;
use crate::state::AppState;
use crate::upstream::{JobPosting, ResumeFeedback, SignInRequest, SignUpRequest, UpstreamClient, UserProfile};

#[derive(Debug, Deserialize)]
pub struct JobSearchQuery {
    pub query: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

async fn upstream_for(state: &AppState, id: Uuid) -> Result<UpstreamClient, AppError> {
    let session = find_session(state, id).await?;
    let client = session.lock().await.upstream().clone();
    Ok(client)
}

/// POST /api/v1/sessions/:id/auth/signup
pub async fn handle_sign_up(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SignUpRequest>,
) -> Result<(StatusCode, Json<UserProfile>), AppError> {
    let upstream = upstream_for(&state, id).await?;
    let user = upstream.sign_up(&req).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/v1/sessions/:id/auth/signin
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<UserProfile>, AppError> {
    let upstream = upstream_for(&state, id).await?;
    Ok(Json(upstream.sign_in(&req).await?))
}

/// POST /api/v1/sessions/:id/auth/signout
pub async fn handle_sign_out(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    upstream_for(&state, id).await?.sign_out().await;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/sessions/:id/auth/me
/// Answers from local state when not signed in, so clients can poll it freely.
pub async fn handle_current_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AuthStatus>, AppError> {
    let upstream = upstream_for(&state, id).await?;
    if !upstream.is_authenticated().await {
        return Ok(Json(AuthStatus {
            authenticated: false,
            user: None,
        }));
    }
    let user = upstream.current_user().await?;
    Ok(Json(AuthStatus {
        authenticated: true,
        user: Some(user),
    }))
}

/// GET /api/v1/sessions/:id/jobs?query=&location=
pub async fn handle_search_jobs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<JobSearchQuery>,
) -> Result<Json<Vec<JobPosting>>, AppError> {
    let query = params.query.trim();
    if query.is_empty() {
        return Err(AppError::Validation("query must not be empty".to_string()));
    }
    let upstream = upstream_for(&state, id).await?;
    let jobs = upstream.search_jobs(query, params.location.as_deref()).await?;
    Ok(Json(jobs))
}

/// POST /api/v1/sessions/:id/analysis (multipart, field `file`)
pub async fn handle_analyze_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<ResumeFeedback>, AppError> {
    let upstream = upstream_for(&state, id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("resume").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, bytes.to_vec()));
        break;
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::Validation("Please select a file first".to_string()))?;
    Ok(Json(upstream.analyze_resume(&file_name, bytes).await?))
}
