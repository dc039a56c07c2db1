use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{read_json, UpstreamClient, UpstreamError};

/// Search location used when the caller gives none.
pub const DEFAULT_LOCATION: &str = "India";

/// Largest resume accepted for analysis.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Extensions the analyzer can read, with the MIME type sent upstream.
const ACCEPTED_UPLOADS: [(&str, &str); 7] = [
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    pub location: String,
    #[serde(default, alias = "url")]
    pub link: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeFeedback {
    /// One entry per non-blank line of the analysis.
    pub lines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysisResponse {
    feedback: Option<String>,
    error: Option<String>,
}

impl UpstreamClient {
    /// Searches postings; results keep the upstream order.
    pub async fn search_jobs(
        &self,
        query: &str,
        location: Option<&str>,
    ) -> Result<Vec<JobPosting>, UpstreamError> {
        let location = location
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCATION);

        let request = self
            .http
            .get(self.url("/search"))
            .query(&[("query", query), ("location", location)]);
        let response = self.send_authenticated(request).await?;
        let jobs: Vec<JobPosting> = read_json(response, "Search failed").await?;

        debug!("Search '{query}' in {location} returned {} postings", jobs.len());
        Ok(jobs)
    }

    /// Uploads a resume for analysis and returns the feedback line by line.
    pub async fn analyze_resume(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ResumeFeedback, UpstreamError> {
        let mime = validate_upload(file_name, bytes.len())?;

        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("/analyze_resume"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body: AnalysisResponse = read_json(response, "Resume analysis failed").await?;

        if let Some(error) = body.error {
            return Err(UpstreamError::Api {
                status: status.as_u16(),
                message: error,
            });
        }
        let feedback = body.feedback.unwrap_or_default();
        let lines = feedback_lines(&feedback);
        info!("Resume analysis for {file_name}: {} feedback lines", lines.len());
        Ok(ResumeFeedback { lines })
    }
}

/// Checks extension and size; returns the MIME type for the upload.
pub fn validate_upload(file_name: &str, len: usize) -> Result<&'static str, UpstreamError> {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    let mime = ACCEPTED_UPLOADS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| {
            UpstreamError::InvalidUpload(
                "unsupported file type, upload PDF, DOC, DOCX, TXT, JPG, or PNG".to_string(),
            )
        })?;

    if len == 0 {
        return Err(UpstreamError::InvalidUpload("file is empty".to_string()));
    }
    if len > MAX_UPLOAD_BYTES {
        return Err(UpstreamError::InvalidUpload(
            "file is too large, the limit is 5 MB".to_string(),
        ));
    }
    Ok(mime)
}

fn feedback_lines(feedback: &str) -> Vec<String> {
    feedback
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
