//! Request routing, independent of the listener

use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use super::state::AppState;
use crate::auth::UserProfile;
use crate::documents::detect_kind;
use crate::errors::LexiError;
use crate::telemetry::{EventRecord, TelemetryEvent};

/// Events listed by `/status`
const RECENT_EVENTS: usize = 20;

/// Request as seen by the handlers
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: path.to_string(),
            bearer: None,
            body: Vec::new(),
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_json(mut self, body: &Value) -> Self {
        self.body = body.to_string().into_bytes();
        self
    }

    fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, ApiResponse> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ApiResponse::error(400, format!("Invalid JSON body: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub filename: Option<String>,
}

impl ApiResponse {
    pub fn json(status: u16, value: Value) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: value.to_string().into_bytes(),
            filename: None,
        }
    }

    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::json(status, json!({ "error": message.into() }))
    }

    pub fn pdf(bytes: Vec<u8>, filename: String) -> Self {
        Self {
            status: 200,
            content_type: "application/pdf",
            body: bytes,
            filename: Some(filename),
        }
    }

    /// Body parsed as JSON; `Null` when it is not JSON
    pub fn json_body(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }
}

#[derive(Deserialize)]
struct RegisterBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct LoginBody {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct AskBody {
    #[serde(default)]
    query: String,
    attachment: Option<AttachmentBody>,
}

#[derive(Deserialize)]
struct AttachmentBody {
    name: String,
    data_base64: String,
}

/// Attachment written to a temp file for the duration of one query
struct TempAttachment {
    path: PathBuf,
}

impl TempAttachment {
    fn write(attachment: &AttachmentBody) -> Result<Self, ApiResponse> {
        let ext = Path::new(&attachment.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default();

        let path = std::env::temp_dir().join(format!("lexi_{}{}", uuid::Uuid::new_v4(), ext));
        detect_kind(&path).map_err(|e| ApiResponse::error(415, e.to_string()))?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(attachment.data_base64.trim())
            .map_err(|e| ApiResponse::error(400, format!("Invalid attachment encoding: {}", e)))?;
        std::fs::write(&path, bytes).map_err(|e| ApiResponse::error(500, e.to_string()))?;
        Ok(Self { path })
    }
}

impl Drop for TempAttachment {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove attachment");
        }
    }
}

fn status_for(error: &LexiError) -> u16 {
    match error {
        LexiError::UnsupportedFileType(_) => 415,
        LexiError::AuthError(_) => 401,
        LexiError::Timeout { .. } => 504,
        LexiError::OpenAiError(_) | LexiError::HttpError(_) => 502,
        _ => 500,
    }
}

/// Dispatch one request
pub async fn handle(state: &AppState, request: ApiRequest) -> ApiResponse {
    let path = request.path.split('?').next().unwrap_or_default().to_string();
    tracing::debug!(method = %request.method, %path, "request");

    match (request.method.as_str(), path.as_str()) {
        ("GET", "/health") | ("GET", "/_stcore/health") => ApiResponse::json(200, json!({"status": "ok"})),
        ("GET", "/status") => status(state).await,
        ("POST", "/api/register") => register(state, &request).await,
        ("POST", "/api/login") => login(state, &request).await,
        ("POST", "/api/logout") => logout(state, &request),
        ("POST", "/api/ask") => ask(state, &request).await,
        ("POST", "/api/clear") => clear(state, &request),
        ("GET", p) if p.starts_with("/api/forms/") => form(state, &request, &p["/api/forms/".len()..]),
        (_, "/health" | "/_stcore/health" | "/status" | "/api/register" | "/api/login" | "/api/logout"
            | "/api/ask" | "/api/clear") => ApiResponse::error(405, "Method not allowed"),
        _ => ApiResponse::error(404, "Not found"),
    }
}

async fn status(state: &AppState) -> ApiResponse {
    let cache = match state.cache.stats().await {
        Ok(stats) => json!(stats),
        Err(e) => json!({ "error": e.to_string() }),
    };

    let indexes: serde_json::Map<String, Value> = state
        .index_counts()
        .await
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), json!({ "documents": count, "reachable": count.is_some() })))
        .collect();

    let recent: Vec<EventRecord> = state
        .telemetry
        .recent_events(RECENT_EVENTS)
        .iter()
        .map(TelemetryEvent::to_record)
        .collect();

    ApiResponse::json(
        200,
        json!({
            "service": "lexi",
            "summary": state.summary,
            "uptime_secs": state.telemetry.elapsed().as_secs(),
            "cache": cache,
            "cache_hit_rate": state.telemetry.cache_hit_rate(),
            "indexes": indexes,
            "sessions": state.sessions.active_sessions(),
            "telemetry": state.telemetry.get_stats(),
            "recent_events": recent,
        }),
    )
}

async fn register(state: &AppState, request: &ApiRequest) -> ApiResponse {
    let body: RegisterBody = match request.json() {
        Ok(body) => body,
        Err(response) => return response,
    };

    let outcome = state.users.register(&body.username, &body.email, &body.password).await;
    let code = if outcome.success { 200 } else { 400 };
    ApiResponse::json(code, json!(outcome))
}

async fn login(state: &AppState, request: &ApiRequest) -> ApiResponse {
    let body: LoginBody = match request.json() {
        Ok(body) => body,
        Err(response) => return response,
    };

    let outcome = state.users.authenticate(&body.username, &body.password).await;
    match &outcome.user {
        Some(user) if outcome.success => {
            let token = state.sessions.login(user.clone());
            let mut value = json!(outcome);
            value["token"] = json!(token);
            ApiResponse::json(200, value)
        }
        _ => ApiResponse::json(401, json!(outcome)),
    }
}

fn logout(state: &AppState, request: &ApiRequest) -> ApiResponse {
    let removed = request
        .bearer
        .as_deref()
        .map(|token| state.sessions.logout(token))
        .unwrap_or(false);
    ApiResponse::json(200, json!({ "success": removed }))
}

fn authorize(state: &AppState, request: &ApiRequest) -> Result<UserProfile, ApiResponse> {
    request
        .bearer
        .as_deref()
        .and_then(|token| state.sessions.current_user(token))
        .ok_or_else(|| ApiResponse::error(401, "Please log in to access this feature."))
}

async fn ask(state: &AppState, request: &ApiRequest) -> ApiResponse {
    let user = match authorize(state, request) {
        Ok(user) => user,
        Err(response) => return response,
    };
    let body: AskBody = match request.json() {
        Ok(body) => body,
        Err(response) => return response,
    };
    if body.query.trim().is_empty() {
        return ApiResponse::error(400, "Query is required");
    }

    let attachment = match body.attachment.as_ref().map(TempAttachment::write).transpose() {
        Ok(attachment) => attachment,
        Err(response) => return response,
    };

    let sink = |_: &str| {};
    let outcome = state
        .resolver
        .resolve(
            &user.username,
            &body.query,
            attachment.as_ref().map(|a| a.path.as_path()),
            &sink,
        )
        .await;
    drop(attachment);

    match outcome {
        Ok(resolution) => {
            let form_url = resolution
                .form_path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|name| format!("/api/forms/{}", name.to_string_lossy()));
            ApiResponse::json(
                200,
                json!({
                    "route": resolution.route,
                    "answer": resolution.answer,
                    "form_path": resolution.form_path,
                    "form_url": form_url,
                }),
            )
        }
        Err(e) => {
            tracing::error!(user = %user.username, error = %e, "query failed");
            ApiResponse::error(status_for(&e), e.to_string())
        }
    }
}

fn clear(state: &AppState, request: &ApiRequest) -> ApiResponse {
    match authorize(state, request) {
        Ok(user) => {
            state.resolver.clear(&user.username);
            ApiResponse::json(200, json!({ "success": true }))
        }
        Err(response) => response,
    }
}

fn form(state: &AppState, request: &ApiRequest, name: &str) -> ApiResponse {
    if let Err(response) = authorize(state, request) {
        return response;
    }

    let valid = !name.is_empty()
        && name.ends_with(".pdf")
        && !name.contains(['/', '\\'])
        && !name.starts_with('.');
    if !valid {
        return ApiResponse::error(400, "Invalid form name");
    }

    match std::fs::read(state.forms_dir.join(name)) {
        Ok(bytes) => ApiResponse::pdf(bytes, name.to_string()),
        Err(_) => ApiResponse::error(404, "Form not found"),
    }
}
