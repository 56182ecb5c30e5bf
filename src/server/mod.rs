//! HTTP listener
//!
//! One blocking accept thread hands requests to the tokio runtime; each
//! request is handled on its own task and answered from a blocking task.

pub mod routes;
pub mod state;

use anyhow::Context;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use routes::{handle, ApiRequest, ApiResponse};
pub use state::{runtime_dirs, AppState, ServiceSummary};

/// Read a tiny_http request into an `ApiRequest`, bounded by `max_body`
fn read_request(request: &mut tiny_http::Request, max_body: usize) -> Result<ApiRequest, ApiResponse> {
    let bearer = request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .and_then(|h| h.value.as_str().strip_prefix("Bearer ").map(|t| t.trim().to_string()));

    if request.body_length().is_some_and(|len| len > max_body) {
        return Err(ApiResponse::error(413, "Request body too large"));
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(max_body as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| ApiResponse::error(400, format!("Failed to read body: {}", e)))?;
    if body.len() > max_body {
        return Err(ApiResponse::error(413, "Request body too large"));
    }

    Ok(ApiRequest {
        method: request.method().as_str().to_uppercase(),
        path: request.url().to_string(),
        bearer,
        body,
    })
}

fn respond(request: tiny_http::Request, response: ApiResponse) {
    let mut out = tiny_http::Response::from_data(response.body).with_status_code(response.status);
    if let Ok(header) = tiny_http::Header::from_bytes("Content-Type", response.content_type) {
        out.add_header(header);
    }
    if let Some(filename) = response.filename {
        let value = format!("attachment; filename=\"{}\"", filename);
        if let Ok(header) = tiny_http::Header::from_bytes("Content-Disposition", value.as_bytes()) {
            out.add_header(header);
        }
    }
    if let Err(e) = request.respond(out) {
        tracing::warn!(error = %e, "failed to send response");
    }
}

/// Serve until the listener fails
pub async fn serve(state: AppState, addr: &str) -> anyhow::Result<()> {
    let server = tiny_http::Server::http(addr)
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", addr, e))?;
    tracing::info!(%addr, "lexi listening");

    let state = Arc::new(state);
    let max_body = state.max_body_bytes;
    let (tx, mut rx) = mpsc::channel::<(tiny_http::Request, Result<ApiRequest, ApiResponse>)>(64);

    let acceptor = std::thread::Builder::new()
        .name("lexi-accept".to_string())
        .spawn(move || {
            for mut request in server.incoming_requests() {
                let parsed = read_request(&mut request, max_body);
                if tx.blocking_send((request, parsed)).is_err() {
                    break;
                }
            }
        })
        .context("failed to start accept thread")?;

    while let Some((request, parsed)) = rx.recv().await {
        let state = state.clone();
        tokio::spawn(async move {
            let response = match parsed {
                Ok(api_request) => handle(&state, api_request).await,
                Err(response) => response,
            };
            let sent = tokio::task::spawn_blocking(move || respond(request, response)).await;
            if let Err(e) = sent {
                tracing::warn!(error = %e, "response task failed");
            }
        });
    }

    if acceptor.is_finished() {
        tracing::warn!("accept loop ended");
    }
    Ok(())
}
