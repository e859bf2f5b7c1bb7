//! Notification webhook. Validates `{phone, message, type}` and logs it;
//! no messaging provider is wired in, so nothing is actually delivered.

use axum::body::Bytes;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};

/// An accepted notification. Fields keep whatever JSON the caller sent;
/// `kind` is echoed back as given.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub phone: Value,
    pub message: Value,
    pub kind: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Missing required fields: phone and message")]
    MissingFields,
    #[error("Internal server error")]
    Malformed(#[from] serde_json::Error),
}

impl NotifyError {
    pub fn status(&self) -> StatusCode {
        match self {
            NotifyError::MissingFields => StatusCode::BAD_REQUEST,
            NotifyError::Malformed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for NotifyError {
    fn into_response(self) -> Response {
        let body = match &self {
            NotifyError::Malformed(e) => json!({
                "error": self.to_string(),
                "details": e.to_string(),
            }),
            NotifyError::MissingFields => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Null, `false`, zero and the empty string count as absent.
fn present(v: Option<&Value>) -> Option<Value> {
    let v = v?;
    let blank = match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    };
    (!blank).then(|| v.clone())
}

/// Parses a request body. A missing type means `general`; any other type
/// is passed through untouched.
pub fn parse_payload(body: &[u8]) -> Result<Notification, NotifyError> {
    let raw: Value = serde_json::from_slice(body)?;
    let (Some(phone), Some(message)) = (present(raw.get("phone")), present(raw.get("message")))
    else {
        return Err(NotifyError::MissingFields);
    };
    let kind = match raw.get("type") {
        None | Some(Value::Null) => Value::from("general"),
        Some(k) => k.clone(),
    };
    Ok(Notification {
        phone,
        message,
        kind,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub success: bool,
    pub message: &'static str,
    pub details: ReceiptDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptDetails {
    pub phone: Value,
    #[serde(rename = "type")]
    pub kind: Value,
    pub timestamp: String,
}

fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Stands in for the messaging provider: logs and reports simulated success.
pub fn dispatch(n: Notification) -> Receipt {
    tracing::info!(
        kind = %text(&n.kind),
        phone = %text(&n.phone),
        message = %text(&n.message),
        "notification accepted (not delivered)"
    );
    Receipt {
        success: true,
        message: "Notification sent successfully (simulated)",
        details: ReceiptDetails {
            phone: n.phone,
            kind: n.kind,
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        },
    }
}

async fn handle_notification(body: Bytes) -> Response {
    match parse_payload(&body) {
        Ok(n) => (StatusCode::OK, Json(dispatch(n))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "notification rejected");
            e.into_response()
        }
    }
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(handle_notification).options(preflight))
        .layer(cors())
}

pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("notification endpoint listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down notification endpoint");
}
