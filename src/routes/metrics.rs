use axum::http::StatusCode;
use prometheus::{Encoder, TextEncoder};

/// GET /metrics — text exposition of the collectors registered in
/// `services::metrics`. Not authenticated; keep it off the public ingress.
pub async fn metrics_handler() -> Result<String, StatusCode> {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
