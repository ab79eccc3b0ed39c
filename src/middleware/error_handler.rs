use std::time::Instant;

use axum::{
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::{debug, error};

const ERROR_BODY_LIMIT: usize = 1024;

/// 请求日志：记录方法、路径、状态码和耗时；
/// 5xx 响应额外把响应体读出来写进错误日志再原样回放
pub async fn log_requests(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;
    let elapsed = started.elapsed();
    let status = response.status();

    if !status.is_server_error() {
        debug!("{} {} -> {} in {:?}", method, path, status, elapsed);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, ERROR_BODY_LIMIT).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to read error response body: {}", e);
            return Response::from_parts(parts, Body::empty());
        }
    };

    error!(
        "{} {} -> {} in {:?}: {}",
        method,
        path,
        status,
        elapsed,
        String::from_utf8_lossy(&bytes)
    );

    parts.headers.remove(axum::http::header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(bytes))
}
