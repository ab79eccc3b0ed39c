use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;

use crate::{
    AppState,
    utils::{error_codes, error_to_api_response},
};

/// 反向代理头优先，取不到时退回连接对端地址
fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .map(|ip| ip.trim().to_string())
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

/// 固定窗口限流：Redis INCR + EXPIRE 按来源 IP 计数。
/// Redis 不可用时放行
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = format!("rl:{}", client_ip(&req));
    let window_secs = state.config.rate_limit_window().as_secs() as i64;
    let limit = state.config.rate_limit_requests as i64;

    match state.redis.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            let count: Result<i64, redis::RedisError> = conn.incr(&key, 1).await;
            match count {
                Ok(count) => {
                    if count == 1 {
                        let expired: Result<(), redis::RedisError> =
                            conn.expire(&key, window_secs).await;
                        if let Err(e) = expired {
                            tracing::warn!("Failed to arm rate limit window: {}", e);
                        }
                    }
                    if count > limit {
                        return (
                            StatusCode::OK,
                            error_to_api_response::<()>(
                                error_codes::RATE_LIMIT,
                                format!("请求过于频繁，请在{}秒后重试", window_secs),
                            ),
                        )
                            .into_response();
                    }
                }
                Err(e) => tracing::warn!("Rate limit counter unavailable: {}", e),
            }
        }
        Err(e) => tracing::warn!("Rate limit store unreachable: {}", e),
    }

    next.run(req).await
}
