use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    utils::{Claims, error_codes, error_to_api_response, roles, verify_token},
};

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        error_to_api_response::<()>(error_codes::AUTH_FAILED, "未授权访问".to_string()),
    )
        .into_response()
}

/// 校验 Bearer token 并把 Claims 放进请求扩展，供后续 handler 使用
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "));

    let Some(token) = token else {
        return unauthorized();
    };

    match verify_token(token, &state.config) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("Token verification failed: {}", e);
            unauthorized()
        }
    }
}

/// 管理员专用路由的第二道闸：要求 role 为 admin。
/// 依赖外层 auth_middleware 已写入的 Claims
pub async fn require_admin(req: Request<Body>, next: Next) -> Response {
    match req.extensions().get::<Claims>() {
        Some(claims) if claims.role == roles::ADMIN => next.run(req).await,
        _ => (
            StatusCode::FORBIDDEN,
            error_to_api_response::<()>(
                error_codes::PERMISSION_DENIED,
                "需要管理员权限".to_string(),
            ),
        )
            .into_response(),
    }
}
