use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    geo::Coordinate,
    utils::{error_codes, error_to_api_response, success_to_api_response},
};

use super::model::{CreateSafeLocationRequest, SafeLocation};

#[axum::debug_handler]
pub async fn create_safe_location(
    State(state): State<AppState>,
    Json(req): Json<CreateSafeLocationRequest>,
) -> impl IntoResponse {
    if req.name.trim().is_empty() || req.address.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "名称和地址不能为空".to_string(),
            ),
        );
    }

    // 安全地点必须有坐标：没有直接给出时地理编码是硬性要求
    let coord = match Coordinate::from_parts(req.latitude, req.longitude) {
        Some(coord) => coord,
        None => match state.geocoder.geocode(&req.address).await {
            Some(coord) => coord,
            None => {
                return (
                    StatusCode::OK,
                    error_to_api_response(
                        error_codes::GEOCODING_FAILED,
                        "无法解析地址，请检查后重试".to_string(),
                    ),
                );
            }
        },
    };

    match SafeLocation::create(&state.pool, req, coord).await {
        Ok(location) => (StatusCode::CREATED, success_to_api_response(location)),
        Err(e) => {
            tracing::error!("Failed to create safe location: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "创建安全地点失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn list_safe_locations(State(state): State<AppState>) -> impl IntoResponse {
    match SafeLocation::list(&state.pool).await {
        Ok(locations) => (StatusCode::OK, success_to_api_response(locations)),
        Err(e) => {
            tracing::error!("Failed to list safe locations: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询安全地点失败".to_string()),
            )
        }
    }
}
