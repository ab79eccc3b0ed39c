use axum::{extract::State, http::StatusCode, response::IntoResponse};

use crate::{AppState, utils::success_to_api_response, weather::DEFAULT_CITIES};

/// 管理端触发一轮多城市天气巡检，返回极端天气清单
#[axum::debug_handler]
pub async fn scan_weather(State(state): State<AppState>) -> impl IntoResponse {
    let scan = state.weather.poll_cities(DEFAULT_CITIES).await;
    (StatusCode::OK, success_to_api_response(scan))
}
