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

use super::model::{CreateTeamRequest, RescueTeam, SetAvailableRequest};

#[axum::debug_handler]
pub async fn create_team(
    State(state): State<AppState>,
    Json(req): Json<CreateTeamRequest>,
) -> impl IntoResponse {
    if req.team_name.trim().is_empty() || req.city.trim().is_empty() {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "队伍名称和城市不能为空".to_string(),
            ),
        );
    }

    // 坐标可以直接给出，否则尽力地理编码驻地地址；
    // 没有坐标的队伍可以入库，但不会被派遣
    let coord = match Coordinate::from_parts(req.latitude, req.longitude) {
        Some(coord) => Some(coord),
        None => match &req.address {
            Some(address) => {
                let full_address = format!("{}, {}", address, req.city);
                state.geocoder.geocode(&full_address).await
            }
            None => None,
        },
    };

    match RescueTeam::create(&state.pool, req, coord).await {
        Ok(team) => (StatusCode::CREATED, success_to_api_response(team)),
        Err(e) => {
            tracing::error!("Failed to create rescue team: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "创建救援队失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn list_teams(State(state): State<AppState>) -> impl IntoResponse {
    match RescueTeam::list(&state.pool).await {
        Ok(teams) => (StatusCode::OK, success_to_api_response(teams)),
        Err(e) => {
            tracing::error!("Failed to list rescue teams: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询救援队失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn set_team_available(
    State(state): State<AppState>,
    Json(req): Json<SetAvailableRequest>,
) -> impl IntoResponse {
    match RescueTeam::set_available(&state.pool, &req.team_id, req.available).await {
        Ok(true) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({
                "team_id": req.team_id,
                "available": req.available
            })),
        ),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            error_to_api_response(error_codes::NOT_FOUND, "救援队不存在".to_string()),
        ),
        Err(e) => {
            tracing::error!("Failed to update team availability: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "更新救援队状态失败".to_string()),
            )
        }
    }
}
