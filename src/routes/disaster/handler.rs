use axum::{
    Extension,
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    AppState,
    geo::Coordinate,
    routes::safe_location::model::SafeLocation,
    routes::team::model::{RescueTeam, nearest_available},
    routes::user::model::User,
    utils::{Claims, error_codes, error_to_api_response, roles, success_to_api_response},
};

use super::model::{DisasterReport, ReportDisasterRequest, broadcast, send_alerts};

#[derive(Debug, Deserialize)]
pub struct NearbySafeQuery {
    pub disaster_id: String,
    pub radius_km: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTeamRequest {
    pub disaster_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminAlertRequest {
    pub message: String,
    pub city: Option<String>,
}

#[axum::debug_handler]
pub async fn report_disaster(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReportDisasterRequest>,
) -> impl IntoResponse {
    if req.category.trim().is_empty() || req.address.trim().is_empty() || req.city.trim().is_empty()
    {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "灾害类别和地址不能为空".to_string(),
            ),
        );
    }

    // 灾情上报必须有坐标，地理编码失败时整个操作失败
    let full_address = format!(
        "{}, {}, {}, {}",
        req.address, req.city, req.state, req.pincode
    );
    let Some(coord) = state.geocoder.geocode(&full_address).await else {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::GEOCODING_FAILED,
                "无法解析灾情地址，请检查后重试".to_string(),
            ),
        );
    };

    // 管理员代报时不挂 reporter
    let reporter_id = (claims.role == roles::CITIZEN).then(|| claims.sub.clone());

    let report = match DisasterReport::create(&state.pool, req, reporter_id, coord).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("Failed to create disaster report: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "灾情上报失败".to_string()),
            );
        }
    };

    // 预警扇出：对用户快照做邻近过滤后群发。
    // 返回的是尝试发送的条数，不是确认送达的条数
    let alerts_sent = match User::find_with_coordinates(&state.pool).await {
        Ok(users) => {
            send_alerts(&state.sms, &report, state.config.alert_radius_km, "", &users).await
        }
        Err(e) => {
            tracing::error!("Failed to load users for alert fan-out: {}", e);
            0
        }
    };

    tracing::info!(
        "Disaster {} reported at ({}, {}), {} alerts sent",
        report.report_id,
        report.latitude,
        report.longitude,
        alerts_sent
    );

    (
        StatusCode::CREATED,
        success_to_api_response(serde_json::json!({
            "disaster_id": report.report_id,
            "alerts_sent": alerts_sent
        })),
    )
}

#[axum::debug_handler]
pub async fn nearby_safe(
    State(state): State<AppState>,
    Query(query): Query<NearbySafeQuery>,
) -> impl IntoResponse {
    let radius_km = query
        .radius_km
        .unwrap_or(10.0)
        .min(state.config.max_search_radius_km);

    let report = match DisasterReport::find_by_id(&state.pool, &query.disaster_id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "灾情不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Failed to load disaster report: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询灾情失败".to_string()),
            );
        }
    };

    let center = Coordinate::new(report.latitude, report.longitude);
    match SafeLocation::find_nearby(&state.pool, &state.redis, center, radius_km).await {
        Ok(nearby) => (StatusCode::OK, success_to_api_response(nearby)),
        Err(e) => {
            tracing::error!("Failed to query nearby safe locations: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询安全地点失败".to_string()),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn assign_team(
    State(state): State<AppState>,
    Json(req): Json<AssignTeamRequest>,
) -> impl IntoResponse {
    let report = match DisasterReport::find_by_id(&state.pool, &req.disaster_id).await {
        Ok(Some(report)) => report,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                error_to_api_response(error_codes::NOT_FOUND, "灾情不存在".to_string()),
            );
        }
        Err(e) => {
            tracing::error!("Failed to load disaster report: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询灾情失败".to_string()),
            );
        }
    };

    // 派遣至多发生一次
    if report.assigned_team_id.is_some() {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "该灾情已派遣救援队".to_string(),
            ),
        );
    }

    let teams = match RescueTeam::find_available(&state.pool).await {
        Ok(teams) => teams,
        Err(e) => {
            tracing::error!("Failed to load rescue teams: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询救援队失败".to_string()),
            );
        }
    };

    let center = Coordinate::new(report.latitude, report.longitude);
    let Some(team) = nearest_available(&teams, center) else {
        return (
            StatusCode::OK,
            error_to_api_response(error_codes::NOT_FOUND, "没有可派遣的救援队".to_string()),
        );
    };

    match DisasterReport::assign_team(&state.pool, &report.report_id, &team.team_id).await {
        Ok(()) => (
            StatusCode::OK,
            success_to_api_response(serde_json::json!({
                "team_id": team.team_id,
                "team_name": team.team_name,
                "contact": team.contact
            })),
        ),
        Err(e) => {
            // 快照和落库之间有并发变更时走到这里
            let msg = if e.to_string().contains("no longer available")
                || e.to_string().contains("already assigned")
            {
                "派遣冲突，请重试".to_string()
            } else {
                "派遣救援队失败".to_string()
            };
            tracing::error!("Failed to assign team: {}", e);
            (
                StatusCode::OK,
                error_to_api_response(error_codes::INTERNAL_ERROR, msg),
            )
        }
    }
}

#[axum::debug_handler]
pub async fn admin_alert(
    State(state): State<AppState>,
    Json(req): Json<AdminAlertRequest>,
) -> impl IntoResponse {
    let Some(city) = req.city.filter(|c| !c.trim().is_empty()) else {
        return (
            StatusCode::OK,
            error_to_api_response(
                error_codes::VALIDATION_ERROR,
                "请指定要通知的城市".to_string(),
            ),
        );
    };

    match User::find_by_city(&state.pool, &city).await {
        Ok(users) => {
            let sent = broadcast(&state.sms, &users, &req.message).await;
            (
                StatusCode::OK,
                success_to_api_response(serde_json::json!({
                    "city": city,
                    "alerts_sent": sent
                })),
            )
        }
        Err(e) => {
            tracing::error!("Failed to load users for city alert: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_to_api_response(error_codes::INTERNAL_ERROR, "查询用户失败".to_string()),
            )
        }
    }
}
