use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{Coordinate, Locatable, distance_km};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct RescueTeam {
    pub team_id: String,
    pub team_name: String,
    pub city: String,
    pub contact: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub available: bool,
}

impl Locatable for RescueTeam {
    fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub team_name: String,
    pub city: String,
    pub contact: String,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SetAvailableRequest {
    pub team_id: String,
    pub available: bool,
}

/// 线性扫描选出距离 center 最近的可用救援队
///
/// 只有严格更近才替换当前最优（"<" 而非 "<="），
/// 距离相同时先被扫描到的队伍胜出。
/// 不可用或没有坐标的队伍不参与
pub fn nearest_available(teams: &[RescueTeam], center: Coordinate) -> Option<&RescueTeam> {
    let mut best: Option<(&RescueTeam, f64)> = None;

    for team in teams.iter().filter(|t| t.available) {
        let Some(coord) = team.coordinate() else {
            continue;
        };
        let distance = distance_km(center, coord);
        if best.map_or(true, |(_, best_distance)| distance < best_distance) {
            best = Some((team, distance));
        }
    }

    best.map(|(team, _)| team)
}

const TEAM_COLUMNS: &str = "team_id, team_name, city, contact, latitude, longitude, available";

impl RescueTeam {
    pub async fn create(
        pool: &PgPool,
        req: CreateTeamRequest,
        coord: Option<Coordinate>,
    ) -> Result<Self, sqlx::Error> {
        let team_id = Uuid::new_v4().to_string();

        let team = sqlx::query_as::<_, RescueTeam>(&format!(
            r#"
            INSERT INTO rescue_teams (team_id, team_name, city, contact, latitude, longitude, available)
            VALUES ($1, $2, $3, $4, $5, $6, true)
            RETURNING {TEAM_COLUMNS}
            "#
        ))
        .bind(&team_id)
        .bind(&req.team_name)
        .bind(&req.city)
        .bind(&req.contact)
        .bind(coord.map(|c| c.latitude))
        .bind(coord.map(|c| c.longitude))
        .fetch_one(pool)
        .await?;

        Ok(team)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let teams = sqlx::query_as::<_, RescueTeam>(&format!(
            "SELECT {TEAM_COLUMNS} FROM rescue_teams ORDER BY team_name"
        ))
        .fetch_all(pool)
        .await?;

        Ok(teams)
    }

    /// 派遣候选快照：可用且有坐标的队伍
    pub async fn find_available(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let teams = sqlx::query_as::<_, RescueTeam>(&format!(
            "SELECT {TEAM_COLUMNS} FROM rescue_teams \
             WHERE available = true AND latitude IS NOT NULL AND longitude IS NOT NULL"
        ))
        .fetch_all(pool)
        .await?;

        Ok(teams)
    }

    pub async fn set_available(
        pool: &PgPool,
        team_id: &str,
        available: bool,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE rescue_teams SET available = $1 WHERE team_id = $2")
            .bind(available)
            .bind(team_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team(team_id: &str, latitude: f64, available: bool) -> RescueTeam {
        RescueTeam {
            team_id: team_id.into(),
            team_name: format!("team {team_id}"),
            city: "Delhi".into(),
            contact: "9999999999".into(),
            latitude: Some(latitude),
            longitude: Some(0.0),
            available,
        }
    }

    #[test]
    fn equal_distances_keep_the_earliest_team() {
        // 扫描顺序上距离约 5km、3km、3km
        let center = Coordinate::new(0.0, 0.0);
        let teams = vec![
            team("a", 0.045, true),
            team("b", 0.027, true),
            team("c", 0.027, true),
        ];

        let chosen = nearest_available(&teams, center).unwrap();
        assert_eq!(chosen.team_id, "b");
    }

    #[test]
    fn unavailable_teams_are_never_chosen() {
        let center = Coordinate::new(0.0, 0.0);
        let teams = vec![
            team("near-but-busy", 0.001, false),
            team("far-but-free", 0.5, true),
        ];

        let chosen = nearest_available(&teams, center).unwrap();
        assert_eq!(chosen.team_id, "far-but-free");
        assert!(chosen.available);
    }

    #[test]
    fn teams_without_coordinates_are_skipped() {
        let center = Coordinate::new(0.0, 0.0);
        let mut unknown = team("unknown", 0.0, true);
        unknown.latitude = None;
        unknown.longitude = None;
        let teams = vec![unknown, team("known", 0.2, true)];

        let chosen = nearest_available(&teams, center).unwrap();
        assert_eq!(chosen.team_id, "known");
    }

    #[test]
    fn no_eligible_team_yields_none() {
        let center = Coordinate::new(0.0, 0.0);
        assert!(nearest_available(&[], center).is_none());

        let teams = vec![team("busy", 0.01, false)];
        assert!(nearest_available(&teams, center).is_none());
    }
}
