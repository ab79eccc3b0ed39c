use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{Coordinate, Locatable, find_within};
use crate::routes::user::model::User;
use crate::sms::SmsSender;

// 单次扇出同时在途的短信数上限
const ALERT_WORKERS: usize = 8;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DisasterReport {
    pub report_id: String,
    pub reporter_id: Option<String>,
    pub category: String,
    pub description: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub assigned_team_id: Option<String>,
}

impl Locatable for DisasterReport {
    fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(self.latitude, self.longitude))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReportDisasterRequest {
    pub category: String,
    pub description: Option<String>,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

const REPORT_COLUMNS: &str = "report_id, reporter_id, category, description, address, city, \
     state, pincode, latitude, longitude, created_at, assigned_team_id";

impl DisasterReport {
    /// 坐标在插入前已由调用方解析完成（地理编码失败时整个上报失败）
    pub async fn create(
        pool: &PgPool,
        req: ReportDisasterRequest,
        reporter_id: Option<String>,
        coord: Coordinate,
    ) -> Result<Self, sqlx::Error> {
        let report_id = Uuid::new_v4().to_string();

        let report = sqlx::query_as::<_, DisasterReport>(&format!(
            r#"
            INSERT INTO disaster_reports (
                report_id, reporter_id, category, description, address, city,
                state, pincode, latitude, longitude, created_at, assigned_team_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NULL)
            RETURNING {REPORT_COLUMNS}
            "#
        ))
        .bind(&report_id)
        .bind(&reporter_id)
        .bind(&req.category)
        .bind(req.description.unwrap_or_default())
        .bind(&req.address)
        .bind(&req.city)
        .bind(&req.state)
        .bind(&req.pincode)
        .bind(coord.latitude)
        .bind(coord.longitude)
        .fetch_one(pool)
        .await?;

        Ok(report)
    }

    pub async fn find_by_id(pool: &PgPool, report_id: &str) -> Result<Option<Self>, sqlx::Error> {
        let report = sqlx::query_as::<_, DisasterReport>(&format!(
            "SELECT {REPORT_COLUMNS} FROM disaster_reports WHERE report_id = $1"
        ))
        .bind(report_id)
        .fetch_optional(pool)
        .await?;

        Ok(report)
    }

    /// 把"队伍置忙"和"灾情记录派遣"放进同一个事务：
    /// 要么两个变更一起落库，要么都不落。
    /// 两条 UPDATE 都带守卫条件，并发竞争时后到的事务拿到 0 行直接回滚
    pub async fn assign_team(
        pool: &PgPool,
        report_id: &str,
        team_id: &str,
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;

        let team_rows =
            sqlx::query("UPDATE rescue_teams SET available = false WHERE team_id = $1 AND available = true")
                .bind(team_id)
                .execute(&mut *tx)
                .await?
                .rows_affected();

        if team_rows == 0 {
            return Err(sqlx::Error::Protocol("Team no longer available".into()));
        }

        let report_rows = sqlx::query(
            "UPDATE disaster_reports SET assigned_team_id = $1 \
             WHERE report_id = $2 AND assigned_team_id IS NULL",
        )
        .bind(team_id)
        .bind(report_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if report_rows == 0 {
            return Err(sqlx::Error::Protocol("Report already assigned".into()));
        }

        tx.commit().await?;

        Ok(())
    }
}

/// 灾情预警扇出：向半径内所有有坐标的用户群发短信
///
/// 返回尝试发送的条数。发送是并发的、不保证完成顺序，
/// 单条失败不影响其他条目也不计入返回值——投递确认不在本层关心范围
pub async fn send_alerts(
    sms: &SmsSender,
    disaster: &DisasterReport,
    radius_km: f64,
    extra_message: &str,
    users: &[User],
) -> usize {
    let center = Coordinate::new(disaster.latitude, disaster.longitude);
    let nearby = find_within(center, radius_km, users);

    let message = format!(
        "【灾害警报】{}：{}，{}。{}",
        disaster.category, disaster.address, disaster.city, extra_message
    );

    let sends: Vec<_> = nearby
        .iter()
        .map(|(user, _)| sms.send(&user.phone, &message))
        .collect();

    stream::iter(sends)
        .buffer_unordered(ALERT_WORKERS)
        .collect::<Vec<()>>()
        .await;

    nearby.len()
}

/// 按名单群发：行政预警用，不做半径过滤
pub async fn broadcast(sms: &SmsSender, users: &[User], message: &str) -> usize {
    let sends: Vec<_> = users
        .iter()
        .map(|user| sms.send(&user.phone, message))
        .collect();

    stream::iter(sends)
        .buffer_unordered(ALERT_WORKERS)
        .collect::<Vec<()>>()
        .await;

    users.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(phone: &str, coord: Option<(f64, f64)>) -> User {
        User {
            user_id: format!("user-{phone}"),
            full_name: "test".into(),
            phone: phone.into(),
            email: format!("{phone}@example.com"),
            address: "addr".into(),
            city: "Delhi".into(),
            state: "Delhi".into(),
            pincode: "110001".into(),
            password_hash: String::new(),
            verified: true,
            latitude: coord.map(|c| c.0),
            longitude: coord.map(|c| c.1),
        }
    }

    fn report() -> DisasterReport {
        DisasterReport {
            report_id: "report-1".into(),
            reporter_id: None,
            category: "flood".into(),
            description: String::new(),
            address: "Connaught Place".into(),
            city: "Delhi".into(),
            state: "Delhi".into(),
            pincode: "110001".into(),
            latitude: 0.0,
            longitude: 0.0,
            created_at: Utc::now(),
            assigned_team_id: None,
        }
    }

    #[tokio::test]
    async fn alert_count_covers_users_in_radius_only() {
        let sms = SmsSender::disabled();
        let users = vec![
            user("9000000001", Some((0.01, 0.0))),
            user("9000000002", Some((0.0, 0.05))),
            user("9000000003", Some((0.02, 0.02))),
            user("9000000004", Some((1.0, 1.0))), // 约 157km，半径外
            user("9000000005", None),             // 无坐标
        ];

        let sent = send_alerts(&sms, &report(), 10.0, "", &users).await;
        assert_eq!(sent, 3);
    }

    #[tokio::test]
    async fn alert_with_no_nearby_users_sends_nothing() {
        let sms = SmsSender::disabled();
        let users = vec![user("9000000001", Some((50.0, 50.0)))];

        let sent = send_alerts(&sms, &report(), 10.0, "", &users).await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn broadcast_counts_every_recipient() {
        let sms = SmsSender::disabled();
        let users = vec![
            user("9000000001", None),
            user("9000000002", Some((0.0, 0.0))),
        ];

        let sent = broadcast(&sms, &users, "测试通知").await;
        assert_eq!(sent, 2);
    }
}
