use std::cmp::Ordering;
use std::sync::Arc;

use redis::{AsyncCommands, Client as RedisClient};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{Coordinate, Locatable, find_within};

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SafeLocation {
    pub location_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: i32,
}

impl Locatable for SafeLocation {
    fn coordinate(&self) -> Option<Coordinate> {
        Some(Coordinate::new(self.latitude, self.longitude))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSafeLocationRequest {
    pub name: String,
    pub address: String,
    pub capacity: i32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// 邻近查询结果，带距离，进缓存
#[derive(Debug, Serialize, Deserialize)]
pub struct NearbySafeLocation {
    pub location_id: String,
    pub name: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    pub capacity: i32,
    pub distance_km: f64,
}

// 缓存相关常量
const NEARBY_CACHE_EXPIRE: u64 = 120; // 邻近查询缓存过期时间，单位秒
const NEARBY_CACHE_PREFIX: &str = "safe:loc:"; // 邻近查询缓存前缀

const LOCATION_COLUMNS: &str = "location_id, name, address, latitude, longitude, capacity";

impl SafeLocation {
    pub async fn create(
        pool: &PgPool,
        req: CreateSafeLocationRequest,
        coord: Coordinate,
    ) -> Result<Self, sqlx::Error> {
        let location_id = Uuid::new_v4().to_string();

        let location = sqlx::query_as::<_, SafeLocation>(&format!(
            r#"
            INSERT INTO safe_locations (location_id, name, address, latitude, longitude, capacity)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {LOCATION_COLUMNS}
            "#
        ))
        .bind(&location_id)
        .bind(&req.name)
        .bind(&req.address)
        .bind(coord.latitude)
        .bind(coord.longitude)
        .bind(req.capacity)
        .fetch_one(pool)
        .await?;

        Ok(location)
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let locations = sqlx::query_as::<_, SafeLocation>(&format!(
            "SELECT {LOCATION_COLUMNS} FROM safe_locations ORDER BY name"
        ))
        .fetch_all(pool)
        .await?;

        Ok(locations)
    }

    /// 半径内的安全地点，按距离升序；距离相同保持查询结果顺序
    pub async fn find_nearby(
        pool: &PgPool,
        redis: &Arc<RedisClient>,
        center: Coordinate,
        radius_km: f64,
    ) -> Result<Vec<NearbySafeLocation>, sqlx::Error> {
        // 坐标取到小数点后两位作为缓存key
        let lat_rounded = (center.latitude * 100.0).round() / 100.0;
        let lon_rounded = (center.longitude * 100.0).round() / 100.0;
        let cache_key = format!(
            "{}{}:{}:{}",
            NEARBY_CACHE_PREFIX, lat_rounded, lon_rounded, radius_km
        );

        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            let cached: redis::RedisResult<String> = conn.get(&cache_key).await;

            if let Ok(json_str) = cached {
                if let Ok(nearby) = serde_json::from_str::<Vec<NearbySafeLocation>>(&json_str) {
                    tracing::debug!("Get nearby safe locations from cache: {}", cache_key);
                    return Ok(nearby);
                }
            }
        }

        // 先用经纬度包围盒粗筛，再精确计算距离
        let lat_range = radius_km / 111.0; // 1度纬度约111km
        let lon_range = radius_km / (111.0 * center.latitude.to_radians().cos());

        let candidates = sqlx::query_as::<_, SafeLocation>(&format!(
            r#"
            SELECT {LOCATION_COLUMNS}
            FROM safe_locations
            WHERE
                latitude BETWEEN ($1::DOUBLE PRECISION - $3::DOUBLE PRECISION)
                AND ($1::DOUBLE PRECISION + $3::DOUBLE PRECISION)
                AND longitude BETWEEN ($2::DOUBLE PRECISION - $4::DOUBLE PRECISION)
                AND ($2::DOUBLE PRECISION + $4::DOUBLE PRECISION)
            "#
        ))
        .bind(center.latitude)
        .bind(center.longitude)
        .bind(lat_range)
        .bind(lon_range)
        .fetch_all(pool)
        .await?;

        let mut nearby: Vec<NearbySafeLocation> = find_within(center, radius_km, &candidates)
            .into_iter()
            .map(|(location, distance_km)| NearbySafeLocation {
                location_id: location.location_id.clone(),
                name: location.name.clone(),
                address: location.address.clone(),
                latitude: location.latitude,
                longitude: location.longitude,
                capacity: location.capacity,
                distance_km,
            })
            .collect();

        // 稳定排序：距离相同时维持输入顺序
        nearby.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(Ordering::Equal)
        });

        // 位置查询结果变化较快，缓存时间较短
        if let Ok(mut conn) = redis.get_multiplexed_async_connection().await {
            if let Ok(json_str) = serde_json::to_string(&nearby) {
                let _: Result<(), redis::RedisError> =
                    conn.set_ex(&cache_key, json_str, NEARBY_CACHE_EXPIRE).await;
                tracing::debug!("Set nearby safe locations to cache: {}", cache_key);
            }
        }

        Ok(nearby)
    }
}
