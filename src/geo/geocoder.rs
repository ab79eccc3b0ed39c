use std::time::Duration;

use serde::Deserialize;

use super::Coordinate;
use crate::config::Config;

const USER_AGENT: &str = "dms-backend/1.0";
const REVERSE_TIMEOUT: Duration = Duration::from_secs(10);
const REVERSE_MAX_RETRIES: u32 = 2;

/// Nominatim 风格的地理编码适配器
///
/// 超时和瞬时网络错误在重试预算内重试，带退避；
/// 正常返回的空结果和响应解析失败不重试，直接视为未找到
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

// Nominatim 把经纬度编码为字符串
#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    display_name: Option<String>,
}

fn hit_to_coordinate(hit: &SearchHit) -> Option<Coordinate> {
    let latitude = hit.lat.parse::<f64>().ok()?;
    let longitude = hit.lon.parse::<f64>().ok()?;
    Some(Coordinate::new(latitude, longitude))
}

impl Geocoder {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.geocode_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.geocoder_base_url.clone(),
            max_retries: config.geocode_max_retries.max(1),
        })
    }

    /// 地址 -> 坐标，未找到或重试耗尽返回 None，由调用方决定是否致命
    pub async fn geocode(&self, address: &str) -> Option<Coordinate> {
        let url = format!("{}/search", self.base_url);

        for attempt in 1..=self.max_retries {
            let response = self
                .client
                .get(&url)
                .query(&[
                    ("q", address),
                    ("format", "json"),
                    ("addressdetails", "1"),
                    ("limit", "1"),
                ])
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            let response = match response {
                Ok(resp) => resp,
                Err(e) if e.is_timeout() => {
                    tracing::warn!(
                        "Geocoding timed out for address: {}. Attempt {}/{}",
                        address,
                        attempt,
                        self.max_retries
                    );
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::error!("Geocoding request error: {}", e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    continue;
                }
            };

            // 响应体异常不重试
            let hits = match response.json::<Vec<SearchHit>>().await {
                Ok(hits) => hits,
                Err(e) => {
                    tracing::error!("Error parsing geocoding response: {}", e);
                    return None;
                }
            };

            // 正常的空结果同样不重试
            let Some(hit) = hits.first() else {
                tracing::warn!("No results found for address: {}", address);
                return None;
            };

            return match hit_to_coordinate(hit) {
                Some(coord) => {
                    tracing::info!(
                        "Geocoded address: {} -> ({}, {})",
                        address,
                        coord.latitude,
                        coord.longitude
                    );
                    Some(coord)
                }
                None => {
                    tracing::error!("Geocoding response carried unparsable coordinates");
                    None
                }
            };
        }

        tracing::error!(
            "Failed to geocode address after {} attempts: {}",
            self.max_retries,
            address
        );
        None
    }

    /// 坐标 -> 可读地址，尽力而为
    pub async fn reverse_geocode(&self, coord: Coordinate) -> Option<String> {
        let url = format!("{}/reverse", self.base_url);

        for attempt in 1..=REVERSE_MAX_RETRIES {
            let response = self
                .client
                .get(&url)
                .timeout(REVERSE_TIMEOUT)
                .query(&[
                    ("lat", coord.latitude.to_string()),
                    ("lon", coord.longitude.to_string()),
                    ("format", "json".to_string()),
                    ("zoom", "18".to_string()),
                ])
                .send()
                .await
                .and_then(|resp| resp.error_for_status());

            match response {
                Ok(resp) => {
                    return resp
                        .json::<ReverseHit>()
                        .await
                        .ok()
                        .and_then(|hit| hit.display_name);
                }
                Err(e) if e.is_timeout() => {
                    tracing::warn!(
                        "Reverse geocoding timed out. Attempt {}/{}",
                        attempt,
                        REVERSE_MAX_RETRIES
                    );
                    if attempt < REVERSE_MAX_RETRIES {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Reverse geocoding request error: {}", e);
                    return None;
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nominatim_search_response() {
        let body = r#"[{"place_id": 1, "lat": "28.6139391", "lon": "77.2090212", "display_name": "New Delhi, India"}]"#;
        let hits: Vec<SearchHit> = serde_json::from_str(body).unwrap();
        let coord = hit_to_coordinate(&hits[0]).unwrap();
        assert!((coord.latitude - 28.6139391).abs() < 1e-9);
        assert!((coord.longitude - 77.2090212).abs() < 1e-9);
    }

    #[test]
    fn unparsable_coordinates_are_rejected() {
        let hit = SearchHit {
            lat: "not-a-number".into(),
            lon: "77.2".into(),
        };
        assert!(hit_to_coordinate(&hit).is_none());
    }

    #[test]
    fn empty_search_response_deserializes() {
        let hits: Vec<SearchHit> = serde_json::from_str("[]").unwrap();
        assert!(hits.is_empty());
    }
}
