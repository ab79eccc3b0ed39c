use futures_util::{StreamExt, stream};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::config::Config;

const USER_AGENT: &str = "dms-backend/1.0";

/// 极端天气判定阈值
const EXTREME_TEMP_HIGH: f64 = 40.0;
const EXTREME_TEMP_LOW: f64 = -10.0;
const ADVISORY_TEMP_HIGH: f64 = 35.0;
const ADVISORY_TEMP_LOW: f64 = -5.0;
const EXTREME_WIND_KMPH: f64 = 20.0;
const SEVERE_CONDITIONS: &[&str] = &["thunder", "storm", "tornado", "hurricane", "cyclone"];

/// 例行巡检覆盖的主要城市
pub const DEFAULT_CITIES: &[&str] = &[
    // 北部
    "Delhi, India",
    "Jaipur, Rajasthan, India",
    "Lucknow, Uttar Pradesh, India",
    "Chandigarh, India",
    "Dehradun, Uttarakhand, India",
    "Amritsar, Punjab, India",
    "Jammu, Jammu and Kashmir, India",
    "Srinagar, Jammu and Kashmir, India",
    "Shimla, Himachal Pradesh, India",
    // 西部
    "Mumbai, Maharashtra, India",
    "Pune, Maharashtra, India",
    "Nagpur, Maharashtra, India",
    "Ahmedabad, Gujarat, India",
    "Surat, Gujarat, India",
    "Vadodara, Gujarat, India",
    "Bhopal, Madhya Pradesh, India",
    "Indore, Madhya Pradesh, India",
    "Jodhpur, Rajasthan, India",
    "Udaipur, Rajasthan, India",
    "Goa, India",
    // 南部
    "Bangalore, Karnataka, India",
    "Mysore, Karnataka, India",
    "Hyderabad, Telangana, India",
    "Chennai, Tamil Nadu, India",
    "Coimbatore, Tamil Nadu, India",
    "Madurai, Tamil Nadu, India",
    "Kochi, Kerala, India",
    "Thiruvananthapuram, Kerala, India",
    "Visakhapatnam, Andhra Pradesh, India",
    "Vijayawada, Andhra Pradesh, India",
    "Pondicherry, India",
    // 东部
    "Kolkata, West Bengal, India",
    "Howrah, West Bengal, India",
    "Patna, Bihar, India",
    "Ranchi, Jharkhand, India",
    "Bhubaneswar, Odisha, India",
    "Cuttack, Odisha, India",
    "Guwahati, Assam, India",
    "Shillong, Meghalaya, India",
    "Imphal, Manipur, India",
    "Agartala, Tripura, India",
    "Kohima, Nagaland, India",
    // 中部
    "Raipur, Chhattisgarh, India",
    "Bilaspur, Chhattisgarh, India",
    "Jabalpur, Madhya Pradesh, India",
    "Gwalior, Madhya Pradesh, India",
];

#[derive(Debug, Clone, Serialize)]
pub struct WeatherReport {
    pub location: String,
    pub temperature: Option<f64>,
    pub humidity: Option<i64>,
    pub wind_speed: Option<f64>,
    pub condition: String,
    pub is_extreme: bool,
    pub alert: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct WeatherScan {
    pub checked: usize,
    pub succeeded: usize,
    pub extremes: Vec<WeatherReport>,
}

// wttr.in 的 j1 格式：数值都编码为字符串
#[derive(Debug, Deserialize)]
struct WttrResponse {
    #[serde(default)]
    current_condition: Vec<CurrentCondition>,
    #[serde(default)]
    nearest_area: Vec<NearestArea>,
}

#[derive(Debug, Deserialize)]
struct CurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: Option<String>,
    humidity: Option<String>,
    #[serde(rename = "windspeedKmph")]
    windspeed_kmph: Option<String>,
    #[serde(rename = "weatherDesc", default)]
    weather_desc: Vec<ValueWrapper>,
}

#[derive(Debug, Deserialize)]
struct ValueWrapper {
    value: String,
}

#[derive(Debug, Deserialize)]
struct NearestArea {
    latitude: Option<String>,
    longitude: Option<String>,
}

fn parse_number(raw: &Option<String>) -> Option<f64> {
    raw.as_deref().filter(|s| !s.is_empty())?.parse().ok()
}

/// 阈值判定：返回 (是否极端, 预警文案)
///
/// 温度超过 40°C / 低于 -10°C 为极端，35°C / -5°C 只出提示；
/// 风速超过 20km/h 为极端；天气描述命中强对流关键词为极端。
/// 后判定的条件覆盖先前的文案
fn classify(temperature: Option<f64>, wind_speed: Option<f64>, condition: &str) -> (bool, Option<String>) {
    let mut is_extreme = false;
    let mut alert = None;

    if let Some(temp) = temperature {
        if temp > EXTREME_TEMP_HIGH || temp < EXTREME_TEMP_LOW {
            is_extreme = true;
            alert = Some(format!("Extreme temperature: {temp}°C"));
        } else if temp > ADVISORY_TEMP_HIGH || temp < ADVISORY_TEMP_LOW {
            alert = Some(format!("High temperature: {temp}°C"));
        }
    }

    if let Some(wind) = wind_speed {
        if wind > EXTREME_WIND_KMPH {
            is_extreme = true;
            alert = Some(format!("High wind speed: {wind} km/h"));
        }
    }

    let lowered = condition.to_lowercase();
    if SEVERE_CONDITIONS.iter().any(|c| lowered.contains(c)) {
        is_extreme = true;
        alert = Some(format!("Severe weather: {condition}"));
    }

    (is_extreme, alert)
}

fn report_from_response(location: &str, response: WttrResponse) -> Option<WeatherReport> {
    let current = response.current_condition.into_iter().next()?;

    let temperature = parse_number(&current.temp_c);
    let humidity = parse_number(&current.humidity).map(|h| h as i64);
    let wind_speed = parse_number(&current.windspeed_kmph);
    let condition = current
        .weather_desc
        .into_iter()
        .next()
        .map(|d| d.value)
        .unwrap_or_else(|| "Unknown".to_string());

    let nearest = response.nearest_area.into_iter().next();
    let latitude = nearest.as_ref().and_then(|a| parse_number(&a.latitude));
    let longitude = nearest.as_ref().and_then(|a| parse_number(&a.longitude));

    let (is_extreme, alert) = classify(temperature, wind_speed, &condition);

    Some(WeatherReport {
        location: location.to_string(),
        temperature,
        humidity,
        wind_speed,
        condition,
        is_extreme,
        alert,
        latitude,
        longitude,
    })
}

/// 多城市并行天气巡检
///
/// 固定大小的并发池把请求扇出，完成顺序不保证，
/// 单个城市失败只跳过，不影响其他城市也不中断巡检
pub struct WeatherScanner {
    client: reqwest::Client,
    base_url: String,
    workers: usize,
}

impl WeatherScanner {
    pub fn new(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.weather_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.weather_base_url.clone(),
            workers: config.weather_workers.max(1),
        })
    }

    async fn fetch_city(&self, location: &str) -> Option<WeatherReport> {
        let mut url = match Url::parse(&self.base_url) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Invalid weather base url: {}", e);
                return None;
            }
        };
        // push 会对路径段做百分号编码
        url.path_segments_mut().ok()?.push(location);
        url.query_pairs_mut().append_pair("format", "j1");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("Failed to fetch weather for {}: {}", location, e);
                return None;
            }
        };

        match response.json::<WttrResponse>().await {
            Ok(body) => report_from_response(location, body),
            Err(e) => {
                tracing::warn!("Malformed weather response for {}: {}", location, e);
                None
            }
        }
    }

    pub async fn poll_cities(&self, cities: &[&str]) -> WeatherScan {
        let fetches: Vec<_> = cities.iter().map(|city| self.fetch_city(city)).collect();
        let reports: Vec<Option<WeatherReport>> = stream::iter(fetches)
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let checked = cities.len();
        let succeeded = reports.iter().flatten().count();
        let extremes: Vec<WeatherReport> = reports
            .into_iter()
            .flatten()
            .filter(|report| report.is_extreme)
            .collect();

        for report in &extremes {
            tracing::warn!(
                "Extreme weather in {}: {}",
                report.location,
                report.alert.as_deref().unwrap_or(&report.condition)
            );
        }
        tracing::info!(
            "Weather scan complete: {}/{} cities, {} extreme",
            succeeded,
            checked,
            extremes.len()
        );

        WeatherScan {
            checked,
            succeeded,
            extremes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderate_weather_is_not_extreme() {
        let (is_extreme, alert) = classify(Some(28.0), Some(10.0), "Sunny");
        assert!(!is_extreme);
        assert!(alert.is_none());
    }

    #[test]
    fn high_but_not_extreme_temperature_only_advises() {
        let (is_extreme, alert) = classify(Some(37.0), None, "Clear");
        assert!(!is_extreme);
        assert_eq!(alert.unwrap(), "High temperature: 37°C");
    }

    #[test]
    fn extreme_temperature_thresholds() {
        assert!(classify(Some(40.5), None, "Clear").0);
        assert!(classify(Some(-10.5), None, "Clear").0);
        assert!(!classify(Some(40.0), None, "Clear").0);
        assert!(!classify(Some(-10.0), None, "Clear").0);
    }

    #[test]
    fn strong_wind_is_extreme() {
        let (is_extreme, alert) = classify(Some(25.0), Some(32.0), "Windy");
        assert!(is_extreme);
        assert_eq!(alert.unwrap(), "High wind speed: 32 km/h");
    }

    #[test]
    fn severe_condition_text_is_extreme_regardless_of_numbers() {
        let (is_extreme, alert) = classify(Some(20.0), Some(5.0), "Patchy Thunderstorm");
        assert!(is_extreme);
        assert_eq!(alert.unwrap(), "Severe weather: Patchy Thunderstorm");
    }

    #[test]
    fn parses_wttr_j1_response() {
        let body = r#"{
            "current_condition": [{
                "temp_C": "42",
                "humidity": "30",
                "windspeedKmph": "12",
                "weatherDesc": [{"value": "Sunny"}]
            }],
            "nearest_area": [{
                "latitude": "28.600",
                "longitude": "77.200"
            }]
        }"#;

        let parsed: WttrResponse = serde_json::from_str(body).unwrap();
        let report = report_from_response("Delhi, India", parsed).unwrap();

        assert_eq!(report.temperature, Some(42.0));
        assert_eq!(report.humidity, Some(30));
        assert_eq!(report.wind_speed, Some(12.0));
        assert!(report.is_extreme);
        assert_eq!(report.latitude, Some(28.6));
    }

    #[test]
    fn response_without_current_condition_is_skipped() {
        let parsed: WttrResponse = serde_json::from_str("{}").unwrap();
        assert!(report_from_response("Nowhere", parsed).is_none());
    }
}
