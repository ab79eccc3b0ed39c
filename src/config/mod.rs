use std::env;
use std::time::Duration;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub admin_username: String,
    pub admin_password: String,
    pub geocoder_base_url: String,
    pub geocode_timeout_secs: u64,
    pub geocode_max_retries: u32,
    pub otp_ttl_secs: u64,
    pub otp_sweep_interval_secs: u64,
    pub sms_account_sid: String,
    pub sms_auth_token: String,
    pub sms_from_number: String,
    pub weather_base_url: String,
    pub weather_workers: usize,
    pub weather_timeout_secs: u64,
    pub alert_radius_km: f64,
    pub max_search_radius_km: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")?
            .trim_end_matches('h')
            .parse::<u64>()
            .unwrap_or(24);
        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL")?,
            server_host: env::var("SERVER_HOST")?,
            server_port: env::var("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
            jwt_secret: env::var("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            rate_limit_window_secs: env::var("RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(60),
            rate_limit_requests: env::var("RATE_LIMIT_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            admin_password: env::var("ADMIN_PASSWORD")?,
            geocoder_base_url: env::var("GEOCODER_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".into()),
            geocode_timeout_secs: env::var("GEOCODE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(15),
            geocode_max_retries: env::var("GEOCODE_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),
            otp_ttl_secs: env::var("OTP_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            otp_sweep_interval_secs: env::var("OTP_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            sms_account_sid: env::var("TWILIO_SID").unwrap_or_default(),
            sms_auth_token: env::var("TWILIO_AUTH").unwrap_or_default(),
            sms_from_number: env::var("TWILIO_PHONE").unwrap_or_default(),
            weather_base_url: env::var("WEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://wttr.in".into()),
            weather_workers: env::var("WEATHER_WORKERS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            weather_timeout_secs: env::var("WEATHER_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            alert_radius_km: env::var("ALERT_RADIUS_KM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10.0),
            max_search_radius_km: env::var("MAX_SEARCH_RADIUS_KM")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50.0),
        })
    }

    pub fn jwt_expiration(&self) -> Duration {
        Duration::from_secs(self.jwt_expiration_secs)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }

    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }

    pub fn otp_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.otp_sweep_interval_secs)
    }

    pub fn weather_timeout(&self) -> Duration {
        Duration::from_secs(self.weather_timeout_secs)
    }

    /// SMS 网关是否已配置，未配置时降级为日志输出
    pub fn sms_configured(&self) -> bool {
        !self.sms_account_sid.is_empty()
            && !self.sms_auth_token.is_empty()
            && !self.sms_from_number.is_empty()
    }
}
