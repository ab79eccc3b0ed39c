use axum::Json;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// 用户角色，写入 JWT 的 role 字段
pub mod roles {
    pub const CITIZEN: &str = "citizen";
    pub const ADMIN: &str = "admin";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // 用户ID
    pub role: String, // citizen / admin
    pub exp: i64,     // 过期时间
    pub iat: i64,     // 签发时间
}

pub fn generate_token(
    user_id: &str,
    role: &str,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::seconds(config.jwt_expiration().as_secs() as i64))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration,
        iat: Utc::now().timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

// 所有 handler 的统一响应外壳
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub msg: String,
    pub resp_data: Option<T>,
}

pub fn success_to_api_response<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code: 0,
        msg: "success".into(),
        resp_data: Some(data),
    })
}

pub fn error_to_api_response<T>(code: i32, msg: String) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        code,
        msg,
        resp_data: None,
    })
}

pub mod error_codes {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION_ERROR: i32 = 1000;
    pub const USER_EXISTS: i32 = 1001;
    pub const AUTH_FAILED: i32 = 1002;
    pub const PERMISSION_DENIED: i32 = 1003;
    pub const NOT_FOUND: i32 = 1004;
    pub const RATE_LIMIT: i32 = 1005;
    pub const GEOCODING_FAILED: i32 = 1006;
    pub const INTERNAL_ERROR: i32 = 5000;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_url: String::new(),
            redis_url: String::new(),
            jwt_secret: "test-secret".into(),
            jwt_expiration_secs: 3600,
            rate_limit_window_secs: 60,
            rate_limit_requests: 100,
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            admin_username: "admin".into(),
            admin_password: "admin".into(),
            geocoder_base_url: String::new(),
            geocode_timeout_secs: 15,
            geocode_max_retries: 3,
            otp_ttl_secs: 300,
            otp_sweep_interval_secs: 300,
            sms_account_sid: String::new(),
            sms_auth_token: String::new(),
            sms_from_number: String::new(),
            weather_base_url: String::new(),
            weather_workers: 10,
            weather_timeout_secs: 8,
            alert_radius_km: 10.0,
            max_search_radius_km: 50.0,
        }
    }

    #[test]
    fn token_round_trip_keeps_subject_and_role() {
        let config = test_config();
        let (token, expires_at) = generate_token("user-1", roles::ADMIN, &config).unwrap();
        assert!(expires_at > Utc::now().timestamp());

        let claims = verify_token(&token, &config).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.role, roles::ADMIN);
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let config = test_config();
        let (token, _) = generate_token("user-1", roles::CITIZEN, &config).unwrap();

        let mut other = test_config();
        other.jwt_secret = "other-secret".into();
        assert!(verify_token(&token, &other).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret!").unwrap();
        assert!(verify_password("s3cret!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }
}
