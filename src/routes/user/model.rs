use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::geo::{Coordinate, Locatable};
use crate::utils::hash_password;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub verified: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Locatable for User {
    fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::from_parts(self.latitude, self.longitude)
    }
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub full_name: String,
    pub phone: String,
    pub email: String,
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub phone: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub phone_or_email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: String,
    pub full_name: String,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub token: String,
}

impl From<User> for UserInfo {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            full_name: user.full_name,
            phone: user.phone,
            email: user.email,
            verified: user.verified,
        }
    }
}

/// 印度手机号：10 位数字，首位 6-9
pub fn is_valid_phone(phone: &str) -> bool {
    phone.len() == 10
        && phone.chars().all(|c| c.is_ascii_digit())
        && matches!(phone.as_bytes()[0], b'6'..=b'9')
}

const USER_COLUMNS: &str = "user_id, full_name, phone, email, address, city, state, pincode, \
     password_hash, verified, latitude, longitude";

impl User {
    pub async fn create(
        pool: &PgPool,
        req: SignupRequest,
        coord: Option<Coordinate>,
    ) -> Result<Self, sqlx::Error> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE phone = $1 OR email = $2)",
        )
        .bind(&req.phone)
        .bind(&req.email)
        .fetch_one(pool)
        .await?;

        if exists {
            return Err(sqlx::Error::Protocol(
                "User with this phone/email already exists".into(),
            ));
        }

        let password_hash = hash_password(&req.password)
            .map_err(|e| sqlx::Error::Protocol(format!("Failed to hash password: {}", e)))?;
        let user_id = Uuid::new_v4().to_string();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                user_id, full_name, phone, email, address, city, state, pincode,
                password_hash, verified, latitude, longitude
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, false, $10, $11)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user_id)
        .bind(&req.full_name)
        .bind(&req.phone)
        .bind(&req.email)
        .bind(&req.address)
        .bind(&req.city)
        .bind(&req.state)
        .bind(&req.pincode)
        .bind(&password_hash)
        .bind(coord.map(|c| c.latitude))
        .bind(coord.map(|c| c.longitude))
        .fetch_one(pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_phone_or_email(
        pool: &PgPool,
        identifier: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE phone = $1 OR email = $1"
        ))
        .bind(identifier)
        .fetch_optional(pool)
        .await?;

        Ok(user)
    }

    /// OTP 验证通过后置位，返回是否确有此用户
    pub async fn mark_verified(pool: &PgPool, phone: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET verified = true WHERE phone = $1")
            .bind(phone)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 预警扇出用的快照：只要有坐标的用户
    pub async fn find_with_coordinates(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL"
        ))
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn find_by_city(pool: &PgPool, city: &str) -> Result<Vec<Self>, sqlx::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE city = $1"
        ))
        .bind(city)
        .fetch_all(pool)
        .await?;

        Ok(users)
    }

    pub async fn verify_login(&self, password: &str) -> Result<bool, bcrypt::BcryptError> {
        crate::utils::verify_password(password, &self.password_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_indian_mobile_numbers() {
        assert!(is_valid_phone("9876543210"));
        assert!(is_valid_phone("6000000000"));
    }

    #[test]
    fn rejects_malformed_phone_numbers() {
        assert!(!is_valid_phone(""));
        assert!(!is_valid_phone("12345"));
        assert!(!is_valid_phone("5876543210")); // 首位必须 6-9
        assert!(!is_valid_phone("98765432101")); // 11 位
        assert!(!is_valid_phone("987654321x"));
    }
}
