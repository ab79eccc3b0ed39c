use std::sync::Arc;

use config::Config;
use geo::geocoder::Geocoder;
use otp::OtpStore;
use redis::Client as RedisClient;
use sms::SmsSender;
use sqlx::PgPool;
use weather::WeatherScanner;

pub mod config;
pub mod geo;
pub mod middleware;
pub mod otp;
pub mod sms;
pub mod utils;
pub mod weather;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub redis: Arc<RedisClient>,
    pub geocoder: Arc<Geocoder>,
    pub sms: Arc<SmsSender>,
    pub otp: Arc<OtpStore>,
    pub weather: Arc<WeatherScanner>,
}
