use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use dms_backend::{
    AppState,
    config::Config,
    geo::geocoder::Geocoder,
    middleware::{auth_middleware, log_requests, rate_limit, require_admin},
    otp::OtpStore,
    routes,
    sms::SmsSender,
    weather::WeatherScanner,
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 设置数据库连接池
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                conn.execute("SET application_name = 'dms_backend';").await?;
                Ok(())
            })
        })
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to Postgres");

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");

    // 外部服务适配器
    let geocoder = Arc::new(Geocoder::new(&config).expect("Failed to build geocoder client"));
    let sms = Arc::new(SmsSender::new(&config).expect("Failed to build sms client"));
    let weather = Arc::new(WeatherScanner::new(&config).expect("Failed to build weather client"));

    if !config.sms_configured() {
        tracing::warn!("SMS gateway not configured, messages will be logged only");
    }

    // OTP 存储与后台清扫：显式启动，关闭时显式停止
    let otp = Arc::new(OtpStore::new(config.otp_ttl(), config.otp_sweep_interval()));
    otp.clone().start();

    // 设置应用状态
    let state = AppState {
        pool,
        config: config.clone(),
        redis: Arc::new(redis_client),
        geocoder,
        sms,
        otp,
        weather,
    };

    // 将路由分为公开路由、认证路由和管理员路由
    let public_routes = Router::new()
        .route("/users/signup", post(routes::user::signup))
        .route("/users/verify-otp", post(routes::user::verify_otp))
        .route("/users/login", post(routes::user::login))
        .route("/admin/login", post(routes::user::admin_login));

    let citizen_routes = Router::new()
        .route("/disasters/report", post(routes::disaster::report_disaster))
        .route("/disasters/nearby-safe", get(routes::disaster::nearby_safe))
        .route(
            "/safe-locations/list",
            get(routes::safe_location::list_safe_locations),
        );

    let admin_routes = Router::new()
        .route("/admin/assign-team", post(routes::disaster::assign_team))
        .route("/admin/alert", post(routes::disaster::admin_alert))
        .route("/teams/create", post(routes::team::create_team))
        .route("/teams/list", get(routes::team::list_teams))
        .route(
            "/teams/set-available",
            post(routes::team::set_team_available),
        )
        .route(
            "/safe-locations/create",
            post(routes::safe_location::create_safe_location),
        )
        .route("/weather/scan", post(routes::weather::scan_weather))
        // 管理员闸门在认证中间件之内执行
        .layer(axum::middleware::from_fn(require_admin));

    let protected_routes = citizen_routes.merge(admin_routes).layer(
        axum::middleware::from_fn_with_state(state.clone(), auth_middleware),
    );

    // 创建基础路由
    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    // 添加日志中间件和限流中间件
    let router = router
        .layer(axum::middleware::from_fn(log_requests))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit,
        ));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    // 添加应用状态
    let app = router.with_state(state.clone());

    // 启动服务器
    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 收尾：停掉 OTP 清扫任务
    state.otp.stop();
    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
