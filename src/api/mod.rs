//! API 模块
//!
//! 提供 REST API 支持。所有路由都经过安全管道。

pub mod app_state;
pub mod dto;
pub mod handlers;
pub mod routes;

use crate::api::app_state::AppState;
use crate::config::config::AppConfig;
use crate::error::ErrorResponse;
use crate::security::middleware::{
    cors_layer, security_headers_middleware, security_pipeline_middleware,
};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// 组装路由和中间件
///
/// 从外到内：安全响应头 → panic 捕获 → CORS → 请求追踪/超时 → 安全管道 → 处理器。
/// 管道自行限制请求体大小，因此关闭 axum 的默认上限。
pub fn create_router(app_state: AppState, config: &AppConfig) -> Router {
    let pipeline = Arc::clone(&app_state.pipeline);

    Router::new()
        .merge(routes::system_routes::create_system_router())
        .merge(routes::file_routes::create_file_router(&config.upload.route))
        .layer(axum::middleware::from_fn_with_state(
            pipeline,
            security_pipeline_middleware,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.security.cors_allowed_origins))
        .layer(CatchPanicLayer::custom(handle_panic))
        // Add security headers middleware to all routes
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .with_state(app_state)
}

/// 处理器 panic 时返回通用 500，细节只进日志
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = %detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("INTERNAL_ERROR", "Internal server error")),
    )
        .into_response()
}
