//! System Routes
//!
//! 定义根路径、健康检查、类别目录和指标路由。

use axum::{Router, routing::get};

use crate::api::app_state::AppState;
use crate::api::handlers::system_handler::*;

/// 创建系统路由器
pub fn create_system_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/categories", get(list_categories))
        .route("/metrics", get(metrics))
}
