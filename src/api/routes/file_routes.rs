//! File Routes
//!
//! 定义上传与文件相关的 API 路由。

use axum::{
    Router,
    routing::{get, post},
};

use crate::api::app_state::AppState;
use crate::api::handlers::file_handler::*;

/// 创建文件路由器，上传路由取自配置
pub fn create_file_router(upload_route: &str) -> Router<AppState> {
    Router::new()
        .route(upload_route, post(generate_boq))
        .route("/api/files", get(list_files))
        .route("/api/files/:id/download", get(download_file))
}
