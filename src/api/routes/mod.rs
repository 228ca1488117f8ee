//! Routes 模块
//!
//! 定义 API 路由。

pub mod file_routes;
pub mod system_routes;
