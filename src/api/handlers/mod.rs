//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod file_handler;
pub mod system_handler;

pub use file_handler::*;
pub use system_handler::*;
