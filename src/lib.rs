//! BOQMate Shield - 请求防御管道
//!
//! 为 BOQMate 文档 API 提供请求入口防护：客户端识别、封禁与限流、
//! 恶意输入检测、上传策略、令牌认证，以及安全事件日志。

pub mod api;
pub mod config;
pub mod error;
pub mod observability;
pub mod security;
pub mod storage;
