//! DTO 模块
//!
//! 数据传输对象，用于 API 请求和响应的序列化。

pub mod category_dto;
pub mod file_dto;

pub use category_dto::*;
pub use file_dto::*;
