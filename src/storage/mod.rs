//! 存储层模块
//!
//! 安全事件日志（内存 / SQLite）和上传文件存储。

pub mod files;
pub mod memory;
pub mod repository;
pub mod sqlite;

pub use files::{FileStore, MemoryFileStore, NewUpload, UploadedFileRecord};
pub use memory::MemoryEventStore;
pub use repository::SecurityEventRepository;
pub use sqlite::SqliteEventStore;
