//! 文件 DTO
//!
//! 上传与文件列表的响应对象

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::files::UploadedFileRecord;

/// 文件响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileResponse {
    /// 文件 ID
    pub id: String,

    /// 清洗后的文件名
    pub filename: String,

    /// 上传时的原始文件名（与清洗结果不同时返回）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    /// 大小（字节）
    pub size: u64,

    /// 选中的施工类别
    pub categories: Vec<String>,

    /// 上传时间
    pub uploaded_at: DateTime<Utc>,
}

impl From<UploadedFileRecord> for FileResponse {
    fn from(record: UploadedFileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            original_filename: None,
            size: record.size,
            categories: record.categories,
            uploaded_at: record.uploaded_at,
        }
    }
}

/// 文件列表响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListResponse {
    pub files: Vec<FileResponse>,
    pub total: usize,
}

impl From<Vec<UploadedFileRecord>> for FileListResponse {
    fn from(records: Vec<UploadedFileRecord>) -> Self {
        let files: Vec<FileResponse> = records.into_iter().map(FileResponse::from).collect();
        Self {
            total: files.len(),
            files,
        }
    }
}

/// 根路径响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
}

/// 拆分逗号分隔的类别，去掉空白与空项
pub fn parse_categories(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|category| !category.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_categories() {
        assert_eq!(
            parse_categories(Some(" brick, concrete ,,roofing ")),
            vec!["brick", "concrete", "roofing"]
        );
        assert!(parse_categories(Some(" , ")).is_empty());
        assert!(parse_categories(None).is_empty());
    }
}
