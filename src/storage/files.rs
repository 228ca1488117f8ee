//! 上传文件存储
//!
//! 管道放行后，处理器把 `(identity, filename, size, content)` 交给文件存储。
//! 管道本身不持有存储。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::security::identity::ClientIdentity;

/// 已上传文件记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedFileRecord {
    pub id: String,
    /// 认证后的主体
    pub owner: String,
    pub client_identity: ClientIdentity,
    /// 清洗后的文件名
    pub filename: String,
    pub size: u64,
    pub categories: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
}

/// 新上传，尚未分配 ID
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub owner: String,
    pub client_identity: ClientIdentity,
    pub filename: String,
    pub content: Vec<u8>,
    pub categories: Vec<String>,
}

/// 文件存储 trait
#[async_trait]
pub trait FileStore: Send + Sync {
    /// 保存文件，返回记录
    async fn store(&self, upload: NewUpload) -> Result<UploadedFileRecord>;

    /// 列出某主体的文件，按上传时间倒序
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UploadedFileRecord>>;

    /// 读取文件内容
    async fn content(&self, id: &str) -> Result<Option<Vec<u8>>>;
}

/// 内存文件存储
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: RwLock<Vec<(UploadedFileRecord, Vec<u8>)>>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn store(&self, upload: NewUpload) -> Result<UploadedFileRecord> {
        let record = UploadedFileRecord {
            id: Uuid::new_v4().to_string(),
            owner: upload.owner,
            client_identity: upload.client_identity,
            filename: upload.filename,
            size: upload.content.len() as u64,
            categories: upload.categories,
            uploaded_at: Utc::now(),
        };
        self.files
            .write()
            .await
            .push((record.clone(), upload.content));
        Ok(record)
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UploadedFileRecord>> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .rev()
            .filter(|(record, _)| record.owner == owner)
            .map(|(record, _)| record.clone())
            .collect())
    }

    async fn content(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let files = self.files.read().await;
        Ok(files
            .iter()
            .find(|(record, _)| record.id == id)
            .map(|(_, content)| content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(owner: &str, filename: &str) -> NewUpload {
        NewUpload {
            owner: owner.to_string(),
            client_identity: ClientIdentity::from("10.0.0.1"),
            filename: filename.to_string(),
            content: b"hello".to_vec(),
            categories: vec!["brick".to_string()],
        }
    }

    #[tokio::test]
    async fn test_store_and_list_by_owner() {
        let store = MemoryFileStore::new();
        store.store(upload("alice", "a.pdf")).await.unwrap();
        store.store(upload("bob", "b.pdf")).await.unwrap();
        let second = store.store(upload("alice", "c.txt")).await.unwrap();

        let files = store.list_by_owner("alice").await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].id, second.id);
        assert_eq!(files[0].size, 5);
    }

    #[tokio::test]
    async fn test_content_lookup() {
        let store = MemoryFileStore::new();
        let record = store.store(upload("alice", "a.pdf")).await.unwrap();

        assert_eq!(
            store.content(&record.id).await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(store.content("missing").await.unwrap(), None);
    }
}
