//! Persistence of generated QA items.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Result, RetrievalError};
use crate::model::QaItem;

/// Storage for QA items, keyed by owner.
#[async_trait]
pub trait QaStore: Send + Sync {
    /// Every stored item, in insertion order.
    async fn load_all(&self) -> Result<Vec<QaItem>>;

    /// Replace all items of `owner_id` with `items`.
    async fn replace_owner(&self, owner_id: &str, items: Vec<QaItem>) -> Result<()>;

    /// Delete all items of `owner_id`, returning how many were removed.
    async fn delete_owner(&self, owner_id: &str) -> Result<usize>;
}

fn check_owner(owner_id: &str, items: &[QaItem]) -> Result<()> {
    match items.iter().find(|item| item.owner_id != owner_id) {
        Some(item) => Err(RetrievalError::Storage(format!(
            "item owned by {} passed for owner {owner_id}",
            item.owner_id
        ))),
        None => Ok(()),
    }
}

fn replace_in(all: &mut Vec<QaItem>, owner_id: &str, items: Vec<QaItem>) {
    all.retain(|item| item.owner_id != owner_id);
    all.extend(items);
}

fn delete_in(all: &mut Vec<QaItem>, owner_id: &str) -> usize {
    let before = all.len();
    all.retain(|item| item.owner_id != owner_id);
    before - all.len()
}

/// Store that keeps items in memory only.
#[derive(Debug, Default)]
pub struct InMemoryQaStore {
    items: RwLock<Vec<QaItem>>,
}

impl InMemoryQaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<QaItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }
}

#[async_trait]
impl QaStore for InMemoryQaStore {
    async fn load_all(&self) -> Result<Vec<QaItem>> {
        Ok(self.items.read().await.clone())
    }

    async fn replace_owner(&self, owner_id: &str, items: Vec<QaItem>) -> Result<()> {
        check_owner(owner_id, &items)?;
        replace_in(&mut *self.items.write().await, owner_id, items);
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<usize> {
        Ok(delete_in(&mut *self.items.write().await, owner_id))
    }
}

/// Store persisted as a JSON array in a single file.
///
/// Every change rewrites the file through a temporary sibling that is then
/// renamed over it, so readers never see a partial file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    items: RwLock<Vec<QaItem>>,
}

impl JsonFileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let items: Vec<QaItem> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened QA store at {} ({} items)", path.display(), items.len());
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, items: &[QaItem]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp: OsString = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let bytes = serde_json::to_vec_pretty(items)?;
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Persisted {} items to {}", items.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl QaStore for JsonFileStore {
    async fn load_all(&self) -> Result<Vec<QaItem>> {
        Ok(self.items.read().await.clone())
    }

    async fn replace_owner(&self, owner_id: &str, items: Vec<QaItem>) -> Result<()> {
        check_owner(owner_id, &items)?;

        let mut guard = self.items.write().await;
        let mut next = guard.clone();
        replace_in(&mut next, owner_id, items);
        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    async fn delete_owner(&self, owner_id: &str) -> Result<usize> {
        let mut guard = self.items.write().await;
        let mut next = guard.clone();
        let removed = delete_in(&mut next, owner_id);
        if removed > 0 {
            self.persist(&next).await?;
            *guard = next;
        }
        Ok(removed)
    }
}
