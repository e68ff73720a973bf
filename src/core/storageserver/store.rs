// src/core/storageserver/store.rs

//! On-disk and in-memory file state for a Storage Server. Each file gets its
//! own `tokio::sync::Mutex`, shard-per-file in the same spirit as a sharded
//! key space: readers and writers of different files never contend, and a
//! writer holding a file's lock serializes every op against that one file.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::core::errors::FsError;

use super::tokenize::{self, Sentence};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEntry {
    pub username: String,
    pub can_read: bool,
    pub can_write: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    pub owner: String,
    pub created_time: i64,
    pub modified_time: i64,
    pub accessed_time: i64,
    pub last_access_user: String,
    pub word_count: usize,
    pub char_count: usize,
    pub access_list: Vec<AccessEntry>,
}

impl FileMetadata {
    /// `"owner (RW)"` followed by each ACL entry as `"user (RW|W|R|-)"`,
    /// the format `INFO` reports access under.
    pub fn access_summary(&self) -> String {
        let mut parts = vec![format!("{} (RW)", self.owner)];
        for entry in &self.access_list {
            let mode = match (entry.can_read, entry.can_write) {
                (true, true) => "RW",
                (false, true) => "W",
                (true, false) => "R",
                (false, false) => "-",
            };
            parts.push(format!("{} ({mode})", entry.username));
        }
        parts.join(", ")
    }
}

pub(crate) fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// In-memory state for one file: its tokenized content, metadata, and the
/// sentence locks held by in-progress write sessions.
pub struct FileState {
    pub sentences: Vec<Sentence>,
    pub metadata: FileMetadata,
    /// sentence index -> user holding the write lock on it
    pub locks: HashMap<usize, String>,
}

impl FileState {
    pub fn check_access(&self, user: &str, need_write: bool) -> Result<(), FsError> {
        if user == self.metadata.owner {
            return Ok(());
        }
        let entry = self
            .metadata
            .access_list
            .iter()
            .find(|e| e.username == user);
        match entry {
            Some(e) if need_write && e.can_write => Ok(()),
            Some(e) if !need_write && e.can_read => Ok(()),
            _ => Err(FsError::Unauthorized),
        }
    }
}

pub struct SsStore {
    data_dir: PathBuf,
    files: DashMap<String, Arc<Mutex<FileState>>>,
}

impl SsStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        SsStore {
            data_dir: data_dir.into(),
            files: DashMap::new(),
        }
    }

    fn files_root(&self) -> PathBuf {
        self.data_dir.join("files")
    }

    fn meta_root(&self) -> PathBuf {
        self.data_dir.join("meta")
    }

    fn undo_root(&self) -> PathBuf {
        self.data_dir.join("undo")
    }

    fn checkpoints_root(&self) -> PathBuf {
        self.data_dir.join("checkpoints")
    }

    fn file_path(&self, file: &str) -> PathBuf {
        self.files_root().join(file)
    }

    fn meta_path(&self, file: &str) -> PathBuf {
        self.meta_root().join(format!("{file}.json"))
    }

    fn undo_path(&self, file: &str) -> PathBuf {
        self.undo_root().join(format!("{file}.bak"))
    }

    fn checkpoint_path(&self, file: &str, tag: &str) -> PathBuf {
        self.checkpoints_root().join(file).join(format!("{tag}.txt"))
    }

    /// Recursively walks the files root, loading every file's metadata and
    /// content into memory. Returns the list of filenames found, for the
    /// Storage Server's registration announcement to the Name Server.
    pub async fn scan_existing(&self) -> Result<Vec<String>, FsError> {
        let root = self.files_root();
        tokio::fs::create_dir_all(&root).await?;
        tokio::fs::create_dir_all(self.meta_root()).await?;
        tokio::fs::create_dir_all(self.undo_root()).await?;
        tokio::fs::create_dir_all(self.checkpoints_root()).await?;

        let mut found = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let relative = path
                    .strip_prefix(&root)
                    .map_err(|e| FsError::Internal(e.to_string()))?
                    .to_string_lossy()
                    .replace('\\', "/");
                if let Ok(()) = self.load_into_memory(&relative).await {
                    found.push(relative);
                }
            }
        }
        Ok(found)
    }

    async fn load_into_memory(&self, file: &str) -> Result<(), FsError> {
        let content = tokio::fs::read_to_string(self.file_path(file)).await?;
        let metadata_raw = tokio::fs::read_to_string(self.meta_path(file)).await?;
        let metadata: FileMetadata = serde_json::from_str(&metadata_raw)?;
        let sentences = tokenize::tokenize_file(&content);
        self.files.insert(
            file.to_string(),
            Arc::new(Mutex::new(FileState {
                sentences,
                metadata,
                locks: HashMap::new(),
            })),
        );
        Ok(())
    }

    pub fn exists(&self, file: &str) -> bool {
        self.files.contains_key(file)
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.iter().map(|e| e.key().clone()).collect()
    }

    pub fn handle(&self, file: &str) -> Option<Arc<Mutex<FileState>>> {
        self.files.get(file).map(|e| e.clone())
    }

    pub async fn create(&self, file: &str, owner: &str) -> Result<(), FsError> {
        if self.files.contains_key(file) {
            return Err(FsError::Conflict);
        }
        let now = Utc::now().timestamp();
        let metadata = FileMetadata {
            filename: file.to_string(),
            owner: owner.to_string(),
            created_time: now,
            modified_time: now,
            accessed_time: now,
            last_access_user: owner.to_string(),
            word_count: 0,
            char_count: 0,
            access_list: Vec::new(),
        };
        self.persist(file, &[], &metadata).await?;
        self.files.insert(
            file.to_string(),
            Arc::new(Mutex::new(FileState {
                sentences: Vec::new(),
                metadata,
                locks: HashMap::new(),
            })),
        );
        Ok(())
    }

    pub async fn delete(&self, file: &str) -> Result<(), FsError> {
        if self.files.remove(file).is_none() {
            return Err(FsError::NotFound);
        }
        let _ = tokio::fs::remove_file(self.file_path(file)).await;
        let _ = tokio::fs::remove_file(self.meta_path(file)).await;
        let _ = tokio::fs::remove_file(self.undo_path(file)).await;
        Ok(())
    }

    /// Writes the file's content, metadata, and an undo backup of the
    /// content that was on disk before this write (if any) to disk.
    pub async fn persist(
        &self,
        file: &str,
        sentences: &[Sentence],
        metadata: &FileMetadata,
    ) -> Result<(), FsError> {
        let path = self.file_path(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Some(parent) = self.meta_path(file).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = tokenize::rebuild_file(sentences);
        tokio::fs::write(&path, content).await?;

        let metadata_json = serde_json::to_string_pretty(metadata)?;
        tokio::fs::write(self.meta_path(file), metadata_json).await?;
        Ok(())
    }

    pub async fn save_undo_backup(&self, file: &str, content: &str) -> Result<(), FsError> {
        let path = self.undo_path(file);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Reads the saved undo backup without consuming it: calling `UNDO`
    /// twice in a row restores the same prior content both times.
    pub async fn read_undo_backup(&self, file: &str) -> Result<String, FsError> {
        tokio::fs::read_to_string(self.undo_path(file))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::NotFound,
                _ => FsError::from(e),
            })
    }

    pub async fn save_checkpoint(&self, file: &str, tag: &str, content: &str) -> Result<(), FsError> {
        let path = self.checkpoint_path(file, tag);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub async fn read_checkpoint(&self, file: &str, tag: &str) -> Result<String, FsError> {
        tokio::fs::read_to_string(self.checkpoint_path(file, tag))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::NotFound,
                _ => FsError::from(e),
            })
    }

    pub async fn list_checkpoints(&self, file: &str) -> Result<Vec<String>, FsError> {
        let dir = self.checkpoints_root().join(file);
        let mut tags = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(tags),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.path().file_stem().and_then(|s| s.to_str()) {
                tags.push(name.to_string());
            }
        }
        tags.sort();
        Ok(tags)
    }

    /// Renames a file's on-disk location and in-memory entry, used by MOVE.
    pub async fn rename(&self, old_file: &str, new_file: &str) -> Result<(), FsError> {
        let handle = self.files.remove(old_file).ok_or(FsError::NotFound)?.1;
        {
            let mut state = handle.lock().await;
            state.metadata.filename = new_file.to_string();
        }

        let old_path = self.file_path(old_file);
        let new_path = self.file_path(new_file);
        if let Some(parent) = new_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_path, &new_path).await?;

        let old_meta = self.meta_path(old_file);
        let new_meta = self.meta_path(new_file);
        if let Some(parent) = new_meta.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&old_meta, &new_meta).await?;

        let old_undo = self.undo_path(old_file);
        if tokio::fs::try_exists(&old_undo).await.unwrap_or(false) {
            let new_undo = self.undo_path(new_file);
            if let Some(parent) = new_undo.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let _ = tokio::fs::rename(&old_undo, &new_undo).await;
        }

        self.files.insert(new_file.to_string(), handle);
        Ok(())
    }

    pub async fn create_folder(&self, folder: &str) -> Result<(), FsError> {
        let path = self.files_root().join(folder);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(FsError::AlreadyExists);
        }
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    pub fn view_folder(&self, folder: &str) -> Vec<String> {
        let prefix = format!("{folder}/");
        self.files
            .iter()
            .map(|e| e.key().clone())
            .filter(|name| name.starts_with(&prefix))
            .collect()
    }

    /// Builds the `||`-delimited info line `INFO` reports: file, owner,
    /// created/modified timestamps, on-disk size, access summary, and last
    /// access bookkeeping.
    pub async fn info_string(&self, file: &str, metadata: &FileMetadata) -> Result<String, FsError> {
        let size = tokio::fs::metadata(self.file_path(file))
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(format!(
            "File:{}||Owner:{}||Created:{}||LastModified:{}||Size:{}||Access:{}||LastAccessed:{}||LastAccessUser:{}",
            metadata.filename,
            metadata.owner,
            format_timestamp(metadata.created_time),
            format_timestamp(metadata.modified_time),
            size,
            metadata.access_summary(),
            format_timestamp(metadata.accessed_time),
            metadata.last_access_user,
        ))
    }
}
