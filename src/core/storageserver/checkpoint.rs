// src/core/storageserver/checkpoint.rs

//! Named snapshots of a file's content: CHECKPOINT saves one under a tag,
//! VIEWCHECKPOINT reads it back without touching the live file, REVERT
//! replaces the live file with it, and LISTCHECKPOINTS enumerates the tags
//! taken so far. The Name Server has already authorized the caller before
//! proxying these ops, the same way it does for NM_CREATE and NM_DELETE, so
//! no further access check happens here.

use chrono::Utc;

use crate::core::errors::FsError;

use super::store::SsStore;
use super::tokenize;

pub async fn checkpoint(store: &SsStore, file: &str, tag: &str) -> Result<(), FsError> {
    let handle = store.handle(file).ok_or(FsError::NotFound)?;
    let content = {
        let state = handle.lock().await;
        tokenize::rebuild_file(&state.sentences)
    };
    store.save_checkpoint(file, tag, &content).await
}

pub async fn view_checkpoint(store: &SsStore, file: &str, tag: &str) -> Result<String, FsError> {
    store.handle(file).ok_or(FsError::NotFound)?;
    store.read_checkpoint(file, tag).await
}

pub async fn revert(store: &SsStore, file: &str, tag: &str) -> Result<(), FsError> {
    let handle = store.handle(file).ok_or(FsError::NotFound)?;
    let content = store.read_checkpoint(file, tag).await?;
    let sentences = tokenize::tokenize_file(&content);

    let mut state = handle.lock().await;

    let old_content = tokenize::rebuild_file(&state.sentences);
    store.save_undo_backup(file, &old_content).await?;

    state.sentences = sentences;
    let now = Utc::now().timestamp();
    state.metadata.modified_time = now;
    state.metadata.accessed_time = now;
    state.metadata.word_count = tokenize::word_count(&state.sentences);
    state.metadata.char_count = content.chars().count();

    store.persist(file, &state.sentences, &state.metadata).await
}

pub async fn list_checkpoints(store: &SsStore, file: &str) -> Result<Vec<String>, FsError> {
    store.handle(file).ok_or(FsError::NotFound)?;
    store.list_checkpoints(file).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    async fn set_content(store: &SsStore, file: &str, content: &str) {
        let handle = store.handle(file).unwrap();
        let mut state = handle.lock().await;
        state.sentences = tokenize::tokenize_file(content);
        store
            .persist(file, &state.sentences, &state.metadata)
            .await
            .unwrap();
    }

    async fn content_of(store: &SsStore, file: &str) -> String {
        let handle = store.handle(file).unwrap();
        let state = handle.lock().await;
        tokenize::rebuild_file(&state.sentences)
    }

    #[tokio::test]
    async fn revert_restores_exactly_the_checkpointed_bytes() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("f.txt", "alice").await.unwrap();

        set_content(&store, "f.txt", "hello world.").await;
        checkpoint(&store, "f.txt", "v1").await.unwrap();

        set_content(&store, "f.txt", "hello there.").await;
        assert_eq!(content_of(&store, "f.txt").await, "hello there.");

        revert(&store, "f.txt", "v1").await.unwrap();
        assert_eq!(content_of(&store, "f.txt").await, "hello world.");
        assert_eq!(view_checkpoint(&store, "f.txt", "v1").await.unwrap(), "hello world.");
    }

    #[tokio::test]
    async fn list_checkpoints_reports_every_saved_tag() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("f.txt", "alice").await.unwrap();

        checkpoint(&store, "f.txt", "v1").await.unwrap();
        checkpoint(&store, "f.txt", "v2").await.unwrap();

        let mut tags = list_checkpoints(&store, "f.txt").await.unwrap();
        tags.sort();
        assert_eq!(tags, vec!["v1".to_string(), "v2".to_string()]);
    }

    proptest! {
        /// After `CHECKPOINT(f, t)` then any overwrite, `REVERT(f, t)`
        /// restores exactly the bytes at checkpoint time, for arbitrary
        /// checkpointed and overwriting content.
        #[test]
        fn revert_restores_exactly_the_checkpointed_bytes_for_arbitrary_content(
            initial in "[a-zA-Z0-9 .!?]{0,60}",
            overwrite in "[a-zA-Z0-9 .!?]{0,60}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let store = SsStore::new(dir.path().to_path_buf());
                store.scan_existing().await.unwrap();
                store.create("f.txt", "alice").await.unwrap();

                set_content(&store, "f.txt", &initial).await;
                checkpoint(&store, "f.txt", "v1").await.unwrap();

                set_content(&store, "f.txt", &overwrite).await;
                revert(&store, "f.txt", "v1").await.unwrap();

                let expected = tokenize::rebuild_file(&tokenize::tokenize_file(&initial));
                assert_eq!(content_of(&store, "f.txt").await, expected);
                assert_eq!(view_checkpoint(&store, "f.txt", "v1").await.unwrap(), expected);
            });
        }
    }
}
