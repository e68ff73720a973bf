// src/core/storageserver/handler.rs

//! Per-connection request dispatch for the Storage Server. One `Handler` is
//! created per connection and carries whatever write session that
//! connection currently has open, since `WRITE_BEGIN`/`WRITE_EDIT`/
//! `WRITE_COMMIT` are scoped to the connection rather than repeating the
//! file and user on every line.

use chrono::Utc;

use crate::core::errors::FsError;
use crate::core::protocol::{Request, Response};

use super::acl;
use super::checkpoint;
use super::store::{format_timestamp, SsStore};
use super::tokenize;
use super::write_session::WriteSession;

pub struct Handler<'a> {
    store: &'a SsStore,
    session: Option<WriteSession>,
}

impl<'a> Handler<'a> {
    pub fn new(store: &'a SsStore) -> Self {
        Handler {
            store,
            session: None,
        }
    }

    pub async fn handle(&mut self, request: Request) -> Response {
        match self.dispatch(request).await {
            Ok(response) => response,
            Err(e) => Response::err(e.status_code()).msg(e.to_string()),
        }
    }

    /// Releases any open write session's lock without committing. Called
    /// when the connection drops.
    pub async fn on_disconnect(self) {
        if let Some(session) = self.session {
            session.abandon(self.store).await;
        }
    }

    async fn dispatch(&mut self, request: Request) -> Result<Response, FsError> {
        match request {
            Request::READ { file, user } => self.read(&file, &user).await,
            Request::WRITE_BEGIN {
                file,
                user,
                sentence_idx,
            } => self.write_begin(file, user, sentence_idx).await,
            Request::WRITE_EDIT { word_index, content } => self.write_edit(word_index, content),
            Request::WRITE_COMMIT {} => self.write_commit().await,
            Request::UNDO { file, user } => self.undo(&file, &user).await,

            Request::NM_CREATE { file, owner } => {
                self.store.create(&file, &owner).await?;
                Ok(Response::ok())
            }
            Request::NM_DELETE { file, user } => {
                self.delete(&file, &user).await?;
                Ok(Response::ok())
            }
            Request::INFO { file, user } => self.info(&file, &user).await,
            Request::LIST { flags, user } => self.list(&flags, &user).await,
            Request::NM_ACCESS {
                file,
                cmd,
                mode,
                target_user,
                actor,
            } => {
                acl::apply(self.store, &file, &cmd, &mode, &target_user, &actor).await?;
                Ok(Response::ok())
            }

            Request::CREATEFOLDER { folder } => {
                self.store.create_folder(&folder).await?;
                Ok(Response::ok())
            }
            Request::VIEWFOLDER { folder } => Ok(Response {
                files: Some(self.store.view_folder(&folder).join(";;")),
                ..Response::ok()
            }),
            Request::MOVE { file, folder } => {
                let new_file = format!("{folder}/{file}");
                self.store.rename(&file, &new_file).await?;
                Ok(Response::ok())
            }

            Request::CHECKPOINT { file, tag } => {
                checkpoint::checkpoint(self.store, &file, &tag).await?;
                Ok(Response::ok())
            }
            Request::VIEWCHECKPOINT { file, tag } => {
                let content = checkpoint::view_checkpoint(self.store, &file, &tag).await?;
                Ok(Response {
                    content: Some(content),
                    ..Response::ok()
                })
            }
            Request::REVERT { file, tag } => {
                checkpoint::revert(self.store, &file, &tag).await?;
                Ok(Response::ok())
            }
            Request::LISTCHECKPOINTS { file } => {
                let tags = checkpoint::list_checkpoints(self.store, &file).await?;
                Ok(Response {
                    checkpoints: Some(tags.join(",")),
                    ..Response::ok()
                })
            }

            other => Err(FsError::BadRequest(format!(
                "unexpected op for storage server: {other:?}"
            ))),
        }
    }

    async fn read(&self, file: &str, user: &str) -> Result<Response, FsError> {
        let handle = self.store.handle(file).ok_or(FsError::NotFound)?;
        let mut state = handle.lock().await;
        state.check_access(user, false)?;
        let content = tokenize::rebuild_file(&state.sentences);
        state.metadata.accessed_time = Utc::now().timestamp();
        state.metadata.last_access_user = user.to_string();
        Ok(Response {
            op: Some("DATA".to_string()),
            content: Some(content),
            ..Response::ok()
        })
    }

    async fn write_begin(
        &mut self,
        file: String,
        user: String,
        sentence_idx: usize,
    ) -> Result<Response, FsError> {
        let session = WriteSession::begin(self.store, &file, &user, sentence_idx).await?;
        self.session = Some(session);
        Ok(Response::ok())
    }

    fn write_edit(&mut self, word_index: usize, content: String) -> Result<Response, FsError> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| FsError::BadRequest("no write session is open".to_string()))?;
        session.edit(word_index, content)?;
        Ok(Response::ok())
    }

    async fn write_commit(&mut self) -> Result<Response, FsError> {
        let session = self
            .session
            .take()
            .ok_or_else(|| FsError::BadRequest("no write session is open".to_string()))?;
        session.commit(self.store).await?;
        Ok(Response::ok())
    }

    async fn undo(&self, file: &str, user: &str) -> Result<Response, FsError> {
        let handle = self.store.handle(file).ok_or(FsError::NotFound)?;
        let content = self.store.read_undo_backup(file).await?;
        let sentences = tokenize::tokenize_file(&content);

        let mut state = handle.lock().await;
        state.check_access(user, true)?;
        state.sentences = sentences;
        let now = Utc::now().timestamp();
        state.metadata.modified_time = now;
        state.metadata.accessed_time = now;
        state.metadata.last_access_user = user.to_string();
        state.metadata.word_count = tokenize::word_count(&state.sentences);
        state.metadata.char_count = content.chars().count();

        self.store
            .persist(file, &state.sentences, &state.metadata)
            .await?;
        Ok(Response::ok())
    }

    async fn delete(&self, file: &str, actor: &str) -> Result<(), FsError> {
        let handle = self.store.handle(file).ok_or(FsError::NotFound)?;
        {
            let state = handle.lock().await;
            if state.metadata.owner != actor {
                return Err(FsError::Unauthorized);
            }
            if !state.locks.is_empty() {
                return Err(FsError::Locked);
            }
        }
        self.store.delete(file).await
    }

    async fn info(&self, file: &str, user: &str) -> Result<Response, FsError> {
        let handle = self.store.handle(file).ok_or(FsError::NotFound)?;
        let state = handle.lock().await;
        state.check_access(user, false)?;
        let info = self.store.info_string(file, &state.metadata).await?;
        Ok(Response {
            info: Some(info),
            ..Response::ok()
        })
    }

    async fn list(&self, flags: &str, user: &str) -> Result<Response, FsError> {
        let include_all = flags.contains('a');
        let include_details = flags.contains('l');

        let mut names = Vec::new();
        for name in self.store.file_names() {
            let Some(handle) = self.store.handle(&name) else {
                continue;
            };
            let state = handle.lock().await;
            let visible = state.metadata.owner == user
                || state
                    .metadata
                    .access_list
                    .iter()
                    .any(|e| e.username == user);
            if !include_all && !visible {
                continue;
            }
            if include_details {
                names.push(format!(
                    "{} | Owner: {} | Words: {} | Chars: {} | Modified: {}",
                    name,
                    state.metadata.owner,
                    state.metadata.word_count,
                    state.metadata.char_count,
                    format_timestamp(state.metadata.modified_time),
                ));
            } else {
                names.push(name);
            }
        }
        Ok(Response {
            files: Some(names.join(";;")),
            ..Response::ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storageserver::store::SsStore;
    use proptest::prelude::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn delete_rejects_a_non_owner() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();

        let handler = Handler::new(&store);
        let err = handler.delete("a.txt", "bob").await.unwrap_err();
        assert_eq!(err, FsError::Unauthorized);
    }

    #[tokio::test]
    async fn delete_rejects_a_file_with_an_open_lock() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();
        let _session = WriteSession::begin(&store, "a.txt", "alice", 0).await.unwrap();

        let handler = Handler::new(&store);
        let err = handler.delete("a.txt", "alice").await.unwrap_err();
        assert_eq!(err, FsError::Locked);
    }

    #[tokio::test]
    async fn undo_is_not_consumed_and_restores_the_same_backup_every_time() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();
        store.save_undo_backup("a.txt", "Old content.").await.unwrap();

        let handler = Handler::new(&store);
        handler.undo("a.txt", "alice").await.unwrap();
        handler.undo("a.txt", "alice").await.unwrap();

        let handle = store.handle("a.txt").unwrap();
        let state = handle.lock().await;
        assert_eq!(tokenize::rebuild_file(&state.sentences), "Old content.");
    }

    #[tokio::test]
    async fn list_joins_entries_with_double_semicolons() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();
        store.create("b.txt", "alice").await.unwrap();

        let handler = Handler::new(&store);
        let response = handler.list("a", "alice").await.unwrap();
        let files = response.files.unwrap();
        assert!(files.contains(";;"));
        assert!(files.contains("a.txt"));
        assert!(files.contains("b.txt"));
    }

    #[tokio::test]
    async fn list_without_all_flag_hides_files_with_no_access() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();

        let handler = Handler::new(&store);
        let response = handler.list("", "bob").await.unwrap();
        assert_eq!(response.files.unwrap(), "");
    }

    proptest! {
        /// `undo` restores the pre-commit text, and a second `undo` yields
        /// that same text rather than no-oping, for arbitrary content.
        #[test]
        fn undo_restores_the_pre_commit_text_twice_for_arbitrary_content(
            backup_content in "[a-zA-Z0-9 .!?]{0,60}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let store = SsStore::new(dir.path().to_path_buf());
                store.scan_existing().await.unwrap();
                store.create("a.txt", "alice").await.unwrap();
                store.save_undo_backup("a.txt", &backup_content).await.unwrap();

                let handler = Handler::new(&store);
                let expected = tokenize::rebuild_file(&tokenize::tokenize_file(&backup_content));

                handler.undo("a.txt", "alice").await.unwrap();
                let handle = store.handle("a.txt").unwrap();
                let first = tokenize::rebuild_file(&handle.lock().await.sentences);
                assert_eq!(first, expected);

                handler.undo("a.txt", "alice").await.unwrap();
                let second = tokenize::rebuild_file(&handle.lock().await.sentences);
                assert_eq!(second, expected);
            });
        }
    }
}
