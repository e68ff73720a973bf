// src/core/storageserver/write_session.rs

//! The WRITE_BEGIN / WRITE_EDIT / WRITE_COMMIT state machine. A session
//! accumulates its edits into its own local replacement for the sentence it
//! locked — including any extra sentences split off by a delimiter
//! appearing mid-edit — and only splices that replacement into the shared
//! `FileState` at commit time, so a reader never observes a half-finished
//! edit and a disconnect without a commit is a clean no-op.

use chrono::Utc;

use crate::core::errors::FsError;

use super::store::SsStore;
use super::tokenize::{self, NONE_DELIM, Sentence};

pub struct WriteSession {
    pub file: String,
    pub user: String,
    pub sentence_idx: usize,
    /// Replaces `sentences[sentence_idx]` at commit time. Starts as a
    /// single clone of the locked sentence; a delimiter encountered in a
    /// `WRITE_EDIT` seals `pending[0]` and appends the sentences tokenized
    /// from the remainder right after it.
    pending: Vec<Sentence>,
}

impl WriteSession {
    pub async fn begin(
        store: &SsStore,
        file: &str,
        user: &str,
        sentence_idx: usize,
    ) -> Result<WriteSession, FsError> {
        let handle = store.handle(file).ok_or(FsError::NotFound)?;
        let mut state = handle.lock().await;
        state.check_access(user, true)?;

        let idx = sentence_idx;
        if idx == state.sentences.len() {
            let can_append = state
                .sentences
                .last()
                .map(|s| s.delimiter != NONE_DELIM)
                .unwrap_or(true);
            if can_append {
                state.sentences.push(Sentence {
                    words: Vec::new(),
                    delimiter: NONE_DELIM,
                });
            }
        }
        if idx >= state.sentences.len() {
            return Err(FsError::BadRequest(format!(
                "sentence index {sentence_idx} is out of range"
            )));
        }

        if let Some(existing) = state.locks.get(&idx) {
            if existing == user {
                // Idempotent re-begin: the caller already holds this lock.
                return Ok(WriteSession {
                    file: file.to_string(),
                    user: user.to_string(),
                    sentence_idx: idx,
                    pending: vec![state.sentences[idx].clone()],
                });
            }
            return Err(FsError::Locked);
        }
        if state.locks.values().any(|owner| owner == user) {
            // At most one lock per user per file.
            return Err(FsError::Locked);
        }

        state.locks.insert(idx, user.to_string());
        Ok(WriteSession {
            file: file.to_string(),
            user: user.to_string(),
            sentence_idx: idx,
            pending: vec![state.sentences[idx].clone()],
        })
    }

    pub fn edit(&mut self, word_index: usize, content: String) -> Result<(), FsError> {
        let sentence = self
            .pending
            .first_mut()
            .expect("a write session always has a head sentence");

        if word_index > sentence.words.len() {
            return Err(FsError::BadRequest(format!(
                "word index {word_index} is out of range"
            )));
        }

        let (leading_words, delim, remainder) = tokenize::parse_edit_fragment(&content);
        for (offset, word) in leading_words.into_iter().enumerate() {
            sentence.words.insert(word_index + offset, word);
        }

        if let Some(delimiter) = delim {
            sentence.delimiter = delimiter;
            let trailing = tokenize::tokenize_file(&remainder);
            for (offset, extra) in trailing.into_iter().enumerate() {
                self.pending.insert(1 + offset, extra);
            }
        }

        Ok(())
    }

    pub async fn commit(self, store: &SsStore) -> Result<(), FsError> {
        let handle = store.handle(&self.file).ok_or(FsError::NotFound)?;
        let mut state = handle.lock().await;

        let old_content = tokenize::rebuild_file(&state.sentences);

        let extra_sentences = self.pending.len() - 1;
        if self.sentence_idx < state.sentences.len() {
            state
                .sentences
                .splice(self.sentence_idx..=self.sentence_idx, self.pending);
        } else {
            state.sentences.extend(self.pending);
        }
        state.locks.remove(&self.sentence_idx);

        if extra_sentences > 0 {
            let mut shifted: Vec<(usize, String)> = state
                .locks
                .iter()
                .filter(|(idx, _)| **idx > self.sentence_idx)
                .map(|(idx, owner)| (*idx, owner.clone()))
                .collect();
            // Move the highest indices first so a shifted slot is never
            // clobbered by one that hasn't moved yet.
            shifted.sort_by(|a, b| b.0.cmp(&a.0));
            for (idx, owner) in shifted {
                state.locks.remove(&idx);
                state.locks.insert(idx + extra_sentences, owner);
            }
        }

        let new_content = tokenize::rebuild_file(&state.sentences);
        let now = Utc::now().timestamp();
        state.metadata.modified_time = now;
        state.metadata.accessed_time = now;
        state.metadata.last_access_user = self.user;
        state.metadata.word_count = tokenize::word_count(&state.sentences);
        state.metadata.char_count = new_content.chars().count();

        store.save_undo_backup(&self.file, &old_content).await?;
        store
            .persist(&self.file, &state.sentences, &state.metadata)
            .await?;
        Ok(())
    }

    /// Releases the sentence lock without applying any edit. Used when a
    /// connection drops with an open session; since edits only ever
    /// accumulate in `pending`, dropping it here is all "discard" requires.
    pub async fn abandon(self, store: &SsStore) {
        if let Some(handle) = store.handle(&self.file) {
            let mut state = handle.lock().await;
            state.locks.remove(&self.sentence_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store_with_file(content: &str) -> (tempfile::TempDir, SsStore) {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("f.txt", "alice").await.unwrap();
        if !content.is_empty() {
            let handle = store.handle("f.txt").unwrap();
            let mut state = handle.lock().await;
            state.sentences = tokenize::tokenize_file(content);
            store
                .persist("f.txt", &state.sentences, &state.metadata)
                .await
                .unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn begin_on_empty_file_appends_a_sentence_and_locks_it() {
        let (_dir, store) = store_with_file("").await;
        let session = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        assert_eq!(session.sentence_idx, 0);
        let handle = store.handle("f.txt").unwrap();
        let state = handle.lock().await;
        assert_eq!(state.locks.get(&0), Some(&"alice".to_string()));
    }

    #[tokio::test]
    async fn second_user_on_same_sentence_is_locked_out() {
        let (_dir, store) = store_with_file("").await;
        let _alice = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        let err = WriteSession::begin(&store, "f.txt", "bob", 0).await.unwrap_err();
        assert_eq!(err, FsError::Locked);
    }

    #[tokio::test]
    async fn same_user_rebegin_is_idempotent() {
        let (_dir, store) = store_with_file("").await;
        let _first = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        let second = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        assert_eq!(second.sentence_idx, 0);
    }

    #[tokio::test]
    async fn edit_then_commit_produces_expected_text() {
        let (_dir, store) = store_with_file("").await;
        let mut session = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        session.edit(0, "hello world.".to_string()).unwrap();
        session.commit(&store).await.unwrap();

        let handle = store.handle("f.txt").unwrap();
        let state = handle.lock().await;
        assert_eq!(tokenize::rebuild_file(&state.sentences), "hello world.");
        assert!(state.locks.is_empty());
    }

    #[tokio::test]
    async fn edit_with_delimiter_splits_into_a_trailing_sentence() {
        let (_dir, store) = store_with_file("hello world. third place").await;
        // "third place" is sentence 1, unsealed; bob locks it and seals it
        // with a delimiter mid-edit, which must push a new sentence after
        // it and shift any higher locks up by one.
        let mut bob = WriteSession::begin(&store, "f.txt", "bob", 1).await.unwrap();
        bob.edit(2, "done. extra words".to_string()).unwrap();
        bob.commit(&store).await.unwrap();

        let handle = store.handle("f.txt").unwrap();
        let state = handle.lock().await;
        assert_eq!(state.sentences.len(), 3);
        assert_eq!(state.sentences[1].words, vec!["third", "place", "done"]);
        assert_eq!(state.sentences[1].delimiter, '.');
        assert_eq!(state.sentences[2].words, vec!["extra", "words"]);
        assert_eq!(state.sentences[2].delimiter, NONE_DELIM);
    }

    #[tokio::test]
    async fn abandon_releases_the_lock_without_touching_content() {
        let (_dir, store) = store_with_file("hello world.").await;
        let mut session = WriteSession::begin(&store, "f.txt", "alice", 0).await.unwrap();
        session.edit(0, "bye".to_string()).unwrap();
        session.abandon(&store).await;

        let handle = store.handle("f.txt").unwrap();
        let state = handle.lock().await;
        assert!(state.locks.is_empty());
        assert_eq!(tokenize::rebuild_file(&state.sentences), "hello world.");
    }
}
