// src/core/storageserver/acl.rs

//! Applies `NM_ACCESS` grants and revocations to a file's access list. The
//! Name Server is the only caller: it decides who is allowed to act on a
//! file and tells the owning Storage Server to update its bookkeeping.

use crate::core::errors::FsError;

use super::store::{AccessEntry, SsStore};

pub async fn apply(
    store: &SsStore,
    file: &str,
    cmd: &str,
    mode: &str,
    target_user: &str,
    actor: &str,
) -> Result<(), FsError> {
    let handle = store.handle(file).ok_or(FsError::NotFound)?;
    let mut state = handle.lock().await;

    if state.metadata.owner != actor {
        return Err(FsError::Unauthorized);
    }

    match cmd {
        "ADD" => {
            let can_write = mode.contains('W');
            let can_read = mode.contains('R') || can_write;
            if let Some(entry) = state
                .metadata
                .access_list
                .iter_mut()
                .find(|e| e.username == target_user)
            {
                entry.can_read = can_read;
                entry.can_write = can_write;
            } else {
                state.metadata.access_list.push(AccessEntry {
                    username: target_user.to_string(),
                    can_read,
                    can_write,
                });
            }
        }
        "REM" => {
            if !state
                .metadata
                .access_list
                .iter()
                .any(|e| e.username == target_user)
            {
                return Err(FsError::NotFound);
            }
            state
                .metadata
                .access_list
                .retain(|e| e.username != target_user);
        }
        other => return Err(FsError::BadRequest(format!("unknown access cmd '{other}'"))),
    }

    store
        .persist(file, &state.sentences, &state.metadata)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn non_owner_cannot_grant_access() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();

        let err = apply(&store, "a.txt", "ADD", "R", "carol", "bob")
            .await
            .unwrap_err();
        assert_eq!(err, FsError::Unauthorized);
    }

    #[tokio::test]
    async fn removing_an_unknown_grant_is_not_found() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();

        let err = apply(&store, "a.txt", "REM", "", "bob", "alice")
            .await
            .unwrap_err();
        assert_eq!(err, FsError::NotFound);
    }

    #[tokio::test]
    async fn owner_can_grant_and_then_revoke() {
        let dir = tempdir().unwrap();
        let store = SsStore::new(dir.path().to_path_buf());
        store.scan_existing().await.unwrap();
        store.create("a.txt", "alice").await.unwrap();

        apply(&store, "a.txt", "ADD", "R", "bob", "alice").await.unwrap();
        let handle = store.handle("a.txt").unwrap();
        {
            let state = handle.lock().await;
            assert!(state.metadata.access_list.iter().any(|e| e.username == "bob" && e.can_read));
        }

        apply(&store, "a.txt", "REM", "", "bob", "alice").await.unwrap();
        let state = handle.lock().await;
        assert!(state.metadata.access_list.is_empty());
    }
}
