#[cfg(test)]
mod tests {
    use parley_core::{ExitInfo, Message, ParleyError, ThreadId, ThreadStatus};
    use parley_store::ThreadStore;
    use std::sync::Arc;

    fn store() -> (tempfile::TempDir, ThreadStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ThreadStore::new(dir.path().join("threads"));
        (dir, store)
    }

    fn id(s: &str) -> ThreadId {
        ThreadId::parse(s).unwrap()
    }

    // ── Create / get ───────────────────────────────────────────

    #[tokio::test]
    async fn test_create_persists_empty_thread() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        assert!(thread.messages.is_empty());
        assert_eq!(thread.status, ThreadStatus::Idle);

        let loaded = store.get(&thread.id).await.unwrap();
        assert_eq!(loaded.id, thread.id);
    }

    #[tokio::test]
    async fn test_get_unknown_thread_is_not_found() {
        let (_dir, store) = store();
        let err = store.get(&id("nope")).await.unwrap_err();
        assert!(matches!(err, ParleyError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_open_creates_named_thread_once() {
        let (_dir, store) = store();
        let lease = store.acquire(&id("general")).unwrap();
        let first = store.open(&lease).await.unwrap();
        let again = store.open(&lease).await.unwrap();
        assert_eq!(first.created_at, again.created_at);
    }

    // ── Append ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_append_preserves_order() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        for i in 0..5 {
            store
                .append(&thread.id, Message::user(format!("m{i}")))
                .await
                .unwrap();
        }
        let loaded = store.get(&thread.id).await.unwrap();
        let contents: Vec<_> = loaded.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2", "m3", "m4"]);
        assert!(loaded.updated_at >= thread.updated_at);
    }

    #[tokio::test]
    async fn test_append_to_missing_thread_is_not_found() {
        let (_dir, store) = store();
        let err = store.append(&id("ghost"), Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, ParleyError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_while_leased_is_busy() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        let _lease = store.acquire(&thread.id).unwrap();
        assert!(store.is_busy(&thread.id));

        let err = store.append(&thread.id, Message::user("hi")).await.unwrap_err();
        assert!(matches!(err, ParleyError::Busy(_)));
        assert!(store.get(&thread.id).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_leases_only_one_wins() {
        let (_dir, store) = store();
        let store = Arc::new(store);
        let target = id("shared");

        let attempts = (0..8).map(|_| {
            let store = Arc::clone(&store);
            let target = target.clone();
            tokio::spawn(async move {
                let lease = store.acquire(&target)?;
                store.begin_invocation(&lease).await?;
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                store
                    .complete_invocation(&lease, vec![Message::user("q"), Message::agent("a")])
                    .await
            })
        });
        let results: Vec<_> = futures::future::join_all(attempts)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        let ok = results.iter().filter(|r| r.is_ok()).count();
        let busy = results
            .iter()
            .filter(|r| matches!(r, Err(ParleyError::Busy(_))))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(busy, 7);
        assert_eq!(store.get(&target).await.unwrap().messages.len(), 2);
    }

    // ── Invocation lifecycle ───────────────────────────────────

    #[tokio::test]
    async fn test_invocation_success_commits_exchange() {
        let (_dir, store) = store();
        let lease = store.acquire(&id("t1")).unwrap();

        let started = store.begin_invocation(&lease).await.unwrap();
        assert_eq!(started.status, ThreadStatus::Invoking);

        let done = store
            .complete_invocation(&lease, vec![Message::user("Hello"), Message::agent("Hi")])
            .await
            .unwrap();
        assert_eq!(done.status, ThreadStatus::Idle);
        assert_eq!(done.messages.len(), 2);
        assert_eq!(done.user_message_count(), 1);
    }

    #[tokio::test]
    async fn test_invocation_failure_keeps_log_and_records_error() {
        let (_dir, store) = store();
        let lease = store.acquire(&id("t1")).unwrap();
        store.begin_invocation(&lease).await.unwrap();
        store
            .complete_invocation(&lease, vec![Message::user("one"), Message::agent("1")])
            .await
            .unwrap();

        store.begin_invocation(&lease).await.unwrap();
        let failed = store
            .fail_invocation(&lease, &ParleyError::Timeout { secs: 1 })
            .await
            .unwrap();
        assert_eq!(failed.status, ThreadStatus::Errored);
        assert_eq!(failed.messages.len(), 2);
        assert!(failed.last_error.unwrap().contains("timed out"));

        store.begin_invocation(&lease).await.unwrap();
        let recovered = store
            .complete_invocation(&lease, vec![Message::user("two"), Message::agent("2")])
            .await
            .unwrap();
        assert_eq!(recovered.status, ThreadStatus::Idle);
        assert!(recovered.last_error.is_none());
        assert_eq!(recovered.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_lease_released_on_drop() {
        let (_dir, store) = store();
        let target = id("t1");
        {
            let lease = store.acquire(&target).unwrap();
            store.begin_invocation(&lease).await.unwrap();
            store
                .fail_invocation(
                    &lease,
                    &ParleyError::ProcessFailure(ExitInfo {
                        code: Some(1),
                        signal: None,
                        detail: String::new(),
                    }),
                )
                .await
                .unwrap();
        }
        assert!(!store.is_busy(&target));
        assert!(store.acquire(&target).is_ok());
    }

    // ── Delete ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_delete_then_delete_again_is_not_found() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        store.delete(&thread.id).await.unwrap();

        assert!(matches!(
            store.get(&thread.id).await,
            Err(ParleyError::ThreadNotFound(_))
        ));
        assert!(matches!(
            store.delete(&thread.id).await,
            Err(ParleyError::ThreadNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_while_invoking_is_busy() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        let lease = store.acquire(&thread.id).unwrap();
        store.begin_invocation(&lease).await.unwrap();

        assert!(matches!(
            store.delete(&thread.id).await,
            Err(ParleyError::Busy(_))
        ));
        drop(lease);
        assert!(store.delete(&thread.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_with_keeps_thread_leased_until_drop() {
        let (_dir, store) = store();
        let thread = store.create().await.unwrap();
        let lease = store.acquire(&thread.id).unwrap();
        store.delete_with(&lease).await.unwrap();

        assert!(store.is_busy(&thread.id));
        assert!(matches!(store.acquire(&thread.id), Err(ParleyError::Busy(_))));
        assert!(matches!(
            store.append(&thread.id, Message::user("too early")).await,
            Err(ParleyError::Busy(_))
        ));

        drop(lease);
        assert!(!store.is_busy(&thread.id));
        let reopened = store.acquire(&thread.id).unwrap();
        assert!(store.open(&reopened).await.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_failed_appends_leave_no_lease_behind() {
        let (_dir, store) = store();
        for n in 0..20 {
            let ghost = id(&format!("ghost-{n}"));
            assert!(store.append(&ghost, Message::user("x")).await.is_err());
            assert!(!store.is_busy(&ghost));
        }
    }

    // ── List / recover ─────────────────────────────────────────

    #[tokio::test]
    async fn test_list_orders_by_recency_and_skips_garbage() {
        let (dir, store) = store();
        let older = store.create().await.unwrap();
        let newer = store.create().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append(&older.id, Message::user("bump")).await.unwrap();

        let threads_dir = dir.path().join("threads");
        std::fs::write(threads_dir.join("broken.json"), "{ not json").unwrap();
        std::fs::write(threads_dir.join(".x.json.abc.tmp"), "partial").unwrap();
        std::fs::write(threads_dir.join("notes.txt"), "ignored").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[0].message_count, 1);
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn test_list_empty_store() {
        let (_dir, store) = store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recover_marks_interrupted_threads_errored() {
        let (dir, store) = store();
        {
            let lease = store.acquire(&id("stuck")).unwrap();
            store.begin_invocation(&lease).await.unwrap();
        }
        store.create().await.unwrap();

        let fresh = ThreadStore::new(dir.path().join("threads"));
        assert_eq!(fresh.recover().await.unwrap(), 1);
        let stuck = fresh.get(&id("stuck")).await.unwrap();
        assert_eq!(stuck.status, ThreadStatus::Errored);
        assert!(stuck.last_error.unwrap().contains("restart"));
        assert_eq!(fresh.recover().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_are_complete_json_on_disk() {
        let (dir, store) = store();
        let thread = store.create().await.unwrap();
        store.append(&thread.id, Message::user("payload")).await.unwrap();

        let raw = std::fs::read_to_string(
            dir.path().join("threads").join(format!("{}.json", thread.id)),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["messages"][0]["content"], "payload");
        assert_eq!(value["status"], "idle");
    }
}
