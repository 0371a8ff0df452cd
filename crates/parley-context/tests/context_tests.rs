#[cfg(test)]
mod tests {
    use parley_context::{ContextComposer, ContextStore};
    use parley_core::{Message, MessageOrigin, ParleyError, Thread, ThreadId};

    fn setup() -> (tempfile::TempDir, ContextComposer) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ContextStore::new(dir.path(), "CLAUDE");
        (dir, ContextComposer::new(store, "scout", 20))
    }

    fn write(dir: &tempfile::TempDir, rel: &str, content: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn thread() -> Thread {
        Thread::new(ThreadId::parse("t1").unwrap())
    }

    fn names(docs: &[parley_core::ContextDocument]) -> Vec<&str> {
        docs.iter().map(|d| d.name.as_str()).collect()
    }

    // ── Resolution ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_resolve_follows_imports_depth_first() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "# Root\n@context/a.md\n@context/d.md\n");
        write(&dir, "context/a.md", "A\n@context/b.md\n@context/c.md\n");
        write(&dir, "context/b.md", "B\n");
        write(&dir, "context/c.md", "C\n");
        write(&dir, "context/d.md", "D\n");

        let docs = composer.resolve(None).await.unwrap();
        assert_eq!(names(&docs), vec!["CLAUDE", "a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_diamond_import_is_visited_once() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/a.md\n@context/b.md\n");
        write(&dir, "context/a.md", "A\n@context/shared.md\n");
        write(&dir, "context/b.md", "B\n@context/shared.md\n");
        write(&dir, "context/shared.md", "S\n");

        let docs = composer.resolve(None).await.unwrap();
        assert_eq!(names(&docs), vec!["CLAUDE", "a", "shared", "b"]);
    }

    #[tokio::test]
    async fn test_self_import_is_a_cycle() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/a.md\n");
        write(&dir, "context/a.md", "@context/a.md\n");

        match composer.resolve(None).await {
            Err(ParleyError::CycleDetected { path }) => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mutual_import_is_a_cycle() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/a.md\n");
        write(&dir, "context/a.md", "@context/b.md\n");
        write(&dir, "context/b.md", "@context/a.md\n");

        let err = composer.resolve(None).await.unwrap_err();
        assert_eq!(err.to_string(), "context import cycle: a -> b -> a");
    }

    #[tokio::test]
    async fn test_dangling_import_is_missing_context() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/ghost.md\n");

        let err = composer.resolve(None).await.unwrap_err();
        assert!(matches!(err, ParleyError::MissingContext(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_missing_root_is_missing_context() {
        let (_dir, composer) = setup();
        let err = composer.resolve(None).await.unwrap_err();
        assert!(matches!(err, ParleyError::MissingContext(ref n) if n == "CLAUDE"));
    }

    // ── Composition ────────────────────────────────────────────

    #[tokio::test]
    async fn test_compose_is_deterministic() {
        let (dir, composer) = setup();
        write(
            &dir,
            "CLAUDE.md",
            "# Agent\n@context/identity.md\n@context/state.md\n@context/history.md\n",
        );
        write(&dir, "context/identity.md", "You are Scout.\n\n");
        let mut thread = thread();
        thread.messages.push(Message::user("earlier"));
        thread.messages.push(Message::agent("reply"));
        let origin = MessageOrigin {
            sender: "dana".into(),
            channel: "slack".into(),
        };

        let first = composer.compose(&thread, Some(&origin)).await.unwrap();
        let second = composer.compose(&thread, Some(&origin)).await.unwrap();
        assert_eq!(first, second);

        assert!(first.starts_with("# Agent\n\nYou are Scout.\n\n# Current State"));
        assert!(first.contains("- Thread: t1"));
        assert!(first.contains("- Sender: dana"));
        assert!(first.contains("earlier"));
        assert!(!first.contains("@context/"));
    }

    #[tokio::test]
    async fn test_empty_root_composes_to_empty_context() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "");
        assert_eq!(composer.compose(&thread(), None).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_dynamic_documents_are_per_thread() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/state.md\n");

        let a = Thread::new(ThreadId::parse("alpha").unwrap());
        let b = Thread::new(ThreadId::parse("beta").unwrap());
        composer.materialize(&a, None).await.unwrap();
        composer.materialize(&b, None).await.unwrap();

        let state_a = std::fs::read_to_string(dir.path().join("dynamic/alpha/state.md")).unwrap();
        let state_b = std::fs::read_to_string(dir.path().join("dynamic/beta/state.md")).unwrap();
        assert!(state_a.contains("- Thread: alpha"));
        assert!(state_b.contains("- Thread: beta"));

        let history = std::fs::read_to_string(dir.path().join("dynamic/alpha/history.md")).unwrap();
        assert!(history.contains("new conversation"));
    }

    #[tokio::test]
    async fn test_dynamic_import_without_thread_is_missing() {
        let (dir, composer) = setup();
        write(&dir, "CLAUDE.md", "@context/state.md\n");
        let err = composer.resolve(None).await.unwrap_err();
        assert!(matches!(err, ParleyError::MissingContext(ref n) if n == "state"));
    }

    // ── Static document store ──────────────────────────────────

    #[tokio::test]
    async fn test_static_document_crud() {
        let (dir, composer) = setup();
        let store = composer.store();
        write(&dir, "CLAUDE.md", "@context/identity.md\n");

        store.create("identity", "Scout").await.unwrap();
        store.create("tools", "shell").await.unwrap();
        assert!(matches!(
            store.create("identity", "again").await,
            Err(ParleyError::Conflict(_))
        ));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "identity");
        assert!(listed[0].included);
        assert!(!listed[1].included);
        assert_eq!(listed[1].size_bytes, 5);

        let updated = store.put("tools", "shell and web").await.unwrap();
        assert_eq!(updated.content, "shell and web");

        store.delete("tools").await.unwrap();
        assert!(matches!(
            store.delete("tools").await,
            Err(ParleyError::DocumentNotFound(_))
        ));
        assert!(matches!(
            store.get("tools").await,
            Err(ParleyError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reserved_and_invalid_names_are_rejected() {
        let (_dir, composer) = setup();
        let store = composer.store();
        for name in ["state", "history", "CLAUDE"] {
            assert!(matches!(
                store.create(name, "x").await,
                Err(ParleyError::InvalidName(_))
            ));
        }
        assert!(matches!(
            store.put("../etc", "x").await,
            Err(ParleyError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn test_root_document_roundtrip() {
        let (_dir, composer) = setup();
        let store = composer.store();
        assert!(matches!(
            store.root().await,
            Err(ParleyError::DocumentNotFound(_))
        ));
        store.put_root("# Agent\n@context/identity.md\n").await.unwrap();
        let root = store.root().await.unwrap();
        assert_eq!(root.imports(), vec!["identity"]);
    }
}
