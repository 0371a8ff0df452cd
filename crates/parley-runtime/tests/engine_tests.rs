#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parley_config::{Credentials, ParleyConfig};
    use parley_core::{MessageOrigin, ParleyError, Result, Role, ThreadId, ThreadStatus};
    use parley_runtime::{CrmClient, Delivery, Engine, Registration};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeCrm {
        replies: Mutex<Vec<(String, String)>>,
        errors: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn forward_reply(
            &self,
            thread: &ThreadId,
            _origin: &MessageOrigin,
            reply: &str,
        ) -> Result<()> {
            self.replies
                .lock()
                .unwrap()
                .push((thread.to_string(), reply.to_string()));
            Ok(())
        }

        async fn forward_error(
            &self,
            thread: &ThreadId,
            _origin: &MessageOrigin,
            error: &str,
        ) -> Result<()> {
            self.errors
                .lock()
                .unwrap()
                .push((thread.to_string(), error.to_string()));
            Ok(())
        }

        async fn register(&self, _registration: &Registration) -> Result<()> {
            Ok(())
        }
    }

    /// An engine whose reasoning process is `sh -c <script> <message>`.
    fn engine_with(script: &str, timeout_secs: u64) -> (tempfile::TempDir, Arc<FakeCrm>, Arc<Engine>) {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("CLAUDE.md"), "# Agent\nBe brief.\n").unwrap();

        let mut config = ParleyConfig::default();
        config.agent.name = "scout".into();
        config.agent.workdir = dir.path().to_path_buf();
        config.invoker.program = "sh".into();
        config.invoker.args = vec!["-c".into(), script.into(), "{prompt}".into()];
        config.invoker.timeout_secs = timeout_secs;
        config.credentials = Credentials::new("k");

        let crm = Arc::new(FakeCrm::default());
        let engine = Engine::new(Arc::new(config), Some(crm.clone() as Arc<dyn CrmClient>));
        (dir, crm, Arc::new(engine))
    }

    const ECHO: &str = r#"cat >/dev/null; printf 'Hi, you said: %s' "$0""#;

    fn id(s: &str) -> ThreadId {
        ThreadId::parse(s).unwrap()
    }

    // ── Happy path ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_hello_commits_exactly_one_exchange() {
        let (_dir, crm, engine) = engine_with(ECHO, 10);
        let created = engine.threads().create().await.unwrap();

        let exchange = engine
            .deliver(Delivery::new("Hello").to_thread(created.id.clone()))
            .await
            .unwrap();
        assert_eq!(exchange.reply.text, "Hi, you said: Hello");

        let thread = engine.threads().get(&created.id).await.unwrap();
        assert_eq!(thread.status, ThreadStatus::Idle);
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[0].role, Role::User);
        assert_eq!(thread.messages[0].content, "Hello");
        assert_eq!(thread.messages[1].role, Role::Agent);
        assert_eq!(thread.messages[1].content, "Hi, you said: Hello");

        let replies = crm.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, created.id.to_string());
    }

    #[tokio::test]
    async fn test_delivery_without_thread_creates_one() {
        let (_dir, _crm, engine) = engine_with(ECHO, 10);
        let exchange = engine.deliver(Delivery::new("first")).await.unwrap();
        let listed = engine.threads().list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, exchange.thread.id);
        assert_eq!(listed[0].user_message_count, 1);
    }

    #[tokio::test]
    async fn test_process_sees_context_env_and_credential() {
        let (_dir, _crm, engine) =
            engine_with(r#"printf '%s|%s|' "$PARLEY_THREAD_ID" "$ACTO"; cat"#, 10);
        let exchange = engine
            .deliver(Delivery::new("ping").to_thread(id("t1")))
            .await
            .unwrap();
        assert_eq!(exchange.reply.text, "t1|k|# Agent\nBe brief.");
    }

    #[tokio::test]
    async fn test_history_reaches_the_next_invocation() {
        let script = r#"cat; printf '\n--\n%s' "$0""#;
        let (dir, _crm, engine) = engine_with(script, 10);
        std::fs::write(
            dir.path().join("CLAUDE.md"),
            "# Agent\n@context/history.md\n",
        )
        .unwrap();

        engine
            .deliver(Delivery::new("remember the number 42").to_thread(id("t1")))
            .await
            .unwrap();
        let second = engine
            .deliver(Delivery::new("what was it?").to_thread(id("t1")))
            .await
            .unwrap();
        assert!(second.reply.text.contains("remember the number 42"));
        assert_eq!(second.thread.messages.len(), 4);
    }

    // ── Failures ───────────────────────────────────────────────

    #[tokio::test]
    async fn test_timeout_leaves_log_unchanged_and_releases_lease() {
        let script = r#"if [ "$0" = "slow" ]; then sleep 30; fi; cat >/dev/null; printf ok"#;
        let (_dir, crm, engine) = engine_with(script, 1);
        let target = id("t1");

        let err = engine
            .deliver(Delivery::new("slow").to_thread(target.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Timeout { secs: 1 }));

        let thread = engine.threads().get(&target).await.unwrap();
        assert!(thread.messages.is_empty());
        assert_eq!(thread.status, ThreadStatus::Errored);
        assert!(!engine.threads().is_busy(&target));
        assert_eq!(crm.errors.lock().unwrap().len(), 1);

        let next = engine
            .deliver(Delivery::new("fast").to_thread(target.clone()))
            .await
            .unwrap();
        assert_eq!(next.reply.text, "ok");
        assert_eq!(next.thread.status, ThreadStatus::Idle);
        assert_eq!(next.thread.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let script = r#"if [ "$0" = "slow" ]; then (sleep 2; touch survived) & sleep 30; fi; cat >/dev/null; printf ok"#;
        let (dir, _crm, engine) = engine_with(script, 1);

        let err = engine
            .deliver(Delivery::new("slow").to_thread(id("t1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Timeout { secs: 1 }));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!dir.path().join("survived").exists());
    }

    #[tokio::test]
    async fn test_crash_reports_exit_code_and_stderr() {
        let (_dir, _crm, engine) = engine_with("echo boom >&2; exit 3", 10);
        let err = engine
            .deliver(Delivery::new("hi").to_thread(id("t1")))
            .await
            .unwrap_err();
        match err {
            ParleyError::ProcessFailure(exit) => {
                assert_eq!(exit.code, Some(3));
                assert_eq!(exit.detail, "boom");
            }
            other => panic!("expected process failure, got {other:?}"),
        }
        let thread = engine.threads().get(&id("t1")).await.unwrap();
        assert!(thread.messages.is_empty());
        assert!(thread.last_error.unwrap().contains("exit code 3"));
    }

    #[tokio::test]
    async fn test_missing_program_is_process_failure() {
        let (dir, _crm, _engine) = engine_with(ECHO, 10);
        let mut config = ParleyConfig::default();
        config.agent.name = "scout".into();
        config.agent.workdir = dir.path().to_path_buf();
        config.invoker.program = "/nonexistent/reasoner".into();
        config.credentials = Credentials::new("k");
        let engine = Engine::new(Arc::new(config), None);

        let err = engine.deliver(Delivery::new("hi")).await.unwrap_err();
        assert!(matches!(err, ParleyError::ProcessFailure(ref exit) if exit.code.is_none()));
    }

    #[tokio::test]
    async fn test_missing_root_fails_before_invocation() {
        let (dir, _crm, engine) = engine_with("touch invoked; cat >/dev/null; echo ok", 10);
        std::fs::remove_file(dir.path().join("CLAUDE.md")).unwrap();

        let err = engine
            .deliver(Delivery::new("hi").to_thread(id("t1")))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::MissingContext(_)));
        assert!(!dir.path().join("invoked").exists());
        let thread = engine.threads().get(&id("t1")).await.unwrap();
        assert_eq!(thread.status, ThreadStatus::Errored);
        assert!(thread.messages.is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_is_invalid() {
        let (_dir, _crm, engine) = engine_with(ECHO, 10);
        let err = engine.deliver(Delivery::new("   ")).await.unwrap_err();
        assert!(matches!(err, ParleyError::InvalidRequest(_)));
        assert!(engine.threads().list().await.unwrap().is_empty());
    }

    // ── Concurrency ────────────────────────────────────────────

    #[tokio::test]
    async fn test_concurrent_deliveries_one_wins_rest_busy() {
        let (_dir, _crm, engine) = engine_with("sleep 1; cat >/dev/null; printf done", 10);
        let target = id("shared");

        let results = futures::future::join_all(
            (0..4).map(|_| engine.deliver(Delivery::new("hi").to_thread(target.clone()))),
        )
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ParleyError::Busy(_))))
                .count(),
            3
        );
        let thread = engine.threads().get(&target).await.unwrap();
        assert_eq!(thread.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_different_threads_run_concurrently() {
        let (_dir, _crm, engine) = engine_with("sleep 1; cat >/dev/null; printf done", 10);
        let started = std::time::Instant::now();
        let results = futures::future::join_all(
            ["a", "b", "c"].map(|t| engine.deliver(Delivery::new("hi").to_thread(id(t)))),
        )
        .await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    // ── Delete ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_delete_thread_removes_record_and_dynamic_documents() {
        let (dir, _crm, engine) = engine_with(ECHO, 10);
        let target = id("t1");
        engine
            .deliver(Delivery::new("hello").to_thread(target.clone()))
            .await
            .unwrap();
        let dynamic = dir.path().join("dynamic").join("t1");
        assert!(dynamic.join("state.md").exists());

        engine.delete_thread(&target).await.unwrap();
        assert!(!dynamic.exists());
        assert!(matches!(
            engine.threads().get(&target).await,
            Err(ParleyError::ThreadNotFound(_))
        ));

        let again = engine
            .deliver(Delivery::new("back").to_thread(target.clone()))
            .await
            .unwrap();
        assert_eq!(again.thread.messages.len(), 2);
        assert!(dynamic.join("state.md").exists());
    }

    #[tokio::test]
    async fn test_delete_thread_while_leased_is_busy_and_keeps_everything() {
        let (dir, _crm, engine) = engine_with(ECHO, 10);
        let target = id("t1");
        engine
            .deliver(Delivery::new("hello").to_thread(target.clone()))
            .await
            .unwrap();

        let lease = engine.threads().acquire(&target).unwrap();
        assert!(matches!(
            engine.delete_thread(&target).await,
            Err(ParleyError::Busy(_))
        ));
        assert!(dir.path().join("dynamic/t1/state.md").exists());
        assert_eq!(engine.threads().get(&target).await.unwrap().messages.len(), 2);

        drop(lease);
        engine.delete_thread(&target).await.unwrap();
        assert!(!dir.path().join("dynamic/t1").exists());
    }

    // ── Detached delivery ──────────────────────────────────────

    #[tokio::test]
    async fn test_detached_delivery_finishes_in_background() {
        let (_dir, crm, engine) = engine_with(ECHO, 10);
        let target = engine
            .deliver_detached(Delivery::new("later").to_thread(id("bg")))
            .unwrap();
        assert!(matches!(
            engine.deliver_detached(Delivery::new("again").to_thread(target.clone())),
            Err(ParleyError::Busy(_))
        ));

        let mut committed = false;
        for _ in 0..100 {
            if let Ok(thread) = engine.threads().get(&target).await {
                if thread.messages.len() == 2 {
                    committed = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(committed);
        // Forwarding happens after the commit.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(crm.replies.lock().unwrap().len(), 1);
    }
}
