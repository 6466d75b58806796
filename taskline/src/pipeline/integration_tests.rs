//! Integration tests for pipeline execution and rollback.

#[cfg(test)]
mod tests {
    use crate::cancellation::CancellationToken;
    use crate::pipeline::Pipeline;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Shared recorder for rollback invocation order.
    fn order_recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let order = Arc::new(Mutex::new(Vec::new()));
        let recorder = {
            let order = order.clone();
            move |name: &str| order.lock().push(name.to_string())
        };
        (order, recorder)
    }

    #[tokio::test]
    async fn test_generic_chaining_success() {
        let pipeline = Pipeline::<i32>::begin()
            .then("convert int to string", |_handle, n| async move {
                anyhow::Ok(n.to_string())
            })
            .then(
                "convert string to int and divide by 4",
                |_handle, s: String| async move {
                    let n: i32 = s.parse()?;
                    anyhow::Ok(n / 4)
                },
            );

        let parent = CancellationToken::new();
        let result = pipeline.execute(&parent, 12).await.unwrap();
        assert_eq!(result, 3);
    }

    #[tokio::test]
    async fn test_identity_chain_forwards_seed() {
        let pipeline = Pipeline::<String>::begin()
            .then("pass 1", |_handle, v: String| async move { anyhow::Ok(v) })
            .then("pass 2", |_handle, v: String| async move { anyhow::Ok(v) })
            .then("pass 3", |_handle, v: String| async move { anyhow::Ok(v) });

        let parent = CancellationToken::new();
        let result = pipeline
            .execute(&parent, "carried".to_string())
            .await
            .unwrap();
        assert_eq!(result, "carried");
    }

    #[tokio::test]
    async fn test_empty_pipeline_returns_seed() {
        let pipeline = Pipeline::<u64>::begin();
        let parent = CancellationToken::new();

        let result = pipeline.execute(&parent, 7).await.unwrap();
        assert_eq!(result, 7);
    }

    #[tokio::test]
    async fn test_success_runs_no_rollback() {
        let clean = Arc::new(AtomicUsize::new(0));

        let c = clean.clone();
        let pipeline = Pipeline::<()>::begin().then("acquire", move |handle, ()| async move {
            handle.defer_rollback("release", move |_ctx| async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            anyhow::Ok(())
        });

        let parent = CancellationToken::new();
        pipeline.execute(&parent, ()).await.unwrap();
        assert_eq!(clean.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rollback_on_stage_failure_includes_failing_stage() {
        let clean = Arc::new(AtomicUsize::new(0));

        let c1 = clean.clone();
        let c2 = clean.clone();
        let c3 = clean.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("stage 1", move |handle, ()| async move {
                handle.defer_rollback("undo 1", move |_ctx| async move {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 2", move |handle, ()| async move {
                handle.defer_rollback("undo 2", move |_ctx| async move {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 3", move |handle, ()| async move {
                handle.defer_rollback("undo 3", move |_ctx| async move {
                    c3.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                Err::<(), _>(anyhow::anyhow!("fail"))
            });

        let parent = CancellationToken::new();
        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        assert_eq!(err.failing_stage(), Some("stage 3"));
        assert!(!err.is_cancelled());
        // The failing stage's own pre-failure registration participates too.
        assert_eq!(clean.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_without_registration_still_rolls_back_earlier_stages() {
        let clean = Arc::new(AtomicUsize::new(0));

        let c1 = clean.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("acquire", move |handle, ()| async move {
                handle.defer_rollback("release", move |_ctx| async move {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("explode", |_handle, ()| async move {
                Err::<(), _>(anyhow::anyhow!("nothing registered here"))
            });

        let parent = CancellationToken::new();
        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        assert_eq!(err.failing_stage(), Some("explode"));
        assert_eq!(clean.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cleanup_coverage_excludes_unentered_stages() {
        let clean = Arc::new(AtomicUsize::new(0));
        let stage3_entered = Arc::new(AtomicUsize::new(0));

        let c1 = clean.clone();
        let entered = stage3_entered.clone();
        let c3 = clean.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("stage 1", move |handle, ()| async move {
                handle.defer_rollback("undo 1", move |_ctx| async move {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 2", |_handle, ()| async move {
                Err::<(), _>(anyhow::anyhow!("midway failure"))
            })
            .then("stage 3", move |handle, ()| async move {
                entered.fetch_add(1, Ordering::SeqCst);
                handle.defer_rollback("undo 3", move |_ctx| async move {
                    c3.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            });

        let parent = CancellationToken::new();
        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        assert_eq!(err.failing_stage(), Some("stage 2"));
        assert_eq!(stage3_entered.load(Ordering::SeqCst), 0);
        assert_eq!(clean.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rollback_order_is_flat_lifo_across_stages() {
        let (order, record) = order_recorder();

        let r1 = record.clone();
        let r2 = record.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("stage 1", move |handle, ()| async move {
                let ra = r1.clone();
                handle.defer_rollback("c1a", move |_ctx| async move {
                    ra("c1a");
                    Ok(())
                });
                let rb = r1.clone();
                handle.defer_rollback("c1b", move |_ctx| async move {
                    rb("c1b");
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 2", move |handle, ()| async move {
                let ra = r2.clone();
                handle.defer_rollback("c2a", move |_ctx| async move {
                    ra("c2a");
                    Ok(())
                });
                let rb = r2.clone();
                handle.defer_rollback("c2b", move |_ctx| async move {
                    rb("c2b");
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 3", |_handle, ()| async move {
                Err::<(), _>(anyhow::anyhow!("fail immediately"))
            });

        let parent = CancellationToken::new();
        let _err = pipeline.execute(&parent, ()).await.unwrap_err();

        let observed = order.lock().clone();
        assert_eq!(observed, vec!["c2b", "c2a", "c1b", "c1a"]);
    }

    #[tokio::test]
    async fn test_rollback_error_does_not_stop_rollback() {
        let (order, record) = order_recorder();

        let r = record.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("register all", move |handle, ()| async move {
                let ra = r.clone();
                handle.defer_rollback("outer-early", move |_ctx| async move {
                    ra("outer-early");
                    Ok(())
                });
                handle.defer_rollback("middle", move |_ctx| async move {
                    anyhow::bail!("undo refused")
                });
                let rc = r.clone();
                handle.defer_rollback("outer-late", move |_ctx| async move {
                    rc("outer-late");
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("fail", |_handle, ()| async move {
                Err::<(), _>(anyhow::anyhow!("primary failure"))
            });

        let parent = CancellationToken::new();
        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        // Both non-failing actions still ran, in LIFO order.
        assert_eq!(order.lock().clone(), vec!["outer-late", "outer-early"]);

        // The primary cause stays dominant; the middle failure is attached.
        assert_eq!(err.failing_stage(), Some("fail"));
        assert_eq!(err.rollback_failures.len(), 1);
        assert_eq!(err.rollback_failures[0].action, "middle");
        assert!(err.to_string().contains("primary failure"));
        assert!(err.to_string().contains("undo refused"));
    }

    #[tokio::test]
    async fn test_failing_stage_runs_exactly_once() {
        let invocations = Arc::new(AtomicUsize::new(0));

        let n = invocations.clone();
        let pipeline = Pipeline::<()>::begin().then("flaky", move |_handle, ()| async move {
            n.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("always fails"))
        });

        let parent = CancellationToken::new();
        let _err = pipeline.execute(&parent, ()).await.unwrap_err();
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_parent_prevents_all_stages() {
        let entered = Arc::new(AtomicUsize::new(0));

        let n = entered.clone();
        let pipeline = Pipeline::<()>::begin().then("never", move |_handle, ()| async move {
            n.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });

        let parent = CancellationToken::new();
        parent.cancel("caller gave up");

        let err = pipeline.execute(&parent, ()).await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.failing_stage(), None);
        assert_eq!(entered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_stage_triggers_rollback() {
        let clean = Arc::new(AtomicUsize::new(0));
        let parent = CancellationToken::new();

        let c1 = clean.clone();
        let c2 = clean.clone();
        let c3 = clean.clone();
        let canceller = parent.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("stage 1", move |handle, ()| async move {
                handle.defer_rollback("undo 1", move |_ctx| async move {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 2", move |handle, ()| async move {
                handle.defer_rollback("undo 2", move |_ctx| async move {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 3", move |handle, ()| async move {
                handle.defer_rollback("undo 3", move |_ctx| async move {
                    c3.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                canceller.cancel("operator interrupt");
                tokio::select! {
                    () = handle.cancelled() => anyhow::bail!("interrupted"),
                    () = tokio::time::sleep(Duration::from_secs(3)) => anyhow::Ok(()),
                }
            });

        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(err.failing_stage(), Some("stage 3"));
        assert_eq!(clean.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_body_error_under_cancellation_is_preserved() {
        use std::error::Error as _;

        let parent = CancellationToken::new();
        let canceller = parent.clone();
        let pipeline = Pipeline::<()>::begin().then("upload", move |_handle, ()| async move {
            canceller.cancel("operator interrupt");
            Err::<(), _>(anyhow::anyhow!("disk quota exhausted"))
        });

        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        // Classified as cancellation, but the body's error is not dropped:
        // it stays in the message and in the source chain.
        assert!(err.is_cancelled());
        assert_eq!(err.failing_stage(), Some("upload"));
        let rendered = err.to_string();
        assert!(rendered.contains("upload"));
        assert!(rendered.contains("operator interrupt"));
        assert!(rendered.contains("disk quota exhausted"));
        assert!(err.source().is_some());
    }

    #[tokio::test]
    async fn test_ok_after_cancel_registers_cleanups_but_stops_the_chain() {
        let clean = Arc::new(AtomicUsize::new(0));
        let entered_last = Arc::new(AtomicUsize::new(0));
        let parent = CancellationToken::new();

        let c1 = clean.clone();
        let c2 = clean.clone();
        let n = entered_last.clone();
        let canceller = parent.clone();
        let pipeline = Pipeline::<()>::begin()
            .then("stage 1", move |handle, ()| async move {
                handle.defer_rollback("undo 1", move |_ctx| async move {
                    c1.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                anyhow::Ok(())
            })
            .then("stage 2", move |handle, ()| async move {
                handle.defer_rollback("undo 2", move |_ctx| async move {
                    c2.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                });
                // Trips the signal but completes successfully anyway.
                canceller.cancel("late interrupt");
                anyhow::Ok(())
            })
            .then("stage 3", move |_handle, ()| async move {
                n.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(())
            });

        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        assert!(err.is_cancelled());
        // Observed between stages, so no stage is attributed.
        assert_eq!(err.failing_stage(), None);
        assert_eq!(entered_last.load(Ordering::SeqCst), 0);
        // Stage 2 completed, so its cleanup is live and runs.
        assert_eq!(clean.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rollback_failures_reported_in_rollback_order() {
        let pipeline = Pipeline::<()>::begin()
            .then("register", |handle, ()| async move {
                handle.defer_rollback("first registered", |_ctx| async move {
                    anyhow::bail!("a")
                });
                handle.defer_rollback("last registered", |_ctx| async move {
                    anyhow::bail!("b")
                });
                anyhow::Ok(())
            })
            .then("fail", |_handle, ()| async move {
                Err::<(), _>(anyhow::anyhow!("boom"))
            });

        let parent = CancellationToken::new();
        let err = pipeline.execute(&parent, ()).await.unwrap_err();

        let actions: Vec<&str> = err
            .rollback_failures
            .iter()
            .map(|f| f.action.as_str())
            .collect();
        assert_eq!(actions, vec!["last registered", "first registered"]);
    }
}
