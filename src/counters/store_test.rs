#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::counters::{CounterError, CounterStore, Increment, MetricDefinition, MetricDetail, MetricRegistry};
    use crate::persistence::{storage_key, MemoryGateway};
    use crate::support::{images_definitions, new_store};

    #[tokio::test]
    async fn test_declared_counters_start_at_zero() {
        let (store, _) = new_store(images_definitions());

        let values = store.get_all("images").await.expect("declared type");
        assert_eq!(2, values.len());
        assert!(values.values().all(|v| *v == 0));
    }

    #[tokio::test]
    async fn test_unknown_type() {
        let (store, _) = new_store(images_definitions());

        let err = store.get_all("videos").await.unwrap_err();
        assert_eq!(CounterError::UnknownType("videos".to_string()), err);
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_increment_returns_new_value() {
        let (store, _) = new_store(images_definitions());

        assert_eq!(1, store.increment("images", "uploaded_total", 1).await.unwrap());
        assert_eq!(6, store.increment("images", "uploaded_total", 5).await.unwrap());
        assert_eq!(0, store.get_all("images").await.unwrap()["downloaded_total"]);
    }

    #[tokio::test]
    async fn test_unknown_key_changes_nothing() {
        let (store, _) = new_store(images_definitions());
        store.increment("images", "uploaded_total", 2).await.unwrap();

        let err = store.increment("images", "bogus", 1).await.unwrap_err();
        assert!(err.is_not_found());

        let values = store.get_all("images").await.unwrap();
        assert_eq!(2, values["uploaded_total"]);
        assert_eq!(0, values["downloaded_total"]);
        assert!(!values.contains_key("bogus"));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let (store, _) = new_store(images_definitions());

        let err = store
            .increment_batch(
                "images",
                "ozon",
                &[Increment::new("uploaded_total", 3), Increment::new("bogus", 1)],
            )
            .await
            .unwrap_err();
        assert_eq!(
            CounterError::UnknownKey {
                metric_type: "images".to_string(),
                key: "bogus".to_string()
            },
            err
        );
        assert_eq!(0, store.get_all("images").await.unwrap()["uploaded_total"]);

        let updated = store
            .increment_batch(
                "images",
                "ozon",
                &[Increment::new("uploaded_total", 3), Increment::new("downloaded_total", 2)],
            )
            .await
            .unwrap();
        assert_eq!(3, updated["uploaded_total"]);
        assert_eq!(2, updated["downloaded_total"]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_rejected() {
        let (store, _) = new_store(images_definitions());
        assert_eq!(
            CounterError::EmptyBatch,
            store.increment_batch("images", "images", &[]).await.unwrap_err()
        );
    }

    #[tokio::test]
    async fn test_increment_saturates() {
        let (store, _) = new_store(images_definitions());
        store.load("images", "uploaded_total", u64::MAX - 1).await.unwrap();

        assert_eq!(u64::MAX, store.increment("images", "uploaded_total", 10).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let (store, _) = new_store(images_definitions());

        // Three callers hammering the same counter.
        let mut handles = Vec::new();
        for _ in 0..3 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    store.increment("images", "uploaded_total", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(3000, store.get_all("images").await.unwrap()["uploaded_total"]);
    }

    #[tokio::test]
    async fn test_load_never_creates_counters() {
        let (store, _) = new_store(images_definitions());

        store.load("images", "uploaded_total", 42).await.unwrap();
        assert_eq!(42, store.get_all("images").await.unwrap()["uploaded_total"]);

        assert!(store.load("images", "bogus", 1).await.is_err());
        assert!(store.load("videos", "uploaded_total", 1).await.is_err());
        assert_eq!(2, store.get_all("images").await.unwrap().len());
    }

    #[tokio::test]
    async fn test_reset_persists_zeros() {
        let mut definitions = images_definitions();
        definitions.push(MetricDefinition {
            metric_type: "parser_images".to_string(),
            metrics: vec![MetricDetail::new("cached_images_total", "")],
        });
        let (store, gateway) = new_store(definitions);

        store.increment("images", "uploaded_total", 4).await.unwrap();
        store.increment("parser_images", "cached_images_total", 7).await.unwrap();

        assert_eq!(2, store.reset("images").await.unwrap());

        let values = store.get_all("images").await.unwrap();
        assert!(values.values().all(|v| *v == 0));
        assert_eq!(7, store.get_all("parser_images").await.unwrap()["cached_images_total"]);

        assert_eq!(Some(0), gateway.peek(&storage_key("images", "uploaded_total")).await);
        assert_eq!(Some(0), gateway.peek(&storage_key("images", "downloaded_total")).await);
        assert_eq!(None, gateway.peek(&storage_key("parser_images", "cached_images_total")).await);
    }

    #[tokio::test]
    async fn test_reset_survives_write_failures() {
        let (store, gateway) = new_store(images_definitions());
        gateway.fail_writes_for(&storage_key("images", "uploaded_total"));
        store.increment("images", "uploaded_total", 4).await.unwrap();

        assert_eq!(2, store.reset("images").await.unwrap());
        assert_eq!(0, store.get_all("images").await.unwrap()["uploaded_total"]);
        assert_eq!(Some(0), gateway.peek(&storage_key("images", "downloaded_total")).await);
    }

    #[test]
    fn test_duplicate_definitions_are_rejected() {
        let mut definitions = images_definitions();
        definitions[0]
            .metrics
            .push(MetricDetail::new("uploaded_total", "again"));

        let result = CounterStore::new(
            definitions,
            Arc::new(MetricRegistry::new()),
            Arc::new(MemoryGateway::new()),
        );
        assert!(matches!(result, Err(CounterError::Duplicate { .. })));
    }

    #[tokio::test]
    async fn test_register_all_uses_loaded_values() {
        let (store, _) = new_store(images_definitions());
        store.load("images", "uploaded_total", 3).await.unwrap();

        assert_eq!(2, store.register_all().await);
        assert_eq!(0, store.register_all().await);

        let text = store.registry().render();
        assert!(text.contains("images_uploaded_total{source=\"images\"} 3"), "{}", text);
        assert!(text.contains("images_downloaded_total{source=\"images\"} 0"), "{}", text);
    }

    #[tokio::test]
    async fn test_snapshot_covers_every_counter() {
        let (store, _) = new_store(images_definitions());
        store.increment("images", "downloaded_total", 2).await.unwrap();

        let snapshot = store.snapshot().await;
        assert_eq!(2, snapshot.len());
        let downloaded = snapshot
            .iter()
            .find(|c| c.key == "downloaded_total")
            .expect("downloaded_total in snapshot");
        assert_eq!("images", downloaded.metric_type);
        assert_eq!(2, downloaded.value);
    }
}
