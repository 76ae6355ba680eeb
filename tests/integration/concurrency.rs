// tests/integration/concurrency.rs
use super::{build_orchestrator, create_test_config, plain_conversation, test_db, StaticGenerator, Arc};
use context_compressor::orchestrator::compression_engine::CompressionRequest;
use context_compressor::storage::{MetricsSink, SeaOrmMetricsStore};

#[tokio::test]
async fn test_concurrent_compression_of_distinct_conversations() {
    let (_dir, db) = test_db().await;
    let orchestrator = build_orchestrator(
        db.clone(),
        &create_test_config(),
        Arc::new(StaticGenerator::offline()),
    );

    // Spawn 10 compressions over distinct contents
    let mut handles = vec![];
    for i in 0..10 {
        let orchestrator = orchestrator.clone();
        handles.push(tokio::spawn(async move {
            let mut messages = plain_conversation(30);
            messages[0].content = format!("opening line for conversation {}", i);
            orchestrator
                .compress_context(
                    CompressionRequest::new(messages).conversation(format!("conv-{}", i)),
                )
                .await
        }));
    }

    for handle in handles {
        let (messages, metadata) = handle.await.unwrap();
        assert!(metadata.compression_applied);
        assert!(messages.len() < 30);
    }

    // every compression recorded exactly one stats row
    orchestrator.flush_pending_writes().await;
    let stats = SeaOrmMetricsStore::new(db)
        .compression_stats(None, 1)
        .await
        .unwrap();
    assert_eq!(stats.total_compressions, 10);
}

#[tokio::test]
async fn test_concurrent_compression_of_identical_context() {
    let (_dir, db) = test_db().await;
    let orchestrator = build_orchestrator(db, &create_test_config(), Arc::new(StaticGenerator::offline()));
    let messages = plain_conversation(40);

    let mut handles = vec![];
    for _ in 0..8 {
        let orchestrator = orchestrator.clone();
        let messages = messages.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .compress_context(CompressionRequest::new(messages))
                .await
        }));
    }

    let mut outputs = vec![];
    for handle in handles {
        let (compressed, metadata) = handle.await.unwrap();
        assert!(metadata.compression_applied);
        outputs.push(compressed);
    }
    assert!(outputs.windows(2).all(|w| w[0] == w[1]));
    orchestrator.flush_pending_writes().await;

    // one upserted row survives for the shared hash
    let (_, after) = orchestrator
        .compress_context(CompressionRequest::new(messages))
        .await;
    assert!(after.cached);
}
