use chorus_server::{background, config::Config, AppState};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn idle_conversations_are_pruned() {
    let state = Arc::new(AppState::new(Config::default()).unwrap());

    // Seed history through the same AI service the handlers use.
    state
        .pipeline
        .ai()
        .record_exchange("call-idle", "hello", "hi there")
        .await;
    assert_eq!(state.pipeline.ai().conversation_count().await, 1);

    // ttl=1s runs the check every second.
    tokio::spawn(background::start_pruning_task(state.clone(), 1));

    let mut pruned = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if state.pipeline.ai().conversation_count().await == 0 {
            pruned = true;
            break;
        }
    }
    assert!(pruned, "conversation should have been pruned after its TTL");
}

#[tokio::test]
async fn zero_ttl_disables_pruning() {
    let state = Arc::new(AppState::new(Config::default()).unwrap());
    state
        .pipeline
        .ai()
        .record_exchange("call-kept", "hello", "hi there")
        .await;

    tokio::spawn(background::start_pruning_task(state.clone(), 0));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(state.pipeline.ai().conversation_count().await, 1);
}
