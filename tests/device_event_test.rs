//! 设备后端转发与事件同步集成测试

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use serde_json::json;

use ownsa_server::model::event_message::PageQuery;
use ownsa_server::ServerError;

use common::{
    spawn_fixed_backend, spawn_mock_backend, spawn_silent_backend, test_state,
    test_state_with_backend,
};

fn event(message_id: i64, event_time: i64) -> serde_json::Value {
    json!({
        "message_id": message_id,
        "event_time": event_time,
        "event_type": 1,
        "ib_addr": 1,
        "output_addr": 2,
        "card_no": "C-1",
        "people_id": null,
        "description": "card granted",
    })
}

#[tokio::test]
async fn test_open_door_unreachable_backend() {
    let state = test_state().await;

    let started = Instant::now();
    let err = state.relay.open_door(1, 2, 0).await.unwrap_err();

    assert!(matches!(err, ServerError::DeviceUnreachable(_)));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_open_door_times_out_on_silent_backend() {
    let backend = spawn_silent_backend().await;
    let state = test_state_with_backend(&backend).await;

    let started = Instant::now();
    let err = state.relay.open_door(1, 2, 0).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ServerError::DeviceUnreachable(_)));
    // request_timeout_secs = 1
    assert!(elapsed >= Duration::from_millis(900), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "returned after {:?}", elapsed);
}

#[tokio::test]
async fn test_non_success_status_is_unreachable() {
    let backend = spawn_fixed_backend(StatusCode::INTERNAL_SERVER_ERROR, "boom").await;
    let state = test_state_with_backend(&backend).await;

    let err = state.relay.cancel_fire_alarm(1).await.unwrap_err();
    assert!(matches!(err, ServerError::DeviceUnreachable(_)));
    assert_eq!(err.code(), 503);
}

#[tokio::test]
async fn test_malformed_reply_is_protocol_error() {
    let backend = spawn_fixed_backend(StatusCode::OK, "not-json").await;
    let state = test_state_with_backend(&backend).await;

    let err = state.relay.open_door(1, 2, 0).await.unwrap_err();
    assert!(matches!(err, ServerError::DeviceProtocol(_)));
    assert_eq!(err.code(), 502);
}

#[tokio::test]
async fn test_open_door_forwards_form() {
    let backend = spawn_mock_backend(Vec::new()).await;
    let state = test_state_with_backend(&backend).await;

    let reply = state.relay.open_door(3, 4, 1).await.unwrap();
    assert!(reply.is_ok());
    assert_eq!(reply.content["ibaddr"], "3");
    assert_eq!(reply.content["outputaddr"], "4");
    assert_eq!(reply.content["mode"], "1");

    let status = state.relay.status_sync().await.unwrap();
    assert_eq!(status["doors"][0]["id"], 1);
}

#[tokio::test]
async fn test_time_sync_reports_each_step() {
    let state = test_state().await;

    // 时钟同步关闭：两步都报告失败，但请求本身成功
    let result = state
        .relay
        .sync_device_time("2024-01-02 10:00:00")
        .await
        .unwrap();
    assert!(!result.system_clock.ok);
    assert!(!result.hardware_clock.ok);

    assert!(matches!(
        state.relay.sync_device_time("yesterday").await,
        Err(ServerError::Validation(_))
    ));
}

#[tokio::test]
async fn test_event_sync_is_incremental() {
    let backend = spawn_mock_backend(vec![
        event(1, 1_704_189_600),
        event(2, 1_704_189_660),
        event(3, 1_704_535_200),
    ])
    .await;
    let state = test_state_with_backend(&backend).await;
    let mut rx = state.events.subscribe();

    let first = state.events.sync().await.unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(rx.recv().await.unwrap().message_id, 1);

    // 第二次同步从最大 message_id 之后拉取，不会重复写入
    let second = state.events.sync().await.unwrap();
    assert!(second.is_empty());

    let page = state
        .events
        .find_page(&PageQuery {
            page: Some(1),
            limit: Some(2),
        })
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].message_id, 3);

    let range = state
        .events
        .find_by_time_range(1_704_189_600, 1_704_189_660)
        .await
        .unwrap();
    assert_eq!(range.len(), 2);

    assert!(matches!(
        state.events.find_by_time_range(10, 1).await,
        Err(ServerError::Validation(_))
    ));
    assert!(matches!(
        state.events.find_by_id(99).await,
        Err(ServerError::NotFound(_))
    ));
}
