//! 集成测试公共设施：内存存储 + 测试配置 + 模拟设备后端

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::{extract::Form, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use ownsa_server::config::{DatabaseConfig, ServerConfig};
use ownsa_server::http::HttpServerState;
use ownsa_server::model::controller_user::{LoginRequest, LoginResponse, RegisterRequest};
use ownsa_server::service::OsClock;
use ownsa_server::{build_state, Stores};

/// 关闭的端口，连接会被立即拒绝
pub const UNREACHABLE_BACKEND: &str = "http://127.0.0.1:9/";

pub fn test_config(backend_url: &str) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.auth.jwt_secret = "integration-test-secret".to_string();
    config.auth.password_cost = 4;
    config.device.backend_base_url = backend_url.to_string();
    config.device.request_timeout_secs = 1;
    config.device.sync_enabled = false;
    config.device.clock_sync_enabled = false;
    config
}

pub async fn test_state_with_backend(backend_url: &str) -> HttpServerState {
    let stores = Arc::new(Stores::in_memory().await.expect("in-memory stores"));
    build_state(stores, &test_config(backend_url), Arc::new(OsClock)).expect("state")
}

pub async fn test_state() -> HttpServerState {
    test_state_with_backend(UNREACHABLE_BACKEND).await
}

/// 初始管理员的 ID；首次调用时创建
pub async fn root_admin(state: &HttpServerState) -> i64 {
    if let Some(admin) = state.users.seed_admin("root", "root-pw").await.expect("seed admin") {
        return admin.id;
    }
    state
        .users
        .find_all()
        .await
        .expect("list users")
        .into_iter()
        .find(|u| u.username == "root")
        .expect("root admin")
        .id
}

/// 创建指定类型的用户并登录，返回登录结果
///
/// 普通用户（3）走公开注册，其他类型由初始管理员创建
pub async fn register_and_login(
    state: &HttpServerState,
    username: &str,
    user_type: i64,
) -> LoginResponse {
    let req: RegisterRequest = serde_json::from_value(json!({
        "username": username,
        "password": "pw-123456",
        "user_type": user_type,
    }))
    .expect("register request");

    if user_type == 3 {
        state.users.register(&req).await.expect("register");
    } else {
        let admin = root_admin(state).await;
        state.users.create_user(admin, &req).await.expect("create user");
    }

    state
        .users
        .login(&LoginRequest {
            username: username.to_string(),
            password: "pw-123456".to_string(),
        })
        .await
        .expect("login")
}

/// 启动一个模拟设备后端，返回以 `/` 结尾的基础 URL
///
/// `api/eventsync` 返回 `events` 中 message_id 大于 `after` 的部分
pub async fn spawn_mock_backend(events: Vec<Value>) -> String {
    let events = Arc::new(events);

    let app = Router::new()
        .route(
            "/api/dooropen",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                Json(json!({ "retcode": 200, "content": form }))
            }),
        )
        .route(
            "/api/firecancel",
            post(|| async { Json(json!({ "retcode": 200, "content": "ok" })) }),
        )
        .route(
            "/api/datasync",
            post(|| async { Json(json!({ "retcode": 200, "content": null })) }),
        )
        .route(
            "/api/statussync",
            post(|| async { Json(json!({ "doors": [{ "id": 1, "open": false }] })) }),
        )
        .route(
            "/api/eventsync",
            post(move |Form(form): Form<HashMap<String, String>>| {
                let events = events.clone();
                async move {
                    let after: i64 = form.get("after").and_then(|v| v.parse().ok()).unwrap_or(0);
                    let fresh: Vec<Value> = events
                        .iter()
                        .filter(|e| e["message_id"].as_i64().unwrap_or(0) > after)
                        .cloned()
                        .collect();
                    Json(json!({ "retcode": 200, "content": fresh }))
                }
            }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock backend");
    let addr = listener.local_addr().expect("mock addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}/", addr)
}

/// 启动一个对所有请求都返回固定状态码与正文的设备后端
pub async fn spawn_fixed_backend(status: StatusCode, body: &'static str) -> String {
    let app = Router::new().fallback(move || async move { (status, body) });

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixed backend");
    let addr = listener.local_addr().expect("fixed addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}/", addr)
}

/// 启动一个接受连接但从不应答的设备后端
pub async fn spawn_silent_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind silent backend");
    let addr = listener.local_addr().expect("silent addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{}/", addr)
}

/// 基于临时目录文件的存储配置（多连接）
pub fn temp_database_config() -> DatabaseConfig {
    let dir = std::env::temp_dir().join(format!("ownsa-test-{}", uuid::Uuid::new_v4()));
    let path = |name: &str| dir.join(name).display().to_string();
    DatabaseConfig {
        config_path: path("config.db"),
        credential_path: path("credential.db"),
        other_group_path: path("other_group.db"),
        event_message_path: path("event_message.db"),
        data_dir: dir.display().to_string(),
        factory_reset_marker: path("factory_reset"),
    }
}
