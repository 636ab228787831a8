//! HTTP 服务器 - 路由装配、共享状态与异常兜底

use std::any::Any;
use std::sync::Arc;

use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::error::{correlation_token, ServerError};
use crate::http::response::ApiResponse;
use crate::http::routes;
use crate::repository::DeviceRepository;
use crate::service::{
    AccessResolver, ConfigSync, ControllerUserService, CredentialService, DeviceRelay,
    EventMessageService, PeopleService,
};

/// HTTP 共享状态
#[derive(Clone)]
pub struct HttpServerState {
    pub users: Arc<ControllerUserService>,
    pub credentials: Arc<CredentialService>,
    pub people: Arc<PeopleService>,
    pub resolver: Arc<AccessResolver>,
    pub relay: Arc<DeviceRelay>,
    pub devices: Arc<DeviceRepository>,
    pub events: Arc<EventMessageService>,
    pub sync: ConfigSync,
}

/// 处理器 panic 时的兜底应答：HTTP 200 + code 500 + 追踪标识
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };

    let trace_id = correlation_token();
    error!(trace_id = %trace_id, "💥 请求处理 panic: {}", detail);

    let mut body = ApiResponse::<String>::failure(500, "Internal error");
    body.data = Some(trace_id);
    (StatusCode::OK, Json(body)).into_response()
}

async fn route_not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(format!("接口不存在: {}", uri.path()))
}

async fn method_not_allowed(method: Method, uri: Uri) -> ServerError {
    ServerError::Validation(format!("{} 不支持 {}", uri.path(), method))
}

/// 构建完整路由
pub fn build_router(state: HttpServerState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP 服务器
pub struct HttpServer {
    state: HttpServerState,
    bind_address: String,
}

impl HttpServer {
    pub fn new(state: HttpServerState, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    /// 启动 HTTP 服务器，直到 `shutdown` 完成
    pub async fn start(
        &self,
        shutdown: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let app = build_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!("🌐 HTTP 服务器启动在 {}", self.bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
