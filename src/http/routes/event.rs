//! 事件路由 `/api/event`，含 WebSocket 推送

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, warn};

use crate::error::Result;
use crate::http::extract::{Json, Path, Query};
use crate::http::response::{ok, ApiResponse};
use crate::http::{AuthUser, HttpServerState};
use crate::model::event_message::{EventMessage, Page, PageQuery, TimeRangeQuery};

pub fn create_route() -> Router<HttpServerState> {
    Router::new()
        .route("/api/event", get(list_events))
        .route("/api/event/sync", get(sync_events))
        .route("/api/event/peopletime", get(find_by_time_range))
        .route("/api/event/ws", get(subscribe))
        .route("/api/event/{id}", get(get_event))
}

async fn list_events(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Page<EventMessage>>>> {
    Ok(ok(state.events.find_page(&query).await?))
}

async fn get_event(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<EventMessage>>> {
    Ok(ok(state.events.find_by_id(id).await?))
}

async fn sync_events(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
) -> Result<Json<ApiResponse<Vec<EventMessage>>>> {
    Ok(ok(state.events.sync().await?))
}

async fn find_by_time_range(
    State(state): State<HttpServerState>,
    _auth: AuthUser,
    Query(range): Query<TimeRangeQuery>,
) -> Result<Json<ApiResponse<Vec<EventMessage>>>> {
    Ok(ok(state
        .events
        .find_by_time_range(range.start_time, range.end_time)
        .await?))
}

async fn subscribe(
    State(state): State<HttpServerState>,
    auth: AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let rx = state.events.subscribe();
    debug!(user_id = auth.user_id, "📡 事件订阅");
    ws.on_upgrade(move |socket| push_events(socket, rx))
}

/// 把新事件推给客户端，直到任一方关闭
async fn push_events(socket: WebSocket, rx: broadcast::Receiver<EventMessage>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(rx);

    loop {
        tokio::select! {
            item = events.next() => match item {
                Some(Ok(event)) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("事件序列化失败: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "📡 订阅者处理过慢，丢弃部分事件");
                }
                None => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("📡 事件订阅结束");
}
